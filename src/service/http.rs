//! REST API
//!
//! Handlers are thin: they deserialize the request, run the blocking
//! engine call on tokio's blocking pool and serialize the result.
use super::{AuctionEngine, AuctionView, BidReceipt, LoopService, Marketplace};
use crate::{
    auction::{Auction, AuctionFilter, AuctionStatus, Bid, NewAuction},
    error::{MarketError, MarketResult},
    listing::{Favorite, Listing, ListingFilter, ListingStatus, NewListing},
    notification::Notification,
    persistence::Persistence,
    review::{NewReview, Review, ReviewSummary},
    trade::{CommissionQuote, TransactionRecord},
    types::*,
    user::{NewUser, User},
};
use anyhow::{format_err, Context, Result};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::{runtime::Runtime, sync::oneshot};
use tracing::{error, info};

pub struct AppState<P: Persistence> {
    pub engine: AuctionEngine<P>,
    pub market: Marketplace<P>,
}

impl<P: Persistence> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            market: self.market.clone(),
        }
    }
}

/// A [`MarketError`] rendered as `{"code", "message", "minimum"?}`
#[derive(Debug)]
pub struct ApiError(pub MarketError);

impl From<MarketError> for ApiError {
    fn from(e: MarketError) -> Self {
        ApiError(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(MarketError::Validation(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError(MarketError::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(MarketError::Validation(rejection.body_text()))
    }
}

/// [`Json`] whose rejections are reported as [`ApiError`]s
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    minimum: Option<Amount>,
}

fn status_of(e: &MarketError) -> StatusCode {
    use MarketError::*;
    match e {
        NotFound { .. } => StatusCode::NOT_FOUND,
        Validation(_) | BidTooLow { .. } => StatusCode::BAD_REQUEST,
        Forbidden(_) | SellerCannotBid | SellerCannotBuy => StatusCode::FORBIDDEN,
        InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
        AuctionEnded
        | AuctionNotLive
        | AlreadyHighestBidder
        | BuyNowUnavailable
        | InvalidTransition { .. }
        | ListingUnavailable(_)
        | AlreadyReviewed
        | ConcurrentUpdate => StatusCode::CONFLICT,
        Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_of(&self.0);
        let message = match &self.0 {
            MarketError::Internal(e) => {
                error!("request failed: {e:#}");
                "internal error".to_owned()
            }
            other => other.to_string(),
        };
        let minimum = match self.0 {
            MarketError::BidTooLow { minimum } => Some(minimum),
            _ => None,
        };
        let body = ErrorBody {
            code: self.0.code(),
            message,
            minimum,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Run a blocking engine call off the async runtime
async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> MarketResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MarketError::Internal(format_err!("request task failed: {e}")))?
        .map(Json)
        .map_err(ApiError)
}

fn created<T>(res: ApiResult<T>) -> std::result::Result<(StatusCode, Json<T>), ApiError> {
    res.map(|json| (StatusCode::CREATED, json))
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: Amount,
}

#[derive(Debug, Deserialize)]
pub struct AuctionStatusRequest {
    pub status: AuctionStatus,
    pub actor_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct ListingStatusRequest {
    pub status: ListingStatus,
    pub actor_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct BidRequest {
    pub bidder_id: UserId,
    pub amount: Amount,
}

#[derive(Debug, Deserialize)]
pub struct BuyerRequest {
    pub buyer_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct UserRequest {
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct FavoriteChange {
    pub user_id: UserId,
    pub listing_id: ListingId,
    /// Whether the request changed anything
    pub changed: bool,
}

pub fn router<P: Persistence>(state: AppState<P>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/users", post(create_user::<P>))
        .route("/users/:id", get(get_user::<P>))
        .route("/users/:id/deposit", post(deposit::<P>))
        .route("/users/:id/withdraw", post(withdraw::<P>))
        .route("/users/:id/notifications", get(notifications::<P>))
        .route("/users/:id/favorites", get(favorites::<P>))
        .route(
            "/users/:id/favorites/:listing_id",
            post(add_favorite::<P>).delete(remove_favorite::<P>),
        )
        .route("/users/:id/transactions", get(user_transactions::<P>))
        .route("/users/:id/reviews", get(user_reviews::<P>))
        .route("/notifications/:id/read", post(mark_notification_read::<P>))
        .route(
            "/listings",
            post(create_listing::<P>).get(list_listings::<P>),
        )
        .route("/listings/:id", get(get_listing::<P>))
        .route("/listings/:id/status", patch(change_listing_status::<P>))
        .route("/listings/:id/purchase", post(purchase_listing::<P>))
        .route(
            "/auctions",
            post(create_auction::<P>).get(list_auctions::<P>),
        )
        .route("/auctions/:id", get(get_auction::<P>))
        .route("/auctions/:id/status", patch(change_auction_status::<P>))
        .route("/auctions/:id/bids", post(place_bid::<P>).get(list_bids::<P>))
        .route("/auctions/:id/buy-now", post(buy_now::<P>))
        .route("/transactions/:id", get(get_transaction::<P>))
        .route("/reviews", post(create_review::<P>))
        .route("/commission/quote", get(commission_quote::<P>))
        .with_state(state)
}

async fn create_user<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiJson(new): ApiJson<NewUser>,
) -> std::result::Result<(StatusCode, Json<User>), ApiError> {
    created(blocking(move || state.market.create_user(new)).await)
}

async fn get_user<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiPath(id): ApiPath<UserId>,
) -> ApiResult<User> {
    blocking(move || state.market.get_user(&id)).await
}

async fn deposit<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(req): ApiJson<AmountRequest>,
) -> ApiResult<User> {
    blocking(move || state.market.deposit(&id, req.amount)).await
}

async fn withdraw<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(req): ApiJson<AmountRequest>,
) -> ApiResult<User> {
    blocking(move || state.market.withdraw(&id, req.amount)).await
}

async fn notifications<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiPath(id): ApiPath<UserId>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> ApiResult<Vec<Notification>> {
    blocking(move || state.market.notifications(&id, query.limit)).await
}

async fn mark_notification_read<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiPath(id): ApiPath<NotificationId>,
    ApiJson(req): ApiJson<UserRequest>,
) -> ApiResult<Notification> {
    blocking(move || state.market.mark_notification_read(&id, &req.user_id)).await
}

async fn favorites<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiPath(id): ApiPath<UserId>,
) -> ApiResult<Vec<Favorite>> {
    blocking(move || state.market.favorites(&id)).await
}

async fn add_favorite<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiPath((user_id, listing_id)): ApiPath<(UserId, ListingId)>,
) -> ApiResult<FavoriteChange> {
    blocking(move || {
        let changed = state.market.add_favorite(&user_id, &listing_id)?;
        Ok(FavoriteChange {
            user_id,
            listing_id,
            changed,
        })
    })
    .await
}

async fn remove_favorite<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiPath((user_id, listing_id)): ApiPath<(UserId, ListingId)>,
) -> ApiResult<FavoriteChange> {
    blocking(move || {
        let changed = state.market.remove_favorite(&user_id, &listing_id)?;
        Ok(FavoriteChange {
            user_id,
            listing_id,
            changed,
        })
    })
    .await
}

async fn user_transactions<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiPath(id): ApiPath<UserId>,
) -> ApiResult<Vec<TransactionRecord>> {
    blocking(move || state.market.transactions_for(&id)).await
}

async fn user_reviews<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiPath(id): ApiPath<UserId>,
) -> ApiResult<ReviewSummary> {
    blocking(move || state.market.reviews_for(&id)).await
}

async fn create_listing<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiJson(new): ApiJson<NewListing>,
) -> std::result::Result<(StatusCode, Json<Listing>), ApiError> {
    created(blocking(move || state.market.create_listing(new)).await)
}

async fn list_listings<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiQuery(filter): ApiQuery<ListingFilter>,
) -> ApiResult<Vec<Listing>> {
    blocking(move || state.market.list_listings(&filter)).await
}

async fn get_listing<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiPath(id): ApiPath<ListingId>,
) -> ApiResult<Listing> {
    blocking(move || state.market.get_listing(&id)).await
}

async fn change_listing_status<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiPath(id): ApiPath<ListingId>,
    ApiJson(req): ApiJson<ListingStatusRequest>,
) -> ApiResult<Listing> {
    blocking(move || {
        state
            .market
            .change_listing_status(&id, req.status, &req.actor_id)
    })
    .await
}

async fn purchase_listing<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiPath(id): ApiPath<ListingId>,
    ApiJson(req): ApiJson<BuyerRequest>,
) -> std::result::Result<(StatusCode, Json<TransactionRecord>), ApiError> {
    created(blocking(move || state.market.purchase_listing(&id, &req.buyer_id)).await)
}

async fn create_auction<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiJson(new): ApiJson<NewAuction>,
) -> std::result::Result<(StatusCode, Json<Auction>), ApiError> {
    created(blocking(move || state.engine.create_auction(new)).await)
}

async fn list_auctions<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiQuery(filter): ApiQuery<AuctionFilter>,
) -> ApiResult<Vec<AuctionView>> {
    blocking(move || state.engine.list_auctions(&filter)).await
}

async fn get_auction<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiPath(id): ApiPath<AuctionId>,
) -> ApiResult<AuctionView> {
    blocking(move || state.engine.get_auction(&id)).await
}

async fn change_auction_status<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiPath(id): ApiPath<AuctionId>,
    ApiJson(req): ApiJson<AuctionStatusRequest>,
) -> ApiResult<AuctionView> {
    blocking(move || state.engine.change_status(&id, req.status, &req.actor_id)).await
}

async fn place_bid<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiPath(id): ApiPath<AuctionId>,
    ApiJson(req): ApiJson<BidRequest>,
) -> std::result::Result<(StatusCode, Json<BidReceipt>), ApiError> {
    created(blocking(move || state.engine.place_bid(&id, &req.bidder_id, req.amount)).await)
}

async fn list_bids<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiPath(id): ApiPath<AuctionId>,
) -> ApiResult<Vec<Bid>> {
    blocking(move || state.engine.list_bids(&id)).await
}

async fn buy_now<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiPath(id): ApiPath<AuctionId>,
    ApiJson(req): ApiJson<BuyerRequest>,
) -> ApiResult<BidReceipt> {
    blocking(move || state.engine.buy_now(&id, &req.buyer_id)).await
}

async fn get_transaction<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiPath(id): ApiPath<TransactionId>,
) -> ApiResult<TransactionRecord> {
    blocking(move || state.market.get_transaction(&id)).await
}

async fn create_review<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiJson(new): ApiJson<NewReview>,
) -> std::result::Result<(StatusCode, Json<Review>), ApiError> {
    created(blocking(move || state.market.create_review(new)).await)
}

async fn commission_quote<P: Persistence>(
    State(state): State<AppState<P>>,
    ApiQuery(req): ApiQuery<AmountRequest>,
) -> Json<CommissionQuote> {
    Json(state.market.commission_quote(req.amount))
}

/// The HTTP server, running on its own runtime
///
/// Supervised as a loop service that fails when the server does.
pub struct HttpServer {
    // cancels all tasks on drop
    _runtime: Runtime,
    server_rx: oneshot::Receiver<Result<()>>,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, app: Router) -> Result<Self> {
        let runtime = Runtime::new()?;

        let (tx, rx) = oneshot::channel();

        runtime.spawn(async move {
            let res = async {
                let server = axum::Server::try_bind(&addr)?;
                info!(%addr, "http server listening");
                server.serve(app.into_make_service()).await?;
                Ok::<_, anyhow::Error>(())
            }
            .await
            .with_context(|| format!("Failed to run http server on {addr}"));
            // nobody is listening anymore when shutting down
            let _ = tx.send(res);
        });

        Ok(Self {
            _runtime: runtime,
            server_rx: rx,
        })
    }
}

impl LoopService for HttpServer {
    fn run_iteration(&mut self) -> Result<()> {
        // don't hog the cpu
        std::thread::sleep(std::time::Duration::from_millis(100));

        match self.server_rx.try_recv() {
            Ok(res) => res,
            Err(oneshot::error::TryRecvError::Empty) => Ok(()),
            Err(oneshot::error::TryRecvError::Closed) => {
                Err(format_err!("http server died without leaving a response"))
            }
        }
    }
}
