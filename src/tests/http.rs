use super::Harness;
use crate::{
    clock::Clock,
    service::{router, AppState},
};
use anyhow::Result;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app(h: &Harness) -> Router {
    router(AppState {
        engine: h.engine.clone(),
        market: h.market.clone(),
    })
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(serde_json::to_vec(&body)?))?,
        None => request.body(Body::empty())?,
    };
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    Ok((status, value))
}

fn id(value: &Value) -> String {
    value["id"].as_str().unwrap_or_default().to_owned()
}

#[tokio::test]
async fn health() -> Result<()> {
    let h = Harness::new();
    let (status, body) = call(&app(&h), "GET", "/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".into()));
    Ok(())
}

#[tokio::test]
async fn auction_flow_over_http() -> Result<()> {
    let h = Harness::new();
    let app = app(&h);

    let (status, admin) = call(
        &app,
        "POST",
        "/users",
        Some(json!({"name": "Admin", "email": "admin@evmarket.vn", "role": "admin"})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let admin = id(&admin);
    let (_, seller) = call(
        &app,
        "POST",
        "/users",
        Some(json!({"name": "Seller", "email": "seller@evmarket.vn"})),
    )
    .await?;
    let seller = id(&seller);
    let (_, bidder) = call(
        &app,
        "POST",
        "/users",
        Some(json!({"name": "Bidder", "email": "bidder@evmarket.vn"})),
    )
    .await?;
    let bidder = id(&bidder);

    let (status, wallet) = call(
        &app,
        "POST",
        &format!("/users/{bidder}/deposit"),
        Some(json!({"amount": 5000})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wallet["balance"], 5000);

    let (status, listing) = call(
        &app,
        "POST",
        "/listings",
        Some(json!({
            "seller_id": seller,
            "title": "Tesla Model 3",
            "details": {
                "kind": "ev",
                "brand": "Tesla",
                "model": "Model 3",
                "year": 2021,
                "mileage_km": 40000,
                "battery_capacity_kwh": 60.0,
                "range_km": 430
            }
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(listing["status"], "pending");
    let listing = id(&listing);

    let (status, _) = call(
        &app,
        "PATCH",
        &format!("/listings/{listing}/status"),
        Some(json!({"status": "active", "actor_id": admin})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let now = h.clock.now();
    let (status, auction) = call(
        &app,
        "POST",
        "/auctions",
        Some(json!({
            "listing_id": listing,
            "seller_id": seller,
            "starting_price": 1000,
            "min_increment": 100,
            "start_time": now,
            "end_time": now + chrono::Duration::hours(1),
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let auction = id(&auction);

    for (to, actor) in [("pending", &seller), ("scheduled", &admin), ("live", &admin)] {
        let (status, body) = call(
            &app,
            "PATCH",
            &format!("/auctions/{auction}/status"),
            Some(json!({"status": to, "actor_id": actor})),
        )
        .await?;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["status"], to);
    }

    let (status, error) = call(
        &app,
        "POST",
        &format!("/auctions/{auction}/bids"),
        Some(json!({"bidder_id": bidder, "amount": 900})),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "BID_TOO_LOW");
    assert_eq!(error["minimum"], 1000);

    let (status, error) = call(
        &app,
        "POST",
        &format!("/auctions/{auction}/bids"),
        Some(json!({"bidder_id": bidder, "amount": 9000})),
    )
    .await?;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(error["code"], "INSUFFICIENT_BALANCE");

    let (status, receipt) = call(
        &app,
        "POST",
        &format!("/auctions/{auction}/bids"),
        Some(json!({"bidder_id": bidder, "amount": 1200})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(receipt["bid"]["amount"], 1200);

    let (_, view) = call(&app, "GET", &format!("/auctions/{auction}"), None).await?;
    assert_eq!(view["current_price"], 1200);
    assert_eq!(view["min_next_bid"], 1300);
    assert_eq!(view["highest_bidder_id"], bidder.as_str());

    let (_, bids) = call(&app, "GET", &format!("/auctions/{auction}/bids"), None).await?;
    assert_eq!(bids.as_array().map(Vec::len), Some(1));

    let (_, live) = call(&app, "GET", "/auctions?status=live", None).await?;
    assert_eq!(live.as_array().map(Vec::len), Some(1));

    let (status, error) = call(
        &app,
        "POST",
        &format!("/auctions/{auction}/buy-now"),
        Some(json!({"buyer_id": bidder})),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["code"], "BUY_NOW_UNAVAILABLE");

    h.clock.advance(chrono::Duration::hours(2));
    let (status, error) = call(
        &app,
        "POST",
        &format!("/auctions/{auction}/bids"),
        Some(json!({"bidder_id": admin, "amount": 2000})),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["code"], "AUCTION_ENDED");
    Ok(())
}

#[tokio::test]
async fn errors_are_json() -> Result<()> {
    let h = Harness::new();
    let app = app(&h);

    let (status, error) = call(&app, "GET", "/users/nobody", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["code"], "NOT_FOUND");
    assert!(error.get("minimum").is_none());

    let (status, error) = call(
        &app,
        "POST",
        "/users",
        Some(json!({"name": "", "email": "x@y.z"})),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "VALIDATION_ERROR");
    Ok(())
}

#[tokio::test]
async fn malformed_requests_are_validation_errors() -> Result<()> {
    let h = Harness::new();
    let app = app(&h);

    let (status, error) = call(
        &app,
        "POST",
        "/auctions/x/bids",
        Some(json!({"bidder_id": "b", "amount": -5})),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "VALIDATION_ERROR");
    assert!(error["message"].is_string());

    let (status, error) = call(&app, "GET", "/commission/quote", None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "VALIDATION_ERROR");

    let (status, error) = call(&app, "POST", "/users", None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "VALIDATION_ERROR");

    // stored as a signed 64 bit number
    let (status, user) = call(
        &app,
        "POST",
        "/users",
        Some(json!({"name": "whale", "email": "whale@example.com"})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let (status, error) = call(
        &app,
        "POST",
        &format!("/users/{}/deposit", id(&user)),
        Some(json!({"amount": u64::MAX})),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "VALIDATION_ERROR");
    Ok(())
}

#[tokio::test]
async fn purchases_and_reviews_over_http() -> Result<()> {
    let h = Harness::new();
    let app = app(&h);
    let admin = h.admin()?;
    let seller = h.user("seller", 0)?;
    let buyer = h.user("buyer", 2_000)?;
    let listing = h.active_listing(&seller, &admin, Some(1_000))?;

    let (status, _) = call(
        &app,
        "POST",
        &format!("/users/{}/favorites/{}", buyer.id, listing.id),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let (_, favorites) = call(&app, "GET", &format!("/users/{}/favorites", buyer.id), None).await?;
    assert_eq!(favorites.as_array().map(Vec::len), Some(1));

    let (status, error) = call(
        &app,
        "POST",
        &format!("/listings/{}/purchase", listing.id),
        Some(json!({"buyer_id": seller.id})),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error["code"], "SELLER_CANNOT_BUY");

    let (status, record) = call(
        &app,
        "POST",
        &format!("/listings/{}/purchase", listing.id),
        Some(json!({"buyer_id": buyer.id})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(record["kind"], "direct");
    assert_eq!(record["commission"], 50);
    let record = id(&record);

    let (status, _) = call(&app, "GET", &format!("/transactions/{record}"), None).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(
        &app,
        "POST",
        "/reviews",
        Some(json!({"transaction_id": record, "reviewer_id": buyer.id, "rating": 5})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let (status, error) = call(
        &app,
        "POST",
        "/reviews",
        Some(json!({"transaction_id": record, "reviewer_id": buyer.id, "rating": 4})),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["code"], "ALREADY_REVIEWED");

    let (_, summary) = call(&app, "GET", &format!("/users/{}/reviews", seller.id), None).await?;
    assert_eq!(summary["count"], 1);
    assert_eq!(summary["average_rating"], 5.0);

    let (_, trades) = call(&app, "GET", &format!("/users/{}/transactions", buyer.id), None).await?;
    assert_eq!(trades.as_array().map(Vec::len), Some(1));

    let (_, quote) = call(&app, "GET", "/commission/quote?amount=10000", None).await?;
    assert_eq!(quote["commission"], 500);
    assert_eq!(quote["seller_proceeds"], 9500);
    Ok(())
}

#[tokio::test]
async fn notifications_over_http() -> Result<()> {
    let h = Harness::new();
    let app = app(&h);
    let admin = h.admin()?;
    let seller = h.user("seller", 0)?;
    let buyer = h.user("buyer", 2_000)?;
    let listing = h.active_listing(&seller, &admin, Some(1_000))?;
    h.market.purchase_listing(&listing.id, &buyer.id)?;
    h.notifier()?.catch_up()?;

    let (status, notifications) = call(
        &app,
        "GET",
        &format!("/users/{}/notifications?limit=10", buyer.id),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(notifications[0]["kind"], "purchase_completed");
    let notification = id(&notifications[0]);

    let (status, error) = call(
        &app,
        "POST",
        &format!("/notifications/{notification}/read"),
        Some(json!({"user_id": seller.id})),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error["code"], "FORBIDDEN");

    let (status, read) = call(
        &app,
        "POST",
        &format!("/notifications/{notification}/read"),
        Some(json!({"user_id": buyer.id})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["read"], true);
    Ok(())
}
