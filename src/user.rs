use crate::error::{MarketError, MarketResult};
use crate::types::*;
use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Member,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "member" => Role::Member,
            "admin" => Role::Admin,
            other => bail!("unknown role: {other}"),
        })
    }
}

/// A marketplace user together with their wallet
///
/// `held` is the part of `balance` reserved by winning bids; it can't be
/// spent or withdrawn until released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub balance: Amount,
    pub held: Amount,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
}

impl User {
    pub fn create(new: NewUser, now: DateTime<Utc>) -> MarketResult<Self> {
        if new.name.trim().is_empty() {
            return Err(MarketError::Validation("name is required".into()));
        }
        if !new.email.contains('@') {
            return Err(MarketError::Validation("email is invalid".into()));
        }
        Ok(Self {
            id: new_id(),
            name: new.name.trim().to_owned(),
            email: new.email.trim().to_lowercase(),
            role: new.role,
            balance: 0,
            held: 0,
            created_at: now,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn available(&self) -> Amount {
        self.balance - self.held
    }

    pub fn ensure_available(&self, required: Amount) -> MarketResult<()> {
        if self.available() < required {
            return Err(MarketError::InsufficientBalance {
                available: self.available(),
                required,
            });
        }
        Ok(())
    }

    pub fn deposit(&mut self, amount: Amount) -> MarketResult<()> {
        if amount == 0 {
            return Err(MarketError::Validation("deposit must be positive".into()));
        }
        let balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| MarketError::Validation("balance overflow".into()))?;
        check_amount(balance, "balance")?;
        self.balance = balance;
        Ok(())
    }

    pub fn withdraw(&mut self, amount: Amount) -> MarketResult<()> {
        if amount == 0 {
            return Err(MarketError::Validation("withdrawal must be positive".into()));
        }
        self.ensure_available(amount)?;
        self.balance -= amount;
        Ok(())
    }

    pub fn hold(&mut self, amount: Amount) -> MarketResult<()> {
        self.ensure_available(amount)?;
        self.held += amount;
        Ok(())
    }

    pub fn release(&mut self, amount: Amount) {
        self.held = self.held.saturating_sub(amount);
    }

    /// Pay out of held funds
    pub fn capture(&mut self, amount: Amount) -> MarketResult<()> {
        if self.held < amount {
            return Err(MarketError::Internal(anyhow::format_err!(
                "user {} holds {} but {} is being captured",
                self.id,
                self.held,
                amount
            )));
        }
        self.held -= amount;
        self.balance -= amount;
        Ok(())
    }

    /// Pay out of available funds
    pub fn charge(&mut self, amount: Amount) -> MarketResult<()> {
        self.ensure_available(amount)?;
        self.balance -= amount;
        Ok(())
    }

    pub fn credit(&mut self, amount: Amount) {
        self.balance = self.balance.saturating_add(amount).min(MAX_AMOUNT);
    }
}
