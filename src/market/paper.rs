use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;

use crate::data::types::InputError;
use crate::market::view::Market;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetSide {
    /// Score finishes above the threshold.
    Over,
    Under,
}

impl FromStr for BetSide {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "over" | "yes" => Ok(BetSide::Over),
            "under" | "no" => Ok(BetSide::Under),
            _ => Err(InputError::InvalidChoice {
                field: "side",
                value: s.to_string(),
                expected: "over, under",
            }),
        }
    }
}

impl std::fmt::Display for BetSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BetSide::Over => write!(f, "OVER"),
            BetSide::Under => write!(f, "UNDER"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Active,
}

/// A priced paper bet. Never settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetSlip {
    pub id: String,
    pub market_id: String,
    #[serde(rename = "type")]
    pub side: BetSide,
    pub stake: f64,
    pub odds: f64,
    pub potential_payout: f64,
    pub placed_at: DateTime<Utc>,
    pub status: BetStatus,
    /// Score the market was priced at when the bet was placed.
    pub current_score: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BetError {
    #[error("Stake must be positive, got {0:.2}")]
    NonPositiveStake(f64),

    #[error("Insufficient balance: need ${stake:.2}, have ${balance:.2}")]
    InsufficientBalance { stake: f64, balance: f64 },

    #[error("Market {0} is not open")]
    MarketInactive(String),
}

/// Odds a side pays on this market: OVER takes the quoted odds, UNDER the reciprocal.
pub fn side_odds(market: &Market, side: BetSide) -> f64 {
    match side {
        BetSide::Over => market.current_odds,
        BetSide::Under => 1.0 / market.current_odds,
    }
}

/// Play-money balance and the slips placed against it.
#[derive(Debug, Clone)]
pub struct PaperBook {
    balance: f64,
    bets: Vec<BetSlip>,
}

impl PaperBook {
    pub fn new(initial_balance: f64) -> Self {
        info!("Paper book opened with ${:.2}", initial_balance);
        Self {
            balance: initial_balance,
            bets: Vec::new(),
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn bets(&self) -> &[BetSlip] {
        &self.bets
    }

    /// Price a slip and debit the stake. Rejections leave the book untouched.
    pub fn place_bet(
        &mut self,
        market: &Market,
        side: BetSide,
        stake: f64,
        current_score: f64,
        now: DateTime<Utc>,
    ) -> Result<BetSlip, BetError> {
        if stake.is_nan() || stake <= 0.0 {
            return Err(BetError::NonPositiveStake(stake));
        }
        if stake > self.balance {
            return Err(BetError::InsufficientBalance {
                stake,
                balance: self.balance,
            });
        }
        if !market.is_open(now) {
            return Err(BetError::MarketInactive(market.id.clone()));
        }

        let odds = side_odds(market, side);
        let slip = BetSlip {
            id: format!("bet-{}-{}", now.timestamp_millis(), self.bets.len() + 1),
            market_id: market.id.clone(),
            side,
            stake,
            odds,
            potential_payout: stake * odds,
            placed_at: now,
            status: BetStatus::Active,
            current_score,
        };

        self.balance -= stake;
        self.bets.push(slip.clone());

        info!(
            "Paper bet placed: {} ${:.2} on {} @ {:.3} (potential ${:.2})",
            side, stake, market.id, odds, slip.potential_payout
        );

        Ok(slip)
    }
}
