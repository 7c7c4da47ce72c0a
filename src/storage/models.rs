use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// Predicted price movement of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a resolved signal. A pending signal has no result at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalResult {
    Win,
    Loss,
}

impl SignalResult {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalResult::Win => "win",
            SignalResult::Loss => "loss",
        }
    }
}

impl FromStr for SignalResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "win" => Ok(SignalResult::Win),
            "loss" => Ok(SignalResult::Loss),
            other => Err(format!("unknown result: {other}")),
        }
    }
}

impl fmt::Display for SignalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User record. `password` holds the stored credential hash and is never serialized.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i32,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: String,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub id: i32,
    pub user_id: Option<i32>,
    pub currency_pair: String,
    pub direction: Direction,
    #[serde(with = "time::serde::rfc3339")]
    pub entry_time: OffsetDateTime,
    pub expiration_minutes: i32,
    pub result: Option<SignalResult>,
    pub win_amount: Option<f32>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewSignal {
    pub user_id: Option<i32>,
    pub currency_pair: String,
    pub direction: Direction,
    pub entry_time: OffsetDateTime,
    pub expiration_minutes: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Testimonial {
    pub id: i32,
    pub user_id: Option<i32>,
    pub user_name: Option<String>,
    pub content: String,
    pub rating: i32,
    pub is_approved: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Input for a new testimonial; it is always stored unapproved.
#[derive(Debug, Clone)]
pub struct NewTestimonial {
    pub user_id: Option<i32>,
    pub user_name: Option<String>,
    pub content: String,
    pub rating: i32,
}

/// Id of the one and only statistics row.
pub const STATISTICS_ID: i32 = 1;

/// Singleton aggregate over all signals.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Statistic {
    pub id: i32,
    pub total_signals: i32,
    pub win_count: i32,
    pub loss_count: i32,
    pub daily_average: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
}
