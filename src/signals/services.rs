use rand::Rng;
use time::{Duration, OffsetDateTime};

use super::dto::{GenerateSignalRequest, UpdateResultRequest};
use crate::storage::{Direction, NewSignal, SignalResult};

/// Minutes between generation and the suggested entry.
const ENTRY_DELAY_MINUTES: std::ops::RangeInclusive<i64> = 1..=2;

pub fn random_direction<R: Rng + ?Sized>(rng: &mut R) -> Direction {
    if rng.gen_bool(0.5) {
        Direction::Up
    } else {
        Direction::Down
    }
}

pub fn entry_time<R: Rng + ?Sized>(now: OffsetDateTime, rng: &mut R) -> OffsetDateTime {
    now + Duration::minutes(rng.gen_range(ENTRY_DELAY_MINUTES))
}

/// Checks the generate request and returns `(currency_pair, expiration_minutes)`.
pub fn validate_generate(req: &GenerateSignalRequest) -> Result<(String, i32), String> {
    let pair = req
        .currency_pair
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or("currencyPair and expirationMinutes are required")?;
    let minutes = req
        .expiration_minutes
        .ok_or("currencyPair and expirationMinutes are required")?;
    if minutes <= 0 {
        return Err("expirationMinutes must be positive".into());
    }
    Ok((pair.to_string(), minutes))
}

pub fn validate_result(req: &UpdateResultRequest) -> Result<SignalResult, String> {
    req.result
        .as_deref()
        .ok_or_else(|| "result is required (win or loss)".to_string())?
        .parse()
        .map_err(|_| "result must be win or loss".to_string())
}

/// Builds a fresh pending signal with a coin-flip direction.
pub fn build_signal<R: Rng + ?Sized>(
    currency_pair: String,
    expiration_minutes: i32,
    owner: Option<i32>,
    now: OffsetDateTime,
    rng: &mut R,
) -> NewSignal {
    NewSignal {
        user_id: owner,
        currency_pair,
        direction: random_direction(rng),
        entry_time: entry_time(now, rng),
        expiration_minutes,
    }
}
