use sqlx::FromRow;
use time::OffsetDateTime;

use super::error::StorageError;
use super::models::Signal;

/// Raw `signals` row; enum columns are stored as text.
#[derive(Debug, FromRow)]
pub struct SignalRow {
    pub id: i32,
    pub user_id: Option<i32>,
    pub currency_pair: String,
    pub direction: String,
    pub entry_time: OffsetDateTime,
    pub expiration_minutes: i32,
    pub result: Option<String>,
    pub win_amount: Option<f32>,
    pub created_at: OffsetDateTime,
}

impl TryFrom<SignalRow> for Signal {
    type Error = StorageError;

    fn try_from(r: SignalRow) -> Result<Self, Self::Error> {
        let direction = r.direction.parse().map_err(StorageError::Corrupt)?;
        let result = r
            .result
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(StorageError::Corrupt)?;
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            currency_pair: r.currency_pair,
            direction,
            entry_time: r.entry_time,
            expiration_minutes: r.expiration_minutes,
            result,
            win_amount: r.win_amount,
            created_at: r.created_at,
        })
    }
}

/// Output of the single counting query behind statistics recomputation.
#[derive(Debug, FromRow)]
pub struct SignalCountsRow {
    pub total: i64,
    pub win_count: i64,
    pub loss_count: i64,
    pub recent: i64,
}
