use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use time::OffsetDateTime;
use tracing::debug;

use super::error::{StorageError, StorageResult};
use super::models::{
    NewSignal, NewTestimonial, NewUser, Signal, SignalResult, Statistic, Testimonial, User,
    STATISTICS_ID,
};
use super::repo_types::{SignalCountsRow, SignalRow};
use super::Storage;
use crate::statistics::aggregator::{self, clamp_count};

const USER_COLUMNS: &str =
    "id, username, password, email, full_name, role, is_active, created_at, last_login";
const SIGNAL_COLUMNS: &str = "id, user_id, currency_pair, direction, entry_time, \
     expiration_minutes, result, win_amount, created_at";
const TESTIMONIAL_COLUMNS: &str =
    "id, user_id, user_name, content, rating, is_approved, created_at";
const STATISTIC_COLUMNS: &str =
    "id, total_signals, win_count, loss_count, daily_average, last_updated";

/// Advisory lock key guarding statistics recomputation.
const STATISTICS_LOCK: i64 = 0x5349_4753;

/// Durable backend on PostgreSQL.
#[derive(Clone)]
pub struct PgStorage {
    db: PgPool,
}

impl PgStorage {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { db })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .context("run migrations")?;
        Ok(())
    }
}

/// Maps a foreign-key failure on the owning user to `UnknownUser`.
fn owner_error(e: sqlx::Error, user_id: Option<i32>) -> StorageError {
    if let (sqlx::Error::Database(db), Some(id)) = (&e, user_id) {
        if db.is_foreign_key_violation() {
            return StorageError::UnknownUser(id);
        }
    }
    e.into()
}

fn into_signals(rows: Vec<SignalRow>) -> StorageResult<Vec<Signal>> {
    rows.into_iter().map(Signal::try_from).collect()
}

#[async_trait]
impl Storage for PgStorage {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn get_user(&self, id: i32) -> StorageResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> StorageResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> StorageResult<User> {
        let inserted = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, password, email, full_name)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.username)
        .bind(&user.password)
        .bind(&user.email)
        .bind(&user.full_name)
        .fetch_one(&self.db)
        .await;

        match inserted {
            Ok(u) => Ok(u),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StorageError::UsernameTaken(user.username))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_user_last_login(&self, id: i32) -> StorageResult<bool> {
        let res = sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(id)
            .bind(OffsetDateTime::now_utc())
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn create_signal(&self, signal: NewSignal) -> StorageResult<Signal> {
        let row = sqlx::query_as::<_, SignalRow>(&format!(
            r#"
            INSERT INTO signals (user_id, currency_pair, direction, entry_time, expiration_minutes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {SIGNAL_COLUMNS}
            "#
        ))
        .bind(signal.user_id)
        .bind(&signal.currency_pair)
        .bind(signal.direction.as_str())
        .bind(signal.entry_time)
        .bind(signal.expiration_minutes)
        .fetch_one(&self.db)
        .await
        .map_err(|e| owner_error(e, signal.user_id))?;
        let created = Signal::try_from(row)?;

        self.update_statistics().await?;
        Ok(created)
    }

    async fn get_signal_by_id(&self, id: i32) -> StorageResult<Option<Signal>> {
        sqlx::query_as::<_, SignalRow>(&format!(
            "SELECT {SIGNAL_COLUMNS} FROM signals WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .map(Signal::try_from)
        .transpose()
    }

    async fn get_recent_signals(&self, limit: i64) -> StorageResult<Vec<Signal>> {
        let sql = format!(
            r#"
            SELECT {SIGNAL_COLUMNS}
            FROM signals
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#
        );
        let rows = sqlx::query_as::<_, SignalRow>(&sql)
            .bind(limit.max(0))
            .fetch_all(&self.db)
            .await?;
        into_signals(rows)
    }

    async fn update_signal_result(
        &self,
        id: i32,
        result: SignalResult,
        win_amount: Option<f32>,
    ) -> StorageResult<Option<Signal>> {
        // Only a pending row matches; anything else is sorted out below.
        let updated = sqlx::query_as::<_, SignalRow>(&format!(
            r#"
            UPDATE signals
            SET result = $2, win_amount = COALESCE($3, win_amount)
            WHERE id = $1 AND result IS NULL
            RETURNING {SIGNAL_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(result.as_str())
        .bind(win_amount)
        .fetch_optional(&self.db)
        .await?
        .map(Signal::try_from)
        .transpose()?;

        if let Some(signal) = updated {
            self.update_statistics().await?;
            return Ok(Some(signal));
        }

        match self.get_signal_by_id(id).await? {
            None => Ok(None),
            Some(existing) => match existing.result {
                Some(current) if current == result => Ok(Some(existing)),
                Some(current) => Err(StorageError::AlreadyResolved { id, current }),
                None => Err(StorageError::Corrupt(format!(
                    "signal {id} is pending but rejected the update"
                ))),
            },
        }
    }

    async fn get_user_signals(&self, user_id: i32, limit: i64) -> StorageResult<Vec<Signal>> {
        let sql = format!(
            r#"
            SELECT {SIGNAL_COLUMNS}
            FROM signals
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#
        );
        let rows = sqlx::query_as::<_, SignalRow>(&sql)
            .bind(user_id)
            .bind(limit.max(0))
            .fetch_all(&self.db)
            .await?;
        into_signals(rows)
    }

    async fn get_statistics(&self) -> StorageResult<Option<Statistic>> {
        let stat = sqlx::query_as::<_, Statistic>(&format!(
            "SELECT {STATISTIC_COLUMNS} FROM statistics WHERE id = $1"
        ))
        .bind(STATISTICS_ID)
        .fetch_optional(&self.db)
        .await?;
        Ok(stat)
    }

    async fn update_statistics(&self) -> StorageResult<Statistic> {
        let mut tx = self.db.begin().await?;
        // Recomputations queue up here; each one counts after the previous has committed.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(STATISTICS_LOCK)
            .execute(&mut *tx)
            .await?;

        let now = OffsetDateTime::now_utc();
        let counts = sqlx::query_as::<_, SignalCountsRow>(
            r#"
            SELECT COUNT(*)                                  AS total,
                   COUNT(*) FILTER (WHERE result = 'win')    AS win_count,
                   COUNT(*) FILTER (WHERE result = 'loss')   AS loss_count,
                   COUNT(*) FILTER (WHERE created_at > $1)   AS recent
            FROM signals
            "#,
        )
        .bind(aggregator::window_start(now))
        .fetch_one(&mut *tx)
        .await?;

        let total = clamp_count(counts.total);
        let wins = clamp_count(counts.win_count);
        let losses = clamp_count(counts.loss_count);
        let daily_average = aggregator::daily_average(counts.recent);

        let stat = sqlx::query_as::<_, Statistic>(&format!(
            r#"
            INSERT INTO statistics (id, total_signals, win_count, loss_count, daily_average, last_updated)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET total_signals = EXCLUDED.total_signals,
                win_count = EXCLUDED.win_count,
                loss_count = EXCLUDED.loss_count,
                daily_average = EXCLUDED.daily_average,
                last_updated = EXCLUDED.last_updated
            RETURNING {STATISTIC_COLUMNS}
            "#
        ))
        .bind(STATISTICS_ID)
        .bind(total)
        .bind(wins)
        .bind(losses)
        .bind(daily_average)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(total, wins, losses, daily_average, "statistics recomputed");
        Ok(stat)
    }

    async fn create_testimonial(&self, testimonial: NewTestimonial) -> StorageResult<Testimonial> {
        let created = sqlx::query_as::<_, Testimonial>(&format!(
            r#"
            INSERT INTO testimonials (user_id, user_name, content, rating, is_approved)
            VALUES ($1, $2, $3, $4, FALSE)
            RETURNING {TESTIMONIAL_COLUMNS}
            "#
        ))
        .bind(testimonial.user_id)
        .bind(&testimonial.user_name)
        .bind(&testimonial.content)
        .bind(testimonial.rating)
        .fetch_one(&self.db)
        .await
        .map_err(|e| owner_error(e, testimonial.user_id))?;
        Ok(created)
    }

    async fn get_approved_testimonials(&self, limit: i64) -> StorageResult<Vec<Testimonial>> {
        let rows = sqlx::query_as::<_, Testimonial>(&format!(
            r#"
            SELECT {TESTIMONIAL_COLUMNS}
            FROM testimonials
            WHERE is_approved = TRUE
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#
        ))
        .bind(limit.max(0))
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn approve_testimonial(&self, id: i32) -> StorageResult<bool> {
        let res = sqlx::query("UPDATE testimonials SET is_approved = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
