//! Persistence for users, signals, testimonials and the statistics snapshot.
//!
//! Everything goes through the [`Storage`] trait. `PgStorage` is the durable
//! backend; `MemStorage` is a volatile single-process fallback used when no
//! database is configured. Both honour the same contract.

mod error;
mod memory;
pub mod models;
mod postgres;
mod repo_types;

use async_trait::async_trait;

pub use error::{rejection, StorageResult};
pub use memory::MemStorage;
pub use models::{
    Direction, NewSignal, NewTestimonial, NewUser, Signal, SignalResult, Statistic, Testimonial,
    User,
};
pub use postgres::PgStorage;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Short backend name for logs and the health endpoint.
    fn backend(&self) -> &'static str;

    async fn get_user(&self, id: i32) -> StorageResult<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> StorageResult<Option<User>>;
    /// Fails with `StorageError::UsernameTaken` if the username exists.
    async fn create_user(&self, user: NewUser) -> StorageResult<User>;
    /// Stamps `last_login` with the current time. `false` if the user is unknown.
    async fn update_user_last_login(&self, id: i32) -> StorageResult<bool>;

    /// Inserts a pending signal, then recomputes statistics before returning.
    /// An owner that does not exist fails with `StorageError::UnknownUser`.
    async fn create_signal(&self, signal: NewSignal) -> StorageResult<Signal>;
    async fn get_signal_by_id(&self, id: i32) -> StorageResult<Option<Signal>>;
    /// Newest first (`created_at`, then `id`), at most `limit` rows.
    async fn get_recent_signals(&self, limit: i64) -> StorageResult<Vec<Signal>>;
    /// Resolves a pending signal and recomputes statistics.
    ///
    /// Returns `None` for an unknown id without touching statistics. Repeating
    /// the stored result is a no-op; a different result is rejected with
    /// `StorageError::AlreadyResolved`. `win_amount` is only written when given.
    async fn update_signal_result(
        &self,
        id: i32,
        result: SignalResult,
        win_amount: Option<f32>,
    ) -> StorageResult<Option<Signal>>;
    async fn get_user_signals(&self, user_id: i32, limit: i64) -> StorageResult<Vec<Signal>>;

    async fn get_statistics(&self) -> StorageResult<Option<Statistic>>;
    /// Rescans all signals and upserts the singleton row (id 1).
    async fn update_statistics(&self) -> StorageResult<Statistic>;

    /// Always stored unapproved. The optional author must be an existing user.
    async fn create_testimonial(&self, testimonial: NewTestimonial) -> StorageResult<Testimonial>;
    async fn get_approved_testimonials(&self, limit: i64) -> StorageResult<Vec<Testimonial>>;
    /// `false` if the testimonial is unknown. Approving twice is fine.
    async fn approve_testimonial(&self, id: i32) -> StorageResult<bool>;
}
