use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::debug;

use super::error::{StorageError, StorageResult};
use super::models::{
    NewSignal, NewTestimonial, NewUser, Signal, SignalResult, Statistic, Testimonial, User,
    STATISTICS_ID,
};
use super::Storage;
use crate::statistics::aggregator;

#[derive(Debug)]
struct NextIds {
    users: i32,
    signals: i32,
    testimonials: i32,
}

impl Default for NextIds {
    fn default() -> Self {
        Self {
            users: 1,
            signals: 1,
            testimonials: 1,
        }
    }
}

fn take_id(counter: &mut i32) -> i32 {
    let id = *counter;
    *counter += 1;
    id
}

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<i32, User>,
    signals: BTreeMap<i32, Signal>,
    testimonials: BTreeMap<i32, Testimonial>,
    statistic: Option<Statistic>,
    next: NextIds,
}

/// Volatile in-process backend. Data lives for the lifetime of the value and
/// is not shared between processes.
#[derive(Debug, Default)]
pub struct MemStorage {
    tables: RwLock<Tables>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn ensure_user(t: &Tables, user_id: Option<i32>) -> StorageResult<()> {
    match user_id {
        Some(id) if !t.users.contains_key(&id) => Err(StorageError::UnknownUser(id)),
        _ => Ok(()),
    }
}

fn newest_first<T, K: Ord>(items: &mut [T], key: impl Fn(&T) -> K) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

fn take_limit<T>(mut items: Vec<T>, limit: i64) -> Vec<T> {
    items.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
    items
}

#[async_trait]
impl Storage for MemStorage {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get_user(&self, id: i32) -> StorageResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> StorageResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.username == username).cloned())
    }

    async fn create_user(&self, user: NewUser) -> StorageResult<User> {
        let mut t = self.tables.write().await;
        if t.users.values().any(|u| u.username == user.username) {
            return Err(StorageError::UsernameTaken(user.username));
        }
        let id = take_id(&mut t.next.users);
        let created = User {
            id,
            username: user.username,
            password: user.password,
            email: user.email,
            full_name: user.full_name,
            role: "user".into(),
            is_active: true,
            created_at: OffsetDateTime::now_utc(),
            last_login: None,
        };
        t.users.insert(id, created.clone());
        Ok(created)
    }

    async fn update_user_last_login(&self, id: i32) -> StorageResult<bool> {
        let mut t = self.tables.write().await;
        match t.users.get_mut(&id) {
            Some(u) => {
                u.last_login = Some(OffsetDateTime::now_utc());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_signal(&self, signal: NewSignal) -> StorageResult<Signal> {
        let created = {
            let mut t = self.tables.write().await;
            ensure_user(&t, signal.user_id)?;
            let id = take_id(&mut t.next.signals);
            let created = Signal {
                id,
                user_id: signal.user_id,
                currency_pair: signal.currency_pair,
                direction: signal.direction,
                entry_time: signal.entry_time,
                expiration_minutes: signal.expiration_minutes,
                result: None,
                win_amount: None,
                created_at: OffsetDateTime::now_utc(),
            };
            t.signals.insert(id, created.clone());
            created
        };

        self.update_statistics().await?;
        Ok(created)
    }

    async fn get_signal_by_id(&self, id: i32) -> StorageResult<Option<Signal>> {
        Ok(self.tables.read().await.signals.get(&id).cloned())
    }

    async fn get_recent_signals(&self, limit: i64) -> StorageResult<Vec<Signal>> {
        let mut all: Vec<Signal> = self.tables.read().await.signals.values().cloned().collect();
        newest_first(&mut all, |s| (s.created_at, s.id));
        Ok(take_limit(all, limit))
    }

    async fn update_signal_result(
        &self,
        id: i32,
        result: SignalResult,
        win_amount: Option<f32>,
    ) -> StorageResult<Option<Signal>> {
        let updated = {
            let mut t = self.tables.write().await;
            let Some(signal) = t.signals.get_mut(&id) else {
                return Ok(None);
            };
            match signal.result {
                Some(current) if current == result => return Ok(Some(signal.clone())),
                Some(current) => return Err(StorageError::AlreadyResolved { id, current }),
                None => {}
            }
            signal.result = Some(result);
            if win_amount.is_some() {
                signal.win_amount = win_amount;
            }
            signal.clone()
        };

        self.update_statistics().await?;
        Ok(Some(updated))
    }

    async fn get_user_signals(&self, user_id: i32, limit: i64) -> StorageResult<Vec<Signal>> {
        let mut owned: Vec<Signal> = self
            .tables
            .read()
            .await
            .signals
            .values()
            .filter(|s| s.user_id == Some(user_id))
            .cloned()
            .collect();
        newest_first(&mut owned, |s| (s.created_at, s.id));
        Ok(take_limit(owned, limit))
    }

    async fn get_statistics(&self) -> StorageResult<Option<Statistic>> {
        Ok(self.tables.read().await.statistic.clone())
    }

    async fn update_statistics(&self) -> StorageResult<Statistic> {
        let mut t = self.tables.write().await;
        let now = OffsetDateTime::now_utc();
        let counters = aggregator::aggregate(t.signals.values(), now);
        let stat = Statistic {
            id: STATISTICS_ID,
            total_signals: counters.total,
            win_count: counters.win_count,
            loss_count: counters.loss_count,
            daily_average: counters.daily_average,
            last_updated: now,
        };
        debug!(
            total = stat.total_signals,
            wins = stat.win_count,
            losses = stat.loss_count,
            "statistics recomputed"
        );
        t.statistic = Some(stat.clone());
        Ok(stat)
    }

    async fn create_testimonial(&self, testimonial: NewTestimonial) -> StorageResult<Testimonial> {
        let mut t = self.tables.write().await;
        ensure_user(&t, testimonial.user_id)?;
        let id = take_id(&mut t.next.testimonials);
        let created = Testimonial {
            id,
            user_id: testimonial.user_id,
            user_name: testimonial.user_name,
            content: testimonial.content,
            rating: testimonial.rating,
            is_approved: false,
            created_at: OffsetDateTime::now_utc(),
        };
        t.testimonials.insert(id, created.clone());
        Ok(created)
    }

    async fn get_approved_testimonials(&self, limit: i64) -> StorageResult<Vec<Testimonial>> {
        let mut approved: Vec<Testimonial> = self
            .tables
            .read()
            .await
            .testimonials
            .values()
            .filter(|t| t.is_approved)
            .cloned()
            .collect();
        newest_first(&mut approved, |t| (t.created_at, t.id));
        Ok(take_limit(approved, limit))
    }

    async fn approve_testimonial(&self, id: i32) -> StorageResult<bool> {
        let mut t = self.tables.write().await;
        match t.testimonials.get_mut(&id) {
            Some(testimonial) => {
                testimonial.is_approved = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Direction;
    use time::Duration;

    fn new_signal(pair: &str, user_id: Option<i32>) -> NewSignal {
        NewSignal {
            user_id,
            currency_pair: pair.into(),
            direction: Direction::Up,
            entry_time: OffsetDateTime::now_utc() + Duration::minutes(1),
            expiration_minutes: 5,
        }
    }

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.into(),
            password: "hash".into(),
            email: None,
            full_name: None,
        }
    }

    fn review(content: &str) -> NewTestimonial {
        NewTestimonial {
            user_id: None,
            user_name: Some("Ana".into()),
            content: content.into(),
            rating: 5,
        }
    }

    #[tokio::test]
    async fn fresh_store_statistics_are_zero() {
        let store = MemStorage::new();
        assert!(store.get_statistics().await.unwrap().is_none());

        let stat = store.update_statistics().await.unwrap();
        assert_eq!(stat.total_signals, 0);
        assert_eq!(stat.win_count, 0);
        assert_eq!(stat.loss_count, 0);
        assert_eq!(stat.daily_average, 0);
    }

    #[tokio::test]
    async fn six_wins_four_losses() {
        let store = MemStorage::new();
        let mut ids = Vec::new();
        for _ in 0..10 {
            ids.push(store.create_signal(new_signal("EUR/USD", None)).await.unwrap().id);
        }
        for (i, id) in ids.iter().enumerate() {
            let result = if i < 6 { SignalResult::Win } else { SignalResult::Loss };
            store.update_signal_result(*id, result, None).await.unwrap().unwrap();
        }

        let stat = store.get_statistics().await.unwrap().unwrap();
        assert_eq!(stat.total_signals, 10);
        assert_eq!(stat.win_count, 6);
        assert_eq!(stat.loss_count, 4);
        assert_eq!(stat.daily_average, 1);
    }

    #[tokio::test]
    async fn create_signal_recomputes_statistics() {
        let store = MemStorage::new();
        let owner = store.create_user(new_user("trader")).await.unwrap();
        let signal = store
            .create_signal(new_signal("USD/JPY", Some(owner.id)))
            .await
            .unwrap();
        assert_eq!(signal.user_id, Some(owner.id));
        assert!(signal.result.is_none());
        assert_eq!(signal.win_amount, None);

        let stat = store.get_statistics().await.unwrap().unwrap();
        assert_eq!(stat.total_signals, 1);
        assert_eq!(stat.id, 1);
    }

    #[tokio::test]
    async fn update_statistics_is_idempotent() {
        let store = MemStorage::new();
        let s = store.create_signal(new_signal("EUR/USD", None)).await.unwrap();
        store
            .update_signal_result(s.id, SignalResult::Win, Some(80.0))
            .await
            .unwrap();

        let first = store.update_statistics().await.unwrap();
        let second = store.update_statistics().await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(
            (first.total_signals, first.win_count, first.loss_count, first.daily_average),
            (second.total_signals, second.win_count, second.loss_count, second.daily_average)
        );
    }

    #[tokio::test]
    async fn unknown_signal_leaves_statistics_untouched() {
        let store = MemStorage::new();
        store.create_signal(new_signal("EUR/USD", None)).await.unwrap();
        let before = store.get_statistics().await.unwrap();

        let res = store
            .update_signal_result(999, SignalResult::Win, None)
            .await
            .unwrap();
        assert!(res.is_none());
        assert_eq!(store.get_statistics().await.unwrap(), before);
    }

    #[tokio::test]
    async fn resolved_signal_is_terminal() {
        let store = MemStorage::new();
        let s = store.create_signal(new_signal("GBP/USD", None)).await.unwrap();

        let won = store
            .update_signal_result(s.id, SignalResult::Win, Some(42.5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(won.result, Some(SignalResult::Win));
        assert_eq!(won.win_amount, Some(42.5));

        let again = store
            .update_signal_result(s.id, SignalResult::Win, Some(1.0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.win_amount, Some(42.5));

        let err = store
            .update_signal_result(s.id, SignalResult::Loss, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::AlreadyResolved { current: SignalResult::Win, .. }
        ));

        let stored = store.get_signal_by_id(s.id).await.unwrap().unwrap();
        assert_eq!(stored.result, Some(SignalResult::Win));
    }

    #[tokio::test]
    async fn win_amount_is_kept_when_not_given() {
        let store = MemStorage::new();
        let s = store.create_signal(new_signal("AUD/USD", None)).await.unwrap();
        let lost = store
            .update_signal_result(s.id, SignalResult::Loss, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lost.win_amount, None);
    }

    #[tokio::test]
    async fn recent_signals_are_newest_first_and_limited() {
        let store = MemStorage::new();
        for pair in ["EUR/USD", "GBP/USD", "USD/CAD", "USD/JPY", "USD/BRL"] {
            store.create_signal(new_signal(pair, None)).await.unwrap();
        }

        let recent = store.get_recent_signals(3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].currency_pair, "USD/BRL");
        assert!(recent
            .windows(2)
            .all(|w| (w[0].created_at, w[0].id) > (w[1].created_at, w[1].id)));

        assert_eq!(store.get_recent_signals(50).await.unwrap().len(), 5);
        assert!(store.get_recent_signals(0).await.unwrap().is_empty());
        assert!(store.get_recent_signals(-1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn user_signals_are_filtered_by_owner() {
        let store = MemStorage::new();
        store.create_user(new_user("first")).await.unwrap();
        store.create_user(new_user("second")).await.unwrap();
        store.create_signal(new_signal("EUR/USD", Some(1))).await.unwrap();
        store.create_signal(new_signal("GBP/USD", Some(2))).await.unwrap();
        store.create_signal(new_signal("USD/CHF", Some(1))).await.unwrap();
        store.create_signal(new_signal("NZD/USD", None)).await.unwrap();

        let mine = store.get_user_signals(1, 50).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|s| s.user_id == Some(1)));
        assert_eq!(mine[0].currency_pair, "USD/CHF");

        assert_eq!(store.get_user_signals(1, 1).await.unwrap().len(), 1);
        assert!(store.get_user_signals(3, 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_owner_is_rejected_without_side_effects() {
        let store = MemStorage::new();
        let err = store
            .create_signal(new_signal("EUR/USD", Some(999)))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UnknownUser(999)));
        assert!(store.get_recent_signals(10).await.unwrap().is_empty());
        assert!(store.get_statistics().await.unwrap().is_none());

        let mut anonymous = review("Great");
        anonymous.user_id = Some(999);
        let err = store.create_testimonial(anonymous).await.unwrap_err();
        assert!(matches!(err, StorageError::UnknownUser(999)));

        let first = store.create_testimonial(review("First")).await.unwrap();
        assert_eq!(first.id, 1);
    }

    #[tokio::test]
    async fn ids_are_monotonic() {
        let store = MemStorage::new();
        let a = store.create_signal(new_signal("EUR/USD", None)).await.unwrap();
        let b = store.create_signal(new_signal("EUR/USD", None)).await.unwrap();
        assert!(b.id > a.id);

        let t1 = store.create_testimonial(review("one")).await.unwrap();
        let t2 = store.create_testimonial(review("two")).await.unwrap();
        assert_eq!((t1.id, t2.id), (1, 2));
    }

    #[tokio::test]
    async fn users_lookup_and_login_stamp() {
        let store = MemStorage::new();
        let user = store.create_user(new_user("trader")).await.unwrap();
        assert!(user.is_active);
        assert_eq!(user.role, "user");
        assert!(user.last_login.is_none());

        let by_name = store.get_user_by_username("trader").await.unwrap().unwrap();
        assert_eq!(by_name.id, user.id);
        assert!(store.get_user_by_username("nobody").await.unwrap().is_none());
        assert!(store.get_user(99).await.unwrap().is_none());

        assert!(store.update_user_last_login(user.id).await.unwrap());
        assert!(!store.update_user_last_login(99).await.unwrap());
        let reloaded = store.get_user(user.id).await.unwrap().unwrap();
        assert!(reloaded.last_login.is_some());
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let store = MemStorage::new();
        store.create_user(new_user("trader")).await.unwrap();
        let err = store.create_user(new_user("trader")).await.unwrap_err();
        assert!(matches!(err, StorageError::UsernameTaken(name) if name == "trader"));
        assert!(store.get_user(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn testimonial_visible_only_after_approval() {
        let store = MemStorage::new();
        let older = store.create_testimonial(review("Older")).await.unwrap();
        store.approve_testimonial(older.id).await.unwrap();

        let great = store.create_testimonial(review("Great")).await.unwrap();
        assert!(!great.is_approved);
        let listed = store.get_approved_testimonials(10).await.unwrap();
        assert!(listed.iter().all(|t| t.id != great.id));

        assert!(store.approve_testimonial(great.id).await.unwrap());
        let listed = store.get_approved_testimonials(10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].content, "Great");
        assert_eq!(listed[1].content, "Older");
    }

    #[tokio::test]
    async fn approve_is_idempotent_and_unknown_is_false() {
        let store = MemStorage::new();
        let t = store.create_testimonial(review("Nice")).await.unwrap();

        assert!(!store.approve_testimonial(42).await.unwrap());
        assert!(store.get_approved_testimonials(10).await.unwrap().is_empty());

        assert!(store.approve_testimonial(t.id).await.unwrap());
        assert!(store.approve_testimonial(t.id).await.unwrap());
        let listed = store.get_approved_testimonials(10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].is_approved);
    }
}
