use serde::Deserialize;

pub const MAX_LIMIT: i64 = 100;

/// `?limit=` query. Each route supplies its own default.
#[derive(Debug, Default, Deserialize)]
pub struct Limit {
    pub limit: Option<i64>,
}

impl Limit {
    pub fn or(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, MAX_LIMIT)
    }
}
