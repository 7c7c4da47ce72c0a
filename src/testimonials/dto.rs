use serde::{Deserialize, Serialize};

use crate::storage::NewTestimonial;

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTestimonialRequest {
    pub user_id: Option<i32>,
    pub user_name: Option<String>,
    pub content: Option<String>,
    pub rating: Option<i32>,
}

impl CreateTestimonialRequest {
    /// Trims the text fields and checks the rating range.
    pub fn validate(self) -> Result<NewTestimonial, String> {
        let content = self.content.as_deref().map(str::trim).unwrap_or_default();
        if content.is_empty() {
            return Err("content must not be empty".into());
        }
        let rating = self.rating.ok_or("rating is required")?;
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(format!("rating must be between {MIN_RATING} and {MAX_RATING}"));
        }
        let user_name = self
            .user_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        Ok(NewTestimonial {
            user_id: self.user_id,
            user_name,
            content: content.to_string(),
            rating,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    pub success: bool,
}
