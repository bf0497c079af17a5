use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub const MAX_COMMENT_LEN: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Rating {
    pub id: Uuid,
    pub rater_id: Uuid,
    pub rated_user_id: Uuid,
    pub shipment_id: Uuid,
    pub stars: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// Mean of the given star counts, rounded to two decimals. Zero when empty.
pub fn average_stars<I>(stars: I) -> f64
where
    I: IntoIterator<Item = u8>,
{
    let (sum, count) = stars
        .into_iter()
        .fold((0u32, 0u32), |(sum, count), s| (sum + s as u32, count + 1));
    if count == 0 {
        return 0.0;
    }
    (sum as f64 / count as f64 * 100.0).round() / 100.0
}
