use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, FieldErrors};
use crate::models::matching::MatchStatus;
use crate::models::rating::{MAX_COMMENT_LEN, Rating, average_stars};
use crate::models::shipment::ShipmentStatus;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRatingRequest {
    pub shipment_id: Uuid,
    pub rated_user_id: Uuid,
    pub stars: u8,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RatingsForUser {
    pub user_id: Uuid,
    pub average: f64,
    pub count: usize,
    pub ratings: Vec<Rating>,
}

pub fn create(
    state: &AppState,
    rater_id: Uuid,
    req: CreateRatingRequest,
    now: DateTime<Utc>,
) -> Result<Rating, AppError> {
    let mut errors = FieldErrors::new();
    errors.check(
        (1..=5).contains(&req.stars),
        "stars",
        "stars must be between 1 and 5",
    );
    errors.check(
        req.comment.chars().count() <= MAX_COMMENT_LEN,
        "comment",
        "comment must be at most 500 characters",
    );
    errors.check(
        req.rated_user_id != rater_id,
        "rated_user_id",
        "you cannot rate yourself",
    );
    errors.into_result()?;

    let shipment = state
        .shipments
        .get(&req.shipment_id)
        .map(|s| s.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("shipment {} not found", req.shipment_id)))?;
    if shipment.status != ShipmentStatus::Delivered {
        return Err(AppError::Conflict(
            "ratings open once the shipment is delivered".to_string(),
        ));
    }

    let traveler_id = state
        .matches
        .iter()
        .find(|m| m.shipment_id == shipment.id && m.status == MatchStatus::Accepted)
        .map(|m| m.traveler_id)
        .ok_or_else(|| AppError::Conflict("shipment has no accepted match".to_string()))?;

    let expected_other = if rater_id == shipment.sender_id {
        traveler_id
    } else if rater_id == traveler_id {
        shipment.sender_id
    } else {
        return Err(AppError::Forbidden(
            "only the sender and the traveler can rate this shipment".to_string(),
        ));
    };
    if req.rated_user_id != expected_other {
        return Err(AppError::BadRequest(
            "you can only rate the other party of the shipment".to_string(),
        ));
    }

    let rating = Rating {
        id: Uuid::new_v4(),
        rater_id,
        rated_user_id: req.rated_user_id,
        shipment_id: shipment.id,
        stars: req.stars,
        comment: req.comment.trim().to_string(),
        created_at: now,
    };

    let average = {
        let _guard = state.transaction();
        let duplicate = state.ratings.iter().any(|r| {
            r.rater_id == rater_id
                && r.rated_user_id == rating.rated_user_id
                && r.shipment_id == rating.shipment_id
        });
        if duplicate {
            return Err(AppError::Conflict(
                "you already rated this user for this shipment".to_string(),
            ));
        }
        state.ratings.insert(rating.id, rating.clone());

        let average = average_stars(
            state
                .ratings
                .iter()
                .filter(|r| r.rated_user_id == rating.rated_user_id)
                .map(|r| r.stars),
        );
        if let Some(mut rated) = state.users.get_mut(&rating.rated_user_id) {
            rated.rating = average;
            rated.updated_at = now;
        }
        average
    };

    info!(
        rating_id = %rating.id,
        rated_user_id = %rating.rated_user_id,
        stars = rating.stars,
        average,
        "rating recorded"
    );
    Ok(rating)
}

pub fn received(state: &AppState, user_id: Uuid) -> RatingsForUser {
    let mut ratings: Vec<Rating> = state
        .ratings
        .iter()
        .filter(|r| r.rated_user_id == user_id)
        .map(|r| r.value().clone())
        .collect();
    ratings.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    RatingsForUser {
        user_id,
        average: average_stars(ratings.iter().map(|r| r.stars)),
        count: ratings.len(),
        ratings,
    }
}

pub fn given(state: &AppState, rater_id: Uuid) -> Vec<Rating> {
    let mut ratings: Vec<Rating> = state
        .ratings
        .iter()
        .filter(|r| r.rater_id == rater_id)
        .map(|r| r.value().clone())
        .collect();
    ratings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    ratings
}
