use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use uuid::Uuid;

use super::{ContentType, DisplayScore, StarRating};
use crate::error::AppError;

/// One user's placement of one content item within a content type's ordered list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    pub user_id: Uuid,
    /// External catalogue id (TMDB)
    pub content_item_id: String,
    pub content_type: ContentType,
    pub star_rating: StarRating,
    /// 1-indexed, dense within (user, content type)
    pub rank_position: u32,
    pub display_score: DisplayScore,
}

/// A single row change inside an atomic batch
#[derive(Debug, Clone, PartialEq)]
pub struct RankUpdate {
    pub content_item_id: String,
    pub rank_position: u32,
    pub display_score: DisplayScore,
    pub star_rating: StarRating,
}

impl From<&RankedItem> for RankUpdate {
    fn from(item: &RankedItem) -> Self {
        Self {
            content_item_id: item.content_item_id.clone(),
            rank_position: item.rank_position,
            display_score: item.display_score,
            star_rating: item.star_rating,
        }
    }
}

/// Raw `ranked_items` row as PostgreSQL returns it
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RankedItemRow {
    pub user_id: Uuid,
    pub content_item_id: String,
    pub content_type: String,
    pub star_rating: i16,
    pub rank_position: i32,
    pub display_score: BigDecimal,
}

impl TryFrom<RankedItemRow> for RankedItem {
    type Error = AppError;

    fn try_from(row: RankedItemRow) -> Result<Self, Self::Error> {
        let content_type = row.content_type.parse::<ContentType>()?;
        let star_rating = StarRating::try_from(i64::from(row.star_rating))?;
        let rank_position = u32::try_from(row.rank_position).map_err(|_| {
            AppError::Internal(format!("negative rank position {}", row.rank_position))
        })?;
        let display_score = score_from_decimal(&row.display_score)?;

        Ok(RankedItem {
            user_id: row.user_id,
            content_item_id: row.content_item_id,
            content_type,
            star_rating,
            rank_position,
            display_score,
        })
    }
}

/// Decodes a NUMERIC(3,1) column into tenths
pub fn score_from_decimal(value: &BigDecimal) -> Result<DisplayScore, AppError> {
    let (tenths, _) = value.with_scale(1).into_bigint_and_exponent();
    let tenths = i32::try_from(tenths)
        .map_err(|_| AppError::Internal(format!("display score {} out of range", value)))?;

    if !(DisplayScore::FLOOR.tenths()..=DisplayScore::CEILING.tenths()).contains(&tenths) {
        return Err(AppError::Internal(format!(
            "display score {} outside 1.0-10.0",
            value
        )));
    }
    Ok(DisplayScore::from_tenths(tenths))
}

/// Encodes a score for a NUMERIC(3,1) column
pub fn score_to_decimal(score: DisplayScore) -> BigDecimal {
    BigDecimal::new(i64::from(score.tenths()).into(), 1)
}
