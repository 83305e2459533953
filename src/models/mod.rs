use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

use crate::error::AppError;

mod content;
mod ranked_item;
mod rating;

pub use content::{ContentRecord, TmdbMovie, TmdbShow};
pub use ranked_item::{score_from_decimal, score_to_decimal, RankUpdate, RankedItem, RankedItemRow};
pub use rating::{DisplayScore, StarRating};

/// Kind of content; each user keeps one independent ordered list per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Movie,
    Show,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Movie => "movie",
            ContentType::Show => "show",
        }
    }
}

impl Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(ContentType::Movie),
            "show" => Ok(ContentType::Show),
            other => Err(AppError::InvalidInput(format!(
                "unknown content type '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_display_round_trips() {
        for content_type in [ContentType::Movie, ContentType::Show] {
            let parsed: ContentType = content_type.to_string().parse().unwrap();
            assert_eq!(parsed, content_type);
        }
    }

    #[test]
    fn test_content_type_serialization() {
        assert_eq!(serde_json::to_string(&ContentType::Show).unwrap(), "\"show\"");
        assert!("series".parse::<ContentType>().is_err());
    }
}
