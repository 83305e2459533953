use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::error::AppError;

/// A validated star rating, 1 through 5
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct StarRating(u8);

impl StarRating {
    pub const MIN: StarRating = StarRating(1);
    pub const MAX: StarRating = StarRating(5);

    pub fn get(self) -> u8 {
        self.0
    }

    /// The next tier up, saturating at 5★
    pub fn one_above(self) -> StarRating {
        StarRating((self.0 + 1).min(Self::MAX.0))
    }

    /// Every rating from 5★ down to 1★
    pub fn descending() -> impl Iterator<Item = StarRating> {
        (Self::MIN.0..=Self::MAX.0).rev().map(StarRating)
    }
}

impl TryFrom<i64> for StarRating {
    type Error = AppError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (1..=5).contains(&value) {
            Ok(StarRating(value as u8))
        } else {
            Err(AppError::InvalidStarRating(value))
        }
    }
}

impl TryFrom<u8> for StarRating {
    type Error = AppError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        StarRating::try_from(i64::from(value))
    }
}

impl From<StarRating> for u8 {
    fn from(rating: StarRating) -> Self {
        rating.0
    }
}

impl Display for StarRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}★", self.0)
    }
}

/// A display score held in tenths of a point (1.0 is 10, 10.0 is 100).
///
/// All score arithmetic is done on tenths so midpoints, offsets and repair steps are
/// exact. On the wire it is a plain decimal number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct DisplayScore(u8);

impl DisplayScore {
    pub const FLOOR: DisplayScore = DisplayScore(10);
    pub const CEILING: DisplayScore = DisplayScore(100);

    /// Builds a score from tenths, clamped into 1.0..=10.0
    pub fn from_tenths(tenths: i32) -> Self {
        DisplayScore(tenths.clamp(Self::FLOOR.0 as i32, Self::CEILING.0 as i32) as u8)
    }

    pub fn tenths(self) -> i32 {
        i32::from(self.0)
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / 10.0
    }

    /// Midpoint of two scores, rounded half up to one decimal
    pub fn midpoint(a: DisplayScore, b: DisplayScore) -> DisplayScore {
        DisplayScore::from_tenths((a.tenths() + b.tenths() + 1) / 2)
    }

    /// Shifts the score by a signed number of tenths, saturating at 1.0 and 10.0
    pub fn offset(self, tenths: i32) -> DisplayScore {
        DisplayScore::from_tenths(self.tenths() + tenths)
    }

    pub fn clamp_to(self, min: DisplayScore, max: DisplayScore) -> DisplayScore {
        self.max(min).min(max)
    }
}

impl TryFrom<f64> for DisplayScore {
    type Error = AppError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() || !(1.0..=10.0).contains(&value) {
            return Err(AppError::InvalidInput(format!(
                "display score {} outside 1.0-10.0",
                value
            )));
        }
        Ok(DisplayScore((value * 10.0).round() as u8))
    }
}

impl From<DisplayScore> for f64 {
    fn from(score: DisplayScore) -> Self {
        score.as_f64()
    }
}

impl Display for DisplayScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_rating_accepts_one_through_five() {
        for value in 1..=5i64 {
            assert_eq!(StarRating::try_from(value).unwrap().get() as i64, value);
        }
    }

    #[test]
    fn test_star_rating_rejects_out_of_range() {
        assert!(matches!(
            StarRating::try_from(0i64),
            Err(AppError::InvalidStarRating(0))
        ));
        assert!(matches!(
            StarRating::try_from(6u8),
            Err(AppError::InvalidStarRating(6))
        ));
        assert!(serde_json::from_str::<StarRating>("9").is_err());
    }

    #[test]
    fn test_star_rating_descending_order() {
        let ratings: Vec<u8> = StarRating::descending().map(StarRating::get).collect();
        assert_eq!(ratings, vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_midpoint_rounds_half_up() {
        let a = DisplayScore::from_tenths(98);
        let b = DisplayScore::from_tenths(70);
        assert_eq!(DisplayScore::midpoint(a, b), DisplayScore::from_tenths(84));

        let c = DisplayScore::from_tenths(81);
        let d = DisplayScore::from_tenths(80);
        assert_eq!(DisplayScore::midpoint(c, d), DisplayScore::from_tenths(81));
    }

    #[test]
    fn test_offset_saturates() {
        assert_eq!(DisplayScore::CEILING.offset(2), DisplayScore::CEILING);
        assert_eq!(DisplayScore::FLOOR.offset(-3), DisplayScore::FLOOR);
    }

    #[test]
    fn test_score_serializes_as_decimal() {
        let score = DisplayScore::from_tenths(84);
        assert_eq!(serde_json::to_string(&score).unwrap(), "8.4");
        assert_eq!(score.to_string(), "8.4");

        let parsed: DisplayScore = serde_json::from_str("9.8").unwrap();
        assert_eq!(parsed.tenths(), 98);
    }

    #[test]
    fn test_score_rejects_out_of_range() {
        assert!(DisplayScore::try_from(0.5).is_err());
        assert!(DisplayScore::try_from(f64::NAN).is_err());
    }
}
