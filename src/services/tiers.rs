use serde::Serialize;
use std::cmp::Ordering;

use crate::models::{DisplayScore, StarRating};

/// Closed score band of one star tier
///
/// Every tier owns a fixed slice of the 1.0 to 10.0 display scale, and a title's
/// display score always sits inside the band of its star rating:
///
/// | Stars | Band        |
/// |-------|-------------|
/// | 5     | 9.5 - 10.0  |
/// | 4     | 8.0 - 9.4   |
/// | 3     | 6.0 - 7.9   |
/// | 2     | 4.0 - 5.9   |
/// | 1     | 1.0 - 3.9   |
///
/// Bands are disjoint and exactly one tenth apart, so comparing two scores from
/// different tiers always agrees with comparing their tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreBand {
    pub min: DisplayScore,
    pub max: DisplayScore,
}

impl ScoreBand {
    pub fn contains(&self, score: DisplayScore) -> bool {
        self.min <= score && score <= self.max
    }

    /// Pulls `score` to the nearest end of the band when it falls outside
    pub fn clamp(&self, score: DisplayScore) -> DisplayScore {
        score.clamp_to(self.min, self.max)
    }
}

impl StarRating {
    /// Score band assigned to this tier
    pub fn band(self) -> ScoreBand {
        let (min, max) = match self.get() {
            5 => (95, 100),
            4 => (80, 94),
            3 => (60, 79),
            2 => (40, 59),
            _ => (10, 39),
        };
        ScoreBand {
            min: DisplayScore::from_tenths(min),
            max: DisplayScore::from_tenths(max),
        }
    }
}

/// Orders two tiers by where they sit in a list
///
/// Higher star ratings are listed first, so `Less` means a title rated `a` belongs
/// above every title rated `b`. This is the reverse of the natural order on
/// `StarRating`, which compares by the number of stars.
pub fn compare_tiers(a: StarRating, b: StarRating) -> Ordering {
    b.cmp(&a)
}
