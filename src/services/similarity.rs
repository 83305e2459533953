use std::collections::HashSet;

use crate::models::ContentRecord;

/// Share of the score that comes from overlapping genres
const GENRE_WEIGHT: f64 = 0.4;
const ERA_WEIGHT: f64 = 0.2;
const CREATOR_WEIGHT: f64 = 0.2;
const FRANCHISE_WEIGHT: f64 = 0.2;

/// Years apart at which two titles stop counting as the same era
const ERA_SPAN_YEARS: f64 = 10.0;

/// How alike two titles are, from 0.0 (nothing shared) to 1.0
///
/// Used only to pick which existing title to show next during a comparison round;
/// it never affects where a title ends up.
///
/// The score is a weighted sum of four signals, each in [0, 1]:
/// 1. Genre overlap: Jaccard index of the case-folded genre sets (weight 0.4)
/// 2. Era: 1.0 for the same year, falling linearly to 0.0 ten years apart (0.2)
/// 3. Creator: 1.0 when director or show creator match, ignoring case (0.2)
/// 4. Franchise: 1.0 when both movies belong to the same collection (0.2)
///
/// A signal missing on either side contributes nothing.
pub fn similarity(a: &ContentRecord, b: &ContentRecord) -> f64 {
    let genres_a: HashSet<String> = a.genres.iter().map(|g| g.to_lowercase()).collect();
    let genres_b: HashSet<String> = b.genres.iter().map(|g| g.to_lowercase()).collect();
    let union = genres_a.union(&genres_b).count();
    let genre = if union == 0 {
        0.0
    } else {
        genres_a.intersection(&genres_b).count() as f64 / union as f64
    };

    let era = match (a.year, b.year) {
        (Some(x), Some(y)) => (1.0 - f64::from((x - y).abs()) / ERA_SPAN_YEARS).max(0.0),
        _ => 0.0,
    };

    let creator = match (&a.creator, &b.creator) {
        (Some(x), Some(y)) if x.eq_ignore_ascii_case(y) => 1.0,
        _ => 0.0,
    };

    let franchise = match (a.franchise_id, b.franchise_id) {
        (Some(x), Some(y)) if x == y => 1.0,
        _ => 0.0,
    };

    GENRE_WEIGHT * genre
        + ERA_WEIGHT * era
        + CREATOR_WEIGHT * creator
        + FRANCHISE_WEIGHT * franchise
}
