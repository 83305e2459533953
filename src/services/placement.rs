use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{ContentType, DisplayScore, RankedItem, StarRating},
    services::tiers::compare_tiers,
};

/// The user's answer to one comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
    NewIsBetter,
    ExistingIsBetter,
}

/// An existing same-tier title the new title may be compared against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierCandidate {
    pub content_item_id: String,
    pub display_score: DisplayScore,
    #[serde(default)]
    pub similarity: f64,
}

/// The two titles put in front of the user for one comparison
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidatePair<'a> {
    pub new_item: &'a str,
    pub existing: &'a TierCandidate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    AwaitingComparison { candidate: usize },
    Complete { tier_rank: u32 },
}

/// What is being placed
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementRequest {
    pub user_id: Uuid,
    pub content_type: ContentType,
    pub content_item_id: String,
    pub star_rating: StarRating,
}

/// Outcome of a finished search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub tier_rank: u32,
    pub global_position: u32,
    pub comparisons_needed: u32,
}

/// Resumable binary-insertion search over one tier
///
/// A title is only ever compared against titles sharing its star rating. The user is
/// shown one existing title at a time and picks the better of the two; each answer
/// shrinks the open range `low..high`. The global position is then the number of
/// titles in strictly higher tiers plus the rank inside the tier.
///
/// The flow is:
/// 1. [`PlacementSession::begin`] (or `begin_with_similarity`) yields a session that
///    is either already complete or awaiting a comparison
/// 2. Each [`PlacementSession::advance`] applies one answer
/// 3. [`PlacementSession::resolution`] reports the tier rank and global position
///
/// A tier of `n` titles needs at most `ceil(log2(n + 1))` answers, with or without
/// similarity hints: hints only choose among candidates that keep that bound.
///
/// The session is plain data that the caller keeps between answers. It may come back
/// altered, so [`PlacementSession::validate`] runs before it is advanced or committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementSession {
    pub user_id: Uuid,
    pub content_type: ContentType,
    pub content_item_id: String,
    pub star_rating: StarRating,
    /// Titles in strictly higher tiers when the session began
    pub higher_tier_count: u32,
    /// Same-tier titles, best first
    pub tier_items: Vec<TierCandidate>,
    pub low: usize,
    pub high: usize,
    pub comparisons: u32,
    pub state: SessionState,
}

impl PlacementSession {
    /// Starts a search with no similarity hints (pure midpoint selection)
    pub fn begin(request: PlacementRequest, list: &[RankedItem]) -> Self {
        Self::begin_with_similarity(request, list, |_| 0.0)
    }

    /// Starts a search over `list`, the user's current ordered list for the content type.
    ///
    /// The title being placed is left out of its own tier, so re-rating an already
    /// ranked title works the same way as rating a new one.
    pub fn begin_with_similarity<F>(
        request: PlacementRequest,
        list: &[RankedItem],
        similarity: F,
    ) -> Self
    where
        F: Fn(&RankedItem) -> f64,
    {
        let others = list.iter().filter(|item| {
            item.user_id == request.user_id
                && item.content_type == request.content_type
                && item.content_item_id != request.content_item_id
        });

        let mut higher_tier_count = 0u32;
        let mut tier: Vec<&RankedItem> = Vec::new();
        for item in others {
            match compare_tiers(item.star_rating, request.star_rating) {
                Ordering::Less => higher_tier_count += 1,
                Ordering::Equal => tier.push(item),
                Ordering::Greater => {}
            }
        }

        // Score order tolerates earlier manual reordering inside the tier
        tier.sort_by(|a, b| {
            b.display_score
                .cmp(&a.display_score)
                .then_with(|| a.rank_position.cmp(&b.rank_position))
        });

        let tier_items: Vec<TierCandidate> = tier
            .into_iter()
            .map(|item| TierCandidate {
                content_item_id: item.content_item_id.clone(),
                display_score: item.display_score,
                similarity: similarity(item),
            })
            .collect();

        let high = tier_items.len();
        let mut session = Self {
            user_id: request.user_id,
            content_type: request.content_type,
            content_item_id: request.content_item_id,
            star_rating: request.star_rating,
            higher_tier_count,
            tier_items,
            low: 0,
            high,
            comparisons: 0,
            state: SessionState::Complete { tier_rank: 1 },
        };
        session.state = session.next_state();

        tracing::debug!(
            content_item_id = %session.content_item_id,
            star_rating = %session.star_rating,
            tier_size = session.tier_items.len(),
            higher_tier_count = session.higher_tier_count,
            "Placement started"
        );

        session
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, SessionState::Complete { .. })
    }

    /// The comparison the user must answer next, if any
    pub fn candidate_pair(&self) -> Option<CandidatePair<'_>> {
        match self.state {
            SessionState::AwaitingComparison { candidate } => {
                self.tier_items.get(candidate).map(|existing| CandidatePair {
                    new_item: &self.content_item_id,
                    existing,
                })
            }
            SessionState::Complete { .. } => None,
        }
    }

    /// Applies one answer and returns the advanced session
    pub fn advance(mut self, choice: Choice) -> AppResult<Self> {
        let candidate = match self.state {
            SessionState::AwaitingComparison { candidate } => candidate,
            SessionState::Complete { .. } => {
                return Err(AppError::InvalidInput(
                    "placement is already complete".to_string(),
                ))
            }
        };

        self.validate()?;

        match choice {
            Choice::NewIsBetter => self.high = candidate,
            Choice::ExistingIsBetter => self.low = candidate + 1,
        }
        self.comparisons += 1;
        self.state = self.next_state();

        Ok(self)
    }

    /// Where the title lands, once the search is complete
    ///
    /// `None` while a comparison is pending, and also for a session whose counters do
    /// not add up (see [`PlacementSession::validate`]).
    pub fn resolution(&self) -> Option<Resolution> {
        match self.state {
            SessionState::Complete { tier_rank } => Some(Resolution {
                tier_rank,
                global_position: self.higher_tier_count.checked_add(tier_rank)?,
                comparisons_needed: self.comparisons,
            }),
            SessionState::AwaitingComparison { .. } => None,
        }
    }

    /// Checks a session that travelled through a client before it is trusted
    ///
    /// The open range must satisfy `low <= high <= tier size` and a pending candidate
    /// must lie inside it. A complete session must have closed the range with
    /// `tier_rank == low + 1`. Every position the session could still resolve to
    /// must fit in a `u32`.
    pub fn validate(&self) -> AppResult<()> {
        let tier_len = self.tier_items.len();
        let inconsistent = || {
            AppError::InvalidInput(format!(
                "inconsistent placement session (low={}, high={}, tier={}, state={:?})",
                self.low, self.high, tier_len, self.state
            ))
        };

        if self.low > self.high || self.high > tier_len {
            return Err(inconsistent());
        }
        u32::try_from(tier_len + 1)
            .ok()
            .and_then(|last_rank| self.higher_tier_count.checked_add(last_rank))
            .ok_or_else(inconsistent)?;

        match self.state {
            SessionState::AwaitingComparison { candidate } => {
                if candidate < self.low || candidate >= self.high {
                    return Err(inconsistent());
                }
            }
            SessionState::Complete { tier_rank } => {
                let expected = u32::try_from(self.low + 1).map_err(|_| inconsistent())?;
                if self.low != self.high || tier_rank != expected {
                    return Err(inconsistent());
                }
            }
        }

        Ok(())
    }

    fn next_state(&self) -> SessionState {
        if self.low >= self.high {
            SessionState::Complete {
                tier_rank: self.low as u32 + 1,
            }
        } else {
            SessionState::AwaitingComparison {
                candidate: self.pick_candidate(),
            }
        }
    }

    /// Midpoint of the open range, nudged toward the most similar title nearby.
    ///
    /// For an open range of `m` titles, with `k = ceil(log2(m + 1))` answers left,
    /// a candidate is eligible only when either answer leaves at most `2^(k-1) - 1`
    /// titles open, so similarity never costs an extra comparison. Eligibility is
    /// further limited to a quarter of the range around the midpoint. The midpoint
    /// itself always qualifies.
    fn pick_candidate(&self) -> usize {
        let span = self.high - self.low;
        let mid = self.low + span / 2;
        if span < 2 {
            return mid;
        }

        let answers_left = usize::BITS - span.leading_zeros();
        let half = 1usize << (answers_left - 1);
        let radius = span / 4;

        let first = (mid - radius).max(self.low + (span - half));
        let last = (mid + radius).min(self.low + half - 1);

        (first..=last)
            .max_by(|&a, &b| {
                let sa = self.tier_items[a].similarity;
                let sb = self.tier_items[b].similarity;
                sa.partial_cmp(&sb)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| mid.abs_diff(b).cmp(&mid.abs_diff(a)))
            })
            .unwrap_or(mid)
    }
}

/// Runs a whole search, asking `decide` for every comparison
pub fn resolve_position<F>(
    request: PlacementRequest,
    list: &[RankedItem],
    mut decide: F,
) -> AppResult<Resolution>
where
    F: FnMut(CandidatePair<'_>) -> Choice,
{
    let mut session = PlacementSession::begin(request, list);
    loop {
        if let Some(resolution) = session.resolution() {
            return Ok(resolution);
        }
        let choice = match session.candidate_pair() {
            Some(pair) => decide(pair),
            None => {
                return Err(AppError::Internal(
                    "placement awaiting a comparison without a candidate".to_string(),
                ))
            }
        };
        session = session.advance(choice)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Uuid {
        Uuid::from_u128(7)
    }

    fn item(id: &str, star: i64, position: u32, score: i32) -> RankedItem {
        RankedItem {
            user_id: user(),
            content_item_id: id.to_string(),
            content_type: ContentType::Movie,
            star_rating: StarRating::try_from(star).unwrap(),
            rank_position: position,
            display_score: DisplayScore::from_tenths(score),
        }
    }

    fn request(id: &str, star: i64) -> PlacementRequest {
        PlacementRequest {
            user_id: user(),
            content_type: ContentType::Movie,
            content_item_id: id.to_string(),
            star_rating: StarRating::try_from(star).unwrap(),
        }
    }

    /// A tier of `n` four-star titles with scores 9.4, 9.3, ...
    fn four_star_tier(n: usize) -> Vec<RankedItem> {
        (0..n)
            .map(|i| item(&format!("t{}", i), 4, i as u32 + 1, 94 - i as i32))
            .collect()
    }

    #[test]
    fn test_empty_tier_completes_immediately() {
        let session = PlacementSession::begin(request("new", 5), &[]);
        assert!(session.is_complete());
        assert_eq!(
            session.resolution(),
            Some(Resolution {
                tier_rank: 1,
                global_position: 1,
                comparisons_needed: 0
            })
        );
    }

    #[test]
    fn test_global_position_counts_higher_tiers() {
        let list = vec![item("a", 5, 1, 98), item("b", 3, 2, 70)];
        let resolution =
            resolve_position(request("new", 4), &list, |_| Choice::NewIsBetter).unwrap();
        assert_eq!(resolution.tier_rank, 1);
        assert_eq!(resolution.global_position, 2);
        assert_eq!(resolution.comparisons_needed, 0);
    }

    #[test]
    fn test_single_comparison_new_is_better() {
        let list = vec![item("a", 5, 1, 98)];
        let session = PlacementSession::begin(request("new", 5), &list);
        let pair = session.candidate_pair().unwrap();
        assert_eq!(pair.new_item, "new");
        assert_eq!(pair.existing.content_item_id, "a");

        let session = session.advance(Choice::NewIsBetter).unwrap();
        let resolution = session.resolution().unwrap();
        assert_eq!(resolution.tier_rank, 1);
        assert_eq!(resolution.global_position, 1);
        assert_eq!(resolution.comparisons_needed, 1);
    }

    #[test]
    fn test_finds_every_slot_within_log_bound() {
        for n in 0..=20usize {
            let list = four_star_tier(n);
            let bound = (usize::BITS - n.leading_zeros()) as u32; // ceil(log2(n + 1))
            for target in 0..=n {
                // the new title belongs just before index `target`
                let resolution = resolve_position(request("new", 4), &list, |pair| {
                    let index: usize = pair.existing.content_item_id[1..].parse().unwrap();
                    if index >= target {
                        Choice::NewIsBetter
                    } else {
                        Choice::ExistingIsBetter
                    }
                })
                .unwrap();
                assert_eq!(resolution.tier_rank as usize, target + 1);
                assert!(resolution.comparisons_needed <= bound, "n={} target={}", n, target);
            }
        }
    }

    #[test]
    fn test_only_same_tier_titles_are_compared() {
        let list = vec![
            item("five", 5, 1, 99),
            item("four-a", 4, 2, 90),
            item("four-b", 4, 3, 85),
            item("two", 2, 4, 50),
        ];
        let mut seen = Vec::new();
        resolve_position(request("new", 4), &list, |pair| {
            seen.push(pair.existing.content_item_id.clone());
            Choice::ExistingIsBetter
        })
        .unwrap();
        assert!(seen.iter().all(|id| id.starts_with("four")));
    }

    #[test]
    fn test_item_being_reranked_is_excluded() {
        let list = vec![item("a", 3, 1, 75), item("b", 3, 2, 70)];
        let session = PlacementSession::begin(request("a", 3), &list);
        assert_eq!(session.tier_items.len(), 1);
        assert_eq!(session.tier_items[0].content_item_id, "b");
    }

    #[test]
    fn test_tier_sorted_by_score_not_position() {
        let list = vec![item("low", 3, 1, 61), item("high", 3, 2, 79)];
        let session = PlacementSession::begin(request("new", 3), &list);
        assert_eq!(session.tier_items[0].content_item_id, "high");
    }

    #[test]
    fn test_advance_after_complete_is_rejected() {
        let session = PlacementSession::begin(request("new", 1), &[]);
        assert!(matches!(
            session.advance(Choice::NewIsBetter),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_tampered_session_is_rejected() {
        let list = four_star_tier(3);
        let mut session = PlacementSession::begin(request("new", 4), &list);
        session.high = 10;
        assert!(session.advance(Choice::NewIsBetter).is_err());
    }

    #[test]
    fn test_similarity_biases_candidate_near_midpoint() {
        let list = four_star_tier(8);
        // midpoint is 4, radius 2: indices 2..=6 are eligible
        let session = PlacementSession::begin_with_similarity(request("new", 4), &list, |item| {
            if item.content_item_id == "t5" {
                0.9
            } else if item.content_item_id == "t0" {
                1.0
            } else {
                0.0
            }
        });
        assert_eq!(
            session.candidate_pair().unwrap().existing.content_item_id,
            "t5"
        );
    }

    /// Answers every comparison as if the new title belongs just before `target`
    fn drive(mut session: PlacementSession, target: usize) -> Resolution {
        while let Some(pair) = session.candidate_pair() {
            let index: usize = pair.existing.content_item_id[1..].parse().unwrap();
            let choice = if index >= target {
                Choice::NewIsBetter
            } else {
                Choice::ExistingIsBetter
            };
            session = session.advance(choice).unwrap();
        }
        session.resolution().unwrap()
    }

    #[test]
    fn test_similarity_never_costs_an_extra_comparison() {
        let biases: [fn(usize) -> f64; 3] = [
            |index| index as f64,
            |index| -(index as f64),
            |index| if index % 3 == 0 { 1.0 } else { 0.0 },
        ];

        for n in 0..=40usize {
            let list = four_star_tier(n);
            let bound = (usize::BITS - n.leading_zeros()) as u32;
            for bias in biases {
                for target in 0..=n {
                    let session =
                        PlacementSession::begin_with_similarity(request("new", 4), &list, |item| {
                            bias(item.content_item_id[1..].parse().unwrap())
                        });
                    let resolution = drive(session, target);
                    assert_eq!(resolution.tier_rank as usize, target + 1);
                    assert!(
                        resolution.comparisons_needed <= bound,
                        "n={} target={} took {}",
                        n,
                        target,
                        resolution.comparisons_needed
                    );
                }
            }
        }
    }

    #[test]
    fn test_complete_session_with_overflowing_count_is_rejected() {
        let mut session = PlacementSession::begin(request("new", 4), &four_star_tier(4));
        session.low = 4;
        session.high = 4;
        session.state = SessionState::Complete { tier_rank: 5 };
        session.higher_tier_count = u32::MAX;

        assert_eq!(session.resolution(), None);
        assert!(matches!(session.validate(), Err(AppError::InvalidInput(_))));

        session.higher_tier_count = 2;
        session.validate().unwrap();
        assert_eq!(session.resolution().unwrap().global_position, 7);
    }

    #[test]
    fn test_pending_session_with_overflowing_count_cannot_advance() {
        let mut session = PlacementSession::begin(request("new", 4), &four_star_tier(3));
        session.higher_tier_count = u32::MAX - 1;
        assert!(matches!(
            session.advance(Choice::NewIsBetter),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_complete_session_outside_its_tier_is_rejected() {
        let mut session = PlacementSession::begin(request("new", 4), &four_star_tier(2));
        session.low = 3;
        session.high = 3;
        session.state = SessionState::Complete { tier_rank: 4 };
        assert!(session.validate().is_err());

        // rank disagreeing with the closed range
        session.low = 1;
        session.high = 1;
        session.state = SessionState::Complete { tier_rank: 2 };
        session.validate().unwrap();
        session.state = SessionState::Complete { tier_rank: 1 };
        assert!(session.validate().is_err());
    }

    #[test]
    fn test_session_survives_serialization() {
        let list = four_star_tier(4);
        let session = PlacementSession::begin(request("new", 4), &list);
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"state\":\"awaiting_comparison\""));

        let restored: PlacementSession = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, session);
        let restored = restored.advance(Choice::ExistingIsBetter).unwrap();
        assert_eq!(restored.comparisons, 1);
    }
}
