use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::{ListStamp, RankStore},
    error::{AppError, AppResult, RankingWarning},
    models::{ContentType, DisplayScore, RankUpdate, RankedItem, StarRating},
    services::{
        metadata::{similarity_map, ContentProvider},
        placement::{PlacementRequest, PlacementSession},
    },
};

/// Drop below the item above when a title lands at the bottom of the list, in tenths
const BOTTOM_STEP: i32 = 3;
/// Offset from the only neighbour after a manual move, in tenths
const MOVE_STEP: i32 = 2;
/// Gap the repair pass opens between an inverted pair, in tenths
const REPAIR_STEP: i32 = 1;

/// One score rewritten by the repair pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreCorrection {
    pub content_item_id: String,
    pub rank_position: u32,
    pub from: DisplayScore,
    pub to: DisplayScore,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RepairReport {
    pub corrected: Vec<ScoreCorrection>,
    pub failures: Vec<RankingWarning>,
}

/// Result of a mutating operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationOutcome {
    /// The inserted or moved item as it stands after repair
    pub item: RankedItem,
    pub warnings: Vec<RankingWarning>,
    pub repair: RepairReport,
}

/// A broken list invariant, as found by [`check_invariants`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "invariant", rename_all = "snake_case")]
pub enum InvariantViolation {
    PositionDensity {
        content_item_id: String,
        expected: u32,
        found: u32,
    },
    TierOrdering {
        above: String,
        below: String,
    },
    ScoreOrdering {
        above: String,
        below: String,
    },
    ScoreBanding {
        content_item_id: String,
        score: DisplayScore,
    },
}

/// Keeps a user's ordered list consistent under insertion, reordering and deletion
///
/// Every mutation follows the same flow:
/// 1. Read one snapshot of the list from the store
/// 2. Compute the complete change in memory (position, star rating, display score)
/// 3. Hand it to the store as a single atomic write stamped with the snapshot's
///    [`ListStamp`], so a change computed from an outdated list fails with `Conflict`
/// 4. Run the monotonicity repair pass (after inserts, re-rates and moves)
///
/// A catalogue provider is optional. With one, unknown titles are rejected when a
/// placement begins and comparisons are steered toward similar titles.
pub struct RankingEngine {
    store: Arc<dyn RankStore>,
    content: Option<Arc<dyn ContentProvider>>,
}

impl RankingEngine {
    pub fn new(store: Arc<dyn RankStore>) -> Self {
        Self {
            store,
            content: None,
        }
    }

    /// Uses catalogue metadata to order comparisons by similarity
    pub fn with_content_provider(mut self, provider: Arc<dyn ContentProvider>) -> Self {
        self.content = Some(provider);
        self
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        content_type: ContentType,
    ) -> AppResult<Vec<RankedItem>> {
        self.store.list(user_id, content_type).await
    }

    /// Starts the comparison protocol for a newly rated (or re-rated) title
    ///
    /// With a catalogue provider configured:
    /// 1. The new title is resolved; an unknown title fails with `NotFound`
    /// 2. Same-tier titles are resolved in parallel and scored for similarity
    /// 3. The session is built with those scores as comparison hints
    ///
    /// A catalogue outage is not an error here. The session then falls back to plain
    /// midpoint comparisons.
    pub async fn begin_placement(&self, request: PlacementRequest) -> AppResult<PlacementSession> {
        let list = self.store.list(request.user_id, request.content_type).await?;

        let Some(provider) = &self.content else {
            return Ok(PlacementSession::begin(request, &list));
        };

        // unknown titles are rejected; an unreachable catalogue only costs the ordering hint
        let new_record = match provider
            .resolve_content(&request.content_item_id, request.content_type)
            .await
        {
            Ok(record) => record,
            Err(e @ (AppError::NotFound(_) | AppError::InvalidInput(_))) => return Err(e),
            Err(e) => {
                tracing::warn!(
                    provider = provider.name(),
                    content_item_id = %request.content_item_id,
                    error = %e,
                    "Metadata unavailable, comparing by midpoint only"
                );
                return Ok(PlacementSession::begin(request, &list));
            }
        };

        let candidate_ids: Vec<String> = list
            .iter()
            .filter(|item| {
                item.star_rating == request.star_rating
                    && item.content_item_id != request.content_item_id
            })
            .map(|item| item.content_item_id.clone())
            .collect();

        let scores: HashMap<String, f64> = if candidate_ids.len() > 1 {
            similarity_map(provider.clone(), &new_record, candidate_ids).await
        } else {
            HashMap::new()
        };

        Ok(PlacementSession::begin_with_similarity(request, &list, |item| {
            scores.get(&item.content_item_id).copied().unwrap_or(0.0)
        }))
    }

    /// Writes the result of a finished placement session.
    ///
    /// A title that is not ranked yet is inserted; a title already in the list is
    /// re-rated and moved to its new place.
    pub async fn commit(&self, session: &PlacementSession) -> AppResult<MutationOutcome> {
        session.validate()?;
        let resolution = session.resolution().ok_or_else(|| {
            AppError::InvalidInput("placement is still awaiting a comparison".to_string())
        })?;

        let existing = self
            .store
            .find(session.user_id, session.content_type, &session.content_item_id)
            .await?;

        match existing {
            None => {
                self.insert(
                    session.user_id,
                    session.content_type,
                    &session.content_item_id,
                    resolution.global_position,
                    session.star_rating,
                )
                .await
            }
            Some(_) => {
                self.rerate(
                    session.user_id,
                    session.content_type,
                    &session.content_item_id,
                    resolution.global_position,
                    session.star_rating,
                )
                .await
            }
        }
    }

    /// Inserts a new title at `global_position`, shifting everything below it down
    ///
    /// A position outside the title's tier is clamped into it and reported as a
    /// `TierOrderingViolation` warning. The score comes from the neighbours:
    /// - at the top of the list, the band maximum
    /// - at the bottom, 0.3 below the title above, floored at the band minimum
    /// - otherwise the midpoint of the two neighbours, clamped into the band
    #[tracing::instrument(skip(self))]
    pub async fn insert(
        &self,
        user_id: Uuid,
        content_type: ContentType,
        content_item_id: &str,
        global_position: u32,
        star_rating: StarRating,
    ) -> AppResult<MutationOutcome> {
        let list = self.store.list(user_id, content_type).await?;
        if list
            .iter()
            .any(|item| item.content_item_id == content_item_id)
        {
            return Err(AppError::AlreadyRanked(content_item_id.to_string()));
        }

        let mut warnings = Vec::new();
        let position = clamp_position(&list, star_rating, global_position, &mut warnings);
        let index = position as usize - 1;

        // `below` is the row now at `position`; the shift moves it one place down
        let above = index.checked_sub(1).and_then(|i| list.get(i));
        let below = list.get(index);
        let display_score = insertion_score(star_rating, above, below);

        let item = RankedItem {
            user_id,
            content_item_id: content_item_id.to_string(),
            content_type,
            star_rating,
            rank_position: position,
            display_score,
        };

        self.store
            .insert_at(&item, &ListStamp::of(&list))
            .await
            .map_err(AppError::into_persistence)?;

        tracing::info!(
            position,
            score = %display_score,
            star_rating = %star_rating,
            list_len = list.len() + 1,
            "Inserted ranked item"
        );

        Ok(self.finish(item, warnings).await)
    }

    /// Moves an existing title to a new star rating and position in one batch
    #[tracing::instrument(skip(self))]
    pub async fn rerate(
        &self,
        user_id: Uuid,
        content_type: ContentType,
        content_item_id: &str,
        global_position: u32,
        star_rating: StarRating,
    ) -> AppResult<MutationOutcome> {
        let list = self.store.list(user_id, content_type).await?;
        let current = list
            .iter()
            .position(|item| item.content_item_id == content_item_id)
            .ok_or_else(|| AppError::NotFound(content_item_id.to_string()))?;

        let mut order = list.clone();
        let mut item = order.remove(current);

        let mut warnings = Vec::new();
        let position = clamp_position(&order, star_rating, global_position, &mut warnings);
        let index = position as usize - 1;

        let above = index.checked_sub(1).and_then(|i| order.get(i));
        let below = order.get(index);
        let previous_rating = item.star_rating;
        item.star_rating = star_rating;
        item.display_score = insertion_score(star_rating, above, below);

        order.insert(index, item);
        let updates = renumber(&mut order);

        self.store
            .apply_batch(user_id, content_type, &updates, &ListStamp::of(&list))
            .await
            .map_err(AppError::into_persistence)?;

        let item = order.swap_remove(index);
        tracing::info!(
            from_position = current + 1,
            to_position = position,
            from_rating = %previous_rating,
            to_rating = %star_rating,
            score = %item.display_score,
            "Re-rated ranked item"
        );

        Ok(self.finish(item, warnings).await)
    }

    /// Manual drag-and-drop reorder from one position to another
    ///
    /// The dragged title adopts whatever tier its new neighbours imply (see
    /// `adjust_tier`), then takes the midpoint of their scores, or sits 0.2 beyond
    /// its only neighbour. Moving a title onto its own position changes nothing.
    #[tracing::instrument(skip(self))]
    pub async fn move_item(
        &self,
        user_id: Uuid,
        content_type: ContentType,
        from_position: u32,
        to_position: u32,
    ) -> AppResult<MutationOutcome> {
        let list = self.store.list(user_id, content_type).await?;
        let len = list.len() as u32;
        for position in [from_position, to_position] {
            if position == 0 || position > len {
                return Err(AppError::InvalidInput(format!(
                    "position {} outside 1..={}",
                    position, len
                )));
            }
        }

        if from_position == to_position {
            let item = list[from_position as usize - 1].clone();
            return Ok(MutationOutcome {
                item,
                warnings: Vec::new(),
                repair: RepairReport::default(),
            });
        }

        let mut order = list.clone();
        let mut item = order.remove(from_position as usize - 1);
        let index = to_position as usize - 1;

        let above = index.checked_sub(1).and_then(|i| order.get(i));
        let below = order.get(index);

        let star_rating = adjust_tier(item.star_rating, above, below);
        if star_rating != item.star_rating {
            tracing::info!(
                content_item_id = %item.content_item_id,
                from_rating = %item.star_rating,
                to_rating = %star_rating,
                "Tier auto-adjusted by move"
            );
        }
        item.display_score = move_score(star_rating, above, below, item.display_score);
        item.star_rating = star_rating;

        order.insert(index, item);
        let updates = renumber(&mut order);

        self.store
            .apply_batch(user_id, content_type, &updates, &ListStamp::of(&list))
            .await
            .map_err(AppError::into_persistence)?;

        let item = order.swap_remove(index);
        tracing::info!(
            from_position,
            to_position,
            score = %item.display_score,
            "Moved ranked item"
        );

        Ok(self.finish(item, Vec::new()).await)
    }

    /// Deletes a title and closes the gap; other scores are left untouched
    #[tracing::instrument(skip(self))]
    pub async fn remove(
        &self,
        user_id: Uuid,
        content_type: ContentType,
        content_item_id: &str,
    ) -> AppResult<RankedItem> {
        let removed = self
            .store
            .delete(user_id, content_type, content_item_id)
            .await
            .map_err(AppError::into_persistence)?
            .ok_or_else(|| AppError::NotFound(content_item_id.to_string()))?;

        tracing::info!(position = removed.rank_position, "Removed ranked item");
        Ok(removed)
    }

    /// Walks the list top to bottom and rewrites any score that is not below the one
    /// above it. Individual write failures are reported, not raised.
    pub async fn repair(
        &self,
        user_id: Uuid,
        content_type: ContentType,
    ) -> AppResult<RepairReport> {
        let list = self.store.list(user_id, content_type).await?;
        let mut report = RepairReport::default();

        for correction in plan_repair(&list) {
            match self
                .store
                .update_score(
                    user_id,
                    content_type,
                    &correction.content_item_id,
                    correction.to,
                )
                .await
            {
                Ok(()) => report.corrected.push(correction),
                Err(e) => {
                    let warning = RankingWarning::RepairWriteFailure {
                        content_item_id: correction.content_item_id.clone(),
                        reason: e.to_string(),
                    };
                    tracing::warn!(
                        %user_id,
                        %content_type,
                        error = %warning,
                        "Repair write failed"
                    );
                    report.failures.push(warning);
                }
            }
        }

        if !report.corrected.is_empty() {
            tracing::info!(
                %user_id,
                %content_type,
                corrected = report.corrected.len(),
                "Repaired score inversions"
            );
        }

        Ok(report)
    }

    /// Runs repair after a successful write and folds its outcome into the result
    async fn finish(
        &self,
        mut item: RankedItem,
        mut warnings: Vec<RankingWarning>,
    ) -> MutationOutcome {
        let repair = match self.repair(item.user_id, item.content_type).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "Repair pass skipped");
                RepairReport::default()
            }
        };

        if let Some(correction) = repair
            .corrected
            .iter()
            .find(|c| c.content_item_id == item.content_item_id)
        {
            item.display_score = correction.to;
        }
        warnings.extend(repair.failures.iter().cloned());

        MutationOutcome {
            item,
            warnings,
            repair,
        }
    }
}

/// Keeps a requested position inside the title's own tier.
///
/// The valid range runs from just below the last strictly-higher-tier title to just
/// below the last same-tier title.
fn clamp_position(
    list: &[RankedItem],
    star_rating: StarRating,
    requested: u32,
    warnings: &mut Vec<RankingWarning>,
) -> u32 {
    let higher = list.iter().filter(|i| i.star_rating > star_rating).count() as u32;
    let same = list.iter().filter(|i| i.star_rating == star_rating).count() as u32;
    let clamped = requested.clamp(higher + 1, higher + same + 1);

    if clamped != requested {
        let warning = RankingWarning::TierOrderingViolation { requested, clamped };
        tracing::warn!(star_rating = %star_rating, error = %warning, "Position outside its tier");
        warnings.push(warning);
    }
    clamped
}

/// Score for a title inserted between `above` and `below`
fn insertion_score(
    star_rating: StarRating,
    above: Option<&RankedItem>,
    below: Option<&RankedItem>,
) -> DisplayScore {
    let band = star_rating.band();
    let score = match (above, below) {
        (None, _) => band.max,
        (Some(a), None) => a.display_score.offset(-BOTTOM_STEP).max(band.min),
        (Some(a), Some(b)) => DisplayScore::midpoint(a.display_score, b.display_score),
    };
    band.clamp(score)
}

/// Score for a title dragged between `above` and `below`
fn move_score(
    star_rating: StarRating,
    above: Option<&RankedItem>,
    below: Option<&RankedItem>,
    current: DisplayScore,
) -> DisplayScore {
    let score = match (above, below) {
        (Some(a), Some(b)) => DisplayScore::midpoint(a.display_score, b.display_score),
        (Some(a), None) => a.display_score.offset(-MOVE_STEP),
        (None, Some(b)) => b.display_score.offset(MOVE_STEP),
        (None, None) => current,
    };
    star_rating.band().clamp(score)
}

/// Star rating a dragged title must take to sit between `above` and `below`.
///
/// Placed directly above a higher tier it joins that tier; placed under a lower tier it
/// drops to it; and it never sits more than one tier above the title below it.
fn adjust_tier(
    current: StarRating,
    above: Option<&RankedItem>,
    below: Option<&RankedItem>,
) -> StarRating {
    let mut star = current;
    if let Some(below) = below {
        if below.star_rating > star {
            star = below.star_rating;
        }
    }
    if let Some(above) = above {
        if above.star_rating < star {
            star = above.star_rating;
        }
    }
    if let Some(below) = below {
        let ceiling = below.star_rating.one_above();
        if star > ceiling {
            star = ceiling;
        }
    }
    star
}

/// Assigns positions 1..=N in list order and returns the full batch
fn renumber(order: &mut [RankedItem]) -> Vec<RankUpdate> {
    order
        .iter_mut()
        .enumerate()
        .map(|(index, item)| {
            item.rank_position = index as u32 + 1;
            RankUpdate::from(&*item)
        })
        .collect()
}

/// Score rewrites that make `list` strictly decreasing where its bands allow.
///
/// Each score is first pulled into its own band; a score not below the previous one
/// becomes `previous - 0.1`, but never less than its band's minimum or 1.0. A saturated
/// band therefore ends in a run of ties at its minimum. Applying the plan and planning
/// again yields nothing.
pub fn plan_repair(list: &[RankedItem]) -> Vec<ScoreCorrection> {
    let mut ordered: Vec<&RankedItem> = list.iter().collect();
    ordered.sort_by_key(|item| item.rank_position);

    let mut corrections = Vec::new();
    let mut previous: Option<DisplayScore> = None;

    for item in ordered {
        let band = item.star_rating.band();
        let mut score = band.clamp(item.display_score);
        if let Some(previous) = previous {
            if score >= previous {
                score = previous.offset(-REPAIR_STEP).max(band.min);
            }
        }

        if score != item.display_score {
            corrections.push(ScoreCorrection {
                content_item_id: item.content_item_id.clone(),
                rank_position: item.rank_position,
                from: item.display_score,
                to: score,
            });
        }
        previous = Some(score);
    }

    corrections
}

/// Every invariant the list currently breaks
pub fn check_invariants(list: &[RankedItem]) -> Vec<InvariantViolation> {
    let mut ordered: Vec<&RankedItem> = list.iter().collect();
    ordered.sort_by_key(|item| item.rank_position);

    let mut violations = Vec::new();

    for (index, item) in ordered.iter().enumerate() {
        let expected = index as u32 + 1;
        if item.rank_position != expected {
            violations.push(InvariantViolation::PositionDensity {
                content_item_id: item.content_item_id.clone(),
                expected,
                found: item.rank_position,
            });
        }
        if !item.star_rating.band().contains(item.display_score) {
            violations.push(InvariantViolation::ScoreBanding {
                content_item_id: item.content_item_id.clone(),
                score: item.display_score,
            });
        }
    }

    for pair in ordered.windows(2) {
        let (above, below) = (pair[0], pair[1]);
        if above.star_rating < below.star_rating {
            violations.push(InvariantViolation::TierOrdering {
                above: above.content_item_id.clone(),
                below: below.content_item_id.clone(),
            });
        }
        if above.display_score < below.display_score {
            violations.push(InvariantViolation::ScoreOrdering {
                above: above.content_item_id.clone(),
                below: below.content_item_id.clone(),
            });
        }
    }

    violations
}
