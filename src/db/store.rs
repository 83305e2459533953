use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{ContentType, DisplayScore, RankUpdate, RankedItem},
};

/// Order and tiers of one list as the engine read it
///
/// Every multi-row write carries the stamp of the snapshot it was computed from. Under
/// the list's write lock the store rebuilds the stamp from the stored rows and refuses
/// the write with `AppError::Conflict` when the two differ, so a change computed against
/// an outdated order or outdated tiers is never applied. Scores are not part of the
/// stamp: the repair pass may rewrite them between a read and a write without
/// invalidating it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListStamp(Vec<(String, u32, u8)>);

impl ListStamp {
    /// Stamp of a list ordered by `rank_position`
    pub fn of(items: &[RankedItem]) -> Self {
        Self(
            items
                .iter()
                .map(|item| {
                    (
                        item.content_item_id.clone(),
                        item.rank_position,
                        item.star_rating.get(),
                    )
                })
                .collect(),
        )
    }

    /// Stamp from raw `(content_item_id, rank_position, star_rating)` rows
    pub fn from_rows(rows: Vec<(String, u32, u8)>) -> Self {
        Self(rows)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fails with `Conflict` unless `current` is the list this stamp was taken from
    pub fn verify(&self, current: &ListStamp) -> AppResult<()> {
        if self != current {
            return Err(AppError::Conflict(format!(
                "list changed since it was read ({} items then, {} now)",
                self.len(),
                current.len()
            )));
        }
        Ok(())
    }
}

/// Durable record store abstraction
///
/// The ranking engine reads a snapshot of one ordered list, decides what must change,
/// and hands the whole change to the store as one write together with the snapshot's
/// [`ListStamp`]. A store must check the stamp while holding the list's write lock and
/// must apply either all of a write or none of it.
#[async_trait::async_trait]
pub trait RankStore: Send + Sync {
    /// Items of one list, ordered by `rank_position` ascending
    async fn list(&self, user_id: Uuid, content_type: ContentType) -> AppResult<Vec<RankedItem>>;

    /// Looks one title up in one of the user's lists
    async fn find(
        &self,
        user_id: Uuid,
        content_type: ContentType,
        content_item_id: &str,
    ) -> AppResult<Option<RankedItem>>;

    /// Shifts every row at or below `item.rank_position` down by one and inserts `item`
    async fn insert_at(&self, item: &RankedItem, snapshot: &ListStamp) -> AppResult<()>;

    /// Applies position, score and rating changes to existing rows in one transaction
    async fn apply_batch(
        &self,
        user_id: Uuid,
        content_type: ContentType,
        updates: &[RankUpdate],
        snapshot: &ListStamp,
    ) -> AppResult<()>;

    /// Deletes a row and closes the gap it leaves; `None` when it did not exist
    async fn delete(
        &self,
        user_id: Uuid,
        content_type: ContentType,
        content_item_id: &str,
    ) -> AppResult<Option<RankedItem>>;

    /// Single-row score write used by the repair pass
    async fn update_score(
        &self,
        user_id: Uuid,
        content_type: ContentType,
        content_item_id: &str,
        score: DisplayScore,
    ) -> AppResult<()>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}
