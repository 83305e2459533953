use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    db::store::{ListStamp, RankStore},
    error::{AppError, AppResult},
    models::{ContentType, DisplayScore, RankUpdate, RankedItem},
};

/// Write primitives that can be made to fail on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOp {
    InsertAt,
    ApplyBatch,
    Delete,
    UpdateScore,
}

type ListKey = (Uuid, ContentType);

/// In-process record store.
///
/// Every write is staged on a copy of the list and swapped in only once the copy is a
/// dense `1..N` permutation, so a rejected write leaves nothing behind.
#[derive(Default)]
pub struct InMemoryRankStore {
    lists: RwLock<HashMap<ListKey, Vec<RankedItem>>>,
    failing: Mutex<HashSet<WriteOp>>,
}

impl InMemoryRankStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a list as-is, without any validation
    pub async fn seed(&self, items: Vec<RankedItem>) {
        let mut lists = self.lists.write().await;
        for item in items {
            let list = lists
                .entry((item.user_id, item.content_type))
                .or_default();
            list.push(item);
            list.sort_by_key(|i| i.rank_position);
        }
    }

    /// Makes every subsequent `op` fail until cleared
    pub fn fail(&self, op: WriteOp) {
        self.failing_ops().insert(op);
    }

    pub fn clear_failures(&self) {
        self.failing_ops().clear();
    }

    fn failing_ops(&self) -> std::sync::MutexGuard<'_, HashSet<WriteOp>> {
        // a poisoned set only holds test switches
        self.failing.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_injected(&self, op: WriteOp) -> AppResult<()> {
        if self.failing_ops().contains(&op) {
            return Err(AppError::PersistenceFailure(format!(
                "injected failure on {:?}",
                op
            )));
        }
        Ok(())
    }
}

fn check_stamp(list: &[RankedItem], snapshot: &ListStamp) -> AppResult<()> {
    snapshot.verify(&ListStamp::of(list))
}

/// Sorts the staged copy and verifies positions are exactly 1..=N
fn finalize(mut staged: Vec<RankedItem>) -> AppResult<Vec<RankedItem>> {
    staged.sort_by_key(|item| item.rank_position);
    for (index, item) in staged.iter().enumerate() {
        if item.rank_position as usize != index + 1 {
            return Err(AppError::PersistenceFailure(format!(
                "positions would not be dense: {} at index {}",
                item.rank_position, index
            )));
        }
    }
    Ok(staged)
}

#[async_trait::async_trait]
impl RankStore for InMemoryRankStore {
    async fn list(&self, user_id: Uuid, content_type: ContentType) -> AppResult<Vec<RankedItem>> {
        let lists = self.lists.read().await;
        Ok(lists
            .get(&(user_id, content_type))
            .cloned()
            .unwrap_or_default())
    }

    async fn find(
        &self,
        user_id: Uuid,
        content_type: ContentType,
        content_item_id: &str,
    ) -> AppResult<Option<RankedItem>> {
        let lists = self.lists.read().await;
        Ok(lists
            .get(&(user_id, content_type))
            .and_then(|items| {
                items
                    .iter()
                    .find(|item| item.content_item_id == content_item_id)
            })
            .cloned())
    }

    async fn insert_at(&self, item: &RankedItem, snapshot: &ListStamp) -> AppResult<()> {
        self.check_injected(WriteOp::InsertAt)?;
        let mut lists = self.lists.write().await;

        let current = lists
            .get(&(item.user_id, item.content_type))
            .map(Vec::as_slice)
            .unwrap_or_default();
        if current
            .iter()
            .any(|existing| existing.content_item_id == item.content_item_id)
        {
            return Err(AppError::AlreadyRanked(item.content_item_id.clone()));
        }
        check_stamp(current, snapshot)?;

        let mut staged = current.to_vec();
        // descending, so no two rows ever share a position
        for existing in staged.iter_mut().rev() {
            if existing.rank_position >= item.rank_position {
                existing.rank_position += 1;
            }
        }
        staged.push(item.clone());
        let staged = finalize(staged)?;

        lists.insert((item.user_id, item.content_type), staged);
        Ok(())
    }

    async fn apply_batch(
        &self,
        user_id: Uuid,
        content_type: ContentType,
        updates: &[RankUpdate],
        snapshot: &ListStamp,
    ) -> AppResult<()> {
        self.check_injected(WriteOp::ApplyBatch)?;
        let mut lists = self.lists.write().await;

        let current = lists
            .get(&(user_id, content_type))
            .map(Vec::as_slice)
            .unwrap_or_default();
        check_stamp(current, snapshot)?;

        let mut staged = current.to_vec();
        for update in updates {
            let row = staged
                .iter_mut()
                .find(|item| item.content_item_id == update.content_item_id)
                .ok_or_else(|| {
                    AppError::PersistenceFailure(format!(
                        "no row for {}",
                        update.content_item_id
                    ))
                })?;
            row.rank_position = update.rank_position;
            row.display_score = update.display_score;
            row.star_rating = update.star_rating;
        }
        let staged = finalize(staged)?;

        lists.insert((user_id, content_type), staged);
        Ok(())
    }

    async fn delete(
        &self,
        user_id: Uuid,
        content_type: ContentType,
        content_item_id: &str,
    ) -> AppResult<Option<RankedItem>> {
        self.check_injected(WriteOp::Delete)?;
        let mut lists = self.lists.write().await;

        let Some(current) = lists.get(&(user_id, content_type)) else {
            return Ok(None);
        };
        let Some(index) = current
            .iter()
            .position(|item| item.content_item_id == content_item_id)
        else {
            return Ok(None);
        };

        let mut staged = current.clone();
        let removed = staged.remove(index);
        for item in staged.iter_mut() {
            if item.rank_position > removed.rank_position {
                item.rank_position -= 1;
            }
        }
        let staged = finalize(staged)?;

        lists.insert((user_id, content_type), staged);
        Ok(Some(removed))
    }

    async fn update_score(
        &self,
        user_id: Uuid,
        content_type: ContentType,
        content_item_id: &str,
        score: DisplayScore,
    ) -> AppResult<()> {
        self.check_injected(WriteOp::UpdateScore)?;
        let mut lists = self.lists.write().await;

        let row = lists
            .get_mut(&(user_id, content_type))
            .and_then(|items| {
                items
                    .iter_mut()
                    .find(|item| item.content_item_id == content_item_id)
            })
            .ok_or_else(|| AppError::NotFound(content_item_id.to_string()))?;
        row.display_score = score;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
