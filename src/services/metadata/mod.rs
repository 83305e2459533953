/// Content metadata lookup
///
/// The ranking engine only needs catalogue attributes (genres, year, creator,
/// franchise) to decide which existing title to put in front of the user next. Lookups
/// go through a `ContentProvider` so the catalogue source can be swapped or stubbed.
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{ContentRecord, ContentType},
    services::similarity::similarity,
};

pub mod tmdb;

pub use tmdb::TmdbProvider;

/// Trait for catalogue metadata sources
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ContentProvider: Send + Sync {
    /// Resolves one title; `AppError::NotFound` when the catalogue has no such id
    async fn resolve_content(
        &self,
        external_id: &str,
        content_type: ContentType,
    ) -> AppResult<ContentRecord>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Similarity of each candidate to `new_item`, keyed by external id.
///
/// Candidates are resolved in parallel. A candidate whose lookup fails is left out of
/// the map and so counts as dissimilar; ordering hints are never worth failing a
/// placement over.
pub async fn similarity_map(
    provider: Arc<dyn ContentProvider>,
    new_item: &ContentRecord,
    candidate_ids: Vec<String>,
) -> HashMap<String, f64> {
    let content_type = new_item.content_type;
    let mut tasks = Vec::with_capacity(candidate_ids.len());

    for id in candidate_ids {
        let provider = provider.clone();
        tasks.push(tokio::spawn(async move {
            let record = provider.resolve_content(&id, content_type).await;
            (id, record)
        }));
    }

    let mut scores = HashMap::new();
    let mut failures = 0usize;

    for task in tasks {
        match task.await {
            Ok((id, Ok(record))) => {
                scores.insert(id, similarity(new_item, &record));
            }
            Ok((id, Err(e))) => {
                failures += 1;
                tracing::warn!(
                    content_item_id = %id,
                    error = %e,
                    "Metadata lookup failed for candidate"
                );
            }
            Err(e) => {
                failures += 1;
                tracing::error!(error = %e, "Metadata task join error");
            }
        }
    }

    if failures > 0 {
        tracing::warn!(
            provider = provider.name(),
            resolved = scores.len(),
            failed = failures,
            "Partial metadata for comparison ordering"
        );
    }

    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use chrono::Utc;

    fn record(id: &str, genres: &[&str]) -> ContentRecord {
        ContentRecord {
            external_id: id.to_string(),
            content_type: ContentType::Movie,
            title: format!("Title {}", id),
            genres: genres.iter().map(|g| g.to_string()).collect(),
            year: None,
            creator: None,
            franchise_id: None,
            cached_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_similarity_map_skips_failed_lookups() {
        let mut provider = MockContentProvider::new();
        provider
            .expect_resolve_content()
            .returning(|id, _| match id {
                "1" => Ok(record("1", &["Drama"])),
                "2" => Ok(record("2", &["Comedy"])),
                other => Err(AppError::NotFound(other.to_string())),
            });
        provider.expect_name().return_const("mock");

        let new_item = record("new", &["Drama"]);
        let scores = similarity_map(
            Arc::new(provider),
            &new_item,
            vec!["1".to_string(), "2".to_string(), "3".to_string()],
        )
        .await;

        assert_eq!(scores.len(), 2);
        assert!(scores["1"] > scores["2"]);
        assert!(!scores.contains_key("3"));
    }

    #[tokio::test]
    async fn test_similarity_map_with_no_candidates() {
        let provider = MockContentProvider::new();
        let new_item = record("new", &["Drama"]);
        let scores = similarity_map(Arc::new(provider), &new_item, vec![]).await;
        assert!(scores.is_empty());
    }
}
