use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use uuid::Uuid;

use rankd::{
    db::{InMemoryRankStore, RankStore},
    error::{AppError, AppResult},
    models::{ContentRecord, ContentType, DisplayScore, RankedItem, StarRating},
    services::{
        ranking::{check_invariants, plan_repair},
        Choice, ContentProvider, PlacementRequest, RankingEngine,
    },
};

/// Catalogue whose genres, eras and creators overlap unevenly, so comparisons are
/// steered away from the plain midpoint
struct Catalogue;

#[async_trait::async_trait]
impl ContentProvider for Catalogue {
    async fn resolve_content(
        &self,
        external_id: &str,
        content_type: ContentType,
    ) -> AppResult<ContentRecord> {
        let id: i32 = external_id
            .parse()
            .map_err(|_| AppError::NotFound(external_id.to_string()))?;
        let genres = ["Drama", "Comedy", "Horror"];

        Ok(ContentRecord {
            external_id: external_id.to_string(),
            content_type,
            title: format!("Title {}", id),
            genres: vec![genres[(id % 3) as usize].to_string()],
            year: Some(1980 + id * 3),
            creator: Some(format!("creator-{}", id % 4)),
            franchise_id: None,
            cached_at: Utc::now(),
        })
    }

    fn name(&self) -> &'static str {
        "catalogue"
    }
}

#[derive(Debug, Clone)]
enum Op {
    Rate {
        id: u8,
        stars: i64,
        answers: Vec<bool>,
    },
    Move {
        from: usize,
        to: usize,
    },
    Remove {
        id: u8,
    },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..12, 1i64..=5, prop::collection::vec(any::<bool>(), 0..8))
            .prop_map(|(id, stars, answers)| Op::Rate { id, stars, answers }),
        3 => (any::<usize>(), any::<usize>()).prop_map(|(from, to)| Op::Move { from, to }),
        1 => (0u8..12).prop_map(|id| Op::Remove { id }),
    ]
}

/// ceil(log2(n + 1))
fn comparison_bound(n: usize) -> u32 {
    usize::BITS - n.leading_zeros()
}

fn ids(list: &[RankedItem]) -> Vec<String> {
    list.iter().map(|i| i.content_item_id.clone()).collect()
}

async fn apply(
    engine: &RankingEngine,
    user: Uuid,
    op: Op,
) -> Result<(), TestCaseError> {
    let before = engine.list(user, ContentType::Movie).await.unwrap();

    match op {
        Op::Rate { id, stars, answers } => {
            let mut session = engine
                .begin_placement(PlacementRequest {
                    user_id: user,
                    content_type: ContentType::Movie,
                    content_item_id: id.to_string(),
                    star_rating: StarRating::try_from(stars).unwrap(),
                })
                .await
                .unwrap();
            let tier_size = session.tier_items.len();

            let mut round = 0;
            while !session.is_complete() {
                let new_is_better = answers.get(round % answers.len().max(1)).copied();
                let choice = match new_is_better {
                    Some(false) => Choice::ExistingIsBetter,
                    _ => Choice::NewIsBetter,
                };
                session = session.advance(choice).unwrap();
                round += 1;
            }
            prop_assert!(session.comparisons <= comparison_bound(tier_size));

            let outcome = engine.commit(&session).await.unwrap();
            prop_assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
            prop_assert_eq!(outcome.item.star_rating.get() as i64, stars);
        }
        Op::Move { from, to } => {
            if before.is_empty() {
                return Ok(());
            }
            let len = before.len();
            let from = (from % len) as u32 + 1;
            let to = (to % len) as u32 + 1;
            let outcome = engine
                .move_item(user, ContentType::Movie, from, to)
                .await
                .unwrap();
            prop_assert_eq!(outcome.item.rank_position, to);
        }
        Op::Remove { id } => {
            let id = id.to_string();
            let result = engine.remove(user, ContentType::Movie, &id).await;
            let existed = before.iter().any(|i| i.content_item_id == id);
            match result {
                Ok(removed) => {
                    prop_assert!(existed);
                    let after = engine.list(user, ContentType::Movie).await.unwrap();
                    let untouched: Vec<(String, DisplayScore)> = before
                        .iter()
                        .filter(|i| i.content_item_id != removed.content_item_id)
                        .map(|i| (i.content_item_id.clone(), i.display_score))
                        .collect();
                    let scores: Vec<(String, DisplayScore)> = after
                        .iter()
                        .map(|i| (i.content_item_id.clone(), i.display_score))
                        .collect();
                    prop_assert_eq!(scores, untouched);
                }
                Err(AppError::NotFound(_)) => prop_assert!(!existed),
                Err(e) => return Err(TestCaseError::fail(e.to_string())),
            }
        }
    }

    let after = engine.list(user, ContentType::Movie).await.unwrap();
    prop_assert_eq!(check_invariants(&after), vec![]);
    prop_assert!(plan_repair(&after).is_empty());

    let unique: HashSet<String> = ids(&after).into_iter().collect();
    prop_assert_eq!(unique.len(), after.len());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_invariants_hold_after_every_operation(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let store = Arc::new(InMemoryRankStore::new());
        let engine = RankingEngine::new(store).with_content_provider(Arc::new(Catalogue));
        let user = Uuid::new_v4();

        for op in ops {
            tokio_test::block_on(apply(&engine, user, op))?;
        }
    }
}

fn star(value: i64) -> StarRating {
    StarRating::try_from(value).unwrap()
}

fn seeded(user: Uuid, rows: &[(&str, i64, i32)]) -> Vec<RankedItem> {
    rows.iter()
        .enumerate()
        .map(|(index, (id, stars, tenths))| RankedItem {
            user_id: user,
            content_item_id: id.to_string(),
            content_type: ContentType::Movie,
            star_rating: star(*stars),
            rank_position: index as u32 + 1,
            display_score: DisplayScore::from_tenths(*tenths),
        })
        .collect()
}

fn request(user: Uuid, id: &str, stars: i64) -> PlacementRequest {
    PlacementRequest {
        user_id: user,
        content_type: ContentType::Movie,
        content_item_id: id.to_string(),
        star_rating: star(stars),
    }
}

#[tokio::test]
async fn scenario_first_five_star_item() {
    let engine = RankingEngine::new(Arc::new(InMemoryRankStore::new()));
    let user = Uuid::new_v4();

    let session = engine.begin_placement(request(user, "a", 5)).await.unwrap();
    let resolution = session.resolution().unwrap();
    assert_eq!(resolution.tier_rank, 1);
    assert_eq!(resolution.global_position, 1);

    let outcome = engine.commit(&session).await.unwrap();
    assert_eq!(outcome.item.display_score.as_f64(), 10.0);
}

#[tokio::test]
async fn scenario_better_five_star_takes_the_top() {
    let store = Arc::new(InMemoryRankStore::new());
    let user = Uuid::new_v4();
    store.seed(seeded(user, &[("old", 5, 98)])).await;
    let engine = RankingEngine::new(store.clone());

    let session = engine
        .begin_placement(request(user, "new", 5))
        .await
        .unwrap()
        .advance(Choice::NewIsBetter)
        .unwrap();
    engine.commit(&session).await.unwrap();

    let list = store.list(user, ContentType::Movie).await.unwrap();
    assert_eq!(ids(&list), vec!["new", "old"]);
    assert_eq!(list[0].display_score.as_f64(), 10.0);
    assert_eq!(list[1].display_score.as_f64(), 9.8);
}

#[tokio::test]
async fn scenario_new_tier_between_existing_tiers() {
    let store = Arc::new(InMemoryRankStore::new());
    let user = Uuid::new_v4();
    store
        .seed(seeded(user, &[("five", 5, 98), ("three", 3, 70)]))
        .await;
    let engine = RankingEngine::new(store.clone());

    let session = engine.begin_placement(request(user, "four", 4)).await.unwrap();
    assert_eq!(session.resolution().unwrap().global_position, 2);
    engine.commit(&session).await.unwrap();

    let list = store.list(user, ContentType::Movie).await.unwrap();
    assert_eq!(ids(&list), vec!["five", "four", "three"]);
    assert_eq!(list[1].display_score.as_f64(), 8.4);
    assert_eq!(list[2].rank_position, 3);
}

#[tokio::test]
async fn scenario_drag_above_higher_tier_promotes() {
    let store = Arc::new(InMemoryRankStore::new());
    let user = Uuid::new_v4();
    store
        .seed(seeded(user, &[("four", 4, 90), ("three", 3, 75)]))
        .await;
    let engine = RankingEngine::new(store.clone());

    let outcome = engine
        .move_item(user, ContentType::Movie, 2, 1)
        .await
        .unwrap();
    assert_eq!(outcome.item.star_rating, star(4));

    let list = store.list(user, ContentType::Movie).await.unwrap();
    assert_eq!(ids(&list), vec!["three", "four"]);
    assert!(check_invariants(&list).is_empty());
}

#[tokio::test]
async fn scenario_delete_middle_item_keeps_scores() {
    let store = Arc::new(InMemoryRankStore::new());
    let user = Uuid::new_v4();
    store
        .seed(seeded(user, &[("a", 5, 99), ("b", 4, 88), ("c", 3, 71)]))
        .await;
    let engine = RankingEngine::new(store.clone());

    engine.remove(user, ContentType::Movie, "b").await.unwrap();

    let list = store.list(user, ContentType::Movie).await.unwrap();
    let rows: Vec<(String, u32, f64)> = list
        .iter()
        .map(|i| (i.content_item_id.clone(), i.rank_position, i.display_score.as_f64()))
        .collect();
    assert_eq!(
        rows,
        vec![("a".to_string(), 1, 9.9), ("c".to_string(), 2, 7.1)]
    );
}

#[tokio::test]
async fn repair_twice_equals_repair_once() {
    let store = Arc::new(InMemoryRankStore::new());
    let user = Uuid::new_v4();
    store
        .seed(seeded(
            user,
            &[("a", 5, 96), ("b", 5, 99), ("c", 4, 99), ("d", 1, 10), ("e", 1, 10)],
        ))
        .await;
    let engine = RankingEngine::new(store.clone());

    engine.repair(user, ContentType::Movie).await.unwrap();
    let once = store.list(user, ContentType::Movie).await.unwrap();
    engine.repair(user, ContentType::Movie).await.unwrap();
    let twice = store.list(user, ContentType::Movie).await.unwrap();

    assert_eq!(once, twice);
    assert!(check_invariants(&once).is_empty());
}
