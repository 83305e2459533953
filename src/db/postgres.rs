use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    db::store::{ListStamp, RankStore},
    error::{AppError, AppResult},
    models::{
        score_to_decimal, ContentType, DisplayScore, RankUpdate, RankedItem, RankedItemRow,
    },
};

/// Unique constraint on (user_id, content_type, content_item_id)
const ITEM_UNIQUE_CONSTRAINT: &str = "ranked_items_item_key";

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// `RankStore` over the `ranked_items` table.
///
/// Multi-row writes run in one transaction holding a per-list advisory lock. The
/// `(user_id, content_type, rank_position)` constraint is deferred to commit, so the
/// intermediate duplicates of a shift never fail validation.
#[derive(Clone)]
pub struct PgRankStore {
    pool: PgPool,
}

impl PgRankStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Serialises writers of one list and checks the snapshot stamp
    ///
    /// The advisory lock is released with the transaction. With a stamp, the list's
    /// current order and tiers are read back under the lock and must match it.
    async fn lock_list(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        content_type: ContentType,
        snapshot: Option<&ListStamp>,
    ) -> AppResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text || ':' || $2, 0))")
            .bind(user_id)
            .bind(content_type.as_str())
            .execute(&mut **tx)
            .await?;

        let Some(snapshot) = snapshot else {
            return Ok(());
        };

        let rows: Vec<(String, i32, i16)> = sqlx::query_as(
            r#"
            SELECT content_item_id, rank_position, star_rating FROM ranked_items
            WHERE user_id = $1 AND content_type = $2
            ORDER BY rank_position ASC
            "#,
        )
        .bind(user_id)
        .bind(content_type.as_str())
        .fetch_all(&mut **tx)
        .await?;

        let mut current = Vec::with_capacity(rows.len());
        for (content_item_id, position, rating) in rows {
            // out-of-range columns never match a stamp taken from decoded items
            let position = u32::try_from(position).unwrap_or(0);
            let rating = u8::try_from(rating).unwrap_or(0);
            current.push((content_item_id, position, rating));
        }

        snapshot.verify(&ListStamp::from_rows(current))
    }
}

fn position_param(position: u32) -> AppResult<i32> {
    i32::try_from(position)
        .map_err(|_| AppError::InvalidInput(format!("position {} out of range", position)))
}

/// Maps a write error, surfacing a duplicate title as `AlreadyRanked`
fn write_error(err: sqlx::Error, content_item_id: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.constraint() == Some(ITEM_UNIQUE_CONSTRAINT) {
            return AppError::AlreadyRanked(content_item_id.to_string());
        }
    }
    AppError::PersistenceFailure(err.to_string())
}

#[async_trait::async_trait]
impl RankStore for PgRankStore {
    async fn list(&self, user_id: Uuid, content_type: ContentType) -> AppResult<Vec<RankedItem>> {
        let rows = sqlx::query_as::<_, RankedItemRow>(
            r#"
            SELECT user_id, content_item_id, content_type, star_rating, rank_position, display_score
            FROM ranked_items
            WHERE user_id = $1 AND content_type = $2
            ORDER BY rank_position ASC
            "#,
        )
        .bind(user_id)
        .bind(content_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let content_item_id = row.content_item_id.clone();
            match RankedItem::try_from(row) {
                Ok(item) => items.push(item),
                Err(e) => {
                    tracing::warn!(
                        user_id = %user_id,
                        content_item_id = %content_item_id,
                        error = %e,
                        "Skipping undecodable ranked item"
                    );
                }
            }
        }

        Ok(items)
    }

    async fn find(
        &self,
        user_id: Uuid,
        content_type: ContentType,
        content_item_id: &str,
    ) -> AppResult<Option<RankedItem>> {
        let row = sqlx::query_as::<_, RankedItemRow>(
            r#"
            SELECT user_id, content_item_id, content_type, star_rating, rank_position, display_score
            FROM ranked_items
            WHERE user_id = $1 AND content_type = $2 AND content_item_id = $3
            "#,
        )
        .bind(user_id)
        .bind(content_type.as_str())
        .bind(content_item_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RankedItem::try_from).transpose()
    }

    async fn insert_at(&self, item: &RankedItem, snapshot: &ListStamp) -> AppResult<()> {
        let position = position_param(item.rank_position)?;
        let mut tx = self.pool.begin().await?;
        Self::lock_list(&mut tx, item.user_id, item.content_type, Some(snapshot)).await?;

        sqlx::query(
            r#"
            UPDATE ranked_items
            SET rank_position = rank_position + 1, updated_at = NOW()
            WHERE user_id = $1 AND content_type = $2 AND rank_position >= $3
            "#,
        )
        .bind(item.user_id)
        .bind(item.content_type.as_str())
        .bind(position)
        .execute(&mut *tx)
        .await
        .map_err(|e| write_error(e, &item.content_item_id))?;

        sqlx::query(
            r#"
            INSERT INTO ranked_items
                (user_id, content_item_id, content_type, star_rating, rank_position, display_score)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(item.user_id)
        .bind(&item.content_item_id)
        .bind(item.content_type.as_str())
        .bind(i16::from(item.star_rating.get()))
        .bind(position)
        .bind(score_to_decimal(item.display_score))
        .execute(&mut *tx)
        .await
        .map_err(|e| write_error(e, &item.content_item_id))?;

        tx.commit()
            .await
            .map_err(|e| write_error(e, &item.content_item_id))?;
        Ok(())
    }

    async fn apply_batch(
        &self,
        user_id: Uuid,
        content_type: ContentType,
        updates: &[RankUpdate],
        snapshot: &ListStamp,
    ) -> AppResult<()> {
        let mut ids = Vec::with_capacity(updates.len());
        let mut positions = Vec::with_capacity(updates.len());
        let mut scores = Vec::with_capacity(updates.len());
        let mut ratings = Vec::with_capacity(updates.len());
        for update in updates {
            ids.push(update.content_item_id.clone());
            positions.push(position_param(update.rank_position)?);
            scores.push(score_to_decimal(update.display_score));
            ratings.push(i16::from(update.star_rating.get()));
        }

        let mut tx = self.pool.begin().await?;
        Self::lock_list(&mut tx, user_id, content_type, Some(snapshot)).await?;

        let result = sqlx::query(
            r#"
            UPDATE ranked_items AS r
            SET rank_position = u.rank_position,
                display_score = u.display_score,
                star_rating = u.star_rating,
                updated_at = NOW()
            FROM UNNEST($3::text[], $4::int4[], $5::numeric[], $6::int2[])
                AS u(content_item_id, rank_position, display_score, star_rating)
            WHERE r.user_id = $1 AND r.content_type = $2 AND r.content_item_id = u.content_item_id
            "#,
        )
        .bind(user_id)
        .bind(content_type.as_str())
        .bind(&ids)
        .bind(&positions)
        .bind(&scores)
        .bind(&ratings)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::PersistenceFailure(e.to_string()))?;

        if result.rows_affected() as usize != updates.len() {
            // dropping the transaction rolls it back
            return Err(AppError::PersistenceFailure(format!(
                "batch touched {} rows, expected {}",
                result.rows_affected(),
                updates.len()
            )));
        }

        tx.commit()
            .await
            .map_err(|e| AppError::PersistenceFailure(e.to_string()))?;
        Ok(())
    }

    async fn delete(
        &self,
        user_id: Uuid,
        content_type: ContentType,
        content_item_id: &str,
    ) -> AppResult<Option<RankedItem>> {
        let mut tx = self.pool.begin().await?;
        Self::lock_list(&mut tx, user_id, content_type, None).await?;

        let removed = sqlx::query_as::<_, RankedItemRow>(
            r#"
            DELETE FROM ranked_items
            WHERE user_id = $1 AND content_type = $2 AND content_item_id = $3
            RETURNING user_id, content_item_id, content_type, star_rating, rank_position, display_score
            "#,
        )
        .bind(user_id)
        .bind(content_type.as_str())
        .bind(content_item_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::PersistenceFailure(e.to_string()))?;

        let Some(row) = removed else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE ranked_items
            SET rank_position = rank_position - 1, updated_at = NOW()
            WHERE user_id = $1 AND content_type = $2 AND rank_position > $3
            "#,
        )
        .bind(user_id)
        .bind(content_type.as_str())
        .bind(row.rank_position)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::PersistenceFailure(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| AppError::PersistenceFailure(e.to_string()))?;

        RankedItem::try_from(row).map(Some)
    }

    async fn update_score(
        &self,
        user_id: Uuid,
        content_type: ContentType,
        content_item_id: &str,
        score: DisplayScore,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE ranked_items
            SET display_score = $4, updated_at = NOW()
            WHERE user_id = $1 AND content_type = $2 AND content_item_id = $3
            "#,
        )
        .bind(user_id)
        .bind(content_type.as_str())
        .bind(content_item_id)
        .bind(score_to_decimal(score))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(content_item_id.to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_param_rejects_overflow() {
        assert_eq!(position_param(12).unwrap(), 12);
        assert!(position_param(u32::MAX).is_err());
    }

    #[test]
    fn test_non_database_write_error_is_persistence_failure() {
        let err = write_error(sqlx::Error::RowNotFound, "27205");
        assert!(matches!(err, AppError::PersistenceFailure(_)));
    }
}
