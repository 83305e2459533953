/// TMDB metadata provider
///
/// API Flow:
/// 1. Movies: /movie/{id}?append_to_response=credits → genres, release date,
///    collection (franchise), director (from crew)
/// 2. Shows: /tv/{id} → genres, first air date, creators
use reqwest::{Client as HttpClient, StatusCode};
use serde::de::DeserializeOwned;

use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{ContentRecord, ContentType, TmdbMovie, TmdbShow},
    services::metadata::ContentProvider,
};

#[derive(Clone)]
pub struct TmdbProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    cache: Cache,
}

/// TMDB ids are positive integers; anything else never reaches the API
fn validate_external_id(external_id: &str) -> AppResult<&str> {
    let id = external_id.trim();
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::InvalidInput(format!(
            "'{}' is not a TMDB id",
            external_id
        )));
    }
    Ok(id)
}

/// Path of the details endpoint for a title
fn details_path(content_type: ContentType, id: &str) -> String {
    match content_type {
        ContentType::Movie => format!("/movie/{}", id),
        ContentType::Show => format!("/tv/{}", id),
    }
}

impl TmdbProvider {
    pub fn new(cache: Cache, api_key: String, api_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            cache,
        }
    }

    async fn get_details<T: DeserializeOwned>(
        &self,
        content_type: ContentType,
        id: &str,
    ) -> AppResult<T> {
        let url = format!("{}{}", self.api_url, details_path(content_type, id));

        let mut query = vec![("api_key", self.api_key.as_str())];
        if content_type == ContentType::Movie {
            query.push(("append_to_response", "credits"));
        }

        let response = self.http_client.get(&url).query(&query).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("{} {}", content_type, id)));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                content_type = %content_type,
                id = %id,
                status = %status,
                "TMDB request failed"
            );
            return Err(AppError::ExternalApi(format!(
                "TMDB returned status {}: {}",
                status, body
            )));
        }

        let details: T = response.json().await?;
        Ok(details)
    }
}

#[async_trait::async_trait]
impl ContentProvider for TmdbProvider {
    async fn resolve_content(
        &self,
        external_id: &str,
        content_type: ContentType,
    ) -> AppResult<ContentRecord> {
        let id = validate_external_id(external_id)?;

        cached!(
            self.cache,
            CacheKey::Content(content_type, id.to_string()),
            async move {
                let record = match content_type {
                    ContentType::Movie => {
                        ContentRecord::from(self.get_details::<TmdbMovie>(content_type, id).await?)
                    }
                    ContentType::Show => {
                        ContentRecord::from(self.get_details::<TmdbShow>(content_type, id).await?)
                    }
                };

                tracing::info!(
                    content_type = %content_type,
                    id = %id,
                    genres = record.genres.len(),
                    provider = "tmdb",
                    "Resolved content metadata"
                );

                Ok::<_, AppError>(record)
            }
        )
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_external_id_accepts_numeric() {
        assert_eq!(validate_external_id(" 27205 ").unwrap(), "27205");
    }

    #[test]
    fn test_validate_external_id_rejects_non_numeric() {
        assert!(validate_external_id("tt1375666").is_err());
        assert!(validate_external_id("").is_err());
        assert!(validate_external_id("12/../34").is_err());
    }

    #[test]
    fn test_details_path_per_content_type() {
        assert_eq!(details_path(ContentType::Movie, "27205"), "/movie/27205");
        assert_eq!(details_path(ContentType::Show, "1396"), "/tv/1396");
    }
}
