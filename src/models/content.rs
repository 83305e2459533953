use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ContentType;

/// Catalogue attributes of a title, used for comparison ordering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub external_id: String,
    pub content_type: ContentType,
    pub title: String,
    pub genres: Vec<String>,
    pub year: Option<i32>,
    /// Director for movies, first listed creator for shows
    pub creator: Option<String>,
    /// Collection id for movies that belong to a franchise
    pub franchise_id: Option<u64>,
    pub cached_at: DateTime<Utc>,
}

// ============================================================================
// TMDB API Types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbGenre {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbCollection {
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbCrewMember {
    pub name: String,
    #[serde(default)]
    pub job: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmdbCredits {
    #[serde(default)]
    pub crew: Vec<TmdbCrewMember>,
}

/// Response of `GET /movie/{id}?append_to_response=credits`
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbMovie {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub genres: Vec<TmdbGenre>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub belongs_to_collection: Option<TmdbCollection>,
    #[serde(default)]
    pub credits: TmdbCredits,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbCreator {
    pub name: String,
}

/// Response of `GET /tv/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbShow {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<TmdbGenre>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub created_by: Vec<TmdbCreator>,
}

/// Year prefix of a TMDB `YYYY-MM-DD` date; TMDB sends "" for unknown dates
fn parse_year(date: Option<&str>) -> Option<i32> {
    date.and_then(|d| d.get(0..4)).and_then(|y| y.parse().ok())
}

impl From<TmdbMovie> for ContentRecord {
    fn from(movie: TmdbMovie) -> Self {
        let creator = movie
            .credits
            .crew
            .into_iter()
            .find(|member| member.job.as_deref() == Some("Director"))
            .map(|member| member.name);

        ContentRecord {
            external_id: movie.id.to_string(),
            content_type: ContentType::Movie,
            title: movie.title,
            genres: movie.genres.into_iter().map(|g| g.name).collect(),
            year: parse_year(movie.release_date.as_deref()),
            creator,
            franchise_id: movie.belongs_to_collection.map(|c| c.id),
            cached_at: Utc::now(),
        }
    }
}

impl From<TmdbShow> for ContentRecord {
    fn from(show: TmdbShow) -> Self {
        ContentRecord {
            external_id: show.id.to_string(),
            content_type: ContentType::Show,
            title: show.name,
            genres: show.genres.into_iter().map(|g| g.name).collect(),
            year: parse_year(show.first_air_date.as_deref()),
            creator: show.created_by.into_iter().next().map(|c| c.name),
            franchise_id: None,
            cached_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movie_maps_director_and_collection() {
        let json = r#"{
            "id": 155,
            "title": "The Dark Knight",
            "genres": [{"id": 18, "name": "Drama"}, {"id": 28, "name": "Action"}],
            "release_date": "2008-07-16",
            "belongs_to_collection": {"id": 263, "name": "The Dark Knight Collection"},
            "credits": {"crew": [
                {"name": "Hans Zimmer", "job": "Original Music Composer"},
                {"name": "Christopher Nolan", "job": "Director"}
            ]}
        }"#;
        let movie: TmdbMovie = serde_json::from_str(json).unwrap();
        let record = ContentRecord::from(movie);

        assert_eq!(record.external_id, "155");
        assert_eq!(record.content_type, ContentType::Movie);
        assert_eq!(record.genres, vec!["Drama", "Action"]);
        assert_eq!(record.year, Some(2008));
        assert_eq!(record.creator.as_deref(), Some("Christopher Nolan"));
        assert_eq!(record.franchise_id, Some(263));
    }

    #[test]
    fn test_movie_with_sparse_fields() {
        let json = r#"{"id": 1, "title": "Untitled", "release_date": ""}"#;
        let movie: TmdbMovie = serde_json::from_str(json).unwrap();
        let record = ContentRecord::from(movie);

        assert!(record.genres.is_empty());
        assert_eq!(record.year, None);
        assert_eq!(record.creator, None);
        assert_eq!(record.franchise_id, None);
    }

    #[test]
    fn test_show_takes_first_creator() {
        let json = r#"{
            "id": 1396,
            "name": "Breaking Bad",
            "genres": [{"id": 18, "name": "Drama"}],
            "first_air_date": "2008-01-20",
            "created_by": [{"id": 66633, "name": "Vince Gilligan"}]
        }"#;
        let show: TmdbShow = serde_json::from_str(json).unwrap();
        let record = ContentRecord::from(show);

        assert_eq!(record.content_type, ContentType::Show);
        assert_eq!(record.title, "Breaking Bad");
        assert_eq!(record.year, Some(2008));
        assert_eq!(record.creator.as_deref(), Some("Vince Gilligan"));
    }
}
