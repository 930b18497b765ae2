use serde::{Deserialize, Serialize};

const COVERS_BASE_URL: &str = "https://covers.openlibrary.org";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub subjects: Vec<String>,
    pub isbns: Vec<String>,
    pub cover_id: Option<i64>,
    pub work_key: Option<String>,
    pub content_hash: String,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CoverSize {
    Small,
    Medium,
    Large,
}

impl CoverSize {
    fn as_str(self) -> &'static str {
        match self {
            Self::Small => "S",
            Self::Medium => "M",
            Self::Large => "L",
        }
    }
}

impl Book {
    pub fn cover_url(&self, size: CoverSize) -> Option<String> {
        if let Some(cover_id) = self.cover_id {
            return Some(format!(
                "{COVERS_BASE_URL}/b/id/{cover_id}-{}.jpg",
                size.as_str()
            ));
        }
        self.isbns
            .first()
            .map(|isbn| format!("{COVERS_BASE_URL}/b/isbn/{isbn}-{}.jpg", size.as_str()))
    }
}

/// Fields accepted by [`crate::store::MetadataStore::upsert_book`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookDraft {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub subjects: Vec<String>,
    pub isbns: Vec<String>,
    pub cover_id: Option<i64>,
    pub work_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub book_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub subjects: Vec<String>,
    pub cover_id: Option<i64>,
    pub work_key: Option<String>,
    pub score: f64,
    pub explanation: Option<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Rating {
    Up,
    Down,
}

impl Rating {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }
}

impl TryFrom<i64> for Rating {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Up),
            -1 => Ok(Self::Down),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackRecord {
    pub id: i64,
    pub book_id: String,
    pub rating: Rating,
    pub source_book_ids: Vec<String>,
    pub source_prompt: Option<String>,
    pub created_at: String,
}
