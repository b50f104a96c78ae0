//! Creation content source (drawing + generated story)

use async_trait::async_trait;
use shared::{BookContent, StoryPage};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::error::BoxError;

/// Upstream source of book content
#[async_trait]
pub trait CreationSource: Send + Sync {
    async fn load(&self, creation_id: Uuid) -> Result<Option<BookContent>, BoxError>;
}

#[derive(sqlx::FromRow)]
struct CreationRow {
    title: String,
    artist_name: String,
    artist_age: Option<String>,
    dedication: Option<String>,
    hero_image_path: Option<String>,
    original_image_path: Option<String>,
    story: Json<Vec<StoryPage>>,
}

impl From<CreationRow> for BookContent {
    fn from(row: CreationRow) -> Self {
        BookContent {
            title: row.title,
            artist_name: row.artist_name,
            artist_age: row.artist_age,
            dedication: row.dedication,
            hero_image_path: row.hero_image_path,
            original_image_path: row.original_image_path,
            pages: row.story.0,
        }
    }
}

#[derive(Clone)]
pub struct PgCreationSource {
    pool: PgPool,
}

impl PgCreationSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CreationSource for PgCreationSource {
    async fn load(&self, creation_id: Uuid) -> Result<Option<BookContent>, BoxError> {
        let row: Option<CreationRow> = sqlx::query_as(
            "SELECT title, artist_name, artist_age, dedication, hero_image_path,
                    original_image_path, story
             FROM creations WHERE id = $1",
        )
        .bind(creation_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(BookContent::from))
    }
}
