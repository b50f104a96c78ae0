//! Book content assembled fresh for every fulfillment run

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One page of the generated story
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryPage {
    /// 1-based, contiguous
    pub page_number: u32,
    /// Narrative text shown under / beside the illustration
    pub text: String,
    /// Storage path (or absolute URL) of the illustration.
    /// `None` while the asset has not been generated yet.
    #[serde(default)]
    pub image_path: Option<String>,
}

/// Everything needed to lay out one book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookContent {
    pub title: String,
    pub artist_name: String,
    /// Free-form age or year line ("age 6", "2024")
    #[serde(default)]
    pub artist_age: Option<String>,
    #[serde(default)]
    pub dedication: Option<String>,
    /// Generated hero illustration used on the front cover
    #[serde(default)]
    pub hero_image_path: Option<String>,
    /// The child's original drawing
    #[serde(default)]
    pub original_image_path: Option<String>,
    pub pages: Vec<StoryPage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookError {
    #[error("Book has no story pages")]
    Empty,

    #[error("Story pages are not contiguous: expected page {expected}, found {found}")]
    NonContiguous { expected: u32, found: u32 },

    #[error("Story page {0} has no resolvable image")]
    MissingImage(u32),
}

impl BookContent {
    /// Sort pages by number and check they run 1..=N without gaps or duplicates.
    pub fn normalize(&mut self) -> Result<(), BookError> {
        if self.pages.is_empty() {
            return Err(BookError::Empty);
        }
        self.pages.sort_by_key(|p| p.page_number);
        for (idx, page) in self.pages.iter().enumerate() {
            let expected = idx as u32 + 1;
            if page.page_number != expected {
                return Err(BookError::NonContiguous {
                    expected,
                    found: page.page_number,
                });
            }
        }
        Ok(())
    }

    /// First story page whose image reference is still unresolved
    pub fn first_unresolved_page(&self) -> Option<u32> {
        self.pages
            .iter()
            .find(|p| p.image_path.as_deref().is_none_or(|s| s.trim().is_empty()))
            .map(|p| p.page_number)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Byline shown on covers and the colophon: "Name, age 6"
    pub fn byline(&self) -> String {
        match self.artist_age.as_deref().map(str::trim) {
            Some(age) if !age.is_empty() => format!("{}, {}", self.artist_name.trim(), age),
            _ => self.artist_name.trim().to_string(),
        }
    }
}
