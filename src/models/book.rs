//! Book model and ledger counters

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Book row from database.
///
/// `available_copies` is owned by the inventory ledger and only changes as a
/// side effect of a borrow or a return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category: Option<String>,
    pub total_copies: i32,
    pub available_copies: i32,
}

impl Book {
    /// New catalog entry with every copy on the shelf
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        isbn: impl Into<String>,
        total_copies: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            author: author.into(),
            isbn: isbn.into(),
            category: None,
            total_copies,
            available_copies: total_copies,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Copies currently out on loan according to the counter
    pub fn lent_copies(&self) -> i32 {
        self.total_copies - self.available_copies
    }

    pub fn short(&self) -> BookShort {
        BookShort {
            id: self.id,
            title: self.title.clone(),
            author: self.author.clone(),
            isbn: self.isbn.clone(),
        }
    }
}

/// Book fields joined onto borrowing listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BookShort {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: String,
}
