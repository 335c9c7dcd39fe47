//! Borrowing model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::ToSchema;
use uuid::Uuid;

use super::book::BookShort;

/// Stored borrowing state.
///
/// "Overdue" is deliberately not a variant: it is derived from the due date
/// at read time (see [`Borrowing::is_overdue`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BorrowingStatus {
    Active,
    Returned,
}

impl BorrowingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowingStatus::Active => "active",
            BorrowingStatus::Returned => "returned",
        }
    }
}

impl std::fmt::Display for BorrowingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BorrowingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(BorrowingStatus::Active),
            "returned" => Ok(BorrowingStatus::Returned),
            other => Err(format!("Unknown borrowing status: {}", other)),
        }
    }
}

// SQLx conversion for BorrowingStatus
impl sqlx::Type<Postgres> for BorrowingStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for BorrowingStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for BorrowingStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        let s: String = self.as_str().to_string();
        <String as Encode<Postgres>>::encode(s, buf)
    }
}

/// Borrowing row from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Borrowing {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: BorrowingStatus,
}

impl Borrowing {
    pub fn is_active(&self) -> bool {
        self.status == BorrowingStatus::Active
    }

    /// Active and past its due date. Returned borrowings are never overdue,
    /// whatever their return date.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.due_date < now
    }
}

/// Everything the persistence boundary needs to open a borrowing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBorrowing {
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    /// Active borrowings the user may hold, this one included
    pub max_active: u32,
}

/// Borrowing joined with its book, as stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowingWithBook {
    pub borrowing: Borrowing,
    pub book: BookShort,
}

/// Flat row for borrowing/book joins
#[derive(Debug, FromRow)]
pub struct BorrowingBookRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: BorrowingStatus,
    pub book_title: String,
    pub book_author: String,
    pub book_isbn: String,
}

impl From<BorrowingBookRow> for BorrowingWithBook {
    fn from(row: BorrowingBookRow) -> Self {
        Self {
            book: BookShort {
                id: row.book_id,
                title: row.book_title,
                author: row.book_author,
                isbn: row.book_isbn,
            },
            borrowing: Borrowing {
                id: row.id,
                user_id: row.user_id,
                book_id: row.book_id,
                borrow_date: row.borrow_date,
                due_date: row.due_date,
                return_date: row.return_date,
                status: row.status,
            },
        }
    }
}

/// Borrowing with full details for display
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BorrowingDetails {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book: BookShort,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: BorrowingStatus,
    /// Computed at read time, never stored
    pub is_overdue: bool,
}

impl BorrowingDetails {
    pub fn project(record: BorrowingWithBook, now: DateTime<Utc>) -> Self {
        let is_overdue = record.borrowing.is_overdue(now);
        let b = record.borrowing;
        Self {
            id: b.id,
            user_id: b.user_id,
            book: record.book,
            borrow_date: b.borrow_date,
            due_date: b.due_date,
            return_date: b.return_date,
            status: b.status,
            is_overdue,
        }
    }
}

/// Overdue report line
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OverdueBorrowing {
    pub borrowing: BorrowingDetails,
    /// Whole days elapsed since the due date
    pub days_overdue: i64,
}

/// Outcome of a successful borrow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BorrowReceipt {
    pub borrowing_id: Uuid,
    pub due_date: DateTime<Utc>,
}

/// Outcome of a successful return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReturnReceipt {
    pub borrowing_id: Uuid,
    pub return_date: DateTime<Utc>,
}

/// Borrowing counters for dashboards
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BorrowingStats {
    pub total: i64,
    pub active: i64,
    pub returned: i64,
    pub overdue: i64,
}
