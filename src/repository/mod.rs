//! Persistence boundary for the borrowing core
//!
//! Borrow and return are exposed only as whole atomic units. Implementations
//! must apply the ledger change and the borrowing change together or not at
//! all; callers never get a separate read-then-write path.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        book::Book,
        borrowing::{BorrowingStats, BorrowingWithBook, NewBorrowing},
        user::Borrower,
    },
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BorrowingStore: Send + Sync {
    /// Reserve a copy, check the borrower's limit and insert an active
    /// borrowing, in one transaction.
    ///
    /// Errors: `OutOfStock`, `LimitReached`, `NotFound` (book),
    /// `PersistenceUnavailable`.
    async fn atomic_borrow(&self, borrowing: NewBorrowing) -> AppResult<Uuid>;

    /// Flip an active borrowing to returned and release its copy, in one
    /// transaction. Only the borrower or staff may return it. Returns the
    /// recorded return date, which is never before the borrow date.
    ///
    /// Errors: `Authorization`, `AlreadyReturned`, `NotFound`,
    /// `PersistenceUnavailable`.
    async fn atomic_return(
        &self,
        borrowing_id: Uuid,
        book_id: Uuid,
        returned_by: Borrower,
        return_date: DateTime<Utc>,
    ) -> AppResult<DateTime<Utc>>;

    async fn get_book(&self, book_id: Uuid) -> AppResult<Book>;

    /// A user's borrowings, newest first
    async fn list_user_borrowings(&self, user_id: Uuid) -> AppResult<Vec<BorrowingWithBook>>;

    /// All borrowings, newest first
    async fn list_borrowings(&self) -> AppResult<Vec<BorrowingWithBook>>;

    /// Active borrowings, earliest due first
    async fn list_active_borrowings(&self) -> AppResult<Vec<BorrowingWithBook>>;

    /// Borrowing counters, overdue meaning active and due before `now`
    async fn count_borrowings(&self, now: DateTime<Utc>) -> AppResult<BorrowingStats>;

    /// Cheap reachability check
    async fn ping(&self) -> AppResult<()>;
}

/// Main repository struct holding the selected store
#[derive(Clone)]
pub struct Repository {
    pub borrowings: Arc<dyn BorrowingStore>,
}

impl Repository {
    pub fn new(store: Arc<dyn BorrowingStore>) -> Self {
        Self { borrowings: store }
    }

    pub fn postgres(store: postgres::PgBorrowingStore) -> Self {
        Self::new(Arc::new(store))
    }

    pub fn memory(store: memory::MemoryBorrowingStore) -> Self {
        Self::new(Arc::new(store))
    }
}
