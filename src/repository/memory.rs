//! In-process borrowing store
//!
//! A single mutex guards books and borrowings. Each atomic operation works on
//! staged copies of the rows it touches and writes them back only once every
//! step has succeeded, so an abort at any point leaves the committed state
//! untouched.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    config::SeedBook,
    error::{AppError, AppResult},
    models::{
        book::Book,
        borrowing::{Borrowing, BorrowingStats, BorrowingStatus, BorrowingWithBook, NewBorrowing},
        user::Borrower,
    },
    services::ledger,
};

use super::BorrowingStore;

/// Points where the next transaction can be made to abort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    /// Before anything is read
    Unavailable,
    /// Borrow: copy reserved, borrowing not yet inserted
    AfterReserve,
    /// Return: status flipped, copy not yet released
    AfterStatusChange,
}

#[derive(Debug, Default)]
struct State {
    books: IndexMap<Uuid, Book>,
    borrowings: IndexMap<Uuid, Borrowing>,
    fail_point: Option<FailPoint>,
}

impl State {
    fn trip(&mut self, point: FailPoint) -> AppResult<()> {
        if self.fail_point == Some(point) {
            self.fail_point = None;
            tracing::debug!(?point, "Injected transaction abort");
            return Err(AppError::PersistenceUnavailable(format!(
                "transaction aborted at {:?}",
                point
            )));
        }
        Ok(())
    }

    fn active_for_user(&self, user_id: Uuid) -> usize {
        self.borrowings
            .values()
            .filter(|b| b.user_id == user_id && b.is_active())
            .count()
    }

    fn active_for_book(&self, book_id: Uuid) -> usize {
        self.borrowings
            .values()
            .filter(|b| b.book_id == book_id && b.is_active())
            .count()
    }

    fn with_book(&self, borrowing: &Borrowing) -> AppResult<BorrowingWithBook> {
        let book = self.books.get(&borrowing.book_id).ok_or_else(|| {
            AppError::Internal(format!("Borrowing {} references a missing book", borrowing.id))
        })?;
        Ok(BorrowingWithBook {
            borrowing: borrowing.clone(),
            book: book.short(),
        })
    }
}

#[derive(Clone, Default)]
pub struct MemoryBorrowingStore {
    state: Arc<Mutex<State>>,
}

impl MemoryBorrowingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a catalog entry. The ISBN must be unique.
    pub async fn insert_book(&self, book: Book) -> AppResult<Uuid> {
        if book.total_copies < 1 || book.available_copies != book.total_copies {
            return Err(AppError::BadRequest(
                "A new book needs at least one copy, all on the shelf".to_string(),
            ));
        }
        let mut state = self.state.lock().await;
        if state.books.values().any(|b| b.isbn == book.isbn) {
            return Err(AppError::BadRequest(format!("ISBN {} already exists", book.isbn)));
        }
        let id = book.id;
        state.books.insert(id, book);
        Ok(id)
    }

    /// Load a starting catalog, returning how many books were added
    pub async fn seed(&self, books: &[SeedBook]) -> AppResult<usize> {
        for seed in books {
            let mut book = Book::new(&seed.title, &seed.author, &seed.isbn, seed.copies);
            if let Some(category) = &seed.category {
                book = book.with_category(category);
            }
            self.insert_book(book).await?;
        }
        Ok(books.len())
    }

    /// Make the next transaction that reaches `point` abort
    pub async fn fail_next(&self, point: FailPoint) {
        self.state.lock().await.fail_point = Some(point);
    }

    /// Book row and the number of active borrowings on it, read together
    pub async fn ledger_snapshot(&self, book_id: Uuid) -> AppResult<(Book, usize)> {
        let state = self.state.lock().await;
        let book = state
            .books
            .get(&book_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;
        Ok((book, state.active_for_book(book_id)))
    }
}

#[async_trait]
impl BorrowingStore for MemoryBorrowingStore {
    async fn atomic_borrow(&self, new: NewBorrowing) -> AppResult<Uuid> {
        let mut state = self.state.lock().await;
        state.trip(FailPoint::Unavailable)?;

        let current = state.active_for_user(new.user_id) as i64;
        if current >= new.max_active as i64 {
            return Err(AppError::LimitReached {
                current,
                max: new.max_active,
            });
        }

        let mut book = state
            .books
            .get(&new.book_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", new.book_id)))?;
        ledger::reserve(&mut book)?;
        state.trip(FailPoint::AfterReserve)?;

        let borrowing = Borrowing {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            book_id: new.book_id,
            borrow_date: new.borrow_date,
            due_date: new.due_date,
            return_date: None,
            status: BorrowingStatus::Active,
        };
        let id = borrowing.id;

        state.books.insert(book.id, book);
        state.borrowings.insert(id, borrowing);
        Ok(id)
    }

    async fn atomic_return(
        &self,
        borrowing_id: Uuid,
        book_id: Uuid,
        returned_by: Borrower,
        return_date: DateTime<Utc>,
    ) -> AppResult<DateTime<Utc>> {
        let mut state = self.state.lock().await;
        state.trip(FailPoint::Unavailable)?;

        let mut borrowing = state
            .borrowings
            .get(&borrowing_id)
            .filter(|b| b.book_id == book_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Borrowing with id {} not found", borrowing_id)))?;
        if borrowing.user_id != returned_by.user_id && !returned_by.role.is_staff() {
            return Err(AppError::Authorization(format!(
                "Borrowing {} belongs to another user",
                borrowing_id
            )));
        }
        if !borrowing.is_active() {
            return Err(AppError::AlreadyReturned(borrowing_id));
        }

        let recorded = return_date.max(borrowing.borrow_date);
        borrowing.status = BorrowingStatus::Returned;
        borrowing.return_date = Some(recorded);
        state.trip(FailPoint::AfterStatusChange)?;

        let mut book = state.books.get(&book_id).cloned().ok_or_else(|| {
            AppError::Internal(format!(
                "Book {} missing while returning borrowing {}",
                book_id, borrowing_id
            ))
        })?;
        ledger::release(&mut book);

        state.books.insert(book.id, book);
        state.borrowings.insert(borrowing_id, borrowing);
        Ok(recorded)
    }

    async fn get_book(&self, book_id: Uuid) -> AppResult<Book> {
        let state = self.state.lock().await;
        state
            .books
            .get(&book_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))
    }

    async fn list_user_borrowings(&self, user_id: Uuid) -> AppResult<Vec<BorrowingWithBook>> {
        let state = self.state.lock().await;
        state
            .borrowings
            .values()
            .rev()
            .filter(|b| b.user_id == user_id)
            .map(|b| state.with_book(b))
            .collect()
    }

    async fn list_borrowings(&self) -> AppResult<Vec<BorrowingWithBook>> {
        let state = self.state.lock().await;
        state
            .borrowings
            .values()
            .rev()
            .map(|b| state.with_book(b))
            .collect()
    }

    async fn list_active_borrowings(&self) -> AppResult<Vec<BorrowingWithBook>> {
        let state = self.state.lock().await;
        let mut active = state
            .borrowings
            .values()
            .filter(|b| b.is_active())
            .map(|b| state.with_book(b))
            .collect::<AppResult<Vec<_>>>()?;
        active.sort_by_key(|r| r.borrowing.due_date);
        Ok(active)
    }

    async fn count_borrowings(&self, now: DateTime<Utc>) -> AppResult<BorrowingStats> {
        let state = self.state.lock().await;
        Ok(state
            .borrowings
            .values()
            .fold(BorrowingStats::default(), |mut stats, b| {
                stats.total += 1;
                if b.is_active() {
                    stats.active += 1;
                } else {
                    stats.returned += 1;
                }
                if b.is_overdue(now) {
                    stats.overdue += 1;
                }
                stats
            }))
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}
