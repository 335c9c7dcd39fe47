//! Borrowing service
//!
//! Drives a borrowing from active to returned. All writes go through the two
//! atomic entry points of the store; the read projections derive "overdue"
//! from the due date on every call.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::Book,
        borrowing::{
            BorrowReceipt, BorrowingDetails, BorrowingStats, NewBorrowing, OverdueBorrowing,
            ReturnReceipt,
        },
        user::Borrower,
    },
    repository::Repository,
};

use super::policy::PolicyTable;

#[derive(Clone)]
pub struct BorrowingService {
    repository: Repository,
    policy: PolicyTable,
}

impl BorrowingService {
    pub fn new(repository: Repository, policy: PolicyTable) -> Self {
        Self { repository, policy }
    }

    /// Borrow one copy of a book
    pub async fn borrow(
        &self,
        borrower: Option<Borrower>,
        book_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowReceipt> {
        let borrower = borrower.ok_or(AppError::Unauthenticated)?;

        let rules = self.policy.rules_for(borrower.role);
        let due_date = self.policy.due_date(borrower.role, now);

        let result = self
            .repository
            .borrowings
            .atomic_borrow(NewBorrowing {
                user_id: borrower.user_id,
                book_id,
                borrow_date: now,
                due_date,
                max_active: rules.max_active,
            })
            .await;

        match result {
            Ok(borrowing_id) => {
                tracing::info!(
                    %borrowing_id,
                    %book_id,
                    user_id = %borrower.user_id,
                    role = %borrower.role,
                    %due_date,
                    "Book borrowed"
                );
                Ok(BorrowReceipt {
                    borrowing_id,
                    due_date,
                })
            }
            Err(e @ (AppError::OutOfStock(_) | AppError::LimitReached { .. })) => {
                tracing::warn!(%book_id, user_id = %borrower.user_id, "Borrow rejected: {}", e);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Return a borrowed book. Only its borrower or staff may do so.
    pub async fn return_book(
        &self,
        returned_by: Borrower,
        borrowing_id: Uuid,
        book_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<ReturnReceipt> {
        match self
            .repository
            .borrowings
            .atomic_return(borrowing_id, book_id, returned_by, now)
            .await
        {
            Ok(return_date) => {
                tracing::info!(%borrowing_id, %book_id, %return_date, "Book returned");
                Ok(ReturnReceipt {
                    borrowing_id,
                    return_date,
                })
            }
            Err(e @ (AppError::AlreadyReturned(_) | AppError::Authorization(_))) => {
                tracing::warn!(%borrowing_id, user_id = %returned_by.user_id, "Return rejected: {}", e);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Get a book with its current counters
    pub async fn get_book(&self, book_id: Uuid) -> AppResult<Book> {
        self.repository.borrowings.get_book(book_id).await
    }

    /// Borrowings of one user, newest first
    pub async fn user_borrowings(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<BorrowingDetails>> {
        let records = self.repository.borrowings.list_user_borrowings(user_id).await?;
        Ok(records
            .into_iter()
            .map(|r| BorrowingDetails::project(r, now))
            .collect())
    }

    /// All borrowings, newest first
    pub async fn all_borrowings(&self, now: DateTime<Utc>) -> AppResult<Vec<BorrowingDetails>> {
        let records = self.repository.borrowings.list_borrowings().await?;
        Ok(records
            .into_iter()
            .map(|r| BorrowingDetails::project(r, now))
            .collect())
    }

    /// Active borrowings past their due date, most overdue first
    pub async fn overdue_report(&self, now: DateTime<Utc>) -> AppResult<Vec<OverdueBorrowing>> {
        let records = self.repository.borrowings.list_active_borrowings().await?;
        Ok(records
            .into_iter()
            .filter(|r| r.borrowing.is_overdue(now))
            .map(|r| {
                let days_overdue = (now - r.borrowing.due_date).num_days();
                OverdueBorrowing {
                    borrowing: BorrowingDetails::project(r, now),
                    days_overdue,
                }
            })
            .collect())
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> AppResult<BorrowingStats> {
        self.repository.borrowings.count_borrowings(now).await
    }

    /// Storage reachability for readiness checks
    pub async fn ping(&self) -> AppResult<()> {
        self.repository.borrowings.ping().await
    }
}
