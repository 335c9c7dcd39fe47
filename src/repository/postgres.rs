//! Postgres-backed borrowing store
//!
//! Each atomic entry point is a single transaction. The ledger statements
//! lock the book row, so concurrent borrows of one book serialize on it; a
//! transaction-scoped advisory lock serializes borrows by one user for the
//! limit check.

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::{is_serialization_conflict, AppError, AppResult},
    models::{
        book::Book,
        borrowing::{
            BorrowingBookRow, BorrowingStats, BorrowingStatus, BorrowingWithBook, NewBorrowing,
        },
        user::Borrower,
    },
    services::ledger,
};

use super::BorrowingStore;

const BORROWING_SELECT: &str = r#"
    SELECT b.id, b.user_id, b.book_id, b.borrow_date, b.due_date, b.return_date, b.status,
           bk.title AS book_title, bk.author AS book_author, bk.isbn AS book_isbn
    FROM borrowings b
    JOIN books bk ON bk.id = b.book_id
"#;

/// Inner result: the outer error is infrastructure (maybe retryable), the
/// inner one a business outcome after rollback.
type TxOutcome<T> = Result<AppResult<T>, sqlx::Error>;

#[derive(Clone)]
pub struct PgBorrowingStore {
    pool: Pool<Postgres>,
    max_retries: u32,
}

impl PgBorrowingStore {
    pub fn new(pool: Pool<Postgres>, max_retries: u32) -> Self {
        Self { pool, max_retries }
    }

    /// Run a transaction body, retrying it whole on serialization failure or deadlock
    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut body: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = TxOutcome<T>>,
    {
        let mut attempt = 0;
        loop {
            match body().await {
                Ok(outcome) => return outcome,
                Err(e) if is_serialization_conflict(&e) && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::debug!(operation, attempt, "Transaction conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn try_borrow(&self, id: Uuid, new: &NewBorrowing) -> TxOutcome<Uuid> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(new.user_id.to_string())
            .execute(&mut *tx)
            .await?;

        let current: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrowings WHERE user_id = $1 AND status = 'active'",
        )
        .bind(new.user_id)
        .fetch_one(&mut *tx)
        .await?;

        if current >= new.max_active as i64 {
            return Ok(Err(AppError::LimitReached {
                current,
                max: new.max_active,
            }));
        }

        let remaining: Option<i32> = sqlx::query_scalar(ledger::RESERVE_SQL)
            .bind(new.book_id)
            .fetch_optional(&mut *tx)
            .await?;

        if remaining.is_none() {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE id = $1)")
                .bind(new.book_id)
                .fetch_one(&mut *tx)
                .await?;
            return Ok(Err(if exists {
                AppError::OutOfStock(new.book_id)
            } else {
                AppError::NotFound(format!("Book with id {} not found", new.book_id))
            }));
        }

        sqlx::query(
            r#"
            INSERT INTO borrowings (id, user_id, book_id, borrow_date, due_date, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(new.user_id)
        .bind(new.book_id)
        .bind(new.borrow_date)
        .bind(new.due_date)
        .bind(BorrowingStatus::Active)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Ok(id))
    }

    async fn try_return(
        &self,
        borrowing_id: Uuid,
        book_id: Uuid,
        returned_by: Borrower,
        return_date: DateTime<Utc>,
    ) -> TxOutcome<DateTime<Utc>> {
        let mut tx = self.pool.begin().await?;

        let recorded: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            UPDATE borrowings
            SET status = 'returned', return_date = GREATEST($3, borrow_date), updated_at = NOW()
            WHERE id = $1 AND book_id = $2 AND status = 'active'
              AND (user_id = $4 OR $5)
            RETURNING return_date
            "#,
        )
        .bind(borrowing_id)
        .bind(book_id)
        .bind(return_date)
        .bind(returned_by.user_id)
        .bind(returned_by.role.is_staff())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(recorded) = recorded else {
            let row: Option<(Uuid, BorrowingStatus)> = sqlx::query_as(
                "SELECT user_id, status FROM borrowings WHERE id = $1 AND book_id = $2",
            )
            .bind(borrowing_id)
            .bind(book_id)
            .fetch_optional(&mut *tx)
            .await?;
            return Ok(Err(match row {
                None => AppError::NotFound(format!("Borrowing with id {} not found", borrowing_id)),
                Some((owner, _)) if owner != returned_by.user_id && !returned_by.role.is_staff() => {
                    AppError::Authorization(format!(
                        "Borrowing {} belongs to another user",
                        borrowing_id
                    ))
                }
                Some(_) => AppError::AlreadyReturned(borrowing_id),
            }));
        };

        let released: Option<i32> = sqlx::query_scalar(ledger::RELEASE_SQL)
            .bind(book_id)
            .fetch_optional(&mut *tx)
            .await?;

        if released.is_none() {
            // The foreign key makes this unreachable unless the book row vanished mid-flight.
            return Ok(Err(AppError::Internal(format!(
                "Book {} missing while returning borrowing {}",
                book_id, borrowing_id
            ))));
        }

        tx.commit().await?;
        Ok(Ok(recorded))
    }

    async fn fetch_borrowings(&self, sql: String, user_id: Option<Uuid>) -> AppResult<Vec<BorrowingWithBook>> {
        let mut query = sqlx::query_as::<_, BorrowingBookRow>(&sql);
        if let Some(user_id) = user_id {
            query = query.bind(user_id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl BorrowingStore for PgBorrowingStore {
    async fn atomic_borrow(&self, borrowing: NewBorrowing) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        self.with_retry("borrow", || self.try_borrow(id, &borrowing))
            .await
    }

    async fn atomic_return(
        &self,
        borrowing_id: Uuid,
        book_id: Uuid,
        returned_by: Borrower,
        return_date: DateTime<Utc>,
    ) -> AppResult<DateTime<Utc>> {
        self.with_retry("return", || {
            self.try_return(borrowing_id, book_id, returned_by, return_date)
        })
        .await
    }

    async fn get_book(&self, book_id: Uuid) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            r#"
            SELECT id, title, author, isbn, category, total_copies, available_copies
            FROM books WHERE id = $1
            "#,
        )
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))
    }

    async fn list_user_borrowings(&self, user_id: Uuid) -> AppResult<Vec<BorrowingWithBook>> {
        let sql = format!(
            "{} WHERE b.user_id = $1 ORDER BY b.borrow_date DESC, b.created_at DESC",
            BORROWING_SELECT
        );
        self.fetch_borrowings(sql, Some(user_id)).await
    }

    async fn list_borrowings(&self) -> AppResult<Vec<BorrowingWithBook>> {
        let sql = format!(
            "{} ORDER BY b.borrow_date DESC, b.created_at DESC",
            BORROWING_SELECT
        );
        self.fetch_borrowings(sql, None).await
    }

    async fn list_active_borrowings(&self) -> AppResult<Vec<BorrowingWithBook>> {
        let sql = format!(
            "{} WHERE b.status = 'active' ORDER BY b.due_date ASC",
            BORROWING_SELECT
        );
        self.fetch_borrowings(sql, None).await
    }

    async fn count_borrowings(&self, now: DateTime<Utc>) -> AppResult<BorrowingStats> {
        let (total, active, returned, overdue): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE status = 'active'),
                   COUNT(*) FILTER (WHERE status = 'returned'),
                   COUNT(*) FILTER (WHERE status = 'active' AND due_date < $1)
            FROM borrowings
            "#,
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(BorrowingStats {
            total,
            active,
            returned,
            overdue,
        })
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}
