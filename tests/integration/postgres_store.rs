//! Borrow/return transactions against a live Postgres
//!
//! Needs `DATABASE_URL` pointing at a disposable database; migrations are
//! applied on first use. Each test works on its own freshly inserted book.

use std::sync::Arc;

use chrono::{Duration, Utc};
use libris_server::{
    error::AppError,
    models::user::{Borrower, Role},
    repository::{postgres::PgBorrowingStore, BorrowingStore, Repository},
    services::{borrowings::BorrowingService, policy::PolicyTable},
};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

async fn pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&url)
        .await
        .expect("Failed to connect to Postgres");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

async fn insert_book(pool: &PgPool, copies: i32) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO books (id, title, author, isbn, total_copies, available_copies)
        VALUES ($1, 'Dune', 'Frank Herbert', $2, $3, $3)
        "#,
    )
    .bind(id)
    .bind(id.simple().to_string())
    .bind(copies)
    .execute(pool)
    .await
    .expect("Failed to insert book");
    id
}

/// Available counter and active borrowings of one book
async fn ledger(pool: &PgPool, book_id: Uuid) -> (i32, i64) {
    sqlx::query_as(
        r#"
        SELECT available_copies,
               (SELECT COUNT(*) FROM borrowings WHERE book_id = $1 AND status = 'active')
        FROM books WHERE id = $1
        "#,
    )
    .bind(book_id)
    .fetch_one(pool)
    .await
    .expect("Failed to read ledger")
}

async fn setup(copies: i32) -> (PgPool, Arc<BorrowingService>, Uuid) {
    let pool = pool().await;
    let book_id = insert_book(&pool, copies).await;
    let store = PgBorrowingStore::new(pool.clone(), 3);
    let service = BorrowingService::new(Repository::postgres(store), PolicyTable::default());
    (pool, Arc::new(service), book_id)
}

fn borrower(role: Role) -> Borrower {
    Borrower {
        user_id: Uuid::new_v4(),
        role,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Run with: cargo test -- --ignored
async fn test_concurrent_borrows_never_overbook() {
    const COPIES: i32 = 3;
    const EXTRA: usize = 7;

    let (pool, service, book_id) = setup(COPIES).await;
    let now = Utc::now();

    let handles: Vec<_> = (0..COPIES as usize + EXTRA)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .borrow(Some(borrower(Role::Student)), book_id, now)
                    .await
            })
        })
        .collect();

    let mut successes = 0;
    let mut out_of_stock = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(AppError::OutOfStock(id)) => {
                assert_eq!(id, book_id);
                out_of_stock += 1;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(successes, COPIES as usize);
    assert_eq!(out_of_stock, EXTRA);
    assert_eq!(ledger(&pool, book_id).await, (0, COPIES as i64));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_concurrent_double_return_releases_once() {
    let (pool, service, book_id) = setup(1).await;
    let owner = borrower(Role::Student);
    let receipt = service.borrow(Some(owner), book_id, Utc::now()).await.unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .return_book(owner, receipt.borrowing_id, book_id, Utc::now())
                    .await
            })
        })
        .collect();

    let mut returned = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => returned += 1,
            Err(AppError::AlreadyReturned(id)) => assert_eq!(id, receipt.borrowing_id),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(returned, 1);
    assert_eq!(ledger(&pool, book_id).await, (1, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_concurrent_borrows_respect_role_limit() {
    let (pool, service, book_id) = setup(20).await;
    let student = borrower(Role::Student);
    let now = Utc::now();

    let handles: Vec<_> = (0..9)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.borrow(Some(student), book_id, now).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(AppError::LimitReached { max, .. }) => assert_eq!(max, 5),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(successes, 5);
    assert_eq!(ledger(&pool, book_id).await, (15, 5));
}

#[tokio::test]
#[ignore]
async fn test_stranger_cannot_return() {
    let (pool, service, book_id) = setup(1).await;
    let owner = borrower(Role::Student);
    let receipt = service.borrow(Some(owner), book_id, Utc::now()).await.unwrap();

    let err = service
        .return_book(borrower(Role::Student), receipt.borrowing_id, book_id, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));
    assert_eq!(ledger(&pool, book_id).await, (0, 1));

    service
        .return_book(borrower(Role::Librarian), receipt.borrowing_id, book_id, Utc::now())
        .await
        .unwrap();
    assert_eq!(ledger(&pool, book_id).await, (1, 0));
}

#[tokio::test]
#[ignore]
async fn test_return_date_clamped_and_counted() {
    let (pool, service, book_id) = setup(2).await;
    let owner = borrower(Role::Student);
    let borrowed_at = Utc::now();
    let receipt = service.borrow(Some(owner), book_id, borrowed_at).await.unwrap();

    let returned = service
        .return_book(owner, receipt.borrowing_id, book_id, borrowed_at - Duration::hours(2))
        .await
        .unwrap();
    // Postgres keeps microseconds.
    assert!((returned.return_date - borrowed_at).num_milliseconds().abs() < 1);

    let store = PgBorrowingStore::new(pool.clone(), 0);
    let stats = store.count_borrowings(Utc::now()).await.unwrap();
    assert_eq!(stats.total, stats.active + stats.returned);
    assert!(stats.returned >= 1);
    assert!(stats.overdue <= stats.active);
}
