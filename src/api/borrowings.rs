//! Borrowing endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        book::Book,
        borrowing::{
            BorrowReceipt, BorrowingDetails, BorrowingStats, OverdueBorrowing, ReturnReceipt,
        },
    },
};

use super::AuthenticatedUser;

/// Borrow request
#[derive(Deserialize, ToSchema)]
pub struct BorrowRequest {
    /// Book to borrow
    pub book_id: Uuid,
}

/// Return request
#[derive(Deserialize, ToSchema)]
pub struct ReturnRequest {
    /// Book the borrowing refers to
    pub book_id: Uuid,
}

/// Get a book with its availability counters
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    params(
        ("id" = Uuid, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<crate::AppState>,
    Path(book_id): Path<Uuid>,
) -> AppResult<Json<Book>> {
    let book = state.services.borrowings.get_book(book_id).await?;
    Ok(Json(book))
}

/// Borrow a book as the authenticated user
#[utoipa::path(
    post,
    path = "/borrowings",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    request_body = BorrowRequest,
    responses(
        (status = 201, description = "Borrowing created", body = BorrowReceipt),
        (status = 401, description = "No borrower identity"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "No copies available"),
        (status = 422, description = "Borrowing limit reached"),
        (status = 503, description = "Storage unavailable, safe to retry")
    )
)]
pub async fn borrow_book(
    State(state): State<crate::AppState>,
    user: Option<AuthenticatedUser>,
    Json(request): Json<BorrowRequest>,
) -> AppResult<(StatusCode, Json<BorrowReceipt>)> {
    let borrower = user.map(|AuthenticatedUser(claims)| claims.borrower());

    let receipt = state
        .services
        .borrowings
        .borrow(borrower, request.book_id, Utc::now())
        .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/borrowings/{id}/return",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Borrowing ID")
    ),
    request_body = ReturnRequest,
    responses(
        (status = 200, description = "Book returned", body = ReturnReceipt),
        (status = 403, description = "Borrowing belongs to another user"),
        (status = 404, description = "Borrowing not found"),
        (status = 409, description = "Already returned"),
        (status = 503, description = "Storage unavailable, safe to retry")
    )
)]
pub async fn return_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(borrowing_id): Path<Uuid>,
    Json(request): Json<ReturnRequest>,
) -> AppResult<Json<ReturnReceipt>> {
    let receipt = state
        .services
        .borrowings
        .return_book(claims.borrower(), borrowing_id, request.book_id, Utc::now())
        .await?;

    Ok(Json(receipt))
}

/// Borrowings of the authenticated user
#[utoipa::path(
    get,
    path = "/me/borrowings",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "User's borrowings, newest first", body = Vec<BorrowingDetails>)
    )
)]
pub async fn my_borrowings(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<BorrowingDetails>>> {
    let borrowings = state
        .services
        .borrowings
        .user_borrowings(claims.user_id, Utc::now())
        .await?;
    Ok(Json(borrowings))
}

/// All borrowings (staff)
#[utoipa::path(
    get,
    path = "/borrowings",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All borrowings, newest first", body = Vec<BorrowingDetails>),
        (status = 403, description = "Staff privileges required")
    )
)]
pub async fn list_borrowings(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<BorrowingDetails>>> {
    claims.require_staff()?;

    let borrowings = state.services.borrowings.all_borrowings(Utc::now()).await?;
    Ok(Json(borrowings))
}

/// Overdue borrowings (staff)
#[utoipa::path(
    get,
    path = "/borrowings/overdue",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Active borrowings past their due date", body = Vec<OverdueBorrowing>),
        (status = 403, description = "Staff privileges required")
    )
)]
pub async fn overdue_report(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<OverdueBorrowing>>> {
    claims.require_staff()?;

    let report = state.services.borrowings.overdue_report(Utc::now()).await?;
    Ok(Json(report))
}

/// Borrowing counters (staff)
#[utoipa::path(
    get,
    path = "/stats/borrowings",
    tag = "stats",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Borrowing counters", body = BorrowingStats),
        (status = 403, description = "Staff privileges required")
    )
)]
pub async fn borrowing_stats(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<BorrowingStats>> {
    claims.require_staff()?;

    let stats = state.services.borrowings.stats(Utc::now()).await?;
    Ok(Json(stats))
}
