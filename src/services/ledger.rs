//! Inventory ledger
//!
//! Sole writer of `Book::available_copies`. The in-memory store applies
//! [`reserve`] and [`release`] to staged rows; the Postgres store runs the
//! equivalent conditional statements below inside its transactions. Both keep
//! `0 <= available_copies <= total_copies`.

use crate::{
    error::{AppError, AppResult},
    models::book::Book,
};

/// Check-and-decrement. Matches no row when the shelf is empty.
pub(crate) const RESERVE_SQL: &str = r#"
    UPDATE books
    SET available_copies = available_copies - 1, updated_at = NOW()
    WHERE id = $1 AND available_copies > 0
    RETURNING available_copies
"#;

/// Increment clamped to the total.
pub(crate) const RELEASE_SQL: &str = r#"
    UPDATE books
    SET available_copies = LEAST(available_copies + 1, total_copies), updated_at = NOW()
    WHERE id = $1
    RETURNING available_copies
"#;

/// Take one copy off the shelf.
pub fn reserve(book: &mut Book) -> AppResult<()> {
    if book.available_copies <= 0 {
        return Err(AppError::OutOfStock(book.id));
    }
    book.available_copies -= 1;
    Ok(())
}

/// Put one copy back, never above `total_copies`.
///
/// Calling this twice for one borrowing is a caller bug; the clamp only keeps
/// the counter in bounds.
pub fn release(book: &mut Book) {
    if book.available_copies < book.total_copies {
        book.available_copies += 1;
    } else {
        tracing::warn!(book_id = %book.id, "Release on a fully stocked book ignored");
    }
}

/// `available + active == total`, with the counter in bounds
pub fn is_balanced(book: &Book, active_borrowings: usize) -> bool {
    book.available_copies >= 0
        && book.available_copies <= book.total_copies
        && book.available_copies as i64 + active_borrowings as i64 == book.total_copies as i64
}
