//! Data models for Libris

pub mod book;
pub mod borrowing;
pub mod user;

// Re-export commonly used types
pub use book::{Book, BookShort};
pub use borrowing::{
    BorrowReceipt, Borrowing, BorrowingDetails, BorrowingStats, BorrowingStatus,
    BorrowingWithBook, NewBorrowing, OverdueBorrowing, ReturnReceipt,
};
pub use user::{Borrower, Role, UserClaims};
