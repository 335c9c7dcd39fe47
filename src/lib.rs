//! Libris - library borrowing tracker
//!
//! Keeps each book's available-copies counter and its active borrowings in
//! step under concurrent borrow and return requests, and serves the read
//! projections (own borrowings, all borrowings, overdue report) over a REST
//! JSON API.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

impl AppState {
    pub fn new(config: AppConfig, repository: repository::Repository) -> Self {
        let services = services::Services::new(repository, &config.policy);
        Self {
            config: Arc::new(config),
            services: Arc::new(services),
        }
    }
}
