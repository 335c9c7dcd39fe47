//! Business logic services

pub mod borrowings;
pub mod ledger;
pub mod policy;

use crate::{config::PolicyConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub borrowings: borrowings::BorrowingService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, policy: &PolicyConfig) -> Self {
        Self {
            borrowings: borrowings::BorrowingService::new(
                repository,
                policy::PolicyTable::new(policy),
            ),
        }
    }
}
