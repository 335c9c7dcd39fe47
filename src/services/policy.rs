//! Role-based loan policy

use chrono::{DateTime, Duration, Utc};

use crate::{
    config::{PolicyConfig, RoleRules},
    models::user::Role,
};

/// Loan duration and borrowing limit per role
#[derive(Debug, Clone)]
pub struct PolicyTable {
    student: RoleRules,
    faculty: RoleRules,
    librarian: RoleRules,
}

impl PolicyTable {
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            student: config.student,
            faculty: config.faculty,
            librarian: config.librarian.unwrap_or(config.student),
        }
    }

    pub fn rules_for(&self, role: Role) -> RoleRules {
        match role {
            Role::Student => self.student,
            Role::Faculty => self.faculty,
            Role::Librarian => self.librarian,
        }
    }

    pub fn due_date(&self, role: Role, borrowed_at: DateTime<Utc>) -> DateTime<Utc> {
        borrowed_at + Duration::days(self.rules_for(role).loan_days)
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::new(&PolicyConfig::default())
    }
}
