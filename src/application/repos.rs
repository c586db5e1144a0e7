//! Repository traits describing backend adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::application::pagination::{PageRequest, Paginated};
use crate::domain::entities::{NewUser, UserRecord};
use crate::domain::types::StatusFilter;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("backend unavailable: {message}")]
    Unavailable { message: String },
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Filter applied to the users list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct UserQueryFilter {
    /// Case-insensitive substring matched against name and email. Empty matches all.
    pub search: String,
    pub status: StatusFilter,
}

impl UserQueryFilter {
    pub fn new(search: impl Into<String>, status: StatusFilter) -> Self {
        Self {
            search: search.into(),
            status,
        }
    }

    pub fn matches(&self, user: &UserRecord) -> bool {
        if !self.status.matches(user.status) {
            return false;
        }
        let needle = self.search.trim().to_lowercase();
        needle.is_empty()
            || user.name.to_lowercase().contains(&needle)
            || user.email.to_lowercase().contains(&needle)
    }
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn list(
        &self,
        filter: &UserQueryFilter,
        page: PageRequest,
    ) -> Result<Paginated<UserRecord>, RepoError>;

    async fn find(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError>;

    async fn create(&self, user: NewUser) -> Result<UserRecord, RepoError>;

    async fn update(&self, user: UserRecord) -> Result<UserRecord, RepoError>;

    async fn delete(&self, id: Uuid) -> Result<(), RepoError>;
}

/// Storage for the single preferences document.
pub trait PreferenceStore: Send + Sync {
    fn load(&self) -> Result<Option<String>, RepoError>;

    fn store(&self, blob: &str) -> Result<(), RepoError>;
}
