//! Domain entities held by the users backend.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{UserRole, UserStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub status: UserStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub last_login: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub avatar_url: Option<String>,
}

/// Fields supplied when creating a user; the backend assigns the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub status: UserStatus,
}
