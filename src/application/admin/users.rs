use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::application::pagination::{PageRequest, Paginated};
use crate::application::repos::{RepoError, UserQueryFilter, UsersRepo};
use crate::domain::entities::{NewUser, UserRecord};
use crate::domain::types::{UserRole, UserStatus};

#[derive(Debug, Error)]
pub enum AdminUserError {
    #[error("{0}")]
    ConstraintViolation(&'static str),
    #[error("user not found")]
    NotFound,
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for AdminUserError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => Self::NotFound,
            other => Self::Repo(other),
        }
    }
}

impl AdminUserError {
    /// Message suitable for an operator-facing toast.
    pub fn public_message(&self) -> String {
        match self {
            AdminUserError::ConstraintViolation(field) => format!("Invalid {field}"),
            AdminUserError::NotFound => "User no longer exists".to_string(),
            AdminUserError::Repo(RepoError::Duplicate { .. }) => {
                "A user with this email already exists".to_string()
            }
            AdminUserError::Repo(_) => "The users service is unavailable".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateUserCommand {
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub status: UserStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateUserCommand {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub status: UserStatus,
}

/// Payload of the user form, validated at the service boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    Create(CreateUserCommand),
    Update(UpdateUserCommand),
}

impl UserInput {
    pub fn name(&self) -> &str {
        match self {
            UserInput::Create(command) => &command.name,
            UserInput::Update(command) => &command.name,
        }
    }
}

#[derive(Clone)]
pub struct AdminUserService {
    repo: Arc<dyn UsersRepo>,
}

impl AdminUserService {
    pub fn new(repo: Arc<dyn UsersRepo>) -> Self {
        Self { repo }
    }

    pub async fn list(
        &self,
        filter: &UserQueryFilter,
        page: PageRequest,
    ) -> Result<Paginated<UserRecord>, AdminUserError> {
        self.repo
            .list(filter, page)
            .await
            .map_err(AdminUserError::from)
    }

    pub async fn find(&self, id: Uuid) -> Result<UserRecord, AdminUserError> {
        self.repo.find(id).await?.ok_or(AdminUserError::NotFound)
    }

    /// Look a user up by email, case-insensitively.
    pub async fn find_by_email(&self, email: &str) -> Result<UserRecord, AdminUserError> {
        let filter = UserQueryFilter::new(email.trim(), Default::default());
        let matches = self.repo.list(&filter, PageRequest::new(1, u32::MAX)).await?;
        matches
            .data
            .into_iter()
            .find(|user| user.email.eq_ignore_ascii_case(email.trim()))
            .ok_or(AdminUserError::NotFound)
    }

    #[instrument(skip(self, command), fields(email = %command.email))]
    pub async fn create(&self, command: CreateUserCommand) -> Result<UserRecord, AdminUserError> {
        let name = normalize_name(&command.name)?;
        let email = normalize_email(&command.email)?;

        let created = self
            .repo
            .create(NewUser {
                name,
                email,
                role: command.role,
                status: command.status,
            })
            .await?;
        info!(user_id = %created.id, "User created");
        Ok(created)
    }

    #[instrument(skip(self, command), fields(user_id = %command.id))]
    pub async fn update(&self, command: UpdateUserCommand) -> Result<UserRecord, AdminUserError> {
        let name = normalize_name(&command.name)?;
        let email = normalize_email(&command.email)?;

        let mut record = self.find(command.id).await?;
        record.name = name;
        record.email = email;
        record.role = command.role;
        record.status = command.status;

        let updated = self.repo.update(record).await?;
        info!("User updated");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), AdminUserError> {
        self.repo.delete(id).await?;
        info!("User deleted");
        Ok(())
    }

    /// Create or update, depending on the form mode.
    pub async fn submit(&self, input: UserInput) -> Result<UserRecord, AdminUserError> {
        match input {
            UserInput::Create(command) => self.create(command).await,
            UserInput::Update(command) => self.update(command).await,
        }
    }
}

fn normalize_name(name: &str) -> Result<String, AdminUserError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AdminUserError::ConstraintViolation("name"));
    }
    Ok(trimmed.to_string())
}

/// Accept `local@domain.tld`-shaped addresses.
fn normalize_email(email: &str) -> Result<String, AdminUserError> {
    let trimmed = email.trim();
    let plausible = match trimmed.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
                && !trimmed.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !plausible {
        return Err(AdminUserError::ConstraintViolation("email"));
    }
    Ok(trimmed.to_string())
}
