use thiserror::Error;

use crate::application::admin::users::AdminUserError;
use crate::application::settings::SettingsError;
use crate::infra::error::InfraError;

/// Top-level error of the command line front end.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Users(#[from] AdminUserError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("validation failed: {0}")]
    Validation(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Short operator-facing description.
    pub fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Users(AdminUserError::NotFound) => "Resource not found",
            AppError::Users(AdminUserError::ConstraintViolation(_))
            | AppError::Settings(SettingsError::Validation(_))
            | AppError::Validation(_) => "Input could not be accepted",
            AppError::Users(AdminUserError::Repo(_)) => "Users service unavailable",
            AppError::Settings(_) => "Settings could not be stored",
            AppError::Infra(InfraError::Configuration(_)) => "Configuration is invalid",
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
        }
    }

    /// The error and its sources, outermost first.
    pub fn chain(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        let mut current = std::error::Error::source(self);
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        messages
    }
}
