//! Operator preferences persisted as a single JSON document.

use serde::{Deserialize, Serialize};

use super::error::DomainError;
use super::types::{TableDensity, ThemeMode};

pub const MIN_ITEMS_PER_PAGE: u32 = 1;
pub const MAX_ITEMS_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub user_name: String,
    pub user_email: String,
    pub theme: ThemeMode,
    pub table_density: TableDensity,
    pub items_per_page: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            user_name: "Admin User".to_string(),
            user_email: "admin@corp.com".to_string(),
            theme: ThemeMode::Light,
            table_density: TableDensity::Normal,
            items_per_page: 10,
        }
    }
}

impl AppSettings {
    /// Overlay the fields present in `patch`.
    pub fn merged(&self, patch: &SettingsPatch) -> Self {
        Self {
            user_name: patch.user_name.clone().unwrap_or_else(|| self.user_name.clone()),
            user_email: patch
                .user_email
                .clone()
                .unwrap_or_else(|| self.user_email.clone()),
            theme: patch.theme.unwrap_or(self.theme),
            table_density: patch.table_density.unwrap_or(self.table_density),
            items_per_page: patch.items_per_page.unwrap_or(self.items_per_page),
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.user_name.trim().is_empty() {
            return Err(DomainError::validation("user_name", "must not be empty"));
        }
        if !(MIN_ITEMS_PER_PAGE..=MAX_ITEMS_PER_PAGE).contains(&self.items_per_page) {
            return Err(DomainError::validation(
                "items_per_page",
                format!("must be between {MIN_ITEMS_PER_PAGE} and {MAX_ITEMS_PER_PAGE}"),
            ));
        }
        Ok(())
    }
}

/// Partial settings update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub theme: Option<ThemeMode>,
    pub table_density: Option<TableDensity>,
    pub items_per_page: Option<u32>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
