use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

use crate::domain::types::{StatusFilter, TableDensity, ThemeMode, UserRole, UserStatus};

/// Command-line arguments for the roster binary.
#[derive(Debug, Parser)]
#[command(name = "roster", version, about = "User directory admin console")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "ROSTER_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the simulated backend read latency.
    #[arg(long = "backend-read-latency-ms", value_name = "MILLIS", global = true)]
    pub backend_read_latency_ms: Option<u64>,

    /// Override the simulated backend write latency.
    #[arg(long = "backend-write-latency-ms", value_name = "MILLIS", global = true)]
    pub backend_write_latency_ms: Option<u64>,

    /// Override the preferences file location.
    #[arg(
        long = "preferences-path",
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        global = true
    )]
    pub preferences_path: Option<PathBuf>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Browse and edit the user directory.
    Users(UsersArgs),
    /// Show or change operator preferences.
    Settings(SettingsArgs),
    /// Walk through the users list flow against the seeded backend.
    Demo,
}

#[derive(Debug, Args, Clone)]
pub struct UsersArgs {
    #[command(subcommand)]
    pub command: UsersCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum UsersCommand {
    /// Print one page of the users list.
    List(ListArgs),
    /// Create a user.
    Create(CreateArgs),
    /// Delete the user with the given email.
    Delete(DeleteArgs),
}

#[derive(Debug, Args, Clone, Default)]
pub struct ListArgs {
    /// Case-insensitive match against name and email.
    #[arg(long, value_name = "TEXT")]
    pub search: Option<String>,

    /// ALL, ACTIVE, INACTIVE or PENDING.
    #[arg(long, value_name = "STATUS")]
    pub status: Option<StatusFilter>,

    /// 1-based page number.
    #[arg(long, value_name = "PAGE", default_value_t = 1)]
    pub page: u32,

    /// Rows per page. Defaults to the stored `itemsPerPage` preference.
    #[arg(long = "page-size", value_name = "COUNT")]
    pub page_size: Option<u32>,
}

#[derive(Debug, Args, Clone)]
pub struct CreateArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub email: String,

    /// ADMIN, MANAGER or USER.
    #[arg(long, value_name = "ROLE", default_value = "USER")]
    pub role: UserRole,

    /// ACTIVE, INACTIVE or PENDING.
    #[arg(long, value_name = "STATUS", default_value = "ACTIVE")]
    pub status: UserStatus,
}

#[derive(Debug, Args, Clone)]
pub struct DeleteArgs {
    #[arg(long)]
    pub email: String,
}

#[derive(Debug, Args, Clone)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub command: SettingsCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum SettingsCommand {
    /// Print the stored preferences.
    Show,
    /// Change one or more preferences and save them.
    Set(SetArgs),
}

#[derive(Debug, Args, Clone, Default)]
pub struct SetArgs {
    #[arg(long = "user-name", value_name = "NAME")]
    pub user_name: Option<String>,

    #[arg(long = "user-email", value_name = "EMAIL")]
    pub user_email: Option<String>,

    /// light or dark.
    #[arg(long, value_name = "THEME")]
    pub theme: Option<ThemeMode>,

    /// compact or normal.
    #[arg(long = "table-density", value_name = "DENSITY")]
    pub table_density: Option<TableDensity>,

    #[arg(long = "items-per-page", value_name = "COUNT")]
    pub items_per_page: Option<u32>,
}
