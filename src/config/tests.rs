use std::io::Write;

use super::*;
use crate::domain::types::{StatusFilter, UserStatus};

#[test]
fn defaults_match_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert_eq!(settings.cache.stale_time_ms, 300_000);
    assert_eq!(settings.cache.gc_time_ms, 300_000);
    assert_eq!(settings.cache.retry, 1);
    assert_eq!(settings.users.search_debounce, Duration::from_millis(500));
    assert_eq!(settings.backend.read_latency, Duration::from_millis(600));
    assert_eq!(settings.backend.write_latency, Duration::from_millis(800));
    assert!(settings.backend.seed);
    assert_eq!(settings.preferences.path, None);
    assert_eq!(settings.notifications.toast_ttl, Duration::from_secs(4));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("info".to_string());
    raw.backend.read_latency_ms = Some(600);

    let overrides = GlobalOverrides {
        log_level: Some("debug".to_string()),
        backend_read_latency_ms: Some(0),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.backend.read_latency, Duration::ZERO);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = GlobalOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_debounce_is_rejected() {
    let mut raw = RawSettings::default();
    raw.users.search_debounce_ms = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero debounce");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "users.search_debounce_ms",
            ..
        }
    ));
}

#[test]
fn unbounded_retry_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.retry = Some(50);

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "cache.retry",
            ..
        })
    ));
}

#[test]
fn invalid_log_level_is_reported() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "logging.level",
            ..
        })
    ));
}

#[test]
fn config_file_is_layered_under_cli() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    writeln!(
        file,
        "[cache]\ngc_time_ms = 0\nretry = 2\n\n[backend]\nseed = false\nwrite_latency_ms = 10\n\n[logging]\nlevel = \"warn\""
    )
    .expect("write config");

    let args = CliArgs::parse_from([
        "roster",
        "--config-file",
        file.path().to_str().expect("utf-8 path"),
        "--log-level",
        "trace",
        "demo",
    ]);
    let settings = load(&args).expect("valid settings");

    assert_eq!(settings.cache.gc_time_ms, 0);
    assert_eq!(settings.cache.retry, 2);
    assert!(!settings.backend.seed);
    assert_eq!(settings.backend.write_latency, Duration::from_millis(10));
    assert_eq!(settings.logging.level, LevelFilter::TRACE);
}

#[test]
fn parse_users_list_arguments() {
    let args = CliArgs::parse_from([
        "roster",
        "users",
        "list",
        "--search",
        "ana",
        "--status",
        "pending",
        "--page",
        "2",
        "--page-size",
        "5",
    ]);

    match args.command.expect("users command") {
        Command::Users(UsersArgs {
            command: UsersCommand::List(list),
        }) => {
            assert_eq!(list.search.as_deref(), Some("ana"));
            assert_eq!(list.status, Some(StatusFilter::Only(UserStatus::Pending)));
            assert_eq!(list.page, 2);
            assert_eq!(list.page_size, Some(5));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn global_flags_follow_the_subcommand() {
    let args = CliArgs::parse_from([
        "roster",
        "settings",
        "show",
        "--log-json",
        "yes",
    ]);

    assert_eq!(args.overrides.log_json, Some(true));
    assert!(matches!(
        args.command,
        Some(Command::Settings(SettingsArgs {
            command: SettingsCommand::Show
        }))
    ));
}

#[test]
fn create_defaults_to_active_user() {
    let args = CliArgs::parse_from([
        "roster",
        "users",
        "create",
        "--name",
        "Ana Souza",
        "--email",
        "ana.souza@corp.com",
    ]);

    let Some(Command::Users(UsersArgs {
        command: UsersCommand::Create(create),
    })) = args.command
    else {
        panic!("expected users create");
    };
    assert_eq!(create.role, crate::domain::types::UserRole::User);
    assert_eq!(create.status, UserStatus::Active);
}
