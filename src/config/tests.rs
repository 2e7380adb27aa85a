use clap::Parser;

use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn defaults_are_usable() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert!(settings.database.url.is_none());
    assert_eq!(settings.session.lifetime, Duration::from_secs(12 * 60 * 60));
    assert_eq!(settings.session.cookie_name, "session");
    assert!(!settings.session.cookie_secure);
    assert_eq!(settings.templates.directory, PathBuf::from("ui/html"));
}

#[test]
fn blank_database_url_means_in_memory() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
}

#[test]
fn zero_session_lifetime_is_rejected() {
    let mut raw = RawSettings::default();
    raw.session.lifetime_minutes = Some(0);
    let err = Settings::from_raw(raw).expect_err("invalid");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "session.lifetime_minutes",
            ..
        }
    ));
}

#[test]
fn cookie_name_must_be_a_token() {
    let mut raw = RawSettings::default();
    raw.session.cookie_name = Some("my session".to_string());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["bestdeal"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "bestdeal",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--database-url",
        "postgres://override",
        "--session-cookie-secure",
        "true",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(
                serve.overrides.database_url.as_deref(),
                Some("postgres://override")
            );
            assert_eq!(serve.overrides.session_cookie_secure, Some(true));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_migrate_arguments() {
    let args = CliArgs::parse_from(["bestdeal", "migrate", "--database-url", "postgres://example"]);

    match args.command.expect("migrate command") {
        Command::Migrate(migrate) => {
            assert_eq!(
                migrate.database.database_url.as_deref(),
                Some("postgres://example")
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_check_templates_arguments() {
    let args = CliArgs::parse_from([
        "bestdeal",
        "check-templates",
        "--templates-directory",
        "/srv/html",
    ]);

    match args.command.expect("check-templates command") {
        Command::CheckTemplates(check) => {
            assert_eq!(
                check.templates_directory.as_deref(),
                Some(std::path::Path::new("/srv/html"))
            );
        }
        _ => panic!("wrong command parsed"),
    }
}
