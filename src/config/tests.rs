use super::*;

fn render_args(extra: &[&str]) -> CliArgs {
    let mut argv = vec!["tessera", "render", "home"];
    argv.extend_from_slice(extra);
    CliArgs::parse_from(argv)
}

#[test]
fn defaults_apply_without_sources() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert!(settings.cache.enabled);
    assert_eq!(settings.cache.refresh_lease, Duration::from_secs(60));
    assert_eq!(settings.build.deadline, Duration::from_millis(10_000));
    assert_eq!(settings.build.strategy, BuildStrategy::Concurrent);
    assert_eq!(settings.build.block_relation, "block");
    assert_eq!(settings.build.domain, "localhost");
    assert_eq!(settings.formula.max_passes, 8);
    assert!(settings.formula.values.is_empty());
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("info".to_string());
    raw.build.deadline_ms = Some(500);
    raw.cache.enabled = Some(true);

    let cli = render_args(&[
        "--log-level",
        "debug",
        "--deadline-ms",
        "75",
        "--sequential",
        "--no-cache",
    ]);
    raw.apply_global_overrides(&cli.overrides);
    if let Command::Render(args) = &cli.command {
        raw.apply_render_overrides(args);
    }
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.build.deadline, Duration::from_millis(75));
    assert_eq!(settings.build.strategy, BuildStrategy::Sequential);
    assert!(!settings.cache.enabled);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let cli = CliArgs::parse_from(["tessera", "--log-json", "true", "eval", "x"]);

    raw.apply_global_overrides(&cli.overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn render_command_parses_request_arguments() {
    let cli = render_args(&["--path", "/news", "--query", "?page=2", "--repeat", "2"]);
    let Command::Render(args) = cli.command else {
        panic!("expected render command");
    };
    assert_eq!(args.page_id, "home");
    assert_eq!(args.request.path, "/news");
    assert_eq!(args.request.query, "?page=2");
    assert_eq!(args.repeat, 2);
    assert!(!args.sequential);
}

#[test]
fn zero_deadline_is_rejected() {
    let mut raw = RawSettings::default();
    raw.build.deadline_ms = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero deadline must fail");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "build.deadline_ms",
            ..
        }
    ));
}

#[test]
fn unknown_strategy_is_rejected() {
    let mut raw = RawSettings::default();
    raw.build.strategy = Some("eventually".to_string());

    let err = Settings::from_raw(raw).expect_err("unknown strategy must fail");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "build.strategy",
            ..
        }
    ));
}

#[test]
fn max_passes_must_stay_in_range() {
    for passes in [0, MAX_PASSES_LIMIT + 1] {
        let mut raw = RawSettings::default();
        raw.formula.max_passes = Some(passes);
        assert!(matches!(
            Settings::from_raw(raw),
            Err(LoadError::Invalid {
                key: "formula.max_passes",
                ..
            })
        ));
    }
}

#[test]
fn invalid_log_level_is_reported() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("chatty".to_string());
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "logging.level",
            ..
        })
    ));
}

#[test]
fn file_values_flow_into_settings() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tessera.toml");
    std::fs::write(
        &path,
        r#"
[build]
deadline_ms = 250
domain = "example.org"

[formula.values]
site_name = "Example"
"#,
    )
    .expect("write config");

    let cli = CliArgs::parse_from([
        "tessera",
        "--config-file",
        path.to_str().expect("utf-8 path"),
        "eval",
        "@config(site_name)",
    ]);
    let settings = load(&cli).expect("settings load");

    assert_eq!(settings.build.deadline, Duration::from_millis(250));
    assert_eq!(settings.build.domain, "example.org");
    assert_eq!(
        settings.formula.values.get("site_name"),
        Some(&Value::String("Example".into()))
    );
}
