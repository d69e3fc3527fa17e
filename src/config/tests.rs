use super::*;

fn raw() -> RawSettings {
    RawSettings::default()
}

#[test]
fn defaults_validate() {
    let settings = raw().validate().expect("default settings");

    assert_eq!(settings.debounce, Duration::from_millis(100));
    assert_eq!(settings.channel_capacity, 64);
    assert_eq!(settings.display.scale, 40);
    assert_eq!(settings.logging.format, LogFormat::Compact);
}

#[test]
fn zero_debounce_is_rejected() {
    let mut settings = raw();
    settings.debounce_ms = Some(0);

    let err = settings.validate().expect_err("zero debounce rejected");
    assert!(matches!(err, SettingsError::Invalid { field: "debounce_ms", .. }));
}

#[test]
fn out_of_range_scale_is_rejected() {
    let mut settings = raw();
    settings.display.scale = Some(5000);

    let err = settings.validate().expect_err("oversized scale rejected");
    assert!(matches!(err, SettingsError::Invalid { field: "display.scale", .. }));
}

#[test]
fn level_filter_parses_from_text() {
    let mut settings = raw();
    settings.logging.level = Some("debug".to_string());

    let parsed = settings.validate().expect("debug level");
    assert_eq!(parsed.logging.level, LevelFilter::DEBUG);
}

#[test]
fn unknown_level_filter_is_rejected() {
    let mut settings = raw();
    settings.logging.level = Some("chatty".to_string());

    let err = settings.validate().expect_err("unknown level rejected");
    assert!(matches!(err, SettingsError::Invalid { field: "logging.level", .. }));
}

#[test]
fn loading_without_file_or_env_yields_defaults() {
    let settings = ViewerSettings::load(None).expect("settings from empty sources");
    assert_eq!(settings.display.view_mode, ViewMode::Page);
    assert_eq!(settings.fetch_timeout, Duration::from_secs(30));
}
