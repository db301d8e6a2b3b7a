use super::*;

use std::{
    env,
    time::{SystemTime, UNIX_EPOCH},
};

fn unique_suffix() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos()
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(normalize_database_url("  "), Settings::default().database_url);
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
}

#[test]
fn malformed_file_values_keep_previous_settings() {
    let mut settings = Settings::default();
    let flat = parse_flat_table("request_timeout_secs = \"soon\"\nrestore_policy = \"sometimes\"\n")
        .expect("toml");
    settings.apply_file_values(&flat);

    assert_eq!(settings.request_timeout_secs, Settings::default().request_timeout_secs);
    assert_eq!(settings.restore_policy, RestorePolicy::Trust);
}

#[test]
fn file_values_override_defaults_and_env_overrides_file() {
    let temp_root = env::temp_dir().join(format!("pulse_config_file_{}", unique_suffix()));
    fs::create_dir_all(&temp_root).expect("temp root");
    let path = temp_root.join("pulse.toml");
    fs::write(
        &path,
        "ai_url = \"https://ai.example.test/ask\"\nrequest_timeout_secs = 5\nrestore_policy = \"verify\"\n",
    )
    .expect("write config");

    let mut settings = Settings::default();
    let raw = fs::read_to_string(&path).expect("read");
    let flat = parse_flat_table(&raw).expect("toml");
    settings.apply_file_values(&flat);

    assert_eq!(settings.ai_url, "https://ai.example.test/ask");
    assert_eq!(settings.request_timeout_secs, 5);
    assert_eq!(settings.restore_policy, RestorePolicy::Verify);

    settings.apply_env(|name| match name {
        "PULSE_AI_URL" => Some("https://override.example.test/ai".to_string()),
        "PULSE_REQUEST_TIMEOUT_SECS" => Some("not-a-number".to_string()),
        _ => None,
    });
    assert_eq!(settings.ai_url, "https://override.example.test/ai");
    assert_eq!(settings.request_timeout_secs, 5);

    fs::remove_dir_all(temp_root).expect("cleanup");
}

#[test]
fn load_settings_reads_explicit_config_path() {
    let temp_root = env::temp_dir().join(format!("pulse_config_load_{}", unique_suffix()));
    fs::create_dir_all(&temp_root).expect("temp root");
    let path = temp_root.join("custom.toml");
    fs::write(&path, "payment_url = \"https://pay.example.test/\"\n").expect("write config");

    let settings = load_settings(Some(&path));
    if env::var("PULSE_PAYMENT_URL").is_err() {
        assert_eq!(settings.payment_url, "https://pay.example.test/");
    }

    fs::remove_dir_all(temp_root).expect("cleanup");
}

#[test]
fn endpoints_reject_non_http_schemes() {
    let settings = Settings {
        profile_url: "ftp://example.test/profile".into(),
        ..Settings::default()
    };
    let err = settings.endpoints().expect_err("ftp must be rejected");
    assert!(err.to_string().contains("profile_url"));

    let settings = Settings {
        auth_url: "not a url".into(),
        ..Settings::default()
    };
    assert!(settings.endpoints().is_err());
    assert!(Settings::default().endpoints().is_ok());
}

#[test]
fn restore_policy_parses_known_values_only() {
    assert_eq!("Verify".parse::<RestorePolicy>().expect("verify"), RestorePolicy::Verify);
    assert_eq!("trust".parse::<RestorePolicy>().expect("trust"), RestorePolicy::Trust);
    assert!("sometimes".parse::<RestorePolicy>().is_err());
}

#[test]
fn request_timeout_is_never_zero() {
    let settings = Settings {
        request_timeout_secs: 0,
        ..Settings::default()
    };
    assert_eq!(settings.request_timeout(), Duration::from_secs(1));
}
