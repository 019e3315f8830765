// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde_json::json;

use super::{load_survey_file, BrokerSurveyConfig, Config, LogSurveyConfig, Settings, SurveyFile};
use crate::action::ActionKind;

fn parse(args: &[&str]) -> Config {
    Config::parse_from(args)
}

fn survey_file(value: serde_json::Value) -> anyhow::Result<SurveyFile> {
    Ok(serde_json::from_value(value)?)
}

fn boot_file() -> anyhow::Result<SurveyFile> {
    survey_file(json!({
        "target_file": "/var/log/console.log",
        "timeout": 5,
        "end_reconn": "boot",
        "survey_groups": [
            {"name": "kernel", "pattern": "Linux version"},
            {"name": "boot", "pattern": "login:"}
        ]
    }))
}

#[test]
fn file_values_apply_without_overrides() -> anyhow::Result<()> {
    let settings = parse(&["reconn"]).resolve(boot_file()?);
    settings.validate()?;
    assert_eq!(settings.target_file, PathBuf::from("/var/log/console.log"));
    assert_eq!(settings.timeout, Duration::from_secs(300));
    assert_eq!(settings.end_reconn.as_deref(), Some("boot"));
    assert_eq!(settings.survey_groups.len(), 2);
    assert_eq!(settings.survey_groups[0].success, "log_survey");
    Ok(())
}

#[test]
fn command_line_overrides_file() -> anyhow::Result<()> {
    let config = parse(&[
        "reconn",
        "--target-file",
        "/tmp/other.log",
        "--timeout",
        "1",
        "--end-reconn",
        "kernel",
    ]);
    let settings = config.resolve(boot_file()?);
    settings.validate()?;
    assert_eq!(settings.target_file, Path::new("/tmp/other.log"));
    assert_eq!(settings.timeout, Duration::from_secs(60));
    assert_eq!(settings.end_reconn.as_deref(), Some("kernel"));
    Ok(())
}

#[test]
fn defaults_when_unset() -> anyhow::Result<()> {
    let config = parse(&["reconn", "--target-file", "/tmp/console.log"]);
    assert_eq!(config.config_file, Path::new("/etc/reconn/reconn.json"));
    assert_eq!(config.log_format, "text");
    assert_eq!(config.log_level, "info");

    let file = survey_file(json!({"survey_groups": [{"name": "boot", "pattern": "login:"}]}))?;
    let settings = config.resolve(file);
    settings.validate()?;
    assert_eq!(settings.timeout, Duration::from_secs(20 * 60));
    assert_eq!(settings.end_reconn, None);
    assert!(settings.log_survey.is_none());
    Ok(())
}

#[test]
fn empty_end_reconn_means_no_end_group() -> anyhow::Result<()> {
    let settings = parse(&["reconn", "--end-reconn", ""]).resolve(boot_file()?);
    assert_eq!(settings.end_reconn, None);
    Ok(())
}

#[test]
fn huge_timeout_saturates() -> anyhow::Result<()> {
    let settings = parse(&["reconn", "--timeout", "18446744073709551615"]).resolve(boot_file()?);
    settings.validate()?;
    assert_eq!(settings.timeout, Duration::from_secs(u64::MAX));

    let mut file = boot_file()?;
    file.timeout = Some(u64::MAX / 2);
    assert_eq!(parse(&["reconn"]).resolve(file).timeout, Duration::from_secs(u64::MAX));
    Ok(())
}

#[test]
fn zero_timeout_is_accepted() -> anyhow::Result<()> {
    let settings = parse(&["reconn", "--timeout", "0"]).resolve(boot_file()?);
    settings.validate()?;
    assert_eq!(settings.timeout, Duration::ZERO);
    Ok(())
}

#[yare::parameterized(
    no_target       = { json!({"survey_groups": [{"name": "a", "pattern": "x"}]}),
                        "no target file configured" },
    no_groups       = { json!({"target_file": "/t"}), "no survey groups configured" },
    duplicate_group = { json!({"target_file": "/t", "survey_groups": [
                            {"name": "a", "pattern": "x"}, {"name": "a", "pattern": "y"}]}),
                        "duplicate survey group: a" },
    empty_name      = { json!({"target_file": "/t", "survey_groups": [
                            {"name": "", "pattern": "x"}]}),
                        "empty name" },
    empty_pattern   = { json!({"target_file": "/t", "survey_groups": [
                            {"name": "a", "pattern": ""}]}),
                        "empty pattern" },
    bad_pattern     = { json!({"target_file": "/t", "survey_groups": [
                            {"name": "a", "pattern": "("}]}),
                        "invalid pattern for survey group a" },
    unknown_action  = { json!({"target_file": "/t", "survey_groups": [
                            {"name": "a", "pattern": "x", "success": "page_oncall"}]}),
                        "survey group a" },
    broker_missing  = { json!({"target_file": "/t", "survey_groups": [
                            {"name": "a", "pattern": "x", "success": "broker_survey"}]}),
                        "no broker_survey section" },
    unknown_end     = { json!({"target_file": "/t", "end_reconn": "zzz",
                            "survey_groups": [{"name": "a", "pattern": "x"}]}),
                        "unknown survey group: zzz" },
)]
fn invalid_settings(file: serde_json::Value, expected_substr: &str) {
    let Ok(file) = serde_json::from_value::<SurveyFile>(file) else {
        unreachable!("fixture must deserialize");
    };
    let settings = parse(&["reconn"]).resolve(file);
    crate::assert_err_contains!(settings.validate(), expected_substr);
}

#[test]
fn unknown_keys_are_rejected() {
    let result = serde_json::from_value::<SurveyFile>(json!({"target": "/t"}));
    crate::assert_err_contains!(result, "unknown field `target`");
}

#[test]
fn action_kinds_are_distinct_in_first_use_order() -> anyhow::Result<()> {
    let file = survey_file(json!({
        "target_file": "/t",
        "survey_groups": [
            {"name": "a", "pattern": "x", "success": "broker_survey"},
            {"name": "b", "pattern": "y"},
            {"name": "c", "pattern": "z", "success": "broker_survey"}
        ],
        "broker_survey": {}
    }))?;
    let settings = parse(&["reconn"]).resolve(file);
    settings.validate()?;
    assert_eq!(settings.action_kinds()?, vec![ActionKind::BrokerSurvey, ActionKind::LogSurvey]);
    Ok(())
}

#[test]
fn action_sections_fill_defaults() -> anyhow::Result<()> {
    let file = survey_file(json!({
        "log_survey": {"log_file": "/tmp/survey.log"},
        "broker_survey": {"url": "nats://broker:4222", "user_data": {"instance": "vm-1"}}
    }))?;

    let log = file.log_survey.unwrap_or_default();
    assert_eq!(log.log_file, Path::new("/tmp/survey.log"));
    assert_eq!(log.log_format, LogSurveyConfig::default().log_format);

    let broker = file.broker_survey.unwrap_or_default();
    assert_eq!(broker.url, "nats://broker:4222");
    assert_eq!(broker.exchange, "RECONN");
    assert_eq!(broker.queue, "reconn_survey");
    assert_eq!(broker.routing_key, "reconn.survey");
    assert_eq!(broker.message_template.get("name"), Some(&json!("{name}")));
    assert_eq!(broker.user_data.get("instance"), Some(&json!("vm-1")));
    Ok(())
}

#[test]
fn broker_debug_redacts_credentials() {
    let config = BrokerSurveyConfig {
        user: Some("reconn".to_owned()),
        password: Some("hunter2".to_owned()),
        token: Some("s3cr3t".to_owned()),
        ..Default::default()
    };
    let debug = format!("{config:?}");
    assert!(debug.contains("reconn"));
    assert!(!debug.contains("hunter2"), "{debug}");
    assert!(!debug.contains("s3cr3t"), "{debug}");
}

#[test]
fn load_reads_and_validates_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("reconn.json");
    std::fs::write(&path, serde_json::to_vec(&boot_file()?)?)?;

    let path_arg = path.to_string_lossy().into_owned();
    let config = parse(&["reconn", "--config-file", path_arg.as_str()]);
    let settings = config.load()?;
    assert_eq!(settings.survey_groups[1].name, "boot");
    Ok(())
}

#[test]
fn load_reports_missing_and_malformed_files() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let missing = dir.path().join("missing.json");
    crate::assert_err_contains!(load_survey_file(&missing), "reading config file");

    let malformed = dir.path().join("bad.json");
    std::fs::write(&malformed, "{ not json")?;
    crate::assert_err_contains!(load_survey_file(&malformed), "parsing config file");
    Ok(())
}

#[test]
fn poll_interval_field_override() {
    let mut config = parse(&["reconn"]);
    config.poll_interval_ms = Some(5);
    assert_eq!(config.poll_interval(), Duration::from_millis(5));
}

#[test]
#[serial_test::serial]
fn poll_interval_from_env() {
    std::env::set_var("RECONN_POLL_INTERVAL_MS", "250");
    let config = parse(&["reconn"]);
    let interval = config.poll_interval();
    std::env::remove_var("RECONN_POLL_INTERVAL_MS");
    assert_eq!(interval, Duration::from_millis(250));
}

#[test]
#[serial_test::serial]
fn poll_interval_default() {
    std::env::remove_var("RECONN_POLL_INTERVAL_MS");
    assert_eq!(parse(&["reconn"]).poll_interval(), Duration::from_secs(1));
}

#[test]
fn test_settings_are_valid() -> anyhow::Result<()> {
    let settings =
        Settings::test(Path::new("/tmp/console.log"), Path::new("/tmp/s.log"), &[("boot", "x")]);
    settings.validate()?;
    Ok(())
}
