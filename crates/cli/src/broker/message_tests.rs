// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::{json, Value};

use super::MessageBuilder;
use crate::config::BrokerSurveyConfig;
use crate::survey::SurveyMatch;
use crate::test_support::survey_group;

fn config_with(user_data: Value) -> anyhow::Result<BrokerSurveyConfig> {
    let mut config = BrokerSurveyConfig::default();
    config.user_data = serde_json::from_value(user_data)?;
    Ok(config)
}

#[test]
fn message_round_trips_computed_and_user_fields() -> anyhow::Result<()> {
    let config = config_with(json!({"instance": "vm-42", "attempt": 3, "tags": ["a", "b"]}))?;
    let builder = MessageBuilder::new(&config);
    let group = survey_group("boot", "login:")?;
    let hit = SurveyMatch { group: &group, line: "localhost login: \"quoted\" \\ tab\t" };

    let message = builder.build(&hit)?;
    let parsed: Value = serde_json::from_slice(&message.payload)?;

    assert_eq!(parsed["line"], "localhost login: \"quoted\" \\ tab\t");
    assert_eq!(parsed["matched_pattern"], "login:");
    assert!(parsed["timestamp"].as_str().is_some_and(|t| t.ends_with('Z')));
    assert_eq!(parsed["instance"], "vm-42");
    assert_eq!(parsed["attempt"], 3);
    assert_eq!(parsed["tags"], json!(["a", "b"]));
    assert_eq!(parsed["name"], "boot");
    Ok(())
}

#[test]
fn payload_is_a_single_line() -> anyhow::Result<()> {
    let builder = MessageBuilder::new(&BrokerSurveyConfig::default());
    let group = survey_group("boot", "login:")?;
    let message = builder.build(&SurveyMatch { group: &group, line: "a\nb" })?;
    assert!(!message.payload.contains(&b'\n'));
    Ok(())
}

#[test]
fn group_data_overrides_global_user_data() -> anyhow::Result<()> {
    let config = config_with(json!({"stage": "global", "keep": true}))?;
    let builder = MessageBuilder::new(&config);
    let mut group = survey_group("boot", "login:")?;
    group.data = serde_json::from_value(json!({"stage": "login"}))?;

    let message = builder.build(&SurveyMatch { group: &group, line: "login:" })?;
    let parsed: Value = serde_json::from_slice(&message.payload)?;
    assert_eq!(parsed["stage"], "login");
    assert_eq!(parsed["keep"], true);
    Ok(())
}

#[test]
fn computed_fields_cannot_be_overridden() -> anyhow::Result<()> {
    let config = config_with(json!({"line": "spoofed", "matched_pattern": "spoofed"}))?;
    let builder = MessageBuilder::new(&config);
    let group = survey_group("boot", "login:")?;

    let message = builder.build(&SurveyMatch { group: &group, line: "real login:" })?;
    let parsed: Value = serde_json::from_slice(&message.payload)?;
    assert_eq!(parsed["line"], "real login:");
    assert_eq!(parsed["matched_pattern"], "login:");
    Ok(())
}

#[test]
fn user_data_may_replace_the_template_name() -> anyhow::Result<()> {
    let config = config_with(json!({"name": "custom"}))?;
    let builder = MessageBuilder::new(&config);
    let group = survey_group("boot", "login:")?;

    let message = builder.build(&SurveyMatch { group: &group, line: "login:" })?;
    let parsed: Value = serde_json::from_slice(&message.payload)?;
    assert_eq!(parsed["name"], "custom");
    Ok(())
}

#[test]
fn template_placeholders_render_in_nested_values() -> anyhow::Result<()> {
    let mut config = BrokerSurveyConfig::default();
    config.message_template = serde_json::from_value(json!({
        "summary": "{name} saw {matched_pattern}",
        "detail": {"raw": "[{line}]", "count": 1},
    }))?;
    let builder = MessageBuilder::new(&config);
    let mut group = survey_group("boot", "login:")?;
    group.display_name = Some("Login".to_owned());

    let message = builder.build(&SurveyMatch { group: &group, line: "x login:" })?;
    let parsed: Value = serde_json::from_slice(&message.payload)?;
    assert_eq!(parsed["summary"], "Login saw login:");
    assert_eq!(parsed["detail"], json!({"raw": "[x login:]", "count": 1}));
    Ok(())
}

#[test]
fn each_message_gets_a_fresh_id() -> anyhow::Result<()> {
    let builder = MessageBuilder::new(&BrokerSurveyConfig::default());
    let group = survey_group("boot", "login:")?;
    let hit = SurveyMatch { group: &group, line: "login:" };
    let a = builder.build(&hit)?;
    let b = builder.build(&hit)?;
    assert_ne!(a.id, b.id);
    Ok(())
}
