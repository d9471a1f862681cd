#![allow(clippy::unwrap_used, clippy::expect_used)]

use deploykit::{
    ADDRESS_LABEL, GROUP_NAME_LABEL, LabelSet, ModuleOptions, PipelineContext, Rule, RuleGroup,
    ServiceConfig,
};
use prometheus_module::PrometheusConfig;
use serde_json::json;

fn opts() -> ModuleOptions {
    ModuleOptions {
        target_group: "prometheus".to_owned(),
    }
}

fn context() -> PipelineContext {
    let mut ctx = PipelineContext::new("data");
    ctx.add_targets(
        "web",
        "linux",
        vec![LabelSet::from([
            (ADDRESS_LABEL, "10.0.1.1:9100"),
            (GROUP_NAME_LABEL, "web"),
        ])],
    );
    ctx.add_targets(
        "alerting",
        "alertmanager",
        vec![LabelSet::from([
            (ADDRESS_LABEL, "10.0.2.1:9093"),
            (GROUP_NAME_LABEL, "alerting"),
        ])],
    );
    ctx.add_rule_group("web", RuleGroup::new("web-linux", vec![Rule::alert("Down", "up == 0")]));
    ctx
}

#[test]
fn playbook_scrapes_every_projected_target() {
    let module = PrometheusConfig::default().build(&opts()).unwrap();
    let playbook = module.playbook(&context()).unwrap().unwrap();

    assert_eq!(playbook.roles[0].name, "prometheus");
    assert_eq!(playbook.vars["prometheus_version"], json!("2.43.0"));
    assert_eq!(
        playbook.vars["prometheus_web_listen_address"],
        json!("0.0.0.0:9090")
    );

    let jobs = playbook.vars["prometheus_scrape_configs"].as_array().unwrap();
    let names: Vec<_> = jobs.iter().map(|j| j["job_name"].as_str().unwrap()).collect();
    assert_eq!(names, ["alertmanager", "linux"]);
    assert_eq!(
        jobs[1]["static_configs"],
        json!([{"targets": ["10.0.1.1:9100"], "labels": {"group_name": "web"}}])
    );
}

#[test]
fn playbook_carries_rule_groups_and_alertmanagers() {
    let module = PrometheusConfig::default().build(&opts()).unwrap();
    let playbook = module.playbook(&context()).unwrap().unwrap();

    assert_eq!(
        playbook.vars["prometheus_rule_groups"]["groups"][0]["name"],
        json!("web-linux")
    );
    assert_eq!(
        playbook.vars["prometheus_alertmanager_config"],
        json!([{"static_configs": [{"targets": ["10.0.2.1:9093"]}]}])
    );
    assert_eq!(
        playbook.vars["prometheus_global"]["scrape_interval"],
        json!("15s")
    );
}

#[test]
fn no_alertmanager_config_without_alertmanagers() {
    let module = PrometheusConfig::default().build(&opts()).unwrap();
    let playbook = module
        .playbook(&PipelineContext::new("data"))
        .unwrap()
        .unwrap();
    assert!(!playbook.vars.contains_key("prometheus_alertmanager_config"));
    assert_eq!(playbook.vars["prometheus_scrape_configs"], json!([]));
}

#[test]
fn servers_follow_group_hosts() {
    let module = PrometheusConfig::default().build(&opts()).unwrap();
    let servers = module
        .prometheus_servers(
            &[
                LabelSet::from([(ADDRESS_LABEL, "10.0.0.1:22")]),
                LabelSet::from([(ADDRESS_LABEL, "[2001:db8::1]:22")]),
            ],
            "prometheus",
        )
        .unwrap();

    assert_eq!(servers[0].name, "prometheus on 10.0.0.1");
    assert_eq!(servers[0].url, "http://10.0.0.1:9090");
    assert_eq!(servers[1].url, "http://[2001:db8::1]:9090");
}

#[test]
fn self_scrape_target_uses_listen_port() {
    let module = PrometheusConfig::default().build(&opts()).unwrap();
    let targets = module
        .get_targets(&[LabelSet::from([(ADDRESS_LABEL, "10.0.0.1")])], "prometheus")
        .unwrap();
    assert_eq!(targets[0].address(), Some("10.0.0.1:9090"));
}

#[test]
fn timeout_longer_than_interval_is_invalid() {
    let config: PrometheusConfig =
        serde_json::from_value(json!({"scrape_interval": "10s", "scrape_timeout": "30s"}))
            .unwrap();
    assert!(config.validate().is_err());
    assert!(PrometheusConfig::default().validate().is_ok());
}

#[test]
fn rules_are_named_after_group() {
    let module = PrometheusConfig::default().build(&opts()).unwrap();
    let rules = module.get_rules("prometheus").unwrap();
    assert_eq!(rules.name, "prometheus-prometheus");
    assert_eq!(rules.rules.len(), 2);
}
