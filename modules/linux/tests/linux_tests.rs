#![allow(clippy::unwrap_used, clippy::expect_used)]

use deploykit::{
    ADDRESS_LABEL, GROUP_NAME_LABEL, LabelSet, ModuleOptions, ModuleRegistry, PipelineContext,
    ServiceConfig,
};
use linux_module::LinuxConfig;
use serde_json::json;

fn opts() -> ModuleOptions {
    ModuleOptions {
        target_group: "prometheus".to_owned(),
    }
}

fn hosts() -> Vec<LabelSet> {
    vec![
        LabelSet::from([(ADDRESS_LABEL, "10.0.0.1:9100")]),
        LabelSet::from([(ADDRESS_LABEL, "10.0.0.2:9100")]),
    ]
}

#[test]
fn projects_hosts_onto_exporter_port() {
    let module = LinuxConfig::default().build(&opts()).unwrap();
    let targets = module.get_targets(&hosts(), "prometheus").unwrap();

    assert_eq!(targets.len(), 2);
    for (target, host) in targets.iter().zip(["10.0.0.1:9100", "10.0.0.2:9100"]) {
        assert_eq!(target.address(), Some(host));
        assert_eq!(target.get(GROUP_NAME_LABEL), Some("prometheus"));
    }
}

#[test]
fn custom_port_replaces_discovered_port() {
    let config = LinuxConfig {
        node_exporter_port: 9101,
        ..LinuxConfig::default()
    };
    let module = config.build(&opts()).unwrap();
    let targets = module
        .get_targets(&[LabelSet::from([(ADDRESS_LABEL, "db1:22")])], "db")
        .unwrap();
    assert_eq!(targets[0].address(), Some("db1:9101"));
}

#[test]
fn target_without_address_is_an_error() {
    let module = LinuxConfig::default().build(&opts()).unwrap();
    let err = module
        .get_targets(&[LabelSet::from([("env", "prod")])], "db")
        .unwrap_err();
    assert!(err.to_string().contains("__address__"));
}

#[test]
fn playbook_installs_node_exporter() {
    let module = LinuxConfig::default().build(&opts()).unwrap();
    let playbook = module
        .playbook(&PipelineContext::new("data"))
        .unwrap()
        .expect("exporter enabled");

    assert_eq!(playbook.hosts, "all");
    assert!(playbook.become_root);
    assert_eq!(playbook.vars["node_exporter_version"], json!("1.5.0"));
    assert_eq!(playbook.roles[0].name, "node_exporter");
}

#[test]
fn disabled_exporter_contributes_nothing() {
    let config = LinuxConfig {
        enable_exporter: false,
        ..LinuxConfig::default()
    };
    let module = config.build(&opts()).unwrap();
    assert!(module.get_targets(&hosts(), "prometheus").unwrap().is_empty());
    assert!(module.playbook(&PipelineContext::new("data")).unwrap().is_none());
    assert!(module.get_dashboards().is_empty());
}

#[test]
fn rules_are_named_after_group() {
    let module = LinuxConfig::default().build(&opts()).unwrap();
    let rules = module.get_rules("web").unwrap();
    assert_eq!(rules.name, "web-linux");
    assert_eq!(rules.rules[0].alert.as_deref(), Some("HostOutOfMemory"));
}

#[test]
fn registers_under_linux_module_key() {
    let registry = ModuleRegistry::discover().unwrap();
    assert_eq!(registry.field_key_of("linux"), Some("linux_module"));

    let configs = registry
        .decode_configs(&json!({"linux_module": {"enabled": true}}))
        .unwrap();
    let linux = configs.get::<LinuxConfig>().unwrap();
    assert!(linux.enabled);
    assert_eq!(linux.node_exporter_port, 9100);
}

#[test]
fn unknown_field_is_rejected() {
    let registry = ModuleRegistry::discover().unwrap();
    assert!(
        registry
            .decode_configs(&json!({"linux_module": {"exporter_port": 1}}))
            .is_err()
    );
}
