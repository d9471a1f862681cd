#![allow(clippy::unwrap_used, clippy::expect_used)]

use deploykit::{
    ADDRESS_LABEL, LabelSet, ModuleOptions, PipelineContext, ReverseProxyEntry, ServiceConfig,
};
use portal_module::{ADMIN_PASSWORD_FILE, PortalConfig, User};
use serde_json::json;

const HASH: &str = "$2b$10$R9h/cIPz0gi.URNNX3kh2OPST9/PgBkqquzi.Ss7KIUgO2t0jWMUW";

fn opts() -> ModuleOptions {
    ModuleOptions {
        target_group: "portal".to_owned(),
    }
}

fn user(name: &str, role: &str) -> User {
    User {
        username: name.to_owned(),
        bcrypt_password: HASH.to_owned(),
        email: format!("{name}@example.org"),
        role: role.to_owned(),
    }
}

#[test]
fn playbook_publishes_proxy_entries_and_users() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = PipelineContext::new(dir.path());
    ctx.add_reverse_proxy_entries([ReverseProxyEntry {
        name: "grafana".to_owned(),
        url: "http://127.0.0.1:3000".to_owned(),
        prefix: "/grafana/abc".to_owned(),
        host: "127.0.0.1".to_owned(),
    }]);

    let config = PortalConfig {
        users: vec![user("root", "admin")],
        ..PortalConfig::default()
    };
    let playbook = config.build(&opts()).unwrap().playbook(&ctx).unwrap().unwrap();

    assert_eq!(playbook.roles[0].name, "authp");
    assert_eq!(playbook.vars["authp_version"], json!("1.0.3"));
    assert_eq!(
        playbook.vars["o11y_proxy_entries"],
        json!([{
            "name": "grafana",
            "url": "http://127.0.0.1:3000",
            "prefix": "/grafana/abc",
            "host": "127.0.0.1",
        }])
    );
    let users = playbook.vars["authp_users"].as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["bcrypt_cost"], json!(10));
    assert_eq!(users[0]["email_domain"], json!("example.org"));
}

#[test]
fn stored_admin_hash_adds_webadmin() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(ADMIN_PASSWORD_FILE), format!("{HASH}\n")).unwrap();

    let config = PortalConfig {
        users: vec![user("alice", "")],
        ..PortalConfig::default()
    };
    let playbook = config
        .build(&opts())
        .unwrap()
        .playbook(&PipelineContext::new(dir.path()))
        .unwrap()
        .unwrap();

    let users = playbook.vars["authp_users"].as_array().unwrap();
    let names: Vec<_> = users.iter().map(|u| u["username"].as_str().unwrap()).collect();
    assert_eq!(names, ["alice", "webadmin"]);
    assert_eq!(users[0]["role"], json!("user"));
    assert_eq!(users[1]["role"], json!("admin"));
}

#[test]
fn missing_admin_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let playbook = PortalConfig::default()
        .build(&opts())
        .unwrap()
        .playbook(&PipelineContext::new(dir.path()))
        .unwrap()
        .unwrap();
    assert_eq!(playbook.vars["authp_users"], json!([]));
}

#[test]
fn invalid_hash_fails_validation() {
    let config = PortalConfig {
        users: vec![User {
            bcrypt_password: "secret".to_owned(),
            ..user("bob", "")
        }],
        ..PortalConfig::default()
    };
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("bob"));
}

#[test]
fn portal_address_is_the_host() {
    let module = PortalConfig::default().build(&opts()).unwrap();
    let vars = module
        .host_vars(&LabelSet::from([(ADDRESS_LABEL, "10.0.0.3:22")]), "portal")
        .unwrap();
    assert_eq!(vars["o11y_portal_address"], json!("http://10.0.0.3"));

    let vars = module
        .host_vars(&LabelSet::from([(ADDRESS_LABEL, "[2001:db8::3]:22")]), "portal")
        .unwrap();
    assert_eq!(vars["o11y_portal_address"], json!("http://[2001:db8::3]"));
}

#[test]
fn portal_has_no_scrape_targets() {
    let module = PortalConfig::default().build(&opts()).unwrap();
    assert!(
        module
            .get_targets(&[LabelSet::from([(ADDRESS_LABEL, "10.0.0.3:22")])], "portal")
            .unwrap()
            .is_empty()
    );
}
