use std::sync::LazyLock;

use deploykit::GROUP_NAME_LABEL;
use deploykit::proxy::hash_string;
use regex::{Captures, Regex};
use serde_json::{Value, json};

/// Templating variable holding the selected Prometheus datasource.
pub const DATASOURCE_VAR: &str = "prometheus_ds";
const DATASOURCE_UID: &str = "${prometheus_ds}";

#[allow(clippy::expect_used)] // static pattern
static LABEL_VALUES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^label_values\((?P<metric>[a-zA-Z_:][a-zA-Z0-9_:]*(?:\{.*\})?),\s*(?P<label>[a-zA-Z_][a-zA-Z0-9_]*)\)$",
    )
    .expect("static regex should not panic")
});

#[allow(clippy::expect_used)] // static pattern
static SELECTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<metric>[a-zA-Z_:][a-zA-Z0-9_:]*)\{(?P<matchers>[^{}]*)\}")
        .expect("static regex should not panic")
});

/// File name of a dashboard inside the dashboards directory.
#[must_use]
pub fn dashboard_file_name(dashboard: &Value) -> String {
    let title = dashboard
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or_default();
    format!("{}.json", hash_string(title))
}

/// Adds a `group_name=~"$group_name"` matcher to every braced selector of `expr`.
///
/// Selectors that already match on `group_name` get their matcher replaced.
#[must_use]
pub fn add_group_name_selector(expr: &str) -> String {
    let matcher = format!("{GROUP_NAME_LABEL}=~\"${GROUP_NAME_LABEL}\"");
    SELECTOR
        .replace_all(expr, |caps: &Captures<'_>| {
            let metric = &caps["metric"];
            let mut matchers: Vec<&str> = caps["matchers"]
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty() && !m.starts_with(GROUP_NAME_LABEL))
                .collect();
            matchers.push(&matcher);
            format!("{metric}{{{}}}", matchers.join(","))
        })
        .into_owned()
}

fn group_name_variable(first: &Value) -> Option<Value> {
    let query = first
        .pointer("/query/query")
        .or_else(|| first.get("query"))
        .and_then(Value::as_str)?;
    let caps = LABEL_VALUES.captures(query)?;
    let mut variable = first.clone();
    variable["name"] = json!(GROUP_NAME_LABEL);
    variable["label"] = json!("Group");
    variable["query"] = json!({
        "query": format!("label_values({}, {GROUP_NAME_LABEL})", &caps["metric"]),
        "refId": GROUP_NAME_LABEL,
    });
    Some(variable)
}

fn datasource_variable() -> Value {
    json!({
        "hide": 1,
        "includeAll": false,
        "label": "",
        "multi": false,
        "name": DATASOURCE_VAR,
        "options": [],
        "query": "prometheus",
        "refresh": 1,
        "regex": "",
        "skipUrlSync": false,
        "type": "datasource",
    })
}

fn point_at_datasource(node: &mut Value) {
    if let Some(ds) = node.get_mut("datasource") {
        *ds = json!({"type": "prometheus", "uid": DATASOURCE_UID});
    }
}

/// Points panels and variables at the provisioned datasource and filters by group.
///
/// Templating gains a hidden datasource variable and, when the first variable
/// is a `label_values` query, a `group_name` variable built from the same metric.
#[must_use]
pub fn rewrite_dashboard(mut dashboard: Value) -> Value {
    if !dashboard.is_object() {
        return dashboard;
    }
    let mut list = dashboard
        .pointer_mut("/templating/list")
        .and_then(Value::as_array_mut)
        .map(std::mem::take)
        .unwrap_or_default();

    for variable in &mut list {
        point_at_datasource(variable);
    }
    if let Some(group) = list.first().and_then(group_name_variable) {
        list.insert(0, group);
    }
    list.insert(0, datasource_variable());
    dashboard["templating"] = json!({ "list": list });

    if let Some(panels) = dashboard.get_mut("panels").and_then(Value::as_array_mut) {
        for panel in panels {
            point_at_datasource(panel);
            let Some(targets) = panel.get_mut("targets").and_then(Value::as_array_mut) else {
                continue;
            };
            for target in targets {
                point_at_datasource(target);
                let expr = target
                    .get("expr")
                    .and_then(Value::as_str)
                    .map(add_group_name_selector);
                if let Some(expr) = expr {
                    target["expr"] = json!(expr);
                }
            }
        }
    }
    dashboard
}
