use serde_json::{Value, json};

fn panel(id: u32, title: &str, unit: &str, expr: &str, y: u32) -> Value {
    json!({
        "id": id,
        "title": title,
        "type": "timeseries",
        "gridPos": {"h": 8, "w": 12, "x": if id % 2 == 0 { 12 } else { 0 }, "y": y},
        "datasource": {"type": "prometheus", "uid": "prometheus"},
        "fieldConfig": {"defaults": {"unit": unit}, "overrides": []},
        "targets": [{
            "datasource": {"type": "prometheus", "uid": "prometheus"},
            "expr": expr,
            "legendFormat": "{{instance}}",
            "refId": "A",
        }],
    })
}

/// Host overview built on node exporter metrics.
pub(crate) fn node_dashboard() -> Value {
    json!({
        "title": "Linux hosts",
        "uid": "o11y-linux-hosts",
        "schemaVersion": 38,
        "time": {"from": "now-6h", "to": "now"},
        "templating": {"list": [{
            "name": "instance",
            "label": "Instance",
            "type": "query",
            "datasource": {"type": "prometheus", "uid": "prometheus"},
            "query": {"query": "label_values(node_uname_info, instance)", "refId": "instance"},
            "refresh": 2,
            "multi": true,
            "includeAll": true,
        }]},
        "panels": [
            panel(1, "CPU busy", "percentunit",
                "1 - avg by (instance) (rate(node_cpu_seconds_total{mode=\"idle\",instance=~\"$instance\"}[5m]))", 0),
            panel(2, "Memory available", "percentunit",
                "node_memory_MemAvailable_bytes{instance=~\"$instance\"} / node_memory_MemTotal_bytes{instance=~\"$instance\"}", 0),
            panel(3, "Load (1m)", "short",
                "node_load1{instance=~\"$instance\"}", 8),
            panel(4, "Root filesystem free", "percentunit",
                "node_filesystem_avail_bytes{mountpoint=\"/\",instance=~\"$instance\"} / node_filesystem_size_bytes{mountpoint=\"/\",instance=~\"$instance\"}", 8),
        ],
    })
}
