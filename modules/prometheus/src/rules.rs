use std::time::Duration;

use deploykit::{Rule, RuleGroup};

pub(crate) fn rule_group(group: &str) -> RuleGroup {
    RuleGroup::new(
        format!("{group}-prometheus"),
        vec![
            Rule::alert(
                "PrometheusBadConfig",
                "max_over_time(prometheus_config_last_reload_successful{job=\"prometheus\"}[5m]) == 0",
            )
            .for_duration(Duration::from_secs(10 * 60))
            .label("severity", "critical")
            .annotation(
                "description",
                "Prometheus {{$labels.instance}} has failed to reload its configuration.",
            )
            .annotation("summary", "Failed Prometheus configuration reload."),
            Rule::alert(
                "PrometheusNotificationQueueRunningFull",
                "(predict_linear(prometheus_notifications_queue_length{job=\"prometheus\"}[5m], 60 * 30) \
                 > min_over_time(prometheus_notifications_queue_capacity{job=\"prometheus\"}[5m]))",
            )
            .for_duration(Duration::from_secs(15 * 60))
            .label("severity", "warning")
            .annotation(
                "description",
                "Alert notification queue of Prometheus {{$labels.instance}} is running full.",
            )
            .annotation(
                "summary",
                "Prometheus alert notification queue predicted to run full in less than 30m.",
            ),
        ],
    )
}
