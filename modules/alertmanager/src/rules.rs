use std::time::Duration;

use deploykit::{Rule, RuleGroup};

pub(crate) fn rule_group(group: &str) -> RuleGroup {
    RuleGroup::new(
        format!("{group}-alertmanager"),
        vec![
            Rule::alert(
                "AlertmanagerConfigurationReloadFailure",
                "alertmanager_config_last_reload_successful == 0",
            )
            .for_duration(Duration::from_secs(10 * 60))
            .label("severity", "critical")
            .annotation(
                "summary",
                "Alertmanager configuration reload failure (instance {{ $labels.instance }})",
            ),
            Rule::alert(
                "AlertmanagerNotificationsFailing",
                "rate(alertmanager_notifications_failed_total[5m]) > 0",
            )
            .for_duration(Duration::from_secs(5 * 60))
            .label("severity", "warning")
            .annotation(
                "summary",
                "Alertmanager fails to send notifications through {{ $labels.integration }}",
            ),
        ],
    )
}
