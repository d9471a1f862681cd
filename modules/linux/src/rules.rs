use std::time::Duration;

use deploykit::{Rule, RuleGroup};

pub(crate) fn rule_group(group: &str) -> RuleGroup {
    RuleGroup::new(
        format!("{group}-linux"),
        vec![
            Rule::alert(
                "HostOutOfMemory",
                "(node_memory_MemAvailable_bytes / node_memory_MemTotal_bytes * 100 < 10) \
                 * on(instance) group_left (nodename) node_uname_info{nodename=~\".+\"}",
            )
            .for_duration(Duration::from_secs(2 * 60))
            .label("severity", "warning")
            .annotation("summary", "Host out of memory (instance {{ $labels.instance }})")
            .annotation(
                "description",
                "Node memory is filling up (< 10% left)\n  VALUE = {{ $value }}\n  LABELS = {{ $labels }}",
            ),
        ],
    )
}
