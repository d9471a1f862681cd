// Links every service module so its `register_module!` submission reaches the registry.
// New modules are added here by hand.
#![allow(unused_imports)]

use alertmanager_module as _;
use grafana_module as _;
use linux_module as _;
use portal_module as _;
use prometheus_module as _;
