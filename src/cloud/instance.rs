//! `Instance` — a read-through snapshot of a single VM.

use std::collections::HashMap;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    OnDemand,
    Spot,
}

/// Advances monotonically toward `Terminated`; never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Pending,
    Running,
    Stopping,
    Stopped,
    ShuttingDown,
    Terminated,
}

impl InstanceState {
    pub fn is_running(self) -> bool {
        matches!(self, InstanceState::Running)
    }
}

#[derive(Debug, Clone)]
pub struct Instance {
    pub id: String,
    pub instance_type: String,
    pub availability_zone: String,
    pub subnet_id: String,
    pub lifecycle: Lifecycle,
    pub state: InstanceState,
    pub launch_time: SystemTime,
    pub tags: HashMap<String, String>,
    pub api_termination_protection: bool,
    pub asg_scale_in_protection: bool,
    /// Effective hourly price, computed by the region snapshot builder from
    /// the catalog (on-demand) or the price oracle (spot).
    pub effective_price: f64,
}

impl Instance {
    /// Neither API-termination-protected nor ASG-scale-in-protected.
    pub fn is_unprotected(&self) -> bool {
        !self.api_termination_protection && !self.asg_scale_in_protection
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn age(&self, now: SystemTime) -> std::time::Duration {
        now.duration_since(self.launch_time).unwrap_or_default()
    }

    pub fn launched_for_asg(&self) -> Option<&str> {
        self.tag("launched-for-asg")
    }

    pub fn is_launched_by_autospotting(&self) -> bool {
        self.tag("launched-by-autospotting") == Some("true")
    }
}
