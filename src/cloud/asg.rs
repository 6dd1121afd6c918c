//! `Asg` — a snapshot of one auto-scaling group.

use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleTransition {
    InstanceLaunching,
    InstanceTerminating,
}

#[derive(Debug, Clone)]
pub struct LifecycleHook {
    pub name: String,
    pub transition: LifecycleTransition,
    pub heartbeat_timeout: Duration,
    pub default_result: String,
}

/// One ASG member: instance ID plus its per-instance scale-in protection.
#[derive(Debug, Clone)]
pub struct Member {
    pub instance_id: String,
    pub scale_in_protected: bool,
}

#[derive(Debug, Clone)]
pub struct Asg {
    pub name: String,
    pub region: String,
    pub desired: i64,
    pub min: i64,
    pub max: i64,
    pub members: Vec<Member>,
    pub lifecycle_hooks: Vec<LifecycleHook>,
    pub health_check_grace_period: Duration,
    pub tags: HashMap<String, String>,
}

impl Asg {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn has_member_instance(&self, instance_id: &str) -> bool {
        self.members.iter().any(|m| m.instance_id == instance_id)
    }

    pub fn is_scale_in_protected(&self, instance_id: &str) -> bool {
        self.members
            .iter()
            .find(|m| m.instance_id == instance_id)
            .map(|m| m.scale_in_protected)
            .unwrap_or(false)
    }

    pub fn is_enabled_for_event_handling(&self) -> bool {
        self.tag("autospotting_enabled-for-event-handling") == Some("true")
    }

    pub fn has_lifecycle_hook_for(&self, transition: &LifecycleTransition) -> bool {
        self.lifecycle_hooks.iter().any(|h| &h.transition == transition)
    }

    /// Tags an ASG owner copies onto every launched member ("propagate on
    /// launch"), i.e. everything except our own reserved override keys.
    pub fn propagate_on_launch_tags(&self) -> HashMap<String, String> {
        self.tags
            .iter()
            .filter(|(k, _)| !k.starts_with("autospotting_"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
