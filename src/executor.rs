//! ActionExecutor — drives one [`Action`] against a [`CloudApi`], per `§4.5`.
//! Mutates cloud state; idempotent under retry of the whole tick, not of
//! individual calls within it.

use crate::cloud::api::{CloudApi, LaunchSpec};
use crate::cloud::asg::{Asg, LifecycleTransition};
use crate::cloud::instance::{Instance, Lifecycle};
use crate::config::{AsgPolicy, TerminationMethod, TerminationNotificationAction};
use crate::errors::{AutospottingError, Result};
use crate::planner::Action;
use crate::selector::Candidate;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

const MAX_LAUNCH_ATTEMPTS: usize = 10;

pub struct ActionExecutor<'a> {
    api: &'a dyn CloudApi,
    /// Scales every health/attach wait; 0 in tests collapses waits to no-ops.
    sleep_multiplier: u32,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(api: &'a dyn CloudApi, sleep_multiplier: u32) -> Self {
        Self { api, sleep_multiplier }
    }

    fn sleep(&self, base: Duration) {
        if self.sleep_multiplier == 0 {
            return;
        }
        thread::sleep(base * self.sleep_multiplier);
    }

    pub fn execute(
        &self,
        region: &str,
        asg: &Asg,
        policy: &AsgPolicy,
        members: &[Instance],
        action: &Action,
        candidates: &[Candidate],
    ) -> Result<()> {
        match action {
            Action::Skip { reason } => {
                info!(asg = %asg.name, reason = %reason, "skip");
                Ok(())
            }
            Action::EnableEventHandling { asg: name } => {
                info!(asg = %name, "enabling event handling");
                let mut tags = std::collections::HashMap::new();
                tags.insert("autospotting_enabled-for-event-handling".to_string(), "true".to_string());
                self.api.create_tags(region, name, &tags)
            }
            Action::LaunchSpotReplacement { on_demand } => self.launch_spot_replacement(region, asg, on_demand, candidates),
            Action::SwapSpotInstance { spot, .. } => self.swap_spot_instance(region, asg, policy, members, spot),
            Action::TerminateSpot { .. } => self.terminate_one_spot(region, asg, policy, members),
            Action::TerminateUnneededSpot { spot, .. } => self.terminate_named(region, asg, policy, spot),
            Action::HandlePreemption { spot } => self.handle_preemption(region, spot),
        }
    }

    fn launch_spot_replacement(&self, region: &str, asg: &Asg, on_demand_id: &str, candidates: &[Candidate]) -> Result<()> {
        if candidates.is_empty() {
            return Err(AutospottingError::no_candidate(on_demand_id));
        }
        let mut tags = asg.propagate_on_launch_tags();
        tags.insert("launched-for-asg".to_string(), asg.name.clone());
        tags.insert("launched-by-autospotting".to_string(), "true".to_string());

        let mut last_err = None;
        for candidate in candidates.iter().take(MAX_LAUNCH_ATTEMPTS) {
            let spec = LaunchSpec {
                instance_type: candidate.instance_type.clone(),
                availability_zone: candidate.availability_zone.clone(),
                subnet_id: String::new(),
                max_price: candidate.bid,
                tags: tags.clone(),
            };
            match self.api.run_spot_instance(region, &spec) {
                Ok(instance) => {
                    info!(asg = %asg.name, instance = %instance.id, instance_type = %candidate.instance_type, "launched spot candidate");
                    return Ok(());
                }
                Err(err) => {
                    warn!(asg = %asg.name, instance_type = %candidate.instance_type, error = %err, "candidate launch failed, trying next");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| AutospottingError::no_candidate(on_demand_id)))
    }

    fn swap_spot_instance(&self, region: &str, asg: &Asg, policy: &AsgPolicy, members: &[Instance], spot_id: &str) -> Result<()> {
        let victim = members
            .iter()
            .filter(|i| asg.has_member_instance(&i.id))
            .find(|i| i.lifecycle == Lifecycle::OnDemand && i.is_unprotected())
            .ok_or_else(|| AutospottingError::internal(format!("no unprotected on-demand victim in '{}'", asg.name)))?;

        let uses_hook = policy.termination_notification_action != TerminationNotificationAction::Detach
            && asg.has_lifecycle_hook_for(&LifecycleTransition::InstanceTerminating);

        if uses_hook {
            self.api.terminate_instance_in_auto_scaling_group(region, &victim.id, true)?;
            self.sleep(Duration::from_secs(30));
        } else {
            self.api.detach_instances(region, &asg.name, std::slice::from_ref(&victim.id), true)?;
            self.api.terminate_instance(region, &victim.id)?;
        }

        let widen = asg.desired + 1 > asg.max;
        if widen {
            self.api.update_asg_max_size(region, &asg.name, asg.max + 1)?;
        }
        self.api.attach_instances(region, &asg.name, std::slice::from_ref(&spot_id.to_string()))?;
        if widen {
            self.api.update_asg_max_size(region, &asg.name, asg.max)?;
        }

        self.sleep(asg.health_check_grace_period);
        info!(asg = %asg.name, victim = %victim.id, spot = %spot_id, "swapped spot instance in");
        Ok(())
    }

    fn terminate_one_spot(&self, region: &str, asg: &Asg, policy: &AsgPolicy, members: &[Instance]) -> Result<()> {
        let victim = members
            .iter()
            .filter(|i| asg.has_member_instance(&i.id))
            .find(|i| i.lifecycle == Lifecycle::Spot)
            .ok_or_else(|| AutospottingError::internal(format!("no spot member left to terminate in '{}'", asg.name)))?;
        self.terminate_named(region, asg, policy, &victim.id)
    }

    fn terminate_named(&self, region: &str, asg: &Asg, policy: &AsgPolicy, instance_id: &str) -> Result<()> {
        match policy.instance_termination_method {
            TerminationMethod::AutoScaling => {
                self.api.terminate_instance_in_auto_scaling_group(region, instance_id, true)
            }
            TerminationMethod::Detach => {
                self.api
                    .detach_instances(region, &asg.name, std::slice::from_ref(&instance_id.to_string()), true)?;
                self.api.terminate_instance(region, instance_id)
            }
        }
    }

    fn handle_preemption(&self, region: &str, spot_id: &str) -> Result<()> {
        let owning_asg = self
            .api
            .describe_asgs(region)?
            .into_iter()
            .find(|a| a.has_member_instance(spot_id));
        if let Some(asg) = owning_asg {
            self.api
                .detach_instances(region, &asg.name, std::slice::from_ref(&spot_id.to_string()), false)?;
        }
        self.api.terminate_instance(region, spot_id)?;
        warn!(instance = %spot_id, "handled preemption warning");
        Ok(())
    }
}
