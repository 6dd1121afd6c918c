//! `CloudApi` — the complete boundary of calls the control loop issues.
//!
//! The distilled spec treats the cloud SDK client as a given external
//! collaborator; here it is named explicitly as a trait so the Planner and
//! Executor are unit-testable without a live account. A production binary
//! implements this over a real SDK. `FakeCloud` is the in-memory adapter
//! this repository ships for tests and `--event-file` local simulation.

use crate::cloud::asg::Asg;
use crate::cloud::instance::{Instance, InstanceState, Lifecycle};
use crate::errors::{AutospottingError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::SystemTime;

/// Everything needed to launch one spot candidate.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub instance_type: String,
    pub availability_zone: String,
    pub subnet_id: String,
    pub max_price: f64,
    pub tags: HashMap<String, String>,
}

/// One row of a bulk spot-price-history query result.
#[derive(Debug, Clone)]
pub struct SpotPriceObservation {
    pub instance_type: String,
    pub availability_zone: String,
    pub price: f64,
    pub timestamp: SystemTime,
}

/// The full set of cloud operations the core drives. See `§6a` of
/// `SPEC_FULL.md` for why this boundary exists as a trait.
pub trait CloudApi {
    fn describe_instances(&self, region: &str) -> Result<Vec<Instance>>;
    fn describe_asgs(&self, region: &str) -> Result<Vec<Asg>>;

    /// Bulk spot price history for a region/product, covering the last
    /// `pricing::SPOT_HISTORY_LOOKBACK` window. Populates the `PriceOracle`
    /// once per region per invocation (`§4.2`).
    fn describe_spot_price_history(
        &self,
        region: &str,
        product_description: &str,
    ) -> Result<Vec<SpotPriceObservation>>;

    /// Launch one spot instance; fails with `CapacityUnavailable` if the
    /// simulated backend has no room (used to exercise the executor's
    /// candidate fallthrough).
    fn run_spot_instance(&self, region: &str, spec: &LaunchSpec) -> Result<Instance>;

    fn attach_instances(&self, region: &str, asg_name: &str, instance_ids: &[String]) -> Result<()>;
    fn detach_instances(
        &self,
        region: &str,
        asg_name: &str,
        instance_ids: &[String],
        decrement_desired: bool,
    ) -> Result<()>;
    fn terminate_instance(&self, region: &str, instance_id: &str) -> Result<()>;
    fn terminate_instance_in_auto_scaling_group(
        &self,
        region: &str,
        instance_id: &str,
        decrement_desired: bool,
    ) -> Result<()>;
    fn update_asg_max_size(&self, region: &str, asg_name: &str, new_max: i64) -> Result<()>;
    fn create_tags(&self, region: &str, resource_id: &str, tags: &HashMap<String, String>) -> Result<()>;
    fn complete_lifecycle_action(
        &self,
        region: &str,
        asg_name: &str,
        token: &str,
        result: &str,
    ) -> Result<()>;
}

/// In-memory `CloudApi` used by the test suite and local event simulation.
pub struct FakeCloud {
    instances: Mutex<HashMap<String, Instance>>,
    asgs: Mutex<HashMap<String, Asg>>,
    next_id: AtomicU64,
    /// Instance types that should fail the next launch attempt with
    /// `InsufficientCapacity`, simulating a real fleet shortage.
    pub capacity_denylist: Mutex<Vec<String>>,
    /// Seeded `(product_description, observation)` rows returned by
    /// `describe_spot_price_history`.
    spot_price_history: Mutex<Vec<(String, SpotPriceObservation)>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
            asgs: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity_denylist: Mutex::new(Vec::new()),
            spot_price_history: Mutex::new(Vec::new()),
        }
    }

    pub fn seed_instance(&self, instance: Instance) {
        self.instances.lock().unwrap().insert(instance.id.clone(), instance);
    }

    pub fn seed_asg(&self, asg: Asg) {
        self.asgs.lock().unwrap().insert(asg.name.clone(), asg);
    }

    pub fn seed_spot_price(&self, product_description: &str, observation: SpotPriceObservation) {
        self.spot_price_history
            .lock()
            .unwrap()
            .push((product_description.to_string(), observation));
    }

    pub fn instance(&self, id: &str) -> Option<Instance> {
        self.instances.lock().unwrap().get(id).cloned()
    }

    pub fn asg(&self, name: &str) -> Option<Asg> {
        self.asgs.lock().unwrap().get(name).cloned()
    }

    fn fresh_id(&self) -> String {
        format!("i-fake{:08x}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl CloudApi for FakeCloud {
    fn describe_instances(&self, _region: &str) -> Result<Vec<Instance>> {
        Ok(self.instances.lock().unwrap().values().cloned().collect())
    }

    fn describe_asgs(&self, _region: &str) -> Result<Vec<Asg>> {
        Ok(self.asgs.lock().unwrap().values().cloned().collect())
    }

    fn describe_spot_price_history(
        &self,
        _region: &str,
        product_description: &str,
    ) -> Result<Vec<SpotPriceObservation>> {
        Ok(self
            .spot_price_history
            .lock()
            .unwrap()
            .iter()
            .filter(|(product, _)| product == product_description)
            .map(|(_, observation)| observation.clone())
            .collect())
    }

    fn run_spot_instance(&self, _region: &str, spec: &LaunchSpec) -> Result<Instance> {
        if self
            .capacity_denylist
            .lock()
            .unwrap()
            .contains(&spec.instance_type)
        {
            return Err(AutospottingError::capacity_unavailable(&spec.instance_type));
        }
        let instance = Instance {
            id: self.fresh_id(),
            instance_type: spec.instance_type.clone(),
            availability_zone: spec.availability_zone.clone(),
            subnet_id: spec.subnet_id.clone(),
            lifecycle: Lifecycle::Spot,
            state: InstanceState::Running,
            launch_time: SystemTime::now(),
            tags: spec.tags.clone(),
            api_termination_protection: false,
            asg_scale_in_protection: false,
            effective_price: spec.max_price,
        };
        self.instances
            .lock()
            .unwrap()
            .insert(instance.id.clone(), instance.clone());
        Ok(instance)
    }

    fn attach_instances(&self, _region: &str, asg_name: &str, instance_ids: &[String]) -> Result<()> {
        let mut asgs = self.asgs.lock().unwrap();
        let asg = asgs
            .get_mut(asg_name)
            .ok_or_else(|| AutospottingError::internal(format!("unknown ASG '{asg_name}'")))?;
        // Mirrors real `AttachInstances`: desired capacity rises by the
        // number of newly attached instances, bounded by MaxSize.
        for id in instance_ids {
            if !asg.has_member_instance(id) {
                asg.members.push(crate::cloud::asg::Member {
                    instance_id: id.clone(),
                    scale_in_protected: false,
                });
                asg.desired = (asg.desired + 1).min(asg.max);
            }
        }
        Ok(())
    }

    fn detach_instances(
        &self,
        _region: &str,
        asg_name: &str,
        instance_ids: &[String],
        decrement_desired: bool,
    ) -> Result<()> {
        let mut asgs = self.asgs.lock().unwrap();
        let asg = asgs
            .get_mut(asg_name)
            .ok_or_else(|| AutospottingError::internal(format!("unknown ASG '{asg_name}'")))?;
        asg.members.retain(|m| !instance_ids.contains(&m.instance_id));
        if decrement_desired {
            asg.desired -= instance_ids.len() as i64;
        }
        Ok(())
    }

    fn terminate_instance(&self, _region: &str, instance_id: &str) -> Result<()> {
        if let Some(instance) = self.instances.lock().unwrap().get_mut(instance_id) {
            instance.state = InstanceState::Terminated;
        }
        Ok(())
    }

    fn terminate_instance_in_auto_scaling_group(
        &self,
        region: &str,
        instance_id: &str,
        decrement_desired: bool,
    ) -> Result<()> {
        let asg_name = {
            let asgs = self.asgs.lock().unwrap();
            asgs.values()
                .find(|a| a.has_member_instance(instance_id))
                .map(|a| a.name.clone())
        };
        if let Some(asg_name) = asg_name {
            self.detach_instances(region, &asg_name, std::slice::from_ref(&instance_id.to_string()), decrement_desired)?;
        }
        self.terminate_instance(region, instance_id)
    }

    fn update_asg_max_size(&self, _region: &str, asg_name: &str, new_max: i64) -> Result<()> {
        let mut asgs = self.asgs.lock().unwrap();
        let asg = asgs
            .get_mut(asg_name)
            .ok_or_else(|| AutospottingError::internal(format!("unknown ASG '{asg_name}'")))?;
        asg.max = new_max;
        Ok(())
    }

    fn create_tags(&self, _region: &str, resource_id: &str, tags: &HashMap<String, String>) -> Result<()> {
        if let Some(instance) = self.instances.lock().unwrap().get_mut(resource_id) {
            instance.tags.extend(tags.clone());
            return Ok(());
        }
        if let Some(asg) = self.asgs.lock().unwrap().get_mut(resource_id) {
            asg.tags.extend(tags.clone());
        }
        Ok(())
    }

    fn complete_lifecycle_action(
        &self,
        _region: &str,
        _asg_name: &str,
        _token: &str,
        _result: &str,
    ) -> Result<()> {
        Ok(())
    }
}
