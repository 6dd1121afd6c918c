//! `LicenseGate` — tallies hourly savings and gates behavior under certain
//! license modes, per the original agent's Patreon/nightly-build licensing
//! scheme (`examples/original_source/core/autoscaling_test.go`,
//! `Test_autoScalingGroup_licensedToRun` / `_calculateHourlySavings`).

use crate::cloud::instance::{Instance, InstanceState, Lifecycle};
use std::sync::atomic::{AtomicU64, Ordering};

/// Evaluation-mode nightly builds are capped once the fleet-wide savings
/// implied by a month of runtime would cross $1000 — i.e. $1000 / (30 * 24).
pub const EVALUATION_MONTHLY_CAP_USD: f64 = 1000.0;
pub const EVALUATION_HOURLY_CAP_USD: f64 = EVALUATION_MONTHLY_CAP_USD / (30.0 * 24.0);

const ALWAYS_ALLOW_LICENSES: &[&str] = &[
    "I_am_supporting_it_on_Patreon",
    "I_contributed_to_development_within_the_last_year",
    "I_built_it_from_source_code",
];

/// Per-ASG hourly savings: sum over running spot members of
/// `onDemandPrice(type) - effectivePrice`.
pub fn asg_hourly_savings(members: &[Instance], on_demand_price_of: impl Fn(&str) -> Option<f64>) -> f64 {
    members
        .iter()
        .filter(|i| i.lifecycle == Lifecycle::Spot && i.state == InstanceState::Running)
        .filter_map(|i| {
            let on_demand = on_demand_price_of(&i.instance_type)?;
            Some((on_demand - i.effective_price).max(0.0))
        })
        .sum()
}

/// Process-wide rolling tally of hourly savings, reset once per invocation.
/// Stored as bit-pattern-of-an-f64 behind an atomic so it's shared across the
/// bounded worker pool (§5) without a mutex on the hot path.
pub struct LicenseGate {
    accumulated_bits: AtomicU64,
    license: String,
    version: String,
}

impl LicenseGate {
    pub fn new(license: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            accumulated_bits: AtomicU64::new(0f64.to_bits()),
            license: license.into(),
            version: version.into(),
        }
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.accumulated_bits.load(Ordering::SeqCst))
    }

    /// Add this ASG's contribution to the rolling tally and report whether
    /// the gate still permits action for the *next* ASG (§4.7: the cap
    /// applies to subsequent ASGs once crossed, not retroactively).
    pub fn record_and_check(&self, asg_savings: f64) -> bool {
        if self.always_allows() {
            self.add(asg_savings);
            return true;
        }
        let allowed_before = self.load() < EVALUATION_HOURLY_CAP_USD;
        self.add(asg_savings);
        allowed_before
    }

    fn add(&self, delta: f64) {
        loop {
            let current = self.accumulated_bits.load(Ordering::SeqCst);
            let updated = (f64::from_bits(current) + delta).to_bits();
            if self
                .accumulated_bits
                .compare_exchange(current, updated, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return;
            }
        }
    }

    fn always_allows(&self) -> bool {
        if self.version == "custom" {
            return true;
        }
        if ALWAYS_ALLOW_LICENSES.contains(&self.license.as_str()) {
            return true;
        }
        !(self.license == "evaluation" && self.version == "nightly")
    }

    /// Current rolling tally, for diagnostics/logging.
    pub fn accumulated(&self) -> f64 {
        self.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn spot_member(price: f64) -> Instance {
        Instance {
            id: "i-1".to_string(),
            instance_type: "m5.large".to_string(),
            availability_zone: "us-east-1a".to_string(),
            subnet_id: "subnet-1".to_string(),
            lifecycle: Lifecycle::Spot,
            state: InstanceState::Running,
            launch_time: SystemTime::now(),
            tags: Default::default(),
            api_termination_protection: false,
            asg_scale_in_protection: false,
            effective_price: price,
        }
    }

    #[test]
    fn savings_sum_only_running_spot_members() {
        let members = vec![spot_member(0.05)];
        let savings = asg_hourly_savings(&members, |_| Some(0.096));
        assert!((savings - 0.046).abs() < 1e-9);
    }

    #[test]
    fn non_nightly_evaluation_always_allowed() {
        let gate = LicenseGate::new("evaluation", "1.0.0");
        assert!(gate.record_and_check(10_000.0));
        assert!(gate.record_and_check(10_000.0));
    }

    #[test]
    fn patreon_license_always_allowed_regardless_of_savings() {
        let gate = LicenseGate::new("I_am_supporting_it_on_Patreon", "nightly");
        assert!(gate.record_and_check(10_000.0));
        assert!(gate.record_and_check(10_000.0));
    }

    #[test]
    fn custom_version_always_allowed() {
        let gate = LicenseGate::new("evaluation", "custom");
        assert!(gate.record_and_check(10_000.0));
    }

    #[test]
    fn nightly_evaluation_denies_once_cap_crossed() {
        let gate = LicenseGate::new("evaluation", "nightly");
        assert!(gate.record_and_check(0.0));
        // One ASG worth far more than the hourly cap crosses it immediately.
        assert!(gate.record_and_check(EVALUATION_HOURLY_CAP_USD + 1.0));
        // Subsequent ASGs are denied once the tally is over the cap.
        assert!(!gate.record_and_check(0.0));
    }
}
