//! Property tests for the universal invariants in `SPEC_FULL.md §8`:
//! CandidateSelector totality and ranking as a strict total order.

use autospotting::catalog::catalog;
use autospotting::cloud::{Instance, InstanceState, Lifecycle};
use autospotting::config::{AsgPolicy, BiddingPolicy, TerminationMethod, TerminationNotificationAction};
use autospotting::pricing::PriceOracle;
use autospotting::selector::select_candidates;
use proptest::prelude::*;
use std::collections::HashMap;
use std::time::SystemTime;

fn permissive_policy(allowed: &str, disallowed: &str) -> AsgPolicy {
    AsgPolicy {
        allowed_instance_types: allowed.to_string(),
        disallowed_instance_types: disallowed.to_string(),
        min_on_demand_number: 0,
        min_on_demand_percentage: 0.0,
        on_demand_price_multiplier: 1.0,
        bidding_policy: BiddingPolicy::Normal,
        spot_price_buffer_percentage: 10.0,
        spot_product_description: "Linux/UNIX".to_string(),
        instance_termination_method: TerminationMethod::AutoScaling,
        termination_notification_action: TerminationNotificationAction::Auto,
        cron_schedule: "* *".to_string(),
        cron_schedule_state: "on".to_string(),
    }
}

fn base_instance() -> Instance {
    Instance {
        id: "i-base".to_string(),
        instance_type: "t3.medium".to_string(),
        availability_zone: "us-east-1a".to_string(),
        subnet_id: "subnet-1".to_string(),
        lifecycle: Lifecycle::OnDemand,
        state: InstanceState::Running,
        launch_time: SystemTime::now(),
        tags: HashMap::new(),
        api_termination_protection: false,
        asg_scale_in_protection: false,
        effective_price: 0.042,
    }
}

fn family_token() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("t3.*".to_string()),
        Just("m5.*".to_string()),
        Just("c5.*".to_string()),
        Just("r5.*".to_string()),
        Just("".to_string()),
    ]
}

proptest! {
    /// Any allow/deny glob combination built from the catalog's own family
    /// globs either yields a non-empty, validly ranked list, or a "no
    /// candidate" error -- never a panic, never an unranked/inconsistent list.
    #[test]
    fn selector_is_total_and_ranking_is_stable(allowed in family_token(), disallowed in family_token()) {
        let base = base_instance();
        let oracle = PriceOracle::new();
        let policy = permissive_policy(&allowed, &disallowed);
        let azs = vec!["us-east-1a".to_string()];

        let result = select_candidates(&base, "us-east-1", &azs, &policy, catalog(), &oracle);
        if let Ok(candidates) = result {
            prop_assert!(!candidates.is_empty());
            let again = select_candidates(&base, "us-east-1", &azs, &policy, catalog(), &oracle).unwrap();
            prop_assert_eq!(candidates, again);
        }
    }
}
