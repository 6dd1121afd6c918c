//! Planner — the per-ASG decision state machine. Pure function of
//! `(asg, instances, now, cfg)` to a single [`Action`]; see `§4.4`.

use crate::cloud::asg::Asg;
use crate::cloud::instance::{Instance, InstanceState, Lifecycle};
use crate::config::{resolve_policy, AsgPolicy, Config};
use crate::cron::{CronSchedule, ScheduleState};
use crate::errors::Result;
use crate::license::LicenseGate;
use chrono::{DateTime, Datelike, Timelike, Utc};

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Skip { reason: String },
    EnableEventHandling { asg: String },
    TerminateSpot { asg: String, total_running: i64 },
    LaunchSpotReplacement { on_demand: String },
    TerminateUnneededSpot { asg: String, spot: String, total_running: i64 },
    SwapSpotInstance { asg: String, spot: String },
    HandlePreemption { spot: String },
}

fn skip(reason: &str) -> Action {
    Action::Skip { reason: reason.to_string() }
}

/// `members` is every Instance in the region this tick has already fetched;
/// the planner filters down to what's relevant to `asg`. `replacement_spot`
/// is a pre-located running spot instance tagged `launched-for-asg=<asg>`
/// that is not yet an ASG member, if one exists in the region (§4.4 step 7).
pub fn plan(
    asg: &Asg,
    members: &[Instance],
    replacement_spot: Option<&Instance>,
    now: DateTime<Utc>,
    cfg: &Config,
    license: &LicenseGate,
) -> Result<Action> {
    let policy = resolve_policy(cfg, &asg.tags)?;

    if let Some(schedule) = parse_schedule(&policy)? {
        let hour = now.hour();
        let weekday = now.weekday().num_days_from_sunday();
        let state = ScheduleState::parse(&policy.cron_schedule_state)?;
        if !schedule.gates_action(hour, weekday, state) {
            return Ok(skip("outside-cron-schedule"));
        }
    }

    let asg_members: Vec<&Instance> = members.iter().filter(|i| asg.has_member_instance(&i.id)).collect();
    let catalog = crate::catalog::catalog();
    let on_demand_price_of = |type_id: &str| -> Option<f64> {
        catalog.get(type_id).ok().and_then(|t| t.on_demand_price.get(&asg.region).copied())
    };
    let savings = crate::license::asg_hourly_savings(
        &asg_members.iter().map(|i| (*i).clone()).collect::<Vec<_>>(),
        on_demand_price_of,
    );
    if !license.record_and_check(savings) {
        return Ok(skip("over-license"));
    }

    if !asg.is_enabled_for_event_handling() {
        return Ok(Action::EnableEventHandling { asg: asg.name.clone() });
    }

    let running: Vec<&&Instance> = asg_members.iter().filter(|i| i.state.is_running()).collect();
    let od_running = running.iter().filter(|i| i.lifecycle == Lifecycle::OnDemand).count() as i64;
    let spot_running = running.iter().filter(|i| i.lifecycle == Lifecycle::Spot).count() as i64;
    let total_running = od_running + spot_running;
    let od_needed = policy.min_on_demand(asg.desired).max(0);

    if spot_running + od_running > asg.desired && spot_running >= 1 {
        return Ok(Action::TerminateSpot {
            asg: asg.name.clone(),
            total_running,
        });
    }

    let need_replace = od_running > od_needed && total_running >= asg.desired;
    if !need_replace {
        return Ok(skip("enough-on-demand-already"));
    }

    if let Some(spot) = replacement_spot {
        let grace = asg.health_check_grace_period;
        let alive_long_enough = spot.age(now.into()) >= grace;
        let has_unprotected_od_in_az = running
            .iter()
            .any(|i| i.lifecycle == Lifecycle::OnDemand && i.is_unprotected() && i.availability_zone == spot.availability_zone);

        if has_unprotected_od_in_az && alive_long_enough {
            return Ok(Action::SwapSpotInstance {
                asg: asg.name.clone(),
                spot: spot.id.clone(),
            });
        }
        if !alive_long_enough {
            return Ok(skip("spot instance replacement exists but not ready"));
        }
        if od_running <= od_needed {
            return Ok(Action::TerminateUnneededSpot {
                asg: asg.name.clone(),
                spot: spot.id.clone(),
                total_running,
            });
        }
    }

    match running.iter().find(|i| i.lifecycle == Lifecycle::OnDemand && i.is_unprotected()) {
        Some(base) => Ok(Action::LaunchSpotReplacement { on_demand: base.id.clone() }),
        None => Ok(skip("all-on-demand-protected")),
    }
}

fn parse_schedule(policy: &AsgPolicy) -> Result<Option<CronSchedule>> {
    let raw = policy.cron_schedule.trim();
    if raw.is_empty() || raw == "* *" {
        return Ok(None);
    }
    Ok(Some(CronSchedule::parse(raw)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::asg::Member;
    use chrono::TimeZone;
    use rstest::rstest;
    use std::collections::HashMap;
    use std::time::{Duration, SystemTime};

    fn enabled_asg(desired: i64, members: Vec<Member>) -> Asg {
        let mut tags = HashMap::new();
        tags.insert("autospotting_enabled-for-event-handling".to_string(), "true".to_string());
        Asg {
            name: "demo-asg".to_string(),
            region: "us-east-1".to_string(),
            desired,
            min: 1,
            max: 5,
            members,
            lifecycle_hooks: vec![],
            health_check_grace_period: Duration::from_secs(300),
            tags,
        }
    }

    fn on_demand(id: &str, az: &str, protected: bool) -> Instance {
        Instance {
            id: id.to_string(),
            instance_type: "m5.large".to_string(),
            availability_zone: az.to_string(),
            subnet_id: "subnet-1".to_string(),
            lifecycle: Lifecycle::OnDemand,
            state: InstanceState::Running,
            launch_time: SystemTime::now() - Duration::from_secs(3600),
            tags: HashMap::new(),
            api_termination_protection: protected,
            asg_scale_in_protection: false,
            effective_price: 0.096,
        }
    }

    fn base_config() -> Config {
        Config {
            regions: String::new(),
            allowed_instance_types: String::new(),
            disallowed_instance_types: String::new(),
            min_on_demand_number: 0,
            min_on_demand_percentage: 0.0,
            on_demand_price_multiplier: 1.0,
            bidding_policy: "normal".to_string(),
            spot_price_buffer_percentage: 10.0,
            spot_product_description: "Linux/UNIX".to_string(),
            instance_termination_method: "autoscaling".to_string(),
            termination_notification_action: "auto".to_string(),
            tag_filtering_mode: "opt-in".to_string(),
            tag_filters: String::new(),
            cron_schedule: "* *".to_string(),
            cron_schedule_state: "on".to_string(),
            license: "I_built_it_from_source_code".to_string(),
            version: "test".to_string(),
            event_file: None,
            sleep_multiplier: 0,
        }
    }

    #[rstest]
    #[case::not_yet_enabled(false)]
    fn first_observation_enables_event_handling(#[case] enabled: bool) {
        let _ = enabled;
        let mut asg = enabled_asg(1, vec![Member { instance_id: "i-1".to_string(), scale_in_protected: false }]);
        asg.tags.clear();
        let members = vec![on_demand("i-1", "us-east-1a", false)];
        let cfg = base_config();
        let license = LicenseGate::new(cfg.license.clone(), cfg.version.clone());
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let action = plan(&asg, &members, None, now, &cfg, &license).unwrap();
        assert_eq!(action, Action::EnableEventHandling { asg: "demo-asg".to_string() });
    }

    #[test]
    fn launches_replacement_when_all_on_demand_and_at_desired() {
        let asg = enabled_asg(
            1,
            vec![Member { instance_id: "i-1".to_string(), scale_in_protected: false }],
        );
        let members = vec![on_demand("i-1", "us-east-1a", false)];
        let cfg = base_config();
        let license = LicenseGate::new(cfg.license.clone(), cfg.version.clone());
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let action = plan(&asg, &members, None, now, &cfg, &license).unwrap();
        assert_eq!(action, Action::LaunchSpotReplacement { on_demand: "i-1".to_string() });
    }

    #[test]
    fn all_protected_on_demand_skips() {
        let asg = enabled_asg(
            1,
            vec![Member { instance_id: "i-1".to_string(), scale_in_protected: false }],
        );
        let members = vec![on_demand("i-1", "us-east-1a", true)];
        let cfg = base_config();
        let license = LicenseGate::new(cfg.license.clone(), cfg.version.clone());
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let action = plan(&asg, &members, None, now, &cfg, &license).unwrap();
        assert_eq!(action, skip("all-on-demand-protected"));
    }

    #[test]
    fn below_desired_capacity_skips_without_replacement() {
        let asg = enabled_asg(
            2,
            vec![Member { instance_id: "i-1".to_string(), scale_in_protected: false }],
        );
        let members = vec![on_demand("i-1", "us-east-1a", false)];
        let cfg = base_config();
        let license = LicenseGate::new(cfg.license.clone(), cfg.version.clone());
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let action = plan(&asg, &members, None, now, &cfg, &license).unwrap();
        assert_eq!(action, skip("enough-on-demand-already"));
    }

    #[test]
    fn swaps_when_replacement_spot_is_healthy_and_od_unprotected() {
        let asg = enabled_asg(
            1,
            vec![Member { instance_id: "i-1".to_string(), scale_in_protected: false }],
        );
        let members = vec![on_demand("i-1", "us-east-1a", false)];
        let spot = Instance {
            id: "i-spot".to_string(),
            instance_type: "m5.large".to_string(),
            availability_zone: "us-east-1a".to_string(),
            subnet_id: "subnet-1".to_string(),
            lifecycle: Lifecycle::Spot,
            state: InstanceState::Running,
            launch_time: SystemTime::now() - Duration::from_secs(3600),
            tags: HashMap::new(),
            api_termination_protection: false,
            asg_scale_in_protection: false,
            effective_price: 0.05,
        };
        let cfg = base_config();
        let license = LicenseGate::new(cfg.license.clone(), cfg.version.clone());
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let action = plan(&asg, &members, Some(&spot), now, &cfg, &license).unwrap();
        assert_eq!(
            action,
            Action::SwapSpotInstance { asg: "demo-asg".to_string(), spot: "i-spot".to_string() }
        );
    }

    #[test]
    fn young_replacement_spot_is_not_yet_ready() {
        let asg = enabled_asg(
            1,
            vec![Member { instance_id: "i-1".to_string(), scale_in_protected: false }],
        );
        let members = vec![on_demand("i-1", "us-east-1a", false)];
        let spot = Instance {
            id: "i-spot".to_string(),
            instance_type: "m5.large".to_string(),
            availability_zone: "us-east-1a".to_string(),
            subnet_id: "subnet-1".to_string(),
            lifecycle: Lifecycle::Spot,
            state: InstanceState::Running,
            launch_time: SystemTime::now(),
            tags: HashMap::new(),
            api_termination_protection: false,
            asg_scale_in_protection: false,
            effective_price: 0.05,
        };
        let cfg = base_config();
        let license = LicenseGate::new(cfg.license.clone(), cfg.version.clone());
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let action = plan(&asg, &members, Some(&spot), now, &cfg, &license).unwrap();
        assert_eq!(action, skip("spot instance replacement exists but not ready"));
    }
}
