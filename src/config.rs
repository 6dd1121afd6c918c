//! Global configuration and per-ASG policy resolution.
//!
//! Every option is settable by CLI flag, environment variable (upper-cased),
//! or ASG tag. `clap`'s derive + `env` feature handles the first two tiers,
//! the way the original agent unified `namsral/flag` CLI/env parsing; the
//! third tier is resolved explicitly in [`resolve_policy`].

use crate::errors::{AutospottingError, Result};
use clap::Parser;
use std::collections::HashMap;

pub const DEFAULT_BIDDING_POLICY: &str = "normal";
pub const DEFAULT_INSTANCE_TERMINATION_METHOD: &str = "autoscaling";
pub const DEFAULT_TERMINATION_NOTIFICATION_ACTION: &str = "auto";
pub const DEFAULT_SPOT_PRICE_BUFFER_PERCENTAGE: f64 = 10.0;
pub const DEFAULT_SPOT_PRODUCT_DESCRIPTION: &str = "Linux/UNIX";
pub const DEFAULT_MIN_ON_DEMAND_VALUE: i64 = 0;

/// Process-wide configuration, parsed once at startup.
#[derive(Parser, Debug, Clone)]
#[command(name = "autospotting")]
#[command(about = "Replace on-demand ASG capacity with compatible spot instances")]
pub struct Config {
    /// Regions to scan (comma/whitespace separated, globs allowed). Empty = all regions.
    #[arg(long, env = "REGIONS", default_value = "")]
    pub regions: String,

    /// Allow-list for candidate instance types (globs, `current` = base's own type).
    #[arg(long, env = "ALLOWED_INSTANCE_TYPES", default_value = "")]
    pub allowed_instance_types: String,

    /// Deny-list for candidate instance types (globs).
    #[arg(long, env = "DISALLOWED_INSTANCE_TYPES", default_value = "")]
    pub disallowed_instance_types: String,

    /// Absolute floor on running on-demand instances per ASG.
    #[arg(long, env = "MIN_ON_DEMAND_NUMBER", default_value_t = DEFAULT_MIN_ON_DEMAND_VALUE)]
    pub min_on_demand_number: i64,

    /// Percentage floor on running on-demand instances; ignored if number is set.
    #[arg(long, env = "MIN_ON_DEMAND_PERCENTAGE", default_value_t = 0.0)]
    pub min_on_demand_percentage: f64,

    /// Multiplier applied to the catalog's on-demand reference price.
    #[arg(long, env = "ON_DEMAND_PRICE_MULTIPLIER", default_value_t = 1.0)]
    pub on_demand_price_multiplier: f64,

    /// `normal` | `aggressive`.
    #[arg(long, env = "BIDDING_POLICY", default_value = DEFAULT_BIDDING_POLICY)]
    pub bidding_policy: String,

    /// Percentage above current spot price to bid, when aggressive.
    #[arg(long, env = "SPOT_PRICE_BUFFER_PERCENTAGE", default_value_t = DEFAULT_SPOT_PRICE_BUFFER_PERCENTAGE)]
    pub spot_price_buffer_percentage: f64,

    /// Spot product description used for price history lookups.
    #[arg(long, env = "SPOT_PRODUCT_DESCRIPTION", default_value = DEFAULT_SPOT_PRODUCT_DESCRIPTION)]
    pub spot_product_description: String,

    /// `autoscaling` (default) | `detach`.
    #[arg(long, env = "INSTANCE_TERMINATION_METHOD", default_value = DEFAULT_INSTANCE_TERMINATION_METHOD)]
    pub instance_termination_method: String,

    /// `auto` | `terminate` | `detach`.
    #[arg(long, env = "TERMINATION_NOTIFICATION_ACTION", default_value = DEFAULT_TERMINATION_NOTIFICATION_ACTION)]
    pub termination_notification_action: String,

    /// `opt-in` (default) | `opt-out`.
    #[arg(long, env = "TAG_FILTERING_MODE", default_value = "opt-in")]
    pub tag_filtering_mode: String,

    /// Comma/whitespace separated `k=v` tag filters for ASG enumeration.
    #[arg(long, env = "TAG_FILTERS", default_value = "")]
    pub tag_filters: String,

    /// `"H D"` cron-like schedule; see `crate::cron`.
    #[arg(long, env = "CRON_SCHEDULE", default_value = "* *")]
    pub cron_schedule: String,

    /// `on` | `off`.
    #[arg(long, env = "CRON_SCHEDULE_STATE", default_value = "on")]
    pub cron_schedule_state: String,

    /// License mode; see `crate::license`.
    #[arg(long, env = "LICENSE", default_value = "evaluation")]
    pub license: String,

    /// Build/version string, used by the license gate's `nightly` check.
    #[arg(long, env = "VERSION", default_value = "number missing")]
    pub version: String,

    /// JSON file containing event data, for local simulation instead of a live trigger.
    #[arg(long, env = "EVENT_FILE")]
    pub event_file: Option<std::path::PathBuf>,

    /// Sleep interval multiplier for health/attach waits; 0 in tests, 1 in production.
    #[arg(skip = 1)]
    pub sleep_multiplier: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiddingPolicy {
    Normal,
    Aggressive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationMethod {
    AutoScaling,
    Detach,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationNotificationAction {
    Auto,
    Terminate,
    Detach,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagFilteringMode {
    OptIn,
    OptOut,
}

/// Fully resolved, per-ASG policy: global config overridden by ASG tags.
#[derive(Debug, Clone)]
pub struct AsgPolicy {
    pub allowed_instance_types: String,
    pub disallowed_instance_types: String,
    pub min_on_demand_number: i64,
    pub min_on_demand_percentage: f64,
    pub on_demand_price_multiplier: f64,
    pub bidding_policy: BiddingPolicy,
    pub spot_price_buffer_percentage: f64,
    pub spot_product_description: String,
    pub instance_termination_method: TerminationMethod,
    pub termination_notification_action: TerminationNotificationAction,
    pub cron_schedule: String,
    pub cron_schedule_state: String,
}

fn tag_override<'a>(tags: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    tags.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

fn parse_bidding_policy(raw: &str) -> Result<BiddingPolicy> {
    match raw {
        "normal" => Ok(BiddingPolicy::Normal),
        "aggressive" => Ok(BiddingPolicy::Aggressive),
        other => Err(AutospottingError::config(format!("invalid bidding_policy '{other}'"))),
    }
}

fn parse_termination_method(raw: &str) -> Result<TerminationMethod> {
    match raw {
        "autoscaling" => Ok(TerminationMethod::AutoScaling),
        "detach" => Ok(TerminationMethod::Detach),
        other => Err(AutospottingError::config(format!(
            "invalid instance_termination_method '{other}'"
        ))),
    }
}

fn parse_notification_action(raw: &str) -> Result<TerminationNotificationAction> {
    match raw {
        "auto" => Ok(TerminationNotificationAction::Auto),
        "terminate" => Ok(TerminationNotificationAction::Terminate),
        "detach" => Ok(TerminationNotificationAction::Detach),
        other => Err(AutospottingError::config(format!(
            "invalid termination_notification_action '{other}'"
        ))),
    }
}

/// Resolve a per-ASG policy: tag values win over the global `cfg`, field by field.
pub fn resolve_policy(cfg: &Config, asg_tags: &HashMap<String, String>) -> Result<AsgPolicy> {
    let allowed = tag_override(asg_tags, "autospotting_allowed_instance_types")
        .unwrap_or(&cfg.allowed_instance_types)
        .to_string();
    let disallowed = tag_override(asg_tags, "autospotting_disallowed_instance_types")
        .unwrap_or(&cfg.disallowed_instance_types)
        .to_string();

    let min_on_demand_number = tag_override(asg_tags, "autospotting_min_on_demand_number")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(cfg.min_on_demand_number);
    let min_on_demand_percentage = tag_override(asg_tags, "autospotting_min_on_demand_percentage")
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(cfg.min_on_demand_percentage);

    let on_demand_price_multiplier = tag_override(asg_tags, "autospotting_on_demand_price_multiplier")
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(cfg.on_demand_price_multiplier);

    let bidding_policy_raw = tag_override(asg_tags, "autospotting_bidding_policy")
        .unwrap_or(&cfg.bidding_policy)
        .to_string();
    let spot_price_buffer_percentage = tag_override(asg_tags, "autospotting_spot_price_buffer_percentage")
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(cfg.spot_price_buffer_percentage);
    let spot_product_description = tag_override(asg_tags, "autospotting_spot_product_description")
        .unwrap_or(&cfg.spot_product_description)
        .to_string();

    let termination_method_raw = tag_override(asg_tags, "autospotting_instance_termination_method")
        .unwrap_or(&cfg.instance_termination_method)
        .to_string();
    let notification_action_raw = tag_override(asg_tags, "autospotting_termination_notification_action")
        .unwrap_or(&cfg.termination_notification_action)
        .to_string();

    let cron_schedule = tag_override(asg_tags, "autospotting_cron_schedule")
        .unwrap_or(&cfg.cron_schedule)
        .to_string();
    let cron_schedule_state = tag_override(asg_tags, "autospotting_cron_schedule_state")
        .unwrap_or(&cfg.cron_schedule_state)
        .to_string();

    Ok(AsgPolicy {
        allowed_instance_types: allowed,
        disallowed_instance_types: disallowed,
        min_on_demand_number,
        min_on_demand_percentage,
        on_demand_price_multiplier,
        bidding_policy: parse_bidding_policy(&bidding_policy_raw)?,
        spot_price_buffer_percentage,
        spot_product_description,
        instance_termination_method: parse_termination_method(&termination_method_raw)?,
        termination_notification_action: parse_notification_action(&notification_action_raw)?,
        cron_schedule,
        cron_schedule_state,
    })
}

impl AsgPolicy {
    /// `minOnDemand` derives from whichever of number/percentage is positive;
    /// number wins if both are set. Clamped to `[0, desired]`.
    pub fn min_on_demand(&self, desired: i64) -> i64 {
        let raw = if self.min_on_demand_number > 0 {
            self.min_on_demand_number
        } else if self.min_on_demand_percentage > 0.0 {
            ((self.min_on_demand_percentage / 100.0) * desired as f64).ceil() as i64
        } else {
            0
        };
        raw.clamp(0, desired.max(0))
    }
}

impl TagFilteringMode {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "opt-in" => Ok(Self::OptIn),
            "opt-out" => Ok(Self::OptOut),
            other => Err(AutospottingError::config(format!(
                "invalid tag_filtering_mode '{other}'"
            ))),
        }
    }

    /// Default tag filter when the operator supplies none.
    pub fn default_filter(self) -> (&'static str, &'static str) {
        match self {
            Self::OptIn => ("spot-enabled", "true"),
            Self::OptOut => ("spot-enabled", "false"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            regions: String::new(),
            allowed_instance_types: String::new(),
            disallowed_instance_types: String::new(),
            min_on_demand_number: 0,
            min_on_demand_percentage: 0.0,
            on_demand_price_multiplier: 1.0,
            bidding_policy: DEFAULT_BIDDING_POLICY.to_string(),
            spot_price_buffer_percentage: DEFAULT_SPOT_PRICE_BUFFER_PERCENTAGE,
            spot_product_description: DEFAULT_SPOT_PRODUCT_DESCRIPTION.to_string(),
            instance_termination_method: DEFAULT_INSTANCE_TERMINATION_METHOD.to_string(),
            termination_notification_action: DEFAULT_TERMINATION_NOTIFICATION_ACTION.to_string(),
            tag_filtering_mode: "opt-in".to_string(),
            tag_filters: String::new(),
            cron_schedule: "* *".to_string(),
            cron_schedule_state: "on".to_string(),
            license: "evaluation".to_string(),
            version: "test".to_string(),
            event_file: None,
            sleep_multiplier: 0,
        }
    }

    #[test]
    fn tag_overrides_win_over_global_config() {
        let cfg = base_config();
        let mut tags = HashMap::new();
        tags.insert("autospotting_bidding_policy".to_string(), "aggressive".to_string());
        let policy = resolve_policy(&cfg, &tags).unwrap();
        assert_eq!(policy.bidding_policy, BiddingPolicy::Aggressive);
    }

    #[test]
    fn empty_tag_value_does_not_override() {
        let cfg = base_config();
        let mut tags = HashMap::new();
        tags.insert("autospotting_allowed_instance_types".to_string(), "".to_string());
        let policy = resolve_policy(&cfg, &tags).unwrap();
        assert_eq!(policy.allowed_instance_types, "");
    }

    #[test]
    fn min_on_demand_number_wins_when_both_set() {
        let mut cfg = base_config();
        cfg.min_on_demand_number = 2;
        cfg.min_on_demand_percentage = 100.0;
        let policy = resolve_policy(&cfg, &HashMap::new()).unwrap();
        assert_eq!(policy.min_on_demand(5), 2);
    }

    #[test]
    fn percentage_used_when_number_unset() {
        let mut cfg = base_config();
        cfg.min_on_demand_percentage = 100.0;
        let policy = resolve_policy(&cfg, &HashMap::new()).unwrap();
        assert_eq!(policy.min_on_demand(1), 1);
    }

    #[test]
    fn min_on_demand_clamped_to_desired() {
        let mut cfg = base_config();
        cfg.min_on_demand_number = 50;
        let policy = resolve_policy(&cfg, &HashMap::new()).unwrap();
        assert_eq!(policy.min_on_demand(3), 3);
    }

    #[test]
    fn tag_filtering_mode_defaults() {
        assert_eq!(TagFilteringMode::OptIn.default_filter(), ("spot-enabled", "true"));
        assert_eq!(TagFilteringMode::OptOut.default_filter(), ("spot-enabled", "false"));
    }
}
