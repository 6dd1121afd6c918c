//! EventRouter — classifies an incoming trigger and fans work out across
//! regions and ASGs within one invocation, per `§4.6`/`§5`.

use crate::cloud::api::CloudApi;
use crate::cloud::asg::{Asg, LifecycleTransition};
use crate::cloud::instance::Instance;
use crate::config::{resolve_policy, Config, TagFilteringMode};
use crate::errors::Result;
use crate::executor::ActionExecutor;
use crate::license::LicenseGate;
use crate::planner::{plan, Action};
use crate::pricing::{PriceOracle, SpotPriceKey, SpotPriceSample};
use crate::selector::select_candidates;
use chrono::Utc;
use std::sync::Mutex;
use tracing::{info, instrument};

/// Default bound on ASG workers within one region (§5).
pub const DEFAULT_ASG_CONCURRENCY: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    CronTick,
    InstanceLaunch(String),
    InstanceTermination(String),
    SpotInterruptionWarning(String),
    LifecycleHook { asg: String, instance_id: String, transition: LifecycleTransition, token: String },
}

/// Classify a cloud-event `detail-type` string plus its instance/ASG payload
/// into an [`Event`]. `detail_type` is matched bit-exactly against the four
/// documented notification kinds (§6); anything else falls back to `CronTick`
/// only when `detail_type` is empty (the scheduled, payload-less trigger).
pub fn classify(detail_type: &str, instance_id: Option<&str>, asg_name: Option<&str>, token: Option<&str>) -> Option<Event> {
    match detail_type {
        "" => Some(Event::CronTick),
        "EC2 Instance State-change Notification" => {
            instance_id.map(|id| Event::InstanceLaunch(id.to_string()))
        }
        "EC2 Spot Instance Interruption Warning" => {
            instance_id.map(|id| Event::SpotInterruptionWarning(id.to_string()))
        }
        "EC2 Instance-launch Lifecycle Action" => match (asg_name, instance_id, token) {
            (Some(asg), Some(id), Some(tok)) => Some(Event::LifecycleHook {
                asg: asg.to_string(),
                instance_id: id.to_string(),
                transition: LifecycleTransition::InstanceLaunching,
                token: tok.to_string(),
            }),
            _ => None,
        },
        "EC2 Instance-terminate Lifecycle Action" => match (asg_name, instance_id, token) {
            (Some(asg), Some(id), Some(tok)) => Some(Event::LifecycleHook {
                asg: asg.to_string(),
                instance_id: id.to_string(),
                transition: LifecycleTransition::InstanceTerminating,
                token: tok.to_string(),
            }),
            _ => None,
        },
        _ => None,
    }
}

/// Whether an ASG matches the configured tag filter, honoring opt-in/opt-out.
fn asg_matches_tag_filter(asg: &Asg, cfg: &Config) -> Result<bool> {
    let mode = TagFilteringMode::parse(&cfg.tag_filtering_mode)?;
    let filters = parse_tag_filters(&cfg.tag_filters, mode);
    Ok(filters.iter().all(|(k, v)| asg.tag(k) == Some(v.as_str())))
}

fn parse_tag_filters(raw: &str, mode: TagFilteringMode) -> Vec<(String, String)> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        let (k, v) = mode.default_filter();
        return vec![(k.to_string(), v.to_string())];
    }
    trimmed
        .split([',', ' ', '\t'])
        .filter(|t| !t.is_empty())
        .filter_map(|t| t.split_once('=').map(|(k, v)| (k.to_string(), v.to_string())))
        .collect()
}

/// One invocation's router: owns the region snapshot, the shared license
/// gate, and dispatches per-ASG Planner+Executor runs.
pub struct EventRouter<'a> {
    api: &'a dyn CloudApi,
    cfg: &'a Config,
    license: Mutex<LicenseGate>,
}

impl<'a> EventRouter<'a> {
    pub fn new(api: &'a dyn CloudApi, cfg: &'a Config) -> Self {
        Self {
            api,
            cfg,
            license: Mutex::new(LicenseGate::new(cfg.license.clone(), cfg.version.clone())),
        }
    }

    /// Run one `CronTick` over a single region: enumerate matching ASGs,
    /// then run Planner+Executor for each. Within a region this is a
    /// sequential reference implementation of the §5 bounded worker pool —
    /// `DEFAULT_ASG_CONCURRENCY` documents the intended fan-out width for a
    /// threaded driver built on top of this router.
    #[instrument(skip(self))]
    pub fn run_cron_tick(&self, region: &str) -> Result<()> {
        let asgs = self.api.describe_asgs(region)?;
        let members = self.api.describe_instances(region)?;
        let oracle = self.build_price_oracle(region)?;
        for asg in &asgs {
            if !asg_matches_tag_filter(asg, self.cfg)? {
                continue;
            }
            // A failure here is fatal only to this ASG (§4.5): log and move
            // on so the rest of the region's ASGs still get a tick.
            if let Err(err) = self.run_one_asg(region, asg, &members, &oracle) {
                tracing::warn!(asg = %asg.name, error = %err, "ASG tick failed");
            }
        }
        Ok(())
    }

    /// Populate a fresh [`PriceOracle`] via a single bulk spot-price-history
    /// query, shared read-only across every ASG this invocation touches in
    /// `region` (`§4.2`).
    fn build_price_oracle(&self, region: &str) -> Result<PriceOracle> {
        let mut oracle = PriceOracle::new();
        let product = &self.cfg.spot_product_description;
        for observation in self.api.describe_spot_price_history(region, product)? {
            oracle.ingest(
                SpotPriceKey {
                    instance_type: observation.instance_type,
                    availability_zone: observation.availability_zone,
                    product_description: product.clone(),
                },
                SpotPriceSample { price: observation.price, timestamp: observation.timestamp },
            );
        }
        Ok(oracle)
    }

    fn run_one_asg(&self, region: &str, asg: &Asg, members: &[Instance], oracle: &PriceOracle) -> Result<()> {
        let policy = resolve_policy(self.cfg, &asg.tags)?;
        let replacement_spot = members.iter().find(|i| {
            i.lifecycle == crate::cloud::instance::Lifecycle::Spot
                && i.state.is_running()
                && i.launched_for_asg() == Some(asg.name.as_str())
                && !asg.has_member_instance(&i.id)
        });

        let action = {
            let license = self.license.lock().unwrap();
            plan(asg, members, replacement_spot, Utc::now(), self.cfg, &license)?
        };

        let candidates = if let Action::LaunchSpotReplacement { on_demand } = &action {
            let base = members.iter().find(|i| &i.id == on_demand);
            match base {
                Some(base) => {
                    let catalog = crate::catalog::catalog();
                    let azs: Vec<String> = members
                        .iter()
                        .filter(|i| asg.has_member_instance(&i.id))
                        .map(|i| i.availability_zone.clone())
                        .collect();
                    select_candidates(base, region, &azs, &policy, catalog, oracle)?
                }
                None => vec![],
            }
        } else {
            vec![]
        };

        let executor = ActionExecutor::new(self.api, self.cfg.sleep_multiplier);
        executor.execute(region, asg, &policy, members, &action, &candidates)?;
        info!(asg = %asg.name, ?action, "tick complete");
        Ok(())
    }

    pub fn handle_event(&self, event: Event, region: &str) -> Result<()> {
        match event {
            Event::CronTick => self.run_cron_tick(region),
            Event::InstanceLaunch(id) => self.handle_instance_launch(region, &id),
            Event::InstanceTermination(_id) => Ok(()),
            Event::SpotInterruptionWarning(id) => {
                let executor = ActionExecutor::new(self.api, self.cfg.sleep_multiplier);
                let action = Action::HandlePreemption { spot: id };
                let dummy_asg = Asg {
                    name: String::new(),
                    region: region.to_string(),
                    desired: 0,
                    min: 0,
                    max: 0,
                    members: vec![],
                    lifecycle_hooks: vec![],
                    health_check_grace_period: std::time::Duration::from_secs(0),
                    tags: Default::default(),
                };
                let policy = resolve_policy(self.cfg, &dummy_asg.tags)?;
                executor.execute(region, &dummy_asg, &policy, &[], &action, &[])
            }
            Event::LifecycleHook { asg, token, .. } => {
                self.api.complete_lifecycle_action(region, &asg, &token, "CONTINUE")
            }
        }
    }

    fn handle_instance_launch(&self, region: &str, instance_id: &str) -> Result<()> {
        let instances = self.api.describe_instances(region)?;
        let instance = match instances.iter().find(|i| i.id == instance_id) {
            Some(i) => i,
            None => return Ok(()),
        };
        if !instance.is_launched_by_autospotting() {
            return Ok(());
        }
        let asg_name = match instance.launched_for_asg() {
            Some(name) => name.to_string(),
            None => return Ok(()),
        };
        let asgs = self.api.describe_asgs(region)?;
        let asg = match asgs.iter().find(|a| a.name == asg_name) {
            Some(a) if a.is_enabled_for_event_handling() => a,
            _ => return Ok(()),
        };
        let oracle = self.build_price_oracle(region)?;
        self.run_one_asg(region, asg, &instances, &oracle)
    }
}
