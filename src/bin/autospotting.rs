//! CLI entrypoint. Installs structured logging, parses `Config`, and
//! dispatches either a local `--event-file` simulation or the live trigger
//! this binary was invoked with.

use autospotting::cloud::{CloudApi, FakeCloud};
use autospotting::config::Config;
use autospotting::router::{classify, Event, EventRouter};
use clap::Parser;
use colored::Colorize;
use std::fs;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Shape of a `--event-file` payload, mirroring the cloud-event envelope
/// documented in `§6`.
#[derive(Debug, serde::Deserialize)]
struct EventFile {
    #[serde(default)]
    detail_type: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    instance_id: Option<String>,
    #[serde(default)]
    asg_name: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

/// `LOG_FORMAT=json` switches to structured JSON lines, the way the agent
/// would run under a log collector in production; anything else (including
/// unset) keeps the human-readable formatter for local/interactive use.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    }
}

fn run_invocation(cfg: &Config, api: &dyn CloudApi) -> autospotting::Result<()> {
    let router = EventRouter::new(api, cfg);

    let (event, region) = match &cfg.event_file {
        Some(path) => {
            let raw = fs::read_to_string(path).map_err(|e| {
                autospotting::AutospottingError::config(format!("cannot read event file {path:?}: {e}"))
            })?;
            let payload: EventFile = serde_json::from_str(&raw).map_err(|e| {
                autospotting::AutospottingError::config(format!("malformed event file {path:?}: {e}"))
            })?;
            let event = classify(
                &payload.detail_type,
                payload.instance_id.as_deref(),
                payload.asg_name.as_deref(),
                payload.token.as_deref(),
            )
            .ok_or_else(|| autospotting::AutospottingError::config("event file did not classify to a known trigger"))?;
            (event, payload.region)
        }
        None => (Event::CronTick, String::new()),
    };

    for region in regions_to_scan(cfg, &region) {
        info!(region = %region, ?event, "dispatching invocation");
        router.handle_event(event.clone(), &region)?;
    }
    Ok(())
}

/// Resolve which regions this invocation should touch: the event's own
/// region if one was given, otherwise every configured region glob token
/// taken literally (region discovery/enumeration is an external
/// collaborator, see `§1`/`§6a`).
fn regions_to_scan(cfg: &Config, event_region: &str) -> Vec<String> {
    if !event_region.is_empty() {
        return vec![event_region.to_string()];
    }
    let tokens = autospotting::glob::split_tokens(&cfg.regions);
    if tokens.is_empty() {
        vec!["us-east-1".to_string()]
    } else {
        tokens.into_iter().map(str::to_string).collect()
    }
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let mut cfg = Config::parse();
    cfg.sleep_multiplier = if cfg.event_file.is_some() { 0 } else { 1 };

    println!("{} autospotting v{}", "▸".green(), autospotting::VERSION);
    info!(version = %autospotting::VERSION, "starting autospotting agent");
    info!(?cfg, "effective configuration");

    // No live cloud SDK is wired into this binary (§1/§6a treat the SDK
    // client as an external collaborator); --event-file runs drive the
    // in-memory FakeCloud so the control loop can be exercised end-to-end
    // without credentials.
    let cloud = FakeCloud::new();

    if let Err(err) = run_invocation(&cfg, &cloud) {
        error!(error = %err, "invocation failed");
        std::process::exit(1);
    }

    Ok(())
}
