#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that replays a simulator event log.

mod log_csv;
mod text_backend;

use std::{collections::BTreeSet, io, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use route_replay_core::{AgentId, Hour, Timestamp};
use route_replay_rendering::{
    MarkerFrame, Presentation, RenderingBackend, Scene, TrajectoryPresentation,
};
use route_replay_system_snapshot::{Coordinator, EngineConfig};
use route_replay_world::{self as world, query};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::text_backend::{OutputFormat, TextBackend};

/// Seconds of simulated time between printed frames.
const DEFAULT_STEP_SECONDS: f64 = 30.0;

#[derive(Debug, Parser)]
#[command(name = "route-replay")]
#[command(about = "Replays agent movements recorded in a simulator event log")]
struct Args {
    /// Path to the CSV event log.
    #[arg(long)]
    log: PathBuf,

    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma separated agent ids to replay (default: first agents by id).
    #[arg(long, value_delimiter = ',')]
    agents: Vec<u32>,

    /// First replayed hour since the epoch (default: 0).
    #[arg(long)]
    from: Option<f64>,

    /// Last replayed hour since the epoch (default: end of the log).
    #[arg(long)]
    to: Option<f64>,

    /// Simulated seconds between frames.
    #[arg(long, default_value_t = DEFAULT_STEP_SECONDS)]
    step: f64,

    /// Log filter directive, overriding `RUST_LOG`.
    #[arg(long)]
    log_level: Option<String>,

    /// Frame output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

/// Entry point for the Route Replay command-line interface.
fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref())?;

    let config = match &args.config {
        Some(path) => EngineConfig::from_path(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let log = log_csv::read(&args.log)?;
    let world = world::load(log.records, log.coordinates);

    let selection: BTreeSet<AgentId> = if args.agents.is_empty() {
        query::default_selection(&world, config.session.default_selection)
    } else {
        args.agents.iter().copied().map(AgentId::new).collect()
    };

    let span = query::time_span(&world);
    let from = args.from.unwrap_or(0.0);
    let to = args.to.unwrap_or(span.get());
    if !(args.step.is_finite() && args.step > 0.0) {
        bail!("--step must be a positive number of seconds (got {})", args.step);
    }
    if !(from.is_finite() && to.is_finite()) || to < from {
        bail!("invalid replay range {from}..{to}");
    }

    let trajectories = TrajectoryPresentation::collect(
        selection
            .iter()
            .map(|agent| (*agent, query::trajectory(&world, *agent))),
        config.session.trajectory_limit,
    );

    let epoch = config.epoch();
    let start = epoch.timestamp_at(Hour::new(from));
    let frames = ((to - from) * 3600.0 / args.step).floor() as u64 + 1;
    info!(
        agents = selection.len(),
        frames,
        from,
        to,
        "starting replay"
    );

    let mut coordinator = Coordinator::new(world, config.coordinator_config());
    coordinator.select(selection);

    let mut frame_index = 0_u64;
    let mut events = Vec::new();
    TextBackend::new(io::stdout().lock(), args.format).run(
        Presentation::new("Route Replay", Scene::new(trajectories)),
        |scene| {
            if frame_index >= frames {
                return Ok(false);
            }
            let time = Timestamp::from_unix_seconds(
                start.unix_seconds() + frame_index as f64 * args.step,
            );
            frame_index += 1;

            events.clear();
            let _ = coordinator.request(time, &mut events);
            coordinator.settle(&mut events);
            for frame in events.iter().filter_map(MarkerFrame::from_event) {
                scene.apply_frame(&frame);
            }
            Ok(true)
        },
    )?;

    info!(cache = ?coordinator.cache().stats(), "replay finished");
    Ok(())
}

fn init_tracing(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(directive) => EnvFilter::try_new(directive)
            .with_context(|| format!("invalid log level `{directive}`"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}
