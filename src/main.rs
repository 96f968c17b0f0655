//! # Tide Engine Command Line
//!
//! Thin front end over [`tide_engine::TideEngine`] for inspecting stations and
//! predictions without the serving layer.
//!
//! ```text
//! tide-engine [--config PATH] stations
//! tide-engine [--config PATH] series <id> <start> <end> <step-minutes>
//! tide-engine [--config PATH] events <id> <start> <end> [--brute-force]
//! ```
//!
//! Instants are RFC 3339 (`2024-03-15T00:00:00Z`). Logging goes to stderr and is
//! controlled by `RUST_LOG` (default `info`).

use anyhow::{bail, Context};
use chrono::{DateTime, Duration, Utc};
use std::env;
use tide_engine::config::{EngineConfig, CONFIG_FILE};
use tide_engine::TideEngine;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: tide-engine [--config PATH] <stations | series ID START END STEP_MINUTES | events ID START END [--brute-force]>";

fn parse_instant(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw).with_context(|| format!("invalid instant {raw:?}"))?;
    Ok(parsed.with_timezone(&Utc))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut args: Vec<String> = env::args().skip(1).collect();

    // Optional --config PATH anywhere on the line
    let config_path = match args.iter().position(|arg| arg == "--config") {
        Some(i) => {
            if i + 1 >= args.len() {
                bail!("--config needs a path\n{USAGE}");
            }
            let path = args.remove(i + 1);
            args.remove(i);
            path
        }
        None => CONFIG_FILE.to_string(),
    };
    let brute_force = match args.iter().position(|arg| arg == "--brute-force") {
        Some(i) => {
            args.remove(i);
            true
        }
        None => false,
    };

    let config = EngineConfig::load_from_path(&config_path);
    let engine = TideEngine::new(config).context("cannot start prediction engine")?;

    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["stations"] => {
            for station in engine.stations()? {
                let units = engine
                    .station(&station.id)?
                    .map(|s| s.harmonics.units.as_str())
                    .unwrap_or("?");
                println!(
                    "{}  {}  ({:.4}, {:.4})  {}",
                    station.bin_id.as_deref().unwrap_or(&station.id),
                    station.name,
                    station.latitude,
                    station.longitude,
                    units
                );
            }
        }
        ["series", id, start, end, step] => {
            let step: i64 = step.parse().with_context(|| format!("invalid step {step:?}"))?;
            let points = engine
                .predict_series(id, parse_instant(start)?, parse_instant(end)?, Duration::minutes(step))
                .with_context(|| format!("series for {id}"))?;
            for point in points {
                println!("{}  {:.3}  {}", point.time.to_rfc3339(), point.value, point.units.as_str());
            }
        }
        ["events", id, start, end] => {
            let optimized = !brute_force && engine.config().prediction.use_optimizer;
            let events = engine
                .predict_events(id, parse_instant(start)?, parse_instant(end)?, optimized)
                .with_context(|| format!("events for {id}"))?;
            for event in events {
                println!(
                    "{}  {:<5}  {:.3}  {}",
                    event.time.to_rfc3339(),
                    event.kind.as_str(),
                    event.value,
                    event.units.as_str()
                );
            }
        }
        _ => bail!("{USAGE}"),
    }

    Ok(())
}
