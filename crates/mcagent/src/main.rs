//! mc-agent - reference simulation host for a MonsterCarlo-style driver.
//!
//! When launched by a driver (`MONSTERCARLO_DRIVER_NONCE` is set) it connects
//! back, plays episodes the driver requests and reports their scores until
//! the driver closes the connection. Launched by hand it plays `--episodes`
//! local episodes instead, sampling every choice itself.
//!
//! Examples:
//!   mc-agent --episodes 500 --seed 7
//!   MONSTERCARLO_EXPERIMENT_SETTINGS=weighted mc-agent --temperature 0.5 --json
//!
//! Logging follows `RUST_LOG` (default `info`).

use std::process;

use monstercarlo::chooser::{Chooser, LocalChooser};
use monstercarlo::config::{self, DriverConfig};
use monstercarlo::protocol::Step;
use monstercarlo::session::Session;
use monstercarlo::stats::OutcomeStats;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod game;

use game::{SelectionPolicy, TreasureRun};

const PROGRESS_EVERY: u64 = 100;
const DEFAULT_LAYOUT_SEED: u64 = 0x7EA5_0AE5;

#[derive(Debug, Clone)]
struct Args {
    episodes: u64,
    seed: u64,
    rounds: usize,
    temperature: f64,
    json: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            episodes: 100,
            seed: 1,
            rounds: 8,
            temperature: 1.0,
            json: false,
        }
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    mode: &'static str,
    episodes: u64,
    best_score: Option<i64>,
    best_path: Vec<Step>,
    mean_score: f64,
    recent_mean: f64,
}

fn usage() -> ! {
    eprintln!("mc-agent (plays driver-requested episodes, or local ones without a driver)");
    eprintln!("Usage: mc-agent [options]\n");
    eprintln!("Options:");
    eprintln!("  --episodes <n>        Local episodes to play without a driver (default 100)");
    eprintln!("  --seed <n>            Local sampling seed (default 1)");
    eprintln!("  --rounds <n>          Rounds per episode (default 8)");
    eprintln!("  --temperature <t>     Softmax temperature for the weighted variant (default 1.0)");
    eprintln!("  --json                Print a JSON summary on exit");
    eprintln!("\nEnvironment:");
    eprintln!("  {}, {}, {}", config::ENV_ADDR, config::ENV_PORT, config::ENV_NONCE);
    eprintln!("  {} (optional)", config::ENV_TIMEOUT_MS);
    eprintln!("  {}=uniform|weighted (optional)", config::ENV_EXPERIMENT_SETTINGS);
    process::exit(1);
}

fn parse_args() -> Args {
    let make_error = |msg: &str| -> ! {
        eprintln!("{}", msg);
        process::exit(1);
    };

    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(flag) = it.next() {
        let mut value = |name: &str| {
            it.next()
                .unwrap_or_else(|| make_error(&format!("{name} needs a value")))
        };
        match flag.as_str() {
            "--episodes" => {
                args.episodes = value("--episodes")
                    .parse()
                    .unwrap_or_else(|_| make_error("episodes must be a number"));
            }
            "--seed" => {
                args.seed = value("--seed")
                    .parse()
                    .unwrap_or_else(|_| make_error("seed must be a number"));
            }
            "--rounds" => {
                args.rounds = value("--rounds")
                    .parse()
                    .unwrap_or_else(|_| make_error("rounds must be a number"));
            }
            "--temperature" => {
                args.temperature = value("--temperature")
                    .parse()
                    .unwrap_or_else(|_| make_error("temperature must be a number"));
            }
            "--json" => args.json = true,
            "-h" | "--help" => usage(),
            other => make_error(&format!("unknown option {other} (try --help)")),
        }
    }
    args
}

/// Plays episodes until `budget` runs out or the chooser reports the run finished.
fn run_episodes<C: Chooser>(
    game: &TreasureRun,
    chooser: &mut C,
    budget: Option<u64>,
    stats: &mut OutcomeStats,
) -> Result<(), Box<dyn std::error::Error>> {
    while budget.map_or(true, |b| stats.episodes < b) {
        let outcome = match game.play_episode(chooser) {
            Ok(o) => o,
            Err(e) if e.is_episode_finished() => break,
            Err(e) => return Err(e.into()),
        };
        if stats.record(&outcome.path, outcome.score) {
            info!(
                "New best score {} after {} episodes ({} steps{})",
                outcome.score,
                stats.episodes,
                outcome.path.len(),
                if outcome.trapped { ", trapped" } else { "" }
            );
        }
        if stats.episodes % PROGRESS_EVERY == 0 {
            info!(
                "{} episodes: mean {:.2}, recent {:.2}",
                stats.episodes,
                stats.mean_score(),
                stats.recent_mean()
            );
        }
    }
    Ok(())
}

fn run(args: &Args) -> Result<Summary, Box<dyn std::error::Error>> {
    let mut stats = OutcomeStats::new();

    let mode = if config::is_driver_present() {
        let cfg = DriverConfig::from_env()?;
        let policy =
            SelectionPolicy::from_variant(cfg.experiment_settings.as_deref(), args.temperature)?;
        let game = TreasureRun::new(args.rounds, DEFAULT_LAYOUT_SEED, policy);
        info!("Driver present; policy {:?}", policy);

        let mut session = Session::connect_with(&cfg)?;
        run_episodes(&game, &mut session, None, &mut stats)?;
        info!("Driver finished after {} episodes", session.episodes_completed());
        "driver"
    } else {
        let policy =
            SelectionPolicy::from_variant(config::design_variant().as_deref(), args.temperature)?;
        let game = TreasureRun::new(args.rounds, DEFAULT_LAYOUT_SEED, policy);
        warn!(
            "No driver present; playing {} local episodes (seed {})",
            args.episodes, args.seed
        );

        let mut chooser = LocalChooser::new(args.seed);
        run_episodes(&game, &mut chooser, Some(args.episodes), &mut stats)?;
        "local"
    };

    Ok(Summary {
        mode,
        episodes: stats.episodes,
        best_score: stats.best_score,
        best_path: stats.best_path.clone(),
        mean_score: stats.mean_score(),
        recent_mean: stats.recent_mean(),
    })
}

fn main() {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();
    match run(&args) {
        Ok(summary) => {
            info!(
                "Done: {} episodes, best {:?}, mean {:.2}",
                summary.episodes, summary.best_score, summary.mean_score
            );
            if args.json {
                match serde_json::to_string(&summary) {
                    Ok(line) => println!("{line}"),
                    Err(e) => {
                        error!("Could not encode summary: {}", e);
                        process::exit(1);
                    }
                }
            }
        }
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}
