//! Resonance Simulator CLI
//!
//! Runs the deterministic scenarios on a virtual clock, or (with `--live`)
//! the real tokio driver against the wall clock.

use clap::Parser;
use resonance_core::{EngineConfig, EngineRuntime, KpiUpdated, Speed, TickerUpdated};
use resonance_env::{ResonanceContext, TokioContext};
use resonance_sim::scenarios::ScenarioId;
use resonance_sim::{ScenarioResult, ScenarioRunner, SimError};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Resonance activity-engine simulator
#[derive(Parser, Debug)]
#[command(name = "resonance-sim")]
#[command(about = "Run deterministic scenarios for the Resonance activity engine", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (kpi_tick, single_wave, spike, speed_change, soak, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Simulated duration in seconds for duration-driven scenarios
    #[arg(short, long, default_value = "60")]
    duration: f64,

    /// Starting speed (slow, normal, fast, hype)
    #[arg(long, default_value = "normal")]
    speed: Speed,

    /// Engine configuration JSON (partial documents allowed)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export per-second frames of a single scenario to a JSON file
    #[arg(long)]
    export: Option<String>,

    /// Run the live engine on the wall clock for this many seconds
    #[arg(long)]
    live: Option<u64>,
}

fn main() {
    let args = Args::parse();

    // Initialize logging (RUST_LOG directives refine the default level)
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Warning: a tracing subscriber was already installed");
    }

    match run(args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    }
}

/// Returns whether every scenario run passed.
fn run(args: Args) -> Result<bool, SimError> {
    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            EngineConfig::from_json_file(path)?
        }
        None => EngineConfig::default(),
    };

    if let Some(secs) = args.live {
        return run_live(config, &args, secs).map(|_| true);
    }

    if !args.json {
        info!("Resonance Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        let id: ScenarioId = args.scenario.parse().map_err(|e| {
            SimError::Usage(format!(
                "{e} (available: kpi_tick, single_wave, spike, speed_change, soak, all)"
            ))
        })?;
        vec![id]
    };

    // Determine base seed
    let base_seed = if args.seed == 0 {
        TokioContext::new().wall_clock_seed()
    } else {
        args.seed
    };

    // Handle --export mode
    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            return Err(SimError::Usage("--export only supports a single scenario, not 'all'".to_string()));
        }
        let runner = ScenarioRunner::new(base_seed)
            .with_duration(args.duration)
            .with_speed(args.speed)
            .with_config(config);
        let (result, export) = runner.run_with_export(scenarios[0]);
        export.write_to_file(export_path)?;
        info!("Exported {} frames to {}", export.frames.len(), export_path);
        report(&result, args.json);
        return Ok(result.passed);
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed)
            .with_duration(args.duration)
            .with_speed(args.speed)
            .with_config(config.clone());

        for scenario in &scenarios {
            let result = runner.run(*scenario);
            if !args.json {
                report(&result, false);
            }
            all_results.push(result);
        }
    }

    let total = all_results.len();
    let failed: Vec<&ScenarioResult> = all_results.iter().filter(|r| !r.passed).collect();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed.len(),
            "failed": failed.len(),
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "time_secs": r.final_time_secs,
                    "waves": r.metrics.waves_created,
                    "resonated": r.metrics.waves_resonated,
                    "rewards": r.metrics.final_rewards,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to render summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed.is_empty() {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed.len(), total);
            for result in &failed {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    Ok(failed.is_empty())
}

fn report(result: &ScenarioResult, json: bool) {
    if json {
        return;
    }
    if result.passed {
        info!("✓ {} (seed={}) PASSED", result.scenario.name(), result.seed);
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario.name(),
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}

/// Runs the tokio driver on the wall clock, logging KPI and ticker updates.
fn run_live(mut config: EngineConfig, args: &Args, secs: u64) -> Result<(), SimError> {
    if args.seed != 0 {
        config.seed = Some(args.seed);
    }
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let ctx = TokioContext::shared();
        let handle = EngineRuntime::spawn(ctx, config);
        let (_kpi_sub, mut kpis) = handle.subscribe::<KpiUpdated>().await?;
        let (_ticker_sub, mut ticker) = handle.subscribe::<TickerUpdated>().await?;

        handle.set_speed(args.speed).await?;
        handle.start().await?;
        info!("Live engine running for {}s at {} speed", secs, args.speed);

        let deadline = tokio::time::sleep(Duration::from_secs(secs));
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                Some(kpi) = kpis.recv() => {
                    info!(
                        "KPI waves={:.1} users={:.0} rewards={:.3} health={:.1}",
                        kpi.total_waves, kpi.active_users, kpi.rewards_streamed, kpi.network_health
                    );
                }
                Some(lines) = ticker.recv() => {
                    if let Some(line) = lines.first() {
                        info!("» {}", line);
                    }
                }
                _ = &mut deadline => break,
            }
        }

        let stats = handle.stats().await?;
        handle.stop().await?;
        handle.dispose().await;
        info!(
            "Live run done: {} waves, {} resonated, {} retries",
            stats.waves_created, stats.waves_resonated, stats.retries
        );
        Ok::<(), SimError>(())
    })
}
