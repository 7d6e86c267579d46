use clap::Parser;
use crabe_arena::{
    config::MatchConfig,
    launch_match,
    scheduler::Scheduler,
    sinks::log_sink::LogSink,
    strategies::{builtin, BUILTIN_NAMES},
    telemetry::TracingTelemetry,
    world::FieldState,
};
use std::{error::Error, path::PathBuf, sync::Arc};
use tokio::select;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Runs a match between built-in strategies on a static kickoff field, logging
/// every command instead of driving robots.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON match config, flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// strategy per robot, in order: blue 1, blue 2, yellow 1, yellow 2
    #[arg(
        long = "team",
        default_values = ["go_to_center", "go_to_center", "ball_chaser", "logging_chaser"]
    )]
    teams: Vec<String>,

    /// stop after this many ticks
    #[arg(long)]
    ticks: Option<u64>,

    #[arg(long)]
    period_ms: Option<u64>,

    #[arg(long)]
    deadline_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("crabe_arena=info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => MatchConfig::from_file(path)?,
        None => MatchConfig::default(),
    };
    if let Some(ticks) = args.ticks {
        config.max_ticks = Some(ticks);
    }
    if let Some(period_ms) = args.period_ms {
        config.tick_period_ms = period_ms;
    }
    if let Some(deadline_ms) = args.deadline_ms {
        config.slot_deadline_ms = deadline_ms;
    }
    config.validate()?;

    let field = FieldState::kickoff();
    let robots = field.robots();
    if args.teams.len() > robots.len() {
        warn!(
            "{} strategies given for {} robots, extra ones are ignored",
            args.teams.len(),
            robots.len()
        );
    }

    let mut scheduler = Scheduler::new(&config).with_telemetry(Arc::new(TracingTelemetry));
    for (name, robot) in args.teams.iter().zip(robots) {
        let Some(source) = builtin(name) else {
            return Err(format!(
                "unknown strategy `{}`, available: {}",
                name,
                BUILTIN_NAMES.join(", ")
            )
            .into());
        };
        if let Err(e) = scheduler.register(source, robot).await {
            warn!("{}", e);
        }
    }
    scheduler.warm_all();

    let (stop, mut handle) = launch_match(scheduler, field, LogSink::new(), &config);
    let ticks = select! {
        played = &mut handle => played??,
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, stopping the match");
            let _ = stop.send(());
            handle.await??
        }
    };
    info!(ticks, "match over");
    Ok(())
}
