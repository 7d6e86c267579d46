use clap::Parser;
use crabe_arena::{
    config::MatchConfig,
    slot::{SlotId, SlotOptions, StrategySlot},
    strategies::{builtin, BUILTIN_NAMES},
    telemetry::TracingTelemetry,
    world::{FieldState, RobotId, TeamColor},
};
use std::{error::Error, sync::Arc};
use tracing_subscriber::EnvFilter;

/// Loads one built-in strategy and calls it once on the kickoff field.
#[derive(Parser, Debug)]
struct Args {
    strategy: String,

    /// robot number on the blue team to play from
    #[arg(long, default_value_t = 1)]
    robot: u8,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();
    let config = MatchConfig::default();

    let source = builtin(&args.strategy).ok_or_else(|| {
        format!(
            "unknown strategy `{}`, available: {}",
            args.strategy,
            BUILTIN_NAMES.join(", ")
        )
    })?;
    let options = SlotOptions {
        load_timeout: config.load_timeout(),
        telemetry: Some(Arc::new(TracingTelemetry)),
    };
    let mut slot = StrategySlot::load(SlotId(0), source, options).await?;
    slot.warm();

    let snapshot = FieldState::kickoff().snapshot(RobotId::new(TeamColor::Blue, args.robot))?;
    match slot.invoke(&snapshot, config.slot_deadline()).await {
        Ok(command) => println!("{}", serde_json::to_string_pretty(&command)?),
        Err(e) => eprintln!("{} ({}): {}", slot.team_name(), slot.id(), e),
    }
    slot.unload();
    Ok(())
}
