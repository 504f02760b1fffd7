//! lanequeue CLI - runs scheduler scenarios against the reference tick host.

use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use lanequeue_scheduler::{HostConfig, OwnerScope, SchedulerConfig};

mod scenario;

use scenario::{RunConfig, Scenario};

/// lanequeue CLI - lane scheduler playground
#[derive(Parser)]
#[command(name = "lanequeue")]
#[command(about = "Run lane scheduler scenarios on a tick host", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a built-in scenario
    Run {
        /// Scenario to run
        #[arg(value_enum)]
        scenario: Scenario,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Milliseconds between ticks
        #[arg(long, default_value_t = HostConfig::default().tick_interval_ms)]
        tick_ms: u64,

        /// Give up after this many ticks
        #[arg(long, default_value_t = HostConfig::default().max_ticks)]
        max_ticks: u64,

        /// Key lanes by module instance or by module type
        #[arg(long, default_value = "instance")]
        owner_scope: OwnerScope,

        /// Lane used when none is named
        #[arg(long, default_value = lanequeue_core::DEFAULT_LANE)]
        default_lane: String,
    },

    /// List built-in scenarios
    List,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run {
            scenario,
            json,
            tick_ms,
            max_ticks,
            owner_scope,
            default_lane,
        } => {
            let config = RunConfig {
                scheduler: SchedulerConfig {
                    default_lane,
                    owner_scope,
                },
                host: HostConfig {
                    max_ticks,
                    tick_interval_ms: tick_ms,
                },
            };
            let report = scenario::run(scenario, config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.render_text());
            }
        }
        Commands::List => {
            for scenario in Scenario::value_variants() {
                if let Some(value) = scenario.to_possible_value() {
                    println!("{:<8} {}", value.get_name(), scenario.describe());
                }
            }
        }
    }

    Ok(())
}
