use clap::{Parser, Subcommand};
use mantle_shared::Agent;
use tracing::info;

use crate::config::{AppConfig, ThinkerMode};
use crate::coordinator::GoalState;

/// Built-in demonstration mission: one step per registered specialty.
const DEMO_GOAL: &str = "Research open-source autonomous agent frameworks; \
analyze the code of the most promising candidate; \
synthesize a report with pros and cons";

#[derive(Parser)]
#[command(
    name = "mantle_system",
    version = env!("CARGO_PKG_VERSION"),
    about = "Mantle — bid-based multi-agent orchestration kernel"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process one goal and print the synthesized report
    Run {
        /// Free-text goal to decompose and orchestrate
        goal: String,
        /// Override the no-bidder policy for this run (skip | abort)
        #[arg(long)]
        policy: Option<String>,
    },
    /// Run the built-in demonstration scenario (offline collaborators)
    Demo,
    /// List the registered agent pool
    Agents,
}

pub async fn dispatch(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run { goal, policy } => {
            let mut config = AppConfig::load()?;
            if let Some(policy) = policy {
                config.no_bid_policy = policy
                    .parse()
                    .map_err(|e| anyhow::anyhow!("Invalid --policy: {e}"))?;
            }
            run_goal(&config, &goal).await
        }
        Commands::Demo => {
            let mut config = AppConfig::load()?;
            // The demo is self-contained: offline thinker and search corpus.
            config.thinker_mode = ThinkerMode::Heuristic;
            config.search_endpoint = String::new();
            run_goal(&config, DEMO_GOAL).await
        }
        Commands::Agents => {
            let config = AppConfig::load()?;
            let system = crate::bootstrap(&config)?;
            for agent in system.registry.agents() {
                let d = agent.descriptor();
                println!("{:<22} {:<16} {}", d.id, d.capability, d.description);
            }
            system.shutdown();
            Ok(())
        }
    }
}

async fn run_goal(config: &AppConfig, goal: &str) -> anyhow::Result<()> {
    let system = crate::bootstrap(config)?;

    let report = match system.process_goal(goal).await {
        Ok(report) => report,
        Err(e) => {
            system.shutdown();
            return Err(anyhow::anyhow!(e).context("goal processing failed"));
        }
    };

    println!("{}", report.summary);
    if report.state == GoalState::Aborted {
        info!(goal_id = %report.goal_id, "goal aborted; see report markers above");
    }

    system.shutdown();
    Ok(())
}
