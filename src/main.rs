#![allow(clippy::result_large_err)]

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use snap_build_charm::config::{self, database};
use snap_build_charm::core::command::SystemRunner;
use snap_build_charm::core::context::{HookContext, load_event};
use snap_build_charm::core::dispatch::{self, Hook};
use snap_build_charm::core::hooks::HookEnv;
use snap_build_charm::core::layout::Layout;
use snap_build_charm::core::migrate::PostgresGranter;
use snap_build_charm::core::states;
use snap_build_charm::core::templates::Templates;
use snap_build_charm::errors::Result;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Deployment hooks for the snap-build web service.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Hook context describing the current event
    #[arg(long, env = "HOOK_CONTEXT", default_value = "hook-context.toml")]
    context: PathBuf,

    /// Settings file (defaults to ./settings.toml when present)
    #[arg(long, env = "SNAP_BUILD_SETTINGS")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Install the bundled Node.js package or queue the archive packages
    InstallRuntime,
    /// Run database migrations (leader only, once)
    Migrate,
    /// Render and enable the service unit
    Configure,
    /// Install archive packages queued by an earlier run
    InstallQueued,
    /// Install queued packages, then run every handler whose trigger holds
    Dispatch,
    /// List the unit's persisted states
    States,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; variables may also be set by the orchestrator
    dotenv().ok();

    let cli = Cli::parse();

    // 3. Settings and the unit state database
    let settings = config::load_app_settings(cli.settings.as_deref())
        .inspect_err(|e| error!("Failed to load settings: {}", e))?;
    let db = database::create_connection(&settings.database_url)
        .await
        .inspect_err(|e| error!("Failed to open unit state database: {}", e))?;

    let local_states = states::load_local_states(&db).await?;

    let hook = match cli.command {
        Command::States => {
            for state in &local_states {
                match &state.value {
                    Some(value) => println!("{}\t{}", state.name, value),
                    None => println!("{}", state.name),
                }
            }
            return Ok(());
        }
        Command::InstallRuntime => Some(Hook::InstallRuntime),
        Command::Migrate => Some(Hook::Migrate),
        Command::Configure => Some(Hook::Configure),
        Command::InstallQueued | Command::Dispatch => None,
    };

    // 4. Build the hook context for this event
    let event = load_event(&cli.context)
        .inspect_err(|e| error!("Failed to load hook context: {}", e))?;
    let mut ctx = HookContext::new(event, local_states.into_iter().map(|state| state.name));

    let layout = Layout::from_settings(&settings);
    let templates = Templates::new()?;
    let env = HookEnv {
        runner: &SystemRunner,
        granter: &PostgresGranter,
        templates: &templates,
        layout: &layout,
    };

    // 5. Run the requested handler, or every handler whose trigger holds
    match hook {
        Some(hook) => {
            let outcome = dispatch::run_hook(hook, &mut ctx, &env, &db)
                .await
                .inspect_err(|e| error!(%hook, "Handler failed: {}", e))?;
            info!(%hook, disposition = ?outcome.disposition, "Handler finished");
        }
        None if matches!(cli.command, Command::InstallQueued) => {
            dispatch::install_queued(&mut ctx, &env, &db)
                .await
                .inspect_err(|e| error!("Installing queued packages failed: {}", e))?;
        }
        None => {
            let ran = dispatch::dispatch(&mut ctx, &env, &db)
                .await
                .inspect_err(|e| error!("Dispatch failed: {}", e))?;
            for (hook, disposition) in ran {
                info!(%hook, ?disposition, "Handler finished");
            }
        }
    }

    Ok(())
}
