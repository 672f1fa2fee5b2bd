use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use firstboot::account::{NssAccountDatabase, Provisioner};
use firstboot::config::InitConfig;
use firstboot::flow::{FlowController, FlowParams, StageContext};
use firstboot::status::StatusStore;
use firstboot::system::{
    CommandRunner, ConsoleTerminal, HostSettings, SystemCommandRunner, SystemSettings,
};

/// First-boot onboarding for a fresh device.
#[derive(Parser)]
#[command(name = "firstboot", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the onboarding flow from the last persisted stage.
    Boot {
        /// Provision headlessly, skipping interactive and decorative stages.
        #[arg(long)]
        skip: bool,
        /// Username to provision in skip mode.
        #[arg(long, value_name = "NAME", requires = "skip")]
        user: Option<String>,
    },
    /// Print the persisted onboarding status as JSON.
    Status,
    /// Delete all onboarding accounts and forget the flow's progress.
    Reset,
    /// Delete one account and its home directory.
    DeleteUser { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = InitConfig::from_env().context("Invalid firstboot configuration")?;
    let _log_guard = init_tracing(&config);

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner::new());
    let settings: Arc<dyn SystemSettings> = Arc::new(HostSettings::new(runner.clone(), &config));
    let provisioner = Arc::new(Provisioner::new(
        Arc::new(NssAccountDatabase::new()),
        runner.clone(),
        settings.clone(),
        &config,
    ));
    let store = StatusStore::new(&config.status_path);

    match cli.command.unwrap_or(Command::Boot {
        skip: false,
        user: None,
    }) {
        Command::Boot { skip, user } => {
            let params = if skip {
                FlowParams::headless(user)
            } else {
                FlowParams::interactive()
            };
            let ctx = StageContext {
                provisioner,
                settings,
                runner,
                terminal: Arc::new(ConsoleTerminal::new(config.typewriter_delay)),
                config,
            };
            let mut controller = FlowController::load(store, ctx).await;
            controller.run(&params).await.with_context(|| {
                format!(
                    "Onboarding stopped at stage {}",
                    controller.current_stage()
                )
            })?;
        }
        Command::Status => {
            let status = store.load().await;
            println!(
                "{}",
                serde_json::to_string_pretty(&status).context("Failed to render status")?
            );
        }
        Command::Reset => {
            let deleted = provisioner
                .delete_all_users()
                .await
                .context("Failed to delete onboarding accounts")?;
            store
                .clear()
                .await
                .with_context(|| format!("Failed to remove {}", store.path().display()))?;
            tracing::info!(?deleted, "Onboarding reset");
            eprintln!("Reset complete, deleted {} account(s)", deleted.len());
        }
        Command::DeleteUser { name } => {
            provisioner
                .delete_user(&name)
                .await
                .with_context(|| format!("Failed to delete user {name}"))?;
            eprintln!("Deleted user {name}");
        }
    }

    Ok(())
}

/// Log to a file in the configured log directory, since the terminal belongs
/// to the flow. Falls back to stderr when the directory is unusable.
fn init_tracing(config: &InitConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match std::fs::create_dir_all(&config.log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::never(&config.log_dir, "firstboot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .init();
            Some(guard)
        }
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
            tracing::warn!(dir = %config.log_dir.display(), error = %e, "Cannot create log directory, logging to stderr");
            None
        }
    }
}
