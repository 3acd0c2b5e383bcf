use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use camino::Utf8PathBuf;
use chrono::Utc;
use clap::{Parser, Subcommand};
use studysync_app_core::{AutoSync, AutoSyncConfig, ConfigStore, SyncEvents, TracingNotifier};
use studysync_cli::{commands, local_store, Connection, ConnectionArgs};
use studysync_core::{PlanOptions, SyncResult};
use studysync_pipeline::{SyncEngine, SyncOptions};
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(author, version, about = "Sync study records, plans and notes with the cloud")]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,
    #[arg(long, global = true, env = "STUDYSYNC_ENDPOINT")]
    endpoint: Option<String>,
    #[arg(long, global = true, env = "STUDYSYNC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long, global = true, env = "STUDYSYNC_TOKEN", hide_env_values = true)]
    token: Option<String>,
    #[arg(long, global = true, env = "STUDYSYNC_USER")]
    user: Option<String>,
    #[arg(long, global = true, env = "STUDYSYNC_LOCAL", help = "Local data file (JSON)")]
    local: Option<Utf8PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload local data, skipping anything already in the cloud
    Upload {
        #[arg(long, help = "Push edits to items that are already in the cloud")]
        update_changed: bool,
    },
    /// Download cloud data into the local file
    Download {
        #[arg(short, long, help = "Write the cloud snapshot here instead of merging")]
        output: Option<Utf8PathBuf>,
    },
    /// Upload, then download
    Sync {
        #[arg(long, help = "Push edits to items that are already in the cloud")]
        update_changed: bool,
    },
    /// Show counts and the most recent cloud items
    Overview,
    /// Delete all cloud data for the user
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// Upload automatically whenever the local file changes
    Watch {
        #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: u64,
    },
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    Show,
    /// Keys: endpoint, api-key, user, local, auto-sync, debounce-secs
    Set { key: String, value: String },
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    token
}

fn finish(result: &SyncResult, store: &ConfigStore) -> Result<()> {
    if !result.success {
        bail!("{}", result.message);
    }
    let mut config = store.load()?;
    config.last_sync = Some(Utc::now());
    store.save(&config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let store = ConfigStore::from_project_dirs()?;
    let config = store.load()?;
    let args = ConnectionArgs {
        endpoint: cli.endpoint,
        api_key: cli.api_key,
        token: cli.token,
        user: cli.user,
    };
    let engine = |update_changed: bool| -> Result<SyncEngine> {
        let remote = Connection::resolve(&args, &config)?.remote()?;
        let options = SyncOptions {
            plan: PlanOptions { update_changed },
            ..SyncOptions::default()
        };
        Ok(SyncEngine::with_options(Arc::new(remote), options))
    };

    match cli.command {
        Commands::Upload { update_changed } => {
            let local = local_store(cli.local, &config)?;
            let cancel = cancel_on_ctrl_c();
            let result =
                commands::cmd_upload(&engine(update_changed)?, &local, Some(&cancel)).await?;
            finish(&result, &store)?;
        }
        Commands::Download { output } => {
            let local = local_store(cli.local, &config)?;
            let result = commands::cmd_download(&engine(false)?, &local, output.as_deref()).await?;
            if !result.success {
                bail!("{}", result.message);
            }
        }
        Commands::Sync { update_changed } => {
            let local = local_store(cli.local, &config)?;
            let cancel = cancel_on_ctrl_c();
            let result =
                commands::cmd_sync(&engine(update_changed)?, &local, Some(&cancel)).await?;
            finish(&result, &store)?;
        }
        Commands::Overview => {
            commands::cmd_overview(&engine(false)?).await?;
        }
        Commands::Clear { yes } => {
            let result = commands::cmd_clear(&engine(false)?, yes).await?;
            if !result.success {
                bail!("{}", result.message);
            }
        }
        Commands::Watch { interval_ms } => {
            let local = local_store(cli.local, &config)?;
            let path = local.path().to_owned();
            let auto = AutoSync::with_parts(
                engine(false)?,
                Arc::new(local),
                AutoSyncConfig {
                    enabled: config.auto_sync,
                    debounce: config.debounce(),
                },
                Arc::new(TracingNotifier),
                Arc::new(SyncEvents::new()),
            );
            let stop = cancel_on_ctrl_c();
            commands::cmd_watch(&auto, &path, Duration::from_millis(interval_ms), &stop).await?;
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                commands::cmd_config_show(&store)?;
            }
            ConfigCommands::Set { key, value } => {
                commands::cmd_config_set(&store, &key, &value)?;
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_rejects_a_zero_interval() {
        assert!(Cli::try_parse_from(["studysync", "watch", "--interval-ms", "0"]).is_err());
        let cli = Cli::try_parse_from(["studysync", "watch", "--interval-ms", "250"]).unwrap();
        assert!(matches!(cli.command, Commands::Watch { interval_ms: 250 }));
    }

    #[test]
    fn update_changed_is_opt_in() {
        let cli = Cli::try_parse_from(["studysync", "sync"]).unwrap();
        assert!(matches!(cli.command, Commands::Sync { update_changed: false }));
        let cli = Cli::try_parse_from(["studysync", "upload", "--update-changed"]).unwrap();
        assert!(matches!(cli.command, Commands::Upload { update_changed: true }));
    }
}
