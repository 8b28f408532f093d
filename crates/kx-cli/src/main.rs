//! Operator CLI: database migration/status, risk kill-switch toggle, and
//! manual strategy-evaluation trigger.
//!
//! Thin by design: every subcommand loads what it needs (a `PgPool`, and
//! for `strategy-trigger` a full `kx-runtime::Runtime`) and delegates to
//! the same crates the daemon wires together, so CLI and daemon never
//! drift apart on semantics.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kx_config::ConfigMode;
use kx_runtime::{Runtime, RuntimeConfig};
use kx_schemas::Id;
use kx_strategy::{EvalTarget, StrategyParams, StrategySpec};

#[derive(Parser)]
#[command(name = "kx")]
#[command(about = "kx trading engine operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands.
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute a layered config hash and print the canonical JSON.
    ConfigHash {
        /// Paths in merge order (base -> env -> risk -> ...).
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Toggle the risk kill-switch (global, or scoped to one account).
    KillSwitch {
        #[command(subcommand)]
        cmd: KillSwitchCmd,
    },

    /// Manually trigger one strategy evaluation out of the scheduler's cadence.
    StrategyTrigger {
        #[arg(long)]
        strategy_id: String,
        #[arg(long)]
        strategy_version_id: String,
        #[arg(long)]
        engine_type: String,
        #[arg(long)]
        timeframe_secs: i64,
        #[arg(long)]
        account_id: String,
        #[arg(long)]
        symbol: String,
        /// Strategy params as repeated key=value pairs.
        #[arg(long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
        /// Run mode, used to resolve broker credentials (kx-config secrets).
        #[arg(long, default_value = "paper")]
        mode: String,
        /// Layered config paths used to resolve broker app key/secret names.
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    Migrate,
}

#[derive(Subcommand)]
enum KillSwitchCmd {
    On {
        #[arg(long)]
        reason: String,
        #[arg(long)]
        account_id: Option<String>,
    },
    Off {
        #[arg(long)]
        reason: String,
        #[arg(long)]
        account_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = kx_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = kx_db::status(&pool).await?;
                    println!("db_ok={} has_orders_table={}", s.ok, s.has_orders_table);
                }
                DbCmd::Migrate => {
                    kx_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = kx_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::KillSwitch { cmd } => {
            let pool = kx_db::connect_from_env().await?;
            let (on, reason, account_id) = match cmd {
                KillSwitchCmd::On { reason, account_id } => (true, reason, account_id),
                KillSwitchCmd::Off { reason, account_id } => (false, reason, account_id),
            };

            let state = kx_runtime::toggle_kill_switch_and_emit(
                &pool,
                account_id.as_deref(),
                on,
                reason.clone(),
                chrono::Utc::now(),
            )
            .await?;

            println!("kill_switch={:?}", state.kill_switch);
            println!("account_id={}", account_id.as_deref().unwrap_or("<global>"));
            println!("version={}", state.version);
        }

        Commands::StrategyTrigger {
            strategy_id,
            strategy_version_id,
            engine_type,
            timeframe_secs,
            account_id,
            symbol,
            params,
            mode,
            config_paths,
        } => {
            let pool = kx_db::connect_from_env().await?;
            let cfg_mode = parse_config_mode(&mode)?;
            let (app_key, app_secret) = resolve_broker_secrets(&config_paths, cfg_mode)?;

            let runtime = Runtime::new(pool, RuntimeConfig::default(), app_key, app_secret);

            let mut values = BTreeMap::new();
            for (k, v) in params {
                values.insert(k, v);
            }

            let target = EvalTarget {
                spec: StrategySpec {
                    strategy_id: Id::from_stored(strategy_id),
                    strategy_version_id: Id::from_stored(strategy_version_id),
                    engine_type,
                    timeframe_secs,
                    params: StrategyParams::new(values),
                },
                account_id,
                symbol,
            };

            match runtime.trigger_strategy(&target).await {
                Ok(Some(signal)) => {
                    println!("signal_type={:?}", signal.signal_type);
                    println!("signal_id={}", signal.signal_id);
                    println!("reason={}", signal.reason);
                }
                Ok(None) => println!("no signal produced (hold, cooldown, or dedup)"),
                Err(err) => anyhow::bail!("strategy trigger failed: {err}"),
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn parse_config_mode(mode: &str) -> Result<ConfigMode> {
    match mode.trim().to_uppercase().as_str() {
        "PAPER" => Ok(ConfigMode::Paper),
        "LIVE" => Ok(ConfigMode::Live),
        other => anyhow::bail!("invalid --mode '{other}'. expected one of: PAPER | LIVE"),
    }
}

fn resolve_broker_secrets(config_paths: &[String], mode: ConfigMode) -> Result<(String, String)> {
    let config_json = if config_paths.is_empty() {
        serde_json::json!({})
    } else {
        let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
        kx_config::load_layered_yaml(&path_refs)?.config_json
    };

    let secrets = kx_config::resolve_secrets_for_mode(&config_json, mode)?;
    let app_key = secrets.broker_app_key.context("missing broker app key for run mode")?;
    let app_secret = secrets
        .broker_app_secret
        .context("missing broker app secret for run mode")?;
    Ok((app_key, app_secret))
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) => Ok((k.to_string(), v.to_string())),
        None => Err(format!("invalid --param '{s}', expected key=value")),
    }
}
