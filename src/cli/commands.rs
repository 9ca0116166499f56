//! Command handlers for the tunegate CLI
//!
//! Each handler receives its parsed arguments and the effective configuration and
//! drives the library components directly.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::app::janitor::{
    create_shutdown_channel, sweep_artifacts, wait_for_shutdown_signal, JanitorScheduler,
    SignalHandler, SweepTargets, TopChartPublisher,
};
use crate::app::{DownloadStore, QuotaCoordinator, SqliteStore, StorageConfig, UserId};
use crate::cli::{ConfigAction, ConfigArgs, PublishArgs, QuotaAction, QuotaArgs, ServeArgs, SweepArgs};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};

/// Handle the serve command
///
/// Runs the janitor until a termination signal arrives, then stops its tasks within
/// the configured grace period.
pub async fn handle_serve(args: ServeArgs, config: &AppConfig) -> Result<()> {
    let runtime = config.to_runtime_config();
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let signal_task = SignalHandler::new(shutdown_tx.clone()).setup();

    let mut janitor = JanitorScheduler::with_shutdown(runtime.janitor.clone(), shutdown_tx);
    janitor.start_temp_sweep(SweepTargets::default());

    if args.no_publish {
        info!("Chart publishing disabled");
    } else {
        let store = open_store(&runtime.storage).await?;
        let publisher = TopChartPublisher::new(store, runtime.janitor.publish_dir.clone());
        janitor.start_publisher(Arc::new(publisher));
    }

    info!(
        "Serving: sweeping {} every {:?}, publishing at {:02}:00",
        runtime.janitor.artifact_dir.display(),
        runtime.janitor.sweep_interval,
        runtime.janitor.publish_hour
    );

    wait_for_shutdown_signal(shutdown_rx).await;
    signal_task.abort();

    let aborted = janitor.shutdown(runtime.janitor.shutdown_grace).await;
    if aborted > 0 {
        warn!("{} janitor tasks had to be aborted", aborted);
    }
    Ok(())
}

/// Handle the sweep command
pub async fn handle_sweep(args: SweepArgs, config: &AppConfig) -> Result<()> {
    let runtime = config.to_runtime_config();
    let dir = args.dir.unwrap_or(runtime.janitor.artifact_dir);
    let max_age = args
        .max_age_secs
        .map(Duration::from_secs)
        .unwrap_or(runtime.janitor.artifact_max_age);

    debug!("Sweeping {} for files older than {:?}", dir.display(), max_age);
    let report = sweep_artifacts(&dir, max_age).await?;

    println!(
        "🧹 Removed {} of {} files in {}",
        report.removed,
        report.scanned,
        dir.display()
    );
    if report.failed > 0 {
        println!("   {} stale files could not be removed", report.failed);
    }
    Ok(())
}

/// Handle the publish command
pub async fn handle_publish(args: PublishArgs, config: &AppConfig) -> Result<()> {
    let runtime = config.to_runtime_config();
    let store = open_store(&runtime.storage).await?;
    let publisher = TopChartPublisher::new(store, runtime.janitor.publish_dir)
        .with_chart_size(args.size);

    match publisher.publish_snapshot(args.period.into()).await? {
        Some(path) => println!("📈 Chart written to {}", path.display()),
        None => println!("No downloads recorded for that period, nothing published"),
    }
    Ok(())
}

/// Handle the quota command
pub async fn handle_quota(args: QuotaArgs, config: &AppConfig) -> Result<()> {
    let runtime = config.to_runtime_config();
    let store = open_store(&runtime.storage).await?;
    let quota = QuotaCoordinator::new(store.clone(), runtime.context.quota);

    match args.action {
        QuotaAction::Check { user_id } => show_quota(&quota, user_id).await,
        QuotaAction::GrantBonus { user_id, count } => {
            let balance = store.add_bonus_credits(user_id, count).await?;
            info!("Granted {} bonus downloads to user {}", count, user_id);
            println!("User {} now has {} bonus downloads", user_id, balance);
            Ok(())
        }
        QuotaAction::SetPremium {
            user_id,
            until,
            days,
            revoke,
        } => {
            let until = if revoke {
                Some(Utc::now())
            } else if let Some(days) = days {
                Some(Utc::now() + chrono::Duration::days(i64::from(days)))
            } else {
                until
            };

            store.set_premium(user_id, until).await?;
            match (revoke, until) {
                (true, _) => println!("Premium revoked for user {}", user_id),
                (false, Some(until)) => {
                    println!("User {} is premium until {}", user_id, until.to_rfc3339())
                }
                (false, None) => println!("User {} has lifetime premium", user_id),
            }
            Ok(())
        }
    }
}

async fn show_quota(quota: &QuotaCoordinator, user_id: UserId) -> Result<()> {
    let state = quota.snapshot(user_id).await?;
    let eligibility = quota.check_eligibility(user_id).await?;

    println!("User {}", user_id);
    if eligibility.is_unlimited() {
        match state.premium_until {
            Some(until) => println!("  Premium until {}", until.to_rfc3339()),
            None => println!("  Lifetime premium"),
        }
    } else {
        println!(
            "  Free downloads today: {}/{}",
            state.daily_count,
            quota.config().daily_limit
        );
    }
    println!("  Bonus downloads: {}", state.bonus_credits);
    match eligibility.path {
        Some(path) => println!("  Next download uses the {} allowance", path),
        None => println!("  ⚠️  No downloads left today"),
    }
    Ok(())
}

/// Handle the config command
pub async fn handle_config(args: ConfigArgs, config: &AppConfig) -> Result<()> {
    match args.action {
        ConfigAction::Init { path, force } => {
            let path = match path {
                Some(path) => path,
                None => AppConfig::get_default_config_path()
                    .ok_or_else(|| AppError::generic("Could not determine user config directory"))?,
            };

            if path.exists() && !force {
                return Err(AppError::generic(format!(
                    "{} already exists, use --force to overwrite",
                    path.display()
                )));
            }

            AppConfig::write_default_config(&path).await?;
            println!("📁 Wrote default configuration to {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn open_store(storage: &StorageConfig) -> Result<Arc<dyn DownloadStore>> {
    let store: Arc<dyn DownloadStore> =
        Arc::new(SqliteStore::open(&storage.database_path).await?);
    Ok(store)
}
