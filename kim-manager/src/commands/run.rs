use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kim_authz::{AuthzModel, EngineConfig, PolicyEngine};
use kim_controller::{Context, ControllerConfig};
use kim_core::{init_tracing, KimConfig, TelemetryConfig};
use kim_oidc::{SigningKey, Storage, StorageConfig};
use kim_store::Store;
use tokio_util::sync::CancellationToken;

use super::{load_store, CommandResult};

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

pub struct RunOptions {
    pub config_dir: PathBuf,
    pub profile: String,
    pub manifests: Option<PathBuf>,
}

/// Run the controllers until Ctrl-C.
pub async fn run(options: RunOptions) -> CommandResult {
    let config = KimConfig::load_from(&options.config_dir, &options.profile)?;
    let _guard = init_tracing(&config.section::<TelemetryConfig>()?);
    let controller_config: ControllerConfig = config.section()?;
    let engine_config: EngineConfig = config.section()?;
    let storage_config: StorageConfig = config.section()?;

    let store = match &options.manifests {
        Some(path) => load_store(path)?,
        None => Store::new(),
    };
    let model = Arc::new(AuthzModel::new());
    let ctx = Arc::new(Context::from_store(&store, model.clone()));
    let engine = PolicyEngine::from_config(model, &engine_config);
    let key = Arc::new(SigningKey::generate(&storage_config.signing_key_id)?);
    let storage = Arc::new(Storage::from_store(storage_config, &store, engine, key)?);

    let shutdown = CancellationToken::new();
    let controllers = tokio::spawn(kim_controller::run(
        ctx,
        controller_config,
        shutdown.clone(),
    ));
    let purger = tokio::spawn(purge_expired(storage.clone(), shutdown.clone()));

    tracing::info!(
        profile = config.profile(),
        issuer = %storage.config().issuer,
        clients = storage.clients().len(),
        "kim manager started"
    );
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    shutdown.cancel();

    let (controllers, purger) = tokio::join!(controllers, purger);
    controllers?;
    purger?;
    tracing::info!("kim manager stopped");
    Ok(())
}

async fn purge_expired(storage: Arc<Storage>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(PURGE_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                storage.purge_expired();
            }
        }
    }
}
