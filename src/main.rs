use std::sync::Arc;

use tracing::{error, info};

use kiro_gateway::auth::KiroTokenProvider;
use kiro_gateway::modules::{logger, mapping_store::MappingStore, request_log::RequestLog, usage};
use kiro_gateway::proxy::dispatcher::build_http_client;
use kiro_gateway::proxy::server::{router, AppState};
use kiro_gateway::proxy::{AccountPool, Dispatcher, GatewayConfig, ModelMapper};

#[tokio::main]
async fn main() {
    logger::init_logger();

    let config = GatewayConfig::load();
    let data_dir = config.data_dir();
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        error!("Data directory {} is not usable: {}", data_dir.display(), e);
        std::process::exit(1);
    }
    check_data_directory_writable(&data_dir);

    let pool = match AccountPool::load(config.roster_path(), config.selection_strategy) {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to load account roster: {}", e);
            std::process::exit(1);
        }
    };

    // The rule table is authoritative when present; otherwise the built-in
    // substring fallback covers the common Claude families.
    let rules_path = config.mapping_rules_path();
    let mapper = if rules_path.exists() {
        match MappingStore::load(rules_path) {
            Ok(store) => {
                info!("Model mapping rules loaded");
                Arc::new(ModelMapper::with_store(Arc::new(store)))
            }
            Err(e) => {
                error!("Failed to load model mapping rules: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Arc::new(ModelMapper::new())
    };

    let request_log = match RequestLog::open(&config.request_log_path()) {
        Ok(log) => Some(Arc::new(log)),
        Err(e) => {
            error!("Failed to initialize request log database: {}", e);
            None
        }
    };

    let client = match build_http_client(config.proxy_url.as_deref()) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build upstream HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let tokens = Arc::new(KiroTokenProvider::new(
        Arc::clone(&pool),
        client.clone(),
        config.region.clone(),
    ));
    usage::spawn_usage_refresh(
        Arc::clone(&pool),
        tokens.clone(),
        client.clone(),
        config.region.clone(),
    );
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&pool),
        tokens,
        Arc::clone(&mapper),
        request_log,
        client,
        config.region.clone(),
        config.kiro_version.clone(),
    ));

    info!("--------------------------------------------------");
    info!("kiro-gateway starting");
    info!("Port: {}", config.port);
    info!("Region: {}", config.region);
    info!("Accounts: {}", pool.snapshot().len());
    info!("Selection: {:?}", config.selection_strategy);
    info!("--------------------------------------------------");

    let app = router(AppState { dispatcher, mapper });
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down");
        })
        .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}

fn check_data_directory_writable(data_dir: &std::path::Path) {
    let test_file = data_dir.join(".write_test");
    if let Err(e) = std::fs::write(&test_file, "test") {
        error!("Data directory is not writable: {}", e);
        error!("Directory: {}", data_dir.display());
        error!("Account state cannot be persisted. Check permissions and disk space.");
        std::process::exit(1);
    }
    let _ = std::fs::remove_file(&test_file);
}
