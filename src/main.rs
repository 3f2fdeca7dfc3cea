use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use http::HeaderValue;
use tokio::signal;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use tracing::{error, info, warn};

use curtain_quotes_api as api;
use api::{
    clock::SystemClock,
    kv_store::{FileKeyValueStore, InMemoryKeyValueStore, KeyValueStore},
    middleware_helpers::admin_key::AdminKey,
    repositories::{EmailLogStore, OrderStore, SeaOrmEmailLogStore, SeaOrmOrderStore},
    services::email::{DisabledEmailDispatcher, EmailDispatcher, HttpEmailDispatcher},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);
    let order_store: Arc<dyn OrderStore> = Arc::new(SeaOrmOrderStore::new(db_arc.clone()));
    let email_log: Arc<dyn EmailLogStore> = Arc::new(SeaOrmEmailLogStore::new(db_arc.clone()));

    // Client state: throttle timestamps, email templates and styles
    let client_state: Arc<dyn KeyValueStore> = match cfg.client_state_dir.as_deref() {
        Some(dir) => {
            let store = FileKeyValueStore::open(dir)
                .await
                .with_context(|| format!("failed to open client state directory {dir}"))?;
            info!("Client state persisted under {}", dir);
            Arc::new(store)
        }
        None => {
            warn!("APP__CLIENT_STATE_DIR not set; template edits and throttle state live in memory");
            Arc::new(InMemoryKeyValueStore::new())
        }
    };

    let dispatcher: Arc<dyn EmailDispatcher> = match cfg.email.endpoint_url.as_deref() {
        Some(endpoint) if cfg.email.is_enabled() => {
            info!("Email delivery enabled via {}", endpoint);
            Arc::new(
                HttpEmailDispatcher::new(endpoint.trim(), cfg.email.timeout())
                    .context("failed to build email client")?,
            )
        }
        _ => {
            info!("Email endpoint not configured; outbound email disabled");
            Arc::new(DisabledEmailDispatcher)
        }
    };

    // Aggregate app services used by HTTP handlers
    let services = api::handlers::AppServices::new(
        &cfg,
        order_store.clone(),
        email_log,
        client_state,
        dispatcher,
        Arc::new(SystemClock),
    );

    let admin_key = AdminKey::new(cfg.admin_api_key.clone());
    if !admin_key.is_enabled() {
        if cfg.is_development() {
            warn!("No admin key configured; backoffice routes are open");
        } else {
            error!("Missing admin key outside development; set APP__ADMIN_API_KEY");
            return Err("Missing admin key: set APP__ADMIN_API_KEY".into());
        }
    }

    // Compose shared app state
    let app_state = api::AppState {
        config: Arc::new(cfg.clone()),
        services,
        order_store,
        admin_key,
    };

    // Build CORS layer from config
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    let cors_layer = if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.should_allow_permissive_cors() {
        info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        CorsLayer::permissive()
    } else {
        error!("Missing CORS configuration detected; set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true");
        return Err("Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true".into());
    };

    let app = api::build_router(app_state)
        // HTTP tracing layer for consistent request/response telemetry
        .layer(api::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(cors_layer);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.host, cfg.port))?;
    info!("curtain-quotes-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received, draining connections");
}
