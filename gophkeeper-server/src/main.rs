use std::net::SocketAddr;
use std::sync::Arc;

use tonic::transport::{Identity, Server, ServerTlsConfig};
use tracing_subscriber::EnvFilter;

use gophkeeper_core::proto::authorization_service_server::AuthorizationServiceServer;
use gophkeeper_core::proto::storage_server::StorageServer;

use gophkeeper_server::auth::Authorizer;
use gophkeeper_server::config::Config;
use gophkeeper_server::grpc::{AuthLayer, AuthService, RateLimitLayer, RateLimiter, StorageService};
use gophkeeper_server::storage::pg;

#[tokio::main]
async fn main() {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gophkeeper_server=info")),
        )
        .init();

    tracing::info!("gophkeeper server starting...");

    // Load .env file if present (non-fatal if missing).
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("no .env file loaded: {e}");
    }

    // Load configuration.
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };
    tracing::info!(
        address = %config.grpc_server_address,
        port = config.grpc_server_base_port,
        rps_limit = config.rps_limit,
        "configuration loaded"
    );

    // Read the token signing key.
    let sign_key = match std::fs::read(&config.token_key_path) {
        Ok(key) => key,
        Err(e) => {
            tracing::error!(error = %e, path = %config.token_key_path, "failed to read signing key");
            std::process::exit(1);
        }
    };

    // Create database connection pool and run migrations.
    let pool = match pg::create_pool(&config.db_dsn).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "failed to create database pool");
            std::process::exit(1);
        }
    };
    if let Err(e) = pg::run_migrations(&pool).await {
        tracing::error!(error = %e, "failed to run database migrations");
        std::process::exit(1);
    }

    let store = Arc::new(pg::PgStorage::new(pool, config.db_timeout));

    let authorizer = match Authorizer::new(store.clone(), sign_key) {
        Ok(authorizer) => Arc::new(authorizer),
        Err(e) => {
            tracing::error!(error = %e, "failed to create authorizer");
            std::process::exit(1);
        }
    };

    let auth_service = AuthService::new(authorizer.clone());
    let storage_service = StorageService::new(store, config.grpc_server_send_size);

    let limiter = Arc::new(RateLimiter::new(config.rps_limit));

    // Middleware order: token extraction and authentication first, then the
    // shared rate limit. The auth service bypasses the token check inside
    // the auth layer itself.
    let middleware = tower::ServiceBuilder::new()
        .layer(AuthLayer::new(authorizer))
        .layer(RateLimitLayer::new(limiter))
        .into_inner();

    let addr: SocketAddr = match format!(
        "{}:{}",
        config.grpc_server_address, config.grpc_server_base_port
    )
    .parse()
    {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, "invalid listen address");
            std::process::exit(1);
        }
    };

    let mut builder = Server::builder();

    if config.use_tls {
        let (crt_file, key_file) = (
            config.crt_file.as_deref().unwrap_or_default(),
            config.key_file.as_deref().unwrap_or_default(),
        );
        let identity = match (std::fs::read(crt_file), std::fs::read(key_file)) {
            (Ok(crt), Ok(key)) => Identity::from_pem(crt, key),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "failed to read TLS material");
                std::process::exit(1);
            }
        };
        builder = match builder.tls_config(ServerTlsConfig::new().identity(identity)) {
            Ok(builder) => builder,
            Err(e) => {
                tracing::error!(error = %e, "failed to prepare TLS config");
                std::process::exit(1);
            }
        };
    }

    tracing::info!(%addr, "gRPC listener starting");

    let serve = builder
        .layer(middleware)
        .add_service(
            AuthorizationServiceServer::new(auth_service)
                .max_decoding_message_size(config.grpc_server_recv_size),
        )
        .add_service(
            StorageServer::new(storage_service)
                .max_decoding_message_size(config.grpc_server_recv_size)
                .max_encoding_message_size(config.grpc_server_recv_size),
        )
        .serve_with_shutdown(addr, shutdown_signal());

    if let Err(e) = serve.await {
        tracing::error!(error = %e, "gRPC server error");
        std::process::exit(1);
    }

    tracing::info!("server stopped");
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
