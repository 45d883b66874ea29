//! HTTP surface protected by the certificate filter.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Liveness (public) |
//! | `GET` | `/identity` | Echo the caller's verified identity |

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    middleware,
    routing::get,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::info;

use crate::certauth::{
    Admission, CertAuthFilter, InMemoryTrustStore, VerifiedCountry, cert_auth_middleware,
};
use crate::config::Config;
use crate::{Error, Result};

/// Build the router with the filter in front of every route.
pub fn router(filter: Arc<CertAuthFilter>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/identity", get(identity))
        .layer(middleware::from_fn_with_state(filter, cert_auth_middleware))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn identity(
    Extension(country): Extension<VerifiedCountry>,
    Extension(admission): Extension<Admission>,
) -> Json<Value> {
    Json(json!({
        "country": country.as_str(),
        "provenance": admission.provenance,
        "fingerprint": admission.fingerprint,
    }))
}

/// Load the trust store, bind, and serve until Ctrl+C / SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    let store = InMemoryTrustStore::from_config(&config.trust_store)?;
    let filter = Arc::new(CertAuthFilter::new(&config.cert_auth, Arc::new(store)));
    let app = router(filter);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| Error::Config(format!("Invalid listen address: {e}")))?;
    let listener = TcpListener::bind(addr).await?;

    info!(
        addr = %addr,
        calculate_hash = config.cert_auth.header_fields.calculate_hash,
        trust_distinguished_name = config.cert_auth.trust_distinguished_name,
        "Listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

    Ok(())
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
