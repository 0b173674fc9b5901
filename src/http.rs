//! Static provisioning profile over HTTP.
//!
//! Every request, whatever its method or path, gets the same XML document.

use std::future::Future;

use axum::Router;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, StatusCode, Uri};
use axum::response::IntoResponse;
use tokio::net::TcpListener;
use tracing::info;

use crate::error::Result;

pub const PROVISIONING_PROFILE: &str = "<flat-profile>
    <Admin_Passwd ua=\"na\"></Admin_Passwd>
    <User_Passwd ua=\"na\"></User_Passwd>
    <Provision_Enable ua=\"na\">No</Provision_Enable>
    <Upgrade_Enable ua=\"na\">No</Upgrade_Enable>
</flat-profile>
";

async fn profile(method: Method, uri: Uri) -> impl IntoResponse {
    info!("HTTP {} {}", method, uri.path());
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/xml")],
        PROVISIONING_PROFILE,
    )
}

pub fn router() -> Router {
    Router::new().fallback(profile)
}

/// Serves the profile on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    if let Ok(local) = listener.local_addr() {
        info!("HTTP server listening on {}", local);
    }

    axum::serve(listener, router())
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped");
    Ok(())
}
