use nexus_license_devserver::{build_router, LicenseRegistry};
use std::sync::Arc;

/// Spin up the API on an OS-assigned port, returning the API base URL.
pub async fn spawn_server(registry: Arc<LicenseRegistry>) -> String {
    let app = build_router(registry);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{}/api", port)
}

/// Spin up the API with the standard test licenses.
pub async fn spawn_seeded_server() -> String {
    spawn_server(Arc::new(LicenseRegistry::seeded())).await
}
