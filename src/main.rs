use marketplace::config::ProxyConfig;
use marketplace::routes;
use marketplace::state::AppState;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = ProxyConfig::from_env().expect("invalid proxy configuration");
    let state = AppState::new(&config).expect("HTTP client init failed");

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .expect("failed to bind");

    tracing::info!(port = config.port, backend = %config.backend_url, "auth proxy listening");
    axum::serve(listener, app).await.expect("server failed");
}
