mod bookmark;
mod config;
mod frame;
mod routes;
mod session;
mod state;
mod supabase;
mod sync;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::AppConfig::from_env().expect("invalid configuration");
    let client = supabase::SupabaseClient::new(&config).expect("platform client init failed");
    let port = config.port;

    tracing::info!(
        supabase_url = %config.supabase_url,
        public_origin = %config.public_origin,
        provider = %config.oauth_provider,
        "platform client initialized"
    );

    let state = state::AppState::new(config, Arc::new(client.clone()), Arc::new(client));

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "smart-bookmarks listening");
    axum::serve(listener, app).await.expect("server failed");
}
