use infrajet::config::ServerConfig;
use infrajet::routes;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env();
    let index = config.dist_dir.join(routes::SHELL_FILE);
    if !index.is_file() {
        tracing::warn!(path = %index.display(), "application shell not found; requests will fail until it is built");
    }

    let app = routes::app(&config.dist_dir);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .expect("failed to bind");

    tracing::info!(port = config.port, dist_dir = %config.dist_dir.display(), "infrajet listening");
    axum::serve(listener, app).await.expect("server failed");
}
