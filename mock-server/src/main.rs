use mock_server::{ServerConfig, BASE_PATH};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "mock_server=info".into()))
        .init();

    let defaults = ServerConfig::default();
    let config = ServerConfig {
        api_token: env_or("THINGS_API_TOKEN", defaults.api_token),
        username: env_or("THINGS_USERNAME", defaults.username),
        password: env_or("THINGS_PASSWORD", defaults.password),
    };

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(user = %config.username, "listening on http://{addr}{BASE_PATH}");
    mock_server::run(listener, config).await
}
