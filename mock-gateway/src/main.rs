use mock_gateway::GatewayOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// `0`/`false` turns a switch off; anything else, or unset, leaves it on.
fn flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| !matches!(v.as_str(), "0" | "false"))
        .unwrap_or(true)
}

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let options = GatewayOptions {
        persist_cookies: flag("MOCK_PERSIST_COOKIES"),
        honor_range: flag("MOCK_HONOR_RANGE"),
        filter_forwarding: flag("MOCK_FILTER_FORWARDING"),
    };
    let port = std::env::var("PORT").unwrap_or_else(|_| "8787".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, ?options, "mock gateway listening");
    mock_gateway::run_with(listener, options).await
}
