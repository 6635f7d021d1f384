use medchat_gateway::{GatewayConfig, create_app};
use tokio::net::TcpListener;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = GatewayConfig::from_env()?;
    let port = config.port;
    let ai_service_url = config.ai_service_url.clone();
    let timeouts = config.timeouts.clone();

    let app = create_app(config)?;
    let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    let addr = listener.local_addr()?;

    info!("Patient File AI Gateway starting on {}", addr);
    info!("AI service: {}", ai_service_url);
    info!(
        chat_secs = timeouts.chat.as_secs(),
        report_secs = timeouts.generate_report.as_secs(),
        "Timeout budgets"
    );
    info!("Health check endpoint: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
