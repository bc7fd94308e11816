mod config;
mod error;
mod llm;
mod routes;
mod services;
mod state;
#[cfg(test)]
mod test_env;

use std::sync::Arc;

use llm::LlmStream;
use services::tools::{ScheduleCsvTool, ToolRegistry};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = config::ChatConfig::from_env().expect("invalid server configuration");
    let port = config.port;

    // Non-fatal: /api/chat answers 503 until a key is configured.
    let llm: Option<Arc<dyn LlmStream>> = match llm::LlmClient::from_env() {
        Ok(client) => {
            tracing::info!(model = client.model(), "LLM client initialized");
            Some(Arc::new(client))
        }
        Err(e) => {
            tracing::warn!(error = %e, "LLM client not configured, chat disabled");
            None
        }
    };

    let mut tools = ToolRegistry::new();
    match &config.schedule_csv_url {
        Some(url) => match ScheduleCsvTool::new(url.clone(), config.tool_fetch_timeout) {
            Ok(tool) => {
                tracing::info!(%url, "schedule tool registered");
                tools.register(Arc::new(tool));
            }
            Err(e) => tracing::warn!(error = %e, "schedule tool disabled"),
        },
        None => tracing::info!("SCHEDULE_CSV_URL not set, schedule tool disabled"),
    }

    let state = state::AppState::new(llm, tools, config);
    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "streamchat listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server failed");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
