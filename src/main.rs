use axum::{
    routing::{get, post},
    Router,
};
use eduquiz_backend::{
    config::{get_config, init_config},
    database::pool::create_pool,
    routes, AppState,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    init_config()?;
    let config = get_config();

    let pool = create_pool().await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let app_state = AppState::new(pool);

    {
        let bot_token = config.telegram_bot_token.clone();
        let target_webhook_url = format!("{}/api/webhook/telegram", config.webapp_url);

        info!("Checking Telegram webhook status...");

        match reqwest::get(format!(
            "https://api.telegram.org/bot{}/getWebhookInfo",
            bot_token
        ))
        .await
        {
            Ok(resp) => {
                if let Ok(info) = resp.json::<serde_json::Value>().await {
                    let current_url = info["result"]["url"].as_str().unwrap_or("");

                    if current_url == target_webhook_url {
                        info!("Telegram webhook is already up to date: {}", current_url);
                    } else {
                        info!(
                            "Updating Telegram webhook: {} -> {}",
                            current_url, target_webhook_url
                        );
                        let set_url = format!(
                            "https://api.telegram.org/bot{}/setWebhook?url={}",
                            bot_token, target_webhook_url
                        );
                        if let Ok(set_resp) = reqwest::get(&set_url).await {
                            if set_resp.status().is_success() {
                                info!("Telegram webhook registered successfully");
                            } else {
                                tracing::warn!(
                                    "Failed to register Telegram webhook: {:?}",
                                    set_resp.status()
                                );
                            }
                        }
                    }
                }
            }
            Err(e) => tracing::warn!("Could not check Telegram webhook status: {:?}", e),
        }
    }

    let app = Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/webhook/telegram", post(routes::webhook::handle_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
