use std::sync::Arc;

use huddle::auth::{TokenVerifier, VerifierConfig, VerifyError};
use huddle::chat::{ChatState, chat_router};
use huddle::config::Config;
use huddle::store::{DbConfig, MemoryStore, PostgresStore, create_pool, health_check};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load application config from environment variables
    let config = Config::from_env();

    // Log config status (without revealing secrets)
    tracing::info!(
        "Config loaded: database={}, jwt_secret={}, bind_addr={}",
        config.has_database(),
        config.has_jwt_secret(),
        config.bind_addr
    );

    let secret = config.jwt_secret.clone().ok_or(VerifyError::MissingSecret)?;
    let verifier = TokenVerifier::new(VerifierConfig::new(secret).issuer(config.jwt_issuer.clone()));

    // Wire the chat state over PostgreSQL when configured, in-memory
    // stores otherwise
    let state = match config.database_url.as_deref() {
        Some(database_url) => {
            let pool = create_pool(&DbConfig::new(database_url)).await?;
            health_check(&pool).await?;
            tracing::info!("Connected to PostgreSQL");

            let store = Arc::new(PostgresStore::new(pool.clone()));
            ChatState::new(verifier, store.clone(), store.clone(), store).with_pool(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores (nothing is persisted)");
            let store = Arc::new(MemoryStore::new());
            ChatState::new(verifier, store.clone(), store.clone(), store)
        }
    };

    let app = chat_router(state);

    let addr = config.socket_addr()?;
    tracing::info!("listening on http://{}", addr);
    tracing::info!("Chat WebSocket: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
