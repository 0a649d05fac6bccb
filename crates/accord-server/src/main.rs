use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use accord_api::middleware::{require_auth, verify_token};
use accord_api::verify::{AppState, AppStateInner};
use accord_api::{messages, requests, verify};
use accord_chat::{ChatLog, Dispatcher, connection};
use accord_lifecycle::LifecycleEngine;
use accord_sms::{SmsGateway, SmsProvider};
use accord_verify::{VerificationService, VerifyConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "accord=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("ACCORD_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("ACCORD_DB_PATH").unwrap_or_else(|_| "accord.db".into());
    let host = std::env::var("ACCORD_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("ACCORD_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Arc::new(accord_db::Database::open(&PathBuf::from(&db_path))?);

    // SMS gateway
    let provider = sms_provider_from_env()?;
    info!("SMS delivery via {}", provider.name());
    let gateway = Arc::new(SmsGateway::new(provider));

    // Core services
    let chat = ChatLog::new(db.clone(), Dispatcher::new());
    let verify_service = VerificationService::new(db.clone(), gateway, VerifyConfig::default());
    let lifecycle = LifecycleEngine::new(db.clone(), chat.clone());

    let app_state: AppState = Arc::new(AppStateInner {
        verify: verify_service,
        lifecycle,
        chat,
        jwt_secret,
    });

    // Routes
    let public_routes = Router::new()
        .route("/verify/issue", post(verify::issue_code))
        .route("/verify/resend", post(verify::resend_code))
        .route("/verify/check", post(verify::verify_code))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/requests", post(requests::create_request))
        .route("/requests", get(requests::list_requests))
        .route("/requests/{id}", get(requests::get_request))
        .route("/requests/{id}/take", post(requests::take_request))
        .route("/requests/{id}/document", post(requests::send_document))
        .route("/requests/{id}/viewed", post(requests::mark_viewed))
        .route("/requests/{id}/signed", post(requests::mark_signed))
        .route("/requests/{id}/resolve", post(requests::resolve_request))
        .route("/requests/{id}/reject", post(requests::reject_request))
        .route("/requests/{id}/messages", get(messages::list_messages))
        .route("/requests/{id}/messages", post(messages::append_message))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state.clone());

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(app_state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Accord server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn sms_provider_from_env() -> anyhow::Result<SmsProvider> {
    let name = std::env::var("ACCORD_SMS_PROVIDER").unwrap_or_else(|_| "console".into());
    match name.as_str() {
        "smsc" => Ok(SmsProvider::smsc(
            std::env::var("ACCORD_SMSC_LOGIN")?,
            std::env::var("ACCORD_SMSC_PASSWORD")?,
        )),
        "mobizon" => Ok(SmsProvider::mobizon(std::env::var(
            "ACCORD_MOBIZON_API_KEY",
        )?)),
        "console" => {
            warn!("SMS provider is 'console' — codes are logged, not delivered");
            Ok(SmsProvider::Console)
        }
        other => anyhow::bail!("unknown SMS provider '{}'", other),
    }
}

#[derive(Deserialize)]
struct GatewayQuery {
    token: String,
}

async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    match verify_token(&state.jwt_secret, &query.token) {
        Some(claims) => ws
            .on_upgrade(move |socket| {
                connection::handle_connection(socket, state.chat.clone(), claims.sub)
            })
            .into_response(),
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}
