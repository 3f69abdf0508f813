use std::{any::Any, path::PathBuf, sync::Arc};

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, get_service},
    Json, Router,
};
use tower_http::{catch_panic::CatchPanicLayer, services::ServeDir};

use crate::{
    error,
    models::ErrorBody,
    relay::Relay,
    telemetry,
};

type SharedRelay = Arc<Relay>;

/**
 * \brief 构建路由。`/api/chat` 接受任意方法，由中继自身返回 405 JSON。
 * \param ui_dir 可选的静态前端目录
 */
pub fn router(relay: SharedRelay, ui_dir: Option<PathBuf>) -> Router {
    let app = Router::new()
        .route("/api/chat", any(chat))
        .route("/api/health", get(health_check))
        .with_state(relay)
        .layer(CatchPanicLayer::custom(panic_response));

    match ui_dir {
        Some(dir) if dir.exists() => {
            let static_service =
                get_service(ServeDir::new(dir).append_index_html_on_directories(true));
            app.fallback_service(static_service)
        }
        _ => app,
    }
}

/**
 * \brief 启动本地 HTTP 服务。
 * \param addr 监听地址，如 "127.0.0.1:3000"
 * \param ui_dir 可选的静态前端目录
 */
pub async fn run(addr: &str, relay: Relay, ui_dir: Option<PathBuf>) -> Result<()> {
    let config = relay.config();
    if !config.has_credential() {
        telemetry::log_error(
            "server",
            &format!(
                "{} environment variable is not set; chat requests will fail",
                config.preset.credential_var()
            ),
        );
    }
    telemetry::log_event(
        "server",
        &format!(
            "provider={} base={} default_model={}",
            config.preset,
            config.base_url,
            config.resolve_model(None)
        ),
    );

    let app = router(Arc::new(relay), ui_dir);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/**
 * \brief 聊天中继：POST /api/chat，返回 `{reply}` 或 `{error}`。
 */
async fn chat(State(relay): State<SharedRelay>, method: Method, body: Bytes) -> Response {
    match relay.handle(&method, &body).await {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(err) => {
            err.log();
            err.into_response()
        }
    }
}

/**
 * \brief 健康检查：只读配置，不访问上游，不暴露凭据。
 */
async fn health_check(State(relay): State<SharedRelay>) -> Json<serde_json::Value> {
    let config = relay.config();
    Json(serde_json::json!({
        "ok": true,
        "provider": config.preset.name(),
        "model": config.resolve_model(None),
        "configured": config.has_credential(),
    }))
}

fn panic_response(detail: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = detail.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = detail.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    telemetry::log_error("server", &format!("handler panicked: {}", detail));
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: error::INTERNAL.to_string(),
        }),
    )
        .into_response()
}
