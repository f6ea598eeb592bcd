//! MySQL 连接注册与浏览服务
//!
//! 提供以下功能：
//! - 连接配置的增删查，密码单独存放在凭据存储中
//! - 每个连接按需建立并缓存一个数据库会话
//! - 浏览数据库、数据表、字段，分页读取表数据

mod driver;
mod handlers;
mod registry;
mod routes;
mod service;
mod state;
mod store;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::Context;
use axum::{middleware, routing::get, Json, Router};
use common::config::AppConfig;
use common::middleware::request_id::request_id_middleware;
use state::AppState;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

use crate::driver::MySqlConnector;
use crate::registry::ConnectionRegistry;

const SERVICE_NAME: &str = "browser-service";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "MySQL 浏览服务 API",
        version = "0.1.0",
        description = "MySQL 连接注册与库表浏览"
    ),
    paths(
        handlers::list_connections,
        handlers::create_connection,
        handlers::get_connection,
        handlers::delete_connection,
        handlers::list_databases,
        handlers::list_tables,
        handlers::list_columns,
        handlers::table_rows,
        handlers::health_check,
    ),
    components(schemas(
        common::models::ConnectionConfig,
        common::models::CreateConnectionRequest,
        common::models::DatabaseInfo,
        common::models::TableInfo,
        common::models::ColumnInfo,
        common::models::CellValue,
        common::models::DatabaseListing,
        common::models::TableListing,
        common::models::ColumnListing,
        common::models::TablePage,
        handlers::RemoveResult,
        handlers::HealthResponse,
    )),
    tags(
        (name = "connections", description = "连接管理端点"),
        (name = "browse", description = "库表浏览端点"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志追踪
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // 加载配置（含 .env）
    let config = AppConfig::load_with_service(SERVICE_NAME).context("invalid configuration")?;

    // 创建存储与连接注册表
    let config_store = store::config_store_from(&config)
        .await
        .context("failed to open config store")?;
    let secret_store = store::secret_store_from(&config)
        .await
        .context("failed to open secret store")?;
    let registry = Arc::new(ConnectionRegistry::new(
        config_store,
        secret_store,
        Arc::new(MySqlConnector::new()),
        config.secret_namespace.clone(),
        config.max_page_size,
    ));
    registry.load().await.context("failed to load connections")?;

    let app = create_router(AppState::new(config.clone(), Arc::clone(&registry)));

    // 启动服务
    let addr = config.bind_address();
    info!(service = SERVICE_NAME, address = %addr, "启动服务");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let closed = registry.close_all().await;
    info!(closed, "服务已停止");
    Ok(())
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("收到停止信号，正在关闭");
}
