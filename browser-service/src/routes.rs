//! 浏览服务路由模块

use axum::{routing::get, Router};

use crate::handlers::{
    create_connection, delete_connection, get_connection, health_check, list_columns,
    list_connections, list_databases, list_tables, table_rows,
};
use crate::state::AppState;

/// 创建连接管理与浏览路由
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/connections", get(list_connections).post(create_connection))
        .route("/api/connections/{id}", get(get_connection).delete(delete_connection))
        .route("/api/connections/{id}/databases", get(list_databases))
        .route("/api/connections/{id}/databases/{db}/tables", get(list_tables))
        .route(
            "/api/connections/{id}/databases/{db}/tables/{table}/columns",
            get(list_columns),
        )
        .route(
            "/api/connections/{id}/databases/{db}/tables/{table}/rows",
            get(table_rows),
        )
        .route("/api/health", get(health_check))
}
