//! Handler模块

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use common::errors::AppError;
use common::middleware::request_id::RequestId;
use common::models::{
    ColumnListing, ConnectionConfig, CreateConnectionRequest, DatabaseListing, TableListing,
    TablePage,
};
use common::response::ApiResponse;

use crate::service::BrowserServiceTrait;
use crate::state::AppState;

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

fn respond<T: Serialize>(state: &AppState, request_id: &RequestId, data: T) -> Json<ApiResponse<T>> {
    Json(
        ApiResponse::ok_with_service(data, state.config.service_name.clone())
            .with_request_id(request_id.as_str()),
    )
}

/// 列出所有已保存的数据库连接
#[utoipa::path(
    get,
    path = "/api/connections",
    tag = "connections",
    responses(
        (status = 200, description = "连接列表", body = ApiResponse<Vec<ConnectionConfig>>)
    )
)]
pub async fn list_connections(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> ApiResult<Vec<ConnectionConfig>> {
    let data = state.service().list().await;
    Ok(respond(&state, &request_id, data))
}

/// 创建新的数据库连接（先试连，成功后才保存）
#[utoipa::path(
    post,
    path = "/api/connections",
    tag = "connections",
    request_body = CreateConnectionRequest,
    responses(
        (status = 200, description = "连接已创建", body = ApiResponse<ConnectionConfig>),
        (status = 400, description = "参数校验失败"),
        (status = 502, description = "试连失败")
    )
)]
pub async fn create_connection(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<CreateConnectionRequest>, JsonRejection>,
) -> ApiResult<ConnectionConfig> {
    let Json(req) = payload?;
    let data = state.service().create(req).await?;
    Ok(respond(&state, &request_id, data))
}

/// 根据 ID 获取连接
#[utoipa::path(
    get,
    path = "/api/connections/{id}",
    tag = "connections",
    params(
        ("id" = String, Path, description = "连接 ID")
    ),
    responses(
        (status = 200, description = "连接详情", body = ApiResponse<ConnectionConfig>),
        (status = 404, description = "连接未找到")
    )
)]
pub async fn get_connection(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> ApiResult<ConnectionConfig> {
    let data = state.service().get(&id).await?;
    Ok(respond(&state, &request_id, data))
}

/// 根据 ID 删除数据库连接（幂等）
#[utoipa::path(
    delete,
    path = "/api/connections/{id}",
    tag = "connections",
    params(
        ("id" = String, Path, description = "连接 ID")
    ),
    responses(
        (status = 200, description = "删除结果", body = ApiResponse<RemoveResult>)
    )
)]
pub async fn delete_connection(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> ApiResult<RemoveResult> {
    let removed = state.service().delete(&id).await?;
    Ok(respond(&state, &request_id, RemoveResult { id, removed }))
}

/// 列出连接下的数据库（不含系统库）
#[utoipa::path(
    get,
    path = "/api/connections/{id}/databases",
    tag = "browse",
    params(
        ("id" = String, Path, description = "连接 ID")
    ),
    responses(
        (status = 200, description = "数据库列表，失败时 error 非空", body = ApiResponse<DatabaseListing>)
    )
)]
pub async fn list_databases(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> ApiResult<DatabaseListing> {
    let data = state.service().databases(&id).await;
    Ok(respond(&state, &request_id, data))
}

/// 列出数据库下的表
#[utoipa::path(
    get,
    path = "/api/connections/{id}/databases/{db}/tables",
    tag = "browse",
    params(
        ("id" = String, Path, description = "连接 ID"),
        ("db" = String, Path, description = "数据库名")
    ),
    responses(
        (status = 200, description = "表列表，失败时 error 非空", body = ApiResponse<TableListing>)
    )
)]
pub async fn list_tables(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((id, db)): Path<(String, String)>,
) -> ApiResult<TableListing> {
    let data = state.service().tables(&id, &db).await;
    Ok(respond(&state, &request_id, data))
}

/// 列出表字段
#[utoipa::path(
    get,
    path = "/api/connections/{id}/databases/{db}/tables/{table}/columns",
    tag = "browse",
    params(
        ("id" = String, Path, description = "连接 ID"),
        ("db" = String, Path, description = "数据库名"),
        ("table" = String, Path, description = "表名")
    ),
    responses(
        (status = 200, description = "字段列表，失败时 error 非空", body = ApiResponse<ColumnListing>)
    )
)]
pub async fn list_columns(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((id, db, table)): Path<(String, String, String)>,
) -> ApiResult<ColumnListing> {
    let data = state.service().columns(&id, &db, &table).await;
    Ok(respond(&state, &request_id, data))
}

/// 分页参数，page 从 0 开始
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PageQuery {
    #[serde(default)]
    pub page: u64,
    pub page_size: Option<u64>,
}

/// 分页读取表数据
#[utoipa::path(
    get,
    path = "/api/connections/{id}/databases/{db}/tables/{table}/rows",
    tag = "browse",
    params(
        ("id" = String, Path, description = "连接 ID"),
        ("db" = String, Path, description = "数据库名"),
        ("table" = String, Path, description = "表名"),
        PageQuery
    ),
    responses(
        (status = 200, description = "一页数据，失败时 error 非空", body = ApiResponse<TablePage>)
    )
)]
pub async fn table_rows(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((id, db, table)): Path<(String, String, String)>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<TablePage> {
    let Query(query) = query?;
    let data = state
        .service()
        .rows(&id, &db, &table, query.page, query.page_size)
        .await;
    Ok(respond(&state, &request_id, data))
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        connections: state.registry.config_count().await,
        live_connections: state.registry.live_count().await,
    })
}

#[derive(Serialize, ToSchema)]
pub struct RemoveResult {
    pub id: String,
    pub removed: bool,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    /// Registered configs.
    pub connections: usize,
    /// Open cached connections.
    pub live_connections: usize,
}
