//! 浏览服务模块

use std::sync::Arc;

use async_trait::async_trait;

use common::errors::AppResult;
use common::models::{
    ColumnListing, ConnectionConfig, CreateConnectionRequest, DatabaseListing, TableListing,
    TablePage,
};

use crate::registry::ConnectionRegistry;

/// 浏览服务 Trait
///
/// CRUD operations propagate errors. The four browse operations never fail:
/// a failure becomes an empty result with `error` set.
#[async_trait]
pub trait BrowserServiceTrait: Send + Sync {
    /// 列出所有连接
    async fn list(&self) -> Vec<ConnectionConfig>;

    /// 根据 ID 获取连接
    async fn get(&self, id: &str) -> AppResult<ConnectionConfig>;

    /// 创建新连接
    async fn create(&self, req: CreateConnectionRequest) -> AppResult<ConnectionConfig>;

    /// 删除连接，返回是否确有删除
    async fn delete(&self, id: &str) -> AppResult<bool>;

    /// 列出数据库
    async fn databases(&self, id: &str) -> DatabaseListing;

    /// 列出数据表
    async fn tables(&self, id: &str, database: &str) -> TableListing;

    /// 列出字段
    async fn columns(&self, id: &str, database: &str, table: &str) -> ColumnListing;

    /// 分页读取表数据
    async fn rows(
        &self,
        id: &str,
        database: &str,
        table: &str,
        page: u64,
        page_size: Option<u64>,
    ) -> TablePage;
}

/// 数据库浏览服务
pub struct BrowserService {
    registry: Arc<ConnectionRegistry>,
    default_page_size: u64,
}

impl BrowserService {
    pub fn new(registry: Arc<ConnectionRegistry>, default_page_size: u64) -> Self {
        Self {
            registry,
            default_page_size,
        }
    }
}

#[async_trait]
impl BrowserServiceTrait for BrowserService {
    async fn list(&self) -> Vec<ConnectionConfig> {
        self.registry.list_configs().await
    }

    async fn get(&self, id: &str) -> AppResult<ConnectionConfig> {
        self.registry.get_config(id).await
    }

    async fn create(&self, req: CreateConnectionRequest) -> AppResult<ConnectionConfig> {
        self.registry.add_connection(&req).await
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        self.registry.remove_connection(id).await
    }

    async fn databases(&self, id: &str) -> DatabaseListing {
        let result = self.registry.get_databases(id).await;
        if let Err(e) = &result {
            tracing::warn!(id = %id, error = %e, "Listing databases failed");
        }
        DatabaseListing::from_result(id, result)
    }

    async fn tables(&self, id: &str, database: &str) -> TableListing {
        let result = self.registry.get_tables(id, database).await;
        if let Err(e) = &result {
            tracing::warn!(id = %id, database = %database, error = %e, "Listing tables failed");
        }
        TableListing::from_result(id, database, result)
    }

    async fn columns(&self, id: &str, database: &str, table: &str) -> ColumnListing {
        let result = self.registry.get_columns(id, database, table).await;
        if let Err(e) = &result {
            tracing::warn!(id = %id, database = %database, table = %table, error = %e, "Describing table failed");
        }
        ColumnListing::from_result(id, database, table, result)
    }

    async fn rows(
        &self,
        id: &str,
        database: &str,
        table: &str,
        page: u64,
        page_size: Option<u64>,
    ) -> TablePage {
        let page_size = page_size.unwrap_or(self.default_page_size);
        let result = self
            .registry
            .get_table_rows(id, database, table, page, page_size)
            .await;
        if let Err(e) = &result {
            tracing::warn!(id = %id, database = %database, table = %table, page, error = %e, "Reading table rows failed");
        }
        TablePage::from_result(id, database, table, page, page_size, result)
    }
}
