pub mod auth;
pub mod bigquery;

use crate::credentials::{CredentialError, ServiceAccountKey};
use crate::schema::DataType;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Invalid SQL query: {0}")]
    InvalidQuery(String),

    #[error("Not authorized to run the query: {0}")]
    Unauthorized(String),

    #[error("Warehouse temporarily unavailable: {0}")]
    Transient(String),

    #[error("Error executing BigQuery SQL: {0}")]
    Failed(String),

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

/// One typed value of a result row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub job_id: Option<String>,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
    /// Rows the warehouse reports for the whole result, which may exceed `rows.len()`
    pub total_rows: u64,
}

/// Executes SQL on the data warehouse on behalf of one credential.
#[async_trait]
pub trait WarehouseGateway: Send + Sync {
    async fn execute(
        &self,
        credential: &ServiceAccountKey,
        sql: &str,
    ) -> Result<QueryResult, ExecutionError>;
}
