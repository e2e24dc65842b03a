use crate::config::WarehouseConfig;
use crate::credentials::ServiceAccountKey;
use crate::schema::DataType;
use crate::warehouse::auth::fetch_access_token;
use crate::warehouse::{Cell, Column, ExecutionError, QueryResult, WarehouseGateway};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// BigQuery through the `jobs.query` REST API.
pub struct BigQueryGateway {
    client: reqwest::Client,
    api_url: String,
    location: Option<String>,
    job_timeout_ms: u64,
    max_polls: u32,
    max_rows: u32,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    timeout_ms: u64,
    max_results: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    schema: Option<ResultSchema>,
    #[serde(default)]
    rows: Vec<Row>,
    total_rows: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ResultSchema {
    #[serde(default)]
    fields: Vec<Field>,
}

#[derive(Deserialize, Debug)]
struct Field {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
}

#[derive(Deserialize, Debug)]
struct Row {
    f: Vec<RowCell>,
}

#[derive(Deserialize, Debug)]
struct RowCell {
    v: serde_json::Value,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Deserialize)]
struct ErrorItem {
    reason: Option<String>,
}

impl BigQueryGateway {
    pub fn new(config: &WarehouseConfig) -> Result<Self, ExecutionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExecutionError::Failed(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            location: config.location.clone(),
            job_timeout_ms: config.job_timeout_ms,
            max_polls: config.max_polls,
            max_rows: config.max_rows,
        })
    }

    async fn poll(
        &self,
        token: &str,
        project_id: &str,
        job: &JobReference,
    ) -> Result<QueryResponse, ExecutionError> {
        let url = format!("{}/projects/{}/queries/{}", self.api_url, project_id, job.job_id);
        let mut params = vec![
            ("timeoutMs", self.job_timeout_ms.to_string()),
            ("maxResults", self.max_rows.to_string()),
        ];
        if let Some(location) = job.location.as_ref().or(self.location.as_ref()) {
            params.push(("location", location.clone()));
        }

        debug!("Polling BigQuery job {}", job.job_id);
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(&params)
            .send()
            .await
            .map_err(transport_error)?;

        read_response(response).await
    }
}

fn transport_error(err: reqwest::Error) -> ExecutionError {
    ExecutionError::Transient(err.to_string())
}

async fn read_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ExecutionError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!("BigQuery responded with status code: {} - {}", status, body);
        return Err(map_http_error(status, &body));
    }

    response
        .json()
        .await
        .map_err(|e| ExecutionError::Failed(format!("Failed to parse BigQuery response: {}", e)))
}

fn map_http_error(status: StatusCode, body: &str) -> ExecutionError {
    let (message, reason) = match serde_json::from_str::<ErrorWrapper>(body) {
        Ok(wrapper) => (
            wrapper.error.message.unwrap_or_else(|| body.to_string()),
            wrapper.error.errors.into_iter().find_map(|item| item.reason),
        ),
        Err(_) => (body.to_string(), None),
    };

    match (status, reason.as_deref()) {
        (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, Some("rateLimitExceeded")) => {
            ExecutionError::Transient(message)
        }
        (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => {
            ExecutionError::Unauthorized(message)
        }
        (StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND, _) => {
            ExecutionError::InvalidQuery(message)
        }
        (StatusCode::TOO_MANY_REQUESTS, _) => ExecutionError::Transient(message),
        (s, _) if s.is_server_error() => ExecutionError::Transient(message),
        (s, _) => ExecutionError::Failed(format!("{}: {}", s, message)),
    }
}

fn decode_cell(data_type: &DataType, value: serde_json::Value) -> Cell {
    let text = match value {
        serde_json::Value::Null => return Cell::Null,
        serde_json::Value::String(text) => text,
        // REPEATED and RECORD columns arrive as nested JSON
        other => return Cell::Text(other.to_string()),
    };

    match data_type {
        DataType::Int64 => text.parse().map(Cell::Int).unwrap_or(Cell::Text(text)),
        DataType::Float64 => text.parse().map(Cell::Float).unwrap_or(Cell::Text(text)),
        DataType::Bool => match text.as_str() {
            "true" => Cell::Bool(true),
            "false" => Cell::Bool(false),
            _ => Cell::Text(text),
        },
        DataType::Timestamp => text
            .parse::<f64>()
            .ok()
            .and_then(|seconds| DateTime::from_timestamp_micros((seconds * 1_000_000.0).round() as i64))
            .map(|ts| Cell::Text(ts.to_rfc3339()))
            .unwrap_or(Cell::Text(text)),
        _ => Cell::Text(text),
    }
}

fn into_result(response: QueryResponse) -> QueryResult {
    let columns: Vec<Column> = response
        .schema
        .map(|schema| schema.fields)
        .unwrap_or_default()
        .into_iter()
        .map(|field| Column {
            name: field.name,
            data_type: DataType::parse(&field.field_type),
        })
        .collect();

    let rows: Vec<Vec<Cell>> = response
        .rows
        .into_iter()
        .map(|row| {
            row.f
                .into_iter()
                .zip(&columns)
                .map(|(cell, column)| decode_cell(&column.data_type, cell.v))
                .collect()
        })
        .collect();

    let total_rows = response
        .total_rows
        .and_then(|total| total.parse().ok())
        .unwrap_or(rows.len() as u64);

    QueryResult {
        job_id: response.job_reference.map(|job| job.job_id),
        columns,
        rows,
        total_rows,
    }
}

#[async_trait]
impl WarehouseGateway for BigQueryGateway {
    async fn execute(
        &self,
        credential: &ServiceAccountKey,
        sql: &str,
    ) -> Result<QueryResult, ExecutionError> {
        let token = fetch_access_token(&self.client, credential).await?;

        let url = format!("{}/projects/{}/queries", self.api_url, credential.project_id);
        let request = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            timeout_ms: self.job_timeout_ms,
            max_results: self.max_rows,
            location: self.location.as_deref(),
        };

        info!("Executing BigQuery query in project {}", credential.project_id);
        debug!("SQL: {}", sql);

        let response = self
            .client
            .post(url)
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let mut page: QueryResponse = read_response(response).await?;
        let mut polls = 0;
        while !page.job_complete {
            let Some(job) = page.job_reference.take() else {
                return Err(ExecutionError::Failed(
                    "BigQuery returned an incomplete job without a job reference".to_string(),
                ));
            };
            if polls >= self.max_polls {
                warn!("BigQuery job {} still running after {} polls", job.job_id, polls);
                return Err(ExecutionError::Transient(format!(
                    "job {} did not finish in time",
                    job.job_id
                )));
            }
            polls += 1;
            page = self.poll(&token, &credential.project_id, &job).await?;
            if page.job_reference.is_none() {
                page.job_reference = Some(job);
            }
        }

        let result = into_result(page);
        info!(
            "Query finished. Returned rows: {}, total rows: {}",
            result.rows.len(),
            result.total_rows
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_uses_standard_sql() {
        let request = QueryRequest {
            query: "SELECT 1",
            use_legacy_sql: false,
            timeout_ms: 10_000,
            max_results: 1000,
            location: None,
        };
        assert_eq!(
            serde_json::to_value(request).unwrap(),
            json!({"query": "SELECT 1", "useLegacySql": false, "timeoutMs": 10000, "maxResults": 1000})
        );
    }

    #[test]
    fn decodes_typed_rows() {
        let response: QueryResponse = serde_json::from_value(json!({
            "jobComplete": true,
            "jobReference": {"projectId": "p", "jobId": "job_123", "location": "US"},
            "schema": {"fields": [
                {"name": "Store", "type": "STRING"},
                {"name": "units", "type": "INTEGER"},
                {"name": "avg_price", "type": "FLOAT"},
                {"name": "returned", "type": "BOOLEAN"},
                {"name": "first_sale", "type": "TIMESTAMP"}
            ]},
            "rows": [
                {"f": [{"v": "Siam"}, {"v": "42"}, {"v": "199.5"}, {"v": "false"}, {"v": "1.7040672E9"}]},
                {"f": [{"v": null}, {"v": "7"}, {"v": null}, {"v": "true"}, {"v": null}]}
            ],
            "totalRows": "250"
        }))
        .unwrap();

        let result = into_result(response);

        assert_eq!(result.job_id.as_deref(), Some("job_123"));
        assert_eq!(result.total_rows, 250);
        assert_eq!(result.columns[1].data_type, DataType::Int64);
        assert_eq!(
            result.rows[0],
            vec![
                Cell::Text("Siam".into()),
                Cell::Int(42),
                Cell::Float(199.5),
                Cell::Bool(false),
                Cell::Text("2024-01-01T00:00:00+00:00".into()),
            ]
        );
        assert_eq!(
            result.rows[1],
            vec![Cell::Null, Cell::Int(7), Cell::Null, Cell::Bool(true), Cell::Null]
        );
    }

    #[test]
    fn nested_values_are_kept_as_json_text() {
        let cell = decode_cell(&DataType::Unknown("RECORD".into()), json!([{"v": "a"}]));
        assert_eq!(cell, Cell::Text(r#"[{"v":"a"}]"#.into()));
    }

    #[test]
    fn classifies_http_errors() {
        let invalid = r#"{"error": {"code": 400, "message": "Syntax error: Unexpected keyword FROM at [1:8]", "errors": [{"reason": "invalidQuery"}]}}"#;
        assert_eq!(
            map_http_error(StatusCode::BAD_REQUEST, invalid),
            ExecutionError::InvalidQuery("Syntax error: Unexpected keyword FROM at [1:8]".into())
        );

        let denied = r#"{"error": {"code": 403, "message": "Access Denied", "errors": [{"reason": "accessDenied"}]}}"#;
        assert!(matches!(
            map_http_error(StatusCode::FORBIDDEN, denied),
            ExecutionError::Unauthorized(_)
        ));

        let throttled = r#"{"error": {"code": 403, "message": "Exceeded rate limits", "errors": [{"reason": "rateLimitExceeded"}]}}"#;
        assert!(matches!(
            map_http_error(StatusCode::FORBIDDEN, throttled),
            ExecutionError::Transient(_)
        ));

        assert_eq!(
            map_http_error(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>"),
            ExecutionError::Transient("<html>bad gateway</html>".into())
        );
    }
}
