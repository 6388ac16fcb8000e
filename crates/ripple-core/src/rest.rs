//! REST log collection client
//!
//! The paginated log collection lives behind a plain CRUD API. The trait
//! keeps the mutation controller and page driver testable without a
//! server; [`HttpLogApi`] is the production implementation.
//!
//! Server rejection details are carried verbatim into the error so the
//! rollback path can surface exactly what the server said.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::models::{LogDraft, LogEntry, LogPatch};

/// Default request timeout in seconds
const REQUEST_TIMEOUT: u64 = 10;

/// One fetched page of the collection
#[derive(Debug, Clone)]
pub struct PageResponse {
    pub items: Vec<LogEntry>,
    pub total: usize,
}

/// CRUD access to the log collection
#[async_trait]
pub trait LogApi: Send + Sync {
    async fn list(&self, page: usize, page_size: usize) -> SyncResult<PageResponse>;
    async fn get(&self, id: &str) -> SyncResult<LogEntry>;
    async fn create(&self, draft: &LogDraft) -> SyncResult<LogEntry>;
    async fn update(&self, id: &str, patch: &LogPatch) -> SyncResult<LogEntry>;
    async fn delete(&self, id: &str) -> SyncResult<()>;
}

/// HTTP implementation against the `/api/logs` routes
pub struct HttpLogApi {
    client: reqwest::Client,
    base_url: String,
    level_filter: Option<String>,
}

impl HttpLogApi {
    pub fn new(base_url: &str) -> SyncResult<Self> {
        Self::with_timeout(base_url, Duration::from_secs(REQUEST_TIMEOUT))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            level_filter: None,
        })
    }

    /// Restrict `list` to entries of one level.
    pub fn with_level_filter(mut self, level: impl Into<String>) -> Self {
        self.level_filter = Some(level.into());
        self
    }

    fn logs_url(&self) -> String {
        format!("{}/api/logs", self.base_url)
    }

    fn entry_url(&self, id: &str) -> String {
        format!("{}/api/logs/{}", self.base_url, id)
    }

    async fn entry_from_response(response: Response, id: Option<&str>) -> SyncResult<LogEntry> {
        let response = check_status(response, id).await?;
        let value: Value = response.json().await?;
        LogEntry::from_value(&value)
    }
}

#[async_trait]
impl LogApi for HttpLogApi {
    async fn list(&self, page: usize, page_size: usize) -> SyncResult<PageResponse> {
        let mut query: Vec<(&str, String)> = vec![
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
        ];
        if let Some(level) = &self.level_filter {
            query.push(("level", level.clone()));
        }

        debug!(page, page_size, "listing logs");
        let response = self.client.get(self.logs_url()).query(&query).send().await?;
        let response = check_status(response, None).await?;
        let value: Value = response.json().await?;
        parse_page_payload(&value)
    }

    async fn get(&self, id: &str) -> SyncResult<LogEntry> {
        let response = self.client.get(self.entry_url(id)).send().await?;
        Self::entry_from_response(response, Some(id)).await
    }

    async fn create(&self, draft: &LogDraft) -> SyncResult<LogEntry> {
        let response = self
            .client
            .post(self.logs_url())
            .json(draft)
            .send()
            .await?;
        Self::entry_from_response(response, None).await
    }

    async fn update(&self, id: &str, patch: &LogPatch) -> SyncResult<LogEntry> {
        let response = self
            .client
            .put(self.entry_url(id))
            .json(patch)
            .send()
            .await?;
        Self::entry_from_response(response, Some(id)).await
    }

    async fn delete(&self, id: &str) -> SyncResult<()> {
        let response = self.client.delete(self.entry_url(id)).send().await?;
        check_status(response, Some(id)).await?;
        Ok(())
    }
}

/// Map a non-success response onto the error taxonomy, carrying the
/// server's `detail` text through unchanged.
async fn check_status(response: Response, id: Option<&str>) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| {
            v.get("detail")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or(body);

    Err(classify_status(status, detail, id))
}

fn classify_status(status: StatusCode, detail: String, id: Option<&str>) -> SyncError {
    match status {
        StatusCode::NOT_FOUND => SyncError::NotFound {
            id: id.unwrap_or_default().to_string(),
        },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            SyncError::Validation(detail)
        }
        _ => SyncError::Transport(format!("HTTP {status}: {detail}")),
    }
}

/// Accept either a bare entry array or an object with item/total fields.
fn parse_page_payload(value: &Value) -> SyncResult<PageResponse> {
    let (raw_items, total) = match value {
        Value::Array(items) => (items.as_slice(), None),
        Value::Object(map) => {
            let items = map
                .get("items")
                .or_else(|| map.get("logs"))
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    SyncError::Parse("list response carries no log items".to_string())
                })?;
            let total = map
                .get("total")
                .or_else(|| map.get("total_count"))
                .and_then(Value::as_u64)
                .map(|n| n as usize);
            (items.as_slice(), total)
        }
        _ => {
            return Err(SyncError::Parse(
                "list response is neither an array nor an object".to_string(),
            ))
        }
    };

    let items = raw_items
        .iter()
        .map(LogEntry::from_value)
        .collect::<SyncResult<Vec<_>>>()?;
    let total = total.unwrap_or(items.len());

    Ok(PageResponse { items, total })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_bare_array_payload() {
        let value = json!([{"id": 1, "message": "a"}, {"id": 2, "message": "b"}]);
        let page = parse_page_payload(&value).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 2);
    }

    #[test]
    fn test_parse_object_payload_with_total() {
        let value = json!({"items": [{"id": 1}], "total": 17});
        let page = parse_page_payload(&value).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.total, 17);
    }

    #[test]
    fn test_parse_legacy_logs_key() {
        let value = json!({"logs": [{"id": 1}], "total_count": 3});
        let page = parse_page_payload(&value).unwrap();
        assert_eq!(page.total, 3);
    }

    #[test]
    fn test_parse_rejects_scalar_payload() {
        assert!(matches!(
            parse_page_payload(&json!(42)),
            Err(SyncError::Parse(_))
        ));
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, String::new(), Some("7")),
            SyncError::NotFound { id } if id == "7"
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "bad field".to_string(), None),
            SyncError::Validation(detail) if detail == "bad field"
        ));
        assert!(matches!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, "invalid".to_string(), None),
            SyncError::Validation(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, String::new(), None),
            SyncError::Transport(_)
        ));
    }

    #[test]
    fn test_url_building() {
        let api = HttpLogApi::new("http://localhost:8000/").unwrap();
        assert_eq!(api.logs_url(), "http://localhost:8000/api/logs");
        assert_eq!(api.entry_url("12"), "http://localhost:8000/api/logs/12");
    }
}
