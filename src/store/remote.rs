use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{CREATE_TABLE, CounterStore, SELECT_VIEWS, UPSERT_VIEWS, to_count};
use crate::error::StoreError;

// libSQL server over its HTTP pipeline API (POST /v2/pipeline)
pub struct RemoteStore {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct PipelineResponse {
    results: Vec<PipelineResult>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum PipelineResult {
    Ok { response: StreamResponse },
    Error { error: RemoteError },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum StreamResponse {
    Execute { result: StatementResult },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct StatementResult {
    rows: Vec<Vec<RemoteValue>>,
}

#[derive(Deserialize)]
struct RemoteError {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

// integers travel as strings to keep 64-bit precision
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RemoteValue {
    Null,
    Integer { value: String },
    Float,
    Text { value: String },
    Blob,
}

impl RemoteValue {
    fn as_i64(&self) -> Result<i64, StoreError> {
        match self {
            RemoteValue::Integer { value } | RemoteValue::Text { value } => value
                .parse()
                .map_err(|_| StoreError::Protocol(format!("views is not an integer: {value:?}"))),
            other => Err(StoreError::Protocol(format!("views is not an integer: {other:?}"))),
        }
    }
}

impl RemoteStore {
    pub fn new(url: &str, token: Option<&str>, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/v2/pipeline", base_url(url)),
            token: token.map(str::to_string),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.execute(CREATE_TABLE, &[]).await.map(|_| ())
    }

    // Runs one statement and returns its first row, if any
    async fn execute(&self, sql: &str, args: &[&str]) -> Result<Option<Vec<RemoteValue>>, StoreError> {
        let args: Vec<_> = args
            .iter()
            .map(|value| json!({ "type": "text", "value": value }))
            .collect();
        let body = json!({
            "requests": [
                { "type": "execute", "stmt": { "sql": sql, "args": args } },
                { "type": "close" }
            ]
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response: PipelineResponse = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match response.results.into_iter().next() {
            Some(PipelineResult::Ok {
                response: StreamResponse::Execute { result },
            }) => Ok(result.rows.into_iter().next()),
            Some(PipelineResult::Ok { .. }) => {
                Err(StoreError::Protocol("expected an execute result".to_string()))
            }
            Some(PipelineResult::Error { error }) => Err(StoreError::Remote(match error.code {
                Some(code) => format!("{code}: {}", error.message),
                None => error.message,
            })),
            None => Err(StoreError::Protocol("empty pipeline response".to_string())),
        }
    }
}

fn base_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    match url.strip_prefix("libsql://") {
        Some(host) => format!("https://{host}"),
        None => url.to_string(),
    }
}

fn first_count(row: Option<Vec<RemoteValue>>) -> Result<Option<u64>, StoreError> {
    match row.as_deref().and_then(<[RemoteValue]>::first) {
        Some(value) => to_count(value.as_i64()?).map(Some),
        None => Ok(None),
    }
}

#[async_trait]
impl CounterStore for RemoteStore {
    async fn read(&self, key: &str) -> Result<u64, StoreError> {
        let row = self.execute(SELECT_VIEWS, &[key]).await?;
        Ok(first_count(row)?.unwrap_or(0))
    }

    async fn increment_and_read(&self, key: &str) -> Result<u64, StoreError> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let row = self.execute(UPSERT_VIEWS, &[key, now.as_str()]).await?;
        first_count(row)?
            .ok_or_else(|| StoreError::Protocol("upsert returned no row".to_string()))
    }

    fn kind(&self) -> &'static str {
        "libsql"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn execute_ok(rows: serde_json::Value) -> serde_json::Value {
        json!({
            "baton": null,
            "base_url": null,
            "results": [
                {
                    "type": "ok",
                    "response": {
                        "type": "execute",
                        "result": {
                            "cols": [{ "name": "views", "decltype": "INTEGER" }],
                            "rows": rows,
                            "affected_row_count": 1,
                            "last_insert_rowid": null
                        }
                    }
                },
                { "type": "ok", "response": { "type": "close" } }
            ]
        })
    }

    async fn store_for(server: &MockServer) -> RemoteStore {
        RemoteStore::new(&server.uri(), Some("secret"), Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn libsql_scheme_maps_to_https() {
        assert_eq!(base_url("libsql://views-db.turso.io"), "https://views-db.turso.io");
        assert_eq!(base_url("http://127.0.0.1:8080/"), "http://127.0.0.1:8080");
    }

    #[tokio::test]
    async fn increment_sends_upsert_and_parses_count() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/pipeline"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(execute_ok(json!([[{ "type": "integer", "value": "7" }]]))),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        assert_eq!(store.increment_and_read("blog:hello").await.unwrap(), 7);

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = requests[0].body_json().unwrap();
        let stmt = &body["requests"][0]["stmt"];
        assert!(stmt["sql"].as_str().unwrap().contains("ON CONFLICT(slug)"));
        assert_eq!(stmt["args"][0]["value"], "blog:hello");
        assert_eq!(body["requests"][1]["type"], "close");
    }

    #[tokio::test]
    async fn read_of_absent_slug_is_zero() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/pipeline"))
            .respond_with(ResponseTemplate::new(200).set_body_json(execute_ok(json!([]))))
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        assert_eq!(store.read("blog:nobody").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn statement_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/pipeline"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    { "type": "error", "error": { "message": "no such table: page_views", "code": "SQLITE_UNKNOWN" } },
                    { "type": "ok", "response": { "type": "close" } }
                ]
            })))
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        let err = store.read("blog:a").await.unwrap_err();
        assert!(matches!(err, StoreError::Remote(ref msg) if msg.contains("no such table")));
    }

    #[tokio::test]
    async fn http_failure_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        assert!(matches!(
            store.increment_and_read("blog:a").await,
            Err(StoreError::Http(_))
        ));
    }

    #[tokio::test]
    async fn timeout_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(execute_ok(json!([])))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let store = RemoteStore::new(&server.uri(), None, Duration::from_millis(100)).unwrap();
        assert!(matches!(store.read("blog:a").await, Err(StoreError::Http(_))));
    }
}
