use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{Filter, Row, StoreError, StoreResult, TableStore};

/// Postgres error code for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

/// Table store backed by a Supabase project's PostgREST endpoint
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    http: Client,
    rest_url: String,
    key: String,
}

/// Error body PostgREST sends with non-2xx responses
#[derive(Debug, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

impl SupabaseStore {
    /// Create a client for the project at `url` using API key `key`
    pub fn new(url: impl AsRef<str>, key: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url, key)
    }

    pub fn with_client(http: Client, url: impl AsRef<str>, key: impl Into<String>) -> Self {
        Self {
            http,
            rest_url: format!("{}/rest/v1", url.as_ref().trim_end_matches('/')),
            key: key.into(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.rest_url, table)
    }

    fn request(&self, method: Method, table: &str, filters: &[Filter]) -> RequestBuilder {
        self.http
            .request(method, self.table_url(table))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .query(&filter_params(filters))
    }

    fn returning(builder: RequestBuilder) -> RequestBuilder {
        builder.header("Prefer", "return=representation")
    }

    fn select_request(&self, table: &str, filters: &[Filter]) -> RequestBuilder {
        self.request(Method::GET, table, filters).query(&[("select", "*")])
    }

    fn insert_request(&self, table: &str, row: &Row) -> RequestBuilder {
        Self::returning(self.request(Method::POST, table, &[])).json(row)
    }

    fn update_request(&self, table: &str, filters: &[Filter], patch: &Row) -> RequestBuilder {
        Self::returning(self.request(Method::PATCH, table, filters)).json(patch)
    }

    fn delete_request(&self, table: &str, filters: &[Filter]) -> RequestBuilder {
        Self::returning(self.request(Method::DELETE, table, filters))
    }

    fn ping_request(&self) -> RequestBuilder {
        self.http
            .get(format!("{}/", self.rest_url))
            .header("apikey", &self.key)
            .header(header::ACCEPT, "application/openapi+json")
            .bearer_auth(&self.key)
    }

    async fn rows(response: Response) -> StoreResult<Vec<Row>> {
        let response = check_status(response).await?;
        let bytes = response.bytes().await?;
        let body: Value = serde_json::from_slice(&bytes)?;
        match body {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(row) => Ok(row),
                    other => Err(StoreError::Malformed(format!("expected row object, got {}", other))),
                })
                .collect(),
            other => Err(StoreError::Malformed(format!("expected row array, got {}", other))),
        }
    }
}

/// Encode equality filters the way PostgREST expects them: `column=eq.value`
fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|f| {
            let operand = match &f.value {
                Value::Null => "is.null".to_string(),
                Value::String(s) => format!("eq.{}", s),
                other => format!("eq.{}", other),
            };
            (f.column.clone(), operand)
        })
        .collect()
}

async fn check_status(response: Response) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    Err(classify_failure(status, &text))
}

fn classify_failure(status: StatusCode, body: &str) -> StoreError {
    let parsed: Option<PostgrestError> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|e| e.message.clone().or_else(|| e.details.clone()))
        .unwrap_or_else(|| body.to_string());

    let unique = parsed
        .as_ref()
        .and_then(|e| e.code.as_deref())
        .map(|code| code == UNIQUE_VIOLATION)
        .unwrap_or(false);

    if unique || status == StatusCode::CONFLICT {
        StoreError::UniqueViolation(message)
    } else {
        warn!("Store rejected request with {}: {}", status, message);
        StoreError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl TableStore for SupabaseStore {
    async fn select(&self, table: &str, filters: &[Filter]) -> StoreResult<Vec<Row>> {
        debug!("select {} where {:?}", table, filters);
        let response = self.select_request(table, filters).send().await?;
        Self::rows(response).await
    }

    async fn insert(&self, table: &str, row: Row) -> StoreResult<Row> {
        debug!("insert into {}", table);
        let response = self.insert_request(table, &row).send().await?;
        Self::rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Malformed(format!("insert into {} returned no rows", table)))
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> StoreResult<Vec<Row>> {
        if filters.is_empty() {
            return Err(StoreError::Unfiltered);
        }
        debug!("update {} where {:?}", table, filters);
        let response = self.update_request(table, filters, &patch).send().await?;
        Self::rows(response).await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> StoreResult<Vec<Row>> {
        if filters.is_empty() {
            return Err(StoreError::Unfiltered);
        }
        debug!("delete from {} where {:?}", table, filters);
        let response = self.delete_request(table, filters).send().await?;
        Self::rows(response).await
    }

    async fn ping(&self) -> StoreResult<()> {
        let response = self.ping_request().send().await?;
        check_status(response).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SupabaseStore {
        SupabaseStore::new("https://abc.supabase.co", "service-key")
    }

    fn query(request: &reqwest::Request) -> Vec<(String, String)> {
        request.url().query_pairs().into_owned().collect()
    }

    fn json_body(request: &reqwest::Request) -> Value {
        let bytes = request.body().and_then(|b| b.as_bytes()).unwrap();
        serde_json::from_slice(bytes).unwrap()
    }

    fn assert_authenticated(request: &reqwest::Request) {
        assert_eq!(request.headers()["apikey"], "service-key");
        assert_eq!(request.headers()[header::AUTHORIZATION], "Bearer service-key");
    }

    fn row(value: Value) -> Row {
        match value {
            Value::Object(row) => row,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_select_request() {
        let request = store()
            .select_request("products", &[Filter::eq("id", 7)])
            .build()
            .unwrap();

        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.url().path(), "/rest/v1/products");
        assert_eq!(
            query(&request),
            vec![("id".into(), "eq.7".into()), ("select".into(), "*".into())]
        );
        assert_authenticated(&request);
        assert!(request.headers().get("Prefer").is_none());
        assert!(request.body().is_none());
    }

    #[test]
    fn test_insert_request() {
        let request = store()
            .insert_request("users", &row(json!({"username": "alice"})))
            .build()
            .unwrap();

        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.url().as_str(), "https://abc.supabase.co/rest/v1/users");
        assert_authenticated(&request);
        assert_eq!(request.headers()["Prefer"], "return=representation");
        assert_eq!(request.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(json_body(&request), json!({"username": "alice"}));
    }

    #[test]
    fn test_update_request_carries_the_stock_guard() {
        let request = store()
            .update_request(
                "products",
                &[Filter::eq("id", 3), Filter::eq("stock", 5)],
                &row(json!({"stock": 2})),
            )
            .build()
            .unwrap();

        assert_eq!(request.method(), Method::PATCH);
        assert_eq!(request.url().path(), "/rest/v1/products");
        assert_eq!(
            query(&request),
            vec![("id".into(), "eq.3".into()), ("stock".into(), "eq.5".into())]
        );
        assert_authenticated(&request);
        assert_eq!(request.headers()["Prefer"], "return=representation");
        assert_eq!(json_body(&request), json!({"stock": 2}));
    }

    #[test]
    fn test_delete_request() {
        let request = store()
            .delete_request("products", &[Filter::eq("id", 3)])
            .build()
            .unwrap();

        assert_eq!(request.method(), Method::DELETE);
        assert_eq!(query(&request), vec![("id".into(), "eq.3".into())]);
        assert_authenticated(&request);
        assert_eq!(request.headers()["Prefer"], "return=representation");
        assert!(request.body().is_none());
    }

    #[test]
    fn test_ping_request() {
        let request = store().ping_request().build().unwrap();

        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.url().as_str(), "https://abc.supabase.co/rest/v1/");
        assert_eq!(request.headers()[header::ACCEPT], "application/openapi+json");
        assert_authenticated(&request);
    }

    #[test]
    fn test_filter_values_are_url_encoded() {
        let request = store()
            .select_request("users", &[Filter::eq("username", "a&b c")])
            .build()
            .unwrap();

        assert!(request.url().query().unwrap().starts_with("username=eq.a%26b+c"));
        assert_eq!(query(&request)[0], ("username".into(), "eq.a&b c".into()));
    }

    #[tokio::test]
    async fn test_update_and_delete_refuse_to_run_unfiltered() {
        let store = store();
        assert!(matches!(
            store.update("products", &[], Row::new()).await,
            Err(StoreError::Unfiltered)
        ));
        assert!(matches!(store.delete("products", &[]).await, Err(StoreError::Unfiltered)));
    }

    #[test]
    fn test_rest_url_normalisation() {
        let store = SupabaseStore::new("https://abc.supabase.co/", "key");
        assert_eq!(store.table_url("products"), "https://abc.supabase.co/rest/v1/products");
    }

    #[test]
    fn test_filter_encoding() {
        let params = filter_params(&[
            Filter::eq("id", 7),
            Filter::eq("username", "alice"),
            Filter::eq("deleted_at", Value::Null),
        ]);
        assert_eq!(
            params,
            vec![
                ("id".to_string(), "eq.7".to_string()),
                ("username".to_string(), "eq.alice".to_string()),
                ("deleted_at".to_string(), "is.null".to_string()),
            ]
        );
    }

    #[test]
    fn test_unique_violation_is_classified() {
        let body = r#"{"code":"23505","message":"duplicate key value violates unique constraint \"users_username_key\""}"#;
        let err = classify_failure(StatusCode::CONFLICT, body);
        assert!(matches!(err, StoreError::UniqueViolation(msg) if msg.contains("users_username_key")));
    }

    #[test]
    fn test_other_failures_are_rejections() {
        let body = r#"{"code":"42P01","message":"relation \"public.nope\" does not exist"}"#;
        match classify_failure(StatusCode::NOT_FOUND, body) {
            StoreError::Rejected { status, message } => {
                assert_eq!(status, 404);
                assert!(message.contains("does not exist"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_non_json_failure_body_is_kept() {
        match classify_failure(StatusCode::BAD_GATEWAY, "upstream timed out") {
            StoreError::Rejected { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "upstream timed out");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
