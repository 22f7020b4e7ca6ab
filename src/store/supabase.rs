use async_trait::async_trait;
use reqwest::header::CONTENT_RANGE;
use reqwest::{Client, Method, Request, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, instrument, warn};

use super::{Store, StoreError};
use crate::model::{NewSource, Post, PostStatus, QueueEntry, RowId, Source};

const REST_PATH: &str = "rest/v1/";

const POSTS: &str = "posts";
const SOURCES: &str = "sources";
const QUEUE: &str = "queue";

/// PostgREST client for the hosted Supabase project.
#[derive(Clone)]
pub struct SupabaseStore {
    http: Client,
    base_url: Url,
    key: String,
}

impl fmt::Debug for SupabaseStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseStore")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl SupabaseStore {
    /// `project_url` is the project root, e.g. `https://abc.supabase.co`.
    pub fn new(project_url: &str, key: String) -> Result<Self, StoreError> {
        let mut base_url =
            Url::parse(project_url.trim()).map_err(|err| StoreError::Url(err.to_string()))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder()
            .user_agent(concat!("content-admin/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url,
            key,
        })
    }

    fn endpoint(&self, table: &str) -> Result<Url, StoreError> {
        self.base_url
            .join(REST_PATH)
            .and_then(|rest| rest.join(table))
            .map_err(|err| StoreError::Url(err.to_string()))
    }

    /// Request builder for `table` carrying the project credentials.
    pub fn request(&self, method: Method, table: &str) -> Result<reqwest::RequestBuilder, StoreError> {
        Ok(self
            .http
            .request(method, self.endpoint(table)?)
            .header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", self.key)))
    }

    pub fn build_count_posts(&self, status: Option<PostStatus>) -> Result<Request, StoreError> {
        let mut req = self
            .request(Method::HEAD, POSTS)?
            .header("Prefer", "count=exact")
            .query(&[("select", "*")]);
        if let Some(status) = status {
            req = req.query(&[("status", format!("eq.{}", status.as_str()))]);
        }
        Ok(req.build()?)
    }

    pub fn build_list_posts(&self, status: PostStatus, limit: usize) -> Result<Request, StoreError> {
        Ok(self
            .request(Method::GET, POSTS)?
            .query(&[
                ("select", "*".to_string()),
                ("status", format!("eq.{}", status.as_str())),
                ("order", "created_at.desc".to_string()),
                ("limit", limit.to_string()),
            ])
            .build()?)
    }

    pub fn build_update_status(&self, id: &RowId, status: PostStatus) -> Result<Request, StoreError> {
        Ok(self
            .request(Method::PATCH, POSTS)?
            .header("Prefer", "return=minimal")
            .query(&[("id", format!("eq.{}", id))])
            .json(&json!({ "status": status.as_str() }))
            .build()?)
    }

    pub fn build_insert_source(&self, source: &NewSource) -> Result<Request, StoreError> {
        Ok(self
            .request(Method::POST, SOURCES)?
            .header("Prefer", "return=representation")
            .json(&[source])
            .build()?)
    }

    async fn execute(&self, request: Request) -> Result<Response, StoreError> {
        debug!(method = %request.method(), url = %request.url(), "store request");
        let res = self.http.execute(request).await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, %body, "store request rejected");
            return Err(api_error(status, &body));
        }
        Ok(res)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: Request) -> Result<T, StoreError> {
        let res = self.execute(request).await?;
        let body = res.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Prefer the PostgREST `message` field; fall back to the raw body, then the
/// status reason.
fn api_error(status: StatusCode, body: &str) -> StoreError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_owned))
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
    StoreError::Api {
        status: status.as_u16(),
        message,
    }
}

/// Total from a `Content-Range` header such as `0-24/3573` or `*/0`.
fn parse_content_range(header: Option<&str>) -> Result<u64, StoreError> {
    let raw = header.ok_or(StoreError::Empty("Content-Range header"))?;
    raw.rsplit_once('/')
        .and_then(|(_, total)| total.trim().parse().ok())
        .ok_or_else(|| StoreError::InvalidRow(format!("unparsable Content-Range '{}'", raw)))
}

#[async_trait]
impl Store for SupabaseStore {
    #[instrument(skip_all)]
    async fn count_posts(&self, status: Option<PostStatus>) -> Result<u64, StoreError> {
        let res = self.execute(self.build_count_posts(status)?).await?;
        parse_content_range(
            res.headers()
                .get(CONTENT_RANGE)
                .and_then(|h| h.to_str().ok()),
        )
    }

    #[instrument(skip_all)]
    async fn list_posts(&self, status: PostStatus, limit: usize) -> Result<Vec<Post>, StoreError> {
        self.fetch(self.build_list_posts(status, limit)?).await
    }

    #[instrument(skip_all)]
    async fn update_post_status(&self, id: &RowId, status: PostStatus) -> Result<(), StoreError> {
        self.execute(self.build_update_status(id, status)?).await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn enqueue(&self, entry: &QueueEntry) -> Result<(), StoreError> {
        let request = self
            .request(Method::POST, QUEUE)?
            .header("Prefer", "return=minimal")
            .json(&[entry])
            .build()?;
        self.execute(request).await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn list_queue(&self) -> Result<Vec<QueueEntry>, StoreError> {
        let request = self
            .request(Method::GET, QUEUE)?
            .query(&[("select", "*"), ("order", "scheduled_for.asc")])
            .build()?;
        self.fetch(request).await
    }

    #[instrument(skip_all)]
    async fn insert_source(&self, source: &NewSource) -> Result<Source, StoreError> {
        let rows: Vec<Source> = self.fetch(self.build_insert_source(source)?).await?;
        rows.into_iter().next().ok_or(StoreError::Empty("sources insert"))
    }

    #[instrument(skip_all)]
    async fn list_sources(&self) -> Result<Vec<Source>, StoreError> {
        let request = self
            .request(Method::GET, SOURCES)?
            .query(&[("select", "*")])
            .build()?;
        self.fetch(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SupabaseStore {
        SupabaseStore::new("https://demo.supabase.co", "secret".into()).unwrap()
    }

    fn header<'a>(req: &'a Request, name: &str) -> &'a str {
        req.headers()
            .get(name)
            .and_then(|h| h.to_str().ok())
            .unwrap()
    }

    fn query_pairs(req: &Request) -> Vec<(String, String)> {
        req.url().query_pairs().into_owned().collect()
    }

    #[test]
    fn request_sets_credentials() {
        let req = store()
            .request(Method::GET, "sources")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(req.url().path(), "/rest/v1/sources");
        assert_eq!(header(&req, "apikey"), "secret");
        assert_eq!(header(&req, "Authorization"), "Bearer secret");
    }

    #[test]
    fn project_path_is_preserved() {
        let store = SupabaseStore::new("http://localhost:54321/proxy", "k".into()).unwrap();
        let req = store.build_list_posts(PostStatus::Pending, 20).unwrap();
        assert_eq!(req.url().path(), "/proxy/rest/v1/posts");
    }

    #[test]
    fn count_uses_head_and_exact_count() {
        let req = store().build_count_posts(Some(PostStatus::Published)).unwrap();
        assert_eq!(req.method(), Method::HEAD);
        assert_eq!(header(&req, "Prefer"), "count=exact");
        assert!(query_pairs(&req).contains(&("status".into(), "eq.published".into())));

        let req = store().build_count_posts(None).unwrap();
        assert!(!query_pairs(&req).iter().any(|(k, _)| k == "status"));
    }

    #[test]
    fn pending_listing_is_ordered_and_limited() {
        let req = store().build_list_posts(PostStatus::Pending, 20).unwrap();
        let pairs = query_pairs(&req);
        assert!(pairs.contains(&("status".into(), "eq.pending".into())));
        assert!(pairs.contains(&("order".into(), "created_at.desc".into())));
        assert!(pairs.contains(&("limit".into(), "20".into())));
    }

    #[test]
    fn status_update_targets_one_id() {
        let req = store()
            .build_update_status(&RowId::Int(42), PostStatus::Approved)
            .unwrap();
        assert_eq!(req.method(), Method::PATCH);
        assert!(query_pairs(&req).contains(&("id".into(), "eq.42".into())));
        let body = req.body().and_then(|b| b.as_bytes()).unwrap();
        let json: Value = serde_json::from_slice(body).unwrap();
        assert_eq!(json, json!({ "status": "approved" }));
    }

    #[test]
    fn source_insert_asks_for_representation() {
        let source = NewSource {
            username: "@feed".into(),
            category: "news".into(),
            is_active: true,
        };
        let req = store().build_insert_source(&source).unwrap();
        assert_eq!(header(&req, "Prefer"), "return=representation");
        let body = req.body().and_then(|b| b.as_bytes()).unwrap();
        let json: Value = serde_json::from_slice(body).unwrap();
        assert_eq!(json[0]["username"], "@feed");
        assert_eq!(json[0]["is_active"], true);
    }

    #[test]
    fn content_range_totals() {
        assert_eq!(parse_content_range(Some("0-24/3573")).unwrap(), 3573);
        assert_eq!(parse_content_range(Some("*/0")).unwrap(), 0);
        assert!(parse_content_range(Some("0-24/*")).is_err());
        assert!(matches!(parse_content_range(None), Err(StoreError::Empty(_))));
    }

    #[test]
    fn api_error_prefers_postgrest_message() {
        let err = api_error(
            StatusCode::CONFLICT,
            r#"{"code":"23505","message":"duplicate key value violates unique constraint"}"#,
        );
        assert_eq!(
            err.to_string(),
            "store returned 409: duplicate key value violates unique constraint"
        );

        let err = api_error(StatusCode::BAD_GATEWAY, "");
        assert_eq!(err.to_string(), "store returned 502: Bad Gateway");
    }
}
