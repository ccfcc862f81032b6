//! Confluence REST client for Server, Data Center and Atlassian Cloud.
//!
//! Publishing is an upsert keyed by space and title: an existing page gets a
//! new version, otherwise a page is created under the optional parent. The
//! upsert is what keeps a retried attempt from creating a second page.

use std::time::Duration;

use async_trait::async_trait;
use herald_content::{Attachment, ContentBody};
use herald_core::config::ConfluenceConfig;
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{ProviderError, Result};
use crate::provider::{Provider, PublishRequest, PublishResult};

pub struct ConfluenceProvider {
    client: reqwest::Client,
    auth: Auth,
    base_url: String,
}

/// Personal access tokens go out as bearer tokens. Cloud accounts send
/// `username:api_token` as Basic auth.
#[derive(Debug, Clone)]
enum Auth {
    Bearer(String),
    Basic { username: String, api_token: String },
}

impl Auth {
    fn from_config(config: &ConfluenceConfig) -> Self {
        match config.username.as_deref().map(str::trim) {
            Some(username) if !username.is_empty() => Auth::Basic {
                username: username.to_string(),
                api_token: config.api_token.clone(),
            },
            _ => Auth::Bearer(config.api_token.clone()),
        }
    }

    fn apply(&self, req: RequestBuilder) -> RequestBuilder {
        match self {
            Auth::Bearer(token) => req.bearer_auth(token),
            Auth::Basic { username, api_token } => req.basic_auth(username, Some(api_token)),
        }
    }
}

impl ConfluenceProvider {
    pub fn new(config: &ConfluenceConfig) -> Result<Self> {
        let base_url = normalize_base_url(&config.base_url)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let auth = Auth::from_config(config);
        debug!(
            basic = matches!(auth, Auth::Basic { .. }),
            "confluence: client configured"
        );
        Ok(Self {
            client,
            auth,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api(&self, path: &str) -> String {
        format!("{}/rest/api{}", self.base_url, path)
    }

    fn page_url(&self, page_id: &str) -> String {
        format!("{}/pages/viewpage.action?pageId={}", self.base_url, page_id)
    }

    async fn find_page(&self, space_key: &str, title: &str) -> std::result::Result<Option<PageRef>, CallError> {
        debug!(%space_key, %title, "confluence: searching for page");
        let req = self
            .client
            .get(self.api("/content"))
            .query(&[("spaceKey", space_key), ("title", title), ("expand", "version")]);
        let found: SearchResponse = self.call(req, "find page").await?;
        Ok(found.results.into_iter().next())
    }

    async fn create_page(
        &self,
        space_key: &str,
        title: &str,
        body: &str,
        parent_page_id: Option<i64>,
    ) -> std::result::Result<String, CallError> {
        let mut payload = json!({
            "type": "page",
            "title": title,
            "space": { "key": space_key },
            "body": { "storage": { "value": body, "representation": "storage" } },
        });
        if let Some(parent) = parent_page_id {
            payload["ancestors"] = json!([{ "id": parent.to_string() }]);
        }
        let req = self.client.post(self.api("/content")).json(&payload);
        let created: PageRef = self.call(req, "create page").await?;
        Ok(created.id)
    }

    async fn update_page(
        &self,
        page: &PageRef,
        title: &str,
        body: &str,
    ) -> std::result::Result<(), CallError> {
        let next_version = page.version.as_ref().map_or(1, |v| v.number) + 1;
        debug!(page_id = %page.id, next_version, "confluence: updating page");
        let payload = json!({
            "type": "page",
            "title": title,
            "body": { "storage": { "value": body, "representation": "storage" } },
            "version": { "number": next_version },
        });
        let req = self
            .client
            .put(self.api(&format!("/content/{}", page.id)))
            .json(&payload);
        let _: serde_json::Value = self.call(req, "update page").await?;
        Ok(())
    }

    /// Upload each attachment to the page. Failures are logged and skipped.
    async fn upload_attachments(&self, page_id: &str, attachments: &[Attachment]) -> usize {
        let mut uploaded = 0;
        for attachment in attachments {
            match self.upload_attachment(page_id, attachment).await {
                Ok(()) => uploaded += 1,
                Err(e) => warn!(
                    %page_id,
                    attachment_id = attachment.id,
                    filename = %attachment.filename,
                    error = %e.reason(),
                    "confluence: attachment upload failed"
                ),
            }
        }
        uploaded
    }

    async fn upload_attachment(&self, page_id: &str, attachment: &Attachment) -> std::result::Result<(), CallError> {
        let bytes = tokio::fs::read(&attachment.storage_path)
            .await
            .map_err(|e| CallError::Permanent(format!("cannot read {}: {e}", attachment.storage_path)))?;
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(attachment.filename.clone())
            .mime_str(&attachment.content_type)
            .map_err(|e| CallError::Permanent(e.to_string()))?;
        let mut form = reqwest::multipart::Form::new().part("file", part);
        if let Some(ref description) = attachment.description {
            form = form.text("comment", description.clone());
        }
        let req = self
            .client
            .post(self.api(&format!("/content/{page_id}/child/attachment")))
            .header("X-Atlassian-Token", "nocheck")
            .multipart(form);
        let _: serde_json::Value = self.call(req, "upload attachment").await?;
        Ok(())
    }

    /// Send an authenticated request and decode a JSON success body.
    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        req: RequestBuilder,
        operation: &str,
    ) -> std::result::Result<T, CallError> {
        let resp = self
            .auth
            .apply(req)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| CallError::from_transport(operation, &e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %text, %operation, "confluence API error");
            return Err(CallError::from_status(operation, status));
        }

        resp.json::<T>()
            .await
            .map_err(|e| CallError::Permanent(format!("{operation}: unexpected response: {e}")))
    }
}

#[async_trait]
impl Provider for ConfluenceProvider {
    fn name(&self) -> &str {
        "confluence"
    }

    async fn publish(&self, req: &PublishRequest) -> PublishResult {
        let ContentBody::Page {
            ref title,
            ref body,
            ref space_key,
            parent_page_id,
        } = req.content.body
        else {
            return PublishResult::permanent("confluence publishes pages; post content has no title");
        };

        info!(
            content_id = req.content.id,
            idempotency_key = %req.idempotency_key,
            %title,
            %space_key,
            "confluence: publishing page"
        );
        let outcome = async {
            let page_id = match self.find_page(space_key, title).await? {
                Some(existing) => {
                    self.update_page(&existing, title, body).await?;
                    existing.id
                }
                None => self.create_page(space_key, title, body, parent_page_id).await?,
            };
            Ok::<_, CallError>(page_id)
        }
        .await;

        match outcome {
            Ok(page_id) => {
                let uploaded = self.upload_attachments(&page_id, &req.attachments).await;
                info!(
                    content_id = req.content.id,
                    %page_id,
                    uploaded,
                    url = %self.page_url(&page_id),
                    "confluence: page published"
                );
                PublishResult::success(page_id, "published")
            }
            Err(e) => e.into_result(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<PageRef>,
}

#[derive(Debug, Deserialize)]
struct PageRef {
    id: String,
    version: Option<PageVersion>,
}

#[derive(Debug, Deserialize)]
struct PageVersion {
    number: u32,
}

#[derive(Debug)]
enum CallError {
    Transient(String),
    Permanent(String),
}

impl CallError {
    fn from_status(operation: &str, status: StatusCode) -> Self {
        let reason = format!("{operation}: HTTP {}", status.as_u16());
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            CallError::Transient(reason)
        } else {
            CallError::Permanent(reason)
        }
    }

    fn from_transport(operation: &str, e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            CallError::Transient(format!("{operation}: timeout"))
        } else if e.is_connect() || e.is_request() {
            CallError::Transient(format!("{operation}: {e}"))
        } else {
            CallError::Permanent(format!("{operation}: {e}"))
        }
    }

    fn reason(&self) -> &str {
        match self {
            CallError::Transient(r) | CallError::Permanent(r) => r,
        }
    }

    fn into_result(self) -> PublishResult {
        match self {
            CallError::Transient(reason) => PublishResult::transient(reason),
            CallError::Permanent(reason) => PublishResult::permanent(reason),
        }
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let mut url = raw.trim().trim_end_matches('/');
    if let Some(stripped) = url.strip_suffix("/rest/api") {
        url = stripped;
    }
    if url.is_empty() {
        return Err(ProviderError::Config(
            "confluence base_url is not configured".to_string(),
        ));
    }
    Ok(url.to_string())
}
