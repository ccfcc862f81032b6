use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What is being published: a wiki page or a social post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentBody {
    #[serde(rename_all = "camelCase")]
    Page {
        title: String,
        body: String,
        space_key: String,
        parent_page_id: Option<i64>,
    },
    Post { text: String },
}

impl ContentBody {
    /// Storage discriminator for the `content.kind` column.
    pub fn kind(&self) -> &'static str {
        match self {
            ContentBody::Page { .. } => "page",
            ContentBody::Post { .. } => "post",
        }
    }

    /// Short human label for logs.
    pub fn label(&self) -> &str {
        match self {
            ContentBody::Page { title, .. } => title,
            ContentBody::Post { text } => text,
        }
    }
}

/// A persisted page or post.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub id: i64,
    #[serde(flatten)]
    pub body: ContentBody,
    /// Display order is preserved; duplicates are allowed.
    pub attachment_ids: Vec<i64>,
    /// Set when the first publish attempt starts.
    pub locked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for [`crate::ContentStore::create`].
///
/// `title` selects a page (which then needs `body` and a space key); `text`
/// alone selects a post.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContent {
    pub title: Option<String>,
    pub body: Option<String>,
    pub text: Option<String>,
    pub space_key: Option<String>,
    pub parent_page_id: Option<i64>,
    #[serde(default)]
    pub attachment_ids: Vec<i64>,
}

impl NewContent {
    pub fn page(title: &str, body: &str, space_key: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            body: Some(body.to_string()),
            space_key: Some(space_key.to_string()),
            ..Default::default()
        }
    }

    pub fn post(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    pub fn with_attachments(mut self, ids: Vec<i64>) -> Self {
        self.attachment_ids = ids;
        self
    }
}

/// Metadata for an uploaded file. The bytes live at `storage_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: i64,
    /// Original client-supplied file name.
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    pub storage_path: String,
    /// Alt text / description shown next to the file.
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}
