use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Every domain event a webhook can subscribe to.
///
/// Wire names are dotted (`post.published`); the catalog is closed so a
/// subscription to an unknown name is rejected at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookEvent {
    #[serde(rename = "post.created")]
    PostCreated,
    #[serde(rename = "post.published")]
    PostPublished,
    #[serde(rename = "post.updated")]
    PostUpdated,
    #[serde(rename = "post.deleted")]
    PostDeleted,
    #[serde(rename = "project.created")]
    ProjectCreated,
    #[serde(rename = "project.updated")]
    ProjectUpdated,
    #[serde(rename = "project.deleted")]
    ProjectDeleted,
    #[serde(rename = "comment.created")]
    CommentCreated,
    #[serde(rename = "comment.approved")]
    CommentApproved,
    #[serde(rename = "review.created")]
    ReviewCreated,
    #[serde(rename = "message.created")]
    MessageCreated,
    #[serde(rename = "user.created")]
    UserCreated,
    #[serde(rename = "backup.created")]
    BackupCreated,
    #[serde(rename = "task.failed")]
    TaskFailed,
}

/// Name sent for test deliveries of a webhook with no subscriptions.
pub const PING_EVENT: &str = "ping";

/// Catalog entry returned by `GET /api/webhooks/events`.
#[derive(Debug, Clone, Serialize)]
pub struct EventInfo {
    pub name: &'static str,
    pub description: &'static str,
}

impl WebhookEvent {
    pub const ALL: [WebhookEvent; 14] = [
        WebhookEvent::PostCreated,
        WebhookEvent::PostPublished,
        WebhookEvent::PostUpdated,
        WebhookEvent::PostDeleted,
        WebhookEvent::ProjectCreated,
        WebhookEvent::ProjectUpdated,
        WebhookEvent::ProjectDeleted,
        WebhookEvent::CommentCreated,
        WebhookEvent::CommentApproved,
        WebhookEvent::ReviewCreated,
        WebhookEvent::MessageCreated,
        WebhookEvent::UserCreated,
        WebhookEvent::BackupCreated,
        WebhookEvent::TaskFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEvent::PostCreated => "post.created",
            WebhookEvent::PostPublished => "post.published",
            WebhookEvent::PostUpdated => "post.updated",
            WebhookEvent::PostDeleted => "post.deleted",
            WebhookEvent::ProjectCreated => "project.created",
            WebhookEvent::ProjectUpdated => "project.updated",
            WebhookEvent::ProjectDeleted => "project.deleted",
            WebhookEvent::CommentCreated => "comment.created",
            WebhookEvent::CommentApproved => "comment.approved",
            WebhookEvent::ReviewCreated => "review.created",
            WebhookEvent::MessageCreated => "message.created",
            WebhookEvent::UserCreated => "user.created",
            WebhookEvent::BackupCreated => "backup.created",
            WebhookEvent::TaskFailed => "task.failed",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            WebhookEvent::PostCreated => "A blog post draft was created",
            WebhookEvent::PostPublished => "A blog post was published",
            WebhookEvent::PostUpdated => "A blog post was edited",
            WebhookEvent::PostDeleted => "A blog post was deleted",
            WebhookEvent::ProjectCreated => "A portfolio project was added",
            WebhookEvent::ProjectUpdated => "A portfolio project was edited",
            WebhookEvent::ProjectDeleted => "A portfolio project was removed",
            WebhookEvent::CommentCreated => "A visitor left a comment",
            WebhookEvent::CommentApproved => "A comment was approved for display",
            WebhookEvent::ReviewCreated => "A client review was submitted",
            WebhookEvent::MessageCreated => "A contact form message arrived",
            WebhookEvent::UserCreated => "An admin user account was created",
            WebhookEvent::BackupCreated => "A database backup finished",
            WebhookEvent::TaskFailed => "A scheduled task run failed",
        }
    }

    /// Example payload used by `test` deliveries so receivers see a
    /// realistically shaped body.
    pub fn sample_payload(&self) -> Value {
        match self {
            WebhookEvent::PostCreated
            | WebhookEvent::PostPublished
            | WebhookEvent::PostUpdated
            | WebhookEvent::PostDeleted => json!({
                "id": 1,
                "title": "Hello, world",
                "slug": "hello-world",
                "status": "published",
            }),
            WebhookEvent::ProjectCreated
            | WebhookEvent::ProjectUpdated
            | WebhookEvent::ProjectDeleted => json!({
                "id": 1,
                "title": "Sample project",
                "slug": "sample-project",
            }),
            WebhookEvent::CommentCreated | WebhookEvent::CommentApproved => json!({
                "id": 1,
                "postId": 1,
                "author": "Jane Doe",
                "content": "Great article!",
            }),
            WebhookEvent::ReviewCreated => json!({
                "id": 1,
                "author": "Jane Doe",
                "rating": 5,
                "content": "Excellent work.",
            }),
            WebhookEvent::MessageCreated => json!({
                "id": 1,
                "name": "Jane Doe",
                "email": "jane@example.com",
                "subject": "Project inquiry",
            }),
            WebhookEvent::UserCreated => json!({
                "id": 1,
                "username": "editor",
                "role": "editor",
            }),
            WebhookEvent::BackupCreated => json!({
                "file": "folio-20261016-020000.db",
                "sizeBytes": 1_048_576,
            }),
            WebhookEvent::TaskFailed => json!({
                "taskId": "00000000-0000-0000-0000-000000000000",
                "name": "Nightly backup",
                "error": "sample failure",
            }),
        }
    }

    pub fn info(&self) -> EventInfo {
        EventInfo {
            name: self.as_str(),
            description: self.description(),
        }
    }

    /// The full catalog in declaration order.
    pub fn catalog() -> Vec<EventInfo> {
        Self::ALL.iter().map(WebhookEvent::info).collect()
    }
}

impl std::fmt::Display for WebhookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WebhookEvent {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        WebhookEvent::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| format!("unknown event: {s}"))
    }
}
