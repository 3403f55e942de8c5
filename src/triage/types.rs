use super::TriageError;
use crate::evidence::TimeRange;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where a reply to the reporter should be posted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyContext {
    pub conversation_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Attachment {
    /// A HAR file on disk
    Capture { path: PathBuf },
    /// Pasted or extracted text, e.g. a log snippet
    Text { name: String, content: String },
}

/// A support ticket as handed to triage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub subject: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Pod of the reporting account, when known
    #[serde(default)]
    pub pod: Option<String>,
    pub created_at: DateTime<Utc>,
    /// When the reporter says the issue happened
    #[serde(default)]
    pub issue_window: Option<TimeRange>,
    #[serde(default)]
    pub reply_context: Option<ReplyContext>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Ticket {
    pub fn new(
        id: impl Into<String>,
        subject: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            description: String::new(),
            account_id: None,
            email: None,
            pod: None,
            created_at,
            issue_window: None,
            reply_context: None,
            attachments: Vec::new(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, TriageError> {
        let content = std::fs::read_to_string(path).map_err(|e| TriageError::Io {
            source: e,
            context: format!("{:?}", path),
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Subject and description, used for keyword matching
    pub fn summary_text(&self) -> String {
        format!("{}\n{}", self.subject, self.description)
    }

    /// Everything a reporter typed or pasted, used for link detection
    pub fn full_text(&self) -> String {
        let mut text = self.summary_text();
        for attachment in &self.attachments {
            if let Attachment::Text { content, .. } = attachment {
                text.push('\n');
                text.push_str(content);
            }
        }
        text
    }

    pub fn capture_paths(&self) -> impl Iterator<Item = &Path> {
        self.attachments.iter().filter_map(|a| match a {
            Attachment::Capture { path } => Some(path.as_path()),
            Attachment::Text { .. } => None,
        })
    }
}
