//! Entity kinds and the write payloads handed to the mutation pipeline.

use std::fmt;
use std::path::Path;

use bytes::Bytes;
use patisserie_records::PRODUCT_IMAGES_COLUMN;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Entity families managed through the admin panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Product,
    Category,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Product => "product",
            EntityKind::Category => "category",
        }
    }

    /// Column that stores attachment references, if this kind carries any.
    pub fn attachment_column(self) -> Option<&'static str> {
        match self {
            EntityKind::Product => Some(PRODUCT_IMAGES_COLUMN),
            EntityKind::Category => None,
        }
    }

    /// Whether a persisted row must reference at least one image.
    pub fn requires_images(self) -> bool {
        self.attachment_column().is_some()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file selected for upload that has not reached object storage yet.
#[derive(Clone, PartialEq, Eq)]
pub struct PendingBlob {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl PendingBlob {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Build a blob whose MIME type is guessed from the file extension.
    pub fn from_file_name(file_name: impl Into<String>, bytes: Bytes) -> Self {
        let file_name = file_name.into();
        let content_type = mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self {
            file_name,
            content_type,
            bytes,
        }
    }

    /// Extension used for the stored object name.
    ///
    /// Taken from the file name when present, otherwise derived from the MIME type.
    pub fn extension(&self) -> String {
        let from_name = Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.trim_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty());

        from_name
            .or_else(|| {
                mime_guess::get_mime_extensions_str(&self.content_type)
                    .and_then(|exts| exts.first())
                    .map(|ext| (*ext).to_string())
            })
            .unwrap_or_else(|| "bin".to_string())
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

impl fmt::Debug for PendingBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingBlob")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}

/// One entry of an entity's attachment list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    /// Reference already stored on the row (a public URL).
    Persisted(String),
    /// Binary content that must be uploaded before the row is written.
    Pending(PendingBlob),
}

impl Attachment {
    pub fn is_pending(&self) -> bool {
        matches!(self, Attachment::Pending(_))
    }
}

/// Validated write request for one entity.
///
/// `fields` holds the structured columns exactly as they will be written;
/// attachments are resolved into the kind's attachment column by the pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityPayload {
    pub fields: Map<String, Value>,
    pub attachments: Vec<Attachment>,
}

impl EntityPayload {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Split attachments into stored references and blobs awaiting upload, preserving order.
    pub fn partition_attachments(&self) -> (Vec<String>, Vec<PendingBlob>) {
        let mut persisted = Vec::new();
        let mut pending = Vec::new();
        for attachment in &self.attachments {
            match attachment {
                Attachment::Persisted(reference) => persisted.push(reference.clone()),
                Attachment::Pending(blob) => pending.push(blob.clone()),
            }
        }
        (persisted, pending)
    }
}
