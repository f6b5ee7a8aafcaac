//! Image constraints applied to blobs before they are uploaded.
//!
//! A blob can produce hard rejections (the whole mutation aborts before any
//! network call) or advisory warnings (the blob is uploaded unless the policy
//! asks for warned blobs to be dropped).

use imagesize::{ImageError, ImageSize};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::entities::PendingBlob;

pub const DEFAULT_ALLOWED_TYPES: &[&str] = &["image/webp", "image/jpeg", "image/png"];
pub const DEFAULT_PREFERRED_TYPE: &str = "image/webp";
pub const DEFAULT_MIN_DIMENSION: u32 = 500;
pub const DEFAULT_MAX_DIMENSION: u32 = 1200;

/// How a constraint violation is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintPolicy {
    /// Record an advisory warning and keep going.
    Warn,
    /// Fail the mutation before any side effect.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageIssue {
    #[error("unsupported file type `{content_type}`; accepted: {accepted}")]
    UnsupportedType {
        content_type: String,
        accepted: String,
    },
    #[error("`{content_type}` is accepted but `{preferred}` is recommended to save space")]
    NonPreferredType {
        content_type: String,
        preferred: String,
    },
    #[error("image is {width}x{height}px; minimum is {min}x{min}px")]
    TooSmall { width: u32, height: u32, min: u32 },
    #[error("image is {width}x{height}px; maximum is {max}x{max}px")]
    TooLarge { width: u32, height: u32, max: u32 },
    #[error("image dimensions could not be read: {reason}")]
    Unreadable { reason: String },
}

/// Outcome of checking one blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageInspection {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub warnings: Vec<ImageIssue>,
    pub rejections: Vec<ImageIssue>,
}

impl ImageInspection {
    pub fn is_rejected(&self) -> bool {
        !self.rejections.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty() && self.rejections.is_empty()
    }

    fn record(&mut self, policy: ConstraintPolicy, issue: ImageIssue) {
        match policy {
            ConstraintPolicy::Warn => self.warnings.push(issue),
            ConstraintPolicy::Reject => self.rejections.push(issue),
        }
    }
}

/// Configurable upload constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePolicy {
    /// MIME types accepted at all; anything else is a hard rejection.
    pub allowed_types: Vec<String>,
    /// Recommended MIME type; other allowed types are treated per `format_policy`.
    pub preferred_type: Option<String>,
    pub min_dimension: u32,
    pub max_dimension: u32,
    pub dimension_policy: ConstraintPolicy,
    pub format_policy: ConstraintPolicy,
    /// Remove warned blobs from the batch instead of uploading them.
    pub drop_warned: bool,
}

impl Default for ImagePolicy {
    fn default() -> Self {
        Self {
            allowed_types: DEFAULT_ALLOWED_TYPES
                .iter()
                .map(|value| (*value).to_string())
                .collect(),
            preferred_type: Some(DEFAULT_PREFERRED_TYPE.to_string()),
            min_dimension: DEFAULT_MIN_DIMENSION,
            max_dimension: DEFAULT_MAX_DIMENSION,
            dimension_policy: ConstraintPolicy::Warn,
            format_policy: ConstraintPolicy::Warn,
            drop_warned: false,
        }
    }
}

impl From<&crate::config::ImageSettings> for ImagePolicy {
    fn from(settings: &crate::config::ImageSettings) -> Self {
        Self {
            allowed_types: settings.allowed_types.clone(),
            preferred_type: settings.preferred_type.clone(),
            min_dimension: settings.min_dimension,
            max_dimension: settings.max_dimension,
            dimension_policy: settings.dimension_policy,
            format_policy: settings.format_policy,
            drop_warned: settings.drop_warned,
        }
    }
}

impl ImagePolicy {
    pub fn inspect(&self, blob: &PendingBlob) -> ImageInspection {
        let mut inspection = ImageInspection::default();
        let content_type = blob.content_type.to_ascii_lowercase();

        if !self.allowed_types.iter().any(|allowed| *allowed == content_type) {
            inspection.rejections.push(ImageIssue::UnsupportedType {
                content_type,
                accepted: self.allowed_types.join(", "),
            });
            return inspection;
        }

        if let Some(preferred) = self.preferred_type.as_deref()
            && preferred != content_type
        {
            inspection.record(
                self.format_policy,
                ImageIssue::NonPreferredType {
                    content_type: content_type.clone(),
                    preferred: preferred.to_string(),
                },
            );
        }

        match probe(&blob.bytes) {
            Ok((width, height)) => {
                inspection.width = Some(width);
                inspection.height = Some(height);
                if width < self.min_dimension || height < self.min_dimension {
                    inspection.record(
                        self.dimension_policy,
                        ImageIssue::TooSmall {
                            width,
                            height,
                            min: self.min_dimension,
                        },
                    );
                } else if width > self.max_dimension || height > self.max_dimension {
                    inspection.record(
                        self.dimension_policy,
                        ImageIssue::TooLarge {
                            width,
                            height,
                            max: self.max_dimension,
                        },
                    );
                }
            }
            Err(reason) => {
                inspection.record(self.dimension_policy, ImageIssue::Unreadable { reason });
            }
        }

        inspection
    }
}

fn probe(bytes: &[u8]) -> Result<(u32, u32), String> {
    let ImageSize { width, height } = match imagesize::blob_size(bytes) {
        Ok(size) => size,
        Err(ImageError::NotSupported) => return Err("unsupported image format".to_string()),
        Err(ImageError::CorruptedImage) => return Err("corrupted image".to_string()),
        Err(ImageError::IoError(err)) => return Err(err.to_string()),
    };
    let width = u32::try_from(width).map_err(|_| "width out of range".to_string())?;
    let height = u32::try_from(height).map_err(|_| "height out of range".to_string())?;
    Ok((width, height))
}

/// Minimal PNG header carrying only the IHDR dimensions, enough for probing.
#[cfg(test)]
pub(crate) fn png_header(width: u32, height: u32) -> bytes::Bytes {
    let mut data = Vec::with_capacity(33);
    data.extend_from_slice(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    data.extend_from_slice(&13u32.to_be_bytes());
    data.extend_from_slice(b"IHDR");
    data.extend_from_slice(&width.to_be_bytes());
    data.extend_from_slice(&height.to_be_bytes());
    data.extend_from_slice(&[8, 6, 0, 0, 0]);
    data.extend_from_slice(&[0, 0, 0, 0]);
    bytes::Bytes::from(data)
}
