//! File attachments shared by the agent, the sandbox and the client
//!
//! On the wire, file content travels base64-encoded.

use serde::{Deserialize, Serialize};

use crate::preview::{self, RichPreview};

/// Lines kept in the cheap text preview of an upload
pub const CHEAP_PREVIEW_LINES: usize = 10;

/// A file attached to a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    pub name: String,
    pub size: usize,
    /// Raw bytes; the chat endpoint accepts metadata-only files
    #[serde(default, with = "base64_bytes")]
    pub content: Vec<u8>,
    /// First lines of the file as text
    #[serde(default)]
    pub preview: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rich_preview: Option<RichPreview>,
    /// True when the file was produced by a sandbox run
    #[serde(default)]
    pub is_generated: bool,
}

impl FileAttachment {
    /// Build an upload, computing both previews
    ///
    /// The rich preview is best effort: unsupported or unparseable files
    /// simply carry none.
    pub fn upload(name: impl Into<String>, content: Vec<u8>) -> Self {
        let name = name.into();
        let rich_preview = if preview::is_tabular(&name) {
            preview::preview_bytes(&name, &content).ok()
        } else {
            None
        };
        Self {
            size: content.len(),
            preview: preview::cheap_preview(&content, CHEAP_PREVIEW_LINES),
            rich_preview,
            content,
            name,
            is_generated: false,
        }
    }

    pub fn origin(&self) -> &'static str {
        if self.is_generated {
            "generated"
        } else {
            "uploaded"
        }
    }
}

/// Merge `incoming` into `existing` by name
///
/// A file whose name is already present replaces that entry in place; any
/// other file is appended. First-insertion order is preserved.
pub fn merge_files(existing: &mut Vec<FileAttachment>, incoming: impl IntoIterator<Item = FileAttachment>) {
    for file in incoming {
        match existing.iter_mut().find(|f| f.name == file.name) {
            Some(slot) => *slot = file,
            None => existing.push(file),
        }
    }
}

pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.trim())
            .map_err(serde::de::Error::custom)
    }
}
