use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hashing::canonical_json;
use crate::types::identifiers::CommitHash;

/// Output role of a compiled message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    Instruction,
    Dialogue,
    ToolIo,
    Reasoning,
    Artifact,
    Output,
    Freeform,
    /// Structural payloads (merge records, tombstones). Never rendered.
    Structural,
}

impl ContentCategory {
    pub const RENDERABLE: [ContentCategory; 7] = [
        ContentCategory::Instruction,
        ContentCategory::Dialogue,
        ContentCategory::ToolIo,
        ContentCategory::Reasoning,
        ContentCategory::Artifact,
        ContentCategory::Output,
        ContentCategory::Freeform,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolDirection {
    Call,
    Result,
}

/// One resolved merge conflict: `content` replaces `target` from the merge onward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeResolution {
    pub target: CommitHash,
    pub content: Content,
}

/// Payload of a merge commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRecord {
    pub source: String,
    pub target: String,
    pub resolutions: Vec<MergeResolution>,
}

/// Structured context payload stored as a blob.
///
/// Serialized with an internal `content_type` tag; the canonical form of
/// this serialization is what gets hashed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "content_type", rename_all = "snake_case")]
pub enum Content {
    Instruction {
        text: String,
    },
    Dialogue {
        role: Role,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    ToolIo {
        tool_name: String,
        direction: ToolDirection,
        payload: Value,
    },
    Reasoning {
        text: String,
    },
    Artifact {
        artifact_type: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
    Output {
        text: String,
        #[serde(default = "default_output_format")]
        format: String,
    },
    Freeform {
        payload: Value,
    },
    Merge(MergeRecord),
    Tombstone {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

fn default_output_format() -> String {
    "text".to_string()
}

impl Content {
    pub fn instruction(text: impl Into<String>) -> Self {
        Content::Instruction { text: text.into() }
    }

    pub fn dialogue(role: Role, text: impl Into<String>) -> Self {
        Content::Dialogue {
            role,
            text: text.into(),
            name: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Content::dialogue(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Content::dialogue(Role::Assistant, text)
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Content::Reasoning { text: text.into() }
    }

    pub fn tool_call(tool_name: impl Into<String>, arguments: Value) -> Self {
        Content::ToolIo {
            tool_name: tool_name.into(),
            direction: ToolDirection::Call,
            payload: arguments,
        }
    }

    pub fn tool_result(tool_name: impl Into<String>, result: Value) -> Self {
        Content::ToolIo {
            tool_name: tool_name.into(),
            direction: ToolDirection::Result,
            payload: result,
        }
    }

    pub fn category(&self) -> ContentCategory {
        match self {
            Content::Instruction { .. } => ContentCategory::Instruction,
            Content::Dialogue { .. } => ContentCategory::Dialogue,
            Content::ToolIo { .. } => ContentCategory::ToolIo,
            Content::Reasoning { .. } => ContentCategory::Reasoning,
            Content::Artifact { .. } => ContentCategory::Artifact,
            Content::Output { .. } => ContentCategory::Output,
            Content::Freeform { .. } => ContentCategory::Freeform,
            Content::Merge(_) | Content::Tombstone { .. } => ContentCategory::Structural,
        }
    }

    pub fn is_structural(&self) -> bool {
        self.category() == ContentCategory::Structural
    }

    /// Role carried by the payload itself; overrides the category mapping.
    pub fn explicit_role(&self) -> Option<Role> {
        match self {
            Content::Dialogue { role, .. } => Some(*role),
            _ => None,
        }
    }

    /// Text form used in compiled output.
    pub fn render(&self) -> String {
        match self {
            Content::Instruction { text }
            | Content::Dialogue { text, .. }
            | Content::Reasoning { text }
            | Content::Output { text, .. } => text.clone(),
            Content::ToolIo {
                tool_name,
                direction: ToolDirection::Call,
                payload,
            } => format!("{tool_name}({})", render_value(payload)),
            Content::ToolIo { payload, .. } | Content::Freeform { payload } => render_value(payload),
            Content::Artifact {
                content,
                language: Some(lang),
                ..
            } => format!("```{lang}\n{content}\n```"),
            Content::Artifact { content, .. } => content.clone(),
            Content::Merge(_) | Content::Tombstone { .. } => String::new(),
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        // key order must not depend on how the value was built or loaded
        other => canonical_json(other)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or_default(),
    }
}
