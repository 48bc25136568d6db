use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::content::{ContentCategory, Role};
use crate::error::{HistoryError, StoreError};
use crate::types::{BranchName, Priority};

// Serializable, comparable, explicit defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Category -> output role. Payload roles (dialogue) take precedence.
    pub role_map: BTreeMap<ContentCategory, Role>,
    /// Category default priority when a commit carries no annotation.
    pub category_priority: BTreeMap<ContentCategory, Priority>,
    /// Combine consecutive same-role messages.
    pub aggregate: bool,
    pub separator: String,
}

impl CompileConfig {
    pub fn v0() -> Self {
        use ContentCategory::*;

        let role_map = BTreeMap::from([
            (Instruction, Role::System),
            (Dialogue, Role::User),
            (ToolIo, Role::Tool),
            (Reasoning, Role::Assistant),
            (Artifact, Role::Assistant),
            (Output, Role::Assistant),
            (Freeform, Role::User),
        ]);
        let category_priority = BTreeMap::from([
            (Instruction, Priority::Normal),
            (Dialogue, Priority::Normal),
            (ToolIo, Priority::Normal),
            (Reasoning, Priority::Skip),
            (Artifact, Priority::Normal),
            (Output, Priority::Normal),
            (Freeform, Priority::Normal),
            (Structural, Priority::Skip),
        ]);

        Self {
            role_map,
            category_priority,
            aggregate: true,
            separator: "\n\n".into(),
        }
    }

    pub fn role_for(&self, category: ContentCategory) -> Role {
        self.role_map.get(&category).copied().unwrap_or(Role::User)
    }

    pub fn default_priority(&self, category: ContentCategory) -> Priority {
        self.category_priority
            .get(&category)
            .copied()
            .unwrap_or(Priority::Normal)
    }
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self::v0()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub default_branch: BranchName,
    pub compile: CompileConfig,
    #[serde(default)]
    pub cache_compiles: bool,
}

impl HistoryConfig {
    pub fn v0() -> Self {
        Self {
            default_branch: BranchName::main(),
            compile: CompileConfig::v0(),
            cache_compiles: false,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, HistoryError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, HistoryError> {
        let f = std::fs::File::open(path).map_err(StoreError::Io)?;
        Ok(serde_json::from_reader(f)?)
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self::v0()
    }
}
