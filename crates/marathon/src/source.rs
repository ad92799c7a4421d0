//! Where a desired application definition comes from.

use crate::error::{Error, Result};
use crate::types::{AppDefinition, AppId};
use std::fmt;
use std::path::PathBuf;

/// Source of the desired definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionSource {
    /// JSON text passed directly.
    Inline(String),
    /// Path to a JSON file.
    File(PathBuf),
    /// Only an application id; enough to fetch or delete an app.
    Id(String),
}

impl DefinitionSource {
    /// Name used in error messages.
    #[must_use]
    pub fn origin(&self) -> String {
        match self {
            Self::Inline(_) => "inline definition".to_string(),
            Self::File(path) => path.display().to_string(),
            Self::Id(_) => "app id".to_string(),
        }
    }

    /// Whether this source carries a full definition.
    #[must_use]
    pub fn has_definition(&self) -> bool {
        !matches!(self, Self::Id(_))
    }

    /// Read and validate the definition.
    pub fn load(&self) -> Result<AppDefinition> {
        let origin = self.origin();
        match self {
            Self::Inline(text) => AppDefinition::from_json(text, &origin),
            Self::File(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| Error::invalid_definition(&origin, format!("cannot read: {e}")))?;
                AppDefinition::from_json(&text, &origin)
            }
            Self::Id(raw) => AppId::parse(raw).map(AppDefinition::from_id),
        }
    }
}

impl fmt::Display for DefinitionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(_) => f.write_str("inline definition"),
            Self::File(path) => write!(f, "file {}", path.display()),
            Self::Id(id) => write!(f, "app id {id}"),
        }
    }
}
