use super::AgentDefinition;
use crate::error::DefinitionError;
use std::path::Path;
use tracing::info;

/// Maximum size for an agent definition file (4 MB).
pub const MAX_DEFINITION_FILE_BYTES: u64 = 4 * 1024 * 1024;

/// Serialization format of an agent definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    Json,
    Json5,
    Yaml,
    Toml,
}

impl DefinitionFormat {
    /// Pick a format from a file extension. Unknown extensions are JSON5,
    /// which also accepts plain JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => DefinitionFormat::Yaml,
            Some("toml") => DefinitionFormat::Toml,
            Some("json") => DefinitionFormat::Json,
            _ => DefinitionFormat::Json5,
        }
    }
}

impl AgentDefinition {
    /// Load and validate a definition file.
    pub fn from_path(path: &Path) -> Result<Self, DefinitionError> {
        let io_err = |source| DefinitionError::Io {
            path: path.display().to_string(),
            source,
        };

        let metadata = std::fs::metadata(path).map_err(io_err)?;
        if metadata.len() > MAX_DEFINITION_FILE_BYTES {
            return Err(DefinitionError::Parse(format!(
                "'{}' is {} bytes, exceeds limit of {} bytes",
                path.display(),
                metadata.len(),
                MAX_DEFINITION_FILE_BYTES
            )));
        }

        let content = std::fs::read_to_string(path).map_err(io_err)?;
        info!("Loading agent definition from {}", path.display());
        Self::from_str_with_format(&content, DefinitionFormat::from_path(path))
    }

    /// Parse and validate a definition from text.
    pub fn from_str_with_format(
        content: &str,
        format: DefinitionFormat,
    ) -> Result<Self, DefinitionError> {
        let parse_err = |e: &dyn std::fmt::Display| DefinitionError::Parse(e.to_string());

        let definition: AgentDefinition = match format {
            DefinitionFormat::Yaml => serde_yaml::from_str(content).map_err(|e| parse_err(&e))?,
            DefinitionFormat::Toml => toml::from_str(content).map_err(|e| parse_err(&e))?,
            DefinitionFormat::Json => serde_json::from_str(content).map_err(|e| parse_err(&e))?,
            DefinitionFormat::Json5 => json5::from_str(content).map_err(|e| parse_err(&e))?,
        };

        definition.validate()?;
        Ok(definition)
    }
}
