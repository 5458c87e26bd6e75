use std::collections::HashSet;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::model::ArtifactRef;
use crate::utils::error::ExtractError;

/// Maps a raw payload to the artifacts it references.
///
/// Implementations are shared read-only across concurrent deliveries.
pub trait ArtifactExtractor: Send + Sync {
    fn parse_artifacts(&self, payload: &str) -> Result<HashSet<ArtifactRef>, ExtractError>;
}

// {{ /json/pointer }}
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*(/[^}\s]*)\s*\}\}").expect("placeholder pattern is valid")
});

/// Template-driven artifact extractor.
///
/// Without a template, a JSON object payload may carry its own
/// `"artifacts": [...]` list; any other payload yields no artifacts.
///
/// With a template, the payload must be JSON. Every `{{ /pointer }}` in the
/// template is replaced by the payload value at that JSON pointer, and the
/// rendered text must be a JSON array of artifacts.
#[derive(Debug, Clone, Default)]
pub struct MessageArtifactTranslator {
    template: Option<String>,
}

impl MessageArtifactTranslator {
    pub fn new() -> Self {
        Self { template: None }
    }

    pub fn from_template(template: impl Into<String>) -> Self {
        Self {
            template: Some(template.into()),
        }
    }

    /// Reads the template at `path`. `None` or an empty path means no template.
    pub fn from_template_path(path: Option<&str>) -> Result<Self, ExtractError> {
        match path.filter(|p| !p.trim().is_empty()) {
            None => Ok(Self::new()),
            Some(path) => {
                let template =
                    std::fs::read_to_string(path).map_err(|source| ExtractError::TemplateIo {
                        path: path.to_string(),
                        source,
                    })?;
                Ok(Self::from_template(template))
            }
        }
    }

    fn render(template: &str, payload: &Value) -> Result<String, ExtractError> {
        let mut missing = None;
        let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
            let pointer = &caps[1];
            match payload.pointer(pointer) {
                Some(Value::String(s)) => escape_json_str(s),
                Some(Value::Null) | None => {
                    missing.get_or_insert_with(|| pointer.to_string());
                    String::new()
                }
                Some(other) => escape_json_str(&other.to_string()),
            }
        });
        match missing {
            Some(pointer) => Err(ExtractError::MissingField(pointer)),
            None => Ok(rendered.into_owned()),
        }
    }
}

// Placeholders sit inside JSON string literals, so the value is escaped and
// the surrounding quotes dropped.
fn escape_json_str(s: &str) -> String {
    let quoted = Value::String(s.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

impl ArtifactExtractor for MessageArtifactTranslator {
    fn parse_artifacts(&self, payload: &str) -> Result<HashSet<ArtifactRef>, ExtractError> {
        match &self.template {
            Some(template) => {
                let value: Value = serde_json::from_str(payload).map_err(ExtractError::Payload)?;
                let rendered = Self::render(template, &value)?;
                let artifacts: Vec<ArtifactRef> =
                    serde_json::from_str(&rendered).map_err(ExtractError::Rendered)?;
                Ok(artifacts.into_iter().collect())
            }
            None => {
                let Ok(Value::Object(mut fields)) = serde_json::from_str::<Value>(payload) else {
                    return Ok(HashSet::new());
                };
                match fields.remove("artifacts") {
                    None | Some(Value::Null) => Ok(HashSet::new()),
                    Some(list) => {
                        let artifacts: Vec<ArtifactRef> =
                            serde_json::from_value(list).map_err(ExtractError::Payload)?;
                        Ok(artifacts.into_iter().collect())
                    }
                }
            }
        }
    }
}
