use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One dataset as published by the metastore. Only `identifier` and
/// `modified` are required; everything else tolerates absence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub identifier: String,
    #[serde(
        default,
        deserialize_with = "string_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub theme: Theme,
    /// Opaque, sortable timestamp (ISO-8601 date or datetime in practice).
    pub modified: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub distribution: Vec<Distribution>,
}

/// `null` reads as the empty value, so the item still reaches selection.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Titles are display-only; anything but a string is dropped.
fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(title) => Ok(Some(title)),
        _ => Ok(None),
    }
}

impl DatasetDescriptor {
    /// Title for log lines, falling back to the identifier.
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|title| !title.trim().is_empty())
            .unwrap_or(&self.identifier)
    }

    /// Locator of the first distribution. Later distributions are never consulted.
    pub fn download_url(&self) -> Option<&str> {
        self.distribution
            .first()
            .and_then(|dist| dist.download_url.as_deref())
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    #[serde(
        default,
        rename = "downloadURL",
        skip_serializing_if = "Option::is_none"
    )]
    pub download_url: Option<String>,
}

/// Topical tagging. The metastore emits an array of tags; older dumps and
/// hand-written fixtures use a single string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Theme {
    Text(String),
    Tags(Vec<String>),
}

impl Default for Theme {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl Theme {
    /// Case-insensitive substring test against any tag.
    pub fn contains_ignore_case(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        match self {
            Self::Text(text) => text.to_lowercase().contains(&needle),
            Self::Tags(tags) => tags.iter().any(|tag| tag.to_lowercase().contains(&needle)),
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Tags(tags) => f.write_str(&tags.join(", ")),
        }
    }
}

impl From<&str> for Theme {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}
