//! Run-state persistence: identifier -> last processed `modified` value.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize, Serializer};
use tempfile::NamedTempFile;

pub const DEFAULT_STATE_PATH: &str = "metadata.json";

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid state JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// `{"datasets": {"<identifier>": "<modified>"}}` on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    #[serde(default, serialize_with = "sorted")]
    datasets: HashMap<String, String>,
}

fn sorted<S: Serializer>(map: &HashMap<String, String>, serializer: S) -> Result<S::Ok, S::Error> {
    map.iter().collect::<BTreeMap<_, _>>().serialize(serializer)
}

impl StateRecord {
    pub fn last_modified(&self, identifier: &str) -> Option<&str> {
        self.datasets.get(identifier).map(String::as_str)
    }

    /// Overwrites any previous value for `identifier`.
    pub fn record(&mut self, identifier: impl Into<String>, modified: impl Into<String>) {
        self.datasets.insert(identifier.into(), modified.into());
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// Entries sorted by identifier.
    pub fn entries(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<_> = self
            .datasets
            .iter()
            .map(|(id, modified)| (id.as_str(), modified.as_str()))
            .collect();
        entries.sort_unstable();
        entries
    }
}

/// Load state; a missing file is an empty record, anything unreadable is an error.
pub fn load_state(path: &Path) -> Result<StateRecord, StateError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no state file, starting empty");
            return Ok(StateRecord::default());
        }
        Err(err) => return Err(err.into()),
    };
    Ok(serde_json::from_str(&raw)?)
}

/// Replace the state file atomically: write a sibling temp file, then rename over.
pub fn save_state(path: &Path, state: &StateRecord) -> Result<(), StateError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent)?;
            parent
        }
        _ => Path::new("."),
    };

    let mut payload = serde_json::to_string_pretty(state)?;
    payload.push('\n');

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(payload.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}
