use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::feed::FeedView;

pub const FILE_NAME: &str = "prefs.json";

#[derive(Debug, thiserror::Error)]
pub enum PrefsError {
    #[error("preferences at {path} are corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("preferences at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// UI choices restored on the next start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Preferences {
    #[serde(default)]
    pub hashtag: String,
    #[serde(default)]
    pub feed_source: FeedView,
}

pub fn default_path() -> Option<PathBuf> {
    crate::config::config_dir().map(|dir| dir.join(FILE_NAME))
}

/// A missing file is not an error.
pub fn load(path: &Path) -> Result<Option<Preferences>, PrefsError> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PrefsError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&data)
        .map(Some)
        .map_err(|source| PrefsError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

pub fn save(path: &Path, prefs: &Preferences) -> Result<(), PrefsError> {
    let io_err = |source| PrefsError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let contents = serde_json::to_string_pretty(prefs).map_err(|source| PrefsError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, contents).map_err(io_err)
}
