// Data directory resolution and the fixed per-cell file names.
//
// Every durable cell owns exactly one file under the app data directory.
// The names are process-known constants so a restarted process reattaches
// to the same cells.

use std::io;
use std::path::{Path, PathBuf};

/// File name for the settings cell
pub const SETTINGS_FILE: &str = "settings.json";
/// File name for the emergency contacts cell (encrypted)
pub const CONTACTS_FILE: &str = "contacts.bin";
/// File name for the OAuth credential cell (encrypted)
pub const CREDENTIAL_FILE: &str = "credential.bin";
/// File name for the cached Google profile cell
pub const PROFILE_FILE: &str = "profile.json";
/// File name for the recording session index
pub const SESSIONS_FILE: &str = "sessions.json";

/// Root directory for all durable state owned by the core.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the default platform data directory.
    pub fn resolve() -> io::Result<Self> {
        let base = dirs::data_dir().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no platform data directory")
        })?;
        Ok(Self {
            root: base.join("haven"),
        })
    }

    /// Use an explicit root (tests, shells that manage their own sandbox).
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path for one of the fixed cell file names.
    pub fn cell(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }
}
