// partially (c) 2016 Google Inc. (Lewin Bormann, lewinb@google.com)
//
// See project root for licensing information.
//

use std::fs;
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::types::Credential;

/// Implements a specialized storage to set and retrieve a `Credential`.
///
/// The process holds at most one credential, so a storage remembers one entry: the
/// credential together with the scopes it was granted for. `get` only yields it if it
/// covers all requested scopes.
pub trait TokenStorage: Send + Sync {
    /// Save `token`, replacing whatever was stored before.
    fn set(&self, scopes: &[String], token: Credential) -> io::Result<()>;

    /// A `None` result indicates that there is no usable token for the given scopes.
    fn get(&self, scopes: &[String]) -> io::Result<Option<Credential>>;

    /// The stored token is invalid or revoked and should be removed.
    fn clear(&self) -> io::Result<()>;
}

/// A storage that remembers nothing.
#[derive(Default)]
pub struct NullStorage;

impl TokenStorage for NullStorage {
    fn set(&self, _: &[String], _: Credential) -> io::Result<()> {
        Ok(())
    }

    fn get(&self, _: &[String]) -> io::Result<Option<Credential>> {
        Ok(None)
    }

    fn clear(&self) -> io::Result<()> {
        Ok(())
    }
}

/// A single stored token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredToken {
    scopes: Vec<String>,
    token: Credential,
}

impl StoredToken {
    fn new(scopes: &[String], token: Credential) -> Self {
        StoredToken {
            scopes: scopes.to_vec(),
            token,
        }
    }

    fn covering(&self, scopes: &[String]) -> Option<Credential> {
        if scopes.iter().all(|s| self.scopes.contains(s)) {
            Some(self.token.clone())
        } else {
            None
        }
    }
}

/// A storage that remembers values for one session only.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    token: Mutex<Option<StoredToken>>,
}

impl MemoryStorage {
    /// An empty storage.
    pub fn new() -> MemoryStorage {
        Default::default()
    }

    /// A storage holding `token`, granted for `scopes`.
    pub fn with_token(scopes: &[String], token: Credential) -> MemoryStorage {
        MemoryStorage {
            token: Mutex::new(Some(StoredToken::new(scopes, token))),
        }
    }
}

impl TokenStorage for MemoryStorage {
    fn set(&self, scopes: &[String], token: Credential) -> io::Result<()> {
        *self.token.lock().expect("poisoned mutex") = Some(StoredToken::new(scopes, token));
        Ok(())
    }

    fn get(&self, scopes: &[String]) -> io::Result<Option<Credential>> {
        let stored = self.token.lock().expect("poisoned mutex");
        Ok(stored.as_ref().and_then(|t| t.covering(scopes)))
    }

    fn clear(&self) -> io::Result<()> {
        *self.token.lock().expect("poisoned mutex") = None;
        Ok(())
    }
}

/// Serializes the token to a JSON file on disk.
///
/// The file is read on every `get` and rewritten on every `set`; nothing is kept in
/// memory, so the file is the single source of truth.
pub struct DiskStorage {
    location: PathBuf,
}

impl DiskStorage {
    /// Use the cache file at `location`. The file need not exist yet.
    pub fn new<S: Into<PathBuf>>(location: S) -> DiskStorage {
        DiskStorage {
            location: location.into(),
        }
    }

    /// Path of the cache file.
    pub fn location(&self) -> &Path {
        &self.location
    }

    fn load(&self) -> io::Result<Option<StoredToken>> {
        let contents = match fs::read_to_string(&self.location) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        match serde_json::from_str(&contents) {
            Ok(stored) => Ok(Some(stored)),
            Err(e) => {
                log::warn!(
                    "ignoring unreadable token cache {}: {}",
                    self.location.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    /// Write to a sibling file first, so a crash never leaves a half written cache behind.
    fn dump_to_file(&self, stored: &StoredToken) -> io::Result<()> {
        let serialized = serde_json::to_string_pretty(stored)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut tmp = self.location.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        {
            let mut f = fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)?;
            f.write_all(serialized.as_bytes())?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &self.location)
    }
}

impl TokenStorage for DiskStorage {
    fn set(&self, scopes: &[String], token: Credential) -> io::Result<()> {
        log::debug!("persisting credential to {}", self.location.display());
        self.dump_to_file(&StoredToken::new(scopes, token))
    }

    fn get(&self, scopes: &[String]) -> io::Result<Option<Credential>> {
        Ok(self.load()?.and_then(|t| t.covering(scopes)))
    }

    fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.location) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}
