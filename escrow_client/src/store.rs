//! Durable client-side credential storage.
//!
//! Exactly three things persist between runs: the access token, the refresh token, and the cached user profile
//! blob. They are written and cleared as a unit, and only the session manager touches this store. The file layout
//! follows the dot-directory convention with owner-only permissions.

use std::{
    fs,
    io,
    io::{Error, ErrorKind},
    path::PathBuf,
    sync::Mutex,
};

use dirs::home_dir;
use escrow_common::Secret;
use serde::{Deserialize, Serialize};

const STORE_DIR: &str = ".escrow-client";
const STORE_FILE: &str = "credentials.toml";

//--------------------------------------  StoredCredentials  ---------------------------------------------------------
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub access_token: Secret<String>,
    pub refresh_token: Secret<String>,
    /// The user profile exactly as the server sent it, kept opaque.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

//--------------------------------------   CredentialStore   ---------------------------------------------------------
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> io::Result<Option<StoredCredentials>>;
    fn save(&self, credentials: &StoredCredentials) -> io::Result<()>;
    fn clear(&self) -> io::Result<()>;
}

//-------------------------------------- FileCredentialStore ---------------------------------------------------------
/// Credentials in `~/.escrow-client/credentials.toml`, directory 0700 and file 0600 on Unix.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new() -> io::Result<Self> {
        let home = home_dir().ok_or_else(|| io::Error::new(ErrorKind::NotFound, "Home directory not found"))?;
        Ok(Self { path: home.join(STORE_DIR).join(STORE_FILE) })
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    fn ensure_dir(&self) -> io::Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
                set_permissions(&dir.to_path_buf(), 0o700)?;
            }
        }
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> io::Result<Option<StoredCredentials>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        let credentials =
            toml::from_str(&raw).map_err(|e| Error::new(ErrorKind::InvalidData, e.to_string()))?;
        Ok(Some(credentials))
    }

    fn save(&self, credentials: &StoredCredentials) -> io::Result<()> {
        self.ensure_dir()?;
        let raw = toml::to_string(credentials).map_err(|e| Error::new(ErrorKind::InvalidData, e.to_string()))?;
        fs::write(&self.path, raw)?;
        set_permissions(&self.path, 0o600)?;
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

fn set_permissions(path: &PathBuf, perms: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = fs::metadata(path)?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(perms);
        fs::set_permissions(path, permissions)?;
    }
    Ok(())
}

//-------------------------------------- MemoryCredentialStore -------------------------------------------------------
/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: Mutex<Option<StoredCredentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> io::Result<Option<StoredCredentials>> {
        Ok(self.credentials.lock().unwrap_or_else(|p| p.into_inner()).clone())
    }

    fn save(&self, credentials: &StoredCredentials) -> io::Result<()> {
        *self.credentials.lock().unwrap_or_else(|p| p.into_inner()) = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        *self.credentials.lock().unwrap_or_else(|p| p.into_inner()) = None;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn file_store_round_trips_and_clears_as_a_unit() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::with_path(dir.path().join("sub").join("credentials.toml"));
        assert!(store.load().unwrap().is_none());

        let credentials = StoredCredentials {
            access_token: Secret::new("access-123".to_string()),
            refresh_token: Secret::new("refresh-456".to_string()),
            user: Some(r#"{"id":"u-1","name":"Wanjiku"}"#.to_string()),
        };
        store.save(&credentials).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.access_token.reveal(), "access-123");
        assert_eq!(loaded.refresh_token.reveal(), "refresh-456");
        assert!(loaded.user.unwrap().contains("Wanjiku"));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        // Clearing an already-clear store is fine.
        store.clear().unwrap();
    }

    #[test]
    fn stored_file_never_contains_plaintext_markers_of_secrecy() {
        // The Secret wrapper redacts Debug/Display but must serialize its value for the round-trip.
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::with_path(dir.path().join("credentials.toml"));
        let credentials = StoredCredentials {
            access_token: Secret::new("tok-a".to_string()),
            refresh_token: Secret::new("tok-r".to_string()),
            user: None,
        };
        store.save(&credentials).unwrap();
        let raw = std::fs::read_to_string(dir.path().join("credentials.toml")).unwrap();
        assert!(raw.contains("tok-a"));
        assert!(!raw.contains("****"));
    }

    #[cfg(unix)]
    #[test]
    fn file_permissions_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::with_path(dir.path().join("credentials.toml"));
        store.save(&StoredCredentials::default()).unwrap();
        let mode = std::fs::metadata(dir.path().join("credentials.toml")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
