//! Credential storage
//!
//! The [`CredentialStore`] trait is the single place token state lives. Every
//! mutation goes through [`CredentialStore::update`], which applies a change
//! under the store's lock so readers never see a token paired with the wrong
//! expiry.
//!
//! [`FileCredentialStore`] persists to `~/.tradestation/credentials.json` with
//! atomic writes (temp file + rename). Timestamps are stored as
//! `YYYY-MM-DD HH:MM:SS` local time strings.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use crate::Result;
use crate::error::Error;
use super::types::{AccessToken, AuthorizationCode, RefreshToken};

/// Timestamp format used at the storage boundary
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Snapshot of everything the token lifecycle needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredCredentials {
    /// Client the tokens below were issued to
    pub client_id: Option<String>,
    pub authorization_code: Option<AuthorizationCode>,
    pub refresh_token: Option<RefreshToken>,
    pub access_token: Option<AccessToken>,
}

/// Durable, lock-protected token state
pub trait CredentialStore: Send + Sync {
    /// Read the current state
    fn load(&self) -> Result<StoredCredentials>;

    /// Apply `change` atomically and persist the result
    fn update(&self, change: &mut dyn FnMut(&mut StoredCredentials)) -> Result<StoredCredentials>;

    /// Forget everything
    fn clear(&self) -> Result<()>;

    /// Record a freshly captured authorization code.
    ///
    /// A code for a different client invalidates the tokens held for the old one.
    fn save_authorization_code(&self, client_id: &str, code: &AuthorizationCode) -> Result<()> {
        self.update(&mut |state| {
            if state.client_id.as_deref() != Some(client_id) {
                *state = StoredCredentials::default();
                state.client_id = Some(client_id.to_string());
            }
            state.authorization_code = Some(code.clone());
        })?;
        Ok(())
    }

    /// Persist the result of a code exchange and consume the authorization code
    fn save_token_pair(&self, client_id: &str, refresh: &RefreshToken, access: &AccessToken) -> Result<()> {
        self.update(&mut |state| {
            state.client_id = Some(client_id.to_string());
            state.authorization_code = None;
            state.refresh_token = Some(refresh.clone());
            state.access_token = Some(access.clone());
        })?;
        Ok(())
    }

    /// Replace the access token, and the refresh token too if the provider rotated it
    fn save_access_token(&self, access: &AccessToken, rotated: Option<&RefreshToken>) -> Result<()> {
        self.update(&mut |state| {
            state.access_token = Some(access.clone());
            if let Some(refresh) = rotated {
                state.refresh_token = Some(refresh.clone());
            }
        })?;
        Ok(())
    }
}

/// On-disk layout: one field per logical record
#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    authorization_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "local_timestamp")]
    authorization_code_issued_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "local_timestamp")]
    access_token_expires_at: Option<DateTime<Utc>>,
}

impl From<&StoredCredentials> for CredentialRecord {
    fn from(state: &StoredCredentials) -> Self {
        Self {
            client_id: state.client_id.clone(),
            authorization_code: state.authorization_code.as_ref().map(|c| c.code.clone()),
            authorization_code_issued_at: state.authorization_code.as_ref().map(|c| c.issued_at),
            refresh_token: state.refresh_token.as_ref().map(|r| r.value.clone()),
            access_token: state.access_token.as_ref().map(|a| a.value.clone()),
            access_token_expires_at: state.access_token.as_ref().map(|a| a.expires_at),
        }
    }
}

impl From<CredentialRecord> for StoredCredentials {
    fn from(record: CredentialRecord) -> Self {
        let authorization_code = match (record.authorization_code, record.authorization_code_issued_at) {
            (Some(code), Some(issued_at)) => Some(AuthorizationCode { code, issued_at }),
            (Some(code), None) => Some(AuthorizationCode { code, issued_at: DateTime::<Utc>::UNIX_EPOCH }),
            _ => None,
        };

        // A token without an expiry cannot be trusted; force a refresh
        let access_token = match (record.access_token, record.access_token_expires_at) {
            (Some(value), Some(expires_at)) => Some(AccessToken { value, expires_at }),
            (Some(_), None) => {
                tracing::warn!("Stored access token has no expiry, discarding it");
                None
            }
            _ => None,
        };

        Self {
            client_id: record.client_id,
            authorization_code,
            refresh_token: record.refresh_token.map(RefreshToken::new),
            access_token,
        }
    }
}

/// `Option<DateTime<Utc>>` as a local `YYYY-MM-DD HH:MM:SS` string
mod local_timestamp {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn parse(s: &str) -> std::result::Result<DateTime<Utc>, String> {
        let naive = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
            .map_err(|e| format!("invalid timestamp '{}': {}", s, e))?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| format!("timestamp '{}' does not exist in the local timezone", s))
    }

    pub fn serialize<S: Serializer>(ts: &Option<DateTime<Utc>>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => serializer.serialize_str(&format(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| parse(&s).map_err(serde::de::Error::custom)).transpose()
    }
}

/// JSON file backed store
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<StoredCredentials> {
        if !self.path.exists() {
            return Ok(StoredCredentials::default());
        }

        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::CredentialStore(format!("Failed to read {:?}: {}", self.path, e)))?;
        let record: CredentialRecord = serde_json::from_str(&content)
            .map_err(|e| Error::CredentialStore(format!("Corrupt credentials file {:?}: {}", self.path, e)))?;
        Ok(record.into())
    }

    fn write(&self, state: &StoredCredentials) -> Result<()> {
        let content = serde_json::to_string_pretty(&CredentialRecord::from(state))?;
        write_private_atomic(&self.path, &content)
            .map_err(|e| Error::CredentialStore(format!("Failed to write {:?}: {}", self.path, e)))
    }
}

/// Write `contents` through a uniquely named temp file and rename it over `path`.
///
/// The temp file is created owner-only (0o600 on unix) before anything is
/// written to it, so a secret is never readable by others, and a crash never
/// leaves a torn file behind. Temp names carry the pid and a process-wide
/// counter, so writers sharing a path never share a temp file.
pub(crate) fn write_private_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_file_name(format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed),
    ));

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let written = options.open(&tmp_path).and_then(|mut file| {
        file.write_all(contents.as_bytes())?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|_| std::fs::rename(&tmp_path, path)) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }
    Ok(())
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<StoredCredentials> {
        let _guard = self.lock.lock()
            .map_err(|_| Error::CredentialStore("credential store lock poisoned".to_string()))?;
        self.read()
    }

    fn update(&self, change: &mut dyn FnMut(&mut StoredCredentials)) -> Result<StoredCredentials> {
        let _guard = self.lock.lock()
            .map_err(|_| Error::CredentialStore("credential store lock poisoned".to_string()))?;
        let mut state = self.read()?;
        change(&mut state);
        self.write(&state)?;
        Ok(state)
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock()
            .map_err(|_| Error::CredentialStore("credential store lock poisoned".to_string()))?;
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .map_err(|e| Error::CredentialStore(format!("Failed to delete {:?}: {}", self.path, e)))?;
        }
        Ok(())
    }
}

/// In-process store, for tests and short-lived sessions
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    state: Mutex<StoredCredentials>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known state
    pub fn with_state(state: StoredCredentials) -> Self {
        Self { state: Mutex::new(state) }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<StoredCredentials> {
        self.state.lock()
            .map(|state| state.clone())
            .map_err(|_| Error::CredentialStore("credential store lock poisoned".to_string()))
    }

    fn update(&self, change: &mut dyn FnMut(&mut StoredCredentials)) -> Result<StoredCredentials> {
        let mut state = self.state.lock()
            .map_err(|_| Error::CredentialStore("credential store lock poisoned".to_string()))?;
        change(&mut state);
        Ok(state.clone())
    }

    fn clear(&self) -> Result<()> {
        self.update(&mut |state| *state = StoredCredentials::default())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, SubsecRound};
    use tempfile::TempDir;

    fn sample_now() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(0)
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let store = FileCredentialStore::new(tmp.path().join("credentials.json"));
        assert_eq!(store.load().unwrap(), StoredCredentials::default());
    }

    #[test]
    fn test_token_pair_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credentials.json");
        let now = sample_now();
        let access = AccessToken::new("abc", now + Duration::seconds(1140));
        let refresh = RefreshToken::new("xyz");

        FileCredentialStore::new(&path).save_token_pair("key", &refresh, &access).unwrap();

        // A fresh store instance sees exactly what was written
        let loaded = FileCredentialStore::new(&path).load().unwrap();
        assert_eq!(loaded.client_id.as_deref(), Some("key"));
        assert_eq!(loaded.refresh_token, Some(refresh));
        assert_eq!(loaded.access_token, Some(access));
    }

    #[test]
    fn test_expiry_stored_as_local_time_string() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credentials.json");
        let expires_at = sample_now() + Duration::minutes(19);
        let store = FileCredentialStore::new(&path);
        store.save_access_token(&AccessToken::new("abc", expires_at), None).unwrap();

        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let expected = expires_at.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string();
        assert_eq!(raw["access_token"], "abc");
        assert_eq!(raw["access_token_expires_at"], expected.as_str());
    }

    #[test]
    fn test_token_pair_consumes_authorization_code() {
        let store = MemoryCredentialStore::new();
        let code = AuthorizationCode::new("AUTH123", sample_now());
        store.save_authorization_code("key", &code).unwrap();
        assert_eq!(store.load().unwrap().authorization_code, Some(code));

        let access = AccessToken::new("abc", sample_now() + Duration::seconds(60));
        store.save_token_pair("key", &RefreshToken::new("xyz"), &access).unwrap();
        assert!(store.load().unwrap().authorization_code.is_none());
    }

    #[test]
    fn test_code_for_new_client_drops_old_tokens() {
        let store = MemoryCredentialStore::new();
        let access = AccessToken::new("abc", sample_now() + Duration::seconds(60));
        store.save_token_pair("old-key", &RefreshToken::new("xyz"), &access).unwrap();

        store.save_authorization_code("new-key", &AuthorizationCode::new("C1", sample_now())).unwrap();

        let state = store.load().unwrap();
        assert_eq!(state.client_id.as_deref(), Some("new-key"));
        assert!(state.refresh_token.is_none());
        assert!(state.access_token.is_none());
    }

    #[test]
    fn test_rotated_refresh_token_replaces_old() {
        let store = MemoryCredentialStore::new();
        let access = AccessToken::new("a1", sample_now() + Duration::seconds(60));
        store.save_token_pair("key", &RefreshToken::new("r1"), &access).unwrap();

        let next = AccessToken::new("a2", sample_now() + Duration::seconds(120));
        store.save_access_token(&next, None).unwrap();
        assert_eq!(store.load().unwrap().refresh_token, Some(RefreshToken::new("r1")));

        store.save_access_token(&next, Some(&RefreshToken::new("r2"))).unwrap();
        let state = store.load().unwrap();
        assert_eq!(state.refresh_token, Some(RefreshToken::new("r2")));
        assert_eq!(state.access_token, Some(next));
    }

    #[test]
    fn test_access_token_without_expiry_is_discarded() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credentials.json");
        std::fs::write(&path, r#"{"refresh_token": "xyz", "access_token": "abc"}"#).unwrap();

        let state = FileCredentialStore::new(&path).load().unwrap();
        assert_eq!(state.refresh_token, Some(RefreshToken::new("xyz")));
        assert!(state.access_token.is_none());
    }

    #[test]
    fn test_corrupt_file_is_store_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credentials.json");
        std::fs::write(&path, "not json").unwrap();

        let err = FileCredentialStore::new(&path).load().unwrap_err();
        assert!(matches!(err, Error::CredentialStore(_)));
    }

    #[test]
    fn test_clear_removes_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credentials.json");
        let store = FileCredentialStore::new(&path);
        store.save_authorization_code("key", &AuthorizationCode::new("C1", sample_now())).unwrap();
        assert!(path.exists());

        store.clear().unwrap();
        assert!(!path.exists());
        assert_eq!(store.load().unwrap(), StoredCredentials::default());
    }

    #[test]
    fn test_stores_sharing_a_path_do_not_clobber_each_other() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credentials.json");
        let expires_at = sample_now() + Duration::seconds(60);

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let store = FileCredentialStore::new(path);
                    for i in 0..25 {
                        let access = AccessToken::new(format!("w{}-{}", w, i), expires_at);
                        store.save_access_token(&access, None).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let state = FileCredentialStore::new(&path).load().unwrap();
        assert!(state.access_token.unwrap().value.ends_with("-24"));
        let entries: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_credentials_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credentials.json");
        FileCredentialStore::new(&path)
            .save_access_token(&AccessToken::new("abc", sample_now()), None)
            .unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let tmp = TempDir::new().unwrap();
        let store = FileCredentialStore::new(tmp.path().join("credentials.json"));
        for i in 0..5 {
            let access = AccessToken::new(format!("a{}", i), sample_now() + Duration::seconds(60));
            store.save_access_token(&access, None).unwrap();
        }

        let entries: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
