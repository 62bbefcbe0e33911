use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::error::{FaceAuthError, Result};
use crate::core::types::Identity;
use crate::storage::atomic::{write_atomically, FileLock};

const ACCOUNTS_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
    Suspended,
}

impl std::str::FromStr for AccountStatus {
    type Err = FaceAuthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(AccountStatus::Active),
            "inactive" => Ok(AccountStatus::Inactive),
            "suspended" => Ok(AccountStatus::Suspended),
            other => Err(FaceAuthError::InvalidRequest(format!("unknown account status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub identity: Identity,
    pub status: AccountStatus,
    #[serde(default)]
    pub face_enrolled: bool,
    #[serde(default)]
    pub last_login_at: Option<i64>,
}

impl Account {
    pub fn new(identity: Identity, status: AccountStatus) -> Self {
        Self { identity, status, face_enrolled: false, last_login_at: None }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// The user/account store as seen by the face workflows.
pub trait AccountDirectory: Send + Sync {
    fn find(&self, identity: &Identity) -> Result<Option<Account>>;

    fn upsert(&self, account: Account) -> Result<()>;

    /// Flag the account as face-enrolled. Idempotent; unknown identities are
    /// left alone.
    fn mark_enrolled(&self, identity: &Identity) -> Result<()>;

    fn record_login(&self, identity: &Identity, at: DateTime<Utc>) -> Result<()>;
}

#[derive(Serialize, Deserialize)]
struct AccountsFile {
    version: u32,
    accounts: Vec<Account>,
}

/// All accounts in one JSON document. Every read-modify-write holds an
/// exclusive `flock` on `accounts.json.lock`, since the CLI and the daemon
/// both edit the file.
pub struct FileAccountStore {
    path: PathBuf,
}

impl FileAccountStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn load(&self) -> Result<BTreeMap<Identity, Account>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let data = fs::read(&self.path)?;
        let file: AccountsFile = serde_json::from_slice(&data).map_err(|e| {
            FaceAuthError::Storage(format!("Invalid accounts file {}: {}", self.path.display(), e))
        })?;

        Ok(file
            .accounts
            .into_iter()
            .map(|account| (account.identity.clone(), account))
            .collect())
    }

    fn save(&self, accounts: &BTreeMap<Identity, Account>) -> Result<()> {
        let file = AccountsFile {
            version: ACCOUNTS_VERSION,
            accounts: accounts.values().cloned().collect(),
        };
        let encoded = serde_json::to_vec_pretty(&file)
            .map_err(|e| FaceAuthError::Storage(format!("Failed to serialize accounts: {}", e)))?;
        write_atomically(&self.path, &encoded)
    }

    fn update<F>(&self, identity: &Identity, change: F) -> Result<()>
    where
        F: FnOnce(&mut Account),
    {
        let _lock = FileLock::acquire(&self.path)?;

        let mut accounts = self.load()?;
        match accounts.get_mut(identity) {
            Some(account) => {
                change(account);
                self.save(&accounts)
            }
            None => {
                tracing::warn!("No account record for {}; update skipped", identity);
                Ok(())
            }
        }
    }

    /// Set an account's status, creating the account if needed, in one
    /// locked read-modify-write.
    pub fn set_status(&self, identity: &Identity, status: AccountStatus) -> Result<Account> {
        let _lock = FileLock::acquire(&self.path)?;

        let mut accounts = self.load()?;
        let account = accounts
            .entry(identity.clone())
            .or_insert_with(|| Account::new(identity.clone(), status));
        account.status = status;
        let saved = account.clone();
        self.save(&accounts)?;
        Ok(saved)
    }

    pub fn list(&self) -> Result<Vec<Account>> {
        Ok(self.load()?.into_values().collect())
    }
}

impl AccountDirectory for FileAccountStore {
    fn find(&self, identity: &Identity) -> Result<Option<Account>> {
        Ok(self.load()?.remove(identity))
    }

    fn upsert(&self, account: Account) -> Result<()> {
        let _lock = FileLock::acquire(&self.path)?;
        let mut accounts = self.load()?;
        accounts.insert(account.identity.clone(), account);
        self.save(&accounts)
    }

    fn mark_enrolled(&self, identity: &Identity) -> Result<()> {
        self.update(identity, |account| account.face_enrolled = true)
    }

    fn record_login(&self, identity: &Identity, at: DateTime<Utc>) -> Result<()> {
        self.update(identity, |account| account.last_login_at = Some(at.timestamp_millis()))
    }
}

#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<BTreeMap<Identity, Account>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.accounts.write() {
            for account in accounts {
                map.insert(account.identity.clone(), account);
            }
        }
        store
    }
}

impl AccountDirectory for MemoryAccountStore {
    fn find(&self, identity: &Identity) -> Result<Option<Account>> {
        let accounts = self
            .accounts
            .read()
            .map_err(|_| FaceAuthError::Storage("account store lock poisoned".into()))?;
        Ok(accounts.get(identity).cloned())
    }

    fn upsert(&self, account: Account) -> Result<()> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|_| FaceAuthError::Storage("account store lock poisoned".into()))?;
        accounts.insert(account.identity.clone(), account);
        Ok(())
    }

    fn mark_enrolled(&self, identity: &Identity) -> Result<()> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|_| FaceAuthError::Storage("account store lock poisoned".into()))?;
        if let Some(account) = accounts.get_mut(identity) {
            account.face_enrolled = true;
        }
        Ok(())
    }

    fn record_login(&self, identity: &Identity, at: DateTime<Utc>) -> Result<()> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|_| FaceAuthError::Storage("account store lock poisoned".into()))?;
        if let Some(account) = accounts.get_mut(identity) {
            account.last_login_at = Some(at.timestamp_millis());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn id(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    #[test]
    fn file_store_round_trips_accounts() {
        let tmp = TempDir::new().unwrap();
        let store = FileAccountStore::new(tmp.path().join("accounts.json"));
        store.upsert(Account::new(id("alice"), AccountStatus::Active)).unwrap();
        store.upsert(Account::new(id("bob"), AccountStatus::Suspended)).unwrap();

        let reopened = FileAccountStore::new(tmp.path().join("accounts.json"));
        assert!(reopened.find(&id("alice")).unwrap().unwrap().is_active());
        assert!(!reopened.find(&id("bob")).unwrap().unwrap().is_active());
        assert!(reopened.find(&id("carol")).unwrap().is_none());
        assert_eq!(reopened.list().unwrap().len(), 2);
    }

    #[test]
    fn mark_enrolled_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = FileAccountStore::new(tmp.path().join("accounts.json"));
        store.upsert(Account::new(id("alice"), AccountStatus::Active)).unwrap();

        store.mark_enrolled(&id("alice")).unwrap();
        store.mark_enrolled(&id("alice")).unwrap();
        assert!(store.find(&id("alice")).unwrap().unwrap().face_enrolled);

        store.mark_enrolled(&id("ghost")).unwrap();
        assert!(store.find(&id("ghost")).unwrap().is_none());
    }

    #[test]
    fn record_login_sets_timestamp() {
        let store = MemoryAccountStore::with_accounts([Account::new(id("alice"), AccountStatus::Active)]);
        let at = Utc::now();
        store.record_login(&id("alice"), at).unwrap();
        assert_eq!(
            store.find(&id("alice")).unwrap().unwrap().last_login_at,
            Some(at.timestamp_millis())
        );
    }

    #[test]
    fn concurrent_handles_do_not_lose_a_suspension() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("accounts.json");

        for _ in 0..20 {
            let daemon = FileAccountStore::new(path.clone());
            let admin = FileAccountStore::new(path.clone());
            daemon.upsert(Account::new(id("alice"), AccountStatus::Active)).unwrap();

            let logins = std::thread::spawn(move || {
                for _ in 0..50 {
                    daemon.record_login(&id("alice"), Utc::now()).unwrap();
                }
            });
            admin.upsert(Account::new(id("alice"), AccountStatus::Suspended)).unwrap();
            logins.join().unwrap();

            let account = admin.find(&id("alice")).unwrap().unwrap();
            assert_eq!(account.status, AccountStatus::Suspended);
        }
    }

    #[test]
    fn set_status_keeps_enrollment_and_last_login() {
        let tmp = TempDir::new().unwrap();
        let store = FileAccountStore::new(tmp.path().join("accounts.json"));
        store.upsert(Account::new(id("alice"), AccountStatus::Active)).unwrap();
        store.mark_enrolled(&id("alice")).unwrap();
        store.record_login(&id("alice"), Utc::now()).unwrap();

        let saved = store.set_status(&id("alice"), AccountStatus::Suspended).unwrap();
        assert_eq!(saved.status, AccountStatus::Suspended);
        assert!(saved.face_enrolled);
        assert!(saved.last_login_at.is_some());

        let created = store.set_status(&id("bob"), AccountStatus::Inactive).unwrap();
        assert!(!created.face_enrolled);
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Active".parse::<AccountStatus>().unwrap(), AccountStatus::Active);
        assert!("deleted".parse::<AccountStatus>().is_err());
    }
}
