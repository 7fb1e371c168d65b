use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};
use crate::models::{normalize_string, LinkedAccount};
use crate::utils::now_rfc3339;

const STORE_FILE_NAME: &str = "linked_accounts.json";
const STORE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountStoreFile {
    schema_version: u32,
    accounts: Vec<LinkedAccount>,
}

#[derive(Debug, Default)]
struct AccountStoreState {
    accounts: Vec<LinkedAccount>,
}

/// Linked mail accounts, persisted as a single JSON file.
#[derive(Debug)]
pub struct AccountStore {
    path: PathBuf,
    state: Mutex<AccountStoreState>,
}

impl AccountStore {
    pub fn load_from_dir(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        Self::load_from_path(data_dir.join(STORE_FILE_NAME))
    }

    pub fn load_from_path(path: PathBuf) -> Result<Self> {
        let state = match fs::read_to_string(&path) {
            Ok(contents) => {
                if contents.trim().is_empty() {
                    AccountStoreState::default()
                } else {
                    parse_store_contents(&contents)?
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => AccountStoreState::default(),
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Most recently synced first; never-synced accounts last.
    pub fn list_accounts(&self) -> Result<Vec<LinkedAccount>> {
        let state = self.lock_state()?;
        let mut accounts = state.accounts.clone();
        accounts.sort_by(|a, b| b.last_sync.cmp(&a.last_sync));
        Ok(accounts)
    }

    pub fn get_account(&self, account_id: &str) -> Result<Option<LinkedAccount>> {
        let account_id = account_id.trim();
        if account_id.is_empty() {
            return Ok(None);
        }
        let state = self.lock_state()?;
        Ok(state
            .accounts
            .iter()
            .find(|account| account.id == account_id)
            .cloned())
    }

    /// Stores a freshly linked account, replacing any record with the same id
    /// or the same provider and email.
    pub fn upsert_linked(&self, account: LinkedAccount) -> Result<LinkedAccount> {
        let id = normalize_string(&account.id)
            .ok_or_else(|| LinkError::Validation("account id is required".to_string()))?;
        let email = normalize_string(&account.email)
            .ok_or_else(|| LinkError::Validation("account email is required".to_string()))?;
        let account = LinkedAccount {
            id,
            email,
            connected: true,
            ..account
        };

        let mut state = self.lock_state()?;
        let existing = state.accounts.iter().position(|stored| {
            stored.id == account.id
                || (stored.provider == account.provider
                    && stored.email.eq_ignore_ascii_case(&account.email))
        });
        match existing {
            Some(index) => state.accounts[index] = account.clone(),
            None => state.accounts.push(account.clone()),
        }
        self.save_locked(&state)?;
        Ok(account)
    }

    pub fn mark_synced(&self, account_id: &str) -> Result<LinkedAccount> {
        self.update(account_id, |account| {
            account.last_sync = Some(now_rfc3339());
        })
    }

    pub fn disconnect(&self, account_id: &str) -> Result<LinkedAccount> {
        self.update(account_id, |account| {
            account.connected = false;
        })
    }

    pub fn delete_account(&self, account_id: &str) -> Result<Option<LinkedAccount>> {
        let account_id = account_id.trim();
        if account_id.is_empty() {
            return Ok(None);
        }

        let mut state = self.lock_state()?;
        let index = state
            .accounts
            .iter()
            .position(|account| account.id == account_id);
        let removed = index.map(|index| state.accounts.remove(index));
        if removed.is_some() {
            self.save_locked(&state)?;
        }
        Ok(removed)
    }

    fn update<F>(&self, account_id: &str, apply: F) -> Result<LinkedAccount>
    where
        F: FnOnce(&mut LinkedAccount),
    {
        let account_id = account_id.trim();
        if account_id.is_empty() {
            return Err(LinkError::Validation("accountId is required".to_string()));
        }

        let mut state = self.lock_state()?;
        let account = state
            .accounts
            .iter_mut()
            .find(|account| account.id == account_id)
            .ok_or(LinkError::AccountNotFound)?;
        apply(account);
        let updated = account.clone();
        self.save_locked(&state)?;
        Ok(updated)
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, AccountStoreState>> {
        self.state
            .lock()
            .map_err(|_| LinkError::Store("account store mutex poisoned".to_string()))
    }

    fn save_locked(&self, state: &AccountStoreState) -> Result<()> {
        let payload = AccountStoreFile {
            schema_version: STORE_SCHEMA_VERSION,
            accounts: state.accounts.clone(),
        };
        let serialized = serde_json::to_string_pretty(&payload)?;
        fs::write(&self.path, serialized)?;
        Ok(())
    }
}

fn parse_store_contents(contents: &str) -> Result<AccountStoreState> {
    let store_file = serde_json::from_str::<AccountStoreFile>(contents)?;
    if store_file.schema_version != STORE_SCHEMA_VERSION {
        return Err(LinkError::Store(format!(
            "unsupported account store schema version: {}",
            store_file.schema_version
        )));
    }

    Ok(AccountStoreState {
        accounts: store_file.accounts,
    })
}
