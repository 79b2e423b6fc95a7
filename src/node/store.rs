//! In-memory account records

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use axum::http::HeaderMap;

/// Header prefixes a node persists, paired with their removal prefixes
const STORED_PREFIXES: [(&str, &str); 2] = [
    ("x-account-meta-", "x-remove-account-meta-"),
    ("x-account-sysmeta-", "x-remove-account-sysmeta-"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    /// Timestamp of the first PUT
    pub created_at: String,
    /// Timestamp of the latest PUT
    pub put_timestamp: String,
    /// Lowercase header name -> value, user and system metadata together
    pub metadata: BTreeMap<String, String>,
}

/// Metadata changes carried by a request. `None` deletes the key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataUpdate {
    changes: Vec<(String, Option<String>)>,
}

impl MetadataUpdate {
    /// Collect stored metadata headers and removal headers. An empty value
    /// deletes the key, like an explicit removal.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut changes = Vec::new();
        for (name, value) in headers {
            let name = name.as_str();
            let value = value.to_str().unwrap_or_default();
            for (set_prefix, remove_prefix) in STORED_PREFIXES {
                if let Some(key) = name.strip_prefix(remove_prefix) {
                    changes.push((format!("{}{}", set_prefix, key), None));
                } else if name.starts_with(set_prefix) {
                    let value = (!value.is_empty()).then(|| value.to_string());
                    changes.push((name.to_string(), value));
                }
            }
        }
        Self { changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    fn apply(&self, metadata: &mut BTreeMap<String, String>) {
        for (name, value) in &self.changes {
            match value {
                Some(value) => {
                    metadata.insert(name.clone(), value.clone());
                }
                None => {
                    metadata.remove(name);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    Existing,
}

/// Accounts held by one node device
#[derive(Debug, Default)]
pub struct AccountStore {
    accounts: Mutex<HashMap<String, AccountRecord>>,
}

impl AccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, AccountRecord>> {
        self.accounts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, account: &str) -> Option<AccountRecord> {
        self.lock().get(account).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create the account or refresh its put timestamp
    pub fn put(&self, account: &str, timestamp: &str, update: &MetadataUpdate) -> PutOutcome {
        let mut accounts = self.lock();
        match accounts.get_mut(account) {
            Some(record) => {
                record.put_timestamp = timestamp.to_string();
                update.apply(&mut record.metadata);
                PutOutcome::Existing
            }
            None => {
                let mut record = AccountRecord {
                    created_at: timestamp.to_string(),
                    put_timestamp: timestamp.to_string(),
                    metadata: BTreeMap::new(),
                };
                update.apply(&mut record.metadata);
                accounts.insert(account.to_string(), record);
                PutOutcome::Created
            }
        }
    }

    /// Apply metadata to an existing account. False if it does not exist.
    pub fn post(&self, account: &str, update: &MetadataUpdate) -> bool {
        match self.lock().get_mut(account) {
            Some(record) => {
                update.apply(&mut record.metadata);
                true
            }
            None => false,
        }
    }

    /// False if the account did not exist
    pub fn delete(&self, account: &str) -> bool {
        self.lock().remove(account).is_some()
    }
}
