//! Wallet session persistence (auto-reconnect)
//!
//! Remembers the last connected Ethereum account so a restart can reconnect
//! without prompting, provided the wallet still exposes that account.

use std::sync::Arc;

use tracing::{debug, info};

use crate::store::{KeyValueStore, StoreError, ETH_ADDRESS_KEY};

pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn remember(&self, account: &str) -> Result<(), StoreError> {
        self.store.set(ETH_ADDRESS_KEY, account)
    }

    pub fn forget(&self) -> Result<(), StoreError> {
        self.store.remove(ETH_ADDRESS_KEY)
    }

    pub fn last_account(&self) -> Result<Option<String>, StoreError> {
        self.store.get(ETH_ADDRESS_KEY)
    }

    /// Reconnect to the remembered account if the wallet still lists it.
    ///
    /// Comparison is case-insensitive (checksummed vs lowercase hex). The
    /// wallet's spelling is returned. A stale entry is cleared.
    pub fn restore(&self, wallet_accounts: &[String]) -> Result<Option<String>, StoreError> {
        let Some(saved) = self.last_account()? else {
            return Ok(None);
        };

        match wallet_accounts.first() {
            Some(current) if current.eq_ignore_ascii_case(&saved) => {
                info!(account = %current, "Restored wallet session");
                Ok(Some(current.clone()))
            }
            _ => {
                debug!(saved = %saved, "Remembered account no longer exposed, clearing");
                self.forget()?;
                Ok(None)
            }
        }
    }

    /// Resolve the active account at startup.
    ///
    /// An empty `wallet_accounts` means no wallet is attached and the
    /// remembered account is used as-is. Otherwise the remembered account is
    /// restored if the wallet still exposes it, and the wallet's active
    /// account is adopted and remembered if not.
    pub fn connect(&self, wallet_accounts: &[String]) -> Result<Option<String>, StoreError> {
        if wallet_accounts.is_empty() {
            return self.last_account();
        }
        if let Some(restored) = self.restore(wallet_accounts)? {
            return Ok(Some(restored));
        }
        self.on_accounts_changed(wallet_accounts)
    }

    /// Apply an `accountsChanged` notification from the wallet
    pub fn on_accounts_changed(&self, accounts: &[String]) -> Result<Option<String>, StoreError> {
        match accounts.first() {
            Some(active) => {
                self.remember(active)?;
                Ok(Some(active.clone()))
            }
            None => {
                self.forget()?;
                Ok(None)
            }
        }
    }
}
