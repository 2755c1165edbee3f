//! In-memory account store with an undo journal.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use shared_types::{calculate_hash, Hash};

use crate::domain::{AccountHandler, ProcessError, Result, SnapshotId};
use crate::ports::{AccountsAdapter, StateJournal};

struct JournalEntry<A> {
    address: Vec<u8>,
    previous: Option<A>,
}

struct AccountsState<A> {
    accounts: BTreeMap<Vec<u8>, A>,
    journal: Vec<JournalEntry<A>>,
}

/// Account store keeping every account in memory.
///
/// Each mutation records the previous value of the touched account, so any
/// snapshot taken earlier can be restored exactly.
pub struct InMemoryAccounts<A: AccountHandler> {
    state: RwLock<AccountsState<A>>,
}

impl<A: AccountHandler> InMemoryAccounts<A> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(AccountsState {
                accounts: BTreeMap::new(),
                journal: Vec::new(),
            }),
        }
    }

    /// Number of journaled mutations since the last commit.
    pub fn journal_len(&self) -> usize {
        self.state.read().journal.len()
    }

    /// Number of accounts.
    pub fn len(&self) -> usize {
        self.state.read().accounts.len()
    }

    /// True when the store holds no account.
    pub fn is_empty(&self) -> bool {
        self.state.read().accounts.is_empty()
    }

    fn record(state: &mut AccountsState<A>, address: &[u8]) {
        let previous = state.accounts.get(address).cloned();
        state.journal.push(JournalEntry {
            address: address.to_vec(),
            previous,
        });
    }
}

impl<A: AccountHandler> Default for InMemoryAccounts<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: AccountHandler> StateJournal for InMemoryAccounts<A> {
    fn snapshot(&self) -> SnapshotId {
        SnapshotId::from_journal_len(self.state.read().journal.len())
    }

    fn revert_to_snapshot(&self, snapshot: SnapshotId) -> Result<()> {
        let mut state = self.state.write();
        let target = snapshot.journal_len();
        if target > state.journal.len() {
            return Err(ProcessError::State(format!(
                "snapshot {target} beyond journal length {}",
                state.journal.len()
            )));
        }

        while state.journal.len() > target {
            let Some(entry) = state.journal.pop() else {
                break;
            };
            match entry.previous {
                Some(account) => {
                    state.accounts.insert(entry.address, account);
                }
                None => {
                    state.accounts.remove(&entry.address);
                }
            }
        }
        Ok(())
    }

    fn commit(&self) -> Result<Hash> {
        let mut state = self.state.write();
        state.journal.clear();
        Ok(calculate_hash(&state.accounts)?)
    }

    fn root_hash(&self) -> Result<Hash> {
        Ok(calculate_hash(&self.state.read().accounts)?)
    }
}

impl<A: AccountHandler> AccountsAdapter<A> for InMemoryAccounts<A> {
    fn get_existing_account(&self, address: &[u8]) -> Result<Option<A>> {
        Ok(self.state.read().accounts.get(address).cloned())
    }

    fn save_account(&self, account: &A) -> Result<()> {
        let mut state = self.state.write();
        Self::record(&mut state, account.address());
        state
            .accounts
            .insert(account.address().to_vec(), account.clone());
        Ok(())
    }

    fn remove_account(&self, address: &[u8]) -> Result<()> {
        let mut state = self.state.write();
        if !state.accounts.contains_key(address) {
            return Ok(());
        }
        Self::record(&mut state, address);
        state.accounts.remove(address);
        Ok(())
    }
}
