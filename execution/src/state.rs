//! Keyed arena state, the staging layer commands write through, and the
//! [`Store`] seam that makes a batch of changes durable.
//!
//! Commands never mutate [`Tables`] directly. They stage absolute writes in a
//! [`Layer`], hand the resulting change set to the store, and only once the
//! store accepted it are the same changes applied to memory.

use sabong_types::{Bet, BetId, CashRequest, HistoryEntry, RequestId, Settings, UserId};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

use crate::{
    accounts::Account,
    error::{ArenaError, Result},
    fight::FightRecord,
};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Account(UserId),
    Fight,
    Settings,
    Bet(BetId),
    History(u64),
    CashRequest(RequestId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Account(Account),
    Fight(FightRecord),
    Settings(Settings),
    Bet(Bet),
    History(HistoryEntry),
    CashRequest(CashRequest),
}

impl Value {
    pub fn key(&self) -> Key {
        match self {
            Value::Account(account) => Key::Account(account.id),
            Value::Fight(_) => Key::Fight,
            Value::Settings(_) => Key::Settings,
            Value::Bet(bet) => Key::Bet(bet.id),
            Value::History(entry) => Key::History(entry.fight),
            Value::CashRequest(request) => Key::CashRequest(request.id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Update(Value),
    Delete,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend: {0}")]
    Backend(String),
}

/// Durable home of the arena's rows.
///
/// `apply` must be all-or-nothing: either every change is persisted or none is.
pub trait Store: Send {
    fn apply(&mut self, changes: &[(Key, Status)]) -> std::result::Result<(), StoreError>;
}

impl<T: Store + ?Sized> Store for Box<T> {
    fn apply(&mut self, changes: &[(Key, Status)]) -> std::result::Result<(), StoreError> {
        (**self).apply(changes)
    }
}

/// In-memory view of every row, rebuilt from the store at startup.
#[derive(Clone, Debug, Default)]
pub struct Tables {
    pub(crate) accounts: BTreeMap<UserId, Account>,
    pub(crate) usernames: HashMap<String, UserId>,
    pub(crate) fight: FightRecord,
    pub(crate) settings: Settings,
    pub(crate) bets: BTreeMap<BetId, Bet>,
    pub(crate) history: BTreeMap<u64, HistoryEntry>,
    pub(crate) requests: BTreeMap<RequestId, CashRequest>,
    pub(crate) references: HashSet<String>,
}

impl Tables {
    pub fn from_rows(rows: impl IntoIterator<Item = Value>) -> Self {
        let mut tables = Self::default();
        let changes: Vec<_> = rows
            .into_iter()
            .map(|value| (value.key(), Status::Update(value)))
            .collect();
        tables.apply(&changes);
        tables
    }

    pub fn get(&self, key: &Key) -> Option<Value> {
        match key {
            Key::Account(id) => self.accounts.get(id).cloned().map(Value::Account),
            Key::Fight => Some(Value::Fight(self.fight.clone())),
            Key::Settings => Some(Value::Settings(self.settings.clone())),
            Key::Bet(id) => self.bets.get(id).cloned().map(Value::Bet),
            Key::History(fight) => self.history.get(fight).cloned().map(Value::History),
            Key::CashRequest(id) => self.requests.get(id).cloned().map(Value::CashRequest),
        }
    }

    pub(crate) fn apply(&mut self, changes: &[(Key, Status)]) {
        for (key, status) in changes {
            match (key, status) {
                (_, Status::Update(Value::Account(account))) => {
                    self.usernames
                        .insert(account.username.to_ascii_lowercase(), account.id);
                    self.accounts.insert(account.id, account.clone());
                }
                (_, Status::Update(Value::Fight(fight))) => self.fight.absorb(fight),
                (_, Status::Update(Value::Settings(settings))) => {
                    self.settings = settings.clone();
                }
                (_, Status::Update(Value::Bet(bet))) => {
                    self.bets.insert(bet.id, bet.clone());
                }
                (_, Status::Update(Value::History(entry))) => {
                    self.history.insert(entry.fight, entry.clone());
                }
                (_, Status::Update(Value::CashRequest(request))) => {
                    self.references.insert(request.reference.clone());
                    self.requests.insert(request.id, request.clone());
                }
                (Key::Bet(id), Status::Delete) => {
                    self.bets.remove(id);
                }
                (Key::CashRequest(id), Status::Delete) => {
                    if let Some(request) = self.requests.remove(id) {
                        self.references.remove(&request.reference);
                    }
                }
                (Key::History(fight), Status::Delete) => {
                    self.history.remove(fight);
                }
                // Accounts are soft-disabled, singletons are never removed.
                (Key::Account(_) | Key::Fight | Key::Settings, Status::Delete) => {}
            }
        }
    }
}

/// Staged writes over a read-only [`Tables`] base.
pub struct Layer<'a> {
    base: &'a Tables,
    pending: BTreeMap<Key, Status>,
}

impl<'a> Layer<'a> {
    pub fn new(base: &'a Tables) -> Self {
        Self {
            base,
            pending: BTreeMap::new(),
        }
    }

    pub fn base(&self) -> &Tables {
        self.base
    }

    pub fn get(&self, key: &Key) -> Option<Value> {
        match self.pending.get(key) {
            Some(Status::Update(value)) => Some(value.clone()),
            Some(Status::Delete) => None,
            None => self.base.get(key),
        }
    }

    pub fn insert(&mut self, value: Value) {
        self.pending.insert(value.key(), Status::Update(value));
    }

    pub fn delete(&mut self, key: Key) {
        self.pending.insert(key, Status::Delete);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn commit(self) -> Vec<(Key, Status)> {
        self.pending.into_iter().collect()
    }

    pub fn account(&self, id: UserId) -> Result<Account> {
        match self.get(&Key::Account(id)) {
            Some(Value::Account(account)) => Ok(account),
            _ => Err(ArenaError::not_found("user", id)),
        }
    }

    pub fn fight(&self) -> FightRecord {
        match self.get(&Key::Fight) {
            Some(Value::Fight(fight)) => fight,
            _ => self.base.fight.clone(),
        }
    }

    pub fn settings(&self) -> Settings {
        match self.get(&Key::Settings) {
            Some(Value::Settings(settings)) => settings,
            _ => self.base.settings.clone(),
        }
    }

    pub fn bet(&self, id: BetId) -> Result<Bet> {
        match self.get(&Key::Bet(id)) {
            Some(Value::Bet(bet)) => Ok(bet),
            _ => Err(ArenaError::not_found("bet", id)),
        }
    }

    pub fn request(&self, id: RequestId) -> Result<CashRequest> {
        match self.get(&Key::CashRequest(id)) {
            Some(Value::CashRequest(request)) => Ok(request),
            _ => Err(ArenaError::not_found("cash request", id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sabong_types::{Phase, Role};

    fn account(id: u64, balance: u64) -> Account {
        Account {
            id: UserId(id),
            username: format!("user{id}"),
            role: Role::Bettor,
            balance,
            disabled: false,
            credential: String::new(),
            created_at_ms: 0,
        }
    }

    #[test]
    fn layer_reads_its_own_writes_without_touching_base() {
        let tables = Tables::from_rows([Value::Account(account(1, 100))]);
        let mut layer = Layer::new(&tables);
        let mut updated = layer.account(UserId(1)).unwrap();
        updated.balance = 40;
        layer.insert(Value::Account(updated));

        assert_eq!(layer.account(UserId(1)).unwrap().balance, 40);
        assert_eq!(tables.accounts[&UserId(1)].balance, 100);
    }

    #[test]
    fn committed_changes_apply_to_tables() {
        let mut tables = Tables::from_rows([Value::Account(account(1, 100))]);
        let changes = {
            let mut layer = Layer::new(&tables);
            let mut fight = layer.fight();
            fight.phase = Phase::Open;
            layer.insert(Value::Fight(fight));
            layer.commit()
        };
        tables.apply(&changes);
        assert_eq!(tables.fight.phase, Phase::Open);
        assert_eq!(tables.fight.epoch, 1);
    }

    #[test]
    fn missing_rows_are_not_found() {
        let tables = Tables::default();
        let layer = Layer::new(&tables);
        assert_eq!(
            layer.account(UserId(9)).unwrap_err().code(),
            "NOT_FOUND"
        );
    }
}
