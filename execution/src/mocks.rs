//! Stores and helpers for tests.

use sabong_types::{Role, UserId};
use std::collections::BTreeMap;

use crate::{
    arena::{Actor, Arena, ArenaConfig},
    state::{Key, Status, Store, StoreError, Value},
};

/// Keeps committed rows in a map and counts commits.
#[derive(Default)]
pub struct Memory {
    pub rows: BTreeMap<Key, Value>,
    pub commits: usize,
}

impl Store for Memory {
    fn apply(&mut self, changes: &[(Key, Status)]) -> Result<(), StoreError> {
        for (key, status) in changes {
            match status {
                Status::Update(value) => {
                    self.rows.insert(key.clone(), value.clone());
                }
                Status::Delete => {
                    self.rows.remove(key);
                }
            }
        }
        self.commits += 1;
        Ok(())
    }
}

impl Memory {
    /// Every committed row, as a restart would load them.
    pub fn dump(&self) -> Vec<Value> {
        self.rows.values().cloned().collect()
    }
}

/// A [`Memory`] store that can be told to fail its next commits.
#[derive(Default)]
pub struct Flaky {
    pub inner: Memory,
    pub failures_left: u32,
    pub attempts: u32,
}

impl Flaky {
    pub fn failing(failures: u32) -> Self {
        Self {
            failures_left: failures,
            ..Self::default()
        }
    }

    pub fn fail_next(&mut self, failures: u32) {
        self.failures_left = failures;
    }
}

impl Store for Flaky {
    fn apply(&mut self, changes: &[(Key, Status)]) -> Result<(), StoreError> {
        self.attempts += 1;
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(StoreError::Backend("injected failure".to_string()));
        }
        self.inner.apply(changes)
    }
}

/// Arena over `store` with one operator, one cashier and the given bettors
/// (each starting with `balance`). Returns the actors in that order.
pub fn seeded_arena<S: Store>(
    store: S,
    bettors: &[&str],
    balance: u64,
) -> (Arena<S>, Actor, Actor, Vec<Actor>) {
    let config = ArenaConfig {
        signup_bonus: balance,
        ..ArenaConfig::default()
    };
    let mut arena = Arena::new(store, config).with_seed(42);
    let register = |arena: &mut Arena<S>, name: &str, role: Role| {
        let account = arena
            .register(name, String::new(), role, 0)
            .expect("register test account");
        Actor {
            id: account.id,
            role,
        }
    };
    let operator = register(&mut arena, "operator", Role::Operator);
    let cashier = register(&mut arena, "cashier", Role::Cashier);
    let players = bettors
        .iter()
        .map(|name| register(&mut arena, *name, Role::Bettor))
        .collect();
    arena.drain_events();
    (arena, operator, cashier, players)
}

pub fn balance_of<S: Store>(arena: &Arena<S>, user: UserId) -> u64 {
    arena.account(user).map(|account| account.balance).unwrap_or_default()
}
