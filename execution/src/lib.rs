//! Sabong arena execution layer.
//!
//! This crate holds the ledger semantics of a live fight-wagering session: the
//! fight phase machine, the bet ledger, settlement, credit accounts and the
//! cash-request workflow. All of it is composed by [`Arena`], a single owned
//! state object that the server keeps behind one lock.
//!
//! ## Consistency rules
//! - Commands stage absolute writes in a [`Layer`] and commit them to a
//!   [`Store`] as one batch. Memory changes only after the commit succeeds, so a
//!   failed command (including a failed settlement) is never partially visible.
//! - Balances never go below zero; every debit is checked inside the same batch
//!   that records the reason for it.
//! - A fight is settled at most once; its history entry is the marker.
//! - Time is passed in by the caller (`now_ms`); nothing here reads the clock.
//!
//! ## Example
//! ```rust,ignore
//! use sabong_execution::{mocks::{seeded_arena, Memory}, Arena};
//! use sabong_types::{Outcome, Side};
//!
//! let (mut arena, operator, _cashier, players) = seeded_arena(Memory::default(), &["ana"], 1_000);
//! arena.open_betting(&operator)?;
//! arena.place_bet(&players[0], Side::Meron, 100, None, 0)?;
//! arena.close_betting(&operator)?;
//! arena.declare_winner(&operator, Outcome::Meron, 0)?;
//! for event in arena.drain_events() {
//!     println!("{}", event.kind());
//! }
//! ```

pub mod accounts;
pub mod arena;
pub mod cashier;
pub mod error;
pub mod fight;
pub mod ledger;
pub mod settlement;
pub mod state;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

#[cfg(test)]
mod proptest_ledger;

pub use accounts::Account;
pub use arena::{Actor, Arena, ArenaConfig, Countdown, Transactions};
pub use error::{ArenaError, Result};
pub use fight::FightRecord;
pub use state::{Key, Layer, Status, Store, StoreError, Tables, Value};
