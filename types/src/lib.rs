//! Common types shared by the sabong arena crates.
//!
//! Everything here is plain data: identifiers, fight/bet/cash-request records,
//! the broadcast [`Event`] stream and the JSON request/response payloads of the
//! HTTP surface. Behavior lives in `sabong-execution` (ledger semantics) and
//! `sabong-server` (transport).

pub mod api;
pub mod cash;
pub mod events;
pub mod fight;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use cash::{CashRequest, CashStatus, Destination, DestinationError, Direction};
pub use events::{Audience, BalanceUpdate, Envelope, Event, Snapshot, Viewer};
pub use fight::{
    Bet, BetTotals, FightView, HistoryEntry, Outcome, Phase, Resolution, Settings, Side,
    SideTotals,
};

/// Credits granted to a freshly registered bettor.
pub const SIGNUP_BONUS: u64 = 1_000;

/// Basis-point denominator used for the rake.
pub const BPS_DENOMINATOR: u64 = 10_000;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Surrogate key of a registered account.
    UserId
);
id_type!(
    /// Surrogate key of a bet row.
    BetId
);
id_type!(
    /// Surrogate key of a deposit or withdrawal request.
    RequestId
);

/// Account role. Cashiers and operators are "staff".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "user")]
    Bettor,
    Cashier,
    #[serde(alias = "admin")]
    Operator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Bettor => "bettor",
            Role::Cashier => "cashier",
            Role::Operator => "operator",
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Cashier | Role::Operator)
    }
}

impl std::str::FromStr for Role {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "bettor" | "user" => Ok(Role::Bettor),
            "cashier" => Ok(Role::Cashier),
            "operator" | "admin" => Ok(Role::Operator),
            _ => Err("valid values: bettor, cashier, operator"),
        }
    }
}

/// Public view of an account (never carries the credential).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountView {
    pub id: UserId,
    pub username: String,
    pub role: Role,
    pub balance: u64,
    pub disabled: bool,
    pub created_at_ms: u64,
}
