//! Bet ledger: one immutable entry per placement against the current fight.

use sabong_types::{Bet, BetId, BetTotals, Resolution, Side, UserId};

use crate::{
    accounts,
    error::{ArenaError, Result},
    state::{Key, Layer, Tables, Value},
};

pub const DEFAULT_MAX_BET: u64 = 100_000;
pub const MAX_NAME_CHARS: usize = 50;

/// Who pays for a bet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Funding {
    Account(UserId),
    /// Cash taken at the window by the operator; never debited or credited.
    WalkUp(String),
}

pub fn validate_stake(stake: u64, max_bet: u64) -> Result<u64> {
    if stake == 0 || stake > max_bet {
        return Err(ArenaError::invalid(format!(
            "stake must be between 1 and {max_bet}"
        )));
    }
    Ok(stake)
}

pub fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    let chars = trimmed.chars().count();
    if chars == 0 || chars > MAX_NAME_CHARS {
        return Err(ArenaError::invalid(format!(
            "bettor name must be 1 to {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Stages a new pending bet, debiting the stake when account-funded.
///
/// Returns the bet and, for account-funded bets, the bettor's new balance.
pub fn stage_bet(
    layer: &mut Layer<'_>,
    id: BetId,
    fight: u64,
    side: Side,
    stake: u64,
    funding: Funding,
    now_ms: u64,
) -> Result<(Bet, Option<u64>)> {
    let (name, user_id, balance) = match funding {
        Funding::Account(user) => {
            let account = layer.account(user)?;
            account.ensure_active()?;
            let balance = accounts::debit(layer, user, stake)?;
            (account.username, Some(user), Some(balance))
        }
        Funding::WalkUp(name) => (validate_name(&name)?, None, None),
    };
    let bet = Bet {
        id,
        fight,
        side,
        stake,
        name,
        user_id,
        placed_at_ms: now_ms,
        resolution: Resolution::Pending,
        payout: 0,
    };
    layer.insert(Value::Bet(bet.clone()));
    let mut record = layer.fight();
    record.last_bet = record.last_bet.max(id.0);
    layer.insert(Value::Fight(record));
    Ok((bet, balance))
}

/// Stages deletion of a pending bet of `fight`, refunding a funded stake.
///
/// Returns the removed bet and the refunded owner's new balance.
pub fn stage_removal(
    layer: &mut Layer<'_>,
    id: BetId,
    fight: u64,
) -> Result<(Bet, Option<(UserId, u64)>)> {
    let bet = layer.bet(id)?;
    if bet.fight != fight || bet.resolution != Resolution::Pending {
        return Err(ArenaError::not_found("pending bet", id));
    }
    layer.delete(Key::Bet(id));
    let refund = match bet.user_id {
        Some(user) => Some((user, accounts::credit(layer, user, bet.stake)?)),
        None => None,
    };
    Ok((bet, refund))
}

/// Bets of `fight` in placement order.
pub fn bets_for(tables: &Tables, fight: u64) -> Vec<Bet> {
    tables
        .bets
        .values()
        .filter(|bet| bet.fight == fight)
        .cloned()
        .collect()
}

pub fn totals_for(tables: &Tables, fight: u64) -> BetTotals {
    BetTotals::from_bets(tables.bets.values().filter(|bet| bet.fight == fight))
}
