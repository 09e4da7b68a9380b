//! Settlement of a declared fight.
//!
//! Winners on the declared side are paid `floor(stake * (20000 - rake_bps) / 10000)`,
//! losers get nothing, and a draw or cancellation refunds every stake. Walk-up
//! bets are resolved for the record but never credited.

use sabong_types::{
    BalanceUpdate, Bet, BetTotals, HistoryEntry, Outcome, Phase, Resolution, UserId,
    BPS_DENOMINATOR,
};
use std::collections::BTreeMap;

use crate::{
    accounts,
    error::{ArenaError, Result},
    fight::FightRecord,
    ledger,
    state::{Key, Layer, Value},
};

pub const DEFAULT_SETTLEMENT_MAX_ATTEMPTS: u32 = 3;
/// Highest rake the operator may configure (50%).
pub const MAX_RAKE_BPS: u32 = 5_000;

/// Credit returned for a winning stake, rounded down.
pub fn win_payout(stake: u64, rake_bps: u32) -> u64 {
    let multiplier = (2 * BPS_DENOMINATOR).saturating_sub(u64::from(rake_bps));
    let payout = u128::from(stake) * u128::from(multiplier) / u128::from(BPS_DENOMINATOR);
    u64::try_from(payout).unwrap_or(u64::MAX)
}

pub fn resolve(bet: &Bet, outcome: Outcome, rake_bps: u32) -> (Resolution, u64) {
    match outcome.winner() {
        None => (Resolution::Refund, bet.stake),
        Some(side) if side == bet.side => (Resolution::Win, win_payout(bet.stake, rake_bps)),
        Some(_) => (Resolution::Lose, 0),
    }
}

/// Result of staging a settlement: the history entry and the post-settlement
/// balance of every account that had a bet on the fight.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settlement {
    pub entry: HistoryEntry,
    pub balances: Vec<BalanceUpdate>,
}

/// Stages every bet resolution, credit, the history entry and the
/// `closed → result` transition into one change set.
pub fn stage_settlement(
    layer: &mut Layer<'_>,
    fight: &FightRecord,
    outcome: Outcome,
    rake_bps: u32,
    now_ms: u64,
) -> Result<Settlement> {
    if layer.get(&Key::History(fight.number)).is_some() {
        return Err(ArenaError::AlreadySettled {
            fight: fight.number,
        });
    }

    let bets = ledger::bets_for(layer.base(), fight.number);
    let totals = BetTotals::from_bets(&bets);
    let mut paid_out = 0u64;
    let mut balances: BTreeMap<UserId, u64> = BTreeMap::new();

    for mut bet in bets {
        if bet.resolution != Resolution::Pending {
            continue;
        }
        let (resolution, payout) = resolve(&bet, outcome, rake_bps);
        bet.resolution = resolution;
        bet.payout = payout;
        paid_out = paid_out.saturating_add(payout);

        if let Some(user) = bet.user_id {
            let balance = if payout > 0 {
                accounts::credit(layer, user, payout)?
            } else {
                layer.account(user)?.balance
            };
            balances.insert(user, balance);
        }
        layer.insert(Value::Bet(bet));
    }

    let entry = HistoryEntry {
        fight: fight.number,
        outcome,
        resolved_at_ms: now_ms,
        totals,
        paid_out,
    };
    layer.insert(Value::History(entry.clone()));
    layer.insert(Value::Fight(FightRecord {
        phase: Phase::Result,
        deadline_ms: None,
        ..fight.clone()
    }));

    Ok(Settlement {
        entry,
        balances: balances
            .into_iter()
            .map(|(user_id, balance)| BalanceUpdate { user_id, balance })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sabong_types::{BetId, Side};

    fn bet(side: Side, stake: u64) -> Bet {
        Bet {
            id: BetId(1),
            fight: 1,
            side,
            stake,
            name: "x".to_string(),
            user_id: None,
            placed_at_ms: 0,
            resolution: Resolution::Pending,
            payout: 0,
        }
    }

    #[test]
    fn payout_applies_rake_and_rounds_down() {
        assert_eq!(win_payout(500, 500), 975);
        assert_eq!(win_payout(100, 0), 200);
        assert_eq!(win_payout(33, 500), 64);
        assert_eq!(win_payout(u64::MAX, 0), u64::MAX);
    }

    #[test]
    fn resolution_by_outcome() {
        let meron = bet(Side::Meron, 100);
        assert_eq!(resolve(&meron, Outcome::Meron, 500), (Resolution::Win, 195));
        assert_eq!(resolve(&meron, Outcome::Wala, 500), (Resolution::Lose, 0));
        assert_eq!(resolve(&meron, Outcome::Draw, 500), (Resolution::Refund, 100));
        assert_eq!(
            resolve(&meron, Outcome::Cancelled, 500),
            (Resolution::Refund, 100)
        );
    }
}
