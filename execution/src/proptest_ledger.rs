//! Property tests for the credit and settlement invariants.
//!
//! 1. **Arrival-order acceptance**: when one bettor's bets exceed their
//!    balance, a bet is accepted iff the balance left by the bets before it
//!    covers it, and the balance never goes negative.
//!
//! 2. **Conservation**: after settlement every account holds its starting
//!    balance minus its stakes plus exactly the formula payout of each bet.

use crate::mocks::{balance_of, seeded_arena, Memory};
use crate::settlement::win_payout;
use sabong_types::{api::SettingsUpdate, Outcome, Side};
use proptest::prelude::*;

fn arb_side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Meron), Just(Side::Wala)]
}

fn arb_outcome() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        Just(Outcome::Meron),
        Just(Outcome::Wala),
        Just(Outcome::Draw),
        Just(Outcome::Cancelled),
    ]
}

proptest! {
    #[test]
    fn bets_are_accepted_in_arrival_order(
        balance in 0u64..5_000,
        stakes in prop::collection::vec(1u64..1_500, 1..24),
    ) {
        let (mut arena, op, _, players) = seeded_arena(Memory::default(), &["xavier"], balance);
        let x = players[0];
        arena.open_betting(&op).unwrap();

        let mut remaining = balance;
        for stake in &stakes {
            let res = arena.place_bet(&x, Side::Meron, *stake, None, 0);
            if *stake <= remaining {
                remaining -= stake;
                prop_assert_eq!(res.unwrap().1, Some(remaining));
            } else {
                prop_assert_eq!(res.unwrap_err().code(), "INSUFFICIENT_CREDITS");
            }
            prop_assert_eq!(balance_of(&arena, x.id), remaining);
        }

        let (bets, totals) = arena.bets();
        prop_assert_eq!(totals.meron.stake, balance - remaining);
        prop_assert_eq!(bets.len() as u32, totals.meron.count);
    }

    #[test]
    fn equal_stakes_accept_a_prefix(
        stake in 1u64..500,
        count in 1usize..30,
        affordable in 0u64..20,
    ) {
        let balance = stake * affordable;
        let (mut arena, op, _, players) = seeded_arena(Memory::default(), &["xavier"], balance);
        arena.open_betting(&op).unwrap();

        let accepted: Vec<bool> = (0..count)
            .map(|_| arena.place_bet(&players[0], Side::Wala, stake, None, 0).is_ok())
            .collect();
        let expected = count.min(affordable as usize);
        prop_assert!(accepted[..expected].iter().all(|ok| *ok));
        prop_assert!(accepted[expected..].iter().all(|ok| !*ok));
    }

    #[test]
    fn settlement_conserves_credits(
        bets in prop::collection::vec((0usize..4, arb_side(), 1u64..2_000), 0..40),
        outcome in arb_outcome(),
        rake_bps in 0u32..=5_000,
    ) {
        let start = 100_000u64;
        let (mut arena, op, _, players) =
            seeded_arena(Memory::default(), &["ana", "ben", "cora", "dino"], start);
        let update = SettingsUpdate {
            rake_percentage: Some(f64::from(rake_bps) / 100.0),
            ..SettingsUpdate::default()
        };
        arena.update_settings(&op, &update).unwrap();
        prop_assert_eq!(arena.settings().rake_bps, rake_bps);
        arena.open_betting(&op).unwrap();

        let mut expected = vec![start; players.len()];
        for (who, side, stake) in &bets {
            arena.place_bet(&players[*who], *side, *stake, None, 0).unwrap();
            expected[*who] -= stake;
            expected[*who] += match outcome.winner() {
                None => *stake,
                Some(winner) if winner == *side => win_payout(*stake, rake_bps),
                Some(_) => 0,
            };
        }
        arena.close_betting(&op).unwrap();
        let entry = arena.declare_winner(&op, outcome, 1).unwrap();

        let mut paid = 0;
        for (player, expected) in players.iter().zip(&expected) {
            prop_assert_eq!(balance_of(&arena, player.id), *expected);
            paid += expected + bets
                .iter()
                .filter(|(who, _, _)| players[*who].id == player.id)
                .map(|(_, _, stake)| stake)
                .sum::<u64>()
                - start;
        }
        prop_assert_eq!(entry.paid_out, paid);
        if outcome.winner().is_none() {
            prop_assert!(expected.iter().all(|balance| *balance == start));
        }
    }
}
