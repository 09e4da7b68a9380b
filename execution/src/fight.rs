//! Fight lifecycle: `waiting → open → lastcall → closed → result → waiting`.

use sabong_types::{FightView, Phase};

use crate::error::{ArenaError, Result};

pub const MIN_LAST_CALL_SECS: u32 = 1;
pub const MAX_LAST_CALL_SECS: u32 = 600;

/// Current fight. Only `number` and `phase` are persisted; `epoch` and
/// `deadline_ms` live in memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FightRecord {
    pub number: u64,
    pub phase: Phase,
    /// Bumped on every phase change; a countdown only fires for its own epoch.
    pub epoch: u64,
    pub deadline_ms: Option<u64>,
    /// Highest bet id ever issued. Removed bets leave no row behind, so the
    /// id sequence is carried here.
    pub last_bet: u64,
}

impl Default for FightRecord {
    fn default() -> Self {
        Self {
            number: 1,
            phase: Phase::Waiting,
            epoch: 0,
            deadline_ms: None,
            last_bet: 0,
        }
    }
}

impl FightRecord {
    pub fn view(&self) -> FightView {
        FightView {
            number: self.number,
            phase: self.phase,
            deadline_ms: self.deadline_ms,
        }
    }

    /// Copies a committed record in, advancing the epoch on a phase change.
    pub(crate) fn absorb(&mut self, next: &FightRecord) {
        if next.phase != self.phase {
            self.epoch += 1;
        }
        self.number = next.number;
        self.phase = next.phase;
        self.deadline_ms = next.deadline_ms;
        self.last_bet = next.last_bet;
    }

    /// Restores a persisted record. A countdown cannot outlive the process, so
    /// a fight saved in `lastcall` comes back `closed`.
    pub fn restored(number: u64, phase: Phase) -> Self {
        let phase = match phase {
            Phase::LastCall => Phase::Closed,
            other => other,
        };
        Self {
            number,
            phase,
            epoch: 0,
            deadline_ms: None,
            last_bet: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    OpenBetting,
    LastCall,
    CloseBetting,
    DeclareWinner,
    ResetFight,
    SetFightNumber,
    RemoveBet,
    PlaceBet,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::OpenBetting => "open_betting",
            Command::LastCall => "last_call",
            Command::CloseBetting => "close_betting",
            Command::DeclareWinner => "declare_winner",
            Command::ResetFight => "reset_fight",
            Command::SetFightNumber => "set_fight_number",
            Command::RemoveBet => "remove_bet",
            Command::PlaceBet => "place_bet",
        }
    }
}

/// Phase reached by running `command` in `phase`, or `InvalidTransition`.
///
/// Commands that do not change the phase (`set_fight_number`, bet
/// placement and removal) return `phase` unchanged when admitted.
pub fn next_phase(command: Command, phase: Phase) -> Result<Phase> {
    let next = match (command, phase) {
        (Command::OpenBetting, Phase::Waiting | Phase::LastCall | Phase::Closed) => Phase::Open,
        (Command::LastCall, Phase::Open) => Phase::LastCall,
        (Command::CloseBetting, Phase::Open | Phase::LastCall) => Phase::Closed,
        (Command::DeclareWinner, Phase::Closed) => Phase::Result,
        (Command::ResetFight, Phase::Result) => Phase::Waiting,
        (Command::SetFightNumber, Phase::Waiting) => Phase::Waiting,
        (Command::PlaceBet, Phase::Open | Phase::LastCall) => phase,
        (Command::RemoveBet, Phase::Open | Phase::LastCall | Phase::Closed) => phase,
        _ => {
            return Err(ArenaError::InvalidTransition {
                command: command.name(),
                phase,
            })
        }
    };
    Ok(next)
}

pub fn validate_countdown(seconds: u32) -> Result<u32> {
    if !(MIN_LAST_CALL_SECS..=MAX_LAST_CALL_SECS).contains(&seconds) {
        return Err(ArenaError::invalid(format!(
            "countdown must be {MIN_LAST_CALL_SECS} to {MAX_LAST_CALL_SECS} seconds"
        )));
    }
    Ok(seconds)
}

/// Next fight number after `current` that is not already in history.
pub fn next_free_number(current: u64, settled: impl Fn(u64) -> bool) -> u64 {
    let mut candidate = current.saturating_add(1);
    while settled(candidate) {
        candidate = candidate.saturating_add(1);
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Phase; 5] = [
        Phase::Waiting,
        Phase::Open,
        Phase::LastCall,
        Phase::Closed,
        Phase::Result,
    ];

    #[test]
    fn open_is_accepted_from_waiting_lastcall_and_closed() {
        for phase in ALL {
            let res = next_phase(Command::OpenBetting, phase);
            match phase {
                Phase::Waiting | Phase::LastCall | Phase::Closed => {
                    assert_eq!(res.unwrap(), Phase::Open)
                }
                _ => assert!(matches!(
                    res,
                    Err(ArenaError::InvalidTransition {
                        command: "open_betting",
                        ..
                    })
                )),
            }
        }
    }

    #[test]
    fn only_open_and_lastcall_take_bets() {
        let bettable: Vec<_> = ALL
            .into_iter()
            .filter(|phase| next_phase(Command::PlaceBet, *phase).is_ok())
            .collect();
        assert_eq!(bettable, vec![Phase::Open, Phase::LastCall]);
        assert!(bettable.iter().all(Phase::is_bettable));
    }

    #[test]
    fn declare_requires_closed() {
        assert_eq!(
            next_phase(Command::DeclareWinner, Phase::Closed).unwrap(),
            Phase::Result
        );
        assert!(next_phase(Command::DeclareWinner, Phase::Open).is_err());
        assert!(next_phase(Command::DeclareWinner, Phase::LastCall).is_err());
    }

    #[test]
    fn absorb_bumps_epoch_only_on_phase_change() {
        let mut fight = FightRecord::default();
        let mut next = fight.clone();
        next.number = 9;
        fight.absorb(&next);
        assert_eq!(fight.epoch, 0);
        next.phase = Phase::Open;
        fight.absorb(&next);
        assert_eq!(fight.epoch, 1);
        assert_eq!(fight.number, 9);
    }

    #[test]
    fn reset_skips_settled_numbers() {
        let settled = [8u64, 9];
        assert_eq!(next_free_number(7, |n| settled.contains(&n)), 10);
        assert_eq!(next_free_number(10, |n| settled.contains(&n)), 11);
    }

    #[test]
    fn lastcall_is_restored_as_closed() {
        assert_eq!(FightRecord::restored(4, Phase::LastCall).phase, Phase::Closed);
        assert_eq!(FightRecord::restored(4, Phase::Open).phase, Phase::Open);
    }

    #[test]
    fn countdown_bounds() {
        assert!(validate_countdown(0).is_err());
        assert_eq!(validate_countdown(10).unwrap(), 10);
        assert!(validate_countdown(601).is_err());
    }
}
