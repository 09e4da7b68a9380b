use serde::{Deserialize, Serialize};

use crate::{BetId, UserId};

/// Lifecycle phase of the current fight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Waiting,
    Open,
    #[serde(alias = "last_call")]
    LastCall,
    Closed,
    Result,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Waiting => "waiting",
            Phase::Open => "open",
            Phase::LastCall => "lastcall",
            Phase::Closed => "closed",
            Phase::Result => "result",
        }
    }

    /// Only `open` and `lastcall` admit new bets.
    pub fn is_bettable(&self) -> bool {
        matches!(self, Phase::Open | Phase::LastCall)
    }

    pub fn from_str_opt(value: &str) -> Option<Self> {
        match value {
            "waiting" => Some(Phase::Waiting),
            "open" => Some(Phase::Open),
            "lastcall" => Some(Phase::LastCall),
            "closed" => Some(Phase::Closed),
            "result" => Some(Phase::Result),
            _ => None,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two competing sides. Meron is side A, Wala is side B.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[serde(alias = "sideA", alias = "side_a", alias = "a")]
    Meron,
    #[serde(alias = "sideB", alias = "side_b", alias = "b")]
    Wala,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Meron => "meron",
            Side::Wala => "wala",
        }
    }

    pub fn from_str_opt(value: &str) -> Option<Self> {
        match value {
            "meron" => Some(Side::Meron),
            "wala" => Some(Side::Wala),
            _ => None,
        }
    }
}

/// Declared result of a fight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    #[serde(alias = "sideA", alias = "side_a")]
    Meron,
    #[serde(alias = "sideB", alias = "side_b")]
    Wala,
    Draw,
    Cancelled,
}

impl Outcome {
    /// Winning side, or `None` when every bet is refunded.
    pub fn winner(&self) -> Option<Side> {
        match self {
            Outcome::Meron => Some(Side::Meron),
            Outcome::Wala => Some(Side::Wala),
            Outcome::Draw | Outcome::Cancelled => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Meron => "meron",
            Outcome::Wala => "wala",
            Outcome::Draw => "draw",
            Outcome::Cancelled => "cancelled",
        }
    }

    pub fn from_str_opt(value: &str) -> Option<Self> {
        match value {
            "meron" => Some(Outcome::Meron),
            "wala" => Some(Outcome::Wala),
            "draw" => Some(Outcome::Draw),
            "cancelled" => Some(Outcome::Cancelled),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Pending,
    Win,
    Lose,
    Refund,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Pending => "pending",
            Resolution::Win => "win",
            Resolution::Lose => "lose",
            Resolution::Refund => "refund",
        }
    }

    pub fn from_str_opt(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Resolution::Pending),
            "win" => Some(Resolution::Win),
            "lose" => Some(Resolution::Lose),
            "refund" => Some(Resolution::Refund),
            _ => None,
        }
    }
}

/// A single wager. `user_id` is `None` for walk-up bets entered by the
/// operator, which are never debited nor credited.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub id: BetId,
    pub fight: u64,
    pub side: Side,
    pub stake: u64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_id: Option<UserId>,
    pub placed_at_ms: u64,
    pub resolution: Resolution,
    pub payout: u64,
}

impl Bet {
    pub fn is_funded(&self) -> bool {
        self.user_id.is_some()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideTotals {
    pub count: u32,
    pub stake: u64,
}

impl SideTotals {
    pub fn add(&mut self, stake: u64) {
        self.count = self.count.saturating_add(1);
        self.stake = self.stake.saturating_add(stake);
    }
}

/// Per-side aggregate of the current fight's bets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetTotals {
    pub meron: SideTotals,
    pub wala: SideTotals,
}

impl BetTotals {
    pub fn from_bets<'a>(bets: impl IntoIterator<Item = &'a Bet>) -> Self {
        let mut totals = Self::default();
        for bet in bets {
            totals.side_mut(bet.side).add(bet.stake);
        }
        totals
    }

    pub fn side_mut(&mut self, side: Side) -> &mut SideTotals {
        match side {
            Side::Meron => &mut self.meron,
            Side::Wala => &mut self.wala,
        }
    }
}

/// Append-only record of a settled fight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub fight: u64,
    pub outcome: Outcome,
    pub resolved_at_ms: u64,
    pub totals: BetTotals,
    pub paid_out: u64,
}

/// Operator-tunable session settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Presentation delay of the video feed; the ledger never waits on it.
    pub stream_delay_secs: u32,
    /// Countdown used by `last_call` when no explicit duration is given.
    pub last_call_secs: u32,
    pub rake_bps: u32,
    pub house_account_number: String,
    pub house_account_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            stream_delay_secs: 5,
            last_call_secs: 10,
            rake_bps: 500,
            house_account_number: String::new(),
            house_account_name: String::new(),
        }
    }
}

/// What observers need to render the fight header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FightView {
    pub number: u64,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub deadline_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_aliases_map_to_meron_and_wala() {
        let side: Side = serde_json::from_str("\"sideA\"").unwrap();
        assert_eq!(side, Side::Meron);
        let side: Side = serde_json::from_str("\"b\"").unwrap();
        assert_eq!(side, Side::Wala);
        assert_eq!(serde_json::to_string(&Phase::LastCall).unwrap(), "\"lastcall\"");
    }

    #[test]
    fn refund_outcomes_have_no_winner() {
        assert_eq!(Outcome::Meron.winner(), Some(Side::Meron));
        assert_eq!(Outcome::Draw.winner(), None);
        assert_eq!(Outcome::Cancelled.winner(), None);
    }

    #[test]
    fn totals_split_by_side() {
        let bet = |side, stake| Bet {
            id: BetId(1),
            fight: 1,
            side,
            stake,
            name: "x".to_string(),
            user_id: None,
            placed_at_ms: 0,
            resolution: Resolution::Pending,
            payout: 0,
        };
        let bets = [bet(Side::Meron, 100), bet(Side::Wala, 50), bet(Side::Meron, 25)];
        let totals = BetTotals::from_bets(&bets);
        assert_eq!(totals.meron, SideTotals { count: 2, stake: 125 });
        assert_eq!(totals.wala, SideTotals { count: 1, stake: 50 });
    }
}
