//! Broadcast stream pushed to every connected observer.
//!
//! Each applied mutation yields exactly one [`Event`]; the hub stamps it with a
//! sequence number and wraps it in an [`Envelope`]. Late joiners receive a
//! [`Snapshot`] carrying the last applied sequence number so increments can be
//! applied without gaps.

use serde::{Deserialize, Serialize};

use crate::{
    Bet, BetId, BetTotals, CashRequest, FightView, HistoryEntry, Outcome, Phase, Settings,
    UserId,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    pub user_id: UserId,
    pub balance: u64,
}

/// Who is allowed to see an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Audience {
    Everyone,
    Staff,
    /// Staff plus the one user the event concerns.
    StaffAnd(UserId),
}

/// Identity of a connected observer, used to filter and redact events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: Option<UserId>,
    pub staff: bool,
}

impl Viewer {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn can_see(&self, audience: Audience) -> bool {
        match audience {
            Audience::Everyone => true,
            Audience::Staff => self.staff,
            Audience::StaffAnd(owner) => self.staff || self.user_id == Some(owner),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    StateSnapshot(Box<Snapshot>),
    PhaseChanged {
        fight: FightView,
    },
    BetPlaced {
        bet: Bet,
        totals: BetTotals,
    },
    BetRemoved {
        bet_id: BetId,
        fight: u64,
        totals: BetTotals,
    },
    OutcomeDeclared {
        fight: u64,
        outcome: Outcome,
        entry: HistoryEntry,
        balances: Vec<BalanceUpdate>,
        stream_delay_secs: u32,
    },
    FightReset {
        fight: FightView,
    },
    FightNumberChanged {
        fight: FightView,
    },
    SettingsChanged {
        settings: Settings,
    },
    CashRequestCreated {
        request: CashRequest,
    },
    CashRequestResolved {
        request: CashRequest,
    },
    BalanceChanged {
        user_id: UserId,
        balance: u64,
    },
    SettlementBlocked {
        fight: u64,
        outcome: Outcome,
        attempts: u32,
        reason: String,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::StateSnapshot(_) => "state_snapshot",
            Event::PhaseChanged { .. } => "phase_changed",
            Event::BetPlaced { .. } => "bet_placed",
            Event::BetRemoved { .. } => "bet_removed",
            Event::OutcomeDeclared { .. } => "outcome_declared",
            Event::FightReset { .. } => "fight_reset",
            Event::FightNumberChanged { .. } => "fight_number_changed",
            Event::SettingsChanged { .. } => "settings_changed",
            Event::CashRequestCreated { .. } => "cash_request_created",
            Event::CashRequestResolved { .. } => "cash_request_resolved",
            Event::BalanceChanged { .. } => "balance_changed",
            Event::SettlementBlocked { .. } => "settlement_blocked",
        }
    }

    pub fn audience(&self) -> Audience {
        match self {
            Event::CashRequestCreated { .. } | Event::SettlementBlocked { .. } => Audience::Staff,
            Event::CashRequestResolved { request } => Audience::StaffAnd(request.user_id),
            Event::BalanceChanged { user_id, .. } => Audience::StaffAnd(*user_id),
            _ => Audience::Everyone,
        }
    }

    /// Returns the event as `viewer` may see it, or `None` if it is hidden.
    ///
    /// `outcome_declared` is visible to everyone, but non-staff only receive
    /// their own entry in `balances`.
    pub fn visible_to(&self, viewer: &Viewer) -> Option<Event> {
        if !viewer.can_see(self.audience()) {
            return None;
        }
        match self {
            Event::OutcomeDeclared {
                fight,
                outcome,
                entry,
                balances,
                stream_delay_secs,
            } if !viewer.staff => Some(Event::OutcomeDeclared {
                fight: *fight,
                outcome: *outcome,
                entry: entry.clone(),
                balances: balances
                    .iter()
                    .filter(|update| Some(update.user_id) == viewer.user_id)
                    .copied()
                    .collect(),
                stream_delay_secs: *stream_delay_secs,
            }),
            other => Some(other.clone()),
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            Event::PhaseChanged { fight } => Some(fight.phase),
            _ => None,
        }
    }
}

/// Sequence-stamped event as it goes over the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub seq: u64,
    #[serde(flatten)]
    pub event: Event,
}

/// Full state for a newly connected (or resynced) observer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub fight: FightView,
    pub settings: Settings,
    pub bets: Vec<Bet>,
    pub totals: BetTotals,
    pub history: Vec<HistoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub balance: Option<u64>,
    #[serde(default)]
    pub pending_requests: Vec<CashRequest>,
}
