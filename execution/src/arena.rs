//! The arena: one owned state object that serializes every command.
//!
//! Each command stages its writes in a [`Layer`], commits the change set to
//! the [`Store`] and only then applies it to memory and queues the events it
//! produced. A refused or failed command leaves both memory and the outbox
//! untouched (except for `settlement_blocked`, which is queued on purpose).

use rand::{rngs::StdRng, SeedableRng};
use sabong_types::{
    api::SettingsUpdate, Bet, BetId, BetTotals, CashRequest, Destination, Direction, Event,
    FightView, HistoryEntry, Outcome, Phase, RequestId, Role, Settings, Side, Snapshot, UserId,
    Viewer, SIGNUP_BONUS,
};
use tracing::{debug, info, warn};

use crate::{
    accounts::{self, Account},
    cashier::{self, Filing, DEFAULT_CASH_MAX, DEFAULT_CASH_MIN},
    error::{ArenaError, Result},
    fight::{self, Command, FightRecord},
    ledger::{self, Funding, DEFAULT_MAX_BET},
    settlement::{self, DEFAULT_SETTLEMENT_MAX_ATTEMPTS, MAX_RAKE_BPS},
    state::{Key, Layer, Status, Store, Tables, Value},
};

pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const DEFAULT_REQUEST_LIMIT: usize = 20;
pub const MAX_STREAM_DELAY_SECS: u32 = 300;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
    pub max_bet: u64,
    pub cash_min: u64,
    pub cash_max: u64,
    pub signup_bonus: u64,
    pub settlement_max_attempts: u32,
    pub history_limit: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            max_bet: DEFAULT_MAX_BET,
            cash_min: DEFAULT_CASH_MIN,
            cash_max: DEFAULT_CASH_MAX,
            signup_bonus: SIGNUP_BONUS,
            settlement_max_attempts: DEFAULT_SETTLEMENT_MAX_ATTEMPTS,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Authenticated caller of a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn viewer(&self) -> Viewer {
        Viewer {
            user_id: Some(self.id),
            staff: self.role.is_staff(),
        }
    }
}

/// A started `lastcall` countdown. The caller schedules
/// [`Arena::expire_last_call`] for `epoch` at `deadline_ms`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Countdown {
    pub epoch: u64,
    pub seconds: u32,
    pub deadline_ms: u64,
}

/// A user's bets and cash requests, newest first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transactions {
    pub bets: Vec<Bet>,
    pub deposits: Vec<CashRequest>,
    pub withdrawals: Vec<CashRequest>,
}

pub struct Arena<S: Store> {
    tables: Tables,
    store: S,
    config: ArenaConfig,
    rng: StdRng,
    outbox: Vec<Event>,
    next_user: u64,
    next_bet: u64,
    next_request: u64,
}

fn require(actor: &Actor, allowed: &[Role]) -> Result<()> {
    if allowed.contains(&actor.role) {
        return Ok(());
    }
    Err(ArenaError::Forbidden(format!(
        "{} may not perform this action",
        actor.role.as_str()
    )))
}

fn require_staff(actor: &Actor) -> Result<()> {
    require(actor, &[Role::Cashier, Role::Operator])
}

fn require_operator(actor: &Actor) -> Result<()> {
    require(actor, &[Role::Operator])
}

impl<S: Store> Arena<S> {
    pub fn new(store: S, config: ArenaConfig) -> Self {
        Self::restore(store, config, Vec::new())
    }

    /// Rebuilds the arena from every persisted row.
    pub fn restore(store: S, config: ArenaConfig, rows: Vec<Value>) -> Self {
        let tables = Tables::from_rows(rows);
        let next_user = tables.accounts.keys().next_back().map_or(1, |id| id.0 + 1);
        let next_bet = tables
            .bets
            .keys()
            .next_back()
            .map_or(0, |id| id.0)
            .max(tables.fight.last_bet)
            + 1;
        let next_request = tables.requests.keys().next_back().map_or(1, |id| id.0 + 1);
        Self {
            tables,
            store,
            config,
            rng: StdRng::from_entropy(),
            outbox: Vec::new(),
            next_user,
            next_bet,
            next_request,
        }
    }

    /// Makes reference codes reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Takes every event queued since the last call, in apply order.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.outbox)
    }

    fn commit(&mut self, changes: Vec<(Key, Status)>) -> Result<()> {
        self.store.apply(&changes)?;
        self.tables.apply(&changes);
        Ok(())
    }

    fn emit(&mut self, event: Event) {
        debug!(kind = event.kind(), "event queued");
        self.outbox.push(event);
    }

    fn emit_balance(&mut self, user_id: UserId, balance: u64) {
        self.emit(Event::BalanceChanged { user_id, balance });
    }

    // Accounts

    pub fn register(
        &mut self,
        username: &str,
        credential: String,
        role: Role,
        now_ms: u64,
    ) -> Result<Account> {
        let username = accounts::validate_username(username)?;
        if self
            .tables
            .usernames
            .contains_key(&username.to_ascii_lowercase())
        {
            return Err(ArenaError::invalid(format!(
                "username {username} is already taken"
            )));
        }
        let account = Account {
            id: UserId(self.next_user),
            username,
            role,
            balance: match role {
                Role::Bettor => self.config.signup_bonus,
                Role::Cashier | Role::Operator => 0,
            },
            disabled: false,
            credential,
            created_at_ms: now_ms,
        };
        let changes = {
            let mut layer = Layer::new(&self.tables);
            layer.insert(Value::Account(account.clone()));
            layer.commit()
        };
        self.commit(changes)?;
        self.next_user += 1;
        info!(user = %account.id, username = %account.username, role = account.role.as_str(), "account registered");
        Ok(account)
    }

    pub fn account(&self, id: UserId) -> Option<&Account> {
        self.tables.accounts.get(&id)
    }

    pub fn account_by_name(&self, username: &str) -> Option<&Account> {
        self.tables
            .usernames
            .get(&username.trim().to_ascii_lowercase())
            .and_then(|id| self.tables.accounts.get(id))
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.tables.accounts.values()
    }

    pub fn set_disabled(&mut self, actor: &Actor, user: UserId, disabled: bool) -> Result<Account> {
        require_operator(actor)?;
        if actor.id == user {
            return Err(ArenaError::invalid("operators cannot disable themselves"));
        }
        let (changes, account) = {
            let mut layer = Layer::new(&self.tables);
            let mut account = layer.account(user)?;
            account.disabled = disabled;
            layer.insert(Value::Account(account.clone()));
            (layer.commit(), account)
        };
        self.commit(changes)?;
        info!(user = %user, disabled, "account status changed");
        Ok(account)
    }

    pub fn adjust_credits(&mut self, actor: &Actor, user: UserId, delta: i64) -> Result<u64> {
        require_operator(actor)?;
        let (changes, balance) = {
            let mut layer = Layer::new(&self.tables);
            let balance = accounts::adjust(&mut layer, user, delta)?;
            (layer.commit(), balance)
        };
        self.commit(changes)?;
        info!(user = %user, delta, balance, by = %actor.id, "credits adjusted");
        self.emit_balance(user, balance);
        Ok(balance)
    }

    // Fight lifecycle

    pub fn fight(&self) -> FightView {
        self.tables.fight.view()
    }

    pub fn epoch(&self) -> u64 {
        self.tables.fight.epoch
    }

    fn transition(&mut self, command: Command, deadline_ms: Option<u64>) -> Result<FightView> {
        let current = self.tables.fight.clone();
        let phase = fight::next_phase(command, current.phase)?;
        let changes = {
            let mut layer = Layer::new(&self.tables);
            layer.insert(Value::Fight(FightRecord {
                phase,
                deadline_ms,
                ..current.clone()
            }));
            layer.commit()
        };
        self.commit(changes)?;
        let view = self.tables.fight.view();
        info!(
            fight = view.number,
            from = current.phase.as_str(),
            to = view.phase.as_str(),
            command = command.name(),
            "phase changed"
        );
        self.emit(Event::PhaseChanged { fight: view.clone() });
        Ok(view)
    }

    pub fn open_betting(&mut self, actor: &Actor) -> Result<FightView> {
        require_operator(actor)?;
        self.transition(Command::OpenBetting, None)
    }

    /// Moves `open → lastcall` and returns the countdown to schedule.
    pub fn last_call(
        &mut self,
        actor: &Actor,
        seconds: Option<u32>,
        now_ms: u64,
    ) -> Result<Countdown> {
        require_operator(actor)?;
        let seconds =
            fight::validate_countdown(seconds.unwrap_or(self.tables.settings.last_call_secs))?;
        let deadline_ms = now_ms.saturating_add(u64::from(seconds) * 1_000);
        self.transition(Command::LastCall, Some(deadline_ms))?;
        Ok(Countdown {
            epoch: self.tables.fight.epoch,
            seconds,
            deadline_ms,
        })
    }

    pub fn close_betting(&mut self, actor: &Actor) -> Result<FightView> {
        require_operator(actor)?;
        self.transition(Command::CloseBetting, None)
    }

    /// Fires a countdown. Closes betting only if the fight is still in the
    /// `lastcall` that started it; returns whether it did.
    pub fn expire_last_call(&mut self, epoch: u64) -> Result<bool> {
        let fight = &self.tables.fight;
        if fight.phase != Phase::LastCall || fight.epoch != epoch {
            debug!(epoch, current = fight.epoch, "stale countdown ignored");
            return Ok(false);
        }
        self.transition(Command::CloseBetting, None)?;
        Ok(true)
    }

    /// Settles the current fight and moves it to `result`.
    ///
    /// The whole settlement is one store commit, retried up to
    /// `settlement_max_attempts` times. When every attempt fails the fight
    /// stays `closed` and a staff-only `settlement_blocked` event is queued.
    pub fn declare_winner(
        &mut self,
        actor: &Actor,
        outcome: Outcome,
        now_ms: u64,
    ) -> Result<HistoryEntry> {
        require_operator(actor)?;
        let current = self.tables.fight.clone();
        if self.tables.history.contains_key(&current.number) {
            return Err(ArenaError::AlreadySettled {
                fight: current.number,
            });
        }
        fight::next_phase(Command::DeclareWinner, current.phase)?;

        let rake_bps = self.tables.settings.rake_bps;
        let attempts = self.config.settlement_max_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            let (changes, settled) = {
                let mut layer = Layer::new(&self.tables);
                let settled =
                    settlement::stage_settlement(&mut layer, &current, outcome, rake_bps, now_ms)?;
                (layer.commit(), settled)
            };
            match self.store.apply(&changes) {
                Ok(()) => {
                    self.tables.apply(&changes);
                    info!(
                        fight = current.number,
                        outcome = outcome.as_str(),
                        paid_out = settled.entry.paid_out,
                        attempt,
                        "fight settled"
                    );
                    self.emit(Event::OutcomeDeclared {
                        fight: current.number,
                        outcome,
                        entry: settled.entry.clone(),
                        balances: settled.balances,
                        stream_delay_secs: self.tables.settings.stream_delay_secs,
                    });
                    return Ok(settled.entry);
                }
                Err(err) => {
                    warn!(fight = current.number, attempt, ?err, "settlement commit failed");
                    last_error = Some(err);
                }
            }
        }

        let reason = last_error
            .map(|err| err.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        warn!(fight = current.number, attempts, %reason, "settlement blocked");
        self.emit(Event::SettlementBlocked {
            fight: current.number,
            outcome,
            attempts,
            reason: reason.clone(),
        });
        Err(ArenaError::SettlementBlocked {
            fight: current.number,
            attempts,
            reason,
        })
    }

    /// Moves `result → waiting` on the next fight number not yet in history.
    pub fn reset_fight(&mut self, actor: &Actor) -> Result<FightView> {
        require_operator(actor)?;
        let current = self.tables.fight.clone();
        let phase = fight::next_phase(Command::ResetFight, current.phase)?;
        let history = &self.tables.history;
        let number = fight::next_free_number(current.number, |n| history.contains_key(&n));
        let changes = {
            let mut layer = Layer::new(&self.tables);
            layer.insert(Value::Fight(FightRecord {
                number,
                phase,
                deadline_ms: None,
                ..current
            }));
            layer.commit()
        };
        self.commit(changes)?;
        let view = self.tables.fight.view();
        info!(fight = view.number, "fight reset");
        self.emit(Event::FightReset { fight: view.clone() });
        Ok(view)
    }

    pub fn set_fight_number(&mut self, actor: &Actor, number: u64) -> Result<FightView> {
        require_operator(actor)?;
        let current = self.tables.fight.clone();
        fight::next_phase(Command::SetFightNumber, current.phase)?;
        if number == 0 {
            return Err(ArenaError::invalid("fight number must be at least 1"));
        }
        if self.tables.history.contains_key(&number) {
            return Err(ArenaError::AlreadySettled { fight: number });
        }
        let changes = {
            let mut layer = Layer::new(&self.tables);
            layer.insert(Value::Fight(FightRecord { number, ..current }));
            layer.commit()
        };
        self.commit(changes)?;
        let view = self.tables.fight.view();
        info!(fight = number, "fight number set");
        self.emit(Event::FightNumberChanged { fight: view.clone() });
        Ok(view)
    }

    // Settings

    pub fn settings(&self) -> &Settings {
        &self.tables.settings
    }

    pub fn update_settings(&mut self, actor: &Actor, update: &SettingsUpdate) -> Result<Settings> {
        require_operator(actor)?;
        let mut settings = self.tables.settings.clone();
        if let Some(delay) = update.stream_delay {
            if delay > MAX_STREAM_DELAY_SECS {
                return Err(ArenaError::invalid(format!(
                    "stream delay must be at most {MAX_STREAM_DELAY_SECS} seconds"
                )));
            }
            settings.stream_delay_secs = delay;
        }
        if let Some(seconds) = update.last_call_time {
            settings.last_call_secs = fight::validate_countdown(seconds)?;
        }
        if let Some(percent) = update.rake_percentage {
            let bps = percent * 100.0;
            if !bps.is_finite() || bps < 0.0 || bps > f64::from(MAX_RAKE_BPS) {
                return Err(ArenaError::invalid(format!(
                    "rake must be between 0 and {}%",
                    MAX_RAKE_BPS / 100
                )));
            }
            settings.rake_bps = bps.round() as u32;
        }
        if let Some(number) = &update.house_account_number {
            settings.house_account_number = Destination::validate_number(number)
                .map_err(|err| ArenaError::invalid(err.to_string()))?;
        }
        if let Some(name) = &update.house_account_name {
            settings.house_account_name = Destination::validate_name(name)
                .map_err(|err| ArenaError::invalid(err.to_string()))?;
        }

        let changes = {
            let mut layer = Layer::new(&self.tables);
            layer.insert(Value::Settings(settings.clone()));
            layer.commit()
        };
        self.commit(changes)?;
        info!(
            stream_delay = settings.stream_delay_secs,
            last_call = settings.last_call_secs,
            rake_bps = settings.rake_bps,
            "settings updated"
        );
        self.emit(Event::SettingsChanged {
            settings: settings.clone(),
        });
        Ok(settings)
    }

    // Bets

    /// Places a bet on the current fight.
    ///
    /// Bettors stake their own credits; operators enter walk-up bets under a
    /// display name. Returns the bet and the bettor's new balance.
    pub fn place_bet(
        &mut self,
        actor: &Actor,
        side: Side,
        stake: u64,
        name: Option<&str>,
        now_ms: u64,
    ) -> Result<(Bet, Option<u64>)> {
        require(actor, &[Role::Bettor, Role::Operator])?;
        let current = self.tables.fight.clone();
        fight::next_phase(Command::PlaceBet, current.phase)?;
        let stake = ledger::validate_stake(stake, self.config.max_bet)?;
        let funding = match actor.role {
            Role::Operator => Funding::WalkUp(
                name.ok_or_else(|| ArenaError::invalid("walk-up bets need a name"))?
                    .to_string(),
            ),
            _ => Funding::Account(actor.id),
        };

        let (changes, bet, balance) = {
            let mut layer = Layer::new(&self.tables);
            let (bet, balance) = ledger::stage_bet(
                &mut layer,
                BetId(self.next_bet),
                current.number,
                side,
                stake,
                funding,
                now_ms,
            )?;
            (layer.commit(), bet, balance)
        };
        self.commit(changes)?;
        self.next_bet += 1;

        info!(
            fight = bet.fight,
            bet = %bet.id,
            side = side.as_str(),
            stake,
            funded = bet.is_funded(),
            "bet placed"
        );
        let totals = ledger::totals_for(&self.tables, current.number);
        self.emit(Event::BetPlaced {
            bet: bet.clone(),
            totals,
        });
        if let (Some(user), Some(balance)) = (bet.user_id, balance) {
            self.emit_balance(user, balance);
        }
        Ok((bet, balance))
    }

    pub fn remove_bet(&mut self, actor: &Actor, id: BetId) -> Result<Bet> {
        require_operator(actor)?;
        let current = self.tables.fight.clone();
        fight::next_phase(Command::RemoveBet, current.phase)?;
        let (changes, bet, refund) = {
            let mut layer = Layer::new(&self.tables);
            let (bet, refund) = ledger::stage_removal(&mut layer, id, current.number)?;
            (layer.commit(), bet, refund)
        };
        self.commit(changes)?;

        info!(fight = current.number, bet = %id, stake = bet.stake, "bet removed");
        self.emit(Event::BetRemoved {
            bet_id: id,
            fight: current.number,
            totals: ledger::totals_for(&self.tables, current.number),
        });
        if let Some((user, balance)) = refund {
            self.emit_balance(user, balance);
        }
        Ok(bet)
    }

    /// Bets of the current fight with per-side totals.
    pub fn bets(&self) -> (Vec<Bet>, BetTotals) {
        let number = self.tables.fight.number;
        (
            ledger::bets_for(&self.tables, number),
            ledger::totals_for(&self.tables, number),
        )
    }

    /// Settled fights, newest first.
    pub fn history(&self, limit: usize) -> Vec<HistoryEntry> {
        let mut entries: Vec<_> = self.tables.history.values().cloned().collect();
        entries.sort_by(|a, b| {
            b.resolved_at_ms
                .cmp(&a.resolved_at_ms)
                .then(b.fight.cmp(&a.fight))
        });
        entries.truncate(limit);
        entries
    }

    // Cash requests

    fn file(
        &mut self,
        actor: &Actor,
        direction: Direction,
        amount: u64,
        destination: Option<Destination>,
        now_ms: u64,
    ) -> Result<(CashRequest, Option<u64>)> {
        require(actor, &[Role::Bettor])?;
        let amount = cashier::validate_amount(amount, self.config.cash_min, self.config.cash_max)?;
        let references = &self.tables.references;
        let reference =
            cashier::generate_reference(&mut self.rng, direction, |code| references.contains(code));
        let (changes, request, balance) = {
            let mut layer = Layer::new(&self.tables);
            let (request, balance) = cashier::stage_request(
                &mut layer,
                Filing {
                    id: RequestId(self.next_request),
                    user: actor.id,
                    direction,
                    amount,
                    destination,
                    reference,
                    now_ms,
                },
            )?;
            (layer.commit(), request, balance)
        };
        self.commit(changes)?;
        self.next_request += 1;

        info!(
            request = %request.id,
            user = %actor.id,
            direction = direction.as_str(),
            amount,
            reference = %request.reference,
            "cash request filed"
        );
        self.emit(Event::CashRequestCreated {
            request: request.clone(),
        });
        if let Some(balance) = balance {
            self.emit_balance(actor.id, balance);
        }
        Ok((request, balance))
    }

    pub fn request_deposit(&mut self, actor: &Actor, amount: u64, now_ms: u64) -> Result<CashRequest> {
        self.file(actor, Direction::Deposit, amount, None, now_ms)
            .map(|(request, _)| request)
    }

    /// Files a withdrawal, reserving `amount` immediately. Returns the request
    /// and the new balance.
    pub fn request_withdrawal(
        &mut self,
        actor: &Actor,
        amount: u64,
        destination: Destination,
        now_ms: u64,
    ) -> Result<(CashRequest, u64)> {
        let (request, balance) =
            self.file(actor, Direction::Withdrawal, amount, Some(destination), now_ms)?;
        let balance = balance.unwrap_or_default();
        Ok((request, balance))
    }

    fn resolve(
        &mut self,
        actor: &Actor,
        id: RequestId,
        direction: Direction,
        approve: bool,
        now_ms: u64,
    ) -> Result<CashRequest> {
        require_staff(actor)?;
        let (changes, request, balance) = {
            let mut layer = Layer::new(&self.tables);
            let (request, balance) =
                cashier::stage_resolution(&mut layer, id, direction, approve, actor.id, now_ms)?;
            (layer.commit(), request, balance)
        };
        self.commit(changes)?;

        info!(
            request = %id,
            direction = direction.as_str(),
            status = request.status.as_str(),
            by = %actor.id,
            "cash request resolved"
        );
        self.emit(Event::CashRequestResolved {
            request: request.clone(),
        });
        if let Some(balance) = balance {
            self.emit_balance(request.user_id, balance);
        }
        Ok(request)
    }

    pub fn approve_deposit(&mut self, actor: &Actor, id: RequestId, now_ms: u64) -> Result<CashRequest> {
        self.resolve(actor, id, Direction::Deposit, true, now_ms)
    }

    pub fn reject_deposit(&mut self, actor: &Actor, id: RequestId, now_ms: u64) -> Result<CashRequest> {
        self.resolve(actor, id, Direction::Deposit, false, now_ms)
    }

    pub fn approve_withdrawal(
        &mut self,
        actor: &Actor,
        id: RequestId,
        now_ms: u64,
    ) -> Result<CashRequest> {
        self.resolve(actor, id, Direction::Withdrawal, true, now_ms)
    }

    pub fn reject_withdrawal(
        &mut self,
        actor: &Actor,
        id: RequestId,
        now_ms: u64,
    ) -> Result<CashRequest> {
        self.resolve(actor, id, Direction::Withdrawal, false, now_ms)
    }

    /// Every pending request, oldest first.
    pub fn pending_requests(&self, actor: &Actor) -> Result<Vec<CashRequest>> {
        require_staff(actor)?;
        Ok(self
            .tables
            .requests
            .values()
            .filter(|request| request.is_pending())
            .cloned()
            .collect())
    }

    /// The user's latest requests, newest first.
    pub fn requests_of(&self, user: UserId, limit: usize) -> Vec<CashRequest> {
        self.tables
            .requests
            .values()
            .rev()
            .filter(|request| request.user_id == user)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn transactions(&self, user: UserId) -> Transactions {
        let bets: Vec<_> = self
            .tables
            .bets
            .values()
            .rev()
            .filter(|bet| bet.user_id == Some(user))
            .take(self.config.history_limit)
            .cloned()
            .collect();
        let (deposits, withdrawals): (Vec<_>, Vec<_>) = self
            .tables
            .requests
            .values()
            .rev()
            .filter(|request| request.user_id == user)
            .cloned()
            .partition(|request| request.direction == Direction::Deposit);
        Transactions {
            bets,
            deposits,
            withdrawals,
        }
    }

    /// Full state as `viewer` may see it.
    pub fn snapshot(&self, viewer: &Viewer) -> Snapshot {
        let (bets, totals) = self.bets();
        let balance = viewer
            .user_id
            .and_then(|id| self.tables.accounts.get(&id))
            .map(|account| account.balance);
        let pending_requests = self
            .tables
            .requests
            .values()
            .filter(|request| request.is_pending())
            .filter(|request| viewer.staff || Some(request.user_id) == viewer.user_id)
            .cloned()
            .collect();
        Snapshot {
            fight: self.fight(),
            settings: self.tables.settings.clone(),
            bets,
            totals,
            history: self.history(self.config.history_limit),
            balance,
            pending_requests,
        }
    }
}
