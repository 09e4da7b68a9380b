//! SQLite home of the arena's rows.
//!
//! Every arena commit becomes one SQLite transaction. At startup all rows are
//! loaded back and handed to [`sabong_execution::Arena::restore`].

use anyhow::{anyhow, Context};
use rusqlite::{params, Connection, Transaction};
use sabong_execution::{Account, FightRecord, Key, Status, Store, StoreError, Value};
use sabong_types::{
    Bet, BetId, BetTotals, CashRequest, CashStatus, Destination, Direction, HistoryEntry,
    Outcome, Phase, RequestId, Resolution, Role, Settings, Side, SideTotals, UserId,
};
use std::path::Path;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` and returns the store with
    /// every persisted row.
    pub fn open(path: &Path) -> anyhow::Result<(Self, Vec<Value>)> {
        let conn = Connection::open(path)
            .with_context(|| format!("open arena database {}", path.display()))?;
        init_schema(&conn)?;
        let store = Self { conn };
        let rows = store.load().context("load arena rows")?;
        Ok((store, rows))
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory arena database")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn load(&self) -> anyhow::Result<Vec<Value>> {
        let mut rows = Vec::new();
        load_users(&self.conn, &mut rows)?;
        load_fight(&self.conn, &mut rows)?;
        load_settings(&self.conn, &mut rows)?;
        load_bets(&self.conn, &mut rows)?;
        load_history(&self.conn, &mut rows)?;
        load_requests(&self.conn, &mut rows)?;
        Ok(rows)
    }
}

impl Store for SqliteStore {
    fn apply(&mut self, changes: &[(Key, Status)]) -> Result<(), StoreError> {
        let tx = self.conn.transaction().map_err(backend)?;
        for (key, status) in changes {
            match status {
                Status::Update(value) => upsert(&tx, value)?,
                Status::Delete => delete(&tx, key)?,
            }
        }
        tx.commit().map_err(backend)
    }
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         CREATE TABLE IF NOT EXISTS users (
             id INTEGER PRIMARY KEY,
             username TEXT NOT NULL UNIQUE COLLATE NOCASE,
             role TEXT NOT NULL,
             balance INTEGER NOT NULL CHECK (balance >= 0),
             disabled INTEGER NOT NULL DEFAULT 0,
             credential TEXT NOT NULL,
             created_at_ms INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS fight (
             id INTEGER PRIMARY KEY CHECK (id = 1),
             number INTEGER NOT NULL,
             phase TEXT NOT NULL,
             last_bet_id INTEGER NOT NULL DEFAULT 0
         );
         CREATE TABLE IF NOT EXISTS bets (
             id INTEGER PRIMARY KEY,
             fight_number INTEGER NOT NULL,
             side TEXT NOT NULL,
             stake INTEGER NOT NULL CHECK (stake > 0),
             name TEXT NOT NULL,
             user_id INTEGER,
             placed_at_ms INTEGER NOT NULL,
             resolution TEXT NOT NULL,
             payout INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS bets_by_fight ON bets(fight_number);
         CREATE TABLE IF NOT EXISTS history (
             fight_number INTEGER NOT NULL UNIQUE,
             outcome TEXT NOT NULL,
             resolved_at_ms INTEGER NOT NULL,
             meron_count INTEGER NOT NULL,
             meron_stake INTEGER NOT NULL,
             wala_count INTEGER NOT NULL,
             wala_stake INTEGER NOT NULL,
             paid_out INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS cash_requests (
             id INTEGER PRIMARY KEY,
             user_id INTEGER NOT NULL,
             direction TEXT NOT NULL,
             amount INTEGER NOT NULL,
             status TEXT NOT NULL,
             reference_code TEXT NOT NULL UNIQUE,
             account_number TEXT,
             account_name TEXT,
             created_at_ms INTEGER NOT NULL,
             resolved_by INTEGER,
             resolved_at_ms INTEGER
         );
         CREATE INDEX IF NOT EXISTS cash_requests_by_user ON cash_requests(user_id);
         CREATE TABLE IF NOT EXISTS settings (
             id INTEGER PRIMARY KEY CHECK (id = 1),
             stream_delay_secs INTEGER NOT NULL,
             last_call_secs INTEGER NOT NULL,
             rake_bps INTEGER NOT NULL,
             house_account_number TEXT NOT NULL,
             house_account_name TEXT NOT NULL
         );",
    )
    .context("init arena schema")?;
    Ok(())
}

fn backend(err: rusqlite::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn int(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|_| StoreError::Backend(format!("{value} does not fit an sqlite integer")))
}

fn opt_int(value: Option<u64>) -> Result<Option<i64>, StoreError> {
    value.map(int).transpose()
}

fn upsert(tx: &Transaction<'_>, value: &Value) -> Result<(), StoreError> {
    match value {
        Value::Account(account) => tx.execute(
            "INSERT INTO users (id, username, role, balance, disabled, credential, created_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                 username = excluded.username,
                 role = excluded.role,
                 balance = excluded.balance,
                 disabled = excluded.disabled,
                 credential = excluded.credential",
            params![
                int(account.id.0)?,
                account.username,
                account.role.as_str(),
                int(account.balance)?,
                account.disabled,
                account.credential,
                int(account.created_at_ms)?,
            ],
        ),
        Value::Fight(fight) => tx.execute(
            "INSERT INTO fight (id, number, phase, last_bet_id) VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET number = excluded.number, phase = excluded.phase,
                 last_bet_id = excluded.last_bet_id",
            params![int(fight.number)?, fight.phase.as_str(), int(fight.last_bet)?],
        ),
        Value::Settings(settings) => tx.execute(
            "INSERT INTO settings (id, stream_delay_secs, last_call_secs, rake_bps,
                 house_account_number, house_account_name)
             VALUES (1, ?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 stream_delay_secs = excluded.stream_delay_secs,
                 last_call_secs = excluded.last_call_secs,
                 rake_bps = excluded.rake_bps,
                 house_account_number = excluded.house_account_number,
                 house_account_name = excluded.house_account_name",
            params![
                settings.stream_delay_secs,
                settings.last_call_secs,
                settings.rake_bps,
                settings.house_account_number,
                settings.house_account_name,
            ],
        ),
        Value::Bet(bet) => tx.execute(
            "INSERT INTO bets (id, fight_number, side, stake, name, user_id, placed_at_ms,
                 resolution, payout)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                 resolution = excluded.resolution,
                 payout = excluded.payout",
            params![
                int(bet.id.0)?,
                int(bet.fight)?,
                bet.side.as_str(),
                int(bet.stake)?,
                bet.name,
                opt_int(bet.user_id.map(|id| id.0))?,
                int(bet.placed_at_ms)?,
                bet.resolution.as_str(),
                int(bet.payout)?,
            ],
        ),
        // Plain INSERT: a second entry for the same fight must fail.
        Value::History(entry) => tx.execute(
            "INSERT INTO history (fight_number, outcome, resolved_at_ms, meron_count,
                 meron_stake, wala_count, wala_stake, paid_out)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                int(entry.fight)?,
                entry.outcome.as_str(),
                int(entry.resolved_at_ms)?,
                entry.totals.meron.count,
                int(entry.totals.meron.stake)?,
                entry.totals.wala.count,
                int(entry.totals.wala.stake)?,
                int(entry.paid_out)?,
            ],
        ),
        Value::CashRequest(request) => tx.execute(
            "INSERT INTO cash_requests (id, user_id, direction, amount, status, reference_code,
                 account_number, account_name, created_at_ms, resolved_by, resolved_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 resolved_by = excluded.resolved_by,
                 resolved_at_ms = excluded.resolved_at_ms",
            params![
                int(request.id.0)?,
                int(request.user_id.0)?,
                request.direction.as_str(),
                int(request.amount)?,
                request.status.as_str(),
                request.reference,
                request.destination.as_ref().map(|d| d.account_number.as_str()),
                request.destination.as_ref().map(|d| d.account_name.as_str()),
                int(request.created_at_ms)?,
                opt_int(request.resolved_by.map(|id| id.0))?,
                opt_int(request.resolved_at_ms)?,
            ],
        ),
    }
    .map(|_| ())
    .map_err(backend)
}

fn delete(tx: &Transaction<'_>, key: &Key) -> Result<(), StoreError> {
    let result = match key {
        Key::Bet(id) => tx.execute("DELETE FROM bets WHERE id = ?1", params![int(id.0)?]),
        Key::CashRequest(id) => {
            tx.execute("DELETE FROM cash_requests WHERE id = ?1", params![int(id.0)?])
        }
        Key::History(fight) => tx.execute(
            "DELETE FROM history WHERE fight_number = ?1",
            params![int(*fight)?],
        ),
        Key::Account(_) | Key::Fight | Key::Settings => return Ok(()),
    };
    result.map(|_| ()).map_err(backend)
}

fn unsigned(value: i64) -> anyhow::Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("negative value {value} in arena database"))
}

fn small(value: i64) -> anyhow::Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("value {value} out of range in arena database"))
}

fn parse<T>(value: &str, what: &str, from_str: impl Fn(&str) -> Option<T>) -> anyhow::Result<T> {
    from_str(value).ok_or_else(|| anyhow!("unknown {what} {value:?} in arena database"))
}

fn load_users(conn: &Connection, rows: &mut Vec<Value>) -> anyhow::Result<()> {
    let mut stmt = conn.prepare(
        "SELECT id, username, role, balance, disabled, credential, created_at_ms
         FROM users ORDER BY id",
    )?;
    let users = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, bool>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, i64>(6)?,
        ))
    })?;
    for user in users {
        let (id, username, role, balance, disabled, credential, created_at_ms) = user?;
        let role: Role = role.parse().map_err(anyhow::Error::msg)?;
        rows.push(Value::Account(Account {
            id: UserId(unsigned(id)?),
            username,
            role,
            balance: unsigned(balance)?,
            disabled,
            credential,
            created_at_ms: unsigned(created_at_ms)?,
        }));
    }
    Ok(())
}

fn load_fight(conn: &Connection, rows: &mut Vec<Value>) -> anyhow::Result<()> {
    let mut stmt = conn.prepare("SELECT number, phase, last_bet_id FROM fight WHERE id = 1")?;
    let mut fights = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;
    if let Some(fight) = fights.next() {
        let (number, phase, last_bet) = fight?;
        let phase = parse(&phase, "phase", Phase::from_str_opt)?;
        rows.push(Value::Fight(FightRecord {
            last_bet: unsigned(last_bet)?,
            ..FightRecord::restored(unsigned(number)?, phase)
        }));
    }
    Ok(())
}

fn load_settings(conn: &Connection, rows: &mut Vec<Value>) -> anyhow::Result<()> {
    let mut stmt = conn.prepare(
        "SELECT stream_delay_secs, last_call_secs, rake_bps, house_account_number,
             house_account_name
         FROM settings WHERE id = 1",
    )?;
    let mut settings = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;
    if let Some(row) = settings.next() {
        let (stream_delay, last_call, rake_bps, number, name) = row?;
        rows.push(Value::Settings(Settings {
            stream_delay_secs: small(stream_delay)?,
            last_call_secs: small(last_call)?,
            rake_bps: small(rake_bps)?,
            house_account_number: number,
            house_account_name: name,
        }));
    }
    Ok(())
}

fn load_bets(conn: &Connection, rows: &mut Vec<Value>) -> anyhow::Result<()> {
    let mut stmt = conn.prepare(
        "SELECT id, fight_number, side, stake, name, user_id, placed_at_ms, resolution, payout
         FROM bets ORDER BY id",
    )?;
    let bets = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<i64>>(5)?,
            row.get::<_, i64>(6)?,
            row.get::<_, String>(7)?,
            row.get::<_, i64>(8)?,
        ))
    })?;
    for bet in bets {
        let (id, fight, side, stake, name, user_id, placed_at_ms, resolution, payout) = bet?;
        rows.push(Value::Bet(Bet {
            id: BetId(unsigned(id)?),
            fight: unsigned(fight)?,
            side: parse(&side, "side", Side::from_str_opt)?,
            stake: unsigned(stake)?,
            name,
            user_id: user_id.map(unsigned).transpose()?.map(UserId),
            placed_at_ms: unsigned(placed_at_ms)?,
            resolution: parse(&resolution, "resolution", Resolution::from_str_opt)?,
            payout: unsigned(payout)?,
        }));
    }
    Ok(())
}

fn load_history(conn: &Connection, rows: &mut Vec<Value>) -> anyhow::Result<()> {
    let mut stmt = conn.prepare(
        "SELECT fight_number, outcome, resolved_at_ms, meron_count, meron_stake, wala_count,
             wala_stake, paid_out
         FROM history ORDER BY fight_number",
    )?;
    let entries = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, i64>(5)?,
            row.get::<_, i64>(6)?,
            row.get::<_, i64>(7)?,
        ))
    })?;
    for entry in entries {
        let (fight, outcome, resolved_at_ms, meron_count, meron_stake, wala_count, wala_stake, paid_out) =
            entry?;
        rows.push(Value::History(HistoryEntry {
            fight: unsigned(fight)?,
            outcome: parse(&outcome, "outcome", Outcome::from_str_opt)?,
            resolved_at_ms: unsigned(resolved_at_ms)?,
            totals: BetTotals {
                meron: SideTotals {
                    count: small(meron_count)?,
                    stake: unsigned(meron_stake)?,
                },
                wala: SideTotals {
                    count: small(wala_count)?,
                    stake: unsigned(wala_stake)?,
                },
            },
            paid_out: unsigned(paid_out)?,
        }));
    }
    Ok(())
}

fn load_requests(conn: &Connection, rows: &mut Vec<Value>) -> anyhow::Result<()> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, direction, amount, status, reference_code, account_number,
             account_name, created_at_ms, resolved_by, resolved_at_ms
         FROM cash_requests ORDER BY id",
    )?;
    let requests = stmt.query_map([], |row| {
        Ok((
            (
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ),
            (
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, i64>(8)?,
                row.get::<_, Option<i64>>(9)?,
                row.get::<_, Option<i64>>(10)?,
            ),
        ))
    })?;
    for request in requests {
        let (
            (id, user_id, direction, amount, status, reference),
            (account_number, account_name, created_at_ms, resolved_by, resolved_at_ms),
        ) = request?;
        let destination = match (account_number, account_name) {
            (Some(account_number), Some(account_name)) => Some(Destination {
                account_number,
                account_name,
            }),
            _ => None,
        };
        rows.push(Value::CashRequest(CashRequest {
            id: RequestId(unsigned(id)?),
            user_id: UserId(unsigned(user_id)?),
            direction: parse(&direction, "direction", Direction::from_str_opt)?,
            amount: unsigned(amount)?,
            status: parse(&status, "status", CashStatus::from_str_opt)?,
            reference,
            destination,
            created_at_ms: unsigned(created_at_ms)?,
            resolved_by: resolved_by.map(unsigned).transpose()?.map(UserId),
            resolved_at_ms: resolved_at_ms.map(unsigned).transpose()?,
        }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sabong_execution::{Actor, Arena, ArenaConfig};
    use sabong_types::api::SettingsUpdate;

    fn actor(account: &Account) -> Actor {
        Actor {
            id: account.id,
            role: account.role,
        }
    }

    #[test]
    fn reload_restores_balances_bets_and_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arena.db");

        let (store, rows) = SqliteStore::open(&path).unwrap();
        assert!(rows.is_empty());
        let mut arena = Arena::new(store, ArenaConfig::default());
        let operator = actor(&arena.register("boss", "x".into(), Role::Operator, 1).unwrap());
        let cashier = actor(&arena.register("till", "x".into(), Role::Cashier, 1).unwrap());
        let ana = actor(&arena.register("ana", "x".into(), Role::Bettor, 2).unwrap());
        let ben = actor(&arena.register("ben", "x".into(), Role::Bettor, 3).unwrap());

        let update = SettingsUpdate {
            rake_percentage: Some(2.5),
            house_account_number: Some("09171234567".into()),
            house_account_name: Some("Arena House".into()),
            ..SettingsUpdate::default()
        };
        arena.update_settings(&operator, &update).unwrap();
        arena.open_betting(&operator).unwrap();
        arena.place_bet(&ana, Side::Meron, 400, None, 10).unwrap();
        arena.place_bet(&ben, Side::Wala, 300, None, 11).unwrap();
        arena.place_bet(&operator, Side::Wala, 50, Some("walk-up"), 12).unwrap();
        arena.close_betting(&operator).unwrap();
        let entry = arena.declare_winner(&operator, Outcome::Meron, 20).unwrap();
        arena.reset_fight(&operator).unwrap();
        arena.open_betting(&operator).unwrap();
        arena.place_bet(&ben, Side::Meron, 100, None, 30).unwrap();

        let deposit = arena.request_deposit(&ana, 500, 40).unwrap();
        arena.approve_deposit(&cashier, deposit.id, 41).unwrap();
        let destination = Destination {
            account_number: "09998887777".into(),
            account_name: "Ben B".into(),
        };
        let (withdrawal, _) = arena.request_withdrawal(&ben, 200, destination, 42).unwrap();

        let balances: Vec<_> = arena.accounts().map(|a| (a.id, a.balance)).collect();
        let (bets, totals) = arena.bets();
        drop(arena);

        let (store, rows) = SqliteStore::open(&path).unwrap();
        let arena = Arena::restore(store, ArenaConfig::default(), rows);
        let restored: Vec<_> = arena.accounts().map(|a| (a.id, a.balance)).collect();
        assert_eq!(restored, balances);
        assert_eq!(arena.bets(), (bets, totals));
        assert_eq!(arena.history(10), vec![entry]);
        assert_eq!(arena.fight().number, 2);
        assert_eq!(arena.fight().phase, Phase::Open);
        assert_eq!(arena.settings().rake_bps, 250);
        assert_eq!(arena.settings().house_account_name, "Arena House");
        let pending = arena.pending_requests(&cashier).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, withdrawal.id);
        assert_eq!(pending[0].destination.as_ref().unwrap().account_name, "Ben B");
        assert_eq!(arena.account_by_name("ANA").unwrap().id, ana.id);
    }

    #[test]
    fn bet_ids_survive_removal_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arena.db");
        let (store, _) = SqliteStore::open(&path).unwrap();
        let mut arena = Arena::new(store, ArenaConfig::default());
        let operator = actor(&arena.register("boss", "x".into(), Role::Operator, 1).unwrap());
        arena.open_betting(&operator).unwrap();
        arena.place_bet(&operator, Side::Meron, 100, Some("walk-up"), 2).unwrap();
        let (removed, _) = arena
            .place_bet(&operator, Side::Wala, 100, Some("walk-up"), 3)
            .unwrap();
        arena.remove_bet(&operator, removed.id).unwrap();
        drop(arena);

        let (store, rows) = SqliteStore::open(&path).unwrap();
        let mut arena = Arena::restore(store, ArenaConfig::default(), rows);
        let (next, _) = arena
            .place_bet(&operator, Side::Meron, 100, Some("walk-up"), 4)
            .unwrap();
        assert!(next.id > removed.id);
    }

    #[test]
    fn fight_saved_in_last_call_comes_back_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arena.db");
        let (store, _) = SqliteStore::open(&path).unwrap();
        let mut arena = Arena::new(store, ArenaConfig::default());
        let operator = actor(&arena.register("boss", "x".into(), Role::Operator, 1).unwrap());
        arena.open_betting(&operator).unwrap();
        arena.last_call(&operator, Some(30), 0).unwrap();
        drop(arena);

        let (store, rows) = SqliteStore::open(&path).unwrap();
        let arena = Arena::restore(store, ArenaConfig::default(), rows);
        assert_eq!(arena.fight().phase, Phase::Closed);
        assert_eq!(arena.fight().deadline_ms, None);
    }

    #[test]
    fn duplicate_history_row_fails_the_whole_batch() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let entry = HistoryEntry {
            fight: 1,
            outcome: Outcome::Draw,
            resolved_at_ms: 0,
            totals: BetTotals::default(),
            paid_out: 0,
        };
        let insert = (Key::History(1), Status::Update(Value::History(entry)));
        store.apply(std::slice::from_ref(&insert)).unwrap();

        let fight = FightRecord::restored(2, Phase::Waiting);
        let batch = vec![(Key::Fight, Status::Update(Value::Fight(fight))), insert];
        assert!(matches!(store.apply(&batch), Err(StoreError::Backend(_))));
        let rows = store.load().unwrap();
        assert!(rows.iter().all(|row| !matches!(row, Value::Fight(_))));
        assert_eq!(rows.len(), 1);
    }
}
