use super::*;
use futures::StreamExt;
use sabong_execution::{
    mocks::Memory,
    state::{Key, Status, StoreError},
};
use sabong_types::{Event, Outcome, Phase, Side};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast::error::TryRecvError;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Memory store whose commits fail while the switch is on.
struct Switch {
    inner: Memory,
    failing: Arc<AtomicBool>,
}

impl Store for Switch {
    fn apply(&mut self, changes: &[(Key, Status)]) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".to_string()));
        }
        self.inner.apply(changes)
    }
}

fn service_with(store: ArenaStore) -> Arc<Service> {
    Arc::new(Service::new(store, Vec::new(), ServerConfig::default()))
}

fn service() -> Arc<Service> {
    service_with(Box::new(Memory::default()))
}

fn account(service: &Service, name: &str, role: Role) -> Actor {
    let account = service
        .execute(|arena| arena.register(name, String::new(), role, 0))
        .expect("register");
    Actor {
        id: account.id,
        role,
    }
}

fn drain(receiver: &mut broadcast::Receiver<Arc<Envelope>>) -> Vec<Arc<Envelope>> {
    let mut envelopes = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(envelope) => envelopes.push(envelope),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return envelopes,
            Err(TryRecvError::Lagged(skipped)) => panic!("lagged by {skipped}"),
        }
    }
}

fn closed_events(envelopes: &[Arc<Envelope>]) -> usize {
    envelopes
        .iter()
        .filter(|envelope| envelope.event.phase() == Some(Phase::Closed))
        .count()
}

#[tokio::test(start_paused = true)]
async fn last_call_closes_betting_when_countdown_runs_out() {
    let service = service();
    let operator = account(&service, "oper", Role::Operator);
    let (_, mut events) = service.subscribe(&Viewer::anonymous());

    service
        .execute(|arena| arena.open_betting(&operator))
        .unwrap();
    let countdown = service.last_call(&operator, Some(3)).unwrap();
    assert_eq!(countdown.seconds, 3);
    assert_eq!(
        service.lock().countdowns.active_epoch(),
        Some(countdown.epoch)
    );

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(service.read(|arena| arena.fight().phase), Phase::LastCall);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(service.read(|arena| arena.fight().phase), Phase::Closed);
    assert_eq!(service.lock().countdowns.active_epoch(), None);

    let envelopes = drain(&mut events);
    assert_eq!(closed_events(&envelopes), 1);
    let kinds: Vec<_> = envelopes
        .iter()
        .filter_map(|envelope| envelope.event.phase())
        .collect();
    assert_eq!(kinds, vec![Phase::Open, Phase::LastCall, Phase::Closed]);
}

#[tokio::test(start_paused = true)]
async fn manual_close_cancels_the_countdown() {
    let service = service();
    let operator = account(&service, "oper", Role::Operator);
    let (_, mut events) = service.subscribe(&Viewer::anonymous());

    service
        .execute(|arena| arena.open_betting(&operator))
        .unwrap();
    service.last_call(&operator, Some(5)).unwrap();
    service
        .execute(|arena| arena.close_betting(&operator))
        .unwrap();
    assert_eq!(service.lock().countdowns.active_epoch(), None);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(service.read(|arena| arena.fight().phase), Phase::Closed);
    assert_eq!(closed_events(&drain(&mut events)), 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_last_call_leaves_the_running_countdown() {
    let service = service();
    let operator = account(&service, "oper", Role::Operator);

    service
        .execute(|arena| arena.open_betting(&operator))
        .unwrap();
    let first = service.last_call(&operator, Some(2)).unwrap();
    // A second lastcall is rejected by the state machine and leaves the
    // first countdown running.
    assert!(service.last_call(&operator, Some(30)).is_err());
    assert_eq!(service.lock().countdowns.active_epoch(), Some(first.epoch));

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(service.read(|arena| arena.fight().phase), Phase::Closed);
}

#[tokio::test]
async fn subscriber_continues_right_after_its_snapshot() {
    let service = service();
    let operator = account(&service, "oper", Role::Operator);
    service
        .execute(|arena| arena.open_betting(&operator))
        .unwrap();

    let (snapshot, mut events) = service.subscribe(&Viewer::anonymous());
    let Event::StateSnapshot(state) = &snapshot.event else {
        panic!("expected a snapshot, got {}", snapshot.event.kind());
    };
    assert_eq!(state.fight.phase, Phase::Open);

    service
        .execute(|arena| arena.place_bet(&operator, Side::Wala, 300, Some("walk-up"), 1))
        .unwrap();
    let next = events.recv().await.unwrap();
    assert_eq!(next.seq, snapshot.seq + 1);
    assert_eq!(next.event.kind(), "bet_placed");
}

#[tokio::test]
async fn cash_requests_reach_staff_and_their_owner_only() {
    let service = service();
    let cashier = account(&service, "till", Role::Cashier);
    let alice = account(&service, "alice", Role::Bettor);
    let bob = account(&service, "bob", Role::Bettor);
    let (_, mut events) = service.subscribe(&Viewer::anonymous());

    let request = service
        .execute(|arena| arena.request_deposit(&alice, 500, 1))
        .unwrap();
    service
        .execute(|arena| arena.approve_deposit(&cashier, request.id, 2))
        .unwrap();

    let envelopes = drain(&mut events);
    let visible = |viewer: Viewer| -> Vec<&'static str> {
        envelopes
            .iter()
            .filter_map(|envelope| hub::view_for(envelope, &viewer))
            .map(|envelope| envelope.event.kind())
            .collect()
    };
    assert_eq!(
        visible(cashier.viewer()),
        vec!["cash_request_created", "cash_request_resolved", "balance_changed"]
    );
    assert_eq!(
        visible(alice.viewer()),
        vec!["cash_request_resolved", "balance_changed"]
    );
    assert!(visible(bob.viewer()).is_empty());
    assert!(visible(Viewer::anonymous()).is_empty());
}

#[tokio::test]
async fn blocked_settlement_is_published_and_can_be_retried() {
    let failing = Arc::new(AtomicBool::new(false));
    let service = service_with(Box::new(Switch {
        inner: Memory::default(),
        failing: failing.clone(),
    }));
    let operator = account(&service, "oper", Role::Operator);
    let alice = account(&service, "alice", Role::Bettor);
    service
        .execute(|arena| arena.open_betting(&operator))
        .unwrap();
    service
        .execute(|arena| arena.place_bet(&alice, Side::Meron, 100, None, 1))
        .unwrap();
    service
        .execute(|arena| arena.close_betting(&operator))
        .unwrap();
    let (_, mut events) = service.subscribe(&operator.viewer());

    failing.store(true, Ordering::SeqCst);
    let err = service
        .execute(|arena| arena.declare_winner(&operator, Outcome::Meron, 5))
        .unwrap_err();
    assert!(matches!(err, ArenaError::SettlementBlocked { .. }));
    assert_eq!(service.read(|arena| arena.fight().phase), Phase::Closed);
    let envelopes = drain(&mut events);
    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0].event.kind(), "settlement_blocked");
    assert!(hub::view_for(&envelopes[0], &alice.viewer()).is_none());

    failing.store(false, Ordering::SeqCst);
    let entry = service
        .execute(|arena| arena.declare_winner(&operator, Outcome::Meron, 6))
        .unwrap();
    assert_eq!(entry.outcome, Outcome::Meron);
    assert_eq!(service.read(|arena| arena.fight().phase), Phase::Result);
}

#[test]
fn concurrent_bets_never_overdraw_the_bettor() {
    let service = service();
    let operator = account(&service, "oper", Role::Operator);
    let alice = account(&service, "alice", Role::Bettor);
    let start = service.read(|arena| arena.account(alice.id).map(|a| a.balance)).unwrap();
    service
        .execute(|arena| arena.open_betting(&operator))
        .unwrap();

    let stake = 100;
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let service = &service;
                scope.spawn(move || {
                    service.execute(|arena| arena.place_bet(&alice, Side::Meron, stake, None, i))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    let accepted = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(accepted as u64, start / stake);
    for result in &results {
        if let Err(err) = result {
            assert_eq!(err.code(), "INSUFFICIENT_CREDITS", "{err}");
        }
    }
    let balance = service.read(|arena| arena.account(alice.id).map(|a| a.balance)).unwrap();
    assert_eq!(balance, start - accepted as u64 * stake);
    let (bets, totals) = service.read(|arena| arena.bets());
    assert_eq!(bets.len(), accepted);
    assert_eq!(totals.meron.stake, accepted as u64 * stake);
}

#[test]
fn register_login_and_disable() {
    let service = service();
    let operator = account(&service, "oper", Role::Operator);

    let registered = service.register("Alice", "hunter22").unwrap();
    assert_eq!(registered.account.role, Role::Bettor);
    let actor = service.authenticate(&registered.token).unwrap();
    assert_eq!(actor.id, registered.account.id);

    assert!(matches!(
        service.register("alice", "another1"),
        Err(ServiceError::Arena(_))
    ));
    assert!(matches!(
        service.register("carol", "short"),
        Err(ServiceError::Auth(AuthError::WeakPassword))
    ));
    assert!(matches!(
        service.login("alice", "wrong-password"),
        Err(ServiceError::Auth(AuthError::InvalidCredentials))
    ));
    let second = service.login("alice", "hunter22").unwrap();

    service.set_disabled(&operator, actor.id, true).unwrap();
    assert_eq!(
        service.authenticate(&second.token).unwrap_err(),
        AuthError::Unauthorized
    );
    assert!(matches!(
        service.login("alice", "hunter22"),
        Err(ServiceError::Auth(AuthError::Disabled))
    ));

    service.set_disabled(&operator, actor.id, false).unwrap();
    let again = service.login("alice", "hunter22").unwrap();
    assert!(service.logout(&again.token));
    assert!(service.authenticate(&again.token).is_err());
}

#[test]
fn bootstrap_creates_missing_staff_once() {
    let config = ServerConfig {
        staff: vec![StaffAccount {
            username: "boss".to_string(),
            password: "correct-horse".to_string(),
            role: Role::Operator,
        }],
        ..ServerConfig::default()
    };
    let service = Service::open(config).unwrap();
    service.bootstrap_staff().unwrap();
    let staff = service.read(|arena| {
        arena
            .accounts()
            .filter(|account| account.role == Role::Operator)
            .count()
    });
    assert_eq!(staff, 1);
    let login = service.login("boss", "correct-horse").unwrap();
    assert_eq!(login.account.balance, 0);
}

async fn next_envelope<S>(socket: &mut S) -> Envelope
where
    S: futures::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = socket.next().await.unwrap().unwrap();
        if message.is_text() {
            return serde_json::from_str(message.to_text().unwrap()).unwrap();
        }
    }
}

#[tokio::test]
async fn websocket_observer_receives_snapshot_then_events() {
    let service = service();
    let operator = account(&service, "oper", Role::Operator);
    let app = Api::new(service.clone()).router();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .await
        .unwrap();
    });

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();
    let snapshot = next_envelope(&mut socket).await;
    assert_eq!(snapshot.event.kind(), "state_snapshot");
    assert_eq!(service.observers(), 1);

    service
        .execute(|arena| arena.open_betting(&operator))
        .unwrap();
    let opened = next_envelope(&mut socket).await;
    assert_eq!(opened.seq, snapshot.seq + 1);
    assert_eq!(opened.event.phase(), Some(Phase::Open));
}
