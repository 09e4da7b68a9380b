use axum::{
    body::Bytes,
    extract::{Path, State as AxumState},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sabong_execution::arena::DEFAULT_REQUEST_LIMIT;
use sabong_types::{
    api::{
        AmountRequest, BalanceResponse, BetsResponse, CashRequestsResponse, CreditAdjustment,
        Credentials, DeclareRequest, DepositTicket, DisableRequest, FightNumberRequest,
        HistoryResponse, LastCallRequest, PlaceBetRequest, PlaceBetResponse, SettingsUpdate,
        StatusResponse, TransactionsResponse, UsersResponse, WithdrawalRequest,
        WithdrawalTicket,
    },
    BetId, Destination, FightView, RequestId, UserId,
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

use super::{authorize, bearer_token, require_operator, ApiError};
use crate::{now_ms, Service};

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid body: {e}")))
}

/// Like [`parse_body`], but an empty body means "all defaults".
fn parse_optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    parse_body(body)
}

pub(super) async fn healthz() -> impl IntoResponse {
    Json(HealthzResponse { ok: true })
}

pub(super) async fn ws_metrics(AxumState(service): AxumState<Arc<Service>>) -> impl IntoResponse {
    Json(service.ws_metrics().snapshot())
}

// Identity

pub(super) async fn register(
    AxumState(service): AxumState<Arc<Service>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let credentials: Credentials = parse_body(&body)?;
    // argon2 is CPU bound.
    let response = tokio::task::spawn_blocking(move || {
        service.register(&credentials.username, &credentials.password)
    })
    .await
    .map_err(|e| crate::AuthError::Hash(format!("registration aborted: {e}")))??;
    Ok((StatusCode::CREATED, Json(response)))
}

pub(super) async fn login(
    AxumState(service): AxumState<Arc<Service>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let credentials: Credentials = parse_body(&body)?;
    let response = tokio::task::spawn_blocking(move || {
        service.login(&credentials.username, &credentials.password)
    })
    .await
    .map_err(|e| crate::AuthError::Hash(format!("login aborted: {e}")))??;
    Ok(Json(response))
}

pub(super) async fn logout(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    authorize(&service, &headers)?;
    if let Some(token) = bearer_token(&headers) {
        service.logout(token);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn me(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
) -> ApiResult<BalanceResponse> {
    let actor = authorize(&service, &headers)?;
    let account = service
        .read(|arena| arena.account(actor.id).map(|account| account.view()))
        .ok_or(crate::AuthError::Unauthorized)?;
    Ok(Json(BalanceResponse { account }))
}

// Fight lifecycle

pub(super) async fn open_betting(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
) -> ApiResult<FightView> {
    let actor = authorize(&service, &headers)?;
    Ok(Json(service.execute(|arena| arena.open_betting(&actor))?))
}

pub(super) async fn last_call(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<FightView> {
    let actor = authorize(&service, &headers)?;
    let request: LastCallRequest = parse_optional_body(&body)?;
    service.last_call(&actor, request.seconds)?;
    Ok(Json(service.read(|arena| arena.fight())))
}

pub(super) async fn close_betting(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
) -> ApiResult<FightView> {
    let actor = authorize(&service, &headers)?;
    Ok(Json(service.execute(|arena| arena.close_betting(&actor))?))
}

pub(super) async fn declare_winner(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let actor = authorize(&service, &headers)?;
    let request: DeclareRequest = parse_body(&body)?;
    let entry = service.execute(|arena| arena.declare_winner(&actor, request.outcome, now_ms()))?;
    Ok(Json(entry))
}

pub(super) async fn reset_fight(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
) -> ApiResult<FightView> {
    let actor = authorize(&service, &headers)?;
    Ok(Json(service.execute(|arena| arena.reset_fight(&actor))?))
}

pub(super) async fn set_fight_number(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<FightView> {
    let actor = authorize(&service, &headers)?;
    let request: FightNumberRequest = parse_body(&body)?;
    Ok(Json(service.execute(|arena| {
        arena.set_fight_number(&actor, request.fight_number)
    })?))
}

// Settings and public views

pub(super) async fn settings(AxumState(service): AxumState<Arc<Service>>) -> impl IntoResponse {
    Json(service.read(|arena| arena.settings().clone()))
}

pub(super) async fn update_settings(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let actor = authorize(&service, &headers)?;
    let update: SettingsUpdate = parse_body(&body)?;
    Ok(Json(service.execute(|arena| arena.update_settings(&actor, &update))?))
}

pub(super) async fn status(AxumState(service): AxumState<Arc<Service>>) -> impl IntoResponse {
    let (fight, totals, settings) = service.read(|arena| {
        let (_, totals) = arena.bets();
        (arena.fight(), totals, arena.settings().clone())
    });
    Json(StatusResponse {
        fight,
        totals,
        settings,
        observers: service.observers() as u64,
    })
}

// Bets

pub(super) async fn place_bet(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let actor = authorize(&service, &headers)?;
    let request: PlaceBetRequest = parse_body(&body)?;
    let (bet, new_balance) = service.execute(|arena| {
        arena.place_bet(
            &actor,
            request.side,
            request.amount,
            request.name.as_deref(),
            now_ms(),
        )
    })?;
    Ok((
        StatusCode::CREATED,
        Json(PlaceBetResponse { bet, new_balance }),
    ))
}

pub(super) async fn remove_bet(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = authorize(&service, &headers)?;
    Ok(Json(service.execute(|arena| arena.remove_bet(&actor, BetId(id)))?))
}

pub(super) async fn bets(AxumState(service): AxumState<Arc<Service>>) -> impl IntoResponse {
    Json(service.read(|arena| {
        let (bets, totals) = arena.bets();
        BetsResponse {
            fight: arena.fight().number,
            bets,
            totals,
        }
    }))
}

pub(super) async fn history(AxumState(service): AxumState<Arc<Service>>) -> impl IntoResponse {
    let limit = service.config().arena.history_limit;
    Json(HistoryResponse {
        history: service.read(|arena| arena.history(limit)),
    })
}

// Cash requests

pub(super) async fn request_deposit(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let actor = authorize(&service, &headers)?;
    let request: AmountRequest = parse_body(&body)?;
    let (request, pay_to) = service.execute(|arena| {
        let request = arena.request_deposit(&actor, request.amount, now_ms())?;
        let settings = arena.settings();
        let pay_to = Destination {
            account_number: settings.house_account_number.clone(),
            account_name: settings.house_account_name.clone(),
        };
        Ok((request, pay_to))
    })?;
    Ok((StatusCode::CREATED, Json(DepositTicket { request, pay_to })))
}

pub(super) async fn request_withdrawal(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let actor = authorize(&service, &headers)?;
    let request: WithdrawalRequest = parse_body(&body)?;
    let (request, new_balance) = service.execute(|arena| {
        arena.request_withdrawal(&actor, request.amount, request.destination, now_ms())
    })?;
    Ok((
        StatusCode::CREATED,
        Json(WithdrawalTicket {
            request,
            new_balance,
        }),
    ))
}

pub(super) async fn approve_deposit(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = authorize(&service, &headers)?;
    Ok(Json(service.execute(|arena| {
        arena.approve_deposit(&actor, RequestId(id), now_ms())
    })?))
}

pub(super) async fn reject_deposit(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = authorize(&service, &headers)?;
    Ok(Json(service.execute(|arena| {
        arena.reject_deposit(&actor, RequestId(id), now_ms())
    })?))
}

pub(super) async fn approve_withdrawal(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = authorize(&service, &headers)?;
    Ok(Json(service.execute(|arena| {
        arena.approve_withdrawal(&actor, RequestId(id), now_ms())
    })?))
}

pub(super) async fn reject_withdrawal(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = authorize(&service, &headers)?;
    Ok(Json(service.execute(|arena| {
        arena.reject_withdrawal(&actor, RequestId(id), now_ms())
    })?))
}

pub(super) async fn pending_requests(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
) -> ApiResult<CashRequestsResponse> {
    let actor = authorize(&service, &headers)?;
    let requests = service.read(|arena| arena.pending_requests(&actor))?;
    Ok(Json(CashRequestsResponse { requests }))
}

pub(super) async fn my_requests(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
) -> ApiResult<CashRequestsResponse> {
    let actor = authorize(&service, &headers)?;
    let requests = service.read(|arena| arena.requests_of(actor.id, DEFAULT_REQUEST_LIMIT));
    Ok(Json(CashRequestsResponse { requests }))
}

pub(super) async fn transactions(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
) -> ApiResult<TransactionsResponse> {
    let actor = authorize(&service, &headers)?;
    let transactions = service.read(|arena| arena.transactions(actor.id));
    Ok(Json(TransactionsResponse {
        bets: transactions.bets,
        deposits: transactions.deposits,
        withdrawals: transactions.withdrawals,
    }))
}

// Users

pub(super) async fn users(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
) -> ApiResult<UsersResponse> {
    let actor = authorize(&service, &headers)?;
    require_operator(&actor)?;
    let users: Vec<_> = service.read(|arena| arena.accounts().map(|account| account.view()).collect());
    Ok(Json(UsersResponse { users }))
}

pub(super) async fn adjust_credits(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    body: Bytes,
) -> ApiResult<BalanceResponse> {
    let actor = authorize(&service, &headers)?;
    let adjustment: CreditAdjustment = parse_body(&body)?;
    let account = service.execute(|arena| {
        arena.adjust_credits(&actor, UserId(id), adjustment.delta)?;
        arena
            .account(UserId(id))
            .map(|account| account.view())
            .ok_or_else(|| sabong_execution::ArenaError::NotFound(format!("user {id}")))
    })?;
    Ok(Json(BalanceResponse { account }))
}

pub(super) async fn set_disabled(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    body: Bytes,
) -> ApiResult<BalanceResponse> {
    let actor = authorize(&service, &headers)?;
    let request: DisableRequest = parse_optional_body(&body)?;
    let account = service.set_disabled(&actor, UserId(id), request.disabled)?;
    Ok(Json(BalanceResponse {
        account: account.view(),
    }))
}
