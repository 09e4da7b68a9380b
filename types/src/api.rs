//! JSON payloads of the HTTP surface.

use serde::{Deserialize, Serialize};

use crate::{
    AccountView, Bet, BetTotals, CashRequest, Destination, FightView, HistoryEntry, Outcome,
    Settings, Side,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub account: AccountView,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LastCallRequest {
    #[serde(default)]
    pub seconds: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeclareRequest {
    #[serde(alias = "winner")]
    pub outcome: Outcome,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FightNumberRequest {
    pub fight_number: u64,
}

/// Partial settings update; absent fields are left untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub stream_delay: Option<u32>,
    #[serde(default)]
    pub last_call_time: Option<u32>,
    /// Percent, e.g. `5.0` for a 5% rake.
    #[serde(default)]
    pub rake_percentage: Option<f64>,
    #[serde(default)]
    pub house_account_number: Option<String>,
    #[serde(default)]
    pub house_account_name: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlaceBetRequest {
    pub side: Side,
    pub amount: u64,
    /// Display name; required for walk-up bets entered by the operator.
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlaceBetResponse {
    pub bet: Bet,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub new_balance: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BetsResponse {
    pub fight: u64,
    pub bets: Vec<Bet>,
    pub totals: BetTotals,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub history: Vec<HistoryEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub fight: FightView,
    pub totals: BetTotals,
    pub settings: Settings,
    pub observers: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AmountRequest {
    pub amount: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub amount: u64,
    pub destination: Destination,
}

/// Deposit request as shown to the bettor: where to send the money and the
/// reference to quote.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DepositTicket {
    pub request: CashRequest,
    pub pay_to: Destination,
}

/// A filed withdrawal and the balance left after the amount was reserved.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WithdrawalTicket {
    pub request: CashRequest,
    pub new_balance: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CashRequestsResponse {
    pub requests: Vec<CashRequest>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionsResponse {
    pub bets: Vec<Bet>,
    pub deposits: Vec<CashRequest>,
    pub withdrawals: Vec<CashRequest>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreditAdjustment {
    /// Signed credit delta; negative values debit the account.
    pub delta: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DisableRequest {
    #[serde(default = "default_true")]
    pub disabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DisableRequest {
    fn default() -> Self {
        Self { disabled: true }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UsersResponse {
    pub users: Vec<AccountView>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub account: AccountView,
}

/// Error body returned by every failing route. `detail` is flattened so
/// fields such as `balance` or `status` sit next to `code`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(flatten)]
    pub detail: serde_json::Map<String, serde_json::Value>,
}
