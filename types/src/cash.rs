use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{RequestId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Deposit,
    Withdrawal,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Deposit => "deposit",
            Direction::Withdrawal => "withdrawal",
        }
    }

    pub fn from_str_opt(value: &str) -> Option<Self> {
        match value {
            "deposit" => Some(Direction::Deposit),
            "withdrawal" => Some(Direction::Withdrawal),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CashStatus {
    Pending,
    Approved,
    Rejected,
}

impl CashStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CashStatus::Pending => "pending",
            CashStatus::Approved => "approved",
            CashStatus::Rejected => "rejected",
        }
    }

    pub fn from_str_opt(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(CashStatus::Pending),
            "approved" => Some(CashStatus::Approved),
            "rejected" => Some(CashStatus::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for CashStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DestinationError {
    #[error("account number must be 10 to 20 digits with an optional leading '+'")]
    AccountNumber,
    #[error("account name must be 2 to 100 characters")]
    AccountName,
}

/// Where a withdrawal is paid out (or, for the house, where deposits go).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub account_number: String,
    pub account_name: String,
}

impl Destination {
    pub const MIN_DIGITS: usize = 10;
    pub const MAX_DIGITS: usize = 20;
    pub const MIN_NAME_CHARS: usize = 2;
    pub const MAX_NAME_CHARS: usize = 100;

    pub fn validate_number(account_number: &str) -> Result<String, DestinationError> {
        let account_number = account_number.trim();
        let digits = account_number.strip_prefix('+').unwrap_or(account_number);
        if digits.len() < Self::MIN_DIGITS
            || digits.len() > Self::MAX_DIGITS
            || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(DestinationError::AccountNumber);
        }
        Ok(account_number.to_string())
    }

    pub fn validate_name(account_name: &str) -> Result<String, DestinationError> {
        let account_name = account_name.trim();
        let chars = account_name.chars().count();
        if !(Self::MIN_NAME_CHARS..=Self::MAX_NAME_CHARS).contains(&chars) {
            return Err(DestinationError::AccountName);
        }
        Ok(account_name.to_string())
    }

    /// Trims both fields and checks their shape.
    pub fn normalized(&self) -> Result<Self, DestinationError> {
        Ok(Self {
            account_number: Self::validate_number(&self.account_number)?,
            account_name: Self::validate_name(&self.account_name)?,
        })
    }
}

/// A deposit or withdrawal awaiting (or past) staff review.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashRequest {
    pub id: RequestId,
    pub user_id: UserId,
    pub direction: Direction,
    pub amount: u64,
    pub status: CashStatus,
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub destination: Option<Destination>,
    pub created_at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub resolved_by: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub resolved_at_ms: Option<u64>,
}

impl CashRequest {
    pub fn is_pending(&self) -> bool {
        self.status == CashStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn destination(number: &str, name: &str) -> Destination {
        Destination {
            account_number: number.to_string(),
            account_name: name.to_string(),
        }
    }

    #[test]
    fn destination_accepts_phone_style_numbers() {
        let dest = destination(" +639171234567 ", " Juan Dela Cruz ")
            .normalized()
            .unwrap();
        assert_eq!(dest.account_number, "+639171234567");
        assert_eq!(dest.account_name, "Juan Dela Cruz");
    }

    #[test]
    fn destination_rejects_bad_shapes() {
        assert_eq!(
            destination("12345", "Juan").normalized(),
            Err(DestinationError::AccountNumber)
        );
        assert_eq!(
            destination("09171234ab", "Juan").normalized(),
            Err(DestinationError::AccountNumber)
        );
        assert_eq!(
            destination("091712345678", "J").normalized(),
            Err(DestinationError::AccountName)
        );
    }
}
