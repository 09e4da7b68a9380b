//! Credit accounts: the single source of truth for balances.

use sabong_types::{AccountView, Role, UserId};

use crate::{
    error::{ArenaError, Result},
    state::{Layer, Value},
};

pub const MIN_USERNAME_CHARS: usize = 3;
pub const MAX_USERNAME_CHARS: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: UserId,
    pub username: String,
    pub role: Role,
    pub balance: u64,
    pub disabled: bool,
    /// Opaque credential produced by the identity layer (a password hash).
    pub credential: String,
    pub created_at_ms: u64,
}

impl Account {
    pub fn view(&self) -> AccountView {
        AccountView {
            id: self.id,
            username: self.username.clone(),
            role: self.role,
            balance: self.balance,
            disabled: self.disabled,
            created_at_ms: self.created_at_ms,
        }
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.disabled {
            return Err(ArenaError::Forbidden(format!(
                "account {} is disabled",
                self.username
            )));
        }
        Ok(())
    }
}

pub fn validate_username(username: &str) -> Result<String> {
    let trimmed = username.trim();
    let chars = trimmed.chars().count();
    if !(MIN_USERNAME_CHARS..=MAX_USERNAME_CHARS).contains(&chars) {
        return Err(ArenaError::invalid(format!(
            "username must be {MIN_USERNAME_CHARS} to {MAX_USERNAME_CHARS} characters"
        )));
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(ArenaError::invalid(
            "username may only contain letters, digits, '_', '-' and '.'",
        ));
    }
    Ok(trimmed.to_string())
}

/// Removes `amount` from the account, refusing to go below zero.
pub fn debit(layer: &mut Layer<'_>, user: UserId, amount: u64) -> Result<u64> {
    let mut account = layer.account(user)?;
    if account.balance < amount {
        return Err(ArenaError::InsufficientCredits {
            balance: account.balance,
            requested: amount,
        });
    }
    account.balance -= amount;
    let balance = account.balance;
    layer.insert(Value::Account(account));
    Ok(balance)
}

pub fn credit(layer: &mut Layer<'_>, user: UserId, amount: u64) -> Result<u64> {
    let mut account = layer.account(user)?;
    account.balance = account
        .balance
        .checked_add(amount)
        .ok_or_else(|| ArenaError::invalid("credit would overflow the balance"))?;
    let balance = account.balance;
    layer.insert(Value::Account(account));
    Ok(balance)
}

/// Applies a signed operator adjustment through [`debit`] or [`credit`].
pub fn adjust(layer: &mut Layer<'_>, user: UserId, delta: i64) -> Result<u64> {
    match delta {
        0 => Err(ArenaError::invalid("adjustment must be non-zero")),
        d if d > 0 => credit(layer, user, d.unsigned_abs()),
        d => debit(layer, user, d.unsigned_abs()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Tables;

    fn tables(balance: u64) -> Tables {
        Tables::from_rows([Value::Account(Account {
            id: UserId(1),
            username: "ana".to_string(),
            role: Role::Bettor,
            balance,
            disabled: false,
            credential: String::new(),
            created_at_ms: 0,
        })])
    }

    #[test]
    fn debit_refuses_overdraft() {
        let tables = tables(50);
        let mut layer = Layer::new(&tables);
        let err = debit(&mut layer, UserId(1), 60).unwrap_err();
        assert_eq!(
            err,
            ArenaError::InsufficientCredits {
                balance: 50,
                requested: 60
            }
        );
        assert_eq!(debit(&mut layer, UserId(1), 50).unwrap(), 0);
    }

    #[test]
    fn credit_checks_overflow() {
        let tables = tables(u64::MAX - 1);
        let mut layer = Layer::new(&tables);
        assert_eq!(credit(&mut layer, UserId(1), 1).unwrap(), u64::MAX);
        assert_eq!(
            credit(&mut layer, UserId(1), 1).unwrap_err().code(),
            "VALIDATION_ERROR"
        );
    }

    #[test]
    fn adjust_routes_by_sign() {
        let tables = tables(100);
        let mut layer = Layer::new(&tables);
        assert_eq!(adjust(&mut layer, UserId(1), 25).unwrap(), 125);
        assert_eq!(adjust(&mut layer, UserId(1), -100).unwrap(), 25);
        assert!(adjust(&mut layer, UserId(1), -26).is_err());
        assert!(adjust(&mut layer, UserId(1), 0).is_err());
    }

    #[test]
    fn usernames_are_validated() {
        assert_eq!(validate_username("  juan_23 ").unwrap(), "juan_23");
        assert!(validate_username("ab").is_err());
        assert!(validate_username("juan dela cruz").is_err());
    }
}
