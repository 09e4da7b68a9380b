//! Deposit and withdrawal requests reviewed by staff.
//!
//! Deposits move no credits until approved. Withdrawals reserve (debit) the
//! amount up front; approval finalizes it and rejection credits it back.

use rand::Rng;
use sabong_types::{
    CashRequest, CashStatus, Destination, Direction, RequestId, UserId,
};

use crate::{
    accounts,
    error::{ArenaError, Result},
    state::{Layer, Value},
};

pub const DEFAULT_CASH_MIN: u64 = 100;
pub const DEFAULT_CASH_MAX: u64 = 50_000;

const REFERENCE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const DEPOSIT_REFERENCE_LEN: usize = 8;
const WITHDRAWAL_REFERENCE_PREFIX: &str = "OUT-";
const WITHDRAWAL_REFERENCE_LEN: usize = 6;

fn random_code(rng: &mut impl Rng, len: usize) -> String {
    (0..len)
        .map(|_| REFERENCE_ALPHABET[rng.gen_range(0..REFERENCE_ALPHABET.len())] as char)
        .collect()
}

/// Draws references until one is not `taken`.
pub fn generate_reference(
    rng: &mut impl Rng,
    direction: Direction,
    taken: impl Fn(&str) -> bool,
) -> String {
    loop {
        let candidate = match direction {
            Direction::Deposit => random_code(rng, DEPOSIT_REFERENCE_LEN),
            Direction::Withdrawal => format!(
                "{WITHDRAWAL_REFERENCE_PREFIX}{}",
                random_code(rng, WITHDRAWAL_REFERENCE_LEN)
            ),
        };
        if !taken(&candidate) {
            return candidate;
        }
    }
}

pub fn validate_amount(amount: u64, min: u64, max: u64) -> Result<u64> {
    if amount < min || amount > max {
        return Err(ArenaError::invalid(format!(
            "amount must be between {min} and {max}"
        )));
    }
    Ok(amount)
}

/// Fields of a request about to be filed.
pub struct Filing {
    pub id: RequestId,
    pub user: UserId,
    pub direction: Direction,
    pub amount: u64,
    pub destination: Option<Destination>,
    pub reference: String,
    pub now_ms: u64,
}

/// Stages a pending request. Withdrawals debit immediately and return the
/// owner's new balance.
pub fn stage_request(layer: &mut Layer<'_>, filing: Filing) -> Result<(CashRequest, Option<u64>)> {
    let account = layer.account(filing.user)?;
    account.ensure_active()?;

    let (destination, balance) = match filing.direction {
        Direction::Deposit => (None, None),
        Direction::Withdrawal => {
            let destination = filing
                .destination
                .as_ref()
                .ok_or_else(|| ArenaError::invalid("withdrawal needs a destination"))?
                .normalized()
                .map_err(|err| ArenaError::invalid(err.to_string()))?;
            let balance = accounts::debit(layer, filing.user, filing.amount)?;
            (Some(destination), Some(balance))
        }
    };

    let request = CashRequest {
        id: filing.id,
        user_id: filing.user,
        direction: filing.direction,
        amount: filing.amount,
        status: CashStatus::Pending,
        reference: filing.reference,
        destination,
        created_at_ms: filing.now_ms,
        resolved_by: None,
        resolved_at_ms: None,
    };
    layer.insert(Value::CashRequest(request.clone()));
    Ok((request, balance))
}

/// Stages approval or rejection of a pending request of `direction`.
///
/// Returns the resolved request and the owner's new balance when credits
/// moved (approved deposit, rejected withdrawal).
pub fn stage_resolution(
    layer: &mut Layer<'_>,
    id: RequestId,
    direction: Direction,
    approve: bool,
    staff: UserId,
    now_ms: u64,
) -> Result<(CashRequest, Option<u64>)> {
    let mut request = layer.request(id)?;
    if request.direction != direction {
        return Err(ArenaError::not_found(direction.as_str(), id));
    }
    if !request.is_pending() {
        return Err(ArenaError::AlreadyProcessed {
            request_id: id,
            status: request.status,
        });
    }

    let balance = match (direction, approve) {
        (Direction::Deposit, true) | (Direction::Withdrawal, false) => {
            Some(accounts::credit(layer, request.user_id, request.amount)?)
        }
        _ => None,
    };

    request.status = if approve {
        CashStatus::Approved
    } else {
        CashStatus::Rejected
    };
    request.resolved_by = Some(staff);
    request.resolved_at_ms = Some(now_ms);
    layer.insert(Value::CashRequest(request.clone()));
    Ok((request, balance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn references_have_the_expected_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let deposit = generate_reference(&mut rng, Direction::Deposit, |_| false);
        assert_eq!(deposit.len(), 8);
        assert!(deposit
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));

        let withdrawal = generate_reference(&mut rng, Direction::Withdrawal, |_| false);
        assert!(withdrawal.starts_with("OUT-"));
        assert_eq!(withdrawal.len(), 10);
    }

    #[test]
    fn references_skip_taken_codes() {
        let mut rng = StdRng::seed_from_u64(7);
        let first = generate_reference(&mut rng, Direction::Deposit, |_| false);
        let mut rng = StdRng::seed_from_u64(7);
        let second = generate_reference(&mut rng, Direction::Deposit, |code| code == first);
        assert_ne!(first, second);
    }

    #[test]
    fn amount_bounds() {
        assert!(validate_amount(99, DEFAULT_CASH_MIN, DEFAULT_CASH_MAX).is_err());
        assert_eq!(
            validate_amount(100, DEFAULT_CASH_MIN, DEFAULT_CASH_MAX).unwrap(),
            100
        );
        assert!(validate_amount(50_001, DEFAULT_CASH_MIN, DEFAULT_CASH_MAX).is_err());
    }
}
