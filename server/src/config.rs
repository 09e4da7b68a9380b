use sabong_execution::ArenaConfig;
use sabong_types::Role;
use std::path::PathBuf;
use thiserror::Error;

use crate::auth::MIN_PASSWORD_CHARS;

pub const DEFAULT_BROADCAST_BUFFER: usize = 1_024;
pub const DEFAULT_WS_OUTBOUND_BUFFER: usize = 256;
pub const DEFAULT_WS_MAX_MESSAGE_BYTES: usize = 64 * 1024;
pub const DEFAULT_HTTP_BODY_LIMIT_BYTES: usize = 16 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("cash_min ({min}) must not exceed cash_max ({max})")]
    CashRange { min: u64, max: u64 },
    #[error("staff account {username} needs a password of at least {MIN_PASSWORD_CHARS} characters")]
    WeakPassword { username: String },
    #[error("bootstrap account {username} must be a cashier or operator")]
    NotStaff { username: String },
}

/// A staff account created at startup when it does not exist yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaffAccount {
    pub username: String,
    pub password: String,
    pub role: Role,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub arena: ArenaConfig,
    /// SQLite file backing the arena; memory only when unset.
    pub database_path: Option<PathBuf>,
    pub staff: Vec<StaffAccount>,
    pub broadcast_buffer: usize,
    pub ws_outbound_buffer: usize,
    pub ws_max_message_bytes: usize,
    pub http_body_limit_bytes: usize,
    /// Per-IP limit on the login and register routes.
    pub auth_rate_limit_per_minute: Option<u64>,
    pub auth_rate_limit_burst: Option<u32>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            arena: ArenaConfig::default(),
            database_path: None,
            staff: Vec::new(),
            broadcast_buffer: DEFAULT_BROADCAST_BUFFER,
            ws_outbound_buffer: DEFAULT_WS_OUTBOUND_BUFFER,
            ws_max_message_bytes: DEFAULT_WS_MAX_MESSAGE_BYTES,
            http_body_limit_bytes: DEFAULT_HTTP_BODY_LIMIT_BYTES,
            auth_rate_limit_per_minute: None,
            auth_rate_limit_burst: None,
        }
    }
}

fn non_zero(value: u64, field: &'static str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Zero { field });
    }
    Ok(())
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_zero(self.arena.max_bet, "max_bet")?;
        non_zero(self.arena.cash_min, "cash_min")?;
        non_zero(u64::from(self.arena.settlement_max_attempts), "settlement_max_attempts")?;
        non_zero(self.arena.history_limit as u64, "history_limit")?;
        non_zero(self.broadcast_buffer as u64, "broadcast_buffer")?;
        non_zero(self.ws_outbound_buffer as u64, "ws_outbound_buffer")?;
        if self.arena.cash_min > self.arena.cash_max {
            return Err(ConfigError::CashRange {
                min: self.arena.cash_min,
                max: self.arena.cash_max,
            });
        }
        for account in &self.staff {
            if !account.role.is_staff() {
                return Err(ConfigError::NotStaff {
                    username: account.username.clone(),
                });
            }
            if account.password.chars().count() < MIN_PASSWORD_CHARS {
                return Err(ConfigError::WeakPassword {
                    username: account.username.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(ServerConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_inverted_cash_range() {
        let mut config = ServerConfig::default();
        config.arena.cash_min = 500;
        config.arena.cash_max = 100;
        assert_eq!(
            config.validate(),
            Err(ConfigError::CashRange { min: 500, max: 100 })
        );
    }

    #[test]
    fn rejects_zero_settlement_attempts() {
        let mut config = ServerConfig::default();
        config.arena.settlement_max_attempts = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero {
                field: "settlement_max_attempts"
            })
        );
    }

    #[test]
    fn bootstrap_accounts_must_be_staff_with_real_passwords() {
        let mut config = ServerConfig::default();
        config.staff.push(StaffAccount {
            username: "bob".to_string(),
            password: "longenough".to_string(),
            role: Role::Bettor,
        });
        assert!(matches!(config.validate(), Err(ConfigError::NotStaff { .. })));

        config.staff[0].role = Role::Operator;
        config.staff[0].password = "abc".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::WeakPassword { .. })
        ));
    }
}
