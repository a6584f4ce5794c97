use alloy::primitives::{Address, U256};
use thiserror::Error;

/// Fixed-point arithmetic failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    Overflow,

    #[error("arithmetic underflow")]
    Underflow,

    #[error("invalid fixed-point literal: {0}")]
    InvalidLiteral(String),
}

/// Malformed input rejected before any arithmetic runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid snapshot for {account}: {reason}")]
    InvalidSnapshot { account: String, reason: String },

    #[error("invalid batch layout: {0}")]
    InvalidLayout(String),

    #[error("invalid protocol config: {0}")]
    InvalidConfig(String),
}

impl ValidationError {
    pub fn snapshot(account: impl ToString, reason: impl Into<String>) -> Self {
        ValidationError::InvalidSnapshot {
            account: account.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failures at the batch-read boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("{batch} batch response length mismatch: expected {expected}, got {actual}")]
    ResponseLengthMismatch {
        batch: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("results out of order at position {position}: {reason}")]
    OutOfOrder { position: usize, reason: String },

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Indexer error: {0}")]
    Indexer(String),
}

/// Business-rule failures of a redemption attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("no redeemable vaults found for {fx_token}")]
    NoRedeemableVaults { fx_token: String },

    #[error("requested redemption amount must be greater than zero")]
    InvalidAmount,

    #[error("max search count must be greater than zero")]
    InvalidSearchCount,

    #[error("insufficient redeemable capacity for {fx_token}: requested {requested}, available {available}")]
    InsufficientCapacity {
        fx_token: String,
        requested: U256,
        available: U256,
    },

    #[error("unknown fxToken: {0}")]
    UnknownFxToken(String),

    #[error("unknown collateral token: {0}")]
    UnknownCollateral(Address),
}

/// Common error type returned by the valuation and selection crates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    #[error("Arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type VaultResult<T> = Result<T, VaultError>;
