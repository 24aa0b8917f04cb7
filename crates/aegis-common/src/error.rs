//! Error types for Aegis
//!
//! Provides a unified error type and component-specific error variants.
//! Every error is local and non-retryable: the failing operation leaves no
//! partial state behind.

use crate::types::ids::Holder;
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type alias using AegisError
pub type Result<T> = std::result::Result<T, AegisError>;

/// Unified error type for Aegis operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AegisError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Claim error: {0}")]
    Claim(#[from] ClaimError),

    #[error("Withdrawal error: {0}")]
    Withdrawal(#[from] WithdrawalError),

    #[error("Arithmetic error: {0}")]
    Math(#[from] MathError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Coarse classification of every error, for callers that only need to know
/// which rule was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InsufficientBalance,
    UnauthorizedSource,
    InvalidState,
    WindowClosed,
    SpanOutOfRange,
    ClaimNotApplicable,
    ClaimRejected,
    InvalidInput,
    Arithmetic,
    NotFound,
    Config,
}

impl AegisError {
    /// Map the error onto the protocol's error taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            AegisError::Ledger(e) => match e {
                LedgerError::InsufficientBalance { .. }
                | LedgerError::InsufficientAttribution { .. }
                | LedgerError::InsufficientDebt { .. }
                | LedgerError::InsufficientLiquidity { .. } => ErrorKind::InsufficientBalance,
                LedgerError::UnauthorizedSource(_) => ErrorKind::UnauthorizedSource,
                LedgerError::InvalidRecipient(_)
                | LedgerError::InvalidAmount(_)
                | LedgerError::BatchMismatch { .. } => ErrorKind::InvalidInput,
            },
            AegisError::Pool(e) => match e {
                PoolError::InvalidState { .. } => ErrorKind::InvalidState,
                PoolError::SpanOutOfRange { .. } => ErrorKind::SpanOutOfRange,
                PoolError::ExceedsAvailable { .. }
                | PoolError::InsufficientShares { .. }
                | PoolError::InsufficientCredit { .. }
                | PoolError::CreditCeilingReached { .. }
                | PoolError::Unbacked { .. } => ErrorKind::InsufficientBalance,
                PoolError::UnauthorizedSource(_) => ErrorKind::UnauthorizedSource,
                PoolError::PremiumExceedsMaxCost { .. }
                | PoolError::PolicyNotFound(_)
                | PoolError::InvalidPayoutRatio { .. } => ErrorKind::InvalidInput,
                PoolError::PolicyInactive(_) | PoolError::PolicyNotExpired { .. } => {
                    ErrorKind::InvalidState
                }
            },
            AegisError::Index(e) => match e {
                IndexError::InvalidState { .. } | IndexError::AllocPointConflict { .. } => {
                    ErrorKind::InvalidState
                }
                IndexError::WithdrawLimit { .. } | IndexError::InsufficientShares { .. } => {
                    ErrorKind::InsufficientBalance
                }
                IndexError::SlotOutOfRange { .. }
                | IndexError::DuplicatePool(_)
                | IndexError::InvalidLeverage(_)
                | IndexError::AllocPointOverflow { .. } => ErrorKind::InvalidInput,
            },
            AegisError::Claim(e) => match e {
                ClaimError::NotApplicable { .. } => ErrorKind::ClaimNotApplicable,
                ClaimError::Rejected { .. } => ErrorKind::ClaimRejected,
                ClaimError::NotInsured { .. } => ErrorKind::UnauthorizedSource,
                ClaimError::WindowClosed { .. } => ErrorKind::WindowClosed,
            },
            AegisError::Withdrawal(e) => match e {
                WithdrawalError::WindowClosed { .. } | WithdrawalError::NoRequest => {
                    ErrorKind::WindowClosed
                }
                WithdrawalError::ExceedsRequest { .. } => ErrorKind::InsufficientBalance,
            },
            AegisError::Math(_) => ErrorKind::Arithmetic,
            AegisError::NotFound(_) => ErrorKind::NotFound,
            AegisError::Config(_) | AegisError::Serialization(_) => ErrorKind::Config,
        }
    }
}

/// Vault ledger errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Insufficient balance for {holder}: required {required}, available {available}")]
    InsufficientBalance {
        holder: Holder,
        required: Decimal,
        available: Decimal,
    },

    #[error("Insufficient attribution for {holder}: required {required}, held {held}")]
    InsufficientAttribution {
        holder: Holder,
        required: Decimal,
        held: Decimal,
    },

    #[error("Debt underflow for {holder}: repaying {required}, outstanding {outstanding}")]
    InsufficientDebt {
        holder: Holder,
        required: Decimal,
        outstanding: Decimal,
    },

    #[error("Vault liquidity too low: required {required}, idle {idle}")]
    InsufficientLiquidity { required: Decimal, idle: Decimal },

    #[error("Caller {0} is not a registered capital source")]
    UnauthorizedSource(Holder),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(Holder),

    #[error("Amount must be a positive whole number of base units, got {0}")]
    InvalidAmount(Decimal),

    #[error("Batch has {recipients} recipients but {weights} weights")]
    BatchMismatch { recipients: usize, weights: usize },
}

/// Risk pool errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PoolError {
    #[error("{operation} is not allowed while the market is {status}")]
    InvalidState {
        operation: &'static str,
        status: String,
    },

    #[error("Coverage span {span}s outside [{min}, {max}]")]
    SpanOutOfRange { span: i64, min: i64, max: i64 },

    #[error("Amount exceeds available balance: requested {requested}, available {available}")]
    ExceedsAvailable {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Premium {premium} exceeds max cost {max_cost}")]
    PremiumExceedsMaxCost { premium: Decimal, max_cost: Decimal },

    #[error("Insufficient shares: required {required}, held {held}")]
    InsufficientShares { required: Decimal, held: Decimal },

    #[error("Insufficient credit for {source_holder}: required {required}, allocated {allocated}")]
    InsufficientCredit {
        source_holder: Holder,
        required: Decimal,
        allocated: Decimal,
    },

    #[error("Credit ceiling reached: requested {requested}, room {room}")]
    CreditCeilingReached { requested: Decimal, room: Decimal },

    #[error("Credit of {source_holder} would exceed its vault backing {backing}")]
    Unbacked {
        source_holder: Holder,
        backing: Decimal,
    },

    #[error("{0} is not a registered credit source")]
    UnauthorizedSource(Holder),

    #[error("Insurance policy {0} not found")]
    PolicyNotFound(u64),

    #[error("Insurance policy {0} is not active")]
    PolicyInactive(u64),

    #[error("Insurance policy {id} cannot be unlocked before {unlockable_at}")]
    PolicyNotExpired { id: u64, unlockable_at: i64 },

    #[error("Invalid payout ratio {numerator}/{denominator}")]
    InvalidPayoutRatio { numerator: u64, denominator: u64 },
}

/// Aggregator (index) errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndexError {
    #[error("{operation} is not allowed: {reason}")]
    InvalidState {
        operation: &'static str,
        reason: String,
    },

    #[error("Allocation point conflict at slot {slot}: expected {expected}, found {found}")]
    AllocPointConflict { slot: usize, expected: u64, found: u64 },

    #[error("Slot {slot} out of range (list length {len})")]
    SlotOutOfRange { slot: usize, len: usize },

    #[error("Pool {0} is already listed")]
    DuplicatePool(String),

    #[error("Withdrawal of {requested} exceeds withdrawable {withdrawable}")]
    WithdrawLimit {
        requested: Decimal,
        withdrawable: Decimal,
    },

    #[error("Insufficient shares: required {required}, held {held}")]
    InsufficientShares { required: Decimal, held: Decimal },

    #[error("Invalid leverage parameters: {0}")]
    InvalidLeverage(String),

    #[error("Total allocation points overflow with {alloc_point} at slot {slot}")]
    AllocPointOverflow { slot: usize, alloc_point: u64 },
}

/// Claim redemption errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClaimError {
    #[error("Claim not applicable to policy {policy_id}: {reason}")]
    NotApplicable { policy_id: u64, reason: String },

    #[error("Claim proof rejected for policy {policy_id}")]
    Rejected { policy_id: u64 },

    #[error("{caller} is not the insured of policy {policy_id}")]
    NotInsured { policy_id: u64, caller: Holder },

    #[error("Claim window closed at {closed_at}")]
    WindowClosed { closed_at: i64 },
}

/// Two-phase withdrawal gate errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WithdrawalError {
    #[error("No pending withdrawal request")]
    NoRequest,

    #[error("Withdrawal window closed: open from {opens_at} to {closes_at}, now {now}")]
    WindowClosed {
        opens_at: i64,
        closes_at: i64,
        now: i64,
    },

    #[error("Requested {requested} exceeds pending request {pending}")]
    ExceedsRequest { requested: Decimal, pending: Decimal },
}

/// Fixed-point arithmetic errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MathError {
    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Arithmetic underflow")]
    Underflow,
}

// Implement From for common external error types
impl From<serde_json::Error> for AegisError {
    fn from(err: serde_json::Error) -> Self {
        AegisError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for AegisError {
    fn from(err: anyhow::Error) -> Self {
        AegisError::Config(err.to_string())
    }
}
