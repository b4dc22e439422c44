//! Engine error types. Every failure leaves engine state exactly as it was
//! before the call.

use thiserror::Error;

use super::external::MintError;
use crate::math::MathError;
use crate::oracle::OracleError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BondError {
    /// The caller is not approved to bond.
    #[error("caller is not approved to bond")]
    NotAuthorized,

    #[error("bond value is zero")]
    ZeroValue,

    /// Accepting the bond would push cumulative local intake past the
    /// ceiling.
    #[error("rate limit exceeded: attempted {attempted}, available {available}")]
    RateLimitExceeded { attempted: u128, available: u128 },

    #[error("slippage: minted {minted} is below minimum {min_out}")]
    SlippageExceeded { minted: u128, min_out: u128 },

    #[error("price reference unavailable: {0}")]
    OracleUnavailable(String),

    #[error("arithmetic overflow")]
    ArithmeticOverflow,
}

impl From<MathError> for BondError {
    fn from(_: MathError) -> Self {
        BondError::ArithmeticOverflow
    }
}

impl From<OracleError> for BondError {
    fn from(e: OracleError) -> Self {
        match e {
            OracleError::Math(_) => BondError::ArithmeticOverflow,
            other => BondError::OracleUnavailable(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WithdrawError {
    /// The caller has never bonded.
    #[error("no account for caller")]
    AccountNotOpened,

    #[error("nothing pending to withdraw")]
    NothingPending,

    /// The registry refused the mint. The pending balance was restored.
    #[error("registry mint failed: {0}")]
    Mint(#[from] MintError),

    #[error("arithmetic overflow")]
    ArithmeticOverflow,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("caller is not a governor")]
    Unauthorized,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("caller is not a governor")]
    Unauthorized,

    #[error("reserve already initialized")]
    AlreadyInitialized,

    #[error("reserve initialization already in progress")]
    InProgress,

    #[error("registry mint failed: {0}")]
    Mint(#[from] MintError),

    #[error("arithmetic overflow")]
    ArithmeticOverflow,
}

/// Raised by [`CurveEngine::audit`](super::CurveEngine::audit) when the
/// engine's issuance counter disagrees with the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    #[error(
        "issuance desynchronized: engine {total_issued} vs registry {registry_supply} \
         + pending {pending} + in-flight {in_flight}"
    )]
    Desynchronized {
        total_issued: u128,
        registry_supply: u128,
        pending: u128,
        in_flight: u128,
    },

    #[error("arithmetic overflow while auditing")]
    ArithmeticOverflow,
}
