//! Collaborators the engine calls out to but does not own.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::Address;

/// Why the asset registry refused a mint.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum MintError {
    /// The engine does not hold minting rights on the registry.
    #[error("minter not authorized")]
    Unauthorized,

    /// The mint would overflow the registry's supply.
    #[error("registry supply overflow")]
    Overflow,

    #[error("mint rejected: {0}")]
    Rejected(String),
}

/// The token contract whose supply the engine issues into.
///
/// `mint` may call back into the engine. The engine never holds its state
/// lock across this call.
pub trait AssetRegistry: Send + Sync {
    fn total_supply(&self) -> u128;

    fn mint(&self, to: &Address, amount: u128) -> Result<(), MintError>;
}

/// Role lookups consumed by the engine.
pub trait AccessGate: Send + Sync {
    fn is_approved_to_bond(&self, who: &Address) -> bool;

    fn is_governor(&self, who: &Address) -> bool;
}

/// Grants every role to everyone. Only meant for local quoting and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenGate;

impl AccessGate for OpenGate {
    fn is_approved_to_bond(&self, _who: &Address) -> bool {
        true
    }

    fn is_governor(&self, _who: &Address) -> bool {
        true
    }
}
