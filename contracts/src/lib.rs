//! # Bondline Contracts
//!
//! In-memory reference implementations of the two collaborators the curve
//! engine consumes through traits:
//!
//! - **Token Ledger**: the issued asset: balances, allowances, and
//!   role-gated minting. [`MintAuthority`](token_ledger::MintAuthority)
//!   adapts it to the engine's `AssetRegistry`.
//! - **Access Control**: admin-managed roles backing the engine's
//!   `AccessGate`.
//!
//! ## Design Principles
//!
//! 1. All monetary operations use checked arithmetic. Wrapping arithmetic
//!    and money do not mix.
//! 2. Every operation is all-or-nothing under a single lock.
//! 3. State is serializable (serde) so the node can snapshot and restore it.

pub mod access_control;
pub mod token_ledger;

pub use access_control::{Role, RoleError, RoleRegistry};
pub use token_ledger::{MintAuthority, TokenError, TokenLedger};
