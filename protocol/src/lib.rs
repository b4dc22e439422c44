// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Bondline Protocol: Core Library
//!
//! Bondline sells a fungible asset along a continuous issuance curve. Buyers
//! pay in a native currency; the engine prices that payment in a local
//! settlement currency through a time-weighted external rate, moves the
//! curve, and records what it owes in a pending ledger. Tokens are minted
//! only when the buyer later withdraws.
//!
//! ## Architecture
//!
//! - **math**: Signed Q64.64 fixed point with `exp`, `exp_neg` and integer
//!   powers. No floats anywhere on the money path.
//! - **curve**: The weight function `W(x) = C(x + e^(-x/D))` and its exact
//!   differences.
//! - **oracle**: Time-weighted price sources and the local-currency
//!   reference the engine converts through.
//! - **engine**: Bonding, rate limiting, pending balances, withdrawals,
//!   governance.
//! - **config**: Unit conventions, defaults, runtime configuration.
//!
//! ## Ground Rules
//!
//! 1. Every arithmetic step is checked. Overflow is an error, never a wrap.
//! 2. Every failing operation leaves state exactly as it found it.
//! 3. The engine never holds its lock across a call into the asset registry.

pub mod config;
pub mod curve;
pub mod engine;
pub mod math;
pub mod oracle;

pub use config::CurveConfig;
pub use curve::IssuanceCurve;
pub use engine::{Address, CurveEngine, NativeAmount};
pub use math::Fixed;
