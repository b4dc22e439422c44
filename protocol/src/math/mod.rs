//! # Fixed-Point Math
//!
//! Deterministic arithmetic for everything that touches the issuance curve.
//! No floating point is used on any path that produces an amount; `f64`
//! appears only in [`Fixed::to_f64`], which exists for logs and tests.
//!
//! ```text
//! fixed.rs  Q64.64 value type, checked add/sub/mul/div, decimal conversion
//! exp.rs    e^x, e^-x and integer powers with documented error bounds
//! ```
//!
//! ## Error Bounds
//!
//! Every multiplication truncates toward zero, losing at most 2^-64 of
//! absolute precision. The exponential adds roughly thirty such roundings on
//! a value in `[1, 2)`, which keeps its relative error below 2^-56
//! (about 1.4e-17), comfortably under the 6-decimal display precision of the
//! asset.

pub mod exp;
pub mod fixed;

pub use fixed::{Fixed, FRAC_BITS};

use thiserror::Error;

/// Errors produced by fixed-point operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
    /// The result does not fit in the Q64.64 range.
    #[error("fixed-point overflow")]
    Overflow,

    /// Division by a zero divisor.
    #[error("division by zero")]
    DivisionByZero,

    /// An operation defined only for non-negative inputs received a
    /// negative one.
    #[error("negative input where a non-negative value is required")]
    NegativeInput,
}
