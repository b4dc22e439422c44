//! # Issuance Curve
//!
//! The weight function and everything derived from it. The curve is a pure
//! function of its two constants and its inputs; it owns no state and is
//! safe to share across threads.
//!
//! ```text
//! W(x)  = C · (x + e^(-x/D))          weight (antiderivative)
//! W'(x) = C · (1 - e^(-x/D) / D)      spot price, tends to C
//! minted(s0, Δ) = W(s0 + Δ) - W(s0)   exact, closed form
//! ```

pub mod issuance;

pub use issuance::IssuanceCurve;
