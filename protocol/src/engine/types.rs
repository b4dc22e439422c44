//! Value types shared by the engine, its collaborators, and the node API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::math::Fixed;

/// A participant address: `0x` followed by 40 hex digits, stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wraps `s` without validating it. Use [`is_valid`](Self::is_valid) or
    /// [`parse`](Self::parse) at trust boundaries.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().to_ascii_lowercase())
    }

    /// Parses and validates an address.
    pub fn parse(s: &str) -> Option<Self> {
        let addr = Self::new(s);
        addr.is_valid().then_some(addr)
    }

    pub fn is_valid(&self) -> bool {
        self.0
            .strip_prefix("0x")
            .map(|body| body.len() == 40 && hex::decode(body).is_ok())
            .unwrap_or(false)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An amount of native currency in its smallest denomination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeAmount(u128);

impl NativeAmount {
    pub const fn new(amount: u128) -> Self {
        Self(amount)
    }

    pub const fn get(self) -> u128 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NativeAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which pending balance a withdrawal drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceKind {
    Mint,
    Promo,
}

impl fmt::Display for BalanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalanceKind::Mint => f.write_str("mint"),
            BalanceKind::Promo => f.write_str("promo"),
        }
    }
}

/// Outcome of a successful bond.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BondReceipt {
    pub id: Uuid,
    pub caller: Address,
    pub value: NativeAmount,
    /// Value converted to local micro-units.
    pub value_local: u128,
    /// Normalized supply step the bond moved the curve by.
    pub delta: Fixed,
    /// Asset micro-units credited to the pending mint balance.
    pub minted: u128,
    /// Asset micro-units credited to the pending promo balance.
    pub promo: u128,
    pub supply_after: Fixed,
    pub spot_price_after: Fixed,
    pub timestamp: DateTime<Utc>,
}

/// What a bond of a given value would yield right now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub value: NativeAmount,
    pub value_local: u128,
    pub delta: Fixed,
    pub minted: u128,
    pub promo: u128,
    pub supply_after: Fixed,
    pub rate_limit_remaining_local: u128,
}

/// Aggregate view of engine state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub curve_supply: Fixed,
    pub spot_price: Fixed,
    pub total_issued: u128,
    pub in_flight: u128,
    pub collateral_received: u128,
    pub collateral_received_local: u128,
    pub rate_limit_threshold_local: u128,
    pub rate_limit_remaining_local: u128,
    pub promo_pool_remaining: u128,
    pub pending_mint_total: u128,
    pub pending_promo_total: u128,
    pub accounts: usize,
    pub bonds: u64,
    pub initialized: bool,
}
