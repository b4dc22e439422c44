//! # Token Ledger
//!
//! The fungible asset Bondline issues. Balances, allowances and total
//! supply live behind one lock. Minting is gated by [`Role::Minter`] and
//! burning by [`Role::Burner`] in the shared [`RoleRegistry`]; transfers and
//! approvals are authorized by the holder itself.
//!
//! ## Supply Rules
//!
//! - **Minting**: only role holders, checked on every call. The curve
//!   engine mints through a [`MintAuthority`] bound to its own identity.
//! - **Burning**: [`Role::Burner`] holders burn their own balance. There is
//!   no admin burn.
//! - **Conservation**: `total_supply == Σ balances` after every operation.
//!   Overflow and underflow are errors, never wraps.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use bondline_protocol::engine::{Address, AssetRegistry, MintError};

use crate::access_control::{Role, RoleRegistry};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The caller does not hold the minter role.
    #[error("unauthorized: {0} is not a minter")]
    UnauthorizedMinter(Address),

    #[error("unauthorized: {0} is not a burner")]
    UnauthorizedBurner(Address),

    #[error("supply overflow: minting {amount} would exceed u128::MAX")]
    SupplyOverflow { amount: u128 },

    #[error("insufficient balance: account has {balance}, needs {amount}")]
    InsufficientBalance { balance: u128, amount: u128 },

    #[error("insufficient allowance: approved {allowance}, needs {amount}")]
    InsufficientAllowance { allowance: u128, amount: u128 },

    #[error("invalid address: {0}")]
    InvalidAddress(Address),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub created_at: DateTime<Utc>,
}

/// Everything that changes, in one serializable unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    pub total_supply: u128,
    pub balances: BTreeMap<Address, u128>,
    /// `owner -> spender -> remaining allowance`.
    pub allowances: BTreeMap<Address, BTreeMap<Address, u128>>,
}

impl LedgerState {
    fn balance(&self, who: &Address) -> u128 {
        self.balances.get(who).copied().unwrap_or(0)
    }

    /// Moves `amount` from `from` to `to`, all-or-nothing.
    fn move_balance(&mut self, from: &Address, to: &Address, amount: u128) -> Result<(), TokenError> {
        let from_balance = self.balance(from);
        let debited = from_balance
            .checked_sub(amount)
            .ok_or(TokenError::InsufficientBalance {
                balance: from_balance,
                amount,
            })?;
        if from == to {
            return Ok(());
        }
        let credited = self
            .balance(to)
            .checked_add(amount)
            .ok_or(TokenError::SupplyOverflow { amount })?;
        self.balances.insert(from.clone(), debited);
        self.balances.insert(to.clone(), credited);
        Ok(())
    }
}

pub struct TokenLedger {
    metadata: TokenMetadata,
    roles: Arc<RoleRegistry>,
    state: RwLock<LedgerState>,
}

impl TokenLedger {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, decimals: u8, roles: Arc<RoleRegistry>) -> Self {
        Self {
            metadata: TokenMetadata {
                name: name.into(),
                symbol: symbol.into().to_uppercase(),
                decimals,
                created_at: Utc::now(),
            },
            roles,
            state: RwLock::new(LedgerState::default()),
        }
    }

    pub fn metadata(&self) -> &TokenMetadata {
        &self.metadata
    }

    pub fn total_supply(&self) -> u128 {
        self.state.read().total_supply
    }

    pub fn balance_of(&self, who: &Address) -> u128 {
        self.state.read().balance(who)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> u128 {
        self.state
            .read()
            .allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// Creates `amount` new units for `to`. `minter` must hold
    /// [`Role::Minter`] at the time of the call.
    pub fn mint(&self, minter: &Address, to: &Address, amount: u128) -> Result<(), TokenError> {
        if !self.roles.has_role(Role::Minter, minter) {
            warn!(%minter, "mint by non-minter rejected");
            return Err(TokenError::UnauthorizedMinter(minter.clone()));
        }
        if !to.is_valid() {
            return Err(TokenError::InvalidAddress(to.clone()));
        }

        let mut state = self.state.write();
        let supply = state
            .total_supply
            .checked_add(amount)
            .ok_or(TokenError::SupplyOverflow { amount })?;
        let balance = state
            .balance(to)
            .checked_add(amount)
            .ok_or(TokenError::SupplyOverflow { amount })?;
        state.total_supply = supply;
        state.balances.insert(to.clone(), balance);
        drop(state);

        info!(%minter, %to, amount, supply, "minted");
        Ok(())
    }

    /// Destroys `amount` of the holder's own balance.
    /// Destroys `amount` of `from`'s own balance. `from` must hold
    /// [`Role::Burner`].
    pub fn burn(&self, from: &Address, amount: u128) -> Result<(), TokenError> {
        if !self.roles.has_role(Role::Burner, from) {
            warn!(%from, "burn by non-burner rejected");
            return Err(TokenError::UnauthorizedBurner(from.clone()));
        }
        let mut state = self.state.write();
        let balance = state.balance(from);
        let remaining = balance
            .checked_sub(amount)
            .ok_or(TokenError::InsufficientBalance { balance, amount })?;
        let supply = state
            .total_supply
            .checked_sub(amount)
            .ok_or(TokenError::InsufficientBalance { balance, amount })?;
        state.balances.insert(from.clone(), remaining);
        state.total_supply = supply;
        drop(state);

        info!(%from, amount, "burned");
        Ok(())
    }

    pub fn transfer(&self, from: &Address, to: &Address, amount: u128) -> Result<(), TokenError> {
        if !to.is_valid() {
            return Err(TokenError::InvalidAddress(to.clone()));
        }
        self.state.write().move_balance(from, to, amount)?;
        debug!(%from, %to, amount, "transfer");
        Ok(())
    }

    /// Sets the allowance of `spender` over `owner`'s balance, replacing any
    /// previous value.
    pub fn approve(&self, owner: &Address, spender: &Address, amount: u128) -> Result<(), TokenError> {
        if !spender.is_valid() {
            return Err(TokenError::InvalidAddress(spender.clone()));
        }
        self.state
            .write()
            .allowances
            .entry(owner.clone())
            .or_default()
            .insert(spender.clone(), amount);
        debug!(%owner, %spender, amount, "approval");
        Ok(())
    }

    /// Moves `amount` from `from` to `to` on behalf of `spender`, consuming
    /// allowance. `u128::MAX` allowances are not consumed.
    pub fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TokenError> {
        if !to.is_valid() {
            return Err(TokenError::InvalidAddress(to.clone()));
        }
        let mut state = self.state.write();
        let allowance = state
            .allowances
            .get(from)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or(0);
        let left = allowance
            .checked_sub(amount)
            .ok_or(TokenError::InsufficientAllowance { allowance, amount })?;

        state.move_balance(from, to, amount)?;
        if allowance != u128::MAX {
            state
                .allowances
                .entry(from.clone())
                .or_default()
                .insert(spender.clone(), left);
        }
        drop(state);

        debug!(%spender, %from, %to, amount, "delegated transfer");
        Ok(())
    }

    pub fn snapshot(&self) -> LedgerState {
        self.state.read().clone()
    }

    pub fn restore(&self, state: LedgerState) {
        *self.state.write() = state;
    }
}

/// Binds a [`TokenLedger`] to the identity the curve engine mints as.
pub struct MintAuthority {
    ledger: Arc<TokenLedger>,
    identity: Address,
}

impl MintAuthority {
    pub fn new(ledger: Arc<TokenLedger>, identity: Address) -> Self {
        Self { ledger, identity }
    }

    pub fn identity(&self) -> &Address {
        &self.identity
    }
}

impl AssetRegistry for MintAuthority {
    fn total_supply(&self) -> u128 {
        self.ledger.total_supply()
    }

    fn mint(&self, to: &Address, amount: u128) -> Result<(), MintError> {
        self.ledger
            .mint(&self.identity, to, amount)
            .map_err(|e| match e {
                TokenError::UnauthorizedMinter(_) => MintError::Unauthorized,
                TokenError::SupplyOverflow { .. } => MintError::Overflow,
                other => MintError::Rejected(other.to_string()),
            })
    }
}
