//! Per-participant pending balances awaiting withdrawal.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::WithdrawError;
use super::types::{Address, BalanceKind};

/// One participant's balances, in asset micro-units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAccount {
    pub pending_mint: u128,
    pub pending_promo: u128,
    /// Everything ever credited to `pending_mint`.
    pub lifetime_minted: u128,
    /// Everything ever credited to `pending_promo`.
    pub lifetime_promo: u128,
}

impl PendingAccount {
    fn balance(&self, kind: BalanceKind) -> u128 {
        match kind {
            BalanceKind::Mint => self.pending_mint,
            BalanceKind::Promo => self.pending_promo,
        }
    }

    fn balance_mut(&mut self, kind: BalanceKind) -> &mut u128 {
        match kind {
            BalanceKind::Mint => &mut self.pending_mint,
            BalanceKind::Promo => &mut self.pending_promo,
        }
    }
}

/// Pending balances keyed by address. An account exists from a
/// participant's first bond onward, even once drained to zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLedger {
    accounts: BTreeMap<Address, PendingAccount>,
}

impl PendingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, who: &Address) -> Option<&PendingAccount> {
        self.accounts.get(who)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &PendingAccount)> {
        self.accounts.iter()
    }

    /// Adds a bond's proceeds, opening the account if needed. Nothing is
    /// written unless every sum fits.
    pub fn credit(&mut self, who: &Address, minted: u128, promo: u128) -> Option<()> {
        let current = self.accounts.get(who).copied().unwrap_or_default();
        let next = PendingAccount {
            pending_mint: current.pending_mint.checked_add(minted)?,
            pending_promo: current.pending_promo.checked_add(promo)?,
            lifetime_minted: current.lifetime_minted.checked_add(minted)?,
            lifetime_promo: current.lifetime_promo.checked_add(promo)?,
        };
        self.accounts.insert(who.clone(), next);
        Some(())
    }

    /// The balance a withdrawal of `kind` would drain.
    pub fn pending(&self, who: &Address, kind: BalanceKind) -> Result<u128, WithdrawError> {
        let account = self.accounts.get(who).ok_or(WithdrawError::AccountNotOpened)?;
        match account.balance(kind) {
            0 => Err(WithdrawError::NothingPending),
            amount => Ok(amount),
        }
    }

    /// Zeroes the balance and returns what it held.
    pub fn take(&mut self, who: &Address, kind: BalanceKind) -> Result<u128, WithdrawError> {
        let amount = self.pending(who, kind)?;
        if let Some(account) = self.accounts.get_mut(who) {
            *account.balance_mut(kind) = 0;
        }
        Ok(amount)
    }

    /// Puts back an amount taken by a withdrawal whose mint failed.
    /// Lifetime totals are unaffected.
    pub fn restore(&mut self, who: &Address, kind: BalanceKind, amount: u128) -> Option<()> {
        let account = self.accounts.entry(who.clone()).or_default();
        let slot = account.balance_mut(kind);
        *slot = slot.checked_add(amount)?;
        Some(())
    }

    /// Sum of both pending balances across every account.
    pub fn totals(&self) -> Option<(u128, u128)> {
        self.accounts.values().try_fold((0u128, 0u128), |(m, p), a| {
            Some((m.checked_add(a.pending_mint)?, p.checked_add(a.pending_promo)?))
        })
    }
}
