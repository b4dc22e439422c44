//! The bonding engine: accepts native value, prices it in local currency,
//! moves the curve, and credits pending balances for later withdrawal.

use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::{AuditError, AuthError, BondError, InitError, WithdrawError};
use super::external::{AccessGate, AssetRegistry};
use super::ledger::PendingAccount;
use super::state::CurveState;
use super::types::{Address, BalanceKind, BondReceipt, EngineStatus, NativeAmount, Quote};
use crate::config::{ConfigError, CurveConfig, BPS_DENOMINATOR, LOCAL_DECIMALS};
use crate::curve::IssuanceCurve;
use crate::math::{Fixed, MathError};
use crate::oracle::{PriceReference, PriceSource};

/// Everything a bond would change, computed against a state snapshot
/// without touching it.
#[derive(Debug)]
struct BondPlan {
    value_local: u128,
    delta: Fixed,
    minted: u128,
    promo: u128,
    supply_after: Fixed,
    total_issued_after: u128,
    collateral_after: u128,
    intake_after: u128,
    promo_pool_after: u128,
}

pub struct CurveEngine {
    curve: IssuanceCurve,
    price: PriceReference,
    registry: Arc<dyn AssetRegistry>,
    gate: Arc<dyn AccessGate>,
    promo_bonus_bps: u32,
    initial_reserve: u128,
    treasury: Address,
    state: RwLock<CurveState>,
}

impl CurveEngine {
    pub fn new(
        config: &CurveConfig,
        source: Arc<dyn PriceSource>,
        registry: Arc<dyn AssetRegistry>,
        gate: Arc<dyn AccessGate>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            curve: IssuanceCurve::from_config(config)?,
            price: PriceReference::from_config(source, config)?,
            registry,
            gate,
            promo_bonus_bps: config.promo_bonus_bps,
            initial_reserve: config.initial_reserve,
            treasury: config.treasury.clone(),
            state: RwLock::new(CurveState::new(config)),
        })
    }

    pub fn curve(&self) -> &IssuanceCurve {
        &self.curve
    }

    // -----------------------------------------------------------------------
    // Bonding
    // -----------------------------------------------------------------------

    /// Exchanges `value` native currency for asset units credited to the
    /// caller's pending balances.
    ///
    /// The state lock is held for the whole operation, including the price
    /// read, so no other bond can move the curve between pricing and
    /// commit. Any error leaves state untouched.
    pub fn bond(
        &self,
        caller: &Address,
        min_out: u128,
        value: NativeAmount,
    ) -> Result<BondReceipt, BondError> {
        if !self.gate.is_approved_to_bond(caller) {
            warn!(%caller, "bond from unapproved caller");
            return Err(BondError::NotAuthorized);
        }
        if value.is_zero() {
            return Err(BondError::ZeroValue);
        }

        let mut state = self.state.write();
        let plan = self.plan(&state, value)?;
        if plan.minted < min_out {
            debug!(%caller, minted = plan.minted, min_out, "bond below minimum output");
            return Err(BondError::SlippageExceeded {
                minted: plan.minted,
                min_out,
            });
        }
        let spot_price_after = self.curve.spot_price(plan.supply_after)?;

        state
            .ledger
            .credit(caller, plan.minted, plan.promo)
            .ok_or(BondError::ArithmeticOverflow)?;
        state.curve_supply = plan.supply_after;
        state.total_issued = plan.total_issued_after;
        state.collateral_received = plan.collateral_after;
        state.limiter.commit(plan.intake_after);
        state.promo_pool_remaining = plan.promo_pool_after;
        state.bonds += 1;
        drop(state);

        info!(
            %caller,
            value = %value,
            value_local = plan.value_local,
            minted = plan.minted,
            promo = plan.promo,
            supply = %plan.supply_after,
            "bond accepted"
        );

        Ok(BondReceipt {
            id: Uuid::new_v4(),
            caller: caller.clone(),
            value,
            value_local: plan.value_local,
            delta: plan.delta,
            minted: plan.minted,
            promo: plan.promo,
            supply_after: plan.supply_after,
            spot_price_after,
            timestamp: Utc::now(),
        })
    }

    /// What bonding `value` would yield right now. Applies the rate limit
    /// but not authorization or slippage.
    pub fn quote(&self, value: NativeAmount) -> Result<Quote, BondError> {
        if value.is_zero() {
            return Err(BondError::ZeroValue);
        }
        let state = self.state.read();
        let plan = self.plan(&state, value)?;
        Ok(Quote {
            value,
            value_local: plan.value_local,
            delta: plan.delta,
            minted: plan.minted,
            promo: plan.promo,
            supply_after: plan.supply_after,
            rate_limit_remaining_local: state.limiter.remaining(),
        })
    }

    fn plan(&self, state: &CurveState, value: NativeAmount) -> Result<BondPlan, BondError> {
        // Dust pricing to zero local units, or minting nothing, is refused.
        let value_local = self.price.to_local(value)?;
        if value_local == 0 {
            return Err(BondError::ZeroValue);
        }
        let intake_after = state.limiter.check(value_local)?;

        let delta = Fixed::from_scaled(value_local, LOCAL_DECIMALS)?;
        let minted = self.curve.minted_micro(state.curve_supply, delta)?;
        if minted == 0 {
            return Err(BondError::ZeroValue);
        }
        let supply_after = state.curve_supply.checked_add(delta)?;

        let bonus = minted
            .checked_mul(self.promo_bonus_bps as u128)
            .ok_or(BondError::ArithmeticOverflow)?
            / BPS_DENOMINATOR;
        let promo = bonus.min(state.promo_pool_remaining);

        let total_issued_after = state
            .total_issued
            .checked_add(minted)
            .and_then(|t| t.checked_add(promo))
            .ok_or(BondError::ArithmeticOverflow)?;
        let collateral_after = state
            .collateral_received
            .checked_add(value.get())
            .ok_or(BondError::ArithmeticOverflow)?;

        Ok(BondPlan {
            value_local,
            delta,
            minted,
            promo,
            supply_after,
            total_issued_after,
            collateral_after,
            intake_after,
            promo_pool_after: state.promo_pool_remaining - promo,
        })
    }

    // -----------------------------------------------------------------------
    // Withdrawals
    // -----------------------------------------------------------------------

    /// Mints the caller's entire pending mint balance to them.
    pub fn withdraw_mint_balance(&self, caller: &Address) -> Result<u128, WithdrawError> {
        self.withdraw(caller, BalanceKind::Mint)
    }

    /// Mints the caller's entire pending promotional balance to them.
    pub fn withdraw_promo_balance(&self, caller: &Address) -> Result<u128, WithdrawError> {
        self.withdraw(caller, BalanceKind::Promo)
    }

    /// The balance is zeroed and moved to `in_flight` before the registry
    /// is called, and the lock is released for the call. A reentrant
    /// withdrawal therefore finds nothing pending. If the registry refuses,
    /// the balance is put back.
    fn withdraw(&self, caller: &Address, kind: BalanceKind) -> Result<u128, WithdrawError> {
        let amount = {
            let mut state = self.state.write();
            let amount = state.ledger.pending(caller, kind)?;
            let in_flight = state
                .in_flight
                .checked_add(amount)
                .ok_or(WithdrawError::ArithmeticOverflow)?;
            state.ledger.take(caller, kind)?;
            state.in_flight = in_flight;
            amount
        };

        let minted = self.registry.mint(caller, amount);

        let mut state = self.state.write();
        state.in_flight = state.in_flight.saturating_sub(amount);
        match minted {
            Ok(()) => {
                drop(state);
                info!(%caller, %kind, amount, "withdrawal minted");
                Ok(amount)
            }
            Err(e) => {
                if state.ledger.restore(caller, kind, amount).is_none() {
                    error!(%caller, %kind, amount, "could not restore balance after failed mint");
                    return Err(WithdrawError::ArithmeticOverflow);
                }
                drop(state);
                warn!(%caller, %kind, amount, error = %e, "withdrawal mint failed, balance restored");
                Err(WithdrawError::Mint(e))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Governance
    // -----------------------------------------------------------------------

    /// Replaces the rate-limit ceiling, in local micro-units.
    pub fn set_rate_limit_threshold(&self, caller: &Address, value: u128) -> Result<(), AuthError> {
        if !self.gate.is_governor(caller) {
            warn!(%caller, "threshold change from non-governor");
            return Err(AuthError::Unauthorized);
        }
        let previous = {
            let mut state = self.state.write();
            let previous = state.limiter.threshold();
            state.limiter.set_threshold(value);
            previous
        };
        info!(%caller, previous, threshold = value, "rate limit threshold updated");
        Ok(())
    }

    /// Mints the configured reserve to the treasury. Succeeds at most once;
    /// a failed mint leaves it retryable.
    pub fn initialize_reserve(&self, caller: &Address) -> Result<(), InitError> {
        if !self.gate.is_governor(caller) {
            return Err(InitError::Unauthorized);
        }
        let amount = self.initial_reserve;
        {
            let mut state = self.state.write();
            if state.initialized {
                return Err(InitError::AlreadyInitialized);
            }
            if state.initializing {
                return Err(InitError::InProgress);
            }
            let total = state
                .total_issued
                .checked_add(amount)
                .ok_or(InitError::ArithmeticOverflow)?;
            let in_flight = state
                .in_flight
                .checked_add(amount)
                .ok_or(InitError::ArithmeticOverflow)?;
            state.total_issued = total;
            state.in_flight = in_flight;
            state.initializing = true;
        }

        let minted = self.registry.mint(&self.treasury, amount);

        let mut state = self.state.write();
        state.initializing = false;
        state.in_flight = state.in_flight.saturating_sub(amount);
        match minted {
            Ok(()) => {
                state.initialized = true;
                drop(state);
                info!(treasury = %self.treasury, amount, "reserve initialized");
                Ok(())
            }
            Err(e) => {
                state.total_issued = state.total_issued.saturating_sub(amount);
                drop(state);
                warn!(treasury = %self.treasury, error = %e, "reserve mint failed");
                Err(InitError::Mint(e))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// `W'(supply)`.
    pub fn spot_price(&self, supply: Fixed) -> Result<Fixed, MathError> {
        self.curve.spot_price(supply)
    }

    /// `W'` at the current curve supply.
    pub fn current_spot_price(&self) -> Result<Fixed, MathError> {
        let supply = self.state.read().curve_supply;
        self.curve.spot_price(supply)
    }

    pub fn account(&self, who: &Address) -> Option<PendingAccount> {
        self.state.read().ledger.get(who).copied()
    }

    pub fn status(&self) -> Result<EngineStatus, MathError> {
        let state = self.state.read();
        let (pending_mint_total, pending_promo_total) =
            state.ledger.totals().ok_or(MathError::Overflow)?;
        Ok(EngineStatus {
            curve_supply: state.curve_supply,
            spot_price: self.curve.spot_price(state.curve_supply)?,
            total_issued: state.total_issued,
            in_flight: state.in_flight,
            collateral_received: state.collateral_received,
            collateral_received_local: state.limiter.received(),
            rate_limit_threshold_local: state.limiter.threshold(),
            rate_limit_remaining_local: state.limiter.remaining(),
            promo_pool_remaining: state.promo_pool_remaining,
            pending_mint_total,
            pending_promo_total,
            accounts: state.ledger.len(),
            bonds: state.bonds,
            initialized: state.initialized,
        })
    }

    /// Checks `total_issued == registry supply + Σ pending + in_flight`.
    ///
    /// Only meaningful while no withdrawal or initialization is mid-mint,
    /// and only if the engine is the registry's sole minter.
    pub fn audit(&self) -> Result<(), AuditError> {
        let state = self.state.read();
        let registry_supply = self.registry.total_supply();
        let (mint, promo) = state.ledger.totals().ok_or(AuditError::ArithmeticOverflow)?;
        let pending = mint.checked_add(promo).ok_or(AuditError::ArithmeticOverflow)?;
        let accounted = registry_supply
            .checked_add(pending)
            .and_then(|v| v.checked_add(state.in_flight))
            .ok_or(AuditError::ArithmeticOverflow)?;

        if accounted != state.total_issued {
            error!(
                total_issued = state.total_issued,
                registry_supply, pending, in_flight = state.in_flight,
                "issuance audit failed"
            );
            return Err(AuditError::Desynchronized {
                total_issued: state.total_issued,
                registry_supply,
                pending,
                in_flight: state.in_flight,
            });
        }
        debug!(total_issued = state.total_issued, "issuance audit passed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// A consistent copy of the full state.
    pub fn snapshot(&self) -> CurveState {
        self.state.read().clone()
    }

    /// Replaces the full state with `state`.
    pub fn restore(&self, state: CurveState) {
        info!(
            supply = %state.curve_supply,
            accounts = state.ledger.len(),
            "engine state restored"
        );
        *self.state.write() = state;
    }
}
