//! # Curve Engine
//!
//! Stateful core of Bondline. A [`CurveEngine`] owns one [`CurveState`]
//! behind a single lock and exposes the operations participants and
//! governors call:
//!
//! - **bond**: price native value through the reference, check the intake
//!   ceiling, move the curve, credit pending balances.
//! - **withdraw**: hand a pending balance to the asset registry as a mint.
//! - **initialize_reserve**: one-time treasury mint.
//! - **set_rate_limit_threshold**: governance.
//! - queries, audit, and JSON-serializable snapshots.
//!
//! The engine never holds its lock while calling the asset registry, and
//! always moves a balance out of the ledger before doing so.

pub mod curve_engine;
pub mod error;
pub mod external;
pub mod ledger;
pub mod limiter;
pub mod state;
pub mod types;

pub use curve_engine::CurveEngine;
pub use error::{AuditError, AuthError, BondError, InitError, WithdrawError};
pub use external::{AccessGate, AssetRegistry, MintError, OpenGate};
pub use ledger::{PendingAccount, PendingLedger};
pub use limiter::RateLimiter;
pub use state::CurveState;
pub use types::{Address, BalanceKind, BondReceipt, EngineStatus, NativeAmount, Quote};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{native_unit, CurveConfig};
    use crate::math::Fixed;
    use crate::oracle::StaticRateSource;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Registry double: tracks balances, can be told to refuse.
    #[derive(Default)]
    struct FakeRegistry {
        balances: Mutex<HashMap<Address, u128>>,
        refuse: Mutex<bool>,
    }

    impl AssetRegistry for FakeRegistry {
        fn total_supply(&self) -> u128 {
            self.balances.lock().values().sum()
        }

        fn mint(&self, to: &Address, amount: u128) -> Result<(), MintError> {
            if *self.refuse.lock() {
                return Err(MintError::Rejected("paused".into()));
            }
            *self.balances.lock().entry(to.clone()).or_default() += amount;
            Ok(())
        }
    }

    struct Gate {
        governor: Address,
        bonders: Vec<Address>,
    }

    impl AccessGate for Gate {
        fn is_approved_to_bond(&self, who: &Address) -> bool {
            self.bonders.contains(who)
        }

        fn is_governor(&self, who: &Address) -> bool {
            *who == self.governor
        }
    }

    fn addr(n: u8) -> Address {
        Address::new(format!("0x{:040x}", n))
    }

    struct Harness {
        engine: CurveEngine,
        registry: Arc<FakeRegistry>,
        source: Arc<StaticRateSource>,
    }

    fn harness(config: CurveConfig) -> Harness {
        let registry = Arc::new(FakeRegistry::default());
        let source = Arc::new(StaticRateSource::new(Fixed::from_int(2_000).unwrap()));
        let gate = Arc::new(Gate {
            governor: addr(0xff),
            bonders: vec![addr(1), addr(2)],
        });
        let engine = CurveEngine::new(&config, source.clone(), registry.clone(), gate).unwrap();
        Harness {
            engine,
            registry,
            source,
        }
    }

    fn eth(n: u128) -> NativeAmount {
        NativeAmount::new(n * native_unit())
    }

    #[test]
    fn bond_credits_pending_balances() {
        let h = harness(CurveConfig::default());
        h.source.set_rate(Fixed::ONE);
        // 1 native at rate 1 is 1 local unit: Δ = 1.
        let r = h.engine.bond(&addr(1), 0, eth(1)).unwrap();
        assert_eq!(r.value_local, 1_000_000);
        assert_eq!(r.minted, 2_699_986);
        assert_eq!(r.promo, 2_699_986 * 500 / 10_000);

        let acct = h.engine.account(&addr(1)).unwrap();
        assert_eq!(acct.pending_mint, r.minted);
        assert_eq!(acct.pending_promo, r.promo);

        let status = h.engine.status().unwrap();
        assert_eq!(status.total_issued, r.minted + r.promo);
        assert_eq!(status.collateral_received_local, 1_000_000);
        assert_eq!(status.bonds, 1);
        h.engine.audit().unwrap();
    }

    #[test]
    fn unapproved_and_zero_bonds_rejected() {
        let h = harness(CurveConfig::default());
        assert_eq!(
            h.engine.bond(&addr(9), 0, eth(1)).unwrap_err(),
            BondError::NotAuthorized
        );
        assert_eq!(
            h.engine.bond(&addr(1), 0, NativeAmount::new(0)).unwrap_err(),
            BondError::ZeroValue
        );
        assert_eq!(h.engine.snapshot(), CurveState::new(&CurveConfig::default()));
    }

    #[test]
    fn dust_bond_rejected_without_state_change() {
        let h = harness(CurveConfig::default());
        let before = h.engine.status().unwrap();
        // 1 wei at 2000 local per native prices to 2e-15 local units.
        assert_eq!(
            h.engine.bond(&addr(1), 0, NativeAmount::new(1)).unwrap_err(),
            BondError::ZeroValue
        );
        assert_eq!(
            h.engine.quote(NativeAmount::new(1)).unwrap_err(),
            BondError::ZeroValue
        );
        let after = h.engine.status().unwrap();
        assert_eq!(after.collateral_received, before.collateral_received);
        assert_eq!(after.bonds, 0);
        assert!(h.engine.account(&addr(1)).is_none());
        assert_eq!(h.engine.snapshot(), CurveState::new(&CurveConfig::default()));
    }

    #[test]
    fn slippage_leaves_state_untouched() {
        let h = harness(CurveConfig::default());
        let before = h.engine.snapshot();
        let err = h.engine.bond(&addr(1), u128::MAX, eth(1)).unwrap_err();
        assert!(matches!(err, BondError::SlippageExceeded { .. }));
        assert_eq!(h.engine.snapshot(), before);
    }

    #[test]
    fn oracle_outage_rejects_bond() {
        let h = harness(CurveConfig::default());
        h.source.set_unavailable();
        assert!(matches!(
            h.engine.bond(&addr(1), 0, eth(1)),
            Err(BondError::OracleUnavailable(_))
        ));
        assert!(h.engine.account(&addr(1)).is_none());
    }

    #[test]
    fn rate_limit_boundary_is_inclusive() {
        let h = harness(CurveConfig::default());
        let value = eth(1);
        let quoted = h.engine.quote(value).unwrap().value_local;

        h.engine.set_rate_limit_threshold(&addr(0xff), quoted - 1).unwrap();
        assert!(matches!(
            h.engine.bond(&addr(1), 0, value),
            Err(BondError::RateLimitExceeded { .. })
        ));

        h.engine.set_rate_limit_threshold(&addr(0xff), quoted).unwrap();
        h.engine.bond(&addr(1), 0, value).unwrap();
        assert_eq!(h.engine.status().unwrap().rate_limit_remaining_local, 0);
    }

    #[test]
    fn threshold_requires_governor() {
        let h = harness(CurveConfig::default());
        assert_eq!(
            h.engine.set_rate_limit_threshold(&addr(1), 5),
            Err(AuthError::Unauthorized)
        );
    }

    #[test]
    fn withdraw_moves_balance_to_registry_once() {
        let h = harness(CurveConfig::default());
        let r = h.engine.bond(&addr(1), 0, eth(1)).unwrap();

        assert_eq!(h.engine.withdraw_mint_balance(&addr(1)), Ok(r.minted));
        assert_eq!(
            h.engine.withdraw_mint_balance(&addr(1)),
            Err(WithdrawError::NothingPending)
        );
        assert_eq!(h.engine.withdraw_promo_balance(&addr(1)), Ok(r.promo));
        assert_eq!(h.registry.total_supply(), r.minted + r.promo);
        h.engine.audit().unwrap();
    }

    #[test]
    fn withdraw_without_account() {
        let h = harness(CurveConfig::default());
        assert_eq!(
            h.engine.withdraw_promo_balance(&addr(2)),
            Err(WithdrawError::AccountNotOpened)
        );
    }

    #[test]
    fn failed_mint_restores_balance() {
        let h = harness(CurveConfig::default());
        let r = h.engine.bond(&addr(1), 0, eth(1)).unwrap();
        *h.registry.refuse.lock() = true;

        assert!(matches!(
            h.engine.withdraw_mint_balance(&addr(1)),
            Err(WithdrawError::Mint(MintError::Rejected(_)))
        ));
        assert_eq!(h.engine.account(&addr(1)).unwrap().pending_mint, r.minted);
        assert_eq!(h.engine.status().unwrap().in_flight, 0);
        h.engine.audit().unwrap();
    }

    #[test]
    fn promo_capped_by_pool() {
        let h = harness(CurveConfig {
            promo_pool: 10,
            ..CurveConfig::default()
        });
        let r = h.engine.bond(&addr(1), 0, eth(1)).unwrap();
        assert_eq!(r.promo, 10);
        let r = h.engine.bond(&addr(2), 0, eth(1)).unwrap();
        assert_eq!(r.promo, 0);
        assert_eq!(h.engine.status().unwrap().promo_pool_remaining, 0);
    }

    #[test]
    fn reserve_initializes_once() {
        let h = harness(CurveConfig::default());
        assert_eq!(
            h.engine.initialize_reserve(&addr(1)),
            Err(InitError::Unauthorized)
        );

        *h.registry.refuse.lock() = true;
        assert!(matches!(
            h.engine.initialize_reserve(&addr(0xff)),
            Err(InitError::Mint(_))
        ));
        assert_eq!(h.engine.status().unwrap().total_issued, 0);

        *h.registry.refuse.lock() = false;
        h.engine.initialize_reserve(&addr(0xff)).unwrap();
        assert_eq!(
            h.engine.initialize_reserve(&addr(0xff)),
            Err(InitError::AlreadyInitialized)
        );
        let cfg = CurveConfig::default();
        assert_eq!(h.registry.total_supply(), cfg.initial_reserve);
        h.engine.audit().unwrap();
    }

    #[test]
    fn quote_matches_subsequent_bond() {
        let h = harness(CurveConfig::default());
        h.engine.bond(&addr(2), 0, eth(3)).unwrap();
        let q = h.engine.quote(eth(2)).unwrap();
        let r = h.engine.bond(&addr(1), q.minted, eth(2)).unwrap();
        assert_eq!((q.minted, q.promo, q.supply_after), (r.minted, r.promo, r.supply_after));
    }

    #[test]
    fn snapshot_restore_round_trips_through_json() {
        let h = harness(CurveConfig::default());
        h.engine.bond(&addr(1), 0, eth(1)).unwrap();
        let json = serde_json::to_string(&h.engine.snapshot()).unwrap();

        let fresh = harness(CurveConfig::default());
        fresh.engine.restore(serde_json::from_str(&json).unwrap());
        assert_eq!(fresh.engine.snapshot(), h.engine.snapshot());
        assert_eq!(
            fresh.engine.current_spot_price().unwrap(),
            h.engine.current_spot_price().unwrap()
        );
    }

    #[test]
    fn audit_detects_foreign_mint() {
        let h = harness(CurveConfig::default());
        h.engine.bond(&addr(1), 0, eth(1)).unwrap();
        h.registry.mint(&addr(7), 1).unwrap();
        assert!(matches!(
            h.engine.audit(),
            Err(AuditError::Desynchronized { .. })
        ));
    }
}
