//! Risk pool lifecycle: liquidity, policies and claims

mod common;

use aegis_common::crypto::MerkleTree;
use aegis_common::ErrorKind;
use aegis_market::{CoverRequest, InsuranceStatus, MarketStatus};
use common::{Harness, DAY, START};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

mod liquidity_tests {
    use super::*;

    #[test]
    fn test_deposit_request_withdraw() {
        let h = Harness::new();
        let pool = h.protocol.create_pool("bridge", None).unwrap();
        let alice = h.funded("alice", dec!(10000));

        let minted = h.protocol.pool_deposit(pool, &alice, dec!(10000)).unwrap();
        assert_eq!(minted, dec!(10000));
        assert_eq!(h.total_liquidity(pool), dec!(10000));

        // No request yet
        let err = h.protocol.pool_withdraw(pool, &alice, dec!(10000)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WindowClosed);

        h.protocol
            .pool_request_withdraw(pool, &alice, dec!(10000))
            .unwrap();
        h.advance(DAY);
        let err = h.protocol.pool_withdraw(pool, &alice, dec!(10000)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WindowClosed);

        h.advance(6 * DAY);
        let value = h.protocol.pool_withdraw(pool, &alice, dec!(10000)).unwrap();
        assert_eq!(value, dec!(10000));
        assert_eq!(h.asset_balance(&alice), dec!(10000));
        assert_eq!(h.protocol.read(|s| s.vault().balance()), Decimal::ZERO);
    }

    #[test]
    fn test_request_expires_after_window() {
        let h = Harness::new();
        let pool = h.pool_with_lp("alice", dec!(1000));
        let alice = aegis_common::Holder::account("alice");

        h.protocol.pool_request_withdraw(pool, &alice, dec!(1000)).unwrap();
        h.advance(7 * DAY + 2 * DAY + 1);

        let err = h.protocol.pool_withdraw(pool, &alice, dec!(1000)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WindowClosed);
    }

    #[test]
    fn test_share_transfer_shrinks_request() {
        let h = Harness::new();
        let pool = h.pool_with_lp("alice", dec!(1000));
        let alice = aegis_common::Holder::account("alice");
        let bob = aegis_common::Holder::account("bob");

        h.protocol.pool_request_withdraw(pool, &alice, dec!(1000)).unwrap();
        h.protocol
            .pool_transfer_shares(pool, &alice, &bob, dec!(400))
            .unwrap();
        h.advance(7 * DAY);

        let err = h.protocol.pool_withdraw(pool, &alice, dec!(700)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
        assert_eq!(h.protocol.pool_withdraw(pool, &alice, dec!(600)).unwrap(), dec!(600));

        // The receiver must make its own request
        let err = h.protocol.pool_withdraw(pool, &bob, dec!(400)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WindowClosed);
    }

    #[test]
    fn test_locked_capital_cannot_be_withdrawn() {
        let h = Harness::new();
        let pool = h.pool_with_lp("alice", dec!(1000));
        let alice = aegis_common::Holder::account("alice");
        let bob = aegis_common::Holder::account("bob");

        h.protocol
            .insure(pool, &bob, dec!(800), Decimal::ZERO, 30 * DAY, "bridge", None)
            .unwrap();
        h.protocol.pool_request_withdraw(pool, &alice, dec!(1000)).unwrap();
        h.advance(7 * DAY);

        let err = h.protocol.pool_withdraw(pool, &alice, dec!(1000)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
        assert_eq!(h.protocol.pool_withdraw(pool, &alice, dec!(200)).unwrap(), dec!(200));
    }

    #[test]
    fn test_strategy_yield_accrues_to_lps() {
        let h = Harness::new();
        let pool = h.pool_with_lp("alice", dec!(1000));
        h.protocol
            .set_controller(Some(aegis_ledger::Controller::new("lending")))
            .unwrap();

        assert_eq!(h.protocol.utilize().unwrap(), dec!(1000));
        h.protocol.report_yield(dec!(100)).unwrap();

        assert_eq!(h.total_liquidity(pool), dec!(1100));
        let alice = h.protocol.read(|s| {
            s.pool(pool)
                .unwrap()
                .value_of_underlying(&aegis_common::Holder::account("alice"), s.vault())
                .unwrap()
        });
        assert_eq!(alice, dec!(1100));

        // Removing the controller recalls everything
        assert_eq!(h.protocol.set_controller(None).unwrap(), dec!(1100));
        assert_eq!(h.protocol.read(|s| s.vault().idle()), dec!(1100));
    }
}

mod policy_tests {
    use super::*;
    use crate::common::FixedPremium;
    use aegis_common::Holder;
    use std::sync::Arc;

    #[test]
    fn test_premium_below_one_unit_after_yield() {
        let h = Harness::with_premium(Arc::new(FixedPremium(dec!(1))));
        let pool = h.pool_with_lp("alice", dec!(2000));
        h.protocol
            .set_controller(Some(aegis_ledger::Controller::new("lending")))
            .unwrap();
        h.protocol.utilize().unwrap();
        h.protocol.report_yield(dec!(1)).unwrap();

        // One unit of attribution is now worth more than one token
        let bob = h.funded("bob", dec!(1));
        h.protocol
            .insure(pool, &bob, dec!(100), dec!(1), 7 * DAY, "bridge", None)
            .unwrap();

        assert_eq!(h.asset_balance(&bob), Decimal::ZERO);
        assert_eq!(h.total_liquidity(pool), dec!(2002));
        assert_eq!(h.locked(pool), dec!(100));
        assert_eq!(h.vault_value(&Holder::Reserve), Decimal::ZERO);
    }

    #[test]
    fn test_span_bounds() {
        let h = Harness::new();
        let pool = h.pool_with_lp("alice", dec!(1000));
        let bob = Holder::account("bob");

        let err = h
            .protocol
            .insure(pool, &bob, dec!(100), Decimal::ZERO, DAY, "bridge", None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SpanOutOfRange);

        let err = h
            .protocol
            .insure(pool, &bob, dec!(100), Decimal::ZERO, 366 * DAY, "bridge", None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SpanOutOfRange);
    }

    #[test]
    fn test_insure_beyond_available() {
        let h = Harness::new();
        let pool = h.pool_with_lp("alice", dec!(1000));
        let bob = Holder::account("bob");

        let err = h
            .protocol
            .insure(pool, &bob, dec!(1001), Decimal::ZERO, 7 * DAY, "bridge", None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
    }

    #[test]
    fn test_premium_split_between_reserve_and_lps() {
        let h = Harness::with_premium(Arc::new(FixedPremium(dec!(100))));
        let pool = h.pool_with_lp("alice", dec!(1000));
        let bob = h.funded("bob", dec!(100));

        let err = h
            .protocol
            .insure(pool, &bob, dec!(500), dec!(99), 7 * DAY, "bridge", None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        h.protocol
            .insure(pool, &bob, dec!(500), dec!(100), 7 * DAY, "bridge", None)
            .unwrap();
        assert_eq!(h.asset_balance(&bob), Decimal::ZERO);
        assert_eq!(h.vault_value(&Holder::Reserve), dec!(10));
        assert_eq!(
            h.protocol
                .read(|s| s.pool(pool).unwrap().value_of_underlying(&Holder::account("alice"), s.vault()).unwrap()),
            dec!(1090)
        );
        assert_eq!(h.locked(pool), dec!(500));
    }

    #[test]
    fn test_unlock_after_grace() {
        let h = Harness::new();
        let pool = h.pool_with_lp("alice", dec!(1000));
        let bob = Holder::account("bob");
        let id = h
            .protocol
            .insure(pool, &bob, dec!(1000), Decimal::ZERO, 7 * DAY, "bridge", None)
            .unwrap();

        h.advance(10 * DAY);
        let err = h.protocol.unlock(pool, id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        h.advance(1);
        h.protocol.unlock(pool, id).unwrap();
        assert_eq!(h.locked(pool), Decimal::ZERO);
        let status = h
            .protocol
            .read(|s| s.pool(pool).unwrap().insurance(id).unwrap().status);
        assert_eq!(status, InsuranceStatus::Unlocked);

        let err = h.protocol.unlock_batch(pool, &[id]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_transfer_insurance() {
        let h = Harness::new();
        let pool = h.pool_with_lp("alice", dec!(1000));
        let bob = Holder::account("bob");
        let carol = Holder::account("carol");
        let id = h
            .protocol
            .insure(pool, &bob, dec!(100), Decimal::ZERO, 7 * DAY, "bridge", None)
            .unwrap();

        let err = h.protocol.transfer_insurance(pool, &carol, id, &carol).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnauthorizedSource);
        let err = h
            .protocol
            .transfer_insurance(pool, &bob, id, &Holder::account(""))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        h.protocol.transfer_insurance(pool, &bob, id, &carol).unwrap();
        let insured = h
            .protocol
            .read(|s| s.pool(pool).unwrap().insurance(id).unwrap().insured.clone());
        assert_eq!(insured, carol);
    }

    #[test]
    fn test_failed_premium_intake_rolls_back_policy() {
        let h = Harness::with_premium(Arc::new(FixedPremium(dec!(100))));
        let pool = h.pool_with_lp("alice", dec!(1000));
        let broke = Holder::account("broke");
        let before = h.protocol.export_state().unwrap();

        let err = h
            .protocol
            .insure(pool, &broke, dec!(500), dec!(100), 7 * DAY, "bridge", None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);

        assert_eq!(h.protocol.export_state().unwrap(), before);
        assert!(h.protocol.read(|s| s.pool(pool).unwrap().insurances().is_empty()));
        assert_eq!(h.locked(pool), Decimal::ZERO);
    }
}

mod claim_tests {
    use super::*;
    use aegis_common::Holder;

    fn cover(tree: &MerkleTree, numerator: u64) -> CoverRequest {
        CoverRequest {
            pending_secs: DAY,
            payout_numerator: numerator,
            payout_denominator: 10000,
            incident_timestamp: START + DAY,
            merkle_root: tree.root().unwrap(),
            targets: vec!["bridge".to_string()],
        }
    }

    #[test]
    fn test_payout_reduces_lock_and_liquidity() {
        let h = Harness::new();
        let pool = h.pool_with_lp("alice", dec!(10000));
        let bob = Holder::account("bob");
        let carol = Holder::account("carol");
        let id = h
            .protocol
            .insure(pool, &bob, dec!(10000), Decimal::ZERO, 30 * DAY, "bridge", None)
            .unwrap();

        let tree = MerkleTree::from_claims([(id, &bob, 10000u128), (99, &carol, 1u128)]);
        h.advance(2 * DAY);
        h.protocol.apply_cover(pool, cover(&tree, 5000)).unwrap();

        // Claims open once the pending window has elapsed
        let proof = tree.proof(0).unwrap();
        let err = h
            .protocol
            .redeem(pool, &bob, id, dec!(10000), &proof)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        h.advance(DAY);
        let status = h.protocol.read(|s| s.pool(pool).unwrap().status_at(h.protocol.now()));
        assert_eq!(status, MarketStatus::Payout);

        let err = h
            .protocol
            .redeem(pool, &carol, id, dec!(10000), &proof)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnauthorizedSource);
        let err = h
            .protocol
            .redeem(pool, &bob, id, dec!(9999), &proof)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClaimRejected);

        let payout = h.protocol.redeem(pool, &bob, id, dec!(10000), &proof).unwrap();
        assert_eq!(payout, dec!(5000));
        assert_eq!(h.asset_balance(&bob), dec!(5000));
        assert_eq!(h.locked(pool), dec!(5000));
        assert_eq!(h.total_liquidity(pool), dec!(5000));
        assert_eq!(
            h.protocol.read(|s| s.vault().debt_of(&Holder::Pool(pool))),
            dec!(5000)
        );

        let err = h
            .protocol
            .redeem(pool, &bob, id, dec!(10000), &proof)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_resume_settles_debt_against_lps() {
        let h = Harness::new();
        let pool = h.pool_with_lp("alice", dec!(10000));
        let bob = Holder::account("bob");
        let id = h
            .protocol
            .insure(pool, &bob, dec!(10000), Decimal::ZERO, 30 * DAY, "bridge", None)
            .unwrap();
        let tree = MerkleTree::from_claims([(id, &bob, 10000u128)]);
        h.advance(2 * DAY);
        h.protocol.apply_cover(pool, cover(&tree, 5000)).unwrap();
        h.advance(DAY);
        h.protocol
            .redeem(pool, &bob, id, dec!(10000), &tree.proof(0).unwrap())
            .unwrap();

        // Claim window still open
        let err = h.protocol.resume(pool).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        h.advance(15 * DAY);
        let err = h
            .protocol
            .redeem(pool, &bob, id, dec!(10000), &tree.proof(0).unwrap())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WindowClosed);

        h.protocol.resume(pool).unwrap();
        assert_eq!(h.locked(pool), Decimal::ZERO);
        assert_eq!(h.total_liquidity(pool), dec!(5000));
        assert_eq!(
            h.protocol.read(|s| s.vault().debt_of(&Holder::Pool(pool))),
            Decimal::ZERO
        );
        let alice_value = h.protocol.read(|s| {
            s.pool(pool)
                .unwrap()
                .value_of_underlying(&Holder::account("alice"), s.vault())
                .unwrap()
        });
        assert_eq!(alice_value, dec!(5000));
        assert_eq!(
            h.protocol.read(|s| s.pool(pool).unwrap().stored_status()),
            MarketStatus::Trading
        );
    }

    #[test]
    fn test_claim_outside_coverage_is_not_applicable() {
        let h = Harness::new();
        let pool = h.pool_with_lp("alice", dec!(10000));
        let bob = Holder::account("bob");
        let dex_id = h
            .protocol
            .insure(pool, &bob, dec!(1000), Decimal::ZERO, 30 * DAY, "dex", None)
            .unwrap();
        let tree = MerkleTree::from_claims([(dex_id, &bob, 1000u128)]);

        h.advance(2 * DAY);
        h.protocol.apply_cover(pool, cover(&tree, 10000)).unwrap();
        h.advance(DAY);

        let err = h
            .protocol
            .redeem(pool, &bob, dex_id, dec!(1000), &tree.proof(0).unwrap())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClaimNotApplicable);
    }

    #[test]
    fn test_invalid_payout_ratio() {
        let h = Harness::new();
        let pool = h.pool_with_lp("alice", dec!(1000));
        let tree = MerkleTree::from_claims([(0, &Holder::account("bob"), 1u128)]);

        let err = h.protocol.apply_cover(pool, cover(&tree, 10001)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_reporting_pool_refuses_new_business() {
        let h = Harness::new();
        let pool = h.pool_with_lp("alice", dec!(1000));
        let tree = MerkleTree::from_claims([(0, &Holder::account("bob"), 1u128)]);
        h.protocol.apply_cover(pool, cover(&tree, 5000)).unwrap();

        let bob = Holder::account("bob");
        let err = h
            .protocol
            .insure(pool, &bob, dec!(10), Decimal::ZERO, 7 * DAY, "bridge", None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = h.protocol.apply_cover(pool, cover(&tree, 5000)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }
}
