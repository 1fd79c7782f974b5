//! Property tests over full router executions.

use proptest::prelude::*;
use rust_decimal::Decimal;

use keel_core::{classify, Asset, AssetPair, RouteCategory};
use keel_router::RouterError;
use keel_tests::helpers::*;

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(fut)
}

fn asset() -> impl Strategy<Value = Asset> {
    prop_oneof![
        Just(Asset::new("ETH")),
        Just(Asset::new("USDC")),
        Just(Asset::new("BTC")),
        Just(Asset::new("XYZ")),
        Just(Asset::on_chain("USDC", 137)),
        Just(Asset::on_chain("ETH", 42161)),
        Just(Asset::on_chain("BTC", 1)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn successful_trades_move_exactly_the_quoted_amounts(whole in 1i64..=10) {
        let h = Harness::new();
        let p = pair("ETH", "USDC");
        let amount = Decimal::new(whole, 0);
        let record = block_on(h.router.quote_and_execute(&p, amount)).unwrap();
        prop_assert!(record.success);
        prop_assert_eq!(h.router.ledger().available(&p.src), dec(10) - amount);
        prop_assert_eq!(h.router.ledger().available(&p.dst), dec(10_000) + amount * dec(2_991));
    }

    #[test]
    fn failed_trades_leave_the_ledger_untouched(whole in 1i64..=20) {
        let h = Harness::new();
        h.broadcast.set_reject(true);
        let before = h.router.ledger().snapshot();
        let result = block_on(h.router.quote_and_execute(&pair("ETH", "USDC"), Decimal::new(whole, 0)));
        let is_execution_failure = matches!(result, Err(RouterError::ExecutionFailed { .. }));
        prop_assert!(is_execution_failure);
        prop_assert_eq!(h.router.ledger().snapshot(), before);
        prop_assert_eq!(h.router.records().len(), 1);
    }

    #[test]
    fn recorded_category_matches_classification(src in asset(), dst in asset()) {
        let h = Harness::new();
        let p = AssetPair::new(src, dst);
        let category = classify(&p);
        match block_on(h.router.quote_and_execute(&p, Decimal::new(1, 2))) {
            Ok(record) => prop_assert_eq!(record.route_category, category),
            Err(RouterError::UnsupportedPair(_)) => {
                prop_assert_eq!(category, RouteCategory::Unsupported);
                prop_assert!(h.router.records().is_empty());
            }
            Err(RouterError::ExecutionFailed { .. }) => {
                // Only pairs whose source holds no starting capital fail here.
                prop_assert_eq!(h.router.records().len(), 1);
                prop_assert_eq!(h.router.records()[0].route_category, category);
            }
            Err(other) => prop_assert!(false, "unexpected error {other:?}"),
        }
    }
}
