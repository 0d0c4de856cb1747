//! Property tests for reconciler invariants.
//!
//! Uses proptest to verify:
//! 1. Disjoint sources never produce common records
//! 2. Reconciling a source with itself leaves nothing unmatched
//! 3. Count identities hold over distinct symbols for arbitrary inputs
//! 4. Every common record has a counterpart in both sources

use proptest::prelude::*;
use std::collections::HashSet;
use scripmaster_core::{reconcile, NormalizedInstrument};

// ── Strategies (proptest) ────────────────────────────────────────────

fn instrument(symbol: String, key: String) -> NormalizedInstrument {
    NormalizedInstrument {
        exchange: "NSE".into(),
        instrument_key: key,
        trading_symbol: symbol,
        ..Default::default()
    }
}

/// Symbols from a small alphabet so that overlaps and duplicates are common.
fn arb_source(prefix: &'static str) -> impl Strategy<Value = Vec<NormalizedInstrument>> {
    prop::collection::vec(("[A-F]{1,2}", 0u32..1000), 0..40).prop_map(move |rows| {
        rows.into_iter()
            .map(|(sym, n)| instrument(format!("{prefix}{sym}"), format!("key{n}")))
            .collect()
    })
}

fn distinct_symbols(records: &[NormalizedInstrument]) -> usize {
    records
        .iter()
        .map(|r| (r.exchange.as_str(), r.trading_symbol.as_str()))
        .collect::<HashSet<_>>()
        .len()
}

proptest! {
    #[test]
    fn disjoint_sources_have_no_common(a in arb_source("A"), b in arb_source("B")) {
        let r = reconcile(&a, &b);
        prop_assert!(r.common.is_empty());
        prop_assert_eq!(r.only_a.len(), distinct_symbols(&a));
        prop_assert_eq!(r.only_b.len(), distinct_symbols(&b));
    }

    #[test]
    fn self_reconcile_leaves_nothing_unmatched(a in arb_source("")) {
        let r = reconcile(&a, &a);
        prop_assert!(r.only_a.is_empty());
        prop_assert!(r.only_b.is_empty());
        prop_assert_eq!(r.common.len(), distinct_symbols(&a));
    }

    #[test]
    fn counts_add_up_over_distinct_symbols(a in arb_source(""), b in arb_source("")) {
        let r = reconcile(&a, &b);
        prop_assert_eq!(r.common.len() + r.only_a.len(), distinct_symbols(&a));
        prop_assert_eq!(r.common.len() + r.only_b.len(), distinct_symbols(&b));
        prop_assert_eq!(r.collapsed_a, a.len() - distinct_symbols(&a));
        prop_assert_eq!(r.collapsed_b, b.len() - distinct_symbols(&b));
    }

    #[test]
    fn common_records_exist_in_both_sources(a in arb_source(""), b in arb_source("")) {
        let r = reconcile(&a, &b);
        let a_syms: HashSet<_> = a.iter().map(|x| x.trading_symbol.as_str()).collect();
        let b_syms: HashSet<_> = b.iter().map(|x| x.trading_symbol.as_str()).collect();

        for c in &r.common {
            prop_assert!(a_syms.contains(c.trading_symbol.as_str()));
            prop_assert!(b_syms.contains(c.trading_symbol.as_str()));
        }
        for x in &r.only_a {
            prop_assert!(!b_syms.contains(x.trading_symbol.as_str()));
        }
        for x in &r.only_b {
            prop_assert!(!a_syms.contains(x.trading_symbol.as_str()));
        }
    }
}
