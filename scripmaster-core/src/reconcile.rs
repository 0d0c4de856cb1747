//! Reconciler: classifies two normalized sources into common / only-A / only-B.
//!
//! Records are joined on `(exchange, trading_symbol)`. Within one source a
//! repeated key collapses to its first occurrence; the number of collapsed
//! rows is reported in the result and logged, never dropped silently.
//!
//! Guarantees, over distinct keys:
//! - `common.len() + only_a.len() == distinct(A)`
//! - `common.len() + only_b.len() == distinct(B)`
//! - each partition keeps its source's input order (`common` follows A).

use crate::domain::{CommonInstrument, NormalizedInstrument};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationResult {
    pub common: Vec<CommonInstrument>,
    pub only_a: Vec<NormalizedInstrument>,
    pub only_b: Vec<NormalizedInstrument>,
    /// Rows of A dropped because their key was already seen in A.
    pub collapsed_a: usize,
    /// Rows of B dropped because their key was already seen in B.
    pub collapsed_b: usize,
}

impl ReconciliationResult {
    pub fn summary(&self) -> ReconciliationCounts {
        ReconciliationCounts {
            common: self.common.len(),
            only_a: self.only_a.len(),
            only_b: self.only_b.len(),
            collapsed_a: self.collapsed_a,
            collapsed_b: self.collapsed_b,
        }
    }
}

/// Partition sizes, for logs and the run manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReconciliationCounts {
    pub common: usize,
    pub only_a: usize,
    pub only_b: usize,
    pub collapsed_a: usize,
    pub collapsed_b: usize,
}

/// Reconcile source A against source B.
pub fn reconcile(a: &[NormalizedInstrument], b: &[NormalizedInstrument]) -> ReconciliationResult {
    let (a, collapsed_a) = first_occurrences(a);
    let (b, collapsed_b) = first_occurrences(b);

    if collapsed_a > 0 || collapsed_b > 0 {
        tracing::warn!(
            collapsed_a,
            collapsed_b,
            "duplicate trading symbols collapsed to first occurrence"
        );
    }

    let b_index: HashMap<(&str, &str), &NormalizedInstrument> =
        b.iter().map(|r| (r.join_key(), *r)).collect();
    let a_keys: HashSet<(&str, &str)> = a.iter().map(|r| r.join_key()).collect();

    let mut common = Vec::new();
    let mut only_a = Vec::new();
    for rec in &a {
        match b_index.get(&rec.join_key()) {
            Some(other) => common.push(CommonInstrument::merge(rec, other)),
            None => only_a.push((*rec).clone()),
        }
    }

    let only_b: Vec<NormalizedInstrument> = b
        .iter()
        .filter(|r| !a_keys.contains(&r.join_key()))
        .map(|r| (*r).clone())
        .collect();

    let result = ReconciliationResult {
        common,
        only_a,
        only_b,
        collapsed_a,
        collapsed_b,
    };
    tracing::info!(
        common = result.common.len(),
        only_a = result.only_a.len(),
        only_b = result.only_b.len(),
        "reconciled sources"
    );
    result
}

/// First record per join key, in input order, plus the number of rows dropped.
fn first_occurrences(records: &[NormalizedInstrument]) -> (Vec<&NormalizedInstrument>, usize) {
    let mut seen = HashSet::with_capacity(records.len());
    let kept: Vec<&NormalizedInstrument> = records
        .iter()
        .filter(|r| seen.insert(r.join_key()))
        .collect();
    let collapsed = records.len() - kept.len();
    (kept, collapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(symbol: &str, key: &str) -> NormalizedInstrument {
        NormalizedInstrument {
            exchange: "NSE".into(),
            instrument_key: key.into(),
            trading_symbol: symbol.into(),
            name: format!("{symbol} name"),
            ..Default::default()
        }
    }

    #[test]
    fn infy_tcs_scenario() {
        let a = vec![rec("INFY", "key1")];
        let b = vec![rec("INFY", "key2"), rec("TCS", "key3")];

        let r = reconcile(&a, &b);

        assert_eq!(r.common.len(), 1);
        assert_eq!(r.common[0].trading_symbol, "INFY");
        assert_eq!(r.common[0].instrument_key, "key1", "source A wins the key");
        assert!(r.only_a.is_empty());
        assert_eq!(r.only_b, vec![rec("TCS", "key3")]);
    }

    #[test]
    fn empty_inputs_give_empty_outputs() {
        let r = reconcile(&[], &[]);
        assert_eq!(r, ReconciliationResult::default());

        let r = reconcile(&[rec("INFY", "k")], &[]);
        assert_eq!(r.only_a.len(), 1);
        assert!(r.common.is_empty() && r.only_b.is_empty());
    }

    #[test]
    fn same_symbol_on_different_exchanges_does_not_join() {
        let a = vec![rec("INFY", "k1")];
        let mut bse = rec("INFY", "k2");
        bse.exchange = "BSE".into();

        let r = reconcile(&a, &[bse]);
        assert!(r.common.is_empty());
        assert_eq!(r.only_a.len(), 1);
        assert_eq!(r.only_b.len(), 1);
    }

    #[test]
    fn duplicates_collapse_to_first_occurrence_and_are_counted() {
        let a = vec![rec("INFY", "first"), rec("INFY", "second"), rec("TCS", "t")];
        let b = vec![rec("INFY", "b1"), rec("WIPRO", "w"), rec("WIPRO", "w2")];

        let r = reconcile(&a, &b);

        assert_eq!(r.collapsed_a, 1);
        assert_eq!(r.collapsed_b, 1);
        assert_eq!(r.common.len(), 1);
        assert_eq!(r.common[0].instrument_key, "first");
        assert_eq!(r.only_a, vec![rec("TCS", "t")]);
        assert_eq!(r.only_b, vec![rec("WIPRO", "w")]);
    }

    #[test]
    fn partitions_preserve_input_order() {
        let a = vec![rec("ZEEL", "z"), rec("ACC", "a"), rec("MRF", "m"), rec("BEL", "b")];
        let b = vec![rec("MRF", "m2"), rec("YESBANK", "y"), rec("ZEEL", "z2"), rec("AXISBANK", "x")];

        let r = reconcile(&a, &b);

        let common: Vec<_> = r.common.iter().map(|c| c.trading_symbol.as_str()).collect();
        let only_a: Vec<_> = r.only_a.iter().map(|c| c.trading_symbol.as_str()).collect();
        let only_b: Vec<_> = r.only_b.iter().map(|c| c.trading_symbol.as_str()).collect();
        assert_eq!(common, vec!["ZEEL", "MRF"]);
        assert_eq!(only_a, vec!["ACC", "BEL"]);
        assert_eq!(only_b, vec!["YESBANK", "AXISBANK"]);
    }

    #[test]
    fn summary_reports_partition_sizes() {
        let r = reconcile(&[rec("INFY", "k")], &[rec("INFY", "k"), rec("TCS", "t")]);
        let s = r.summary();
        assert_eq!((s.common, s.only_a, s.only_b), (1, 0, 1));
    }
}
