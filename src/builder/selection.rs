//! CoinSelector - largest-first.

use crate::chain::UnspentOutput;
use crate::error::{Error, Result};
use std::collections::HashSet;

/// Outputs chosen to fund one payment.
#[derive(Debug, Clone)]
pub struct Selection {
    pub inputs: Vec<UnspentOutput>,
    /// Sum of `inputs` values.
    pub total: u64,
    pub target: u64,
    pub fee: u64,
}

impl Selection {
    /// Surplus returned to the sender. Zero means no change output.
    pub fn change(&self) -> u64 {
        self.total.saturating_sub(self.target).saturating_sub(self.fee)
    }
}

/// Pick outputs, largest value first, until `target + fee` is covered.
/// Equal values keep their discovery order. An outpoint counts once however
/// often it appears in `unspent`.
pub fn select(unspent: &[UnspentOutput], target: u64, fee: u64) -> Result<Selection> {
    let required = target.checked_add(fee).ok_or(Error::AmountOverflow { target, fee })?;

    let mut seen = HashSet::with_capacity(unspent.len());
    let mut candidates: Vec<&UnspentOutput> = unspent.iter().filter(|u| seen.insert(u.outpoint())).collect();
    candidates.sort_by(|a, b| b.value.cmp(&a.value));

    let mut inputs = Vec::new();
    let mut total: u64 = 0;
    for candidate in candidates {
        if total >= required {
            break;
        }
        // u64 satoshis cannot overflow for real coins, saturate for hostile input
        total = total.saturating_add(candidate.value);
        inputs.push(candidate.clone());
    }

    if total < required {
        return Err(Error::InsufficientBalance { available: total, required, shortfall: required - total });
    }
    Ok(Selection { inputs, total, target, fee })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::absolute::LockTime;
    use bitcoin::hashes::Hash;
    use bitcoin::transaction::Version;
    use bitcoin::{Transaction, Txid};
    use std::sync::Arc;

    fn utxos(values: &[u64]) -> Vec<UnspentOutput> {
        let tx = Arc::new(Transaction { version: Version::TWO, lock_time: LockTime::ZERO, input: vec![], output: vec![] });
        values
            .iter()
            .enumerate()
            .map(|(i, value)| UnspentOutput {
                transaction_hash: Txid::from_byte_array([i as u8 + 1; 32]),
                output_index: i as u32,
                value: *value,
                owning_transaction: tx.clone(),
            })
            .collect()
    }

    fn picked(selection: &Selection) -> Vec<u64> {
        selection.inputs.iter().map(|u| u.value).collect()
    }

    #[test]
    fn test_shortfall_reported() {
        let err = select(&utxos(&[60, 40]), 50, 60).unwrap_err();
        match err {
            Error::InsufficientBalance { available, required, shortfall } => {
                assert_eq!((available, required, shortfall), (100, 110, 10));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_set_is_insufficient() {
        assert!(matches!(select(&[], 1, 0), Err(Error::InsufficientBalance { shortfall: 1, .. })));
    }

    #[test]
    fn test_largest_first_stops_when_covered() {
        let selection = select(&utxos(&[10, 500, 30, 200]), 600, 50).unwrap();
        assert_eq!(picked(&selection), vec![500, 200]);
        assert_eq!(selection.total, 700);
        assert_eq!(selection.change(), 50);
    }

    #[test]
    fn test_exact_cover_has_no_change() {
        let selection = select(&utxos(&[70, 40]), 100, 10).unwrap();
        assert_eq!(picked(&selection), vec![70, 40]);
        assert_eq!(selection.change(), 0);
    }

    #[test]
    fn test_ties_keep_discovery_order() {
        let set = utxos(&[5, 9, 9, 9]);
        let selection = select(&set, 15, 0).unwrap();
        let order: Vec<u32> = selection.inputs.iter().map(|u| u.output_index).collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    fn test_minimal_input_count() {
        // For every target, no subset with fewer outputs covers it.
        let values = [1u64, 3, 4, 8, 8, 20, 35];
        let set = utxos(&values);
        let mut sorted = values.to_vec();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        for target in 1..=values.iter().sum::<u64>() {
            let selection = select(&set, target, 0).unwrap();
            assert!(selection.total >= target);
            let fewer = selection.inputs.len() - 1;
            let best_with_fewer: u64 = sorted.iter().take(fewer).sum();
            assert!(best_with_fewer < target, "target {} could use {} inputs", target, fewer);
        }
    }

    #[test]
    fn test_repeated_outpoint_counts_once() {
        let mut set = utxos(&[60]);
        set.push(set[0].clone());
        let err = select(&set, 100, 10).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { available: 60, required: 110, shortfall: 50 }));

        let selection = select(&set, 50, 0).unwrap();
        assert_eq!(selection.inputs.len(), 1);
        assert_eq!(selection.total, 60);
    }

    #[test]
    fn test_change_of_underfunded_selection_is_zero() {
        let selection = Selection { inputs: vec![], total: 10, target: 50, fee: 5 };
        assert_eq!(selection.change(), 0);
    }

    #[test]
    fn test_fee_overflow() {
        assert!(matches!(select(&utxos(&[1]), u64::MAX, 1), Err(Error::AmountOverflow { .. })));
    }
}
