//! BB84 basis reconciliation (sifting) and QBER estimation.

use serde::Serialize;

use crate::channel::{Bit, Transmission};
use crate::error::LowSample;

#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub qber: f64,
    pub matched_count: usize,
    pub mismatch_count: usize,
    /// Sender bits at matched positions.
    pub sifted_key: Vec<Bit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<LowSample>,
}

impl Reconciliation {
    pub fn is_low_sample(&self) -> bool {
        self.warning.is_some()
    }
}

/// Sift the transmission and estimate the quantum bit error rate.
///
/// QBER is `mismatches / matched` over positions whose bases agree.  With no
/// matched positions the QBER is defined as 0 and the result is flagged
/// [`LowSample::NoMatchedBases`].
pub fn reconcile(tx: &Transmission) -> Reconciliation {
    let mut sifted_key = Vec::with_capacity(tx.len() / 2 + 1);
    let mut mismatch_count = 0usize;

    for (q, o) in tx.qubits.iter().zip(tx.outcomes()) {
        if !o.matched {
            continue;
        }
        sifted_key.push(q.bit);
        if q.bit != o.receiver_bit {
            mismatch_count += 1;
        }
    }

    let matched_count = sifted_key.len();
    let (qber, warning) = if matched_count == 0 {
        (0.0, Some(LowSample::NoMatchedBases))
    } else {
        (mismatch_count as f64 / matched_count as f64, None)
    };

    Reconciliation {
        qber,
        matched_count,
        mismatch_count,
        sifted_key,
        warning,
    }
}

impl Transmission {
    /// One indicator per matched position: `0` = bits agree, `1` = mismatch.
    ///
    /// Lazy and restartable: clone the iterator or call this again.
    pub fn mismatch_series(&self) -> MismatchSeries<'_> {
        MismatchSeries { tx: self, pos: 0 }
    }
}

#[derive(Debug, Clone)]
pub struct MismatchSeries<'a> {
    tx: &'a Transmission,
    pos: usize,
}

impl Iterator for MismatchSeries<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        while self.pos < self.tx.qubits.len() {
            let i = self.pos;
            self.pos += 1;
            let q = &self.tx.qubits[i];
            if q.basis == self.tx.receiver_bases[i] {
                return Some(u8::from(q.bit != self.tx.receiver_bits[i]));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.tx.qubits.len() - self.pos))
    }
}

impl std::iter::FusedIterator for MismatchSeries<'_> {}
