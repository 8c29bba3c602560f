//! Qubit generation and the simulated quantum channel.

use serde::{Deserialize, Serialize};

use crate::adversary::EveModel;
use crate::error::{QvoteError, Result};
use crate::rng::RandomSource;

/// Upper bound on qubits per run; keeps one run's work bounded.
pub const MAX_QUBITS: usize = 1_000_000;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Basis {
    /// `+` basis: |0>, |1>.
    Rectilinear,
    /// `x` basis: |+>, |->.
    Diagonal,
}

impl Basis {
    pub fn random(rng: &mut RandomSource) -> Self {
        if rng.coin() {
            Self::Diagonal
        } else {
            Self::Rectilinear
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Self::Rectilinear => '+',
            Self::Diagonal => 'x',
        }
    }
}

/// A classical bit, serialized as the integer `0` or `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Bit {
    Zero,
    One,
}

impl Bit {
    pub fn random(rng: &mut RandomSource) -> Self {
        Self::from(rng.coin())
    }

    pub fn flipped(self) -> Self {
        match self {
            Self::Zero => Self::One,
            Self::One => Self::Zero,
        }
    }
}

impl From<bool> for Bit {
    fn from(b: bool) -> Self {
        if b {
            Self::One
        } else {
            Self::Zero
        }
    }
}

impl From<Bit> for u8 {
    fn from(b: Bit) -> u8 {
        match b {
            Bit::Zero => 0,
            Bit::One => 1,
        }
    }
}

impl TryFrom<u8> for Bit {
    type Error = QvoteError;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Self::Zero),
            1 => Ok(Self::One),
            other => Err(QvoteError::invalid("bit", format!("{other} is not 0 or 1"))),
        }
    }
}

/// A prepared qubit as the sender emitted it.  Never mutated after generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qubit {
    pub index: usize,
    pub basis: Basis,
    pub bit: Bit,
}

/// What the receiver saw for one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MeasurementOutcome {
    pub qubit_index: usize,
    pub sender_basis: Basis,
    pub receiver_basis: Basis,
    pub receiver_bit: Bit,
    pub matched: bool,
}

/// Everything the channel produced for one run.
///
/// The three vectors are index-aligned; construction goes through
/// [`generate`] so the alignment always holds.
#[derive(Debug, Clone, Serialize)]
pub struct Transmission {
    pub(crate) qubits: Vec<Qubit>,
    pub(crate) receiver_bases: Vec<Basis>,
    pub(crate) receiver_bits: Vec<Bit>,
    pub(crate) intercepted: usize,
}

impl Transmission {
    pub fn qubits(&self) -> &[Qubit] {
        &self.qubits
    }

    pub fn receiver_bases(&self) -> &[Basis] {
        &self.receiver_bases
    }

    pub fn len(&self) -> usize {
        self.qubits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.qubits.is_empty()
    }

    /// Number of qubits Eve intercepted (0 without an active adversary).
    pub fn intercepted(&self) -> usize {
        self.intercepted
    }

    /// Per-position outcomes, derived on demand.
    pub fn outcomes(&self) -> impl Iterator<Item = MeasurementOutcome> + Clone + '_ {
        self.qubits
            .iter()
            .zip(&self.receiver_bases)
            .zip(&self.receiver_bits)
            .map(|((q, &rb), &bit)| MeasurementOutcome {
                qubit_index: q.index,
                sender_basis: q.basis,
                receiver_basis: rb,
                receiver_bit: bit,
                matched: q.basis == rb,
            })
    }
}

// ---------------------------------------------------------------------------
// Channel simulation
// ---------------------------------------------------------------------------

/// Prepare `n` qubits, send them through the channel and measure them.
///
/// Draw order per position is fixed (sender basis, bit, receiver basis, Eve,
/// receiver measurement) so seeded runs are reproducible.
pub fn generate(n: usize, eve: &EveModel, rng: &mut RandomSource) -> Result<Transmission> {
    if n == 0 {
        return Err(QvoteError::invalid("qubit_count", "must be greater than zero"));
    }
    if n > MAX_QUBITS {
        return Err(QvoteError::invalid(
            "qubit_count",
            format!("{n} exceeds maximum of {MAX_QUBITS}"),
        ));
    }
    eve.validate()?;

    let p_intercept = eve.effective_intercept();
    let mut qubits = Vec::with_capacity(n);
    let mut receiver_bases = Vec::with_capacity(n);
    let mut receiver_bits = Vec::with_capacity(n);
    let mut intercepted = 0usize;

    for index in 0..n {
        let basis = Basis::random(rng);
        let bit = Bit::random(rng);
        let receiver_basis = Basis::random(rng);

        // Intercept-resend: a wrong-basis measurement by Eve leaves the
        // sender-basis value re-randomized.
        let mut arriving = bit;
        if p_intercept > 0.0 && rng.chance(p_intercept) {
            intercepted += 1;
            let eve_basis = Basis::random(rng);
            if eve_basis != basis && rng.coin() {
                arriving = arriving.flipped();
            }
        }

        let observed = if receiver_basis == basis {
            arriving
        } else {
            Bit::random(rng)
        };

        qubits.push(Qubit { index, basis, bit });
        receiver_bases.push(receiver_basis);
        receiver_bits.push(observed);
    }

    Ok(Transmission {
        qubits,
        receiver_bases,
        receiver_bits,
        intercepted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_qubits_rejected() {
        let mut rng = RandomSource::seeded(1);
        let err = generate(0, &EveModel::inactive(), &mut rng).unwrap_err();
        assert_eq!(err.field(), Some("qubit_count"));
    }

    #[test]
    fn too_many_qubits_rejected() {
        let mut rng = RandomSource::seeded(1);
        assert!(generate(MAX_QUBITS + 1, &EveModel::inactive(), &mut rng).is_err());
    }

    #[test]
    fn invalid_adversary_rejected() {
        let mut rng = RandomSource::seeded(1);
        let err = generate(8, &EveModel::attack(2.0, 0.5), &mut rng).unwrap_err();
        assert_eq!(err.field(), Some("eve.intercept_probability"));
    }

    #[test]
    fn indices_and_lengths_align() {
        let mut rng = RandomSource::seeded(3);
        let tx = generate(64, &EveModel::inactive(), &mut rng).unwrap();
        assert_eq!(tx.len(), 64);
        assert_eq!(tx.receiver_bases().len(), 64);
        for (i, q) in tx.qubits().iter().enumerate() {
            assert_eq!(q.index, i);
        }
        assert_eq!(tx.outcomes().count(), 64);
        assert_eq!(tx.intercepted(), 0);
    }

    #[test]
    fn matched_flag_tracks_bases() {
        let mut rng = RandomSource::seeded(5);
        let tx = generate(200, &EveModel::inactive(), &mut rng).unwrap();
        for o in tx.outcomes() {
            assert_eq!(o.matched, o.sender_basis == o.receiver_basis);
        }
    }

    #[test]
    fn noise_free_matched_bits_agree() {
        let mut rng = RandomSource::seeded(11);
        let tx = generate(500, &EveModel::inactive(), &mut rng).unwrap();
        for (q, o) in tx.qubits().iter().zip(tx.outcomes()) {
            if o.matched {
                assert_eq!(q.bit, o.receiver_bit);
            }
        }
    }

    #[test]
    fn full_intercept_touches_every_qubit() {
        let mut rng = RandomSource::seeded(13);
        let tx = generate(100, &EveModel::attack(1.0, 0.5), &mut rng).unwrap();
        assert_eq!(tx.intercepted(), 100);
    }

    #[test]
    fn seeded_generation_is_reproducible() {
        let a = generate(128, &EveModel::attack(0.5, 0.5), &mut RandomSource::seeded(9)).unwrap();
        let b = generate(128, &EveModel::attack(0.5, 0.5), &mut RandomSource::seeded(9)).unwrap();
        assert_eq!(a.qubits(), b.qubits());
        assert_eq!(a.receiver_bases(), b.receiver_bases());
        assert_eq!(a.intercepted(), b.intercepted());
    }

    #[test]
    fn bit_wire_format_is_integer() {
        let q = Qubit {
            index: 2,
            basis: Basis::Diagonal,
            bit: Bit::One,
        };
        let v = serde_json::to_value(q).unwrap();
        assert_eq!(v["basis"], "diagonal");
        assert_eq!(v["bit"], 1);

        let bad: std::result::Result<Qubit, _> =
            serde_json::from_str(r#"{"index":0,"basis":"rectilinear","bit":2}"#);
        assert!(bad.is_err());
        let bad: std::result::Result<Qubit, _> =
            serde_json::from_str(r#"{"index":0,"basis":"circular","bit":0}"#);
        assert!(bad.is_err());
    }
}
