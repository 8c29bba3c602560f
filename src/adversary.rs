//! Eavesdropper (Eve) parameter model.
//!
//! A single [`EveModel`] value is borrowed by both protocol halves of a run:
//! the BB84 channel reads `intercept_probability`, the E91 verifier reads the
//! derived [`EveModel::correlation_visibility`].  Passing the same value to
//! both keeps the adversary consistent within one `SimulationRun`.

use serde::{Deserialize, Serialize};

use crate::error::{QvoteError, Result};

pub const DEFAULT_INTERCEPT_PROBABILITY: f64 = 1.0;
pub const DEFAULT_DECOHERENCE_FACTOR: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EveModel {
    pub active: bool,
    /// Fraction of qubits / pairs Eve intercepts.
    pub intercept_probability: f64,
    /// How strongly an interception decoheres an entangled pair.
    pub decoherence_factor: f64,
}

impl Default for EveModel {
    fn default() -> Self {
        Self::inactive()
    }
}

impl EveModel {
    /// Noise-free channel.
    pub fn inactive() -> Self {
        Self {
            active: false,
            intercept_probability: DEFAULT_INTERCEPT_PROBABILITY,
            decoherence_factor: DEFAULT_DECOHERENCE_FACTOR,
        }
    }

    /// An active intercept-resend adversary.
    pub fn attack(intercept_probability: f64, decoherence_factor: f64) -> Self {
        Self {
            active: true,
            intercept_probability,
            decoherence_factor,
        }
    }

    /// Same parameters, toggled on or off.
    pub fn with_active(self, active: bool) -> Self {
        Self { active, ..self }
    }

    pub fn validate(&self) -> Result<()> {
        validate_probability("eve.intercept_probability", self.intercept_probability)?;
        validate_probability("eve.decoherence_factor", self.decoherence_factor)
    }

    /// Probability that Eve touches a given qubit; 0 when inactive.
    pub fn effective_intercept(&self) -> f64 {
        if self.active {
            self.intercept_probability
        } else {
            0.0
        }
    }

    /// Multiplier applied to every ideal CHSH correlation.
    ///
    /// `1.0` without Eve; otherwise `1 - p_intercept * decoherence`.
    pub fn correlation_visibility(&self) -> f64 {
        if self.active {
            (1.0 - self.intercept_probability * self.decoherence_factor).clamp(0.0, 1.0)
        } else {
            1.0
        }
    }

    /// Expected BB84 QBER contribution of an intercept-resend attack.
    pub fn expected_qber(&self) -> f64 {
        self.effective_intercept() * 0.25
    }
}

fn validate_probability(field: &str, p: f64) -> Result<()> {
    if !p.is_finite() || !(0.0..=1.0).contains(&p) {
        return Err(QvoteError::invalid(field, format!("{p} out of range [0, 1]")));
    }
    Ok(())
}
