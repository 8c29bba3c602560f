//! One BB84 + E91 simulation run.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::adversary::EveModel;
use crate::bb84;
use crate::channel::{self, MAX_QUBITS};
use crate::decision::{self, SecurityCheck};
use crate::e91::{self, Correlations, MAX_TRIALS};
use crate::error::{LowSample, QvoteError, Result};
use crate::rng::RandomSource;

pub const DEFAULT_QUBIT_COUNT: usize = 256;
pub const DEFAULT_CHSH_TRIALS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    pub qubit_count: usize,
    pub chsh_trials: usize,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            qubit_count: DEFAULT_QUBIT_COUNT,
            chsh_trials: DEFAULT_CHSH_TRIALS,
        }
    }
}

impl SimulationParams {
    /// Check both counts up front so a bad request never starts a run.
    pub fn validate(&self) -> Result<()> {
        if self.qubit_count == 0 || self.qubit_count > MAX_QUBITS {
            return Err(QvoteError::invalid(
                "qubit_count",
                format!("{} out of range [1, {MAX_QUBITS}]", self.qubit_count),
            ));
        }
        if self.chsh_trials == 0 || self.chsh_trials % 4 != 0 || self.chsh_trials > MAX_TRIALS {
            return Err(QvoteError::invalid(
                "trial_count",
                format!(
                    "{} must be a positive multiple of 4 no larger than {MAX_TRIALS}",
                    self.chsh_trials
                ),
            ));
        }
        Ok(())
    }
}

/// Result of one run.  Immutable once returned.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationRun {
    pub eve_enabled: bool,
    pub qber: f64,
    pub chsh_s: f64,
    /// One 0/1 mismatch indicator per sifted position.
    pub bb84_series: Vec<u8>,
    /// Running CHSH estimate per trial block.
    pub e91_series: Vec<f64>,
    pub qubit_count: usize,
    pub sifted_length: usize,
    pub mismatches: usize,
    pub intercepted: usize,
    pub correlations: Correlations,
    pub visibility: f64,
    pub security_check: SecurityCheck,
    pub warnings: Vec<LowSample>,
    pub seed: Option<u64>,
}

impl SimulationRun {
    /// Human-readable trace of the run, one line per step.
    pub fn trace(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(8 + self.warnings.len());
        lines.push(format!(
            "[channel] {} qubits sent, eve {}",
            self.qubit_count,
            if self.eve_enabled { "ACTIVE" } else { "absent" }
        ));
        if self.eve_enabled {
            lines.push(format!("[eve] intercepted {} qubits", self.intercepted));
        }
        lines.push(format!(
            "[bb84] sifted {} of {} positions, {} mismatches",
            self.sifted_length, self.qubit_count, self.mismatches
        ));
        lines.push(format!("[bb84] QBER = {:.4}", self.qber));
        lines.push(format!(
            "[e91] E(a,b)={:.4} E(a,b')={:.4} E(a',b)={:.4} E(a',b')={:.4}",
            self.correlations.e_ab,
            self.correlations.e_ab_prime,
            self.correlations.e_a_prime_b,
            self.correlations.e_a_prime_b_prime,
        ));
        lines.push(format!(
            "[e91] CHSH S = {:.4} (visibility {:.3})",
            self.chsh_s, self.visibility
        ));
        for w in &self.warnings {
            lines.push(format!("[warn] {w}"));
        }
        lines.push(format!(
            "[verdict] {} (qber_pass={}, chsh_pass={})",
            self.security_check.status, self.security_check.qber_pass, self.security_check.chsh_pass
        ));
        lines
    }
}

/// Run BB84 and E91 against the same adversary and randomness.
///
/// The BB84 half draws first; the E91 half continues on the same source.
pub fn run(params: &SimulationParams, eve: &EveModel, rng: &mut RandomSource) -> Result<SimulationRun> {
    params.validate()?;
    eve.validate()?;

    let tx = channel::generate(params.qubit_count, eve, rng)?;
    let recon = bb84::reconcile(&tx);
    let bb84_series: Vec<u8> = tx.mismatch_series().collect();

    let chsh = e91::verify_chsh(params.chsh_trials, eve, rng)?;

    let warnings: Vec<LowSample> = recon.warning.into_iter().chain(chsh.warning).collect();
    for w in &warnings {
        warn!(warning = %w, "low-sample simulation result");
    }

    let security_check = decision::assess(recon.qber, chsh.s);
    debug!(
        eve = eve.active,
        qber = recon.qber,
        chsh_s = chsh.s,
        status = %security_check.status,
        "simulation run complete"
    );

    Ok(SimulationRun {
        eve_enabled: eve.active,
        qber: recon.qber,
        chsh_s: chsh.s,
        bb84_series,
        e91_series: chsh.per_trial_series,
        qubit_count: tx.len(),
        sifted_length: recon.matched_count,
        mismatches: recon.mismatch_count,
        intercepted: tx.intercepted(),
        correlations: chsh.correlations,
        visibility: chsh.visibility,
        security_check,
        warnings,
        seed: rng.seed(),
    })
}
