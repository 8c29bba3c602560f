//! E91 entanglement test: simulated paired measurements and the CHSH
//! Bell-inequality statistic.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use serde::{Deserialize, Serialize};

use crate::adversary::EveModel;
use crate::error::{LowSample, QvoteError, Result};
use crate::rng::RandomSource;

/// Upper bound on trials per run.
pub const MAX_TRIALS: usize = 4_000_000;

/// Below this many trials per setting group the S estimate is flagged.
pub const MIN_TRIALS_PER_GROUP: usize = 25;

/// Tsirelson bound, the quantum maximum of S.
pub const QUANTUM_MAX_S: f64 = 2.0 * std::f64::consts::SQRT_2;

// ---------------------------------------------------------------------------
// Analyzer settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingA {
    A,
    APrime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingB {
    B,
    BPrime,
}

impl SettingA {
    pub fn angle(self) -> f64 {
        match self {
            Self::A => 0.0,
            Self::APrime => FRAC_PI_2,
        }
    }
}

impl SettingB {
    pub fn angle(self) -> f64 {
        match self {
            Self::B => FRAC_PI_4,
            Self::BPrime => -FRAC_PI_4,
        }
    }
}

/// The four setting combinations in CHSH order.
pub const SETTING_GROUPS: [(SettingA, SettingB); 4] = [
    (SettingA::A, SettingB::B),
    (SettingA::A, SettingB::BPrime),
    (SettingA::APrime, SettingB::B),
    (SettingA::APrime, SettingB::BPrime),
];

/// Singlet-state correlation for analyzer angles `a` and `b`.
pub fn ideal_correlation(a: f64, b: f64) -> f64 {
    -(a - b).cos()
}

// ---------------------------------------------------------------------------
// Trials and counts
// ---------------------------------------------------------------------------

/// Measurement result of one detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "+1")]
    Plus,
    #[serde(rename = "-1")]
    Minus,
}

impl Outcome {
    pub fn value(self) -> i8 {
        match self {
            Self::Plus => 1,
            Self::Minus => -1,
        }
    }

    fn negated(self) -> Self {
        match self {
            Self::Plus => Self::Minus,
            Self::Minus => Self::Plus,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntanglementTrial {
    pub setting_a: SettingA,
    pub setting_b: SettingB,
    pub outcome_a: Outcome,
    pub outcome_b: Outcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoincidenceCounts {
    pub pp: u64,
    pub pm: u64,
    pub mp: u64,
    pub mm: u64,
}

impl CoincidenceCounts {
    pub fn total(&self) -> u64 {
        self.pp + self.pm + self.mp + self.mm
    }

    pub fn record(&mut self, a: Outcome, b: Outcome) {
        match (a, b) {
            (Outcome::Plus, Outcome::Plus) => self.pp += 1,
            (Outcome::Plus, Outcome::Minus) => self.pm += 1,
            (Outcome::Minus, Outcome::Plus) => self.mp += 1,
            (Outcome::Minus, Outcome::Minus) => self.mm += 1,
        }
    }

    /// Expectation value E = <ab> for outcomes in {+1,-1}; 0 with no counts.
    pub fn expectation(&self) -> f64 {
        let n = self.total();
        if n == 0 {
            return 0.0;
        }
        let num = (self.pp as i128 + self.mm as i128) - (self.pm as i128 + self.mp as i128);
        (num as f64) / (n as f64)
    }
}

// ---------------------------------------------------------------------------
// CHSH
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Correlations {
    pub e_ab: f64,
    pub e_ab_prime: f64,
    pub e_a_prime_b: f64,
    pub e_a_prime_b_prime: f64,
}

impl Correlations {
    fn from_counts(counts: &[CoincidenceCounts; 4]) -> Self {
        Self {
            e_ab: counts[0].expectation(),
            e_ab_prime: counts[1].expectation(),
            e_a_prime_b: counts[2].expectation(),
            e_a_prime_b_prime: counts[3].expectation(),
        }
    }

    /// `S = |E(a,b) + E(a,b') + E(a',b) - E(a',b')|`
    pub fn chsh(&self) -> f64 {
        (self.e_ab + self.e_ab_prime + self.e_a_prime_b - self.e_a_prime_b_prime).abs()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChshOutcome {
    pub s: f64,
    pub correlations: Correlations,
    pub counts: [CoincidenceCounts; 4],
    pub trials_per_group: usize,
    /// Running S estimate after each block of four trials.
    pub per_trial_series: Vec<f64>,
    /// Correlation multiplier applied by the adversary (1.0 without Eve).
    pub visibility: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<LowSample>,
}

impl ChshOutcome {
    /// Whether S exceeds the classical bound of 2.
    pub fn violates_bell(&self) -> bool {
        self.s > crate::decision::CHSH_CLASSICAL_BOUND
    }
}

/// Draw one entangled-pair measurement for the given settings.
///
/// A is uniform; B agrees with A with probability `(1 + v*E) / 2`, so the
/// empirical `<ab>` converges to `v * E(θa, θb)`.
pub fn measure_pair(
    setting_a: SettingA,
    setting_b: SettingB,
    visibility: f64,
    rng: &mut RandomSource,
) -> EntanglementTrial {
    let e = visibility * ideal_correlation(setting_a.angle(), setting_b.angle());
    let outcome_a = if rng.coin() { Outcome::Plus } else { Outcome::Minus };
    let outcome_b = if rng.chance((1.0 + e) / 2.0) {
        outcome_a
    } else {
        outcome_a.negated()
    };
    EntanglementTrial {
        setting_a,
        setting_b,
        outcome_a,
        outcome_b,
    }
}

/// Run `trial_count` paired measurements split evenly across the four
/// setting groups and compute the CHSH statistic.
pub fn verify_chsh(trial_count: usize, eve: &EveModel, rng: &mut RandomSource) -> Result<ChshOutcome> {
    if trial_count == 0 || trial_count % SETTING_GROUPS.len() != 0 {
        return Err(QvoteError::invalid(
            "trial_count",
            format!("{trial_count} does not split into four non-empty setting groups"),
        ));
    }
    if trial_count > MAX_TRIALS {
        return Err(QvoteError::invalid(
            "trial_count",
            format!("{trial_count} exceeds maximum of {MAX_TRIALS}"),
        ));
    }
    eve.validate()?;

    let visibility = eve.correlation_visibility();
    let trials_per_group = trial_count / SETTING_GROUPS.len();
    let mut counts = [CoincidenceCounts::default(); 4];
    let mut per_trial_series = Vec::with_capacity(trials_per_group);

    for _ in 0..trials_per_group {
        for (g, &(sa, sb)) in SETTING_GROUPS.iter().enumerate() {
            let trial = measure_pair(sa, sb, visibility, rng);
            counts[g].record(trial.outcome_a, trial.outcome_b);
        }
        per_trial_series.push(Correlations::from_counts(&counts).chsh());
    }

    let correlations = Correlations::from_counts(&counts);
    let warning = (trials_per_group < MIN_TRIALS_PER_GROUP).then_some(LowSample::SparseChshGroups {
        per_group: trials_per_group,
        minimum: MIN_TRIALS_PER_GROUP,
    });

    Ok(ChshOutcome {
        s: correlations.chsh(),
        correlations,
        counts,
        trials_per_group,
        per_trial_series,
        visibility,
        warning,
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
