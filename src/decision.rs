//! Vote-channel security policy.
//!
//! A pure function of `(qber, chsh_s)`; every caller (vote casting and the
//! standalone simulation endpoint) goes through [`decide`].

use serde::{Deserialize, Serialize};

/// BB84 security bound on the quantum bit error rate.
pub const QBER_THRESHOLD: f64 = 0.11;

/// Local-hidden-variable bound on the CHSH statistic.
pub const CHSH_CLASSICAL_BOUND: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteStatus {
    Secure,
    Rejected,
}

impl VoteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Secure => "SECURE",
            Self::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for VoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VoteStatus {
    type Err = crate::error::QvoteError;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s {
            "SECURE" => Ok(Self::Secure),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(crate::error::QvoteError::invalid(
                "status",
                format!("unknown vote status '{other}'"),
            )),
        }
    }
}

/// Per-criterion breakdown of a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SecurityCheck {
    pub qber_pass: bool,
    pub chsh_pass: bool,
    pub status: VoteStatus,
}

/// SECURE iff `qber < 0.11` and `chsh_s > 2.0`.  NaN inputs fail both tests.
pub fn decide(qber: f64, chsh_s: f64) -> VoteStatus {
    assess(qber, chsh_s).status
}

pub fn assess(qber: f64, chsh_s: f64) -> SecurityCheck {
    let qber_pass = qber < QBER_THRESHOLD;
    let chsh_pass = chsh_s > CHSH_CLASSICAL_BOUND;
    let status = if qber_pass && chsh_pass {
        VoteStatus::Secure
    } else {
        VoteStatus::Rejected
    };
    SecurityCheck {
        qber_pass,
        chsh_pass,
        status,
    }
}
