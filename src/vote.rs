//! Vote casting: simulate the channel, decide, record.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::adversary::EveModel;
use crate::audit::{AuditEntry, AuditLog};
use crate::decision::VoteStatus;
use crate::error::{QvoteError, Result};
use crate::rng::RandomSource;
use crate::simulation::{self, SimulationParams, SimulationRun};
use crate::util;

/// One vote attempt as stored in the audit log.
///
/// Carries the declared party and an opaque token; never voter identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub vote_id: String,
    pub party_id: String,
    pub timestamp: String,
    pub status: VoteStatus,
    pub qber: f64,
    pub chsh_s: f64,
}

/// Opaque content hash identifying a vote attempt.
pub fn vote_token(party_id: &str, timestamp: &str, qber: f64, chsh_s: f64, nonce: u64) -> String {
    let preimage = format!("{party_id}|{timestamp}|{qber:e}|{chsh_s:e}|{nonce:016x}");
    format!("0x{}", util::sha256_hex(preimage.as_bytes()))
}

#[derive(Debug)]
pub struct CastVoteOutcome {
    pub record: VoteRecord,
    pub run: SimulationRun,
    /// The append result.  A store failure does not discard the verdict.
    pub audit: std::result::Result<AuditEntry, QvoteError>,
}

impl CastVoteOutcome {
    pub fn is_recorded(&self) -> bool {
        self.audit.is_ok()
    }
}

/// Run one simulation for `party_id`, decide, and append the record.
///
/// Input validation failures return `Err` before any simulation work.  An
/// audit append failure is reported in [`CastVoteOutcome::audit`] alongside
/// the computed result.
pub fn cast_vote(
    log: &dyn AuditLog,
    party_id: &str,
    eve: &EveModel,
    params: &SimulationParams,
    rng: &mut RandomSource,
) -> Result<CastVoteOutcome> {
    let party_id = party_id.trim();
    util::validate_party_id(party_id)?;

    let run = simulation::run(params, eve, rng)?;
    let timestamp = util::now_utc_rfc3339();
    let nonce = rng.next_u64();
    let record = VoteRecord {
        vote_id: vote_token(party_id, &timestamp, run.qber, run.chsh_s, nonce),
        party_id: party_id.to_string(),
        timestamp,
        status: run.security_check.status,
        qber: run.qber,
        chsh_s: run.chsh_s,
    };

    let audit = log.append(&record);
    match &audit {
        Ok(entry) => info!(
            seq = entry.seq,
            status = %record.status,
            qber = record.qber,
            chsh_s = record.chsh_s,
            "vote cast"
        ),
        Err(e) => warn!(vote_id = %record.vote_id, error = %e, "vote computed but audit append failed"),
    }

    Ok(CastVoteOutcome { record, run, audit })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditLog;

    struct BrokenLog;

    impl AuditLog for BrokenLog {
        fn append(&self, _record: &VoteRecord) -> Result<AuditEntry> {
            Err(QvoteError::StoreUnavailable("disk unplugged".into()))
        }
        fn read_all(&self) -> Result<Vec<VoteRecord>> {
            Err(QvoteError::StoreUnavailable("disk unplugged".into()))
        }
    }

    #[test]
    fn token_is_hex_hash() {
        let t = vote_token("PARTY_A", "2025-01-01T00:00:00Z", 0.0, 2.8, 1);
        assert!(t.starts_with("0x"));
        assert_eq!(t.len(), 66);
        assert_ne!(t, vote_token("PARTY_A", "2025-01-01T00:00:00Z", 0.0, 2.8, 2));
    }

    #[test]
    fn secure_vote_is_recorded() {
        let log = MemoryAuditLog::new();
        let mut rng = RandomSource::seeded(10);
        let out = cast_vote(
            &log,
            "PARTY_A",
            &EveModel::inactive(),
            &SimulationParams::default(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(out.record.status, VoteStatus::Secure);
        assert!(out.is_recorded());
        assert_eq!(log.read_all().unwrap(), vec![out.record.clone()]);
        assert_eq!(out.record.qber, out.run.qber);
    }

    #[test]
    fn invalid_party_rejected_before_append() {
        let log = MemoryAuditLog::new();
        let mut rng = RandomSource::seeded(10);
        let err = cast_vote(&log, "", &EveModel::inactive(), &SimulationParams::default(), &mut rng)
            .unwrap_err();
        assert_eq!(err.field(), Some("party_id"));
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn store_failure_keeps_result() {
        let mut rng = RandomSource::seeded(10);
        let out = cast_vote(
            &BrokenLog,
            "PARTY_B",
            &EveModel::attack(1.0, 0.5),
            &SimulationParams::default(),
            &mut rng,
        )
        .unwrap();
        assert!(!out.is_recorded());
        assert_eq!(out.record.status, VoteStatus::Rejected);
        let err = out.audit.unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn record_has_no_identity_fields() {
        let log = MemoryAuditLog::new();
        let mut rng = RandomSource::seeded(11);
        cast_vote(&log, "PARTY_C", &EveModel::inactive(), &SimulationParams::default(), &mut rng)
            .unwrap();
        let v = serde_json::to_value(&log.read_all().unwrap()[0]).unwrap();
        let mut keys: Vec<&str> = v.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["chsh_s", "party_id", "qber", "status", "timestamp", "vote_id"]);
    }
}
