use anyhow::Result;
use tempfile::tempdir;

use qvote_core::{
    adversary::EveModel,
    audit::{AuditLog, MemoryAuditLog, SqliteAuditLog},
    channel, e91,
    error::{LowSample, QvoteError},
    rng::RandomSource,
    simulation::{self, SimulationParams},
    vote,
};

#[test]
fn corrupt_db_rejected() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("corrupt.db");
    std::fs::write(&db_path, b"not-a-sqlite-db, definitely not a sqlite database file")?;

    let err = SqliteAuditLog::open(&db_path).unwrap_err();
    assert!(err.is_retryable(), "{err}");
    Ok(())
}

#[test]
fn zero_qubits_rejected() {
    let mut rng = RandomSource::seeded(1);
    let err = channel::generate(0, &EveModel::inactive(), &mut rng).unwrap_err();
    assert_eq!(err.field(), Some("qubit_count"));
}

#[test]
fn bad_trial_counts_rejected() {
    let mut rng = RandomSource::seeded(1);
    for n in [0, 3, 1001, e91::MAX_TRIALS + 4] {
        let err = e91::verify_chsh(n, &EveModel::inactive(), &mut rng).unwrap_err();
        assert_eq!(err.field(), Some("trial_count"), "n = {n}");
    }
}

#[test]
fn out_of_range_adversary_rejected() {
    let mut rng = RandomSource::seeded(1);
    let params = SimulationParams::default();
    let err = simulation::run(&params, &EveModel::attack(1.5, 0.5), &mut rng).unwrap_err();
    assert_eq!(err.field(), Some("eve.intercept_probability"));
    let err = simulation::run(&params, &EveModel::attack(0.5, f64::NAN), &mut rng).unwrap_err();
    assert_eq!(err.field(), Some("eve.decoherence_factor"));
}

#[test]
fn bad_party_ids_rejected() {
    let log = MemoryAuditLog::new();
    let params = SimulationParams::default();
    let mut rng = RandomSource::seeded(1);
    for party in ["", "   ", "-leading-dash", "has space", &"X".repeat(65)] {
        let err = vote::cast_vote(&log, party, &EveModel::inactive(), &params, &mut rng).unwrap_err();
        assert!(matches!(err, QvoteError::InvalidParameter { .. }), "{party:?}");
    }
    assert!(log.read_all().map(|r| r.is_empty()).unwrap_or(false));
}

#[test]
fn tiny_runs_carry_low_sample_warnings() -> Result<()> {
    let params = SimulationParams {
        qubit_count: 1,
        chsh_trials: 4,
    };
    let mut rng = RandomSource::seeded(3);
    let run = simulation::run(&params, &EveModel::inactive(), &mut rng)?;
    assert!(run
        .warnings
        .iter()
        .any(|w| matches!(w, LowSample::SparseChshGroups { .. })));
    assert!(run.trace().iter().any(|l| l.starts_with("[warn]")));
    Ok(())
}
