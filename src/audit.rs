//! Append-only, hash-chained audit log of vote attempts.
//!
//! The only mutation is [`AuditLog::append`]; insertion order is the audit
//! order.  The SQLite backend additionally installs triggers that abort any
//! `UPDATE` or `DELETE`, and chains every entry to its predecessor so edits
//! made behind the API are detected by [`SqliteAuditLog::verify_integrity`].

use std::path::Path;
use std::sync::{Mutex, RwLock};

use rusqlite::{params, Connection, OptionalExtension as _, TransactionBehavior};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{QvoteError, Result, ResultExt as _};
use crate::util;
use crate::vote::VoteRecord;

pub const AUDIT_SCHEMA_VERSION: i64 = 1;

const GENESIS_HASH: [u8; 32] = [0u8; 32];

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditMeta {
    pub log_id: Uuid,
    pub created_at_utc: String,
    pub schema_version: i64,
}

/// Receipt for one appended record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: i64,
    pub record_hash_hex: String,
    pub prev_hash_hex: String,
    pub entry_hash_hex: String,
}

/// Append-only store of vote records.
///
/// Implementations serialize appends (single writer) and hand readers a
/// consistent, oldest-first prefix.  Records cannot be updated or removed.
pub trait AuditLog: Send + Sync {
    fn append(&self, record: &VoteRecord) -> Result<AuditEntry>;

    fn read_all(&self) -> Result<Vec<VoteRecord>>;

    fn len(&self) -> Result<usize> {
        Ok(self.read_all()?.len())
    }
}

fn record_hash(record: &VoteRecord) -> Result<[u8; 32]> {
    let json = serde_json::to_vec(record)
        .map_err(|e| QvoteError::Other(format!("serialize vote record: {e}")))?;
    Ok(util::sha256(&json))
}

fn chain_hash(prev_hash: &[u8], record_hash: &[u8; 32]) -> [u8; 32] {
    let mut preimage = Vec::with_capacity(prev_hash.len() + 32);
    preimage.extend_from_slice(prev_hash);
    preimage.extend_from_slice(record_hash);
    util::sha256(&preimage)
}

// ---------------------------------------------------------------------------
// SQLite backend
// ---------------------------------------------------------------------------

const SCHEMA: &str = r#"
    PRAGMA synchronous=FULL;

    CREATE TABLE IF NOT EXISTS meta(
      k TEXT PRIMARY KEY,
      v TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS votes(
      seq INTEGER PRIMARY KEY,
      ts_utc TEXT NOT NULL,
      vote_id TEXT NOT NULL UNIQUE,
      party_id TEXT NOT NULL,
      status TEXT NOT NULL CHECK(status IN ('SECURE','REJECTED')),
      qber REAL NOT NULL,
      chsh_s REAL NOT NULL,
      record_hash BLOB NOT NULL,
      prev_hash BLOB NOT NULL,
      entry_hash BLOB NOT NULL
    );

    CREATE TRIGGER IF NOT EXISTS votes_no_update BEFORE UPDATE ON votes
    BEGIN
      SELECT RAISE(ABORT, 'audit log is append-only');
    END;

    CREATE TRIGGER IF NOT EXISTS votes_no_delete BEFORE DELETE ON votes
    BEGIN
      SELECT RAISE(ABORT, 'audit log is append-only');
    END;
"#;

pub struct SqliteAuditLog {
    conn: Mutex<Connection>,
    meta: AuditMeta,
}

impl std::fmt::Debug for SqliteAuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteAuditLog")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// A stored row together with its chain material.
struct StoredVote {
    seq: i64,
    record: VoteRecord,
    record_hash: Vec<u8>,
    prev_hash: Vec<u8>,
    entry_hash: Vec<u8>,
}

impl SqliteAuditLog {
    /// Open the log at `db_path`, creating the database and schema on first use.
    pub fn open(db_path: &Path) -> Result<Self> {
        util::validate_path(db_path, "db")?;
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .ctx_store(&format!("create db parent dir {}", parent.display()))?;
        }

        let conn = Connection::open(db_path)
            .ctx_store(&format!("open db {}", db_path.display()))?;
        let _mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .ctx_store("enable WAL")?;
        conn.execute_batch(SCHEMA).ctx_store("create tables")?;

        conn.execute(
            "INSERT OR IGNORE INTO meta(k,v) VALUES (?1,?2)",
            params!["log_id", Uuid::new_v4().to_string()],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO meta(k,v) VALUES (?1,?2)",
            params!["created_at_utc", util::now_utc_rfc3339()],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO meta(k,v) VALUES (?1,?2)",
            params!["schema_version", AUDIT_SCHEMA_VERSION.to_string()],
        )?;

        let meta = read_meta(&conn)?;
        if meta.schema_version != AUDIT_SCHEMA_VERSION {
            return Err(QvoteError::StoreUnavailable(format!(
                "unsupported schema_version {} (expected {AUDIT_SCHEMA_VERSION})",
                meta.schema_version
            )));
        }

        info!(log_id = %meta.log_id, path = %db_path.display(), "audit log opened");
        Ok(Self {
            conn: Mutex::new(conn),
            meta,
        })
    }

    pub fn meta(&self) -> &AuditMeta {
        &self.meta
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| QvoteError::StoreUnavailable("audit log mutex poisoned".into()))
    }

    fn stored_votes(conn: &Connection) -> Result<Vec<StoredVote>> {
        let mut stmt = conn
            .prepare(
                r#"
                SELECT seq, ts_utc, vote_id, party_id, status, qber, chsh_s,
                       record_hash, prev_hash, entry_hash
                FROM votes
                ORDER BY seq ASC
                "#,
            )
            .ctx_store("prepare select votes")?;

        let mut rows = stmt.query([]).ctx_store("query votes")?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().ctx_store("next row")? {
            let status: String = row.get(4)?;
            out.push(StoredVote {
                seq: row.get(0)?,
                record: VoteRecord {
                    timestamp: row.get(1)?,
                    vote_id: row.get(2)?,
                    party_id: row.get(3)?,
                    status: status.parse().ctx_store("parse stored status")?,
                    qber: row.get(5)?,
                    chsh_s: row.get(6)?,
                },
                record_hash: row.get(7)?,
                prev_hash: row.get(8)?,
                entry_hash: row.get(9)?,
            });
        }
        Ok(out)
    }

    /// Re-derive every record hash and the chain linking them.
    pub fn verify_integrity(&self) -> Result<usize> {
        let conn = self.lock()?;
        let stored = Self::stored_votes(&conn)?;
        let mut prev_hash = GENESIS_HASH.to_vec();
        for v in &stored {
            let rh = record_hash(&v.record)?;
            if rh.as_slice() != v.record_hash.as_slice() {
                return Err(QvoteError::StoreUnavailable(format!(
                    "record_hash mismatch at seq {}",
                    v.seq
                )));
            }
            if prev_hash != v.prev_hash {
                return Err(QvoteError::StoreUnavailable(format!(
                    "prev_hash mismatch at seq {}",
                    v.seq
                )));
            }
            let eh = chain_hash(&prev_hash, &rh);
            if eh.as_slice() != v.entry_hash.as_slice() {
                return Err(QvoteError::StoreUnavailable(format!(
                    "entry_hash mismatch at seq {}",
                    v.seq
                )));
            }
            prev_hash = eh.to_vec();
        }
        Ok(stored.len())
    }
}

impl AuditLog for SqliteAuditLog {
    fn append(&self, record: &VoteRecord) -> Result<AuditEntry> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .ctx_store("begin tx")?;

        let (last_seq, prev_hash): (i64, Vec<u8>) = tx
            .query_row(
                "SELECT seq, entry_hash FROM votes ORDER BY seq DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .unwrap_or((0, GENESIS_HASH.to_vec()));

        let seq = last_seq + 1;
        let rh = record_hash(record)?;
        let eh = chain_hash(&prev_hash, &rh);

        tx.execute(
            r#"
            INSERT INTO votes(
              seq, ts_utc, vote_id, party_id, status, qber, chsh_s,
              record_hash, prev_hash, entry_hash
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
            "#,
            params![
                seq,
                record.timestamp,
                record.vote_id,
                record.party_id,
                record.status.as_str(),
                record.qber,
                record.chsh_s,
                rh.to_vec(),
                prev_hash,
                eh.to_vec(),
            ],
        )
        .ctx_store("insert vote record")?;

        tx.commit().ctx_store("commit tx")?;

        info!(seq, vote_id = %record.vote_id, status = %record.status, "vote appended to audit log");
        Ok(AuditEntry {
            seq,
            record_hash_hex: hex::encode(rh),
            prev_hash_hex: hex::encode(&prev_hash),
            entry_hash_hex: hex::encode(eh),
        })
    }

    fn read_all(&self) -> Result<Vec<VoteRecord>> {
        let conn = self.lock()?;
        Ok(Self::stored_votes(&conn)?
            .into_iter()
            .map(|v| v.record)
            .collect())
    }

    fn len(&self) -> Result<usize> {
        let conn = self.lock()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM votes", [], |row| row.get(0))
            .ctx_store("count votes")?;
        Ok(n as usize)
    }
}

fn read_meta(conn: &Connection) -> Result<AuditMeta> {
    let log_id: String = conn
        .query_row("SELECT v FROM meta WHERE k='log_id'", [], |row| row.get(0))
        .ctx_store("read log_id")?;
    let created_at_utc: String = conn
        .query_row("SELECT v FROM meta WHERE k='created_at_utc'", [], |row| row.get(0))
        .ctx_store("read created_at_utc")?;
    let schema_version: i64 = conn
        .query_row("SELECT v FROM meta WHERE k='schema_version'", [], |row| row.get::<_, String>(0))
        .ctx_store("read schema_version")?
        .parse()
        .ctx_store("parse schema_version")?;
    Ok(AuditMeta {
        log_id: Uuid::parse_str(&log_id).ctx_store("parse log_id uuid")?,
        created_at_utc,
        schema_version,
    })
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Volatile log for tests and `serve --in-memory`.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: RwLock<Vec<(VoteRecord, [u8; 32])>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&self, record: &VoteRecord) -> Result<AuditEntry> {
        let rh = record_hash(record)?;
        let mut entries = self
            .entries
            .write()
            .map_err(|_| QvoteError::StoreUnavailable("audit log lock poisoned".into()))?;
        let prev_hash = entries.last().map(|(_, h)| *h).unwrap_or(GENESIS_HASH);
        let eh = chain_hash(&prev_hash, &rh);
        entries.push((record.clone(), eh));
        Ok(AuditEntry {
            seq: entries.len() as i64,
            record_hash_hex: hex::encode(rh),
            prev_hash_hex: hex::encode(prev_hash),
            entry_hash_hex: hex::encode(eh),
        })
    }

    fn read_all(&self) -> Result<Vec<VoteRecord>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| QvoteError::StoreUnavailable("audit log lock poisoned".into()))?;
        Ok(entries.iter().map(|(r, _)| r.clone()).collect())
    }
}

// ---------------------------------------------------------------------------
// Backup
// ---------------------------------------------------------------------------

/// Export every record, oldest first, to a JSON file.
pub fn export_json(log: &dyn AuditLog, out_path: &Path) -> Result<usize> {
    let records = log.read_all()?;
    let export = serde_json::json!({
        "format": "qvote-audit-export-v1",
        "exported_at_utc": util::now_utc_rfc3339(),
        "records": records,
    });
    let json = serde_json::to_vec_pretty(&export)
        .map_err(|e| QvoteError::Other(format!("serialize audit export: {e}")))?;
    std::fs::write(out_path, json)
        .ctx_store(&format!("write export {}", out_path.display()))?;
    info!(path = %out_path.display(), records = records.len(), "audit log exported");
    Ok(records.len())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
