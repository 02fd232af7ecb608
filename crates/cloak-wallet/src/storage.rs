//! Durable string-keyed byte-buffer storage.
//!
//! The vault, directory, and transaction log all persist through a
//! [`KvStore`]. Every logical operation is issued as one [`WriteBatch`],
//! which backends apply atomically.
//!
//! Two backends:
//! - [`MemoryStore`]: in-process map, for tests and ephemeral sessions.
//! - [`SqliteStore`]: WAL-mode SQLite file, optionally sealing every value
//!   with AES-256-GCM under a passphrase-derived key.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use zeroize::Zeroize;

use crate::config::KdfParams;
use crate::encryption::{self, ValueSealer};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("wrong passphrase for encrypted store")]
    WrongPassphrase,

    #[error("store is encrypted, a passphrase is required")]
    PassphraseRequired,

    #[error("store already holds unencrypted entries")]
    PlaintextStore,

    #[error("sealed value at {key} could not be opened: {reason}")]
    Unseal { key: String, reason: String },

    #[error("value sealing failed: {0}")]
    Seal(String),

    #[error("key derivation failed: {0}")]
    Kdf(String),

    #[error("store lock poisoned")]
    Poisoned,
}

// ─── Write Batches ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

/// Ordered set of writes committed as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<StoreOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) -> &mut Self {
        self.ops.push(StoreOp::Put {
            key: key.into(),
            value,
        });
        self
    }

    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.ops.push(StoreOp::Delete { key: key.into() });
        self
    }

    pub fn ops(&self) -> &[StoreOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

// ─── Store Trait ────────────────────────────────────────────────────────────

pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// All keys starting with `prefix`, in ascending order.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Apply every op in `batch`, or none of them.
    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.keys_with_prefix("")
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.commit(batch)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.commit(batch)
    }
}

// ─── MemoryStore ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        let map = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(map.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let map = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(map.get(key).cloned())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let map = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(map
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut map = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        for op in batch.ops {
            match op {
                StoreOp::Put { key, value } => {
                    map.insert(key, value);
                }
                StoreOp::Delete { key } => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }
}

// ─── SqliteStore ────────────────────────────────────────────────────────────

const SCHEMA_DDL: &str = "
CREATE TABLE IF NOT EXISTS entries (
  key        TEXT PRIMARY KEY,
  value      BLOB NOT NULL,
  updated_at INTEGER
);

CREATE TABLE IF NOT EXISTS meta (
  key   TEXT PRIMARY KEY,
  value BLOB NOT NULL
);
";

const META_KDF_SALT: &str = "kdf_salt";
const META_KDF_PARAMS: &str = "kdf_params";
const META_KEY_CHECK: &str = "key_check";
const KEY_CHECK_PLAINTEXT: &[u8] = b"cloak-store-v1";

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
    sealer: Option<ValueSealer>,
}

impl SqliteStore {
    /// Open (or create) a store file.
    ///
    /// With a passphrase, every value is sealed; the first open of an empty
    /// file fixes the KDF salt and costs (`kdf`). Later opens must use the
    /// same passphrase and derive with the recorded costs.
    pub fn open(
        path: impl AsRef<Path>,
        passphrase: Option<&[u8]>,
        kdf: &KdfParams,
    ) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::init(conn, passphrase, kdf)
    }

    pub fn open_in_memory(passphrase: Option<&[u8]>, kdf: &KdfParams) -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, passphrase, kdf)
    }

    pub fn is_encrypted(&self) -> bool {
        self.sealer.is_some()
    }

    fn init(conn: Connection, passphrase: Option<&[u8]>, kdf: &KdfParams) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_DDL)?;

        let salt = Self::meta(&conn, META_KDF_SALT)?;

        let sealer = match (passphrase, salt) {
            (None, None) => None,
            (None, Some(_)) => return Err(StoreError::PassphraseRequired),
            (Some(pass), Some(salt)) => {
                let recorded = match Self::meta(&conn, META_KDF_PARAMS)? {
                    Some(bytes) => KdfParams::from_bytes(&bytes)
                        .ok_or_else(|| StoreError::Kdf("invalid recorded key derivation costs".into()))?,
                    None => *kdf,
                };
                let sealer = Self::derive_sealer(pass, &salt, &recorded)?;
                let check = Self::meta(&conn, META_KEY_CHECK)?.ok_or(StoreError::WrongPassphrase)?;
                match sealer.open(META_KEY_CHECK.as_bytes(), &check) {
                    Ok(plain) if plain == KEY_CHECK_PLAINTEXT => {}
                    _ => return Err(StoreError::WrongPassphrase),
                }
                Some(sealer)
            }
            (Some(pass), None) => {
                let existing: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |r| r.get(0))?;
                if existing > 0 {
                    return Err(StoreError::PlaintextStore);
                }
                let mut salt = [0u8; 32];
                rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut salt);
                let sealer = Self::derive_sealer(pass, &salt, kdf)?;
                let check = sealer
                    .seal(META_KEY_CHECK.as_bytes(), KEY_CHECK_PLAINTEXT)
                    .map_err(StoreError::Seal)?;
                conn.execute(
                    "INSERT INTO meta (key, value) VALUES (?1, ?2), (?3, ?4), (?5, ?6)",
                    params![
                        META_KDF_SALT,
                        salt.to_vec(),
                        META_KDF_PARAMS,
                        kdf.to_bytes().to_vec(),
                        META_KEY_CHECK,
                        check
                    ],
                )?;
                log::info!("initialized encrypted store");
                Some(sealer)
            }
        };

        Ok(Self {
            conn: Mutex::new(conn),
            sealer,
        })
    }

    fn meta(conn: &Connection, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(conn
            .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |r| r.get(0))
            .optional()?)
    }

    fn derive_sealer(passphrase: &[u8], salt: &[u8], kdf: &KdfParams) -> Result<ValueSealer, StoreError> {
        let mut key = encryption::derive_key(passphrase, salt, kdf).map_err(|e| StoreError::Kdf(e.to_string()))?;
        let sealer = ValueSealer::new(&key);
        key.zeroize();
        Ok(sealer)
    }

    fn seal(&self, key: &str, value: Vec<u8>) -> Result<Vec<u8>, StoreError> {
        match &self.sealer {
            Some(sealer) => sealer.seal(key.as_bytes(), &value).map_err(StoreError::Seal),
            None => Ok(value),
        }
    }

    fn unseal(&self, key: &str, value: Vec<u8>) -> Result<Vec<u8>, StoreError> {
        match &self.sealer {
            Some(sealer) => sealer.open(key.as_bytes(), &value).map_err(|reason| StoreError::Unseal {
                key: key.to_string(),
                reason,
            }),
            None => Ok(value),
        }
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let value: Option<Vec<u8>> = conn
            .query_row("SELECT value FROM entries WHERE key = ?1", params![key], |r| r.get(0))
            .optional()?;
        drop(conn);
        value.map(|v| self.unseal(key, v)).transpose()
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT key FROM entries WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )?;
        let rows = stmt.query_map(params![prefix], |r| r.get::<_, String>(0))?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut sealed = Vec::with_capacity(batch.len());
        for op in batch.ops {
            sealed.push(match op {
                StoreOp::Put { key, value } => {
                    let value = self.seal(&key, value)?;
                    StoreOp::Put { key, value }
                }
                op @ StoreOp::Delete { .. } => op,
            });
        }

        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = conn.transaction()?;
        let now = now_millis();
        for op in &sealed {
            match op {
                StoreOp::Put { key, value } => {
                    tx.execute(
                        "INSERT OR REPLACE INTO entries (key, value, updated_at) VALUES (?1, ?2, ?3)",
                        params![key, value, now],
                    )?;
                }
                StoreOp::Delete { key } => {
                    tx.execute("DELETE FROM entries WHERE key = ?1", params![key])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> KdfParams {
        KdfParams::insecure_fast()
    }

    fn exercise(store: &dyn KvStore) {
        assert_eq!(store.get("missing").unwrap(), None);

        let mut batch = WriteBatch::new();
        batch.put("0xaa-nsk_m", vec![1, 2, 3]).put("0xaa-npk_m", vec![4]).put("0xbb-nsk_m", vec![5]);
        store.commit(batch).unwrap();

        assert_eq!(store.get("0xaa-nsk_m").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(
            store.keys_with_prefix("0xaa-").unwrap(),
            vec!["0xaa-npk_m".to_string(), "0xaa-nsk_m".to_string()]
        );
        assert_eq!(store.keys().unwrap().len(), 3);

        store.set("0xaa-npk_m", vec![9, 9]).unwrap();
        assert_eq!(store.get("0xaa-npk_m").unwrap(), Some(vec![9, 9]));

        store.delete("0xaa-npk_m").unwrap();
        store.delete("0xaa-npk_m").unwrap();
        assert_eq!(store.get("0xaa-npk_m").unwrap(), None);
        assert_eq!(store.keys_with_prefix("0xaa-").unwrap(), vec!["0xaa-nsk_m".to_string()]);
    }

    #[test]
    fn test_memory_store_ops() {
        let store = MemoryStore::new();
        exercise(&store);
        assert_eq!(store.len().unwrap(), 2);
        assert!(!store.is_empty().unwrap());
    }

    #[test]
    fn test_memory_store_reports_poisoned_lock() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let poisoner = std::sync::Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.entries.lock().unwrap();
            panic!("poison the store lock");
        })
        .join();

        assert!(matches!(store.len(), Err(StoreError::Poisoned)));
        assert!(matches!(store.is_empty(), Err(StoreError::Poisoned)));
        assert!(matches!(store.get("k"), Err(StoreError::Poisoned)));
    }

    #[test]
    fn test_sqlite_store_ops() {
        let store = SqliteStore::open_in_memory(None, &fast()).unwrap();
        assert!(!store.is_encrypted());
        exercise(&store);
    }

    #[test]
    fn test_sqlite_encrypted_store_ops() {
        let store = SqliteStore::open_in_memory(Some(&b"hunter2"[..]), &fast()).unwrap();
        assert!(store.is_encrypted());
        exercise(&store);
    }

    #[test]
    fn test_prefix_with_like_wildcards() {
        let store = SqliteStore::open_in_memory(None, &fast()).unwrap();
        store.set("a%b", vec![1]).unwrap();
        store.set("axb", vec![2]).unwrap();
        assert_eq!(store.keys_with_prefix("a%").unwrap(), vec!["a%b".to_string()]);
    }

    #[test]
    fn test_encrypted_store_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.db");
        {
            let store = SqliteStore::open(&path, Some(&b"correct"[..]), &fast()).unwrap();
            store.set("k", b"secret value".to_vec()).unwrap();
        }

        let store = SqliteStore::open(&path, Some(&b"correct"[..]), &fast()).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"secret value".to_vec()));

        assert!(matches!(
            SqliteStore::open(&path, Some(&b"wrong"[..]), &fast()),
            Err(StoreError::WrongPassphrase)
        ));
        assert!(matches!(
            SqliteStore::open(&path, None, &fast()),
            Err(StoreError::PassphraseRequired)
        ));
    }

    #[test]
    fn test_encrypted_store_reopens_with_recorded_costs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.db");
        {
            let store = SqliteStore::open(&path, Some(&b"pw"[..]), &fast()).unwrap();
            store.set("k", vec![7]).unwrap();
        }

        let other = KdfParams {
            t_cost: 2,
            m_cost: 128,
            parallelism: 1,
        };
        let store = SqliteStore::open(&path, Some(&b"pw"[..]), &other).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(vec![7]));

        let conn = Connection::open(&path).unwrap();
        let recorded: Vec<u8> = conn
            .query_row("SELECT value FROM meta WHERE key = 'kdf_params'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(KdfParams::from_bytes(&recorded), Some(fast()));
    }

    #[test]
    fn test_encrypted_values_not_stored_in_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.db");
        {
            let store = SqliteStore::open(&path, Some(&b"pw"[..]), &fast()).unwrap();
            store.set("k", b"plaintext-marker".to_vec()).unwrap();
        }
        let conn = Connection::open(&path).unwrap();
        let raw: Vec<u8> = conn
            .query_row("SELECT value FROM entries WHERE key = 'k'", [], |r| r.get(0))
            .unwrap();
        assert!(!raw.windows(16).any(|w| w == b"plaintext-marker"));
    }

    #[test]
    fn test_passphrase_rejected_for_plaintext_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.db");
        {
            let store = SqliteStore::open(&path, None, &fast()).unwrap();
            store.set("k", vec![1]).unwrap();
        }
        assert!(matches!(
            SqliteStore::open(&path, Some(&b"pw"[..]), &fast()),
            Err(StoreError::PlaintextStore)
        ));
    }

    #[test]
    fn test_batch_builder() {
        let mut batch = WriteBatch::new();
        assert!(batch.is_empty());
        batch.put("a", vec![1]).delete("b");
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.ops()[1], StoreOp::Delete { key: "b".into() });
    }
}
