use super::{apply_batch, scan_prefix};
use crate::adapters::lock::DataDirLock;
use crate::domain::errors::StoreError;
use crate::ports::outbound::{BatchOperation, KeyValueStore, ScanResult};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

/// Log size that makes a compaction worth considering.
const COMPACT_MIN_BYTES: u64 = 1024 * 1024;

/// File-backed key-value store.
///
/// The table lives in memory. On disk it is a snapshot (`gateway.db`) plus
/// an append-only log (`gateway.log`). Each mutation appends one
/// checksummed log record and fsyncs it, so a write costs the size of the
/// mutation, not the size of the table.
///
/// Once the log outgrows both `COMPACT_MIN_BYTES` and the snapshot, the
/// table is written as a new snapshot (temp file, fsync, rename) and the
/// log is emptied. The log at least doubles between compactions, so their
/// cost amortizes to a constant per write. A crash between the rename and
/// the truncation only replays records the snapshot already contains.
///
/// A torn record at the end of the log is a write cut short by a crash;
/// it is dropped on open. The data directory is locked for the lifetime of
/// the store.
pub struct FileBackedKVStore {
    data: RwLock<Table>,
    log: Mutex<Log>,
    snapshot_path: PathBuf,
    compact_min_bytes: u64,
    _lock: DataDirLock,
}

struct Log {
    file: File,
    len: u64,
    snapshot_len: u64,
}

impl FileBackedKVStore {
    /// Snapshot file name inside the data directory.
    pub const FILE_NAME: &'static str = "gateway.db";
    /// Log file name inside the data directory.
    pub const LOG_FILE_NAME: &'static str = "gateway.log";

    /// Open (or create) the store in `data_dir`.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, StoreError> {
        Self::open_with(data_dir.as_ref(), COMPACT_MIN_BYTES)
    }

    fn open_with(data_dir: &Path, compact_min_bytes: u64) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir).map_err(StoreError::io)?;
        let lock = DataDirLock::acquire(data_dir)?;

        let snapshot_path = data_dir.join(Self::FILE_NAME);
        let (mut data, snapshot_len) = match std::fs::read(&snapshot_path) {
            Ok(bytes) => (decode(&bytes)?, bytes.len() as u64),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (Table::new(), 0),
            Err(e) => return Err(StoreError::io(e)),
        };

        let log_path = data_dir.join(Self::LOG_FILE_NAME);
        let log_bytes = match std::fs::read(&log_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StoreError::io(e)),
        };
        let replay = replay_log(&log_bytes, &mut data)?;

        let file = private_options()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(StoreError::io)?;
        if replay.valid_len < log_bytes.len() as u64 {
            warn!(
                path = %log_path.display(),
                dropped_bytes = log_bytes.len() as u64 - replay.valid_len,
                "Dropping torn record at end of store log"
            );
            file.set_len(replay.valid_len).map_err(StoreError::io)?;
            file.sync_all().map_err(StoreError::io)?;
        }

        info!(
            path = %snapshot_path.display(),
            keys = data.len(),
            replayed = replay.records,
            "Opened file-backed store"
        );

        Ok(Self {
            data: RwLock::new(data),
            log: Mutex::new(Log {
                file,
                len: replay.valid_len,
                snapshot_len,
            }),
            snapshot_path,
            compact_min_bytes,
            _lock: lock,
        })
    }

    /// Log `operations`, then apply them to the table.
    fn write_through(&self, operations: Vec<BatchOperation>) -> Result<(), StoreError> {
        let mut log = self.log.lock();
        let record = encode_record(&operations);
        if let Err(e) = log.file.write_all(&record).and_then(|()| log.file.sync_data()) {
            // A partial record would hide every later one from replay.
            if let Err(truncate) = log.file.set_len(log.len) {
                warn!(error = %truncate, "Store log could not be rolled back");
            }
            return Err(StoreError::io(e));
        }
        log.len += record.len() as u64;

        let mut data = self.data.write();
        apply_batch(&mut data, operations);

        if log.len >= self.compact_min_bytes && log.len >= log.snapshot_len {
            let snapshot = encode(&data);
            drop(data);
            // The write is already durable in the log; a failed compaction
            // is retried on the next write.
            if let Err(e) = self.compact(&mut log, &snapshot) {
                warn!(error = %e, "Store compaction failed");
            }
        }
        Ok(())
    }

    fn compact(&self, log: &mut Log, snapshot: &[u8]) -> Result<(), StoreError> {
        save(&self.snapshot_path, snapshot)?;
        log.file.set_len(0).map_err(StoreError::io)?;
        log.file.sync_all().map_err(StoreError::io)?;
        log.len = 0;
        log.snapshot_len = snapshot.len() as u64;
        Ok(())
    }
}

impl KeyValueStore for FileBackedKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.write_through(vec![BatchOperation::put(key, value)])
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.write_through(vec![BatchOperation::delete(key)])
    }

    fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), StoreError> {
        self.write_through(operations)
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.data.read().contains_key(key))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, StoreError> {
        scan_prefix(&self.data.read(), prefix)
    }
}

fn private_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
}

// Snapshot: [key_len:u32 LE][key][value_len:u32 LE][value]...
//
// Log record: [body_len:u32 LE][crc32(body):u32 LE][body]
// Body: ([PUT][key_len][key][value_len][value] | [DELETE][key_len][key])...

const PUT: u8 = 1;
const DELETE: u8 = 0;

fn push_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn encode(data: &Table) -> Vec<u8> {
    let mut bytes = Vec::new();
    for (key, value) in data {
        push_bytes(&mut bytes, key);
        push_bytes(&mut bytes, value);
    }
    bytes
}

fn encode_record(operations: &[BatchOperation]) -> Vec<u8> {
    let mut body = Vec::new();
    for op in operations {
        match op {
            BatchOperation::Put { key, value } => {
                body.push(PUT);
                push_bytes(&mut body, key);
                push_bytes(&mut body, value);
            }
            BatchOperation::Delete { key } => {
                body.push(DELETE);
                push_bytes(&mut body, key);
            }
        }
    }
    let mut record = Vec::with_capacity(body.len() + 8);
    record.extend_from_slice(&(body.len() as u32).to_le_bytes());
    record.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
    record.extend_from_slice(&body);
    record
}

struct Cursor<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, at: 0 }
    }

    fn is_done(&self) -> bool {
        self.at >= self.bytes.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], StoreError> {
        let end = self
            .at
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                StoreError::corruption(format!("truncated record at byte {}", self.at))
            })?;
        let slice = &self.bytes[self.at..end];
        self.at = end;
        Ok(slice)
    }

    fn take_u32(&mut self) -> Result<u32, StoreError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn take_bytes(&mut self) -> Result<Vec<u8>, StoreError> {
        let len = self.take_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

fn decode(bytes: &[u8]) -> Result<Table, StoreError> {
    let mut cursor = Cursor::new(bytes);
    let mut data = Table::new();
    while !cursor.is_done() {
        let key = cursor.take_bytes()?;
        let value = cursor.take_bytes()?;
        data.insert(key, value);
    }
    Ok(data)
}

fn decode_record_body(body: &[u8]) -> Result<Vec<BatchOperation>, StoreError> {
    let mut cursor = Cursor::new(body);
    let mut operations = Vec::new();
    while !cursor.is_done() {
        let op = match cursor.take(1)?[0] {
            PUT => {
                let key = cursor.take_bytes()?;
                BatchOperation::Put {
                    key,
                    value: cursor.take_bytes()?,
                }
            }
            DELETE => BatchOperation::Delete {
                key: cursor.take_bytes()?,
            },
            tag => return Err(StoreError::corruption(format!("unknown log operation {tag}"))),
        };
        operations.push(op);
    }
    Ok(operations)
}

struct Replay {
    records: usize,
    /// Length of the log prefix made of whole, checksummed records.
    valid_len: u64,
}

/// Apply every intact record in `log` to `data`, stopping at the first
/// record that is cut short or fails its checksum.
fn replay_log(log: &[u8], data: &mut Table) -> Result<Replay, StoreError> {
    let mut cursor = Cursor::new(log);
    let mut replay = Replay {
        records: 0,
        valid_len: 0,
    };
    while !cursor.is_done() {
        let Ok(len) = cursor.take_u32() else { break };
        let Ok(crc) = cursor.take_u32() else { break };
        let Ok(body) = cursor.take(len as usize) else { break };
        if crc32fast::hash(body) != crc {
            break;
        }
        apply_batch(data, decode_record_body(body)?);
        replay.records += 1;
        replay.valid_len = cursor.at as u64;
    }
    Ok(replay)
}

fn save(path: &Path, snapshot: &[u8]) -> Result<(), StoreError> {
    let temp_path = path.with_extension("tmp");
    let mut file = private_options()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(StoreError::io)?;
    file.write_all(snapshot).map_err(StoreError::io)?;
    file.sync_all().map_err(StoreError::io)?;
    std::fs::rename(&temp_path, path).map_err(StoreError::io)?;
    Ok(())
}
