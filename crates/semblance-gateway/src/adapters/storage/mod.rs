//! Key-value store backends.

mod file;
mod memory;
#[cfg(feature = "rocksdb")]
mod rocksdb;

pub use file::FileBackedKVStore;
pub use memory::InMemoryKVStore;
#[cfg(feature = "rocksdb")]
pub use self::rocksdb::{RocksDbConfig, RocksDbStore};

use crate::domain::errors::StoreError;
use crate::ports::outbound::BatchOperation;
use std::collections::BTreeMap;

/// Apply a batch to an ordered map.
pub(crate) fn apply_batch(data: &mut BTreeMap<Vec<u8>, Vec<u8>>, operations: Vec<BatchOperation>) {
    for op in operations {
        match op {
            BatchOperation::Put { key, value } => {
                data.insert(key, value);
            }
            BatchOperation::Delete { key } => {
                data.remove(&key);
            }
        }
    }
}

/// Ordered prefix scan over a `BTreeMap`.
pub(crate) fn scan_prefix(
    data: &BTreeMap<Vec<u8>, Vec<u8>>,
    prefix: &[u8],
) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
    Ok(data
        .range(prefix.to_vec()..)
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect())
}
