//! Adapters implementing the outbound ports.

pub mod anomaly_sink;
pub mod clock;
pub mod lock;
pub mod registry;
pub mod storage;

pub use anomaly_sink::TracingAnomalySink;
#[cfg(any(test, feature = "test-support"))]
pub use anomaly_sink::RecordingAnomalySink;
pub use clock::{ManualClock, SystemClock};
pub use lock::DataDirLock;
pub use registry::HandlerRegistry;
pub use storage::{FileBackedKVStore, InMemoryKVStore};

#[cfg(feature = "rocksdb")]
pub use storage::RocksDbStore;
