//! # Semblance Gateway Test Suite
//!
//! Flows that cross crate boundaries: a Core-side `CoreClient` talking to a
//! real `Gateway` over each transport, with persistence underneath.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── integration/
//! │   ├── mod.rs          # Shared fixture
//! │   ├── pipeline.rs     # Request lifecycle through the full pipeline
//! │   ├── transports.rs   # In-process vs Unix-socket parity
//! │   └── persistence.rs  # Restart, reconciliation, tamper detection
//! benches/
//! └── pipeline_benchmarks.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p gateway-tests
//! cargo test -p gateway-tests integration::transports::
//! cargo bench -p gateway-tests
//! ```

pub mod integration;
