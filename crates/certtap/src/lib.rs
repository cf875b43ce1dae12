//! certtap - certificate extraction library
//!
//! Taps the TLS certificate material embedded in a reverse proxy's ACME
//! state file and materializes it as plain PEM files, re-extracting
//! whenever the state file changes.
//!
//! # Pipeline
//!
//! ```text
//! change event ─▶ Debouncer ─▶ extract() ─▶ normalize ─▶ [decode ─▶ write]*
//! ```
//!
//! - [`schema`] sniffs which of the proxy's storage layouts a state
//!   document uses and normalizes it into certificate records
//! - [`bundle`] decodes a record's base64 material and splits the
//!   certificate bundle into leaf and chain
//! - [`writer`] persists decoded material under a per-domain or flat
//!   output layout
//! - [`extract`] orchestrates a whole pass with include/exclude filtering
//!   and per-record error containment
//! - [`watch`] coalesces filesystem events into single, never-overlapping
//!   extraction passes
//!
//! # Example
//!
//! ```no_run
//! use certtap::{extract, ExtractorConfig};
//!
//! let config = ExtractorConfig {
//!     state_path: "/data/acme.json".into(),
//!     output_root: "/etc/ssl/exported".into(),
//!     ..Default::default()
//! };
//! let result = extract(&config)?;
//! println!("extracted {} domains", result.processed.len());
//! # Ok::<(), certtap::ExtractError>(())
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod bundle;
pub mod config;
pub mod errors;
pub mod extract;
pub mod schema;
pub mod sink;
pub mod watch;
pub mod writer;

// ============================================================================
// Public API Re-exports
// ============================================================================

// Configuration
pub use config::{ExtractorConfig, Layout, DEFAULT_DEBOUNCE};

// Error taxonomy
pub use errors::{ConfigError, ExtractError, RecordError};

// Extraction pass
pub use extract::{extract, ExtractionResult};

// Schema normalization
pub use schema::{normalize, sniff_version, CertificateRecord, SchemaVersion};

// Bundle decoding
pub use bundle::{decode, DecodedMaterial};

// Output layouts
pub use writer::OutputWriter;

// Change notification
pub use sink::{ChangeSink, LogSink};

// Watching and debouncing
pub use watch::{Debouncer, StateWatcher};
