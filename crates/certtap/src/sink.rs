//! Downstream change notification.
//!
//! After a pass that touched certificates, something usually wants to
//! know: a container that should restart, a service that should re-read
//! its key material. The core only produces the set of processed domain
//! names; delivering it is this seam's job, and the watch loop (never the
//! extraction pass itself) invokes it.

use std::collections::BTreeSet;

use tracing::info;

/// Receives the set of primary domain names a successful pass processed.
pub trait ChangeSink: Send + Sync {
    fn notify(&self, domains: &BTreeSet<String>);
}

/// Sink that records the processed domains in the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl ChangeSink for LogSink {
    fn notify(&self, domains: &BTreeSet<String>) {
        info!(domains = ?domains, "certificates updated");
    }
}
