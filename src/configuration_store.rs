//! A thread-safe in-memory holder for the currently active configuration.
//!
//! Decisions read a snapshot; the delivery layer (out of scope here) replaces
//! the snapshot wholesale whenever a new datafile arrives.
use std::sync::{Arc, RwLock};

use crate::Configuration;

/// `ConfigurationStore` provides thread-safe (`Sync`) storage for the active
/// [`Configuration`] with concurrent readers and writers.
///
/// A `Configuration` is immutable and can only be replaced completely. Readers
/// receive an `Arc` snapshot unaffected by later writes, so one decision
/// always evaluates against one consistent configuration.
#[derive(Default)]
pub struct ConfigurationStore {
    configuration: RwLock<Option<Arc<Configuration>>>,
}

impl ConfigurationStore {
    /// Create a new empty configuration store.
    pub fn new() -> Self {
        ConfigurationStore::default()
    }

    /// Get the currently active configuration. Returns `None` if no
    /// configuration has been stored yet.
    pub fn get_configuration(&self) -> Option<Arc<Configuration>> {
        // read() only fails if a writer panicked while holding the lock, which
        // should never happen.
        let configuration = self
            .configuration
            .read()
            .expect("thread holding configuration lock should not panic");

        configuration.clone()
    }

    /// Replace the active configuration.
    pub fn set_configuration(&self, configuration: Arc<Configuration>) {
        let mut slot = self
            .configuration
            .write()
            .expect("thread holding configuration lock should not panic");

        *slot = Some(configuration);
    }
}
