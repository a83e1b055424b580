//! The shared validation state.

use std::sync::{Arc, RwLock};
use chrono::Utc;
use log::debug;
use crate::commons::error::Error;
use crate::commons::ValidatorEmptyResult;
use crate::validation::locator::TrustAnchorLocator;
use crate::validation::process::ProcessResult;
use super::anchors::TrustAnchors;


//------------ MemoryImage ---------------------------------------------------

/// The process-wide container for the trust anchor registry.
///
/// The registry can be read by anyone at any time via
/// [`snapshot`][Self::snapshot]. It only changes through the named
/// operations here, each of which replaces the whole registry atomically.
/// Readers holding an older snapshot keep seeing it unchanged.
#[derive(Debug)]
pub struct MemoryImage {
    anchors: RwLock<Arc<TrustAnchors>>,
}

impl MemoryImage {
    pub fn new(anchors: TrustAnchors) -> Self {
        MemoryImage { anchors: RwLock::new(Arc::new(anchors)) }
    }

    /// Returns the current registry.
    pub fn snapshot(&self) -> Arc<TrustAnchors> {
        self.anchors.read().expect("poisoned lock").clone()
    }

    /// Runs an operation on the registry under the write lock.
    ///
    /// If the operation returns a new registry, it replaces the current one.
    fn transact<T>(
        &self,
        op: impl FnOnce(&TrustAnchors) -> (Option<TrustAnchors>, T),
    ) -> T {
        let mut anchors = self.anchors.write().expect("poisoned lock");
        let (updated, res) = op(&anchors);
        if let Some(updated) = updated {
            *anchors = Arc::new(updated);
        }
        res
    }

    /// Moves an idle and enabled anchor to running.
    ///
    /// Returns `false` and leaves everything unchanged if the anchor is
    /// not idle, not enabled, or unknown. Of several concurrent callers for
    /// the same anchor at most one will get `true`.
    pub fn start_if_idle_and_enabled(
        &self, locator: &TrustAnchorLocator, description: &str
    ) -> bool {
        self.transact(|anchors| {
            match anchors.try_start_processing(locator, description) {
                Some(updated) => (Some(updated), true),
                None => (None, false),
            }
        })
    }

    /// Changes the description of a running anchor.
    pub fn start_processing(
        &self, locator: &TrustAnchorLocator, description: &str
    ) {
        self.transact(|anchors| {
            (Some(anchors.start_processing(locator, description)), ())
        })
    }

    /// Records the result of a run and moves the anchor back to idle.
    pub fn finish(&self, locator: &TrustAnchorLocator, result: &ProcessResult) {
        self.transact(|anchors| {
            (
                Some(anchors.finished_processing(locator, result, Utc::now())),
                ()
            )
        })
    }

    /// Enables or disables the anchor with the given name.
    ///
    /// A run in progress is not affected.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> ValidatorEmptyResult {
        self.transact(|anchors| {
            match anchors.by_name(name) {
                Some(anchor) => {
                    debug!(
                        "Trust anchor '{}' {}",
                        name, if enabled { "enabled" } else { "disabled" }
                    );
                    let locator = anchor.locator().clone();
                    (Some(anchors.update_enabled(&locator, enabled)), Ok(()))
                }
                None => {
                    (None, Err(Error::UnknownTrustAnchor(name.to_string())))
                }
            }
        })
    }

    pub fn has_enabled_anchors(&self) -> bool {
        self.snapshot().has_enabled_anchors()
    }
}


//------------ Tests --------------------------------------------------------
