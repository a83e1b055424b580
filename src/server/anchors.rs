//! The trust anchors known to the validator and their processing state.
//!
//! All types here are immutable values. Every update produces a new value,
//! sharing everything that did not change with the old one.

use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use rpki::repository::crl::Crl;
use rpki::repository::manifest::Manifest;
use serde::Serialize;
use crate::commons::error::Error;
use crate::commons::ValidatorResult;
use crate::constants::failure_backoff;
use crate::validation::locator::TrustAnchorLocator;
use crate::validation::object::{
    CaCertificate, RepositoryObject, ValidatedObject, ValidatedObjects,
};
use crate::validation::process::ProcessResult;


//------------ ProcessingStatus ----------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProcessingStatus {
    /// Waiting for the next run.
    Idle {
        next_update: DateTime<Utc>,
        last_error: Option<String>,
    },

    /// A validation run is in progress.
    Running {
        description: String,
    },
}

impl ProcessingStatus {
    pub fn idle(next_update: DateTime<Utc>) -> Self {
        ProcessingStatus::Idle { next_update, last_error: None }
    }

    pub fn running(description: impl Into<String>) -> Self {
        ProcessingStatus::Running { description: description.into() }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, ProcessingStatus::Idle { .. })
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ProcessingStatus::Running { .. })
    }

    pub fn next_update(&self) -> Option<DateTime<Utc>> {
        match self {
            ProcessingStatus::Idle { next_update, .. } => Some(*next_update),
            ProcessingStatus::Running { .. } => None,
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        match self {
            ProcessingStatus::Idle { last_error, .. } => last_error.as_deref(),
            ProcessingStatus::Running { .. } => None,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            ProcessingStatus::Idle { .. } => None,
            ProcessingStatus::Running { description } => Some(description),
        }
    }
}


//------------ ObjectCounts --------------------------------------------------

/// How many objects the last successful run found.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ObjectCounts {
    pub valid: usize,
    pub invalid: usize,
}

impl From<&ValidatedObjects> for ObjectCounts {
    fn from(objects: &ValidatedObjects) -> Self {
        ObjectCounts {
            valid: objects.valid_count(),
            invalid: objects.invalid_count(),
        }
    }
}


//------------ TrustAnchor ---------------------------------------------------

/// A trust anchor and what we currently know about it.
///
/// The certificate, manifest and CRL are the anchor's own chain as found
/// by the last successful run. They are always replaced together.
#[derive(Clone, Debug)]
pub struct TrustAnchor {
    locator: Arc<TrustAnchorLocator>,
    status: ProcessingStatus,
    enabled: bool,
    certificate: Option<Arc<CaCertificate>>,
    manifest: Option<Arc<Manifest>>,
    crl: Option<Arc<Crl>>,
    last_updated: Option<DateTime<Utc>>,
    last_counts: Option<ObjectCounts>,
}

impl TrustAnchor {
    /// Creates a new, enabled anchor that is due at `next_update`.
    pub fn new(
        locator: Arc<TrustAnchorLocator>, next_update: DateTime<Utc>
    ) -> Self {
        TrustAnchor {
            locator,
            status: ProcessingStatus::idle(next_update),
            enabled: true,
            certificate: None,
            manifest: None,
            crl: None,
            last_updated: None,
            last_counts: None,
        }
    }

    pub fn locator(&self) -> &Arc<TrustAnchorLocator> {
        &self.locator
    }

    pub fn name(&self) -> &str {
        self.locator.name()
    }

    pub fn status(&self) -> &ProcessingStatus {
        &self.status
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn certificate(&self) -> Option<&Arc<CaCertificate>> {
        self.certificate.as_ref()
    }

    pub fn manifest(&self) -> Option<&Arc<Manifest>> {
        self.manifest.as_ref()
    }

    pub fn crl(&self) -> Option<&Arc<Crl>> {
        self.crl.as_ref()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn last_counts(&self) -> Option<ObjectCounts> {
        self.last_counts
    }

    /// Returns whether a run should be started at the given time.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.status.next_update().is_some_and(|next| {
            next <= now
        })
    }

    pub fn with_status(&self, status: ProcessingStatus) -> Self {
        TrustAnchor { status, ..self.clone() }
    }

    pub fn with_enabled(&self, enabled: bool) -> Self {
        TrustAnchor { enabled, ..self.clone() }
    }

    /// Returns the anchor after a run with the given result finished.
    ///
    /// A successful run replaces the cached chain with whatever the result
    /// contains for it, which may be nothing. A failed run keeps the chain
    /// of the last successful one and retries after a fixed backoff.
    pub fn finish_processing(
        &self,
        result: &ProcessResult,
        validation_interval: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        match result {
            Ok(objects) => {
                let certificate = objects.get(
                    self.locator.certificate_uri()
                ).and_then(ValidatedObject::certificate).cloned();

                let manifest = certificate.as_ref()
                    .and_then(|cert| cert.manifest_uri())
                    .and_then(|uri| objects.get(uri))
                    .and_then(ValidatedObject::object)
                    .and_then(RepositoryObject::as_manifest)
                    .cloned();

                let crl = manifest.as_ref()
                    .and_then(|manifest| manifest.cert().crl_uri())
                    .and_then(|uri| objects.get(uri))
                    .and_then(ValidatedObject::object)
                    .and_then(RepositoryObject::as_crl)
                    .cloned();

                TrustAnchor {
                    status: ProcessingStatus::idle(
                        add_duration(now, validation_interval)
                    ),
                    certificate,
                    manifest,
                    crl,
                    last_updated: Some(now),
                    last_counts: Some(objects.into()),
                    ..self.clone()
                }
            }
            Err(failure) => {
                TrustAnchor {
                    status: ProcessingStatus::Idle {
                        next_update: add_duration(now, failure_backoff()),
                        last_error: Some(failure.to_string()),
                    },
                    ..self.clone()
                }
            }
        }
    }
}

fn add_duration(time: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    time.checked_add_signed(duration).unwrap_or(DateTime::<Utc>::MAX_UTC)
}


//------------ TrustAnchors --------------------------------------------------

/// The registry of all trust anchors.
///
/// There is never more than one anchor per locator. Anchors keep the order
/// in which their locators were given.
#[derive(Clone, Debug)]
pub struct TrustAnchors {
    anchors: Vec<Arc<TrustAnchor>>,
    validation_interval: Duration,
}

impl TrustAnchors {
    /// Creates the registry with all anchors due at `now`.
    pub fn new(
        locators: impl IntoIterator<Item = TrustAnchorLocator>,
        validation_interval: Duration,
        now: DateTime<Utc>,
    ) -> ValidatorResult<Self> {
        let mut anchors: Vec<Arc<TrustAnchor>> = Vec::new();
        for locator in locators {
            if anchors.iter().any(|anchor| {
                anchor.name() == locator.name()
                    || anchor.locator.as_ref() == &locator
            }) {
                return Err(Error::DuplicateTrustAnchor(
                    locator.name().to_string()
                ))
            }
            anchors.push(Arc::new(TrustAnchor::new(Arc::new(locator), now)));
        }
        Ok(TrustAnchors { anchors, validation_interval })
    }

    pub fn anchors(&self) -> &[Arc<TrustAnchor>] {
        &self.anchors
    }

    pub fn validation_interval(&self) -> Duration {
        self.validation_interval
    }

    pub fn get(&self, locator: &TrustAnchorLocator) -> Option<&Arc<TrustAnchor>> {
        self.anchors.iter().find(|anchor| anchor.locator.as_ref() == locator)
    }

    pub fn by_name(&self, name: &str) -> Option<&Arc<TrustAnchor>> {
        self.anchors.iter().find(|anchor| anchor.name() == name)
    }

    /// Returns a registry with the anchor for `locator` replaced.
    ///
    /// All other entries are shared with `self`. If there is no such
    /// anchor, the result is an unchanged copy.
    fn update(
        &self,
        locator: &TrustAnchorLocator,
        op: impl FnOnce(&TrustAnchor) -> TrustAnchor,
    ) -> Self {
        let mut anchors = self.anchors.clone();
        if let Some(anchor) = anchors.iter_mut().find(|anchor| {
            anchor.locator.as_ref() == locator
        }) {
            *anchor = Arc::new(op(anchor));
        }
        TrustAnchors {
            anchors,
            validation_interval: self.validation_interval,
        }
    }

    /// Marks the anchor as running, whatever its current state.
    pub fn start_processing(
        &self, locator: &TrustAnchorLocator, description: &str
    ) -> Self {
        self.update(locator, |anchor| {
            anchor.with_status(ProcessingStatus::running(description))
        })
    }

    /// Marks the anchor as running if it is idle and enabled.
    ///
    /// Returns `None` if it isn't, in which case nothing changes.
    pub fn try_start_processing(
        &self, locator: &TrustAnchorLocator, description: &str
    ) -> Option<Self> {
        let anchor = self.get(locator)?;
        if anchor.status.is_idle() && anchor.enabled {
            Some(self.start_processing(locator, description))
        }
        else {
            None
        }
    }

    pub fn finished_processing(
        &self,
        locator: &TrustAnchorLocator,
        result: &ProcessResult,
        now: DateTime<Utc>,
    ) -> Self {
        self.update(locator, |anchor| {
            anchor.finish_processing(result, self.validation_interval, now)
        })
    }

    pub fn update_enabled(
        &self, locator: &TrustAnchorLocator, enabled: bool
    ) -> Self {
        self.update(locator, |anchor| anchor.with_enabled(enabled))
    }

    pub fn has_enabled_anchors(&self) -> bool {
        self.anchors.iter().any(|anchor| anchor.enabled)
    }

    /// Returns the locators of all anchors that should run now.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<Arc<TrustAnchorLocator>> {
        self.anchors.iter()
            .filter(|anchor| anchor.is_due(now))
            .map(|anchor| anchor.locator.clone())
            .collect()
    }

    pub fn status(&self) -> Vec<AnchorStatus> {
        self.anchors.iter().map(|anchor| AnchorStatus::from(anchor.as_ref()))
            .collect()
    }
}


//------------ AnchorStatus --------------------------------------------------

/// What operators get to see about a trust anchor.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct AnchorStatus {
    pub name: String,
    pub enabled: bool,
    pub state: &'static str,
    pub description: Option<String>,
    pub next_update: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    pub objects: Option<ObjectCounts>,
}

impl From<&TrustAnchor> for AnchorStatus {
    fn from(anchor: &TrustAnchor) -> Self {
        AnchorStatus {
            name: anchor.name().to_string(),
            enabled: anchor.enabled,
            state: if anchor.status.is_idle() { "idle" } else { "running" },
            description: anchor.status.description().map(Into::into),
            next_update: anchor.status.next_update(),
            last_error: anchor.status.last_error().map(Into::into),
            last_updated: anchor.last_updated,
            objects: anchor.last_counts,
        }
    }
}


//------------ Tests --------------------------------------------------------
