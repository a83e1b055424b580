//! Validating one trust anchor.
//!
//! A [`ValidationRun`] first establishes the trust anchor certificate from
//! its locator and then walks the repository tree below it. Additional
//! behaviour is added through [`ProcessLayer`]s that wrap the two steps.

use std::{fmt, panic};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use chrono::Utc;
use log::{debug, info, warn};
use rpki::repository::cert::Cert;
use rpki::uri;
use crate::commons::ValidatorResult;
use crate::commons::storage::{BrokenObject, ObjectStore, StoredCertificate};
use crate::constants::{
    DESCRIPTION_UPDATING_CERTIFICATE, DESCRIPTION_UPDATING_ROAS,
    NOT_IDLE_OR_ENABLED,
};
use crate::server::memory::MemoryImage;
use super::checks::ValidationCheck;
use super::fetch::RepoFetcher;
use super::locator::TrustAnchorLocator;
use super::object::{
    CaCertificate, RepositoryObject, ValidatedObject, ValidatedObjects,
};
use super::options::ValidationOptions;
use super::walker::{CertificateContext, TopDownWalker};


//------------ ProcessFailure ------------------------------------------------

/// A validation run that did not produce a result.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcessFailure(String);

impl ProcessFailure {
    pub fn new(message: impl fmt::Display) -> Self {
        ProcessFailure(message.to_string())
    }

    pub fn message(&self) -> &str {
        &self.0
    }

    fn from_panic(panic: Box<dyn Any + Send>) -> Self {
        let message = if let Some(message) = panic.downcast_ref::<&str>() {
            (*message).to_string()
        }
        else if let Some(message) = panic.downcast_ref::<String>() {
            message.clone()
        }
        else {
            "unknown panic".to_string()
        };
        ProcessFailure(format!("validation aborted: {message}"))
    }
}

impl fmt::Display for ProcessFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub type ProcessResult = Result<ValidatedObjects, ProcessFailure>;


//------------ ProcessLayer --------------------------------------------------

/// Behaviour wrapped around a validation run.
///
/// Each of the `around_` methods receives the rest of the pipeline as
/// `next` and must call it exactly once unless it wants to prevent the
/// step from happening altogether.
pub trait ProcessLayer: Send + Sync {
    /// Wraps the whole run.
    fn around_process(
        &self,
        _locator: &TrustAnchorLocator,
        next: &mut dyn FnMut() -> ProcessResult,
    ) -> ProcessResult {
        next()
    }

    /// Wraps the walk below the trust anchor certificate.
    fn around_validation(
        &self,
        _locator: &TrustAnchorLocator,
        next: &mut dyn FnMut() -> ValidatorResult<ValidatedObjects>,
    ) -> ValidatorResult<ValidatedObjects> {
        next()
    }

    /// Called after the fetcher was asked for an object or repository.
    fn object_fetched(
        &self,
        _locator: &TrustAnchorLocator,
        _uri: &uri::Rsync,
        _checks: &[ValidationCheck],
    ) { }
}


//------------ ValidationRun -------------------------------------------------

/// The validation pipeline for one trust anchor.
///
/// Layers are applied in the order they are added, the first one added
/// being the outermost.
pub struct ValidationRun {
    locator: Arc<TrustAnchorLocator>,
    store: Arc<ObjectStore>,
    fetcher: Arc<dyn RepoFetcher>,
    options: ValidationOptions,
    layers: Vec<Box<dyn ProcessLayer>>,
}

impl ValidationRun {
    pub fn new(
        locator: Arc<TrustAnchorLocator>,
        store: Arc<ObjectStore>,
        fetcher: Arc<dyn RepoFetcher>,
        options: ValidationOptions,
    ) -> Self {
        ValidationRun {
            locator, store, fetcher, options, layers: Vec::new()
        }
    }

    pub fn with_layer(mut self, layer: impl ProcessLayer + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    pub fn locator(&self) -> &TrustAnchorLocator {
        &self.locator
    }

    /// Runs the complete validation.
    ///
    /// Never panics: anything going wrong is turned into a failure.
    pub fn run_process(&self) -> ProcessResult {
        self.process_through(&self.layers)
    }

    /// Walks the tree below the given trust anchor certificate.
    pub fn validate_objects(
        &self, context: CertificateContext
    ) -> ValidatorResult<ValidatedObjects> {
        self.validation_through(&self.layers, context)
    }

    fn process_through(&self, layers: &[Box<dyn ProcessLayer>]) -> ProcessResult {
        match layers.split_first() {
            Some((layer, rest)) => {
                layer.around_process(
                    &self.locator, &mut || self.process_through(rest)
                )
            }
            None => self.process_core(),
        }
    }

    fn validation_through(
        &self,
        layers: &[Box<dyn ProcessLayer>],
        context: CertificateContext,
    ) -> ValidatorResult<ValidatedObjects> {
        match layers.split_first() {
            Some((layer, rest)) => {
                layer.around_validation(
                    &self.locator,
                    &mut || self.validation_through(rest, context.clone())
                )
            }
            None => self.validation_core(context),
        }
    }

    fn process_core(&self) -> ProcessResult {
        let res = panic::catch_unwind(AssertUnwindSafe(|| {
            self.process_trust_anchor()
        }));
        self.finish_processing();
        match res {
            Ok(Ok(objects)) => Ok(objects),
            Ok(Err(err)) => Err(ProcessFailure::new(err)),
            Err(panic) => Err(ProcessFailure::from_panic(panic)),
        }
    }

    fn validation_core(
        &self, context: CertificateContext
    ) -> ValidatorResult<ValidatedObjects> {
        let fetcher = self.layered_fetcher();
        TopDownWalker::new(&self.store, &fetcher, self.options).execute(context)
    }

    /// Cleans up after a run, whatever its outcome.
    fn finish_processing(&self) {
        self.fetcher.finish();
    }

    fn process_trust_anchor(&self) -> ValidatorResult<ValidatedObjects> {
        let mut trust_anchor = self.extract_trust_anchor()?;
        let Some(cert) = trust_anchor.certificate().cloned() else {
            return Ok(ValidatedObjects::single(trust_anchor))
        };

        let fetcher = self.layered_fetcher();
        for uri in self.locator.prefetch_uris() {
            for check in fetcher.visit_repo(uri) {
                trust_anchor.push_check(check);
            }
        }

        let mut objects = self.validate_objects(CertificateContext::new(
            self.locator.certificate_uri().clone(), cert
        ))?;
        objects.insert(trust_anchor);
        Ok(objects)
    }

    /// Fetches and checks the trust anchor certificate.
    ///
    /// The certificate must have the public key from the locator. Only
    /// problems with the store are errors, everything else results in an
    /// invalid object.
    fn extract_trust_anchor(&self) -> ValidatorResult<ValidatedObject> {
        let uri = self.locator.certificate_uri().clone();
        let checks = self.layered_fetcher().visit_object(&uri);

        let Some(download) = self.store.get_download(&uri)? else {
            return Ok(ValidatedObject::rejected(
                uri, checks,
                ValidationCheck::error("trust anchor certificate not found")
            ))
        };
        let cert = match Cert::decode(download.encoded.clone()) {
            Ok(cert) => cert,
            Err(err) => {
                let message = format!(
                    "cannot decode trust anchor certificate: {err}"
                );
                self.store.put_broken(&BrokenObject::new(&download, &message))?;
                return Ok(ValidatedObject::rejected(
                    uri, checks, ValidationCheck::error(message)
                ))
            }
        };
        if cert.subject_public_key_info() != self.locator.public_key() {
            return Ok(ValidatedObject::rejected(
                uri, checks, ValidationCheck::error(
                    "public key does not match the trust anchor locator"
                )
            ))
        }
        let resource_cert = match cert.clone().validate_ta(
            self.locator.tal_info(), self.options.strict()
        ) {
            Ok(resource_cert) => resource_cert,
            Err(err) => {
                return Ok(ValidatedObject::rejected(
                    uri, checks, ValidationCheck::error(format!(
                        "trust anchor certificate is not valid: {err}"
                    ))
                ))
            }
        };

        let ski = cert.subject_key_identifier();
        self.store.put_certificate(&StoredCertificate {
            ski,
            aki: ski,
            hash: download.hash,
            uri: uri.clone(),
            encoded: download.encoded,
            download_time: download.download_time,
            validation_time: Utc::now(),
        })?;

        Ok(ValidatedObject::valid(
            uri, checks,
            RepositoryObject::Certificate(
                Arc::new(CaCertificate::new(cert, resource_cert))
            )
        ))
    }

    fn layered_fetcher(&self) -> LayeredFetcher<'_> {
        LayeredFetcher { run: self }
    }
}


//------------ LayeredFetcher ------------------------------------------------

/// A fetcher that tells the layers of a run about everything it fetches.
struct LayeredFetcher<'a> {
    run: &'a ValidationRun,
}

impl LayeredFetcher<'_> {
    fn fetched(
        &self, uri: &uri::Rsync, checks: Vec<ValidationCheck>
    ) -> Vec<ValidationCheck> {
        for layer in &self.run.layers {
            layer.object_fetched(&self.run.locator, uri, &checks);
        }
        checks
    }
}

impl RepoFetcher for LayeredFetcher<'_> {
    fn visit_object(&self, uri: &uri::Rsync) -> Vec<ValidationCheck> {
        self.fetched(uri, self.run.fetcher.visit_object(uri))
    }

    fn visit_repo(&self, uri: &uri::Rsync) -> Vec<ValidationCheck> {
        self.fetched(uri, self.run.fetcher.visit_repo(uri))
    }
}


//------------ TrackingLayer -------------------------------------------------

/// Keeps the processing status in the shared state up to date.
///
/// This layer also guarantees that there is only ever one run per trust
/// anchor, so it must be the outermost one.
pub struct TrackingLayer {
    image: Arc<MemoryImage>,
}

impl TrackingLayer {
    pub fn new(image: Arc<MemoryImage>) -> Self {
        TrackingLayer { image }
    }
}

impl ProcessLayer for TrackingLayer {
    fn around_process(
        &self,
        locator: &TrustAnchorLocator,
        next: &mut dyn FnMut() -> ProcessResult,
    ) -> ProcessResult {
        if !self.image.start_if_idle_and_enabled(
            locator, DESCRIPTION_UPDATING_CERTIFICATE
        ) {
            return Err(ProcessFailure::new(NOT_IDLE_OR_ENABLED))
        }
        let res = next();
        self.image.finish(locator, &res);
        res
    }

    fn around_validation(
        &self,
        locator: &TrustAnchorLocator,
        next: &mut dyn FnMut() -> ValidatorResult<ValidatedObjects>,
    ) -> ValidatorResult<ValidatedObjects> {
        self.image.start_processing(locator, DESCRIPTION_UPDATING_ROAS);
        next()
    }
}


//------------ LoggingLayer --------------------------------------------------

/// Logs what a run is doing.
pub struct LoggingLayer;

impl ProcessLayer for LoggingLayer {
    fn around_process(
        &self,
        locator: &TrustAnchorLocator,
        next: &mut dyn FnMut() -> ProcessResult,
    ) -> ProcessResult {
        info!("Validating trust anchor '{locator}'");
        let started = Instant::now();
        let res = next();
        match &res {
            Ok(objects) => {
                info!(
                    "Validated trust anchor '{}' in {:.1}s: \
                     {} valid, {} invalid objects",
                    locator,
                    started.elapsed().as_secs_f64(),
                    objects.valid_count(),
                    objects.invalid_count()
                );
            }
            Err(err) => {
                warn!("Validation of trust anchor '{locator}' failed: {err}");
            }
        }
        res
    }

    fn around_validation(
        &self,
        locator: &TrustAnchorLocator,
        next: &mut dyn FnMut() -> ValidatorResult<ValidatedObjects>,
    ) -> ValidatorResult<ValidatedObjects> {
        debug!("Walking repository tree of '{locator}'");
        let res = next();
        if let Ok(objects) = &res {
            debug!(
                "Finished walking '{}', found {} objects",
                locator, objects.len()
            );
        }
        res
    }

    fn object_fetched(
        &self,
        locator: &TrustAnchorLocator,
        uri: &uri::Rsync,
        checks: &[ValidationCheck],
    ) {
        if checks.is_empty() {
            debug!("[{locator}] Fetched {uri}");
        }
        for check in checks {
            warn!("[{locator}] Fetching {uri}: {check}");
        }
    }
}


//------------ Tests --------------------------------------------------------
