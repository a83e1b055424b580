//! The outcome of validating repository objects.

use std::collections::HashMap;
use std::collections::hash_map;
use std::sync::Arc;
use bytes::Bytes;
use rpki::crypto::KeyIdentifier;
use rpki::repository::cert::{Cert, ResourceCert};
use rpki::repository::crl::Crl;
use rpki::repository::manifest::Manifest;
use rpki::repository::roa::Roa;
use rpki::uri;
use super::checks::ValidationCheck;


//------------ CaCertificate -------------------------------------------------

/// A CA certificate that passed validation.
///
/// Keeps both the certificate as it was published and the resource
/// certificate produced by validating it, which is needed to validate the
/// objects it issued.
#[derive(Clone, Debug)]
pub struct CaCertificate {
    cert: Cert,
    resource_cert: ResourceCert,
}

impl CaCertificate {
    pub fn new(cert: Cert, resource_cert: ResourceCert) -> Self {
        CaCertificate { cert, resource_cert }
    }

    pub fn cert(&self) -> &Cert {
        &self.cert
    }

    pub fn resource_cert(&self) -> &ResourceCert {
        &self.resource_cert
    }

    pub fn key_identifier(&self) -> KeyIdentifier {
        self.cert.subject_key_identifier()
    }

    pub fn manifest_uri(&self) -> Option<&uri::Rsync> {
        self.cert.rpki_manifest()
    }

    pub fn repository_uri(&self) -> Option<&uri::Rsync> {
        self.cert.ca_repository()
    }
}


//------------ RepositoryObject ----------------------------------------------

/// The decoded content of a valid repository object.
#[derive(Clone, Debug)]
pub enum RepositoryObject {
    Certificate(Arc<CaCertificate>),
    Manifest(Arc<Manifest>),
    Crl(Arc<Crl>),
    Roa(Arc<Roa>),

    /// An object of a type we do not look into.
    Other(Bytes),
}

impl RepositoryObject {
    pub fn as_certificate(&self) -> Option<&Arc<CaCertificate>> {
        match self {
            RepositoryObject::Certificate(cert) => Some(cert),
            _ => None,
        }
    }

    pub fn as_manifest(&self) -> Option<&Arc<Manifest>> {
        match self {
            RepositoryObject::Manifest(manifest) => Some(manifest),
            _ => None,
        }
    }

    pub fn as_crl(&self) -> Option<&Arc<Crl>> {
        match self {
            RepositoryObject::Crl(crl) => Some(crl),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RepositoryObject::Certificate(_) => "certificate",
            RepositoryObject::Manifest(_) => "manifest",
            RepositoryObject::Crl(_) => "crl",
            RepositoryObject::Roa(_) => "roa",
            RepositoryObject::Other(_) => "other",
        }
    }
}


//------------ ValidatedObject -----------------------------------------------

/// The outcome of inspecting the object at one repository location.
#[derive(Clone, Debug)]
pub enum ValidatedObject {
    Valid {
        uri: uri::Rsync,
        checks: Vec<ValidationCheck>,
        object: RepositoryObject,
    },
    Invalid {
        uri: uri::Rsync,
        checks: Vec<ValidationCheck>,
    },
}

impl ValidatedObject {
    pub fn valid(
        uri: uri::Rsync,
        checks: Vec<ValidationCheck>,
        object: RepositoryObject,
    ) -> Self {
        ValidatedObject::Valid { uri, checks, object }
    }

    pub fn invalid(uri: uri::Rsync, checks: Vec<ValidationCheck>) -> Self {
        ValidatedObject::Invalid { uri, checks }
    }

    /// Creates an invalid object with an additional error check.
    pub fn rejected(
        uri: uri::Rsync,
        mut checks: Vec<ValidationCheck>,
        error: ValidationCheck,
    ) -> Self {
        checks.push(error);
        ValidatedObject::Invalid { uri, checks }
    }

    pub fn uri(&self) -> &uri::Rsync {
        match self {
            ValidatedObject::Valid { uri, .. } => uri,
            ValidatedObject::Invalid { uri, .. } => uri,
        }
    }

    pub fn checks(&self) -> &[ValidationCheck] {
        match self {
            ValidatedObject::Valid { checks, .. } => checks,
            ValidatedObject::Invalid { checks, .. } => checks,
        }
    }

    pub fn push_check(&mut self, check: ValidationCheck) {
        match self {
            ValidatedObject::Valid { checks, .. } => checks.push(check),
            ValidatedObject::Invalid { checks, .. } => checks.push(check),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidatedObject::Valid { .. })
    }

    /// Returns the decoded object if it is valid.
    pub fn object(&self) -> Option<&RepositoryObject> {
        match self {
            ValidatedObject::Valid { object, .. } => Some(object),
            ValidatedObject::Invalid { .. } => None,
        }
    }

    pub fn certificate(&self) -> Option<&Arc<CaCertificate>> {
        self.object().and_then(RepositoryObject::as_certificate)
    }
}


//------------ ValidatedObjects ----------------------------------------------

/// The outcome of a validation run keyed by repository location.
#[derive(Clone, Debug, Default)]
pub struct ValidatedObjects {
    objects: HashMap<uri::Rsync, ValidatedObject>,
}

impl ValidatedObjects {
    /// Creates a result holding only the given object.
    pub fn single(object: ValidatedObject) -> Self {
        let mut res = Self::default();
        res.insert(object);
        res
    }

    /// Adds an object, replacing an earlier one at the same location.
    pub fn insert(&mut self, object: ValidatedObject) {
        self.objects.insert(object.uri().clone(), object);
    }

    pub fn get(&self, uri: &uri::Rsync) -> Option<&ValidatedObject> {
        self.objects.get(uri)
    }

    pub fn get_mut(
        &mut self, uri: &uri::Rsync
    ) -> Option<&mut ValidatedObject> {
        self.objects.get_mut(uri)
    }

    pub fn contains(&self, uri: &uri::Rsync) -> bool {
        self.objects.contains_key(uri)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> hash_map::Values<'_, uri::Rsync, ValidatedObject> {
        self.objects.values()
    }

    pub fn valid_count(&self) -> usize {
        self.iter().filter(|object| object.is_valid()).count()
    }

    pub fn invalid_count(&self) -> usize {
        self.len() - self.valid_count()
    }
}

impl<'a> IntoIterator for &'a ValidatedObjects {
    type Item = &'a ValidatedObject;
    type IntoIter = hash_map::Values<'a, uri::Rsync, ValidatedObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
