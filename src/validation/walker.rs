//! Walking the repository tree of a trust anchor.
//!
//! Starting from a validated CA certificate, the walker fetches the
//! manifest the certificate points to, checks every object listed on it
//! against the hashes on the manifest and the CA's CRL, and descends into
//! every valid child CA certificate it finds. Every listed object ends up
//! in the result, valid or not.

use std::collections::HashSet;
use std::sync::Arc;
use chrono::Utc;
use log::{debug, trace};
use rpki::crypto::KeyIdentifier;
use rpki::repository::cert::Cert;
use rpki::repository::crl::Crl;
use rpki::repository::manifest::{Manifest, ManifestHash};
use rpki::repository::roa::Roa;
use rpki::repository::x509::Time;
use rpki::uri;
use crate::commons::ValidatorResult;
use crate::commons::storage::{
    BrokenObject, DownloadedObject, ObjectStore, ObjectType,
    StoredCertificate, StoredObject,
};
use super::checks::ValidationCheck;
use super::fetch::RepoFetcher;
use super::object::{
    CaCertificate, RepositoryObject, ValidatedObject, ValidatedObjects,
};
use super::options::ValidationOptions;


//------------ CertificateContext --------------------------------------------

/// A validated CA certificate whose publication point is to be walked.
#[derive(Clone, Debug)]
pub struct CertificateContext {
    uri: uri::Rsync,
    cert: Arc<CaCertificate>,
}

impl CertificateContext {
    pub fn new(uri: uri::Rsync, cert: Arc<CaCertificate>) -> Self {
        CertificateContext { uri, cert }
    }

    /// The location the certificate was published at.
    pub fn uri(&self) -> &uri::Rsync {
        &self.uri
    }

    pub fn cert(&self) -> &CaCertificate {
        &self.cert
    }
}


//------------ TopDownWalker -------------------------------------------------

/// A single walk over the tree below one certificate.
///
/// The walker is consumed by [`execute`][Self::execute]. Its visited set
/// lives exactly as long as the walk: nothing is shared between walks.
pub struct TopDownWalker<'a> {
    store: &'a ObjectStore,
    fetcher: &'a dyn RepoFetcher,
    options: ValidationOptions,

    /// The (issuer key, location) pairs seen during this walk.
    visited: HashSet<(KeyIdentifier, uri::Rsync)>,

    objects: ValidatedObjects,
    now: Time,
}

impl<'a> TopDownWalker<'a> {
    pub fn new(
        store: &'a ObjectStore,
        fetcher: &'a dyn RepoFetcher,
        options: ValidationOptions,
    ) -> Self {
        TopDownWalker {
            store,
            fetcher,
            options,
            visited: HashSet::new(),
            objects: ValidatedObjects::default(),
            now: Time::now(),
        }
    }

    /// Walks the tree below the given certificate.
    ///
    /// The certificate itself is not part of the result. Errors are only
    /// returned if the object store fails. Problems with individual objects
    /// end up as checks on their entries.
    pub fn execute(
        mut self, context: CertificateContext
    ) -> ValidatorResult<ValidatedObjects> {
        let mut todo = vec![context];
        while let Some(context) = todo.pop() {
            self.walk_certificate(&context, &mut todo)?;
        }
        Ok(self.objects)
    }

    fn walk_certificate(
        &mut self,
        context: &CertificateContext,
        todo: &mut Vec<CertificateContext>,
    ) -> ValidatorResult<()> {
        let issuer = context.cert().key_identifier();
        let (manifest_uri, repository_uri) = match (
            context.cert().manifest_uri(), context.cert().repository_uri()
        ) {
            (Some(manifest), Some(repository)) => {
                (manifest.clone(), repository.clone())
            }
            _ => {
                debug!(
                    "Certificate {} has no publication point", context.uri()
                );
                return Ok(())
            }
        };
        if !self.visit(issuer, &manifest_uri) {
            trace!("Skipping already visited manifest {manifest_uri}");
            return Ok(())
        }
        debug!("Walking publication point {repository_uri}");

        let mut checks = self.fetcher.visit_repo(&repository_uri);
        checks.extend(self.fetcher.visit_object(&manifest_uri));

        let Some(download) = self.store.get_download(&manifest_uri)? else {
            self.reject(
                manifest_uri, checks, ValidationCheck::error("manifest not found")
            );
            return Ok(())
        };
        let manifest = match Manifest::decode(
            download.encoded.clone(), self.options.strict()
        ) {
            Ok(manifest) => manifest,
            Err(err) => {
                return self.broken(
                    &download, checks, format!("cannot decode manifest: {err}")
                )
            }
        };
        let content = match manifest.clone().validate(
            context.cert().resource_cert(), self.options.strict()
        ) {
            Ok((_, content)) => content,
            Err(err) => {
                self.reject(manifest_uri, checks, ValidationCheck::error(
                    format!("manifest is not valid: {err}")
                ));
                return Ok(())
            }
        };
        if let Some(check) = self.options.check_stale(
            "manifest", content.next_update(), self.now
        ) {
            if check.is_error() {
                self.reject(manifest_uri, checks, check);
                return Ok(())
            }
            checks.push(check);
        }

        let mut files = Vec::new();
        for item in content.iter() {
            let (file, hash) = item.into_pair();
            let Some(uri) = listed_uri(&repository_uri, &file) else {
                self.reject(manifest_uri, checks, ValidationCheck::error(
                    format!(
                        "manifest lists invalid file name '{}'",
                        String::from_utf8_lossy(&file)
                    )
                ));
                return Ok(())
            };
            files.push((uri, hash));
        }

        // Fetch everything on the manifest before judging any of it, the
        // CRL is needed for the rest.
        let mut listed = Vec::new();
        for (uri, hash) in files {
            if !self.visit(issuer, &uri) {
                trace!("Skipping already visited object {uri}");
                continue
            }
            listed.push(self.fetch_listed(
                uri, ManifestHash::new(hash, content.file_hash_alg())
            )?);
        }

        let crl = match self.validate_crl(context, &manifest, &mut listed)? {
            Ok(crl) => crl,
            Err(reason) => {
                checks.push(reason);
                let error = ValidationCheck::error("no valid CRL");
                self.reject(manifest_uri, checks, error.clone());
                for object in listed {
                    self.reject(object.uri, object.checks, error.clone());
                }
                return Ok(())
            }
        };

        if crl.contains(manifest.cert().serial_number()) {
            self.reject(manifest_uri, checks, ValidationCheck::error(
                "manifest EE certificate is revoked"
            ));
            for object in listed {
                self.reject(object.uri, object.checks, ValidationCheck::error(
                    "manifest is not valid"
                ));
            }
            return Ok(())
        }

        self.store_object(issuer, &download, ObjectType::Manifest)?;
        self.objects.insert(ValidatedObject::valid(
            manifest_uri, checks, RepositoryObject::Manifest(Arc::new(manifest))
        ));

        for object in listed {
            self.validate_listed(context, &crl, object, todo)?;
        }
        Ok(())
    }

    /// Marks a location as visited, returns whether it was new.
    fn visit(&mut self, issuer: KeyIdentifier, uri: &uri::Rsync) -> bool {
        self.visited.insert((issuer, uri.clone()))
    }

    fn fetch_listed(
        &self, uri: uri::Rsync, hash: ManifestHash,
    ) -> ValidatorResult<ListedObject> {
        let checks = self.fetcher.visit_object(&uri);
        let download = match self.store.get_download(&uri)? {
            None => Err(ValidationCheck::error("object not found")),
            Some(download) => {
                match hash.verify(&download.encoded) {
                    Ok(()) => Ok(download),
                    Err(_) => Err(ValidationCheck::error(
                        "hash does not match manifest"
                    )),
                }
            }
        };
        Ok(ListedObject { uri, checks, download })
    }

    /// Finds and validates the CRL for the objects on a manifest.
    ///
    /// The CRL is taken out of `listed` and recorded. The inner error is
    /// the reason why there is no usable CRL.
    fn validate_crl(
        &mut self,
        context: &CertificateContext,
        manifest: &Manifest,
        listed: &mut Vec<ListedObject>,
    ) -> ValidatorResult<Result<Arc<Crl>, ValidationCheck>> {
        let Some(crl_uri) = manifest.cert().crl_uri() else {
            return Ok(Err(ValidationCheck::error(
                "manifest EE certificate has no CRL URI"
            )))
        };
        let Some(pos) = listed.iter().position(|item| &item.uri == crl_uri)
        else {
            return Ok(Err(ValidationCheck::error(format!(
                "CRL {crl_uri} is not listed on the manifest"
            ))))
        };
        let ListedObject { uri, checks, download } = listed.remove(pos);
        let failed = ValidationCheck::error(format!("CRL {uri} is not valid"));

        let download = match download {
            Ok(download) => download,
            Err(check) => {
                self.reject(uri, checks, check);
                return Ok(Err(failed))
            }
        };
        match self.check_crl(context, uri, checks, &download)? {
            Some(crl) => Ok(Ok(crl)),
            None => Ok(Err(failed)),
        }
    }

    /// Checks a CRL issued by the context's certificate and records it.
    fn check_crl(
        &mut self,
        context: &CertificateContext,
        uri: uri::Rsync,
        mut checks: Vec<ValidationCheck>,
        download: &DownloadedObject,
    ) -> ValidatorResult<Option<Arc<Crl>>> {
        let crl = match Crl::decode(download.encoded.clone()) {
            Ok(crl) => crl,
            Err(err) => {
                self.broken(download, checks, format!("cannot decode CRL: {err}"))?;
                return Ok(None)
            }
        };
        if let Err(err) = crl.verify_signature(
            context.cert().cert().subject_public_key_info()
        ) {
            self.reject(uri, checks, ValidationCheck::error(
                format!("CRL signature is not valid: {err}")
            ));
            return Ok(None)
        }
        if let Some(check) = self.options.check_stale(
            "CRL", crl.next_update(), self.now
        ) {
            if check.is_error() {
                self.reject(uri, checks, check);
                return Ok(None)
            }
            checks.push(check);
        }

        self.store_object(
            context.cert().key_identifier(), download, ObjectType::Crl
        )?;
        let crl = Arc::new(crl);
        self.objects.insert(ValidatedObject::valid(
            uri, checks, RepositoryObject::Crl(crl.clone())
        ));
        Ok(Some(crl))
    }

    fn validate_listed(
        &mut self,
        context: &CertificateContext,
        crl: &Crl,
        object: ListedObject,
        todo: &mut Vec<CertificateContext>,
    ) -> ValidatorResult<()> {
        let ListedObject { uri, mut checks, download } = object;
        let download = match download {
            Ok(download) => download,
            Err(check) => {
                self.reject(uri, checks, check);
                return Ok(())
            }
        };

        match ObjectKind::from_uri(&uri) {
            ObjectKind::Certificate => {
                self.validate_certificate(context, crl, uri, checks, download, todo)
            }
            ObjectKind::Roa => {
                self.validate_roa(context, crl, uri, checks, download)
            }
            ObjectKind::Crl => {
                if self.check_crl(context, uri.clone(), checks, &download)?.is_some() {
                    if let Some(object) = self.objects.get_mut(&uri) {
                        object.push_check(ValidationCheck::warning(
                            "CRL is not used by the manifest"
                        ));
                    }
                }
                Ok(())
            }
            ObjectKind::Manifest | ObjectKind::Other => {
                checks.push(ValidationCheck::warning("unsupported object type"));
                self.objects.insert(ValidatedObject::valid(
                    uri, checks, RepositoryObject::Other(download.encoded)
                ));
                Ok(())
            }
        }
    }

    fn validate_certificate(
        &mut self,
        context: &CertificateContext,
        crl: &Crl,
        uri: uri::Rsync,
        checks: Vec<ValidationCheck>,
        download: DownloadedObject,
        todo: &mut Vec<CertificateContext>,
    ) -> ValidatorResult<()> {
        let cert = match Cert::decode(download.encoded.clone()) {
            Ok(cert) => cert,
            Err(err) => {
                return self.broken(
                    &download, checks, format!("cannot decode certificate: {err}")
                )
            }
        };
        let resource_cert = match cert.clone().validate_ca(
            context.cert().resource_cert(), self.options.strict()
        ) {
            Ok(resource_cert) => resource_cert,
            Err(err) => {
                self.reject(uri, checks, ValidationCheck::error(
                    format!("certificate is not valid: {err}")
                ));
                return Ok(())
            }
        };
        if crl.contains(cert.serial_number()) {
            self.reject(
                uri, checks, ValidationCheck::error("certificate is revoked")
            );
            return Ok(())
        }

        self.store.put_certificate(&StoredCertificate {
            ski: cert.subject_key_identifier(),
            aki: context.cert().key_identifier(),
            hash: download.hash,
            uri: uri.clone(),
            encoded: download.encoded,
            download_time: download.download_time,
            validation_time: Utc::now(),
        })?;

        let cert = Arc::new(CaCertificate::new(cert, resource_cert));
        self.objects.insert(ValidatedObject::valid(
            uri.clone(), checks, RepositoryObject::Certificate(cert.clone())
        ));
        todo.push(CertificateContext::new(uri, cert));
        Ok(())
    }

    fn validate_roa(
        &mut self,
        context: &CertificateContext,
        crl: &Crl,
        uri: uri::Rsync,
        checks: Vec<ValidationCheck>,
        download: DownloadedObject,
    ) -> ValidatorResult<()> {
        let roa = match Roa::decode(
            download.encoded.clone(), self.options.strict()
        ) {
            Ok(roa) => roa,
            Err(err) => {
                return self.broken(
                    &download, checks, format!("cannot decode ROA: {err}")
                )
            }
        };

        let mut revoked = false;
        let processed = roa.clone().process(
            context.cert().resource_cert(), self.options.strict(),
            |ee: &Cert| {
                revoked = crl.contains(ee.serial_number());
                Ok(())
            }
        );
        if let Err(err) = processed {
            self.reject(uri, checks, ValidationCheck::error(
                format!("ROA is not valid: {err}")
            ));
            return Ok(())
        }
        if revoked {
            self.reject(
                uri, checks, ValidationCheck::error("ROA EE certificate is revoked")
            );
            return Ok(())
        }

        self.store_object(
            context.cert().key_identifier(), &download, ObjectType::Roa
        )?;
        self.objects.insert(ValidatedObject::valid(
            uri, checks, RepositoryObject::Roa(Arc::new(roa))
        ));
        Ok(())
    }

    fn store_object(
        &self,
        aki: KeyIdentifier,
        download: &DownloadedObject,
        object_type: ObjectType,
    ) -> ValidatorResult<()> {
        self.store.put_object(&StoredObject {
            aki,
            hash: download.hash,
            uri: download.uri.clone(),
            object_type,
            encoded: download.encoded.clone(),
            download_time: download.download_time,
            validation_time: Utc::now(),
        })?;
        Ok(())
    }

    fn reject(
        &mut self,
        uri: uri::Rsync,
        checks: Vec<ValidationCheck>,
        error: ValidationCheck,
    ) {
        debug!("Rejected {uri}: {error}");
        self.objects.insert(ValidatedObject::rejected(uri, checks, error));
    }

    /// Records bytes that do not parse at all.
    fn broken(
        &mut self,
        download: &DownloadedObject,
        checks: Vec<ValidationCheck>,
        message: String,
    ) -> ValidatorResult<()> {
        self.store.put_broken(&BrokenObject::new(download, &message))?;
        self.reject(
            download.uri.clone(), checks, ValidationCheck::error(message)
        );
        Ok(())
    }
}


/// Returns the location of a file listed on a manifest.
///
/// Listed names must be a plain file name of letters, digits, `-` and `_`
/// followed by a three letter lower case extension. Returns `None` for
/// anything else.
fn listed_uri(repository: &uri::Rsync, file: &[u8]) -> Option<uri::Rsync> {
    let name = std::str::from_utf8(file).ok()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || !stem.bytes().all(|ch| {
        ch.is_ascii_alphanumeric() || ch == b'-' || ch == b'_'
    }) {
        return None
    }
    if ext.len() != 3 || !ext.bytes().all(|ch| ch.is_ascii_lowercase()) {
        return None
    }
    repository.join(file).ok()
}


//------------ ListedObject --------------------------------------------------

/// An object listed on a manifest after fetching it.
struct ListedObject {
    uri: uri::Rsync,
    checks: Vec<ValidationCheck>,

    /// The downloaded bytes if they exist and match the manifest hash.
    download: Result<DownloadedObject, ValidationCheck>,
}


//------------ ObjectKind ----------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ObjectKind {
    Certificate,
    Manifest,
    Crl,
    Roa,
    Other,
}

impl ObjectKind {
    fn from_uri(uri: &uri::Rsync) -> Self {
        let uri = uri.to_string();
        match uri.rsplit_once('.').map(|(_, ext)| ext) {
            Some("cer") => ObjectKind::Certificate,
            Some("mft") => ObjectKind::Manifest,
            Some("crl") => ObjectKind::Crl,
            Some("roa") => ObjectKind::Roa,
            _ => ObjectKind::Other,
        }
    }
}

//------------ Tests --------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use bytes::Bytes;
    use super::*;
    use crate::commons::storage::Namespace;
    use crate::test::{self, Publication, TestRepository};
    use crate::validation::checks::CheckStatus;
    use crate::validation::fetch::OfflineFetcher;

    /// An offline fetcher that counts what it is asked for.
    struct CountingFetcher {
        inner: OfflineFetcher,
        visits: Mutex<HashMap<String, usize>>,
    }

    impl CountingFetcher {
        fn new(store: Arc<ObjectStore>) -> Self {
            CountingFetcher {
                inner: OfflineFetcher::new(store),
                visits: Mutex::new(HashMap::new()),
            }
        }

        fn visits(&self, uri: &str) -> usize {
            self.visits.lock().unwrap().get(uri).copied().unwrap_or(0)
        }
    }

    impl RepoFetcher for CountingFetcher {
        fn visit_object(&self, uri: &uri::Rsync) -> Vec<ValidationCheck> {
            *self.visits.lock().unwrap().entry(uri.to_string()).or_default() += 1;
            self.inner.visit_object(uri)
        }

        fn visit_repo(&self, uri: &uri::Rsync) -> Vec<ValidationCheck> {
            self.inner.visit_repo(uri)
        }
    }

    fn walk(
        store: &Arc<ObjectStore>, context: CertificateContext
    ) -> ValidatedObjects {
        walk_with(store, context, ValidationOptions::default())
    }

    fn walk_with(
        store: &Arc<ObjectStore>,
        context: CertificateContext,
        options: ValidationOptions,
    ) -> ValidatedObjects {
        let fetcher = OfflineFetcher::new(store.clone());
        TopDownWalker::new(store, &fetcher, options).execute(context).unwrap()
    }

    fn has_check(
        objects: &ValidatedObjects,
        uri: &uri::Rsync,
        status: CheckStatus,
        message: &str,
    ) -> bool {
        objects.get(uri).unwrap().checks().iter().any(|check| {
            check.status() == status && check.message().starts_with(message)
        })
    }

    fn assert_valid(objects: &ValidatedObjects, uri: &uri::Rsync) {
        let object = objects.get(uri).unwrap_or_else(|| {
            panic!("no entry for {uri}")
        });
        assert!(object.is_valid(), "{uri} invalid: {:?}", object.checks());
    }

    fn assert_invalid(objects: &ValidatedObjects, uri: &uri::Rsync) {
        let object = objects.get(uri).unwrap_or_else(|| {
            panic!("no entry for {uri}")
        });
        assert!(!object.is_valid(), "{uri} unexpectedly valid");
    }

    #[test]
    fn walk_valid_tree() {
        let store = Arc::new(test::mem_store());
        let mut repo = TestRepository::new();
        let ta = repo.trust_anchor("ta");
        let child = repo.child(&ta, "child");
        let roa = repo.roa(&child, "route", 65000);

        repo.publish(&store, &ta, vec![child.published()]);
        repo.publish(&store, &child, vec![roa.clone()]);

        let objects = walk(&store, ta.context());

        // TA: manifest, CRL, child cert. Child: manifest, CRL, ROA.
        assert_eq!(objects.len(), 6);
        assert_eq!(objects.invalid_count(), 0);
        assert_valid(&objects, &ta.manifest_uri());
        assert_valid(&objects, &ta.crl_uri());
        assert_valid(&objects, &child.uri());
        assert_valid(&objects, &child.manifest_uri());
        assert_valid(&objects, &child.crl_uri());
        assert_valid(&objects, &child.object_uri(&roa.0));
        assert!(objects.get(&child.uri()).unwrap().certificate().is_some());

        assert_eq!(store.count(Namespace::Certificates).unwrap(), 1);
        assert_eq!(store.count(Namespace::Objects).unwrap(), 5);
        assert_eq!(store.count(Namespace::Broken).unwrap(), 0);
    }

    #[test]
    fn every_listed_object_gets_an_entry() {
        let store = Arc::new(test::mem_store());
        let mut repo = TestRepository::new();
        let ta = repo.trust_anchor("ta");
        let good = repo.roa(&ta, "good", 65001);
        let tampered = repo.roa(&ta, "tampered", 65002);
        let missing = repo.roa(&ta, "missing", 65003);
        let garbage = ("garbage.roa".to_string(), Bytes::from_static(b"junk"));

        repo.publish(&store, &ta, vec![
            good.clone(), tampered.clone(), missing.clone(), garbage.clone()
        ]);
        repo.replace(&store, &ta, &tampered.0, Bytes::from_static(b"other"));
        store.remove_download(&ta.object_uri(&missing.0)).unwrap();

        let objects = walk(&store, ta.context());

        // manifest, CRL and the four listed objects
        assert_eq!(objects.len(), 6);
        assert_valid(&objects, &ta.object_uri(&good.0));
        assert_invalid(&objects, &ta.object_uri(&tampered.0));
        assert_invalid(&objects, &ta.object_uri(&missing.0));
        assert_invalid(&objects, &ta.object_uri(&garbage.0));

        let missing = objects.get(&ta.object_uri(&missing.0)).unwrap();
        assert!(missing.checks().iter().any(|check| {
            check.status() == CheckStatus::FetchError
        }));

        // Only the object that matched its hash but did not parse is broken.
        assert!(store.get_broken(&ta.object_uri(&garbage.0)).unwrap().is_some());
        assert!(store.get_broken(&ta.object_uri(&tampered.0)).unwrap().is_none());
    }

    #[test]
    fn bad_child_does_not_affect_siblings() {
        let store = Arc::new(test::mem_store());
        let mut repo = TestRepository::new();
        let ta = repo.trust_anchor("ta");
        let good = repo.child(&ta, "good");
        let bad = repo.child(&ta, "bad");
        let good_roa = repo.roa(&good, "route", 65000);
        let bad_roa = repo.roa(&bad, "route", 65001);

        repo.publish(&store, &ta, vec![good.published(), bad.published()]);
        repo.publish(&store, &good, vec![good_roa.clone()]);
        repo.publish(&store, &bad, vec![bad_roa]);
        store.remove_download(&bad.manifest_uri()).unwrap();

        let objects = walk(&store, ta.context());

        assert_valid(&objects, &bad.uri());
        assert_invalid(&objects, &bad.manifest_uri());
        assert!(!objects.contains(&bad.crl_uri()));
        assert_valid(&objects, &good.manifest_uri());
        assert_valid(&objects, &good.object_uri(&good_roa.0));
    }

    #[test]
    fn revoked_child_is_invalid() {
        let store = Arc::new(test::mem_store());
        let mut repo = TestRepository::new();
        let ta = repo.trust_anchor("ta");
        let child = repo.child(&ta, "child");
        let roa = repo.roa(&child, "route", 65000);

        repo.publish_revoking(
            &store, &ta, vec![child.published()], vec![child.serial()]
        );
        repo.publish(&store, &child, vec![roa]);

        let objects = walk(&store, ta.context());
        assert_invalid(&objects, &child.uri());
        assert!(!objects.contains(&child.manifest_uri()));
    }

    #[test]
    fn manifest_without_valid_crl_invalidates_everything() {
        let store = Arc::new(test::mem_store());
        let mut repo = TestRepository::new();
        let ta = repo.trust_anchor("ta");
        let roa = repo.roa(&ta, "route", 65000);

        repo.publish(&store, &ta, vec![roa.clone()]);
        let crl = ta.crl_uri();
        let name = crl.to_string().rsplit('/').next().unwrap().to_string();
        repo.replace(&store, &ta, &name, Bytes::from_static(b"not a CRL"));

        let objects = walk(&store, ta.context());
        assert_eq!(objects.len(), 3);
        assert_eq!(objects.valid_count(), 0);
        assert!(objects.get(&ta.manifest_uri()).unwrap().checks().iter().any(
            |check| check.message() == "no valid CRL"
        ));
    }

    #[test]
    fn reissued_certificates_are_walked_once() {
        let store = Arc::new(test::mem_store());
        let mut repo = TestRepository::new();
        let ta = repo.trust_anchor("ta");
        let old = repo.child(&ta, "child");
        let new = repo.reissue(&ta, &old, "child-new");
        let roa = repo.roa(&old, "route", 65000);

        repo.publish(&store, &ta, vec![old.published(), new.published()]);
        repo.publish(&store, &old, vec![roa.clone()]);

        let fetcher = CountingFetcher::new(store.clone());
        let objects = TopDownWalker::new(
            &store, &fetcher, ValidationOptions::default()
        ).execute(ta.context()).unwrap();

        assert_valid(&objects, &old.uri());
        assert_valid(&objects, &new.uri());
        assert_valid(&objects, &old.object_uri(&roa.0));
        assert_eq!(fetcher.visits(&old.manifest_uri().to_string()), 1);
        assert_eq!(fetcher.visits(&old.object_uri(&roa.0).to_string()), 1);
    }

    #[test]
    fn stale_manifest_depends_on_mode() {
        let store = Arc::new(test::mem_store());
        let mut repo = TestRepository::new();
        let ta = repo.trust_anchor("ta");
        let roa = repo.roa(&ta, "route", 65000);

        repo.publish_with(&store, &ta, vec![roa.clone()], Publication {
            manifest_next_update: Publication::stale(3),
            ..Default::default()
        });

        let objects = walk(&store, ta.context());
        assert_invalid(&objects, &ta.manifest_uri());
        assert!(has_check(
            &objects, &ta.manifest_uri(), CheckStatus::Error,
            "manifest is stale"
        ));
        assert!(!objects.contains(&ta.object_uri(&roa.0)));

        let objects = walk_with(
            &store, ta.context(), ValidationOptions::new(0, true, false)
        );
        assert_valid(&objects, &ta.manifest_uri());
        assert!(has_check(
            &objects, &ta.manifest_uri(), CheckStatus::Warning,
            "manifest is stale"
        ));
        assert_valid(&objects, &ta.object_uri(&roa.0));

        let objects = walk_with(
            &store, ta.context(), ValidationOptions::new(7, false, false)
        );
        assert_valid(&objects, &ta.manifest_uri());
    }

    #[test]
    fn stale_crl_depends_on_mode() {
        let store = Arc::new(test::mem_store());
        let mut repo = TestRepository::new();
        let ta = repo.trust_anchor("ta");
        let roa = repo.roa(&ta, "route", 65000);

        repo.publish_with(&store, &ta, vec![roa.clone()], Publication {
            crl_next_update: Publication::stale(3),
            ..Default::default()
        });

        let objects = walk(&store, ta.context());
        assert_eq!(objects.valid_count(), 0);
        assert!(has_check(
            &objects, &ta.crl_uri(), CheckStatus::Error, "CRL is stale"
        ));
        assert!(has_check(
            &objects, &ta.manifest_uri(), CheckStatus::Error, "no valid CRL"
        ));
        assert_invalid(&objects, &ta.object_uri(&roa.0));

        let objects = walk_with(
            &store, ta.context(), ValidationOptions::new(0, true, false)
        );
        assert_eq!(objects.invalid_count(), 0);
        assert!(has_check(
            &objects, &ta.crl_uri(), CheckStatus::Warning, "CRL is stale"
        ));
        assert_valid(&objects, &ta.object_uri(&roa.0));
    }

    #[test]
    fn revoked_manifest_invalidates_listed_objects() {
        let store = Arc::new(test::mem_store());
        let mut repo = TestRepository::new();
        let ta = repo.trust_anchor("ta");
        let roa = repo.roa(&ta, "route", 65000);

        repo.publish_with(&store, &ta, vec![roa.clone()], Publication {
            revoke_manifest: true,
            ..Default::default()
        });

        let objects = walk(&store, ta.context());
        assert_eq!(objects.len(), 3);
        assert_eq!(objects.valid_count(), 1);
        assert_valid(&objects, &ta.crl_uri());
        assert!(has_check(
            &objects, &ta.manifest_uri(), CheckStatus::Error,
            "manifest EE certificate is revoked"
        ));
        assert!(has_check(
            &objects, &ta.object_uri(&roa.0), CheckStatus::Error,
            "manifest is not valid"
        ));
    }

    #[test]
    fn revoked_roa_is_invalid() {
        let store = Arc::new(test::mem_store());
        let mut repo = TestRepository::new();
        let ta = repo.trust_anchor("ta");
        let (file, bytes, serial) = repo.roa_with_serial(&ta, "revoked", 65000);
        let good = repo.roa(&ta, "good", 65001);

        repo.publish_revoking(
            &store, &ta, vec![(file.clone(), bytes), good.clone()],
            vec![serial]
        );

        let objects = walk(&store, ta.context());
        assert_valid(&objects, &ta.manifest_uri());
        assert_valid(&objects, &ta.object_uri(&good.0));
        assert_invalid(&objects, &ta.object_uri(&file));
        assert!(has_check(
            &objects, &ta.object_uri(&file), CheckStatus::Error,
            "ROA EE certificate is revoked"
        ));
        let aki = ta.public_key().key_identifier();
        assert!(
            store.get_object(aki, &ta.object_uri(&file)).unwrap().is_none()
        );
    }

    #[test]
    fn manifest_with_bad_file_name_is_rejected() {
        let store = Arc::new(test::mem_store());
        let mut repo = TestRepository::new();
        let ta = repo.trust_anchor("ta");
        let (_, bytes) = repo.roa(&ta, "route", 65000);

        repo.publish(&store, &ta, vec![("route.v2.roa".to_string(), bytes)]);

        let objects = walk(&store, ta.context());
        assert_eq!(objects.len(), 1);
        assert_invalid(&objects, &ta.manifest_uri());
        assert!(has_check(
            &objects, &ta.manifest_uri(), CheckStatus::Error,
            "manifest lists invalid file name 'route.v2.roa'"
        ));
    }

    #[test]
    fn listed_file_names() {
        let repository = test::rsync("rsync://example.net/repo/ta/");
        assert_eq!(
            listed_uri(&repository, b"child-1_a.cer"),
            Some(test::rsync("rsync://example.net/repo/ta/child-1_a.cer"))
        );
        let bad: [&[u8]; 8] = [
            b"\xffroute.roa", b"../evil.roa", b"bad name.roa",
            b"route", b".roa", b"route.ROA", b"route.roas", b"sub/route.roa",
        ];
        for bad in bad {
            assert_eq!(listed_uri(&repository, bad), None);
        }
    }

    #[test]
    fn long_file_names_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ObjectStore::new(
            &url::Url::parse(
                &format!("local://{}", dir.path().display())
            ).unwrap()
        ).unwrap());
        let mut repo = TestRepository::new();
        let ta = repo.trust_anchor("ta");
        let long = repo.roa(&ta, &"long-name-0123456789".repeat(9), 65000);
        let short = repo.roa(&ta, "route", 65001);

        repo.publish(&store, &ta, vec![long.clone(), short.clone()]);

        let objects = walk(&store, ta.context());
        assert_eq!(objects.len(), 4);
        assert_eq!(objects.invalid_count(), 0);
        assert_valid(&objects, &ta.object_uri(&long.0));
        let aki = ta.public_key().key_identifier();
        assert!(
            store.get_object(aki, &ta.object_uri(&long.0)).unwrap().is_some()
        );
    }
}
