//! Helper functions for testing the validator.
//!
//! Besides a few shortcuts, this provides [`TestRepository`] which creates
//! real, signed RPKI objects with a software signer and publishes them into
//! an object store the way a fetcher would.

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use base64::engine::general_purpose::STANDARD as BASE64_ENGINE;
use base64::engine::Engine as _;
use bytes::Bytes;
use chrono::Duration;
use rpki::crypto::softsigner::{KeyId, OpenSslSigner};
use rpki::crypto::{DigestAlgorithm, PublicKey, PublicKeyFormat, Signer};
use rpki::repository::cert::{Cert, KeyUsage, Overclaim, TbsCert};
use rpki::repository::crl::{CrlEntry, TbsCertList};
use rpki::repository::manifest::{FileAndHash, ManifestContent};
use rpki::repository::resources::{Asn, ResourceSet};
use rpki::repository::roa::RoaBuilder;
use rpki::repository::sigobj::SignedObjectBuilder;
use rpki::repository::tal::TalInfo;
use rpki::repository::x509::{Name, Serial, Time, Validity};
use rpki::{rrdp, uri};
use url::Url;
use crate::commons::storage::{DownloadedObject, ObjectStore};
use crate::validation::locator::TrustAnchorLocator;
use crate::validation::object::CaCertificate;
use crate::validation::walker::CertificateContext;

const TEST_PUBLIC_KEY: &str = "\
    MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAsuYNm/0SXxw5eIXaF9rIQZa4Z\
    xkwSjfL0yuQ0HUklciAlrUUIbBN8VdLQmig8WSSPbSErXDRB/vu+6SHOf6ufFUWWwtUPd\
    r4D/vCL9a09iNrm8Q7kJ7Eq5TBDewenPTjWsLex8G+XeRrSUxDBMKe0nxU0JdOJTCyqli\
    SBXLe6PnP7itusfifwroYz/Xl61bNuHCu6Jfo/rSuZ8aJwz3rbJKEhZRISqp0BNk2KAFJ+\
    OYbnP+Gx0Ag819lqXwGQEJON5NgntFp8AKjOs/hjy3lJKh9aJ7tjFWtJENkZ38qeTeRHRa\
    NBbsaUdHU/TNHgyV/ceLftPqczqWhMIJXctPFiwIDAQAB";

pub fn rsync(s: &str) -> uri::Rsync {
    uri::Rsync::from_str(s).unwrap()
}

/// Returns a fresh in-memory object store.
pub fn mem_store() -> ObjectStore {
    ObjectStore::new(&Url::parse("memory:").unwrap()).unwrap()
}

/// Returns the same RSA public key every time.
pub fn public_key() -> PublicKey {
    let bytes = BASE64_ENGINE.decode(TEST_PUBLIC_KEY).unwrap();
    PublicKey::decode(bytes.as_slice()).unwrap()
}


//------------ TestCa --------------------------------------------------------

/// A CA created by a [`TestRepository`].
pub struct TestCa {
    name: String,
    key: KeyId,
    public_key: PublicKey,
    uri: uri::Rsync,
    repository: uri::Rsync,
    cert: Cert,
}

impl TestCa {
    /// Where the CA certificate is published.
    pub fn uri(&self) -> uri::Rsync {
        self.uri.clone()
    }

    pub fn manifest_uri(&self) -> uri::Rsync {
        self.object_uri(&format!("{}.mft", self.name))
    }

    pub fn crl_uri(&self) -> uri::Rsync {
        self.object_uri(&format!("{}.crl", self.name))
    }

    /// The location of a file in the CA's repository.
    pub fn object_uri(&self, name: &str) -> uri::Rsync {
        self.repository.join(name.as_bytes()).unwrap()
    }

    pub fn serial(&self) -> Serial {
        self.cert.serial_number()
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn encoded(&self) -> Bytes {
        self.cert.to_captured().into_bytes()
    }

    /// The file name and content for publishing in the issuer's repository.
    pub fn published(&self) -> (String, Bytes) {
        let uri = self.uri.to_string();
        let name = uri.rsplit('/').next().unwrap_or_default().to_string();
        (name, self.encoded())
    }

    /// A locator for this CA as a trust anchor.
    pub fn locator(&self) -> TrustAnchorLocator {
        TrustAnchorLocator::new(
            self.name.clone(), self.uri(), self.public_key.clone(), Vec::new()
        )
    }

    /// The validation context of a trust anchor CA.
    pub fn context(&self) -> CertificateContext {
        let resource_cert = self.cert.clone().validate_ta(
            TalInfo::from_name(self.name.clone()).into_arc(), false
        ).unwrap();
        CertificateContext::new(
            self.uri(),
            Arc::new(CaCertificate::new(self.cert.clone(), resource_cert))
        )
    }

    fn subject(&self) -> Name {
        self.public_key.to_subject_name()
    }
}


//------------ TestRepository ------------------------------------------------

/// Creates signed repository content.
pub struct TestRepository {
    signer: OpenSslSigner,
    serial: u64,
}

impl TestRepository {
    pub fn new() -> Self {
        TestRepository { signer: OpenSslSigner::new(), serial: 0 }
    }

    fn next_serial(&mut self) -> Serial {
        self.serial += 1;
        Serial::from(self.serial)
    }

    fn validity() -> Validity {
        Validity::new(Time::five_minutes_ago(), Time::years_from_now(1))
    }

    /// Creates a self-signed trust anchor CA.
    pub fn trust_anchor(&mut self, name: &str) -> TestCa {
        let key = self.signer.create_key(PublicKeyFormat::Rsa).unwrap();
        let public_key = self.signer.get_key_info(&key).unwrap();
        let uri = rsync(&format!("rsync://example.net/repo/{name}.cer"));
        let repository = rsync(&format!("rsync://example.net/repo/{name}/"));

        let subject = public_key.to_subject_name();
        let mut tbs = TbsCert::new(
            self.next_serial(),
            subject.clone(),
            Self::validity(),
            Some(subject),
            public_key.clone(),
            KeyUsage::Ca,
            Overclaim::Refuse,
        );
        Self::set_ca_fields(&mut tbs, name, &repository);
        let cert = tbs.into_cert(&self.signer, &key).unwrap();

        TestCa {
            name: name.into(), key, public_key, uri, repository, cert
        }
    }

    /// Creates a child CA with a new key, published by the issuer.
    pub fn child(&mut self, issuer: &TestCa, name: &str) -> TestCa {
        let key = self.signer.create_key(PublicKeyFormat::Rsa).unwrap();
        let public_key = self.signer.get_key_info(&key).unwrap();
        let repository = rsync(&format!("rsync://example.net/repo/{name}/"));
        self.issue(issuer, name, name, key, public_key, repository)
    }

    /// Issues another certificate for an existing child CA.
    ///
    /// The new certificate is published under `file` but shares key and
    /// publication point with `child`.
    pub fn reissue(
        &mut self, issuer: &TestCa, child: &TestCa, file: &str
    ) -> TestCa {
        self.issue(
            issuer, &child.name, file, child.key.clone(),
            child.public_key.clone(), child.repository.clone()
        )
    }

    fn issue(
        &mut self,
        issuer: &TestCa,
        name: &str,
        file: &str,
        key: KeyId,
        public_key: PublicKey,
        repository: uri::Rsync,
    ) -> TestCa {
        let mut tbs = TbsCert::new(
            self.next_serial(),
            issuer.subject(),
            Self::validity(),
            Some(public_key.to_subject_name()),
            public_key.clone(),
            KeyUsage::Ca,
            Overclaim::Refuse,
        );
        Self::set_ca_fields(&mut tbs, name, &repository);
        tbs.set_authority_key_identifier(
            Some(issuer.public_key.key_identifier())
        );
        tbs.set_ca_issuer(Some(issuer.uri()));
        tbs.set_crl_uri(Some(issuer.crl_uri()));
        let cert = tbs.into_cert(&self.signer, &issuer.key).unwrap();

        TestCa {
            name: name.into(),
            key,
            public_key,
            uri: issuer.object_uri(&format!("{file}.cer")),
            repository,
            cert,
        }
    }

    fn set_ca_fields(tbs: &mut TbsCert, name: &str, repository: &uri::Rsync) {
        let resources = ResourceSet::all();
        tbs.set_basic_ca(Some(true));
        tbs.set_ca_repository(Some(repository.clone()));
        tbs.set_rpki_manifest(Some(
            repository.join(format!("{name}.mft").as_bytes()).unwrap()
        ));
        tbs.set_as_resources(resources.to_as_resources());
        tbs.set_v4_resources(resources.to_ip_resources_v4());
        tbs.set_v6_resources(resources.to_ip_resources_v6());
    }

    /// Creates a ROA for 10.0.0.0/8 issued by the given CA.
    pub fn roa(&mut self, ca: &TestCa, name: &str, asn: u32) -> (String, Bytes) {
        let (file, bytes, _) = self.roa_with_serial(ca, name, asn);
        (file, bytes)
    }

    /// Creates a ROA and returns the serial number of its EE certificate.
    pub fn roa_with_serial(
        &mut self, ca: &TestCa, name: &str, asn: u32
    ) -> (String, Bytes, Serial) {
        let file = format!("{name}.roa");
        let serial = self.next_serial();
        let mut roa_builder = RoaBuilder::new(Asn::from_u32(asn));
        roa_builder.push_addr(IpAddr::from([10, 0, 0, 0]), 8, None);

        let mut object_builder = SignedObjectBuilder::new(
            serial,
            Self::validity(),
            ca.crl_uri(),
            ca.uri(),
            ca.object_uri(&file),
        );
        object_builder.set_issuer(Some(ca.subject()));
        object_builder.set_signing_time(Some(Time::now()));

        let roa = roa_builder.finalize(
            object_builder, &self.signer, &ca.key
        ).unwrap();
        (file, roa.to_captured().into_bytes(), serial)
    }

    /// Publishes a CA certificate at its own location.
    pub fn publish_certificate(&self, store: &ObjectStore, ca: &TestCa) {
        store.put_download(
            &DownloadedObject::new(ca.uri(), ca.encoded())
        ).unwrap();
    }

    /// Publishes objects together with a fresh CRL and manifest.
    pub fn publish(
        &mut self,
        store: &ObjectStore,
        ca: &TestCa,
        objects: Vec<(String, Bytes)>,
    ) {
        self.publish_revoking(store, ca, objects, Vec::new())
    }

    /// Publishes objects with a CRL revoking the given serials.
    pub fn publish_revoking(
        &mut self,
        store: &ObjectStore,
        ca: &TestCa,
        objects: Vec<(String, Bytes)>,
        revoked: Vec<Serial>,
    ) {
        self.publish_with(
            store, ca, objects, Publication { revoked, ..Default::default() }
        )
    }

    /// Publishes objects with a CRL and manifest made as described.
    pub fn publish_with(
        &mut self,
        store: &ObjectStore,
        ca: &TestCa,
        mut objects: Vec<(String, Bytes)>,
        publication: Publication,
    ) {
        let manifest_serial = self.next_serial();
        let mut revoked = publication.revoked;
        if publication.revoke_manifest {
            revoked.push(manifest_serial);
        }

        let crl_next_update = publication.crl_next_update;
        let crl = TbsCertList::new(
            Default::default(),
            ca.subject(),
            Publication::this_update(crl_next_update),
            crl_next_update,
            revoked.into_iter().map(|serial| {
                CrlEntry::new(serial, Time::five_minutes_ago())
            }).collect::<Vec<_>>(),
            ca.public_key.key_identifier(),
            self.next_serial(),
        ).into_crl(&self.signer, &ca.key).unwrap();
        objects.push(
            (format!("{}.crl", ca.name), crl.to_captured().into_bytes())
        );

        let manifest_next_update = publication.manifest_next_update;
        let content = ManifestContent::new(
            self.next_serial(),
            Publication::this_update(manifest_next_update),
            manifest_next_update,
            DigestAlgorithm::default(),
            objects.iter().map(|(name, bytes)| {
                FileAndHash::new(name.as_bytes(), rrdp::Hash::from_data(bytes))
            }),
        );
        let mut object_builder = SignedObjectBuilder::new(
            manifest_serial,
            Validity::new(Time::five_minutes_ago(), Time::tomorrow()),
            ca.crl_uri(),
            ca.uri(),
            ca.manifest_uri(),
        );
        object_builder.set_issuer(Some(ca.subject()));
        object_builder.set_signing_time(Some(Time::now()));
        let manifest = content.into_manifest(
            object_builder, &self.signer, &ca.key
        ).unwrap();

        objects.push(
            (format!("{}.mft", ca.name), manifest.to_captured().into_bytes())
        );
        for (name, bytes) in objects {
            store.put_download(
                &DownloadedObject::new(ca.object_uri(&name), bytes)
            ).unwrap();
        }
    }

    /// Replaces the downloaded bytes of a file in a CA's repository.
    pub fn replace(
        &self, store: &ObjectStore, ca: &TestCa, name: &str, bytes: Bytes
    ) {
        store.put_download(
            &DownloadedObject::new(ca.object_uri(name), bytes)
        ).unwrap();
    }
}


//------------ Publication ---------------------------------------------------

/// How the CRL and manifest of a publication are made.
pub struct Publication {
    /// Serials of EE or CA certificates to put on the CRL.
    pub revoked: Vec<Serial>,

    /// Put the manifest's own EE certificate on the CRL.
    pub revoke_manifest: bool,

    pub crl_next_update: Time,
    pub manifest_next_update: Time,
}

impl Publication {
    /// Returns a time that makes a stale object, `days` past next update.
    pub fn stale(days: i64) -> Time {
        Time::now() - Duration::days(days)
    }

    /// The this update time for a given next update time.
    fn this_update(next_update: Time) -> Time {
        if next_update < Time::now() {
            next_update - Duration::days(1)
        }
        else {
            Time::five_minutes_ago()
        }
    }
}

impl Default for Publication {
    fn default() -> Self {
        Publication {
            revoked: Vec::new(),
            revoke_manifest: false,
            crl_next_update: Time::tomorrow(),
            manifest_next_update: Time::tomorrow(),
        }
    }
}
