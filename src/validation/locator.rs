//! Trust anchor locators.
//!
//! A locator tells us where to find the certificate of a trust anchor and
//! which public key it must have. Two file formats are understood: the
//! RFC 8630 TAL format and a key/value format:
//!
//! ```text
//! ca.name = RIPE NCC RPKI Root
//! certificate.location = rsync://rpki.ripe.net/ta/ripe-ncc-ta.cer
//! public.key.info = MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEA...
//! prefetch.uris = rsync://rpki.ripe.net/repository/
//! ```

use std::{error, fmt, fs, io};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use base64::engine::general_purpose::STANDARD as BASE64_ENGINE;
use base64::engine::Engine as _;
use rpki::crypto::PublicKey;
use rpki::repository::tal::TalInfo;
use rpki::uri;


//------------ TrustAnchorLocator --------------------------------------------

/// The immutable identity of a trust anchor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TrustAnchorLocator {
    name: String,
    certificate_uri: uri::Rsync,
    public_key: PublicKey,
    prefetch_uris: Vec<uri::Rsync>,
}

impl TrustAnchorLocator {
    pub fn new(
        name: impl Into<String>,
        certificate_uri: uri::Rsync,
        public_key: PublicKey,
        prefetch_uris: Vec<uri::Rsync>,
    ) -> Self {
        TrustAnchorLocator {
            name: name.into(),
            certificate_uri,
            public_key,
            prefetch_uris,
        }
    }

    /// Loads a locator from a file.
    ///
    /// For TAL files, which do not carry a name, the file stem is used.
    pub fn load(path: &Path) -> Result<Self, LocatorError> {
        let content = fs::read_to_string(path).map_err(|err| {
            LocatorError::Io { path: path.into(), err }
        })?;
        let name = path.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::parse(&name, &content).map_err(|err| err.with_source(path))
    }

    /// Parses the content of a locator file.
    ///
    /// The `default_name` is used if the format does not contain a name.
    pub fn parse(
        default_name: &str, content: &str
    ) -> Result<Self, LocatorError> {
        let first = content.lines().map(str::trim).find(|line| {
            !line.is_empty() && !line.starts_with('#')
        });
        match first {
            Some(line) if line.contains('=') && !line.contains("://") => {
                Self::parse_key_values(content)
            }
            _ => Self::parse_tal(default_name, content)
        }
    }

    fn parse_key_values(content: &str) -> Result<Self, LocatorError> {
        let mut name = None;
        let mut certificate_uri = None;
        let mut public_key = None;
        let mut prefetch_uris = Vec::new();

        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(LocatorError::invalid(
                    format!("expected 'key = value', found '{line}'")
                ))
            };
            let value = value.trim();
            match key.trim() {
                "ca.name" => name = Some(value.to_string()),
                "certificate.location" => {
                    certificate_uri = Some(parse_rsync_uri(value)?)
                }
                "public.key.info" => {
                    public_key = Some(parse_public_key(value)?)
                }
                "prefetch.uris" => {
                    for uri in value.split(',').map(str::trim) {
                        if !uri.is_empty() {
                            prefetch_uris.push(parse_rsync_uri(uri)?)
                        }
                    }
                }
                _ => { }
            }
        }

        Ok(TrustAnchorLocator {
            name: name.filter(|name| !name.is_empty()).ok_or_else(|| {
                LocatorError::invalid("missing 'ca.name'")
            })?,
            certificate_uri: certificate_uri.ok_or_else(|| {
                LocatorError::invalid("missing 'certificate.location'")
            })?,
            public_key: public_key.ok_or_else(|| {
                LocatorError::invalid("missing 'public.key.info'")
            })?,
            prefetch_uris,
        })
    }

    fn parse_tal(name: &str, content: &str) -> Result<Self, LocatorError> {
        let mut lines = content.lines().map(str::trim).skip_while(|line| {
            line.starts_with('#')
        });

        let mut certificate_uri = None;
        for line in lines.by_ref() {
            if line.is_empty() {
                break
            }
            if certificate_uri.is_none() && line.starts_with("rsync://") {
                certificate_uri = Some(parse_rsync_uri(line)?);
            }
            else if !line.starts_with("https://") {
                return Err(LocatorError::invalid(
                    format!("unsupported certificate URI '{line}'")
                ))
            }
        }
        let certificate_uri = certificate_uri.ok_or_else(|| {
            LocatorError::invalid("no rsync certificate URI")
        })?;

        let key: String = lines.collect();
        if key.is_empty() {
            return Err(LocatorError::invalid("missing public key"))
        }

        Ok(TrustAnchorLocator {
            name: name.into(),
            certificate_uri,
            public_key: parse_public_key(&key)?,
            prefetch_uris: Vec::new(),
        })
    }
}

impl TrustAnchorLocator {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn certificate_uri(&self) -> &uri::Rsync {
        &self.certificate_uri
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn prefetch_uris(&self) -> &[uri::Rsync] {
        &self.prefetch_uris
    }

    /// Returns the trust anchor information attached to certificates.
    pub fn tal_info(&self) -> Arc<TalInfo> {
        TalInfo::from_name(self.name.clone()).into_arc()
    }
}

impl fmt::Display for TrustAnchorLocator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn parse_rsync_uri(s: &str) -> Result<uri::Rsync, LocatorError> {
    uri::Rsync::from_str(s).map_err(|err| {
        LocatorError::invalid(format!("invalid rsync URI '{s}': {err}"))
    })
}

fn parse_public_key(s: &str) -> Result<PublicKey, LocatorError> {
    let bytes = BASE64_ENGINE.decode(s).map_err(|err| {
        LocatorError::invalid(format!("invalid public key base64: {err}"))
    })?;
    PublicKey::decode(bytes.as_slice()).map_err(|err| {
        LocatorError::invalid(format!("invalid public key: {err}"))
    })
}


//------------ LocatorError --------------------------------------------------

#[derive(Debug)]
pub enum LocatorError {
    Io {
        path: PathBuf,
        err: io::Error,
    },
    Invalid {
        source: Option<PathBuf>,
        problem: String,
    },
}

impl LocatorError {
    fn invalid(problem: impl Into<String>) -> Self {
        LocatorError::Invalid { source: None, problem: problem.into() }
    }

    fn with_source(self, path: &Path) -> Self {
        match self {
            LocatorError::Invalid { problem, .. } => {
                LocatorError::Invalid { source: Some(path.into()), problem }
            }
            other => other,
        }
    }
}

impl fmt::Display for LocatorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LocatorError::Io { path, err } => {
                write!(f,
                    "Cannot read trust anchor locator '{}': {}",
                    path.display(), err
                )
            }
            LocatorError::Invalid { source: Some(path), problem } => {
                write!(f,
                    "Invalid trust anchor locator '{}': {}",
                    path.display(), problem
                )
            }
            LocatorError::Invalid { source: None, problem } => {
                write!(f, "Invalid trust anchor locator: {problem}")
            }
        }
    }
}

impl error::Error for LocatorError { }


//------------ Tests --------------------------------------------------------
