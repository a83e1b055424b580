//! Storage in the local file system.

use std::{error, fmt, fs, io};
use std::borrow::Cow;
use std::fs::File;
use std::path::{Path, PathBuf};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use rpki::rrdp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use url::Url;
use super::super::Namespace;


//------------ Constants -----------------------------------------------------

/// The directory under the root that contains temporary files.
const TMP_FILE_DIR: &str = ".tmp";

/// The extension of the files holding values.
const VALUE_FILE_EXT: &str = ".json";

/// The longest percent-encoded key used directly as a file name.
///
/// File systems limit names to 255 bytes.
const MAX_ENCODED_KEY_LEN: usize = 200;

/// The prefix of file names derived from the hash of a long key.
///
/// A percent-encoded key never contains a plain `-`, so the two kinds of
/// names cannot collide.
const HASHED_NAME_PREFIX: &str = "sha256-";


//------------ Store ---------------------------------------------------------

/// A storage backend that uses the filesystem for storing values.
///
/// Each namespace has its own directory under the root. A key is
/// percent-encoded into a single file name inside that directory, so keys
/// containing URIs never turn into nested paths. Keys too long for that are
/// replaced by their SHA-256 hash. Every file holds the key next to the
/// value. The directory `.tmp` is used for writing files before they are
/// moved into place.
#[derive(Debug)]
pub struct Store {
    root: PathBuf,
    tmp: PathBuf,
}

impl Store {
    pub fn from_uri(uri: &Url) -> Result<Option<Self>, Error> {
        let Some(uri) = Uri::parse_uri(uri)? else {
            return Ok(None)
        };
        Self::new(uri.path).map(Some)
    }

    fn new(root: PathBuf) -> Result<Self, Error> {
        let tmp = root.join(TMP_FILE_DIR);
        fs::create_dir_all(&tmp).map_err(|err| {
            Error::io(
                format!("cannot create directory '{}'", tmp.display()),
                err
            )
        })?;
        Ok(Store { root, tmp })
    }

    fn namespace_path(&self, namespace: Namespace) -> PathBuf {
        self.root.join(namespace.as_str())
    }

    fn key_path(&self, namespace: Namespace, key: &str) -> PathBuf {
        self.namespace_path(namespace).join(file_name(key))
    }

    fn read_file(path: &Path) -> Result<Option<StoredValue>, Error> {
        let file = match File::open(path) {
            Ok(file) => io::BufReader::new(file),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(None)
            }
            Err(err) => {
                return Err(Error::io(
                    format!("failed to open file '{}'", path.display()),
                    err
                ))
            }
        };
        serde_json::from_reader(file).map(Some).map_err(|err| {
            Error::Deserialize {
                key: path.display().to_string(), err: err.to_string()
            }
        })
    }
}

/// Returns the name of the file for a key.
fn file_name(key: &str) -> String {
    let encoded = utf8_percent_encode(key, NON_ALPHANUMERIC).to_string();
    let mut name = if encoded.len() <= MAX_ENCODED_KEY_LEN {
        encoded
    }
    else {
        format!(
            "{}{}", HASHED_NAME_PREFIX, rrdp::Hash::from_data(key.as_bytes())
        )
    };
    name.push_str(VALUE_FILE_EXT);
    name
}


//------------ StoredValue ---------------------------------------------------

/// The content of a value file.
#[derive(Debug, Deserialize, Serialize)]
struct StoredValue {
    key: String,
    value: Value,
}


/// # Reading
impl Store {
    /// Returns the contents of the stored value with the given key.
    ///
    /// If the value does not exist, returns `Ok(None)`.
    pub fn get(
        &self, namespace: Namespace, key: &str
    ) -> Result<Option<Value>, Error> {
        Ok(
            Self::read_file(&self.key_path(namespace, key))?
                .map(|stored| stored.value)
        )
    }

    /// Returns all the keys in the given namespace.
    pub fn list_keys(&self, namespace: Namespace) -> Result<Vec<String>, Error> {
        let dir = self.namespace_path(namespace);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(Vec::new())
            }
            Err(err) => {
                return Err(Error::io(
                    format!("cannot read directory '{}'", dir.display()),
                    err
                ))
            }
        };

        let mut res = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                Error::io(
                    format!("cannot read directory '{}'", dir.display()),
                    err
                )
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue
            }
            // A file removed since listing the directory is gone anyway.
            if let Some(stored) = Self::read_file(&path)? {
                res.push(stored.key);
            }
        }
        Ok(res)
    }
}


/// # Writing
impl Store {
    /// Stores the provided value under the given key.
    ///
    /// Quietly overwrites a possibly already existing value.
    pub fn store(
        &self, namespace: Namespace, key: &str, value: Value
    ) -> Result<(), Error> {
        let path = self.key_path(namespace, key);
        Self::create_dirs(path.parent())?;

        // Write to a temporary file first so that readers never see a
        // partially written value.
        let mut tmp_file = NamedTempFile::new_in(&self.tmp).map_err(|err| {
            Error::io(
                format!("writing temp file failed for key: '{key}'"),
                err,
            )
        })?;

        let res = serde_json::to_writer(
            &mut io::BufWriter::new(&mut tmp_file),
            &StoredValue { key: key.into(), value }
        );
        if let Err(err) = res {
            return Err(Error::io(
                format!(
                    "failed to write temp file '{}' for key '{}'",
                    tmp_file.as_ref().display(),
                    key
                ),
                err.into(),
            ))
        }

        tmp_file.persist(&path).map_err(|err| {
            Error::io(
                format!(
                    "failed to rename temp file '{}' to '{}'",
                    err.file.path().display(),
                    path.display()
                ),
                err.error,
            )
        })?;

        Ok(())
    }

    /// Removes the stored value for a given key.
    ///
    /// Removing a key that does not exist is not an error.
    pub fn delete(&self, namespace: Namespace, key: &str) -> Result<(), Error> {
        let path = self.key_path(namespace, key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(Error::io(
                    format!("cannot remove file '{}'", path.display()),
                    err
                ))
            }
        }
    }

    fn create_dirs(path: Option<&Path>) -> Result<(), Error> {
        if let Some(path) = path {
            fs::create_dir_all(path).map_err(|err| {
                Error::io(
                    format!("cannot create directory '{}'", path.display()),
                    err
                )
            })?;
        }
        Ok(())
    }
}


//------------ Uri -----------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct Uri {
    path: PathBuf,
}

impl Uri {
    /// Parses a `local:` or `file:` URI.
    ///
    /// A URI with an authority, such as `local://./data`, is treated as a
    /// path relative to the working directory.
    pub fn parse_uri(uri: &Url) -> Result<Option<Uri>, Error> {
        if uri.scheme() != "file" && uri.scheme() != "local" {
            return Ok(None)
        }

        let path = match uri.host_str() {
            Some(host) if !host.is_empty() => {
                format!("{}{}", host, uri.path())
            }
            _ => uri.path().to_string()
        };
        if path.is_empty() {
            return Err(Error::other("missing path in storage URI"))
        }
        Ok(Some(Uri { path: PathBuf::from(path) }))
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "local://{}", self.path.display())
    }
}


//------------ Error ---------------------------------------------------------

#[derive(Debug)]
pub enum Error {
    Io {
        context: Cow<'static, str>,
        err: io::Error,
    },
    Deserialize {
        key: String,
        err: String,
    },
    Other(String),
}

impl Error {
    fn io(context: impl Into<Cow<'static, str>>, err: io::Error) -> Self {
        Error::Io { context: context.into(), err }
    }

    fn other(info: impl Into<String>) -> Self {
        Error::Other(info.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io { context, err } => {
                write!(f, "{context}: {err}")
            }
            Error::Deserialize { key, err } => {
                write!(f, "failed to deserialize value for key '{key}': {err}")
            }
            Error::Other(s) => f.write_str(s)
        }
    }
}

impl error::Error for Error { }


//------------ Tests --------------------------------------------------------
