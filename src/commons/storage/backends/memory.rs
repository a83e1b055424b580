//! In-memory storage.

use std::{error, fmt};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use lazy_static::lazy_static;
use serde_json::Value;
use url::Url;
use super::super::Namespace;


//------------ System --------------------------------------------------------

/// All shared in-memory locations of the process.
///
/// Stores opened with the same `memory:<n>` URI share their content. A
/// plain `memory:` URI always gets a fresh, private location.
lazy_static! {
    static ref SYSTEM: System = System::default();
}

#[derive(Debug, Default)]
struct System {
    locations: Mutex<HashMap<u64, Location>>,
}

impl System {
    fn location(&self, uri: &Uri) -> Location {
        match uri.path {
            Some(path) => {
                let mut locations = self.locations.lock().expect(
                    "poisoned lock"
                );
                locations.entry(path).or_default().clone()
            }
            None => Location::default()
        }
    }
}


//------------ Location ------------------------------------------------------

#[derive(Clone, Debug, Default)]
struct Location {
    namespaces: Arc<Mutex<HashMap<Namespace, MemoryValues>>>,
}


//------------ Store ---------------------------------------------------------

#[derive(Debug)]
pub struct Store {
    location: Location,
}

impl Store {
    pub fn from_uri(uri: &Url) -> Result<Option<Self>, Error> {
        let Some(uri) = Uri::parse_uri(uri)? else {
            return Ok(None)
        };
        Ok(Some(Store { location: SYSTEM.location(&uri) }))
    }

    fn namespaces(&self) -> MutexGuard<'_, HashMap<Namespace, MemoryValues>> {
        self.location.namespaces.lock().expect("poisoned lock")
    }
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
            self.namespaces().get(&namespace).and_then(|values| {
                values.get(key).cloned()
            })
        )
    }

    /// Returns all the keys in the given namespace.
    pub fn list_keys(&self, namespace: Namespace) -> Result<Vec<String>, Error> {
        Ok(
            self.namespaces().get(&namespace).map(|values| {
                values.keys().cloned().collect()
            }).unwrap_or_default()
        )
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
        self.namespaces().entry(namespace).or_default().insert(
            key.into(), value
        );
        Ok(())
    }

    /// Removes the stored value for a given key.
    ///
    /// Removing a key that does not exist is not an error.
    pub fn delete(&self, namespace: Namespace, key: &str) -> Result<(), Error> {
        if let Some(values) = self.namespaces().get_mut(&namespace) {
            values.remove(key);
        }
        Ok(())
    }
}


//------------ MemoryValues --------------------------------------------------

type MemoryValues = HashMap<String, Value>;


//------------ Uri -----------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct Uri {
    path: Option<u64>,
}

impl Uri {
    pub fn parse_uri(uri: &Url) -> Result<Option<Uri>, Error> {
        if uri.scheme() != "memory" {
            return Ok(None)
        }
        if uri.path().is_empty() {
            return Ok(Some(Uri { path: None }))
        }
        if let Ok(path) = u64::from_str(uri.path()) {
            return Ok(Some(Uri { path: Some(path) }))
        }
        Err(Error::BadPath(uri.path().into()))
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("memory:")?;
        if let Some(path) = self.path {
            write!(f, "{path}")?
        }
        Ok(())
    }
}


//------------ Error ---------------------------------------------------------

#[derive(Debug)]
pub enum Error {
    BadPath(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::BadPath(path) => write!(f, "invalid memory path '{path}'"),
        }
    }
}

impl error::Error for Error { }


//------------ Tests --------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn open(uri: &str) -> Store {
        Store::from_uri(&Url::parse(uri).unwrap()).unwrap().unwrap()
    }

    #[test]
    fn numbered_locations_are_shared() {
        let one = open("memory:4711");
        let two = open("memory:4711");
        one.store(Namespace::Downloads, "key", Value::from(1)).unwrap();
        assert_eq!(
            two.get(Namespace::Downloads, "key").unwrap(),
            Some(Value::from(1))
        );
        assert_eq!(two.get(Namespace::Broken, "key").unwrap(), None);
    }

    #[test]
    fn plain_memory_is_private() {
        let one = open("memory:");
        let two = open("memory:");
        one.store(Namespace::Objects, "key", Value::from(1)).unwrap();
        assert!(two.list_keys(Namespace::Objects).unwrap().is_empty());

        one.delete(Namespace::Objects, "key").unwrap();
        assert!(one.list_keys(Namespace::Objects).unwrap().is_empty());
    }

    #[test]
    fn other_schemes_are_not_ours() {
        let uri = Url::parse("local:///tmp/data").unwrap();
        assert!(Store::from_uri(&uri).unwrap().is_none());
        let uri = Url::parse("memory:abc").unwrap();
        assert!(Store::from_uri(&uri).is_err());
    }
}
