//! The available storage backends.

use std::fmt;
use serde_json::Value;
use url::Url;
use super::Namespace;

pub mod disk;
pub mod memory;

macro_rules! backends {
    ( $( ( $variant:ident, $module:ident ) )* ) => {


        //------------ Backend -----------------------------------------------

        #[derive(Debug)]
        pub enum Backend {
            $(
                $variant($module::Store),
            )*
        }

        impl Backend {
            pub fn new(storage_uri: &Url) -> Result<Self, BackendError> {
                $(
                    if let Some(inner) = $module::Store::from_uri(
                        storage_uri
                    )? {
                        return Ok(Backend::$variant(inner))
                    }
                )*

                Err(BackendError::UnknownStorageScheme(
                    storage_uri.scheme().into()
                ))
            }

            pub fn get(
                &self, namespace: Namespace, key: &str
            ) -> Result<Option<Value>, BackendError> {
                match self {
                    $(
                        Backend::$variant(inner) => {
                            Ok(inner.get(namespace, key)?)
                        }
                    )*
                }
            }

            pub fn list_keys(
                &self, namespace: Namespace
            ) -> Result<Vec<String>, BackendError> {
                match self {
                    $(
                        Backend::$variant(inner) => {
                            Ok(inner.list_keys(namespace)?)
                        }
                    )*
                }
            }

            pub fn store(
                &self, namespace: Namespace, key: &str, value: Value
            ) -> Result<(), BackendError> {
                match self {
                    $(
                        Backend::$variant(inner) => {
                            Ok(inner.store(namespace, key, value)?)
                        }
                    )*
                }
            }

            pub fn delete(
                &self, namespace: Namespace, key: &str
            ) -> Result<(), BackendError> {
                match self {
                    $(
                        Backend::$variant(inner) => {
                            Ok(inner.delete(namespace, key)?)
                        }
                    )*
                }
            }
        }


        //------------ BackendError ------------------------------------------

        #[derive(Debug)]
        pub enum BackendError {
            UnknownStorageScheme(String),
            $(
                $variant($module::Error),
            )*
        }

        $(
            impl From<$module::Error> for BackendError {
                fn from(src: $module::Error) -> Self {
                    BackendError::$variant(src)
                }
            }
        )*

        impl fmt::Display for BackendError {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                match self {
                    BackendError::UnknownStorageScheme(scheme) => {
                        write!(f, "unknown storage scheme: {scheme}")
                    }
                    $(
                        BackendError::$variant(inner) => inner.fmt(f),
                    )*
                }
            }
        }
    }
}

backends! {
    (Disk, disk)
    (Memory, memory)
}
