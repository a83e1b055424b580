//! Findings attached to validated objects.

use std::fmt;
use serde::Serialize;


//------------ CheckStatus ---------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// Something is off but the object can still be used.
    Warning,

    /// The object cannot be used.
    Error,

    /// The object could not be fetched from its repository.
    FetchError,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            CheckStatus::Warning => "warning",
            CheckStatus::Error => "error",
            CheckStatus::FetchError => "fetch error",
        })
    }
}


//------------ ValidationCheck -----------------------------------------------

/// A single finding about a repository object.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct ValidationCheck {
    status: CheckStatus,
    message: String,
}

impl ValidationCheck {
    pub fn error(message: impl fmt::Display) -> Self {
        ValidationCheck {
            status: CheckStatus::Error,
            message: message.to_string(),
        }
    }

    pub fn warning(message: impl fmt::Display) -> Self {
        ValidationCheck {
            status: CheckStatus::Warning,
            message: message.to_string(),
        }
    }

    pub fn fetch_error(message: impl fmt::Display) -> Self {
        ValidationCheck {
            status: CheckStatus::FetchError,
            message: message.to_string(),
        }
    }

    pub fn status(&self) -> CheckStatus {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_error(&self) -> bool {
        self.status == CheckStatus::Error
    }
}

impl fmt::Display for ValidationCheck {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}
