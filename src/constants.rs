//! Various validator-wide constants.

use chrono::Duration;


//------------ Binary Names -------------------------------------------------

/// The friendly name of the `rpki-validator` binary.
pub const VALIDATOR_APP: &str = "RPKI Validator";

/// The version of the validator.
pub const VALIDATOR_VERSION: &str = env!("CARGO_PKG_VERSION");


//------------ Config Files Paths -------------------------------------------

/// The default path to the validator config file.
pub const VALIDATOR_DEFAULT_CONFIG_FILE: &str = "/etc/rpki-validator.conf";


//------------ Environment Variables ----------------------------------------

/// The environment variable with the log level.
///
/// The variable should contain the name of a [`log::LevelFilter`]. It will
/// be overwritten by the config file. The default is “info.”
pub const VALIDATOR_ENV_LOG_LEVEL: &str = "RPKI_VALIDATOR_LOG_LEVEL";

/// The environment variable with the log target.
///
/// The variable should contain the name of a
/// [`LogType`][crate::config::LogType]. It will be overwritten by the config
/// file. The default is “stderr.”
pub const VALIDATOR_ENV_LOG_TYPE: &str = "RPKI_VALIDATOR_LOG_TYPE";


//------------ Timing -------------------------------------------------------

/// How long a trust anchor waits before it is retried after a failed run.
///
/// This is a fixed delay, regardless of the kind of failure or the number
/// of earlier failures.
pub fn failure_backoff() -> Duration {
    Duration::hours(1)
}


//------------ Processing Descriptions --------------------------------------

/// The status description while the trust anchor certificate is fetched.
pub const DESCRIPTION_UPDATING_CERTIFICATE: &str = "Updating certificate";

/// The status description while the repository tree is walked.
pub const DESCRIPTION_UPDATING_ROAS: &str = "Updating ROAs";

/// The failure reported when a run is refused by admission control.
pub const NOT_IDLE_OR_ENABLED: &str = "not idle or enabled";


//------------ Storage Namespaces -------------------------------------------

pub const DOWNLOADS_NS: &str = "downloads";
pub const CERTIFICATES_NS: &str = "certificates";
pub const OBJECTS_NS: &str = "objects";
pub const BROKEN_NS: &str = "broken";
