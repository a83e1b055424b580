//! Validation policy.

use chrono::Duration;
use rpki::repository::x509::Time;
use super::checks::ValidationCheck;


//------------ ValidationOptions ---------------------------------------------

/// How strictly repository objects are judged.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ValidationOptions {
    /// Days a manifest or CRL may be past its next update.
    max_stale_days: u32,

    /// Only warn about staleness, however bad.
    loose: bool,

    /// Decode objects strictly.
    strict: bool,
}

impl ValidationOptions {
    pub fn new(max_stale_days: u32, loose: bool, strict: bool) -> Self {
        ValidationOptions { max_stale_days, loose, strict }
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    /// Checks whether an object with the given next update time is stale.
    ///
    /// Returns `None` if the object is still current, a warning if it is
    /// stale but within the allowed number of days or loose validation is
    /// enabled, and an error otherwise.
    pub fn check_stale(
        &self, what: &str, next_update: Time, now: Time
    ) -> Option<ValidationCheck> {
        if next_update >= now {
            return None
        }

        // Days beyond what a time can represent mean no limit at all.
        let within_grace = match Duration::try_days(
            i64::from(self.max_stale_days)
        ) {
            Some(grace) => now.signed_duration_since(*next_update) <= grace,
            None => true,
        };
        if within_grace {
            Some(ValidationCheck::warning(format!(
                "{} is stale since {}", what, next_update.to_rfc3339()
            )))
        }
        else if self.loose {
            Some(ValidationCheck::warning(format!(
                "{} is stale since {}, more than {} days",
                what, next_update.to_rfc3339(), self.max_stale_days
            )))
        }
        else {
            Some(ValidationCheck::error(format!(
                "{} is stale since {}, more than {} days",
                what, next_update.to_rfc3339(), self.max_stale_days
            )))
        }
    }
}


//------------ Tests --------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::checks::CheckStatus;

    fn days_ago(days: i64) -> Time {
        Time::now() - Duration::days(days)
    }

    #[test]
    fn current_objects_pass() {
        let options = ValidationOptions::default();
        assert_eq!(
            options.check_stale("manifest", Time::tomorrow(), Time::now()),
            None
        );
    }

    #[test]
    fn stale_within_grace_is_warning() {
        let options = ValidationOptions::new(3, false, false);
        let check = options.check_stale(
            "manifest", days_ago(2), Time::now()
        ).unwrap();
        assert_eq!(check.status(), CheckStatus::Warning);
    }

    #[test]
    fn stale_beyond_grace_depends_on_mode() {
        let strict = ValidationOptions::new(1, false, false);
        let check = strict.check_stale("CRL", days_ago(5), Time::now());
        assert_eq!(check.unwrap().status(), CheckStatus::Error);

        let loose = ValidationOptions::new(1, true, false);
        let check = loose.check_stale("CRL", days_ago(5), Time::now());
        assert_eq!(check.unwrap().status(), CheckStatus::Warning);
    }

    #[test]
    fn huge_grace_never_overflows() {
        let options = ValidationOptions::new(u32::MAX, false, false);
        for days in [1, 10_000, 1_000_000] {
            let check = options.check_stale(
                "manifest", days_ago(days), Time::now()
            );
            assert_eq!(check.unwrap().status(), CheckStatus::Warning);
        }
    }
}
