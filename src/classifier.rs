//! decides whether a response counts as a successful attempt
use std::time::Duration;

use regex::bytes::Regex;
use tracing::error;

use crate::error::SiegelineError;
use crate::responses::AttemptResponse;

/// the configured success predicates
///
/// every criterion is optional. `classify` checks them in a fixed priority
/// order -- regex, include-text, exclude-text, status code, exact length,
/// minimum time -- and the first satisfied criterion decides success; a
/// criterion that is configured but unsatisfied defers to the remaining
/// ones. With nothing configured every response is a failure.
///
/// classification is total: it cannot fail and it never touches the network
///
/// # Examples
///
/// ```
/// # use std::collections::HashMap;
/// # use std::time::Duration;
/// # use siegeline::classifier::SuccessCriteria;
/// # use siegeline::responses::AttemptResponse;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let criteria = SuccessCriteria::new().include_text("Welcome");
///
/// let response = AttemptResponse::new(200, HashMap::new(), b"Welcome back!".to_vec());
///
/// assert!(criteria.classify(&response, Duration::from_millis(80)));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct SuccessCriteria {
    regex: Option<Regex>,
    include_text: Option<String>,
    exclude_text: Option<String>,
    status_code: Option<u16>,
    exact_length: Option<usize>,
    min_time: Option<Duration>,
}

impl SuccessCriteria {
    /// create a new `SuccessCriteria` with no criteria configured
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// success when the response body matches the given pattern
    ///
    /// the pattern is matched against the raw body bytes
    ///
    /// # Errors
    ///
    /// returns an error when the pattern doesn't compile
    pub fn regex(mut self, pattern: &str) -> Result<Self, SiegelineError> {
        let compiled = Regex::new(pattern).map_err(|source| {
            error!(%pattern, "could not compile the success regex");

            SiegelineError::InvalidRegex {
                source,
                pattern: pattern.to_string(),
            }
        })?;

        self.regex = Some(compiled);
        Ok(self)
    }

    /// success when the given text is a substring of the response body
    #[must_use]
    pub fn include_text(mut self, text: &str) -> Self {
        self.include_text = Some(text.to_string());
        self
    }

    /// success when the given text is NOT a substring of the response body
    #[must_use]
    pub fn exclude_text(mut self, text: &str) -> Self {
        self.exclude_text = Some(text.to_string());
        self
    }

    /// success when the response status equals the given code
    #[must_use]
    pub const fn status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    /// success when the response body is exactly this many bytes long
    #[must_use]
    pub const fn exact_length(mut self, length: usize) -> Self {
        self.exact_length = Some(length);
        self
    }

    /// success when the measured elapsed time is at least this long
    #[must_use]
    pub const fn min_time(mut self, duration: Duration) -> Self {
        self.min_time = Some(duration);
        self
    }

    /// true when at least one criterion is configured
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.regex.is_some()
            || self.include_text.is_some()
            || self.exclude_text.is_some()
            || self.status_code.is_some()
            || self.exact_length.is_some()
            || self.min_time.is_some()
    }

    /// apply the configured criteria to a response and its elapsed time
    #[must_use]
    pub fn classify(&self, response: &AttemptResponse, elapsed: Duration) -> bool {
        if let Some(regex) = &self.regex {
            if regex.is_match(response.body()) {
                return true;
            }
        }

        if let Some(text) = &self.include_text {
            if response.text().contains(text.as_str()) {
                return true;
            }
        }

        if let Some(text) = &self.exclude_text {
            if !response.text().contains(text.as_str()) {
                return true;
            }
        }

        if let Some(code) = self.status_code {
            if response.status_code() == code {
                return true;
            }
        }

        if let Some(length) = self.exact_length {
            if response.content_length() == length {
                return true;
            }
        }

        if let Some(min_time) = self.min_time {
            if elapsed >= min_time {
                return true;
            }
        }

        false
    }
}
