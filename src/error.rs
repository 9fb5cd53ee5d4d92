//! Custom error-type definitions
use thiserror::Error;
use url::ParseError;

use serde::{Deserialize, Serialize};

/// primary error-type for the siegeline library
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SiegelineError {
    /// Represents a failure to open a file during wordlist creation.
    #[error("The wordlist file `{path}` couldn't be opened.")]
    WordlistFileOpenError {
        /// underlying source error-type
        source: std::io::Error,

        /// path to the file that couldn't be opened
        path: String,
    },

    /// Represents all other cases of `std::io::Error`.
    #[error(transparent)]
    IOError {
        /// underlying source error-type
        #[from]
        source: std::io::Error,
    },

    /// Represents a failure to parse the given string into a [`url::Url`](https://docs.rs/url/latest/url/struct.Url.html).
    #[error("The url `{url}` is invalid and couldn't be parsed.")]
    InvalidUrl {
        /// underlying source error-type
        source: ParseError,

        /// the url that couldn't be parsed
        url: String,
    },

    /// Represents a malformed field declaration, i.e. one that isn't
    /// `key=source` or `increment:key`
    #[error("Could not parse the field declaration `{declaration}`: {reason}")]
    FieldParseError {
        /// underlying reason for the parsing error
        reason: &'static str,

        /// the declaration that couldn't be parsed
        declaration: String,
    },

    /// Represents a malformed `generate:<charset>:<length>` source
    #[error("The generator spec `{spec}` is invalid: {reason}")]
    GeneratorSpecError {
        /// underlying reason for the rejection
        reason: &'static str,

        /// the spec that couldn't be parsed
        spec: String,
    },

    /// Represents a zip/product group member that doesn't name a varying field
    #[error("The field `{name}` named in the {group} group has no associated value source")]
    UnknownGroupField {
        /// name of the unmatched field
        name: String,

        /// which group referenced the field
        group: &'static str,
    },

    /// Represents a field declared more than once
    #[error("The field `{name}` was declared more than once")]
    DuplicateField {
        /// the repeated field name
        name: String,
    },

    /// Represents a field assigned to both combination groups
    #[error("The field `{name}` appears in both the zip and product groups")]
    OverlappingGroups {
        /// the doubly-assigned field name
        name: String,
    },

    /// Represents a failure to compile the user-supplied success regex
    #[error("The regex `{pattern}` is invalid and couldn't be compiled.")]
    InvalidRegex {
        /// underlying source error-type
        source: regex::Error,

        /// the pattern that couldn't be compiled
        pattern: String,
    },

    /// Represents a failure to generate a [`reqwest::Method`] from a string
    #[error("Could not parse the given http method `{method}`")]
    MethodParseError {
        /// the method that couldn't be parsed
        method: String,
    },

    /// Represents a failure to build the underlying [`reqwest::Client`]
    #[error("Could not build the http client")]
    ClientBuildError {
        /// underlying source error-type
        source: reqwest::Error,
    },

    /// Represents a failure to read the body of a [`reqwest::Response`] object
    #[error("Could not read the response body")]
    ResponseReadError {
        /// underlying source error-type
        source: reqwest::Error,
    },

    /// Represents a failure to serialize an object into JSON
    #[error("Could not convert the given object to JSON")]
    JSONParseError {
        /// underlying source error-type
        #[from]
        source: serde_json::Error,
    },

    /// Represents a login exchange that could not complete at the transport level
    #[error("Authentication request to `{url}` failed: {message}")]
    AuthRequestError {
        /// the login url
        url: String,

        /// the underlying error message
        message: String,
    },

    /// Represents a login exchange rejected by the server
    #[error("Authentication against `{url}` was rejected with status {status}")]
    AuthRejected {
        /// the login url
        url: String,

        /// the rejecting status code
        status: u16,
    },

    /// Represents a successful login exchange that didn't set the expected cookie
    #[error("Authentication response did not set a `{cookie}` cookie")]
    AuthCookieMissing {
        /// name of the cookie expected in the login response
        cookie: String,
    },

    /// Represents a run terminated because a credential rotation failed
    ///
    /// further attempts under a stale credential are assumed useless, so the
    /// scheduler stops dispatching and reports this once in-flight attempts drain
    #[error("Credential rotation failed; run aborted")]
    RotationFailed {
        /// the rotation failure that stopped the run
        source: Box<SiegelineError>,
    },
}

/// Used to differentiate between the types of transport-level failures seen
/// while sending requests.
///
/// That differentiation is then used internally to update the proper error
/// counts in [`Statistics`]
///
/// [`Statistics`]: crate::statistics::Statistics
#[derive(Serialize, Deserialize, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[non_exhaustive]
pub enum TransportErrorKind {
    /// Represents a failure to read a response body
    Body,

    /// Represents a failure during client connection to target
    Connect,

    /// Represents a failure to decode a response body
    Decode,

    /// Represents a failure related to redirection, i.e. too many redirects
    Redirect,

    /// Represents a failure related to the request itself
    Request,

    /// Represents a timeout during the request
    Timeout,

    /// Represents an unexpected error
    #[default]
    Unknown,
}
