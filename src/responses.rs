//! captured server responses and per-attempt outcomes
use std::borrow::Cow;
use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use crate::error::{SiegelineError, TransportErrorKind};
use crate::generator::Attempt;

/// everything the engine keeps of a server's response
///
/// the body is read eagerly so classification never touches the network
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[non_exhaustive]
pub struct AttemptResponse {
    status_code: u16,
    headers: HashMap<String, Vec<u8>>,
    body: Vec<u8>,
}

impl AttemptResponse {
    /// create an `AttemptResponse` directly from its parts
    #[must_use]
    pub fn new(status_code: u16, headers: HashMap<String, Vec<u8>>, body: Vec<u8>) -> Self {
        Self {
            status_code,
            headers,
            body,
        }
    }

    /// Create an `AttemptResponse` by consuming a [`reqwest::Response`]
    ///
    /// # Errors
    ///
    /// returns an error if the response body can't be read
    #[instrument(skip_all, level = "trace")]
    pub async fn try_from_reqwest_response(
        resp: reqwest::Response,
    ) -> Result<Self, SiegelineError> {
        let status_code = resp.status().as_u16();

        let headers = resp
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
            .collect();

        let body = resp.bytes().await.map_err(|source| {
            error!(?source, "could not read response body");
            SiegelineError::ResponseReadError { source }
        })?;

        Ok(Self {
            status_code,
            headers,
            body: body.to_vec(),
        })
    }

    /// get the status code
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.status_code
    }

    /// get a reference to the headers
    #[must_use]
    pub const fn headers(&self) -> &HashMap<String, Vec<u8>> {
        &self.headers
    }

    /// get a reference to the raw body
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// get the body length in bytes
    #[must_use]
    pub fn content_length(&self) -> usize {
        self.body.len()
    }

    /// get the body as text, lossily converted where it isn't valid utf-8
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// what one execution of an attempt produced
///
/// a response and a transport error are mutually exclusive by construction
#[derive(Clone, Debug)]
pub enum AttemptResult {
    /// the server answered; any status code counts, classification decides
    /// what it means
    Response(AttemptResponse),

    /// the request never completed: connect failure, timeout, dns failure...
    /// eligible for bounded requeueing
    Transport {
        /// what category of transport failure occurred
        kind: TransportErrorKind,

        /// the underlying error message, for the per-attempt log line
        message: String,
    },
}

/// a processed attempt: the attempt itself, how long the network call took,
/// and what came back
#[derive(Clone, Debug)]
pub struct Outcome {
    /// the attempt that was executed
    pub attempt: Attempt,

    /// wall time measured strictly around the network call; the configured
    /// inter-request delay is applied after measurement and never shows
    /// up here
    pub elapsed: Duration,

    /// the response or the transport failure
    pub result: AttemptResult,
}

impl Outcome {
    /// true when this outcome carries a transport failure
    #[must_use]
    pub const fn is_transport_error(&self) -> bool {
        matches!(self.result, AttemptResult::Transport { .. })
    }
}
