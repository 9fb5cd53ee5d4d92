//! sends one attempt over the wire and captures whatever happens
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use reqwest::Method;
use tracing::{error, instrument, trace};
use url::Url;

use crate::auth::{CredentialPlacement, CredentialSnapshot};
use crate::error::{SiegelineError, TransportErrorKind};
use crate::generator::Attempt;
use crate::payload::FieldTarget;
use crate::responses::{AttemptResponse, AttemptResult, Outcome};

/// everything needed to turn a payload into an http request
#[derive(Clone, Debug)]
pub struct TargetConfig {
    url: Url,
    method: Method,
    timeout: Duration,
    delay: Duration,
    json_body: bool,
    proxy: Option<String>,
    skip_tls_verify: bool,
    credential: Option<CredentialPlacement>,
}

impl TargetConfig {
    /// create a new `TargetConfig` aimed at the given url
    ///
    /// defaults: POST, 20 second timeout, no delay, form-encoded bodies,
    /// no proxy, tls verification on
    ///
    /// # Errors
    ///
    /// returns an error when the url can't be parsed
    pub fn new(url: &str) -> Result<Self, SiegelineError> {
        let parsed = Url::parse(url).map_err(|source| {
            error!(%url, "could not parse the target url");

            SiegelineError::InvalidUrl {
                source,
                url: url.to_string(),
            }
        })?;

        Ok(Self {
            url: parsed,
            method: Method::POST,
            timeout: Duration::from_secs(20),
            delay: Duration::ZERO,
            json_body: false,
            proxy: None,
            skip_tls_verify: false,
            credential: None,
        })
    }

    /// set the http method
    ///
    /// # Errors
    ///
    /// returns an error when the given string isn't a valid method
    pub fn method(mut self, method: &str) -> Result<Self, SiegelineError> {
        self.method = Method::from_bytes(method.to_uppercase().as_bytes()).map_err(|_| {
            error!(%method, "could not parse the given http method");

            SiegelineError::MethodParseError {
                method: method.to_string(),
            }
        })?;

        Ok(self)
    }

    /// set the per-request timeout
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// set the inter-request delay, applied after the elapsed measurement
    #[must_use]
    pub const fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// send body-bearing requests as JSON instead of form-encoded
    #[must_use]
    pub const fn json_body(mut self) -> Self {
        self.json_body = true;
        self
    }

    /// route requests through the given proxy
    #[must_use]
    pub fn proxy(mut self, proxy_url: &str) -> Self {
        self.proxy = Some(proxy_url.to_string());
        self
    }

    /// skip tls certificate verification
    #[must_use]
    pub const fn skip_tls_verify(mut self) -> Self {
        self.skip_tls_verify = true;
        self
    }

    /// inject the rotated credential at the given placement on every attempt
    #[must_use]
    pub fn credential(mut self, placement: CredentialPlacement) -> Self {
        self.credential = Some(placement);
        self
    }

    /// get the target url
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// where the rotated credential will be injected, if anywhere
    #[must_use]
    pub const fn credential_placement(&self) -> Option<&CredentialPlacement> {
        self.credential.as_ref()
    }
}

/// executes attempts against the configured target
///
/// each executor owns its own [`reqwest::Client`] (and therefore its own
/// connection pool); the scheduler builds one per worker slot so attempts
/// routed to a slot reuse that slot's connections
#[derive(Clone, Debug)]
pub struct AttemptExecutor {
    client: reqwest::Client,
    config: TargetConfig,
}

impl AttemptExecutor {
    /// create a new `AttemptExecutor` for the given target
    ///
    /// # Errors
    ///
    /// returns an error when the underlying client can't be built, i.e. a
    /// tls backend failure or an unusable proxy url
    pub fn new(config: TargetConfig) -> Result<Self, SiegelineError> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.skip_tls_verify);

        if let Some(proxy_url) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|source| SiegelineError::ClientBuildError { source })?;

            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|source| SiegelineError::ClientBuildError { source })?;

        Ok(Self { client, config })
    }

    /// send the given attempt, using the credential snapshot captured at
    /// dispatch time
    ///
    /// this boundary is exception-free: every transport-level failure is
    /// captured into the returned [`Outcome`], never propagated. A non-2xx/3xx
    /// status is a normal response to be classified, not an error.
    #[instrument(skip_all, fields(%attempt.id), level = "trace")]
    pub async fn send(&self, attempt: Attempt, credential: Option<CredentialSnapshot>) -> Outcome {
        let mut headers: Vec<(String, String)> = Vec::new();
        let mut cookies: Vec<(String, String)> = Vec::new();
        let mut body: Vec<(String, String)> = Vec::new();

        for field in attempt.payload.fields() {
            let pair = (field.key.clone(), field.value.clone());

            match field.target {
                FieldTarget::Header => headers.push(pair),
                FieldTarget::Cookie => cookies.push(pair),
                FieldTarget::Body => body.push(pair),
            }
        }

        if let (Some(placement), Some(snapshot)) = (&self.config.credential, &credential) {
            trace!(generation = snapshot.generation(), "applying credential snapshot");

            match placement {
                CredentialPlacement::Cookie(name) => {
                    cookies.push((name.clone(), snapshot.value().to_string()));
                }
                CredentialPlacement::Header(name) => {
                    headers.push((name.clone(), snapshot.value().to_string()));
                }
            }
        }

        let mut builder = self
            .client
            .request(self.config.method.clone(), self.config.url.clone());

        // body-bearing methods carry the field map as a body; everything else
        // sends it as query parameters
        let body_bearing = [Method::POST, Method::PUT, Method::PATCH].contains(&self.config.method);

        if body_bearing {
            if self.config.json_body {
                let map: BTreeMap<&str, &str> = body
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.as_str()))
                    .collect();
                builder = builder.json(&map);
            } else {
                builder = builder.form(&body);
            }
        } else {
            builder = builder.query(&body);
        }

        for (key, value) in &headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        if !cookies.is_empty() {
            let cookie_header = cookies
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<String>>()
                .join("; ");

            builder = builder.header("Cookie", cookie_header);
        }

        // measure strictly around the network call, body read included; the
        // throttling delay below never pollutes the success-by-time criterion
        let now = Instant::now();

        let result = match builder.send().await {
            Ok(response) => match AttemptResponse::try_from_reqwest_response(response).await {
                Ok(captured) => AttemptResult::Response(captured),
                Err(_) => AttemptResult::Transport {
                    kind: TransportErrorKind::Body,
                    message: "could not read the response body".to_string(),
                },
            },
            Err(source) => AttemptResult::Transport {
                kind: transport_error_kind(&source),
                message: source.to_string(),
            },
        };

        let elapsed = now.elapsed();

        if !self.config.delay.is_zero() {
            tokio::time::sleep(self.config.delay).await;
        }

        Outcome {
            attempt,
            elapsed,
            result,
        }
    }
}

/// internal helper to categorize a [`reqwest::Error`]
fn transport_error_kind(source: &reqwest::Error) -> TransportErrorKind {
    if source.is_timeout() {
        // note: timeout is a more specific error than a connect or request
        // error and both can be true at the same time; don't reorder the
        // branches without thinking about the specificity of the error
        TransportErrorKind::Timeout
    } else if source.is_connect() {
        TransportErrorKind::Connect
    } else if source.is_body() {
        TransportErrorKind::Body
    } else if source.is_decode() {
        TransportErrorKind::Decode
    } else if source.is_redirect() {
        TransportErrorKind::Redirect
    } else if source.is_request() {
        TransportErrorKind::Request
    } else {
        TransportErrorKind::Unknown
    }
}
