//! shared credential state and the login exchange that refreshes it
use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::header::SET_COOKIE;
use tracing::{error, info, instrument};
use url::Url;

use crate::error::SiegelineError;

/// where the rotated credential is injected on outgoing attempts
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialPlacement {
    /// sent as a cookie with the given name
    Cookie(String),

    /// sent as a header with the given name
    Header(String),
}

/// the authentication material shared by all workers
///
/// `generation` counts rotations; it starts at 0 (nothing held yet) and is
/// bumped on every successful login exchange
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct CredentialState {
    value: String,
    generation: u64,
}

/// a point-in-time copy of the credential, captured at dispatch
///
/// an in-flight attempt keeps the snapshot it captured even if a rotation
/// happens mid-request; readers never block a rotation and vice versa beyond
/// the instant of the copy
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialSnapshot {
    value: String,
    generation: u64,
}

impl CredentialSnapshot {
    /// create a snapshot directly from its parts
    #[must_use]
    pub fn new(value: &str, generation: u64) -> Self {
        Self {
            value: value.to_string(),
            generation,
        }
    }

    /// the credential value
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// which rotation produced this value
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

/// holds the current credential; written only by the [`Authenticator`],
/// read by everyone else via [`CredentialStore::snapshot`]
#[derive(Clone, Debug, Default)]
pub struct CredentialStore {
    inner: Arc<RwLock<CredentialState>>,
}

impl CredentialStore {
    /// create a new, empty `CredentialStore`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// capture a point-in-time copy of the credential
    ///
    /// the lock is held only for the duration of the clone
    #[must_use]
    pub fn snapshot(&self) -> CredentialSnapshot {
        // a poisoned lock means a writer panicked mid-rotation; the stored
        // value is a plain String, so the data itself can't be torn
        let guard = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);

        CredentialSnapshot {
            value: guard.value.clone(),
            generation: guard.generation,
        }
    }

    /// replace the credential and bump its generation; returns the new
    /// generation
    fn rotate(&self, value: String) -> u64 {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        guard.value = value;
        guard.generation += 1;
        guard.generation
    }
}

/// the rotator's lifecycle
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthState {
    /// no login exchange has happened yet
    #[default]
    Unauthenticated,

    /// the credential store holds a usable credential
    Authenticated,

    /// a login exchange is in progress
    Reauthenticating,

    /// a login exchange failed; terminal, the run is over
    Failed,
}

/// configuration for the login exchange
#[derive(Clone, Debug)]
pub struct AuthConfig {
    login_url: Url,
    username: String,
    password: String,
    headers: Vec<(String, String)>,
    cookie_name: String,
    timeout: Duration,
    proxy: Option<String>,
    skip_tls_verify: bool,
}

impl AuthConfig {
    /// create a new `AuthConfig`
    ///
    /// the cookie extracted from the login response defaults to `session`;
    /// override it with [`AuthConfig::cookie_name`]
    ///
    /// # Errors
    ///
    /// returns an error when the login url can't be parsed
    pub fn new(login_url: &str, username: &str, password: &str) -> Result<Self, SiegelineError> {
        let parsed = Url::parse(login_url).map_err(|source| {
            error!(url = %login_url, "could not parse the login url");

            SiegelineError::InvalidUrl {
                source,
                url: login_url.to_string(),
            }
        })?;

        Ok(Self {
            login_url: parsed,
            username: username.to_string(),
            password: password.to_string(),
            headers: Vec::new(),
            cookie_name: String::from("session"),
            timeout: Duration::from_secs(20),
            proxy: None,
            skip_tls_verify: false,
        })
    }

    /// add an extra header to every login request, i.e. a Host override
    #[must_use]
    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    /// name of the cookie to extract from the login response
    #[must_use]
    pub fn cookie_name(mut self, name: &str) -> Self {
        self.cookie_name = name.to_string();
        self
    }

    /// set the login request timeout
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// route login requests through the given proxy
    #[must_use]
    pub fn proxy(mut self, proxy_url: &str) -> Self {
        self.proxy = Some(proxy_url.to_string());
        self
    }

    /// skip tls certificate verification for login requests
    #[must_use]
    pub const fn skip_tls_verify(mut self) -> Self {
        self.skip_tls_verify = true;
        self
    }
}

/// performs login exchanges and rotates the shared credential
///
/// rotations are mutually exclusive by construction: the scheduler invokes
/// [`Authenticator::authenticate`] synchronously from its completion loop,
/// so at most one exchange runs at a time
#[derive(Debug)]
pub struct Authenticator {
    config: AuthConfig,
    client: reqwest::Client,
    state: AuthState,
}

impl Authenticator {
    /// create a new `Authenticator`
    ///
    /// the login client never follows redirects, so a `Set-Cookie` on a 302
    /// login response is still observed
    ///
    /// # Errors
    ///
    /// returns an error when the underlying client can't be built
    pub fn new(config: AuthConfig) -> Result<Self, SiegelineError> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(config.skip_tls_verify);

        if let Some(proxy_url) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|source| SiegelineError::ClientBuildError { source })?;

            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|source| SiegelineError::ClientBuildError { source })?;

        Ok(Self {
            config,
            client,
            state: AuthState::Unauthenticated,
        })
    }

    /// current position in the rotation lifecycle
    #[must_use]
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// name of the cookie the login exchange extracts
    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.config.cookie_name
    }

    /// perform one login exchange and publish the extracted credential into
    /// the given store
    ///
    /// success returns to `Authenticated`; failure lands in the terminal
    /// `Failed` state and the error is returned for the caller to act on
    /// (abort at startup, cancel the run at rotation time)
    ///
    /// # Errors
    ///
    /// returns an error when the exchange can't complete, the server rejects
    /// it with a 4xx/5xx, or the expected cookie is missing from the response
    #[instrument(skip_all, fields(url = %self.config.login_url), level = "trace")]
    pub async fn authenticate(&mut self, store: &CredentialStore) -> Result<(), SiegelineError> {
        if self.state == AuthState::Authenticated {
            self.state = AuthState::Reauthenticating;
        }

        match self.login().await {
            Ok(value) => {
                let generation = store.rotate(value);

                info!(%generation, "login exchange succeeded; credential rotated");

                self.state = AuthState::Authenticated;
                Ok(())
            }
            Err(error) => {
                self.state = AuthState::Failed;
                Err(error)
            }
        }
    }

    /// the exchange itself: POST the credentials form, pull the named cookie
    /// out of the response
    async fn login(&self) -> Result<String, SiegelineError> {
        let form = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];

        let mut builder = self.client.post(self.config.login_url.clone()).form(&form);

        for (key, value) in &self.config.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|source| {
            error!(%source, "login request failed");

            SiegelineError::AuthRequestError {
                url: self.config.login_url.to_string(),
                message: source.to_string(),
            }
        })?;

        let status = response.status();

        if status.is_client_error() || status.is_server_error() {
            error!(status = status.as_u16(), "login was rejected");

            return Err(SiegelineError::AuthRejected {
                url: self.config.login_url.to_string(),
                status: status.as_u16(),
            });
        }

        for header in response.headers().get_all(SET_COOKIE) {
            let Ok(raw) = header.to_str() else {
                continue;
            };

            // `name=value; Path=/; HttpOnly` -> ("name", "value")
            let Some((name, value)) = raw.split(';').next().and_then(|pair| pair.split_once('='))
            else {
                continue;
            };

            if name.trim() == self.config.cookie_name {
                return Ok(value.trim().to_string());
            }
        }

        error!(
            cookie = %self.config.cookie_name,
            "login response did not set the expected cookie"
        );

        Err(SiegelineError::AuthCookieMissing {
            cookie: self.config.cookie_name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn snapshots_reflect_rotations() {
        let store = CredentialStore::new();

        let before = store.snapshot();
        assert_eq!(before.generation(), 0);
        assert_eq!(before.value(), "");

        store.rotate("first".to_string());
        store.rotate("second".to_string());

        let after = store.snapshot();
        assert_eq!(after.generation(), 2);
        assert_eq!(after.value(), "second");

        // the earlier snapshot is untouched by the rotations
        assert_eq!(before.generation(), 0);
    }

    #[tokio::test]
    async fn successful_login_rotates_the_store() {
        let server = MockServer::start_async().await;
        let mocked = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/login")
                    .body_contains("username=admin")
                    .body_contains("password=hunter2");
                then.status(200)
                    .header("set-cookie", "session=fresh-token; Path=/; HttpOnly");
            })
            .await;

        let store = CredentialStore::new();
        let config = AuthConfig::new(&server.url("/login"), "admin", "hunter2").unwrap();
        let mut authenticator = Authenticator::new(config).unwrap();

        assert_eq!(authenticator.state(), AuthState::Unauthenticated);

        authenticator.authenticate(&store).await.unwrap();

        mocked.assert_async().await;
        assert_eq!(authenticator.state(), AuthState::Authenticated);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.value(), "fresh-token");
        assert_eq!(snapshot.generation(), 1);
    }

    #[tokio::test]
    async fn each_rotation_bumps_the_generation() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/login");
                then.status(200).header("set-cookie", "session=tok");
            })
            .await;

        let store = CredentialStore::new();
        let config = AuthConfig::new(&server.url("/login"), "u", "p").unwrap();
        let mut authenticator = Authenticator::new(config).unwrap();

        authenticator.authenticate(&store).await.unwrap();
        authenticator.authenticate(&store).await.unwrap();

        assert_eq!(store.snapshot().generation(), 2);
        assert_eq!(authenticator.state(), AuthState::Authenticated);
    }

    #[tokio::test]
    async fn rejected_login_is_terminal() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/login");
                then.status(403);
            })
            .await;

        let store = CredentialStore::new();
        let config = AuthConfig::new(&server.url("/login"), "u", "p").unwrap();
        let mut authenticator = Authenticator::new(config).unwrap();

        let result = authenticator.authenticate(&store).await;

        assert!(matches!(result, Err(SiegelineError::AuthRejected { status: 403, .. })));
        assert_eq!(authenticator.state(), AuthState::Failed);
        assert_eq!(store.snapshot().generation(), 0);
    }

    #[tokio::test]
    async fn missing_cookie_is_an_authentication_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/login");
                then.status(200).header("set-cookie", "other=value");
            })
            .await;

        let store = CredentialStore::new();
        let config = AuthConfig::new(&server.url("/login"), "u", "p").unwrap();
        let mut authenticator = Authenticator::new(config).unwrap();

        let result = authenticator.authenticate(&store).await;

        assert!(matches!(
            result,
            Err(SiegelineError::AuthCookieMissing { .. })
        ));
        assert_eq!(authenticator.state(), AuthState::Failed);
    }

    #[tokio::test]
    async fn configured_cookie_name_and_headers_are_used() {
        let server = MockServer::start_async().await;
        let mocked = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/login")
                    .header("host-override", "auth.internal");
                then.status(200)
                    .header("set-cookie", "sid=custom-token; Secure")
                    .header("set-cookie", "session=decoy");
            })
            .await;

        let store = CredentialStore::new();
        let config = AuthConfig::new(&server.url("/login"), "u", "p")
            .unwrap()
            .cookie_name("sid")
            .header("Host-Override", "auth.internal");
        let mut authenticator = Authenticator::new(config).unwrap();

        authenticator.authenticate(&store).await.unwrap();

        mocked.assert_async().await;
        assert_eq!(store.snapshot().value(), "custom-token");
    }

    #[tokio::test]
    async fn unreachable_login_endpoint_is_an_authentication_failure() {
        let store = CredentialStore::new();
        let config = AuthConfig::new("http://127.0.0.1:1/login", "u", "p")
            .unwrap()
            .timeout(Duration::from_secs(2));
        let mut authenticator = Authenticator::new(config).unwrap();

        let result = authenticator.authenticate(&store).await;

        assert!(matches!(
            result,
            Err(SiegelineError::AuthRequestError { .. })
        ));
        assert_eq!(authenticator.state(), AuthState::Failed);
    }
}
