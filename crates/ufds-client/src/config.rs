//! Configuration for the directory client facade.

use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::cache::CacheOptions;
use crate::dn::{DistinguishedName, Rdn};
use ufds_core::Result;

/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
/// Default operation timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 15;
/// Default directory root.
pub const DEFAULT_BASE_DN: &str = "o=smartdc";

/// Principal and secret used to bind to the directory service.
#[derive(Debug, Clone)]
pub struct BindCredentials {
    bind_dn: String,
    password: SecretString,
}

impl BindCredentials {
    /// Creates new bind credentials.
    #[must_use]
    pub fn new(bind_dn: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            bind_dn: bind_dn.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Returns the bind principal DN.
    #[must_use]
    pub fn dn(&self) -> &str {
        &self.bind_dn
    }

    /// Returns the bind secret.
    #[must_use]
    pub const fn password(&self) -> &SecretString {
        &self.password
    }
}

/// Configuration for connecting to the directory service.
#[derive(Debug, Clone)]
pub struct UfdsConfig {
    url: String,
    credentials: Option<BindCredentials>,
    base_dn: DistinguishedName,
    users_base_dn: DistinguishedName,
    cache: Option<CacheOptions>,
    tls_verify: bool,
    tls_ca_cert: Option<PathBuf>,
    connection_timeout_secs: u64,
    operation_timeout_secs: u64,
}

impl UfdsConfig {
    /// Creates a new configuration for the given directory URL.
    ///
    /// Caching is enabled with default bounds; no bind credentials are set,
    /// which leaves the client in the distinguishable not-ready state until
    /// [`UfdsConfig::with_credentials`] supplies them.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url_string = url.into();
        Url::parse(&url_string)?;

        let base_dn = DistinguishedName::parse(DEFAULT_BASE_DN)?;
        let users_base_dn = base_dn.child(Rdn::new("ou", "users"));
        Ok(Self {
            url: url_string,
            credentials: None,
            base_dn,
            users_base_dn,
            cache: Some(CacheOptions::new()),
            tls_verify: true,
            tls_ca_cert: None,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
        })
    }

    /// Returns the directory endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the bind credentials, if configured.
    #[must_use]
    pub const fn credentials(&self) -> Option<&BindCredentials> {
        self.credentials.as_ref()
    }

    /// Returns the directory root.
    #[must_use]
    pub const fn base_dn(&self) -> &DistinguishedName {
        &self.base_dn
    }

    /// Returns the base of the account collection.
    #[must_use]
    pub const fn users_base_dn(&self) -> &DistinguishedName {
        &self.users_base_dn
    }

    /// Returns the cache bounds, or `None` when caching is disabled.
    #[must_use]
    pub const fn cache_options(&self) -> Option<CacheOptions> {
        self.cache
    }

    /// Returns the connection timeout duration.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Returns the operation timeout duration.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Returns whether TLS certificate verification is enabled.
    #[must_use]
    pub const fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// Optional custom CA certificate path.
    #[must_use]
    pub const fn tls_ca_cert(&self) -> Option<&PathBuf> {
        self.tls_ca_cert.as_ref()
    }

    /// Sets the bind credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: BindCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Overrides the directory root and recomputes the account collection
    /// base beneath it.
    #[must_use]
    pub fn with_base_dn(mut self, base_dn: DistinguishedName) -> Self {
        self.users_base_dn = base_dn.child(Rdn::new("ou", "users"));
        self.base_dn = base_dn;
        self
    }

    /// Overrides the account collection base.
    #[must_use]
    pub fn with_users_base_dn(mut self, users_base_dn: DistinguishedName) -> Self {
        self.users_base_dn = users_base_dn;
        self
    }

    /// Overrides the cache bounds.
    #[must_use]
    pub const fn with_cache_options(mut self, options: CacheOptions) -> Self {
        self.cache = Some(options);
        self
    }

    /// Disables result caching; every read goes to the transport.
    #[must_use]
    pub const fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    /// Enables or disables TLS certificate verification.
    #[must_use]
    pub const fn with_tls_verification(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Sets the custom CA certificate path for TLS verification.
    #[must_use]
    pub fn with_tls_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Overrides the connection timeout in seconds.
    #[must_use]
    pub const fn with_connection_timeout_secs(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }

    /// Overrides the operation timeout in seconds.
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }
}
