//! Directory transport boundary.
//!
//! [`DirectoryTransport`] is the only seam between the facade and the wire
//! protocol. Everything above it works with [`Entry`] snapshots and the
//! protocol-agnostic [`TransportError`]; the `ldap3`-backed implementation
//! lives at the bottom of this module.

use async_trait::async_trait;
use ldap3::{LdapConnAsync, LdapConnSettings, Mod, Scope, SearchEntry};
use native_tls::{Certificate, TlsConnector};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;
use ufds_core::error::Error as CoreError;

use crate::config::UfdsConfig;

/// Attribute map carried by directory entries and add operations.
pub type AttributeMap = HashMap<String, Vec<String>>;

/// Search scope for directory queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    Subtree,
}

impl SearchScope {
    /// Short tag used when building canonical cache keys.
    #[must_use]
    pub(crate) const fn tag(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::OneLevel => "one",
            Self::Subtree => "sub",
        }
    }
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// Immutable snapshot of a directory entry as fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute map (value order preserved from the server).
    pub attributes: AttributeMap,
}

impl Entry {
    /// Returns the first value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.attributes
            .get(attribute)
            .and_then(|values| values.first().map(String::as_str))
    }

    /// Returns all values for the attribute.
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes.get(attribute).map(Vec::as_slice)
    }

    /// Parses the attribute as boolean (`true` / `1`).
    #[must_use]
    pub fn bool_value(&self, attribute: &str) -> bool {
        self.first(attribute)
            .map(|value| value.eq_ignore_ascii_case("true") || value == "1")
            .unwrap_or(false)
    }
}

/// Change to a single attribute of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modification {
    /// Add attribute values.
    Add {
        /// Attribute to modify.
        attribute: String,
        /// Values to add.
        values: Vec<String>,
    },
    /// Delete attribute values.
    Delete {
        /// Attribute to modify.
        attribute: String,
        /// Values to delete (empty removes the attribute).
        values: Vec<String>,
    },
    /// Replace attribute values.
    Replace {
        /// Attribute to modify.
        attribute: String,
        /// Replacement values.
        values: Vec<String>,
    },
}

/// Protocol-level failure reported by the transport.
///
/// Carries the machine-readable result code when the backend produced one,
/// so the translator can map it onto the domain taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The backend processed the request and rejected it.
    #[error("directory result code {code}: {message}")]
    Directory {
        /// Protocol result code.
        code: u32,
        /// Diagnostic message from the backend.
        message: String,
    },
    /// The request never completed (connection loss, timeout).
    #[error("directory connection failure: {0}")]
    Connection(String),
}

/// Result alias for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Asynchronous boundary to the remote directory service.
///
/// One method per wire primitive; no caching, no translation, no retries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryTransport: Send + Sync {
    /// Authenticates as the given principal.
    async fn bind(&self, dn: &str, password: &str) -> TransportResult<()>;

    /// Searches below `base` and returns matching entries.
    async fn search(
        &self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> TransportResult<Vec<Entry>>;

    /// Creates an entry at `dn`.
    async fn add(&self, dn: &str, attributes: &AttributeMap) -> TransportResult<()>;

    /// Applies a change list to the entry at `dn`.
    async fn modify(&self, dn: &str, modifications: &[Modification]) -> TransportResult<()>;

    /// Removes the entry at `dn`.
    async fn delete(&self, dn: &str) -> TransportResult<()>;

    /// Compares an attribute value server-side without reading it back.
    async fn compare(&self, dn: &str, attribute: &str, value: &str) -> TransportResult<bool>;
}

/// Escapes a value for embedding in a search filter.
#[must_use]
pub fn escape_filter(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Real transport backed by `ldap3`.
///
/// The underlying handle multiplexes operations over a single connection;
/// cloning it per call keeps the trait methods `&self`.
pub struct LdapTransport {
    ldap: ldap3::Ldap,
    operation_timeout: Duration,
}

impl LdapTransport {
    /// Opens a connection to the directory service described by `config`.
    ///
    /// Does not bind; authentication is driven by the client above.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigError`] for TLS setup problems and
    /// [`CoreError::Internal`] when the connection cannot be established.
    pub async fn connect(config: &UfdsConfig) -> ufds_core::Result<Self> {
        let settings = build_settings(config)?;
        let (conn, ldap) = LdapConnAsync::with_settings(settings, config.url())
            .await
            .map_err(|err| CoreError::Internal(format!("directory connect failed: {err}")))?;
        ldap3::drive!(conn);
        debug!(url = config.url(), "connected to directory service");
        Ok(Self {
            ldap,
            operation_timeout: config.operation_timeout(),
        })
    }

    async fn with_timeout<F, T>(&self, what: &str, fut: F) -> TransportResult<T>
    where
        F: std::future::Future<Output = std::result::Result<T, ldap3::LdapError>>,
    {
        timeout(self.operation_timeout, fut)
            .await
            .map_err(|_| TransportError::Connection(format!("{what} timed out")))?
            .map_err(wire_error)
    }
}

#[async_trait]
impl DirectoryTransport for LdapTransport {
    async fn bind(&self, dn: &str, password: &str) -> TransportResult<()> {
        let mut ldap = self.ldap.clone();
        let result = self
            .with_timeout("bind", ldap.simple_bind(dn, password))
            .await?;
        ensure_success(result)
    }

    async fn search(
        &self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> TransportResult<Vec<Entry>> {
        let mut ldap = self.ldap.clone();
        let result = self
            .with_timeout(
                "search",
                ldap.search(base, scope.into(), filter, attributes.to_vec()),
            )
            .await?;
        let (entries, _) = result.success().map_err(wire_error)?;
        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| Entry {
                dn: entry.dn,
                attributes: entry.attrs,
            })
            .collect())
    }

    async fn add(&self, dn: &str, attributes: &AttributeMap) -> TransportResult<()> {
        let attrs: Vec<(String, HashSet<String>)> = attributes
            .iter()
            .map(|(attribute, values)| (attribute.clone(), values.iter().cloned().collect()))
            .collect();
        let mut ldap = self.ldap.clone();
        let result = self.with_timeout("add", ldap.add(dn, attrs)).await?;
        ensure_success(result)
    }

    async fn modify(&self, dn: &str, modifications: &[Modification]) -> TransportResult<()> {
        let mods: Vec<Mod<String>> = modifications
            .iter()
            .map(|modification| match modification {
                Modification::Add { attribute, values } => {
                    Mod::Add(attribute.clone(), values.iter().cloned().collect())
                }
                Modification::Delete { attribute, values } => {
                    Mod::Delete(attribute.clone(), values.iter().cloned().collect())
                }
                Modification::Replace { attribute, values } => {
                    Mod::Replace(attribute.clone(), values.iter().cloned().collect())
                }
            })
            .collect();
        let mut ldap = self.ldap.clone();
        let result = self.with_timeout("modify", ldap.modify(dn, mods)).await?;
        ensure_success(result)
    }

    async fn delete(&self, dn: &str) -> TransportResult<()> {
        let mut ldap = self.ldap.clone();
        let result = self.with_timeout("delete", ldap.delete(dn)).await?;
        ensure_success(result)
    }

    async fn compare(&self, dn: &str, attribute: &str, value: &str) -> TransportResult<bool> {
        let mut ldap = self.ldap.clone();
        let result = self
            .with_timeout("compare", ldap.compare(dn, attribute, value.as_bytes()))
            .await?;
        result.equal().map_err(wire_error)
    }
}

fn build_settings(config: &UfdsConfig) -> ufds_core::Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new().set_conn_timeout(config.connection_timeout());

    if !config.tls_verify() {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| {
                CoreError::ConfigError(format!("failed to construct TLS connector: {err}"))
            })?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = config.tls_ca_cert() {
        let pem = fs::read(cert_path).map_err(|err| {
            CoreError::ConfigError(format!(
                "failed to read CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem)
            .map_err(|err| CoreError::ConfigError(format!("invalid CA certificate: {err}")))?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| CoreError::ConfigError(format!("failed to load CA certificate: {err}")))?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

fn wire_error(err: ldap3::LdapError) -> TransportError {
    match err {
        ldap3::LdapError::LdapResult { result } => TransportError::Directory {
            code: result.rc,
            message: result.text,
        },
        other => TransportError::Connection(other.to_string()),
    }
}

fn ensure_success(result: ldap3::LdapResult) -> TransportResult<()> {
    if result.rc == 0 {
        Ok(())
    } else {
        Err(TransportError::Directory {
            code: result.rc,
            message: result.text,
        })
    }
}
