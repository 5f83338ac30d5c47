//! Caching client facade for the UFDS directory service.
//!
//! UFDS is an LDAP directory holding accounts together with their SSH keys
//! and per-datacenter provisioning limits. This crate wraps the raw
//! directory protocol behind a domain-typed API: a bounded read-through
//! search cache that any successful write invalidates wholesale, an
//! identifier resolver that races the login and uuid interpretations of an
//! ambiguous input, and a total translation of backend result codes into
//! the domain error taxonomy.
//!
//! [`UfdsClient`] is the entry point; [`BoundAccount`] carries the key and
//! limit sub-operations scoped to a fetched account.

#![deny(missing_docs)]

mod account;
mod cache;
mod client;
mod config;
mod dn;
mod facade;
mod key;
mod limit;
mod resolver;
mod translate;
mod transport;

pub use account::{Account, AccountChanges, NewAccount, ADMIN_GROUP, OBJECTCLASS_ACCOUNT};
pub use cache::{
    CacheOptions, CacheStats, DEFAULT_CACHE_MAX_AGE_SECS, DEFAULT_CACHE_MAX_ENTRIES,
};
pub use client::DirectoryClient;
pub use config::{
    BindCredentials, UfdsConfig, DEFAULT_BASE_DN, DEFAULT_CONNECTION_TIMEOUT_SECS,
    DEFAULT_OPERATION_TIMEOUT_SECS,
};
pub use dn::{DistinguishedName, DnError, Rdn};
pub use facade::{BoundAccount, UfdsClient};
pub use key::{fingerprint, NewKey, SshKey, OBJECTCLASS_KEY};
pub use limit::{Limit, NewLimit, OBJECTCLASS_LIMIT};
pub use resolver::{AccountIdentifier, AccountResolver};
pub use transport::{
    AttributeMap, DirectoryTransport, Entry, LdapTransport, Modification, SearchScope,
    TransportError, TransportResult,
};

pub use ufds_core::error::{Error, ErrorDetail, ErrorResponse};
pub use ufds_core::uuid::AccountUuid;

/// Convenient result alias that reuses the core error type.
pub type Result<T> = ufds_core::Result<T>;
