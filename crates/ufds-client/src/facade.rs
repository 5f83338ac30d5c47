//! High-level directory facade.
//!
//! [`UfdsClient`] is the public entry point: it owns the caching
//! [`DirectoryClient`], the identifier-ambiguous [`AccountResolver`], and
//! exposes account, key, and limit operations in domain terms. Cloning is
//! cheap; clones share the connection, cache, and resolver.

use std::ops::Deref;
use std::sync::Arc;

use secrecy::ExposeSecret;
use tracing::info;
use validator::Validate;

use crate::account::{Account, AccountChanges, NewAccount};
use crate::client::DirectoryClient;
use crate::config::UfdsConfig;
use crate::dn::{account_dn, key_dn, limit_dn, DistinguishedName};
use crate::key::{self, NewKey, SshKey, OBJECTCLASS_KEY};
use crate::limit::{Limit, NewLimit, OBJECTCLASS_LIMIT};
use crate::resolver::{AccountIdentifier, AccountResolver};
use crate::transport::{escape_filter, DirectoryTransport, LdapTransport, SearchScope};
use ufds_core::error::Error;
use ufds_core::uuid::AccountUuid;
use ufds_core::Result;

struct Shared {
    directory: Arc<DirectoryClient>,
    resolver: AccountResolver,
    users_base: DistinguishedName,
    ready: bool,
}

/// Client for the directory service.
#[derive(Clone)]
pub struct UfdsClient {
    shared: Arc<Shared>,
}

impl UfdsClient {
    /// Connects to the directory service described by `config` and binds
    /// with the configured credentials.
    ///
    /// Without credentials the client comes up in a not-ready state: every
    /// operation fails with [`Error::NotReady`] until a client is built from
    /// a configuration that carries credentials.
    ///
    /// # Errors
    ///
    /// Returns an error when the connection or the initial bind fails.
    pub async fn connect(config: UfdsConfig) -> Result<Self> {
        let transport = Arc::new(LdapTransport::connect(&config).await?);
        Self::with_transport(config, transport).await
    }

    /// Builds a client over an already-constructed transport.
    ///
    /// # Errors
    ///
    /// Returns an error when the initial bind fails.
    pub async fn with_transport(
        config: UfdsConfig,
        transport: Arc<dyn DirectoryTransport>,
    ) -> Result<Self> {
        let directory = Arc::new(DirectoryClient::new(transport, config.cache_options()));
        let ready = match config.credentials() {
            Some(credentials) => {
                directory
                    .bind(credentials.dn(), credentials.password().expose_secret())
                    .await?;
                true
            }
            None => false,
        };

        let users_base = config.users_base_dn().clone();
        let resolver = AccountResolver::new(Arc::clone(&directory), users_base.clone());
        Ok(Self {
            shared: Arc::new(Shared {
                directory,
                resolver,
                users_base,
                ready,
            }),
        })
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.shared.ready {
            Ok(())
        } else {
            Err(Error::NotReady(
                "no bind credentials configured".to_string(),
            ))
        }
    }

    fn bind_account(&self, account: Account) -> BoundAccount {
        BoundAccount {
            account,
            ufds: self.clone(),
        }
    }

    /// Fetches an account by login, uuid, or pass-through of an already
    /// resolved account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no account matches the identifier.
    pub async fn get_account(&self, who: impl Into<AccountIdentifier>) -> Result<BoundAccount> {
        self.ensure_ready()?;
        let account = self.shared.resolver.resolve(who.into()).await?;
        Ok(self.bind_account(account))
    }

    /// Creates an account and returns it as stored by the backend.
    ///
    /// A uuid is generated when the input does not carry one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when validation fails or the
    /// login/uuid already exists.
    pub async fn create_account(&self, input: NewAccount) -> Result<BoundAccount> {
        self.ensure_ready()?;
        input.validate()?;

        let uuid = input.uuid.unwrap_or_else(AccountUuid::new_v4);
        let dn = account_dn(&uuid, &self.shared.users_base);
        self.shared
            .directory
            .add(dn.as_str(), &input.to_attributes(uuid))
            .await?;
        info!(login = %input.login, %uuid, "account created");

        // Read back so derived fields reflect what the backend stored.
        let account = self
            .shared
            .resolver
            .resolve(AccountIdentifier::Id(uuid.to_string()))
            .await?;
        Ok(self.bind_account(account))
    }

    /// Applies a change set to an account.
    ///
    /// Only the differences against the current entry are sent; when the
    /// change set collapses to nothing no request is made at all.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when the change set touches the
    /// immutable uuid.
    pub async fn update_account(
        &self,
        who: impl Into<AccountIdentifier>,
        changes: AccountChanges,
    ) -> Result<()> {
        self.ensure_ready()?;
        if changes.touches("uuid") {
            return Err(Error::InvalidArgument(
                "account uuid is immutable".to_string(),
            ));
        }

        let account = self.shared.resolver.resolve(who.into()).await?;
        let modifications = changes.change_list(&account);
        if modifications.is_empty() {
            return Ok(());
        }
        self.shared
            .directory
            .modify(account.dn.as_str(), &modifications)
            .await
    }

    /// Deletes an account entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no account matches the identifier.
    pub async fn delete_account(&self, who: impl Into<AccountIdentifier>) -> Result<()> {
        self.ensure_ready()?;
        let account = self.shared.resolver.resolve(who.into()).await?;
        self.shared.directory.delete(account.dn.as_str()).await?;
        info!(login = %account.login, uuid = %account.uuid, "account deleted");
        Ok(())
    }

    /// Verifies a password and returns the account on success.
    ///
    /// The check happens server-side; the secret never transits a search.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCredentials`] when the secret does not match.
    pub async fn authenticate(
        &self,
        who: impl Into<AccountIdentifier>,
        password: &str,
    ) -> Result<BoundAccount> {
        self.ensure_ready()?;
        let account = self.shared.resolver.resolve(who.into()).await?;
        if self
            .shared
            .directory
            .compare(account.dn.as_str(), "userpassword", password)
            .await?
        {
            Ok(self.bind_account(account))
        } else {
            Err(Error::InvalidCredentials)
        }
    }

    /// Adds an SSH key under an account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when the key material is not
    /// parseable or a key with the same fingerprint already exists.
    pub async fn add_key(
        &self,
        who: impl Into<AccountIdentifier>,
        input: NewKey,
    ) -> Result<SshKey> {
        self.ensure_ready()?;
        let account = self.shared.resolver.resolve(who.into()).await?;
        self.add_key_for(&account, input).await
    }

    /// Fetches a single key by name or fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the account owns no such key.
    pub async fn get_key(
        &self,
        who: impl Into<AccountIdentifier>,
        name_or_fingerprint: &str,
    ) -> Result<SshKey> {
        self.ensure_ready()?;
        let account = self.shared.resolver.resolve(who.into()).await?;
        self.get_key_for(&account, name_or_fingerprint).await
    }

    /// Lists all keys owned by an account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no account matches the identifier.
    pub async fn list_keys(&self, who: impl Into<AccountIdentifier>) -> Result<Vec<SshKey>> {
        self.ensure_ready()?;
        let account = self.shared.resolver.resolve(who.into()).await?;
        self.list_keys_for(&account).await
    }

    /// Deletes a key by name or fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the account owns no such key.
    pub async fn delete_key(
        &self,
        who: impl Into<AccountIdentifier>,
        name_or_fingerprint: &str,
    ) -> Result<()> {
        self.ensure_ready()?;
        let account = self.shared.resolver.resolve(who.into()).await?;
        self.delete_key_for(&account, name_or_fingerprint).await
    }

    /// Adds a provisioning limit for a datacenter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when a limit for that datacenter
    /// already exists.
    pub async fn add_limit(
        &self,
        who: impl Into<AccountIdentifier>,
        input: NewLimit,
    ) -> Result<Limit> {
        self.ensure_ready()?;
        let account = self.shared.resolver.resolve(who.into()).await?;
        self.add_limit_for(&account, input).await
    }

    /// Fetches the limit for a datacenter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the account carries no limit for
    /// that datacenter.
    pub async fn get_limit(
        &self,
        who: impl Into<AccountIdentifier>,
        datacenter: &str,
    ) -> Result<Limit> {
        self.ensure_ready()?;
        let account = self.shared.resolver.resolve(who.into()).await?;
        self.get_limit_for(&account, datacenter).await
    }

    /// Lists all limits carried by an account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no account matches the identifier.
    pub async fn list_limits(&self, who: impl Into<AccountIdentifier>) -> Result<Vec<Limit>> {
        self.ensure_ready()?;
        let account = self.shared.resolver.resolve(who.into()).await?;
        self.list_limits_for(&account).await
    }

    /// Replaces the quota values of an existing limit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no limit exists for the datacenter.
    pub async fn update_limit(
        &self,
        who: impl Into<AccountIdentifier>,
        input: NewLimit,
    ) -> Result<()> {
        self.ensure_ready()?;
        let account = self.shared.resolver.resolve(who.into()).await?;
        self.update_limit_for(&account, input).await
    }

    /// Deletes the limit for a datacenter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no limit exists for the datacenter.
    pub async fn delete_limit(
        &self,
        who: impl Into<AccountIdentifier>,
        datacenter: &str,
    ) -> Result<()> {
        self.ensure_ready()?;
        let account = self.shared.resolver.resolve(who.into()).await?;
        self.delete_limit_for(&account, datacenter).await
    }

    async fn add_key_for(&self, account: &Account, input: NewKey) -> Result<SshKey> {
        let fingerprint = key::fingerprint(&input.openssh)?;
        let name = input.name.unwrap_or_else(|| fingerprint.clone());
        let dn = key_dn(&fingerprint, &account.dn);
        let stored = SshKey {
            dn,
            name,
            fingerprint,
            openssh: input.openssh,
        };
        self.shared
            .directory
            .add(stored.dn.as_str(), &stored.to_attributes())
            .await?;
        info!(
            login = %account.login,
            fingerprint = %stored.fingerprint,
            "key added"
        );
        Ok(stored)
    }

    async fn get_key_for(&self, account: &Account, name_or_fingerprint: &str) -> Result<SshKey> {
        let filter = format!(
            "(&(objectclass={OBJECTCLASS_KEY})(|(name={0})(fingerprint={0})))",
            escape_filter(name_or_fingerprint)
        );
        let entries = self
            .shared
            .directory
            .search(
                account.dn.as_str(),
                SearchScope::OneLevel,
                &filter,
                &SshKey::search_attributes(),
            )
            .await?;
        entries.first().map_or_else(
            || {
                Err(Error::NotFound(format!(
                    "key `{name_or_fingerprint}` not found for account `{}`",
                    account.login
                )))
            },
            SshKey::from_entry,
        )
    }

    async fn list_keys_for(&self, account: &Account) -> Result<Vec<SshKey>> {
        let filter = format!("(objectclass={OBJECTCLASS_KEY})");
        let entries = self
            .shared
            .directory
            .search(
                account.dn.as_str(),
                SearchScope::OneLevel,
                &filter,
                &SshKey::search_attributes(),
            )
            .await?;
        entries.iter().map(SshKey::from_entry).collect()
    }

    async fn delete_key_for(&self, account: &Account, name_or_fingerprint: &str) -> Result<()> {
        let stored = self.get_key_for(account, name_or_fingerprint).await?;
        if !stored.dn.is_descendant_of(&account.dn) {
            return Err(Error::NotAuthorized(format!(
                "key `{}` is not owned by account `{}`",
                stored.fingerprint, account.login
            )));
        }
        self.shared.directory.delete(stored.dn.as_str()).await
    }

    async fn add_limit_for(&self, account: &Account, input: NewLimit) -> Result<Limit> {
        let dn = limit_dn(&input.datacenter, &account.dn);
        let stored = Limit {
            dn,
            datacenter: input.datacenter,
            quotas: input.quotas,
        };
        self.shared
            .directory
            .add(stored.dn.as_str(), &stored.to_attributes())
            .await?;
        info!(
            login = %account.login,
            datacenter = %stored.datacenter,
            "limit added"
        );
        Ok(stored)
    }

    async fn get_limit_for(&self, account: &Account, datacenter: &str) -> Result<Limit> {
        let filter = format!(
            "(&(objectclass={OBJECTCLASS_LIMIT})(datacenter={}))",
            escape_filter(datacenter)
        );
        let entries = self
            .shared
            .directory
            .search(account.dn.as_str(), SearchScope::OneLevel, &filter, &[])
            .await?;
        entries.first().map_or_else(
            || {
                Err(Error::NotFound(format!(
                    "no limit for datacenter `{datacenter}` on account `{}`",
                    account.login
                )))
            },
            Limit::from_entry,
        )
    }

    async fn list_limits_for(&self, account: &Account) -> Result<Vec<Limit>> {
        let filter = format!("(objectclass={OBJECTCLASS_LIMIT})");
        let entries = self
            .shared
            .directory
            .search(account.dn.as_str(), SearchScope::OneLevel, &filter, &[])
            .await?;
        entries.iter().map(Limit::from_entry).collect()
    }

    async fn update_limit_for(&self, account: &Account, input: NewLimit) -> Result<()> {
        let stored = self.get_limit_for(account, &input.datacenter).await?;
        let modifications = input.replace_modifications();
        if modifications.is_empty() {
            return Ok(());
        }
        self.shared
            .directory
            .modify(stored.dn.as_str(), &modifications)
            .await
    }

    async fn delete_limit_for(&self, account: &Account, datacenter: &str) -> Result<()> {
        let stored = self.get_limit_for(account, datacenter).await?;
        if !stored.dn.is_descendant_of(&account.dn) {
            return Err(Error::NotAuthorized(format!(
                "limit `{}` is not owned by account `{}`",
                stored.datacenter, account.login
            )));
        }
        self.shared.directory.delete(stored.dn.as_str()).await
    }

    /// Hit/miss counters of the current cache instance, when caching is
    /// enabled.
    #[must_use]
    pub fn cache_stats(&self) -> Option<crate::cache::CacheStats> {
        self.shared.directory.cache_stats()
    }
}

/// An account together with the client it was fetched through.
///
/// Dereferences to [`Account`] for field access, and carries the key and
/// limit sub-operations scoped to this account so callers need not repeat
/// the identifier.
pub struct BoundAccount {
    account: Account,
    ufds: UfdsClient,
}

impl BoundAccount {
    /// The underlying account snapshot.
    #[must_use]
    pub const fn account(&self) -> &Account {
        &self.account
    }

    /// Consumes the binding and returns the account snapshot.
    #[must_use]
    pub fn into_account(self) -> Account {
        self.account
    }

    /// Verifies this account's password.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCredentials`] when the secret does not match.
    pub async fn reauthenticate(&self, password: &str) -> Result<()> {
        self.ufds.ensure_ready()?;
        if self
            .ufds
            .shared
            .directory
            .compare(self.account.dn.as_str(), "userpassword", password)
            .await?
        {
            Ok(())
        } else {
            Err(Error::InvalidCredentials)
        }
    }

    /// Adds an SSH key under this account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for unparseable key material or a
    /// duplicate fingerprint.
    pub async fn add_key(&self, input: NewKey) -> Result<SshKey> {
        self.ufds.ensure_ready()?;
        self.ufds.add_key_for(&self.account, input).await
    }

    /// Fetches a key of this account by name or fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no such key exists.
    pub async fn get_key(&self, name_or_fingerprint: &str) -> Result<SshKey> {
        self.ufds.ensure_ready()?;
        self.ufds
            .get_key_for(&self.account, name_or_fingerprint)
            .await
    }

    /// Lists all keys of this account.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying search fails.
    pub async fn list_keys(&self) -> Result<Vec<SshKey>> {
        self.ufds.ensure_ready()?;
        self.ufds.list_keys_for(&self.account).await
    }

    /// Deletes a key of this account by name or fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no such key exists.
    pub async fn delete_key(&self, name_or_fingerprint: &str) -> Result<()> {
        self.ufds.ensure_ready()?;
        self.ufds
            .delete_key_for(&self.account, name_or_fingerprint)
            .await
    }

    /// Adds a provisioning limit for a datacenter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when a limit for that datacenter
    /// already exists.
    pub async fn add_limit(&self, input: NewLimit) -> Result<Limit> {
        self.ufds.ensure_ready()?;
        self.ufds.add_limit_for(&self.account, input).await
    }

    /// Fetches this account's limit for a datacenter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no limit exists for the datacenter.
    pub async fn get_limit(&self, datacenter: &str) -> Result<Limit> {
        self.ufds.ensure_ready()?;
        self.ufds.get_limit_for(&self.account, datacenter).await
    }

    /// Lists all limits of this account.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying search fails.
    pub async fn list_limits(&self) -> Result<Vec<Limit>> {
        self.ufds.ensure_ready()?;
        self.ufds.list_limits_for(&self.account).await
    }

    /// Replaces the quota values of an existing limit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no limit exists for the datacenter.
    pub async fn update_limit(&self, input: NewLimit) -> Result<()> {
        self.ufds.ensure_ready()?;
        self.ufds.update_limit_for(&self.account, input).await
    }

    /// Deletes this account's limit for a datacenter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no limit exists for the datacenter.
    pub async fn delete_limit(&self, datacenter: &str) -> Result<()> {
        self.ufds.ensure_ready()?;
        self.ufds.delete_limit_for(&self.account, datacenter).await
    }
}

impl Deref for BoundAccount {
    type Target = Account;

    fn deref(&self) -> &Self::Target {
        &self.account
    }
}

impl std::fmt::Debug for BoundAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundAccount")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}
