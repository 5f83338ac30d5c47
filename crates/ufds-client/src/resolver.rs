//! Identifier-ambiguous account resolution.
//!
//! A caller-supplied identifier may be a login or a uuid; the resolver
//! issues both interpretations concurrently and accepts the first positive
//! result, so the caller never has to know which kind it holds.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::account::{Account, OBJECTCLASS_ACCOUNT};
use crate::client::DirectoryClient;
use crate::dn::{account_dn, DistinguishedName};
use crate::transport::{escape_filter, Entry, SearchScope};
use ufds_core::error::Error;
use ufds_core::uuid::AccountUuid;
use ufds_core::Result;

/// Either an identifier still to be resolved or an already-resolved
/// account. Accepting both lets every facade operation take the output of a
/// previous resolution without a second round trip.
#[derive(Debug, Clone)]
pub enum AccountIdentifier {
    /// Login or uuid, not yet resolved.
    Id(String),
    /// Already-resolved account; passed through unchanged.
    Resolved(Box<Account>),
}

impl From<&str> for AccountIdentifier {
    fn from(id: &str) -> Self {
        Self::Id(id.to_string())
    }
}

impl From<String> for AccountIdentifier {
    fn from(id: String) -> Self {
        Self::Id(id)
    }
}

impl From<AccountUuid> for AccountIdentifier {
    fn from(uuid: AccountUuid) -> Self {
        Self::Id(uuid.to_string())
    }
}

impl From<Account> for AccountIdentifier {
    fn from(account: Account) -> Self {
        Self::Resolved(Box::new(account))
    }
}

impl From<&Account> for AccountIdentifier {
    fn from(account: &Account) -> Self {
        Self::Resolved(Box::new(account.clone()))
    }
}

/// Resolves logins and uuids to accounts via a two-branch race.
pub struct AccountResolver {
    directory: Arc<DirectoryClient>,
    users_base: DistinguishedName,
}

impl AccountResolver {
    /// Creates a resolver over the given client, scoped to the account
    /// collection base.
    #[must_use]
    pub fn new(directory: Arc<DirectoryClient>, users_base: DistinguishedName) -> Self {
        Self {
            directory,
            users_base,
        }
    }

    /// Resolves an identifier to its account.
    ///
    /// Two searches run concurrently: one filtering the account collection
    /// on `login`, one scoped at the computed account location for `uuid`.
    /// The first branch to report a match wins immediately. A branch that
    /// reports no entries (including a not-found from a nonexistent uuid
    /// location) is not conclusive on its own, so the resolver then waits
    /// for the other. Both branches empty fails with [`Error::NotFound`]
    /// naming the input; branch errors are held and only surface when no
    /// branch finds a match, first error observed winning. Neither branch
    /// is cancelled; a late result goes to a dropped receiver.
    ///
    /// Exactly one outcome is delivered per call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no interpretation of the identifier
    /// matches an account.
    pub async fn resolve(&self, who: AccountIdentifier) -> Result<Account> {
        let id = match who {
            AccountIdentifier::Resolved(account) => return Ok(*account),
            AccountIdentifier::Id(id) => id,
        };

        let (tx, mut rx) = mpsc::channel::<Result<Vec<Entry>>>(2);
        self.spawn_login_branch(&id, tx.clone());
        self.spawn_uuid_branch(&id, tx).await;

        let mut held: Option<Error> = None;
        for _ in 0..2 {
            match rx.recv().await {
                Some(Ok(entries)) => {
                    if let Some(entry) = entries.first() {
                        return Account::from_entry(entry);
                    }
                }
                // A nonexistent uuid location reports not-found rather than
                // an empty result set; both mean "no entries here".
                Some(Err(Error::NotFound(_))) => {}
                Some(Err(err)) => {
                    if held.is_none() {
                        held = Some(err);
                    }
                }
                None => break,
            }
        }

        debug!(%id, "neither resolution branch matched");
        Err(held.unwrap_or_else(|| Error::NotFound(format!("account `{id}` does not exist"))))
    }

    fn spawn_login_branch(&self, id: &str, tx: mpsc::Sender<Result<Vec<Entry>>>) {
        let directory = Arc::clone(&self.directory);
        let base = self.users_base.as_str().to_string();
        let filter = format!(
            "(&(objectclass={OBJECTCLASS_ACCOUNT})(login={}))",
            escape_filter(id)
        );
        tokio::spawn(async move {
            let result = directory
                .search(
                    &base,
                    SearchScope::OneLevel,
                    &filter,
                    &Account::search_attributes(),
                )
                .await;
            let _ = tx.send(result).await;
        });
    }

    async fn spawn_uuid_branch(&self, id: &str, tx: mpsc::Sender<Result<Vec<Entry>>>) {
        let Ok(uuid) = AccountUuid::parse_str(id) else {
            // Not a uuid, so this interpretation cannot match; report an
            // empty result without a transport round trip.
            let _ = tx.send(Ok(Vec::new())).await;
            return;
        };

        let directory = Arc::clone(&self.directory);
        let base = account_dn(&uuid, &self.users_base).as_str().to_string();
        let filter = format!("(&(objectclass={OBJECTCLASS_ACCOUNT})(uuid={uuid}))");
        tokio::spawn(async move {
            let result = directory
                .search(
                    &base,
                    SearchScope::Base,
                    &filter,
                    &Account::search_attributes(),
                )
                .await;
            let _ = tx.send(result).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheOptions;
    use crate::transport::{AttributeMap, MockDirectoryTransport};

    const UUID: &str = "550e8400-e29b-41d4-a716-446655440000";

    fn users_base() -> DistinguishedName {
        DistinguishedName::parse("ou=users,o=smartdc").unwrap()
    }

    fn account_entry() -> Entry {
        let mut attributes = AttributeMap::new();
        attributes.insert("uuid".to_string(), vec![UUID.to_string()]);
        attributes.insert("login".to_string(), vec!["alice17".to_string()]);
        Entry {
            dn: format!("uuid={UUID},ou=users,o=smartdc"),
            attributes,
        }
    }

    fn resolver_with(transport: MockDirectoryTransport) -> AccountResolver {
        let client = Arc::new(DirectoryClient::new(
            Arc::new(transport),
            Some(CacheOptions::new()),
        ));
        AccountResolver::new(client, users_base())
    }

    #[tokio::test]
    async fn already_resolved_account_passes_through_without_searching() {
        // No expectations set: any transport call would panic.
        let resolver = resolver_with(MockDirectoryTransport::new());
        let account = Account::from_entry(&account_entry()).unwrap();

        let resolved = resolver
            .resolve(AccountIdentifier::from(account.clone()))
            .await
            .unwrap();
        assert_eq!(resolved, account);
    }

    #[tokio::test]
    async fn non_uuid_input_issues_a_single_login_search() {
        let mut transport = MockDirectoryTransport::new();
        transport
            .expect_search()
            .times(1)
            .withf(|base, scope, filter, _| {
                base == "ou=users,o=smartdc"
                    && *scope == SearchScope::OneLevel
                    && filter.contains("(login=alice17)")
            })
            .returning(|_, _, _, _| Ok(vec![account_entry()]));

        let resolver = resolver_with(transport);
        let account = resolver
            .resolve(AccountIdentifier::from("alice17"))
            .await
            .unwrap();
        assert_eq!(account.login, "alice17");
    }

    #[tokio::test]
    async fn uuid_input_races_both_branches() {
        let mut transport = MockDirectoryTransport::new();
        transport
            .expect_search()
            .withf(|base, _, _, _| base == "ou=users,o=smartdc")
            .returning(|_, _, _, _| Ok(Vec::new()));
        transport
            .expect_search()
            .withf(|base, scope, _, _| base.starts_with("uuid=") && *scope == SearchScope::Base)
            .returning(|_, _, _, _| Ok(vec![account_entry()]));

        let resolver = resolver_with(transport);
        let account = resolver
            .resolve(AccountIdentifier::from(UUID))
            .await
            .unwrap();
        assert_eq!(account.uuid.to_string(), UUID);
    }

    #[tokio::test]
    async fn dual_empty_fails_with_not_found_naming_the_input() {
        let mut transport = MockDirectoryTransport::new();
        transport
            .expect_search()
            .times(1)
            .returning(|_, _, _, _| Ok(Vec::new()));

        let resolver = resolver_with(transport);
        let err = resolver
            .resolve(AccountIdentifier::from("nobody"))
            .await
            .unwrap_err();
        match err {
            Error::NotFound(message) => assert!(message.contains("nobody")),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn uuid_branch_not_found_is_treated_as_empty() {
        let mut transport = MockDirectoryTransport::new();
        transport
            .expect_search()
            .withf(|base, _, _, _| base == "ou=users,o=smartdc")
            .returning(|_, _, _, _| Ok(Vec::new()));
        transport
            .expect_search()
            .withf(|base, _, _, _| base.starts_with("uuid="))
            .returning(|_, _, _, _| {
                Err(crate::transport::TransportError::Directory {
                    code: 32,
                    message: "no such object".to_string(),
                })
            });

        let resolver = resolver_with(transport);
        let err = resolver
            .resolve(AccountIdentifier::from(UUID))
            .await
            .unwrap_err();
        match err {
            Error::NotFound(message) => assert!(message.contains(UUID)),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}
