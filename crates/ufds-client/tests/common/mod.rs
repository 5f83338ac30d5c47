//! In-memory directory backend shared by the integration tests.
//!
//! Stores entries in a map keyed by normalized location, evaluates the small
//! filter subset the client emits, and exposes knobs for per-branch latency
//! and injected failures so that race orderings can be pinned down under a
//! paused clock.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ufds_client::{
    AttributeMap, BindCredentials, DirectoryTransport, Entry, Modification, SearchScope,
    TransportError, TransportResult, UfdsClient, UfdsConfig,
};

const NO_SUCH_OBJECT: u32 = 32;
const ENTRY_EXISTS: u32 = 68;

/// In-memory [`DirectoryTransport`] with call counters.
#[derive(Default)]
pub struct MemoryDirectory {
    entries: Mutex<BTreeMap<String, AttributeMap>>,
    search_count: AtomicUsize,
    modify_log: Mutex<Vec<(String, Vec<Modification>)>>,
    latencies: Mutex<Vec<(String, Duration)>>,
    failures: Mutex<Vec<(String, TransportError)>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry directly, bypassing the client.
    pub fn seed(&self, dn: &str, attributes: AttributeMap) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(normalize(dn), attributes);
        }
    }

    pub fn contains(&self, dn: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(&normalize(dn)))
            .unwrap_or(false)
    }

    /// Number of search requests that reached this backend.
    pub fn search_count(&self) -> usize {
        self.search_count.load(Ordering::SeqCst)
    }

    /// Change lists applied so far, in order.
    pub fn modify_log(&self) -> Vec<(String, Vec<Modification>)> {
        self.modify_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Delays every search whose base starts with `base_prefix`.
    pub fn delay_searches_under(&self, base_prefix: &str, delay: Duration) {
        if let Ok(mut latencies) = self.latencies.lock() {
            latencies.push((normalize(base_prefix), delay));
        }
    }

    /// Fails every search whose base starts with `base_prefix`.
    pub fn fail_searches_under(&self, base_prefix: &str, error: TransportError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push((normalize(base_prefix), error));
        }
    }

    fn delay_for(&self, base: &str) -> Option<Duration> {
        let latencies = self.latencies.lock().ok()?;
        let total: Duration = latencies
            .iter()
            .filter(|(prefix, _)| base.starts_with(prefix.as_str()))
            .map(|(_, delay)| *delay)
            .sum();
        (total > Duration::ZERO).then_some(total)
    }

    fn failure_for(&self, base: &str) -> Option<TransportError> {
        let failures = self.failures.lock().ok()?;
        failures
            .iter()
            .find(|(prefix, _)| base.starts_with(prefix.as_str()))
            .map(|(_, error)| error.clone())
    }
}

#[async_trait]
impl DirectoryTransport for MemoryDirectory {
    async fn bind(&self, _dn: &str, _password: &str) -> TransportResult<()> {
        Ok(())
    }

    async fn search(
        &self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> TransportResult<Vec<Entry>> {
        self.search_count.fetch_add(1, Ordering::SeqCst);
        let base = normalize(base);
        if let Some(delay) = self.delay_for(&base) {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.failure_for(&base) {
            return Err(error);
        }

        let parsed = parse_filter(filter)
            .ok_or_else(|| TransportError::Connection(format!("unparseable filter: {filter}")))?;
        let entries = self.entries.lock().map_err(|_| {
            TransportError::Connection("store poisoned".to_string())
        })?;

        if scope == SearchScope::Base && !entries.contains_key(&base) {
            return Err(TransportError::Directory {
                code: NO_SUCH_OBJECT,
                message: format!("{base} does not exist"),
            });
        }

        Ok(entries
            .iter()
            .filter(|(dn, _)| in_scope(dn, &base, scope))
            .filter(|(_, attrs)| parsed.matches(attrs))
            .map(|(dn, attrs)| Entry {
                dn: dn.clone(),
                attributes: project(attrs, attributes),
            })
            .collect())
    }

    async fn add(&self, dn: &str, attributes: &AttributeMap) -> TransportResult<()> {
        let dn = normalize(dn);
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| TransportError::Connection("store poisoned".to_string()))?;
        if entries.contains_key(&dn) {
            return Err(TransportError::Directory {
                code: ENTRY_EXISTS,
                message: format!("{dn} already exists"),
            });
        }
        entries.insert(dn, attributes.clone());
        Ok(())
    }

    async fn modify(&self, dn: &str, modifications: &[Modification]) -> TransportResult<()> {
        let dn = normalize(dn);
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| TransportError::Connection("store poisoned".to_string()))?;
        let Some(attributes) = entries.get_mut(&dn) else {
            return Err(TransportError::Directory {
                code: NO_SUCH_OBJECT,
                message: format!("{dn} does not exist"),
            });
        };
        for modification in modifications {
            match modification {
                Modification::Add { attribute, values } => {
                    attributes
                        .entry(attribute.clone())
                        .or_default()
                        .extend(values.iter().cloned());
                }
                Modification::Replace { attribute, values } => {
                    attributes.insert(attribute.clone(), values.clone());
                }
                Modification::Delete { attribute, values } => {
                    if values.is_empty() {
                        attributes.remove(attribute);
                    } else if let Some(existing) = attributes.get_mut(attribute) {
                        existing.retain(|value| !values.contains(value));
                    }
                }
            }
        }
        if let Ok(mut log) = self.modify_log.lock() {
            log.push((dn, modifications.to_vec()));
        }
        Ok(())
    }

    async fn delete(&self, dn: &str) -> TransportResult<()> {
        let dn = normalize(dn);
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| TransportError::Connection("store poisoned".to_string()))?;
        if entries.remove(&dn).is_none() {
            return Err(TransportError::Directory {
                code: NO_SUCH_OBJECT,
                message: format!("{dn} does not exist"),
            });
        }
        Ok(())
    }

    async fn compare(&self, dn: &str, attribute: &str, value: &str) -> TransportResult<bool> {
        let dn = normalize(dn);
        let entries = self
            .entries
            .lock()
            .map_err(|_| TransportError::Connection("store poisoned".to_string()))?;
        let Some(attributes) = entries.get(&dn) else {
            return Err(TransportError::Directory {
                code: NO_SUCH_OBJECT,
                message: format!("{dn} does not exist"),
            });
        };
        Ok(lookup(attributes, attribute)
            .map(|values| values.iter().any(|candidate| candidate == value))
            .unwrap_or(false))
    }
}

fn normalize(dn: &str) -> String {
    dn.to_lowercase()
}

fn in_scope(dn: &str, base: &str, scope: SearchScope) -> bool {
    match scope {
        SearchScope::Base => dn == base,
        SearchScope::OneLevel => dn
            .strip_suffix(base)
            .and_then(|head| head.strip_suffix(','))
            .is_some_and(|head| !head.is_empty() && !head.contains(',')),
        SearchScope::Subtree => dn == base || dn.ends_with(&format!(",{base}")),
    }
}

fn lookup<'a>(attributes: &'a AttributeMap, name: &str) -> Option<&'a Vec<String>> {
    attributes
        .iter()
        .find(|(attribute, _)| attribute.eq_ignore_ascii_case(name))
        .map(|(_, values)| values)
}

fn project(attributes: &AttributeMap, requested: &[String]) -> AttributeMap {
    if requested.is_empty() {
        return attributes.clone();
    }
    requested
        .iter()
        .filter_map(|name| {
            lookup(attributes, name).map(|values| (name.to_lowercase(), values.clone()))
        })
        .collect()
}

/// Equality-and-boolean subset of the search filter grammar.
enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Eq(String, String),
}

impl Filter {
    fn matches(&self, attributes: &AttributeMap) -> bool {
        match self {
            Self::And(children) => children.iter().all(|child| child.matches(attributes)),
            Self::Or(children) => children.iter().any(|child| child.matches(attributes)),
            Self::Eq(attribute, expected) => lookup(attributes, attribute)
                .map(|values| {
                    values
                        .iter()
                        .any(|value| value.eq_ignore_ascii_case(expected))
                })
                .unwrap_or(false),
        }
    }
}

fn parse_filter(input: &str) -> Option<Filter> {
    let (filter, rest) = parse_component(input)?;
    rest.is_empty().then_some(filter)
}

fn parse_component(input: &str) -> Option<(Filter, &str)> {
    let body = input.strip_prefix('(')?;
    match body.chars().next()? {
        operator @ ('&' | '|') => {
            let mut rest = &body[1..];
            let mut children = Vec::new();
            while rest.starts_with('(') {
                let (child, remaining) = parse_component(rest)?;
                children.push(child);
                rest = remaining;
            }
            let rest = rest.strip_prefix(')')?;
            let filter = if operator == '&' {
                Filter::And(children)
            } else {
                Filter::Or(children)
            };
            Some((filter, rest))
        }
        _ => {
            let end = body.find(')')?;
            let (attribute, value) = body[..end].split_once('=')?;
            Some((
                Filter::Eq(attribute.to_lowercase(), value.to_lowercase()),
                &body[end + 1..],
            ))
        }
    }
}

/// Builds a ready client over the given backend.
pub async fn client_over(backend: Arc<MemoryDirectory>) -> UfdsClient {
    let config = UfdsConfig::new("ldaps://ufds.test.example.com")
        .expect("static url parses")
        .with_credentials(BindCredentials::new("cn=root,o=smartdc", "secret"));
    UfdsClient::with_transport(config, backend)
        .await
        .expect("bind against the in-memory backend succeeds")
}

/// Attribute map for a seeded account entry.
pub fn account_attributes(uuid: &str, login: &str) -> AttributeMap {
    let mut attributes = AttributeMap::new();
    attributes.insert("objectclass".to_string(), vec!["sdcperson".to_string()]);
    attributes.insert("uuid".to_string(), vec![uuid.to_string()]);
    attributes.insert("login".to_string(), vec![login.to_string()]);
    attributes.insert(
        "userpassword".to_string(),
        vec!["correct-horse".to_string()],
    );
    attributes
}

/// Location of a seeded account entry.
pub fn account_location(uuid: &str) -> String {
    format!("uuid={uuid},ou=users,o=smartdc")
}
