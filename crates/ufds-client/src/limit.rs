//! Per-datacenter provisioning limits owned by accounts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::dn::DistinguishedName;
use crate::transport::{AttributeMap, Entry, Modification};
use ufds_core::error::Error;
use ufds_core::Result;

/// Object class of limit entries.
pub const OBJECTCLASS_LIMIT: &str = "capilimit";

/// Limit entry, keyed by datacenter. At most one exists per
/// (account, datacenter) pair; the backend enforces uniqueness and a
/// duplicate add surfaces as an invalid-argument conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    /// Location of the limit entry, a child of the owning account.
    pub dn: DistinguishedName,
    /// Datacenter this limit applies to.
    pub datacenter: String,
    /// Per-resource quota values (e.g. an image name to a machine count).
    pub quotas: BTreeMap<String, String>,
}

impl Limit {
    /// Parses a limit from a fetched entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingAttribute`] when `datacenter` is absent.
    pub fn from_entry(entry: &Entry) -> Result<Self> {
        let dn = DistinguishedName::parse(&entry.dn)?;
        let datacenter = entry
            .first("datacenter")
            .ok_or_else(|| Error::MissingAttribute("datacenter".to_string()))?
            .to_string();

        let quotas = entry
            .attributes
            .iter()
            .filter(|(attribute, _)| {
                !attribute.eq_ignore_ascii_case("datacenter")
                    && !attribute.eq_ignore_ascii_case("objectclass")
                    && !attribute.eq_ignore_ascii_case("dclimit")
            })
            .filter_map(|(attribute, values)| {
                values.first().map(|value| (attribute.clone(), value.clone()))
            })
            .collect();

        Ok(Self {
            dn,
            datacenter,
            quotas,
        })
    }

    pub(crate) fn to_attributes(&self) -> AttributeMap {
        let mut attributes = AttributeMap::new();
        attributes.insert(
            "objectclass".to_string(),
            vec![OBJECTCLASS_LIMIT.to_string()],
        );
        attributes.insert("datacenter".to_string(), vec![self.datacenter.clone()]);
        for (resource, value) in &self.quotas {
            attributes.insert(resource.clone(), vec![value.clone()]);
        }
        attributes
    }
}

/// Input for adding or updating a limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLimit {
    /// Datacenter the limit applies to.
    pub datacenter: String,
    /// Per-resource quota values.
    #[serde(default)]
    pub quotas: BTreeMap<String, String>,
}

impl NewLimit {
    /// Creates a limit input for the given datacenter with no quotas.
    #[must_use]
    pub fn new(datacenter: impl Into<String>) -> Self {
        Self {
            datacenter: datacenter.into(),
            quotas: BTreeMap::new(),
        }
    }

    /// Adds a quota entry.
    #[must_use]
    pub fn with_quota(mut self, resource: impl Into<String>, value: impl Into<String>) -> Self {
        self.quotas.insert(resource.into(), value.into());
        self
    }

    pub(crate) fn replace_modifications(&self) -> Vec<Modification> {
        self.quotas
            .iter()
            .map(|(resource, value)| Modification::Replace {
                attribute: resource.clone(),
                values: vec![value.clone()],
            })
            .collect()
    }
}
