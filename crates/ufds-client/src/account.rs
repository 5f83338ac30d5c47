//! Account (user) records and their change computation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use validator::Validate;

use crate::dn::DistinguishedName;
use crate::transport::{AttributeMap, Entry, Modification};
use ufds_core::error::Error;
use ufds_core::uuid::AccountUuid;
use ufds_core::Result;

/// Object class of account entries.
pub const OBJECTCLASS_ACCOUNT: &str = "sdcperson";

/// Group whose members are administrators.
pub const ADMIN_GROUP: &str = "operators";

/// Immutable snapshot of an account entry as fetched.
///
/// Required fields are promoted to typed form; the raw attribute map is kept
/// alongside so that change computation can compare against exactly what the
/// backend returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Location of the account entry.
    pub dn: DistinguishedName,
    /// Primary identity; globally unique, immutable after creation.
    pub uuid: AccountUuid,
    /// Secondary identity; unique, caller-mutable.
    pub login: String,
    /// Primary email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Common name.
    #[serde(default)]
    pub cn: Option<String>,
    /// Company affiliation.
    #[serde(default)]
    pub company: Option<String>,
    /// Phone number.
    #[serde(default)]
    pub phone: Option<String>,
    /// Whether the account may provision resources.
    #[serde(default)]
    pub approved_for_provisioning: bool,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update timestamp.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Raw group membership locations.
    #[serde(default)]
    pub member_of: Vec<String>,
    #[serde(skip)]
    attributes: AttributeMap,
}

impl Account {
    /// Parses an account from a fetched entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingAttribute`] when `uuid` or `login` is absent
    /// and [`Error::InvalidArgument`] when the location or uuid is
    /// malformed.
    pub fn from_entry(entry: &Entry) -> Result<Self> {
        let dn = DistinguishedName::parse(&entry.dn)?;
        let uuid = entry
            .first("uuid")
            .ok_or_else(|| Error::MissingAttribute("uuid".to_string()))?;
        let uuid = AccountUuid::parse_str(uuid)?;
        let login = entry
            .first("login")
            .ok_or_else(|| Error::MissingAttribute("login".to_string()))?
            .to_string();

        let member_of = entry
            .values("memberof")
            .map(<[String]>::to_vec)
            .unwrap_or_default();

        Ok(Self {
            dn,
            uuid,
            login,
            email: entry.first("email").map(ToString::to_string),
            cn: entry.first("cn").map(ToString::to_string),
            company: entry.first("company").map(ToString::to_string),
            phone: entry.first("phone").map(ToString::to_string),
            approved_for_provisioning: entry.bool_value("approved_for_provisioning"),
            created_at: parse_timestamp(entry.first("created")),
            updated_at: parse_timestamp(entry.first("updated")),
            member_of,
            attributes: entry.attributes.clone(),
        })
    }

    /// Attribute names fetched for account searches.
    pub(crate) fn search_attributes() -> Vec<String> {
        [
            "uuid",
            "login",
            "email",
            "cn",
            "company",
            "phone",
            "objectclass",
            "memberof",
            "approved_for_provisioning",
            "created",
            "updated",
        ]
        .iter()
        .map(ToString::to_string)
        .collect()
    }

    /// Current values of an attribute as fetched, if any.
    #[must_use]
    pub fn attribute_values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes.get(attribute).map(Vec::as_slice)
    }

    /// Flat set of group names, derived from the leading component of each
    /// membership location.
    #[must_use]
    pub fn group_names(&self) -> HashSet<String> {
        self.member_of
            .iter()
            .filter_map(|raw| DistinguishedName::parse(raw).ok())
            .filter_map(|dn| dn.leading().map(|rdn| rdn.value().to_string()))
            .collect()
    }

    /// Returns true if the account belongs to the administrator group.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.group_names()
            .iter()
            .any(|group| group.eq_ignore_ascii_case(ADMIN_GROUP))
    }
}

/// Validated input for account creation.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct NewAccount {
    /// Login name.
    #[validate(length(min = 3, max = 32))]
    pub login: String,
    /// Initial secret; stored by the backend, never read back.
    #[serde(default)]
    pub password: Option<String>,
    /// Primary email address.
    #[serde(default)]
    #[validate(email)]
    pub email: Option<String>,
    /// Common name.
    #[serde(default)]
    pub cn: Option<String>,
    /// Company affiliation.
    #[serde(default)]
    pub company: Option<String>,
    /// Phone number.
    #[serde(default)]
    pub phone: Option<String>,
    /// Caller-supplied uuid; generated when absent.
    #[serde(default)]
    pub uuid: Option<AccountUuid>,
}

impl NewAccount {
    /// Creates an input with the required login and everything else unset.
    #[must_use]
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: None,
            email: None,
            cn: None,
            company: None,
            phone: None,
            uuid: None,
        }
    }

    pub(crate) fn to_attributes(&self, uuid: AccountUuid) -> AttributeMap {
        let mut attributes = AttributeMap::new();
        attributes.insert(
            "objectclass".to_string(),
            vec![OBJECTCLASS_ACCOUNT.to_string()],
        );
        attributes.insert("uuid".to_string(), vec![uuid.to_string()]);
        attributes.insert("login".to_string(), vec![self.login.clone()]);
        for (attribute, value) in [
            ("userpassword", &self.password),
            ("email", &self.email),
            ("cn", &self.cn),
            ("company", &self.company),
            ("phone", &self.phone),
        ] {
            if let Some(value) = value {
                attributes.insert(attribute.to_string(), vec![value.clone()]);
            }
        }
        attributes
    }
}

/// Requested account changes: attribute name to new value, or `None` to
/// clear the attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountChanges(BTreeMap<String, Option<String>>);

impl AccountChanges {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that an attribute be set to `value`.
    #[must_use]
    pub fn set(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(attribute.into(), Some(value.into()));
        self
    }

    /// Requests that an attribute be removed.
    #[must_use]
    pub fn clear(mut self, attribute: impl Into<String>) -> Self {
        self.0.insert(attribute.into(), None);
        self
    }

    /// Returns true if an attribute is mentioned by this change set.
    #[must_use]
    pub fn touches(&self, attribute: &str) -> bool {
        self.0.contains_key(attribute)
    }

    /// Computes the minimal change list against the fetched account state.
    ///
    /// Only fields whose requested value differs from the current value
    /// produce a modification; clearing an attribute the account does not
    /// carry produces nothing; clearing one it does carry produces a
    /// delete-attribute modification rather than a replace-with-empty.
    #[must_use]
    pub fn change_list(&self, current: &Account) -> Vec<Modification> {
        let mut modifications = Vec::new();
        for (attribute, requested) in &self.0 {
            let existing = current.attribute_values(attribute);
            match requested {
                Some(value) => {
                    let unchanged = existing
                        .map(|values| values.len() == 1 && values[0] == *value)
                        .unwrap_or(false);
                    if !unchanged {
                        modifications.push(Modification::Replace {
                            attribute: attribute.clone(),
                            values: vec![value.clone()],
                        });
                    }
                }
                None => {
                    if existing.is_some() {
                        modifications.push(Modification::Delete {
                            attribute: attribute.clone(),
                            values: Vec::new(),
                        });
                    }
                }
            }
        }
        modifications
    }
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|val| DateTime::parse_from_rfc3339(val).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
