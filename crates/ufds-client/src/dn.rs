//! Distinguished name handling for directory entries.
//!
//! Parsing is strict so that malformed locations surface early, before they
//! are sent to the backend. The canonical string form produced here is also
//! what the search cache keys on, so two spellings of the same DN collide.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use ufds_core::error::Error as CoreError;
use ufds_core::uuid::AccountUuid;

/// Errors that can occur when parsing a distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnError {
    /// The distinguished name was empty.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// A component lacked the `attribute=value` shape.
    #[error("invalid distinguished name component: {0}")]
    InvalidComponent(String),
    /// The distinguished name ended with an escape character.
    #[error("distinguished name contains an unterminated escape sequence")]
    UnterminatedEscape,
}

impl From<DnError> for CoreError {
    fn from(err: DnError) -> Self {
        CoreError::InvalidArgument(err.to_string())
    }
}

/// Single `attribute=value` component of a distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rdn {
    attribute: String,
    value: String,
}

impl Rdn {
    /// Creates a new relative distinguished name component.
    #[must_use]
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Attribute portion (e.g. `uuid`).
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Value portion.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    fn matches(&self, other: &Rdn) -> bool {
        self.attribute.eq_ignore_ascii_case(&other.attribute)
            && self.value.eq_ignore_ascii_case(&other.value)
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute, escape(&self.value))
    }
}

/// Strongly-typed distinguished name.
///
/// Keeps a canonical string representation alongside the parsed components.
/// Most-specific component first, directory root last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinguishedName {
    raw: String,
    rdns: Vec<Rdn>,
}

impl DistinguishedName {
    /// Parses a distinguished name from a string.
    ///
    /// # Errors
    ///
    /// Returns [`DnError`] if the input is empty or any component is not an
    /// `attribute=value` pair.
    pub fn parse(input: impl AsRef<str>) -> std::result::Result<Self, DnError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(DnError::Empty);
        }

        let mut rdns = Vec::new();
        for component in split_unescaped(trimmed, ',')? {
            rdns.push(parse_component(&component)?);
        }

        Ok(Self::from_rdns(rdns))
    }

    fn from_rdns(rdns: Vec<Rdn>) -> Self {
        let raw = rdns
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        Self { raw, rdns }
    }

    /// Borrows the canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the components in order, most specific first.
    #[must_use]
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// Returns the most specific component.
    #[must_use]
    pub fn leading(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    /// Looks up the value of the first component whose attribute matches
    /// (case-insensitive).
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.rdns
            .iter()
            .find(|rdn| rdn.attribute.eq_ignore_ascii_case(attribute))
            .map(Rdn::value)
    }

    /// Creates a child location one level below this one.
    #[must_use]
    pub fn child(&self, rdn: Rdn) -> Self {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Self::from_rdns(rdns)
    }

    /// Returns the location one level above, or `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.rdns.len() < 2 {
            return None;
        }
        Some(Self::from_rdns(self.rdns[1..].to_vec()))
    }

    /// Returns true if this name sits strictly below `ancestor` in the tree.
    ///
    /// Comparison is case-insensitive on both attributes and values, the way
    /// the backend treats them.
    #[must_use]
    pub fn is_descendant_of(&self, ancestor: &DistinguishedName) -> bool {
        if self.rdns.len() <= ancestor.rdns.len() {
            return false;
        }
        let offset = self.rdns.len() - ancestor.rdns.len();
        self.rdns[offset..]
            .iter()
            .zip(ancestor.rdns.iter())
            .all(|(mine, theirs)| mine.matches(theirs))
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DistinguishedName {
    type Err = DnError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<DistinguishedName> for String {
    fn from(value: DistinguishedName) -> Self {
        value.raw
    }
}

impl TryFrom<&str> for DistinguishedName {
    type Error = DnError;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        Self::parse(value)
    }
}

/// Location of an account entry under the users container.
#[must_use]
pub fn account_dn(uuid: &AccountUuid, users_base: &DistinguishedName) -> DistinguishedName {
    users_base.child(Rdn::new("uuid", uuid.to_string()))
}

/// Location of a key entry under its owning account.
#[must_use]
pub fn key_dn(fingerprint: &str, account: &DistinguishedName) -> DistinguishedName {
    account.child(Rdn::new("fingerprint", fingerprint))
}

/// Location of a per-datacenter limit entry under its owning account.
#[must_use]
pub fn limit_dn(datacenter: &str, account: &DistinguishedName) -> DistinguishedName {
    account.child(Rdn::new("dclimit", datacenter))
}

fn parse_component(component: &str) -> std::result::Result<Rdn, DnError> {
    let mut escape_next = false;
    let mut split_at = None;
    for (idx, ch) in component.char_indices() {
        if escape_next {
            escape_next = false;
        } else if ch == '\\' {
            escape_next = true;
        } else if ch == '=' {
            split_at = Some(idx);
            break;
        }
    }
    if escape_next {
        return Err(DnError::UnterminatedEscape);
    }

    let idx = split_at.ok_or_else(|| DnError::InvalidComponent(component.to_string()))?;
    let attribute = component[..idx].trim();
    let value = component[idx + 1..].trim_start();
    if attribute.is_empty() || value.is_empty() {
        return Err(DnError::InvalidComponent(component.to_string()));
    }

    Ok(Rdn::new(attribute, unescape(value)?))
}

fn split_unescaped(input: &str, delimiter: char) -> std::result::Result<Vec<String>, DnError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escape_next = false;

    for ch in input.chars() {
        if escape_next {
            current.push('\\');
            current.push(ch);
            escape_next = false;
        } else if ch == '\\' {
            escape_next = true;
        } else if ch == delimiter {
            parts.push(current.trim().to_string());
            current.clear();
        } else {
            current.push(ch);
        }
    }
    if escape_next {
        return Err(DnError::UnterminatedEscape);
    }
    parts.push(current.trim().to_string());

    if parts.iter().any(String::is_empty) {
        return Err(DnError::InvalidComponent(input.to_string()));
    }
    Ok(parts)
}

fn unescape(value: &str) -> std::result::Result<String, DnError> {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            result.push(chars.next().ok_or(DnError::UnterminatedEscape)?);
        } else {
            result.push(ch);
        }
    }
    Ok(result)
}

fn escape(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut escaped = String::with_capacity(value.len());
    for (idx, ch) in chars.iter().enumerate() {
        let needs_escape = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (idx == 0 && (*ch == ' ' || *ch == '#'))
            || (idx == chars.len() - 1 && *ch == ' ');
        if needs_escape {
            escaped.push('\\');
        }
        escaped.push(*ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_dn() {
        let dn = DistinguishedName::parse("uuid=1234,ou=users,o=smartdc").unwrap();
        assert_eq!(dn.get("uuid"), Some("1234"));
        assert_eq!(dn.get("OU"), Some("users"));
        assert_eq!(dn.to_string(), "uuid=1234,ou=users,o=smartdc");
    }

    #[test]
    fn parse_dn_with_escaped_comma() {
        let dn = DistinguishedName::parse("cn=Smith\\, Jane,ou=users,o=smartdc").unwrap();
        assert_eq!(dn.get("cn"), Some("Smith, Jane"));
        assert!(dn.to_string().starts_with("cn=Smith\\, Jane,"));
    }

    #[test]
    fn parse_rejects_empty_and_malformed() {
        assert!(matches!(
            DistinguishedName::parse("   "),
            Err(DnError::Empty)
        ));
        assert!(matches!(
            DistinguishedName::parse("uuid=1234,"),
            Err(DnError::InvalidComponent(_))
        ));
        assert!(matches!(
            DistinguishedName::parse("no-equals-here"),
            Err(DnError::InvalidComponent(_))
        ));
    }

    #[test]
    fn child_and_parent_round_trip() {
        let base = DistinguishedName::parse("ou=users,o=smartdc").unwrap();
        let account = base.child(Rdn::new("uuid", "abcd"));
        assert_eq!(account.to_string(), "uuid=abcd,ou=users,o=smartdc");
        assert_eq!(account.parent().unwrap(), base);
        assert!(base.parent().unwrap().parent().is_none());
    }

    #[test]
    fn descendant_check_is_case_insensitive() {
        let account = DistinguishedName::parse("uuid=ABCD,ou=users,o=smartdc").unwrap();
        let key = DistinguishedName::parse("fingerprint=fp,uuid=abcd,OU=Users,o=smartdc").unwrap();
        assert!(key.is_descendant_of(&account));
        assert!(!account.is_descendant_of(&key));
        assert!(!account.is_descendant_of(&account));
    }

    #[test]
    fn descendant_check_rejects_sibling() {
        let a = DistinguishedName::parse("uuid=aaaa,ou=users,o=smartdc").unwrap();
        let other_key = DistinguishedName::parse("fingerprint=fp,uuid=bbbb,ou=users,o=smartdc").unwrap();
        assert!(!other_key.is_descendant_of(&a));
    }

    #[test]
    fn layout_helpers() {
        let users = DistinguishedName::parse("ou=users,o=smartdc").unwrap();
        let uuid = AccountUuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let account = account_dn(&uuid, &users);
        assert_eq!(
            account.to_string(),
            "uuid=550e8400-e29b-41d4-a716-446655440000,ou=users,o=smartdc"
        );

        let key = key_dn("SHA256:abc", &account);
        assert!(key.is_descendant_of(&account));
        assert_eq!(key.leading().unwrap().attribute(), "fingerprint");

        let limit = limit_dn("us-east-1", &account);
        assert_eq!(limit.get("dclimit"), Some("us-east-1"));
    }
}
