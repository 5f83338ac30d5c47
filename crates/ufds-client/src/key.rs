//! SSH key records owned by accounts.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::dn::DistinguishedName;
use crate::transport::{AttributeMap, Entry};
use ufds_core::error::Error;
use ufds_core::Result;

/// Object class of key entries.
pub const OBJECTCLASS_KEY: &str = "sdckey";

/// SSH key entry. The fingerprint is derived deterministically from the key
/// material and is the natural lookup identifier; the name defaults to the
/// fingerprint when the caller supplies none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshKey {
    /// Location of the key entry, a child of the owning account.
    pub dn: DistinguishedName,
    /// Caller-supplied name, or the fingerprint when absent.
    pub name: String,
    /// `SHA256:<base64>` fingerprint of the key material.
    pub fingerprint: String,
    /// Public key in OpenSSH one-line format.
    pub openssh: String,
}

impl SshKey {
    /// Parses a key from a fetched entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingAttribute`] when `fingerprint` or `openssh`
    /// is absent.
    pub fn from_entry(entry: &Entry) -> Result<Self> {
        let dn = DistinguishedName::parse(&entry.dn)?;
        let fingerprint = entry
            .first("fingerprint")
            .ok_or_else(|| Error::MissingAttribute("fingerprint".to_string()))?
            .to_string();
        let openssh = entry
            .first("openssh")
            .ok_or_else(|| Error::MissingAttribute("openssh".to_string()))?
            .to_string();
        let name = entry
            .first("name")
            .map_or_else(|| fingerprint.clone(), ToString::to_string);
        Ok(Self {
            dn,
            name,
            fingerprint,
            openssh,
        })
    }

    /// Attribute names fetched for key searches.
    pub(crate) fn search_attributes() -> Vec<String> {
        ["name", "fingerprint", "openssh", "objectclass"]
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    pub(crate) fn to_attributes(&self) -> AttributeMap {
        let mut attributes = AttributeMap::new();
        attributes.insert("objectclass".to_string(), vec![OBJECTCLASS_KEY.to_string()]);
        attributes.insert("name".to_string(), vec![self.name.clone()]);
        attributes.insert("fingerprint".to_string(), vec![self.fingerprint.clone()]);
        attributes.insert("openssh".to_string(), vec![self.openssh.clone()]);
        attributes
    }
}

/// Input for adding a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewKey {
    /// Public key in OpenSSH one-line format.
    pub openssh: String,
    /// Optional name; the fingerprint is used when absent.
    #[serde(default)]
    pub name: Option<String>,
}

impl NewKey {
    /// Creates an unnamed key input.
    #[must_use]
    pub fn new(openssh: impl Into<String>) -> Self {
        Self {
            openssh: openssh.into(),
            name: None,
        }
    }

    /// Sets the key name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Computes the `SHA256:<base64>` fingerprint of an OpenSSH public key.
///
/// Accepts either the full `<type> <body> [comment]` line or the bare
/// base64 body.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] when the material is empty or the
/// body is not valid base64.
pub fn fingerprint(openssh: &str) -> Result<String> {
    let fields: Vec<&str> = openssh.split_whitespace().collect();
    let body = match fields.as_slice() {
        [] => {
            return Err(Error::InvalidArgument(
                "key material cannot be empty".to_string(),
            ))
        }
        [body] => body,
        [_type, body, ..] => body,
    };
    let raw = STANDARD
        .decode(body)
        .map_err(|_| Error::InvalidArgument("key material is not valid base64".to_string()))?;
    let digest = Sha256::digest(&raw);
    Ok(format!("SHA256:{}", STANDARD_NO_PAD.encode(digest)))
}
