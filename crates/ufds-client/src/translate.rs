//! Translation of protocol-level failures into the domain error taxonomy.
//!
//! The mapping is total: every [`TransportError`] that reaches [`translate`]
//! yields exactly one domain [`Error`]. Callers of the facade never see a
//! raw transport error.

use ufds_core::error::Error;

use crate::transport::TransportError;

// LDAP result codes (RFC 4511) the table distinguishes.
const NO_SUCH_ATTRIBUTE: u32 = 16;
const CONSTRAINT_VIOLATION: u32 = 19;
const ATTRIBUTE_OR_VALUE_EXISTS: u32 = 20;
const INVALID_ATTRIBUTE_SYNTAX: u32 = 21;
const NO_SUCH_OBJECT: u32 = 32;
const INVALID_DN_SYNTAX: u32 = 34;
const INAPPROPRIATE_AUTHENTICATION: u32 = 48;
const INVALID_CREDENTIALS: u32 = 49;
const INSUFFICIENT_ACCESS_RIGHTS: u32 = 50;
const NAMING_VIOLATION: u32 = 64;
const OBJECT_CLASS_VIOLATION: u32 = 65;
const NOT_ALLOWED_ON_NON_LEAF: u32 = 66;
const NOT_ALLOWED_ON_RDN: u32 = 67;
const ENTRY_ALREADY_EXISTS: u32 = 68;

/// Maps a transport failure onto the domain taxonomy.
#[must_use]
pub fn translate(err: TransportError) -> Error {
    match err {
        TransportError::Directory { code, message } => translate_code(code, message),
        TransportError::Connection(message) => Error::Internal(message),
    }
}

fn translate_code(code: u32, message: String) -> Error {
    match code {
        NO_SUCH_ATTRIBUTE | NO_SUCH_OBJECT => Error::NotFound(message),
        INAPPROPRIATE_AUTHENTICATION | INVALID_CREDENTIALS => Error::InvalidCredentials,
        INSUFFICIENT_ACCESS_RIGHTS => Error::NotAuthorized(message),
        OBJECT_CLASS_VIOLATION => Error::MissingAttribute(message),
        CONSTRAINT_VIOLATION
        | ATTRIBUTE_OR_VALUE_EXISTS
        | INVALID_ATTRIBUTE_SYNTAX
        | INVALID_DN_SYNTAX
        | NAMING_VIOLATION
        | NOT_ALLOWED_ON_NON_LEAF
        | NOT_ALLOWED_ON_RDN
        | ENTRY_ALREADY_EXISTS => Error::InvalidArgument(message),
        _ => Error::Internal(format!("directory error {code}: {message}")),
    }
}
