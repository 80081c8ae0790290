use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Separator between namespace and variant in the wire form of a token.
pub const TOKEN_SEPARATOR: char = '/';
/// Platforms cap component identifiers at 100 characters.
pub const MAX_TOKEN_LEN: usize = 100;
pub const MAX_NAMESPACE_LEN: usize = 48;

const NONCE_LEN: usize = 12;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed correlation token `{0}`")]
    MalformedToken(String),
    #[error("namespace `{0}` is already registered")]
    DuplicateNamespace(String),
    #[error("invalid namespace `{namespace}`: {reason}")]
    InvalidNamespace { namespace: String, reason: &'static str },
    #[error("correlation token for namespace `{0}` has an empty variant")]
    EmptyVariant(String),
    #[error("correlation token `{token}` exceeds {MAX_TOKEN_LEN} characters")]
    TokenTooLong { token: String },
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(value: impl Into<String>) -> Result<Self, CodecError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(CodecError::InvalidNamespace { namespace: value, reason: "empty" });
        }
        if value.contains(TOKEN_SEPARATOR) {
            return Err(CodecError::InvalidNamespace {
                namespace: value,
                reason: "contains the `/` separator",
            });
        }
        if value.chars().count() > MAX_NAMESPACE_LEN {
            return Err(CodecError::InvalidNamespace { namespace: value, reason: "too long" });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier round-tripped by the platform on interactive components.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokenCodec;

impl TokenCodec {
    pub fn encode(
        &self,
        namespace: &Namespace,
        variant: &str,
    ) -> Result<CorrelationToken, CodecError> {
        if variant.is_empty() {
            return Err(CodecError::EmptyVariant(namespace.as_str().to_owned()));
        }
        let token = format!("{}{TOKEN_SEPARATOR}{variant}", namespace.as_str());
        if token.chars().count() > MAX_TOKEN_LEN {
            return Err(CodecError::TokenTooLong { token });
        }
        Ok(CorrelationToken(token))
    }

    /// Inverse of [`TokenCodec::encode`]. Splits on the first separator, which
    /// is unambiguous because namespaces never contain one.
    pub fn decode(&self, raw: &str) -> Result<(Namespace, String), CodecError> {
        let Some((namespace, variant)) = raw.split_once(TOKEN_SEPARATOR) else {
            return Err(CodecError::MalformedToken(raw.to_owned()));
        };
        if variant.is_empty() || raw.chars().count() > MAX_TOKEN_LEN {
            return Err(CodecError::MalformedToken(raw.to_owned()));
        }
        let namespace =
            Namespace::new(namespace).map_err(|_| CodecError::MalformedToken(raw.to_owned()))?;
        Ok((namespace, variant.to_owned()))
    }

    pub fn parse(&self, raw: &str) -> Result<CorrelationToken, CodecError> {
        self.decode(raw)?;
        Ok(CorrelationToken(raw.to_owned()))
    }
}

/// Process-wide set of claimed namespaces, checked once at startup.
#[derive(Clone, Debug, Default)]
pub struct NamespaceSet {
    claimed: BTreeSet<Namespace>,
}

impl NamespaceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, namespace: &str) -> Result<Namespace, CodecError> {
        let namespace = Namespace::new(namespace)?;
        if !self.claimed.insert(namespace.clone()) {
            return Err(CodecError::DuplicateNamespace(namespace.0));
        }
        Ok(namespace)
    }

    pub fn contains(&self, namespace: &Namespace) -> bool {
        self.claimed.contains(namespace)
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}

/// Per-issuance suffix keeping two sessions of the same prompt kind apart.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PromptNonce(String);

impl PromptNonce {
    pub fn generate() -> Self {
        let mut value = Uuid::new_v4().simple().to_string();
        value.truncate(NONCE_LEN);
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn scope(&self, label: &str) -> String {
        format!("{label}@{}", self.0)
    }
}

/// Whether `variant` carries a [`PromptNonce`] suffix (`label@` followed by
/// the nonce's hex digits).
pub fn is_scoped_variant(variant: &str) -> bool {
    variant.rsplit_once('@').is_some_and(|(label, nonce)| {
        !label.is_empty()
            && nonce.len() == NONCE_LEN
            && nonce.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    })
}
