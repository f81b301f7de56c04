//! Graph payload model exchanged with the storage backend and the transport.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Literal
// ---------------------------------------------------------------------------

/// A scalar property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl Literal {
    /// The text content, if this is a text literal.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

/// Provenance of a node returned by a find-or-create query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindResult {
    /// The node existed before the query ran.
    Found,
    /// The query created the node.
    Created,
}

/// Per-operation execution flags. Not stored as node attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Flags {
    /// Create a node from the payload when `find_nodes` matches nothing.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub create_if_missing: bool,

    /// Query output column → logical result key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub translation_key: BTreeMap<String, String>,

    /// Positional query parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Literal>,

    /// Set by the backend on each result of a find.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub find_result: Option<FindResult>,

    /// Extra query columns, keyed through the translation key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub columns: BTreeMap<String, Literal>,
}

// ---------------------------------------------------------------------------
// StoragePayload
// ---------------------------------------------------------------------------

/// A graph node, or a template of one, as handed to and returned by the
/// storage backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoragePayload {
    /// Node identity. `None` for a template that has not been created yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,

    #[serde(default)]
    pub types: BTreeSet<String>,

    /// Property URI → values, in stored order.
    #[serde(default)]
    pub properties: BTreeMap<String, Vec<Literal>>,

    /// Predicate URI → related node URIs.
    #[serde(default)]
    pub references: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub flags: Flags,
}

impl StoragePayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// A payload identifying an existing node.
    pub fn about(uri: impl Into<String>) -> Self {
        Self {
            about: Some(uri.into()),
            ..Self::default()
        }
    }

    /// A query payload: the query text plus positional parameters.
    pub fn query(text: impl Into<String>, parameters: Vec<Literal>) -> Self {
        let mut payload = Self::default();
        payload.add_property(crate::namespace::query::TEXT, text.into());
        payload.flags.parameters = parameters;
        payload
    }

    pub fn add_type(&mut self, type_uri: impl Into<String>) {
        self.types.insert(type_uri.into());
    }

    pub fn has_type(&self, type_uri: &str) -> bool {
        self.types.contains(type_uri)
    }

    /// Append a value to a property. Duplicate values are ignored.
    pub fn add_property(&mut self, key: impl Into<String>, value: impl Into<Literal>) {
        let value = value.into();
        let values = self.properties.entry(key.into()).or_default();
        if !values.contains(&value) {
            values.push(value);
        }
    }

    /// Replace every value of a property.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Literal>) {
        self.properties.insert(key.into(), vec![value.into()]);
    }

    /// Values of a property; empty if absent.
    pub fn property(&self, key: &str) -> &[Literal] {
        self.properties.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn add_reference(&mut self, predicate: impl Into<String>, target: impl Into<String>) {
        let target = target.into();
        let targets = self.references.entry(predicate.into()).or_default();
        if !targets.contains(&target) {
            targets.push(target);
        }
    }

    /// Whether the backend flagged this result as newly created.
    pub fn was_created(&self) -> bool {
        self.flags.find_result == Some(FindResult::Created)
    }
}

// ---------------------------------------------------------------------------
// ResultCollection
// ---------------------------------------------------------------------------

/// Ordered results of a find, update, or query operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultCollection {
    pub results: Vec<StoragePayload>,
}

impl ResultCollection {
    pub fn new(results: Vec<StoragePayload>) -> Self {
        Self { results }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn first(&self) -> Option<&StoragePayload> {
        self.results.first()
    }

    /// Results the backend created during this operation.
    pub fn created(&self) -> impl Iterator<Item = &StoragePayload> {
        self.results.iter().filter(|r| r.was_created())
    }
}

// ---------------------------------------------------------------------------
// Transport envelope
// ---------------------------------------------------------------------------

/// Kind tag of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    SearchResponse,
    Update,
    Create,
}

/// An inbound request: a payload form describing the wanted node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
    /// Correlation identifier echoed on the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub form: StoragePayload,
}

/// An outbound response wrapping a result collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub payload: ResultCollection,
}

/// Venue-source client credentials carried by the configuration-ready event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub identifier: String,
    pub secret: String,
}
