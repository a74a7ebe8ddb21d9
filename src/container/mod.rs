//! The value container: a fixed six-field header plus a top-level data
//! list, serialized to and from the wire grammar described in spec
//! §4.1.
//!
//! ```text
//! @header={[K,V];...};@data={[N,T,V];...};
//! ```
//!
//! `K` is one of the numeric header keys `1..6`, mapping respectively to
//! `target_id`, `target_sub_id`, `source_id`, `source_sub_id`,
//! `message_type`, `version` (spec §4.1). The four address fields are
//! omitted from the header when `message_type == "data_container"`
//! (the default), matching scenario S1.
//!
//! Container-typed data triples (`[name,e,count]`) declare a child count
//! but carry no nested bracket syntax of their own — the flat `@data`
//! list is walked once and re-nested into a tree after parsing (see
//! `wire::renest`).

mod projection;
mod wire;

pub use projection::{JsonProjection, XmlProjection};

use crate::error::{Error, Result};
use crate::value::ValueRef;

/// Default `message_type`, per spec §3. Suppresses the four address
/// fields from the serialized header.
pub const DEFAULT_MESSAGE_TYPE: &str = "data_container";

/// Default `version`, per spec §3.
pub const DEFAULT_VERSION: &str = "1.0.0.0";

/// A parsed or in-progress value container.
#[derive(Debug, Clone)]
pub struct ValueContainer {
    pub source_id: String,
    pub source_sub_id: String,
    pub target_id: String,
    pub target_sub_id: String,
    pub message_type: String,
    pub version: String,
    roots: Vec<ValueRef>,
}

impl Default for ValueContainer {
    fn default() -> Self {
        ValueContainer {
            source_id: String::new(),
            source_sub_id: String::new(),
            target_id: String::new(),
            target_sub_id: String::new(),
            message_type: DEFAULT_MESSAGE_TYPE.to_string(),
            version: DEFAULT_VERSION.to_string(),
            roots: Vec::new(),
        }
    }
}

impl ValueContainer {
    pub fn new() -> Self {
        ValueContainer::default()
    }

    /// Builds an addressed container (any `message_type` other than the
    /// default emits all six header fields).
    pub fn addressed(
        message_type: impl Into<String>,
        source_id: impl Into<String>,
        source_sub_id: impl Into<String>,
        target_id: impl Into<String>,
        target_sub_id: impl Into<String>,
    ) -> Self {
        ValueContainer {
            source_id: source_id.into(),
            source_sub_id: source_sub_id.into(),
            target_id: target_id.into(),
            target_sub_id: target_sub_id.into(),
            message_type: message_type.into(),
            version: DEFAULT_VERSION.to_string(),
            roots: Vec::new(),
        }
    }

    pub fn add_root(&mut self, value: ValueRef) {
        self.roots.push(value);
    }

    pub fn roots(&self) -> &[ValueRef] {
        &self.roots
    }

    /// Finds a top-level root by name. Nested lookups walk `children()`
    /// on the returned value.
    pub fn find(&self, name: &str) -> Option<&ValueRef> {
        self.roots.iter().find(|v| v.lock().name() == name)
    }

    /// Serializes header and data sections to the wire grammar.
    pub fn serialize(&self) -> String {
        wire::serialize(self)
    }

    /// Parses the wire grammar into header fields plus a re-nested root
    /// list, per the algorithm in spec §4.1.
    pub fn deserialize(text: &str) -> Result<ValueContainer> {
        wire::deserialize(text)
    }

    pub fn to_xml(&self) -> String {
        XmlProjection::render(self)
    }

    pub fn to_json(&self) -> String {
        JsonProjection::render(self)
    }
}

/// Wraps a single top-level value in a fresh, default-addressed
/// container — a shorthand used throughout the session/bus layers for
/// small request/response payloads.
pub fn scalar_container(value: ValueRef) -> ValueContainer {
    let mut c = ValueContainer::new();
    c.add_root(value);
    c
}

pub(crate) fn invalid(msg: impl Into<String>) -> Error {
    Error::ParseError(msg.into())
}
