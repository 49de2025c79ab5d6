//! Feature attributes with deferred re-encoding.
//!
//! A decoded feature does not own a key/value map. It keeps its tag pairs
//! and a shared handle on the dictionary of the layer it came from, so reads
//! resolve against the original tables and untouched features can be copied
//! to an output layer without re-encoding. Writes are buffered in an edit
//! list and flip an explicit dirty flag; the assembler encodes them once.

use std::sync::Arc;

use super::error::{TileError, TileResult};
use super::proto;

/// A scalar or array attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Float(f32),
    Double(f64),
    Int(i64),
    UInt(u64),
    SInt(i64),
    Bool(bool),
    List(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(v) => Some(f64::from(*v)),
            AttributeValue::Double(v) => Some(*v),
            AttributeValue::Int(v) | AttributeValue::SInt(v) => Some(*v as f64),
            AttributeValue::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Equality across numeric representations: `Int(1)`, `UInt(1)` and
    /// `Double(1.0)` compare equal. Other kinds compare structurally.
    pub fn loosely_eq(&self, other: &AttributeValue) -> bool {
        match (self, other) {
            (AttributeValue::List(a), AttributeValue::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loosely_eq(y))
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => self == other,
            },
        }
    }

    pub(crate) fn from_proto(value: &proto::Value) -> Self {
        if let Some(s) = &value.string_value {
            AttributeValue::String(s.clone())
        } else if let Some(v) = value.float_value {
            AttributeValue::Float(v)
        } else if let Some(v) = value.double_value {
            AttributeValue::Double(v)
        } else if let Some(v) = value.int_value {
            AttributeValue::Int(v)
        } else if let Some(v) = value.uint_value {
            AttributeValue::UInt(v)
        } else if let Some(v) = value.sint_value {
            AttributeValue::SInt(v)
        } else if let Some(v) = value.bool_value {
            AttributeValue::Bool(v)
        } else {
            AttributeValue::List(value.list_values.iter().map(Self::from_proto).collect())
        }
    }

    pub(crate) fn to_proto(&self) -> proto::Value {
        let mut value = proto::Value::default();
        match self {
            AttributeValue::String(s) => value.string_value = Some(s.clone()),
            AttributeValue::Float(v) => value.float_value = Some(*v),
            AttributeValue::Double(v) => value.double_value = Some(*v),
            AttributeValue::Int(v) => value.int_value = Some(*v),
            AttributeValue::UInt(v) => value.uint_value = Some(*v),
            AttributeValue::SInt(v) => value.sint_value = Some(*v),
            AttributeValue::Bool(v) => value.bool_value = Some(*v),
            AttributeValue::List(items) => {
                value.list_values = items.iter().map(Self::to_proto).collect()
            }
        }
        value
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Double(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

/// Key/value tables of one source layer, shared by all its features.
#[derive(Debug, Default)]
pub struct LayerDictionary {
    pub(crate) keys: Vec<String>,
    pub(crate) values: Vec<AttributeValue>,
    /// Wire form of `values`, copied as is into output layers.
    pub(crate) raw_values: Vec<proto::Value>,
    pub(crate) extent: Option<u32>,
}

impl LayerDictionary {
    pub(crate) fn from_layer(layer: &proto::Layer) -> Self {
        Self {
            keys: layer.keys.clone(),
            values: layer.values.iter().map(AttributeValue::from_proto).collect(),
            raw_values: layer.values.clone(),
            extent: layer.extent,
        }
    }

    /// Checks that a tag array is well formed against this dictionary.
    pub(crate) fn validate_tags(&self, layer: &str, tags: &[u32]) -> TileResult<()> {
        let malformed = |reason: String| TileError::Tags {
            layer: layer.to_string(),
            reason,
        };
        if tags.len() % 2 != 0 {
            return Err(malformed(format!("odd tag count {}", tags.len())));
        }
        for pair in tags.chunks_exact(2) {
            if pair[0] as usize >= self.keys.len() {
                return Err(malformed(format!("key index {} out of range", pair[0])));
            }
            if pair[1] as usize >= self.values.len() {
                return Err(malformed(format!("value index {} out of range", pair[1])));
            }
        }
        Ok(())
    }
}

/// Attribute map of one feature.
#[derive(Debug, Clone)]
pub struct Attributes {
    dictionary: Arc<LayerDictionary>,
    tags: Vec<u32>,
    edits: Vec<(String, AttributeValue)>,
    dirty: bool,
}

impl Default for Attributes {
    fn default() -> Self {
        Self {
            dictionary: Arc::new(LayerDictionary::default()),
            tags: Vec::new(),
            edits: Vec::new(),
            dirty: false,
        }
    }
}

impl Attributes {
    /// Attributes backed by a source layer dictionary. Tags must be validated.
    pub(crate) fn from_tags(dictionary: Arc<LayerDictionary>, tags: Vec<u32>) -> Self {
        Self {
            dictionary,
            tags,
            edits: Vec::new(),
            dirty: false,
        }
    }

    /// Builds a standalone attribute map. The result counts as edited.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<AttributeValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut attributes = Self::default();
        for (k, v) in pairs {
            attributes.set(k, v);
        }
        attributes
    }

    /// Looks a key up, edits first.
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        if let Some((_, v)) = self.edits.iter().find(|(k, _)| k == key) {
            return Some(v);
        }
        self.tags.chunks_exact(2).find_map(|pair| {
            (self.dictionary.keys[pair[0] as usize] == key)
                .then(|| &self.dictionary.values[pair[1] as usize])
        })
    }

    /// Adds or overwrites an attribute and marks the map dirty.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        let key = key.into();
        let value = value.into();
        match self.edits.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.edits.push((key, value)),
        }
        self.dirty = true;
    }

    /// Whether any attribute was written since decoding.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.edits.is_empty()
    }

    /// Iterates over all attributes: untouched originals, then edits.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> + '_ {
        self.original_pairs()
            .map(|(k, v)| {
                (
                    self.dictionary.keys[k as usize].as_str(),
                    &self.dictionary.values[v as usize],
                )
            })
            .chain(self.edits.iter().map(|(k, v)| (k.as_str(), v)))
    }

    pub(crate) fn dictionary(&self) -> &Arc<LayerDictionary> {
        &self.dictionary
    }

    pub(crate) fn tags(&self) -> &[u32] {
        &self.tags
    }

    pub(crate) fn edits(&self) -> &[(String, AttributeValue)] {
        &self.edits
    }

    /// Original tag pairs whose key has not been overwritten.
    pub(crate) fn original_pairs(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.tags
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1]))
            .filter(move |(k, _)| {
                let key = &self.dictionary.keys[*k as usize];
                !self.edits.iter().any(|(edited, _)| edited == key)
            })
    }
}
