//! Output tile assembly.
//!
//! Rebuilds a tile from a base tile plus replacement layers. Base layers
//! named like a replacement are dropped wholesale before the replacement is
//! appended, one replacement at a time.
//!
//! Each appended layer starts from the dictionary of its first feature.
//! Features sharing that dictionary keep their tag indices; only edited
//! attributes and features from another source layer are interned.
//!
//! Geometry is written as given. Features must already be on the output
//! layer's grid: the extent of the dropped base layer, else the extent of
//! the first feature's source layer.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use prost::Message;

use super::attributes::LayerDictionary;
use super::geometry::Geometry;
use super::proto;
use super::{Feature, VectorTile, DEFAULT_EXTENT};

/// Layer format version written to appended layers.
const LAYER_VERSION: u32 = 2;

/// Source of ids for features that arrive without one.
pub trait IdGenerator {
    fn next_id(&mut self) -> u64;
}

/// Uniform random 32-bit ids. Not guaranteed unique within a layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&mut self) -> u64 {
        u64::from(rand::random::<u32>())
    }
}

/// Assembles a tile, assigning random ids to features without one.
///
/// # Arguments
///
/// * `base` - Tile whose layers are carried over, or `None` for an empty base
/// * `replacements` - `(layer_name, features)` pairs appended in order
pub fn assemble(base: Option<VectorTile>, replacements: Vec<(String, Vec<Feature>)>) -> VectorTile {
    assemble_with(base, replacements, &mut RandomIds)
}

/// Assembles a tile with a caller-provided id generator.
pub fn assemble_with(
    base: Option<VectorTile>,
    replacements: Vec<(String, Vec<Feature>)>,
    ids: &mut dyn IdGenerator,
) -> VectorTile {
    let mut tile = base.unwrap_or_default();

    for (name, features) in replacements {
        let layers = tile.layers_mut();
        let dropped_extent = layers
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.extent.unwrap_or(DEFAULT_EXTENT));
        layers.retain(|l| l.name != name);

        let seed = features
            .first()
            .map(|f| Arc::clone(f.attributes.dictionary()));
        let extent = dropped_extent
            .or_else(|| seed.as_ref().and_then(|d| d.extent))
            .unwrap_or(DEFAULT_EXTENT);

        let mut builder = LayerBuilder::new(name, seed);
        for feature in features {
            builder.push(feature, ids);
        }
        layers.push(builder.finish(extent));
    }

    tile
}

struct LayerBuilder {
    name: String,
    seed: Option<Arc<LayerDictionary>>,
    keys: Vec<String>,
    values: Vec<proto::Value>,
    // Built on first foreign or edited attribute.
    key_index: Option<HashMap<String, u32>>,
    value_index: Option<HashMap<Vec<u8>, u32>>,
    features: Vec<proto::Feature>,
}

impl LayerBuilder {
    fn new(name: String, seed: Option<Arc<LayerDictionary>>) -> Self {
        let (keys, values) = match &seed {
            Some(d) => (d.keys.clone(), d.raw_values.clone()),
            None => (Vec::new(), Vec::new()),
        };
        Self {
            name,
            seed,
            keys,
            values,
            key_index: None,
            value_index: None,
            features: Vec::new(),
        }
    }

    fn push(&mut self, feature: Feature, ids: &mut dyn IdGenerator) {
        let attributes = &feature.attributes;
        let seeded = self
            .seed
            .as_ref()
            .is_some_and(|s| Arc::ptr_eq(s, attributes.dictionary()));

        let tags = if seeded && !attributes.is_dirty() {
            attributes.tags().to_vec()
        } else {
            let dictionary = attributes.dictionary();
            let mut tags = Vec::with_capacity(attributes.tags().len() + attributes.edits().len() * 2);
            for (k, v) in attributes.original_pairs() {
                if seeded {
                    tags.extend([k, v]);
                } else {
                    tags.push(self.intern_key(&dictionary.keys[k as usize]));
                    tags.push(self.intern_value(&dictionary.raw_values[v as usize]));
                }
            }
            for (k, v) in attributes.edits() {
                tags.push(self.intern_key(k));
                tags.push(self.intern_value(&v.to_proto()));
            }
            tags
        };

        let (spline_knots, spline_degree) = match &feature.geometry {
            Geometry::Spline { knots, degree, .. } => (knots.clone(), Some(*degree)),
            _ => (Vec::new(), None),
        };

        self.features.push(proto::Feature {
            id: Some(feature.id.unwrap_or_else(|| ids.next_id())),
            tags,
            r#type: Some(feature.geometry.geom_type() as i32),
            geometry: feature.geometry.encode(),
            spline_knots,
            spline_degree,
        });
    }

    fn intern_key(&mut self, key: &str) -> u32 {
        let index = self
            .key_index
            .get_or_insert_with(|| index_of(self.keys.iter().cloned()));
        if let Some(&i) = index.get(key) {
            return i;
        }
        let i = self.keys.len() as u32;
        self.keys.push(key.to_string());
        index.insert(key.to_string(), i);
        i
    }

    fn intern_value(&mut self, value: &proto::Value) -> u32 {
        let encoded = value.encode_to_vec();
        let index = self
            .value_index
            .get_or_insert_with(|| index_of(self.values.iter().map(|v| v.encode_to_vec())));
        if let Some(&i) = index.get(&encoded) {
            return i;
        }
        let i = self.values.len() as u32;
        self.values.push(value.clone());
        index.insert(encoded, i);
        i
    }

    fn finish(self, extent: u32) -> proto::Layer {
        proto::Layer {
            version: LAYER_VERSION,
            name: self.name,
            features: self.features,
            keys: self.keys,
            values: self.values,
            extent: Some(extent),
        }
    }
}

/// Maps each item to its first position.
fn index_of<K: Hash + Eq>(items: impl Iterator<Item = K>) -> HashMap<K, u32> {
    let mut index = HashMap::new();
    for (i, item) in items.enumerate() {
        index.entry(item).or_insert(i as u32);
    }
    index
}
