//! Vector tile wire format.
//!
//! A [`VectorTile`] keeps layers in their wire form. Only the layers a merge
//! actually inspects are decoded into logical [`Feature`]s, and layers that
//! are not replaced are written back byte for byte.
//!
//! # Example
//!
//! ```
//! use vtmerge::tile::{assemble, Attributes, Feature, Geometry, TilePoint, VectorTile};
//!
//! let feature = Feature::new(Geometry::Point(vec![TilePoint::new(10, 20)]))
//!     .with_id(1)
//!     .with_attributes(Attributes::from_pairs([("class", "shop")]));
//! let tile = assemble(None, vec![("poi".to_string(), vec![feature])]);
//!
//! let decoded = VectorTile::decode(&tile.to_bytes()).unwrap();
//! let features = decoded.features("poi").unwrap().unwrap();
//! assert_eq!(features[0].id, Some(1));
//! ```

mod assemble;
mod attributes;
mod error;
mod geometry;
pub mod proto;

pub use assemble::{assemble, assemble_with, IdGenerator, RandomIds};
pub use attributes::{AttributeValue, Attributes, LayerDictionary};
pub use error::{TileError, TileResult};
pub use geometry::{Geometry, TilePoint, DEFAULT_SPLINE_DEGREE};

use std::sync::Arc;

use bytes::Bytes;
use prost::Message;

/// Grid units per tile edge when a layer does not declare an extent.
pub const DEFAULT_EXTENT: u32 = 4096;

/// A decoded tile: an ordered list of uniquely named layers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorTile {
    inner: proto::Tile,
}

impl VectorTile {
    /// A tile with no layers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses tile bytes. Layers are not validated until decoded.
    pub fn decode(bytes: &[u8]) -> TileResult<Self> {
        Ok(Self {
            inner: proto::Tile::decode(bytes)?,
        })
    }

    /// Serializes the tile.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.inner.encode_to_vec())
    }

    /// Names of all layers, in tile order.
    pub fn layer_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.inner.layers.iter().map(|l| l.name.as_str())
    }

    pub fn has_layer(&self, name: &str) -> bool {
        self.layer(name).is_some()
    }

    /// Number of features in a layer, without decoding them.
    pub fn feature_count(&self, name: &str) -> Option<usize> {
        self.layer(name).map(|l| l.features.len())
    }

    /// Extent of a layer, defaulting to [`DEFAULT_EXTENT`].
    pub fn layer_extent(&self, name: &str) -> Option<u32> {
        self.layer(name)
            .map(|l| l.extent.unwrap_or(DEFAULT_EXTENT))
    }

    /// Decodes the features of one layer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(features))` if the layer exists
    /// - `Ok(None)` if the tile has no layer with that name
    /// - `Err(_)` if geometry or tags are malformed
    pub fn features(&self, name: &str) -> TileResult<Option<Vec<Feature>>> {
        self.layer(name).map(decode_layer).transpose()
    }

    pub(crate) fn layer(&self, name: &str) -> Option<&proto::Layer> {
        self.inner.layers.iter().find(|l| l.name == name)
    }

    pub(crate) fn layers_mut(&mut self) -> &mut Vec<proto::Layer> {
        &mut self.inner.layers
    }
}

/// One map feature in logical form.
#[derive(Debug, Clone)]
pub struct Feature {
    /// Optional id, shared namespace per layer.
    pub id: Option<u64>,
    pub geometry: Geometry,
    pub attributes: Attributes,
}

impl Feature {
    /// A feature without id or attributes.
    pub fn new(geometry: Geometry) -> Self {
        Self {
            id: None,
            geometry,
            attributes: Attributes::default(),
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }
}

fn decode_layer(layer: &proto::Layer) -> TileResult<Vec<Feature>> {
    let dictionary = Arc::new(LayerDictionary::from_layer(layer));

    layer
        .features
        .iter()
        .map(|f| {
            dictionary.validate_tags(&layer.name, &f.tags)?;
            let geometry = Geometry::decode(
                &layer.name,
                f.r#type.unwrap_or(0),
                &f.geometry,
                &f.spline_knots,
                f.spline_degree,
            )?;
            Ok(Feature {
                id: f.id,
                geometry,
                attributes: Attributes::from_tags(Arc::clone(&dictionary), f.tags.clone()),
            })
        })
        .collect()
}
