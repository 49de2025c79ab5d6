//! Tile merge engine.
//!
//! For one tile address, fetches the full and partial tiles, decides per
//! configured layer which full features survive and which partial features
//! are added, and either returns the full tile's bytes verbatim or
//! re-assembles a new tile.
//!
//! A full feature is dropped when it matches one of the layer's class
//! prefixes *and* lies inside the geofence. A partial feature is added under
//! the same condition. Layers without a merge rule are never filtered.
//!
//! # Fast paths
//!
//! - below the configured minimum zoom, or on tiles disjoint from the
//!   geofence, the partial source is not consulted and the full bytes are
//!   returned as received
//! - on tiles wholly inside the geofence, per-feature point tests are skipped
//! - when no full feature is dropped and nothing is added, the full bytes are
//!   returned as received

mod error;
pub mod metadata;

pub use error::MergeError;

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::classify::{matches, LayerRule};
use crate::coord::TileCoord;
use crate::geofence::{Geofence, PointPredicate};
use crate::rank::rank;
use crate::source::{FetchedTile, RequestContext, TileSource};
use crate::tile::{assemble_with, Feature, IdGenerator, RandomIds, VectorTile, DEFAULT_EXTENT};

/// Everything needed to merge one dataset. Built once, then read-only.
#[derive(Clone)]
pub struct MergeConfig {
    /// Base tiles.
    pub full: Arc<dyn TileSource>,
    /// Curated tiles, authoritative inside the geofence for configured classes.
    pub partial: Arc<dyn TileSource>,
    /// Below this zoom the full tile is served unchanged.
    pub min_zoom: u8,
    /// Area where the partial source applies. `None` means everywhere.
    pub geofence: Option<Geofence>,
    /// Merge rule per output layer, iterated in name order.
    pub layers: BTreeMap<String, LayerRule>,
}

impl MergeConfig {
    /// A configuration with no layers, no geofence and minimum zoom 0.
    pub fn new(full: Arc<dyn TileSource>, partial: Arc<dyn TileSource>) -> Self {
        Self {
            full,
            partial,
            min_zoom: 0,
            geofence: None,
            layers: BTreeMap::new(),
        }
    }

    pub fn with_min_zoom(mut self, min_zoom: u8) -> Self {
        self.min_zoom = min_zoom;
        self
    }

    pub fn with_geofence(mut self, geofence: Geofence) -> Self {
        self.geofence = Some(geofence);
        self
    }

    pub fn with_layer(mut self, name: impl Into<String>, rule: LayerRule) -> Self {
        self.layers.insert(name.into(), rule);
        self
    }
}

/// Outcome of a merge.
#[derive(Debug, Clone, PartialEq)]
pub enum MergedTile {
    /// The full tile's bytes, exactly as fetched.
    Passthrough(Bytes),
    /// A freshly assembled tile.
    Assembled(Bytes),
    /// Neither source has anything to serve.
    Missing,
}

impl MergedTile {
    /// The bytes to serve, if any.
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            MergedTile::Passthrough(bytes) | MergedTile::Assembled(bytes) => Some(bytes),
            MergedTile::Missing => None,
        }
    }
}

/// Merges one tile.
///
/// Headers and query string in `ctx` are forwarded to both sources. Any
/// fetch failure aborts the request.
pub async fn merge_tile(
    config: &MergeConfig,
    coord: TileCoord,
    ctx: &RequestContext,
) -> Result<MergedTile, MergeError> {
    let below_min_zoom = coord.z < config.min_zoom;
    let disjoint = !below_min_zoom
        && config
            .geofence
            .as_ref()
            .is_some_and(|fence| fence.tile_disjoint(&coord));

    if below_min_zoom || disjoint {
        debug!(tile = %coord, below_min_zoom, disjoint, "Serving full tile unchanged");
        let full = fetch(config.full.as_ref(), coord, ctx).await?;
        return Ok(full.map_or(MergedTile::Missing, |f| MergedTile::Passthrough(f.raw)));
    }

    let (full, partial) = tokio::try_join!(
        fetch(config.full.as_ref(), coord, ctx),
        fetch(config.partial.as_ref(), coord, ctx),
    )?;

    merge_fetched(config, coord, full, partial, &mut RandomIds)
}

async fn fetch(
    source: &dyn TileSource,
    coord: TileCoord,
    ctx: &RequestContext,
) -> Result<Option<FetchedTile>, MergeError> {
    source
        .tile(coord, ctx)
        .await
        .map_err(|e| MergeError::from_source(source.name(), e))
}

/// Full-side result for one layer.
enum FullKept {
    /// The full tile has no such layer.
    Absent,
    /// The rule is disabled; the layer was not decoded.
    Whole,
    /// Survivors of filtering, and how many features were dropped.
    Filtered { features: Vec<Feature>, dropped: usize },
}

struct LayerPlan<'a> {
    name: &'a str,
    rule: &'a LayerRule,
    kept: FullKept,
    added: Vec<Feature>,
}

/// Geofence point test for one layer, or none when every point counts as inside.
struct InsideTest<'a>(Option<PointPredicate<'a>>);

impl<'a> InsideTest<'a> {
    fn new(fence: Option<&'a Geofence>, coord: &TileCoord, tile: &VectorTile, layer: &str) -> Self {
        let extent = tile.layer_extent(layer).unwrap_or(DEFAULT_EXTENT);
        Self(fence.map(|f| f.point_predicate_with_extent(coord, extent)))
    }

    /// Features without any coordinate count as outside.
    fn check(&self, feature: &Feature) -> bool {
        match &self.0 {
            None => true,
            Some(predicate) => feature
                .geometry
                .first_point()
                .is_some_and(|p| predicate.contains(p.x, p.y)),
        }
    }
}

/// Merges two already fetched tiles.
///
/// Pure apart from `ids`, which only supplies ids for features that lack
/// one. Identical inputs and a deterministic `ids` give identical bytes.
///
/// # Arguments
///
/// * `config` - Dataset configuration
/// * `coord` - Address of both tiles
/// * `full` - Full tile, if the full source has one
/// * `partial` - Partial tile, if the partial source has one
/// * `ids` - Id source for features without an id
pub fn merge_fetched(
    config: &MergeConfig,
    coord: TileCoord,
    full: Option<FetchedTile>,
    partial: Option<FetchedTile>,
    ids: &mut dyn IdGenerator,
) -> Result<MergedTile, MergeError> {
    let full_name = config.full.name();
    let partial_name = config.partial.name();

    let fence = config.geofence.as_ref().filter(|fence| {
        let inside = fence.tile_fully_inside(&coord);
        if inside {
            debug!(tile = %coord, "Tile inside geofence, skipping point tests");
        }
        !inside
    });

    let mut plans = Vec::with_capacity(config.layers.len());
    for (name, rule) in &config.layers {
        let kept = match &full {
            Some(f) => filter_full(&f.tile, name, rule, fence, &coord)
                .map_err(|e| MergeError::from_tile(full_name, e))?,
            None => FullKept::Absent,
        };
        let added = match &partial {
            Some(p) => select_partial(&p.tile, name, rule, fence, &coord)
                .map_err(|e| MergeError::from_tile(partial_name, e))?,
            None => Vec::new(),
        };
        plans.push(LayerPlan {
            name,
            rule,
            kept,
            added,
        });
    }

    if plans.iter().all(|plan| plan.added.is_empty()) {
        let Some(full) = full else {
            debug!(tile = %coord, "No tile from either source");
            return Ok(MergedTile::Missing);
        };

        let replacements: Vec<(String, Vec<Feature>)> = plans
            .into_iter()
            .filter_map(|plan| match plan.kept {
                FullKept::Filtered { features, dropped } if dropped > 0 => {
                    Some((plan.name.to_string(), features))
                }
                _ => None,
            })
            .collect();

        if replacements.is_empty() {
            debug!(tile = %coord, "Nothing to merge, serving full tile unchanged");
            return Ok(MergedTile::Passthrough(full.raw));
        }

        debug!(tile = %coord, layers = replacements.len(), "Removing features from full tile");
        let tile = assemble_with(Some(full.tile), replacements, ids);
        return Ok(MergedTile::Assembled(tile.to_bytes()));
    }

    let base = full.map(|f| f.tile);
    let mut replacements = Vec::with_capacity(plans.len());
    for plan in plans {
        let kept = match plan.kept {
            FullKept::Absent => Vec::new(),
            FullKept::Whole => match &base {
                Some(tile) => tile
                    .features(plan.name)
                    .map_err(|e| MergeError::from_tile(full_name, e))?
                    .unwrap_or_default(),
                None => Vec::new(),
            },
            FullKept::Filtered { features, .. } => features,
        };

        let mut added = plan.added;
        let output_extent = base.as_ref().and_then(|tile| tile.layer_extent(plan.name));
        let added_extent = partial.as_ref().and_then(|p| p.tile.layer_extent(plan.name));
        if let (Some(to), Some(from)) = (output_extent, added_extent) {
            if from != to && !added.is_empty() {
                debug!(tile = %coord, layer = plan.name, from, to, "Rescaling partial features");
                for feature in &mut added {
                    feature.geometry.rescale(from, to);
                }
            }
        }

        let merged = if kept.is_empty() {
            added
        } else {
            let mut merged = kept;
            merged.extend(added);
            rank(&mut merged, &plan.rule.rank);
            merged
        };
        replacements.push((plan.name.to_string(), merged));
    }

    debug!(
        tile = %coord,
        has_full = base.is_some(),
        layers = replacements.len(),
        "Assembling merged tile"
    );
    let tile = assemble_with(base, replacements, ids);
    Ok(MergedTile::Assembled(tile.to_bytes()))
}

/// Full features to keep: everything except class matches inside the fence.
fn filter_full(
    tile: &VectorTile,
    name: &str,
    rule: &LayerRule,
    fence: Option<&Geofence>,
    coord: &TileCoord,
) -> crate::tile::TileResult<FullKept> {
    if !rule.is_enabled() {
        return Ok(if tile.has_layer(name) {
            FullKept::Whole
        } else {
            FullKept::Absent
        });
    }
    let Some(features) = tile.features(name)? else {
        return Ok(FullKept::Absent);
    };

    let inside = InsideTest::new(fence, coord, tile, name);
    let total = features.len();
    let features: Vec<Feature> = features
        .into_iter()
        .filter(|f| !(matches(rule, f, &rule.classes) && inside.check(f)))
        .collect();

    Ok(FullKept::Filtered {
        dropped: total - features.len(),
        features,
    })
}

/// Partial features to add: class matches inside the fence.
fn select_partial(
    tile: &VectorTile,
    name: &str,
    rule: &LayerRule,
    fence: Option<&Geofence>,
    coord: &TileCoord,
) -> crate::tile::TileResult<Vec<Feature>> {
    if !rule.is_enabled() {
        return Ok(Vec::new());
    }
    let Some(features) = tile.features(name)? else {
        return Ok(Vec::new());
    };

    let inside = InsideTest::new(fence, coord, tile, name);
    Ok(features
        .into_iter()
        .filter(|f| matches(rule, f, &rule.classes) && inside.check(f))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ClassPrefix;
    use crate::source::tests::MockTileSource;
    use crate::tile::{assemble, AttributeValue, Attributes, Geometry, TilePoint};

    struct Sequence(u64);

    impl IdGenerator for Sequence {
        fn next_id(&mut self) -> u64 {
            self.0 += 1;
            self.0
        }
    }

    fn poi(id: u64, x: i32, y: i32, class: &str) -> Feature {
        Feature::new(Geometry::Point(vec![TilePoint::new(x, y)]))
            .with_id(id)
            .with_attributes(Attributes::from_pairs([("class", class)]))
    }

    fn tile(layers: Vec<(&str, Vec<Feature>)>) -> VectorTile {
        assemble(
            None,
            layers.into_iter().map(|(n, f)| (n.to_string(), f)).collect(),
        )
    }

    fn shop_rule() -> LayerRule {
        let classes: Vec<ClassPrefix> = vec![vec![Some(AttributeValue::from("shop"))]];
        LayerRule::new(vec!["class".to_string()], classes).unwrap()
    }

    fn config(full: MockTileSource, partial: MockTileSource) -> MergeConfig {
        MergeConfig::new(Arc::new(full), Arc::new(partial)).with_layer("poi", shop_rule())
    }

    fn decoded(merged: MergedTile) -> VectorTile {
        VectorTile::decode(&merged.into_bytes().unwrap()).unwrap()
    }

    const COORD: TileCoord = TileCoord { z: 14, x: 8000, y: 5000 };

    #[tokio::test]
    async fn test_fast_path_returns_full_bytes() {
        let full = tile(vec![("poi", vec![poi(1, 10, 10, "cafe")])]);
        let partial = tile(vec![("poi", vec![poi(2, 10, 10, "bank")])]);
        let cfg = config(
            MockTileSource::new("full").with_tile(COORD, &full),
            MockTileSource::new("partial").with_tile(COORD, &partial),
        );

        let merged = merge_tile(&cfg, COORD, &RequestContext::default()).await.unwrap();
        assert_eq!(merged, MergedTile::Passthrough(full.to_bytes()));
    }

    #[tokio::test]
    async fn test_min_zoom_skips_partial() {
        let full = tile(vec![("poi", vec![poi(1, 10, 10, "shop")])]);
        let partial = Arc::new(MockTileSource::new("partial").with_tile(
            TileCoord::new(5, 1, 1),
            &tile(vec![("poi", vec![poi(2, 10, 10, "shop")])]),
        ));
        let cfg = MergeConfig::new(
            Arc::new(MockTileSource::new("full").with_tile(TileCoord::new(5, 1, 1), &full)),
            partial.clone(),
        )
        .with_min_zoom(14)
        .with_layer("poi", shop_rule());

        let merged = merge_tile(&cfg, TileCoord::new(5, 1, 1), &RequestContext::default())
            .await
            .unwrap();
        assert_eq!(merged, MergedTile::Passthrough(full.to_bytes()));
        assert_eq!(partial.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_full_tile_below_min_zoom() {
        let cfg = config(MockTileSource::new("full"), MockTileSource::new("partial")).with_min_zoom(10);
        let merged = merge_tile(&cfg, TileCoord::new(3, 0, 0), &RequestContext::default())
            .await
            .unwrap();
        assert_eq!(merged, MergedTile::Missing);
    }

    #[tokio::test]
    async fn test_both_missing_is_missing() {
        let cfg = config(MockTileSource::new("full"), MockTileSource::new("partial"));
        let merged = merge_tile(&cfg, COORD, &RequestContext::default()).await.unwrap();
        assert_eq!(merged, MergedTile::Missing);
    }

    #[tokio::test]
    async fn test_replaces_matching_features() {
        let full = tile(vec![
            ("poi", vec![poi(1, 10, 10, "shop"), poi(2, 500, 500, "cafe")]),
            ("roads", vec![poi(9, 0, 0, "primary")]),
        ]);
        let partial = tile(vec![("poi", vec![poi(3, 12, 12, "shop"), poi(4, 600, 600, "cafe")])]);
        let cfg = config(
            MockTileSource::new("full").with_tile(COORD, &full),
            MockTileSource::new("partial").with_tile(COORD, &partial),
        );

        let out = decoded(merge_tile(&cfg, COORD, &RequestContext::default()).await.unwrap());
        let features = out.features("poi").unwrap().unwrap();
        let ids: Vec<_> = features.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![Some(2), Some(3)]);
        assert!(features.iter().all(|f| f.attributes.get("rank").is_some()));
        // Untouched layer survives
        assert_eq!(out.feature_count("roads"), Some(1));
    }

    #[tokio::test]
    async fn test_removal_only_reassembles() {
        let full = tile(vec![("poi", vec![poi(1, 10, 10, "shop"), poi(2, 20, 20, "cafe")])]);
        let cfg = config(
            MockTileSource::new("full").with_tile(COORD, &full),
            MockTileSource::new("partial"),
        );

        let merged = merge_tile(&cfg, COORD, &RequestContext::default()).await.unwrap();
        assert!(matches!(merged, MergedTile::Assembled(_)));
        let out = decoded(merged);
        let features = out.features("poi").unwrap().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].id, Some(2));
        // No partial contribution, no ranking
        assert!(features[0].attributes.get("rank").is_none());
    }

    #[tokio::test]
    async fn test_partial_only() {
        let partial = tile(vec![("poi", vec![poi(3, 12, 12, "shop"), poi(4, 40, 40, "cafe")])]);
        let cfg = config(
            MockTileSource::new("full"),
            MockTileSource::new("partial").with_tile(COORD, &partial),
        );

        let out = decoded(merge_tile(&cfg, COORD, &RequestContext::default()).await.unwrap());
        let features = out.features("poi").unwrap().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].id, Some(3));
        assert!(features[0].attributes.get("rank").is_none());
    }

    #[tokio::test]
    async fn test_disabled_rule_leaves_layer_alone() {
        let full = tile(vec![("poi", vec![poi(1, 10, 10, "shop")])]);
        let partial = tile(vec![("poi", vec![poi(2, 10, 10, "shop")])]);
        let cfg = MergeConfig::new(
            Arc::new(MockTileSource::new("full").with_tile(COORD, &full)),
            Arc::new(MockTileSource::new("partial").with_tile(COORD, &partial)),
        )
        .with_layer("poi", LayerRule::disabled());

        let merged = merge_tile(&cfg, COORD, &RequestContext::default()).await.unwrap();
        assert_eq!(merged, MergedTile::Passthrough(full.to_bytes()));
    }

    #[tokio::test]
    async fn test_upstream_failure_aborts() {
        let cfg = config(
            MockTileSource::new("full").with_tile(COORD, &VectorTile::empty()),
            MockTileSource::new("partial").failing(503),
        );
        let err = merge_tile(&cfg, COORD, &RequestContext::default()).await.unwrap_err();
        assert!(matches!(
            err,
            MergeError::UpstreamUnavailable { status: Some(503), ref source_name, .. } if source_name == "partial"
        ));
    }

    #[tokio::test]
    async fn test_undecodable_full_tile() {
        let cfg = config(
            MockTileSource::new("full").with_raw(COORD, Bytes::from_static(&[0xff, 0xff, 0xff])),
            MockTileSource::new("partial"),
        );
        let err = merge_tile(&cfg, COORD, &RequestContext::default()).await.unwrap_err();
        assert!(matches!(err, MergeError::DecodeFailure { .. }));
    }

    #[test]
    fn test_ids_assigned_only_when_missing() {
        let partial = tile(vec![(
            "poi",
            vec![poi(7, 10, 10, "shop")],
        )]);
        let mut without_id = partial.features("poi").unwrap().unwrap();
        without_id[0].id = None;
        let partial = assemble_with(None, vec![("poi".to_string(), without_id)], &mut Sequence(100));

        let cfg = config(MockTileSource::new("full"), MockTileSource::new("partial"));
        let partial = FetchedTile::decode(partial.to_bytes()).unwrap();
        let out = decoded(merge_fetched(&cfg, COORD, None, Some(partial), &mut Sequence(500)).unwrap());
        assert_eq!(out.features("poi").unwrap().unwrap()[0].id, Some(101));
    }

    #[tokio::test]
    async fn test_request_context_reaches_both_sources() {
        let full = Arc::new(
            MockTileSource::new("full").with_tile(COORD, &tile(vec![("poi", vec![poi(1, 10, 10, "cafe")])])),
        );
        let partial = Arc::new(MockTileSource::new("partial"));
        let cfg = MergeConfig::new(full.clone(), partial.clone()).with_layer("poi", shop_rule());

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-api-key", "secret".parse().unwrap());
        let ctx = RequestContext::new(headers, Some("key=abc".to_string()));
        merge_tile(&cfg, COORD, &ctx).await.unwrap();

        for source in [&full, &partial] {
            let seen = source.last_context().unwrap();
            assert_eq!(seen.query.as_deref(), Some("key=abc"), "{}", source.name);
            assert_eq!(seen.headers.get("x-api-key").unwrap(), "secret", "{}", source.name);
        }
    }

    #[tokio::test]
    async fn test_partial_features_rescaled_to_full_extent() {
        let full = tile(vec![("poi", vec![poi(1, 10, 10, "cafe")])]);
        let mut partial = tile(vec![("poi", vec![poi(2, 2000, 4000, "shop")])]);
        partial.layers_mut()[0].extent = Some(8192);

        let cfg = config(
            MockTileSource::new("full").with_tile(COORD, &full),
            MockTileSource::new("partial").with_tile(COORD, &partial),
        );
        let out = decoded(merge_tile(&cfg, COORD, &RequestContext::default()).await.unwrap());

        assert_eq!(out.layer_extent("poi"), Some(DEFAULT_EXTENT));
        let shop = out
            .features("poi")
            .unwrap()
            .unwrap()
            .into_iter()
            .find(|f| f.id == Some(2))
            .unwrap();
        assert_eq!(shop.geometry, Geometry::Point(vec![TilePoint::new(1000, 2000)]));
    }

    #[test]
    fn test_merged_tile_into_bytes() {
        assert_eq!(MergedTile::Missing.into_bytes(), None);
        assert_eq!(
            MergedTile::Assembled(Bytes::from_static(b"x")).into_bytes(),
            Some(Bytes::from_static(b"x"))
        );
    }
}
