//! TileJSON merging.
//!
//! The full source's document is the base. Tile URLs point back at this
//! gateway, attributions of both sources are combined, and configured layers
//! the full source does not describe are borrowed from the partial one.

use std::collections::BTreeSet;

use serde_json::{json, Value as JsonValue};

use super::{MergeConfig, MergeError};
use crate::source::{RequestContext, TileJson};

/// Separator between adjacent HTML links inside one attribution string.
const LINK_BOUNDARY: &str = "/a> <a";

/// Fetches and merges both sources' metadata for a dataset.
///
/// # Arguments
///
/// * `config` - Dataset configuration
/// * `public_tile_urls` - Tile URL templates served by this gateway
/// * `ctx` - Request context forwarded to both sources
pub async fn merged_metadata(
    config: &MergeConfig,
    public_tile_urls: &[String],
    ctx: &RequestContext,
) -> Result<TileJson, MergeError> {
    let (full, partial) = tokio::try_join!(
        async {
            config
                .full
                .tile_metadata(ctx)
                .await
                .map_err(|e| MergeError::from_source(config.full.name(), e))
        },
        async {
            config
                .partial
                .tile_metadata(ctx)
                .await
                .map_err(|e| MergeError::from_source(config.partial.name(), e))
        },
    )?;

    Ok(merge_tilejson(
        full,
        &partial,
        config.layers.keys().map(String::as_str),
        public_tile_urls,
        ctx.query.as_deref(),
    ))
}

/// Merges two metadata documents.
pub fn merge_tilejson<'a>(
    full: TileJson,
    partial: &TileJson,
    layers: impl IntoIterator<Item = &'a str>,
    public_tile_urls: &[String],
    query: Option<&str>,
) -> TileJson {
    let attribution = merge_attribution(
        partial.get("attribution").and_then(JsonValue::as_str).unwrap_or(""),
        full.get("attribution").and_then(JsonValue::as_str).unwrap_or(""),
    );

    let mut merged = full;
    merged.insert("attribution".to_string(), JsonValue::String(attribution));

    if !public_tile_urls.is_empty() {
        let tiles = public_tile_urls
            .iter()
            .map(|url| match query {
                Some(q) => JsonValue::String(format!("{}?{}", url, q)),
                None => JsonValue::String(url.clone()),
            })
            .collect();
        merged.insert("tiles".to_string(), JsonValue::Array(tiles));
    }

    if let Some(JsonValue::Array(vector_layers)) = merged.get_mut("vector_layers") {
        let partial_layers = partial
            .get("vector_layers")
            .and_then(JsonValue::as_array);
        for layer in layers {
            if vector_layers.iter().any(|l| layer_id(l) == Some(layer)) {
                continue;
            }
            let borrowed = partial_layers
                .and_then(|ls| ls.iter().find(|l| layer_id(l) == Some(layer)))
                .cloned()
                .unwrap_or_else(|| json!({ "id": layer }));
            vector_layers.push(borrowed);
        }
    }

    merged
}

fn layer_id(layer: &JsonValue) -> Option<&str> {
    layer.get("id").and_then(JsonValue::as_str)
}

/// Combines attribution strings into a sorted, de-duplicated, space-joined list.
///
/// ```
/// use vtmerge::merge::metadata::merge_attribution;
///
/// assert_eq!(merge_attribution("B, A", "A"), "A B");
/// ```
pub fn merge_attribution(partial: &str, full: &str) -> String {
    let combined = format!("{},{}", partial, full).replace(LINK_BOUNDARY, "/a>,<a");
    let parts: BTreeSet<&str> = combined
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    parts.into_iter().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::tests::MockTileSource;
    use std::sync::Arc;

    fn doc(value: JsonValue) -> TileJson {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_attribution_merge() {
        let partial = r#"<a href="https://a.org">A</a> <a href="https://osm.org">OSM</a>"#;
        let full = r#"<a href="https://osm.org">OSM</a>, <a href="https://b.org">B</a>"#;
        assert_eq!(
            merge_attribution(partial, full),
            r#"<a href="https://a.org">A</a> <a href="https://b.org">B</a> <a href="https://osm.org">OSM</a>"#
        );
    }

    #[test]
    fn test_attribution_is_order_independent_and_idempotent() {
        let once = merge_attribution("X, Y", "Z,X");
        assert_eq!(once, merge_attribution("Z,X", "X, Y"));
        assert_eq!(merge_attribution(&once, ""), once);
        assert_eq!(merge_attribution("", ""), "");
    }

    #[test]
    fn test_tiles_rewritten_with_query() {
        let full = doc(json!({"tiles": ["https://upstream/{z}/{x}/{y}.pbf"], "name": "base"}));
        let urls = vec!["https://gw.example.com/data/city/{z}/{x}/{y}.pbf".to_string()];

        let merged = merge_tilejson(full, &TileJson::new(), [], &urls, Some("key=abc"));
        assert_eq!(
            merged["tiles"],
            json!(["https://gw.example.com/data/city/{z}/{x}/{y}.pbf?key=abc"])
        );
        assert_eq!(merged["name"], "base");
    }

    #[test]
    fn test_missing_layers_borrowed_from_partial() {
        let full = doc(json!({"vector_layers": [{"id": "poi", "fields": {}}]}));
        let partial = doc(json!({"vector_layers": [{"id": "parking", "fields": {"capacity": "Number"}}]}));

        let merged = merge_tilejson(full, &partial, ["poi", "parking", "shops"], &[], None);
        assert_eq!(
            merged["vector_layers"],
            json!([
                {"id": "poi", "fields": {}},
                {"id": "parking", "fields": {"capacity": "Number"}},
                {"id": "shops"}
            ])
        );
    }

    #[test]
    fn test_empty_documents() {
        let merged = merge_tilejson(TileJson::new(), &TileJson::new(), ["poi"], &[], None);
        assert_eq!(merged["attribution"], "");
        assert!(!merged.contains_key("tiles"));
        assert!(!merged.contains_key("vector_layers"));
    }

    #[tokio::test]
    async fn test_merged_metadata_from_sources() {
        let full = MockTileSource::new("full").with_metadata(json!({
            "attribution": "OSM",
            "vector_layers": [{"id": "poi"}]
        }));
        let partial = MockTileSource::new("partial").with_metadata(json!({"attribution": "Local"}));
        let config = MergeConfig::new(Arc::new(full), Arc::new(partial))
            .with_layer("poi", crate::classify::LayerRule::disabled());

        let merged = merged_metadata(&config, &["http://gw/{z}/{x}/{y}.pbf".to_string()], &RequestContext::default())
            .await
            .unwrap();
        assert_eq!(merged["attribution"], "Local OSM");
        assert_eq!(merged["tiles"], json!(["http://gw/{z}/{x}/{y}.pbf"]));
    }

    #[tokio::test]
    async fn test_merged_metadata_propagates_failure() {
        let config = MergeConfig::new(
            Arc::new(MockTileSource::new("full")),
            Arc::new(MockTileSource::new("partial").failing(500)),
        );
        let err = merged_metadata(&config, &[], &RequestContext::default()).await.unwrap_err();
        assert!(matches!(err, MergeError::UpstreamUnavailable { status: Some(500), .. }));
    }
}
