//! Hierarchical class matching.
//!
//! A [`LayerRule`] names the attribute fields that classify a feature, most
//! general first (e.g. `superclass`, `class`, `subclass`), and a set of
//! class prefixes. A feature matches a prefix of length `k` when its first
//! `k` classification values equal the prefix in order. Values past `k` are
//! ignored.
//!
//! A missing field is represented as `None`. It never equals a real value;
//! only a `null` prefix element matches it.

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::rank::RankConfig;
use crate::tile::{AttributeValue, Feature};

/// One classification value; `None` stands for an absent field.
pub type ClassValue = Option<AttributeValue>;

/// An ordered partial classification tuple.
pub type ClassPrefix = Vec<ClassValue>;

/// Errors raised while parsing class prefixes.
#[derive(Debug, Error)]
pub enum ClassError {
    /// The class document is not a list of lists.
    #[error("class list must be an array of arrays, found {0}")]
    NotAList(String),

    /// A prefix element is not a scalar.
    #[error("unsupported class value {0}")]
    UnsupportedValue(String),

    /// A prefix is longer than the rule's field list.
    #[error("class prefix {prefix} has {len} values but only {fields} fields are configured")]
    TooLong {
        prefix: String,
        len: usize,
        fields: usize,
    },
}

/// Merge rule for one output layer.
#[derive(Debug, Clone, Default)]
pub struct LayerRule {
    /// Classification fields, most general first.
    pub fields: Vec<String>,
    /// Class prefixes the partial source is authoritative for.
    /// Empty disables the rule for this layer.
    pub classes: Vec<ClassPrefix>,
    /// Ranking attributes used when both sources contribute.
    pub rank: RankConfig,
}

impl LayerRule {
    /// Creates a rule, checking that no prefix outgrows the field list.
    pub fn new(fields: Vec<String>, classes: Vec<ClassPrefix>) -> Result<Self, ClassError> {
        if let Some(prefix) = classes.iter().find(|p| p.len() > fields.len()) {
            return Err(ClassError::TooLong {
                prefix: format!("{:?}", prefix),
                len: prefix.len(),
                fields: fields.len(),
            });
        }
        Ok(Self {
            fields,
            classes,
            rank: RankConfig::default(),
        })
    }

    /// A rule that leaves the layer to the full source.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_rank(mut self, rank: RankConfig) -> Self {
        self.rank = rank;
        self
    }

    /// Whether the rule has any class prefix.
    pub fn is_enabled(&self) -> bool {
        !self.classes.is_empty()
    }
}

/// Extracts a feature's classification tuple in rule field order.
pub fn classify(rule: &LayerRule, feature: &Feature) -> Vec<ClassValue> {
    rule.fields
        .iter()
        .map(|field| feature.attributes.get(field).cloned())
        .collect()
}

/// True iff the feature's classification starts with one of the prefixes.
///
/// Reads attributes in place and stops at the first differing field.
pub fn matches(rule: &LayerRule, feature: &Feature, prefixes: &[ClassPrefix]) -> bool {
    prefixes.iter().any(|prefix| {
        prefix.len() <= rule.fields.len()
            && prefix.iter().zip(&rule.fields).all(|(expected, field)| {
                match (expected, feature.attributes.get(field)) {
                    (Some(expected), Some(actual)) => expected.loosely_eq(actual),
                    (None, None) => true,
                    _ => false,
                }
            })
    })
}

/// Parses a JSON class document: a list of prefixes, each a list of scalars.
///
/// ```
/// use vtmerge::classify::parse_classes;
///
/// let classes = parse_classes(&serde_json::json!([["shop"], ["amenity", "cafe"]])).unwrap();
/// assert_eq!(classes.len(), 2);
/// assert_eq!(classes[1].len(), 2);
/// ```
pub fn parse_classes(document: &JsonValue) -> Result<Vec<ClassPrefix>, ClassError> {
    let items = document
        .as_array()
        .ok_or_else(|| ClassError::NotAList(document.to_string()))?;

    items
        .iter()
        .map(|item| {
            item.as_array()
                .ok_or_else(|| ClassError::NotAList(item.to_string()))?
                .iter()
                .map(json_to_class_value)
                .collect()
        })
        .collect()
}

fn json_to_class_value(value: &JsonValue) -> Result<ClassValue, ClassError> {
    match value {
        JsonValue::Null => Ok(None),
        JsonValue::Bool(b) => Ok(Some(AttributeValue::Bool(*b))),
        JsonValue::String(s) => Ok(Some(AttributeValue::String(s.clone()))),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Some(AttributeValue::Int(i)))
            } else if let Some(u) = n.as_u64() {
                Ok(Some(AttributeValue::UInt(u)))
            } else {
                Ok(n.as_f64().map(AttributeValue::Double))
            }
        }
        other => Err(ClassError::UnsupportedValue(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::{Attributes, Geometry, TilePoint};
    use proptest::prelude::*;
    use serde_json::json;

    fn rule(fields: &[&str]) -> LayerRule {
        LayerRule::new(fields.iter().map(|f| f.to_string()).collect(), vec![]).unwrap()
    }

    fn feature(pairs: &[(&str, &str)]) -> Feature {
        Feature::new(Geometry::Point(vec![TilePoint::new(0, 0)]))
            .with_attributes(Attributes::from_pairs(pairs.iter().copied()))
    }

    fn prefix(values: &[&str]) -> ClassPrefix {
        values.iter().map(|v| Some(AttributeValue::from(*v))).collect()
    }

    #[test]
    fn test_classify_uses_rule_order_and_absent_sentinel() {
        let rule = rule(&["superclass", "class", "subclass"]);
        let f = feature(&[("class", "bakery"), ("superclass", "shop")]);
        assert_eq!(
            classify(&rule, &f),
            vec![
                Some(AttributeValue::from("shop")),
                Some(AttributeValue::from("bakery")),
                None
            ]
        );
    }

    #[test]
    fn test_prefix_match() {
        let rule = rule(&["a", "b", "c"]);
        let f = feature(&[("a", "x1"), ("b", "y1"), ("c", "z1")]);

        assert!(matches(&rule, &f, &[prefix(&["x1", "y1"])]));
        assert!(matches(&rule, &f, &[prefix(&["x1"])]));
        assert!(matches(&rule, &f, &[prefix(&["x1", "y1", "z1"])]));
        assert!(!matches(&rule, &f, &[prefix(&["x1", "other"])]));
        assert!(!matches(&rule, &f, &[]));
    }

    #[test]
    fn test_any_prefix_suffices() {
        let rule = rule(&["a", "b"]);
        let f = feature(&[("a", "amenity"), ("b", "cafe")]);
        let prefixes = vec![prefix(&["shop"]), prefix(&["amenity", "cafe"])];
        assert!(matches(&rule, &f, &prefixes));
    }

    #[test]
    fn test_absent_field_never_equals_real_value() {
        let rule = rule(&["a", "b"]);
        let f = feature(&[("a", "shop")]);
        assert!(!matches(&rule, &f, &[prefix(&["shop", ""])]));
        assert!(matches(&rule, &f, &[vec![Some(AttributeValue::from("shop")), None]]));
    }

    #[test]
    fn test_empty_prefix_matches_everything() {
        let rule = rule(&["a"]);
        assert!(matches(&rule, &feature(&[]), &[vec![]]));
    }

    #[test]
    fn test_numeric_prefix_matches_across_representations() {
        let rule = rule(&["level"]);
        let f = Feature::new(Geometry::Point(vec![]))
            .with_attributes(Attributes::from_pairs([("level", AttributeValue::UInt(2))]));
        let classes = parse_classes(&json!([[2]])).unwrap();
        assert!(matches(&rule, &f, &classes));
    }

    #[test]
    fn test_rule_rejects_prefix_longer_than_fields() {
        let err = LayerRule::new(vec!["a".to_string()], vec![prefix(&["x", "y"])]).unwrap_err();
        assert!(matches!(err, ClassError::TooLong { len: 2, fields: 1, .. }));
    }

    #[test]
    fn test_parse_classes() {
        let classes = parse_classes(&json!([["shop"], ["amenity", null], [true, 1.5]])).unwrap();
        assert_eq!(classes[0], prefix(&["shop"]));
        assert_eq!(classes[1], vec![Some(AttributeValue::from("amenity")), None]);
        assert_eq!(
            classes[2],
            vec![Some(AttributeValue::Bool(true)), Some(AttributeValue::Double(1.5))]
        );

        assert!(parse_classes(&json!({"shop": 1})).is_err());
        assert!(parse_classes(&json!([["a", {"b": 1}]])).is_err());
    }

    proptest! {
        #[test]
        fn prop_prefix_of_own_classification_matches(
            values in prop::collection::vec("[a-z]{1,6}", 1..5),
            cut in 0usize..5,
        ) {
            let fields: Vec<String> = (0..values.len()).map(|i| format!("f{}", i)).collect();
            let rule = LayerRule::new(fields.clone(), vec![]).unwrap();
            let f = Feature::new(Geometry::Point(vec![])).with_attributes(
                Attributes::from_pairs(fields.iter().cloned().zip(values.iter().cloned())),
            );

            let k = cut.min(values.len());
            let own: ClassPrefix = classify(&rule, &f).into_iter().take(k).collect();
            prop_assert!(matches(&rule, &f, &[own.clone()]));

            if k > 0 {
                let mut changed = own;
                changed[k - 1] = Some(AttributeValue::from("NOT-A-VALUE"));
                prop_assert!(!matches(&rule, &f, &[changed]));
            }
        }
    }
}
