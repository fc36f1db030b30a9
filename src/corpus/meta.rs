//! Chunk metadata shapes and the merged view predicates read from.
//!
//! Producers emit metadata in two shapes: the legacy `docmeta` object and the
//! newer `metaV2` object. Both deserialize into [`DocMeta`]; [`MetaView`]
//! prefers `metaV2` and falls back to `docmeta` field by field, so a chunk
//! carrying only one shape (or a partial mix) matches the same way.

use crate::corpus::record::{is_truthy, lenient, FieldValue};
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One inferred or declared type entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeEntry {
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub type_name: Option<String>,
}

type TypeMap = BTreeMap<String, Vec<TypeEntry>>;

/// Type slots: per-name maps plus the return list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeSlots {
    #[serde(default, deserialize_with = "lenient")]
    pub params: Option<TypeMap>,
    #[serde(default, deserialize_with = "lenient")]
    pub fields: Option<TypeMap>,
    #[serde(default, deserialize_with = "lenient")]
    pub locals: Option<TypeMap>,
    #[serde(default, deserialize_with = "lenient")]
    pub returns: Option<Vec<TypeEntry>>,
}

impl TypeSlots {
    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        for map in [&self.params, &self.fields, &self.locals].into_iter().flatten() {
            for entries in map.values() {
                out.extend(entries.iter().filter_map(|e| e.type_name.as_deref()));
            }
        }
        if let Some(returns) = &self.returns {
            out.extend(returns.iter().filter_map(|e| e.type_name.as_deref()));
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeInfo {
    #[serde(default, deserialize_with = "lenient")]
    pub declared: Option<TypeSlots>,
    #[serde(default, deserialize_with = "lenient")]
    pub inferred: Option<TypeSlots>,
}

/// `returns` is a flag in some producers and a type (or list of types) in others
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnsDecl {
    Flag(bool),
    Types(Vec<String>),
}

impl<'de> Deserialize<'de> for ReturnsDecl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Bool(b) => ReturnsDecl::Flag(b),
            other => ReturnsDecl::Types(FieldValue::from_json(&other).to_vec()),
        })
    }
}

impl Serialize for ReturnsDecl {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ReturnsDecl::Flag(b) => serializer.serialize_bool(*b),
            ReturnsDecl::Types(types) => types.serialize(serializer),
        }
    }
}

/// Modifiers arrive as an object (`{visibility, async, generator}`) or as a
/// flat list of keywords (`["public", "async"]`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Modifiers {
    pub visibility: Option<String>,
    pub is_async: bool,
    pub generator: bool,
}

const VISIBILITY_KEYWORDS: [&str; 5] = ["public", "private", "protected", "internal", "fileprivate"];

impl<'de> Deserialize<'de> for Modifiers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let mut out = Modifiers::default();
        match &value {
            Value::Object(map) => {
                out.visibility = map.get("visibility").and_then(Value::as_str).map(str::to_string);
                out.is_async = map.get("async").map(is_truthy).unwrap_or(false);
                out.generator = map.get("generator").map(is_truthy).unwrap_or(false);
            }
            Value::Array(_) => {
                for keyword in FieldValue::from_json(&value).iter() {
                    let lower = keyword.to_lowercase();
                    match lower.as_str() {
                        "async" => out.is_async = true,
                        "generator" => out.generator = true,
                        v if VISIBILITY_KEYWORDS.contains(&v) && out.visibility.is_none() => {
                            out.visibility = Some(keyword.to_string());
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
        Ok(out)
    }
}

impl Serialize for Modifiers {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde_json::json!({
            "visibility": self.visibility,
            "async": self.is_async,
            "generator": self.generator,
        })
        .serialize(serializer)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskEndpoint {
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskFlow {
    #[serde(default, deserialize_with = "lenient")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub sink: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskMeta {
    #[serde(default)]
    pub tags: FieldValue,
    #[serde(default, deserialize_with = "lenient")]
    pub sources: Option<Vec<RiskEndpoint>>,
    #[serde(default, deserialize_with = "lenient")]
    pub sinks: Option<Vec<RiskEndpoint>>,
    #[serde(default)]
    pub categories: FieldValue,
    #[serde(default, deserialize_with = "lenient")]
    pub flows: Option<Vec<RiskFlow>>,
}

/// A structural-rule hit attached to a chunk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuralHit {
    #[serde(default, deserialize_with = "lenient")]
    pub pack: Option<String>,
    #[serde(rename = "ruleId", default, deserialize_with = "lenient")]
    pub rule_id: Option<String>,
    #[serde(default)]
    pub tags: FieldValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataflow {
    #[serde(default)]
    pub reads: FieldValue,
    #[serde(default)]
    pub writes: FieldValue,
    #[serde(default)]
    pub mutations: FieldValue,
    #[serde(default)]
    pub aliases: FieldValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlFlow {
    #[serde(default, deserialize_with = "lenient")]
    pub branches: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub loops: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub breaks: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub continues: Option<f64>,
}

/// Control-flow counters a filter can require a minimum for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Branches,
    Loops,
    Breaks,
    Continues,
}

impl ControlFlow {
    pub fn get(&self, counter: Counter) -> Option<f64> {
        let value = match counter {
            Counter::Branches => self.branches,
            Counter::Loops => self.loops,
            Counter::Breaks => self.breaks,
            Counter::Continues => self.continues,
        };
        value.filter(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Effective {
    #[serde(rename = "languageId", default, deserialize_with = "lenient")]
    pub language_id: Option<String>,
}

/// Per-chunk metadata, shared by the legacy and the v2 shapes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocMeta {
    #[serde(default, deserialize_with = "lenient")]
    pub signature: Option<String>,
    #[serde(default)]
    pub params: FieldValue,
    #[serde(rename = "returnType", default, deserialize_with = "lenient")]
    pub return_type: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub returns: Option<ReturnsDecl>,
    #[serde(rename = "returnsValue", default, deserialize_with = "lenient")]
    pub returns_value: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub types: Option<TypeInfo>,
    #[serde(rename = "inferredTypes", default, deserialize_with = "lenient")]
    pub inferred_types: Option<TypeSlots>,
    #[serde(default, deserialize_with = "lenient")]
    pub risk: Option<RiskMeta>,
    #[serde(default, deserialize_with = "lenient")]
    pub structural: Option<Vec<StructuralHit>>,
    #[serde(default, deserialize_with = "lenient")]
    pub dataflow: Option<Dataflow>,
    #[serde(rename = "controlFlow", default, deserialize_with = "lenient")]
    pub control_flow: Option<ControlFlow>,
    #[serde(default)]
    pub decorators: FieldValue,
    #[serde(default)]
    pub throws: FieldValue,
    #[serde(default)]
    pub awaits: FieldValue,
    #[serde(default, deserialize_with = "lenient")]
    pub visibility: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub modifiers: Option<Modifiers>,
    #[serde(rename = "async", default, deserialize_with = "lenient")]
    pub is_async: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub yields: Option<Value>,
    #[serde(default)]
    pub extends: FieldValue,
    #[serde(default)]
    pub bases: FieldValue,
    #[serde(default, deserialize_with = "lenient")]
    pub record: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub lang: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub effective: Option<Effective>,
}

static MISSING: FieldValue = FieldValue::Missing;

/// Merged read-only view over a chunk's primary and legacy metadata
#[derive(Debug, Clone, Copy, Default)]
pub struct MetaView<'a> {
    primary: Option<&'a DocMeta>,
    legacy: Option<&'a DocMeta>,
}

impl<'a> MetaView<'a> {
    pub fn new(primary: Option<&'a DocMeta>, legacy: Option<&'a DocMeta>) -> Self {
        Self { primary, legacy }
    }

    fn sources(&self) -> impl Iterator<Item = &'a DocMeta> {
        self.primary.into_iter().chain(self.legacy)
    }

    /// First source where `f` yields something
    fn pick<T: ?Sized>(&self, f: impl Fn(&'a DocMeta) -> Option<&'a T>) -> Option<&'a T> {
        self.sources().find_map(f)
    }

    /// First source where the list field is present
    fn pick_list(&self, f: impl Fn(&'a DocMeta) -> Option<&'a FieldValue>) -> &'a FieldValue {
        self.sources()
            .filter_map(f)
            .find(|v| !v.is_missing())
            .unwrap_or(&MISSING)
    }

    pub fn signature(&self) -> Option<&'a str> {
        self.pick(|m| m.signature.as_deref())
    }

    pub fn params(&self) -> &'a FieldValue {
        self.pick_list(|m| Some(&m.params))
    }

    pub fn decorators(&self) -> &'a FieldValue {
        self.pick_list(|m| Some(&m.decorators))
    }

    pub fn throws(&self) -> &'a FieldValue {
        self.pick_list(|m| Some(&m.throws))
    }

    pub fn awaits(&self) -> &'a FieldValue {
        self.pick_list(|m| Some(&m.awaits))
    }

    pub fn extends(&self) -> &'a FieldValue {
        let parents = self.pick_list(|m| Some(&m.extends));
        if parents.is_missing() {
            self.pick_list(|m| Some(&m.bases))
        } else {
            parents
        }
    }

    pub fn visibility(&self) -> Option<&'a str> {
        self.pick(|m| m.visibility.as_deref())
            .or_else(|| self.pick(|m| m.modifiers.as_ref().and_then(|x| x.visibility.as_deref())))
            .filter(|v| !v.is_empty())
    }

    pub fn is_async(&self) -> bool {
        self.sources().any(|m| {
            m.is_async.as_ref().map(is_truthy).unwrap_or(false)
                || m.modifiers.as_ref().map(|x| x.is_async).unwrap_or(false)
        })
    }

    pub fn is_generator(&self) -> bool {
        self.sources().any(|m| {
            m.modifiers.as_ref().map(|x| x.generator).unwrap_or(false)
                || m.yields.as_ref().map(is_truthy).unwrap_or(false)
        })
    }

    pub fn reads(&self) -> &'a FieldValue {
        self.pick_list(|m| m.dataflow.as_ref().map(|d| &d.reads))
    }

    pub fn writes(&self) -> &'a FieldValue {
        self.pick_list(|m| m.dataflow.as_ref().map(|d| &d.writes))
    }

    pub fn mutations(&self) -> &'a FieldValue {
        self.pick_list(|m| m.dataflow.as_ref().map(|d| &d.mutations))
    }

    pub fn aliases(&self) -> &'a FieldValue {
        self.pick_list(|m| m.dataflow.as_ref().map(|d| &d.aliases))
    }

    pub fn counter(&self, counter: Counter) -> Option<f64> {
        self.sources()
            .find_map(|m| m.control_flow.as_ref().and_then(|c| c.get(counter)))
    }

    pub fn risk_tags(&self) -> &'a FieldValue {
        self.pick_list(|m| m.risk.as_ref().map(|r| &r.tags))
    }

    pub fn risk_source_names(&self) -> Option<Vec<&'a str>> {
        self.pick(|m| m.risk.as_ref().and_then(|r| r.sources.as_deref()))
            .map(|sources| sources.iter().filter_map(|s| s.name.as_deref()).collect())
    }

    pub fn risk_sink_names(&self) -> Option<Vec<&'a str>> {
        self.pick(|m| m.risk.as_ref().and_then(|r| r.sinks.as_deref()))
            .map(|sinks| sinks.iter().filter_map(|s| s.name.as_deref()).collect())
    }

    /// Explicit categories, else the categories of the sinks
    pub fn risk_categories(&self) -> Option<Vec<&'a str>> {
        let explicit = self.pick_list(|m| m.risk.as_ref().map(|r| &r.categories));
        if !explicit.is_missing() {
            return Some(explicit.iter().collect());
        }
        self.pick(|m| m.risk.as_ref().and_then(|r| r.sinks.as_deref()))
            .map(|sinks| sinks.iter().filter_map(|s| s.category.as_deref()).collect())
    }

    /// Flows rendered as `source->sink`
    pub fn risk_flows(&self) -> Option<Vec<String>> {
        self.pick(|m| m.risk.as_ref().and_then(|r| r.flows.as_deref()))
            .map(|flows| {
                flows
                    .iter()
                    .map(|f| {
                        format!(
                            "{}->{}",
                            f.source.as_deref().unwrap_or(""),
                            f.sink.as_deref().unwrap_or("")
                        )
                    })
                    .collect()
            })
    }

    pub fn structural(&self) -> &'a [StructuralHit] {
        self.pick(|m| m.structural.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or(&[])
    }

    /// Declared return types from every source, deduplicated in first-seen order
    pub fn return_types(&self) -> Vec<&'a str> {
        let mut out: Vec<&'a str> = Vec::new();
        let mut push = |t: &'a str| {
            if !t.is_empty() && !out.contains(&t) {
                out.push(t);
            }
        };
        for meta in self.sources() {
            if let Some(t) = meta.return_type.as_deref() {
                push(t);
            }
            if let Some(ReturnsDecl::Types(types)) = &meta.returns {
                types.iter().for_each(|t| push(t.as_str()));
            }
            let declared = meta.types.as_ref().and_then(|t| t.declared.as_ref());
            if let Some(returns) = declared.and_then(|d| d.returns.as_ref()) {
                returns
                    .iter()
                    .filter_map(|e| e.type_name.as_deref())
                    .for_each(&mut push);
            }
        }
        out
    }

    /// Whether any source says the chunk returns a value
    pub fn returns_value(&self) -> bool {
        self.sources().any(|m| {
            m.returns_value.as_ref().map(is_truthy).unwrap_or(false)
                || match &m.returns {
                    Some(ReturnsDecl::Flag(b)) => *b,
                    Some(ReturnsDecl::Types(types)) => !types.is_empty(),
                    None => false,
                }
        }) || !self.return_types().is_empty()
    }

    /// Inferred type names; `None` when no source carries inferred types
    pub fn inferred_type_names(&self) -> Option<Vec<&'a str>> {
        let slots = self.pick(|m| {
            m.types
                .as_ref()
                .and_then(|t| t.inferred.as_ref())
                .or(m.inferred_types.as_ref())
        })?;
        let mut out = Vec::new();
        slots.collect_names(&mut out);
        Some(out)
    }

    pub fn record(&self) -> Option<&'a Value> {
        self.pick(|m| m.record.as_ref().filter(|r| r.is_object()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: Value) -> DocMeta {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_primary_preferred_field_by_field() {
        let primary = meta(json!({"dataflow": {"reads": ["x"]}}));
        let legacy = meta(json!({"dataflow": {"reads": ["y"], "writes": ["z"]}, "signature": "fn a()"}));
        let view = MetaView::new(Some(&primary), Some(&legacy));
        assert_eq!(view.reads().to_vec(), vec!["x"]);
        assert_eq!(view.writes().to_vec(), vec!["z"]);
        assert_eq!(view.signature(), Some("fn a()"));
    }

    #[test]
    fn test_modifier_shapes() {
        let object = meta(json!({"modifiers": {"visibility": "private", "async": true}}));
        let list = meta(json!({"modifiers": ["public", "generator"]}));
        let view = MetaView::new(None, Some(&object));
        assert_eq!(view.visibility(), Some("private"));
        assert!(view.is_async());
        let view = MetaView::new(Some(&list), None);
        assert_eq!(view.visibility(), Some("public"));
        assert!(view.is_generator());
        assert!(!view.is_async());
    }

    #[test]
    fn test_return_types_merge() {
        let legacy = meta(json!({"returnType": "Promise<void>", "returns": ["string"]}));
        let primary = meta(json!({"types": {"declared": {"returns": [{"type": "string"}, {"type": "Buffer"}]}}}));
        let view = MetaView::new(Some(&primary), Some(&legacy));
        assert_eq!(view.return_types(), vec!["string", "Buffer", "Promise<void>"]);
        assert!(view.returns_value());
    }

    #[test]
    fn test_returns_flag() {
        let legacy = meta(json!({"returns": true}));
        let view = MetaView::new(None, Some(&legacy));
        assert!(view.return_types().is_empty());
        assert!(view.returns_value());
    }

    #[test]
    fn test_inferred_types() {
        let legacy = meta(json!({"inferredTypes": {
            "params": {"a": [{"type": "Number"}]},
            "returns": [{"type": "Map"}]
        }}));
        let view = MetaView::new(None, Some(&legacy));
        assert_eq!(view.inferred_type_names(), Some(vec!["Number", "Map"]));
        assert_eq!(MetaView::default().inferred_type_names(), None);
    }

    #[test]
    fn test_risk_categories_fallback_to_sinks() {
        let legacy = meta(json!({"risk": {"sinks": [{"name": "exec", "category": "command"}]}}));
        let view = MetaView::new(None, Some(&legacy));
        assert_eq!(view.risk_categories(), Some(vec!["command"]));
        assert_eq!(view.risk_sink_names(), Some(vec!["exec"]));
        assert_eq!(view.risk_source_names(), None);
    }

    #[test]
    fn test_counter_non_numeric_is_absent() {
        let legacy = meta(json!({"controlFlow": {"branches": "many", "loops": 2}}));
        let view = MetaView::new(None, Some(&legacy));
        assert_eq!(view.counter(Counter::Branches), None);
        assert_eq!(view.counter(Counter::Loops), Some(2.0));
    }
}
