//! Filter requests and their compiled form.
//!
//! [`Filters`] is the caller-facing request, decoded from camelCase JSON.
//! Every field is lenient: a value of the wrong shape is ignored rather than
//! failing the request. [`CompiledFilters`] normalizes needles, compiles file
//! matchers and derives the exclusion tables once so repeated queries against
//! the same index generation skip that work.

use crate::corpus::record::lenient;
use crate::corpus::{Counter, FieldValue};
use crate::query::diagnostics::DiagnosticSink;
use crate::query::file_matcher::{FileMatcher, RegexConfig};
use crate::utils::{normalize, normalize_list, normalize_phrase_list, phrase_length_range, phrase_to_ngram};
use chrono::{DateTime, NaiveDate};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Char-gram prefilter overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePrefilterConfig {
    #[serde(default, deserialize_with = "lenient")]
    pub enabled: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub chargram_n: Option<f64>,
}

/// Explicit word-count range for excluded phrases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseRange {
    pub min: usize,
    pub max: usize,
}

/// A key/value test against the chunk's metadata record; keys may be dotted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFilter {
    pub key: String,
    #[serde(default)]
    pub value: Option<Value>,
}

/// A filter request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Filters {
    #[serde(rename = "type")]
    pub kind: FieldValue,
    pub author: FieldValue,
    #[serde(deserialize_with = "lenient")]
    pub chunk_author: Option<String>,
    pub file: FieldValue,
    pub ext: FieldValue,
    pub lang: FieldValue,
    #[serde(deserialize_with = "lenient")]
    pub visibility: Option<String>,

    #[serde(deserialize_with = "lenient")]
    pub import_name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub uses: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub calls: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub lint: Option<Value>,
    #[serde(deserialize_with = "lenient")]
    pub churn: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub modified_after: Option<Value>,
    #[serde(deserialize_with = "lenient")]
    pub meta: Option<Value>,

    #[serde(deserialize_with = "lenient")]
    pub signature: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub param: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub decorator: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub return_type: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub inferred_type: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub throws: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub awaits: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub extends: Option<String>,

    #[serde(deserialize_with = "lenient")]
    pub reads: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub writes: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub mutates: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub alias: Option<String>,

    #[serde(deserialize_with = "lenient")]
    pub risk: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub risk_tag: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub risk_source: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub risk_sink: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub risk_category: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub risk_flow: Option<String>,

    pub struct_pack: FieldValue,
    pub struct_rule: FieldValue,
    pub struct_tag: FieldValue,

    #[serde(deserialize_with = "lenient")]
    pub branches: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub loops: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub breaks: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub continues: Option<f64>,

    #[serde(rename = "async", deserialize_with = "lenient")]
    pub is_async: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub generator: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub returns: Option<bool>,

    pub exclude_tokens: FieldValue,
    pub exclude_phrases: FieldValue,
    #[serde(deserialize_with = "lenient")]
    pub exclude_phrase_range: Option<PhraseRange>,

    #[serde(deserialize_with = "lenient")]
    pub case_file: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub case_tokens: Option<bool>,

    #[serde(deserialize_with = "lenient")]
    pub file_prefilter: Option<FilePrefilterConfig>,
    #[serde(deserialize_with = "lenient")]
    pub regex_config: Option<RegexConfig>,

    #[serde(deserialize_with = "lenient")]
    pub ext_impossible: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub lang_impossible: Option<bool>,
}

impl Filters {
    /// Decode a request; anything but an object is an empty request
    pub fn from_json(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}

/// Token and phrase exclusion tables
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    pub tokens: FxHashSet<String>,
    /// Phrases in underscore-joined n-gram form
    pub phrases: FxHashSet<String>,
    /// Word-count range used to derive n-grams for chunks that lack them
    pub range: Option<(usize, usize)>,
    pub case_sensitive: bool,
}

impl Exclusions {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.phrases.is_empty()
    }

    pub fn normalize_token(&self, token: &str) -> String {
        if self.case_sensitive {
            token.to_string()
        } else {
            normalize(token)
        }
    }
}

/// A compiled filter request.
///
/// Needles compared as substrings are lower-cased here; the raw-case ones
/// (`signature`, `param`, `calls`, `uses`, `import_name`) are compared exactly
/// as given.
#[derive(Debug, Clone, Default)]
pub struct CompiledFilters {
    pub(crate) impossible: bool,

    pub(crate) file_matchers: Vec<FileMatcher>,
    pub(crate) case_file: bool,
    pub(crate) prefilter_enabled: bool,
    pub(crate) prefilter_n: Option<usize>,

    pub(crate) ext_needles: Vec<String>,
    pub(crate) lang_needles: Vec<String>,
    pub(crate) type_needles: Vec<String>,
    pub(crate) author_needles: Vec<String>,
    pub(crate) chunk_author: Option<String>,
    pub(crate) visibility: Option<String>,

    pub(crate) import_name: Option<String>,
    pub(crate) uses: Option<String>,
    pub(crate) calls: Option<String>,
    pub(crate) lint: bool,
    pub(crate) churn: Option<f64>,
    pub(crate) modified_after: Option<i64>,
    pub(crate) meta_filters: Vec<MetaFilter>,

    pub(crate) signature: Option<String>,
    pub(crate) param: Option<String>,
    pub(crate) decorator: Option<String>,
    pub(crate) return_type: Option<String>,
    pub(crate) inferred_type: Option<String>,
    pub(crate) throws: Option<String>,
    pub(crate) awaits: Option<String>,
    pub(crate) extends: Option<String>,

    pub(crate) reads: Option<String>,
    pub(crate) writes: Option<String>,
    pub(crate) mutates: Option<String>,
    pub(crate) alias: Option<String>,

    pub(crate) risk_tag: Option<String>,
    pub(crate) risk_source: Option<String>,
    pub(crate) risk_sink: Option<String>,
    pub(crate) risk_category: Option<String>,
    pub(crate) risk_flow: Option<String>,

    pub(crate) struct_packs: Vec<String>,
    pub(crate) struct_rules: Vec<String>,
    pub(crate) struct_tags: Vec<String>,

    pub(crate) counters: Vec<(Counter, f64)>,

    pub(crate) async_only: bool,
    pub(crate) generator_only: bool,
    pub(crate) returns_only: bool,

    pub(crate) exclusions: Exclusions,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(str::to_string)
}

fn lowered(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(normalize)
}

fn lowered_list(value: &FieldValue) -> Vec<String> {
    normalize_list(&value.to_vec()).iter().map(|v| normalize(v)).collect()
}

fn ext_needle(entry: &str) -> Option<String> {
    let value = entry.to_lowercase();
    let value = value.trim_start_matches('*');
    if value.is_empty() {
        return None;
    }
    Some(if value.starts_with('.') {
        value.to_string()
    } else {
        format!(".{value}")
    })
}

/// Epoch millis from a number or a date string
pub(crate) fn parse_timestamp_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).map(|v| v as i64),
        Value::String(s) => parse_date_millis(s),
        _ => None,
    }
}

pub(crate) fn parse_date_millis(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp_millis());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

fn meta_filters(value: Option<&Value>) -> Vec<MetaFilter> {
    let entries: Vec<&Value> = match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(v @ Value::Object(_)) => vec![v],
        _ => Vec::new(),
    };
    entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<MetaFilter>(entry.clone()).ok())
        .filter(|f| !f.key.is_empty())
        .collect()
}

impl CompiledFilters {
    /// Compile with the request's own regex limits (or the defaults)
    pub fn compile(filters: &Filters, sink: &mut dyn DiagnosticSink) -> Self {
        Self::compile_with(filters, &RegexConfig::default(), sink)
    }

    /// Compile, using `regex_defaults` when the request carries no `regexConfig`
    pub fn compile_with(filters: &Filters, regex_defaults: &RegexConfig, sink: &mut dyn DiagnosticSink) -> Self {
        let impossible = filters.ext_impossible == Some(true) || filters.lang_impossible == Some(true);
        let case_file = filters.case_file == Some(true);
        let case_tokens = filters.case_tokens == Some(true);

        let regex_config = filters.regex_config.as_ref().unwrap_or(regex_defaults);
        let file_matchers = normalize_list(&filters.file.to_vec())
            .iter()
            .filter_map(|token| FileMatcher::parse(token, case_file, regex_config, sink))
            .collect();

        let prefilter = filters.file_prefilter.clone().unwrap_or_default();
        let prefilter_n = prefilter
            .chargram_n
            .filter(|n| n.is_finite())
            .map(|n| (n.floor().max(2.0)) as usize);

        let ext_needles = normalize_list(&filters.ext.to_vec())
            .iter()
            .filter_map(|e| ext_needle(e))
            .collect();

        let token_norm = |v: &str| if case_tokens { v.to_string() } else { normalize(v) };
        let exclude_tokens: FxHashSet<String> = normalize_list(&filters.exclude_tokens.to_vec())
            .iter()
            .map(|v| token_norm(v))
            .collect();
        let phrase_list: Vec<String> = normalize_phrase_list(&filters.exclude_phrases.to_vec())
            .iter()
            .map(|p| phrase_to_ngram(&token_norm(p)))
            .collect();
        let range = match filters.exclude_phrase_range {
            Some(PhraseRange { min, max }) if min > 0 && max >= min => Some((min, max)),
            _ => phrase_length_range(&phrase_list),
        };

        let counters = [
            (Counter::Branches, filters.branches),
            (Counter::Loops, filters.loops),
            (Counter::Breaks, filters.breaks),
            (Counter::Continues, filters.continues),
        ]
        .into_iter()
        .filter_map(|(counter, min)| min.filter(|m| m.is_finite()).map(|m| (counter, m)))
        .collect();

        Self {
            impossible,
            file_matchers,
            case_file,
            prefilter_enabled: prefilter.enabled != Some(false),
            prefilter_n,
            ext_needles,
            lang_needles: lowered_list(&filters.lang),
            type_needles: lowered_list(&filters.kind),
            author_needles: lowered_list(&filters.author),
            chunk_author: lowered(&filters.chunk_author),
            visibility: lowered(&filters.visibility),
            import_name: non_empty(&filters.import_name),
            uses: non_empty(&filters.uses),
            calls: non_empty(&filters.calls),
            lint: filters.lint.as_ref().map(crate::corpus::record::is_truthy).unwrap_or(false),
            churn: filters.churn.filter(|c| c.is_finite()),
            modified_after: filters.modified_after.as_ref().and_then(parse_timestamp_millis),
            meta_filters: meta_filters(filters.meta.as_ref()),
            signature: non_empty(&filters.signature),
            param: non_empty(&filters.param),
            decorator: lowered(&filters.decorator),
            return_type: lowered(&filters.return_type),
            inferred_type: lowered(&filters.inferred_type),
            throws: lowered(&filters.throws),
            awaits: lowered(&filters.awaits),
            extends: lowered(&filters.extends),
            reads: lowered(&filters.reads),
            writes: lowered(&filters.writes),
            mutates: lowered(&filters.mutates),
            alias: lowered(&filters.alias),
            risk_tag: lowered(&filters.risk_tag).or_else(|| lowered(&filters.risk)),
            risk_source: lowered(&filters.risk_source),
            risk_sink: lowered(&filters.risk_sink),
            risk_category: lowered(&filters.risk_category),
            risk_flow: lowered(&filters.risk_flow),
            struct_packs: lowered_list(&filters.struct_pack),
            struct_rules: lowered_list(&filters.struct_rule),
            struct_tags: lowered_list(&filters.struct_tag),
            counters,
            async_only: filters.is_async == Some(true),
            generator_only: filters.generator == Some(true),
            returns_only: filters.returns == Some(true),
            exclusions: Exclusions {
                tokens: exclude_tokens,
                phrases: phrase_list.into_iter().collect(),
                range,
                case_sensitive: case_tokens,
            },
        }
    }

    /// Whether a caller flagged the request as unsatisfiable
    pub fn is_impossible(&self) -> bool {
        self.impossible
    }

    /// True when no clause narrows the corpus
    pub fn is_empty(&self) -> bool {
        !self.impossible
            && self.file_matchers.is_empty()
            && self.ext_needles.is_empty()
            && self.lang_needles.is_empty()
            && self.type_needles.is_empty()
            && self.author_needles.is_empty()
            && self.chunk_author.is_none()
            && self.visibility.is_none()
            && self.import_name.is_none()
            && self.uses.is_none()
            && self.calls.is_none()
            && !self.lint
            && self.churn.is_none()
            && self.modified_after.is_none()
            && self.meta_filters.is_empty()
            && self.signature.is_none()
            && self.param.is_none()
            && self.decorator.is_none()
            && self.return_type.is_none()
            && self.inferred_type.is_none()
            && self.throws.is_none()
            && self.awaits.is_none()
            && self.extends.is_none()
            && self.reads.is_none()
            && self.writes.is_none()
            && self.mutates.is_none()
            && self.alias.is_none()
            && self.risk_tag.is_none()
            && self.risk_source.is_none()
            && self.risk_sink.is_none()
            && self.risk_category.is_none()
            && self.risk_flow.is_none()
            && self.struct_packs.is_empty()
            && self.struct_rules.is_empty()
            && self.struct_tags.is_empty()
            && self.counters.is_empty()
            && !self.async_only
            && !self.generator_only
            && !self.returns_only
            && self.exclusions.is_empty()
    }

    pub fn file_matchers(&self) -> &[FileMatcher] {
        &self.file_matchers
    }

    pub fn lang_needles(&self) -> &[String] {
        &self.lang_needles
    }

    pub fn ext_needles(&self) -> &[String] {
        &self.ext_needles
    }
}
