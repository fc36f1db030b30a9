//! Per-chunk predicates.
//!
//! Each matcher is a pure function of one chunk (through its [`MetaView`])
//! and a compiled needle. [`chunk_matches`] chains them in a fixed order and
//! stops at the first failure.

use crate::corpus::{ChunkRecord, CodeRelations, Counter, FieldValue, FileRelations, MetaView};
use crate::index::types::UNKNOWN_LANGUAGE;
use crate::query::file_matcher::FileMatcher;
use crate::query::filters::{parse_date_millis, CompiledFilters, Exclusions, MetaFilter};
use crate::utils::{extract_ngrams, normalize};
use rustc_hash::FxHashSet;
use serde_json::Value;

/// Any trimmed entry contains the (lower-cased) needle, compared
/// case-insensitively. Entries are normalized the way index keys are.
pub fn match_list(list: &FieldValue, needle: &str) -> bool {
    list.iter()
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .any(|entry| normalize(entry).contains(needle))
}

/// Like [`match_list`] for derived name lists; `None` never matches
pub fn match_names<S: AsRef<str>>(names: Option<&[S]>, needle: &str) -> bool {
    names
        .map(|names| names.iter().any(|n| normalize(n.as_ref()).contains(needle)))
        .unwrap_or(false)
}

pub fn match_file(chunk: &ChunkRecord, matchers: &[FileMatcher], case_sensitive: bool) -> bool {
    let file = chunk.file.as_deref().unwrap_or("");
    matchers.iter().any(|m| m.is_match(file, case_sensitive))
}

/// Language check using the same resolution the index builds with
pub fn match_lang(chunk: &ChunkRecord, needles: &[String]) -> bool {
    let lang = chunk
        .effective_language()
        .map(normalize)
        .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string());
    needles.iter().any(|n| *n == lang)
}

pub fn match_ext(chunk: &ChunkRecord, needles: &[String]) -> bool {
    chunk
        .effective_ext()
        .map(|ext| needles.iter().any(|n| *n == ext))
        .unwrap_or(false)
}

pub fn match_kind(chunk: &ChunkRecord, needles: &[String]) -> bool {
    chunk.kind.iter().any(|kind| {
        let kind = normalize(kind.trim());
        needles.iter().any(|n| *n == kind)
    })
}

pub fn match_author(chunk: &ChunkRecord, needles: &[String]) -> bool {
    needles.iter().any(|needle| match_list(&chunk.last_author, needle))
}

pub fn match_chunk_author(chunk: &ChunkRecord, needle: &str) -> bool {
    match_list(chunk.chunk_authors(), needle)
}

pub fn match_visibility(view: &MetaView<'_>, needle: &str) -> bool {
    view.visibility()
        .map(|v| normalize(v).contains(needle))
        .unwrap_or(false)
}

/// Import name, from the chunk's own relations or its file's
pub fn match_import(chunk: &ChunkRecord, relations: Option<&FileRelations>, name: &str) -> bool {
    let own = chunk.code_relations.as_ref().and_then(|r| r.imports.as_ref());
    let imports = own.or_else(|| file_relations(chunk, relations).and_then(|r| r.imports.as_ref()));
    imports.map(|list| list.iter().any(|i| i == name)).unwrap_or(false)
}

/// Usage name, from the chunk's own relations or its file's
pub fn match_uses(chunk: &ChunkRecord, relations: Option<&FileRelations>, name: &str) -> bool {
    let own = chunk.code_relations.as_ref().and_then(|r| r.usages.as_ref());
    let usages = own.or_else(|| file_relations(chunk, relations).and_then(|r| r.usages.as_ref()));
    usages.map(|list| list.iter().any(|u| u == name)).unwrap_or(false)
}

fn file_relations<'a>(
    chunk: &ChunkRecord,
    relations: Option<&'a FileRelations>,
) -> Option<&'a CodeRelations> {
    let file = chunk.file.as_deref()?;
    relations?.get(file)
}

/// Caller or callee equals `name`
pub fn match_calls(chunk: &ChunkRecord, name: &str) -> bool {
    chunk
        .code_relations
        .as_ref()
        .and_then(|r| r.calls.as_ref())
        .map(|calls| calls.iter().any(|(caller, callee)| caller == name || callee == name))
        .unwrap_or(false)
}

pub fn match_lint(chunk: &ChunkRecord) -> bool {
    chunk.lint.as_ref().map(|l| !l.is_empty()).unwrap_or(false)
}

pub fn match_churn(chunk: &ChunkRecord, min: f64) -> bool {
    chunk.churn.filter(|c| c.is_finite()).map(|c| c >= min).unwrap_or(false)
}

pub fn match_modified_after(chunk: &ChunkRecord, millis: i64) -> bool {
    chunk
        .last_modified
        .as_deref()
        .and_then(parse_date_millis)
        .map(|modified| modified >= millis)
        .unwrap_or(false)
}

/// Case-sensitive substring of the signature
pub fn match_signature(view: &MetaView<'_>, needle: &str) -> bool {
    view.signature().map(|s| s.contains(needle)).unwrap_or(false)
}

/// Exact parameter name
pub fn match_param(view: &MetaView<'_>, name: &str) -> bool {
    view.params().iter().any(|p| p == name)
}

pub fn match_return_type(view: &MetaView<'_>, needle: &str) -> bool {
    view.return_types().iter().any(|t| normalize(t).contains(needle))
}

pub fn match_inferred_type(view: &MetaView<'_>, needle: &str) -> bool {
    match view.inferred_type_names() {
        Some(names) => match_names(Some(names.as_slice()), needle),
        None => false,
    }
}

/// Some structural hit satisfies every requested dimension at once
pub fn match_structural(view: &MetaView<'_>, packs: &[String], rules: &[String], tags: &[String]) -> bool {
    if packs.is_empty() && rules.is_empty() && tags.is_empty() {
        return true;
    }
    view.structural().iter().any(|hit| {
        let pack = normalize(hit.pack.as_deref().unwrap_or(""));
        let rule = normalize(hit.rule_id.as_deref().unwrap_or(""));
        (packs.is_empty() || packs.iter().any(|n| pack.contains(n.as_str())))
            && (rules.is_empty() || rules.iter().any(|n| rule.contains(n.as_str())))
            && (tags.is_empty() || tags.iter().any(|n| match_list(&hit.tags, n)))
    })
}

pub fn match_counter(view: &MetaView<'_>, counter: Counter, min: f64) -> bool {
    view.counter(counter).map(|count| count >= min).unwrap_or(false)
}

fn resolve_dotted<'a>(record: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(record, |acc, part| acc.as_object()?.get(part))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => normalize(s),
        other => normalize(&other.to_string()),
    }
}

/// Every filter holds against the chunk's metadata record.
///
/// A filter without a value only requires the field to be present and
/// non-empty.
pub fn match_meta_filters(view: &MetaView<'_>, filters: &[MetaFilter]) -> bool {
    if filters.is_empty() {
        return true;
    }
    let Some(record) = view.record() else {
        return false;
    };
    filters.iter().all(|filter| {
        let field = resolve_dotted(record, &filter.key);
        let wanted = filter
            .value
            .as_ref()
            .filter(|v| !v.is_null() && v.as_str() != Some(""));
        match (wanted, field) {
            (None, None) | (None, Some(Value::Null)) => false,
            (None, Some(Value::Array(items))) => !items.is_empty(),
            (None, Some(Value::String(s))) => !s.trim().is_empty(),
            (None, Some(_)) => true,
            (Some(_), None) => false,
            (Some(wanted), Some(field)) => {
                let needle = value_text(wanted);
                match field {
                    Value::Array(items) => items.iter().any(|e| value_text(e).contains(&needle)),
                    other => value_text(other).contains(&needle),
                }
            }
        }
    })
}

/// False when the chunk carries an excluded token or phrase.
///
/// Chunks without precomputed n-grams get them derived from their tokens
/// over the exclusion's word-count range.
pub fn passes_exclusions(chunk: &ChunkRecord, exclusions: &Exclusions) -> bool {
    if exclusions.is_empty() {
        return true;
    }
    let tokens: &[String] = chunk.tokens.as_deref().unwrap_or(&[]);
    let derived;
    let ngrams: &[String] = match (chunk.ngrams.as_deref(), exclusions.range) {
        (Some(ngrams), _) => ngrams,
        (None, Some((min, max))) if !exclusions.phrases.is_empty() && !tokens.is_empty() => {
            derived = extract_ngrams(tokens, min, max);
            &derived
        }
        _ => &[],
    };

    let token_set: FxHashSet<String> = tokens.iter().map(|t| exclusions.normalize_token(t)).collect();
    let ngram_set: FxHashSet<String> = ngrams.iter().map(|g| exclusions.normalize_token(g)).collect();

    let token_hit = exclusions
        .tokens
        .iter()
        .any(|needle| token_set.contains(needle) || ngram_set.contains(needle));
    if token_hit {
        return false;
    }
    !exclusions.phrases.iter().any(|needle| ngram_set.contains(needle))
}

fn optional(needle: &Option<String>, check: impl FnOnce(&str) -> bool) -> bool {
    match needle.as_deref() {
        Some(needle) => check(needle),
        None => true,
    }
}

/// Run every compiled clause against one chunk
pub fn chunk_matches(filters: &CompiledFilters, chunk: &ChunkRecord, relations: Option<&FileRelations>) -> bool {
    if filters.impossible {
        return false;
    }
    if !filters.file_matchers.is_empty() && !match_file(chunk, &filters.file_matchers, filters.case_file) {
        return false;
    }
    if !filters.lang_needles.is_empty() && !match_lang(chunk, &filters.lang_needles) {
        return false;
    }
    if !filters.ext_needles.is_empty() && !match_ext(chunk, &filters.ext_needles) {
        return false;
    }

    let view = MetaView::new(chunk.meta_v2.as_ref(), chunk.docmeta.as_ref());

    if !match_meta_filters(&view, &filters.meta_filters) {
        return false;
    }
    if !passes_exclusions(chunk, &filters.exclusions) {
        return false;
    }
    if let Some(millis) = filters.modified_after {
        if !match_modified_after(chunk, millis) {
            return false;
        }
    }
    if !filters.type_needles.is_empty() && !match_kind(chunk, &filters.type_needles) {
        return false;
    }
    if !filters.author_needles.is_empty() && !match_author(chunk, &filters.author_needles) {
        return false;
    }
    if !optional(&filters.chunk_author, |n| match_chunk_author(chunk, n)) {
        return false;
    }
    if !optional(&filters.import_name, |n| match_import(chunk, relations, n)) {
        return false;
    }
    if filters.lint && !match_lint(chunk) {
        return false;
    }
    if let Some(min) = filters.churn {
        if !match_churn(chunk, min) {
            return false;
        }
    }
    if !optional(&filters.calls, |n| match_calls(chunk, n))
        || !optional(&filters.uses, |n| match_uses(chunk, relations, n))
        || !optional(&filters.signature, |n| match_signature(&view, n))
        || !optional(&filters.param, |n| match_param(&view, n))
        || !optional(&filters.decorator, |n| match_list(view.decorators(), n))
        || !optional(&filters.return_type, |n| match_return_type(&view, n))
        || !optional(&filters.inferred_type, |n| match_inferred_type(&view, n))
        || !optional(&filters.throws, |n| match_list(view.throws(), n))
        || !optional(&filters.awaits, |n| match_list(view.awaits(), n))
        || !optional(&filters.reads, |n| match_list(view.reads(), n))
        || !optional(&filters.writes, |n| match_list(view.writes(), n))
        || !optional(&filters.mutates, |n| match_list(view.mutations(), n))
        || !optional(&filters.alias, |n| match_list(view.aliases(), n))
    {
        return false;
    }

    if !optional(&filters.risk_tag, |n| match_list(view.risk_tags(), n))
        || !optional(&filters.risk_source, |n| match_names(view.risk_source_names().as_deref(), n))
        || !optional(&filters.risk_sink, |n| match_names(view.risk_sink_names().as_deref(), n))
        || !optional(&filters.risk_category, |n| match_names(view.risk_categories().as_deref(), n))
        || !optional(&filters.risk_flow, |n| match_names(view.risk_flows().as_deref(), n))
    {
        return false;
    }

    if !match_structural(&view, &filters.struct_packs, &filters.struct_rules, &filters.struct_tags) {
        return false;
    }
    if !filters
        .counters
        .iter()
        .all(|&(counter, min)| match_counter(&view, counter, min))
    {
        return false;
    }
    if !optional(&filters.visibility, |n| match_visibility(&view, n))
        || !optional(&filters.extends, |n| match_list(view.extends(), n))
    {
        return false;
    }
    if filters.async_only && !view.is_async() {
        return false;
    }
    if filters.generator_only && !view.is_generator() {
        return false;
    }
    if filters.returns_only && !view.returns_value() {
        return false;
    }
    true
}
