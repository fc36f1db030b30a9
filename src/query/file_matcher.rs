//! File-path matchers and the char-gram prefilter.
//!
//! A file filter token is either a plain substring needle or a
//! `/pattern/flags` regex. When an index is available, the literal part of
//! each matcher is sliced into char-grams and looked up in
//! `file_chargrams` to get a superset of the files that can match. The final
//! scan always confirms with the exact matcher.

use crate::index::bitmap::BitmapBackend;
use crate::index::filter_index::FilterIndex;
use crate::index::types::{FileId, IdSet};
use crate::query::candidate::{build_candidate, Candidate};
use crate::query::diagnostics::{DiagnosticSink, FilterEvent, PrefilterSkip};
use crate::utils::{normalize_file_path, normalize_prefilter_path, query_chargrams};
use memchr::memmem;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

const DEFAULT_MAX_PATTERN_LENGTH: usize = 512;
const DEFAULT_REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Characters that end a literal run in a regex pattern
const REGEX_META: &str = "^$.*+?()[]{}|";

/// Safety limits for compiling user-supplied file regexes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegexConfig {
    /// Longer patterns are rejected (and degrade to a substring match)
    #[serde(default = "default_max_pattern_length", alias = "max_pattern_length")]
    pub max_pattern_length: usize,
    /// Compiled program size limit in bytes
    #[serde(default = "default_size_limit", alias = "size_limit")]
    pub size_limit: usize,
    /// Flags applied when the token has none; `None` means `i` unless
    /// file matching is case-sensitive
    #[serde(default)]
    pub flags: Option<String>,
}

fn default_max_pattern_length() -> usize {
    DEFAULT_MAX_PATTERN_LENGTH
}

fn default_size_limit() -> usize {
    DEFAULT_REGEX_SIZE_LIMIT
}

impl Default for RegexConfig {
    fn default() -> Self {
        Self {
            max_pattern_length: default_max_pattern_length(),
            size_limit: default_size_limit(),
            flags: None,
        }
    }
}

/// A parsed file filter token
#[derive(Debug, Clone)]
pub enum FileMatcher {
    /// Needle already normalized the way file paths are compared
    Substring {
        needle: String,
        finder: memmem::Finder<'static>,
    },
    /// `literal` is what every match must contain, if anything
    Regex {
        regex: Regex,
        source: String,
        literal: Option<String>,
    },
}

impl FileMatcher {
    fn substring(needle: String) -> Self {
        let finder = memmem::Finder::new(needle.as_bytes()).into_owned();
        FileMatcher::Substring { needle, finder }
    }

    /// Parse one token. Empty tokens yield `None`.
    ///
    /// A regex that fails to compile degrades to a substring match on its
    /// longest literal run and is reported to `sink`.
    pub fn parse(
        token: &str,
        case_sensitive: bool,
        config: &RegexConfig,
        sink: &mut dyn DiagnosticSink,
    ) -> Option<FileMatcher> {
        let raw = token.trim();
        if raw.is_empty() {
            return None;
        }

        let Some((pattern, token_flags)) = split_regex_token(raw) else {
            return Some(Self::substring(normalize_needle(raw, case_sensitive)));
        };

        let flags = if token_flags.is_empty() {
            config
                .flags
                .clone()
                .unwrap_or_else(|| if case_sensitive { String::new() } else { "i".into() })
        } else {
            token_flags.to_string()
        };

        match compile_regex(pattern, &flags, config) {
            Ok(regex) => {
                // Whitespace is insignificant in verbose mode, so the pattern
                // text says nothing reliable about the path
                let literal = if is_verbose(pattern, &flags) {
                    None
                } else {
                    extract_regex_literal(pattern)
                };
                Some(FileMatcher::Regex {
                    regex,
                    source: pattern.to_string(),
                    literal,
                })
            }
            Err(reason) => {
                let literal = longest_literal_run(pattern);
                let needle = if literal.is_empty() { pattern } else { literal.as_str() };
                let needle = normalize_needle(needle, case_sensitive);
                tracing::debug!(pattern, %reason, needle = %needle, "file regex degraded to substring");
                sink.record(FilterEvent::RegexFallback {
                    pattern: pattern.to_string(),
                    reason,
                    needle: needle.clone(),
                });
                Some(Self::substring(needle))
            }
        }
    }

    /// Test a raw chunk file path
    pub fn is_match(&self, file: &str, case_sensitive: bool) -> bool {
        match self {
            FileMatcher::Substring { finder, .. } => {
                let value = normalize_needle(file, case_sensitive);
                finder.find(value.as_bytes()).is_some()
            }
            FileMatcher::Regex { regex, .. } => regex.is_match(&normalize_file_path(file)),
        }
    }

    /// Lower-cased literal that every matching path must contain
    pub fn prefilter_literal(&self) -> Option<String> {
        match self {
            FileMatcher::Substring { needle, .. } => Some(normalize_prefilter_path(needle)),
            FileMatcher::Regex { literal, .. } => literal.as_deref().map(normalize_prefilter_path),
        }
        .filter(|l| !l.is_empty())
    }

    pub fn describe(&self) -> &str {
        match self {
            FileMatcher::Substring { needle, .. } => needle,
            FileMatcher::Regex { source, .. } => source,
        }
    }
}

fn normalize_needle(value: &str, case_sensitive: bool) -> String {
    let path = normalize_file_path(value);
    if case_sensitive { path } else { path.to_lowercase() }
}

/// Split `/pattern/flags` into its parts
fn split_regex_token(raw: &str) -> Option<(&str, &str)> {
    let body = raw.strip_prefix('/')?;
    let end = body.rfind('/')?;
    let (pattern, flags) = (&body[..end], &body[end + 1..]);
    if pattern.is_empty() || !flags.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some((pattern, flags))
}

/// True when the `x` flag is set, either on the token or inline
fn is_verbose(pattern: &str, flags: &str) -> bool {
    if flags.chars().any(|c| c.eq_ignore_ascii_case(&'x')) {
        return true;
    }
    pattern.match_indices("(?").any(|(at, _)| {
        pattern[at + 2..]
            .chars()
            .take_while(|c| *c != ')' && *c != ':')
            .any(|c| c == 'x')
    })
}

fn compile_regex(pattern: &str, flags: &str, config: &RegexConfig) -> Result<Regex, String> {
    if pattern.len() > config.max_pattern_length {
        return Err(format!(
            "pattern length {} exceeds limit {}",
            pattern.len(),
            config.max_pattern_length
        ));
    }

    let mut builder = RegexBuilder::new(pattern);
    builder.size_limit(config.size_limit);
    for flag in flags.chars() {
        match flag.to_ascii_lowercase() {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'x' => {
                builder.ignore_whitespace(true);
            }
            // Global, unicode and sticky have no meaning for a single path test
            'g' | 'u' | 'y' => {}
            other => return Err(format!("unsupported regex flag '{other}'")),
        }
    }
    builder.build().map_err(|e| e.to_string())
}

/// Longest run of non-metacharacters, escapes taken literally
pub fn longest_literal_run(pattern: &str) -> String {
    let mut best = String::new();
    let mut current = String::new();
    let mut escaped = false;
    for ch in pattern.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
            continue;
        }
        if REGEX_META.contains(ch) {
            if current.chars().count() > best.chars().count() {
                best = std::mem::take(&mut current);
            } else {
                current.clear();
            }
            continue;
        }
        current.push(ch);
    }
    if current.chars().count() > best.chars().count() {
        best = current;
    }
    best
}

/// Longest literal every match of `pattern` is guaranteed to contain.
///
/// Only top-level text counts: groups and classes end a run, a quantified
/// char (`?`, `*`, `{`) is dropped from the run. Letter escapes (`\d`,
/// `\x41`, `\p{L}`) end a run along with their payload. Escapes we cannot
/// classify, and top-level alternation, yield `None` since no literal is
/// then known to be required.
pub fn extract_regex_literal(pattern: &str) -> Option<String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut best = String::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_class = false;
    let mut i = 0;

    let flush = |current: &mut String, best: &mut String| {
        if current.chars().count() > best.chars().count() {
            *best = std::mem::take(current);
        } else {
            current.clear();
        }
    };

    while i < chars.len() {
        let ch = chars[i];

        if ch == '\\' {
            let next = chars.get(i + 1).copied();
            i += 2;
            let Some(c) = next else {
                flush(&mut current, &mut best);
                continue;
            };
            if c.is_ascii_alphanumeric() {
                i += escape_payload_len(&chars, i, c)?;
                if !in_class && depth == 0 {
                    flush(&mut current, &mut best);
                }
                continue;
            }
            if in_class || depth > 0 {
                continue;
            }
            // \< and \> are word-boundary assertions
            if matches!(c, '<' | '>') || next_is_optional_quantifier(&chars, i) {
                flush(&mut current, &mut best);
            } else {
                current.push(c);
            }
            continue;
        }

        if in_class {
            if ch == ']' {
                in_class = false;
            }
            i += 1;
            continue;
        }

        match ch {
            '[' => {
                in_class = true;
                flush(&mut current, &mut best);
            }
            '(' => {
                depth += 1;
                flush(&mut current, &mut best);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                flush(&mut current, &mut best);
            }
            '|' if depth == 0 => return None,
            _ if depth > 0 => {}
            '?' | '*' | '+' | '{' => {
                flush(&mut current, &mut best);
                if ch == '{' {
                    while i < chars.len() && chars[i] != '}' {
                        i += 1;
                    }
                }
            }
            '^' | '$' | '.' | '}' | ']' => flush(&mut current, &mut best),
            _ => {
                if next_is_optional_quantifier(&chars, i + 1) {
                    flush(&mut current, &mut best);
                } else if chars.get(i + 1) == Some(&'+') {
                    // One occurrence is required, the repeat is not
                    current.push(ch);
                    flush(&mut current, &mut best);
                } else {
                    current.push(ch);
                }
            }
        }
        i += 1;
    }
    flush(&mut current, &mut best);

    (!best.is_empty()).then_some(best)
}

/// Chars following a letter escape that belong to it, or `None` for escapes
/// whose meaning is not known here
fn escape_payload_len(chars: &[char], at: usize, escape: char) -> Option<usize> {
    let braced = || {
        if chars.get(at) != Some(&'{') {
            return None;
        }
        chars[at..].iter().position(|c| *c == '}').map(|end| end + 1)
    };
    match escape {
        'd' | 'D' | 'w' | 'W' | 's' | 'S' | 'B' | 'A' | 'z' | 'n' | 't' | 'r' | 'f' | 'v' | 'a' => Some(0),
        'b' => Some(braced().unwrap_or(0)),
        'x' => braced().or(Some(2)),
        'u' => braced().or(Some(4)),
        'U' => braced().or(Some(8)),
        'p' | 'P' => braced().or(Some(1)),
        _ => None,
    }
}

fn next_is_optional_quantifier(chars: &[char], at: usize) -> bool {
    matches!(chars.get(at), Some('?') | Some('*') | Some('{'))
}

/// Chunk-id superset for a set of OR-ed file matchers.
///
/// Returns `None` (no restriction) when any matcher lacks a literal of at
/// least `n` chars or when `n` differs from the index's char-gram length.
/// Per-file bitmap mirrors are used where the index has them.
pub fn collect_file_prefilter(
    matchers: &[FileMatcher],
    index: &FilterIndex,
    n: usize,
    backend: &dyn BitmapBackend,
    sink: &mut dyn DiagnosticSink,
) -> Option<Candidate> {
    if matchers.is_empty() {
        return None;
    }
    if n != index.file_chargram_n {
        sink.record(FilterEvent::PrefilterSkipped(PrefilterSkip::ChargramMismatch {
            requested: n,
            indexed: index.file_chargram_n,
        }));
        return None;
    }

    let mut needles = Vec::with_capacity(matchers.len());
    for matcher in matchers {
        match matcher.prefilter_literal() {
            Some(literal) if literal.chars().count() >= n => needles.push(literal),
            _ => {
                sink.record(FilterEvent::PrefilterSkipped(PrefilterSkip::NoUsableLiteral {
                    matcher: matcher.describe().to_string(),
                }));
                return None;
            }
        }
    }

    let mut file_ids = IdSet::default();
    for needle in &needles {
        file_ids.extend(files_containing(index, needle, n));
    }

    let mut sets = Vec::new();
    let mut bitmaps = Vec::new();
    let mirrors = index.bitmap.as_ref();
    let mut ordered: Vec<FileId> = file_ids.into_iter().collect();
    ordered.sort_unstable();
    for file_id in ordered {
        if let Some(bitmap) = mirrors.and_then(|m| m.file_chunks(file_id)) {
            bitmaps.push(bitmap);
        } else if let Some(chunks) = index.file_chunks_by_id.get(file_id as usize) {
            sets.push(chunks);
        }
    }
    Some(build_candidate(&sets, &bitmaps, backend).unwrap_or_default())
}

/// File ids whose path holds every char-gram of `needle`
fn files_containing(index: &FilterIndex, needle: &str, n: usize) -> IdSet {
    let grams = query_chargrams(needle, n);
    let mut buckets = Vec::with_capacity(grams.len());
    for gram in &grams {
        match index.file_chargrams.get(gram) {
            Some(bucket) => buckets.push(bucket),
            None => return IdSet::default(),
        }
    }
    buckets.sort_by_key(|b| b.len());
    let Some((first, rest)) = buckets.split_first() else {
        return IdSet::default();
    };
    let mut acc: IdSet = (*first).clone();
    for bucket in rest {
        acc.retain(|id| bucket.contains(id));
        if acc.is_empty() {
            break;
        }
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Corpus;
    use crate::index::bitmap::{PlainBackend, RoaringBackend};
    use crate::index::build::build_filter_index_for_corpus;
    use crate::index::types::FilterIndexConfig;
    use crate::query::diagnostics::{CollectingSink, NullSink};
    use serde_json::json;

    fn parse(token: &str) -> FileMatcher {
        FileMatcher::parse(token, false, &RegexConfig::default(), &mut NullSink).unwrap()
    }

    fn index() -> FilterIndex {
        let corpus = Corpus::from_json(&json!([
            {"id": 0, "file": "src/nested/util.ts"},
            {"id": 1, "file": "src/util.js"},
            {"id": 2, "file": "src/nested/util.ts"},
            {"id": 3, "file": "lib/main.rs"}
        ]));
        build_filter_index_for_corpus(&corpus, &FilterIndexConfig::default(), &RoaringBackend)
    }

    #[test]
    fn test_parse_substring_and_regex() {
        assert!(matches!(parse("Src/Util"), FileMatcher::Substring { ref needle, .. } if needle == "src/util"));
        assert!(matches!(parse("/util\\.ts$/i"), FileMatcher::Regex { .. }));
        assert!(FileMatcher::parse("  ", false, &RegexConfig::default(), &mut NullSink).is_none());
        // No closing slash: plain substring
        assert!(matches!(parse("/src"), FileMatcher::Substring { .. }));
    }

    #[test]
    fn test_substring_match_case() {
        let matcher = parse("UTIL.ts");
        assert!(matcher.is_match("src\\Nested\\util.TS", false));
        let sensitive = FileMatcher::parse("UTIL", true, &RegexConfig::default(), &mut NullSink).unwrap();
        assert!(!sensitive.is_match("src/util.ts", true));
    }

    #[test]
    fn test_regex_default_case_insensitive() {
        let matcher = parse("/UTIL\\.ts$/");
        assert!(matcher.is_match("src/nested/util.ts", false));
        assert!(!matcher.is_match("src/util.js", false));
    }

    #[test]
    fn test_bad_regex_degrades() {
        let mut sink = CollectingSink::new();
        let matcher = FileMatcher::parse("/foo(bar/", false, &RegexConfig::default(), &mut sink).unwrap();
        assert!(matches!(matcher, FileMatcher::Substring { ref needle, .. } if needle == "foo"));
        assert_eq!(sink.regex_fallbacks(), 1);

        let mut sink = CollectingSink::new();
        let matcher = FileMatcher::parse("/util/q", false, &RegexConfig::default(), &mut sink).unwrap();
        assert!(matches!(matcher, FileMatcher::Substring { .. }));
        assert_eq!(sink.regex_fallbacks(), 1);
    }

    #[test]
    fn test_overlong_pattern_degrades() {
        let config = RegexConfig {
            max_pattern_length: 4,
            ..Default::default()
        };
        let mut sink = CollectingSink::new();
        let matcher = FileMatcher::parse("/abcdef/", false, &config, &mut sink).unwrap();
        assert!(matches!(matcher, FileMatcher::Substring { ref needle, .. } if needle == "abcdef"));
    }

    #[test]
    fn test_longest_literal_run() {
        assert_eq!(longest_literal_run("util\\.ts$"), "util.ts");
        assert_eq!(longest_literal_run("^a.bcd"), "bcd");
        assert_eq!(longest_literal_run(".*"), "");
    }

    #[test]
    fn test_extract_regex_literal() {
        assert_eq!(extract_regex_literal("util\\.ts$").as_deref(), Some("util.ts"));
        assert_eq!(extract_regex_literal("src/(a|b)/main").as_deref(), Some("/main"));
        assert_eq!(extract_regex_literal("foo|barbaz"), None);
        assert_eq!(extract_regex_literal("colou?r").as_deref(), Some("colo"));
        assert_eq!(extract_regex_literal("ab+cde").as_deref(), Some("cde"));
        assert_eq!(extract_regex_literal("x[abc]yz\\d+w").as_deref(), Some("yz"));
        assert_eq!(extract_regex_literal(".*"), None);
    }

    #[test]
    fn test_extract_regex_literal_escapes() {
        assert_eq!(extract_regex_literal("\\x41bcdef").as_deref(), Some("bcdef"));
        assert_eq!(extract_regex_literal("\\x{41}bcdef").as_deref(), Some("bcdef"));
        assert_eq!(extract_regex_literal("\\u0041bcdef").as_deref(), Some("bcdef"));
        assert_eq!(extract_regex_literal("\\u{1F600}smile").as_deref(), Some("smile"));
        assert_eq!(extract_regex_literal("\\p{Lu}pper").as_deref(), Some("pper"));
        assert_eq!(extract_regex_literal("\\pLower").as_deref(), Some("ower"));
        assert_eq!(extract_regex_literal("\\bmain\\b").as_deref(), Some("main"));
        assert_eq!(extract_regex_literal("\\<main\\>").as_deref(), Some("main"));
        assert_eq!(extract_regex_literal("[\\x5d]util").as_deref(), Some("util"));
        assert_eq!(extract_regex_literal("\\k<name>abc"), None);
    }

    #[test]
    fn test_verbose_regex_has_no_literal() {
        assert!(parse("/u t i l/x").prefilter_literal().is_none());
        assert!(parse("/(?x) u t i l/").prefilter_literal().is_none());
        assert_eq!(parse("/(?i)util/").prefilter_literal().as_deref(), Some("util"));
    }

    #[test]
    fn test_prefilter_keeps_hex_escaped_match() {
        let corpus = Corpus::from_json(&json!([
            {"id": 0, "file": "src/Abcdef.rs"},
            {"id": 1, "file": "src/other.rs"}
        ]));
        let index = build_filter_index_for_corpus(&corpus, &FilterIndexConfig::default(), &RoaringBackend);
        let matchers = vec![parse("/\\x41bcdef/")];
        let candidate = collect_file_prefilter(&matchers, &index, 3, &RoaringBackend, &mut NullSink).unwrap();
        assert_eq!(candidate.to_sorted_vec(), vec![0]);
        assert!(matchers[0].is_match("src/Abcdef.rs", false));
    }

    #[test]
    fn test_prefilter_regex_scenario() {
        let index = index();
        let matchers = vec![parse("/util\\.ts$/i")];
        let candidate = collect_file_prefilter(&matchers, &index, 3, &RoaringBackend, &mut NullSink).unwrap();
        assert_eq!(candidate.to_sorted_vec(), vec![0, 2]);
    }

    #[test]
    fn test_prefilter_is_superset_of_substring_matches() {
        let index = index();
        let matchers = vec![parse("util"), parse("main")];
        let candidate = collect_file_prefilter(&matchers, &index, 3, &PlainBackend, &mut NullSink).unwrap();
        assert_eq!(candidate.to_sorted_vec(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_prefilter_no_file_matches_is_empty() {
        let index = index();
        let matchers = vec![parse("zzzz")];
        let candidate = collect_file_prefilter(&matchers, &index, 3, &RoaringBackend, &mut NullSink).unwrap();
        assert!(candidate.is_empty());
    }

    #[test]
    fn test_prefilter_skips_short_or_alternation() {
        let index = index();
        let mut sink = CollectingSink::new();
        let matchers = vec![parse("util"), parse("rs")];
        assert!(collect_file_prefilter(&matchers, &index, 3, &RoaringBackend, &mut sink).is_none());
        assert_eq!(sink.prefilter_skips().len(), 1);

        let matchers = vec![parse("/main|util/")];
        assert!(collect_file_prefilter(&matchers, &index, 3, &RoaringBackend, &mut NullSink).is_none());
    }

    #[test]
    fn test_prefilter_chargram_mismatch() {
        let index = index();
        let mut sink = CollectingSink::new();
        let matchers = vec![parse("util")];
        assert!(collect_file_prefilter(&matchers, &index, 4, &RoaringBackend, &mut sink).is_none());
        assert_eq!(
            sink.prefilter_skips(),
            vec![&PrefilterSkip::ChargramMismatch { requested: 4, indexed: 3 }]
        );
    }
}
