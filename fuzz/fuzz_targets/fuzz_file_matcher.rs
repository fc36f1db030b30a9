#![no_main]

use chunkfilter::query::{FileMatcher, NullSink, RegexConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (&str, &str, bool)| {
    // Arbitrary file tokens must parse (or degrade) without panicking,
    // and any extracted literal must occur in every path the regex matches
    let (token, path, case_sensitive) = input;
    let Some(matcher) = FileMatcher::parse(token, case_sensitive, &RegexConfig::default(), &mut NullSink) else {
        return;
    };
    let _ = chunkfilter::query::file_matcher::longest_literal_run(token);
    if matcher.is_match(path, case_sensitive) {
        if let Some(literal) = matcher.prefilter_literal() {
            let haystack = chunkfilter::utils::normalize_prefilter_path(path);
            assert!(haystack.contains(&literal), "{:?} not in {:?}", literal, path);
        }
    }
});
