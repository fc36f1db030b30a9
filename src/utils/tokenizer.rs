/// Lower-case a field value for bucketing and comparison
#[inline]
pub fn normalize(value: &str) -> String {
    value.to_lowercase()
}

/// Split filter entries on commas and whitespace, dropping empties.
///
/// `"Function, Class"` and `["Function", "Class"]` both yield two needles.
pub fn normalize_list<S: AsRef<str>>(entries: &[S]) -> Vec<String> {
    entries
        .iter()
        .flat_map(|entry| {
            entry
                .as_ref()
                .split(|c: char| c == ',' || c.is_whitespace())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Split phrase entries on commas only; whitespace stays inside a phrase
pub fn normalize_phrase_list<S: AsRef<str>>(entries: &[S]) -> Vec<String> {
    let mut out = Vec::new();
    for entry in entries {
        let raw = entry.as_ref().trim();
        if raw.is_empty() {
            continue;
        }
        out.extend(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
    }
    out
}

/// Join runs of whitespace with underscores, the form word n-grams use
pub fn phrase_to_ngram(phrase: &str) -> String {
    phrase.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Word n-grams of length `min..=max`, joined with underscores
pub fn extract_ngrams<S: AsRef<str>>(tokens: &[S], min: usize, max: usize) -> Vec<String> {
    let mut grams = Vec::new();
    if min == 0 {
        return grams;
    }
    for n in min..=max {
        if n > tokens.len() {
            break;
        }
        for window in tokens.windows(n) {
            let parts: Vec<&str> = window.iter().map(|t| t.as_ref()).collect();
            grams.push(parts.join("_"));
        }
    }
    grams
}

/// Word-count range spanned by multi-word phrase needles (`a_b_c` has 3 words).
/// Single-word needles do not contribute.
pub fn phrase_length_range<S: AsRef<str>>(needles: &[S]) -> Option<(usize, usize)> {
    let mut range: Option<(usize, usize)> = None;
    for needle in needles {
        let len = needle.as_ref().split('_').filter(|p| !p.is_empty()).count();
        if len < 2 {
            continue;
        }
        range = Some(match range {
            Some((min, max)) => (min.min(len), max.max(len)),
            None => (len, len),
        });
    }
    range
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_list() {
        let out = normalize_list(&["Function, Class", " method "]);
        assert_eq!(out, vec!["Function", "Class", "method"]);
        assert!(normalize_list::<&str>(&[]).is_empty());
        assert!(normalize_list(&[" , "]).is_empty());
    }

    #[test]
    fn test_normalize_phrase_list() {
        let out = normalize_phrase_list(&["foo bar, baz", ""]);
        assert_eq!(out, vec!["foo bar", "baz"]);
    }

    #[test]
    fn test_phrase_to_ngram() {
        assert_eq!(phrase_to_ngram("read  file sync"), "read_file_sync");
    }

    #[test]
    fn test_extract_ngrams() {
        let grams = extract_ngrams(&["a", "b", "c"], 2, 3);
        assert_eq!(grams, vec!["a_b", "b_c", "a_b_c"]);
        assert!(extract_ngrams(&["a"], 2, 4).is_empty());
    }

    #[test]
    fn test_phrase_length_range() {
        assert_eq!(phrase_length_range(&["a_b", "a_b_c_d", "solo"]), Some((2, 4)));
        assert_eq!(phrase_length_range(&["solo"]), None);
    }
}
