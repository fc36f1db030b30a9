/// Normalize path separators to forward slashes
pub fn normalize_file_path(path: &str) -> String {
    if path.contains('\\') {
        path.replace('\\', "/")
    } else {
        path.to_string()
    }
}

/// Path form used for char-gram bucketing: forward slashes, lower-cased
pub fn normalize_prefilter_path(path: &str) -> String {
    normalize_file_path(path).to_lowercase()
}

/// Extract the unique char n-grams of an already-normalized string.
///
/// Grams are taken over chars, not bytes, so multi-byte paths never split a
/// code point. Output is sorted for deterministic bucketing.
pub fn extract_chargrams(text: &str, n: usize) -> Vec<String> {
    if n == 0 {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < n {
        return Vec::new();
    }

    let mut grams: Vec<String> = chars.windows(n).map(|w| w.iter().collect()).collect();
    grams.sort_unstable();
    grams.dedup();
    grams
}

/// Char n-grams of a query needle, normalized the same way paths are
pub fn query_chargrams(needle: &str, n: usize) -> Vec<String> {
    extract_chargrams(&normalize_prefilter_path(needle), n)
}
