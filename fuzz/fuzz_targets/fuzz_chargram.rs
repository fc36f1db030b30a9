#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (&str, u8)| {
    // Every query gram of a substring must be an indexed gram of the text
    let (text, n) = input;
    let n = (n % 6) as usize + 2;
    let path = chunkfilter::utils::normalize_prefilter_path(text);
    let grams = chunkfilter::utils::extract_chargrams(&path, n);
    let chars: Vec<char> = path.chars().collect();
    if chars.len() > n + 1 {
        let needle: String = chars[1..chars.len() - 1].iter().collect();
        for gram in chunkfilter::utils::extract_chargrams(&needle, n) {
            assert!(grams.binary_search(&gram).is_ok());
        }
    }
});
