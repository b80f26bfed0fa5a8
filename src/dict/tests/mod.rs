mod iterate;
mod ngram;

/// Code points of an ASCII/BMP test word.
pub(crate) fn cps(s: &str) -> Vec<u32> {
    s.chars().map(|c| c as u32).collect()
}
