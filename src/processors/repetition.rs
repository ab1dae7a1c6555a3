//! Degenerate repetition detection for generated text.

/// Returns `true` if some non-empty pattern occurs `repeats` times in a row
/// anywhere in `text`. Positions are counted in characters, not bytes.
///
/// A block of `repeats` copies of a length-`L` pattern starting at `i` is the
/// same thing as `text[j] == text[j + L]` holding for every `j` in
/// `i..i + (repeats - 1) * L`, so each period is checked with one pass that
/// tracks the current run of such matches.
///
/// `repeats == 0` is treated as "never repeats".
///
/// # Examples
///
/// ```
/// use mixtex_ocr::processors::has_repetition;
///
/// assert!(has_repetition("ababab", 3));
/// assert!(!has_repetition("abcabcabc", 4));
/// ```
pub fn has_repetition(text: &str, repeats: usize) -> bool {
    if repeats == 0 {
        return false;
    }
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    if repeats == 1 {
        return len > 0;
    }

    for period in 1..=len / repeats {
        let needed = (repeats - 1) * period;
        let mut run = 0usize;
        for j in 0..len - period {
            if chars[j] == chars[j + period] {
                run += 1;
                if run >= needed {
                    return true;
                }
            } else {
                run = 0;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Direct search over every pattern length and start position.
    fn has_repetition_exhaustive(text: &str, repeats: usize) -> bool {
        if repeats == 0 {
            return false;
        }
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        for period in 1..=len / repeats {
            for start in 0..=len - repeats * period {
                let pattern = &chars[start..start + period];
                let window = &chars[start..start + repeats * period];
                if window.chunks(period).all(|chunk| chunk == pattern) {
                    return true;
                }
            }
        }
        false
    }

    #[test]
    fn test_known_examples() {
        assert!(has_repetition("ababab", 3));
        assert!(!has_repetition("abcabcabc", 4));
        assert!(has_repetition(&"x".repeat(100), 5));
        assert!(has_repetition("abcabcabc", 3));
        assert!(!has_repetition("abcabcab", 3));
    }

    #[test]
    fn test_short_and_empty_text() {
        assert!(!has_repetition("", 3));
        assert!(!has_repetition("ab", 3));
        assert!(!has_repetition("abc", 0));
        assert!(has_repetition("a", 1));
        assert!(!has_repetition("", 1));
    }

    #[test]
    fn test_repetition_in_the_middle() {
        assert!(has_repetition(r"\frac{1}{2} x x x x y", 4));
        assert!(!has_repetition(r"\frac{1}{2} x x x y", 4));
    }

    #[test]
    fn test_unicode_is_counted_by_character() {
        assert!(has_repetition("αβαβαβ", 3));
        assert!(has_repetition("前前前", 3));
        assert!(!has_repetition("前後前", 2));
    }

    #[test]
    fn test_decoder_threshold_on_latex_loop() {
        let looping = format!("x = {}", r"\quad ".repeat(21));
        assert!(has_repetition(&looping, 21));
        let short = format!("x = {}", r"\quad ".repeat(20));
        assert!(!has_repetition(&short, 21));
    }

    proptest! {
        #[test]
        fn matches_exhaustive_search(text in "[ab ]{0,40}", repeats in 1usize..6) {
            prop_assert_eq!(
                has_repetition(&text, repeats),
                has_repetition_exhaustive(&text, repeats)
            );
        }

        #[test]
        fn matches_exhaustive_search_unicode(text in "[αβx]{0,30}", repeats in 2usize..5) {
            prop_assert_eq!(
                has_repetition(&text, repeats),
                has_repetition_exhaustive(&text, repeats)
            );
        }
    }
}
