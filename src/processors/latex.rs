//! Conversion of raw decoder text into LaTeX.
//!
//! The decoder emits display math as `\[ ... \]` and never escapes percent
//! signs. These rules rewrite that into LaTeX that compiles as-is, and can
//! optionally split aligned blocks into standalone `$$ ... $$` equations or
//! swap inline `\( \)` delimiters for `$`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static ALIGN_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\begin\{align\*\}|\\end\{align\*\}").expect("align marker pattern is valid")
});

/// Output formatting switches chosen per request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostprocessOptions {
    /// Replace `\(` and `\)` with `$`.
    pub use_dollars: bool,
    /// Split `align*` blocks into one `$$ ... $$` line per row.
    pub convert_align: bool,
}

impl PostprocessOptions {
    pub fn new(use_dollars: bool, convert_align: bool) -> Self {
        Self {
            use_dollars,
            convert_align,
        }
    }
}

/// Applies the LaTeX rewrite rules in order:
///
/// 1. `\[` becomes `\begin{align*}` and `\]` becomes `\end{align*}`
/// 2. `%` becomes `\%`
/// 3. with `convert_align`, see [`convert_align_to_equations`]
/// 4. with `use_dollars`, `\(` and `\)` become `$`
///
/// # Examples
///
/// ```
/// use mixtex_ocr::processors::{PostprocessOptions, postprocess_latex};
///
/// let out = postprocess_latex(r"\[x+y\]", &PostprocessOptions::default());
/// assert_eq!(out, r"\begin{align*}x+y\end{align*}");
/// ```
pub fn postprocess_latex(text: &str, options: &PostprocessOptions) -> String {
    let mut result = text
        .replace(r"\[", r"\begin{align*}")
        .replace(r"\]", r"\end{align*}")
        .replace('%', r"\%");

    if options.convert_align {
        result = convert_align_to_equations(&result);
    }

    if options.use_dollars {
        result = result.replace(r"\(", "$").replace(r"\)", "$");
    }

    result
}

/// Flattens `align*` environments into one display equation per row.
///
/// Environment markers and `&` alignment points are dropped, the body is split
/// on `\\` row separators, and every non-empty row is emitted as
/// `$$ row $$` on its own line.
pub fn convert_align_to_equations(text: &str) -> String {
    let stripped = ALIGN_MARKERS.replace_all(text, "").replace('&', "");

    stripped
        .trim()
        .split(r"\\")
        .map(|eq| eq.trim().replace(r"\[", "").replace(r"\]", "").replace('\n', ""))
        .filter(|eq| !eq.is_empty())
        .map(|eq| format!("$$ {eq} $$"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_brackets_become_align() {
        let out = postprocess_latex(r"\[x+y\]", &PostprocessOptions::default());
        assert_eq!(out, r"\begin{align*}x+y\end{align*}");
    }

    #[test]
    fn test_percent_is_escaped() {
        let out = postprocess_latex("50%", &PostprocessOptions::default());
        assert_eq!(out, r"50\%");
    }

    #[test]
    fn test_use_dollars() {
        let out = postprocess_latex(r"\(a\)", &PostprocessOptions::new(true, false));
        assert_eq!(out, "$a$");

        let untouched = postprocess_latex(r"\(a\)", &PostprocessOptions::default());
        assert_eq!(untouched, r"\(a\)");
    }

    #[test]
    fn test_convert_align_splits_rows() {
        let out = postprocess_latex(
            r"\begin{align*}x&=1\\y&=2\end{align*}",
            &PostprocessOptions::new(false, true),
        );
        assert_eq!(out, "$$ x=1 $$\n$$ y=2 $$");
    }

    #[test]
    fn test_convert_align_from_display_brackets() {
        let out = postprocess_latex(
            "\\[a &= b \\\\\n c &= d\\]",
            &PostprocessOptions::new(false, true),
        );
        assert_eq!(out, "$$ a = b $$\n$$ c = d $$");
    }

    #[test]
    fn test_convert_align_drops_empty_rows() {
        assert_eq!(convert_align_to_equations(r"a\\\\b\\"), "$$ a $$\n$$ b $$");
        assert_eq!(convert_align_to_equations(r"\begin{align*}\end{align*}"), "");
    }

    #[test]
    fn test_all_rules_together() {
        let out = postprocess_latex(
            r"\(p\) is 5% of \[q\]",
            &PostprocessOptions::new(true, true),
        );
        assert_eq!(out, r"$$ $p$ is 5\% of q $$");
    }

    #[test]
    fn test_plain_text_passes_through() {
        let text = r"\frac{a}{b} + \sqrt{2}";
        assert_eq!(postprocess_latex(text, &PostprocessOptions::default()), text);
    }
}
