//! Pattern compiler
//!
//! Turns a rule's raw pattern and pattern type into an executable
//! [`Matcher`]. Compilation is pure; a compiled matcher can be shared by
//! every snapshot that contains an identical `(pattern, pattern_type)`.

use aho_corasick::{AhoCorasick, Input};
use guardrails_core::{Error, PatternType, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Byte range of a match within the scanned text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Executable form of a rule pattern
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Literal substring search (exact, or ASCII case-folded keyword)
    Literal(AhoCorasick),
    /// Regular expression (regex, glob, or non-ASCII keyword)
    Regex(Regex),
}

impl Matcher {
    /// Leftmost non-empty match
    pub fn find(&self, text: &str) -> Option<Span> {
        match self {
            Self::Literal(ac) => ac.find(text).map(|m| Span::new(m.start(), m.end())),
            Self::Regex(re) => re
                .find_iter(text)
                .find(|m| !m.as_str().is_empty())
                .map(|m| Span::new(m.start(), m.end())),
        }
    }

    /// Leftmost non-empty match starting at or after byte offset `start`.
    ///
    /// The text before `start` still counts as context for anchors and
    /// word boundaries. `start` must lie on a char boundary.
    pub fn find_at(&self, text: &str, start: usize) -> Option<Span> {
        match self {
            Self::Literal(ac) => ac
                .find(Input::new(text).range(start..))
                .map(|m| Span::new(m.start(), m.end())),
            Self::Regex(re) => {
                let mut at = start;
                while at <= text.len() {
                    let m = re.find_at(text, at)?;
                    if !m.as_str().is_empty() {
                        return Some(Span::new(m.start(), m.end()));
                    }
                    at = next_char_boundary(text, m.start());
                }
                None
            }
        }
    }

    /// All non-overlapping, non-empty matches, left to right
    pub fn find_all(&self, text: &str) -> Vec<Span> {
        match self {
            Self::Literal(ac) => ac
                .find_iter(text)
                .map(|m| Span::new(m.start(), m.end()))
                .collect(),
            Self::Regex(re) => re
                .find_iter(text)
                .filter(|m| !m.as_str().is_empty())
                .map(|m| Span::new(m.start(), m.end()))
                .collect(),
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.find(text).is_some()
    }
}

/// Offset of the char after the one starting at `at`
pub(crate) fn next_char_boundary(text: &str, at: usize) -> usize {
    at + text[at..].chars().next().map_or(1, char::len_utf8)
}

/// Limits applied when building regex programs.
///
/// The regex engine never backtracks, so match time is linear in the input;
/// what remains to bound is the size of the compiled program, which these
/// limits cap at rule-save time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOptions {
    /// Maximum size of a compiled regex program, in bytes
    #[serde(default = "default_regex_size_limit")]
    pub regex_size_limit: usize,

    /// Maximum size of the lazy DFA cache, in bytes
    #[serde(default = "default_dfa_size_limit")]
    pub dfa_size_limit: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            regex_size_limit: default_regex_size_limit(),
            dfa_size_limit: default_dfa_size_limit(),
        }
    }
}

fn default_regex_size_limit() -> usize {
    1024 * 1024 // 1MB
}

fn default_dfa_size_limit() -> usize {
    2 * 1024 * 1024 // 2MB
}

/// Result of running a pattern against sample text without saving it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternPreview {
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
    /// Number of non-overlapping matches in the sample
    pub match_count: usize,
}

/// Compiles rule patterns into matchers
#[derive(Debug, Clone, Default)]
pub struct PatternCompiler {
    options: CompileOptions,
}

impl PatternCompiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile a pattern, failing fast on anything that cannot run safely
    pub fn compile(&self, pattern: &str, pattern_type: PatternType) -> Result<Matcher> {
        if pattern.is_empty() {
            return Err(Error::compile(pattern_type, "pattern must not be empty"));
        }

        let matcher = match pattern_type {
            PatternType::Exact => self.literal(pattern, false, pattern_type)?,
            PatternType::Keyword if pattern.is_ascii() => {
                self.literal(pattern, true, pattern_type)?
            }
            // Unicode case folding through the regex engine keeps byte
            // offsets aligned with the original text.
            PatternType::Keyword => {
                self.regex(&regex::escape(pattern), true, pattern_type)?
            }
            PatternType::Regex => self.regex(pattern, false, pattern_type)?,
            PatternType::Glob => {
                let translated = glob_to_regex(pattern);
                if translated.is_empty() {
                    return Err(Error::compile(
                        pattern_type,
                        "glob consisting only of wildcards matches everything",
                    ));
                }
                self.regex(&translated, false, pattern_type)?
            }
        };

        if let Matcher::Regex(re) = &matcher {
            if re.is_match("") {
                return Err(Error::compile(
                    pattern_type,
                    "pattern matches empty input and would fire on every scan",
                ));
            }
        }

        Ok(matcher)
    }

    /// Compile a pattern and run it against sample text
    pub fn preview(
        &self,
        pattern: &str,
        pattern_type: PatternType,
        sample: &str,
    ) -> Result<PatternPreview> {
        let matcher = self.compile(pattern, pattern_type)?;
        let spans = matcher.find_all(sample);
        Ok(PatternPreview {
            matched: !spans.is_empty(),
            span: spans.first().copied(),
            match_count: spans.len(),
        })
    }

    fn literal(
        &self,
        pattern: &str,
        case_insensitive: bool,
        pattern_type: PatternType,
    ) -> Result<Matcher> {
        let ac = AhoCorasick::builder()
            .ascii_case_insensitive(case_insensitive)
            .build([pattern])
            .map_err(|e| Error::compile(pattern_type, e.to_string()))?;
        Ok(Matcher::Literal(ac))
    }

    fn regex(
        &self,
        pattern: &str,
        case_insensitive: bool,
        pattern_type: PatternType,
    ) -> Result<Matcher> {
        let re = RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .size_limit(self.options.regex_size_limit)
            .dfa_size_limit(self.options.dfa_size_limit)
            .build()
            .map_err(|e| Error::compile(pattern_type, e.to_string()))?;
        Ok(Matcher::Regex(re))
    }
}

/// Translate a glob into an unanchored regex.
///
/// `*` becomes `.*`, `?` becomes `.`, everything else is literal. Runs of
/// `*` collapse, and leading or trailing `*` are dropped: a glob already
/// matches anywhere in the text, so they would only widen the captured
/// span.
pub fn glob_to_regex(glob: &str) -> String {
    let trimmed = glob.trim_matches('*');
    let mut out = String::with_capacity(trimmed.len() * 2);
    let mut prev_star = false;

    for ch in trimmed.chars() {
        match ch {
            '*' => {
                if !prev_star {
                    out.push_str(".*");
                }
                prev_star = true;
                continue;
            }
            '?' => out.push('.'),
            other => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(other.encode_utf8(&mut buf)));
            }
        }
        prev_star = false;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(pattern: &str, pattern_type: PatternType) -> Result<Matcher> {
        PatternCompiler::default().compile(pattern, pattern_type)
    }

    #[test]
    fn test_exact_is_case_sensitive_substring() {
        let m = compile("sk_live_", PatternType::Exact).unwrap();
        assert_eq!(m.find("here is sk_live_abc123"), Some(Span::new(8, 16)));
        assert!(m.find("here is SK_LIVE_abc123").is_none());
    }

    #[test]
    fn test_keyword_is_case_insensitive() {
        let m = compile("SSN", PatternType::Keyword).unwrap();
        assert_eq!(m.find("Patient ssn on file"), Some(Span::new(8, 11)));
    }

    #[test]
    fn test_non_ascii_keyword_keeps_offsets() {
        let m = compile("GEHEIM", PatternType::Keyword).unwrap();
        let text = "Straße: geheim";
        let span = m.find(text).unwrap();
        assert_eq!(&text[span.start..span.end], "geheim");

        let m = compile("Straße", PatternType::Keyword).unwrap();
        let span = m.find("in der STRASSE oder straße").unwrap();
        assert_eq!(span.start, "in der STRASSE oder ".len());
    }

    #[test]
    fn test_regex_invalid_syntax_fails_fast() {
        let err = compile("(unclosed", PatternType::Regex).unwrap_err();
        assert_eq!(err.kind(), "compile_error");
    }

    #[test]
    fn test_regex_matching_empty_is_rejected() {
        assert!(compile(".*", PatternType::Regex).is_err());
        assert!(compile("a*", PatternType::Regex).is_err());
        assert!(compile("", PatternType::Exact).is_err());
    }

    #[test]
    fn test_oversized_regex_is_rejected() {
        let compiler = PatternCompiler::new(CompileOptions {
            regex_size_limit: 10 * 1024,
            dfa_size_limit: 10 * 1024,
        });
        let err = compiler
            .compile(r"(\w{100}){100}", PatternType::Regex)
            .unwrap_err();
        assert_eq!(err.kind(), "compile_error");
    }

    #[test]
    fn test_glob_translation() {
        assert_eq!(glob_to_regex("AKIA????"), "AKIA....");
        assert_eq!(glob_to_regex("*secret*"), "secret");
        assert_eq!(glob_to_regex("db_**_pass"), r"db_.*_pass");
        assert_eq!(glob_to_regex("a.b(c)"), r"a\.b\(c\)");
    }

    #[test]
    fn test_glob_matches_anywhere() {
        let m = compile("project-*-internal", PatternType::Glob).unwrap();
        let text = "see project-falcon-internal docs";
        let span = m.find(text).unwrap();
        assert_eq!(&text[span.start..span.end], "project-falcon-internal");

        assert!(compile("***", PatternType::Glob).is_err());
    }

    #[test]
    fn test_find_all_is_non_overlapping() {
        let m = compile("ab", PatternType::Keyword).unwrap();
        assert_eq!(
            m.find_all("AB ab aB"),
            vec![Span::new(0, 2), Span::new(3, 5), Span::new(6, 8)]
        );
    }

    #[test]
    fn test_find_at_keeps_preceding_context() {
        let literal = compile("ab", PatternType::Keyword).unwrap();
        assert_eq!(literal.find_at("abAB", 1), Some(Span::new(2, 4)));

        let word = compile(r"\bab\b", PatternType::Regex).unwrap();
        assert_eq!(word.find_at("xab ab", 1), Some(Span::new(4, 6)));
        assert_eq!(word.find_at("xab ab", 5), None);
    }

    #[test]
    fn test_preview() {
        let preview = PatternCompiler::default()
            .preview(r"\b\d{3}-\d{2}-\d{4}\b", PatternType::Regex, "ssn 123-45-6789 and 987-65-4321")
            .unwrap();
        assert!(preview.matched);
        assert_eq!(preview.match_count, 2);
        assert_eq!(preview.span, Some(Span::new(4, 15)));
    }
}
