//! Safety gate for generated SQL.
//!
//! Inspects a candidate query before it reaches the warehouse. Only a single
//! read-only `SELECT` statement is accepted; anything carrying a statement
//! separator, a data-modification keyword, or an administrative keyword is
//! rejected. Ratio expressions that would divide in the integer domain are
//! accepted with a soft warning so the caller can correct them.
//!
//! Keyword inspection runs on a masked copy of the text in which string
//! literals, quoted identifiers and comments are blanked out byte for byte.
//! Byte offsets in the masked copy therefore line up with the normalized
//! text, and literals are never touched.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Classification produced by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationResult {
    /// Safe to execute.
    Accepted,
    /// The first keyword is not `SELECT`.
    RejectedNotSelect,
    /// Separator, data-modification, or administrative keyword found.
    RejectedUnsafePattern,
    /// Nothing left after trimming whitespace, comments and terminators.
    RejectedEmptyAfterNormalize,
}

impl ValidationResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationResult::Accepted)
    }
}

/// Non-fatal finding attached to an accepted candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateWarning {
    /// A ratio divides two integer-typed terms and will truncate.
    IntegerDivision {
        /// Byte span of the numerator inside `normalized_text`.
        numerator: Range<usize>,
        /// The offending `a / b` expression, for logs and feedback.
        expression: String,
    },
}

impl std::fmt::Display for GateWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateWarning::IntegerDivision { expression, .. } => write!(
                f,
                "integer division in ratio `{}`; multiply the numerator by 1.0",
                expression
            ),
        }
    }
}

/// A query proposed for execution together with the gate's verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlCandidate {
    pub raw_text: String,
    /// Trimmed text without a trailing terminator. Literals are untouched.
    pub normalized_text: String,
    pub validation_result: ValidationResult,
    /// Human-readable reason for a rejection, fed back to the query author.
    pub reason: Option<String>,
    pub warnings: Vec<GateWarning>,
}

// =============================================================================
// Compiled patterns
// =============================================================================

static FORBIDDEN_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(insert|update|delete|drop|alter|truncate|grant|create|into|merge|replace|upsert|revoke|copy|unload|vacuum|call|execute|exec|lock|attach|detach|pragma|set|reset)\b",
    )
    .expect("Invalid forbidden keyword regex")
});

const OPERAND: &str = r"(?:(?:sum|count)\s*\(\s*(?:distinct\s+)?[a-z_][a-z0-9_.]*\s*\)|count\s*\(\s*\*\s*\)|[a-z_][a-z0-9_]*(?:\.[a-z_][a-z0-9_]*)?|\d+)";

static DIVISION_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"(?P<num>{op})(?P<ncast>\s*::\s*[a-z0-9_]+)?\s*/\s*(?P<den>nullif\s*\(\s*{op}\s*,\s*0\s*\)|{op})(?P<dcast>\s*::\s*[a-z0-9_]+)?",
        op = OPERAND
    );
    Regex::new(&pattern).expect("Invalid division regex")
});

const FLOAT_TYPES: &[&str] = &[
    "float", "float4", "float8", "real", "double", "numeric", "decimal",
];

// =============================================================================
// SqlSafetyGate
// =============================================================================

/// Stateless validator for generated SQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlSafetyGate;

impl SqlSafetyGate {
    pub fn new() -> Self {
        Self
    }

    /// Validate a candidate query.
    ///
    /// Checks run in order: emptiness, first keyword, unsafe patterns. The
    /// integer-division scan only runs on otherwise accepted text.
    pub fn validate(&self, candidate_text: &str) -> SqlCandidate {
        let normalized = normalize(candidate_text);
        let masked = mask_sql(&normalized).to_ascii_lowercase();

        let reject = |result: ValidationResult, reason: String| SqlCandidate {
            raw_text: candidate_text.to_string(),
            normalized_text: normalized.clone(),
            validation_result: result,
            reason: Some(reason),
            warnings: Vec::new(),
        };

        if masked.trim().is_empty() {
            return reject(
                ValidationResult::RejectedEmptyAfterNormalize,
                "the query is empty".to_string(),
            );
        }

        let first = first_keyword(&masked);
        if first != "select" {
            return reject(
                ValidationResult::RejectedNotSelect,
                format!(
                    "only SELECT statements are allowed, found `{}`",
                    if first.is_empty() { "?" } else { first }
                ),
            );
        }

        if masked.contains(';') {
            return reject(
                ValidationResult::RejectedUnsafePattern,
                "multiple statements are not allowed".to_string(),
            );
        }

        if let Some(m) = FORBIDDEN_KEYWORD_RE.find(&masked) {
            return reject(
                ValidationResult::RejectedUnsafePattern,
                format!("keyword `{}` is not allowed", m.as_str()),
            );
        }

        let warnings = integer_division_warnings(&normalized, &masked);

        SqlCandidate {
            raw_text: candidate_text.to_string(),
            normalized_text: normalized,
            validation_result: ValidationResult::Accepted,
            reason: None,
            warnings,
        }
    }
}

/// Convenience wrapper around [`SqlSafetyGate::validate`].
pub fn validate(candidate_text: &str) -> SqlCandidate {
    SqlSafetyGate.validate(candidate_text)
}

// =============================================================================
// Helpers
// =============================================================================

/// Trim whitespace and one trailing statement terminator.
fn normalize(text: &str) -> String {
    let trimmed = text.trim();
    let masked = mask_sql(trimmed);
    let tail = masked.trim_end();
    if tail.ends_with(';') {
        let cut = tail.len() - 1;
        trimmed[..cut].trim_end().to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum MaskState {
    Code,
    SingleQuote,
    DoubleQuote,
    LineComment,
    BlockComment,
}

/// Blank literal contents, quoted identifiers and comments.
///
/// The output has the same byte length as the input: every masked character
/// is replaced by as many spaces as it occupies in UTF-8. Quote delimiters
/// are kept so the shape of the statement survives.
pub fn mask_sql(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut state = MaskState::Code;
    let mut chars = text.chars().peekable();

    let blank = |out: &mut String, c: char| {
        for _ in 0..c.len_utf8() {
            out.push(' ');
        }
    };

    while let Some(c) = chars.next() {
        match state {
            MaskState::Code => match c {
                '\'' => {
                    state = MaskState::SingleQuote;
                    out.push(c);
                }
                '"' => {
                    state = MaskState::DoubleQuote;
                    out.push(c);
                }
                '-' if chars.peek() == Some(&'-') => {
                    state = MaskState::LineComment;
                    blank(&mut out, c);
                }
                '/' if chars.peek() == Some(&'*') => {
                    state = MaskState::BlockComment;
                    blank(&mut out, c);
                    if let Some(star) = chars.next() {
                        blank(&mut out, star);
                    }
                }
                _ => out.push(c),
            },
            MaskState::SingleQuote => {
                if c == '\'' {
                    state = MaskState::Code;
                    out.push(c);
                } else {
                    blank(&mut out, c);
                }
            }
            MaskState::DoubleQuote => {
                if c == '"' {
                    state = MaskState::Code;
                    out.push(c);
                } else {
                    blank(&mut out, c);
                }
            }
            MaskState::LineComment => {
                if c == '\n' {
                    state = MaskState::Code;
                    out.push(c);
                } else {
                    blank(&mut out, c);
                }
            }
            MaskState::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    blank(&mut out, c);
                    if let Some(slash) = chars.next() {
                        blank(&mut out, slash);
                    }
                    state = MaskState::Code;
                } else {
                    blank(&mut out, c);
                }
            }
        }
    }
    out
}

/// First alphabetic word after leading whitespace and parentheses.
fn first_keyword(masked: &str) -> &str {
    let start = masked
        .find(|c: char| !(c.is_whitespace() || c == '('))
        .unwrap_or(masked.len());
    let rest = &masked[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    &rest[..end]
}

fn is_float_cast(cast: Option<regex::Match<'_>>) -> bool {
    cast.map(|m| {
        let ty = m.as_str().trim_start().trim_start_matches(':').trim();
        FLOAT_TYPES.iter().any(|t| ty.starts_with(t))
    })
    .unwrap_or(false)
}

fn is_integer_literal(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// True when the text just before `pos` scales the numerator by a decimal,
/// as in `1.0 * sum(a) / sum(b)`.
fn preceded_by_decimal_factor(masked: &str, pos: usize) -> bool {
    let before = masked[..pos].trim_end();
    let Some(before) = before.strip_suffix('*') else {
        return false;
    };
    let before = before.trim_end();
    let token_start = before
        .rfind(|c: char| !(c.is_ascii_digit() || c == '.'))
        .map(|i| i + 1)
        .unwrap_or(0);
    before[token_start..].contains('.')
}

fn integer_division_warnings(normalized: &str, masked: &str) -> Vec<GateWarning> {
    let mut warnings = Vec::new();
    for caps in DIVISION_RE.captures_iter(masked) {
        let (Some(num), Some(den), Some(whole)) = (caps.name("num"), caps.name("den"), caps.get(0))
        else {
            continue;
        };

        // Skip matches that start in the middle of a token such as `1.0`.
        if let Some(prev) = masked[..num.start()].chars().next_back() {
            if prev.is_ascii_alphanumeric() || prev == '_' || prev == '.' {
                continue;
            }
        }
        if is_float_cast(caps.name("ncast")) || is_float_cast(caps.name("dcast")) {
            continue;
        }
        let den_inner = den
            .as_str()
            .trim_start_matches("nullif")
            .trim_start()
            .trim_start_matches('(')
            .split(',')
            .next()
            .unwrap_or("")
            .trim();
        if is_integer_literal(num.as_str()) || is_integer_literal(den_inner) {
            continue;
        }
        if preceded_by_decimal_factor(masked, num.start()) {
            continue;
        }

        warnings.push(GateWarning::IntegerDivision {
            numerator: num.start()..num.end(),
            expression: normalized[whole.start()..whole.end()].to_string(),
        });
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_of(sql: &str) -> ValidationResult {
        validate(sql).validation_result
    }

    // ---- Empty input ----

    #[test]
    fn test_empty_string_rejected() {
        assert_eq!(result_of(""), ValidationResult::RejectedEmptyAfterNormalize);
    }

    #[test]
    fn test_whitespace_only_rejected() {
        assert_eq!(result_of("   "), ValidationResult::RejectedEmptyAfterNormalize);
        assert_eq!(result_of("\n\t "), ValidationResult::RejectedEmptyAfterNormalize);
    }

    #[test]
    fn test_comment_only_rejected() {
        assert_eq!(
            result_of("-- nothing here"),
            ValidationResult::RejectedEmptyAfterNormalize
        );
        assert_eq!(result_of(" ; "), ValidationResult::RejectedEmptyAfterNormalize);
    }

    // ---- First keyword ----

    #[test]
    fn test_plain_select_accepted() {
        let c = validate("SELECT culture, SUM(traffic) FROM amplitude.funnels_resumido GROUP BY culture");
        assert_eq!(c.validation_result, ValidationResult::Accepted);
        assert!(c.reason.is_none());
        assert!(c.warnings.is_empty());
    }

    #[test]
    fn test_lowercase_select_accepted() {
        assert_eq!(result_of("select 1"), ValidationResult::Accepted);
    }

    #[test]
    fn test_parenthesized_select_accepted() {
        assert_eq!(result_of("(SELECT 1)"), ValidationResult::Accepted);
    }

    #[test]
    fn test_non_select_first_keyword_rejected() {
        for sql in [
            "DELETE FROM amplitude.funnels_resumido",
            "DROP TABLE amplitude.funnels_resumido",
            "UPDATE t SET a = 1",
            "INSERT INTO t VALUES (1)",
            "WITH x AS (SELECT 1) SELECT * FROM x",
            "EXPLAIN SELECT 1",
            "SHOW TABLES",
        ] {
            assert_eq!(result_of(sql), ValidationResult::RejectedNotSelect, "{}", sql);
        }
    }

    #[test]
    fn test_non_select_reason_names_keyword() {
        let c = validate("drop table x");
        assert!(c.reason.unwrap().contains("drop"));
    }

    // ---- Unsafe patterns ----

    #[test]
    fn test_separator_followed_by_modification_rejected() {
        for sql in [
            "SELECT 1; DROP TABLE amplitude.funnels_resumido",
            "SELECT * FROM t; DELETE FROM t",
            "select 1 ;insert into t values (1)",
            "SELECT 1; UPDATE t SET a = 2",
            "SELECT 1;\nTRUNCATE t",
        ] {
            assert_eq!(result_of(sql), ValidationResult::RejectedUnsafePattern, "{}", sql);
        }
    }

    #[test]
    fn test_two_selects_rejected() {
        assert_eq!(
            result_of("SELECT 1; SELECT 2"),
            ValidationResult::RejectedUnsafePattern
        );
    }

    #[test]
    fn test_single_trailing_semicolon_allowed() {
        let c = validate("  SELECT 1;  ");
        assert_eq!(c.validation_result, ValidationResult::Accepted);
        assert_eq!(c.normalized_text, "SELECT 1");
    }

    #[test]
    fn test_select_into_rejected() {
        assert_eq!(
            result_of("SELECT * INTO backup FROM t"),
            ValidationResult::RejectedUnsafePattern
        );
    }

    #[test]
    fn test_select_for_update_rejected() {
        assert_eq!(
            result_of("SELECT * FROM t FOR UPDATE"),
            ValidationResult::RejectedUnsafePattern
        );
    }

    #[test]
    fn test_admin_keywords_rejected() {
        for sql in ["SELECT 1 FROM t WHERE exec = 1", "SELECT pragma FROM t"] {
            assert_eq!(result_of(sql), ValidationResult::RejectedUnsafePattern, "{}", sql);
        }
    }

    #[test]
    fn test_keyword_inside_literal_is_ignored() {
        let c = validate("SELECT * FROM t WHERE note = 'drop; delete'");
        assert_eq!(c.validation_result, ValidationResult::Accepted);
    }

    #[test]
    fn test_keyword_inside_comment_is_ignored() {
        let c = validate("SELECT 1 -- delete later\nFROM t");
        assert_eq!(c.validation_result, ValidationResult::Accepted);
        let c = validate("SELECT /* ; drop */ 1");
        assert_eq!(c.validation_result, ValidationResult::Accepted);
    }

    #[test]
    fn test_identifier_containing_keyword_is_allowed() {
        let c = validate("SELECT created_at, updated_by FROM t");
        assert_eq!(c.validation_result, ValidationResult::Accepted);
    }

    // ---- Normalization never mutates literals ----

    #[test]
    fn test_literals_preserved_in_normalized_text() {
        let sql = "SELECT * FROM t WHERE culture = 'Br'  AND device = 'MOBILE';";
        let c = validate(sql);
        assert_eq!(
            c.normalized_text,
            "SELECT * FROM t WHERE culture = 'Br'  AND device = 'MOBILE'"
        );
        assert_eq!(c.raw_text, sql);
    }

    #[test]
    fn test_mask_preserves_byte_length() {
        let sql = "SELECT 'Perú ñandú' AS x -- comentario ñ\nFROM \"tabla ñ\"";
        assert_eq!(mask_sql(sql).len(), sql.len());
    }

    #[test]
    fn test_mask_blanks_literal_content() {
        let masked = mask_sql("SELECT 'a;b' FROM t");
        assert_eq!(masked, "SELECT '   ' FROM t");
    }

    // ---- Integer division ----

    #[test]
    fn test_integer_ratio_warns_but_accepts() {
        let sql = "SELECT SUM(payment_confirmation_loaded) / SUM(traffic) AS conversion_rate FROM amplitude.funnels_resumido";
        let c = validate(sql);
        assert_eq!(c.validation_result, ValidationResult::Accepted);
        assert_eq!(c.warnings.len(), 1);
        let GateWarning::IntegerDivision { numerator, expression } = &c.warnings[0];
        assert_eq!(&c.normalized_text[numerator.clone()], "SUM(payment_confirmation_loaded)");
        assert_eq!(expression, "SUM(payment_confirmation_loaded) / SUM(traffic)");
    }

    #[test]
    fn test_nullif_denominator_warns() {
        let c = validate("SELECT SUM(a) / NULLIF(SUM(b), 0) FROM t");
        assert_eq!(c.warnings.len(), 1);
    }

    #[test]
    fn test_column_ratio_warns() {
        let c = validate("SELECT payment_confirmation_loaded / traffic FROM t");
        assert_eq!(c.warnings.len(), 1);
    }

    #[test]
    fn test_decimal_factor_suppresses_warning() {
        for sql in [
            "SELECT SUM(a) * 1.0 / SUM(b) FROM t",
            "SELECT 1.0 * SUM(a) / SUM(b) FROM t",
            "SELECT SUM(a)::float / SUM(b) FROM t",
            "SELECT SUM(a) / SUM(b)::decimal FROM t",
            "SELECT CAST(SUM(a) AS FLOAT) / SUM(b) FROM t",
        ] {
            let c = validate(sql);
            assert!(c.warnings.is_empty(), "unexpected warning for {}", sql);
        }
    }

    #[test]
    fn test_literal_divisor_not_a_ratio() {
        let c = validate("SELECT SUM(median_time_seconds) / 60 FROM t");
        assert!(c.warnings.is_empty());
    }

    #[test]
    fn test_division_inside_literal_ignored() {
        let c = validate("SELECT * FROM t WHERE note = 'a / b'");
        assert!(c.warnings.is_empty());
    }

    #[test]
    fn test_multiple_ratios_reported() {
        let c = validate("SELECT SUM(a) / SUM(b) AS r1, SUM(c) / SUM(d) AS r2 FROM t");
        assert_eq!(c.warnings.len(), 2);
    }

    #[test]
    fn test_warning_display() {
        let c = validate("SELECT a / b FROM t");
        assert!(c.warnings[0].to_string().contains("integer division"));
    }
}
