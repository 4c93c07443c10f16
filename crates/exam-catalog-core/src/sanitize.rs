// crates/exam-catalog-core/src/sanitize.rs
// ============================================================================
// Module: Exam Catalog Sanitizer
// Description: Ingress text normalization for catalog names.
// Purpose: Strip markup and invisible characters before validation.
// Dependencies: regex, serde_json, unicode-properties, crate::core
// ============================================================================

//! ## Overview
//! Client text is normalized in a fixed order:
//! 1. HTML is stripped. `<script>` and `<style>` elements lose their content;
//!    every other tag is removed, or kept bare (no attributes) when the
//!    [`HtmlPolicy::Allowlist`] names it.
//! 2. Characters in Unicode general category C (control, format,
//!    private-use, and unassigned) are removed.
//! 3. Ideographic spaces (U+3000) become ASCII spaces.
//! 4. Whitespace runs collapse to one space.
//! 5. The result is trimmed.
//!
//! Removing characters can join fragments into new markup (`<<b>i>`), so
//! the pipeline repeats until the text stops changing. That makes
//! [`Sanitizer::sanitize_str`] idempotent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Captures;
use regex::Regex;
use serde_json::Value;
use unicode_properties::GeneralCategoryGroup;
use unicode_properties::UnicodeGeneralCategory;

use crate::core::AdmissionSchedule;
use crate::core::Department;
use crate::core::FilterOption;
use crate::core::Major;
use crate::core::Subject;
use crate::core::TestType;
use crate::core::University;

// ============================================================================
// SECTION: Patterns
// ============================================================================

/// Script and style elements including their content (unterminated ones run
/// to the end of the text).
static SCRIPT_STYLE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?(?:</script\s*>|\z)|<style\b[^>]*>.*?(?:</style\s*>|\z)")
        .ok()
});

/// HTML comments.
static COMMENT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?(?:-->|\z)").ok());

/// Any start, end, or self-closing tag; group 1 marks end tags, group 2 is
/// the tag name.
static TAG: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)<(/?)\s*([A-Za-z][A-Za-z0-9-]*)\b[^>]*>").ok());

/// Declarations and processing instructions (`<!DOCTYPE ...>`, `<?xml ...?>`).
static DECLARATION: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[!?][^>]*>").ok());

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Markup handling policy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HtmlPolicy {
    /// Remove every tag.
    #[default]
    StripAll,
    /// Keep the named tags (lowercase) without attributes; remove the rest.
    Allowlist(BTreeSet<String>),
}

/// Sanitizer options.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SanitizeOptions {
    /// Markup policy.
    pub html: HtmlPolicy,
    /// Keep tab, LF, and CR; whitespace runs containing a line break collapse
    /// to a single `\n`.
    pub preserve_line_breaks: bool,
}

/// Field selection for sanitizing untyped JSON payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizeConfig {
    /// Object keys whose string values are sanitized, at any depth.
    pub fields: BTreeSet<String>,
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            fields: BTreeSet::from(["name".to_string()]),
        }
    }
}

// ============================================================================
// SECTION: Sanitizer
// ============================================================================

/// Stateless text sanitizer.
#[derive(Debug, Clone, Default)]
pub struct Sanitizer {
    /// Active options.
    options: SanitizeOptions,
}

impl Sanitizer {
    /// Creates a sanitizer with the given options.
    #[must_use]
    pub const fn new(options: SanitizeOptions) -> Self {
        Self {
            options,
        }
    }

    /// Returns the active options.
    #[must_use]
    pub const fn options(&self) -> &SanitizeOptions {
        &self.options
    }

    /// Sanitizes a single string.
    #[must_use]
    pub fn sanitize_str(&self, input: &str) -> String {
        let mut current = self.pass(input);
        loop {
            let next = self.pass(&current);
            if next == current {
                return current;
            }
            current = next;
        }
    }

    /// Sanitizes configured string fields of a JSON value in place.
    pub fn sanitize_value(&self, value: &mut Value, config: &SanitizeConfig) {
        match value {
            Value::Object(map) => {
                for (key, entry) in map.iter_mut() {
                    if config.fields.contains(key)
                        && let Value::String(text) = entry
                    {
                        *text = self.sanitize_str(text);
                    } else {
                        self.sanitize_value(entry, config);
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.sanitize_value(item, config);
                }
            }
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
        }
    }

    /// Sanitizes every name in a university aggregate.
    pub fn sanitize_university(&self, university: &mut University) {
        university.name = self.sanitize_str(&university.name);
        for department in &mut university.departments {
            self.sanitize_department(department);
        }
    }

    /// Sanitizes every name in a department sub-tree.
    pub fn sanitize_department(&self, department: &mut Department) {
        department.name = self.sanitize_str(&department.name);
        for major in &mut department.majors {
            self.sanitize_major(major);
        }
    }

    /// Sanitizes every name in a major sub-tree.
    pub fn sanitize_major(&self, major: &mut Major) {
        major.name = self.sanitize_str(&major.name);
        for schedule in &mut major.admission_schedules {
            self.sanitize_schedule(schedule);
        }
    }

    /// Sanitizes every name in an admission schedule sub-tree.
    pub fn sanitize_schedule(&self, schedule: &mut AdmissionSchedule) {
        schedule.name = self.sanitize_str(&schedule.name);
        for test_type in &mut schedule.test_types {
            self.sanitize_test_type(test_type);
        }
    }

    /// Sanitizes every name in a test type sub-tree.
    pub fn sanitize_test_type(&self, test_type: &mut TestType) {
        test_type.name = self.sanitize_str(&test_type.name);
        for subject in &mut test_type.subjects {
            self.sanitize_subject(subject);
        }
    }

    /// Sanitizes a subject name.
    pub fn sanitize_subject(&self, subject: &mut Subject) {
        subject.name = self.sanitize_str(&subject.name);
    }

    /// Sanitizes a filter option name.
    pub fn sanitize_filter_option(&self, option: &mut FilterOption) {
        option.name = self.sanitize_str(&option.name);
    }

    /// Runs the five normalization steps once.
    fn pass(&self, input: &str) -> String {
        let stripped = self.strip_html(input);
        let visible: String = stripped
            .chars()
            .filter(|ch| self.keeps_char(*ch))
            .map(|ch| if ch == '\u{3000}' { ' ' } else { ch })
            .collect();
        self.collapse_whitespace(&visible)
    }

    /// Removes markup according to the policy.
    fn strip_html(&self, input: &str) -> String {
        if !input.contains('<') {
            return input.to_string();
        }
        let text = replace_all(&SCRIPT_STYLE, input, "");
        let text = replace_all(&COMMENT, &text, "");
        let text = replace_all(&DECLARATION, &text, "");
        let Some(tag) = TAG.as_ref() else {
            return text.into_owned();
        };
        match &self.options.html {
            HtmlPolicy::StripAll => tag.replace_all(&text, "").into_owned(),
            HtmlPolicy::Allowlist(allowed) => tag
                .replace_all(&text, |caps: &Captures<'_>| {
                    let name = caps[2].to_ascii_lowercase();
                    if allowed.contains(&name) {
                        format!("<{}{name}>", &caps[1])
                    } else {
                        String::new()
                    }
                })
                .into_owned(),
        }
    }

    /// Returns false for characters the sanitizer removes.
    fn keeps_char(&self, ch: char) -> bool {
        if matches!(ch, '\t' | '\n' | '\r') {
            return self.options.preserve_line_breaks;
        }
        ch.general_category_group() != GeneralCategoryGroup::Other
    }

    /// Collapses whitespace runs and trims the ends.
    fn collapse_whitespace(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut pending: Option<char> = None;
        for ch in input.chars() {
            if ch.is_whitespace() {
                let replacement =
                    if self.options.preserve_line_breaks && ch == '\n' { '\n' } else { ' ' };
                pending = match pending {
                    Some('\n') => Some('\n'),
                    _ => Some(replacement),
                };
                continue;
            }
            if let Some(separator) = pending.take()
                && !out.is_empty()
            {
                out.push(separator);
            }
            out.push(ch);
        }
        out
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Applies a lazily compiled pattern, passing text through if it failed to
/// compile.
fn replace_all<'a>(pattern: &LazyLock<Option<Regex>>, input: &'a str, with: &str) -> Cow<'a, str> {
    match pattern.as_ref() {
        Some(regex) => regex.replace_all(input, with),
        None => Cow::Borrowed(input),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn strict() -> Sanitizer {
        Sanitizer::default()
    }

    #[test]
    fn script_elements_are_removed_with_content() {
        assert_eq!(strict().sanitize_str("<script>alert(1)</script>東京大学"), "東京大学");
        assert_eq!(strict().sanitize_str("東京<STYLE>p{}</STYLE>大学"), "東京大学");
        assert_eq!(strict().sanitize_str("東京大学<script>never closed"), "東京大学");
    }

    #[test]
    fn tags_and_attributes_are_removed() {
        assert_eq!(strict().sanitize_str("<b onclick=\"x()\">理学部</b>"), "理学部");
        assert_eq!(strict().sanitize_str("<a href=\"javascript:evil()\">工学部</a>"), "工学部");
        assert_eq!(strict().sanitize_str("a<!-- note -->b"), "ab");
    }

    #[test]
    fn allowlist_keeps_bare_tags_only() {
        let sanitizer = Sanitizer::new(SanitizeOptions {
            html: HtmlPolicy::Allowlist(BTreeSet::from(["b".to_string()])),
            preserve_line_breaks: false,
        });
        assert_eq!(
            sanitizer.sanitize_str("<B class=\"x\" onmouseover=\"y\">太字</B><i>斜体</i>"),
            "<b>太字</b>斜体"
        );
    }

    #[test]
    fn invisible_characters_and_ideographic_spaces_are_normalized() {
        assert_eq!(strict().sanitize_str("東京\u{200B}大学"), "東京大学");
        assert_eq!(strict().sanitize_str("\u{3000}東京\u{3000}\u{3000}大学 "), "東京 大学");
        assert_eq!(strict().sanitize_str("a\u{0007}b\u{E000}c"), "abc");
        assert_eq!(strict().sanitize_str("line\none\ttwo"), "lineonetwo");
    }

    #[test]
    fn every_other_category_character_is_removed() {
        // U+0378 is unassigned, U+FDD0 a noncharacter, U+E0041 a tag, U+F0000 private use.
        assert_eq!(strict().sanitize_str("東\u{0378}京\u{FDD0}大\u{E0041}学\u{F0000}"), "東京大学");
        assert_eq!(strict().sanitize_str("\u{FEFF}\u{2066}理学部\u{2069}\u{0085}"), "理学部");
        assert_eq!(strict().sanitize_str("数学 Ⅰ・A ①"), "数学 Ⅰ・A ①");
    }

    #[test]
    fn line_breaks_survive_when_preserved() {
        let sanitizer = Sanitizer::new(SanitizeOptions {
            html: HtmlPolicy::StripAll,
            preserve_line_breaks: true,
        });
        assert_eq!(sanitizer.sanitize_str("  first \n\n second\tthird "), "first\nsecond third");
    }

    #[test]
    fn fragments_joined_by_removal_are_stripped_again() {
        assert_eq!(strict().sanitize_str("<<b>i>名前"), "名前");
        assert_eq!(strict().sanitize_str("<\u{200B}b>名前"), "名前");
    }

    #[test]
    fn value_sanitizer_touches_configured_fields_only() {
        let mut value = json!({
            "name": " <b>東京大学</b> ",
            "note": "<b>kept</b>",
            "departments": [{"name": "理学部\u{3000}"}]
        });
        strict().sanitize_value(&mut value, &SanitizeConfig::default());
        assert_eq!(value["name"], json!("東京大学"));
        assert_eq!(value["note"], json!("<b>kept</b>"));
        assert_eq!(value["departments"][0]["name"], json!("理学部"));
    }

    #[test]
    fn aggregate_sanitizer_reaches_nested_names() {
        let mut university = University::new("<script>alert(1)</script>東京大学")
            .with_department(Department::new(" 理学部 ").with_major(Major::new("数学科\u{200B}")));
        strict().sanitize_university(&mut university);
        assert_eq!(university.name, "東京大学");
        assert_eq!(university.departments[0].name, "理学部");
        assert_eq!(university.departments[0].majors[0].name, "数学科");
    }

    proptest! {
        #[test]
        fn sanitize_is_idempotent(input in "[<>/a-z \\t\\n\u{3000}\u{200B}東京]{0,40}") {
            let sanitizer = strict();
            let once = sanitizer.sanitize_str(&input);
            prop_assert_eq!(sanitizer.sanitize_str(&once), once.clone());
        }

        #[test]
        fn sanitize_is_idempotent_with_allowlist(input in "[<>/a-z =\"\u{3000}名]{0,40}") {
            let sanitizer = Sanitizer::new(SanitizeOptions {
                html: HtmlPolicy::Allowlist(BTreeSet::from(["b".to_string(), "i".to_string()])),
                preserve_line_breaks: false,
            });
            let once = sanitizer.sanitize_str(&input);
            prop_assert_eq!(sanitizer.sanitize_str(&once), once.clone());
        }
    }
}
