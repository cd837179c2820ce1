use std::sync::LazyLock;

use regex::Regex;

/// Hard cap applied after cleanup. Anything longer is page noise, not data.
pub const MAX_FIELD_LEN: usize = 1000;

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Ordered substitutions shared by job titles and company names.
/// Order matters: employment-type suffixes carry their own separator, so
/// they are stripped before the generic trailing-annotation rule eats
/// everything past the first bullet.
static TITLE_COMPANY_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        // "at Acme", "Company: Acme"
        (r"(?i)^(at|company:)\s+", ""),
        // "· Full-time", "- Self-employed" and friends at the tail
        (
            r"(?i)\s*[·•\-–]?\s*(full[ -]time|part[ -]time|self[ -]employed|freelance|contract|internship|apprenticeship|seasonal|temporary)\s*$",
            "",
        ),
        // everything after the first bullet/pipe separator is annotation
        (r"\s*[·•|].*$", ""),
        // "(500+)" follower/employee counts
        (r"\s*\(\d[^)]*\)\s*$", ""),
        // "3 yrs 2 mos", "11 mos" durations
        (r"(?i)\s*[\-–]?\s*\d+\s*yrs?(\s+\d+\s*mos?)?\s*$", ""),
        (r"(?i)\s*[\-–]?\s*\d+\s*mos?\s*$", ""),
        // "Jan 2020 - Present", "2019 – 2023" date ranges
        (
            r"(?i)\s*[\-–]?\s*(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{4}\s*[-–—]\s*((jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{4}|present)\s*$",
            "",
        ),
        (r"(?i)\s*[\-–]?\s*\d{4}\s*[-–—]\s*(\d{4}|present)\s*$", ""),
        // "Acme's page", "Acme logo" link/image artifacts
        (r"(?i)\s*['’]s\s+page\s*$", ""),
        (r"(?i)\s+logo\s*$", ""),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), replacement))
    .collect()
});

/// Collapse runs of whitespace (including newlines from nested markup)
/// into single spaces, trim, and cap the length.
pub fn collapse(text: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(text.trim(), " ").into_owned();
    cap(collapsed)
}

pub fn clean_job_title(raw: &str) -> String {
    apply_rules(raw)
}

pub fn clean_company(raw: &str) -> String {
    apply_rules(raw)
}

/// Locations carry no employment annotations; whitespace and stray
/// separators are the only noise seen in practice.
pub fn clean_location(raw: &str) -> String {
    trim_separators(&collapse(raw))
}

fn apply_rules(raw: &str) -> String {
    let mut text = collapse(raw);
    for (re, replacement) in TITLE_COMPANY_RULES.iter() {
        text = re.replace_all(&text, *replacement).into_owned();
    }
    cap(trim_separators(&text))
}

fn trim_separators(text: &str) -> String {
    text.trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '–' | '·' | '•' | '|'))
        .to_string()
}

fn cap(text: String) -> String {
    if text.chars().count() <= MAX_FIELD_LEN {
        text
    } else {
        text.chars().take(MAX_FIELD_LEN).collect()
    }
}
