use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

pub const MIN_TEXT_LEN: usize = 2;
pub const MAX_TEXT_LEN: usize = 200;
pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_COMPANY_LEN: usize = 150;

/// How many job-title shape patterns must hit before a company candidate
/// is rejected as a mis-picked title. A single hit is tolerated so names
/// like "Example Engineering" survive.
pub const TITLE_SCORE_REJECT: usize = 2;

struct RejectRule {
    re: Regex,
    reason: &'static str,
}

fn rules(table: &[(&str, &'static str)]) -> Vec<RejectRule> {
    table
        .iter()
        .map(|(pattern, reason)| RejectRule {
            re: Regex::new(pattern).unwrap(),
            reason,
        })
        .collect()
}

static DATE_RULES: LazyLock<Vec<RejectRule>> = LazyLock::new(|| {
    rules(&[
        (r"(?i)^\d+\s*yrs?\b.*$", "employment duration"),
        (r"(?i)^\d+\s*mos?\b.*$", "employment duration"),
        (r"(?i)^\d{4}\s*[-–—]\s*(\d{4}|present)\b.*$", "date range"),
        (
            r"(?i)^(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{4}\b.*$",
            "date range",
        ),
    ])
});

static CHROME_RULES: LazyLock<Vec<RejectRule>> = LazyLock::new(|| {
    rules(&[
        (
            r"(?i)^(message|connect|follow|following|pending|more|save|about|activity|contact info)$",
            "navigation chrome",
        ),
        (r"(?i)^show all\b", "navigation chrome"),
        (r"(?i)^(edit|delete|remove|add)\b", "edit action"),
    ])
});

static SOCIAL_RULES: LazyLock<Vec<RejectRule>> = LazyLock::new(|| {
    rules(&[
        (r"(?i)\b\d[\d,.+]*\s*\+?\s*(connections?|followers?)\b", "connection count"),
        (r"(?i)\bmutual connections?\b", "social proof"),
        (r"(?i)\b\d+(st|nd|rd|th)\s+degree\b", "connection degree"),
        (r"(?i)^(1st|2nd|3rd)$", "connection degree"),
    ])
});

static ACTION_RULES: LazyLock<Vec<RejectRule>> = LazyLock::new(|| {
    rules(&[(r"(?i)\b(follow|message|connect)\b", "action keyword")])
});

static EMPLOYMENT_RULES: LazyLock<Vec<RejectRule>> = LazyLock::new(|| {
    rules(&[(
        r"(?i)^(full[ -]time|part[ -]time|self[ -]employed|freelance|contract|internship|apprenticeship|seasonal|temporary)$",
        "employment type label",
    )])
});

static NAME_RULES: LazyLock<Vec<RejectRule>> = LazyLock::new(|| {
    rules(&[(r"(?i)^linkedin( member)?$", "placeholder name")])
});

/// Shapes a job title takes. Each pattern contributes one point to the
/// score used by the company validator.
static TITLE_SHAPE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^(senior|sr\.?|junior|jr\.?|lead|staff|principal|chief|head|vp|vice president|director|associate|executive)\b",
        r"(?i)\b(engineer|developer|designer)(ing|s)?\b",
        r"(?i)\b(analyst|consultant|specialist|architect)s?\b",
        r"(?i)\b(manager|scientist)s?\b",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

pub fn job_title_score(text: &str) -> usize {
    TITLE_SHAPE.iter().filter(|re| re.is_match(text)).count()
}

pub fn is_valid_name(text: &str) -> bool {
    passes("fullName", text, MAX_TEXT_LEN, &[&NAME_RULES, &CHROME_RULES, &SOCIAL_RULES])
}

pub fn is_valid_job_title(text: &str) -> bool {
    passes(
        "jobTitle",
        text,
        MAX_TITLE_LEN,
        &[&DATE_RULES, &CHROME_RULES, &SOCIAL_RULES],
    )
}

pub fn is_valid_company(text: &str) -> bool {
    if !passes(
        "company",
        text,
        MAX_COMPANY_LEN,
        &[&EMPLOYMENT_RULES, &DATE_RULES, &CHROME_RULES, &SOCIAL_RULES, &ACTION_RULES],
    ) {
        return false;
    }
    let score = job_title_score(text);
    if score >= TITLE_SCORE_REJECT {
        debug!(text, score, "company candidate rejected: reads like a job title");
        return false;
    }
    true
}

/// Used when scanning experience entries, where any non-emphasized text
/// node is a candidate. Dates, chrome and employment labels are the
/// realistic false positives there; a title score would reject too much.
pub fn is_valid_company_relaxed(text: &str) -> bool {
    passes(
        "company",
        text,
        MAX_COMPANY_LEN,
        &[&EMPLOYMENT_RULES, &DATE_RULES, &CHROME_RULES],
    )
}

pub fn is_valid_location(text: &str) -> bool {
    passes(
        "location",
        text,
        MAX_TEXT_LEN,
        &[&DATE_RULES, &CHROME_RULES, &SOCIAL_RULES, &ACTION_RULES],
    )
}

/// Ghost avatars ship as inline data URIs; only a real hosted image
/// counts as a profile picture.
pub fn is_valid_photo_src(text: &str) -> bool {
    text.starts_with("https://") || text.starts_with("http://")
}

fn passes(field: &str, text: &str, max_len: usize, tables: &[&LazyLock<Vec<RejectRule>>]) -> bool {
    let len = text.chars().count();
    if len < MIN_TEXT_LEN || len > max_len {
        debug!(field, len, "candidate rejected: length out of range");
        return false;
    }
    for rule in tables.iter().flat_map(|t| t.iter()) {
        if rule.re.is_match(text) {
            debug!(field, reason = rule.reason, text, "candidate rejected");
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_are_not_job_titles() {
        assert!(!is_valid_job_title("2 yrs 3 mos"));
        assert!(!is_valid_job_title("11 mos"));
        assert!(!is_valid_job_title("Jan 2020 - Present"));
        assert!(!is_valid_job_title("2019 – 2023"));
    }

    #[test]
    fn real_job_titles_pass() {
        assert!(is_valid_job_title("Senior Backend Engineer"));
        assert!(is_valid_job_title("Product Manager"));
        assert!(is_valid_job_title("Head of Growth"));
    }

    #[test]
    fn chrome_tokens_rejected_everywhere() {
        assert!(!is_valid_name("Message"));
        assert!(!is_valid_job_title("Follow"));
        assert!(!is_valid_company("Show all 12 experiences"));
        assert!(!is_valid_location("Edit profile"));
    }

    #[test]
    fn social_proof_rejected() {
        assert!(!is_valid_location("500+ connections"));
        assert!(!is_valid_location("12 mutual connections"));
        assert!(!is_valid_name("3rd degree connection"));
        assert!(is_valid_location("San Francisco Bay Area"));
    }

    #[test]
    fn company_rejects_job_title_shapes() {
        assert!(!is_valid_company("Senior Software Engineer"));
        assert!(!is_valid_company("Director of Engineering"));
        assert!(is_valid_company("Engineering Corp"));
        assert!(is_valid_company("Acme Inc"));
    }

    #[test]
    fn title_score_boundary() {
        assert_eq!(job_title_score("Engineering Corp"), 1);
        assert_eq!(job_title_score("Senior Software Engineer"), 2);
        assert_eq!(job_title_score("Acme Inc"), 0);
    }

    #[test]
    fn company_rejects_employment_labels() {
        assert!(!is_valid_company("Full-time"));
        assert!(!is_valid_company("Self-employed"));
        assert!(!is_valid_company_relaxed("Freelance"));
    }

    #[test]
    fn relaxed_company_tolerates_title_shapes() {
        assert!(is_valid_company_relaxed("Example Consulting"));
        assert!(!is_valid_company_relaxed("Jan 2019 - Dec 2021"));
    }

    #[test]
    fn length_bounds() {
        assert!(!is_valid_name("J"));
        assert!(!is_valid_company(&"x".repeat(MAX_COMPANY_LEN + 1)));
        assert!(is_valid_company(&"x".repeat(MAX_COMPANY_LEN)));
    }

    #[test]
    fn single_letter_and_empty_rejected() {
        assert!(!is_valid_job_title(""));
        assert!(!is_valid_location("-"));
    }
}
