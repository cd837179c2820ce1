pub mod cleaners;
pub mod locators;
pub mod orchestrator;
pub mod validators;

use chrono::Utc;
use scraper::Html;
use thiserror::Error;
use tracing::info;

use crate::record::ProfileRecord;
use locators::Capture;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to load document: {0}")]
    Source(String),
    #[error("profile name could not be extracted")]
    Incomplete,
}

/// Minimal readiness probe for pages that render in stages: extraction
/// is worth attempting once the name cascade yields any text.
pub fn document_ready(html: &str) -> bool {
    let doc = Html::parse_document(html);
    !locators::primary_name_text(&doc).is_empty()
}

/// Run every field cascade against one document. Fields that cannot be
/// located or validated come back as empty strings; the record is still
/// returned so the caller decides what incomplete means.
pub fn extract_record(html: &str, source_url: Option<&str>) -> ProfileRecord {
    let doc = Html::parse_document(html);
    let loc = locators::profile();

    let full_name = locators::select_field(
        &doc,
        "fullName",
        &loc.name,
        Capture::Text,
        validators::is_valid_name,
    );
    let job_title = cleaners::clean_job_title(&locators::select_field(
        &doc,
        "jobTitle",
        &loc.headline,
        Capture::Text,
        validators::is_valid_job_title,
    ));

    let mut company = locators::select_field(
        &doc,
        "company",
        &loc.company,
        Capture::Text,
        validators::is_valid_company,
    );
    if company.is_empty() {
        company = locators::fallback_company(&doc);
    }
    let company = cleaners::clean_company(&company);

    let location = cleaners::clean_location(&locators::select_field(
        &doc,
        "location",
        &loc.location,
        Capture::Text,
        validators::is_valid_location,
    ));
    let profile_picture = locators::select_field(
        &doc,
        "profilePicture",
        &loc.photo,
        Capture::Attr("src"),
        validators::is_valid_photo_src,
    );
    let profile_url = locators::canonical_url(&doc)
        .or_else(|| source_url.map(str::to_string))
        .unwrap_or_default();

    let record = ProfileRecord {
        full_name,
        job_title,
        company,
        location,
        profile_url,
        profile_picture,
        scraped_at: Utc::now(),
    };
    info!(
        name = %record.full_name,
        complete = record.is_complete(),
        "profile extracted"
    );
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{name}")).unwrap()
    }

    #[test]
    fn full_profile_extracts_every_field() {
        let html = fixture("profile_full.html");
        let record = extract_record(&html, None);
        assert_eq!(record.full_name, "Jane Doe");
        assert_eq!(record.job_title, "Product Manager");
        assert_eq!(record.company, "Acme Corporation");
        assert_eq!(record.location, "San Francisco, California, United States");
        assert_eq!(record.profile_picture, "https://cdn.example.com/photos/jane.jpg");
        assert_eq!(record.profile_url, "https://example.com/in/jane-doe");
        assert!(record.is_complete());
    }

    #[test]
    fn sparse_profile_recovers_company_from_experience() {
        let html = fixture("profile_sparse.html");
        let record = extract_record(&html, Some("https://example.com/in/john-smith"));
        assert_eq!(record.full_name, "John Smith");
        assert_eq!(record.job_title, "Software Engineer");
        assert_eq!(record.company, "Initech");
    }

    #[test]
    fn sparse_profile_drops_social_proof_location_and_ghost_photo() {
        let html = fixture("profile_sparse.html");
        let record = extract_record(&html, None);
        assert_eq!(record.location, "");
        assert_eq!(record.profile_picture, "");
    }

    #[test]
    fn source_url_used_when_canonical_missing() {
        let html = fixture("profile_sparse.html");
        let record = extract_record(&html, Some("https://example.com/in/john-smith"));
        assert_eq!(record.profile_url, "https://example.com/in/john-smith");
        let record = extract_record(&html, None);
        assert_eq!(record.profile_url, "");
    }

    #[test]
    fn canonical_wins_over_source_url() {
        let html = fixture("profile_full.html");
        let record = extract_record(&html, Some("https://example.com/feed"));
        assert_eq!(record.profile_url, "https://example.com/in/jane-doe");
    }

    #[test]
    fn skeleton_page_is_not_ready() {
        let html = fixture("profile_skeleton.html");
        assert!(!document_ready(&html));
        assert!(document_ready(&fixture("profile_full.html")));
    }

    #[test]
    fn skeleton_page_extracts_incomplete_record() {
        let html = fixture("profile_skeleton.html");
        let record = extract_record(&html, None);
        assert!(!record.is_complete());
        assert_eq!(record.full_name, "");
    }
}
