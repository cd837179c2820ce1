use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One profile as captured from a page. Fields that could not be
/// extracted (or failed validation) are empty strings, never absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub full_name: String,
    pub job_title: String,
    pub company: String,
    pub location: String,
    pub profile_url: String,
    pub profile_picture: String,
    pub scraped_at: DateTime<Utc>,
}

impl ProfileRecord {
    /// The name is the one field a usable record cannot do without.
    pub fn is_complete(&self) -> bool {
        !self.full_name.is_empty()
    }

    /// Canonical key/value pairs consumed by the field mapper, in a fixed
    /// order. The timestamp is rendered to RFC 3339 here so everything
    /// downstream deals in plain JSON scalars.
    pub fn canonical_fields(&self) -> [(&'static str, Value); 7] {
        [
            ("fullName", Value::String(self.full_name.clone())),
            ("jobTitle", Value::String(self.job_title.clone())),
            ("company", Value::String(self.company.clone())),
            ("location", Value::String(self.location.clone())),
            ("profileUrl", Value::String(self.profile_url.clone())),
            ("profilePicture", Value::String(self.profile_picture.clone())),
            ("scrapedAt", Value::String(self.scraped_at.to_rfc3339())),
        ]
    }
}

#[cfg(test)]
impl ProfileRecord {
    pub fn sample() -> ProfileRecord {
        use chrono::TimeZone;
        ProfileRecord {
            full_name: "Jane Doe".into(),
            job_title: "Product Manager".into(),
            company: String::new(),
            location: String::new(),
            profile_url: "https://example.com/in/jane-doe".into(),
            profile_picture: String::new(),
            scraped_at: Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(ProfileRecord::sample()).unwrap();
        assert!(json.get("fullName").is_some());
        assert!(json.get("profileUrl").is_some());
        assert!(json.get("scrapedAt").is_some());
        assert!(json.get("full_name").is_none());
    }

    #[test]
    fn completeness_hinges_on_name() {
        let mut r = ProfileRecord::sample();
        assert!(r.is_complete());
        r.full_name.clear();
        assert!(!r.is_complete());
    }

    #[test]
    fn canonical_fields_render_timestamp() {
        let fields = ProfileRecord::sample().canonical_fields();
        let (key, value) = &fields[6];
        assert_eq!(*key, "scrapedAt");
        assert!(value.as_str().unwrap().starts_with("2026-03-14T09:30:00"));
    }
}
