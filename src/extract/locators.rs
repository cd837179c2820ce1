use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::cleaners;
use super::validators;

/// What to pull from a matched element.
#[derive(Debug, Clone, Copy)]
pub enum Capture {
    Text,
    Attr(&'static str),
}

/// Per-field selector cascades, most specific first. Profile pages get
/// reshuffled regularly, so every field carries several generations of
/// markup plus a generic last resort.
pub struct ProfileLocators {
    pub name: Vec<Selector>,
    pub headline: Vec<Selector>,
    pub company: Vec<Selector>,
    pub location: Vec<Selector>,
    pub photo: Vec<Selector>,
    pub canonical: Selector,
    pub experience_entries: Vec<Selector>,
}

static LOCATORS: LazyLock<ProfileLocators> = LazyLock::new(ProfileLocators::new);

pub fn profile() -> &'static ProfileLocators {
    &LOCATORS
}

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

impl ProfileLocators {
    fn new() -> Self {
        Self {
            name: vec![
                sel("h1.text-heading-xlarge"),
                sel(".pv-text-details__left-panel h1"),
                sel(".top-card-layout__title"),
                sel("main h1"),
                sel("h1"),
            ],
            headline: vec![
                sel(".pv-text-details__left-panel .text-body-medium.break-words"),
                sel("div.text-body-medium.break-words"),
                sel(".top-card-layout__headline"),
                sel("main .text-body-medium"),
            ],
            company: vec![
                sel(".pv-text-details__right-panel-item-text"),
                sel(".pv-text-details__right-panel .hoverable-link-text"),
                sel(".pv-entity__secondary-title"),
                sel(".experience-item__subtitle"),
                sel("section[data-section=experience] li .t-14.t-normal > span[aria-hidden=true]"),
            ],
            location: vec![
                sel(".pv-text-details__left-panel .text-body-small.inline.t-black--light.break-words"),
                sel("span.text-body-small.inline.t-black--light.break-words"),
                sel(".top-card-layout__first-subline .top-card__subline-item"),
                sel(".pv-top-card--list-bullet li"),
                sel(".top-card__subline-item"),
            ],
            photo: vec![
                sel("img.pv-top-card-profile-picture__image"),
                sel("img.pv-top-card-profile-picture__image--show"),
                sel(".pv-top-card__photo img"),
                sel("img.top-card-layout__entity-image"),
                sel("img.profile-photo-edit__preview"),
            ],
            canonical: sel("link[rel=canonical]"),
            experience_entries: vec![
                sel("section[data-section=experience] li"),
                sel(".experience-section li"),
                sel("#experience-section .pv-entity__position-group-pager"),
                sel(".pvs-list__item--line-separated"),
            ],
        }
    }
}

/// Walk a cascade: each selector contributes only its first match, and a
/// candidate that fails validation does not stop the later selectors
/// from being tried.
pub fn select_field(
    doc: &Html,
    field: &'static str,
    selectors: &[Selector],
    capture: Capture,
    valid: fn(&str) -> bool,
) -> String {
    for selector in selectors {
        let Some(el) = doc.select(selector).next() else {
            continue;
        };
        let raw = match capture {
            Capture::Text => el.text().collect::<String>(),
            Capture::Attr(name) => el.value().attr(name).unwrap_or_default().to_string(),
        };
        let text = cleaners::collapse(&raw);
        if text.is_empty() {
            continue;
        }
        if valid(&text) {
            return text;
        }
        debug!(field, text, "candidate failed validation, trying next locator");
    }
    String::new()
}

/// Last-resort company recovery: scan the first experience entry for a
/// plain text node that survives the relaxed validator. Emphasized nodes
/// hold the position title there, so they are skipped.
pub fn fallback_company(doc: &Html) -> String {
    let locators = profile();
    let Some(entry) = locators
        .experience_entries
        .iter()
        .find_map(|s| doc.select(s).next())
    else {
        return String::new();
    };

    for el in entry.descendent_elements() {
        if skip_subtree(&el, &entry) {
            continue;
        }
        let text = cleaners::collapse(&direct_text(&el));
        if text.is_empty() {
            continue;
        }
        if validators::is_valid_company_relaxed(&text) {
            debug!(company = text, "company recovered from experience entry");
            return text;
        }
    }
    String::new()
}

pub fn canonical_url(doc: &Html) -> Option<String> {
    let el = doc.select(&profile().canonical).next()?;
    let href = el.value().attr("href")?.trim();
    if href.is_empty() {
        None
    } else {
        Some(href.to_string())
    }
}

/// Readiness probe: the page is worth extracting once the name cascade
/// yields any text at all.
pub fn primary_name_text(doc: &Html) -> String {
    for selector in &profile().name {
        if let Some(el) = doc.select(selector).next() {
            let text = cleaners::collapse(&el.text().collect::<String>());
            if !text.is_empty() {
                return text;
            }
        }
    }
    String::new()
}

fn direct_text(el: &ElementRef) -> String {
    el.children()
        .filter_map(|child| child.value().as_text())
        .map(|t| &**t)
        .collect()
}

fn skip_subtree(el: &ElementRef, root: &ElementRef) -> bool {
    if is_emphasized(el) || is_screenreader_only(el) {
        return true;
    }
    for node in el.ancestors() {
        if node.id() == root.id() {
            break;
        }
        if let Some(ancestor) = ElementRef::wrap(node) {
            if is_emphasized(&ancestor) || is_screenreader_only(&ancestor) {
                return true;
            }
        }
    }
    false
}

fn is_emphasized(el: &ElementRef) -> bool {
    matches!(
        el.value().name(),
        "strong" | "b" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
    ) || el.value().classes().any(|c| c.contains("bold"))
}

fn is_screenreader_only(el: &ElementRef) -> bool {
    el.value().classes().any(|c| c == "visually-hidden" || c == "a11y-text")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cascade_takes_first_match_of_first_selector() {
        let doc = Html::parse_document(
            "<h1 class=\"text-heading-xlarge\">Jane Doe</h1><h1>Other Person</h1>",
        );
        let name = select_field(
            &doc,
            "fullName",
            &profile().name,
            Capture::Text,
            validators::is_valid_name,
        );
        assert_eq!(name, "Jane Doe");
    }

    #[test]
    fn invalid_candidate_falls_through_to_next_selector() {
        // First company locator hits a chrome button; the next one holds
        // the real value and must still be reached.
        let doc = Html::parse_document(
            "<div class=\"pv-text-details__right-panel\">\
               <span class=\"pv-text-details__right-panel-item-text\">Follow</span>\
               <span class=\"hoverable-link-text\">Acme Corp</span>\
             </div>",
        );
        let company = select_field(
            &doc,
            "company",
            &profile().company,
            Capture::Text,
            validators::is_valid_company,
        );
        assert_eq!(company, "Acme Corp");
    }

    #[test]
    fn attr_capture_reads_src() {
        let doc = Html::parse_document(
            "<img class=\"pv-top-card-profile-picture__image\" src=\"https://cdn.example.com/p.jpg\">",
        );
        let src = select_field(
            &doc,
            "profilePicture",
            &profile().photo,
            Capture::Attr("src"),
            validators::is_valid_photo_src,
        );
        assert_eq!(src, "https://cdn.example.com/p.jpg");
    }

    #[test]
    fn ghost_image_data_uri_rejected() {
        let doc = Html::parse_document(
            "<img class=\"pv-top-card-profile-picture__image\" src=\"data:image/gif;base64,R0lGOD\">",
        );
        let src = select_field(
            &doc,
            "profilePicture",
            &profile().photo,
            Capture::Attr("src"),
            validators::is_valid_photo_src,
        );
        assert_eq!(src, "");
    }

    #[test]
    fn fallback_company_skips_emphasized_and_hidden_text() {
        let doc = Html::parse_document(
            "<section data-section=\"experience\"><ul><li>\
               <span class=\"t-bold\">Senior Software Engineer</span>\
               <span class=\"visually-hidden\">Senior Software Engineer</span>\
               <span>Jan 2020 - Present</span>\
               <span>Globex Corporation</span>\
             </li></ul></section>",
        );
        assert_eq!(fallback_company(&doc), "Globex Corporation");
    }

    #[test]
    fn fallback_company_empty_without_experience() {
        let doc = Html::parse_document("<main><h1>Jane Doe</h1></main>");
        assert_eq!(fallback_company(&doc), "");
    }

    #[test]
    fn canonical_link_href() {
        let doc = Html::parse_document(
            "<head><link rel=\"canonical\" href=\"https://example.com/in/jane\"></head><body></body>",
        );
        assert_eq!(canonical_url(&doc).as_deref(), Some("https://example.com/in/jane"));
        let bare = Html::parse_document("<body></body>");
        assert_eq!(canonical_url(&bare), None);
    }

    #[test]
    fn readiness_needs_name_text() {
        let ready = Html::parse_document("<main><h1>Jane Doe</h1></main>");
        assert_eq!(primary_name_text(&ready), "Jane Doe");
        let skeleton = Html::parse_document("<main><h1></h1><div class=\"skeleton\"></div></main>");
        assert_eq!(primary_name_text(&skeleton), "");
    }
}
