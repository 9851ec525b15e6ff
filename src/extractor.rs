//! Turns a fetched page into a `ContactRecord`.
//!
//! Extraction runs an ordered list of strategies over a shared view of the
//! page. Each strategy only fills fields that are still empty, so earlier
//! strategies take precedence: structured metadata first, then text heuristics.

use crate::config::Config;
use crate::domain::{get_domain_from_url, get_host_from_url};
use crate::models::{ContactRecord, RawPage};
use crate::patterns::{
    clean_field, find_address, find_emails, find_phone, normalize_email, normalize_whitespace,
    select_email, truncate_chars, validate_phone,
};
use crate::structured::{OrganizationData, parse_json_ld, parse_microdata};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;
use url::Url;

static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static H1_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static SITE_NAME_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[property="og:site_name"], meta[name="application-name"]"#).unwrap()
});
static MAILTO_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href^="mailto:"], a[href^="MAILTO:"]"#).unwrap());
static TEL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href^="tel:"], a[href^="TEL:"]"#).unwrap());
static ADDRESS_TAG_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("address").unwrap());
static CONTACT_SECTION_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        "footer, address, [id*=contact], [class*=contact], [id*=footer], [class*=footer], \
         [id*=kontakt], [class*=kontakt], [id*=impressum], [class*=address], [class*=location]",
    )
    .unwrap()
});

const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "svg", "head"];

/// Title segments that carry no company name.
const BOILERPLATE_SEGMENTS: &[&str] = &[
    "home",
    "homepage",
    "home page",
    "welcome",
    "index",
    "start",
    "main page",
    "official site",
    "official website",
    "website",
    "contact",
    "contact us",
    "about",
    "about us",
    "startseite",
    "accueil",
    "inicio",
    "benvenuti",
];

const TITLE_SEPARATORS: &[&str] = &[" | ", " - ", " – ", " — ", " :: ", " · ", " • ", " » ", " ~ "];

/// Everything strategies can look at for one page.
pub(crate) struct PageView<'a> {
    pub url: &'a Url,
    /// Registrable domain of the page.
    pub domain: &'a str,
    pub document: Html,
    /// Visible body text, NFKC-normalized, whitespace collapsed.
    pub text: String,
    /// Visible text of footer, `<address>` and contact-like sections.
    pub contact_text: String,
    /// `mailto:` link targets in document order.
    pub mailto_links: Vec<String>,
    /// `tel:` link targets in document order.
    pub tel_links: Vec<String>,
}

/// Visible text under `element`, excluding scripts and styles.
fn visible_text(element: ElementRef<'_>) -> String {
    let mut text = String::new();
    for node in element.descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| HIDDEN_ELEMENTS.contains(&el.name()))
        });
        let fragment = fragment.trim();
        if !hidden && !fragment.is_empty() {
            text.push_str(fragment);
            text.push(' ');
        }
    }
    normalize_whitespace(&text.nfkc().collect::<String>())
}

fn attr_values(document: &Html, selector: &Selector, prefix_len: usize) -> Vec<String> {
    document
        .select(selector)
        .filter_map(|el| el.value().attr("href"))
        .filter(|href| href.len() > prefix_len)
        .map(|href| href[prefix_len..].to_string())
        .collect()
}

impl<'a> PageView<'a> {
    pub(crate) fn new(url: &'a Url, domain: &'a str, html: &str) -> Self {
        let document = Html::parse_document(html);

        let text = match document.select(&BODY_SELECTOR).next() {
            Some(body) => visible_text(body),
            None => visible_text(document.root_element()),
        };

        let contact_text = document
            .select(&CONTACT_SECTION_SELECTOR)
            // Nested matches are covered by their outermost matching ancestor.
            .filter(|el| {
                !el.ancestors()
                    .filter_map(ElementRef::wrap)
                    .any(|a| CONTACT_SECTION_SELECTOR.matches(&a))
            })
            .map(visible_text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" | ");

        let mailto_links = attr_values(&document, &MAILTO_SELECTOR, "mailto:".len());
        let tel_links = attr_values(&document, &TEL_SELECTOR, "tel:".len());

        Self {
            url,
            domain,
            document,
            text,
            contact_text,
            mailto_links,
            tel_links,
        }
    }

    fn first_text(&self, selector: &Selector) -> Option<String> {
        self.document
            .select(selector)
            .map(visible_text_including_head)
            .find_map(|t| clean_field(&t))
    }
}

/// Text of an element regardless of where it sits (used for `<title>`).
fn visible_text_including_head(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<String>().nfkc().collect::<String>())
}

/// Removes boilerplate such as "Home | " or " - Official Website" from a page title.
pub(crate) fn strip_title_boilerplate(title: &str) -> Option<String> {
    let mut segments = vec![title.to_string()];
    for separator in TITLE_SEPARATORS {
        segments = segments
            .iter()
            .flat_map(|s| s.split(separator).map(str::to_string).collect::<Vec<_>>())
            .collect();
    }

    let is_boilerplate = |segment: &str| {
        let lower = segment.trim().to_lowercase();
        lower.is_empty() || BOILERPLATE_SEGMENTS.contains(&lower.as_str())
    };

    let chosen = segments
        .iter()
        .map(|s| s.trim())
        .find(|s| !is_boilerplate(s))?;

    let chosen = ["Welcome to ", "welcome to ", "Willkommen bei ", "Bienvenue chez "]
        .iter()
        .find_map(|prefix| chosen.strip_prefix(prefix))
        .unwrap_or(chosen);

    clean_field(chosen)
}

/// One ordered extraction step.
pub(crate) trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, page: &PageView<'_>, record: &mut ContactRecord);
}

/// Limits applied to every strategy's output.
#[derive(Debug, Clone, Copy)]
struct FieldLimits {
    max_name_length: usize,
    max_address_length: usize,
}

fn fill_from_structured(
    data: OrganizationData,
    page: &PageView<'_>,
    record: &mut ContactRecord,
    limits: FieldLimits,
) {
    if record.company_name.is_none() {
        record.company_name = data
            .name
            .and_then(|n| clean_field(&n))
            .map(|n| truncate_chars(&n, limits.max_name_length));
    }
    if record.email.is_none() {
        record.email = data.email;
    }
    if record.phone.is_none() {
        record.phone = data.telephone.and_then(|t| clean_field(&t));
    }
    if record.address.is_none() {
        record.address = data
            .address
            .and_then(|a| clean_field(&a))
            .map(|a| truncate_chars(&a, limits.max_address_length));
    }
    tracing::debug!(target: "extract_task", "Applied structured data for {}", page.url);
}

struct JsonLdStrategy {
    limits: FieldLimits,
}

impl ExtractionStrategy for JsonLdStrategy {
    fn name(&self) -> &'static str {
        "json-ld"
    }

    fn apply(&self, page: &PageView<'_>, record: &mut ContactRecord) {
        if let Some(data) = parse_json_ld(&page.document) {
            fill_from_structured(data, page, record, self.limits);
        }
    }
}

struct MicrodataStrategy {
    limits: FieldLimits,
}

impl ExtractionStrategy for MicrodataStrategy {
    fn name(&self) -> &'static str {
        "microdata"
    }

    fn apply(&self, page: &PageView<'_>, record: &mut ContactRecord) {
        if let Some(data) = parse_microdata(&page.document) {
            fill_from_structured(data, page, record, self.limits);
        }
    }
}

struct NameStrategy {
    limits: FieldLimits,
}

impl ExtractionStrategy for NameStrategy {
    fn name(&self) -> &'static str {
        "name"
    }

    fn apply(&self, page: &PageView<'_>, record: &mut ContactRecord) {
        if record.company_name.is_some() {
            return;
        }
        let site_name = page
            .document
            .select(&SITE_NAME_SELECTOR)
            .filter_map(|el| el.value().attr("content"))
            .find_map(clean_field);
        let name = site_name
            .or_else(|| {
                page.first_text(&TITLE_SELECTOR)
                    .and_then(|t| strip_title_boilerplate(&t))
            })
            .or_else(|| {
                page.first_text(&H1_SELECTOR)
                    .and_then(|t| strip_title_boilerplate(&t))
            });
        record.company_name = name.map(|n| truncate_chars(&n, self.limits.max_name_length));
    }
}

struct EmailStrategy;

impl ExtractionStrategy for EmailStrategy {
    fn name(&self) -> &'static str {
        "email"
    }

    fn apply(&self, page: &PageView<'_>, record: &mut ContactRecord) {
        if record.email.is_some() {
            return;
        }
        let mut seen = HashSet::new();
        let candidates: Vec<String> = page
            .mailto_links
            .iter()
            .filter_map(|href| normalize_email(href))
            .chain(find_emails(&page.contact_text))
            .chain(find_emails(&page.text))
            .filter(|e| seen.insert(e.clone()))
            .collect();
        record.email = select_email(&candidates, page.domain);
    }
}

struct PhoneStrategy;

impl ExtractionStrategy for PhoneStrategy {
    fn name(&self) -> &'static str {
        "phone"
    }

    fn apply(&self, page: &PageView<'_>, record: &mut ContactRecord) {
        if record.phone.is_some() {
            return;
        }
        record.phone = page
            .tel_links
            .iter()
            .map(|t| t.replace("%20", " "))
            .find_map(|t| validate_phone(&t))
            .or_else(|| find_phone(&page.contact_text))
            .or_else(|| find_phone(&page.text));
    }
}

struct AddressStrategy {
    limits: FieldLimits,
}

impl ExtractionStrategy for AddressStrategy {
    fn name(&self) -> &'static str {
        "address"
    }

    fn apply(&self, page: &PageView<'_>, record: &mut ContactRecord) {
        if record.address.is_some() {
            return;
        }
        let max = self.limits.max_address_length;
        let from_address_tag = page
            .document
            .select(&ADDRESS_TAG_SELECTOR)
            .map(visible_text)
            .find_map(|t| {
                // An <address> block is accepted whole when it looks like a postal address.
                find_address(&t, max).or_else(|| {
                    let has_digit = t.chars().any(|c| c.is_ascii_digit());
                    let has_email_only = t.contains('@') && t.split_whitespace().count() <= 2;
                    (has_digit && !has_email_only && t.chars().count() <= max)
                        .then(|| t.clone())
                })
            });
        record.address = from_address_tag
            .or_else(|| find_address(&page.contact_text, max))
            .or_else(|| find_address(&page.text, max));
    }
}

/// Runs the extraction strategies in order over a page.
pub(crate) struct FieldExtractor {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl FieldExtractor {
    pub(crate) fn new(config: &Config) -> Self {
        let limits = FieldLimits {
            max_name_length: config.max_name_length,
            max_address_length: config.max_address_length,
        };
        Self {
            strategies: vec![
                Box::new(JsonLdStrategy { limits }),
                Box::new(MicrodataStrategy { limits }),
                Box::new(NameStrategy { limits }),
                Box::new(EmailStrategy),
                Box::new(PhoneStrategy),
                Box::new(AddressStrategy { limits }),
            ],
        }
    }

    /// Extracts a record from `page`. Never fails: a page yielding nothing
    /// produces a record whose contact fields are all empty.
    pub(crate) fn extract(&self, page: &RawPage) -> ContactRecord {
        let domain = get_domain_from_url(page.url.as_str())
            .or_else(|_| get_host_from_url(page.url.as_str()))
            .unwrap_or_default();
        let mut record = ContactRecord::new(page.url.as_str(), domain.clone());

        let view = PageView::new(&page.url, &domain, &page.decoded_text);
        for strategy in &self.strategies {
            let before = record.clone();
            strategy.apply(&view, &mut record);
            if record != before {
                tracing::debug!(target: "extract_task",
                    "Strategy '{}' filled fields for {}", strategy.name(), page.url
                );
            }
        }

        tracing::info!(target: "extract_task",
            "Extracted from {}: name={:?}, email={:?}, phone={:?}, address={:?}",
            page.url, record.company_name, record.email, record.phone, record.address
        );
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str, html: &str) -> RawPage {
        RawPage {
            url: Url::parse(url).unwrap(),
            bytes: html.as_bytes().to_vec(),
            declared_charset: Some("utf-8".to_string()),
            encoding: "UTF-8",
            decoded_text: html.to_string(),
        }
    }

    fn extractor() -> FieldExtractor {
        FieldExtractor::new(&Config::default())
    }

    #[test]
    fn test_strip_title_boilerplate() {
        assert_eq!(
            strip_title_boilerplate("Home | Example Law Firm").as_deref(),
            Some("Example Law Firm")
        );
        assert_eq!(
            strip_title_boilerplate("Example Law Firm - Official Website").as_deref(),
            Some("Example Law Firm")
        );
        assert_eq!(
            strip_title_boilerplate("Welcome to Acme Plumbing").as_deref(),
            Some("Acme Plumbing")
        );
        assert_eq!(strip_title_boilerplate("Home"), None);
    }

    #[test]
    fn test_extract_from_text_heuristics() {
        let html = r#"
            <html><head><title>Home | Example Law Firm</title>
            <style>.x { content: "fake@styles.com"; }</style></head>
            <body>
                <h1>Trusted Counsel</h1>
                <p>We have served clients since 1998.</p>
                <script>var support = "tracker@analytics-vendor.com";</script>
                <footer>
                    <p>1200 Market Street, Suite 300, Springfield, IL 62704</p>
                    <p>Phone: (555) 123-4567</p>
                    <p>Email: <a href="mailto:info@example-law.com">info@example-law.com</a></p>
                </footer>
            </body></html>
        "#;
        let record = extractor().extract(&page("https://www.example-law.com/", html));
        assert_eq!(record.domain, "example-law.com");
        assert_eq!(record.company_name.as_deref(), Some("Example Law Firm"));
        assert_eq!(record.email.as_deref(), Some("info@example-law.com"));
        assert_eq!(record.phone.as_deref(), Some("(555) 123-4567"));
        assert_eq!(
            record.address.as_deref(),
            Some("1200 Market Street, Suite 300, Springfield, IL 62704")
        );
        assert!(!record.name_translated);
    }

    #[test]
    fn test_structured_data_takes_precedence() {
        let html = r#"
            <html><head><title>Some Other Title</title>
            <script type="application/ld+json">
                {"@type": "Organization", "name": "Structured Co", "telephone": "+1 555 000 1111"}
            </script></head>
            <body><p>Call (555) 987-6543 or write to hello@structured.co</p></body></html>
        "#;
        let record = extractor().extract(&page("https://structured.co/", html));
        assert_eq!(record.company_name.as_deref(), Some("Structured Co"));
        assert_eq!(record.phone.as_deref(), Some("+1 555 000 1111"));
        assert_eq!(record.email.as_deref(), Some("hello@structured.co"));
    }

    #[test]
    fn test_same_domain_email_preferred_over_widget() {
        let html = r#"
            <html><body>
                <p>Powered by widgets: help@widgetmail.com</p>
                <p>Reach our team: team@acme-builders.com</p>
            </body></html>
        "#;
        let record = extractor().extract(&page("https://acme-builders.com/about", html));
        assert_eq!(record.email.as_deref(), Some("team@acme-builders.com"));
    }

    #[test]
    fn test_tel_link_and_address_tag() {
        let html = r#"
            <html><body>
                <a href="tel:+49%2030%201234567">Anrufen</a>
                <address>Musterweg 7, 80331 München</address>
            </body></html>
        "#;
        let record = extractor().extract(&page("https://kanzlei-muster.de/", html));
        assert_eq!(record.phone.as_deref(), Some("+49 30 1234567"));
        assert_eq!(record.address.as_deref(), Some("Musterweg 7, 80331 München"));
    }

    #[test]
    fn test_fullwidth_digits_are_normalized() {
        let html = "<html><body><p>電話 ０３-１２３４-５６７８</p></body></html>";
        let record = extractor().extract(&page("https://example-kaisha.co.jp/", html));
        assert_eq!(record.domain, "example-kaisha.co.jp");
        assert_eq!(record.phone.as_deref(), Some("03-1234-5678"));
    }

    #[test]
    fn test_page_without_markup_yields_empty_record() {
        let record = extractor().extract(&page("https://blank.example.org/", ""));
        assert!(record.has_no_contact_fields());
        assert_eq!(record.domain, "example.org");
        assert_eq!(record.source_url, "https://blank.example.org/");
    }

    #[test]
    fn test_name_bounded_in_length() {
        let long_title = "A".repeat(500);
        let html = format!("<html><head><title>{}</title></head><body></body></html>", long_title);
        let record = extractor().extract(&page("https://long.com/", &html));
        assert_eq!(record.company_name.map(|n| n.chars().count()), Some(120));
    }
}
