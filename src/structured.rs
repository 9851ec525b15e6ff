//! Parses machine-readable organization metadata: JSON-LD blocks and schema.org microdata.

use crate::patterns::{clean_field, normalize_email};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};

static JSON_LD_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());
static ITEMSCOPE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[itemscope][itemtype]").unwrap());
static ITEMPROP_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("[itemprop]").unwrap());

/// schema.org types that describe the business behind a site.
const ORGANIZATION_TYPES: &[&str] = &[
    "Organization",
    "Corporation",
    "LocalBusiness",
    "ProfessionalService",
    "LegalService",
    "Attorney",
    "Notary",
    "AccountingService",
    "FinancialService",
    "InsuranceAgency",
    "RealEstateAgent",
    "Dentist",
    "Physician",
    "MedicalBusiness",
    "MedicalClinic",
    "Restaurant",
    "Store",
    "Hotel",
    "AutoRepair",
    "HomeAndConstructionBusiness",
    "Plumber",
    "Electrician",
    "GeneralContractor",
    "TravelAgency",
    "EmploymentAgency",
];

const ADDRESS_PARTS: &[&str] = &["streetAddress", "addressLocality", "addressRegion", "postalCode"];

/// Contact fields declared by the page itself.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct OrganizationData {
    pub name: Option<String>,
    pub email: Option<String>,
    pub telephone: Option<String>,
    pub address: Option<String>,
}

impl OrganizationData {
    pub(crate) fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.telephone.is_none() && self.address.is_none()
    }

    /// Fills fields still empty in `self` from `other`.
    fn absorb(&mut self, other: OrganizationData) {
        if self.name.is_none() {
            self.name = other.name;
        }
        if self.email.is_none() {
            self.email = other.email;
        }
        if self.telephone.is_none() {
            self.telephone = other.telephone;
        }
        if self.address.is_none() {
            self.address = other.address;
        }
    }
}

fn type_matches(type_name: &str) -> bool {
    let short = type_name.rsplit('/').next().unwrap_or(type_name);
    ORGANIZATION_TYPES.contains(&short) || short.ends_with("Organization") || short.ends_with("Business")
}

fn is_organization(map: &Map<String, Value>) -> bool {
    match map.get("@type") {
        Some(Value::String(t)) => type_matches(t),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).any(type_matches),
        _ => false,
    }
}

/// First non-empty string of a value that may be a string or an array of strings.
fn first_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => clean_field(s),
        Value::Array(items) => items.iter().find_map(first_string),
        Value::Number(n) => clean_field(&n.to_string()),
        _ => None,
    }
}

fn address_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => clean_field(s),
        Value::Object(parts) => {
            let joined: Vec<String> = ADDRESS_PARTS
                .iter()
                .filter_map(|key| parts.get(*key).and_then(first_string))
                .collect();
            if joined.is_empty() {
                None
            } else {
                Some(joined.join(", "))
            }
        }
        Value::Array(items) => items.iter().find_map(address_from_value),
        _ => None,
    }
}

fn organization_from_map(map: &Map<String, Value>) -> OrganizationData {
    let contact_point = map.get("contactPoint");
    let from_contact_point = |key: &str| -> Option<String> {
        match contact_point? {
            Value::Object(cp) => cp.get(key).and_then(first_string),
            Value::Array(points) => points
                .iter()
                .filter_map(Value::as_object)
                .find_map(|cp| cp.get(key).and_then(first_string)),
            _ => None,
        }
    };

    let name = map
        .get("name")
        .and_then(first_string)
        .or_else(|| map.get("legalName").and_then(first_string));
    let email = map
        .get("email")
        .and_then(first_string)
        .or_else(|| from_contact_point("email"))
        .and_then(|e| normalize_email(&e));
    let telephone = map
        .get("telephone")
        .and_then(first_string)
        .or_else(|| from_contact_point("telephone"));
    let address = map.get("address").and_then(address_from_value);

    OrganizationData {
        name,
        email,
        telephone,
        address,
    }
}

/// Walks a JSON-LD value (objects, arrays, `@graph`) collecting organization nodes in document order.
fn collect_organizations(value: &Value, out: &mut Vec<OrganizationData>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_organizations(item, out);
            }
        }
        Value::Object(map) => {
            if is_organization(map) {
                out.push(organization_from_map(map));
            }
            if let Some(graph) = map.get("@graph") {
                collect_organizations(graph, out);
            }
            for (key, nested) in map {
                if key != "@graph" && (nested.is_object() || nested.is_array()) {
                    collect_organizations(nested, out);
                }
            }
        }
        _ => {}
    }
}

/// Organization data from `<script type="application/ld+json">` blocks.
/// Malformed blocks are skipped.
pub(crate) fn parse_json_ld(document: &Html) -> Option<OrganizationData> {
    let mut organizations = Vec::new();
    for script in document.select(&JSON_LD_SELECTOR) {
        let text: String = script.text().collect();
        match serde_json::from_str::<Value>(text.trim()) {
            Ok(json) => collect_organizations(&json, &mut organizations),
            Err(e) => {
                tracing::debug!(target: "extract_task", "Ignoring malformed JSON-LD block: {}", e);
            }
        }
    }

    let mut merged = OrganizationData::default();
    for org in organizations {
        merged.absorb(org);
    }
    (!merged.is_empty()).then_some(merged)
}

fn itemprop_value(element: ElementRef<'_>) -> Option<String> {
    let value = element.value();
    value
        .attr("content")
        .or_else(|| value.attr("href"))
        .map(str::to_string)
        .or_else(|| Some(element.text().collect::<Vec<_>>().join(" ")))
        .and_then(|v| clean_field(&v))
}

fn has_itemprop(element: &ElementRef<'_>, prop: &str) -> bool {
    element
        .value()
        .attr("itemprop")
        .is_some_and(|p| p.split_whitespace().any(|p| p == prop))
}

/// Organization data from schema.org microdata (`itemscope` / `itemprop`).
pub(crate) fn parse_microdata(document: &Html) -> Option<OrganizationData> {
    let mut merged = OrganizationData::default();

    for scope in document.select(&ITEMSCOPE_SELECTOR) {
        let Some(item_type) = scope.value().attr("itemtype") else {
            continue;
        };
        if !item_type.split_whitespace().any(type_matches) {
            continue;
        }

        let props: Vec<ElementRef<'_>> = scope.select(&ITEMPROP_SELECTOR).collect();
        let find = |prop: &str| -> Option<String> {
            props
                .iter()
                .find(|el| has_itemprop(el, prop))
                .and_then(|el| itemprop_value(*el))
        };

        let address = props
            .iter()
            .find(|el| has_itemprop(el, "address"))
            .and_then(|address_el| {
                let parts: Vec<String> = ADDRESS_PARTS
                    .iter()
                    .filter_map(|part| {
                        address_el
                            .select(&ITEMPROP_SELECTOR)
                            .find(|el| has_itemprop(el, part))
                            .and_then(itemprop_value)
                    })
                    .collect();
                if parts.is_empty() {
                    itemprop_value(*address_el)
                } else {
                    Some(parts.join(", "))
                }
            });

        merged.absorb(OrganizationData {
            name: find("name").or_else(|| find("legalName")),
            email: find("email").and_then(|e| normalize_email(&e)),
            telephone: find("telephone").map(|t| t.trim_start_matches("tel:").to_string()),
            address,
        });
    }

    (!merged.is_empty()).then_some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_ld_organization() {
        let html = r#"
            <html><head>
            <script type="application/ld+json">
            {
                "@context": "https://schema.org",
                "@type": "LegalService",
                "name": "Example Law Firm",
                "email": "mailto:office@example-law.com",
                "telephone": "+1-555-010-2000",
                "address": {
                    "@type": "PostalAddress",
                    "streetAddress": "100 Main St",
                    "addressLocality": "Springfield",
                    "addressRegion": "IL",
                    "postalCode": "62701"
                }
            }
            </script>
            </head><body></body></html>
        "#;
        let data = parse_json_ld(&Html::parse_document(html)).unwrap();
        assert_eq!(data.name.as_deref(), Some("Example Law Firm"));
        assert_eq!(data.email.as_deref(), Some("office@example-law.com"));
        assert_eq!(data.telephone.as_deref(), Some("+1-555-010-2000"));
        assert_eq!(
            data.address.as_deref(),
            Some("100 Main St, Springfield, IL, 62701")
        );
    }

    #[test]
    fn test_json_ld_graph_and_contact_point() {
        let html = r#"
            <script type="application/ld+json">
            {"@context": "https://schema.org", "@graph": [
                {"@type": "WebSite", "name": "Acme Website"},
                {"@type": ["Organization"], "legalName": "Acme GmbH",
                 "contactPoint": [{"@type": "ContactPoint", "telephone": "+49 30 1234567", "email": "info@acme.de"}]}
            ]}
            </script>
        "#;
        let data = parse_json_ld(&Html::parse_document(html)).unwrap();
        assert_eq!(data.name.as_deref(), Some("Acme GmbH"));
        assert_eq!(data.telephone.as_deref(), Some("+49 30 1234567"));
        assert_eq!(data.email.as_deref(), Some("info@acme.de"));
        assert_eq!(data.address, None);
    }

    #[test]
    fn test_malformed_json_ld_is_ignored() {
        let html = r#"
            <script type="application/ld+json">{ "@type": "Organization", "name": </script>
            <script type="application/ld+json">{"@type": "Organization", "name": "Valid Co"}</script>
        "#;
        let data = parse_json_ld(&Html::parse_document(html)).unwrap();
        assert_eq!(data.name.as_deref(), Some("Valid Co"));
    }

    #[test]
    fn test_non_organization_json_ld_yields_nothing() {
        let html = r#"<script type="application/ld+json">{"@type": "Article", "name": "News"}</script>"#;
        assert_eq!(parse_json_ld(&Html::parse_document(html)), None);
    }

    #[test]
    fn test_nested_publisher_organization() {
        let html = r#"<script type="application/ld+json">
            {"@type": "WebPage", "publisher": {"@type": "Organization", "name": "Nested Media Ltd"}}
        </script>"#;
        let data = parse_json_ld(&Html::parse_document(html)).unwrap();
        assert_eq!(data.name.as_deref(), Some("Nested Media Ltd"));
    }

    #[test]
    fn test_microdata_organization() {
        let html = r#"
            <div itemscope itemtype="https://schema.org/LocalBusiness">
                <span itemprop="name">Bäckerei Schmidt</span>
                <a itemprop="email" href="mailto:hallo@baeckerei-schmidt.de">Mail</a>
                <span itemprop="telephone">030 987654</span>
                <div itemprop="address" itemscope itemtype="https://schema.org/PostalAddress">
                    <span itemprop="streetAddress">Brotweg 5</span>
                    <span itemprop="postalCode">10115</span>
                    <span itemprop="addressLocality">Berlin</span>
                </div>
            </div>
        "#;
        let data = parse_microdata(&Html::parse_document(html)).unwrap();
        assert_eq!(data.name.as_deref(), Some("Bäckerei Schmidt"));
        assert_eq!(data.email.as_deref(), Some("hallo@baeckerei-schmidt.de"));
        assert_eq!(data.telephone.as_deref(), Some("030 987654"));
        assert_eq!(data.address.as_deref(), Some("Brotweg 5, Berlin, 10115"));
    }
}
