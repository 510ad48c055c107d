use std::sync::LazyLock;

use crate::types::{OrgRef, TenderRecord, TenderRef};
use crate::utils::{field_key, normalize_date, stripped_text};

use scraper::{ElementRef, Html, Selector};

pub const ORGANIZATION_NAME: &str = "Organization Name";
pub const UNKNOWN_ORGANIZATION: &str = "Unknown";

const ISO_SUFFIX: &str = " (ISO)";

static SEL_ORG_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.link2").expect("invalid selector: organization link"));
static SEL_TENDER_LINK: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"a[title="View Tender Information"]"#).expect("invalid selector: tender link")
});
static SEL_TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("invalid selector: table"));
static SEL_TR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("invalid selector: tr"));
static SEL_TD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("invalid selector: td"));

/// A way of finding an organization's display name next to its anchor.
type NameStrategy = fn(ElementRef) -> Option<String>;

/// Tried in order, first non-empty result wins.
const NAME_STRATEGIES: &[NameStrategy] = &[name_from_row, name_from_preceding_text];

fn org_anchors(document: &Html) -> Vec<ElementRef<'_>> {
    document.select(&SEL_ORG_LINK).collect()
}

fn org_ref(ordinal: usize, anchor: ElementRef, name: Option<String>) -> OrgRef {
    OrgRef {
        ordinal,
        name,
        href: anchor
            .value()
            .attr("href")
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string),
    }
}

/// All organization anchors of the index page in document order. Names are left unresolved.
pub fn discover_organizations(html: &str) -> Vec<OrgRef> {
    let document = Html::parse_document(html);
    org_anchors(&document)
        .into_iter()
        .enumerate()
        .map(|(ordinal, anchor)| org_ref(ordinal, anchor, None))
        .collect()
}

/// The organization at `ordinal` on this copy of the index page, with its name resolved.
/// `None` when the page has fewer anchors than that.
pub fn organization_at(html: &str, ordinal: usize) -> Option<OrgRef> {
    let document = Html::parse_document(html);
    let anchor = org_anchors(&document).into_iter().nth(ordinal)?;
    Some(org_ref(ordinal, anchor, Some(resolve_org_name(anchor))))
}

pub fn resolve_org_name(anchor: ElementRef) -> String {
    NAME_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(anchor))
        .unwrap_or_else(|| UNKNOWN_ORGANIZATION.to_string())
}

/// Second cell of the table row enclosing the anchor.
fn name_from_row(anchor: ElementRef) -> Option<String> {
    let row = anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "tr")?;
    let name = row.select(&SEL_TD).nth(1).map(stripped_text)?;
    (!name.is_empty()).then_some(name)
}

/// Nearest non-blank text node among the anchor's preceding siblings.
fn name_from_preceding_text(anchor: ElementRef) -> Option<String> {
    anchor.prev_siblings().find_map(|node| {
        let text = node.value().as_text()?.trim();
        (!text.is_empty()).then(|| text.to_string())
    })
}

/// Every tender anchor on an organization's listing page, collected in one pass so the
/// snapshot does not depend on pages visited later in the session.
pub fn parse_tender_list(html: &str) -> Vec<TenderRef> {
    let document = Html::parse_document(html);
    document
        .select(&SEL_TENDER_LINK)
        .filter_map(|link| {
            let title = stripped_text(link);
            match link.value().attr("href").map(str::trim) {
                Some(href) if !href.is_empty() => Some(TenderRef {
                    title,
                    href: href.to_string(),
                }),
                _ => {
                    log::warn!("Skipping tender link without href: '{}'", title);
                    None
                }
            }
        })
        .collect()
}

/// Flatten the 2- and 4-cell key/value rows of every table on a tender page into one record.
pub fn extract_tender(html: &str, organization_name: &str) -> TenderRecord {
    let document = Html::parse_document(html);
    let mut record = TenderRecord::new(organization_name);

    for table in document.select(&SEL_TABLE) {
        for row in table.select(&SEL_TR) {
            let cells: Vec<String> = row.select(&SEL_TD).map(stripped_text).collect();
            match cells.as_slice() {
                [k, v] => keep_pair(&mut record, k, v),
                [k1, v1, k2, v2] => {
                    keep_pair(&mut record, k1, v1);
                    keep_pair(&mut record, k2, v2);
                }
                _ => {}
            }
        }
    }

    add_iso_dates(&mut record);
    record
}

fn keep_pair(record: &mut TenderRecord, label: &str, value: &str) {
    let key = field_key(label);
    let value = value.trim();
    if !key.is_empty() && !value.is_empty() {
        record.insert(key, value);
    }
}

fn add_iso_dates(record: &mut TenderRecord) {
    let companions: Vec<(String, String)> = record
        .iter()
        .filter(|(key, _)| is_date_key(key))
        .map(|(key, value)| (format!("{key}{ISO_SUFFIX}"), normalize_date(value)))
        .collect();
    for (key, value) in companions {
        record.insert(key, value);
    }
}

/// "Date" must be a whole word at the end of the key ("Last Update" is not a date).
fn is_date_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key == "date" || key.ends_with(" date")
}
