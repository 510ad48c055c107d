pub mod density;
pub mod harvest;
mod parser;
pub mod scraper;
pub mod sink;
pub mod store;
pub mod types;
pub mod utils;

pub use crate::harvest::{HarvestConfig, HarvestError, Harvester, OrganizationCrawl};
pub use crate::parser::{
    ORGANIZATION_NAME, UNKNOWN_ORGANIZATION, discover_organizations, extract_tender,
    organization_at, parse_tender_list, resolve_org_name,
};
pub use crate::scraper::{Portal, PortalSession, ScraperError, WebPortal};
pub use crate::store::{RecordStore, SchemaPolicy};
pub use crate::types::{RunContext, TenderRecord};

pub(crate) const BASE_URL: &str = "https://coalindiatenders.nic.in";
pub(crate) const INDEX_PATH: &str = "/nicgep/app?page=FrontEndTendersByOrganisation&service=page";
