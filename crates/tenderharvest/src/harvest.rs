use std::time::Duration;

use crate::parser::{
    UNKNOWN_ORGANIZATION, discover_organizations, extract_tender, organization_at,
    parse_tender_list,
};
use crate::scraper::{Portal, PortalSession, ScraperError};
use crate::store::RecordStore;
use crate::types::{HarvestSummary, OrgRef, TenderRecord, TenderRef};

#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("Failed to fetch organization index: {0}")]
    Index(#[source] ScraperError),
}

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Pause after every tender page request.
    pub tender_delay: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            tender_delay: Duration::from_secs(1),
        }
    }
}

/// One organization's tender listing, fetched inside its own session.
#[derive(Debug)]
pub struct OrganizationCrawl<S> {
    pub organization: OrgRef,
    pub session: S,
    pub tenders: Vec<TenderRef>,
}

impl<S> OrganizationCrawl<S> {
    pub fn name(&self) -> &str {
        self.organization
            .name
            .as_deref()
            .unwrap_or(UNKNOWN_ORGANIZATION)
    }
}

/// Walks index -> organization -> tender, strictly one request at a time.
#[derive(Debug, Clone)]
pub struct Harvester<P> {
    portal: P,
    config: HarvestConfig,
}

impl<P: Portal> Harvester<P> {
    pub fn new(portal: P, config: HarvestConfig) -> Self {
        Self { portal, config }
    }

    /// Fetch the index page and list its organizations. Failing here ends the run.
    pub async fn discover(&self) -> Result<Vec<OrgRef>, HarvestError> {
        let url = self.portal.index_url();
        log::info!("Fetching organization index from {}...", url);
        let session = self.portal.open_session().map_err(HarvestError::Index)?;
        let html = session.get_html(&url).await.map_err(HarvestError::Index)?;
        Ok(discover_organizations(&html))
    }

    /// Open a fresh session, find the organization at `ordinal` on a new copy of the index,
    /// and snapshot its tender links. `Ok(None)` means the organization has to be skipped.
    pub async fn crawl_organization(
        &self,
        ordinal: usize,
    ) -> Result<Option<OrganizationCrawl<P::Session>>, ScraperError> {
        let session = self.portal.open_session()?;
        let index = session.get_html(&self.portal.index_url()).await?;

        let Some(organization) = organization_at(&index, ordinal) else {
            log::warn!(
                "Organization {} is out of range on the current index (page changed?). Skipping.",
                ordinal + 1
            );
            return Ok(None);
        };
        log::info!("Organization: {}", organization);

        let Some(href) = organization.href.as_deref() else {
            log::warn!("No href found for {}. Skipping.", organization);
            return Ok(None);
        };
        let url = self.portal.resolve_url(href)?;
        log::info!("Navigating to organization tenders: {}", url);

        let listing = session.get_html(&url).await?;
        let tenders = parse_tender_list(&listing);

        let crawl = OrganizationCrawl {
            organization,
            session,
            tenders,
        };
        log::info!("Found {} tenders for {}.", crawl.tenders.len(), crawl.name());
        Ok(Some(crawl))
    }

    /// Fetch one tender page within `session` and flatten it into a record.
    pub async fn extract(
        &self,
        session: &P::Session,
        tender: &TenderRef,
        organization_name: &str,
    ) -> Result<TenderRecord, ScraperError> {
        let url = self.portal.resolve_url(&tender.href)?;
        let fetched = session.get_html(&url).await;
        tokio::time::sleep(self.config.tender_delay).await;
        Ok(extract_tender(&fetched?, organization_name))
    }

    /// Crawl every organization into `store`. Only an unreachable index is an error; failed
    /// organizations and tenders are logged, counted and skipped.
    pub async fn run(&self, store: &mut RecordStore) -> Result<HarvestSummary, HarvestError> {
        let organizations = self.discover().await?;
        let total = organizations.len();
        log::info!("Found {} organizations.", total);

        let mut summary = HarvestSummary {
            organizations: total,
            ..Default::default()
        };

        for ordinal in 0..total {
            log::info!("Processing organization {}/{}", ordinal + 1, total);

            let crawl = match self.crawl_organization(ordinal).await {
                Ok(Some(crawl)) => crawl,
                Ok(None) => {
                    summary.organizations_skipped += 1;
                    continue;
                }
                Err(e) => {
                    log::warn!("Error processing organization {}: {}", ordinal + 1, e);
                    summary.organizations_skipped += 1;
                    continue;
                }
            };

            summary.tenders_found += crawl.tenders.len();
            for (j, tender) in crawl.tenders.iter().enumerate() {
                log::info!(
                    "  Processing tender {}/{}: {}",
                    j + 1,
                    crawl.tenders.len(),
                    tender.title
                );

                let record = match self.extract(&crawl.session, tender, crawl.name()).await {
                    Ok(record) => record,
                    Err(e) => {
                        log::warn!("    Error scraping tender '{}': {}", tender.title, e);
                        summary.tenders_failed += 1;
                        continue;
                    }
                };

                match store.append(&record) {
                    Ok(_) => {
                        log::debug!("    Saved {} field(s).", record.len());
                        summary.records_written += 1;
                    }
                    Err(e) => {
                        log::error!("    Failed to save tender '{}': {}", tender.title, e);
                        summary.tenders_failed += 1;
                    }
                }
            }
        }

        Ok(summary)
    }
}
