#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tenderharvest::{Portal, PortalSession, ScraperError};

pub const BASE: &str = "http://portal.test";

/// In-memory portal serving canned pages. The index can change between requests to
/// simulate a listing that moves under the crawler.
#[derive(Debug, Clone, Default)]
pub struct FakePortal {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    index_versions: Mutex<VecDeque<String>>,
    pages: Mutex<HashMap<String, String>>,
    sessions: AtomicUsize,
    requests: Mutex<Vec<(usize, String)>>,
}

impl FakePortal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` for the index. Later calls queue further versions; the last one sticks.
    pub fn with_index(self, html: impl Into<String>) -> Self {
        self.inner
            .index_versions
            .lock()
            .unwrap()
            .push_back(html.into());
        self
    }

    pub fn with_page(self, path: &str, html: impl Into<String>) -> Self {
        self.inner
            .pages
            .lock()
            .unwrap()
            .insert(format!("{BASE}{path}"), html.into());
        self
    }

    pub fn sessions_opened(&self) -> usize {
        self.inner.sessions.load(Ordering::SeqCst)
    }

    /// Every request made, tagged with the id of the session that made it.
    pub fn requests(&self) -> Vec<(usize, String)> {
        self.inner.requests.lock().unwrap().clone()
    }

    fn index(&self) -> Option<String> {
        let mut versions = self.inner.index_versions.lock().unwrap();
        if versions.len() > 1 {
            versions.pop_front()
        } else {
            versions.front().cloned()
        }
    }
}

impl Portal for FakePortal {
    type Session = FakeSession;

    fn open_session(&self) -> Result<FakeSession, ScraperError> {
        let id = self.inner.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession {
            id,
            portal: self.clone(),
        })
    }

    fn base_url(&self) -> &str {
        BASE
    }
}

#[derive(Debug)]
pub struct FakeSession {
    id: usize,
    portal: FakePortal,
}

impl PortalSession for FakeSession {
    async fn get_html(&self, url: &str) -> Result<String, ScraperError> {
        self.portal
            .inner
            .requests
            .lock()
            .unwrap()
            .push((self.id, url.to_string()));

        let page = if url == self.portal.index_url() {
            self.portal.index()
        } else {
            self.portal.inner.pages.lock().unwrap().get(url).cloned()
        };
        page.ok_or_else(|| ScraperError::NotFound(url.to_string()))
    }
}

/// Index page with one table row per organization name.
pub fn index_page(orgs: &[&str]) -> String {
    let rows: String = orgs
        .iter()
        .enumerate()
        .map(|(i, name)| {
            format!(
                r#"<tr><td>{n}</td><td>{name}</td><td><a class="link2" href="app?org={n}">1</a></td></tr>"#,
                n = i + 1
            )
        })
        .collect();
    format!("<html><body><table>{rows}</table></body></html>")
}

pub fn org_path(n: usize) -> String {
    format!("/nicgep/app?org={n}")
}

/// Listing page with one tender link per href.
pub fn tender_list_page(hrefs: &[&str]) -> String {
    let rows: String = hrefs
        .iter()
        .map(|href| {
            format!(
                r#"<tr><td><a title="View Tender Information" href="{href}">[{href}]</a></td></tr>"#
            )
        })
        .collect();
    format!("<html><body><table>{rows}</table></body></html>")
}

/// Detail page with one two-cell row per field.
pub fn tender_page(fields: &[(&str, &str)]) -> String {
    let rows: String = fields
        .iter()
        .map(|(k, v)| format!("<tr><td>{k}:</td><td>{v}</td></tr>"))
        .collect();
    format!("<html><body><table>{rows}</table></body></html>")
}
