// Project topology download and XML parsing.
//
// After login the server serves its device project as XML at a URL keyed by
// the session token. This module fetches that document and reduces it to
// the raw device list; classification into device kinds happens in
// `homeserver-core`.

use std::collections::HashSet;
use std::time::Duration;

use indexmap::IndexMap;
use tracing::debug;
use url::Url;

use crate::error::Error;

const PROJECT_PATH: &str = "/quad/client/client_project.xml";
const DEFAULT_ID: &str = "0";
const DEFAULT_NAME: &str = "Unknown Device";

/// A `<device>` entry as it appears in the project file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDevice {
    pub id: String,
    /// Backslash-delimited path from the `txt` attribute.
    pub name: String,
    /// XML slot name to connection id, in document order.
    pub connections: IndexMap<String, String>,
}

// ── Parsing ──────────────────────────────────────────────────────────

/// Parse a project document into its device entries.
///
/// Devices are read from the `<devices>` element, which may be the root
/// or one of its direct children; a document without one has no devices.
/// The first device carrying a given name wins, even if it has no
/// connections and is itself skipped.
pub fn parse_project(xml: &str) -> Result<Vec<RawDevice>, Error> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| Error::Topology {
        message: e.to_string(),
    })?;

    let root = doc.root_element();
    let container = if root.has_tag_name("devices") {
        Some(root)
    } else {
        root.children().find(|n| n.has_tag_name("devices"))
    };
    let Some(container) = container else {
        debug!("project has no <devices> element");
        return Ok(Vec::new());
    };

    let mut seen_names = HashSet::new();
    let mut devices = Vec::new();

    for node in container.children().filter(|n| n.has_tag_name("device")) {
        let id = node.attribute("id").unwrap_or(DEFAULT_ID);
        let name = node.attribute("txt").unwrap_or(DEFAULT_NAME);

        if !seen_names.insert(name) {
            debug!(device_id = id, name, "skipping duplicate device name");
            continue;
        }

        let mut connects = node
            .children()
            .filter(|n| n.has_tag_name("connect"))
            .peekable();
        if connects.peek().is_none() {
            continue;
        }

        let connections = connects
            .filter_map(|c| Some((c.attribute("slot")?.to_owned(), c.attribute("tag")?.to_owned())))
            .collect();

        devices.push(RawDevice {
            id: id.to_owned(),
            name: name.to_owned(),
            connections,
        });
    }

    debug!(count = devices.len(), "parsed project devices");
    Ok(devices)
}

// ── Fetching ─────────────────────────────────────────────────────────

/// HTTP client for the project file.
#[derive(Debug, Clone)]
pub struct ProjectClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ProjectClient {
    /// Build a client for `http://{host}:{port}`.
    pub fn new(host: &str, port: u16, timeout: Duration) -> Result<Self, Error> {
        let base_url = Url::parse(&format!("http://{host}:{port}"))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("homeserver/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, base_url })
    }

    /// URL of the project document for `token`. The token is the whole
    /// query string.
    pub fn project_url(&self, token: &str) -> Result<Url, Error> {
        let mut url = self.base_url.join(PROJECT_PATH)?;
        url.set_query(Some(token));
        Ok(url)
    }

    /// Download the raw project XML.
    pub async fn fetch_xml(&self, token: &str) -> Result<String, Error> {
        let url = self.project_url(token)?;
        debug!(path = PROJECT_PATH, "fetching project topology");

        let resp = self.http.get(url).send().await?.error_for_status()?;
        Ok(resp.text().await?)
    }

    /// Download and parse the project.
    pub async fn fetch_devices(&self, token: &str) -> Result<Vec<RawDevice>, Error> {
        let xml = self.fetch_xml(token).await?;
        parse_project(&xml)
    }
}
