use std::collections::{HashSet, VecDeque};
use std::net::IpAddr;

use reqwest::{Client, Url};

use super::html::{extract_links, html_to_text};
use super::Document;
use crate::core::config::CrawlerSettings;
use crate::core::errors::ApiError;
use crate::core::http::{build_client, error_for_status};

/// Fetches single pages and turns them into documents.
#[derive(Clone)]
pub struct WebLoader {
    client: Client,
}

impl WebLoader {
    pub fn new(settings: &CrawlerSettings) -> Result<Self, ApiError> {
        Ok(Self {
            client: build_client(settings.timeout_secs)?,
        })
    }

    pub async fn fetch_html(&self, url: &str) -> Result<String, ApiError> {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| ApiError::Upstream(format!("Failed to fetch {}: {}", url, err)))?;
        let res = error_for_status(res, &format!("Failed to fetch {}", url)).await?;
        res.text().await.map_err(ApiError::upstream)
    }

    pub async fn load(&self, url: &str) -> Result<Document, ApiError> {
        let html = self.fetch_html(url).await?;
        Ok(Document::with_source(html_to_text(&html), url))
    }
}

/// Breadth-first discovery of same-site links.
#[derive(Clone)]
pub struct Crawler {
    loader: WebLoader,
}

impl Crawler {
    pub fn new(loader: WebLoader) -> Self {
        Self { loader }
    }

    pub fn loader(&self) -> &WebLoader {
        &self.loader
    }

    /// Collects up to `max_links` internal links reachable from `base_url`,
    /// in discovery order. The base URL itself is not part of the result.
    pub async fn internal_links(
        &self,
        base_url: &str,
        max_links: usize,
    ) -> Result<Vec<String>, ApiError> {
        let base = Url::parse(base_url.trim())
            .map_err(|err| ApiError::BadRequest(format!("Invalid base_url '{}': {}", base_url, err)))?;
        if !is_http(&base) {
            return Err(ApiError::BadRequest(
                "Only http/https URLs are supported".to_string(),
            ));
        }
        let base_domain = base.host_str().map(registrable_domain).unwrap_or_default();

        let mut visited: HashSet<String> = HashSet::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut links: Vec<String> = Vec::new();
        let mut queue: VecDeque<Url> = VecDeque::from([base]);

        while let Some(page) = queue.pop_front() {
            if links.len() >= max_links {
                break;
            }
            if !visited.insert(page.to_string()) {
                continue;
            }

            let html = match self.loader.fetch_html(page.as_str()).await {
                Ok(html) => html,
                Err(err) => {
                    tracing::warn!("Failed to crawl {}: {}", page, err);
                    continue;
                }
            };

            for href in extract_links(&html) {
                let Ok(mut link) = page.join(&href) else {
                    continue;
                };
                link.set_fragment(None);
                if !is_http(&link) {
                    continue;
                }
                let same_site = link
                    .host_str()
                    .map(|host| registrable_domain(host) == base_domain)
                    .unwrap_or(false);
                if !same_site {
                    continue;
                }

                let key = link.to_string();
                if visited.contains(&key) || !seen.insert(key.clone()) {
                    continue;
                }
                links.push(key);
                queue.push_back(link);
                if links.len() >= max_links {
                    break;
                }
            }
        }

        links.truncate(max_links);
        tracing::info!("Crawled {} internal links from {}", links.len(), base_url);
        Ok(links)
    }

    pub async fn load_documents(&self, links: &[String]) -> Vec<Document> {
        let mut docs = Vec::with_capacity(links.len());
        for url in links {
            tracing::debug!("Visiting {}", url);
            match self.loader.load(url).await {
                Ok(doc) if !doc.page_content.trim().is_empty() => docs.push(doc),
                Ok(_) => tracing::debug!("No visible text at {}", url),
                Err(err) => tracing::warn!("Failed to load {}: {}", url, err),
            }
        }
        docs
    }
}

fn is_http(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Site identity used for the internal-link check: the host lowercased,
/// without a leading `www.`, reduced to its last two labels. IP addresses
/// and single-label hosts are kept whole.
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
    let trimmed = host.trim_start_matches('[').trim_end_matches(']');
    if trimmed.parse::<IpAddr>().is_ok() {
        return trimmed.to_string();
    }
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() <= 2 {
        return labels.join(".");
    }
    labels[labels.len() - 2..].join(".")
}
