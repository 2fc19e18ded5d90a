//! Paginated retrieval from the full-archive search.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::{Error, Result};
use crate::output::save_json;
use crate::places::Place;
use crate::query::SearchParams;
use crate::records::{Author, Record};
use crate::services::search_api::SearchApi;

/// Request pacing imposed by the endpoint's rate limits.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    /// Pause between two consecutive requests.
    pub interval: Duration,
    /// Every this many requests, wait for `cooldown`.
    pub cooldown_every: usize,
    pub cooldown: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            cooldown_every: 300,
            cooldown: Duration::from_secs(8 * 60),
        }
    }
}

impl Pacing {
    /// No waiting at all.
    pub fn none() -> Self {
        Self {
            interval: Duration::ZERO,
            cooldown_every: usize::MAX,
            cooldown: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Backup {
    pub path: PathBuf,
    pub every_pages: usize,
}

/// Everything collected so far, as written to backups.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveDump {
    pub records: Vec<Record>,
    pub users: Vec<Author>,
    pub places: Vec<Place>,
    pub next_token: Option<String>,
}

/// Walks result pages following `next_token`, attaching each page's
/// users and places to its records.
pub struct Paginator<A> {
    api: A,
    params: Vec<(String, String)>,
    pacing: Pacing,
    backup: Option<Backup>,
    dump: ArchiveDump,
    requests: usize,
}

impl<A: SearchApi> Paginator<A> {
    /// Validates `search` and prepares the request parameters.
    pub fn new(api: A, search: &SearchParams) -> Result<Self> {
        let params = search.query_params()?;
        if let Some((_, query)) = params.iter().find(|(k, _)| k == "query") {
            info!(query = %query, length = query.chars().count(), "Search query built");
        }
        Ok(Self {
            api,
            params,
            pacing: Pacing::default(),
            backup: None,
            dump: ArchiveDump::default(),
            requests: 0,
        })
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_backup(mut self, backup: Backup) -> Self {
        self.backup = Some(backup);
        self
    }

    pub fn records(&self) -> &[Record] {
        &self.dump.records
    }

    pub fn users(&self) -> &[Author] {
        &self.dump.users
    }

    pub fn places(&self) -> &[Place] {
        &self.dump.places
    }

    pub fn next_token(&self) -> Option<&str> {
        self.dump.next_token.as_deref()
    }

    pub fn into_dump(self) -> ArchiveDump {
        self.dump
    }

    /// Fetches up to `pages` pages from the start, discarding earlier results.
    pub async fn fetch(&mut self, pages: usize) -> Result<&[Record]> {
        self.dump = ArchiveDump::default();
        self.walk(pages, None).await?;
        Ok(&self.dump.records)
    }

    /// Fetches up to `pages` more pages after the last one, appending to the
    /// records already collected.
    ///
    /// # Errors
    ///
    /// [`Error::NoNextToken`] when the previous walk reached the last page.
    pub async fn fetch_more(&mut self, pages: usize) -> Result<&[Record]> {
        let token = self.dump.next_token.clone().ok_or(Error::NoNextToken)?;
        self.walk(pages, Some(token)).await?;
        Ok(&self.dump.records)
    }

    #[instrument(skip(self, token))]
    async fn walk(&mut self, pages: usize, mut token: Option<String>) -> Result<()> {
        for page_no in 1..=pages {
            if page_no > 1 {
                self.pace().await;
            }

            info!(page = page_no, "Requesting page");
            let page = self.api.search_page(&self.params, token.as_deref()).await?;
            self.requests += 1;

            if page.data.is_empty() {
                if page_no == 1 && page.meta.result_count == 0 {
                    info!("No results found");
                } else {
                    warn!(next_token = ?token, "No posts on this page");
                }
            }

            let records = page.attach_includes();
            for user in &page.includes.users {
                if !self.dump.users.iter().any(|u| u.id == user.id) {
                    self.dump.users.push(user.clone());
                }
            }
            for place in &page.includes.places {
                if !self.dump.places.iter().any(|p| p.id == place.id) {
                    self.dump.places.push(place.clone());
                }
            }
            if let Some(last) = records.last() {
                info!(
                    records = records.len(),
                    places = page.includes.places.len(),
                    last_date = %last.created_at.date_naive(),
                    "Page received"
                );
            }
            self.dump.records.extend(records);

            token = page.meta.next_token.clone();
            self.dump.next_token = token.clone();

            if let Some(backup) = &self.backup {
                if backup.every_pages > 0 && page_no % backup.every_pages == 0 {
                    save_json(&backup.path, &self.dump)?;
                    info!(path = %backup.path.display(), page = page_no, "Backup written");
                }
            }

            if token.is_none() {
                info!(records = self.dump.records.len(), "No more pages");
                break;
            }
        }

        info!(
            records = self.dump.records.len(),
            users = self.dump.users.len(),
            places = self.dump.places.len(),
            requests = self.requests,
            "Search finished"
        );
        Ok(())
    }

    async fn pace(&self) {
        tokio::time::sleep(self.pacing.interval).await;
        if self.requests > 0 && self.requests % self.pacing.cooldown_every == 0 {
            let minutes = self.pacing.cooldown.as_secs() / 60;
            info!(requests = self.requests, minutes, "Request quota reached, cooling down");
            tokio::time::sleep(self.pacing.cooldown).await;
        }
    }
}
