//! Capped recent-reading feeds, one global and one per site. Newest first.

use std::collections::{HashSet, VecDeque};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::domain::{Reading, SiteId};

pub const DEFAULT_GLOBAL_CAP: usize = 10_000;
pub const DEFAULT_SITE_CAP: usize = 2_440;

#[derive(Default)]
struct SiteFeed {
    entries: VecDeque<Reading>,
    keys: HashSet<[u8; 32]>,
}

pub struct ReadingFeed {
    global: Mutex<VecDeque<Reading>>,
    sites: DashMap<SiteId, SiteFeed>,
    global_cap: usize,
    site_cap: usize,
}

impl Default for ReadingFeed {
    fn default() -> Self {
        Self::new(DEFAULT_GLOBAL_CAP, DEFAULT_SITE_CAP)
    }
}

impl ReadingFeed {
    pub fn new(global_cap: usize, site_cap: usize) -> Self {
        Self {
            global: Mutex::new(VecDeque::new()),
            sites: DashMap::new(),
            global_cap: global_cap.max(1),
            site_cap: site_cap.max(1),
        }
    }

    /// Append a reading to its site feed and to the global feed.
    ///
    /// Returns `false` if the site feed already holds the same observation
    /// (see [`Reading::same_observation`]); the reading is then dropped.
    pub fn insert(&self, reading: &Reading) -> bool {
        let key = reading.dedup_key();
        {
            let mut feed = self.sites.entry(reading.site_id).or_default();
            if !feed.keys.insert(key) {
                return false;
            }
            feed.entries.push_front(reading.clone());
            if feed.entries.len() > self.site_cap {
                if let Some(evicted) = feed.entries.pop_back() {
                    feed.keys.remove(&evicted.dedup_key());
                }
            }
        }

        let mut global = self.global.lock();
        global.push_front(reading.clone());
        global.truncate(self.global_cap);
        true
    }

    pub fn recent_global(&self, limit: usize) -> Vec<Reading> {
        self.global.lock().iter().take(limit).cloned().collect()
    }

    pub fn recent_for_site(&self, site: SiteId, limit: usize) -> Vec<Reading> {
        self.sites
            .get(&site)
            .map(|feed| feed.entries.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }
}
