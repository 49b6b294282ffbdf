use dashmap::DashMap;

use super::{SiteRegistry, StoreError};
use crate::domain::{Site, SiteId};

#[derive(Default)]
pub struct MemorySiteRegistry {
    sites: DashMap<SiteId, Site>,
}

impl MemorySiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SiteRegistry for MemorySiteRegistry {
    async fn insert(&self, site: Site) -> Result<(), StoreError> {
        self.sites.insert(site.id, site);
        Ok(())
    }

    async fn find_by_id(&self, id: SiteId) -> Result<Option<Site>, StoreError> {
        Ok(self.sites.get(&id).map(|s| s.clone()))
    }

    async fn find_all(&self) -> Result<Vec<Site>, StoreError> {
        let mut sites: Vec<Site> = self.sites.iter().map(|s| s.value().clone()).collect();
        sites.sort_by_key(|s| s.id);
        Ok(sites)
    }
}
