use solar_core::{
    db::{MetricStore, SiteRegistry},
    domain::Site,
};

/// Register configured sites and open their metric namespaces, so a site with
/// no readings yet answers with empty series instead of "unknown site".
pub async fn seed_sites(
    registry: &dyn SiteRegistry,
    store: &dyn MetricStore,
    sites: &[Site],
) -> Result<(), solar_core::StoreError> {
    for site in sites {
        store.ensure_site(site.id).await?;
        registry.insert(site.clone()).await?;
    }
    tracing::info!(count = sites.len(), "sites registered");
    Ok(())
}
