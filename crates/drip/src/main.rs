use std::sync::Arc;

use drip_core::{
    catalog::{Catalog, JsonCatalog},
    config::Config,
    store::{JsonUserStore, UserStore},
};

#[tokio::main]
async fn main() -> Result<(), drip_core::Error> {
    drip_core::logging::init("drip");

    let cfg = Arc::new(Config::load()?);

    let store: Arc<dyn UserStore> = Arc::new(JsonUserStore::open(cfg.users_file())?);
    let catalog: Arc<dyn Catalog> = Arc::new(JsonCatalog::load(
        &cfg.catalog_path,
        cfg.images_dir.as_deref(),
    )?);

    tracing::info!(
        data_dir = %cfg.data_dir.display(),
        catalog = %cfg.catalog_path.display(),
        "starting drip"
    );

    drip_telegram::router::run_polling(cfg, store, catalog)
        .await
        .map_err(|e| drip_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
