//! `asset-scraper scrape`: one extraction, printed as JSON, without the cache.

use super::build_scraper;
use crate::asset::{AssetCode, AssetType};
use crate::config::Settings;
use anyhow::{bail, Context, Result};

pub async fn run(settings: &Settings, asset: AssetType, raw_code: &str) -> Result<()> {
    let code = AssetCode::parse(raw_code)
        .with_context(|| format!("invalid asset code: {raw_code:?}"))?;

    let scraper = build_scraper(settings);
    let result = scraper.fetch(asset, &code).await;
    scraper.shutdown().await?;

    match result? {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        None => bail!("no data for {asset} {code}"),
    }
}
