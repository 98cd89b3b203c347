//! Market enrichment of analysed line items.
//!
//! Every item gets its own price lookup. Lookups run concurrently but never
//! more than `max_concurrent` at a time; the output keeps input order and a
//! failed lookup only degrades its own item.

use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use crate::domain::analysis::{Category, DocumentItem, ExtendedItem};
use crate::services::market::MarketSearch;

/// Default admission count for concurrent lookups.
pub const DEFAULT_MAX_CONCURRENT: usize = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnrichError {
    #[error("max_concurrent must be at least 1")]
    NoConcurrency,

    #[error("enrichment admission closed")]
    Closed,
}

/// Enrich `items` with market data.
///
/// Returns one [`ExtendedItem`] per input item, in input order. An empty
/// input returns immediately without lookups. `max_concurrent == 0` is a
/// caller error reported before any lookup starts.
#[instrument(skip(items, market), fields(items = items.len()))]
pub async fn enrich_items(
    items: Vec<DocumentItem>,
    category: Category,
    market: &dyn MarketSearch,
    max_concurrent: usize,
) -> Result<Vec<ExtendedItem>, EnrichError> {
    if max_concurrent == 0 {
        return Err(EnrichError::NoConcurrency);
    }
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let total = items.len();
    let permits = Arc::new(Semaphore::new(max_concurrent));

    let lookups = items.into_iter().enumerate().map(|(index, item)| {
        let permits = Arc::clone(&permits);
        async move {
            let _permit = permits.acquire_owned().await.map_err(|_| EnrichError::Closed)?;
            let unit = item.unit_or_default().to_string();

            match market.search_price(&item.name, &unit).await {
                Ok(quote) => Ok(ExtendedItem::with_quote(item, quote)),
                Err(e) => {
                    warn!(index = index, item = %item.name, error = %e, "Market lookup failed");
                    Ok(ExtendedItem::unenriched(item))
                }
            }
        }
    });

    let extended = join_all(lookups)
        .await
        .into_iter()
        .collect::<Result<Vec<_>, EnrichError>>()?;

    let enriched = extended.iter().filter(|i| i.has_market_data()).count();
    info!(
        category = %category,
        total = total,
        enriched = enriched,
        "Items enriched with market data"
    );
    Ok(extended)
}
