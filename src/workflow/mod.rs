//! Site workflows built on the extraction engine.

pub mod cityplan;
pub mod pdonline;

use portal_engine::{Driver, Element};
use std::time::Duration;
use tracing::debug;

/// Fixed pause after an interaction that kicks off client-side work
/// (suggestion lists, ASP.NET postbacks) with no observable end state.
pub(crate) async fn pause(delay: Duration) {
    if delay.is_zero() {
        return;
    }
    debug!("pausing {}ms", delay.as_millis());
    tokio::time::sleep(delay).await;
}

/// Trimmed texts of the `td` cells under a table row, in column order.
pub(crate) async fn cell_texts<D: Driver>(
    driver: &D,
    row: &Element,
) -> portal_engine::Result<Vec<String>> {
    let cells = driver.find(&row.descendant("td")).await?;
    let mut texts = Vec::with_capacity(cells.len());
    for cell in &cells {
        texts.push(driver.text_of(cell).await?.trim().to_string());
    }
    Ok(texts)
}
