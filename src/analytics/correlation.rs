//! Picks the most actively traded peer and correlates close prices with it.

use crate::analytics::metrics::pearson_correlation;
use crate::price_bar::PriceBar;
use crate::store::{PriceStore, StoreError};
use crate::symbol::Symbol;
use tracing::{debug, warn};

/// Number of most recent bars ranked and correlated.
pub const DEFAULT_CORRELATION_BARS: usize = 30;

/// The peer with the highest dollar volume over its recent bars.
#[derive(Debug, Clone, PartialEq)]
pub struct TopStock {
    pub symbol: Symbol,
    /// Σ close × volume over the ranked bars.
    pub dollar_volume: f64,
    /// Close prices of the ranked bars, oldest first.
    pub closes: Vec<f64>,
}

/// Finds the stored symbol other than `exclude` with the largest dollar volume
/// over its `count` most recent bars.
///
/// Symbols are scanned in lexicographic order and ties keep the first one
/// seen. Returns `None` when no other symbol has bars.
pub fn top_by_dollar_volume<S: PriceStore>(
    store: &S,
    exclude: &Symbol,
    count: usize,
) -> Result<Option<TopStock>, StoreError> {
    let mut best: Option<TopStock> = None;

    for symbol in store.symbols()? {
        if &symbol == exclude {
            continue;
        }

        // Most recent first, as stored.
        let bars = store.load_recent_by_count(&symbol, count)?;
        let dollar_volume: f64 = bars.iter().map(PriceBar::dollar_volume).sum();
        debug!("{} dollar volume over {} bars: {}", symbol, bars.len(), dollar_volume);

        let better = match &best {
            Some(current) => dollar_volume > current.dollar_volume,
            None => true,
        };
        if better {
            best = Some(TopStock {
                symbol,
                dollar_volume,
                closes: bars.iter().rev().map(|bar| bar.close).collect(),
            });
        }
    }

    Ok(best)
}

/// Pearson correlation between the subject's windowed closes and a peer's
/// recent closes, paired by position from the most recent end.
///
/// The subject's series is date-windowed while the peer's is count-windowed,
/// so their lengths can differ; the longer one is truncated to the shorter
/// length, which pairs values by position rather than by date.
pub fn close_price_correlation(subject_closes: &[f64], peer_closes: &[f64]) -> Option<f64> {
    if subject_closes.len() != peer_closes.len() {
        warn!(
            "Correlating close series of unequal length ({} vs {}); truncating to the shorter",
            subject_closes.len(),
            peer_closes.len()
        );
    }

    let n = subject_closes.len().min(peer_closes.len());
    let subject = &subject_closes[subject_closes.len() - n..];
    let peer = &peer_closes[peer_closes.len() - n..];
    pearson_correlation(subject, peer)
}
