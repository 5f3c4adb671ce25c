//! Fixed-expiry features for block-settled contracts.
//!
//! For a block of `B` minutes aligned to the epoch:
//! - `minutes_to_expiry = B - (minute mod B)`: 5 at the block open, 1 in its last minute
//! - `dist_to_block_open = (close - block_open) / block_open`, where
//!   `block_open` is the open of the first bar seen in the block
//!
//! Both only use bars at or before the row, so they are leakage-free.

use crate::domain::{Bar, Cadence};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryFeatures {
    block: Cadence,
}

impl ExpiryFeatures {
    pub const COLUMNS: [&'static str; 2] = ["minutes_to_expiry", "dist_to_block_open"];

    pub fn new(block: Cadence) -> Self {
        Self { block }
    }

    pub fn block(&self) -> Cadence {
        self.block
    }

    pub fn minutes_to_expiry(&self, ts_ms: i64) -> f64 {
        let block = self.block.as_minutes() as i64;
        let minute = ts_ms.div_euclid(Cadence::MS_PER_MINUTE);
        (block - minute.rem_euclid(block)) as f64
    }

    pub fn columns(&self, bars: &[Bar]) -> Vec<(String, Vec<f64>)> {
        let mut to_expiry = Vec::with_capacity(bars.len());
        let mut dist = Vec::with_capacity(bars.len());
        let mut current: Option<(i64, f64)> = None;

        for bar in bars {
            let start = self.block.bucket_start(bar.start_ms);
            let open = match current {
                Some((s, o)) if s == start => o,
                _ => {
                    current = Some((start, bar.open));
                    bar.open
                }
            };
            to_expiry.push(self.minutes_to_expiry(bar.start_ms));
            dist.push(if open > 0.0 {
                (bar.close - open) / open
            } else {
                f64::NAN
            });
        }

        vec![
            (Self::COLUMNS[0].to_string(), to_expiry),
            (Self::COLUMNS[1].to_string(), dist),
        ]
    }
}
