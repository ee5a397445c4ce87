//! Lock-light, widen-only channel bounds

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::model::{Stream, StreamId, Value};

use super::errors::{StatsError, StatsResult};

/// Observed value range of one channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelStatistics {
    pub min: f64,
    pub max: f64,
}

impl ChannelStatistics {
    /// Width of the range (the aggregate sensitivity for min/max)
    pub fn spread(&self) -> f64 {
        self.max - self.min
    }
}

/// Bounds stored as f64 bit patterns so each side can be widened with CAS
#[derive(Debug)]
struct AtomicBounds {
    min: AtomicU64,
    max: AtomicU64,
}

impl AtomicBounds {
    fn seeded(value: f64) -> Self {
        Self {
            min: AtomicU64::new(value.to_bits()),
            max: AtomicU64::new(value.to_bits()),
        }
    }

    fn widen(&self, value: f64) {
        widen_cell(&self.min, value, |current, v| v < current);
        widen_cell(&self.max, value, |current, v| v > current);
    }

    fn load(&self) -> ChannelStatistics {
        ChannelStatistics {
            min: f64::from_bits(self.min.load(Ordering::Acquire)),
            max: f64::from_bits(self.max.load(Ordering::Acquire)),
        }
    }
}

/// Replaces the stored value while `wider(current, value)` holds
fn widen_cell(cell: &AtomicU64, value: f64, wider: impl Fn(f64, f64) -> bool) {
    let mut current = cell.load(Ordering::Acquire);
    while wider(f64::from_bits(current), value) {
        match cell.compare_exchange_weak(
            current,
            value.to_bits(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => return,
            Err(actual) => current = actual,
        }
    }
}

type ChannelKey = (StreamId, usize);

/// Widen-only min/max per (stream, channel ordinal)
///
/// The map lock is taken for writing only the first time a channel is seen.
/// After that, concurrent ingests on the same channel serialize through the
/// compare-and-swap loop and ingests on different channels never contend.
#[derive(Debug, Default)]
pub struct ChannelStatisticsTracker {
    channels: RwLock<HashMap<ChannelKey, Arc<AtomicBounds>>>,
}

impl ChannelStatisticsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one ingested tuple into the bounds
    ///
    /// Text channels, NULLs and non-finite values are ignored. Returns the
    /// number of channel values observed.
    pub fn track_ingest(&self, stream: &Stream, values: &[Value]) -> StatsResult<usize> {
        if values.len() != stream.width() {
            return Err(StatsError::Arity {
                stream: stream.name.clone(),
                expected: stream.width(),
                actual: values.len(),
            });
        }

        let mut observed = 0;
        for (ordinal, (channel, value)) in stream.channels.iter().zip(values).enumerate() {
            if !channel.channel_type.is_numeric() {
                continue;
            }
            if let Some(v) = value.as_f64().filter(|v| v.is_finite()) {
                self.observe(stream.id, ordinal, v);
                observed += 1;
            }
        }
        Ok(observed)
    }

    /// Widens one channel's bounds to include `value`
    pub fn observe(&self, stream: StreamId, ordinal: usize, value: f64) {
        let key = (stream, ordinal);

        let existing = {
            let map = self.channels.read().unwrap_or_else(|e| e.into_inner());
            map.get(&key).cloned()
        };

        let bounds = match existing {
            Some(bounds) => bounds,
            None => {
                let mut map = self.channels.write().unwrap_or_else(|e| e.into_inner());
                Arc::clone(
                    map.entry(key)
                        .or_insert_with(|| Arc::new(AtomicBounds::seeded(value))),
                )
            }
        };

        bounds.widen(value);
    }

    /// Current bounds of one channel, `None` before any value was seen
    pub fn range(&self, stream: StreamId, ordinal: usize) -> Option<ChannelStatistics> {
        let map = self.channels.read().unwrap_or_else(|e| e.into_inner());
        map.get(&(stream, ordinal)).map(|b| b.load())
    }

    /// Bounds of every channel of a stream, in channel order
    pub fn snapshot(&self, stream: &Stream) -> Vec<Option<ChannelStatistics>> {
        (0..stream.width())
            .map(|ordinal| self.range(stream.id, ordinal))
            .collect()
    }
}
