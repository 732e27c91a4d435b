//! Channel-day waveform data - contiguous runs, gaps, and overlap location

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::digest::digest_samples;
use crate::error::ScanError;
use crate::metadata::{Channel, ChannelKey, StationMeta};

/// A contiguous run of integer samples with a fixed inter-sample interval.
///
/// Times are microseconds since the Unix epoch. The digest is computed over
/// the raw sample stream at construction and identifies the run's content.
#[derive(Debug, Clone)]
pub struct DataSet {
    start_time: i64,
    interval: i64,
    samples: Vec<i32>,
    digest: Vec<u8>,
}

impl DataSet {
    pub fn new(start_time_us: i64, interval_us: i64, samples: Vec<i32>) -> Self {
        let digest = digest_samples(&samples);
        Self {
            start_time: start_time_us,
            interval: interval_us,
            samples,
            digest,
        }
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// Time of the last sample.
    pub fn end_time(&self) -> i64 {
        self.start_time + self.interval * (self.samples.len().max(1) as i64 - 1)
    }

    pub fn interval(&self) -> i64 {
        self.interval
    }

    pub fn sample_rate(&self) -> f64 {
        1.0e6 / self.interval as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[i32] {
        &self.samples
    }

    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    pub fn contains_range(&self, start_us: i64, end_us: i64) -> bool {
        self.start_time <= start_us && self.end_time() >= end_us
    }

    /// Samples covering `[start_us, end_us]`, or `None` if outside this run.
    pub fn series(&self, start_us: i64, end_us: i64) -> Option<&[i32]> {
        if !self.contains_range(start_us, end_us) || self.interval == 0 {
            return None;
        }
        let first = ((start_us - self.start_time) / self.interval) as usize;
        let count = ((end_us - start_us) / self.interval) as usize + 1;
        self.samples.get(first..first + count)
    }
}

/// A maximal interval during which every listed channel has aligned,
/// gapless samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContiguousBlock {
    pub start_time: i64,
    pub end_time: i64,
    pub interval: i64,
}

impl ContiguousBlock {
    pub fn range(&self) -> i64 {
        self.end_time - self.start_time
    }
}

/// Intersect the contiguous runs of two or more channel-day lists.
///
/// Each input list must be ordered by start time. The result holds every
/// interval covered by all lists simultaneously, in time order.
pub fn locate_blocks(lists: &[&[DataSet]]) -> Vec<ContiguousBlock> {
    let Some((first, rest)) = lists.split_first() else {
        return Vec::new();
    };

    let mut blocks: Vec<ContiguousBlock> = first
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| ContiguousBlock {
            start_time: s.start_time(),
            end_time: s.end_time(),
            interval: s.interval(),
        })
        .collect();

    for list in rest {
        let mut next = Vec::new();
        for block in &blocks {
            for set in list.iter().filter(|s| !s.is_empty()) {
                let start = block.start_time.max(set.start_time());
                let end = block.end_time.min(set.end_time());
                if start <= end {
                    next.push(ContiguousBlock {
                        start_time: start,
                        end_time: end,
                        interval: block.interval,
                    });
                }
            }
        }
        blocks = next;
    }

    blocks.sort_by_key(|b| b.start_time);
    blocks
}

/// One station-day's waveform inputs: the station metadata plus the ordered
/// sample runs for every channel.
#[derive(Debug, Clone)]
pub struct MetricData {
    station_meta: StationMeta,
    data: BTreeMap<ChannelKey, Vec<DataSet>>,
}

impl MetricData {
    pub fn new(station_meta: StationMeta) -> Self {
        Self {
            station_meta,
            data: BTreeMap::new(),
        }
    }

    pub fn station_meta(&self) -> &StationMeta {
        &self.station_meta
    }

    pub fn add_channel_data(&mut self, channel: &Channel, sets: Vec<DataSet>) {
        self.data.entry(channel.key().clone()).or_default().extend(sets);
    }

    pub fn channel_data(&self, channel: &Channel) -> Option<&[DataSet]> {
        self.data.get(channel.key()).map(|v| v.as_slice())
    }

    /// Sample rate reported by the first run of the channel.
    pub fn sample_rate(&self, channel: &Channel) -> Option<f64> {
        self.channel_data(channel)
            .and_then(|sets| sets.first())
            .map(|s| s.sample_rate())
    }

    /// Extract the overlapping sample windows of two channels as reals.
    ///
    /// The largest contiguous block across both channel lists is selected
    /// and the covered samples are promoted to `f64`. A length disagreement
    /// after extraction is logged and the mismatched arrays are returned
    /// as-is; callers work on the common prefix.
    pub fn channel_overlap(
        &self,
        x: &Channel,
        y: &Channel,
    ) -> Result<(Vec<f64>, Vec<f64>), ScanError> {
        let xd = self
            .channel_data(x)
            .ok_or_else(|| ScanError::MissingData(x.to_string()))?;
        let yd = self
            .channel_data(y)
            .ok_or_else(|| ScanError::MissingData(y.to_string()))?;

        let blocks = locate_blocks(&[xd, yd]);
        let largest = blocks
            .iter()
            .max_by_key(|b| b.range())
            .copied()
            .ok_or_else(|| {
                ScanError::MissingData(format!("no contiguous overlap between {x} and {y}"))
            })?;
        info!(
            "largest contiguous block for {} x {}: {} us",
            x,
            y,
            largest.range()
        );

        let extract = |sets: &[DataSet]| -> Vec<f64> {
            for set in sets {
                if let Some(series) = set.series(largest.start_time, largest.end_time) {
                    return series.iter().map(|&v| v as f64).collect();
                }
            }
            Vec::new()
        };
        let xwin = extract(xd);
        let ywin = extract(yd);

        if xwin.is_empty() || ywin.is_empty() || xwin.len() != ywin.len() {
            warn!(
                "channel overlap extraction for {} x {} produced windows of {} and {} samples",
                x,
                y,
                xwin.len(),
                ywin.len()
            );
        }

        Ok((xwin, ywin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Station;
    use chrono::NaiveDate;

    fn set(start_s: i64, rate: i64, n: usize) -> DataSet {
        let interval = 1_000_000 / rate;
        DataSet::new(start_s * 1_000_000, interval, vec![1; n])
    }

    #[test]
    fn dataset_time_accessors() {
        let ds = set(100, 1, 61);
        assert_eq!(ds.start_time(), 100_000_000);
        assert_eq!(ds.end_time(), 160_000_000);
        assert_eq!(ds.sample_rate(), 1.0);
    }

    #[test]
    fn series_slices_by_time() {
        let ds = DataSet::new(0, 1_000_000, (0..10).collect());
        let s = ds.series(2_000_000, 5_000_000).unwrap();
        assert_eq!(s, &[2, 3, 4, 5]);
        assert!(ds.series(2_000_000, 50_000_000).is_none());
    }

    #[test]
    fn locator_picks_intersections() {
        // X: [0, 100) and [200, 300); Y: [50, 250)
        let x = vec![set(0, 1, 100), set(200, 1, 100)];
        let y = vec![set(50, 1, 200)];
        let blocks = locate_blocks(&[&x, &y]);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].start_time, 50_000_000);
        assert_eq!(blocks[0].end_time, 99_000_000);
        assert_eq!(blocks[1].start_time, 200_000_000);
        assert_eq!(blocks[1].end_time, 249_000_000);

        let largest = blocks.iter().max_by_key(|b| b.range()).unwrap();
        assert_eq!(largest.start_time, 200_000_000);
    }

    #[test]
    fn overlap_extracts_equal_windows() {
        let station = Station::new("IU", "ANMO");
        let meta = StationMeta::new(station, NaiveDate::from_ymd_opt(2026, 7, 1).unwrap());
        let mut data = MetricData::new(meta);

        let chx = Channel::new("00", "LHZ");
        let chy = Channel::new("00", "LH1");
        data.add_channel_data(&chx, vec![set(0, 1, 500)]);
        data.add_channel_data(&chy, vec![set(100, 1, 500)]);

        let (xw, yw) = data.channel_overlap(&chx, &chy).unwrap();
        assert_eq!(xw.len(), 400);
        assert_eq!(yw.len(), 400);
    }

    #[test]
    fn overlap_with_missing_channel_is_an_error() {
        let station = Station::new("IU", "ANMO");
        let meta = StationMeta::new(station, NaiveDate::from_ymd_opt(2026, 7, 1).unwrap());
        let data = MetricData::new(meta);
        let err = data
            .channel_overlap(&Channel::new("00", "LHZ"), &Channel::new("00", "LH1"))
            .unwrap_err();
        assert!(err.is_soft_skip());
    }
}
