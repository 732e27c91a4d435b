//! Metric framework - dispatch, shared services, change detection

mod coherence;
mod nlnm_deviation;

pub use coherence::CoherenceMetric;
pub use nlnm_deviation::{NlnmDeviationMetric, NoiseModel};

use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::NaiveDate;
use tracing::warn;

use crate::data::MetricData;
use crate::db::MetricStore;
use crate::digest::{DigestAccumulator, Digestible};
use crate::error::ScanError;
use crate::metadata::{Channel, Station, StationMeta};
use crate::psd::{CrossPower, CrossPowerCache};

/// A closed interval of periods, in seconds, over which a metric averages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerBand {
    pub low: f64,
    pub high: f64,
}

impl PowerBand {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// True when the band is well-formed and inside the usable period range.
    pub fn usable(&self, t_min: f64, t_max: f64) -> bool {
        self.low < self.high && self.low >= t_min && self.high <= t_max
    }
}

impl std::fmt::Display for PowerBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.low, self.high)
    }
}

/// Named-argument bag: arguments must be declared before they can be set,
/// and reading an undeclared name is an error.
#[derive(Debug, Default, Clone)]
pub struct ArgumentBag {
    args: BTreeMap<String, Option<String>>,
}

impl ArgumentBag {
    pub fn declare(&mut self, name: &str) {
        self.args.insert(name.to_string(), None);
    }

    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ScanError> {
        match self.args.get_mut(name) {
            Some(slot) => {
                *slot = Some(value.to_string());
                Ok(())
            }
            None => Err(ScanError::UnknownArgument(name.to_string())),
        }
    }

    /// The value for `name`, or `None` when declared but never set.
    pub fn get(&self, name: &str) -> Result<Option<&str>, ScanError> {
        match self.args.get(name) {
            Some(slot) => Ok(slot.as_deref().filter(|v| !v.is_empty())),
            None => Err(ScanError::UnknownArgument(name.to_string())),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.args.keys().map(|k| k.as_str())
    }
}

/// Per-channel metric values with the digest of the inputs that produced
/// them, for one metric on one station-day.
#[derive(Debug, Clone)]
pub struct MetricResult {
    pub date: NaiveDate,
    pub metric_name: String,
    pub station: Station,
    values: BTreeMap<String, (f64, Vec<u8>)>,
}

impl MetricResult {
    pub fn new(date: NaiveDate, metric_name: String, station: Station) -> Self {
        Self {
            date,
            metric_name,
            station,
            values: BTreeMap::new(),
        }
    }

    pub fn add_result(&mut self, channel_id: String, value: f64, digest: Vec<u8>) {
        self.values.insert(channel_id, (value, digest));
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    pub fn value(&self, channel_id: &str) -> Option<f64> {
        self.values.get(channel_id).map(|(v, _)| *v)
    }

    pub fn digest(&self, channel_id: &str) -> Option<&[u8]> {
        self.values.get(channel_id).map(|(_, d)| d.as_slice())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, f64, &[u8])> {
        self.values
            .iter()
            .map(|(id, (v, d))| (id.as_str(), *v, d.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Canonical channel-id for a two-channel metric: the pair ordered
/// lexicographically on `(location, code)`.
pub fn pair_id(x: &Channel, y: &Channel) -> String {
    let (a, b) = canonical_pair(x, y);
    format!(
        "{}-{},{}-{}",
        a.location(),
        a.code(),
        b.location(),
        b.code()
    )
}

pub(crate) fn canonical_pair<'a>(x: &'a Channel, y: &'a Channel) -> (&'a Channel, &'a Channel) {
    if x.key() <= y.key() {
        (x, y)
    } else {
        (y, x)
    }
}

/// Identifies one stored metric value: date, metric, station, channel-id.
#[derive(Debug, Clone)]
pub struct MetricValueId {
    pub date: NaiveDate,
    pub metric_name: String,
    pub station: Station,
    pub channel_id: String,
}

/// The outermost unit of work.
#[derive(Debug, Clone)]
pub struct StationDay {
    pub station: Station,
    pub date: NaiveDate,
}

/// Shared services borrowed by every metric for the duration of one
/// `process` call: the day's data and metadata, the cross-power cache, the
/// store handle for change detection, and the force flag.
pub struct MetricContext<'a> {
    pub data: &'a MetricData,
    pub cross_powers: &'a mut CrossPowerCache,
    pub store: &'a MetricStore,
    pub force_update: bool,
}

impl<'a> MetricContext<'a> {
    pub fn meta(&self) -> &StationMeta {
        self.data.station_meta()
    }

    /// Cross power for a channel pair, shared across metrics via the cache.
    pub fn cross_power(
        &mut self,
        x: &Channel,
        y: &Channel,
    ) -> Result<Rc<CrossPower>, ScanError> {
        self.cross_powers.get(x, y, self.data)
    }

    /// Combined data + metadata digest over the involved channels.
    ///
    /// Channels are mixed in the order given; two-channel metrics pass the
    /// canonical pair order so the digest is stable.
    pub fn value_digest(&self, channels: &[&Channel]) -> Result<Vec<u8>, ScanError> {
        let mut acc = DigestAccumulator::new();
        for channel in channels {
            let meta = self
                .meta()
                .channel_meta(channel)
                .ok_or_else(|| ScanError::MissingMetadata(channel.to_string()))?;
            acc.add_bytes(&meta.digest());
            let sets = self
                .data
                .channel_data(channel)
                .ok_or_else(|| ScanError::MissingData(channel.to_string()))?;
            for set in sets {
                acc.add_bytes(set.digest());
            }
        }
        Ok(acc.finish())
    }

    /// The new combined digest when the inputs changed (or the run is
    /// forced), `None` when the store already holds the same digest.
    pub fn value_digest_changed(
        &self,
        channels: &[&Channel],
        id: &MetricValueId,
    ) -> Result<Option<Vec<u8>>, ScanError> {
        let digest = self.value_digest(channels)?;
        let stored = self.store.get_metric_value_digest(
            id.date,
            &id.metric_name,
            &id.station,
            &id.channel_id,
        )?;
        if !self.force_update && stored.as_deref() == Some(digest.as_slice()) {
            Ok(None)
        } else {
            Ok(Some(digest))
        }
    }

    /// Coarse change predicate: true when the channel's data or metadata
    /// digest differs from the store's record (or when nothing is stored).
    pub fn hash_changed(&self, channel: &Channel, id: &MetricValueId) -> bool {
        match self.value_digest_changed(&[channel], id) {
            Ok(changed) => changed.is_some(),
            Err(e) => {
                warn!("hash check for {} failed, assuming changed: {}", channel, e);
                true
            }
        }
    }
}

/// A unit of metric work.
///
/// `bind` attaches the station-day and allocates an empty result; `process`
/// evaluates every channel (or pair) and fills it. Failures inside a channel
/// are logged and confined to that channel; an `Err` from `process` is fatal
/// to the whole metric and the scan moves on to the next one.
pub trait Metric {
    fn base_name(&self) -> &'static str;

    fn version(&self) -> u32;

    /// The stored metric name, distinguishing algorithm revisions.
    fn name(&self) -> String {
        format!("{}:v{}", self.base_name(), self.version())
    }

    fn bind(&mut self, day: &StationDay);

    fn process(&mut self, ctx: &mut MetricContext<'_>) -> Result<(), ScanError>;

    fn result(&self) -> Option<&MetricResult>;
}

/// Per-metric state every concrete metric embeds: the argument bag and the
/// result allocated at bind time.
#[derive(Debug, Default, Clone)]
pub struct MetricCore {
    pub args: ArgumentBag,
    result: Option<MetricResult>,
}

impl MetricCore {
    pub fn bind(&mut self, day: &StationDay, metric_name: String) {
        self.result = Some(MetricResult::new(
            day.date,
            metric_name,
            day.station.clone(),
        ));
    }

    pub fn result(&self) -> Option<&MetricResult> {
        self.result.as_ref()
    }

    pub fn result_mut(&mut self) -> &mut MetricResult {
        self.result
            .as_mut()
            .expect("metric processed before bind()")
    }

    /// Identifier of one stored value of the bound metric.
    pub fn identifier(&self, channel_id: String) -> MetricValueId {
        let result = self.result.as_ref().expect("metric used before bind()");
        MetricValueId {
            date: result.date,
            metric_name: result.metric_name.clone(),
            station: result.station.clone(),
            channel_id,
        }
    }
}

/// The concrete metrics a scan can run.
pub enum StationMetric {
    NlnmDeviation(NlnmDeviationMetric),
    Coherence(CoherenceMetric),
}

impl Metric for StationMetric {
    fn base_name(&self) -> &'static str {
        match self {
            Self::NlnmDeviation(m) => m.base_name(),
            Self::Coherence(m) => m.base_name(),
        }
    }

    fn version(&self) -> u32 {
        match self {
            Self::NlnmDeviation(m) => m.version(),
            Self::Coherence(m) => m.version(),
        }
    }

    fn name(&self) -> String {
        match self {
            Self::NlnmDeviation(m) => m.name(),
            Self::Coherence(m) => m.name(),
        }
    }

    fn bind(&mut self, day: &StationDay) {
        match self {
            Self::NlnmDeviation(m) => m.bind(day),
            Self::Coherence(m) => m.bind(day),
        }
    }

    fn process(&mut self, ctx: &mut MetricContext<'_>) -> Result<(), ScanError> {
        match self {
            Self::NlnmDeviation(m) => m.process(ctx),
            Self::Coherence(m) => m.process(ctx),
        }
    }

    fn result(&self) -> Option<&MetricResult> {
        match self {
            Self::NlnmDeviation(m) => m.result(),
            Self::Coherence(m) => m.result(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_bag_rejects_undeclared_names() {
        let mut args = ArgumentBag::default();
        args.declare("nlnm-modelfile");

        assert!(args.set("nlnm-modelfile", "models/nlnm.asc").is_ok());
        assert_eq!(
            args.get("nlnm-modelfile").unwrap(),
            Some("models/nlnm.asc")
        );

        assert!(matches!(
            args.set("bogus", "1"),
            Err(ScanError::UnknownArgument(_))
        ));
        assert!(matches!(
            args.get("bogus"),
            Err(ScanError::UnknownArgument(_))
        ));
    }

    #[test]
    fn unset_argument_reads_as_none() {
        let mut args = ArgumentBag::default();
        args.declare("nhnm-modelfile");
        assert_eq!(args.get("nhnm-modelfile").unwrap(), None);

        // empty string counts as unset, matching the config convention
        args.set("nhnm-modelfile", "").unwrap();
        assert_eq!(args.get("nhnm-modelfile").unwrap(), None);
    }

    #[test]
    fn pair_id_is_canonical() {
        let x = Channel::new("10", "LHZ");
        let y = Channel::new("00", "LHZ");
        assert_eq!(pair_id(&x, &y), "00-LHZ,10-LHZ");
        assert_eq!(pair_id(&y, &x), "00-LHZ,10-LHZ");
    }

    #[test]
    fn power_band_usability() {
        let band = PowerBand::new(20.0, 50.0);
        assert!(band.usable(2.0, 1000.0));
        assert!(!band.usable(30.0, 1000.0));
        assert!(!band.usable(2.0, 40.0));
        assert!(!PowerBand::new(50.0, 20.0).usable(2.0, 1000.0));
    }

    #[test]
    fn hash_changed_tracks_store_state() {
        use crate::data::DataSet;
        use crate::metadata::{ChannelKey, ChannelMeta};
        use chrono::TimeZone;

        let station = Station::new("IU", "ANMO");
        let date = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let epoch = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        let mut meta = StationMeta::new(station.clone(), date);
        let mut chan = ChannelMeta::new(ChannelKey::new("00", "LHZ"), &station, epoch);
        chan.sample_rate = 1.0;
        meta.add_channel(chan);
        let mut data = MetricData::new(meta);
        let channel = Channel::new("00", "LHZ");
        data.add_channel_data(&channel, vec![DataSet::new(0, 1_000_000, vec![1, 2, 3, 4])]);

        let store = MetricStore::open_in_memory().unwrap();
        let mut cache = CrossPowerCache::new();
        let ctx = MetricContext {
            data: &data,
            cross_powers: &mut cache,
            store: &store,
            force_update: false,
        };
        let id = MetricValueId {
            date,
            metric_name: "AvailabilityMetric:v1".to_string(),
            station: station.clone(),
            channel_id: channel.id(),
        };

        // nothing stored yet
        assert!(ctx.hash_changed(&channel, &id));

        let digest = ctx.value_digest(&[&channel]).unwrap();
        let mut result = MetricResult::new(date, id.metric_name.clone(), station);
        result.add_result(channel.id(), 1.0, digest);
        store.insert_metric_data(&result).unwrap();

        assert!(!ctx.hash_changed(&channel, &id));
    }

    #[test]
    fn result_iterates_in_id_order() {
        let mut result = MetricResult::new(
            NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            "CoherencePBM:v1:20-50".to_string(),
            Station::new("IU", "ANMO"),
        );
        result.add_result("10,LHZ".to_string(), 2.0, vec![2]);
        result.add_result("00,LHZ".to_string(), 1.0, vec![1]);

        let ids: Vec<&str> = result.ids().collect();
        assert_eq!(ids, vec!["00,LHZ", "10,LHZ"]);
        assert_eq!(result.value("10,LHZ"), Some(2.0));
        assert_eq!(result.digest("00,LHZ"), Some(&[1u8][..]));
    }
}
