//! Station-day scan driver

use tracing::{debug, error, info};

use crate::config::MetricsConfig;
use crate::data::MetricData;
use crate::db::MetricStore;
use crate::error::ScanError;
use crate::metrics::{
    CoherenceMetric, Metric, MetricContext, NlnmDeviationMetric, PowerBand, StationDay,
    StationMetric,
};
use crate::psd::CrossPowerCache;

/// Runs every configured metric over one station-day.
///
/// One cross-power cache is handed from metric to metric so a PSD computed
/// for the deviation metric is reused by coherence. Metric failures are
/// confined: a failing metric is logged and the scan continues with the
/// next one. Failed inserts leave the in-memory result intact for the
/// caller to retry.
pub struct Scanner<'a> {
    store: &'a MetricStore,
    force_update: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(store: &'a MetricStore, force_update: bool) -> Self {
        Self {
            store,
            force_update,
        }
    }

    /// Process all metrics for the station-day. Returns the number of
    /// channel values stored.
    pub fn scan(
        &self,
        day: &StationDay,
        data: &MetricData,
        metrics: &mut [StationMetric],
    ) -> usize {
        info!("scanning {} {}", day.station, day.date);

        let mut cache = CrossPowerCache::new();
        let mut stored = 0;

        for metric in metrics.iter_mut() {
            let name = metric.name();
            debug!("running metric {}", name);
            metric.bind(day);

            let mut ctx = MetricContext {
                data,
                cross_powers: &mut cache,
                store: self.store,
                force_update: self.force_update,
            };
            if let Err(e) = metric.process(&mut ctx) {
                error!("metric {} failed: {}", name, e);
                continue;
            }

            let Some(result) = metric.result() else {
                continue;
            };
            if result.is_empty() {
                debug!("metric {} produced no values", name);
                continue;
            }

            match self.store.insert_metric_data(result) {
                Ok(n) => {
                    stored += n;
                    info!("{}: stored {} channel value(s)", name, n);
                }
                Err(e) => {
                    error!(
                        "{}: insert failed, result kept in memory for retry: {}",
                        name, e
                    );
                }
            }
        }

        info!(
            "scan of {} {} complete: {} value(s) stored, {} cross power(s) computed",
            day.station,
            day.date,
            stored,
            cache.len()
        );
        stored
    }
}

/// Instantiate the metric list from configuration, one metric per
/// (kind, band) combination.
pub fn build_metrics(cfg: &MetricsConfig) -> Result<Vec<StationMetric>, ScanError> {
    let mut metrics = Vec::new();

    if cfg.nlnm_deviation.enabled {
        for band in &cfg.nlnm_deviation.bands {
            let mut metric = NlnmDeviationMetric::new(PowerBand::new(band[0], band[1]));
            metric.set_argument(
                "nlnm-modelfile",
                &cfg.nlnm_deviation.nlnm_model.to_string_lossy(),
            )?;
            if let Some(nhnm) = &cfg.nlnm_deviation.nhnm_model {
                metric.set_argument("nhnm-modelfile", &nhnm.to_string_lossy())?;
            }
            metrics.push(StationMetric::NlnmDeviation(metric));
        }
    }

    if cfg.coherence.enabled {
        for band in &cfg.coherence.bands {
            for pair in &cfg.coherence.pairs {
                let mut metric = CoherenceMetric::new(PowerBand::new(band[0], band[1]));
                metric.set_argument("channel-x", &pair[0])?;
                metric.set_argument("channel-y", &pair[1])?;
                metrics.push(StationMetric::Coherence(metric));
            }
        }
    }

    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataSet;
    use crate::metadata::{
        Channel, ChannelKey, ChannelMeta, ResponseStage, Station, StationMeta,
        UNITS_ACCELERATION,
    };
    use chrono::{NaiveDate, TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rustfft::num_complex::Complex64;

    const NSAMP: usize = 4096;

    fn noise(seed: u64) -> Vec<i32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..NSAMP).map(|_| rng.gen_range(-1000..1000)).collect()
    }

    fn station_day(mutate: Option<(usize, i32)>) -> (StationDay, MetricData) {
        let station = Station::new("IU", "ANMO");
        let date = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let epoch = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        let mut meta = StationMeta::new(station.clone(), date);
        let mut data_sets = Vec::new();
        for (i, loc) in ["00", "10"].iter().enumerate() {
            let mut chan = ChannelMeta::new(ChannelKey::new(loc, "LHZ"), &station, epoch);
            chan.sample_rate = 1.0;
            chan.add_stage(0, ResponseStage::sensitivity(1.0, 0.02));
            chan.add_stage(
                1,
                ResponseStage::pole_zero(
                    'A',
                    1.0,
                    0.02,
                    UNITS_ACCELERATION,
                    1.0,
                    vec![Complex64::new(-1.0, 0.0)],
                    vec![],
                ),
            );
            chan.add_stage(2, ResponseStage::digital(1.0, 0.0, 1.0, 1.0));
            meta.add_channel(chan);

            let mut samples = noise(i as u64 + 1);
            if i == 0 {
                if let Some((idx, value)) = mutate {
                    samples[idx] = value;
                }
            }
            data_sets.push((Channel::new(loc, "LHZ"), samples));
        }

        let mut data = MetricData::new(meta);
        for (channel, samples) in data_sets {
            data.add_channel_data(&channel, vec![DataSet::new(0, 1_000_000, samples)]);
        }
        (StationDay { station, date }, data)
    }

    fn test_metrics(model_path: &std::path::Path) -> Vec<StationMetric> {
        let mut deviation = NlnmDeviationMetric::new(PowerBand::new(20.0, 50.0));
        deviation
            .set_argument("nlnm-modelfile", &model_path.to_string_lossy())
            .unwrap();
        let mut coherence = CoherenceMetric::new(PowerBand::new(20.0, 50.0));
        coherence.set_argument("channel-x", "00,LHZ").unwrap();
        coherence.set_argument("channel-y", "10,LHZ").unwrap();
        vec![
            StationMetric::NlnmDeviation(deviation),
            StationMetric::Coherence(coherence),
        ]
    }

    fn flat_model_file(tag: &str) -> std::path::PathBuf {
        let path =
            std::env::temp_dir().join(format!("seismoscan-scan-{}-{}", std::process::id(), tag));
        let body: String = (1..=10)
            .map(|i| format!("{:.1} -160.0\n", i as f64 * 10.0))
            .collect();
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn second_pass_on_identical_inputs_skips_everything() {
        let store = MetricStore::open_in_memory().unwrap();
        let model = flat_model_file("idempotent");
        let (day, data) = station_day(None);

        let scanner = Scanner::new(&store, false);
        let first = scanner.scan(&day, &data, &mut test_metrics(&model));
        // 2 deviation channels + 1 coherence pair
        assert_eq!(first, 3);

        let second = scanner.scan(&day, &data, &mut test_metrics(&model));
        assert_eq!(second, 0);

        std::fs::remove_file(model).ok();
    }

    #[test]
    fn mutating_one_sample_recomputes_only_that_channel() {
        let store = MetricStore::open_in_memory().unwrap();
        let model = flat_model_file("mutate");
        let station = Station::new("IU", "ANMO");
        let date = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();

        let scanner = Scanner::new(&store, false);
        let (day, data) = station_day(None);
        scanner.scan(&day, &data, &mut test_metrics(&model));

        let deviation_name = "NLNMDeviationMetric:v1:20-50";
        let before_00 = store
            .get_metric_value_digest(date, deviation_name, &station, "00,LHZ")
            .unwrap()
            .unwrap();
        let before_10 = store
            .get_metric_value_digest(date, deviation_name, &station, "10,LHZ")
            .unwrap()
            .unwrap();

        // one-sample mutation on 00-LHZ only
        let (day, data) = station_day(Some((1000, 123_456)));
        let stored = scanner.scan(&day, &data, &mut test_metrics(&model));
        // 00-LHZ deviation + the coherence pair (it includes 00-LHZ)
        assert_eq!(stored, 2);

        let after_00 = store
            .get_metric_value_digest(date, deviation_name, &station, "00,LHZ")
            .unwrap()
            .unwrap();
        let after_10 = store
            .get_metric_value_digest(date, deviation_name, &station, "10,LHZ")
            .unwrap()
            .unwrap();
        assert_ne!(before_00, after_00);
        assert_eq!(before_10, after_10);

        std::fs::remove_file(model).ok();
    }

    #[test]
    fn forced_scan_recomputes_unchanged_inputs() {
        let store = MetricStore::open_in_memory().unwrap();
        let model = flat_model_file("forced");
        let (day, data) = station_day(None);

        Scanner::new(&store, false).scan(&day, &data, &mut test_metrics(&model));
        let again = Scanner::new(&store, true).scan(&day, &data, &mut test_metrics(&model));
        assert_eq!(again, 3);

        std::fs::remove_file(model).ok();
    }

    #[test]
    fn build_metrics_expands_bands_and_pairs() {
        let cfg = crate::config::MetricsConfig::default();
        let metrics = build_metrics(&cfg).unwrap();
        assert_eq!(
            metrics.len(),
            cfg.nlnm_deviation.bands.len() + cfg.coherence.bands.len() * cfg.coherence.pairs.len()
        );
    }
}
