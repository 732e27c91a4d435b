// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/seismoscan-rs

//! Noise-model deviation metric
//!
//! Per channel: band-limited mean difference, in dB, between the day's
//! response-corrected PSD and a reference noise model (Peterson's NLNM).

use std::path::Path;

use tracing::{debug, info, warn};

use super::{
    Metric, MetricContext, MetricCore, PowerBand, StationDay,
};
use crate::error::ScanError;
use crate::metadata::Channel;
use crate::timeseries::interpolate;

/// A reference noise model: `(period_s, power_dB)` pairs in ascending
/// period order.
#[derive(Debug, Clone)]
pub struct NoiseModel {
    periods: Vec<f64>,
    powers: Vec<f64>,
}

impl NoiseModel {
    /// Parse a whitespace-separated two-column model table.
    ///
    /// Any line with a field count other than two, or an unparseable field,
    /// is fatal. `origin` names the source in the error.
    pub fn parse(text: &str, origin: &str) -> Result<Self, ScanError> {
        let mut periods = Vec::new();
        let mut powers = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 2 {
                return Err(ScanError::MalformedModel {
                    path: origin.to_string(),
                    line: idx + 1,
                    fields: fields.len(),
                });
            }
            let malformed = || ScanError::MalformedModel {
                path: origin.to_string(),
                line: idx + 1,
                fields: fields.len(),
            };
            periods.push(fields[0].parse::<f64>().map_err(|_| malformed())?);
            powers.push(fields[1].parse::<f64>().map_err(|_| malformed())?);
        }

        Ok(Self { periods, powers })
    }

    pub fn load(path: &Path) -> Result<Self, ScanError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, &path.to_string_lossy())
    }

    pub fn periods(&self) -> &[f64] {
        &self.periods
    }

    pub fn powers(&self) -> &[f64] {
        &self.powers
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }
}

/// Deviation of each LH channel's PSD from the low-noise model, averaged
/// over the configured power band.
pub struct NlnmDeviationMetric {
    core: MetricCore,
    band: PowerBand,
}

impl NlnmDeviationMetric {
    pub fn new(band: PowerBand) -> Self {
        let mut core = MetricCore::default();
        core.args.declare("nlnm-modelfile");
        core.args.declare("nhnm-modelfile");
        Self { core, band }
    }

    pub fn set_argument(&mut self, name: &str, value: &str) -> Result<(), ScanError> {
        self.core.args.set(name, value)
    }
}

impl Metric for NlnmDeviationMetric {
    fn base_name(&self) -> &'static str {
        "NLNMDeviationMetric"
    }

    fn version(&self) -> u32 {
        1
    }

    fn name(&self) -> String {
        format!("{}:v{}:{}", self.base_name(), self.version(), self.band)
    }

    fn bind(&mut self, day: &StationDay) {
        let name = self.name();
        self.core.bind(day, name);
    }

    fn process(&mut self, ctx: &mut MetricContext<'_>) -> Result<(), ScanError> {
        let name = self.name();

        let model = match self.core.args.get("nlnm-modelfile")? {
            Some(path) => NoiseModel::load(Path::new(path))?,
            None => {
                info!("{}: no low-noise model configured, skipping", name);
                return Ok(());
            }
        };
        if let Some(path) = self.core.args.get("nhnm-modelfile")? {
            let high = NoiseModel::load(Path::new(path))?;
            debug!("{}: high-noise model holds {} periods", name, high.len());
        }

        let channels = ctx.meta().channels_with_prefix("LH");
        if channels.is_empty() {
            info!("{}: no LH channels in metadata", name);
        }

        for channel in channels {
            let id = self.core.identifier(channel.id());
            let digest = match ctx.value_digest_changed(&[&channel], &id) {
                Ok(Some(digest)) => digest,
                Ok(None) => {
                    debug!("{}: {} unchanged, skipping", name, channel);
                    continue;
                }
                Err(e) if e.is_soft_skip() => {
                    info!("{}: {} skipped: {}", name, channel, e);
                    continue;
                }
                Err(e) => {
                    warn!("{}: digest for {} failed: {}", name, channel, e);
                    continue;
                }
            };

            match compute_deviation(&channel, ctx, &model, self.band) {
                Ok(Some(value)) => {
                    self.core.result_mut().add_result(channel.id(), value, digest);
                }
                Ok(None) => {}
                Err(e) => warn!("{}: channel {} failed: {}", name, channel, e),
            }
        }

        Ok(())
    }

    fn result(&self) -> Option<&super::MetricResult> {
        self.core.result()
    }
}

/// Band-limited mean of `psd_dB(T) - model_dB(T)` over the model's periods.
///
/// Returns `None` when the band lies outside the channel's usable period
/// range; a band holding no model period at all is an error.
fn compute_deviation(
    channel: &Channel,
    ctx: &mut MetricContext<'_>,
    model: &NoiseModel,
    band: PowerBand,
) -> Result<Option<f64>, ScanError> {
    let cross_power = ctx.cross_power(channel, channel)?;
    let psd = &cross_power.spectrum;
    let df = cross_power.df;
    let nf = psd.len();
    if nf < 2 {
        return Err(ScanError::MissingData(format!(
            "degenerate spectrum for {channel}"
        )));
    }

    // Flip the frequency axis to periods, dropping DC: per[0] is the
    // shortest period (Nyquist), per[nf-2] the longest (1/df).
    let mut periods = Vec::with_capacity(nf - 1);
    let mut psd_db = Vec::with_capacity(nf - 1);
    for k in 0..nf - 1 {
        let freq = (nf - 1 - k) as f64 * df;
        periods.push(1.0 / freq);
        psd_db.push(10.0 * psd[nf - 1 - k].log10());
    }
    let t_min = periods[0];
    let t_max = periods[nf - 2];

    if !band.usable(t_min, t_max) {
        warn!(
            "band [{}] s outside usable range [{:.3} - {:.3}] s for {}, skipping",
            band, t_min, t_max, channel
        );
        return Ok(None);
    }

    let interp = interpolate(&periods, &psd_db, model.periods());

    let mut sum = 0.0;
    let mut n_periods = 0usize;
    for (k, &period) in model.periods().iter().enumerate() {
        if period > band.high {
            break;
        }
        if period >= band.low {
            sum += interp[k] - model.powers()[k];
            n_periods += 1;
        }
    }

    if n_periods == 0 {
        return Err(ScanError::EmptyBand {
            low: band.low,
            high: band.high,
        });
    }

    Ok(Some(sum / n_periods as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataSet, MetricData};
    use crate::db::MetricStore;
    use crate::metadata::{
        ChannelKey, ChannelMeta, ResponseStage, Station, StationMeta, UNITS_ACCELERATION,
    };
    use crate::psd::CrossPowerCache;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};
    use rustfft::num_complex::Complex64;

    fn write_temp_model(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("seismoscan-{}-{}", std::process::id(), name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn flat_model(level: f64) -> String {
        (1..=10)
            .map(|i| format!("{:.1} {:.1}\n", i as f64 * 10.0, level))
            .collect()
    }

    fn gaussian_day(seed: u64, n: usize) -> Vec<i32> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1000.0).unwrap();
        (0..n).map(|_| normal.sample(&mut rng) as i32).collect()
    }

    fn station_day(samples: Vec<i32>) -> (StationDay, MetricData) {
        let station = Station::new("IU", "ANMO");
        let date = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let epoch = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        let mut meta = StationMeta::new(station.clone(), date);
        let mut chan = ChannelMeta::new(ChannelKey::new("00", "LHZ"), &station, epoch);
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

        let mut data = MetricData::new(meta);
        data.add_channel_data(
            &Channel::new("00", "LHZ"),
            vec![DataSet::new(0, 1_000_000, samples)],
        );
        (StationDay { station, date }, data)
    }

    #[test]
    fn model_parse_accepts_two_columns() {
        let model = NoiseModel::parse("0.1 -168.0\n10.0 -163.75\n", "inline").unwrap();
        assert_eq!(model.len(), 2);
        assert_eq!(model.periods(), &[0.1, 10.0]);
        assert_eq!(model.powers(), &[-168.0, -163.75]);
    }

    #[test]
    fn model_parse_rejects_three_fields() {
        let err = NoiseModel::parse("0.1 -168.0\n1.0 -170.0 extra\n", "inline").unwrap_err();
        match err {
            ScanError::MalformedModel { line, fields, .. } => {
                assert_eq!(line, 2);
                assert_eq!(fields, 3);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn model_parse_rejects_non_numeric_fields() {
        assert!(matches!(
            NoiseModel::parse("0.1 quiet\n", "inline"),
            Err(ScanError::MalformedModel { .. })
        ));
    }

    #[test]
    fn deviation_of_gaussian_day_is_finite_and_reproducible() {
        let store = MetricStore::open_in_memory().unwrap();
        let model_path = write_temp_model("flat-model.asc", &flat_model(-160.0));

        let run = || {
            let (day, data) = station_day(gaussian_day(2026, 86_400));
            let mut metric = NlnmDeviationMetric::new(PowerBand::new(20.0, 50.0));
            metric
                .set_argument("nlnm-modelfile", &model_path.to_string_lossy())
                .unwrap();
            metric.bind(&day);
            let mut cache = CrossPowerCache::new();
            let mut ctx = MetricContext {
                data: &data,
                cross_powers: &mut cache,
                store: &store,
                force_update: true,
            };
            metric.process(&mut ctx).unwrap();
            metric.result().unwrap().value("00,LHZ").unwrap()
        };

        let first = run();
        assert!(first.is_finite());
        // fixed seed + fixed FFT: bit-exact reproduction
        assert_eq!(first, run());

        std::fs::remove_file(model_path).ok();
    }

    #[test]
    fn band_with_no_model_periods_is_empty_band() {
        let store = MetricStore::open_in_memory().unwrap();
        let (_, data) = station_day(gaussian_day(7, 86_400));
        let mut cache = CrossPowerCache::new();
        let mut ctx = MetricContext {
            data: &data,
            cross_powers: &mut cache,
            store: &store,
            force_update: true,
        };

        // model periods all outside [20, 50] s, band itself usable
        let model = NoiseModel::parse("5.0 -160.0\n500.0 -160.0\n", "inline").unwrap();
        let err = compute_deviation(
            &Channel::new("00", "LHZ"),
            &mut ctx,
            &model,
            PowerBand::new(20.0, 50.0),
        )
        .unwrap_err();
        assert!(matches!(err, ScanError::EmptyBand { .. }));
    }

    #[test]
    fn band_outside_usable_range_is_no_result() {
        let store = MetricStore::open_in_memory().unwrap();
        let (_, data) = station_day(gaussian_day(9, 86_400));
        let mut cache = CrossPowerCache::new();
        let mut ctx = MetricContext {
            data: &data,
            cross_powers: &mut cache,
            store: &store,
            force_update: true,
        };

        let model = NoiseModel::parse(&flat_model(-160.0), "inline").unwrap();
        // 1 Hz data: periods below 2 s are unusable
        let out = compute_deviation(
            &Channel::new("00", "LHZ"),
            &mut ctx,
            &model,
            PowerBand::new(0.1, 50.0),
        )
        .unwrap();
        assert_eq!(out, None);
    }

    #[test]
    fn malformed_model_file_fails_the_metric() {
        let store = MetricStore::open_in_memory().unwrap();
        let model_path = write_temp_model("bad-model.asc", "10.0 -160.0\n20.0 -160.0 oops\n");

        let (day, data) = station_day(gaussian_day(3, 86_400));
        let mut metric = NlnmDeviationMetric::new(PowerBand::new(20.0, 50.0));
        metric
            .set_argument("nlnm-modelfile", &model_path.to_string_lossy())
            .unwrap();
        metric.bind(&day);
        let mut cache = CrossPowerCache::new();
        let mut ctx = MetricContext {
            data: &data,
            cross_powers: &mut cache,
            store: &store,
            force_update: true,
        };
        assert!(matches!(
            metric.process(&mut ctx),
            Err(ScanError::MalformedModel { .. })
        ));

        std::fs::remove_file(model_path).ok();
    }

    #[test]
    fn missing_model_argument_skips_quietly() {
        let store = MetricStore::open_in_memory().unwrap();
        let (day, data) = station_day(vec![0; 86_400]);
        let mut metric = NlnmDeviationMetric::new(PowerBand::new(20.0, 50.0));
        metric.bind(&day);
        let mut cache = CrossPowerCache::new();
        let mut ctx = MetricContext {
            data: &data,
            cross_powers: &mut cache,
            store: &store,
            force_update: true,
        };
        metric.process(&mut ctx).unwrap();
        assert!(metric.result().unwrap().is_empty());
    }

    #[test]
    fn unknown_argument_is_rejected() {
        let mut metric = NlnmDeviationMetric::new(PowerBand::new(20.0, 50.0));
        assert!(matches!(
            metric.set_argument("model", "x"),
            Err(ScanError::UnknownArgument(_))
        ));
    }
}
