// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/seismoscan-rs

//! Demo-mode station-day synthesis
//!
//! Builds a full synthetic station-day so the pipeline can run end-to-end
//! without a waveform archive: six LH channels of seeded Gaussian noise at
//! 1 Hz behind an STS-2-like three-stage response.

use chrono::{NaiveDate, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rustfft::num_complex::Complex64;
use tracing::info;

use crate::config::Config;
use crate::data::{DataSet, MetricData};
use crate::metadata::{
    Channel, ChannelKey, ChannelMeta, ResponseStage, Station, StationMeta, UNITS_VELOCITY,
};
use crate::metrics::StationDay;

const SAMPLE_RATE: f64 = 1.0;
const SAMPLES_PER_DAY: usize = 86_400;

/// STS-2-like velocity-input pole-zero stage.
fn sts2_stage() -> ResponseStage {
    ResponseStage::pole_zero(
        'A',
        1500.0,
        0.02,
        UNITS_VELOCITY,
        3.468_4e17,
        vec![
            Complex64::new(-0.037_008, 0.037_008),
            Complex64::new(-0.037_008, -0.037_008),
            Complex64::new(-251.33, 0.0),
            Complex64::new(-131.04, 467.29),
            Complex64::new(-131.04, -467.29),
        ],
        vec![Complex64::new(0.0, 0.0), Complex64::new(0.0, 0.0)],
    )
}

fn demo_channel_meta(station: &Station, location: &str, code: &str) -> ChannelMeta {
    let epoch = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let mut meta = ChannelMeta::new(ChannelKey::new(location, code), station, epoch);
    meta.sample_rate = SAMPLE_RATE;
    meta.instrument_type = "STS-2".to_string();
    meta.channel_flags = "CG".to_string();
    meta.dip = if code.ends_with('Z') { -90.0 } else { 0.0 };
    meta.add_stage(0, ResponseStage::sensitivity(1500.0 * 419_430.0, 0.02));
    meta.add_stage(1, sts2_stage());
    meta.add_stage(2, ResponseStage::digital(419_430.0, 0.0, SAMPLE_RATE, 1.0));
    meta
}

fn gaussian_samples(seed: u64, n: usize) -> Vec<i32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1000.0).expect("valid distribution parameters");
    (0..n).map(|_| normal.sample(&mut rng) as i32).collect()
}

/// Synthesize one station-day for the configured station.
pub fn demo_station_day(config: &Config, date: NaiveDate) -> (StationDay, MetricData) {
    let station = Station::new(&config.station.network, &config.station.name);
    info!(
        "demo mode: synthesizing {} {} ({} channels at {} Hz)",
        station, date, 6, SAMPLE_RATE
    );

    let mut meta = StationMeta::new(station.clone(), date);
    for location in ["00", "10"] {
        for code in ["LHZ", "LH1", "LH2"] {
            meta.add_channel(demo_channel_meta(&station, location, code));
        }
    }

    let start_us = date
        .and_hms_opt(0, 0, 0)
        .expect("midnight exists")
        .and_utc()
        .timestamp_micros();
    let interval_us = (1.0e6 / SAMPLE_RATE) as i64;

    let mut data = MetricData::new(meta);
    let mut channel_index = 0u64;
    for location in ["00", "10"] {
        for code in ["LHZ", "LH1", "LH2"] {
            let samples = gaussian_samples(
                config.scan.demo_seed.wrapping_add(channel_index),
                SAMPLES_PER_DAY,
            );
            data.add_channel_data(
                &Channel::new(location, code),
                vec![DataSet::new(start_us, interval_us, samples)],
            );
            channel_index += 1;
        }
    }

    (StationDay { station, date }, data)
}
