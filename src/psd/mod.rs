// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/seismoscan-rs

//! Cross-power engine - smoothed, response-deconvolved one-sided PSD
//!
//! Peterson's algorithm over one day of data: 13 segments with 75% overlap,
//! detrend + debias + 10% cosine taper per segment, zero-padded FFT,
//! Bendat & Piersol one-sided normalization, acceleration response removal
//! and an 11-bin boxcar smooth across frequency.

use std::collections::HashMap;
use std::rc::Rc;

use rustfft::num_complex::Complex64;
use tracing::{debug, warn};

use crate::data::MetricData;
use crate::error::ScanError;
use crate::metadata::{Channel, ChannelKey, ResponseUnits};
use crate::timeseries::{costaper, debias, detrend, fft2};

const TAPER_WIDTH: f64 = 0.10;
const NSMOOTH: usize = 11;
const NHALF: usize = NSMOOTH / 2;

/// A one-sided cross-power spectral density and its frequency spacing.
#[derive(Debug, Clone)]
pub struct CrossPower {
    pub spectrum: Vec<f64>,
    pub df: f64,
}

/// Cache key: the unordered channel pair, stored in canonical
/// (lexicographic) order so `(A,B)` and `(B,A)` collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CrossPowerKey {
    a: ChannelKey,
    b: ChannelKey,
}

impl CrossPowerKey {
    pub fn new(x: &Channel, y: &Channel) -> Self {
        let (a, b) = if x.key() <= y.key() { (x, y) } else { (y, x) };
        Self {
            a: a.key().clone(),
            b: b.key().clone(),
        }
    }
}

/// Memoized cross-power results for one station-day metric pass.
#[derive(Default)]
pub struct CrossPowerCache {
    map: HashMap<CrossPowerKey, Rc<CrossPower>>,
}

impl CrossPowerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cross power for the pair, computed once per unordered pair.
    pub fn get(
        &mut self,
        x: &Channel,
        y: &Channel,
        data: &MetricData,
    ) -> Result<Rc<CrossPower>, ScanError> {
        let key = CrossPowerKey::new(x, y);
        if let Some(cached) = self.map.get(&key) {
            debug!("cross power cache hit for {} x {}", x, y);
            return Ok(Rc::clone(cached));
        }
        // compute in canonical order so the entry is query-order independent
        let (a, b) = if x.key() <= y.key() { (x, y) } else { (y, x) };
        let computed = Rc::new(compute_cross_power(a, b, data)?);
        self.map.insert(key, Rc::clone(&computed));
        Ok(computed)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Compute the smoothed, deconvolved cross-power spectrum of a channel pair.
pub fn compute_cross_power(
    x: &Channel,
    y: &Channel,
    data: &MetricData,
) -> Result<CrossPower, ScanError> {
    debug!("computing cross power for {} x {}", x, y);

    let (xdata, ydata) = data.channel_overlap(x, y)?;
    let ndata = xdata.len().min(ydata.len());
    if ndata < 16 {
        return Err(ScanError::MissingData(format!(
            "overlap of {x} and {y} holds only {ndata} samples"
        )));
    }

    let srate_x = data
        .sample_rate(x)
        .ok_or_else(|| ScanError::MissingData(x.to_string()))?;
    let srate_y = data
        .sample_rate(y)
        .ok_or_else(|| ScanError::MissingData(y.to_string()))?;
    if srate_x != srate_y {
        return Err(ScanError::SampleRateMismatch {
            x: srate_x,
            y: srate_y,
        });
    }
    if srate_x <= 0.0 {
        return Err(ScanError::MissingData(format!("{x} has zero sample rate")));
    }
    let dt = 1.0 / srate_x;

    // 13 segments with 75% overlap over the day
    let nseg = ndata / 4;
    let noff = (nseg / 4).max(1);
    let nfft = nseg.next_power_of_two();
    let nf = nfft / 2 + 1;
    let df = 1.0 / (nfft as f64 * dt);

    let mut acc = vec![Complex64::new(0.0, 0.0); nf];
    let mut wss = 0.0;
    let mut nwin = 0usize;
    let mut offset = 0usize;

    while offset + nseg <= ndata {
        let mut xseg = xdata[offset..offset + nseg].to_vec();
        let mut yseg = ydata[offset..offset + nseg].to_vec();

        detrend(&mut xseg);
        detrend(&mut yseg);
        debias(&mut xseg);
        debias(&mut yseg);
        costaper(&mut xseg, TAPER_WIDTH);
        wss = costaper(&mut yseg, TAPER_WIDTH);

        let xfft = fft2(&xseg);
        let yfft = fft2(&yseg);
        for k in 0..nf {
            acc[k] += xfft[k] * yfft[k].conj();
        }

        nwin += 1;
        offset += noff;
    }

    // Normalize to (time series)^2 / Hz, correcting for taper power loss
    let window_correction = wss / nseg as f64;
    if window_correction <= 0.0 {
        warn!("taper window sum of squares is zero for {} x {}", x, y);
    }
    let normalization = 2.0 * dt / nfft as f64 / window_correction / nwin as f64;
    for v in &mut acc {
        *v *= normalization;
    }

    // Remove the acceleration instrument response, skipping DC
    let freqs: Vec<f64> = (0..nf).map(|k| k as f64 * df).collect();
    let meta = data.station_meta();
    let resp_x = meta
        .channel_meta(x)
        .ok_or_else(|| ScanError::MissingMetadata(x.to_string()))?
        .response(&freqs, ResponseUnits::Acceleration)?;
    let resp_y = meta
        .channel_meta(y)
        .ok_or_else(|| ScanError::MissingMetadata(y.to_string()))?
        .response(&freqs, ResponseUnits::Acceleration)?;

    acc[0] = Complex64::new(0.0, 0.0);
    for k in 1..nf {
        let response = resp_x[k] * resp_y[k].conj();
        if response.norm() == 0.0 {
            return Err(ScanError::ZeroResponse(k));
        }
        acc[k] /= response;
    }

    // Boxcar smooth across frequency; boundary bins keep the raw value
    let mut smoothed = acc.clone();
    if nf > NSMOOTH {
        for iw in NHALF..nf - NHALF {
            let sum: Complex64 = acc[iw - NHALF..=iw + NHALF].iter().sum();
            smoothed[iw] = sum / NSMOOTH as f64;
        }
    }

    let mut spectrum: Vec<f64> = smoothed.iter().map(|c| c.norm()).collect();
    spectrum[0] = 0.0;

    Ok(CrossPower { spectrum, df })
}
