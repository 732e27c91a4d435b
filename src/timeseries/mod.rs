// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/seismoscan-rs

//! Numerics kernel - detrend, taper, interpolation, one-sided FFT

use std::f64::consts::PI;

use rustfft::{num_complex::Complex64, FftPlanner};

/// Remove the best-fit least-squares line in place.
pub fn detrend(data: &mut [f64]) {
    let n = data.len();
    if n < 2 {
        return;
    }
    let nf = n as f64;
    let xbar = (nf - 1.0) / 2.0;
    let ybar = data.iter().sum::<f64>() / nf;

    let mut sxy = 0.0;
    for (i, &y) in data.iter().enumerate() {
        sxy += (i as f64 - xbar) * (y - ybar);
    }
    // sum of (i - xbar)^2 for i = 0..n-1
    let sxx = nf * (nf * nf - 1.0) / 12.0;
    let slope = sxy / sxx;
    let intercept = ybar - slope * xbar;

    for (i, y) in data.iter_mut().enumerate() {
        *y -= intercept + slope * i as f64;
    }
}

/// Subtract the arithmetic mean in place.
pub fn debias(data: &mut [f64]) {
    if data.is_empty() {
        return;
    }
    let mean = data.iter().sum::<f64>() / data.len() as f64;
    for y in data.iter_mut() {
        *y -= mean;
    }
}

/// Apply a cosine taper with ramp fraction `width` (0 < width <= 0.5) to each
/// end of the sequence and return the window sum of squares.
///
/// The half-cosine ramp covers the first and last `floor(width * n) + 1`
/// samples. For `width = 0.10` the returned sum is about `0.875 * n`, the
/// factor later used to correct the power lost to the taper.
pub fn costaper(data: &mut [f64], width: f64) -> f64 {
    let n = data.len();
    if n == 0 {
        return 0.0;
    }
    let m = (width * n as f64).floor() as usize;
    if m == 0 {
        return n as f64;
    }

    let mut wss = 0.0;
    for i in 0..n {
        let w = if i <= m {
            0.5 * (1.0 - (PI * i as f64 / m as f64).cos())
        } else if i >= n - 1 - m {
            0.5 * (1.0 - (PI * (n - 1 - i) as f64 / m as f64).cos())
        } else {
            1.0
        };
        data[i] *= w;
        wss += w * w;
    }
    wss
}

/// Linear interpolation of `(x, y)` onto the target abscissa `xi`.
///
/// Both `x` and `xi` must be monotonically increasing. Targets outside the
/// source range clamp to the nearest endpoint value.
pub fn interpolate(x: &[f64], y: &[f64], xi: &[f64]) -> Vec<f64> {
    assert_eq!(x.len(), y.len(), "abscissa/ordinate length mismatch");
    let mut out = Vec::with_capacity(xi.len());
    if x.is_empty() {
        out.resize(xi.len(), 0.0);
        return out;
    }

    for &t in xi {
        if t <= x[0] {
            out.push(y[0]);
            continue;
        }
        if t >= x[x.len() - 1] {
            out.push(y[y.len() - 1]);
            continue;
        }
        // first index with x[idx] >= t; t is strictly inside the range here
        let idx = x.partition_point(|&v| v < t);
        let (x0, x1) = (x[idx - 1], x[idx]);
        let (y0, y1) = (y[idx - 1], y[idx]);
        let frac = (t - x0) / (x1 - x0);
        out.push(y0 + frac * (y1 - y0));
    }
    out
}

/// Forward FFT of a real sequence, returning the one-sided spectrum.
///
/// The input is zero-padded to the next power of two `nfft`; the result holds
/// the `nfft / 2 + 1` non-negative-frequency bins including DC and Nyquist.
pub fn fft2(data: &[f64]) -> Vec<Complex64> {
    let nfft = data.len().next_power_of_two().max(1);

    let mut buffer: Vec<Complex64> = data.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    buffer.resize(nfft, Complex64::new(0.0, 0.0));

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(nfft);
    fft.process(&mut buffer);

    buffer.truncate(nfft / 2 + 1);
    buffer
}
