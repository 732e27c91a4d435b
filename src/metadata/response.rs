// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/seismoscan-rs

//! Cascaded channel response - stage variants and frequency evaluation

use std::f64::consts::PI;

use rustfft::num_complex::Complex64;
use tracing::{error, warn};

use super::ChannelMeta;
use crate::error::ScanError;

/// SEED unit codes for response inputs and outputs.
pub const UNITS_UNKNOWN: u32 = 0;
pub const UNITS_DISPLACEMENT: u32 = 1;
pub const UNITS_VELOCITY: u32 = 2;
pub const UNITS_ACCELERATION: u32 = 3;

/// Output units requested from a response evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseUnits {
    /// Whatever units the dataless epoch declares; no conversion.
    Native,
    Displacement,
    Velocity,
    Acceleration,
}

impl ResponseUnits {
    fn code(self) -> i32 {
        match self {
            ResponseUnits::Native => 0,
            ResponseUnits::Displacement => 1,
            ResponseUnits::Velocity => 2,
            ResponseUnits::Acceleration => 3,
        }
    }
}

/// The stage-specific payload of a response stage.
#[derive(Debug, Clone)]
pub enum StageKind {
    /// Analog rational response from blockette B053.
    PoleZero {
        /// `'A'` for rad/s (s = j 2 pi f), `'B'` for Hz (s = j f).
        transfer_type: char,
        normalization: f64,
        poles: Vec<Complex64>,
        zeros: Vec<Complex64>,
    },
    /// Polynomial sensor response from blockette B062 (e.g. mass position).
    Polynomial {
        lower_bound: f64,
        upper_bound: f64,
        coefficients: Vec<f64>,
    },
    /// Digital stage from blockette B054, or a bare-gain B058 stage.
    Digital {
        input_sample_rate: f64,
        decimation: f64,
    },
}

impl StageKind {
    /// Single-byte tag mixed into the metadata digest.
    pub fn type_tag(&self) -> u8 {
        match self {
            StageKind::PoleZero { transfer_type, .. } => *transfer_type as u8,
            StageKind::Polynomial { .. } => b'P',
            StageKind::Digital { .. } => b'D',
        }
    }
}

/// One stage of a cascaded channel response.
#[derive(Debug, Clone)]
pub struct ResponseStage {
    pub gain: f64,
    pub gain_frequency: f64,
    pub input_units: u32,
    pub output_units: u32,
    pub kind: StageKind,
}

impl ResponseStage {
    /// Pole-zero stage built from a B053 + B058 pair.
    pub fn pole_zero(
        transfer_type: char,
        gain: f64,
        gain_frequency: f64,
        input_units: u32,
        normalization: f64,
        poles: Vec<Complex64>,
        zeros: Vec<Complex64>,
    ) -> Self {
        Self {
            gain,
            gain_frequency,
            input_units,
            output_units: UNITS_UNKNOWN,
            kind: StageKind::PoleZero {
                transfer_type,
                normalization,
                poles,
                zeros,
            },
        }
    }

    /// Polynomial stage built from a B062 + B058 pair.
    pub fn polynomial(
        gain: f64,
        gain_frequency: f64,
        lower_bound: f64,
        upper_bound: f64,
        coefficients: Vec<f64>,
    ) -> Self {
        Self {
            gain,
            gain_frequency,
            input_units: UNITS_UNKNOWN,
            output_units: UNITS_UNKNOWN,
            kind: StageKind::Polynomial {
                lower_bound,
                upper_bound,
                coefficients,
            },
        }
    }

    /// Digital stage built from a B054 + B058 pair.
    pub fn digital(gain: f64, gain_frequency: f64, input_sample_rate: f64, decimation: f64) -> Self {
        Self {
            gain,
            gain_frequency,
            input_units: UNITS_UNKNOWN,
            output_units: UNITS_UNKNOWN,
            kind: StageKind::Digital {
                input_sample_rate,
                decimation,
            },
        }
    }

    /// Bare-gain stage from a lone B058 (stage 0 sensitivity).
    pub fn sensitivity(gain: f64, gain_frequency: f64) -> Self {
        Self::digital(gain, gain_frequency, 0.0, 0.0)
    }
}

impl ChannelMeta {
    /// True when the loaded stages cannot support response correction.
    ///
    /// A seismic channel must carry stages 0, 1 and 2, all with positive
    /// gain. The sensitivity mismatch against `G1 * G2` is checked here and
    /// logged when it exceeds 10%; scaling then falls back to the
    /// sensitivity in [`ChannelMeta::response`].
    pub fn invalid_response(&self) -> bool {
        if self.num_stages() == 0 {
            error!("no response stages loaded for {}", self.key());
            return true;
        }

        if self.channel().is_seismic() {
            if !self.has_stage(0) || !self.has_stage(1) || !self.has_stage(2) {
                error!("stages 0,1,2 not all loaded for {}", self.key());
                return true;
            }
            let g0 = self.stage(0).map(|s| s.gain).unwrap_or(0.0);
            let g1 = self.stage(1).map(|s| s.gain).unwrap_or(0.0);
            let g2 = self.stage(2).map(|s| s.gain).unwrap_or(0.0);
            if g0 <= 0.0 || g1 <= 0.0 || g2 <= 0.0 {
                error!("non-positive stage gain for {}", self.key());
                return true;
            }
            let mismatch = ((g0 - g1 * g2) / g0).abs();
            if mismatch > 0.10 {
                warn!(
                    "{}: sensitivity {} differs from stage1*stage2 {} by {:.1}%",
                    self.key(),
                    g0,
                    g1 * g2,
                    mismatch * 100.0
                );
            }
        }

        false
    }

    /// Evaluate the complex channel response at `freqs`, in `out` units.
    ///
    /// Stage 1 must be a pole-zero stage; the evaluation is
    /// `A0 * prod(s - z) / prod(s - p)` with `s = j 2 pi f` for transfer
    /// type `'A'` and `s = j f` for `'B'`. Unit conversion multiplies by
    /// `(j s f)^n` (differentiation) or `(-j / (s f))^|n|` (integration)
    /// where `n` is the unit-code difference. The result is scaled by
    /// `G1 * G2`, or by the sensitivity `G0` when the mismatch exceeds 10%,
    /// and the DC bin is forced to zero.
    pub fn response(
        &self,
        freqs: &[f64],
        out: ResponseUnits,
    ) -> Result<Vec<Complex64>, ScanError> {
        if self.invalid_response() {
            return Err(ScanError::InvalidResponse(self.key().to_string()));
        }

        let stage1 = self
            .stage(1)
            .ok_or_else(|| ScanError::InvalidResponse(self.key().to_string()))?;

        let (transfer_type, normalization, poles, zeros) = match &stage1.kind {
            StageKind::PoleZero {
                transfer_type,
                normalization,
                poles,
                zeros,
            } => (*transfer_type, *normalization, poles, zeros),
            StageKind::Polynomial { .. } => {
                return Err(ScanError::UnsupportedForPolynomial(self.key().to_string()));
            }
            StageKind::Digital { .. } => {
                return Err(ScanError::InvalidResponse(self.key().to_string()));
            }
        };

        // angular-frequency convention for both the Laplace variable and the
        // integration/differentiation factor
        let s_unit = match transfer_type {
            'A' => 2.0 * PI,
            'B' => 1.0,
            other => return Err(ScanError::UnknownStageType(other)),
        };

        let mut response: Vec<Complex64> = freqs
            .iter()
            .map(|&f| {
                let s = Complex64::new(0.0, s_unit * f);
                let mut num = Complex64::new(normalization, 0.0);
                for z in zeros {
                    num *= s - *z;
                }
                let mut den = Complex64::new(1.0, 0.0);
                for p in poles {
                    den *= s - *p;
                }
                num / den
            })
            .collect();

        if out != ResponseUnits::Native {
            if stage1.input_units == UNITS_UNKNOWN {
                return Err(ScanError::UnknownUnits);
            }
            let n = out.code() - stage1.input_units as i32;
            if n != 0 {
                for (r, &f) in response.iter_mut().zip(freqs) {
                    if f == 0.0 {
                        continue; // DC is forced to zero below
                    }
                    let factor = if n > 0 {
                        Complex64::new(0.0, s_unit * f).powi(n)
                    } else {
                        Complex64::new(0.0, -1.0 / (s_unit * f)).powi(-n)
                    };
                    *r *= factor;
                }
            }
        }

        // Scale by stage1 * stage2 gain, falling back to the sensitivity when
        // the mismatch exceeds 10% (known problem on some Q680 digitizers).
        let g0 = self
            .stage(0)
            .map(|s| s.gain)
            .ok_or_else(|| ScanError::InvalidResponse(self.key().to_string()))?;
        let g1 = stage1.gain;
        let g2 = self
            .stage(2)
            .map(|s| s.gain)
            .ok_or_else(|| ScanError::InvalidResponse(self.key().to_string()))?;

        let mismatch = ((g0 - g1 * g2) / g0).abs();
        let scale = if mismatch > 0.10 {
            warn!(
                "{}: sensitivity != stage1*stage2, using sensitivity to scale",
                self.key()
            );
            g0
        } else {
            g1 * g2
        };
        if scale <= 0.0 {
            warn!("{}: channel response scale <= 0", self.key());
        }

        for r in &mut response {
            *r *= scale;
        }
        if let Some(dc) = response.first_mut() {
            *dc = Complex64::new(0.0, 0.0);
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ChannelKey, Station};
    use chrono::{TimeZone, Utc};

    fn meta_with_input_units(input_units: u32) -> ChannelMeta {
        let station = Station::new("IU", "ANMO");
        let epoch = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut meta = ChannelMeta::new(ChannelKey::new("00", "LHZ"), &station, epoch);
        meta.sample_rate = 1.0;
        meta.add_stage(0, ResponseStage::sensitivity(1.0, 0.02));
        meta.add_stage(
            1,
            ResponseStage::pole_zero(
                'A',
                1.0,
                0.02,
                input_units,
                1.0,
                vec![Complex64::new(-1.0, 0.0)],
                vec![],
            ),
        );
        meta.add_stage(2, ResponseStage::digital(1.0, 0.0, 1.0, 1.0));
        meta
    }

    fn grid() -> Vec<f64> {
        (0..32).map(|k| k as f64 * 0.05).collect()
    }

    #[test]
    fn conversion_composes_one_differentiation_step() {
        let meta = meta_with_input_units(UNITS_VELOCITY);
        let freqs = grid();
        let vel = meta.response(&freqs, ResponseUnits::Velocity).unwrap();
        let acc = meta.response(&freqs, ResponseUnits::Acceleration).unwrap();

        for k in 1..freqs.len() {
            let expected = vel[k] * Complex64::new(0.0, 2.0 * PI * freqs[k]);
            assert!((acc[k] - expected).norm() < 1e-12 * expected.norm().max(1.0));
        }
    }

    #[test]
    fn dc_bin_is_forced_to_zero() {
        let meta = meta_with_input_units(UNITS_ACCELERATION);
        let resp = meta.response(&grid(), ResponseUnits::Acceleration).unwrap();
        assert_eq!(resp[0], Complex64::new(0.0, 0.0));
        assert!(resp[1].norm() > 0.0);
    }

    #[test]
    fn native_units_skip_conversion() {
        let meta = meta_with_input_units(UNITS_UNKNOWN);
        // unknown input units are fine as long as no conversion is requested
        assert!(meta.response(&grid(), ResponseUnits::Native).is_ok());
        assert!(matches!(
            meta.response(&grid(), ResponseUnits::Acceleration),
            Err(ScanError::UnknownUnits)
        ));
    }

    #[test]
    fn unknown_transfer_type_is_rejected() {
        let station = Station::new("IU", "ANMO");
        let epoch = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut meta = ChannelMeta::new(ChannelKey::new("00", "LHZ"), &station, epoch);
        meta.sample_rate = 1.0;
        meta.add_stage(0, ResponseStage::sensitivity(1.0, 0.02));
        meta.add_stage(
            1,
            ResponseStage::pole_zero('C', 1.0, 0.02, 2, 1.0, vec![], vec![]),
        );
        meta.add_stage(2, ResponseStage::digital(1.0, 0.0, 1.0, 1.0));
        assert!(matches!(
            meta.response(&grid(), ResponseUnits::Acceleration),
            Err(ScanError::UnknownStageType('C'))
        ));
    }

    #[test]
    fn polynomial_channel_rejects_frequency_response() {
        let station = Station::new("IU", "ANMO");
        let epoch = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut meta = ChannelMeta::new(ChannelKey::new("00", "VMZ"), &station, epoch);
        meta.sample_rate = 0.1;
        meta.add_stage(
            1,
            ResponseStage::polynomial(1.0, 0.0, -2.5, 2.5, vec![0.0, 1.0]),
        );
        assert!(matches!(
            meta.response(&grid(), ResponseUnits::Acceleration),
            Err(ScanError::UnsupportedForPolynomial(_))
        ));
    }

    #[test]
    fn seismic_channel_missing_stage_is_invalid() {
        let station = Station::new("IU", "ANMO");
        let epoch = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut meta = ChannelMeta::new(ChannelKey::new("00", "LHZ"), &station, epoch);
        meta.sample_rate = 1.0;
        meta.add_stage(0, ResponseStage::sensitivity(1.0, 0.02));
        meta.add_stage(
            1,
            ResponseStage::pole_zero('A', 1.0, 0.02, 2, 1.0, vec![], vec![]),
        );
        assert!(meta.invalid_response());
        assert!(matches!(
            meta.response(&grid(), ResponseUnits::Acceleration),
            Err(ScanError::InvalidResponse(_))
        ));
    }

    #[test]
    fn mismatched_sensitivity_scales_by_stage_zero() {
        let mut meta = meta_with_input_units(UNITS_ACCELERATION);
        let matched = meta.response(&grid(), ResponseUnits::Acceleration).unwrap();

        // g0 = 1000 vs g1*g2 = 1 -> mismatch 99.9%, scaling switches to g0
        meta.add_stage(0, ResponseStage::sensitivity(1000.0, 0.02));
        let fallback = meta.response(&grid(), ResponseUnits::Acceleration).unwrap();

        for k in 1..matched.len() {
            let ratio = fallback[k].norm() / matched[k].norm();
            assert!((ratio - 1000.0).abs() < 1e-6, "ratio {ratio}");
        }
    }
}
