//! Coherence metric
//!
//! Magnitude-squared coherence between a configured channel pair,
//! `gamma^2(f) = |Gxy|^2 / (Gxx * Gyy)`, averaged over the power band on
//! the period axis.

use tracing::{debug, info, warn};

use super::{
    canonical_pair, pair_id, Metric, MetricContext, MetricCore, PowerBand, StationDay,
};
use crate::error::ScanError;
use crate::metadata::Channel;

/// Band-averaged magnitude-squared coherence of one channel pair.
pub struct CoherenceMetric {
    core: MetricCore,
    band: PowerBand,
}

impl CoherenceMetric {
    pub fn new(band: PowerBand) -> Self {
        let mut core = MetricCore::default();
        core.args.declare("channel-x");
        core.args.declare("channel-y");
        Self { core, band }
    }

    pub fn set_argument(&mut self, name: &str, value: &str) -> Result<(), ScanError> {
        self.core.args.set(name, value)
    }
}

impl Metric for CoherenceMetric {
    fn base_name(&self) -> &'static str {
        "CoherencePBM"
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

        let (Some(x_id), Some(y_id)) = (
            self.core.args.get("channel-x")?.map(str::to_string),
            self.core.args.get("channel-y")?.map(str::to_string),
        ) else {
            info!("{}: channel pair not configured, skipping", name);
            return Ok(());
        };
        let x = Channel::parse_id(&x_id)?;
        let y = Channel::parse_id(&y_id)?;

        let result_id = pair_id(&x, &y);
        let id = self.core.identifier(result_id.clone());
        let (a, b) = canonical_pair(&x, &y);
        let digest = match ctx.value_digest_changed(&[a, b], &id) {
            Ok(Some(digest)) => digest,
            Ok(None) => {
                debug!("{}: {} unchanged, skipping", name, result_id);
                return Ok(());
            }
            Err(e) if e.is_soft_skip() => {
                info!("{}: {} skipped: {}", name, result_id, e);
                return Ok(());
            }
            Err(e) => {
                warn!("{}: digest for {} failed: {}", name, result_id, e);
                return Ok(());
            }
        };

        match compute_coherence(&x, &y, ctx, self.band) {
            Ok(Some(value)) => {
                self.core.result_mut().add_result(result_id, value, digest);
            }
            Ok(None) => {}
            Err(e) => warn!("{}: pair {} failed: {}", name, result_id, e),
        }

        Ok(())
    }

    fn result(&self) -> Option<&super::MetricResult> {
        self.core.result()
    }
}

/// Mean of `gamma^2` over the period band, or `None` when the band lies
/// outside the usable period range.
fn compute_coherence(
    x: &Channel,
    y: &Channel,
    ctx: &mut MetricContext<'_>,
    band: PowerBand,
) -> Result<Option<f64>, ScanError> {
    let gxx = ctx.cross_power(x, x)?;
    let gyy = ctx.cross_power(y, y)?;
    let gxy = ctx.cross_power(x, y)?;

    let nf = gxy
        .spectrum
        .len()
        .min(gxx.spectrum.len())
        .min(gyy.spectrum.len());
    if nf < 2 {
        return Err(ScanError::MissingData(format!(
            "degenerate spectrum for {x} x {y}"
        )));
    }
    let df = gxy.df;

    let mut gamma = vec![0.0; nf];
    for k in 1..nf {
        gamma[k] =
            (gxy.spectrum[k] * gxy.spectrum[k]) / (gxx.spectrum[k] * gyy.spectrum[k]);
    }

    // Flip to the period axis, dropping DC, and average inside the band
    let t_min = 1.0 / ((nf - 1) as f64 * df);
    let t_max = 1.0 / df;
    if !band.usable(t_min, t_max) {
        warn!(
            "band [{}] s outside usable range [{:.3} - {:.3}] s for {} x {}, skipping",
            band, t_min, t_max, x, y
        );
        return Ok(None);
    }

    let mut sum = 0.0;
    let mut n_periods = 0usize;
    for k in 0..nf - 1 {
        let period = 1.0 / ((nf - 1 - k) as f64 * df);
        if period > band.high {
            break;
        }
        if period >= band.low {
            sum += gamma[nf - 1 - k];
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
