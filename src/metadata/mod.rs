// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/seismoscan-rs

//! Station and channel metadata - identities, epochs, response stages

mod response;

pub use response::{
    ResponseStage, ResponseUnits, StageKind, UNITS_ACCELERATION, UNITS_DISPLACEMENT,
    UNITS_UNKNOWN, UNITS_VELOCITY,
};

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::{DigestAccumulator, Digestible};
use crate::error::ScanError;

/// A station identity: `(network, station)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Station {
    pub network: String,
    pub name: String,
}

impl Station {
    pub fn new(network: &str, name: &str) -> Self {
        Self {
            network: network.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.network, self.name)
    }
}

/// Hashable channel identity: two-character location slot plus
/// three-character band/instrument/orientation code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelKey {
    pub location: String,
    pub code: String,
}

impl ChannelKey {
    pub fn new(location: &str, code: &str) -> Self {
        Self {
            location: location.to_string(),
            code: code.to_string(),
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.location, self.code)
    }
}

/// A channel: the key plus its semantic role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Channel {
    key: ChannelKey,
}

impl Channel {
    pub fn new(location: &str, code: &str) -> Self {
        Self {
            key: ChannelKey::new(location, code),
        }
    }

    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    pub fn location(&self) -> &str {
        &self.key.location
    }

    pub fn code(&self) -> &str {
        &self.key.code
    }

    pub fn band_code(&self) -> Option<char> {
        self.key.code.chars().next()
    }

    pub fn instrument_code(&self) -> Option<char> {
        self.key.code.chars().nth(1)
    }

    pub fn orientation(&self) -> Option<char> {
        self.key.code.chars().nth(2)
    }

    /// True for channels carrying ground motion: BH?, LH?, HN?, ...
    pub fn is_seismic(&self) -> bool {
        matches!(self.instrument_code(), Some('H') | Some('N'))
    }

    /// True for mass-position channels: VM?, LM?, ...
    pub fn is_mass_position(&self) -> bool {
        self.instrument_code() == Some('M')
    }

    /// Storage serialization, `"LOC,CODE"`.
    pub fn id(&self) -> String {
        format!("{},{}", self.key.location, self.key.code)
    }

    /// Parse a `"LOC,CODE"` channel id.
    pub fn parse_id(id: &str) -> Result<Self, ScanError> {
        let mut parts = id.split(',');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(loc), Some(code), None) if !loc.is_empty() && !code.is_empty() => {
                Ok(Self::new(loc, code))
            }
            _ => Err(ScanError::BadChannelId(id.to_string())),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.key.fmt(f)
    }
}

/// Per-channel, per-epoch metadata: sensor geometry plus the cascaded
/// response stages keyed by stage index.
///
/// A pole-zero channel conventionally carries stages 0 (overall sensitivity),
/// 1 (analog pole-zero) and 2 (digital gain); a polynomial channel may carry
/// only stage 1.
#[derive(Debug, Clone)]
pub struct ChannelMeta {
    key: ChannelKey,
    // identity tuple, not an owning Station reference
    station: (String, String),
    pub sample_rate: f64,
    pub dip: f64,
    pub azimuth: f64,
    pub depth: f64,
    pub instrument_type: String,
    pub channel_flags: String,
    pub epoch: DateTime<Utc>,
    day_break: bool,
    stages: BTreeMap<u32, ResponseStage>,
}

impl ChannelMeta {
    pub fn new(key: ChannelKey, station: &Station, epoch: DateTime<Utc>) -> Self {
        Self {
            key,
            station: (station.network.clone(), station.name.clone()),
            sample_rate: 0.0,
            dip: 0.0,
            azimuth: 0.0,
            depth: 0.0,
            instrument_type: String::new(),
            channel_flags: String::new(),
            epoch,
            day_break: false,
            stages: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    pub fn channel(&self) -> Channel {
        Channel::new(&self.key.location, &self.key.code)
    }

    pub fn station(&self) -> Station {
        Station::new(&self.station.0, &self.station.1)
    }

    pub fn add_stage(&mut self, index: u32, stage: ResponseStage) {
        self.stages.insert(index, stage);
    }

    pub fn stage(&self, index: u32) -> Option<&ResponseStage> {
        self.stages.get(&index)
    }

    pub fn has_stage(&self, index: u32) -> bool {
        self.stages.contains_key(&index)
    }

    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn stages(&self) -> impl Iterator<Item = (&u32, &ResponseStage)> {
        self.stages.iter()
    }

    /// Mark that the response changes partway through the requested day.
    pub fn set_day_break(&mut self) {
        self.day_break = true;
    }

    pub fn has_day_break(&self) -> bool {
        self.day_break
    }
}

impl Digestible for ChannelMeta {
    fn add_digest_members(&self, acc: &mut DigestAccumulator) {
        acc.add_f64(self.sample_rate);
        acc.add_u32(self.stages.len() as u32);
        for stage in self.stages.values() {
            acc.add_f64(stage.gain);
            acc.add_f64(stage.gain_frequency);
            acc.add_u8(stage.kind.type_tag());
            match &stage.kind {
                StageKind::PoleZero {
                    normalization,
                    poles,
                    zeros,
                    ..
                } => {
                    acc.add_f64(*normalization);
                    for p in poles {
                        acc.add_f64(p.re);
                        acc.add_f64(p.im);
                    }
                    for z in zeros {
                        acc.add_f64(z.re);
                        acc.add_f64(z.im);
                    }
                }
                StageKind::Polynomial {
                    lower_bound,
                    upper_bound,
                    coefficients,
                } => {
                    acc.add_f64(*lower_bound);
                    acc.add_f64(*upper_bound);
                    acc.add_u32(coefficients.len() as u32);
                    for c in coefficients {
                        acc.add_f64(*c);
                    }
                }
                StageKind::Digital {
                    input_sample_rate,
                    decimation,
                } => {
                    acc.add_f64(*input_sample_rate);
                    acc.add_f64(*decimation);
                }
            }
        }
    }
}

/// All channel metadata for one station on one day.
#[derive(Debug, Clone)]
pub struct StationMeta {
    station: Station,
    pub date: NaiveDate,
    channels: BTreeMap<ChannelKey, ChannelMeta>,
}

impl StationMeta {
    pub fn new(station: Station, date: NaiveDate) -> Self {
        Self {
            station,
            date,
            channels: BTreeMap::new(),
        }
    }

    pub fn station(&self) -> &Station {
        &self.station
    }

    pub fn add_channel(&mut self, meta: ChannelMeta) {
        self.channels.insert(meta.key().clone(), meta);
    }

    pub fn channel_meta(&self, channel: &Channel) -> Option<&ChannelMeta> {
        self.channels.get(channel.key())
    }

    pub fn channel_meta_mut(&mut self, channel: &Channel) -> Option<&mut ChannelMeta> {
        self.channels.get_mut(channel.key())
    }

    /// All channels whose code starts with `prefix` (e.g. `"LH"`), in key order.
    pub fn channels_with_prefix(&self, prefix: &str) -> Vec<Channel> {
        self.channels
            .keys()
            .filter(|k| k.code.starts_with(prefix))
            .map(|k| Channel::new(&k.location, &k.code))
            .collect()
    }

    pub fn channels(&self) -> impl Iterator<Item = &ChannelMeta> {
        self.channels.values()
    }
}
