use serde::{Deserialize, Serialize};

use crate::helpers::checksum::round2;

/// Sensor values obtained in one tick. Absent means the sensor failed or is not installed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reading {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pm25: Option<u32>,
    pub pm10: Option<u32>,
}

impl Reading {
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.humidity.is_none()
            && self.pm25.is_none()
            && self.pm10.is_none()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FixSource {
    Gnss,
    Fallback,
}

/// A geographic position with an accuracy estimate
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fix {
    pub lat: f64,
    pub lng: f64,
    pub accuracy: f64,
    pub source: FixSource,
}

impl Fix {
    pub fn gnss(lat: f64, lng: f64, accuracy: f64) -> Self {
        Fix {
            lat,
            lng,
            accuracy,
            source: FixSource::Gnss,
        }
    }

    /// Statically configured position used when no GNSS fix is available
    pub fn fallback(lat: f64, lng: f64, accuracy: f64) -> Self {
        Fix {
            lat,
            lng,
            accuracy,
            source: FixSource::Fallback,
        }
    }

    pub fn has_finite_position(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// Body of `POST /api/readings`: only the fields obtained in a tick.
///
/// Absent data is an absent key, never `null`, zero or `NaN`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm25: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm10: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

impl Payload {
    /// Build the sparse payload from whatever a tick produced
    pub fn compose(reading: &Reading, fix: Option<&Fix>) -> Self {
        let mut payload = Payload {
            temperature: finite(reading.temperature).map(round2),
            humidity: finite(reading.humidity).map(round2),
            pm25: reading.pm25,
            pm10: reading.pm10,
            ..Default::default()
        };
        if let Some(fix) = fix.filter(|f| f.has_finite_position()) {
            payload.lat = Some(fix.lat);
            payload.lng = Some(fix.lng);
            payload.accuracy = finite(Some(fix.accuracy)).filter(|a| *a >= 0.0);
        }
        payload
    }

    pub fn is_empty(&self) -> bool {
        *self == Payload::default()
    }
}
