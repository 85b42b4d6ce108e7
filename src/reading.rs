use serde_json::Value;

pub const TEMPERATURE_KEY: &str = "temperature_ds18b20";
pub const HUMIDITY_KEY: &str = "humidity";
pub const LATITUDE_KEY: &str = "latitude";
pub const LONGITUDE_KEY: &str = "longitude";

/// Latest sensor snapshot as published by the container's device.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Reading {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

/// A reading with every field present, ready to be logged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompleteReading {
    pub temperature: f64,
    pub humidity: f64,
    pub location: Location,
}

impl Reading {
    /// Builds a reading from the `/sensor_data` node. Returns `None` when the
    /// node is null or not an object.
    pub fn from_snapshot(snapshot: &Value) -> Option<Reading> {
        let fields = snapshot.as_object()?;
        let field = |key: &str| fields.get(key).and_then(parse_number);

        Some(Reading {
            temperature: field(TEMPERATURE_KEY),
            humidity: field(HUMIDITY_KEY),
            latitude: field(LATITUDE_KEY),
            longitude: field(LONGITUDE_KEY),
        })
    }

    pub fn complete(&self) -> Option<CompleteReading> {
        Some(CompleteReading {
            temperature: self.temperature?,
            humidity: self.humidity?,
            location: Location {
                lat: self.latitude?,
                lng: self.longitude?,
            },
        })
    }
}

/// Permissive numeric parsing: numbers and numeric strings are accepted,
/// anything else (including NaN and infinities) is treated as absent.
pub fn parse_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    n.is_finite().then_some(n)
}
