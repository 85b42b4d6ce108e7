use crate::reading::Reading;

pub const DEFAULT_TEMPERATURE_MIN: f64 = -18.0;
pub const DEFAULT_TEMPERATURE_MAX: f64 = -9.0;
pub const DEFAULT_HUMIDITY_MIN: f64 = 75.0;
pub const DEFAULT_HUMIDITY_MAX: f64 = 90.0;

/// Safe band for the cargo. Both bounds of each range are inside the band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub temperature_min: f64,
    pub temperature_max: f64,
    pub humidity_min: f64,
    pub humidity_max: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            temperature_min: DEFAULT_TEMPERATURE_MIN,
            temperature_max: DEFAULT_TEMPERATURE_MAX,
            humidity_min: DEFAULT_HUMIDITY_MIN,
            humidity_max: DEFAULT_HUMIDITY_MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Low,
    High,
    /// Field absent or not a number; never counts as out of range.
    Unknown,
}

impl Status {
    fn of(value: Option<f64>, min: f64, max: f64) -> Status {
        match value {
            Some(v) if v < min => Status::Low,
            Some(v) if v > max => Status::High,
            Some(v) if v.is_nan() => Status::Unknown,
            Some(_) => Status::Ok,
            None => Status::Unknown,
        }
    }

    pub fn is_bad(&self) -> bool {
        matches!(self, Status::Low | Status::High)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub temperature: Status,
    pub humidity: Status,
}

impl Evaluation {
    pub fn is_out_of_range(&self) -> bool {
        self.temperature.is_bad() || self.humidity.is_bad()
    }
}

impl Thresholds {
    pub fn evaluate(&self, reading: &Reading) -> Evaluation {
        Evaluation {
            temperature: Status::of(
                reading.temperature,
                self.temperature_min,
                self.temperature_max,
            ),
            humidity: Status::of(reading.humidity, self.humidity_min, self.humidity_max),
        }
    }

    pub fn is_out_of_range(&self, reading: &Reading) -> bool {
        self.evaluate(reading).is_out_of_range()
    }
}
