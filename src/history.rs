use crate::{
    log_entry::{LogEntry, LogKey},
    reading::{Location, Reading},
    threshold::Thresholds,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extremes {
    pub min: f64,
    pub max: f64,
}

impl Extremes {
    fn of(values: impl Iterator<Item = f64>) -> Option<Extremes> {
        values.fold(None, |acc, v| {
            Some(match acc {
                None => Extremes { min: v, max: v },
                Some(Extremes { min, max }) => Extremes {
                    min: min.min(v),
                    max: max.max(v),
                },
            })
        })
    }
}

/// Overview of one logged day.
#[derive(Debug, Clone, PartialEq)]
pub struct DaySummary {
    pub entries: usize,
    pub first: Option<String>,
    pub last: Option<String>,
    pub temperature: Option<Extremes>,
    pub humidity: Option<Extremes>,
    pub out_of_range: usize,
    /// Logged positions in time order.
    pub route: Vec<Location>,
}

/// Summarises entries of one day. `entries` must be in time order, as
/// returned by the log store.
pub fn summarize(entries: &[(LogKey, LogEntry)], thresholds: &Thresholds) -> DaySummary {
    let out_of_range = entries
        .iter()
        .filter(|(_, e)| {
            thresholds.is_out_of_range(&Reading {
                temperature: Some(e.temperature),
                humidity: Some(e.humidity),
                latitude: Some(e.location.lat),
                longitude: Some(e.location.lng),
            })
        })
        .count();

    DaySummary {
        entries: entries.len(),
        first: entries.first().map(|(k, _)| k.time.clone()),
        last: entries.last().map(|(k, _)| k.time.clone()),
        temperature: Extremes::of(entries.iter().map(|(_, e)| e.temperature)),
        humidity: Extremes::of(entries.iter().map(|(_, e)| e.humidity)),
        out_of_range,
        route: entries.iter().map(|(_, e)| e.location).collect(),
    }
}
