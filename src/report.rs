use std::io::Write;

use chrono::NaiveTime;
use serde::Serialize;
use stdcm_core::prelude::*;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Serialize)]
pub struct Report {
    pub scenario: String,
    pub planned: usize,
    pub failed: usize,
    pub requests: Vec<RequestReport>,
}

#[derive(Debug, Serialize)]
pub struct RequestReport {
    pub name: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Planned {
        departure: String,
        arrival: String,
        response: Box<StdcmResponse>,
    },
    Failed {
        error: String,
    },
}

impl RequestReport {
    pub fn new(name: String, result: Result<StdcmResponse, Error>) -> Self {
        let outcome = match result {
            Ok(response) => Outcome::Planned {
                departure: clock(response.departure_time),
                arrival: clock(response.arrival_time),
                response: Box::new(response),
            },
            Err(e) => Outcome::Failed {
                error: e.to_string(),
            },
        };
        Self { name, outcome }
    }

    pub fn is_planned(&self) -> bool {
        matches!(self.outcome, Outcome::Planned { .. })
    }
}

impl Report {
    pub fn new(scenario: String, requests: Vec<RequestReport>) -> Self {
        let planned = requests.iter().filter(|r| r.is_planned()).count();
        Self {
            scenario,
            planned,
            failed: requests.len() - planned,
            requests,
        }
    }

    pub fn write_json<W: Write>(&self, writer: W, pretty: bool) -> std::io::Result<()> {
        let res = if pretty {
            serde_json::to_writer_pretty(writer, self)
        } else {
            serde_json::to_writer(writer, self)
        };
        res.map_err(std::io::Error::other)
    }
}

/// Formats seconds since midnight as `HH:MM:SS`, prefixed with the day
/// offset when the time isn't on the first day
pub fn clock(seconds: Time) -> String {
    if !seconds.is_finite() {
        return seconds.to_string();
    }
    let days = (seconds / SECONDS_PER_DAY).floor();
    let in_day = (seconds - days * SECONDS_PER_DAY).round() as u32;
    // rounding up to midnight
    let (days, in_day) = if in_day >= SECONDS_PER_DAY as u32 {
        (days + 1.0, 0)
    } else {
        (days, in_day)
    };
    let time = NaiveTime::from_num_seconds_from_midnight_opt(in_day, 0)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_default();
    if days == 0.0 {
        time
    } else {
        format!("{days:+}d {time}")
    }
}
