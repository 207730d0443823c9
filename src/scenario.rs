//! TOML scenarios: a synthetic block network, the trains already using it
//! and the trains to insert.

use std::collections::HashMap;
use std::path::Path;

use chrono::{NaiveTime, Timelike};
use serde::Deserialize;
use stdcm_core::prelude::*;

/// Seconds, or a `HH:MM:SS` clock time
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TimeValue {
    Seconds(f64),
    Clock(String),
}

impl TimeValue {
    pub fn seconds(&self) -> Result<Time, Error> {
        match self {
            TimeValue::Seconds(seconds) => Ok(*seconds),
            TimeValue::Clock(clock) => NaiveTime::parse_from_str(clock, "%H:%M:%S")
                .map(|t| f64::from(t.num_seconds_from_midnight()))
                .map_err(|e| Error::InvalidRequest(format!("invalid time '{clock}': {e}"))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BlockSpec {
    pub name: String,
    pub length: Distance,
    #[serde(default)]
    pub speed_limit: Option<Speed>,
    #[serde(default)]
    pub speed_sections: Vec<SpeedSection>,
    /// Blocks reachable from the exit of this one
    #[serde(default)]
    pub next: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct OccupancySpec {
    pub block: String,
    pub begin: TimeValue,
    pub end: TimeValue,
}

#[derive(Debug, Deserialize)]
pub struct LocationSpec {
    pub block: String,
    #[serde(default)]
    pub offset: Distance,
}

#[derive(Debug, Deserialize)]
pub struct StepSpec {
    pub locations: Vec<LocationSpec>,
    #[serde(default)]
    pub stop: bool,
    #[serde(default)]
    pub duration: Option<TimeValue>,
}

#[derive(Debug, Deserialize)]
pub struct RequestSpec {
    pub name: String,
    pub start_time: TimeValue,
    pub steps: Vec<StepSpec>,
    #[serde(default)]
    pub standard_allowance: Option<AllowanceValue>,
    /// Overrides the scenario rolling stock
    #[serde(default)]
    pub rolling_stock: Option<RollingStock>,
}

#[derive(Debug, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub config: StdcmConfig,
    pub rolling_stock: RollingStock,
    pub blocks: Vec<BlockSpec>,
    #[serde(default)]
    pub occupancies: Vec<OccupancySpec>,
    pub requests: Vec<RequestSpec>,
}

/// A scenario with names resolved to block ids
pub struct LoadedScenario {
    pub name: String,
    pub config: StdcmConfig,
    pub network: BlockNetwork,
    pub occupancies: OccupancyTable,
    pub requests: Vec<(String, StdcmRequest)>,
}

impl Scenario {
    pub fn from_file(path: &Path) -> Result<LoadedScenario, Error> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!("Failed to read scenario '{}': {}", path.display(), e),
            )
        })?;
        let scenario: Scenario = toml::from_str(&content)?;
        let default_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        scenario.load(default_name)
    }

    pub fn load(self, default_name: String) -> Result<LoadedScenario, Error> {
        self.config.validate()?;
        let network = self.build_network()?;
        let block = |name: &str| {
            network
                .block_id(name)
                .ok_or_else(|| Error::InvalidRequest(format!("unknown block '{name}'")))
        };

        let mut occupancies = OccupancyTable::new();
        for occupancy in &self.occupancies {
            occupancies.add(
                block(&occupancy.block)?,
                occupancy.begin.seconds()?,
                occupancy.end.seconds()?,
            )?;
        }

        let mut requests = Vec::with_capacity(self.requests.len());
        for spec in self.requests {
            let mut steps = Vec::with_capacity(spec.steps.len());
            for step in &spec.steps {
                let locations = step
                    .locations
                    .iter()
                    .map(|loc| Ok(BlockLocation::new(block(&loc.block)?, loc.offset)))
                    .collect::<Result<Vec<_>, Error>>()?;
                let duration = step.duration.as_ref().map(TimeValue::seconds).transpose()?;
                steps.push(StdcmStep::new(locations, step.stop, duration));
            }
            let request = StdcmRequest {
                steps,
                rolling_stock: spec
                    .rolling_stock
                    .unwrap_or_else(|| self.rolling_stock.clone()),
                start_time: spec.start_time.seconds()?,
                standard_allowance: spec.standard_allowance,
            };
            requests.push((spec.name, request));
        }

        Ok(LoadedScenario {
            name: self.name.unwrap_or(default_name),
            config: self.config,
            network,
            occupancies,
            requests,
        })
    }

    fn build_network(&self) -> Result<BlockNetwork, Error> {
        let mut builder = BlockNetwork::builder();
        let mut ids = HashMap::with_capacity(self.blocks.len());
        let mut added = Vec::with_capacity(self.blocks.len());
        for spec in &self.blocks {
            let id = match spec.speed_limit {
                Some(speed) if spec.speed_sections.is_empty() => {
                    builder.add_block(&spec.name, spec.length, speed)?
                }
                None => builder.add_block_with_sections(
                    &spec.name,
                    spec.length,
                    spec.speed_sections.clone(),
                )?,
                Some(_) => {
                    return Err(Error::InvalidInfra(format!(
                        "block '{}' has both a speed limit and speed sections",
                        spec.name
                    )));
                }
            };
            ids.insert(spec.name.as_str(), id);
            added.push(id);
        }
        for (spec, &from) in self.blocks.iter().zip(&added) {
            for next in &spec.next {
                let to = ids.get(next.as_str()).copied().ok_or_else(|| {
                    Error::InvalidInfra(format!(
                        "block '{}' leads to unknown block '{next}'",
                        spec.name
                    ))
                })?;
                builder.connect(from, to)?;
            }
        }
        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
        [rolling_stock]
        name = "regional"
        length = 150.0
        max_speed = 40.0
        max_acceleration = 0.5
        max_deceleration = 0.5

        [config]
        maximum_departure_delay = 1800.0

        [[blocks]]
        name = "a"
        length = 1000.0
        speed_limit = 20.0
        next = ["b"]

        [[blocks]]
        name = "b"
        length = 800.0
        speed_sections = [{ begin = 0.0, end = 800.0, speed = 15.0 }]

        [[occupancies]]
        block = "b"
        begin = "08:00:00"
        end = 29100.0

        [[requests]]
        name = "morning"
        start_time = "07:59:00"
        standard_allowance = { type = "percentage", value = 5.0 }

        [[requests.steps]]
        locations = [{ block = "a" }]

        [[requests.steps]]
        locations = [{ block = "b", offset = 800.0 }]
        stop = true
        duration = "00:02:00"
    "#;

    #[test]
    fn clock_times() {
        assert_eq!(TimeValue::Clock("08:00:30".to_string()).seconds().unwrap(), 28830.0);
        assert_eq!(TimeValue::Seconds(12.5).seconds().unwrap(), 12.5);
        assert!(TimeValue::Clock("8h".to_string()).seconds().is_err());
    }

    #[test]
    fn load_scenario() {
        let scenario: Scenario = toml::from_str(SCENARIO).unwrap();
        let loaded = scenario.load("fallback".to_string()).unwrap();
        assert_eq!(loaded.name, "fallback");
        assert_eq!(loaded.config.maximum_departure_delay, 1800.0);
        assert_eq!(loaded.network.block_count(), 2);
        assert_eq!(loaded.network.successors(0), vec![1]);
        assert_eq!(loaded.occupancies.occupancies(1), &[(28800.0, 29100.0)]);

        let (name, request) = &loaded.requests[0];
        assert_eq!(name, "morning");
        assert_eq!(request.start_time, 28740.0);
        assert_eq!(request.steps[1].locations[0], BlockLocation::new(1, 800.0));
        assert_eq!(request.steps[1].duration, Some(120.0));
        assert_eq!(
            request.standard_allowance,
            Some(AllowanceValue::Percentage(5.0))
        );
    }

    #[test]
    fn unknown_block() {
        let broken = SCENARIO.replace("next = [\"b\"]", "next = [\"c\"]");
        let scenario: Scenario = toml::from_str(&broken).unwrap();
        assert!(matches!(
            scenario.load(String::new()),
            Err(Error::InvalidInfra(_))
        ));
    }
}
