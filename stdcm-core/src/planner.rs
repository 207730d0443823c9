//! Entry point of a planning request: validation, search, post-processing.

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::StdcmConfig;
use crate::model::{Infrastructure, RollingStock, StdcmStep, validate_steps};
use crate::occupancy::{BlockAvailability, PathBlock, PathStop};
use crate::postprocessing::{FixedTimePoint, build_final_envelope};
use crate::search::{StdcmContext, find_path};
use crate::sim::{
    AllowanceDistribution, AllowanceValue, Envelope, EnvelopeSimulator, KinematicSimulator,
    PathRange,
};
use crate::{Error, Time};

/// A train to insert among the existing ones
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdcmRequest {
    pub steps: Vec<StdcmStep>,
    pub rolling_stock: RollingStock,
    /// Earliest departure time, the actual departure may be shifted later
    pub start_time: Time,
    #[serde(default)]
    pub standard_allowance: Option<AllowanceValue>,
}

/// Conflict-free train run
#[derive(Debug, Clone, Serialize)]
pub struct StdcmResponse {
    /// Speed/time envelope over the whole path, stop durations excluded
    pub envelope: Envelope,
    pub path: Vec<PathRange>,
    pub blocks: Vec<PathBlock>,
    pub departure_time: Time,
    /// Arrival at the destination, before its stop
    pub arrival_time: Time,
    pub total_run_time: Time,
    pub stops: Vec<PathStop>,
    pub fixed_points: Vec<FixedTimePoint>,
    pub distribution: AllowanceDistribution,
    pub departure_time_shift: Time,
    /// Nodes expanded by the search
    pub iterations: usize,
}

/// Plans a request with the [`KinematicSimulator`]
///
/// # Errors
///
/// See [`plan_path_with_simulator`]
pub fn plan_path(
    infra: &dyn Infrastructure,
    availability: &dyn BlockAvailability,
    request: &StdcmRequest,
    config: &StdcmConfig,
) -> Result<StdcmResponse, Error> {
    config.validate()?;
    let simulator =
        KinematicSimulator::new(infra, &request.rolling_stock, config.simulation.clone())?;
    plan_path_with_simulator(infra, &simulator, availability, request, config)
}

/// Finds the earliest conflict-free path of a train through its steps,
/// then builds its final envelope with the requested standard allowance.
///
/// # Errors
///
/// - [`Error::InvalidRequest`] / [`Error::InvalidConfig`] on bad inputs
/// - [`Error::NoPathFound`], [`Error::SearchAborted`] or
///   [`Error::SearchTimeout`] when the search fails
/// - [`Error::StandardAllowance`] when no conflict-free final envelope exists
pub fn plan_path_with_simulator(
    infra: &dyn Infrastructure,
    simulator: &dyn EnvelopeSimulator,
    availability: &dyn BlockAvailability,
    request: &StdcmRequest,
    config: &StdcmConfig,
) -> Result<StdcmResponse, Error> {
    config.validate()?;
    validate_steps(&request.steps, infra)?;
    request.rolling_stock.validate()?;
    if !request.start_time.is_finite() {
        return Err(Error::InvalidRequest(format!(
            "invalid start time {}",
            request.start_time
        )));
    }
    match request.standard_allowance {
        Some(AllowanceValue::FixedTime(_)) => {
            return Err(Error::InvalidRequest(
                "fixed time standard allowances are not supported".to_string(),
            ));
        }
        Some(AllowanceValue::Percentage(value) | AllowanceValue::TimePerDistance(value))
            if !value.is_finite() || value < 0.0 =>
        {
            return Err(Error::InvalidRequest(format!(
                "invalid standard allowance value {value}"
            )));
        }
        _ => {}
    }

    let ctx = StdcmContext::new(
        infra,
        simulator,
        availability,
        &request.rolling_stock,
        &request.steps,
        config,
        request.start_time,
        request.standard_allowance,
    );
    let search = find_path(&ctx)?;
    let result = build_final_envelope(&ctx, &search)?;
    let arrival_time = result.arrival_time();
    info!(
        "Planned {} blocks, departure at {:.1}, arrival at {arrival_time:.1} ({:?} allowance, {} iteration(s))",
        result.blocks.len(),
        result.departure_time,
        result.distribution,
        result.iterations
    );

    Ok(StdcmResponse {
        total_run_time: arrival_time - result.departure_time,
        arrival_time,
        departure_time: result.departure_time,
        envelope: result.envelope,
        path: result.path,
        blocks: result.blocks,
        stops: result.stops,
        fixed_points: result.fixed_points,
        distribution: result.distribution,
        departure_time_shift: search.departure_time_shift,
        iterations: search.iterations,
    })
}
