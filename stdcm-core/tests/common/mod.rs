#![allow(dead_code)]

use stdcm_core::model::{BlockLocation, BlockNetwork, Comfort, RollingStock, StdcmStep};
use stdcm_core::occupancy::{Availability, BlockAvailability, OccupancyTable, TimedPath};
use stdcm_core::sim::AllowanceValue;
use stdcm_core::{BlockId, Distance, StdcmRequest, StdcmResponse, Time};

/// Speed limit of every fixture block. With the fixture train, a 1000m
/// block takes 70s when starting or stopping on it, 50s otherwise.
pub const LINE_SPEED: f64 = 20.0;

pub fn train() -> RollingStock {
    RollingStock {
        name: "fixture".to_string(),
        length: 200.0,
        max_speed: 50.0,
        max_acceleration: 0.5,
        max_deceleration: 0.5,
        comfort: Comfort::Standard,
    }
}

/// Blocks `b0 -> b1 -> ...` with the given lengths
pub fn corridor(lengths: &[Distance]) -> BlockNetwork {
    let mut builder = BlockNetwork::builder();
    for (i, &length) in lengths.iter().enumerate() {
        builder
            .add_block(&format!("b{i}"), length, LINE_SPEED)
            .unwrap();
    }
    for i in 1..lengths.len() {
        builder.connect(i - 1, i).unwrap();
    }
    builder.build()
}

/// Three blocks of 1000m, 190s from end to end
pub fn three_blocks() -> BlockNetwork {
    corridor(&[1000.0, 1000.0, 1000.0])
}

pub fn at(block: BlockId, offset: Distance) -> BlockLocation {
    BlockLocation::new(block, offset)
}

pub fn origin_to_destination(origin: BlockLocation, destination: BlockLocation) -> Vec<StdcmStep> {
    vec![
        StdcmStep::pass_through(origin),
        StdcmStep::stop_at(destination, 0.0),
    ]
}

pub fn request(steps: Vec<StdcmStep>, start_time: Time) -> StdcmRequest {
    StdcmRequest {
        steps,
        rolling_stock: train(),
        start_time,
        standard_allowance: None,
    }
}

pub fn request_with_allowance(
    steps: Vec<StdcmStep>,
    start_time: Time,
    allowance: AllowanceValue,
) -> StdcmRequest {
    StdcmRequest {
        standard_allowance: Some(allowance),
        ..request(steps, start_time)
    }
}

pub fn occupancies(blocks: &[(BlockId, Time, Time)]) -> OccupancyTable {
    let mut table = OccupancyTable::new();
    for &(block, begin, end) in blocks {
        table.add(block, begin, end).unwrap();
    }
    table
}

#[track_caller]
pub fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected} ± {tolerance}, got {actual}"
    );
}

/// Checks the final envelope against the occupancies it was planned with
#[track_caller]
pub fn assert_conflict_free(table: &OccupancyTable, response: &StdcmResponse) {
    let path = TimedPath {
        blocks: response.blocks.clone(),
        envelope: &response.envelope,
        envelope_offset: 0.0,
        stops: response.stops.clone(),
    };
    let availability = table.availability(
        &path,
        0.0,
        response.envelope.end_pos(),
        response.departure_time,
    );
    assert!(
        matches!(availability, Availability::Available { .. }),
        "final envelope conflicts: {availability:?}"
    );
}

pub fn block_ids(response: &StdcmResponse) -> Vec<BlockId> {
    response.blocks.iter().map(|b| b.block).collect()
}
