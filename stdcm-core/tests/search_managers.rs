//! Scenarios where the search has to rebuild previous edges.

mod common;

use common::*;
use stdcm_core::search::{StdcmContext, find_path};
use stdcm_core::sim::KinematicSimulator;
use stdcm_core::{Error, StdcmConfig, plan_path};

#[test]
fn engineering_allowance_slows_the_previous_block() {
    let infra = three_blocks();
    // b1 is free from 80s, and the departure time can't be shifted
    let table = occupancies(&[(1, 0.0, 80.0)]);
    let config = StdcmConfig {
        maximum_departure_delay: 0.0,
        ..StdcmConfig::default()
    };
    let request = request(origin_to_destination(at(0, 0.0), at(2, 1000.0)), 0.0);

    let response = plan_path(&infra, &table, &request, &config).unwrap();
    assert_close(response.departure_time, 0.0, 1e-9);
    assert_close(response.arrival_time, 200.0, 1e-2);
    assert!(response.envelope.interpolate_time(1000.0) >= 80.0 - 1e-6);
    assert_conflict_free(&table, &response);

    // the final envelope needs a fixed point at the end of the slowed block
    assert!(
        response
            .fixed_points
            .iter()
            .any(|p| (p.offset - 1000.0).abs() < 1e-6)
    );
}

#[test]
fn engineering_allowance_needs_margin() {
    let infra = three_blocks();
    // slowing b0 down would run into the train using it from 75s
    let table = occupancies(&[(0, 75.0, 1000.0), (1, 0.0, 80.0)]);
    let config = StdcmConfig {
        maximum_departure_delay: 0.0,
        ..StdcmConfig::default()
    };
    let request = request(origin_to_destination(at(0, 0.0), at(2, 1000.0)), 0.0);

    assert!(plan_path(&infra, &table, &request, &config).is_err());
}

#[test]
fn backtracking_lowers_the_previous_exit_speed() {
    // b1 and b2 are too short to brake from 20m/s to the destination stop
    let infra = corridor(&[1000.0, 150.0, 200.0]);
    let table = occupancies(&[]);
    let config = StdcmConfig {
        lookahead_blocks: 1,
        ..StdcmConfig::default()
    };
    let request = request(origin_to_destination(at(0, 0.0), at(2, 200.0)), 0.0);

    let simulator =
        KinematicSimulator::new(&infra, &request.rolling_stock, config.simulation.clone()).unwrap();
    let ctx = StdcmContext::new(
        &infra,
        &simulator,
        &table,
        &request.rolling_stock,
        &request.steps,
        &config,
        request.start_time,
        None,
    );
    let result = find_path(&ctx).unwrap();
    assert_eq!(result.edges.len(), 3);
    // v² = 2 * 0.5 * (200 + 150)
    assert_close(result.edges[0].envelope.end_speed(), 350f64.sqrt(), 1e-6);
    for pair in result.edges.windows(2) {
        assert_close(pair[0].envelope.end_speed(), pair[1].envelope.begin_speed(), 1e-6);
    }
    assert_close(result.arrival_time, 107.5, 1e-3);

    let response = plan_path(&infra, &table, &request, &config).unwrap();
    assert_close(response.arrival_time, 107.5, 1e-3);
}

#[test]
fn lookahead_avoids_backtracking() {
    let infra = corridor(&[1000.0, 150.0, 200.0]);
    let table = occupancies(&[]);
    let request = request(origin_to_destination(at(0, 0.0), at(2, 200.0)), 0.0);

    let response = plan_path(&infra, &table, &request, &StdcmConfig::default()).unwrap();
    assert_close(response.arrival_time, 107.5, 1e-3);
}

#[test]
fn backtracking_gives_up_past_its_window() {
    // b2 has to be entered at sqrt(200) m/s, so b1 can't start faster than
    // sqrt(300) m/s: both b0 and b1 have to be rebuilt
    let infra = corridor(&[1000.0, 100.0, 100.0, 100.0]);
    let table = occupancies(&[]);
    let request = request(origin_to_destination(at(0, 0.0), at(3, 100.0)), 0.0);
    let simulator = KinematicSimulator::new(
        &infra,
        &request.rolling_stock,
        StdcmConfig::default().simulation,
    )
    .unwrap();

    let shallow = StdcmConfig {
        lookahead_blocks: 1,
        max_backtracking_depth: 1,
        ..StdcmConfig::default()
    };
    let ctx = StdcmContext::new(
        &infra,
        &simulator,
        &table,
        &request.rolling_stock,
        &request.steps,
        &shallow,
        request.start_time,
        None,
    );
    assert!(matches!(find_path(&ctx), Err(Error::NoPathFound)));
    assert!(matches!(
        plan_path(&infra, &table, &request, &shallow),
        Err(Error::NoPathFound)
    ));

    let deep = StdcmConfig {
        max_backtracking_depth: 2,
        ..shallow
    };
    let ctx = StdcmContext::new(
        &infra,
        &simulator,
        &table,
        &request.rolling_stock,
        &request.steps,
        &deep,
        request.start_time,
        None,
    );
    let result = find_path(&ctx).unwrap();
    assert_eq!(result.edges.len(), 4);
    assert_close(result.edges[0].envelope.end_speed(), 300f64.sqrt(), 1e-6);
    assert_close(result.edges[1].envelope.end_speed(), 200f64.sqrt(), 1e-6);
    for pair in result.edges.windows(2) {
        assert_close(pair[0].envelope.end_speed(), pair[1].envelope.begin_speed(), 1e-6);
    }
}
