use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use stdcm_core::model::{BlockLocation, BlockNetwork, Comfort, RollingStock, StdcmStep};
use stdcm_core::occupancy::OccupancyTable;
use stdcm_core::sim::AllowanceValue;
use stdcm_core::{StdcmConfig, StdcmRequest, plan_path};

const BLOCKS: usize = 40;

/// Double track corridor with crossovers every 5 blocks
fn corridor() -> BlockNetwork {
    let mut builder = BlockNetwork::builder();
    for i in 0..BLOCKS {
        let speed = if i % 7 == 3 { 16.0 } else { 30.0 };
        builder.add_block(&format!("up{i}"), 1500.0, speed).unwrap();
        builder.add_block(&format!("down{i}"), 1500.0, speed).unwrap();
    }
    for i in 1..BLOCKS {
        let (up, down) = (2 * i, 2 * i + 1);
        builder.connect(up - 2, up).unwrap();
        builder.connect(down - 2, down).unwrap();
        if i % 5 == 0 {
            builder.connect(up - 2, down).unwrap();
            builder.connect(down - 2, up).unwrap();
        }
    }
    builder.build()
}

/// Trains every 10 minutes on the first track, leaving gaps on the second one
fn occupancies() -> OccupancyTable {
    let mut table = OccupancyTable::new();
    for train in 0..12 {
        let start = train as f64 * 600.0;
        for i in 0..BLOCKS {
            let entry = start + i as f64 * 60.0;
            table.add(2 * i, entry, entry + 120.0).unwrap();
            if train % 3 == 0 {
                table.add(2 * i + 1, entry + 200.0, entry + 320.0).unwrap();
            }
        }
    }
    table
}

fn request(standard_allowance: Option<AllowanceValue>) -> StdcmRequest {
    StdcmRequest {
        steps: vec![
            StdcmStep::pass_through(BlockLocation::new(0, 0.0)),
            StdcmStep::stop_at(BlockLocation::new(2 * (BLOCKS / 2), 750.0), 120.0),
            StdcmStep::stop_at(BlockLocation::new(2 * (BLOCKS - 1), 1500.0), 0.0),
        ],
        rolling_stock: RollingStock {
            name: "bench".to_string(),
            length: 300.0,
            max_speed: 44.0,
            max_acceleration: 0.4,
            max_deceleration: 0.6,
            comfort: Comfort::Standard,
        },
        start_time: 300.0,
        standard_allowance,
    }
}

fn bench_corridor(c: &mut Criterion) {
    let infra = corridor();
    let table = occupancies();
    let config = StdcmConfig::default();

    let mut group = c.benchmark_group("corridor");
    group.sample_size(20);
    group.bench_function("plan", |b| {
        b.iter_batched(
            || request(None),
            |request| black_box(plan_path(&infra, &table, &request, &config)),
            BatchSize::SmallInput,
        )
    });
    group.bench_function("plan_with_allowance", |b| {
        b.iter_batched(
            || request(Some(AllowanceValue::Percentage(5.0))),
            |request| black_box(plan_path(&infra, &table, &request, &config)),
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(benches, bench_corridor);
criterion_main!(benches);
