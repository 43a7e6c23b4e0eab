//! Server-side pointer-chasing lookup cost benchmarking, without network.

use std::fmt;
use std::time::Duration;

use listchase::{
    lookup, resolve, ChaseError, ReplicaScheduler, ReplicaSet, ScatterMode,
};

use criterion::{
    black_box, criterion_group, criterion_main, BenchmarkId, Criterion,
};

use lazy_static::lazy_static;

static ELEMENTS: [usize; 4] = [16, 256, 4096, 65536];
static VALUE_SIZE: usize = 64;
static NUM_REPLICAS: usize = 16;

struct BenchId(pub usize, pub ScatterMode);

impl fmt::Display for BenchId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{:?}", self.0, self.1)
    }
}

lazy_static!(
    /// Pre-built replica sets, one per list length.
    static ref REPLICA_SETS: Vec<ReplicaSet> = ELEMENTS
        .iter()
        .map(|&n| ReplicaSet::build(NUM_REPLICAS, n, VALUE_SIZE).unwrap())
        .collect();
);

fn resolve_last_key(idx: usize) -> Result<(), ChaseError> {
    let replica = REPLICA_SETS[idx].get(0).unwrap();
    let key = (ELEMENTS[idx] - 1) as u64;
    black_box(resolve(replica, black_box(key)));
    Ok(())
}

fn lookup_middle_key(
    idx: usize,
    scatter: ScatterMode,
    scheduler: &mut ReplicaScheduler,
) -> Result<(), ChaseError> {
    let key = (ELEMENTS[idx] / 2) as u64;
    black_box(lookup(&REPLICA_SETS[idx], scheduler, scatter, black_box(key))?);
    Ok(())
}

fn chase_bench_group(c: &mut Criterion) {
    let mut group = c.benchmark_group("chase_bench");
    group
        .sample_size(50)
        .warm_up_time(Duration::from_millis(100))
        .measurement_time(Duration::from_secs(3));

    for (idx, num_elements) in ELEMENTS.iter().enumerate() {
        group.bench_with_input(
            BenchmarkId::new("resolve", num_elements),
            &idx,
            |b, &idx| {
                b.iter(|| resolve_last_key(idx));
            },
        );

        for scatter in [ScatterMode::PerLookup, ScatterMode::PerHop] {
            let mut scheduler = ReplicaScheduler::new(NUM_REPLICAS).unwrap();
            group.bench_with_input(
                BenchmarkId::new("lookup", BenchId(*num_elements, scatter)),
                &idx,
                |b, &idx| {
                    b.iter(|| lookup_middle_key(idx, scatter, &mut scheduler));
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, chase_bench_group);
criterion_main!(benches);
