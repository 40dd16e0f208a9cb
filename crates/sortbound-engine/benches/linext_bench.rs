//! Linear-extension counter baseline.
//!
//! The counter dominates phase-1 exploration time, so regressions here
//! translate directly into forward-search wall time.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use sortbound_core::RunParams;
use sortbound_engine::domain::linext::LinExtCalculator;
use sortbound_engine::domain::poset::{PosetInfo, PosetRecord};

/// Disjoint covered pairs: 3^(n/2) downsets, no singleton shortcut.
fn pair_ladder(n: usize) -> PosetRecord {
    let mut record = PosetRecord::new();
    for i in (0..n - 1).step_by(2) {
        record.add_edge(i, i + 1);
    }
    record
}

fn bench_counter(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("lin_ext_count");
    for &n in &[8usize, 12, 16] {
        let params = RunParams::new(n as u32, 40, 1).unwrap();
        let record = pair_ladder(n);
        let info = PosetInfo::new(0, 0);

        group.bench_with_input(BenchmarkId::new("wide_with_table", n), &n, |bencher, _| {
            let mut calc = LinExtCalculator::new(n as u32, 40);
            bencher.iter(|| {
                black_box(calc.count(&record, info, 0, true, false, params));
            });
        });

        group.bench_with_input(BenchmarkId::new("narrow_count_only", n), &n, |bencher, _| {
            let mut calc = LinExtCalculator::new(n as u32, 40);
            bencher.iter(|| {
                // a deep level selects the guarded narrow path
                black_box(calc.count(&record, info, 20, false, true, params));
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_counter);
criterion_main!(benches);
