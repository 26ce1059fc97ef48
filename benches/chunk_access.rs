//! Micro-benchmark: random and sequential access through a chunked
//! column, and live-slot iteration with a fragmented free list.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ncmap::prelude::*;

const N: u32 = 100_000;

fn build() -> (AttributeContainer, ncmap::data::attribute::ColumnHandle<u32>) {
    let mut c = AttributeContainer::new();
    let h = c.add_attribute::<u32>("payload").unwrap();
    for k in 0..N {
        let i = c.insert_lines(1);
        c.view_mut(&h).unwrap().set(i, k.wrapping_mul(2654435761));
    }
    for i in (0..N).step_by(7) {
        c.remove_line(i);
    }
    (c, h)
}

fn bench_chunk_access(crit: &mut Criterion) {
    let (c, h) = build();

    crit.bench_function("live_iter_sum", |b| {
        b.iter(|| {
            let view = c.view(&h).unwrap();
            let mut acc = 0u64;
            for &v in view.iter() {
                acc = acc.wrapping_add(v as u64);
            }
            black_box(acc)
        })
    });

    crit.bench_function("random_reads", |b| {
        let view = c.view(&h).unwrap();
        let mut i = 1u32;
        b.iter(|| {
            // cheap LCG stride over live-ish slots
            i = (i.wrapping_mul(48271)) % N;
            black_box(view[i % N])
        })
    });

    crit.bench_function("triangle_soup_build", |b| {
        b.iter(|| {
            let mut map = CMap2::new();
            for _ in 0..1_000 {
                map.add_face(3);
            }
            black_box(map.nb_darts())
        })
    });
}

criterion_group!(benches, bench_chunk_access);
criterion_main!(benches);
