use blkremap::skiplist::Skiplist;
use criterion::{criterion_group, criterion_main, Criterion};

fn skiplist_insert(c: &mut Criterion) {
    c.bench_function("skiplist insert 100k sequential", |b| {
        b.iter(|| {
            let mut list = Skiplist::init().unwrap();
            for key in 0..100_000u64 {
                list.add(key, key).unwrap();
            }
        });
    });
}

fn skiplist_find(c: &mut Criterion) {
    let mut list = Skiplist::init().unwrap();
    for key in 0..100_000u64 {
        list.add(key * 2, key).unwrap();
    }

    c.bench_function("skiplist find in 100k", |b| {
        b.iter(|| {
            for key in (0..100_000u64).step_by(37) {
                list.find(key * 2);
            }
        });
    });
}

criterion_group!(benches, skiplist_insert, skiplist_find);
criterion_main!(benches);
