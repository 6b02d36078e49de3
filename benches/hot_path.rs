//! Hot-path benchmarks: mask filtering and the load/unload bracket.
//!
//! Run:
//!   cargo bench --bench hot_path

#![allow(missing_docs)]

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use asynctap::{
    add_listener, load_async_queue, run_async_queue, unload_async_queue, CallbackSet, Context,
    Provider, ProviderMask, TrackerConfig, ALL_PROVIDERS,
};

fn mask_filtering(c: &mut Criterion) {
    let watch = ProviderMask::from(Provider::Tcp).union(ProviderMask::from(Provider::Timer));
    c.bench_function("mask_filter_sweep", |b| {
        b.iter(|| {
            let mut hits = 0u32;
            for provider in ALL_PROVIDERS {
                if black_box(watch).contains(black_box(provider)) {
                    hits += 1;
                }
            }
            hits
        });
    });
}

fn load_unload_bracket(c: &mut Criterion) {
    asynctap::install(TrackerConfig::default());
    add_listener(
        CallbackSet::new()
            .with_before(|_, _| Ok(()))
            .with_after(|_, _| Ok(())),
        None,
        Some(ProviderMask::from(Provider::Tcp)),
    );
    let ctx = Context::handle();
    run_async_queue(&ctx, Provider::Tcp).unwrap();

    c.bench_function("load_unload_bracket", |b| {
        b.iter(|| {
            load_async_queue(black_box(&ctx)).unwrap();
            unload_async_queue(black_box(&ctx)).unwrap();
        });
    });
}

criterion_group!(benches, mask_filtering, load_unload_bracket);
criterion_main!(benches);
