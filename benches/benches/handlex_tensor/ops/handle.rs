use criterion::{black_box, Criterion};
use handlex_core::memory_format::MemoryFormat;
use handlex_tensor::Tensor;

pub fn basic(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("handle/basic");
    group.warm_up_time(core::time::Duration::from_millis(500));
    group.measurement_time(core::time::Duration::from_secs(2));

    let tensor = Tensor::zeros(&[64, 64]);

    group.bench_function("clone_drop", |b| b.iter(|| drop(black_box(tensor.clone()))));
    group.bench_function("borrow", |b| b.iter(|| black_box(tensor.borrow()).numel()));
    group.bench_function("expect_contiguous/borrowed", |b| {
        b.iter(|| black_box(tensor.expect_contiguous(MemoryFormat::Contiguous)).numel())
    });

    let transposed = tensor.transpose(0, 1);
    group.bench_function("expect_contiguous/copied", |b| {
        b.iter(|| black_box(transposed.expect_contiguous(MemoryFormat::Contiguous)).numel())
    });
    group.bench_function("key_set", |b| b.iter(|| black_box(tensor.key_set())));

    group.finish();
}
