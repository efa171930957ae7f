use criterion::{black_box, Criterion};
use handlex_tensor::{autograd::BackwardOptions, Tensor};

const SIZES: [(usize, &str); 2] = [(100, "small"), (10000, "large")];

pub fn basic(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("autograd/basic");
    group.warm_up_time(core::time::Duration::from_millis(500));
    group.measurement_time(core::time::Duration::from_secs(3));
    group.sample_size(50);

    for &(size, size_name) in &SIZES {
        group.bench_function(format!("mul_sum_backward/{}", size_name), |b| {
            let x = Tensor::ones(&[size]);
            x.set_requires_grad(true);
            let w = Tensor::full(&[size], 2.0);
            w.set_requires_grad(true);
            b.iter(|| {
                let loss = x.mul(&w).sum();
                loss.backward(BackwardOptions::new());
                x.reset_grad();
                w.reset_grad();
            })
        });

        group.bench_function(format!("view_chain_backward/{}", size_name), |b| {
            let x = Tensor::ones(&[2, size / 2]);
            x.set_requires_grad(true);
            b.iter(|| {
                let loss = x.transpose(0, 1).narrow(0, 0, size / 4).mul_scalar(3.0).sum();
                loss.backward(BackwardOptions::new());
                x.reset_grad();
            })
        });

        group.bench_function(format!("hooked_accumulate/{}", size_name), |b| {
            let x = Tensor::ones(&[size]);
            x.set_requires_grad(true);
            x.register_hook(|g: &Tensor| g.mul_scalar(0.5));
            b.iter(|| {
                x.backward(BackwardOptions::new().gradient(black_box(Tensor::ones(&[size]))));
            })
        });
    }

    group.finish();
}
