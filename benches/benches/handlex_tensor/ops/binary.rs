use criterion::{black_box, Criterion};
use handlex_core::{device::Device, dtype::DType, error::Result};
use handlex_tensor::Tensor;

const SIZES: [(usize, &str); 3] = [(100, "small"), (5000, "medium"), (10000, "large")];

fn bench_binary_op<F>(b: &mut criterion::Bencher, dtype: DType, size: usize, op_fn: F)
where
    F: Fn(&Tensor, &Tensor) -> Result<Tensor>,
{
    let data: Vec<f32> = (0..size).map(|i| i as f32).collect();
    let x = Tensor::new_with_spec(data.clone(), Device::CPU, dtype);
    let y = Tensor::new_with_spec(data.iter().map(|v| v + 1.0).collect::<Vec<f32>>(), Device::CPU, dtype);

    b.iter(|| black_box(op_fn(&x, &y)).unwrap())
}

pub fn basic(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("binary/basic");
    group.warm_up_time(core::time::Duration::from_millis(500));
    group.measurement_time(core::time::Duration::from_secs(3));
    group.sample_size(50);

    let operations: Vec<(&str, Box<dyn Fn(&Tensor, &Tensor) -> Result<Tensor>>)> = vec![
        ("add", Box::new(|x, y| x.try_add(y))),
        ("mul", Box::new(|x, y| x.try_mul(y))),
        ("add_strided", Box::new(|x, y| x.try_as_strided(&[x.numel() / 2], &[2], 0)?.try_add(&y.try_as_strided(&[y.numel() / 2], &[2], 1)?))),
    ];

    for (name, op) in &operations {
        for &(size, size_name) in &SIZES {
            for dtype in [DType::F32, DType::F64] {
                group.bench_function(format!("{}/{}/{}", name, dtype.as_str(), size_name), |b| {
                    bench_binary_op(b, dtype, size, op)
                });
            }
        }
    }

    for &(size, size_name) in &SIZES {
        group.bench_function(format!("add_/f32/{}", size_name), |b| {
            let data: Vec<f32> = (0..size).map(|i| i as f32).collect();
            let x = Tensor::new(data.clone());
            let y = Tensor::new(data);
            b.iter(|| x.try_add_(black_box(&y)).unwrap())
        });
    }

    group.finish();
}
