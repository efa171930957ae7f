mod autograd;
mod binary;
mod handle;

use criterion::criterion_group;

criterion_group!(benches, binary::basic, handle::basic, autograd::basic);
