use crate::Tensor;

impl Tensor {
    pub fn mul_scalar(&self, scalar: f64) -> Self {
        self.try_mul_scalar(scalar).expect("failed to multiply tensor by scalar")
    }
}
