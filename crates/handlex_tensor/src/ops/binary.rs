use crate::Tensor;

impl Tensor {
    pub fn add(&self, rhs: &Self) -> Self {
        self.try_add(rhs).expect("failed to add tensors")
    }

    pub fn mul(&self, rhs: &Self) -> Self {
        self.try_mul(rhs).expect("failed to multiply tensors")
    }
}
