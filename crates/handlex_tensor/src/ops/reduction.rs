use crate::Tensor;

impl Tensor {
    pub fn sum(&self) -> Self {
        self.try_sum().expect("failed to sum tensor")
    }
}
