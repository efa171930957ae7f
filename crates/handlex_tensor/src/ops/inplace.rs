use crate::Tensor;

impl Tensor {
    pub fn add_(&self, rhs: &Self) {
        self.try_add_(rhs).expect("failed to add_ tensors")
    }

    pub fn copy_(&self, src: &Self) {
        self.try_copy_(src).expect("failed to copy_ tensor")
    }
}
