use crate::Tensor;

impl Tensor {
    pub fn view(&self, shape: &[usize]) -> Self {
        self.try_view(shape).expect("failed to create view")
    }

    pub fn transpose(&self, dim0: i64, dim1: i64) -> Self {
        self.try_transpose(dim0, dim1).expect("failed to transpose tensor")
    }

    pub fn permute(&self, dims: &[i64]) -> Self {
        self.try_permute(dims).expect("failed to permute tensor")
    }

    pub fn narrow(&self, dim: i64, start: usize, length: usize) -> Self {
        self.try_narrow(dim, start, length).expect("failed to narrow tensor")
    }

    pub fn as_strided(&self, shape: &[usize], strides: &[usize], offset: usize) -> Self {
        self.try_as_strided(shape, strides, offset)
            .expect("failed to create strided view")
    }
}
