use crate::Tensor;
use handlex_core::memory_format::MemoryFormat;

impl Tensor {
    pub fn clone_tensor(&self) -> Self {
        self.try_clone_tensor().expect("failed to clone tensor")
    }

    pub fn contiguous(&self) -> Self {
        self.try_contiguous().expect("failed to make tensor contiguous")
    }

    pub fn contiguous_with_format(&self, format: MemoryFormat) -> Self {
        self.try_contiguous_with_format(format)
            .expect("failed to make tensor contiguous")
    }
}
