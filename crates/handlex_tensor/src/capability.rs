use crate::Tensor;
use handlex_core::{
    error::{Error, Result},
    memory_format::MemoryFormat,
    tags::{LayoutKind, Tag},
};

/// ## Capability queries
///
/// Pure reads of the impl's tag set. Each call loads the tags afresh; callers that
/// need a consistent snapshot across several checks should read
/// [`key_set`](Tensor::key_set) once and test the returned [`TagSet`](handlex_core::tags::TagSet).
impl Tensor {
    #[inline]
    fn has_tag(&self, tag: Tag) -> bool {
        self.inner().tags().contains(tag)
    }

    pub fn is_cpu(&self) -> bool {
        self.has_tag(Tag::Cpu)
    }

    pub fn is_cuda(&self) -> bool {
        self.has_tag(Tag::Cuda)
    }

    pub fn is_mps(&self) -> bool {
        self.has_tag(Tag::Mps)
    }

    pub fn is_meta(&self) -> bool {
        self.has_tag(Tag::Meta)
    }

    pub fn is_strided(&self) -> bool {
        self.has_tag(Tag::Strided)
    }

    pub fn is_sparse(&self) -> bool {
        self.has_tag(Tag::Sparse)
    }

    pub fn is_sparse_csr(&self) -> bool {
        self.has_tag(Tag::SparseCsr)
    }

    pub fn is_mkldnn(&self) -> bool {
        self.has_tag(Tag::Mkldnn)
    }

    pub fn is_floating_point(&self) -> bool {
        self.has_tag(Tag::Floating)
    }

    pub fn is_signed(&self) -> bool {
        self.inner().dtype().is_signed()
    }

    pub fn is_conj(&self) -> bool {
        self.has_tag(Tag::Conjugate)
    }

    pub fn is_inference(&self) -> bool {
        self.has_tag(Tag::Inference)
    }

    pub fn has_storage(&self) -> bool {
        !self.has_tag(Tag::NoStorage)
    }

    pub fn layout_kind(&self) -> LayoutKind {
        self.inner().layout_kind()
    }

    /// Flips the lazy-conjugation bit. Shared with every other handle to this impl;
    /// concurrent writers need outside synchronization.
    pub fn set_conj(&self, conj: bool) {
        self.inner().set_tag(Tag::Conjugate, conj);
    }

    /// The memory format a consumer should ask for to avoid a reorder.
    ///
    /// Only strided tensors are candidates for channels-last. With `exact_match`, the
    /// strides must also equal the canonical channels-last strides for this shape.
    pub fn suggest_memory_format(&self, exact_match: bool) -> MemoryFormat {
        let inner = self.inner();
        if inner.layout_kind() != LayoutKind::Strided {
            return MemoryFormat::Contiguous;
        }
        inner.layout().suggest_memory_format(exact_match)
    }

    /// Bytes spanned by this tensor's elements.
    ///
    /// # Errors
    ///
    /// * [`Error::UnsupportedLayout`] for COO sparse tensors, whose byte size depends on
    ///   the number of stored entries rather than the shape
    pub fn try_nbytes(&self) -> Result<usize> {
        let inner = self.try_impl()?;
        if inner.layout_kind() == LayoutKind::Sparse {
            return Err(Error::UnsupportedLayout {
                op: "nbytes",
                layout: LayoutKind::Sparse,
            });
        }
        Ok(inner.layout().size() * inner.dtype().size_in_bytes())
    }

    pub fn nbytes(&self) -> usize {
        self.try_nbytes().expect("failed to compute nbytes")
    }
}
