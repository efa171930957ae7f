use crate::{storage::Storage, Tensor};
use handlex_core::{
    error::{Error, Result},
    tags::LayoutKind,
};

impl Tensor {
    /// The backing storage, or [`Error::NoStorage`] for meta tensors.
    pub(crate) fn try_storage(&self) -> Result<&Storage> {
        self.try_impl()?.storage().ok_or(Error::NoStorage)
    }

    pub(crate) fn ensure_strided(&self, op: &'static str) -> Result<()> {
        let layout = self.try_impl()?.layout_kind();
        if layout != LayoutKind::Strided {
            return Err(Error::UnsupportedLayout { op, layout });
        }
        Ok(())
    }

    /// Both operands strided, with equal shapes, dtypes and devices.
    pub(crate) fn ensure_matching_operand(&self, op: &'static str, rhs: &Tensor) -> Result<()> {
        self.ensure_strided(op)?;
        rhs.ensure_strided(op)?;
        let (lhs, rhs) = (self.try_impl()?, rhs.try_impl()?);
        if lhs.layout().shape() != rhs.layout().shape() {
            return Err(Error::DimensionMismatch {
                expected: lhs.layout().shape().to_vec(),
                got: rhs.layout().shape().to_vec(),
            });
        }
        if lhs.dtype() != rhs.dtype() {
            return Err(Error::DTypeMismatch {
                expected: lhs.dtype(),
                got: rhs.dtype(),
            });
        }
        if lhs.device() != rhs.device() {
            return Err(Error::DeviceMismatch {
                expected: lhs.device(),
                got: rhs.device(),
            });
        }
        Ok(())
    }

    /// Records an in-place mutation on the version counter shared with every alias.
    pub(crate) fn bump_version(&self) -> Result<u64> {
        Ok(self.try_impl()?.version_counter().bump())
    }
}
