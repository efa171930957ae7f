use crate::{
    error::{Error, Result},
    memory_format::MemoryFormat,
};
use handlex_cpu::utils::storage_extent;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const CHANNELS_LAST_2D_ORDER: [usize; 4] = [1, 3, 2, 0];
const CHANNELS_LAST_3D_ORDER: [usize; 5] = [1, 4, 3, 2, 0];

/// Shape, strides and element offset of a strided tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Layout {
    shape: Vec<usize>,
    strides: Vec<usize>,
    offset: usize,
}

impl Layout {
    pub fn new(shape: &[usize], strides: &[usize], offset: usize) -> Result<Self> {
        if shape.len() != strides.len() {
            return Err(Error::InvalidArgument(format!(
                "shape has {} dimensions but strides has {}",
                shape.len(),
                strides.len()
            )));
        }
        Ok(Self {
            shape: shape.to_vec(),
            strides: strides.to_vec(),
            offset,
        })
    }

    pub fn from_shape(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            strides: Self::compute_strides(shape),
            offset: 0,
        }
    }

    /// Dense layout for `shape` in the requested ordering.
    pub fn with_memory_format(shape: &[usize], format: MemoryFormat) -> Result<Self> {
        let strides = match format {
            MemoryFormat::Contiguous => Self::compute_strides(shape),
            MemoryFormat::ChannelsLast => Self::channels_last_strides_2d(shape)?,
            MemoryFormat::ChannelsLast3d => Self::channels_last_strides_3d(shape)?,
            MemoryFormat::Preserve => {
                return Err(Error::InvalidArgument(
                    "preserve is not a concrete memory format".into(),
                ))
            },
        };
        Ok(Self {
            shape: shape.to_vec(),
            strides,
            offset: 0,
        })
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }
    pub fn size_dim(&self, dim: usize) -> Option<usize> {
        self.shape.get(dim).copied()
    }
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of buffer elements this layout reaches, from element 0.
    pub fn storage_extent(&self) -> usize {
        storage_extent(self.ndim(), &self.shape, &self.strides, self.offset)
    }

    /// Row-major contiguity. Dimensions of size 1 may carry any stride.
    pub fn is_contiguous(&self) -> bool {
        if self.size() == 0 {
            return true;
        }
        let mut expected = 1;
        for d in (0..self.ndim()).rev() {
            if self.shape[d] != 1 {
                if self.strides[d] != expected {
                    return false;
                }
                expected *= self.shape[d];
            }
        }
        true
    }

    pub fn is_contiguous_memory_format(&self, format: MemoryFormat) -> bool {
        match format {
            MemoryFormat::Contiguous | MemoryFormat::Preserve => self.is_contiguous(),
            MemoryFormat::ChannelsLast => self.ndim() == 4 && self.dense_in_order(&CHANNELS_LAST_2D_ORDER),
            MemoryFormat::ChannelsLast3d => self.ndim() == 5 && self.dense_in_order(&CHANNELS_LAST_3D_ORDER),
        }
    }

    fn dense_in_order(&self, order: &[usize]) -> bool {
        if self.size() == 0 {
            return true;
        }
        let mut expected = 1;
        for &d in order {
            if self.shape[d] != 1 {
                if self.strides[d] != expected {
                    return false;
                }
                expected *= self.shape[d];
            }
        }
        true
    }

    /// Whether the strides look like an NHWC tensor, even if not densely packed.
    ///
    /// Ambiguous cases (for example a `C == 1` tensor) resolve to the row-major ordering.
    pub fn is_strides_like_channels_last(&self) -> bool {
        self.ndim() == 4 && self.strides_follow_order(&CHANNELS_LAST_2D_ORDER)
    }

    pub fn is_strides_like_channels_last_3d(&self) -> bool {
        self.ndim() == 5 && self.strides_follow_order(&CHANNELS_LAST_3D_ORDER)
    }

    fn strides_follow_order(&self, order: &[usize]) -> bool {
        if self.strides[1] == 0 {
            return false;
        }
        let mut min = 0;
        for &d in order {
            if self.shape[d] == 0 || self.strides[d] < min {
                return false;
            }
            if d == 0 && min == self.strides[1] {
                return false;
            }
            min = self.strides[d];
            if self.shape[d] > 1 {
                min *= self.shape[d];
            }
        }
        true
    }

    /// No two indices share a buffer slot and the addressed slots form one gap-free run.
    pub fn is_non_overlapping_and_dense(&self) -> bool {
        let ndim = self.ndim();
        if ndim == 1 {
            return self.shape[0] < 2 || self.strides[0] == 1;
        }
        let mut perm: Vec<usize> = (0..ndim).collect();
        perm.sort_by_key(|&d| (self.shape[d] < 2, self.strides[d]));
        let mut required = 1;
        for d in perm {
            if self.shape[d] < 2 {
                return true;
            }
            if self.strides[d] != required {
                return false;
            }
            required *= self.shape[d];
        }
        true
    }

    /// Suggests the memory format a consumer should request to avoid reordering.
    ///
    /// With `exact_match`, channels-last is only reported when the strides equal the
    /// canonical channels-last strides for this shape.
    pub fn suggest_memory_format(&self, exact_match: bool) -> MemoryFormat {
        if self.is_strides_like_channels_last() {
            if !exact_match || Self::channels_last_strides_2d(&self.shape).ok().as_deref() == Some(&self.strides[..]) {
                return MemoryFormat::ChannelsLast;
            }
        } else if self.is_strides_like_channels_last_3d()
            && (!exact_match
                || Self::channels_last_strides_3d(&self.shape).ok().as_deref() == Some(&self.strides[..]))
        {
            return MemoryFormat::ChannelsLast3d;
        }
        MemoryFormat::Contiguous
    }

    // transforms

    fn check_dim(&self, dim: usize) -> Result<()> {
        if dim >= self.ndim() {
            return Err(Error::DimensionOutOfBounds {
                dim: dim as i64,
                ndim: self.ndim(),
            });
        }
        Ok(())
    }

    pub fn view(&self, new_shape: &[usize]) -> Result<Self> {
        let old_size = self.size();
        let new_size: usize = new_shape.iter().product();

        if old_size != new_size {
            return Err(Error::IncompatibleShape(format!(
                "Cannot reshape layout of size {} to size {}",
                old_size, new_size
            )));
        }
        if !self.is_contiguous() {
            return Err(Error::IncompatibleShape(
                "view requires a contiguous tensor; call contiguous() first".into(),
            ));
        }

        Ok(Self {
            shape: new_shape.to_vec(),
            strides: Self::compute_strides(new_shape),
            offset: self.offset,
        })
    }

    pub fn transpose(&self, dim0: usize, dim1: usize) -> Result<Self> {
        self.check_dim(dim0)?;
        self.check_dim(dim1)?;

        let mut out = self.clone();
        out.shape.swap(dim0, dim1);
        out.strides.swap(dim0, dim1);
        Ok(out)
    }

    pub fn permute(&self, dims: &[usize]) -> Result<Self> {
        if dims.len() != self.ndim() {
            return Err(Error::InvalidArgument(format!(
                "permute expects {} dimensions, got {}",
                self.ndim(),
                dims.len()
            )));
        }
        let mut seen = vec![false; self.ndim()];
        for &d in dims {
            self.check_dim(d)?;
            if std::mem::replace(&mut seen[d], true) {
                return Err(Error::InvalidArgument(format!("dimension {} repeated in permute", d)));
            }
        }
        Ok(Self {
            shape: dims.iter().map(|&d| self.shape[d]).collect(),
            strides: dims.iter().map(|&d| self.strides[d]).collect(),
            offset: self.offset,
        })
    }

    pub fn narrow(&self, dim: usize, start: usize, length: usize) -> Result<Self> {
        self.check_dim(dim)?;
        if start + length > self.shape[dim] {
            return Err(Error::IndexOutOfBounds {
                index: start + length,
                size: self.shape[dim],
            });
        }
        let mut out = self.clone();
        out.shape[dim] = length;
        out.offset += start * self.strides[dim];
        Ok(out)
    }

    // helper

    pub fn compute_strides(shape: &[usize]) -> Vec<usize> {
        if shape.is_empty() {
            return vec![];
        }

        let mut strides = vec![1; shape.len()];
        for i in (0..shape.len() - 1).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        strides
    }

    pub fn compute_size(shape: &[usize]) -> usize {
        shape.iter().product()
    }

    pub fn channels_last_strides_2d(shape: &[usize]) -> Result<Vec<usize>> {
        if shape.len() != 4 {
            return Err(Error::IncompatibleShape(format!(
                "channels_last requires a 4-d shape, got {} dimensions",
                shape.len()
            )));
        }
        let mut strides = vec![0; 4];
        strides[1] = 1;
        strides[3] = shape[1];
        strides[2] = strides[3] * shape[3];
        strides[0] = strides[2] * shape[2];
        Ok(strides)
    }

    pub fn channels_last_strides_3d(shape: &[usize]) -> Result<Vec<usize>> {
        if shape.len() != 5 {
            return Err(Error::IncompatibleShape(format!(
                "channels_last_3d requires a 5-d shape, got {} dimensions",
                shape.len()
            )));
        }
        let mut strides = vec![0; 5];
        strides[1] = 1;
        strides[4] = shape[1];
        strides[3] = strides[4] * shape[4];
        strides[2] = strides[3] * shape[3];
        strides[0] = strides[2] * shape[2];
        Ok(strides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_last_strides_match_nhwc() {
        assert_eq!(Layout::channels_last_strides_2d(&[2, 3, 4, 5]).unwrap(), vec![60, 1, 15, 3]);
        assert_eq!(
            Layout::channels_last_strides_3d(&[2, 3, 4, 5, 6]).unwrap(),
            vec![360, 1, 90, 18, 3]
        );
        assert!(Layout::channels_last_strides_2d(&[2, 3]).is_err());
    }

    #[test]
    fn suggest_prefers_channels_last_for_nhwc() {
        let nhwc = Layout::with_memory_format(&[2, 3, 4, 5], MemoryFormat::ChannelsLast).unwrap();
        assert!(nhwc.is_contiguous_memory_format(MemoryFormat::ChannelsLast));
        assert!(!nhwc.is_contiguous());
        assert_eq!(nhwc.suggest_memory_format(false), MemoryFormat::ChannelsLast);
        assert_eq!(nhwc.suggest_memory_format(true), MemoryFormat::ChannelsLast);

        let nchw = Layout::from_shape(&[2, 3, 4, 5]);
        assert_eq!(nchw.suggest_memory_format(false), MemoryFormat::Contiguous);
    }

    #[test]
    fn ambiguous_single_channel_is_contiguous() {
        // N x 1 x 1 x 1 has identical strides in both orderings.
        let layout = Layout::from_shape(&[2, 1, 1, 1]);
        assert_eq!(layout.strides(), Layout::channels_last_strides_2d(&[2, 1, 1, 1]).unwrap().as_slice());
        assert_eq!(layout.suggest_memory_format(false), MemoryFormat::Contiguous);
    }

    #[test]
    fn exact_match_rejects_padded_channels_last() {
        // NHWC-ordered but with a padded batch stride.
        let layout = Layout::new(&[2, 3, 4, 5], &[64, 1, 15, 3], 0).unwrap();
        assert_eq!(layout.suggest_memory_format(false), MemoryFormat::ChannelsLast);
        assert_eq!(layout.suggest_memory_format(true), MemoryFormat::Contiguous);
    }

    #[test]
    fn dense_and_overlap_checks() {
        assert!(Layout::from_shape(&[2, 3]).is_non_overlapping_and_dense());
        assert!(Layout::new(&[2, 3], &[1, 2], 0).unwrap().is_non_overlapping_and_dense());
        assert!(!Layout::new(&[2, 3], &[0, 1], 0).unwrap().is_non_overlapping_and_dense());
        assert!(!Layout::new(&[2, 3], &[6, 1], 0).unwrap().is_non_overlapping_and_dense());
        assert!(Layout::new(&[1], &[7], 0).unwrap().is_non_overlapping_and_dense());
    }

    #[test]
    fn narrow_moves_offset() {
        let layout = Layout::from_shape(&[4, 3]).narrow(0, 1, 2).unwrap();
        assert_eq!(layout.shape(), &[2, 3]);
        assert_eq!(layout.offset(), 3);
        assert_eq!(layout.storage_extent(), 9);
        assert!(Layout::from_shape(&[4, 3]).narrow(0, 3, 2).is_err());
    }

    #[test]
    fn transpose_out_of_bounds_errors() {
        assert!(Layout::from_shape(&[2, 3]).transpose(0, 2).is_err());
        let t = Layout::from_shape(&[2, 3]).transpose(0, 1).unwrap();
        assert_eq!(t.strides(), &[1, 3]);
        assert!(!t.is_contiguous());
    }
}
