use half::{bf16, f16};
use handlex_core::{
    dtype::{DType, Element},
    error::{Error, Result},
};

/// Host data that can seed a tensor: scalars, nested `Vec`s and fixed-size arrays.
pub trait TensorAdapter: Sized {
    type Elem: Element;

    fn to_flatten_vec(self) -> Result<Vec<Self::Elem>>;
    fn get_shape(&self) -> Vec<usize>;
    fn dtype(&self) -> DType {
        <Self::Elem as Element>::DTYPE
    }
}

fn ragged(depth: usize, expected: usize, got: usize) -> Error {
    Error::IncompatibleShape(format!(
        "ragged nested data at depth {}: expected length {}, got {}",
        depth, expected, got
    ))
}

macro_rules! impl_tensor_adapter {
    ($t:ty) => {
        // Scalar (zero-dimensional tensor)
        impl TensorAdapter for $t {
            type Elem = $t;

            fn to_flatten_vec(self) -> Result<Vec<$t>> {
                Ok(vec![self])
            }
            fn get_shape(&self) -> Vec<usize> {
                vec![]
            }
        }

        // 1D Vector
        impl TensorAdapter for Vec<$t> {
            type Elem = $t;

            fn to_flatten_vec(self) -> Result<Vec<$t>> {
                Ok(self)
            }
            fn get_shape(&self) -> Vec<usize> {
                vec![self.len()]
            }
        }

        // 2D Vector
        impl TensorAdapter for Vec<Vec<$t>> {
            type Elem = $t;

            fn to_flatten_vec(self) -> Result<Vec<$t>> {
                let cols = self.first().map_or(0, Vec::len);
                let mut flat = Vec::with_capacity(self.len() * cols);
                for row in self {
                    if row.len() != cols {
                        return Err(ragged(1, cols, row.len()));
                    }
                    flat.extend(row);
                }
                Ok(flat)
            }
            fn get_shape(&self) -> Vec<usize> {
                vec![self.len(), self.first().map_or(0, Vec::len)]
            }
        }

        // 3D Vector
        impl TensorAdapter for Vec<Vec<Vec<$t>>> {
            type Elem = $t;

            fn to_flatten_vec(self) -> Result<Vec<$t>> {
                let shape = self.get_shape();
                let mut flat = Vec::with_capacity(shape.iter().product());
                for matrix in self {
                    if matrix.len() != shape[1] {
                        return Err(ragged(1, shape[1], matrix.len()));
                    }
                    for row in matrix {
                        if row.len() != shape[2] {
                            return Err(ragged(2, shape[2], row.len()));
                        }
                        flat.extend(row);
                    }
                }
                Ok(flat)
            }
            fn get_shape(&self) -> Vec<usize> {
                let rows = self.first().map_or(0, Vec::len);
                let cols = self.first().and_then(|m| m.first()).map_or(0, Vec::len);
                vec![self.len(), rows, cols]
            }
        }

        // 1D Array
        impl<'a, const N: usize> TensorAdapter for &'a [$t; N] {
            type Elem = $t;

            fn to_flatten_vec(self) -> Result<Vec<$t>> {
                Ok(self.to_vec())
            }
            fn get_shape(&self) -> Vec<usize> {
                vec![N]
            }
        }

        // 2D Array
        impl<'a, const M: usize, const N: usize> TensorAdapter for &'a [[$t; N]; M] {
            type Elem = $t;

            fn to_flatten_vec(self) -> Result<Vec<$t>> {
                Ok(self.iter().flat_map(|row| row.iter().copied()).collect())
            }
            fn get_shape(&self) -> Vec<usize> {
                vec![M, N]
            }
        }

        // 1D Slice
        impl<'a> TensorAdapter for &'a [$t] {
            type Elem = $t;

            fn to_flatten_vec(self) -> Result<Vec<$t>> {
                Ok(self.to_vec())
            }
            fn get_shape(&self) -> Vec<usize> {
                vec![self.len()]
            }
        }
    };
}

impl_tensor_adapter!(bool);
impl_tensor_adapter!(bf16);
impl_tensor_adapter!(f16);
impl_tensor_adapter!(f32);
impl_tensor_adapter!(f64);
impl_tensor_adapter!(i8);
impl_tensor_adapter!(i32);
impl_tensor_adapter!(i64);
impl_tensor_adapter!(u8);
impl_tensor_adapter!(u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_vec_reports_shape_and_flattens_row_major() {
        let data = vec![vec![1.0f32, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        assert_eq!(data.get_shape(), vec![2, 3]);
        assert_eq!(data.dtype(), DType::F32);
        assert_eq!(data.to_flatten_vec().unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let data = vec![vec![1i32, 2], vec![3]];
        assert!(matches!(data.to_flatten_vec(), Err(Error::IncompatibleShape(_))));
    }

    #[test]
    fn arrays_keep_their_static_shape() {
        let data = &[[1u8, 2], [3, 4], [5, 6]];
        assert_eq!(data.get_shape(), vec![3, 2]);
        assert_eq!(data.to_flatten_vec().unwrap(), vec![1, 2, 3, 4, 5, 6]);
    }
}
