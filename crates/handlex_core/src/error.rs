use crate::{device::Device, dtype::DType, tags::LayoutKind};
use std::fmt;

#[derive(Debug)]
pub enum Error {
    OutOfMemory,
    DTypeMismatch {
        expected: DType,
        got: DType,
    },
    DeviceMismatch {
        expected: Device,
        got: Device,
    },
    UnsupportedDType,
    InvalidArgument(String),
    InvalidDevice(String),
    IncompatibleShape(String),
    //
    Lock,
    BufferShared,
    InvalidState(String),
    DimensionMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    DimensionOutOfBounds {
        dim: i64,
        ndim: usize,
    },
    IndexOutOfBounds {
        index: usize,
        size: usize,
    },
    // handle
    UndefinedTensor,
    NoStorage,
    UnsupportedLayout {
        op: &'static str,
        layout: LayoutKind,
    },
    // autograd
    RequiresGrad(String),
    InvalidHook {
        id: usize,
    },
    NotAView,
    SavedTensorModified {
        name: &'static str,
        saved_version: u64,
        current_version: u64,
    },
    GraphReleased {
        node: String,
    },
    // serde
    #[cfg(feature = "serde")]
    SerializationError(String),
    #[cfg(feature = "serde")]
    DeserializationError(String),
    //
    Internal {
        message: String,
    },
    External {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "Out of memory"),
            Self::DTypeMismatch { expected, got } => {
                write!(f, "DType mismatch: expected {:?}, got {:?}", expected, got)
            },
            Self::DeviceMismatch { expected, got } => {
                write!(f, "Device mismatch: expected {}, got {}", expected.name(), got.name())
            },
            Self::UnsupportedDType => write!(f, "Unsupported data type"),
            Self::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Self::InvalidDevice(msg) => write!(f, "Invalid device: {}", msg),
            Self::IncompatibleShape(msg) => write!(f, "Incompatible shape: {}", msg),

            Self::Lock => write!(f, "Failed to acquire lock"),
            Self::BufferShared => write!(f, "Buffer is shared"),
            Self::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Self::DimensionMismatch { expected, got } => {
                write!(f, "Dimension mismatch: expected {:?}, got {:?}", expected, got)
            },
            Self::DimensionOutOfBounds { dim, ndim } => {
                write!(
                    f,
                    "Dimension out of bounds: dimension {} is not valid for tensor with {} dimensions",
                    dim, ndim
                )
            },
            Self::IndexOutOfBounds { index, size } => {
                write!(f, "Index out of bounds: index {} is out of bounds for tensor with size {}", index, size)
            },

            Self::UndefinedTensor => write!(f, "Undefined tensor: the handle is not bound to a TensorImpl"),
            Self::NoStorage => write!(f, "Tensor has no storage (meta tensor)"),
            Self::UnsupportedLayout { op, layout } => {
                write!(f, "{} is not defined for {} tensors", op, layout.as_str())
            },

            Self::RequiresGrad(msg) => write!(f, "Autograd error: {}", msg),
            Self::InvalidHook { id } => write!(f, "Invalid hook id: no hook registered at position {}", id),
            Self::NotAView => write!(f, "Can't get base of non-view tensor"),
            Self::SavedTensorModified {
                name,
                saved_version,
                current_version,
            } => {
                write!(
                    f,
                    "one of the variables needed for gradient computation ({}) has been modified by an inplace operation: it is at version {}; expected version {} instead",
                    name, current_version, saved_version
                )
            },
            Self::GraphReleased { node } => {
                write!(
                    f,
                    "Trying to backward through the graph a second time ({}); saved tensors were already freed, pass retain_graph = true on the first backward",
                    node
                )
            },

            #[cfg(feature = "serde")]
            Self::SerializationError(msg) => {
                write!(f, "Serialization error: {}", msg)
            },
            #[cfg(feature = "serde")]
            Self::DeserializationError(msg) => {
                write!(f, "Deserialization error: {}", msg)
            },
            Self::Internal { message } => {
                write!(f, "Internal error: {}", message)
            },
            Self::External { message } => {
                write!(f, "External error: {}", message)
            },
        }
    }
}

impl std::error::Error for Error {}
