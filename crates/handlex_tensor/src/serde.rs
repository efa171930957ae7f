use crate::{options::TensorOptions, storage::Storage, tensor_impl::TensorImpl, Tensor};
use handlex_core::{device::Device, dtype::DType, error, layout::Layout, tags::LayoutKind};
use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};

/// On-wire form of a tensor: its geometry plus the whole backing storage, so strides
/// and storage offset survive a round trip. Meta tensors carry no storage bytes.
#[derive(Serialize, Deserialize)]
pub struct SerializedTensor {
    pub shape: Vec<usize>,
    pub strides: Vec<usize>,
    pub offset: usize,
    pub dtype: DType,
    pub device: Device,
    pub layout_kind: LayoutKind,
    pub requires_grad: bool,
    pub storage_len: usize,
    pub storage: Option<Vec<u8>>,
}

impl SerializedTensor {
    pub fn from_tensor(tensor: &Tensor) -> error::Result<Self> {
        let inner = tensor.try_impl()?;
        let storage = match inner.storage() {
            Some(storage) => {
                let mut bytes = vec![0u8; storage.nbytes()];
                let buffer = storage.read()?;
                unsafe {
                    buffer.copy_to_host(bytes.as_mut_ptr() as *mut std::ffi::c_void, bytes.len(), 0, 0)?;
                }
                Some(bytes)
            },
            None => None,
        };

        Ok(Self {
            shape: inner.layout().shape().to_vec(),
            strides: inner.layout().strides().to_vec(),
            offset: inner.layout().offset(),
            dtype: inner.dtype(),
            device: inner.device(),
            layout_kind: inner.layout_kind(),
            requires_grad: tensor.try_requires_grad()? && tensor.try_is_leaf()?,
            storage_len: inner.storage().map_or(0, Storage::len),
            storage,
        })
    }

    /// Rebuilds a leaf tensor with fresh storage.
    pub fn into_tensor(self) -> error::Result<Tensor> {
        let layout = Layout::new(&self.shape, &self.strides, self.offset)?;
        let options = TensorOptions::new()
            .dtype(self.dtype)
            .device(self.device)
            .layout_kind(self.layout_kind)
            .requires_grad(self.requires_grad);

        let tensor_impl = match self.storage {
            Some(bytes) => {
                let expected = self.storage_len * self.dtype.size_in_bytes();
                if bytes.len() != expected {
                    return Err(error::Error::DeserializationError(format!(
                        "storage holds {} bytes, expected {}",
                        bytes.len(),
                        expected
                    )));
                }
                let storage = Storage::allocate(self.storage_len, self.device, self.dtype)?;
                {
                    let mut buffer = storage.write()?;
                    unsafe {
                        buffer.copy_from_host(bytes.as_ptr() as *const std::ffi::c_void, bytes.len(), 0, 0)?;
                    }
                }
                TensorImpl::new(storage, layout, options)?
            },
            None => TensorImpl::new_meta(layout, options)?,
        };
        Ok(Tensor::from_impl(tensor_impl))
    }
}

impl Serialize for Tensor {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        SerializedTensor::from_tensor(self)
            .map_err(ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Tensor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        SerializedTensor::deserialize(deserializer)?
            .into_tensor()
            .map_err(de::Error::custom)
    }
}

impl Tensor {
    pub fn to_bytes(&self) -> error::Result<Vec<u8>> {
        let config = bincode::config::legacy();
        bincode::serde::encode_to_vec(self, config)
            .map_err(|e| error::Error::SerializationError(format!("Failed to serialize tensor: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> error::Result<Self> {
        let config = bincode::config::legacy();
        bincode::serde::decode_from_slice(bytes, config)
            .map(|(value, _)| value)
            .map_err(|e| error::Error::DeserializationError(format!("Failed to deserialize tensor: {}", e)))
    }

    pub fn to_json(&self) -> error::Result<String> {
        serde_json::to_string(self)
            .map_err(|e| error::Error::SerializationError(format!("Failed to serialize tensor to JSON: {}", e)))
    }

    pub fn from_json(json: &str) -> error::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| error::Error::DeserializationError(format!("Failed to deserialize tensor from JSON: {}", e)))
    }
}
