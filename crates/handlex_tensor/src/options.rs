use handlex_core::{
    device::{get_default_device, Device},
    dtype::{get_default_dtype, DType},
    tags::LayoutKind,
};

/// Whether differentiable operations record history.
///
/// Passed explicitly to the `*_with` form of every differentiable operation. The
/// method-style forms use [`GradMode::ENABLED`]; the backward engine hands nodes and
/// hooks `ENABLED` only when a higher-order graph was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GradMode {
    enabled: bool,
}

impl GradMode {
    pub const ENABLED: GradMode = GradMode { enabled: true };
    pub const DISABLED: GradMode = GradMode { enabled: false };

    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub const fn from_create_graph(create_graph: bool) -> Self {
        Self::new(create_graph)
    }

    #[inline]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for GradMode {
    fn default() -> Self {
        Self::ENABLED
    }
}

/// Creation-time overrides. Unset fields fall back to the thread-local defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TensorOptions {
    dtype: Option<DType>,
    device: Option<Device>,
    layout_kind: LayoutKind,
    requires_grad: bool,
    inference: bool,
}

impl TensorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dtype(mut self, dtype: DType) -> Self {
        self.dtype = Some(dtype);
        self
    }

    pub fn device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    pub fn layout_kind(mut self, layout_kind: LayoutKind) -> Self {
        self.layout_kind = layout_kind;
        self
    }

    pub fn requires_grad(mut self, requires_grad: bool) -> Self {
        self.requires_grad = requires_grad;
        self
    }

    pub fn inference(mut self, inference: bool) -> Self {
        self.inference = inference;
        self
    }

    pub fn explicit_dtype(&self) -> Option<DType> {
        self.dtype
    }

    pub fn explicit_device(&self) -> Option<Device> {
        self.device
    }

    pub fn resolved_dtype(&self) -> DType {
        self.dtype.unwrap_or_else(get_default_dtype)
    }

    pub fn resolved_device(&self) -> Device {
        self.device.unwrap_or_else(get_default_device)
    }

    pub fn get_layout_kind(&self) -> LayoutKind {
        self.layout_kind
    }

    pub fn get_requires_grad(&self) -> bool {
        self.requires_grad
    }

    pub fn is_inference(&self) -> bool {
        self.inference
    }
}
