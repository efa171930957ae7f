#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Preferred physical ordering of a tensor's dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MemoryFormat {
    #[default]
    Contiguous,
    /// NHWC ordering for 4-d tensors.
    ChannelsLast,
    /// NDHWC ordering for 5-d tensors.
    ChannelsLast3d,
    /// Keep whatever ordering the source already has.
    Preserve,
}

impl MemoryFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contiguous => "contiguous",
            Self::ChannelsLast => "channels_last",
            Self::ChannelsLast3d => "channels_last_3d",
            Self::Preserve => "preserve",
        }
    }
}
