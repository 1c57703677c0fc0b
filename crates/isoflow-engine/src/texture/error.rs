use thiserror::Error;

use super::format::{DataType, PixelFormat};

/// Errors reported by texture allocation and binding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TextureError {
    /// An axis used by the target has zero extent.
    #[error("{target} texture requires a non-zero {axis} (got 0)")]
    ZeroExtent {
        target: &'static str,
        axis: &'static str,
    },

    /// Layer count does not fit the target (cube map arrays use multiples of 6).
    #[error("{target} texture requires a layer count that is a multiple of {multiple} (got {layers})")]
    InvalidLayerCount {
        target: &'static str,
        layers: u32,
        multiple: u32,
    },

    /// A single cube map has exactly six faces.
    #[error("{target} texture requires exactly 6 layers (got {layers})")]
    CubeFaceCount { target: &'static str, layers: u32 },

    /// Cube faces must be square.
    #[error("{target} texture requires width == height (got {width}x{height})")]
    NonSquareFaces {
        target: &'static str,
        width: u32,
        height: u32,
    },

    /// The internal format cannot be filled from the given pixel format / data type.
    #[error("internal format {internal_format:?} cannot be uploaded from {format:?}/{data_type:?}")]
    UnsupportedFormat {
        internal_format: wgpu::TextureFormat,
        format: PixelFormat,
        data_type: DataType,
    },

    /// Supplied pixel data does not cover exactly `width * height * depth` texels.
    #[error("texel data is {actual} bytes but the texture spec requires {expected} bytes")]
    DataSizeMismatch { expected: u64, actual: u64 },

    /// The target or format only supports uninitialized storage.
    #[error("{target} texture with format {internal_format:?} does not accept texel uploads")]
    UploadNotAllowed {
        target: &'static str,
        internal_format: wgpu::TextureFormat,
    },

    /// The target does not support mip levels beyond 0.
    #[error("{target} texture does not support mip level {mip_level}")]
    MipLevelUnsupported { target: &'static str, mip_level: u32 },

    /// The requested mip level would need a base level wider than `u32`.
    #[error("mip level {mip_level} is too large for a {extent} texel extent")]
    MipLevelTooLarge { mip_level: u32, extent: u32 },

    /// The texture has no storage yet.
    #[error("texture {name} has no storage; call allocate_storage first")]
    NotAllocated { name: String },
}
