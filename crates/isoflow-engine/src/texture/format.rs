use super::error::TextureError;

/// Component layout of texel data handed to the upload path.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PixelFormat {
    Red,
    Rg,
    Rgba,
    Bgra,
    Depth,
}

impl PixelFormat {
    /// Number of components per texel.
    pub const fn components(self) -> u32 {
        match self {
            PixelFormat::Red | PixelFormat::Depth => 1,
            PixelFormat::Rg => 2,
            PixelFormat::Rgba | PixelFormat::Bgra => 4,
        }
    }
}

/// Scalar type of each component in uploaded texel data.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DataType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
}

impl DataType {
    /// Size of one component in bytes.
    pub const fn size(self) -> u32 {
        match self {
            DataType::U8 | DataType::I8 => 1,
            DataType::U16 | DataType::I16 => 2,
            DataType::U32 | DataType::I32 | DataType::F32 => 4,
        }
    }
}

/// Texture dimensions plus the storage and upload formats.
///
/// `internal_format` is how the device stores texels; `format` and
/// `data_type` describe the bytes passed to [`super::Texture::allocate_storage`].
/// wgpu performs no format conversion on upload, so the pair must describe
/// exactly the internal layout (see [`TextureSpec::check_format`]).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TextureSpec {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub internal_format: wgpu::TextureFormat,
    pub format: PixelFormat,
    pub data_type: DataType,
}

impl TextureSpec {
    /// Spec reported by a texture that has never been allocated.
    pub const UNALLOCATED: TextureSpec = TextureSpec {
        width: 0,
        height: 0,
        depth: 0,
        internal_format: wgpu::TextureFormat::R8Unorm,
        format: PixelFormat::Red,
        data_type: DataType::U8,
    };

    /// Single-channel 32-bit float volume.
    pub const fn r32_float(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
            internal_format: wgpu::TextureFormat::R32Float,
            format: PixelFormat::Red,
            data_type: DataType::F32,
        }
    }

    /// Single-channel signed integer lookup table.
    pub const fn r32_sint(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth: 1,
            internal_format: wgpu::TextureFormat::R32Sint,
            format: PixelFormat::Red,
            data_type: DataType::I32,
        }
    }

    /// 32-bit float depth attachment.
    pub const fn depth32(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth: 1,
            internal_format: wgpu::TextureFormat::Depth32Float,
            format: PixelFormat::Depth,
            data_type: DataType::F32,
        }
    }

    /// Bytes per texel of the upload layout.
    pub const fn bytes_per_texel(&self) -> u32 {
        self.format.components() * self.data_type.size()
    }

    /// Number of texels these dimensions cover.
    pub const fn texel_count(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.depth as u64
    }

    /// Exact byte length texel data must have.
    pub const fn byte_len(&self) -> u64 {
        self.texel_count() * self.bytes_per_texel() as u64
    }

    /// Verifies that `format`/`data_type` match the internal storage layout.
    pub fn check_format(&self) -> Result<(), TextureError> {
        match upload_layout(self.internal_format) {
            Some(layout) if layout == (self.format, self.data_type) => Ok(()),
            _ => Err(TextureError::UnsupportedFormat {
                internal_format: self.internal_format,
                format: self.format,
                data_type: self.data_type,
            }),
        }
    }

    /// Whether texel data may be uploaded into this internal format.
    pub fn accepts_upload(&self) -> bool {
        !self.internal_format.is_depth_stencil_format()
    }

    /// Sample type a shader binding of this format must declare.
    ///
    /// 32-bit float formats are reported as non-filterable; filtering them
    /// needs a device feature the engine does not request.
    pub fn sample_type(&self) -> wgpu::TextureSampleType {
        use wgpu::TextureFormat as F;

        match self.internal_format {
            F::R8Sint | F::R16Sint | F::R32Sint => wgpu::TextureSampleType::Sint,
            F::R8Uint | F::R16Uint | F::R32Uint => wgpu::TextureSampleType::Uint,
            F::Depth32Float => wgpu::TextureSampleType::Depth,
            F::R32Float | F::Rg32Float | F::Rgba32Float => {
                wgpu::TextureSampleType::Float { filterable: false }
            }
            _ => wgpu::TextureSampleType::Float { filterable: true },
        }
    }
}

/// Upload layout each supported internal format expects.
fn upload_layout(internal: wgpu::TextureFormat) -> Option<(PixelFormat, DataType)> {
    use wgpu::TextureFormat as F;

    let layout = match internal {
        F::R8Unorm | F::R8Uint => (PixelFormat::Red, DataType::U8),
        F::R8Sint => (PixelFormat::Red, DataType::I8),
        F::R16Uint => (PixelFormat::Red, DataType::U16),
        F::R16Sint => (PixelFormat::Red, DataType::I16),
        F::R32Uint => (PixelFormat::Red, DataType::U32),
        F::R32Sint => (PixelFormat::Red, DataType::I32),
        F::R32Float => (PixelFormat::Red, DataType::F32),
        F::Rg32Float => (PixelFormat::Rg, DataType::F32),
        F::Rgba8Unorm | F::Rgba8UnormSrgb => (PixelFormat::Rgba, DataType::U8),
        F::Bgra8Unorm | F::Bgra8UnormSrgb => (PixelFormat::Bgra, DataType::U8),
        F::Rgba32Float => (PixelFormat::Rgba, DataType::F32),
        F::Depth32Float => (PixelFormat::Depth, DataType::F32),
        _ => return None,
    };
    Some(layout)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── byte sizes ────────────────────────────────────────────────────────

    #[test]
    fn byte_len_covers_all_texels() {
        let spec = TextureSpec::r32_float(4, 3, 2);
        assert_eq!(spec.texel_count(), 24);
        assert_eq!(spec.bytes_per_texel(), 4);
        assert_eq!(spec.byte_len(), 96);
    }

    #[test]
    fn rgba8_is_four_bytes_per_texel() {
        let spec = TextureSpec {
            width: 2,
            height: 2,
            depth: 1,
            internal_format: wgpu::TextureFormat::Rgba8Unorm,
            format: PixelFormat::Rgba,
            data_type: DataType::U8,
        };
        assert_eq!(spec.bytes_per_texel(), 4);
        assert_eq!(spec.byte_len(), 16);
    }

    // ── check_format ──────────────────────────────────────────────────────

    #[test]
    fn matching_layouts_are_accepted() {
        assert!(TextureSpec::r32_float(1, 1, 1).check_format().is_ok());
        assert!(TextureSpec::r32_sint(16, 256).check_format().is_ok());
        assert!(TextureSpec::depth32(8, 8).check_format().is_ok());
    }

    #[test]
    fn mismatched_data_type_is_rejected() {
        let spec = TextureSpec {
            data_type: DataType::U8,
            ..TextureSpec::r32_float(1, 1, 1)
        };
        assert_eq!(
            spec.check_format(),
            Err(TextureError::UnsupportedFormat {
                internal_format: wgpu::TextureFormat::R32Float,
                format: PixelFormat::Red,
                data_type: DataType::U8,
            })
        );
    }

    #[test]
    fn unlisted_internal_format_is_rejected() {
        let spec = TextureSpec {
            internal_format: wgpu::TextureFormat::Rgba16Float,
            format: PixelFormat::Rgba,
            data_type: DataType::U16,
            ..TextureSpec::r32_float(1, 1, 1)
        };
        assert!(spec.check_format().is_err());
    }

    #[test]
    fn depth_formats_do_not_accept_uploads() {
        assert!(!TextureSpec::depth32(4, 4).accepts_upload());
        assert!(TextureSpec::r32_float(4, 4, 4).accepts_upload());
    }
}
