use std::fmt;
use std::marker::PhantomData;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};

use super::error::TextureError;
use super::format::{DataType, PixelFormat, TextureSpec};
use super::target::{DepthAxis, TextureTarget};

static NEXT_NAME: AtomicU32 = AtomicU32::new(1);

/// Process-unique texture identifier.
///
/// Assigned when a [`Texture`] is created and kept across storage
/// reallocation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TextureName(NonZeroU32);

impl TextureName {
    fn next() -> Self {
        let raw = NEXT_NAME.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroU32::new(raw).unwrap_or(NonZeroU32::MIN))
    }

    #[inline]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for TextureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where and how texel data lands in the allocated storage.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct UploadLayout {
    pub mip_level: u32,
    pub bytes_per_row: u32,
    pub rows_per_image: u32,
    pub extent: wgpu::Extent3d,
}

/// Validated storage layout for one `allocate_storage` call.
///
/// Computed without touching the device so it can be checked in isolation.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AllocationPlan {
    /// Spec with unused axes normalised to 1.
    pub spec: TextureSpec,
    /// Extent of mip level 0.
    pub base_size: wgpu::Extent3d,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub upload: Option<UploadLayout>,
}

impl AllocationPlan {
    /// Validates `spec` for target `T` and derives the storage layout.
    ///
    /// `data_len` is the byte length of the texel data, if any. Level
    /// `mip_level` of the resulting storage has exactly the requested extent.
    pub fn new<T: TextureTarget>(
        spec: &TextureSpec,
        data_len: Option<usize>,
        mip_level: u32,
    ) -> Result<Self, TextureError> {
        let target = T::NAME;

        if spec.width == 0 {
            return Err(TextureError::ZeroExtent { target, axis: "width" });
        }
        if T::USES_HEIGHT && spec.height == 0 {
            return Err(TextureError::ZeroExtent { target, axis: "height" });
        }

        let depth = match T::DEPTH_AXIS {
            DepthAxis::Unused => 1,
            DepthAxis::Volume if spec.depth == 0 => {
                return Err(TextureError::ZeroExtent { target, axis: "depth" });
            }
            DepthAxis::Volume => spec.depth,
            DepthAxis::Layers(multiple) => {
                if spec.depth == 0 || spec.depth % multiple != 0 {
                    return Err(TextureError::InvalidLayerCount {
                        target,
                        layers: spec.depth,
                        multiple,
                    });
                }
                spec.depth
            }
            DepthAxis::CubeFaces => {
                if spec.depth != 6 {
                    return Err(TextureError::CubeFaceCount { target, layers: spec.depth });
                }
                6
            }
        };

        let spec = TextureSpec {
            height: if T::USES_HEIGHT { spec.height } else { 1 },
            depth,
            ..*spec
        };

        if T::SQUARE && spec.width != spec.height {
            return Err(TextureError::NonSquareFaces {
                target,
                width: spec.width,
                height: spec.height,
            });
        }

        spec.check_format()?;

        if mip_level > 0 && !T::MIPMAPPED {
            return Err(TextureError::MipLevelUnsupported { target, mip_level });
        }

        let upload = match data_len {
            None => None,
            Some(_) if T::SAMPLE_COUNT > 1 || !spec.accepts_upload() => {
                return Err(TextureError::UploadNotAllowed {
                    target,
                    internal_format: spec.internal_format,
                });
            }
            Some(actual) => {
                let expected = spec.byte_len();
                if actual as u64 != expected {
                    return Err(TextureError::DataSizeMismatch {
                        expected,
                        actual: actual as u64,
                    });
                }
                Some(UploadLayout {
                    mip_level,
                    bytes_per_row: spec.width * spec.bytes_per_texel(),
                    rows_per_image: spec.height,
                    extent: wgpu::Extent3d {
                        width: spec.width,
                        height: spec.height,
                        depth_or_array_layers: spec.depth,
                    },
                })
            }
        };

        let scale = |extent: u32| -> Result<u32, TextureError> {
            1u32.checked_shl(mip_level)
                .and_then(|factor| extent.checked_mul(factor))
                .ok_or(TextureError::MipLevelTooLarge { mip_level, extent })
        };

        let base_size = wgpu::Extent3d {
            width: scale(spec.width)?,
            height: if T::USES_HEIGHT { scale(spec.height)? } else { 1 },
            depth_or_array_layers: match T::DEPTH_AXIS {
                DepthAxis::Volume => scale(spec.depth)?,
                _ => spec.depth,
            },
        };

        Ok(Self {
            spec,
            base_size,
            mip_level_count: mip_level + 1,
            sample_count: T::SAMPLE_COUNT,
            upload,
        })
    }
}

/// Owner of a single device texture whose target is fixed by `T`.
///
/// Storage is absent until [`Texture::allocate_storage`] succeeds and is
/// released on drop. Accessors project the stored spec and never query the
/// device.
pub struct Texture<T: TextureTarget> {
    name: TextureName,
    label: String,
    usage: wgpu::TextureUsages,
    spec: TextureSpec,
    mip_level_count: u32,
    generation: u64,
    raw: Option<wgpu::Texture>,
    _target: PhantomData<T>,
}

impl<T: TextureTarget> Texture<T> {
    /// Creates an unallocated texture with the target's default usage.
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_usage(label, T::DEFAULT_USAGE)
    }

    /// Creates an unallocated texture with explicit usage flags.
    pub fn with_usage(label: impl Into<String>, usage: wgpu::TextureUsages) -> Self {
        Self {
            name: TextureName::next(),
            label: label.into(),
            usage,
            spec: TextureSpec::UNALLOCATED,
            mip_level_count: 0,
            generation: 0,
            raw: None,
            _target: PhantomData,
        }
    }

    /// Allocates (or replaces) storage and optionally uploads texel data into
    /// `mip_level`.
    ///
    /// On error the previous storage is left untouched.
    pub fn allocate_storage(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        spec: TextureSpec,
        data: Option<&[u8]>,
        mip_level: u32,
    ) -> Result<(), TextureError> {
        let plan = AllocationPlan::new::<T>(&spec, data.map(<[u8]>::len), mip_level)?;

        if let Some(old) = self.raw.take() {
            old.destroy();
        }

        let raw = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&self.label),
            size: plan.base_size,
            mip_level_count: plan.mip_level_count,
            sample_count: plan.sample_count,
            dimension: T::DIMENSION,
            format: plan.spec.internal_format,
            usage: self.usage,
            view_formats: &[],
        });

        if let (Some(layout), Some(bytes)) = (plan.upload, data) {
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &raw,
                    mip_level: layout.mip_level,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                bytes,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(layout.bytes_per_row),
                    rows_per_image: Some(layout.rows_per_image),
                },
                layout.extent,
            );
        }

        self.raw = Some(raw);
        self.spec = plan.spec;
        self.mip_level_count = plan.mip_level_count;
        self.generation += 1;

        log::debug!(
            "{} texture {} '{}' allocated: {}x{}x{} {:?} (level {}, generation {})",
            T::NAME,
            self.name,
            self.label,
            self.spec.width,
            self.spec.height,
            self.spec.depth,
            self.spec.internal_format,
            mip_level,
            self.generation,
        );

        Ok(())
    }

    /// Creates a view covering every level and layer, typed by the target.
    pub fn create_view(&self) -> Result<wgpu::TextureView, TextureError> {
        let raw = self.raw()?;
        Ok(raw.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&self.label),
            dimension: Some(T::VIEW_DIMENSION),
            ..Default::default()
        }))
    }

    /// Device texture, if storage is allocated.
    pub fn raw(&self) -> Result<&wgpu::Texture, TextureError> {
        self.raw.as_ref().ok_or_else(|| TextureError::NotAllocated {
            name: format!("{} '{}'", self.name, self.label),
        })
    }

    #[inline]
    pub fn name(&self) -> TextureName {
        self.name
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.raw.is_some()
    }

    /// Number of storage allocations performed so far.
    ///
    /// Anything derived from the device texture (views, bind groups) is stale
    /// once this changes.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn spec(&self) -> &TextureSpec {
        &self.spec
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.spec.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.spec.height
    }

    #[inline]
    pub fn depth(&self) -> u32 {
        self.spec.depth
    }

    #[inline]
    pub fn internal_format(&self) -> wgpu::TextureFormat {
        self.spec.internal_format
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.spec.format
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.spec.data_type
    }

    #[inline]
    pub fn mip_level_count(&self) -> u32 {
        self.mip_level_count
    }
}

impl<T: TextureTarget> fmt::Debug for Texture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("target", &T::NAME)
            .field("name", &self.name)
            .field("label", &self.label)
            .field("spec", &self.spec)
            .field("generation", &self.generation)
            .finish()
    }
}

impl<T: TextureTarget> Drop for Texture<T> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            raw.destroy();
            log::trace!("{} texture {} released", T::NAME, self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::{Tex1D, Tex2D, Tex2DArray, Tex2DMultisample, Tex3D, TexCube, TexCubeArray};

    fn extent(width: u32, height: u32, depth: u32) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: depth,
        }
    }

    // ── names ─────────────────────────────────────────────────────────────

    #[test]
    fn every_texture_gets_a_distinct_name() {
        let a = Texture::<Tex2D>::new("a");
        let b = Texture::<Tex2D>::new("b");
        assert_ne!(a.name(), b.name());
    }

    #[test]
    fn unallocated_texture_reports_zero_extent() {
        let tex = Texture::<Tex3D>::new("volume");
        assert!(!tex.is_allocated());
        assert_eq!((tex.width(), tex.height(), tex.depth()), (0, 0, 0));
        assert_eq!(tex.generation(), 0);
        assert!(matches!(tex.create_view(), Err(TextureError::NotAllocated { .. })));
    }

    // ── extent validation ─────────────────────────────────────────────────

    #[test]
    fn zero_width_is_rejected() {
        let spec = TextureSpec::r32_float(0, 4, 4);
        assert_eq!(
            AllocationPlan::new::<Tex3D>(&spec, None, 0),
            Err(TextureError::ZeroExtent { target: "3D", axis: "width" })
        );
    }

    #[test]
    fn zero_depth_only_matters_for_volumes() {
        let spec = TextureSpec::r32_float(4, 4, 0);
        assert!(matches!(
            AllocationPlan::new::<Tex3D>(&spec, None, 0),
            Err(TextureError::ZeroExtent { axis: "depth", .. })
        ));

        let plan = AllocationPlan::new::<Tex2D>(&spec, None, 0).unwrap();
        assert_eq!(plan.spec.depth, 1);
    }

    #[test]
    fn one_dimensional_targets_ignore_height() {
        let spec = TextureSpec::r32_float(16, 0, 0);
        let plan = AllocationPlan::new::<Tex1D>(&spec, None, 0).unwrap();
        assert_eq!(plan.base_size, extent(16, 1, 1));
    }

    #[test]
    fn cube_maps_need_six_square_faces() {
        let spec = TextureSpec::r32_float(8, 8, 5);
        assert_eq!(
            AllocationPlan::new::<TexCube>(&spec, None, 0),
            Err(TextureError::CubeFaceCount { target: "cube map", layers: 5 })
        );

        let spec = TextureSpec::r32_float(8, 4, 6);
        assert!(matches!(
            AllocationPlan::new::<TexCube>(&spec, None, 0),
            Err(TextureError::NonSquareFaces { .. })
        ));

        let spec = TextureSpec::r32_float(8, 8, 6);
        assert!(AllocationPlan::new::<TexCube>(&spec, None, 0).is_ok());
    }

    #[test]
    fn cube_arrays_need_whole_cubes() {
        let spec = TextureSpec::r32_float(8, 8, 9);
        assert_eq!(
            AllocationPlan::new::<TexCubeArray>(&spec, None, 0),
            Err(TextureError::InvalidLayerCount {
                target: "cube map array",
                layers: 9,
                multiple: 6,
            })
        );
        let spec = TextureSpec::r32_float(8, 8, 12);
        assert!(AllocationPlan::new::<TexCubeArray>(&spec, None, 0).is_ok());
    }

    // ── data validation ───────────────────────────────────────────────────

    #[test]
    fn data_must_cover_every_texel() {
        let spec = TextureSpec::r32_float(2, 2, 2);
        assert_eq!(
            AllocationPlan::new::<Tex3D>(&spec, Some(31), 0),
            Err(TextureError::DataSizeMismatch { expected: 32, actual: 31 })
        );

        let plan = AllocationPlan::new::<Tex3D>(&spec, Some(32), 0).unwrap();
        let upload = plan.upload.unwrap();
        assert_eq!(upload.bytes_per_row, 8);
        assert_eq!(upload.rows_per_image, 2);
        assert_eq!(upload.extent, extent(2, 2, 2));
    }

    #[test]
    fn multisample_rejects_data_and_mips() {
        let spec = TextureSpec {
            internal_format: wgpu::TextureFormat::Rgba8Unorm,
            format: PixelFormat::Rgba,
            data_type: DataType::U8,
            ..TextureSpec::r32_float(4, 4, 1)
        };
        assert!(matches!(
            AllocationPlan::new::<Tex2DMultisample>(&spec, Some(64), 0),
            Err(TextureError::UploadNotAllowed { .. })
        ));
        assert!(matches!(
            AllocationPlan::new::<Tex2DMultisample>(&spec, None, 1),
            Err(TextureError::MipLevelUnsupported { mip_level: 1, .. })
        ));

        let plan = AllocationPlan::new::<Tex2DMultisample>(&spec, None, 0).unwrap();
        assert_eq!(plan.sample_count, 4);
        assert!(plan.upload.is_none());
    }

    #[test]
    fn depth_storage_cannot_be_uploaded() {
        let spec = TextureSpec::depth32(4, 4);
        assert!(AllocationPlan::new::<Tex2D>(&spec, None, 0).is_ok());
        assert!(matches!(
            AllocationPlan::new::<Tex2D>(&spec, Some(64), 0),
            Err(TextureError::UploadNotAllowed { .. })
        ));
    }

    // ── mip levels ────────────────────────────────────────────────────────

    #[test]
    fn base_level_is_scaled_so_requested_level_matches_spec() {
        let spec = TextureSpec::r32_float(4, 3, 2);
        let plan = AllocationPlan::new::<Tex3D>(&spec, Some(96), 2).unwrap();
        assert_eq!(plan.base_size, extent(16, 12, 8));
        assert_eq!(plan.mip_level_count, 3);
        assert_eq!(plan.upload.unwrap().mip_level, 2);
    }

    #[test]
    fn layers_are_not_scaled_by_mip_level() {
        let spec = TextureSpec::r32_float(4, 4, 3);
        let plan = AllocationPlan::new::<Tex2DArray>(&spec, None, 1).unwrap();
        assert_eq!(plan.base_size, extent(8, 8, 3));
    }

    #[test]
    fn oversized_mip_level_is_rejected() {
        let spec = TextureSpec::r32_float(4, 4, 1);
        assert!(matches!(
            AllocationPlan::new::<Tex2D>(&spec, None, 31),
            Err(TextureError::MipLevelTooLarge { .. })
        ));
        assert!(matches!(
            AllocationPlan::new::<Tex1D>(&spec, None, 1),
            Err(TextureError::MipLevelUnsupported { .. })
        ));
    }
}
