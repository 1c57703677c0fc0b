mod sealed {
    pub trait Sealed {}
}

/// How the `depth` axis of a [`super::TextureSpec`] is interpreted.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DepthAxis {
    /// Target has no third axis; `depth` is stored as 1.
    Unused,
    /// `depth` is a volume extent and shrinks with mip level.
    Volume,
    /// `depth` is a layer count that must be a multiple of the value.
    Layers(u32),
    /// `depth` holds exactly six cube faces.
    CubeFaces,
}

/// Binding target of a texture, fixed at the type level.
///
/// Implemented only by the zero-sized markers in this module.
pub trait TextureTarget: sealed::Sealed + 'static {
    /// Human-readable target name used in errors and labels.
    const NAME: &'static str;
    const DIMENSION: wgpu::TextureDimension;
    const VIEW_DIMENSION: wgpu::TextureViewDimension;
    const SAMPLE_COUNT: u32;
    /// Whether `height` is a real axis (otherwise stored as 1).
    const USES_HEIGHT: bool;
    const DEPTH_AXIS: DepthAxis;
    /// Whether levels other than 0 may be allocated.
    const MIPMAPPED: bool;
    /// Whether faces must be square.
    const SQUARE: bool;
    /// Usage assigned by [`super::Texture::new`].
    const DEFAULT_USAGE: wgpu::TextureUsages;
}

const SAMPLED: wgpu::TextureUsages =
    wgpu::TextureUsages::TEXTURE_BINDING.union(wgpu::TextureUsages::COPY_DST);

macro_rules! target {
    (
        $(#[$doc:meta])*
        $name:ident, $label:literal, $dim:ident, $view:ident,
        samples = $samples:literal,
        height = $height:literal,
        depth = $depth:expr,
        mips = $mips:literal,
        square = $square:literal,
        usage = $usage:expr $(,)?
    ) => {
        $(#[$doc])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq)]
        pub struct $name;

        impl sealed::Sealed for $name {}

        impl TextureTarget for $name {
            const NAME: &'static str = $label;
            const DIMENSION: wgpu::TextureDimension = wgpu::TextureDimension::$dim;
            const VIEW_DIMENSION: wgpu::TextureViewDimension = wgpu::TextureViewDimension::$view;
            const SAMPLE_COUNT: u32 = $samples;
            const USES_HEIGHT: bool = $height;
            const DEPTH_AXIS: DepthAxis = $depth;
            const MIPMAPPED: bool = $mips;
            const SQUARE: bool = $square;
            const DEFAULT_USAGE: wgpu::TextureUsages = $usage;
        }
    };
}

target!(
    /// One-dimensional texture. wgpu allows a single mip level only.
    Tex1D, "1D", D1, D1,
    samples = 1, height = false, depth = DepthAxis::Unused,
    mips = false, square = false, usage = SAMPLED,
);

target!(
    Tex2D, "2D", D2, D2,
    samples = 1, height = true, depth = DepthAxis::Unused,
    mips = true, square = false, usage = SAMPLED,
);

target!(
    /// Volume texture; all three axes shrink with mip level.
    Tex3D, "3D", D3, D3,
    samples = 1, height = true, depth = DepthAxis::Volume,
    mips = true, square = false, usage = SAMPLED,
);

target!(
    Tex2DArray, "2D array", D2, D2Array,
    samples = 1, height = true, depth = DepthAxis::Layers(1),
    mips = true, square = false, usage = SAMPLED,
);

target!(
    /// Cube map; `depth` holds the six faces.
    TexCube, "cube map", D2, Cube,
    samples = 1, height = true, depth = DepthAxis::CubeFaces,
    mips = true, square = true, usage = SAMPLED,
);

target!(
    TexCubeArray, "cube map array", D2, CubeArray,
    samples = 1, height = true, depth = DepthAxis::Layers(6),
    mips = true, square = true, usage = SAMPLED,
);

target!(
    /// Multisampled 2D render target. Storage is never initialised from host data.
    Tex2DMultisample, "2D multisample", D2, D2,
    samples = 4, height = true, depth = DepthAxis::Unused,
    mips = false, square = false,
    usage = wgpu::TextureUsages::RENDER_ATTACHMENT.union(wgpu::TextureUsages::TEXTURE_BINDING),
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_targets_hold_six_layers() {
        assert_eq!(TexCube::DEPTH_AXIS, DepthAxis::CubeFaces);
        assert_eq!(TexCubeArray::DEPTH_AXIS, DepthAxis::Layers(6));
        assert!(TexCube::SQUARE);
    }

    #[test]
    fn only_multisample_has_more_than_one_sample() {
        assert_eq!(Tex2DMultisample::SAMPLE_COUNT, 4);
        assert_eq!(Tex2D::SAMPLE_COUNT, 1);
        assert_eq!(Tex3D::SAMPLE_COUNT, 1);
        assert!(!Tex2DMultisample::DEFAULT_USAGE.contains(wgpu::TextureUsages::COPY_DST));
    }
}
