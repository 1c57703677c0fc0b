//! Texture resources.
//!
//! A [`Texture`] owns exactly one device texture. Its target (1D, 2D, 3D,
//! array, cube, multisample) is part of the type and never changes; storage
//! is (re)allocated on demand with [`Texture::allocate_storage`].
//!
//! Shader-visible binding goes through a [`TextureUnit`], which hands out a
//! [`BoundTexture`] guard. The unit is unbound when the guard drops.

mod binding;
mod error;
mod format;
mod target;
mod texture;

pub use binding::{BoundTexture, TextureUnit};
pub use error::TextureError;
pub use format::{DataType, PixelFormat, TextureSpec};
pub use target::{
    DepthAxis, Tex1D, Tex2D, Tex2DArray, Tex2DMultisample, Tex3D, TexCube, TexCubeArray,
    TextureTarget,
};
pub use texture::{AllocationPlan, Texture, TextureName, UploadLayout};

pub type Texture1D = Texture<Tex1D>;
pub type Texture2D = Texture<Tex2D>;
pub type Texture3D = Texture<Tex3D>;
pub type Texture2DArray = Texture<Tex2DArray>;
pub type TextureCubeMap = Texture<TexCube>;
pub type TextureCubeMapArray = Texture<TexCubeArray>;
pub type Texture2DMultisample = Texture<Tex2DMultisample>;
