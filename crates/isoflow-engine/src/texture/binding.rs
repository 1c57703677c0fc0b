use std::marker::PhantomData;

use super::error::TextureError;
use super::format::TextureSpec;
use super::target::TextureTarget;
use super::texture::{Texture, TextureName};

/// A shader-visible texture slot for target `T`.
///
/// A unit corresponds to one binding index of a bind group layout and holds
/// at most one texture at a time. Binding borrows the unit mutably, so a
/// second bind while a [`BoundTexture`] is alive does not compile.
#[derive(Debug)]
pub struct TextureUnit<T: TextureTarget> {
    binding: u32,
    current: Option<TextureName>,
    _target: PhantomData<T>,
}

impl<T: TextureTarget> TextureUnit<T> {
    pub fn new(binding: u32) -> Self {
        Self {
            binding,
            current: None,
            _target: PhantomData,
        }
    }

    #[inline]
    pub fn binding(&self) -> u32 {
        self.binding
    }

    /// Name of the texture currently bound to this unit.
    #[inline]
    pub fn current(&self) -> Option<TextureName> {
        self.current
    }

    /// Layout entry matching textures of `spec`'s format on this unit.
    pub fn layout_entry(
        &self,
        visibility: wgpu::ShaderStages,
        spec: &TextureSpec,
    ) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding: self.binding,
            visibility,
            ty: wgpu::BindingType::Texture {
                sample_type: spec.sample_type(),
                view_dimension: T::VIEW_DIMENSION,
                multisampled: T::SAMPLE_COUNT > 1,
            },
            count: None,
        }
    }

    /// Binds `texture` to this unit until the returned guard drops.
    pub fn bind<'u, 't>(
        &'u mut self,
        texture: &'t Texture<T>,
    ) -> Result<BoundTexture<'u, 't, T>, TextureError> {
        let view = texture.create_view()?;
        self.current = Some(texture.name());
        log::trace!(
            "{} texture {} bound to unit {}",
            T::NAME,
            texture.name(),
            self.binding
        );
        Ok(BoundTexture {
            unit: self,
            texture,
            view,
        })
    }
}

/// Scoped binding of a texture to a [`TextureUnit`].
pub struct BoundTexture<'u, 't, T: TextureTarget> {
    unit: &'u mut TextureUnit<T>,
    texture: &'t Texture<T>,
    view: wgpu::TextureView,
}

impl<'u, 't, T: TextureTarget> BoundTexture<'u, 't, T> {
    #[inline]
    pub fn texture(&self) -> &'t Texture<T> {
        self.texture
    }

    #[inline]
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Bind group entry that exposes the texture at the unit's binding index.
    pub fn entry(&self) -> wgpu::BindGroupEntry<'_> {
        wgpu::BindGroupEntry {
            binding: self.unit.binding,
            resource: wgpu::BindingResource::TextureView(&self.view),
        }
    }
}

impl<T: TextureTarget> Drop for BoundTexture<'_, '_, T> {
    fn drop(&mut self) {
        self.unit.current = None;
        log::trace!("texture unit {} unbound", self.unit.binding);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::{Tex2D, Tex3D};

    #[test]
    fn binding_an_unallocated_texture_fails_and_leaves_unit_empty() {
        let tex = Texture::<Tex3D>::new("volume");
        let mut unit = TextureUnit::<Tex3D>::new(0);
        assert!(matches!(unit.bind(&tex), Err(TextureError::NotAllocated { .. })));
        assert_eq!(unit.current(), None);
    }

    #[test]
    fn layout_entry_follows_target_and_format() {
        let unit = TextureUnit::<Tex2D>::new(3);
        let entry = unit.layout_entry(wgpu::ShaderStages::COMPUTE, &TextureSpec::r32_sint(16, 256));
        assert_eq!(entry.binding, 3);
        assert_eq!(
            entry.ty,
            wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Sint,
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            }
        );
    }
}
