//! GPU textures and the name-keyed texture library.
//!
//! Textures live in a generational slot map. Names (file stems, matched
//! against material names) point at slots. When a reload cannot reuse the
//! existing texture, the slot is released and every name is repointed at
//! the replacement, so an old [`TextureId`] resolves to nothing instead of a
//! destroyed texture.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use asset::texture::{TextureData, TextureImage, library_key};
use slotmap::{SlotMap, new_key_type};
use wgpu::{
    AddressMode, BindGroup, BindGroupLayout, Device, Extent3d, FilterMode, Queue, Sampler,
    TextureDescriptor, TextureDimension, TextureFormat, TextureUsages,
};

use crate::mesh::Replacement;

new_key_type! {
    pub struct TextureId;
}

/// Name-keyed store with generational handles.
pub struct Library<T> {
    slots: SlotMap<TextureId, T>,
    names: HashMap<String, TextureId>,
}

pub type TextureLibrary = Library<GpuTexture>;

impl<T> Library<T> {
    pub fn new() -> Self {
        Self {
            slots: SlotMap::with_key(),
            names: HashMap::new(),
        }
    }

    /// Register `value` under `name`. A colliding name is overwritten (last
    /// write wins); the displaced entry is released once no name refers to it.
    pub fn insert(&mut self, name: impl Into<String>, value: T) -> TextureId {
        let id = self.slots.insert(value);
        if let Some(old) = self.names.insert(name.into(), id) {
            self.release_if_orphaned(old);
        }
        id
    }

    #[inline]
    pub fn get(&self, id: TextureId) -> Option<&T> {
        self.slots.get(id)
    }

    #[inline]
    pub fn id_of(&self, name: &str) -> Option<TextureId> {
        self.names.get(name).copied()
    }

    #[inline]
    pub fn lookup(&self, name: &str) -> Option<&T> {
        self.id_of(name).and_then(|id| self.slots.get(id))
    }

    /// Release the slot behind `id` and store `value` in a fresh one. All
    /// names that pointed at `id` now point at the new handle.
    pub fn replace(&mut self, id: TextureId, value: T) -> Option<TextureId> {
        self.slots.remove(id)?;
        let fresh = self.slots.insert(value);
        for slot in self.names.values_mut().filter(|slot| **slot == id) {
            *slot = fresh;
        }
        Some(fresh)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn release_if_orphaned(&mut self, id: TextureId) {
        if !self.names.values().any(|&other| other == id) {
            self.slots.remove(id);
        }
    }
}

impl<T> Default for Library<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// An uploaded 2D texture plus the bind group the static shader samples.
pub struct GpuTexture {
    texture: wgpu::Texture,
    bind_group: BindGroup,
    width: u32,
    height: u32,
    mip_levels: u32,
    source: PathBuf,
}

impl GpuTexture {
    #[inline]
    pub fn bind_group(&self) -> &BindGroup {
        &self.bind_group
    }

    /// Same extent and mip chain length, so the texture can be rewritten.
    pub fn can_reuse_for(&self, image: &TextureImage) -> bool {
        let base = image.base();
        base.width == self.width
            && base.height == self.height
            && image.mip_level_count() == self.mip_levels
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        self.texture.destroy();
    }
}

/// Creates and rewrites [`GpuTexture`]s: repeat wrap, trilinear filtering,
/// sRGB RGBA8 with a full mip chain.
pub struct TextureUploader {
    layout: BindGroupLayout,
    sampler: Sampler,
}

pub const TEXTURE_FORMAT: TextureFormat = TextureFormat::Rgba8UnormSrgb;

impl TextureUploader {
    pub fn new(device: &Device) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Albedo BGL"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Albedo Sampler"),
            address_mode_u: AddressMode::Repeat,
            address_mode_v: AddressMode::Repeat,
            address_mode_w: AddressMode::Repeat,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Linear,
            ..Default::default()
        });
        Self { layout, sampler }
    }

    #[inline]
    pub fn layout(&self) -> &BindGroupLayout {
        &self.layout
    }

    /// Decode `path` and upload it. When a library is given, the texture is
    /// registered under the file stem.
    pub fn load(
        &self,
        device: &Device,
        queue: &Queue,
        path: impl AsRef<Path>,
        library: Option<&mut TextureLibrary>,
    ) -> anyhow::Result<Option<TextureId>> {
        let path = path.as_ref();
        let image = TextureImage::load(path)?;
        let texture = self.create(device, queue, &image, path);
        log::info!(
            "Loaded texture {} ({}x{}, {} mips)",
            path.display(),
            texture.width,
            texture.height,
            texture.mip_levels
        );
        Ok(library.map(|lib| lib.insert(library_key(path), texture)))
    }

    pub fn create(
        &self,
        device: &Device,
        queue: &Queue,
        image: &TextureImage,
        source: &Path,
    ) -> GpuTexture {
        let base = image.base();
        let label = source.display().to_string();
        let texture = device.create_texture(&TextureDescriptor {
            label: Some(&label),
            size: extent(base),
            mip_level_count: image.mip_level_count(),
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });
        write_levels(queue, &texture, image);

        let view = texture.create_view(&Default::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&label),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        GpuTexture {
            texture,
            bind_group,
            width: base.width,
            height: base.height,
            mip_levels: image.mip_level_count(),
            source: source.to_path_buf(),
        }
    }

    /// Apply a reloaded image to the texture registered as `name`. Reuses the
    /// texture when the extent matches, otherwise recreates it and repoints
    /// the library. `None` if no such name is registered.
    pub fn replace_in_library(
        &self,
        device: &Device,
        queue: &Queue,
        library: &mut TextureLibrary,
        name: &str,
        image: &TextureImage,
    ) -> Option<Replacement> {
        let id = library.id_of(name)?;
        let current = library.get(id)?;

        if current.can_reuse_for(image) {
            write_levels(queue, &current.texture, image);
            return Some(Replacement::InPlace);
        }

        let source = current.source.clone();
        let fresh = self.create(device, queue, image, &source);
        library.replace(id, fresh)?;
        Some(Replacement::Reallocated)
    }
}

fn extent(level: &TextureData) -> Extent3d {
    Extent3d {
        width: level.width,
        height: level.height,
        depth_or_array_layers: 1,
    }
}

fn write_levels(queue: &Queue, texture: &wgpu::Texture, image: &TextureImage) {
    for (mip, level) in image.levels.iter().enumerate() {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: mip as u32,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &level.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(level.bytes_per_row()),
                rows_per_image: Some(level.height),
            },
            extent(level),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name_and_last_write_wins() {
        let mut lib: Library<&str> = Library::new();
        let first = lib.insert("wall_stone", "a");
        assert_eq!(lib.lookup("wall_stone"), Some(&"a"));

        let second = lib.insert("wall_stone", "b");
        assert_eq!(lib.lookup("wall_stone"), Some(&"b"));
        // The overwritten entry had no other name and was released.
        assert_eq!(lib.get(first), None);
        assert_eq!(lib.get(second), Some(&"b"));
        assert_eq!(lib.len(), 1);
        assert_eq!(lib.lookup("roof_wood"), None);
    }

    #[test]
    fn replaced_handles_go_stale() {
        let mut lib: Library<u32> = Library::new();
        let old = lib.insert("floor_tiled", 1);
        let fresh = lib.replace(old, 2).unwrap();

        assert_ne!(old, fresh);
        assert_eq!(lib.get(old), None);
        assert_eq!(lib.get(fresh), Some(&2));
        assert_eq!(lib.id_of("floor_tiled"), Some(fresh));
        assert_eq!(lib.len(), 1);

        // Replacing through a stale handle is refused.
        assert_eq!(lib.replace(old, 3), None);
        assert_eq!(lib.lookup("floor_tiled"), Some(&2));
    }

    #[test]
    fn replace_repoints_every_alias() {
        let mut lib: Library<char> = Library::new();
        let id = lib.insert("wall_plain", 'x');
        lib.names.insert("wall_alias".into(), id);

        let fresh = lib.replace(id, 'y').unwrap();
        assert_eq!(lib.id_of("wall_plain"), Some(fresh));
        assert_eq!(lib.id_of("wall_alias"), Some(fresh));

        // Overwriting one alias keeps the shared slot alive for the other.
        lib.insert("wall_alias", 'z');
        assert_eq!(lib.get(fresh), Some(&'y'));
        assert_eq!(lib.lookup("wall_alias"), Some(&'z'));
        assert_eq!(lib.len(), 2);
    }
}
