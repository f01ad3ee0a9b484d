//! Atlas upload to `wgpu` textures.

use std::{num::NonZeroU32, sync::Arc};

use glam::{uvec2, UVec2};

use crate::texture::{Bitmap, PassId, TextureBackend};

const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Unorm;

struct PassTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: UVec2,
}

/// Keeps one `R8Unorm` texture per pass, so that draw calls recorded
/// before a mid-frame flush keep sampling the atlas they were laid out against.
pub struct WgpuTextureBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    textures: Vec<Option<PassTexture>>,
}

impl WgpuTextureBackend {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            textures: Vec::new(),
        }
    }

    /// The texture uploaded for `pass`, if any.
    pub fn texture(&self, pass: PassId) -> Option<&wgpu::Texture> {
        self.get(pass).map(|t| &t.texture)
    }

    pub fn view(&self, pass: PassId) -> Option<&wgpu::TextureView> {
        self.get(pass).map(|t| &t.view)
    }

    fn get(&self, pass: PassId) -> Option<&PassTexture> {
        self.textures.get(pass.get() as usize)?.as_ref()
    }

    fn create_texture(&self, pass: PassId, size: UVec2) -> PassTexture {
        log::debug!(
            "Creating {}x{} atlas texture for pass {}",
            size.x,
            size.y,
            pass.get()
        );
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("glyph_atlas"),
            size: wgpu::Extent3d {
                width: size.x,
                height: size.y,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FORMAT,
            usage: wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::TEXTURE_BINDING,
        });
        let view = texture.create_view(&Default::default());
        PassTexture {
            texture,
            view,
            size,
        }
    }
}

impl TextureBackend for WgpuTextureBackend {
    fn upload(&mut self, pass: PassId, image: &Bitmap) {
        let size = uvec2(image.width(), image.height());
        let (bytes_per_row, rows) = match (NonZeroU32::new(size.x), NonZeroU32::new(size.y)) {
            (Some(w), Some(h)) => (w, h),
            _ => return,
        };

        let index = pass.get() as usize;
        if self.textures.len() <= index {
            self.textures.resize_with(index + 1, || None);
        }
        if self.get(pass).map_or(true, |t| t.size != size) {
            let texture = self.create_texture(pass, size);
            self.textures[index] = Some(texture);
        }

        if let Some(target) = &self.textures[index] {
            self.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &target.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                image.data(),
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(rows),
                },
                wgpu::Extent3d {
                    width: size.x,
                    height: size.y,
                    depth_or_array_layers: 1,
                },
            );
        }
    }
}
