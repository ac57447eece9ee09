//! Texture decoding: PNG/JPEG to straight-alpha RGBA8 plus a CPU mip chain.

use std::path::Path;

use anyhow::Context;
use image::{RgbaImage, imageops::FilterType};

/// One RGBA8 image level, tightly packed rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureData {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Decoded texture with every mip level down to 1x1. `levels[0]` is the
/// full-size image.
#[derive(Clone, Debug)]
pub struct TextureImage {
    pub levels: Vec<TextureData>,
}

pub const BYTES_PER_PIXEL: u32 = 4;

impl TextureData {
    fn from_rgba(img: RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            data: img.into_raw(),
            width,
            height,
        }
    }

    #[inline]
    pub fn bytes_per_row(&self) -> u32 {
        self.width * BYTES_PER_PIXEL
    }

    /// Check if the texture data is valid.
    pub fn is_valid(&self) -> bool {
        // usize before multiplying, so oversized headers cannot wrap in u32.
        let expected_size =
            self.width as usize * self.height as usize * BYTES_PER_PIXEL as usize;
        self.data.len() == expected_size && self.width > 0 && self.height > 0
    }
}

impl TextureImage {
    /// Decode a PNG or JPEG file (format sniffed from the contents).
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        log::debug!("Loading texture from {:?}", path);

        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read image {:?}", path))?;
        let image =
            Self::decode(&bytes).with_context(|| format!("Failed to decode image {:?}", path))?;

        let base = image.base();
        log::debug!(
            "Decoded texture {}x{} ({} mip levels)",
            base.width,
            base.height,
            image.levels.len()
        );
        Ok(image)
    }

    pub fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        Ok(Self::from_rgba(rgba))
    }

    pub fn from_rgba(base: RgbaImage) -> Self {
        let count = mip_level_count(base.width(), base.height());
        let mut levels = Vec::with_capacity(count as usize);

        let mut current = base;
        for _ in 1..count {
            let next_w = (current.width() / 2).max(1);
            let next_h = (current.height() / 2).max(1);
            let next = image::imageops::resize(&current, next_w, next_h, FilterType::Triangle);
            levels.push(TextureData::from_rgba(current));
            current = next;
        }
        levels.push(TextureData::from_rgba(current));

        Self { levels }
    }

    #[inline]
    pub fn base(&self) -> &TextureData {
        &self.levels[0]
    }

    #[inline]
    pub fn mip_level_count(&self) -> u32 {
        self.levels.len() as u32
    }
}

/// Full mip chain length for a `width`x`height` image.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Library key: file name with directory and extension stripped.
/// `resources/textures/wall_stone.png` becomes `wall_stone`.
pub fn library_key(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};

    fn solid(width: u32, height: u32, pixel: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(pixel))
    }

    #[test]
    fn library_key_strips_directory_and_extension() {
        assert_eq!(library_key("resources/textures/wall_stone.png"), "wall_stone");
        assert_eq!(library_key("floor.tiled.jpg"), "floor.tiled");
        assert_eq!(library_key("roof_wood"), "roof_wood");
    }

    #[test]
    fn mip_chain_halves_down_to_one_pixel() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(64, 16), 7);

        let image = TextureImage::from_rgba(solid(8, 2, [10, 20, 30, 255]));
        let sizes: Vec<_> = image.levels.iter().map(|l| (l.width, l.height)).collect();
        assert_eq!(sizes, vec![(8, 2), (4, 1), (2, 1), (1, 1)]);
        assert!(image.levels.iter().all(TextureData::is_valid));
        // Uniform colour survives filtering.
        assert_eq!(image.levels[3].data, vec![10, 20, 30, 255]);
    }

    #[test]
    fn oversized_dimensions_are_invalid_not_wrapped() {
        // 65536 * 16384 * 4 wraps to 0 in u32 and would match empty data.
        let level = TextureData {
            data: Vec::new(),
            width: 65_536,
            height: 16_384,
        };
        assert!(!level.is_valid());

        let level = TextureData {
            data: vec![0; 8],
            width: 2,
            height: 1,
        };
        assert!(level.is_valid());
    }

    #[test]
    fn png_decodes_to_straight_rgba() {
        let mut bytes = Vec::new();
        solid(4, 4, [200, 100, 50, 128])
            .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let image = TextureImage::decode(&bytes).unwrap();
        assert_eq!(image.base().width, 4);
        assert_eq!(image.base().bytes_per_row(), 16);
        assert_eq!(&image.base().data[..4], &[200, 100, 50, 128]);
    }

    #[test]
    fn load_reads_file_and_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("wall_plain.png");
        solid(2, 2, [1, 2, 3, 255]).save(&good).unwrap();
        assert_eq!(TextureImage::load(&good).unwrap().mip_level_count(), 2);

        let bad = dir.path().join("broken.png");
        std::fs::write(&bad, b"not an image").unwrap();
        assert!(TextureImage::load(&bad).is_err());
        assert!(TextureImage::load(dir.path().join("absent.png")).is_err());
    }
}
