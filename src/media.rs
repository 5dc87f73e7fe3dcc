use std::path::{Path, PathBuf};

use axum::body::Bytes;
use image::ImageFormat;
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

use crate::utils::slugify;

pub const MEDIA_URL: &str = "/media";
const PLAY_UPLOADS: &str = "uploads/plays";

const IMAGE_FORMATS: [ImageFormat; 5] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::WebP,
    ImageFormat::Bmp,
];

/// Decodes the whole upload. `None` unless the bytes are a complete image in
/// one of the accepted formats.
pub fn decode_image(bytes: &[u8]) -> Option<ImageFormat> {
    let format = image::guess_format(bytes)
        .ok()
        .filter(|format| IMAGE_FORMATS.contains(format))?;
    image::load_from_memory_with_format(bytes, format).ok()?;
    Some(format)
}

/// [`decode_image`] on the blocking pool.
pub async fn verify_image(bytes: Bytes) -> Option<ImageFormat> {
    match tokio::task::spawn_blocking(move || decode_image(&bytes)).await {
        Ok(format) => format,
        Err(e) => {
            warn!(error = %e, "Image decoder task failed");
            None
        }
    }
}

/// Storage path for a play image: slugified title, a fresh uuid, and the
/// uploaded file's extension.
pub fn play_image_path(title: &str, filename: &str) -> String {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();

    format!("{PLAY_UPLOADS}/{}-{}{extension}", slugify(title), Uuid::new_v4())
}

/// Public URL of a stored media path.
pub fn media_url(path: &str) -> String {
    format!("{MEDIA_URL}/{}", path.trim_start_matches('/'))
}

#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
}

impl MediaStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        MediaStorage { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn save(&self, relative: &str, bytes: &[u8]) -> std::io::Result<()> {
        let target = self.root.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, bytes).await?;
        info!(path = %target.display(), size = bytes.len(), "Stored media file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use image::{Rgb, RgbImage};

    use crate::controllers::test_support::png_bytes;

    fn encoded(format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        RgbImage::from_pixel(3, 2, Rgb([10, 120, 200]))
            .write_to(&mut Cursor::new(&mut bytes), format)
            .unwrap();
        bytes
    }

    #[test]
    fn complete_images_are_accepted() {
        assert_eq!(decode_image(&png_bytes()), Some(ImageFormat::Png));
        assert_eq!(decode_image(&encoded(ImageFormat::Jpeg)), Some(ImageFormat::Jpeg));
        assert_eq!(decode_image(&encoded(ImageFormat::Bmp)), Some(ImageFormat::Bmp));
    }

    #[test]
    fn leading_magic_bytes_are_not_enough() {
        // "BM" is the bitmap signature.
        assert_eq!(decode_image(b"BMW service notes: change oil"), None);

        let png = png_bytes();
        assert_eq!(decode_image(&png[..png.len() / 2]), None);
        assert_eq!(decode_image(&png[..8]), None);
        assert_eq!(decode_image(b"%PDF-1.7"), None);
        assert_eq!(decode_image(b""), None);
    }

    #[test]
    fn formats_outside_the_allowed_set_are_rejected() {
        assert_eq!(decode_image(&encoded(ImageFormat::Tiff)), None);
    }

    #[tokio::test]
    async fn verification_runs_off_the_async_runtime() {
        assert_eq!(
            verify_image(Bytes::from(png_bytes())).await,
            Some(ImageFormat::Png)
        );
        assert_eq!(verify_image(Bytes::from_static(b"BM")).await, None);
    }

    #[test]
    fn image_path_keeps_extension_and_is_unique() {
        let first = play_image_path("The Cherry Orchard", "poster.JPG");
        let second = play_image_path("The Cherry Orchard", "poster.JPG");

        assert!(first.starts_with("uploads/plays/the-cherry-orchard-"));
        assert!(first.ends_with(".JPG"));
        assert_ne!(first, second);

        let stem = first
            .trim_start_matches("uploads/plays/the-cherry-orchard-")
            .trim_end_matches(".JPG");
        assert!(Uuid::parse_str(stem).is_ok());
    }

    #[test]
    fn image_path_without_extension() {
        let path = play_image_path("Hamlet", "poster");
        assert!(!path.contains('.'));
    }

    #[test]
    fn media_url_is_rooted() {
        assert_eq!(media_url("uploads/plays/a.png"), "/media/uploads/plays/a.png");
    }

    #[tokio::test]
    async fn save_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MediaStorage::new(dir.path());

        let png = png_bytes();

        storage.save("uploads/plays/x.png", &png).await.unwrap();

        let written = std::fs::read(dir.path().join("uploads/plays/x.png")).unwrap();
        assert_eq!(written, png);
    }
}
