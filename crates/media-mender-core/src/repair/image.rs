use super::layout::{self, StreamEnd};
use super::RepairStrategy;
use crate::backup::{with_suffix, BackupManager};
use crate::error::Error;
use crate::model::{FileEntry, MediaKind};
use ::image::{DynamicImage, ImageError, ImageFormat, ImageReader};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Extensions we accept as images but the codec library cannot decode.
const NO_DECODER_EXTENSIONS: &[&str] = &["heic", "heiv"];

/// Verifies images by fully decoding them and checking the format trailer;
/// repairs by re-encoding the decodable pixels in a canonical color model.
#[derive(Debug, Default)]
pub struct ImageStrategy;

impl ImageStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl RepairStrategy for ImageStrategy {
    fn media_kind(&self) -> MediaKind {
        MediaKind::Image
    }

    fn can_inspect(&self, entry: &FileEntry) -> Result<(), String> {
        if NO_DECODER_EXTENSIONS.contains(&entry.extension.as_str()) {
            return Err(format!("no decoder available for .{} files", entry.extension));
        }
        Ok(())
    }

    fn verify(&self, path: &Path) -> Result<(), Error> {
        let (format, _image) = decode(path)?;
        check_trailer(path, format)
    }

    fn supports_repair(&self) -> bool {
        true
    }

    fn repair(&self, path: &Path, backup: &BackupManager) -> Result<(), Error> {
        let (format, image) = decode(path)?;

        let canonical = if image.color().has_alpha() && supports_alpha(format) {
            DynamicImage::ImageRgba8(image.to_rgba8())
        } else {
            DynamicImage::ImageRgb8(image.to_rgb8())
        };

        backup.ensure_backup(path)?;

        // Encode next to the original, then swap it in with a rename so a
        // failed encode never leaves a half-written file behind.
        let staging = with_suffix(path, ".mending");
        if let Err(err) = canonical.save_with_format(&staging, format) {
            let _ = fs::remove_file(&staging);
            return Err(image_error(path, err));
        }
        fs::rename(&staging, path).map_err(|e| {
            let _ = fs::remove_file(&staging);
            Error::from_io(path, e)
        })?;

        debug!("Re-encoded {} as {:?}", path.display(), format);
        Ok(())
    }
}

fn decode(path: &Path) -> Result<(ImageFormat, DynamicImage), Error> {
    let reader = ImageReader::open(path)
        .map_err(|e| Error::from_io(path, e))?
        .with_guessed_format()
        .map_err(|e| Error::from_io(path, e))?;

    let format = reader
        .format()
        .ok_or_else(|| Error::UnsupportedOrInvalidFormat {
            path: path.to_path_buf(),
            reason: "unidentified image data".to_string(),
        })?;

    let image = reader.decode().map_err(|e| image_error(path, e))?;
    Ok((format, image))
}

fn image_error(path: &Path, err: ImageError) -> Error {
    match err {
        ImageError::IoError(io) => Error::from_io(path, io),
        other => Error::UnsupportedOrInvalidFormat {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}

fn supports_alpha(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Png | ImageFormat::Gif | ImageFormat::Bmp | ImageFormat::Tiff
    )
}

/// Decoders tolerate some truncation, so the block layout is walked to
/// the end marker as well. Bytes after the marker are left alone.
fn check_trailer(path: &Path, format: ImageFormat) -> Result<(), Error> {
    let walk: fn(&[u8]) -> StreamEnd = match format {
        ImageFormat::Jpeg => layout::jpeg_end,
        ImageFormat::Png => layout::png_end,
        ImageFormat::Gif => layout::gif_end,
        _ => return Ok(()),
    };

    let data = fs::read(path).map_err(|e| Error::from_io(path, e))?;
    match walk(&data) {
        StreamEnd::Complete(end) => {
            if end < data.len() {
                debug!(
                    "{} carries {} bytes after the image data",
                    path.display(),
                    data.len() - end
                );
            }
            Ok(())
        }
        StreamEnd::Truncated => Err(Error::UnsupportedOrInvalidFormat {
            path: path.to_path_buf(),
            reason: format!("truncated {:?} stream: end marker missing", format),
        }),
        StreamEnd::Unrecognized => {
            debug!("Unrecognized {:?} layout in {}, decode result stands", format, path.display());
            Ok(())
        }
    }
}
