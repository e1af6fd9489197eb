//! Block-level walk of JPEG, PNG and GIF files to find where the encoded
//! image ends. Bytes after the end marker (maker notes, motion-photo video,
//! padding) belong to the file but not to the image and are ignored.

/// Where the encoded image stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Byte offset just past the end marker.
    Complete(usize),
    /// The data runs out before the end marker.
    Truncated,
    /// The layout is not one we can walk; no verdict.
    Unrecognized,
}

/// JPEG: follow segment lengths, scan entropy-coded data after each SOS,
/// stop at EOI. Thumbnails embedded in APPn segments are skipped whole, so
/// their EOI never counts.
pub fn jpeg_end(data: &[u8]) -> StreamEnd {
    if !data.starts_with(&[0xFF, 0xD8]) {
        return StreamEnd::Unrecognized;
    }
    let mut pos = 2;

    loop {
        if pos >= data.len() {
            return StreamEnd::Truncated;
        }
        if data[pos] != 0xFF {
            return StreamEnd::Unrecognized;
        }
        // Fill bytes before a marker
        while pos < data.len() && data[pos] == 0xFF {
            pos += 1;
        }
        let Some(&marker) = data.get(pos) else {
            return StreamEnd::Truncated;
        };
        pos += 1;

        match marker {
            0xD9 => return StreamEnd::Complete(pos),
            0x01 | 0xD0..=0xD7 => continue,
            _ => {}
        }

        let Some(length) = read_u16_be(data, pos) else {
            return StreamEnd::Truncated;
        };
        if length < 2 {
            return StreamEnd::Unrecognized;
        }
        pos += length as usize;
        if pos > data.len() {
            return StreamEnd::Truncated;
        }

        if marker == 0xDA {
            match skip_entropy_data(data, pos) {
                Some(next_marker) => pos = next_marker,
                None => return StreamEnd::Truncated,
            }
        }
    }
}

/// Offset of the first real marker after entropy-coded data. Stuffed
/// `FF 00` bytes and restart markers are part of the scan.
fn skip_entropy_data(data: &[u8], mut pos: usize) -> Option<usize> {
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        match data[pos + 1] {
            0x00 | 0xD0..=0xD7 => pos += 2,
            0xFF => pos += 1,
            _ => return Some(pos),
        }
    }
    None
}

const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// PNG: walk `length | type | data | crc` chunks up to and including IEND.
pub fn png_end(data: &[u8]) -> StreamEnd {
    if !data.starts_with(PNG_SIGNATURE) {
        return StreamEnd::Unrecognized;
    }
    let mut pos = PNG_SIGNATURE.len();

    loop {
        let Some(length) = read_u32_be(data, pos) else {
            return StreamEnd::Truncated;
        };
        let Some(chunk_type) = data.get(pos + 4..pos + 8) else {
            return StreamEnd::Truncated;
        };
        let end = pos + 12 + length as usize;
        if end > data.len() {
            return StreamEnd::Truncated;
        }
        if chunk_type == b"IEND" {
            return StreamEnd::Complete(end);
        }
        pos = end;
    }
}

/// GIF: header, optional global color table, then extension and image
/// blocks until the `0x3B` trailer.
pub fn gif_end(data: &[u8]) -> StreamEnd {
    if !(data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a")) {
        return StreamEnd::Unrecognized;
    }
    let Some(&screen_flags) = data.get(10) else {
        return StreamEnd::Truncated;
    };
    let mut pos = 13 + color_table_len(screen_flags);

    loop {
        let Some(&introducer) = data.get(pos) else {
            return StreamEnd::Truncated;
        };
        match introducer {
            0x3B => return StreamEnd::Complete(pos + 1),
            0x21 => {
                // Introducer and label, then data sub-blocks
                pos += 2;
            }
            0x2C => {
                let Some(&image_flags) = data.get(pos + 9) else {
                    return StreamEnd::Truncated;
                };
                // Descriptor, local color table, LZW minimum code size
                pos += 10 + color_table_len(image_flags) + 1;
            }
            _ => return StreamEnd::Unrecognized,
        }
        match skip_sub_blocks(data, pos) {
            Some(next) => pos = next,
            None => return StreamEnd::Truncated,
        }
    }
}

fn color_table_len(flags: u8) -> usize {
    if flags & 0x80 == 0 {
        0
    } else {
        3 * (1usize << ((flags & 0x07) + 1))
    }
}

/// Offset just past the zero-length block terminator.
fn skip_sub_blocks(data: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let size = *data.get(pos)? as usize;
        pos += 1;
        if size == 0 {
            return Some(pos);
        }
        pos += size;
    }
}

fn read_u16_be(data: &[u8], pos: usize) -> Option<u16> {
    let bytes = data.get(pos..pos + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn read_u32_be(data: &[u8], pos: usize) -> Option<u32> {
    let bytes = data.get(pos..pos + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        if format == ImageFormat::Jpeg {
            let img = RgbImage::from_fn(32, 32, |x, y| Rgb([(x * 8) as u8, (y * 8) as u8, 90]));
            img.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        } else {
            let img = RgbaImage::from_fn(16, 16, |x, y| Rgba([(x * 16) as u8, (y * 16) as u8, 0, 255]));
            img.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        }
        bytes
    }

    #[test]
    fn test_complete_streams_end_at_file_end() {
        let jpeg = encode(ImageFormat::Jpeg);
        assert_eq!(jpeg_end(&jpeg), StreamEnd::Complete(jpeg.len()));
        let png = encode(ImageFormat::Png);
        assert_eq!(png_end(&png), StreamEnd::Complete(png.len()));
        let gif = encode(ImageFormat::Gif);
        assert_eq!(gif_end(&gif), StreamEnd::Complete(gif.len()));
    }

    #[test]
    fn test_appended_bytes_do_not_move_the_end() {
        let cases: [(ImageFormat, fn(&[u8]) -> StreamEnd); 3] = [
            (ImageFormat::Jpeg, jpeg_end),
            (ImageFormat::Png, png_end),
            (ImageFormat::Gif, gif_end),
        ];
        for (format, walk) in cases {
            let mut bytes = encode(format);
            let image_len = bytes.len();
            bytes.extend_from_slice(&[0x42; 200]);
            assert_eq!(walk(&bytes), StreamEnd::Complete(image_len), "{:?}", format);
        }
    }

    #[test]
    fn test_appended_jpeg_still_ends_at_first_image() {
        // A second full JPEG after the first, as in motion photos
        let mut bytes = encode(ImageFormat::Jpeg);
        let first_len = bytes.len();
        bytes.extend_from_slice(&encode(ImageFormat::Jpeg));
        assert_eq!(jpeg_end(&bytes), StreamEnd::Complete(first_len));
    }

    #[test]
    fn test_cut_streams_are_truncated() {
        let jpeg = encode(ImageFormat::Jpeg);
        assert_eq!(jpeg_end(&jpeg[..jpeg.len() - 2]), StreamEnd::Truncated);
        assert_eq!(jpeg_end(&jpeg[..jpeg.len() / 2]), StreamEnd::Truncated);

        let png = encode(ImageFormat::Png);
        assert_eq!(png_end(&png[..png.len() - 12]), StreamEnd::Truncated);
        assert_eq!(png_end(&png[..png.len() - 3]), StreamEnd::Truncated);

        let gif = encode(ImageFormat::Gif);
        assert_eq!(gif_end(&gif[..gif.len() - 1]), StreamEnd::Truncated);
    }

    #[test]
    fn test_foreign_data_is_unrecognized() {
        assert_eq!(jpeg_end(b"not a jpeg"), StreamEnd::Unrecognized);
        assert_eq!(png_end(b"not a png"), StreamEnd::Unrecognized);
        assert_eq!(gif_end(b"GIF"), StreamEnd::Unrecognized);
    }
}
