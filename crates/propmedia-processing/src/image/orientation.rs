use image::DynamicImage;
use std::io::Cursor;

/// EXIF orientation handling (rotation and flipping)
pub struct ImageOrientation;

impl ImageOrientation {
    /// Read the EXIF orientation tag. Returns 1 (normal) when the data has no
    /// EXIF block, no orientation tag or a value outside 1..=8.
    pub fn read_exif_orientation(data: &[u8]) -> u32 {
        let exif = match exif::Reader::new().read_from_container(&mut Cursor::new(data)) {
            Ok(exif) => exif,
            Err(_) => return 1,
        };
        exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .filter(|value| (1..=8).contains(value))
            .unwrap_or(1)
    }

    /// Decode-time correction for an EXIF orientation value.
    pub fn apply(img: DynamicImage, orientation: u32) -> DynamicImage {
        match orientation {
            2 => img.fliph(),
            3 => img.rotate180(),
            4 => img.flipv(),
            // Transpose
            5 => img.rotate90().fliph(),
            6 => img.rotate90(),
            // Transverse
            7 => img.rotate270().fliph(),
            8 => img.rotate270(),
            _ => img,
        }
    }

    /// Apply the orientation stored in `data` to the decoded image.
    pub fn apply_exif_orientation(img: DynamicImage, data: &[u8]) -> DynamicImage {
        let orientation = Self::read_exif_orientation(data);
        if orientation != 1 {
            tracing::debug!(orientation, "Applying EXIF orientation");
        }
        Self::apply(img, orientation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};

    /// 3x2 image with a marker pixel in the top-left corner.
    fn marked() -> DynamicImage {
        let mut img = RgbaImage::from_pixel(3, 2, Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        DynamicImage::ImageRgba8(img)
    }

    fn marker_position(img: &DynamicImage) -> (u32, u32) {
        img.pixels()
            .find(|(_, _, p)| p.0 == [255, 0, 0, 255])
            .map(|(x, y, _)| (x, y))
            .unwrap()
    }

    #[test]
    fn test_orientation_transforms() {
        let cases = [
            (1, (3, 2), (0, 0)),
            (2, (3, 2), (2, 0)),
            (3, (3, 2), (2, 1)),
            (4, (3, 2), (0, 1)),
            (5, (2, 3), (0, 0)),
            (6, (2, 3), (1, 0)),
            (7, (2, 3), (1, 2)),
            (8, (2, 3), (0, 2)),
        ];
        for (orientation, dimensions, marker) in cases {
            let out = ImageOrientation::apply(marked(), orientation);
            assert_eq!(out.dimensions(), dimensions, "orientation {}", orientation);
            assert_eq!(marker_position(&out), marker, "orientation {}", orientation);
        }
    }

    #[test]
    fn test_invalid_orientation_is_identity() {
        for orientation in [0, 9, 255] {
            let out = ImageOrientation::apply(marked(), orientation);
            assert_eq!(marker_position(&out), (0, 0));
        }
    }

    #[test]
    fn test_no_exif_reads_as_normal() {
        assert_eq!(ImageOrientation::read_exif_orientation(b""), 1);
        assert_eq!(ImageOrientation::read_exif_orientation(b"not an image"), 1);
    }
}
