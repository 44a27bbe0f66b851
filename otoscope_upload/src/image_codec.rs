use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use image::{ImageFormat, ImageReader};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageCodecError {
    #[error("Unrecognized image format")]
    UnknownFormat,
    #[error("Unsupported image format: {0:?}")]
    UnsupportedFormat(ImageFormat),
    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("Failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
}

const ACCEPTED_FORMATS: [ImageFormat; 3] = [ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::Tiff];

/// File picker filter matching the formats the classifier accepts.
pub const ACCEPTED_EXTENSIONS: &str = ".jpg,.jpeg,.png,.tiff";

/// An uploaded image re-encoded in memory in the format it arrived in.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: Bytes,
    pub format: ImageFormat,
}

impl EncodedImage {
    pub fn from_upload(upload: &[u8]) -> Result<Self, ImageCodecError> {
        let reader = ImageReader::new(Cursor::new(upload))
            .with_guessed_format()
            .map_err(|e| ImageCodecError::Decode(image::ImageError::IoError(e)))?;
        let format = reader.format().ok_or(ImageCodecError::UnknownFormat)?;
        if !ACCEPTED_FORMATS.contains(&format) {
            return Err(ImageCodecError::UnsupportedFormat(format));
        }

        let img = reader.decode().map_err(ImageCodecError::Decode)?;

        let mut encoded = Cursor::new(Vec::new());
        img.write_to(&mut encoded, format)
            .map_err(ImageCodecError::Encode)?;

        Ok(Self {
            data: Bytes::from(encoded.into_inner()),
            format,
        })
    }

    pub fn file_name(&self) -> String {
        format!("image.{}", self.extension())
    }

    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("bin")
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type(), STANDARD.encode(&self.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn encode(format: ImageFormat) -> Vec<u8> {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(30, 20, Rgb([12, 200, 7]));
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, format).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_upload_keeps_its_format() {
        for (format, extension, mime) in [
            (ImageFormat::Png, "png", "image/png"),
            (ImageFormat::Jpeg, "jpg", "image/jpeg"),
            (ImageFormat::Tiff, "tif", "image/tiff"),
        ] {
            let image = EncodedImage::from_upload(&encode(format)).unwrap();

            assert_eq!(image.format, format);
            assert!(image.extension().starts_with(extension));
            assert_eq!(image.mime_type(), mime);
            assert_eq!(image::guess_format(&image.data).unwrap(), format);
        }
    }

    #[test]
    fn test_data_url_prefix() {
        let image = EncodedImage::from_upload(&encode(ImageFormat::Png)).unwrap();

        assert!(image.to_data_url().starts_with("data:image/png;base64,iVBOR"));
        assert_eq!(image.file_name(), "image.png");
    }

    #[test]
    fn test_rejects_unknown_and_unsupported_uploads() {
        assert!(matches!(
            EncodedImage::from_upload(b"plain text"),
            Err(ImageCodecError::UnknownFormat)
        ));
        assert!(matches!(
            EncodedImage::from_upload(&encode(ImageFormat::Bmp)),
            Err(ImageCodecError::UnsupportedFormat(ImageFormat::Bmp))
        ));
    }
}
