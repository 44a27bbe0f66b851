use image::imageops::FilterType;
use ndarray::Array4;
use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Failed to stage upload: {0}")]
    Staging(#[source] io::Error),
    #[error("Error reading image: {0}")]
    Read(#[source] io::Error),
    #[error("Error decoding image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Target tensor geometry and where uploads are staged before decoding.
#[derive(Debug, Clone)]
pub struct Preprocessing {
    pub width: u32,
    pub height: u32,
    pub temp_dir: PathBuf,
}

impl Default for Preprocessing {
    fn default() -> Self {
        Self {
            width: 150,
            height: 150,
            temp_dir: std::env::temp_dir(),
        }
    }
}

impl Preprocessing {
    /// Stages the upload in a uniquely named temp file, decodes it and builds the
    /// model input. The temp file is removed before this returns, whatever the outcome.
    pub fn run(&self, image_data: &[u8]) -> Result<Array4<f32>, PreprocessError> {
        let staged = stage_image(&self.temp_dir, image_data)?;
        transform_image_file(staged.path(), self.width, self.height)
    }
}

pub fn stage_image(temp_dir: &Path, image_data: &[u8]) -> Result<NamedTempFile, PreprocessError> {
    let extension = image::guess_format(image_data)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("bin");

    let mut staged = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(&format!(".{}", extension))
        .tempfile_in(temp_dir)
        .map_err(PreprocessError::Staging)?;
    staged
        .write_all(image_data)
        .and_then(|_| staged.flush())
        .map_err(PreprocessError::Staging)?;

    tracing::debug!(path = ?staged.path(), bytes = image_data.len(), "Staged upload");
    Ok(staged)
}

/// Decodes an image file into a `[1, height, width, 3]` tensor scaled to [0, 1].
/// The image is stretched to the target size.
pub fn transform_image_file(
    path: &Path,
    width: u32,
    height: u32,
) -> Result<Array4<f32>, PreprocessError> {
    let original_img = image::ImageReader::open(path)
        .map_err(PreprocessError::Read)?
        .with_guessed_format()
        .map_err(PreprocessError::Read)?
        .decode()?;

    let img = original_img
        .resize_exact(width, height, FilterType::Nearest)
        .to_rgb8();

    let mut input = Array4::zeros((1, height as usize, width as usize, 3));
    for (x, y, pixel) in img.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let (x, y) = (x as usize, y as usize);
        input[[0, y, x, 0]] = (r as f32) / 255.;
        input[[0, y, x, 1]] = (g as f32) / 255.;
        input[[0, y, x, 2]] = (b as f32) / 255.;
    }

    Ok(input)
}
