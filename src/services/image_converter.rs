use crate::error::DataError;
use async_trait::async_trait;
use image::ImageFormat;
use std::io::Write;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::error;

/// Converts camera-native HEIC/HEIF stills into a web-displayable format.
#[async_trait]
pub trait ImageConverter: Send + Sync {
    /// Returns JPEG bytes.
    async fn heic_to_jpeg(&self, data: &[u8]) -> Result<Vec<u8>, DataError>;
}

/// Shells out to ffmpeg (built with libheif) and re-encodes the decoded
/// frame as JPEG.
pub struct FfmpegConverter {
    program: String,
    quality: u8,
}

impl FfmpegConverter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            quality: 85,
        }
    }
}

impl Default for FfmpegConverter {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

/// Re-encodes any decodable image as baseline JPEG.
pub fn encode_jpeg(data: &[u8], quality: u8) -> Result<Vec<u8>, DataError> {
    let img = image::load_from_memory(data)
        .map_err(|e| DataError::Conversion(format!("Failed to decode frame: {}", e)))?;

    // JPEG has no alpha channel and no 16-bit depth
    let rgb = img.to_rgb8();

    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&rgb)
        .map_err(|e| DataError::Conversion(format!("Failed to encode JPEG: {}", e)))?;
    Ok(out)
}

/// Checks that `data` decodes as `format`.
pub fn verify_decodable(data: &[u8], format: ImageFormat) -> Result<(), DataError> {
    image::load_from_memory_with_format(data, format)
        .map(|_| ())
        .map_err(|e| DataError::UnsupportedFormat(format!("File is not a valid image: {}", e)))
}

#[async_trait]
impl ImageConverter for FfmpegConverter {
    async fn heic_to_jpeg(&self, data: &[u8]) -> Result<Vec<u8>, DataError> {
        let io_err = |e: std::io::Error| DataError::Conversion(e.to_string());

        let mut input_file = tempfile::Builder::new()
            .suffix(".heic")
            .tempfile()
            .map_err(io_err)?;
        input_file.write_all(data).map_err(io_err)?;
        let input_path = input_file.into_temp_path();

        let output_file = NamedTempFile::with_suffix(".png").map_err(io_err)?;
        let output_path = output_file.path().to_path_buf();

        let output = Command::new(&self.program)
            .arg("-y")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(input_path.as_os_str())
            .arg("-frames:v")
            .arg("1")
            .arg(&output_path)
            .output()
            .await
            .map_err(|e| DataError::Conversion(format!("Could not run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let err_msg = String::from_utf8_lossy(&output.stderr);
            error!("ffmpeg failed on HEIC/HEIF: {}", err_msg.trim());
            return Err(DataError::Conversion(
                "Could not convert HEIC image; try exporting it as JPEG".to_string(),
            ));
        }

        let png_data = tokio::fs::read(&output_path).await.map_err(io_err)?;
        encode_jpeg(&png_data, self.quality)
    }
}
