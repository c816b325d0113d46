//! Audio file export
//!
//! Writes rendered soundscapes to WAV files at the buffer's own sample rate.

use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use log::info;

use crate::engine::buffer::AudioBuffer;
use crate::error::{Result, SomnusError};

/// Export format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportFormat {
    /// Bit depth: 16, 24, or 32 (float) (default: 16)
    pub bit_depth: u16,
}

impl Default for ExportFormat {
    fn default() -> Self {
        ExportFormat { bit_depth: 16 }
    }
}

impl ExportFormat {
    /// Create a new export format with the given bit depth
    ///
    /// # Errors
    /// * `InvalidField` - If the bit depth is not 16, 24 or 32
    pub fn new(bit_depth: u16) -> Result<Self> {
        match bit_depth {
            16 | 24 | 32 => Ok(ExportFormat { bit_depth }),
            _ => Err(SomnusError::InvalidField {
                field: "bit depth",
                value: bit_depth.to_string(),
                reason: "only 16, 24 and 32 are supported".to_string(),
            }),
        }
    }

    fn wav_spec(&self, channels: u16, sample_rate: u32) -> WavSpec {
        WavSpec {
            channels,
            sample_rate,
            bits_per_sample: self.bit_depth,
            sample_format: if self.bit_depth == 32 {
                SampleFormat::Float
            } else {
                SampleFormat::Int
            },
        }
    }
}

fn export_error(e: hound::Error) -> SomnusError {
    SomnusError::AudioExport {
        reason: e.to_string(),
    }
}

/// Write a buffer to a WAV file
///
/// Samples are clamped to [-1, 1] before integer conversion.
///
/// # Arguments
/// * `buffer` - Audio to write (any channel count)
/// * `path` - Destination file, overwritten if present
/// * `format` - Sample encoding
pub fn export_wav(buffer: &AudioBuffer, path: &Path, format: ExportFormat) -> Result<()> {
    if buffer.num_channels() == 0 {
        return Err(SomnusError::AudioExport {
            reason: "buffer has no channels".to_string(),
        });
    }

    let spec = format.wav_spec(buffer.num_channels() as u16, buffer.sample_rate);
    let mut writer = WavWriter::create(path, spec).map_err(export_error)?;

    let interleaved = buffer.to_interleaved();
    match format.bit_depth {
        16 => {
            for sample in interleaved {
                let scaled = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
                writer.write_sample(scaled).map_err(export_error)?;
            }
        }
        24 => {
            for sample in interleaved {
                // 24-bit stored as i32 in hound
                let scaled = (sample.clamp(-1.0, 1.0) * 8388607.0) as i32;
                writer.write_sample(scaled).map_err(export_error)?;
            }
        }
        _ => {
            for sample in interleaved {
                writer.write_sample(sample).map_err(export_error)?;
            }
        }
    }

    writer.finalize().map_err(export_error)?;
    info!(
        "Exported {:.1}s of audio to {}",
        buffer.duration_secs(),
        path.display()
    );
    Ok(())
}
