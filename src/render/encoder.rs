//! Video encoders that turn a frame sequence into a playable file.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::env::Frame;
use crate::error::RenderError;

/// Encodes frames into a file at a given frame rate.
#[async_trait]
pub trait VideoEncoder: Send + Sync {
    /// File extension of the produced artifact, without the dot.
    fn extension(&self) -> &str;

    /// Writes `frames` to `path` at `fps` frames per second.
    async fn encode(&self, frames: Vec<Frame>, fps: f64, path: &Path) -> Result<(), RenderError>;
}

/// Checks that frames are non-empty RGB images of one shape.
///
/// Returns `(height, width)` on success.
pub fn validate_frames(frames: &[Frame]) -> Result<(usize, usize), RenderError> {
    let first = frames.first().ok_or(RenderError::EmptyFrameSequence)?;
    let (height, width, _) = first.dim();

    for (index, frame) in frames.iter().enumerate() {
        let (h, w, c) = frame.dim();
        if c != 3 || h != height || w != width {
            return Err(RenderError::InvalidFrameShape {
                index,
                expected: format!("{height}x{width}x3"),
                found: frame.shape().to_vec(),
            });
        }
    }

    Ok((height, width))
}

fn frame_bytes(frame: &Frame) -> Vec<u8> {
    match frame.as_slice() {
        Some(slice) => slice.to_vec(),
        None => frame.iter().copied().collect(),
    }
}

/// Encodes VP8 WebM by piping raw RGB24 frames into an `ffmpeg` process.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: PathBuf,
    codec: String,
    bitrate: String,
}

impl FfmpegEncoder {
    /// Uses the given ffmpeg executable.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            codec: "libvpx".to_string(),
            bitrate: "1M".to_string(),
        }
    }

    /// Overrides the target bitrate (ffmpeg syntax, e.g. "500k").
    pub fn with_bitrate(mut self, bitrate: impl Into<String>) -> Self {
        self.bitrate = bitrate.into();
        self
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    fn extension(&self) -> &str {
        "webm"
    }

    async fn encode(&self, frames: Vec<Frame>, fps: f64, path: &Path) -> Result<(), RenderError> {
        let (height, width) = validate_frames(&frames)?;

        let mut child = Command::new(&self.binary)
            .args(["-y", "-loglevel", "error", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .arg("-s")
            .arg(format!("{width}x{height}"))
            .arg("-r")
            .arg(format!("{fps}"))
            .args(["-i", "-", "-c:v"])
            .arg(&self.codec)
            .arg("-b:v")
            .arg(&self.bitrate)
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                RenderError::Encoding(format!(
                    "failed to launch {}: {e}",
                    self.binary.display()
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RenderError::Encoding("ffmpeg stdin unavailable".to_string()))?;
        for frame in &frames {
            stdin.write_all(&frame_bytes(frame)).await?;
        }
        drop(stdin);

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(RenderError::Encoding(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        debug!(path = %path.display(), frames = frames.len(), fps, "Encoded webm video");
        Ok(())
    }
}

/// Header line of a raw video artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawVideoHeader {
    pub width: usize,
    pub height: usize,
    pub fps: f64,
    pub frames: usize,
}

/// Gzip-compressed raw RGB frames preceded by a JSON header line.
///
/// Needs no external tools. The file is written to a temporary sibling and
/// renamed into place, so a partially written artifact is never visible.
#[derive(Debug, Clone, Default)]
pub struct RawVideoEncoder;

impl RawVideoEncoder {
    /// Creates the encoder.
    pub fn new() -> Self {
        Self
    }

    /// Reads back a raw video artifact as its header and pixel bytes.
    pub fn read(path: &Path) -> Result<(RawVideoHeader, Vec<u8>), RenderError> {
        let file = std::fs::File::open(path)?;
        let mut reader = BufReader::new(GzDecoder::new(file));

        let mut header_line = String::new();
        reader.read_line(&mut header_line)?;
        let header: RawVideoHeader = serde_json::from_str(header_line.trim_end())
            .map_err(|e| RenderError::Encoding(format!("invalid header: {e}")))?;

        let mut pixels = Vec::new();
        reader.read_to_end(&mut pixels)?;
        Ok((header, pixels))
    }
}

#[async_trait]
impl VideoEncoder for RawVideoEncoder {
    fn extension(&self) -> &str {
        "rgbv.gz"
    }

    async fn encode(&self, frames: Vec<Frame>, fps: f64, path: &Path) -> Result<(), RenderError> {
        let (height, width) = validate_frames(&frames)?;
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || -> Result<(), RenderError> {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let tmp = tempfile::NamedTempFile::new_in(dir)?;
            let mut encoder = GzEncoder::new(tmp, Compression::fast());

            let header = RawVideoHeader {
                width,
                height,
                fps,
                frames: frames.len(),
            };
            serde_json::to_writer(&mut encoder, &header)
                .map_err(|e| RenderError::Encoding(e.to_string()))?;
            encoder.write_all(b"\n")?;
            for frame in &frames {
                encoder.write_all(&frame_bytes(frame))?;
            }

            let tmp = encoder.finish()?;
            tmp.persist(&path).map_err(|e| RenderError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| RenderError::Task(e.to_string()))?
    }
}
