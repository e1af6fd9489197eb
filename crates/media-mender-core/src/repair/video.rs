use super::RepairStrategy;
use crate::error::Error;
use crate::model::MediaKind;
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::debug;

/// What a successful container probe learned about a file.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub format_name: String,
    pub duration_secs: Option<f64>,
    pub stream_count: usize,
    /// Packets actually demuxed across all streams.
    pub packets_read: u64,
}

/// Media-inspection facility used to decide whether a container is sound.
pub trait MediaProbe: Send + Sync {
    fn probe(&self, path: &Path) -> Result<ProbeReport, Error>;
}

/// Probes containers with an external `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    binary: PathBuf,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: String,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: Option<u32>,
    codec_type: Option<String>,
    /// Frame count declared by the container index.
    nb_frames: Option<String>,
    /// Packets read by `-count_packets`.
    nb_read_packets: Option<String>,
}

impl FfprobeProbe {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl MediaProbe for FfprobeProbe {
    fn probe(&self, path: &Path) -> Result<ProbeReport, Error> {
        let probe_err = |reason: String| Error::Probe {
            path: path.to_path_buf(),
            reason,
        };

        let output = Command::new(&self.binary)
            .args([
                "-v",
                "error",
                "-count_packets",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| probe_err(format!("could not run {}: {}", self.binary.display(), e)))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(probe_err(format!(
                "ffprobe exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        // With `-v error` anything on stderr is a container or stream error.
        if !stderr.trim().is_empty() {
            return Err(probe_err(stderr.trim().to_string()));
        }

        parse_ffprobe_json(&output.stdout).map_err(probe_err)
    }
}

fn parse_ffprobe_json(stdout: &[u8]) -> Result<ProbeReport, String> {
    let parsed: FfprobeOutput =
        serde_json::from_slice(stdout).map_err(|e| format!("unreadable ffprobe output: {}", e))?;

    let format = parsed
        .format
        .ok_or_else(|| "no container format detected".to_string())?;
    if parsed.streams.is_empty() {
        return Err("container has no streams".to_string());
    }

    // The index can promise more than the file holds when media data is cut short.
    let mut packets_read = 0u64;
    for stream in &parsed.streams {
        let read: Option<u64> = stream.nb_read_packets.as_deref().and_then(|n| n.parse().ok());
        let declared: Option<u64> = stream.nb_frames.as_deref().and_then(|n| n.parse().ok());
        if let (Some(read), Some(declared)) = (read, declared) {
            if read < declared {
                return Err(format!(
                    "stream {} ({}): {} of {} packets readable",
                    stream.index.unwrap_or_default(),
                    stream.codec_type.as_deref().unwrap_or("unknown"),
                    read,
                    declared
                ));
            }
        }
        packets_read += read.unwrap_or(0);
    }

    Ok(ProbeReport {
        format_name: format.format_name,
        duration_secs: format.duration.and_then(|d| d.parse().ok()),
        stream_count: parsed.streams.len(),
        packets_read,
    })
}

/// Videos are only verified; container repair is out of reach, so any
/// probe failure means `Corrupt`.
pub struct VideoStrategy {
    probe: Arc<dyn MediaProbe>,
}

impl VideoStrategy {
    pub fn new(probe: Arc<dyn MediaProbe>) -> Self {
        Self { probe }
    }
}

impl RepairStrategy for VideoStrategy {
    fn media_kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn verify(&self, path: &Path) -> Result<(), Error> {
        // Surface not-found / permission / directory errors before probing.
        let file = File::open(path).map_err(|e| Error::from_io(path, e))?;
        let metadata = file.metadata().map_err(|e| Error::from_io(path, e))?;
        if metadata.is_dir() {
            return Err(Error::IsADirectory(path.to_path_buf()));
        }

        let report = self.probe.probe(path)?;
        debug!(
            "Probed {}: {} ({} streams, {} packets, {:?}s)",
            path.display(),
            report.format_name,
            report.stream_count,
            report.packets_read,
            report.duration_secs
        );
        Ok(())
    }
}
