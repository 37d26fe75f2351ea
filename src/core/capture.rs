use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, Command as TokioCommand};
use tracing::{debug, info};

use crate::core::device::{AudioDevice, DeviceType};
use crate::segment::AudioFrame;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("failed to spawn capture process: {0}")]
    Spawn(std::io::Error),
    #[error("capture process exposed no audio stream")]
    NoAudioStream,
    #[error("audio stream ended: {0}")]
    StreamEnded(String),
    #[error("failed to list audio devices: {0}")]
    DeviceList(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pulls raw PCM off an ffmpeg/PulseAudio pipe and re-frames it for the
/// segmenter. Spawning is separate from running so a session start can fail
/// fast when the device cannot be opened.
pub struct FfmpegCapture {
    child: Child,
    sample_rate: u32,
    frame_len: usize,
    device: AudioDevice,
}

impl FfmpegCapture {
    pub fn spawn(
        device: &AudioDevice,
        sample_rate: u32,
        frame_len: usize,
    ) -> Result<Self, CaptureError> {
        let mut command = TokioCommand::new("ffmpeg");

        command.arg("-f").arg("pulse");
        if device.name.to_lowercase() != "default" {
            command.arg("-i").arg(&device.name);
        } else {
            command.arg("-i").arg("default");
        }

        // Raw signed 16-bit mono PCM on stdout
        command.arg("-f").arg("s16le");
        command.arg("-acodec").arg("pcm_s16le");
        command.arg("-ar").arg(sample_rate.to_string());
        command.arg("-ac").arg("1");
        command.arg("-");

        command.arg("-loglevel").arg("error");

        let child = command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(CaptureError::Spawn)?;

        info!("started ffmpeg capture for device: {}", device);

        Ok(Self {
            child,
            sample_rate,
            frame_len,
            device: device.clone(),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Reads the pipe until the stream ends or `is_running` flips off,
    /// pushing fixed-size frames into the segmentation channel. A stream
    /// that dies while monitoring is still on is a terminal error.
    pub async fn run(
        mut self,
        frame_tx: crossbeam::channel::Sender<AudioFrame>,
        is_running: Arc<AtomicBool>,
    ) -> Result<(), CaptureError> {
        let stdout = self.child.stdout.take().ok_or(CaptureError::NoAudioStream)?;
        let mut reader = BufReader::new(stdout);

        let mut pending: Vec<u8> = Vec::new();
        let mut samples: Vec<f32> = Vec::with_capacity(self.frame_len);
        let mut chunk = [0u8; 4096];

        while is_running.load(Ordering::Relaxed) {
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            pending.extend_from_slice(&chunk[..n]);

            // Convert whole i16 pairs, keep any trailing odd byte for the next read
            let usable = pending.len() - pending.len() % 2;
            for pair in pending[..usable].chunks_exact(2) {
                samples.push(i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32);
            }
            pending.drain(..usable);

            while samples.len() >= self.frame_len {
                let rest = samples.split_off(self.frame_len);
                let frame = AudioFrame::new(std::mem::replace(&mut samples, rest));
                if frame_tx.send(frame).is_err() {
                    debug!("frame channel closed, stopping capture");
                    return Ok(());
                }
            }
        }

        if is_running.load(Ordering::Relaxed) {
            let mut stderr_output = Vec::new();
            if let Some(mut stderr) = self.child.stderr.take() {
                let _ = stderr.read_to_end(&mut stderr_output).await;
            }
            let detail = String::from_utf8_lossy(&stderr_output).trim().to_string();
            return Err(CaptureError::StreamEnded(if detail.is_empty() {
                format!("device {} stopped producing audio", self.device)
            } else {
                detail
            }));
        }

        info!("stopped capture for {}", self.device);
        Ok(())
    }
}

pub async fn list_audio_devices() -> Result<Vec<AudioDevice>, CaptureError> {
    let output = TokioCommand::new("pactl")
        .arg("list")
        .arg("sources")
        .arg("short")
        .output()
        .await?;

    if !output.status.success() {
        return Err(CaptureError::DeviceList(
            String::from_utf8_lossy(&output.stderr).to_string(),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut devices = Vec::new();

    devices.push(AudioDevice::new("default".to_string(), DeviceType::Input));

    for line in stdout.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() > 1 {
            devices.push(AudioDevice::new(parts[1].to_string(), DeviceType::Input));
        }
    }

    Ok(devices)
}
