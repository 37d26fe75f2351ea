use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Eq, PartialEq, Hash, Serialize, Debug, Deserialize)]
pub enum DeviceType {
    Input,
    Output,
}

#[derive(Clone, Eq, PartialEq, Hash, Serialize, Debug)]
pub struct AudioDevice {
    pub name: String,
    pub device_type: DeviceType,
}

impl AudioDevice {
    pub fn new(name: String, device_type: DeviceType) -> Self {
        AudioDevice { name, device_type }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        let trimmed_name = name.trim();
        if trimmed_name.is_empty() {
            return Err(anyhow!("Device name cannot be empty"));
        }

        // Capture goes through ffmpeg/PulseAudio sources, so every monitorable
        // device presents as an input
        Ok(AudioDevice::new(
            trimmed_name.to_string(),
            DeviceType::Input,
        ))
    }
}

impl fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.name,
            match self.device_type {
                DeviceType::Input => "input",
                DeviceType::Output => "output",
            }
        )
    }
}

pub fn parse_audio_device(name: &str) -> Result<AudioDevice> {
    AudioDevice::from_name(name)
}

pub fn default_input_device() -> Result<AudioDevice> {
    Ok(AudioDevice::new("default".to_string(), DeviceType::Input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_audio_device() {
        let device = parse_audio_device("  alsa_output.monitor ").unwrap();
        assert_eq!(device.name, "alsa_output.monitor");
        assert_eq!(device.device_type, DeviceType::Input);
        assert_eq!(device.to_string(), "alsa_output.monitor (input)");
    }

    #[test]
    fn test_parse_empty_device_name() {
        assert!(parse_audio_device("   ").is_err());
    }
}
