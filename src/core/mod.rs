pub mod capture;
pub mod device;

pub use capture::{list_audio_devices, CaptureError, FfmpegCapture};
pub use device::{default_input_device, parse_audio_device, AudioDevice, DeviceType};
