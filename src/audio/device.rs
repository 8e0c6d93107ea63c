//! Output device enumeration and selection

use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::AudioError;

/// Description of an output device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDeviceInfo {
    pub name: String,
    pub is_default: bool,
    /// Supported rates among the ones a PCM stream is likely to use
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

const PROBE_RATES: [u32; 7] = [8000, 16000, 22050, 32000, 44100, 48000, 96000];

/// List all output devices of the default host
pub fn list_output_devices() -> Vec<OutputDeviceInfo> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    let Ok(devices) = host.output_devices() else {
        return Vec::new();
    };

    devices
        .filter_map(|device| {
            let name = device.name().ok()?;
            let (sample_rates, channels) = output_capabilities(&device);
            Some(OutputDeviceInfo {
                is_default: default_name.as_ref() == Some(&name),
                name,
                sample_rates,
                channels,
            })
        })
        .collect()
}

fn output_capabilities(device: &cpal::Device) -> (Vec<u32>, Vec<u16>) {
    let mut rates = Vec::new();
    let mut channels = Vec::new();

    if let Ok(configs) = device.supported_output_configs() {
        for config in configs {
            for rate in PROBE_RATES {
                let sr = cpal::SampleRate(rate);
                if sr >= config.min_sample_rate() && sr <= config.max_sample_rate() && !rates.contains(&rate) {
                    rates.push(rate);
                }
            }
            if !channels.contains(&config.channels()) {
                channels.push(config.channels());
            }
        }
    }

    rates.sort_unstable();
    channels.sort_unstable();
    (rates, channels)
}

/// Find an output device by exact name, or the default one for `None`
pub fn find_output_device(name: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();

    let Some(name) = name else {
        return host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string()));
    };

    host.output_devices()
        .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?
        .find(|d| d.name().map(|n| n == name).unwrap_or(false))
        .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))
}

/// Pick a stream config running at exactly `sample_rate`
///
/// Prefers the requested channel count, then the widest layout available.
pub fn output_config_for_rate(
    device: &cpal::Device,
    sample_rate: u32,
    channels: u16,
) -> Result<cpal::StreamConfig, AudioError> {
    let rate = cpal::SampleRate(sample_rate);
    let candidates: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_output_configs()
        .map_err(|e| AudioError::UnsupportedFormat(e.to_string()))?
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .filter(|c| rate >= c.min_sample_rate() && rate <= c.max_sample_rate())
        .collect();

    let chosen = candidates
        .iter()
        .find(|c| c.channels() == channels)
        .or_else(|| candidates.iter().max_by_key(|c| c.channels()))
        .ok_or_else(|| {
            AudioError::UnsupportedFormat(format!("device cannot play f32 at {} Hz", sample_rate))
        })?;

    Ok(cpal::StreamConfig {
        channels: chosen.channels(),
        sample_rate: rate,
        buffer_size: cpal::BufferSize::Default,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_does_not_panic() {
        // Hosts without audio hardware report an empty list.
        let devices = list_output_devices();
        assert!(devices.iter().filter(|d| d.is_default).count() <= 1);
    }

    #[test]
    fn test_unknown_device_name() {
        let err = find_output_device(Some("no-such-device-for-tests")).err().unwrap();
        assert!(matches!(err, AudioError::DeviceNotFound(_)));
    }
}
