use serde::Serialize;

use speech_streamer::audio::{AudioConfig, KeepAliveConfig, PadConfig};

#[derive(Debug, Serialize, Clone)]
pub struct Config {
    pub app_name: &'static str,
    pub app_version: &'static str,

    // 音频调度配置
    pub sample_rate: u32,
    pub stream_format: &'static str,
    pub block_length: usize,
    pub initial_buffer_delay_ms: u64,
    pub lookahead_ms: u64,
    pub recheck_interval_ms: u64,
    pub safety_margin_ms: u64,
    pub max_sources: usize,
    pub output_backend: &'static str,
    pub playback_device: &'static str,
    pub playback_channels: u32,
    pub playback_period_size: usize,

    // 背景音配置
    pub pad_cutoff_hz: f32,
    pub pad_detune_cents: f32,
    pub pad_fade_in_ms: u64,
    pub pad_fade_out_ms: u64,
    pub pad_volume_ramp_ms: u64,

    // 保活音配置
    pub keep_alive_enabled: bool,
    pub keep_alive_frequency_hz: f32,
    pub keep_alive_amplitude: f32,

    // UDP 桥配置
    pub bridge_local_ip: &'static str,
    pub bridge_remote_ip: &'static str,
    pub pcm_local_port: u16,
    pub control_local_port: u16,
    pub control_remote_port: u16,
    pub bridge_buffer_size: usize,
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取
    pub fn new() -> Result<Self, &'static str> {
        Ok(Self {
            app_name: env!("APP_NAME"),
            app_version: env!("APP_VERSION"),

            // 音频调度配置
            sample_rate: env!("AUDIO_SAMPLE_RATE").parse()
                .map_err(|_| "Failed to parse AUDIO_SAMPLE_RATE")?,
            stream_format: env!("AUDIO_STREAM_FORMAT"),
            block_length: env!("AUDIO_BLOCK_LENGTH").parse()
                .map_err(|_| "Failed to parse AUDIO_BLOCK_LENGTH")?,
            initial_buffer_delay_ms: env!("AUDIO_INITIAL_BUFFER_DELAY_MS").parse()
                .map_err(|_| "Failed to parse AUDIO_INITIAL_BUFFER_DELAY_MS")?,
            lookahead_ms: env!("AUDIO_LOOKAHEAD_MS").parse()
                .map_err(|_| "Failed to parse AUDIO_LOOKAHEAD_MS")?,
            recheck_interval_ms: env!("AUDIO_RECHECK_INTERVAL_MS").parse()
                .map_err(|_| "Failed to parse AUDIO_RECHECK_INTERVAL_MS")?,
            safety_margin_ms: env!("AUDIO_SAFETY_MARGIN_MS").parse()
                .map_err(|_| "Failed to parse AUDIO_SAFETY_MARGIN_MS")?,
            max_sources: env!("AUDIO_MAX_SOURCES").parse()
                .map_err(|_| "Failed to parse AUDIO_MAX_SOURCES")?,
            output_backend: env!("AUDIO_OUTPUT_BACKEND"),
            playback_device: env!("AUDIO_PLAYBACK_DEVICE"),
            playback_channels: env!("AUDIO_PLAYBACK_CHANNELS").parse()
                .map_err(|_| "Failed to parse AUDIO_PLAYBACK_CHANNELS")?,
            playback_period_size: env!("AUDIO_PLAYBACK_PERIOD_SIZE").parse()
                .map_err(|_| "Failed to parse AUDIO_PLAYBACK_PERIOD_SIZE")?,

            // 背景音配置
            pad_cutoff_hz: env!("PAD_CUTOFF_HZ").parse()
                .map_err(|_| "Failed to parse PAD_CUTOFF_HZ")?,
            pad_detune_cents: env!("PAD_DETUNE_CENTS").parse()
                .map_err(|_| "Failed to parse PAD_DETUNE_CENTS")?,
            pad_fade_in_ms: env!("PAD_FADE_IN_MS").parse()
                .map_err(|_| "Failed to parse PAD_FADE_IN_MS")?,
            pad_fade_out_ms: env!("PAD_FADE_OUT_MS").parse()
                .map_err(|_| "Failed to parse PAD_FADE_OUT_MS")?,
            pad_volume_ramp_ms: env!("PAD_VOLUME_RAMP_MS").parse()
                .map_err(|_| "Failed to parse PAD_VOLUME_RAMP_MS")?,

            // 保活音配置
            keep_alive_enabled: env!("KEEP_ALIVE_ENABLED").parse()
                .map_err(|_| "Failed to parse KEEP_ALIVE_ENABLED")?,
            keep_alive_frequency_hz: env!("KEEP_ALIVE_FREQUENCY_HZ").parse()
                .map_err(|_| "Failed to parse KEEP_ALIVE_FREQUENCY_HZ")?,
            keep_alive_amplitude: env!("KEEP_ALIVE_AMPLITUDE").parse()
                .map_err(|_| "Failed to parse KEEP_ALIVE_AMPLITUDE")?,

            // UDP 桥配置
            bridge_local_ip: env!("BRIDGE_LOCAL_IP"),
            bridge_remote_ip: env!("BRIDGE_REMOTE_IP"),
            pcm_local_port: env!("BRIDGE_PCM_LOCAL_PORT").parse()
                .map_err(|_| "Failed to parse BRIDGE_PCM_LOCAL_PORT")?,
            control_local_port: env!("BRIDGE_CONTROL_LOCAL_PORT").parse()
                .map_err(|_| "Failed to parse BRIDGE_CONTROL_LOCAL_PORT")?,
            control_remote_port: env!("BRIDGE_CONTROL_REMOTE_PORT").parse()
                .map_err(|_| "Failed to parse BRIDGE_CONTROL_REMOTE_PORT")?,
            bridge_buffer_size: env!("BRIDGE_BUFFER_SIZE").parse()
                .map_err(|_| "Failed to parse BRIDGE_BUFFER_SIZE")?,
        })
    }

    /// 转换为音频库使用的运行时配置
    pub fn audio_config(&self) -> AudioConfig {
        let defaults = AudioConfig::default();
        AudioConfig {
            sample_rate: self.sample_rate,
            stream_format: self.stream_format.to_string(),
            block_length: self.block_length,
            initial_buffer_delay_ms: self.initial_buffer_delay_ms,
            lookahead_ms: self.lookahead_ms,
            recheck_interval_ms: self.recheck_interval_ms,
            safety_margin_ms: self.safety_margin_ms,
            max_sources: self.max_sources,
            output_backend: self.output_backend.to_string(),
            playback_device: self.playback_device.to_string(),
            playback_channels: self.playback_channels,
            playback_period_size: self.playback_period_size,
            pad: PadConfig {
                cutoff_hz: self.pad_cutoff_hz,
                detune_cents: self.pad_detune_cents,
                fade_in_ms: self.pad_fade_in_ms,
                fade_out_ms: self.pad_fade_out_ms,
                volume_ramp_ms: self.pad_volume_ramp_ms,
                ..defaults.pad.clone()
            },
            keep_alive: KeepAliveConfig {
                enabled: self.keep_alive_enabled,
                frequency_hz: self.keep_alive_frequency_hz,
                amplitude: self.keep_alive_amplitude,
            },
            ..defaults
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new().expect("Failed to create default Config from build-time environment variables")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_time_config_parses() {
        let config = Config::new().unwrap();
        let audio = config.audio_config();
        assert_eq!(audio.sample_rate, config.sample_rate);
        assert_eq!(audio.block_length, config.block_length);
        assert_eq!(audio.pad.frequencies, PadConfig::default().frequencies);
        assert!(audio.block_length > 0);
    }
}
