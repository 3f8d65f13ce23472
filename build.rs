use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    application: Application,
    audio: Audio,
    pad: Pad,
    keep_alive: KeepAlive,
    bridge: Bridge,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Audio {
    sample_rate: u32,
    stream_format: String,
    block_length: usize,
    initial_buffer_delay_ms: u64,
    lookahead_ms: u64,
    recheck_interval_ms: u64,
    safety_margin_ms: u64,
    max_sources: usize,
    output_backend: String,
    playback_device: String,
    playback_channels: u32,
    playback_period_size: usize,
}

#[derive(Deserialize)]
struct Pad {
    cutoff_hz: f32,
    detune_cents: f32,
    fade_in_ms: u64,
    fade_out_ms: u64,
    volume_ramp_ms: u64,
}

#[derive(Deserialize)]
struct KeepAlive {
    enabled: bool,
    frequency_hz: f32,
    amplitude: f32,
}

#[derive(Deserialize)]
struct Bridge {
    local_ip: String,
    remote_ip: String,
    pcm_local_port: u16,
    control_local_port: u16,
    control_remote_port: u16,
    buffer_size: usize,
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    // 应用信息
    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // 音频调度配置
    println!("cargo:rustc-env=AUDIO_SAMPLE_RATE={}", config.audio.sample_rate);
    println!("cargo:rustc-env=AUDIO_STREAM_FORMAT={}", config.audio.stream_format);
    println!("cargo:rustc-env=AUDIO_BLOCK_LENGTH={}", config.audio.block_length);
    println!("cargo:rustc-env=AUDIO_INITIAL_BUFFER_DELAY_MS={}", config.audio.initial_buffer_delay_ms);
    println!("cargo:rustc-env=AUDIO_LOOKAHEAD_MS={}", config.audio.lookahead_ms);
    println!("cargo:rustc-env=AUDIO_RECHECK_INTERVAL_MS={}", config.audio.recheck_interval_ms);
    println!("cargo:rustc-env=AUDIO_SAFETY_MARGIN_MS={}", config.audio.safety_margin_ms);
    println!("cargo:rustc-env=AUDIO_MAX_SOURCES={}", config.audio.max_sources);
    println!("cargo:rustc-env=AUDIO_OUTPUT_BACKEND={}", config.audio.output_backend);
    println!("cargo:rustc-env=AUDIO_PLAYBACK_DEVICE={}", config.audio.playback_device);
    println!("cargo:rustc-env=AUDIO_PLAYBACK_CHANNELS={}", config.audio.playback_channels);
    println!("cargo:rustc-env=AUDIO_PLAYBACK_PERIOD_SIZE={}", config.audio.playback_period_size);

    // 背景音配置
    println!("cargo:rustc-env=PAD_CUTOFF_HZ={}", config.pad.cutoff_hz);
    println!("cargo:rustc-env=PAD_DETUNE_CENTS={}", config.pad.detune_cents);
    println!("cargo:rustc-env=PAD_FADE_IN_MS={}", config.pad.fade_in_ms);
    println!("cargo:rustc-env=PAD_FADE_OUT_MS={}", config.pad.fade_out_ms);
    println!("cargo:rustc-env=PAD_VOLUME_RAMP_MS={}", config.pad.volume_ramp_ms);

    // 保活音配置
    println!("cargo:rustc-env=KEEP_ALIVE_ENABLED={}", config.keep_alive.enabled);
    println!("cargo:rustc-env=KEEP_ALIVE_FREQUENCY_HZ={}", config.keep_alive.frequency_hz);
    println!("cargo:rustc-env=KEEP_ALIVE_AMPLITUDE={}", config.keep_alive.amplitude);

    // UDP 桥配置
    println!("cargo:rustc-env=BRIDGE_LOCAL_IP={}", config.bridge.local_ip);
    println!("cargo:rustc-env=BRIDGE_REMOTE_IP={}", config.bridge.remote_ip);
    println!("cargo:rustc-env=BRIDGE_PCM_LOCAL_PORT={}", config.bridge.pcm_local_port);
    println!("cargo:rustc-env=BRIDGE_CONTROL_LOCAL_PORT={}", config.bridge.control_local_port);
    println!("cargo:rustc-env=BRIDGE_CONTROL_REMOTE_PORT={}", config.bridge.control_remote_port);
    println!("cargo:rustc-env=BRIDGE_BUFFER_SIZE={}", config.bridge.buffer_size);
}
