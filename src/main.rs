mod audio_bridge;
mod config;
mod control_bridge;
mod controller;
mod protocol;

use audio_bridge::AudioBridge;
use config::Config;
use control_bridge::ControlBridge;
use controller::CoreController;
use speech_streamer::audio::{AudioSystem, LevelMeterTap, PlaybackGraph, TapRegistry, open_device};
use speech_streamer::AudioStreamer;
use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use tokio::signal;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();

    // 加载配置
    let config = Config::new().map_err(anyhow::Error::msg)?;
    let audio_config = config.audio_config();
    log::info!("{} v{} starting", config.app_name, config.app_version);

    // 注册后处理 tap，电平表供 UI 做口型动画
    let speech_level = Arc::new(AtomicU32::new(0));
    let mut registry = TapRegistry::new();
    let level = speech_level.clone();
    registry.register("level-meter", move |sr| {
        Box::new(LevelMeterTap::new(50.0, sr, level.clone()))
    });

    // 创建播放图，启动独立的音频播放线程
    let (graph, graph_events) = PlaybackGraph::new(&audio_config, registry);
    if let Err(e) = graph.attach_tap("level-meter") {
        log::warn!("Level meter unavailable: {}", e);
    }
    let device = open_device(&audio_config)?;
    let mut audio_system = AudioSystem::start(graph.clone(), device)?;

    // 播放完成回调只负责投递事件，由主循环发送给控制端
    let (tx_complete, mut rx_complete) = mpsc::unbounded_channel::<()>();
    let streamer = Arc::new(AudioStreamer::new(
        audio_config,
        graph,
        graph_events,
        move || {
            let _ = tx_complete.send(());
        },
    )?);

    // 创建通道，用于组件间通信
    let (tx_audio_event, mut rx_audio_event) = mpsc::channel(100);
    let (tx_control_event, mut rx_control_event) = mpsc::channel(100);

    // 启动控制桥，接收控制指令并回传播放状态
    let control_bridge = Arc::new(ControlBridge::new(&config, tx_control_event).await?);
    let control_bridge_clone = control_bridge.clone();
    tokio::spawn(async move {
        if let Err(e) = control_bridge_clone.run().await {
            log::error!("ControlBridge error: {}", e);
        }
    });

    // 启动音频桥，接收上游推送的 PCM 数据
    let audio_bridge = AudioBridge::new(&config, tx_audio_event).await?;
    tokio::spawn(async move {
        if let Err(e) = audio_bridge.run().await {
            log::error!("AudioBridge error: {}", e);
        }
    });

    let mut controller = CoreController::new(streamer.clone(), control_bridge);
    log::info!("Speech streamer started");

    loop {
        tokio::select! {
            // 监听 Ctrl+C 信号
            _ = signal::ctrl_c() => {
                log::info!("Received Ctrl+C, shutting down...");
                break;
            }

            Some(event) = rx_audio_event.recv() => {
                controller.handle_audio_event(event).await;
            }

            Some(event) = rx_control_event.recv() => {
                controller.handle_control_event(event).await;
            }

            Some(()) = rx_complete.recv() => {
                controller.handle_completion().await;
            }
        }
    }

    streamer.stop();
    audio_system.stop();
    log::debug!(
        "Last speech level: {:.4}",
        LevelMeterTap::read(&speech_level)
    );
    Ok(())
}
