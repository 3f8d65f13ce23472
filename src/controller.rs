use crate::audio_bridge::AudioEvent;
use crate::control_bridge::{ControlBridge, ControlEvent};
use crate::protocol::{ControlMessage, PlaybackStatus};
use speech_streamer::AudioStreamer;
use std::sync::Arc;

pub struct CoreController {
    streamer: Arc<AudioStreamer>,
    control_bridge: Arc<ControlBridge>,
    received_bytes: u64,
}

impl CoreController {
    pub fn new(streamer: Arc<AudioStreamer>, control_bridge: Arc<ControlBridge>) -> Self {
        Self {
            streamer,
            control_bridge,
            received_bytes: 0,
        }
    }

    pub async fn handle_audio_event(&mut self, event: AudioEvent) {
        match event {
            AudioEvent::Pcm(data) => {
                if self.received_bytes == 0 {
                    log::info!("First audio of stream received: {} bytes", data.len());
                }
                self.received_bytes += data.len() as u64;
                self.streamer.ingest(&data);
            }
        }
    }

    pub async fn handle_control_event(&mut self, event: ControlEvent) {
        let ControlEvent::Message(msg) = event;
        log::debug!("Control message: {:?}", msg);
        match msg {
            ControlMessage::Stop => {
                log::info!("Stop requested after {} bytes", self.received_bytes);
                self.received_bytes = 0;
                self.streamer.stop();
            }
            ControlMessage::Resume => self.streamer.resume(),
            ControlMessage::Complete => {
                log::info!("Stream complete after {} bytes", self.received_bytes);
                self.received_bytes = 0;
                self.streamer.complete();
            }
            ControlMessage::Suspend => self.streamer.suspend(),
            ControlMessage::Volume { volume } => self.streamer.set_volume(volume),
            ControlMessage::PadStart { volume } => self.streamer.start_pad(volume),
            ControlMessage::PadVolume { volume } => self.streamer.set_pad_volume(volume),
            ControlMessage::PadStop => self.streamer.stop_pad(),
        }
    }

    /// 播放完成后通知控制端
    pub async fn handle_completion(&mut self) {
        log::info!("Playback complete");
        if let Err(e) = self
            .control_bridge
            .send_status(&PlaybackStatus::complete())
            .await
        {
            log::error!("Failed to send to control: {}", e);
        }
    }
}
