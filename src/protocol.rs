use serde::{Deserialize, Serialize};

/// 控制端发来的 JSON 指令，按 `type` 字段区分
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// 打断当前播放
    Stop,
    Resume,
    /// 本轮音频已全部发送
    Complete,
    Suspend,
    Volume { volume: f32 },
    PadStart { volume: f32 },
    PadVolume { volume: f32 },
    PadStop,
}

/// 回传给控制端的播放状态
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PlaybackStatus {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub state: &'static str,
}

impl PlaybackStatus {
    pub fn complete() -> Self {
        Self {
            msg_type: "playback",
            state: "complete",
        }
    }
}
