use crate::config::Config;
use bytes::Bytes;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

pub enum AudioEvent {
    /// 一个原始 PCM16 小端数据包
    Pcm(Bytes),
}

// 上游（TTS 服务）通过本地 UDP 推送 PCM 数据，端口在配置中指定
pub struct AudioBridge {
    socket: Arc<UdpSocket>,
    buffer_size: usize,
    tx: mpsc::Sender<AudioEvent>,
}

impl AudioBridge {
    pub async fn new(config: &Config, tx: mpsc::Sender<AudioEvent>) -> anyhow::Result<Self> {
        let socket =
            UdpSocket::bind(format!("{}:{}", config.bridge_local_ip, config.pcm_local_port)).await?;
        log::info!("AudioBridge listening on {}", socket.local_addr()?);

        Ok(Self {
            socket: Arc::new(socket),
            buffer_size: config.bridge_buffer_size,
            tx,
        })
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let mut buf = vec![0u8; self.buffer_size];
        loop {
            let (len, _) = self.socket.recv_from(&mut buf).await?;
            // 空包没有样本，直接忽略
            if len == 0 {
                continue;
            }
            let data = Bytes::copy_from_slice(&buf[..len]);
            if let Err(e) = self.tx.send(AudioEvent::Pcm(data)).await {
                log::error!("Failed to send audio event: {}", e);
                break;
            }
        }
        Ok(())
    }
}
