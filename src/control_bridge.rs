use crate::config::Config;
use crate::protocol::{ControlMessage, PlaybackStatus};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

pub enum ControlEvent {
    Message(ControlMessage),
}

pub struct ControlBridge {
    socket: Arc<UdpSocket>,
    target_addr: String,
    tx: mpsc::Sender<ControlEvent>,
}

// 控制进程和本进程通过本地UDP通信，端口在配置中指定
impl ControlBridge {
    pub async fn new(config: &Config, tx: mpsc::Sender<ControlEvent>) -> anyhow::Result<Self> {
        // 绑定本地UDP端口
        let socket =
            UdpSocket::bind(format!("{}:{}", config.bridge_local_ip, config.control_local_port))
                .await?;
        let target_addr = format!("{}:{}", config.bridge_remote_ip, config.control_remote_port);
        log::info!(
            "ControlBridge listening on {}, status to {}",
            socket.local_addr()?,
            target_addr
        );

        Ok(Self {
            socket: Arc::new(socket),
            target_addr,
            tx,
        })
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let mut buf = [0u8; 4096]; // 4KB缓冲区
        loop {
            let (len, peer) = self.socket.recv_from(&mut buf).await?;
            let msg = match serde_json::from_slice::<ControlMessage>(&buf[..len]) {
                Ok(msg) => msg,
                Err(e) => {
                    log::warn!("Ignoring bad control message from {}: {}", peer, e);
                    continue;
                }
            };
            if let Err(e) = self.tx.send(ControlEvent::Message(msg)).await {
                log::error!("Failed to send control event: {}", e);
                break;
            }
        }
        Ok(())
    }

    pub async fn send_status(&self, status: &PlaybackStatus) -> anyhow::Result<()> {
        let msg = serde_json::to_string(status)?;
        self.socket
            .send_to(msg.as_bytes(), &self.target_addr)
            .await?;
        Ok(())
    }
}
