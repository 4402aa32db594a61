//! UDP Syslog 수집기
//!
//! RFC 3164 / RFC 5424 syslog 메시지를 UDP 소켓으로 수신합니다.
//! 데이터그램 하나가 메시지 하나이며, 수신 즉시 파싱하여 큐에 넣습니다.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CollectorStatus, RawDatagram};
use crate::config::{MAX_DATAGRAM_SIZE, PipelineConfig};
use crate::error::LogPipelineError;
use crate::parser::SyslogParser;
use crate::queue::IngestQueue;

/// UDP Syslog 수집기
///
/// [`bind`](Self::bind)에서 소켓을 열고, [`run`](Self::run)은 취소될 때까지
/// 데이터그램을 수신합니다. 수신 에러는 기록 후 계속 진행합니다.
pub struct SyslogUdpCollector {
    socket: UdpSocket,
    local_addr: SocketAddr,
    max_message_size: usize,
    parser: SyslogParser,
    queue: Arc<IngestQueue>,
    status: CollectorStatus,
}

impl SyslogUdpCollector {
    /// 설정된 주소에 바인드합니다. 실패는 시작 실패로 처리됩니다.
    pub async fn bind(
        config: &PipelineConfig,
        queue: Arc<IngestQueue>,
    ) -> Result<Self, LogPipelineError> {
        let socket = UdpSocket::bind(&config.bind)
            .await
            .map_err(|e| LogPipelineError::Bind {
                addr: config.bind.clone(),
                reason: e.to_string(),
            })?;
        let local_addr = socket.local_addr()?;

        info!(addr = %local_addr, "syslog UDP collector bound");

        Ok(Self {
            socket,
            local_addr,
            max_message_size: config.max_message_size,
            parser: SyslogParser::new(),
            queue,
            status: CollectorStatus::Idle,
        })
    }

    /// 실제로 바인드된 주소 (포트 0 바인드 시 유용)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 현재 상태
    pub fn status(&self) -> &CollectorStatus {
        &self.status
    }

    /// 취소될 때까지 수신 루프를 실행합니다.
    pub async fn run(mut self, cancel: CancellationToken) -> CollectorStatus {
        self.status = CollectorStatus::Running;
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, peer)) => self.handle(&buf[..len], peer),
                        Err(e) => {
                            warn!(addr = %self.local_addr, error = %e, "syslog receive error");
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    debug!(addr = %self.local_addr, "syslog UDP collector received shutdown signal");
                    self.status = CollectorStatus::Stopped;
                    break;
                }
            }
        }

        info!(addr = %self.local_addr, "syslog UDP collector stopped");
        self.status
    }

    fn handle(&self, payload: &[u8], peer: SocketAddr) {
        let received_at = Utc::now();
        let datagram = RawDatagram::new(
            payload,
            peer.to_string(),
            received_at,
            self.max_message_size,
        );
        if datagram.truncated {
            debug!(
                source = %peer,
                size = payload.len(),
                max = self.max_message_size,
                "syslog datagram truncated"
            );
        }
        let parsed = self.parser.parse(&datagram.text, received_at);
        self.queue.push(&datagram, parsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn local_config() -> PipelineConfig {
        PipelineConfig {
            bind: "127.0.0.1:0".to_owned(),
            max_message_size: 32,
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let queue = Arc::new(IngestQueue::new(10, 5));
        let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = PipelineConfig {
            bind: taken.local_addr().unwrap().to_string(),
            ..PipelineConfig::default()
        };
        let err = SyslogUdpCollector::bind(&config, queue).await.err();
        assert!(matches!(err, Some(LogPipelineError::Bind { .. })));
    }

    #[tokio::test]
    async fn datagrams_are_parsed_into_queue() {
        let queue = Arc::new(IngestQueue::new(10, 5));
        let collector = SyslogUdpCollector::bind(&local_config(), Arc::clone(&queue))
            .await
            .unwrap();
        let addr = collector.local_addr();
        assert_ne!(addr.port(), 0);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(collector.run(cancel.clone()));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender
            .send_to(b"<134>Jan  1 00:00:00 host app: hello", addr)
            .await
            .unwrap();
        sender.send_to(b"not syslog", addr).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while queue.len() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        assert_eq!(task.await.unwrap(), CollectorStatus::Stopped);

        let batch = queue.take_batch(10);
        assert_eq!(batch[0].seq, 1);
        assert!(batch[0].truncated);
        assert_eq!(batch[1].message, "not syslog");
        assert_eq!(batch[1].host, None);
        assert_eq!(queue.stats().truncated_total, 1);
    }
}
