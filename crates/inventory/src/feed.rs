//! 스냅샷 피드 -- 프로세스 내부 수집기가 사이클 단위로 레코드를 넘기는 채널

use lanwatch_core::types::SnapshotRecord;
use tokio::sync::mpsc;

use crate::error::InventoryError;

/// 스냅샷 사이클 송신 핸들
///
/// 복제해서 여러 수집기가 공유할 수 있습니다. 모든 핸들이 drop되면
/// 인벤토리 엔진의 피드 루프가 종료됩니다.
#[derive(Debug, Clone)]
pub struct SnapshotFeed {
    tx: mpsc::Sender<Vec<SnapshotRecord>>,
}

impl SnapshotFeed {
    /// 용량 제한 채널을 생성합니다.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Vec<SnapshotRecord>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// 한 사이클을 보냅니다. 채널이 가득 차면 자리가 날 때까지 기다립니다.
    pub async fn submit(&self, records: Vec<SnapshotRecord>) -> Result<(), InventoryError> {
        self.tx
            .send(records)
            .await
            .map_err(|_| InventoryError::Channel("snapshot feed closed".to_owned()))
    }

    /// 기다리지 않고 보냅니다. 가득 찼거나 닫혔으면 에러.
    pub fn try_submit(&self, records: Vec<SnapshotRecord>) -> Result<(), InventoryError> {
        self.tx.try_send(records).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                InventoryError::Channel("snapshot feed full".to_owned())
            }
            mpsc::error::TrySendError::Closed(_) => {
                InventoryError::Channel("snapshot feed closed".to_owned())
            }
        })
    }

    /// 수신 측이 닫혔는지 여부
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;

    #[tokio::test]
    async fn submitted_cycle_arrives_intact() {
        let (feed, mut rx) = SnapshotFeed::channel(2);
        let now = Utc::now();
        feed.submit(vec![
            SnapshotRecord::new("aa:bb:cc:dd:ee:01", now),
            SnapshotRecord::new("aa:bb:cc:dd:ee:02", now),
        ])
        .await
        .unwrap();

        let cycle = rx.recv().await.unwrap();
        assert_eq!(cycle.len(), 2);
        assert_eq!(cycle[1].mac, "aa:bb:cc:dd:ee:02");
    }

    #[tokio::test]
    async fn try_submit_reports_full_channel() {
        let (feed, _rx) = SnapshotFeed::channel(1);
        feed.try_submit(Vec::new()).unwrap();
        let err = feed.try_submit(Vec::new()).unwrap_err();
        assert!(err.to_string().contains("full"));
    }

    #[tokio::test]
    async fn submit_fails_after_receiver_dropped() {
        let (feed, rx) = SnapshotFeed::channel(1);
        drop(rx);
        assert!(feed.is_closed());
        assert!(feed.submit(Vec::new()).await.is_err());
    }
}
