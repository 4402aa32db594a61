//! 수집 큐 -- 수신 루프와 플러시 태스크 사이의 공유 지점
//!
//! [`IngestQueue`]는 [`Backlog`]를 짧은 임계 구역으로 감싸고,
//! 이벤트에 수집 순번을 부여하며, 배치가 찼을 때 플러시 태스크를 깨웁니다.
//! 순번은 백로그 잠금 안에서 부여하므로 백로그 순서와 순번 순서가 같습니다.

use std::sync::atomic::{AtomicU64, Ordering};

use lanwatch_core::metrics as m;
use lanwatch_core::types::SyslogEvent;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::buffer::Backlog;
use crate::collector::RawDatagram;
use crate::parser::{ParsedSyslog, build_event};

/// 수신 통계 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub backlog_len: usize,
    pub backlog_capacity: usize,
    pub received_total: u64,
    pub dropped_total: u64,
    pub parse_errors_total: u64,
    pub truncated_total: u64,
}

/// 잘못된 메시지 경고는 1, 2, 4, 8... 번째에만 남깁니다.
fn parse_error_log_due(total: u64) -> bool {
    total.is_power_of_two()
}

/// 수신 루프 → 플러시 태스크 큐
pub struct IngestQueue {
    backlog: Mutex<Backlog>,
    next_seq: AtomicU64,
    batch_size: usize,
    ready: Notify,
    parse_errors: AtomicU64,
    truncated: AtomicU64,
}

impl IngestQueue {
    /// 새 큐를 생성합니다. 첫 순번은 1입니다.
    pub fn new(capacity: usize, batch_size: usize) -> Self {
        Self {
            backlog: Mutex::new(Backlog::new(capacity)),
            next_seq: AtomicU64::new(1),
            batch_size: batch_size.max(1),
            ready: Notify::new(),
            parse_errors: AtomicU64::new(0),
            truncated: AtomicU64::new(0),
        }
    }

    /// 커밋된 워터마크 다음부터 순번을 부여하도록 맞춥니다.
    pub fn resume_after(&self, watermark: u64) {
        self.next_seq
            .fetch_max(watermark.saturating_add(1), Ordering::SeqCst);
    }

    /// 다음에 부여할 순번
    pub fn next_seq(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst)
    }

    /// 파싱된 데이터그램을 이벤트로 만들어 넣고 부여한 순번을 반환합니다.
    pub fn push(&self, datagram: &RawDatagram, parsed: ParsedSyslog) -> u64 {
        metrics::counter!(m::SYSLOG_RECEIVED_TOTAL).increment(1);
        if !parsed.well_formed {
            let total = self.parse_errors.fetch_add(1, Ordering::Relaxed) + 1;
            metrics::counter!(m::SYSLOG_PARSE_ERRORS_TOTAL).increment(1);
            if parse_error_log_due(total) {
                tracing::warn!(
                    source = %datagram.source,
                    parse_errors_total = total,
                    raw = %datagram.text.chars().take(120).collect::<String>(),
                    "malformed syslog message kept as raw text"
                );
            }
        }
        if datagram.truncated {
            self.truncated.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(m::SYSLOG_TRUNCATED_TOTAL).increment(1);
        }

        let (seq, dropped, len) = {
            let mut backlog = self.backlog.lock();
            let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
            let dropped = backlog.push(build_event(seq, datagram, parsed));
            (seq, dropped, backlog.len())
        };

        if dropped {
            metrics::counter!(m::SYSLOG_DROPPED_TOTAL).increment(1);
            tracing::warn!(seq, backlog = len, "syslog backlog full, dropped oldest event");
        }
        metrics::gauge!(m::SYSLOG_BACKLOG_SIZE).set(len as f64);
        if len >= self.batch_size {
            self.ready.notify_one();
        }
        seq
    }

    /// 최대 `max`개를 꺼냅니다.
    pub fn take_batch(&self, max: usize) -> Vec<SyslogEvent> {
        let mut backlog = self.backlog.lock();
        let batch = backlog.drain_batch(max);
        metrics::gauge!(m::SYSLOG_BACKLOG_SIZE).set(backlog.len() as f64);
        batch
    }

    /// 기록하지 못한 이벤트를 앞쪽에 되돌립니다.
    pub fn requeue_front(&self, batch: Vec<SyslogEvent>) {
        if batch.is_empty() {
            return;
        }
        let mut backlog = self.backlog.lock();
        let dropped = backlog.requeue_front(batch);
        if dropped > 0 {
            metrics::counter!(m::SYSLOG_DROPPED_TOTAL).increment(dropped);
            tracing::warn!(dropped, "syslog backlog full while retaining batch, dropped oldest");
        }
        metrics::gauge!(m::SYSLOG_BACKLOG_SIZE).set(backlog.len() as f64);
    }

    /// 배치 크기만큼 쌓일 때까지 기다립니다.
    pub async fn batch_ready(&self) {
        self.ready.notified().await;
    }

    /// 배치 크기
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// 현재 길이
    pub fn len(&self) -> usize {
        self.backlog.lock().len()
    }

    /// 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.backlog.lock().is_empty()
    }

    /// 사용률 (0.0~1.0)
    pub fn utilization(&self) -> f64 {
        self.backlog.lock().utilization()
    }

    /// 통계 스냅샷
    pub fn stats(&self) -> QueueStats {
        let backlog = self.backlog.lock();
        QueueStats {
            backlog_len: backlog.len(),
            backlog_capacity: backlog.capacity(),
            received_total: backlog.total_received(),
            dropped_total: backlog.dropped_count(),
            parse_errors_total: self.parse_errors.load(Ordering::Relaxed),
            truncated_total: self.truncated.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SyslogParser;
    use chrono::Utc;

    fn push_text(queue: &IngestQueue, text: &str) -> u64 {
        let now = Utc::now();
        let datagram = RawDatagram::new(text.as_bytes(), "10.0.0.1:514", now, 16);
        let parsed = SyslogParser::new().parse(&datagram.text, now);
        queue.push(&datagram, parsed)
    }

    #[test]
    fn sequences_follow_arrival_order() {
        let queue = IngestQueue::new(10, 5);
        assert_eq!(push_text(&queue, "<13>a: one"), 1);
        assert_eq!(push_text(&queue, "<13>a: two"), 2);
        let batch = queue.take_batch(10);
        assert_eq!(batch.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn resume_after_never_moves_backwards() {
        let queue = IngestQueue::new(10, 5);
        queue.resume_after(41);
        assert_eq!(queue.next_seq(), 42);
        queue.resume_after(3);
        assert_eq!(queue.next_seq(), 42);
        assert_eq!(push_text(&queue, "x"), 42);
    }

    #[test]
    fn stats_count_parse_errors_and_truncation() {
        let queue = IngestQueue::new(2, 1);
        push_text(&queue, "no header here, and longer than sixteen bytes");
        push_text(&queue, "<13>Jan 1 00:00:00 h t: m");
        push_text(&queue, "<13>a: b");

        let stats = queue.stats();
        assert_eq!(stats.received_total, 3);
        assert_eq!(stats.dropped_total, 1);
        assert_eq!(stats.backlog_len, 2);
        assert_eq!(stats.truncated_total, 2);
        assert!(stats.parse_errors_total >= 1);
    }

    #[test]
    fn parse_error_warnings_thin_out() {
        let logged: Vec<u64> = (1..=20).filter(|&n| parse_error_log_due(n)).collect();
        assert_eq!(logged, vec![1, 2, 4, 8, 16]);
        assert!(!parse_error_log_due(0));
    }

    #[tokio::test]
    async fn full_batch_wakes_waiter() {
        let queue = std::sync::Arc::new(IngestQueue::new(10, 2));
        let waiter = {
            let queue = std::sync::Arc::clone(&queue);
            tokio::spawn(async move { queue.batch_ready().await })
        };
        tokio::task::yield_now().await;
        push_text(&queue, "<13>a: one");
        push_text(&queue, "<13>a: two");
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
