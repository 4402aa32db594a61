//! 이벤트 백로그 -- 플러시 전까지 이벤트를 보관하는 제한된 인메모리 큐
//!
//! [`Backlog`]는 파싱된 syslog 이벤트를 도착 순서대로 보관하고,
//! 배치 단위로 꺼내 저장소에 기록하게 합니다.
//!
//! # 오버플로우 정책
//! 용량을 넘으면 가장 오래된 이벤트부터 버리고 드롭 카운터를 올립니다.
//! 실패한 배치를 되돌려 놓을 때([`Backlog::requeue_front`])도 같은 정책을 적용합니다.

use std::collections::VecDeque;

use lanwatch_core::types::SyslogEvent;

/// 인메모리 이벤트 백로그
pub struct Backlog {
    /// 내부 저장소 (앞쪽이 가장 오래됨)
    buffer: VecDeque<SyslogEvent>,
    /// 최대 용량
    capacity: usize,
    /// 드롭된 이벤트 카운터
    dropped_count: u64,
    /// 총 유입 이벤트 카운터
    total_received: u64,
}

impl Backlog {
    /// 새 백로그를 생성합니다.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity.min(10_000)),
            capacity,
            dropped_count: 0,
            total_received: 0,
        }
    }

    /// 이벤트를 추가합니다.
    ///
    /// 가득 찬 경우 가장 오래된 이벤트를 버리며, 이때 `true`를 반환합니다.
    pub fn push(&mut self, event: SyslogEvent) -> bool {
        self.total_received += 1;

        let dropped = if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
            self.dropped_count += 1;
            true
        } else {
            false
        };

        self.buffer.push_back(event);
        dropped
    }

    /// 최대 `batch_size`개를 앞에서부터 꺼냅니다.
    pub fn drain_batch(&mut self, batch_size: usize) -> Vec<SyslogEvent> {
        let count = batch_size.min(self.buffer.len());
        self.buffer.drain(..count).collect()
    }

    /// 모든 이벤트를 꺼냅니다.
    pub fn drain_all(&mut self) -> Vec<SyslogEvent> {
        self.buffer.drain(..).collect()
    }

    /// 기록하지 못한 배치를 순서를 유지한 채 앞쪽에 되돌립니다.
    ///
    /// 용량을 넘으면 가장 오래된 이벤트(되돌린 배치의 앞부분)부터 버립니다.
    /// 버린 개수를 반환합니다.
    pub fn requeue_front(&mut self, batch: Vec<SyslogEvent>) -> u64 {
        for event in batch.into_iter().rev() {
            self.buffer.push_front(event);
        }

        let mut dropped = 0u64;
        while self.buffer.len() > self.capacity {
            self.buffer.pop_front();
            dropped += 1;
        }
        self.dropped_count += dropped;
        dropped
    }

    /// 현재 보관 중인 이벤트 수
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// 최대 용량
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 지금까지 드롭된 이벤트 수
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count
    }

    /// 총 유입 이벤트 수
    pub fn total_received(&self) -> u64 {
        self.total_received
    }

    /// 가장 오래된 이벤트
    pub fn front(&self) -> Option<&SyslogEvent> {
        self.buffer.front()
    }

    /// 사용률 (0.0~1.0)
    pub fn utilization(&self) -> f64 {
        f64::from(u32::try_from(self.buffer.len()).unwrap_or(u32::MAX))
            / f64::from(u32::try_from(self.capacity).unwrap_or(u32::MAX))
    }

    /// `batch_size` 이상 쌓였는지 확인합니다.
    pub fn should_flush(&self, batch_size: usize) -> bool {
        self.buffer.len() >= batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(seq: u64) -> SyslogEvent {
        let now = Utc::now();
        SyslogEvent {
            seq,
            received_at: now,
            event_time: now,
            host: None,
            facility: None,
            severity: None,
            tag: None,
            message: format!("event {seq}"),
            source: "test".to_owned(),
            raw: format!("event {seq}"),
            truncated: false,
        }
    }

    fn seqs(events: &[SyslogEvent]) -> Vec<u64> {
        events.iter().map(|e| e.seq).collect()
    }

    #[test]
    fn push_and_drain() {
        let mut buf = Backlog::new(100);
        for i in 1..=3 {
            buf.push(event(i));
        }
        assert_eq!(buf.len(), 3);

        let batch = buf.drain_batch(2);
        assert_eq!(seqs(&batch), vec![1, 2]);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn overflow_drops_oldest_and_counts() {
        // Given: 용량 1000
        let mut buf = Backlog::new(1000);

        // When: 1500개 유입
        let dropped = (1..=1500).filter(|&i| buf.push(event(i))).count();

        // Then: 오래된 500개 드롭, 최신 1000개 유지
        assert_eq!(dropped, 500);
        assert_eq!(buf.dropped_count(), 500);
        assert_eq!(buf.total_received(), 1500);
        assert_eq!(buf.len(), 1000);
        let kept = buf.drain_all();
        assert_eq!(kept.first().map(|e| e.seq), Some(501));
        assert_eq!(kept.last().map(|e| e.seq), Some(1500));
    }

    #[test]
    fn requeue_front_preserves_order() {
        let mut buf = Backlog::new(10);
        for i in 1..=5 {
            buf.push(event(i));
        }
        let batch = buf.drain_batch(3);
        buf.push(event(6));

        assert_eq!(buf.requeue_front(batch), 0);
        assert_eq!(seqs(&buf.drain_all()), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn requeue_front_over_capacity_drops_oldest() {
        let mut buf = Backlog::new(4);
        for i in 1..=4 {
            buf.push(event(i));
        }
        let batch = buf.drain_batch(3);
        for i in 5..=7 {
            buf.push(event(i));
        }

        // 되돌린 [1,2,3] + 남은 [4,5,6,7] = 7개, 용량 4 → 가장 오래된 3개 드롭
        assert_eq!(buf.requeue_front(batch), 3);
        assert_eq!(buf.dropped_count(), 3);
        assert_eq!(seqs(&buf.drain_all()), vec![4, 5, 6, 7]);
    }

    #[test]
    fn utilization_and_should_flush() {
        let mut buf = Backlog::new(100);
        assert_eq!(buf.utilization(), 0.0);
        assert!(!buf.should_flush(10));

        for i in 0..50 {
            buf.push(event(i));
        }
        let util = buf.utilization();
        assert!(util > 0.49 && util < 0.51);
        assert!(buf.should_flush(50));
        assert!(!buf.should_flush(51));
    }

    #[test]
    fn drain_batch_larger_than_backlog() {
        let mut buf = Backlog::new(100);
        buf.push(event(1));
        buf.push(event(2));

        assert_eq!(buf.drain_batch(100).len(), 2);
        assert!(buf.is_empty());
    }
}
