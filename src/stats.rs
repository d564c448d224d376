//! 전송 통계

use std::time::{Duration, Instant};

/// 세션 단위 전송 통계
///
/// 세션 태스크 하나만 갱신하므로 잠금 없음
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 송신 패킷 수 (재전송 포함)
    pub packets_sent: u64,

    /// 세션 피어로부터 수신한 패킷 수
    pub packets_received: u64,

    /// 송신 바이트 (헤더 포함)
    pub bytes_sent: u64,

    /// 수신 바이트 (헤더 포함)
    pub bytes_received: u64,

    /// 타임아웃으로 인한 재전송 패킷 수
    pub retransmitted_packets: u64,

    /// 수신 타임아웃 횟수
    pub timeouts: u64,

    /// 순서 이탈/중복 Data 수
    pub out_of_order: u64,

    /// 무시된 오래된 ACK 수
    pub stale_acks: u64,

    /// 버려진 데이터그램 수 (다른 피어, 해석 불가, 예상 외 타입)
    pub ignored: u64,

    /// 시작 시간
    pub started_at: Instant,

    /// 종료 시간
    pub finished_at: Option<Instant>,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            packets_sent: 0,
            packets_received: 0,
            bytes_sent: 0,
            bytes_received: 0,
            retransmitted_packets: 0,
            timeouts: 0,
            out_of_order: 0,
            stale_acks: 0,
            ignored: 0,
            started_at: Instant::now(),
            finished_at: None,
        }
    }

    /// 송신 기록
    pub fn record_sent(&mut self, size: usize) {
        self.packets_sent += 1;
        self.bytes_sent += size as u64;
    }

    /// 수신 기록
    pub fn record_received(&mut self, size: usize) {
        self.packets_received += 1;
        self.bytes_received += size as u64;
    }

    /// 종료 시점 기록
    pub fn finish(&mut self) {
        self.finished_at.get_or_insert_with(Instant::now);
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.finished_at
            .unwrap_or_else(Instant::now)
            .duration_since(self.started_at)
    }

    /// 처리율 계산 (bytes/sec), payload 바이트 기준
    pub fn throughput(&self, payload_bytes: u64) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        payload_bytes as f64 / secs
    }

    /// 재전송 비율
    pub fn retransmit_ratio(&self) -> f64 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        self.retransmitted_packets as f64 / self.packets_sent as f64
    }

    /// 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "sent={} recv={} retrans={} timeouts={} out_of_order={} stale_acks={} ignored={} elapsed={:.3}s",
            self.packets_sent,
            self.packets_received,
            self.retransmitted_packets,
            self.timeouts,
            self.out_of_order,
            self.stale_acks,
            self.ignored,
            self.elapsed().as_secs_f64()
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let mut stats = TransferStats::new();
        stats.record_sent(516);
        stats.record_sent(516);
        stats.retransmitted_packets += 1;
        stats.record_received(4);

        assert_eq!(stats.bytes_sent, 1032);
        assert_eq!(stats.packets_received, 1);
        assert!((stats.retransmit_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_finish_freezes_elapsed() {
        let mut stats = TransferStats::new();
        stats.finish();
        let first = stats.elapsed();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(stats.elapsed(), first);
    }
}
