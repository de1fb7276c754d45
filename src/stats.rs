//! 전송 통계

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// 세션 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

/// 세션 단위 전송 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 역할
    pub role: Role,

    /// 시작 시간
    pub start_time: Instant,

    /// 전송 중인 키
    pub key: Option<u32>,

    /// 전체 크기 (송신측만 알 수 있음)
    pub total_size: Option<u64>,

    /// 시작 오프셋 (재개 시 0이 아님)
    pub start_offset: u64,

    /// 확인된 청크 수
    pub total_chunks: u64,

    /// 확인된 바이트
    pub total_bytes: u64,

    /// 해시 불일치로 재전송한 청크 수
    pub retransmitted_chunks: u64,

    /// 해시 불일치 횟수
    pub hash_mismatches: u64,

    /// 응답 없이 넘긴 Query 수
    pub queries_ignored: u64,

    /// 수신측 파일 최종 길이
    pub high_water_mark: u64,
}

impl TransferStats {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            start_time: Instant::now(),
            key: None,
            total_size: None,
            start_offset: 0,
            total_chunks: 0,
            total_bytes: 0,
            retransmitted_chunks: 0,
            hash_mismatches: 0,
            queries_ignored: 0,
            high_water_mark: 0,
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / elapsed
    }

    /// 진행률 (0.0 ~ 1.0), 전체 크기를 모르면 None
    pub fn progress_ratio(&self) -> Option<f64> {
        let total = self.total_size?;
        if total == 0 {
            return Some(1.0);
        }
        let done = self.start_offset + self.total_bytes;
        Some((done as f64 / total as f64).min(1.0))
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        let key = self
            .key
            .map(|k| k.to_string())
            .unwrap_or_else(|| "-".into());
        let progress = self
            .progress_ratio()
            .map(|r| format!("{:.1}%", r * 100.0))
            .unwrap_or_else(|| "-".into());

        format!(
            "{:?} key={} | Elapsed: {:.2}s | Chunks: {} | Bytes: {} | Progress: {} | Throughput: {:.2} MB/s | Retransmits: {} | Mismatches: {}",
            self.role,
            key,
            self.elapsed().as_secs_f64(),
            self.total_chunks,
            self.total_bytes,
            progress,
            self.throughput() / 1_000_000.0,
            self.retransmitted_chunks,
            self.hash_mismatches,
        )
    }
}

/// 실행 중인 세션의 통계를 다른 태스크에서 읽기 위한 핸들
#[derive(Debug, Clone)]
pub struct ProgressHandle {
    inner: Arc<RwLock<TransferStats>>,
}

impl ProgressHandle {
    pub fn new(role: Role) -> Self {
        Self {
            inner: Arc::new(RwLock::new(TransferStats::new(role))),
        }
    }

    /// 현재 통계 복사본
    pub fn snapshot(&self) -> TransferStats {
        self.inner.read().clone()
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut TransferStats)) {
        let mut guard = self.inner.write();
        f(&mut *guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_ratio() {
        let mut stats = TransferStats::new(Role::Sender);
        assert_eq!(stats.progress_ratio(), None);

        stats.total_size = Some(200);
        stats.total_bytes = 50;
        assert_eq!(stats.progress_ratio(), Some(0.25));

        // 재개 오프셋 포함
        stats.start_offset = 100;
        assert_eq!(stats.progress_ratio(), Some(0.75));

        stats.total_size = Some(0);
        assert_eq!(stats.progress_ratio(), Some(1.0));
    }

    #[test]
    fn test_handle_shares_state() {
        let handle = ProgressHandle::new(Role::Receiver);
        let other = handle.clone();

        handle.update(|s| {
            s.key = Some(9);
            s.total_chunks += 2;
        });

        let snap = other.snapshot();
        assert_eq!(snap.key, Some(9));
        assert_eq!(snap.total_chunks, 2);
        assert!(snap.summary().contains("key=9"));
    }
}
