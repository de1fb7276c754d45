//! 수신자
//!
//! - 프레임 수신 -> 디코드 -> 오프셋 위치에 기록 -> 다이제스트 ACK
//! - 스트림 종료 시 기록한 길이로 파일을 잘라 이전의 더 긴 사본을 정리

use tracing::{debug, info, warn};

use crate::digest::ChunkHasher;
use crate::message::Message;
use crate::stats::{ProgressHandle, Role, TransferStats};
use crate::storage::{KeyedStorage, Storage};
use crate::transport::Transport;
use crate::{Config, Error, Result};

/// 수신 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    AwaitingFrame,
    Writing,
    Done,
    Aborted,
}

/// 열려 있는 키 핸들
struct OpenEntry<F> {
    key: u32,
    file: F,
}

/// 수신 세션
///
/// 연결 하나에서 키 하나를 받는다. 같은 키에 대한 동시 세션은 호출자가 막아야 한다.
pub struct Receiver<T, K: KeyedStorage, H> {
    config: Config,
    transport: T,
    store: K,
    hasher: H,
    entry: Option<OpenEntry<K::Handle>>,
    /// 기록한 payload 합계
    bytes_written: u64,
    /// max(offset + len), 종료 시 파일 길이
    high_water_mark: u64,
    state: ReceiverState,
    progress: ProgressHandle,
}

impl<T, K, H> Receiver<T, K, H>
where
    T: Transport,
    K: KeyedStorage,
    H: ChunkHasher,
{
    /// 새 수신 세션 생성
    pub fn new(config: Config, transport: T, store: K, hasher: H) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            transport,
            store,
            hasher,
            entry: None,
            bytes_written: 0,
            high_water_mark: 0,
            state: ReceiverState::AwaitingFrame,
            progress: ProgressHandle::new(Role::Receiver),
        })
    }

    /// 진행률 핸들
    pub fn progress(&self) -> ProgressHandle {
        self.progress.clone()
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// 현재 세션의 키
    pub fn key(&self) -> Option<u32> {
        self.entry.as_ref().map(|e| e.key)
    }

    /// 피어가 스트림을 닫을 때까지 수신
    ///
    /// 반환 시점에 저장소 핸들은 해제되고 전송 연결은 닫혀 있다.
    pub async fn run(&mut self) -> Result<TransferStats> {
        match self.drive().await {
            Ok(()) => {
                self.state = ReceiverState::Done;
                let stats = self.progress.snapshot();
                info!("수신 완료: {}", stats.summary());
                Ok(stats)
            }
            Err(e) => {
                self.state = ReceiverState::Aborted;
                warn!("수신 중단 (key={:?}): {}", self.key(), e);
                self.teardown_after_error().await;
                Err(e)
            }
        }
    }

    async fn drive(&mut self) -> Result<()> {
        let mut buf = vec![0u8; self.config.max_frame_size];

        loop {
            self.state = ReceiverState::AwaitingFrame;

            let n = self
                .transport
                .recv_frame(&mut buf)
                .await
                .map_err(Error::from_transport)?;

            if n == 0 {
                debug!("피어 스트림 종료");
                break;
            }

            match Message::decode(&buf[..n])? {
                Message::KeyAnnounce { key, name } => {
                    self.handle_announce(key, &String::from_utf8_lossy(&name))
                        .await?;
                }
                Message::DataChunk {
                    key,
                    offset,
                    payload,
                } => {
                    self.state = ReceiverState::Writing;
                    self.handle_chunk(key, offset, &payload).await?;
                }
                Message::Query { key } => {
                    // 응답 규약이 정해지지 않음
                    info!("Query 수신 (key={}): 응답 없이 무시", key);
                    self.progress.update(|s| s.queries_ignored += 1);
                }
            }
        }

        self.finish().await
    }

    async fn handle_announce(&mut self, key: u32, name: &str) -> Result<()> {
        if let Some(entry) = &self.entry {
            if entry.key == key {
                debug!("KeyAnnounce 재수신: key={}", key);
                return Ok(());
            }
            return Err(Error::KeyMismatch {
                expected: entry.key,
                got: key,
            });
        }

        let file = self.store.open(key).await.map_err(Error::Storage)?;
        self.entry = Some(OpenEntry { key, file });
        self.progress.update(|s| s.key = Some(key));

        info!("KeyAnnounce: key={}, name={:?}", key, name);
        Ok(())
    }

    async fn handle_chunk(&mut self, key: u32, offset: u64, payload: &[u8]) -> Result<()> {
        let entry = self
            .entry
            .as_mut()
            .ok_or(Error::UnannouncedChunk { key })?;

        if entry.key != key {
            return Err(Error::KeyMismatch {
                expected: entry.key,
                got: key,
            });
        }

        let written = entry
            .file
            .write_at(offset, payload)
            .await
            .map_err(Error::Storage)?;

        if written != payload.len() {
            return Err(Error::ShortWrite {
                offset,
                expected: payload.len(),
                written,
            });
        }

        let digest = self.hasher.hash(payload);
        self.transport
            .send_ack(&digest)
            .await
            .map_err(Error::Transport)?;

        let len = payload.len() as u64;
        self.bytes_written += len;
        self.high_water_mark = self.high_water_mark.max(offset.saturating_add(len));

        let high_water_mark = self.high_water_mark;
        self.progress.update(|s| {
            s.total_chunks += 1;
            s.total_bytes += len;
            s.high_water_mark = high_water_mark;
        });

        debug!("청크 기록: key={}, offset={}, len={}", key, offset, len);
        Ok(())
    }

    /// 정상 종료: flush, 길이 맞추기, 핸들 해제
    async fn finish(&mut self) -> Result<()> {
        if let Some(mut entry) = self.entry.take() {
            entry.file.flush().await.map_err(Error::Storage)?;
            entry
                .file
                .truncate(self.high_water_mark)
                .await
                .map_err(Error::Storage)?;

            debug!(
                "키 {} 파일 길이 {} bytes (기록 {} bytes)",
                entry.key, self.high_water_mark, self.bytes_written
            );
        }

        self.transport.close().await.map_err(Error::Transport)
    }

    /// 오류 경로 정리: 자르지 않고 flush 후 핸들 해제
    async fn teardown_after_error(&mut self) {
        if let Some(mut entry) = self.entry.take() {
            if let Err(e) = entry.file.flush().await {
                warn!("키 {} 파일 flush 실패: {}", entry.key, e);
            }
        }

        if let Err(e) = self.transport.close().await {
            warn!("전송 종료 실패: {}", e);
        }
    }
}
