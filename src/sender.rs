//! 송신자
//!
//! - KeyAnnounce 후 청크 단위 전송
//! - 청크마다 다이제스트 ACK 확인 후 다음 오프셋으로 진행
//! - 파이프라이닝 없음: ACK 전에는 다음 청크를 보내지 않는다

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::digest::ChunkHasher;
use crate::message::Message;
use crate::stats::{ProgressHandle, Role, TransferStats};
use crate::storage::Storage;
use crate::transport::Transport;
use crate::{Config, Error, Result};

/// 송신 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Announcing,
    Streaming,
    Closing,
    Done,
    Aborted,
}

/// 송신 세션
///
/// 전송 연결 하나와 원본 파일 하나를 독점한다.
pub struct Sender<T, S, H> {
    config: Config,
    transport: T,
    source: S,
    hasher: H,
    key: u32,
    name: Bytes,
    cursor: u64,
    state: SenderState,
    progress: ProgressHandle,
}

impl<T, S, H> Sender<T, S, H>
where
    T: Transport,
    S: Storage,
    H: ChunkHasher,
{
    /// 새 송신 세션 생성
    pub fn new(
        config: Config,
        transport: T,
        source: S,
        hasher: H,
        key: u32,
        name: impl Into<Bytes>,
    ) -> Result<Self> {
        config.validate()?;

        let progress = ProgressHandle::new(Role::Sender);
        progress.update(|s| s.key = Some(key));

        Ok(Self {
            config,
            transport,
            source,
            hasher,
            key,
            name: name.into(),
            cursor: 0,
            state: SenderState::Announcing,
            progress,
        })
    }

    /// 지정 오프셋부터 전송 (수신측이 앞부분을 이미 가진 경우)
    pub fn resume_from(mut self, offset: u64) -> Self {
        self.cursor = offset;
        self.progress.update(|s| s.start_offset = offset);
        self
    }

    /// 진행률 핸들
    pub fn progress(&self) -> ProgressHandle {
        self.progress.clone()
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    /// 다음에 보낼 오프셋
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// 전송 실행
    ///
    /// 성공/실패와 관계없이 반환 시점에 전송 연결은 닫혀 있다.
    pub async fn run(&mut self) -> Result<TransferStats> {
        info!(
            "송신 시작: key={}, name={:?}, offset={}",
            self.key,
            String::from_utf8_lossy(&self.name),
            self.cursor
        );

        match self.drive().await {
            Ok(()) => {
                self.state = SenderState::Done;
                let stats = self.progress.snapshot();
                info!("송신 완료: {}", stats.summary());
                Ok(stats)
            }
            Err(e) => {
                self.state = SenderState::Aborted;
                warn!("송신 중단 (key={}, offset={}): {}", self.key, self.cursor, e);
                if let Err(close_err) = self.transport.close().await {
                    warn!("전송 종료 실패: {}", close_err);
                }
                Err(e)
            }
        }
    }

    async fn drive(&mut self) -> Result<()> {
        self.announce().await?;
        self.stream().await?;
        self.close().await
    }

    /// KeyAnnounce 송신 (ACK 없음)
    async fn announce(&mut self) -> Result<()> {
        self.state = SenderState::Announcing;

        let total_size = self.source.size().await.map_err(Error::Storage)?;
        self.progress.update(|s| s.total_size = Some(total_size));
        self.clamp_resume_offset(total_size)?;

        let frame = Message::KeyAnnounce {
            key: self.key,
            name: self.name.clone(),
        }
        .encode(self.config.max_frame_size)?;

        self.transport
            .send_frame(&frame)
            .await
            .map_err(Error::Transport)?;

        debug!("KeyAnnounce 송신: key={}, size={} bytes", self.key, total_size);
        Ok(())
    }

    /// 재개 오프셋 보정
    ///
    /// 수신측은 받은 청크의 끝까지만 파일을 남기므로 최소 한 청크는 보내야 한다.
    /// 원본 끝에서 재개하면 마지막 청크부터 다시 보낸다.
    fn clamp_resume_offset(&mut self, total_size: u64) -> Result<()> {
        if self.cursor > total_size {
            return Err(Error::InvalidConfig(format!(
                "재개 오프셋 {}가 원본 크기 {}를 넘음",
                self.cursor, total_size
            )));
        }

        if self.cursor > 0 && self.cursor == total_size {
            let rewound = total_size.saturating_sub(self.config.chunk_capacity() as u64);
            debug!("원본 끝에서 재개: offset {} -> {}", self.cursor, rewound);
            self.cursor = rewound;
            self.progress.update(|s| s.start_offset = rewound);
        }
        Ok(())
    }

    /// 원본 끝까지 청크 전송
    async fn stream(&mut self) -> Result<()> {
        self.state = SenderState::Streaming;

        let mut buf = vec![0u8; self.config.chunk_capacity()];
        let mut ack = vec![0u8; self.hasher.digest_len()];

        loop {
            let n = self
                .source
                .read_at(self.cursor, &mut buf)
                .await
                .map_err(Error::Storage)?;

            if n == 0 {
                return Ok(());
            }

            let payload = Bytes::copy_from_slice(&buf[..n]);
            let expected = self.hasher.hash(&payload);
            let frame = Message::DataChunk {
                key: self.key,
                offset: self.cursor,
                payload,
            }
            .encode(self.config.max_frame_size)?;

            self.send_chunk(&frame, &expected, &mut ack).await?;

            debug!("청크 확인: offset={}, len={}", self.cursor, n);
            self.cursor += n as u64;
            self.progress.update(|s| {
                s.total_chunks += 1;
                s.total_bytes += n as u64;
            });
        }
    }

    /// 청크 송신 후 ACK 검증, 불일치 시 재전송 한도까지 반복
    async fn send_chunk(&mut self, frame: &[u8], expected: &[u8], ack: &mut [u8]) -> Result<()> {
        let mut attempt = 0;

        loop {
            self.transport
                .send_frame(frame)
                .await
                .map_err(Error::Transport)?;
            self.transport
                .recv_ack(ack)
                .await
                .map_err(Error::from_transport)?;

            if &ack[..] == expected {
                return Ok(());
            }

            self.progress.update(|s| s.hash_mismatches += 1);

            if attempt >= self.config.max_chunk_retries {
                return Err(Error::hash_mismatch(self.key, self.cursor, expected, ack));
            }

            attempt += 1;
            warn!(
                "해시 불일치: offset={}, 재전송 {}/{}",
                self.cursor, attempt, self.config.max_chunk_retries
            );
            self.progress.update(|s| s.retransmitted_chunks += 1);
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.state = SenderState::Closing;
        self.source.flush().await.map_err(Error::Storage)?;
        self.transport.close().await.map_err(Error::Transport)
    }
}
