//! # keysync
//!
//! 키 기반 청크 복제 프로토콜
//!
//! ## 핵심 특징
//! - **키 주소 지정**: 파일을 32비트 키로 식별, 수신측은 `root/key/<key>` 에 저장
//! - **청크 단위 확인**: DataChunk마다 payload 다이제스트(SHA-1)로 ACK
//! - **오프셋 기록**: 청크가 순서 없이 와도 오프셋 위치에 그대로 기록
//! - **프레이밍 선택**: 길이 접두사(기본) 또는 헤더만 있는 원형 프레임
//! - **재시도/재개**: 불일치 시 제한된 재전송, 중간 오프셋부터 재개

pub mod config;
pub mod digest;
pub mod error;
pub mod message;
pub mod receiver;
pub mod sender;
pub mod stats;
pub mod storage;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::{Config, Framing};
pub use digest::{ChunkHasher, Crc32Hasher, Sha1Hasher};
pub use error::{Error, ErrorKind, FrameError, Result};
pub use message::{Message, MessageType};
pub use receiver::{Receiver, ReceiverState};
pub use sender::{Sender, SenderState};
pub use stats::{ProgressHandle, Role, TransferStats};
pub use storage::{KeyStore, KeyedStorage, Storage};
pub use transport::{FramedStream, Transport};

/// 기본 최대 프레임 크기 (바이트)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024; // 16KB
