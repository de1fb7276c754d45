//! 에러 타입 정의

use thiserror::Error;

/// 프레임 코덱 에러
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("버퍼 부족: 필요 {required} bytes, 용량 {capacity} bytes")]
    BufferTooSmall { required: usize, capacity: usize },

    #[error("알 수 없는 메시지 타입: {0}")]
    UnknownType(u8),

    #[error("잘린 프레임: 최소 {needed} bytes 필요, {got} bytes 수신")]
    Truncated { needed: usize, got: usize },

    #[error("잘못된 프레임 길이: {len} (최대 {max})")]
    InvalidLength { len: usize, max: usize },
}

/// 세션 실패 사유 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Protocol,
    Storage,
    HashMismatch,
    Config,
}

/// keysync 에러 타입
///
/// 모든 variant는 세션에 치명적이다. 세션은 핸들 정리 후 이 값을 반환한다.
#[derive(Error, Debug)]
pub enum Error {
    #[error("전송 에러: {0}")]
    Transport(#[source] std::io::Error),

    #[error("프레임 에러: {0}")]
    Frame(#[from] FrameError),

    #[error("KeyAnnounce 없이 청크 수신: key={key}")]
    UnannouncedChunk { key: u32 },

    #[error("키 불일치: expected {expected}, got {got}")]
    KeyMismatch { expected: u32, got: u32 },

    #[error("저장소 에러: {0}")]
    Storage(#[source] std::io::Error),

    #[error("부분 쓰기: offset={offset}, expected {expected} bytes, written {written} bytes")]
    ShortWrite {
        offset: u64,
        expected: usize,
        written: usize,
    },

    #[error("해시 불일치: key={key}, offset={offset}, expected {expected}, got {got}")]
    HashMismatch {
        key: u32,
        offset: u64,
        expected: String,
        got: String,
    },

    #[error("잘못된 설정: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// 에러 분류 반환
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) => ErrorKind::Transport,
            Error::Frame(_) | Error::UnannouncedChunk { .. } | Error::KeyMismatch { .. } => {
                ErrorKind::Protocol
            }
            Error::Storage(_) | Error::ShortWrite { .. } => ErrorKind::Storage,
            Error::HashMismatch { .. } => ErrorKind::HashMismatch,
            Error::InvalidConfig(_) => ErrorKind::Config,
        }
    }

    /// 전송 계층 I/O 에러 분류
    ///
    /// 프레임 경계 위반(`FrameError`를 담은 io 에러)은 Protocol로, 나머지는 Transport로.
    pub(crate) fn from_transport(err: std::io::Error) -> Self {
        match err.get_ref().and_then(|inner| inner.downcast_ref::<FrameError>()) {
            Some(frame_err) => Error::Frame(frame_err.clone()),
            None => Error::Transport(err),
        }
    }

    /// 두 다이제스트로 HashMismatch 생성
    pub(crate) fn hash_mismatch(key: u32, offset: u64, expected: &[u8], got: &[u8]) -> Self {
        Error::HashMismatch {
            key,
            offset,
            expected: hex::encode(expected),
            got: hex::encode(got),
        }
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
