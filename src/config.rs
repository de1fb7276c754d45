//! 프로토콜 설정

use std::fmt;
use std::str::FromStr;

use crate::message::DATA_CHUNK_OVERHEAD;
use crate::{Error, Result, DEFAULT_MAX_FRAME_SIZE};

/// 전송 계층 프레임 구분 방식
///
/// 프레임 자체에는 길이 필드가 없으므로 전송 계층이 경계를 정해야 한다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// read() 한 번 = 프레임 하나 (기존 wire 호환)
    ///
    /// 메시지 경계를 보존하는 전송에서만 안전하다. TCP에서는 응답 없는
    /// KeyAnnounce와 첫 DataChunk가 한 번의 read로 합쳐질 수 있다.
    Raw,

    /// 4바이트 big-endian 길이 접두사
    #[default]
    LengthPrefixed,
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Framing::Raw => write!(f, "raw"),
            Framing::LengthPrefixed => write!(f, "length-prefixed"),
        }
    }
}

impl FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Framing::Raw),
            "length-prefixed" | "length" | "prefixed" => Ok(Framing::LengthPrefixed),
            other => Err(format!("알 수 없는 framing: {other} (raw | length-prefixed)")),
        }
    }
}

/// keysync 세션 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 최대 프레임 크기 (바이트, 헤더 포함)
    pub max_frame_size: usize,

    /// 프레임 구분 방식
    pub framing: Framing,

    /// 해시 불일치 시 청크 재전송 횟수
    /// 0이면 첫 불일치에서 중단
    pub max_chunk_retries: u32,

    /// 진행률 출력 주기 (밀리초)
    pub progress_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            framing: Framing::LengthPrefixed,
            max_chunk_retries: 3,
            progress_interval_ms: 1000,
        }
    }
}

impl Config {
    /// 64바이트 프레임, raw framing, 재전송 없음
    pub fn reference() -> Self {
        Self {
            max_frame_size: 64,
            framing: Framing::Raw,
            max_chunk_retries: 0,
            progress_interval_ms: 1000,
        }
    }

    /// 대용량 파일용 설정
    pub fn bulk() -> Self {
        Self {
            max_frame_size: 256 * 1024,
            framing: Framing::LengthPrefixed,
            max_chunk_retries: 3,
            progress_interval_ms: 500,
        }
    }

    /// DataChunk 하나에 담을 수 있는 payload 크기
    pub fn chunk_capacity(&self) -> usize {
        self.max_frame_size.saturating_sub(DATA_CHUNK_OVERHEAD)
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.max_frame_size <= DATA_CHUNK_OVERHEAD {
            return Err(Error::InvalidConfig(format!(
                "max_frame_size {}는 DataChunk 헤더 {} bytes보다 커야 함",
                self.max_frame_size, DATA_CHUNK_OVERHEAD
            )));
        }
        if self.max_frame_size > u32::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "max_frame_size {}는 u32 길이 접두사 범위를 넘음",
                self.max_frame_size
            )));
        }
        Ok(())
    }
}
