//! 프레임 코덱
//!
//! `Message` <-> 바이트 버퍼 변환. I/O 없음.
//!
//! ```text
//! KeyAnnounce: [0][key u32 BE][name ...]
//! DataChunk:   [1][key u32 BE][offset u64 BE][payload ...]
//! Query:       [2][key u32 BE]
//! ```
//!
//! 프레임에는 길이 필드가 없다. payload 길이는 입력 슬라이스 길이로 정해지므로
//! 프레임 경계는 전송 계층이 책임진다 (`Framing` 참고).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::FrameError;

/// KeyAnnounce / Query 헤더 크기: type(1) + key(4)
pub const KEY_HEADER_OVERHEAD: usize = 5;

/// DataChunk 헤더 크기: type(1) + key(4) + offset(8)
pub const DATA_CHUNK_OVERHEAD: usize = 13;

/// 메시지 타입 태그
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// 이후 청크가 속할 키 선언
    KeyAnnounce = 0,

    /// 파일 데이터 청크
    DataChunk = 1,

    /// 수신측 사본 정보 요청 (응답 규약 없음)
    Query = 2,
}

impl MessageType {
    /// 고정 헤더 크기
    pub fn overhead(self) -> usize {
        match self {
            MessageType::KeyAnnounce | MessageType::Query => KEY_HEADER_OVERHEAD,
            MessageType::DataChunk => DATA_CHUNK_OVERHEAD,
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = FrameError;

    fn try_from(tag: u8) -> Result<Self, FrameError> {
        match tag {
            0 => Ok(MessageType::KeyAnnounce),
            1 => Ok(MessageType::DataChunk),
            2 => Ok(MessageType::Query),
            other => Err(FrameError::UnknownType(other)),
        }
    }
}

/// 전송 단위 메시지
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeyAnnounce { key: u32, name: Bytes },
    DataChunk { key: u32, offset: u64, payload: Bytes },
    Query { key: u32 },
}

impl Message {
    /// 메시지 타입 반환
    pub fn msg_type(&self) -> MessageType {
        match self {
            Message::KeyAnnounce { .. } => MessageType::KeyAnnounce,
            Message::DataChunk { .. } => MessageType::DataChunk,
            Message::Query { .. } => MessageType::Query,
        }
    }

    pub fn key(&self) -> u32 {
        match self {
            Message::KeyAnnounce { key, .. }
            | Message::DataChunk { key, .. }
            | Message::Query { key } => *key,
        }
    }

    /// payload (Query는 빈 슬라이스)
    pub fn payload(&self) -> &[u8] {
        match self {
            Message::KeyAnnounce { name, .. } => name,
            Message::DataChunk { payload, .. } => payload,
            Message::Query { .. } => &[],
        }
    }

    /// 헤더 크기
    pub fn overhead(&self) -> usize {
        self.msg_type().overhead()
    }

    /// wire 상의 프레임 길이 (패딩 없음)
    pub fn wire_len(&self) -> usize {
        self.overhead() + self.payload().len()
    }

    /// 프레임으로 직렬화 (정확히 `wire_len()` 바이트)
    pub fn encode(&self, capacity: usize) -> Result<Bytes, FrameError> {
        let required = self.check_capacity(capacity)?;

        let mut buf = BytesMut::with_capacity(required);
        self.write_to(&mut buf);
        Ok(buf.freeze())
    }

    /// 호출자 버퍼에 직렬화, 남는 뒷부분은 0으로 채움
    ///
    /// 쓴 프레임 길이를 반환한다.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize, FrameError> {
        let required = self.check_capacity(buf.len())?;

        let (frame, tail) = buf.split_at_mut(required);
        self.write_to(&mut &mut *frame);
        tail.fill(0);
        Ok(required)
    }

    /// 프레임에서 역직렬화
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let &tag = bytes
            .first()
            .ok_or(FrameError::Truncated { needed: 1, got: 0 })?;
        let msg_type = MessageType::try_from(tag)?;

        let needed = msg_type.overhead();
        if bytes.len() < needed {
            return Err(FrameError::Truncated {
                needed,
                got: bytes.len(),
            });
        }

        let mut cur = &bytes[1..];
        let key = cur.get_u32();

        let msg = match msg_type {
            MessageType::KeyAnnounce => Message::KeyAnnounce {
                key,
                name: Bytes::copy_from_slice(cur),
            },
            MessageType::DataChunk => {
                let offset = cur.get_u64();
                Message::DataChunk {
                    key,
                    offset,
                    payload: Bytes::copy_from_slice(cur),
                }
            }
            // 헤더 뒤 바이트는 무시
            MessageType::Query => Message::Query { key },
        };

        Ok(msg)
    }

    fn check_capacity(&self, capacity: usize) -> Result<usize, FrameError> {
        let required = self.wire_len();
        if capacity < required {
            return Err(FrameError::BufferTooSmall { required, capacity });
        }
        Ok(required)
    }

    /// 호출 전에 용량 검사가 끝나 있어야 함
    fn write_to<B: BufMut>(&self, dst: &mut B) {
        dst.put_u8(self.msg_type() as u8);
        dst.put_u32(self.key());

        match self {
            Message::KeyAnnounce { name, .. } => dst.put_slice(name),
            Message::DataChunk {
                offset, payload, ..
            } => {
                dst.put_u64(*offset);
                dst.put_slice(payload);
            }
            Message::Query { .. } => {}
        }
    }
}
