//! 테스트용 전송/저장소 더블

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::digest::{ChunkHasher, Sha1Hasher};
use crate::message::Message;
use crate::storage::{KeyedStorage, Storage};
use crate::transport::Transport;

/// 송신 프레임을 보고 ACK 바이트를 만드는 함수
pub(crate) type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

#[derive(Default)]
struct Shared {
    inbound_frames: VecDeque<Vec<u8>>,
    inbound_acks: VecDeque<u8>,
    sent_frames: Vec<Vec<u8>>,
    sent_acks: Vec<Vec<u8>>,
    closed: bool,
}

/// 메시지 경계를 보존하는 메모리 전송
pub(crate) struct MemoryTransport {
    shared: Arc<Mutex<Shared>>,
    responder: Option<Responder>,
}

/// 테스트 쪽에서 MemoryTransport를 조작/검사하는 핸들
#[derive(Clone)]
pub(crate) struct MemoryPeer {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryTransport {
    pub(crate) fn new() -> (Self, MemoryPeer) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let transport = Self {
            shared: shared.clone(),
            responder: None,
        };
        (transport, MemoryPeer { shared })
    }

    pub(crate) fn with_responder(mut self, responder: Responder) -> Self {
        self.responder = Some(responder);
        self
    }
}

impl MemoryPeer {
    pub(crate) fn push_frame(&self, frame: impl Into<Vec<u8>>) {
        self.shared.lock().inbound_frames.push_back(frame.into());
    }

    pub(crate) fn push_message(&self, msg: &Message) {
        let frame = msg.encode(usize::MAX).unwrap();
        self.push_frame(frame.to_vec());
    }

    pub(crate) fn sent_messages(&self) -> Vec<Message> {
        self.shared
            .lock()
            .sent_frames
            .iter()
            .map(|f| Message::decode(f).unwrap())
            .collect()
    }

    pub(crate) fn sent_acks(&self) -> Vec<Vec<u8>> {
        self.shared.lock().sent_acks.clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

impl Transport for MemoryTransport {
    async fn send_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        let ack = self.responder.as_mut().and_then(|respond| respond(frame));

        let mut shared = self.shared.lock();
        if shared.closed {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        shared.sent_frames.push(frame.to_vec());
        if let Some(ack) = ack {
            shared.inbound_acks.extend(ack);
        }
        Ok(())
    }

    async fn recv_frame(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut shared = self.shared.lock();
        match shared.inbound_frames.pop_front() {
            // 큐가 비면 피어 종료로 취급
            None => Ok(0),
            Some(frame) if frame.len() > buf.len() => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "frame larger than buffer",
            )),
            Some(frame) => {
                buf[..frame.len()].copy_from_slice(&frame);
                Ok(frame.len())
            }
        }
    }

    async fn send_ack(&mut self, digest: &[u8]) -> io::Result<()> {
        self.shared.lock().sent_acks.push(digest.to_vec());
        Ok(())
    }

    async fn recv_ack(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let len = buf.len();
        let mut shared = self.shared.lock();
        if shared.inbound_acks.len() < len {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        for (dst, src) in buf.iter_mut().zip(shared.inbound_acks.drain(..len)) {
            *dst = src;
        }
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        self.shared.lock().closed = true;
        Ok(())
    }
}

/// DataChunk마다 SHA-1 ACK를 돌려주는 응답자
///
/// `corrupt` 에 포함된 순번(0부터)의 청크는 ACK 첫 바이트를 뒤집는다.
pub(crate) fn sha1_acker(corrupt: Vec<usize>) -> Responder {
    let mut seen = 0usize;
    Box::new(move |frame: &[u8]| match Message::decode(frame).ok()? {
        Message::DataChunk { payload, .. } => {
            let mut ack = Sha1Hasher.hash(&payload);
            if corrupt.contains(&seen) {
                ack[0] ^= 0xFF;
            }
            seen += 1;
            Some(ack)
        }
        _ => None,
    })
}

/// 받은 ACK 중 지정한 순번만 손상시키는 래퍼
pub(crate) struct CorruptAcks<T> {
    inner: T,
    corrupt: Vec<usize>,
    seen: usize,
}

impl<T> CorruptAcks<T> {
    pub(crate) fn new(inner: T, corrupt: Vec<usize>) -> Self {
        Self {
            inner,
            corrupt,
            seen: 0,
        }
    }
}

impl<T: Transport> Transport for CorruptAcks<T> {
    async fn send_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.inner.send_frame(frame).await
    }

    async fn recv_frame(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.recv_frame(buf).await
    }

    async fn send_ack(&mut self, digest: &[u8]) -> io::Result<()> {
        self.inner.send_ack(digest).await
    }

    async fn recv_ack(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.inner.recv_ack(buf).await?;
        if self.corrupt.contains(&self.seen) {
            buf[0] ^= 0xFF;
        }
        self.seen += 1;
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        self.inner.close().await
    }
}

#[derive(Default)]
struct StorageState {
    data: Vec<u8>,
    max_write: Option<usize>,
    fail_writes: bool,
    flushes: usize,
}

/// 쓰기 동작을 조절할 수 있는 메모리 저장소
///
/// clone은 같은 내용을 공유한다.
#[derive(Clone, Default)]
pub(crate) struct MemoryStorage {
    state: Arc<Mutex<StorageState>>,
}

impl MemoryStorage {
    pub(crate) fn with_contents(data: &[u8]) -> Self {
        let storage = Self::default();
        storage.state.lock().data = data.to_vec();
        storage
    }

    /// write_at 한 번에 최대 `n` 바이트만 기록
    pub(crate) fn limit_writes(self, n: usize) -> Self {
        self.state.lock().max_write = Some(n);
        self
    }

    /// 모든 write_at 실패
    pub(crate) fn fail_writes(self) -> Self {
        self.state.lock().fail_writes = true;
        self
    }

    pub(crate) fn contents(&self) -> Vec<u8> {
        self.state.lock().data.clone()
    }

    pub(crate) fn flushes(&self) -> usize {
        self.state.lock().flushes
    }
}

impl Storage for MemoryStorage {
    async fn size(&mut self) -> io::Result<u64> {
        Ok(self.state.lock().data.len() as u64)
    }

    async fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        let state = self.state.lock();
        let start = (pos as usize).min(state.data.len());
        let n = buf.len().min(state.data.len() - start);
        buf[..n].copy_from_slice(&state.data[start..start + n]);
        Ok(n)
    }

    async fn write_at(&mut self, pos: u64, data: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::Other, "디스크 가득 참"));
        }

        let n = state.max_write.map_or(data.len(), |max| max.min(data.len()));
        let start = pos as usize;
        if state.data.len() < start + n {
            state.data.resize(start + n, 0);
        }
        state.data[start..start + n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    async fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.state.lock().data.resize(len as usize, 0);
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.state.lock().flushes += 1;
        Ok(())
    }
}

/// 모든 키에 같은 `MemoryStorage`를 돌려주는 저장소
#[derive(Clone, Default)]
pub(crate) struct MemoryKeyStore {
    storage: MemoryStorage,
    fail_open: bool,
}

impl MemoryKeyStore {
    pub(crate) fn new(storage: MemoryStorage) -> Self {
        Self {
            storage,
            fail_open: false,
        }
    }

    /// open 실패
    pub(crate) fn failing() -> Self {
        Self {
            storage: MemoryStorage::default(),
            fail_open: true,
        }
    }
}

impl KeyedStorage for MemoryKeyStore {
    type Handle = MemoryStorage;

    async fn open(&self, _key: u32) -> io::Result<MemoryStorage> {
        if self.fail_open {
            return Err(io::ErrorKind::PermissionDenied.into());
        }
        Ok(self.storage.clone())
    }
}
