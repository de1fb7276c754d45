//! 전송 계층
//!
//! 엔진은 `Transport` 트레이트만 사용한다. `FramedStream`은 tokio 바이트 스트림
//! 위에 `Framing`에 따라 프레임 경계를 만든다.
//!
//! ACK(다이제스트)는 타입 없는 고정 길이 바이트라 두 방식 모두 접두사 없이
//! 보내고 정확한 길이만큼 읽는다.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::Framing;
use crate::error::FrameError;

/// 길이 접두사 크기
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// 양방향 순서 보장 전송
pub trait Transport: Send {
    /// 프레임 하나 송신
    fn send_frame(&mut self, frame: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// 프레임 하나 수신, 길이 반환 (0 = 피어 정상 종료)
    fn recv_frame(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;

    /// ACK 바이트 송신
    fn send_ack(&mut self, digest: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// 정확히 `buf.len()` 바이트의 ACK 수신
    fn recv_ack(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<()>> + Send;

    fn close(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

/// 바이트 스트림 위의 프레임 전송
pub struct FramedStream<S> {
    inner: S,
    framing: Framing,
    max_frame_size: usize,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(inner: S, framing: Framing, max_frame_size: usize) -> Self {
        Self {
            inner,
            framing,
            max_frame_size,
        }
    }

    /// 길이 접두사 읽기. 접두사 시작 전에 EOF면 None
    async fn read_length_prefix(&mut self) -> io::Result<Option<usize>> {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        let mut filled = 0;

        while filled < LENGTH_PREFIX_SIZE {
            let n = self.inner.read(&mut prefix[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "길이 접두사 도중 연결 종료",
                ));
            }
            filled += n;
        }

        Ok(Some(u32::from_be_bytes(prefix) as usize))
    }
}

impl FramedStream<TcpStream> {
    /// TCP 연결
    pub async fn connect(
        addr: SocketAddr,
        framing: Framing,
        max_frame_size: usize,
    ) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Self::from_tcp(stream, framing, max_frame_size)
    }

    /// accept된 연결 감싸기
    pub fn from_tcp(stream: TcpStream, framing: Framing, max_frame_size: usize) -> io::Result<Self> {
        // 요청/응답 왕복마다 Nagle 지연이 생기지 않도록
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, framing, max_frame_size))
    }
}

impl<S> Transport for FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        match self.framing {
            Framing::Raw => self.inner.write_all(frame).await?,
            Framing::LengthPrefixed => {
                let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + frame.len());
                buf.extend_from_slice(&(frame.len() as u32).to_be_bytes());
                buf.extend_from_slice(frame);
                self.inner.write_all(&buf).await?;
            }
        }
        self.inner.flush().await
    }

    async fn recv_frame(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.framing {
            // 한 번의 read를 프레임 하나로 취급
            Framing::Raw => self.inner.read(buf).await,
            Framing::LengthPrefixed => {
                let len = match self.read_length_prefix().await? {
                    Some(len) => len,
                    None => return Ok(0),
                };

                let limit = self.max_frame_size.min(buf.len());
                if len == 0 || len > limit {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        FrameError::InvalidLength { len, max: limit },
                    ));
                }

                self.inner.read_exact(&mut buf[..len]).await?;
                Ok(len)
            }
        }
    }

    async fn send_ack(&mut self, digest: &[u8]) -> io::Result<()> {
        self.inner.write_all(digest).await?;
        self.inner.flush().await
    }

    async fn recv_ack(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.inner.read_exact(buf).await?;
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        debug!("전송 종료 ({})", self.framing);
        self.inner.shutdown().await
    }
}
