//! 저장소 어댑터
//!
//! - `Storage`: 엔진이 쓰는 seek 가능한 파일 추상화
//! - `KeyStore`: 정수 키 -> `<root>/key/<key>` 경로 매핑

use std::future::Future;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

/// 임의 위치 읽기/쓰기가 가능한 저장소 핸들
pub trait Storage: Send {
    /// 현재 크기 (바이트)
    fn size(&mut self) -> impl Future<Output = io::Result<u64>> + Send;

    /// `pos`부터 버퍼가 차거나 EOF까지 읽음
    fn read_at(&mut self, pos: u64, buf: &mut [u8])
        -> impl Future<Output = io::Result<usize>> + Send;

    /// `pos`에 기록하고 쓴 바이트 수 반환
    ///
    /// 저장소가 더 받아들이지 못하면 `data.len()`보다 작은 값을 반환한다.
    fn write_at(&mut self, pos: u64, data: &[u8])
        -> impl Future<Output = io::Result<usize>> + Send;

    /// 크기를 `len`으로 자름
    fn truncate(&mut self, len: u64) -> impl Future<Output = io::Result<()>> + Send;

    fn flush(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

impl Storage for File {
    async fn size(&mut self) -> io::Result<u64> {
        AsyncWriteExt::flush(self).await?;
        Ok(self.metadata().await?.len())
    }

    async fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.seek(SeekFrom::Start(pos)).await?;

        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    async fn write_at(&mut self, pos: u64, data: &[u8]) -> io::Result<usize> {
        self.seek(SeekFrom::Start(pos)).await?;

        // tokio File은 write 한 번에 최대 2MB까지만 받음
        let mut written = 0;
        while written < data.len() {
            let n = self.write(&data[written..]).await?;
            if n == 0 {
                break;
            }
            written += n;
        }
        Ok(written)
    }

    async fn truncate(&mut self, len: u64) -> io::Result<()> {
        // 대기 중인 쓰기가 끝난 뒤 자름
        AsyncWriteExt::flush(self).await?;
        self.set_len(len).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        AsyncWriteExt::flush(self).await
    }
}

/// 키로 저장소 핸들을 여는 쪽 (수신측)
pub trait KeyedStorage: Send {
    type Handle: Storage;

    /// 키 핸들 열기. 기존 내용은 유지한다.
    fn open(&self, key: u32) -> impl Future<Output = io::Result<Self::Handle>> + Send;
}

/// 송신할 원본 파일을 읽기 전용으로 열기
pub async fn open_source(path: impl AsRef<Path>) -> io::Result<File> {
    File::open(path).await
}

/// 키 기반 저장소
///
/// 루트 경로는 생성 시 주입된다.
#[derive(Debug, Clone)]
pub struct KeyStore {
    root: PathBuf,
}

impl KeyStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<root>/key/<key>`
    pub fn path_for(&self, key: u32) -> PathBuf {
        self.root.join("key").join(key.to_string())
    }

    /// 키 파일 열기
    ///
    /// 없는 상위 디렉터리는 만들고, 파일이 없으면 생성한다.
    /// 기존 내용은 자르지 않는다.
    pub async fn open(&self, key: u32) -> io::Result<File> {
        let path = self.path_for(key);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await?;

        debug!("키 {} 파일 열기: {:?}", key, path);
        Ok(file)
    }
}

impl KeyedStorage for KeyStore {
    type Handle = File;

    async fn open(&self, key: u32) -> io::Result<File> {
        KeyStore::open(self, key).await
    }
}
