//! 청크 다이제스트
//!
//! 수신측은 받은 payload의 다이제스트를 그대로 ACK로 돌려보낸다.
//! 양쪽은 같은 hasher를 사용해야 한다.

use sha1::{Digest, Sha1};

/// SHA-1 다이제스트 길이
pub const SHA1_DIGEST_LEN: usize = 20;

/// 교체 가능한 다이제스트 함수
pub trait ChunkHasher: Send + Sync {
    /// 고정 다이제스트 길이 (ACK 크기)
    fn digest_len(&self) -> usize;

    /// 다이제스트 계산
    fn hash(&self, data: &[u8]) -> Vec<u8>;
}

/// SHA-1 (기본)
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha1Hasher;

impl ChunkHasher for Sha1Hasher {
    fn digest_len(&self) -> usize {
        SHA1_DIGEST_LEN
    }

    fn hash(&self, data: &[u8]) -> Vec<u8> {
        Sha1::digest(data).to_vec()
    }
}

/// CRC32 (4바이트, 무결성 확인 전용)
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32Hasher;

impl ChunkHasher for Crc32Hasher {
    fn digest_len(&self) -> usize {
        4
    }

    fn hash(&self, data: &[u8]) -> Vec<u8> {
        crc32fast::hash(data).to_be_bytes().to_vec()
    }
}
