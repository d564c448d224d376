//! 블록 소스와 싱크
//!
//! - BlockSource: 송신측, 파일 내용을 고정 크기 블록으로 인덱싱 (블록 0은 미사용)
//! - BlockSink: 수신측, 블록 순서대로 페이로드를 이어붙이는 누적 버퍼

use bytes::{Bytes, BytesMut};

/// 송신 블록 소스
///
/// 파일 전체를 `Bytes`로 보관하고 블록 요청 시 슬라이스만 만든다.
/// 블록 수는 항상 `len / block_size + 1`: 마지막 블록은 `len % block_size`
/// 바이트이며 길이가 블록 크기의 배수이면 빈 블록으로 끝난다.
#[derive(Debug, Clone)]
pub struct BlockSource {
    data: Bytes,
    block_size: usize,
}

impl BlockSource {
    pub fn new(data: Bytes, block_size: usize) -> Self {
        Self { data, block_size }
    }

    /// 총 블록 수 (1부터 번호)
    pub fn block_count(&self) -> u64 {
        (self.data.len() / self.block_size) as u64 + 1
    }

    /// 블록 n의 내용 (1..=block_count), 범위 밖이면 None
    pub fn block(&self, index: u64) -> Option<Bytes> {
        if index == 0 || index > self.block_count() {
            return None;
        }
        let start = (index as usize - 1) * self.block_size;
        let end = (start + self.block_size).min(self.data.len());
        Some(self.data.slice(start..end))
    }

    /// 전체 크기 (바이트)
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

/// 수신 누적 버퍼
///
/// 추가만 가능하며 추가된 바이트가 그대로 다이제스트에 반영된다
pub struct BlockSink {
    data: BytesMut,
    hasher: crc32fast::Hasher,
    blocks: u64,
}

impl BlockSink {
    pub fn new() -> Self {
        Self {
            data: BytesMut::new(),
            hasher: crc32fast::Hasher::new(),
            blocks: 0,
        }
    }

    /// 다음 블록 추가
    pub fn append(&mut self, payload: &[u8]) {
        self.hasher.update(payload);
        self.data.extend_from_slice(payload);
        self.blocks += 1;
    }

    /// 지금까지 추가된 블록 수
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 현재까지의 CRC32 다이제스트
    pub fn digest(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// 완료된 데이터와 다이제스트 추출
    pub fn finish(self) -> (Bytes, u32) {
        (self.data.freeze(), self.hasher.finalize())
    }
}

impl Default for BlockSink {
    fn default() -> Self {
        Self::new()
    }
}
