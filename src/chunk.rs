//! 파일 분할
//!
//! 파일 바이트를 최대 페이로드 크기의 청크로 자른다. 마지막 청크는
//! 나머지만 담고, 길이가 정확히 나누어떨어지면 빈 꼬리 청크를 붙이지 않는다.

use bytes::Bytes;

use crate::MAX_PAYLOAD;

/// 청크 분할기 (송신측)
#[derive(Debug, Clone)]
pub struct ChunkSplitter {
    max_payload: usize,
}

impl Default for ChunkSplitter {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD)
    }
}

impl ChunkSplitter {
    /// `max_payload`가 0이면 1로 취급 (설정 검증에서 먼저 걸러짐)
    pub fn new(max_payload: usize) -> Self {
        debug_assert!(max_payload > 0, "max_payload must be positive");
        Self {
            max_payload: max_payload.max(1),
        }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// 분할될 청크 수
    pub fn chunk_count(&self, len: usize) -> usize {
        if len == 0 {
            1
        } else {
            (len + self.max_payload - 1) / self.max_payload
        }
    }

    /// 데이터를 순서대로 청크 분할
    ///
    /// 빈 입력은 빈 청크 하나 (FIN 세그먼트용).
    pub fn split(&self, data: &Bytes) -> Vec<Bytes> {
        if data.is_empty() {
            return vec![Bytes::new()];
        }

        let mut chunks = Vec::with_capacity(self.chunk_count(data.len()));
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + self.max_payload).min(data.len());
            chunks.push(data.slice(offset..end));
            offset = end;
        }
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_with_remainder() {
        let data: Bytes = (0..(556 * 3 + 10)).map(|i| (i % 251) as u8).collect::<Vec<u8>>().into();
        let chunks = ChunkSplitter::default().split(&data);

        assert_eq!(chunks.len(), 4);
        assert!(chunks[..3].iter().all(|c| c.len() == 556));
        assert_eq!(chunks[3].len(), 10);

        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(joined, data.as_ref());
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        let splitter = ChunkSplitter::new(100);
        let data = Bytes::from(vec![7u8; 300]);
        let chunks = splitter.split(&data);

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() == 100));
        assert_eq!(splitter.chunk_count(300), 3);
    }

    #[test]
    fn test_small_and_empty_input() {
        let splitter = ChunkSplitter::new(100);
        let chunks = splitter.split(&Bytes::from_static(b"tiny"));
        assert_eq!(chunks, vec![Bytes::from_static(b"tiny")]);

        let chunks = splitter.split(&Bytes::new());
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_empty());
        assert_eq!(splitter.chunk_count(0), 1);
    }

    #[test]
    fn test_split_is_restartable() {
        let splitter = ChunkSplitter::new(3);
        let data = Bytes::from_static(b"abcdefgh");
        assert_eq!(splitter.split(&data), splitter.split(&data));
    }
}
