//! 세그먼트 와이어 포맷
//!
//! 모든 멀티바이트 필드는 big-endian.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |          Source Port          |       Destination Port        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Marker 0x50  |     Flags     |          Window Size          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           Checksum            |        Urgent Pointer (0)     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload (<= 556)                       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! 체크섬은 페이로드를 덮지 않는다. 전체 길이, 포트 두 개, 윈도우, urgent
//! 포인터의 16비트 wrapping 합의 1의 보수이며, 수신측은 이를 거꾸로 풀어
//! 패딩된 버퍼에서 실제 세그먼트 길이를 복원한다.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::{DATA_OFFSET_MARKER, HEADER_SIZE, MAX_PAYLOAD};

/// 플래그 비트
pub mod flags {
    /// 마지막 세그먼트
    pub const FIN: u8 = 0x01;
    /// 모든 데이터 세그먼트에 설정
    pub const ACK: u8 = 0x10;
    /// 마지막 데이터 세그먼트 (0x11)
    pub const ACK_FIN: u8 = ACK | FIN;
}

// 필드 오프셋 (와이어 포맷의 유일한 기준)
const OFF_SOURCE_PORT: usize = 0;
const OFF_DEST_PORT: usize = 2;
const OFF_SEQ: usize = 4;
const OFF_ACK: usize = 8;
const OFF_DATA_OFFSET: usize = 12;
const OFF_FLAGS: usize = 13;
const OFF_WINDOW: usize = 14;
const OFF_CHECKSUM: usize = 16;
const OFF_URGENT: usize = 18;

/// 세그먼트 파싱 에러
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentError {
    #[error("헤더보다 짧은 버퍼: {len} bytes")]
    TooShort { len: usize },

    #[error("복원된 길이가 유효하지 않음")]
    InvalidLength,

    #[error("체크섬 불일치")]
    ChecksumMismatch,
}

/// 고정 20바이트 헤더
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub source_port: u16,
    pub dest_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: u8,
    pub window: u16,
    /// 인코딩 시 그대로 기록됨, [`Segment::to_bytes`]가 다시 계산
    pub checksum: u16,
    pub urgent: u16,
}

impl SegmentHeader {
    /// 체크섬/urgent가 0인 헤더 생성
    pub fn new(source_port: u16, dest_port: u16, seq: u32, ack: u32, flags: u8, window: u16) -> Self {
        Self {
            source_port,
            dest_port,
            seq,
            ack,
            flags,
            window,
            checksum: 0,
            urgent: 0,
        }
    }

    /// FIN 여부
    pub fn is_fin(&self) -> bool {
        self.flags & flags::FIN != 0
    }

    /// 헤더를 20바이트로 직렬화
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[OFF_SOURCE_PORT..OFF_SOURCE_PORT + 2].copy_from_slice(&self.source_port.to_be_bytes());
        buf[OFF_DEST_PORT..OFF_DEST_PORT + 2].copy_from_slice(&self.dest_port.to_be_bytes());
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.seq.to_be_bytes());
        buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&self.ack.to_be_bytes());
        buf[OFF_DATA_OFFSET] = DATA_OFFSET_MARKER;
        buf[OFF_FLAGS] = self.flags;
        buf[OFF_WINDOW..OFF_WINDOW + 2].copy_from_slice(&self.window.to_be_bytes());
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&self.checksum.to_be_bytes());
        buf[OFF_URGENT..OFF_URGENT + 2].copy_from_slice(&self.urgent.to_be_bytes());
        buf
    }

    /// 버퍼 앞 20바이트에서 헤더 역직렬화
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            source_port: read_u16(buf, OFF_SOURCE_PORT)?,
            dest_port: read_u16(buf, OFF_DEST_PORT)?,
            seq: read_u32(buf, OFF_SEQ)?,
            ack: read_u32(buf, OFF_ACK)?,
            flags: buf[OFF_FLAGS],
            window: read_u16(buf, OFF_WINDOW)?,
            checksum: read_u16(buf, OFF_CHECKSUM)?,
            urgent: read_u16(buf, OFF_URGENT)?,
        })
    }
}

/// 헤더 + 페이로드
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub header: SegmentHeader,
    pub payload: Bytes,
}

impl Segment {
    pub fn new(header: SegmentHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// 전체 세그먼트 길이
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// 체크섬을 찍은 와이어 바이트 생성
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        buf.put_slice(&self.header.encode());
        buf.put_slice(&self.payload);
        stamp_checksum(&mut buf);
        buf.freeze()
    }

    /// 수신 버퍼 파싱 (뒤쪽 0 패딩 허용)
    ///
    /// 길이 복원 → 헤더 디코드 → 체크섬 검증 순서.
    pub fn parse(buf: &[u8]) -> Result<Self, SegmentError> {
        if buf.len() < HEADER_SIZE {
            return Err(SegmentError::TooShort { len: buf.len() });
        }
        let payload_len = recover_payload_len(buf).ok_or(SegmentError::InvalidLength)?;
        let segment = &buf[..HEADER_SIZE + payload_len];
        let header = SegmentHeader::decode(segment).ok_or(SegmentError::TooShort { len: buf.len() })?;

        if !verify_checksum(segment) {
            return Err(SegmentError::ChecksumMismatch);
        }

        Ok(Self {
            header,
            payload: Bytes::copy_from_slice(&segment[HEADER_SIZE..]),
        })
    }
}

/// 체크섬이 0으로 비어 있는 헤더 생성
pub fn encode_header(
    source_port: u16,
    dest_port: u16,
    seq: u32,
    ack: u32,
    flags: u8,
    window: u16,
) -> [u8; HEADER_SIZE] {
    SegmentHeader::new(source_port, dest_port, seq, ack, flags, window).encode()
}

/// 체크섬 대상 합계 (16비트 wrapping)
///
/// 길이는 16비트로 잘린 값이 더해진다.
fn checksum_sum(total_len: usize, source_port: u16, dest_port: u16, window: u16, urgent: u16) -> u16 {
    (total_len as u16)
        .wrapping_add(source_port)
        .wrapping_add(dest_port)
        .wrapping_add(window)
        .wrapping_add(urgent)
}

/// 세그먼트 바이트에 대한 체크섬 계산 (헤더 필드 + 전체 길이)
pub fn compute_checksum(segment: &[u8]) -> Option<u16> {
    let sum = checksum_sum(
        segment.len(),
        extract_source_port(segment)?,
        extract_dest_port(segment)?,
        extract_window_size(segment)?,
        extract_urgent_pointer(segment)?,
    );
    Some(!sum)
}

/// 체크섬을 계산해 [16:18)에 기록
pub fn stamp_checksum(segment: &mut [u8]) {
    if let Some(checksum) = compute_checksum(segment) {
        segment[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&checksum.to_be_bytes());
    }
}

/// 실제 수신 길이 기준으로 체크섬 검증
pub fn verify_checksum(segment: &[u8]) -> bool {
    match (compute_checksum(segment), extract_checksum(segment)) {
        (Some(expected), Some(got)) => expected == got,
        _ => false,
    }
}

/// 체크섬에서 페이로드 길이 복원
///
/// `!checksum - (src + dst + window + urgent + 20)`. 음수(16비트 부호 기준),
/// 최대 페이로드 초과, 버퍼보다 긴 값은 `None`.
pub fn recover_payload_len(buf: &[u8]) -> Option<usize> {
    let fields = extract_source_port(buf)?
        .wrapping_add(extract_dest_port(buf)?)
        .wrapping_add(extract_window_size(buf)?)
        .wrapping_add(extract_urgent_pointer(buf)?)
        .wrapping_add(HEADER_SIZE as u16);
    let recovered = (!extract_checksum(buf)?).wrapping_sub(fields) as i16;

    if recovered < 0 {
        return None;
    }
    let payload_len = recovered as usize;
    if payload_len > MAX_PAYLOAD || HEADER_SIZE + payload_len > buf.len() {
        return None;
    }
    Some(payload_len)
}

pub fn extract_source_port(buf: &[u8]) -> Option<u16> {
    read_u16(buf, OFF_SOURCE_PORT)
}

pub fn extract_dest_port(buf: &[u8]) -> Option<u16> {
    read_u16(buf, OFF_DEST_PORT)
}

pub fn extract_sequence_number(buf: &[u8]) -> Option<u32> {
    read_u32(buf, OFF_SEQ)
}

pub fn extract_ack_number(buf: &[u8]) -> Option<u32> {
    read_u32(buf, OFF_ACK)
}

pub fn extract_flags(buf: &[u8]) -> Option<u8> {
    buf.get(OFF_FLAGS).copied()
}

pub fn extract_window_size(buf: &[u8]) -> Option<u16> {
    read_u16(buf, OFF_WINDOW)
}

pub fn extract_checksum(buf: &[u8]) -> Option<u16> {
    read_u16(buf, OFF_CHECKSUM)
}

pub fn extract_urgent_pointer(buf: &[u8]) -> Option<u16> {
    read_u16(buf, OFF_URGENT)
}

fn read_u16(buf: &[u8], offset: usize) -> Option<u16> {
    let bytes = buf.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
