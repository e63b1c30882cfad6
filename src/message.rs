//! ACK 백채널 메시지
//!
//! 수신자 → 송신자 방향의 유일한 메시지. 줄 단위 텍스트:
//!
//! ```text
//! SEQ <next-expected> ACK <ack-number> FLAG <flags>\n
//! ```
//!
//! `FLAG`는 부호 있는 바이트로 출력하는 구현도 있으므로 -128..=255를 받는다.

use std::fmt;

use crate::segment::flags;

/// ACK 메시지
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckMessage {
    /// 수신자의 다음 기대 시퀀스 번호
    pub seq: u32,

    /// 수락된 세그먼트의 ACK 번호
    pub ack: u32,

    /// 수락된 세그먼트의 플래그
    pub flags: u8,
}

impl AckMessage {
    pub fn new(seq: u32, ack: u32, flags: u8) -> Self {
        Self { seq, ack, flags }
    }

    /// FIN 세그먼트에 대한 ACK인지
    pub fn is_fin(&self) -> bool {
        self.flags & flags::FIN != 0
    }

    /// 개행 포함 한 줄로 직렬화
    pub fn to_line(&self) -> String {
        format!("{}\n", self)
    }

    /// 한 줄 파싱, 형식이 다르면 `None`
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace();
        let seq = field(&mut tokens, "SEQ")?.parse().ok()?;
        let ack = field(&mut tokens, "ACK")?.parse().ok()?;
        let raw_flags: i16 = field(&mut tokens, "FLAG")?.parse().ok()?;
        if tokens.next().is_some() {
            return None;
        }
        let flags = match raw_flags {
            -128..=-1 => raw_flags as i8 as u8,
            0..=255 => raw_flags as u8,
            _ => return None,
        };
        Some(Self { seq, ack, flags })
    }
}

impl fmt::Display for AckMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SEQ {} ACK {} FLAG {}", self.seq, self.ack, self.flags)
    }
}

fn field<'a>(tokens: &mut impl Iterator<Item = &'a str>, name: &str) -> Option<&'a str> {
    if tokens.next()? != name {
        return None;
    }
    tokens.next()
}
