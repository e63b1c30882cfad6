//! 시퀀스 번호 공간
//!
//! 시퀀스/ACK 번호는 `2 × window` 범위에서 순환한다. 범위가 작아서
//! 몇 세그먼트 만에 wrap-around가 일어난다.

/// 모듈러 시퀀스 공간
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceSpace {
    range: u32,
}

impl SequenceSpace {
    /// 윈도우 크기로부터 생성 (range = 2 × window)
    ///
    /// window 0은 range 2로 취급.
    pub fn for_window(window: usize) -> Self {
        let range = (window.max(1) as u64 * 2).min(u32::MAX as u64) as u32;
        Self { range }
    }

    /// 헤더에 광고된 윈도우로부터 생성, 0이면 `None`
    pub fn from_advertised(window: u16) -> Option<Self> {
        if window == 0 {
            return None;
        }
        Some(Self {
            range: window as u32 * 2,
        })
    }

    pub fn range(&self) -> u32 {
        self.range
    }

    /// 파일 내 위치 → 시퀀스 번호
    pub fn wrap(&self, position: usize) -> u32 {
        (position as u64 % self.range as u64) as u32
    }

    /// 다음 시퀀스 번호
    pub fn next(&self, seq: u32) -> u32 {
        ((seq as u64 + 1) % self.range as u64) as u32
    }
}
