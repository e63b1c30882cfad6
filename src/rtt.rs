//! RTT 추정 및 재전송 타임아웃 (Jacobson/Karels)
//!
//! ```text
//! estimatedRTT = (1 - α)·estimatedRTT + α·sampleRTT
//! devRTT       = (1 - β)·devRTT       + β·|sampleRTT - estimatedRTT|
//! timeout      = estimatedRTT + 4·devRTT
//! ```
//!
//! devRTT는 방금 갱신된 estimatedRTT를 기준으로 계산한다. 초기값은
//! estimatedRTT = devRTT = 0, timeout = 설정된 초기 타임아웃.
//!
//! 추정기는 공식 값을 그대로 보관한다. 송신 루프가 실제로 기다리는 시간은
//! `Config::clamp_timeout`으로 `[min_timeout_ms, max_timeout_ms]`에 묶인 값이다
//! (기본 10ms ~ 60s).

use std::time::Duration;

use crate::Config;

/// RTT 추정기 (밀리초 단위 f64)
#[derive(Debug, Clone)]
pub struct RttEstimator {
    alpha: f64,
    beta: f64,
    estimated_ms: f64,
    dev_ms: f64,
    timeout_ms: f64,
    samples: u64,
}

impl RttEstimator {
    pub fn new(initial_timeout: Duration, alpha: f64, beta: f64) -> Self {
        Self {
            alpha,
            beta,
            estimated_ms: 0.0,
            dev_ms: 0.0,
            timeout_ms: initial_timeout.as_secs_f64() * 1000.0,
            samples: 0,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.initial_timeout(), config.rtt_alpha, config.rtt_beta)
    }

    /// RTT 샘플 반영, 새 타임아웃 반환
    pub fn record_sample(&mut self, sample: Duration) -> Duration {
        self.record_sample_ms(sample.as_secs_f64() * 1000.0);
        self.timeout()
    }

    /// 밀리초 샘플 반영
    pub fn record_sample_ms(&mut self, sample_ms: f64) {
        self.estimated_ms = (1.0 - self.alpha) * self.estimated_ms + self.alpha * sample_ms;
        self.dev_ms = (1.0 - self.beta) * self.dev_ms + self.beta * (sample_ms - self.estimated_ms).abs();
        self.timeout_ms = self.estimated_ms + 4.0 * self.dev_ms;
        self.samples += 1;
    }

    pub fn estimated_rtt_ms(&self) -> f64 {
        self.estimated_ms
    }

    pub fn dev_rtt_ms(&self) -> f64 {
        self.dev_ms
    }

    pub fn timeout_ms(&self) -> f64 {
        self.timeout_ms
    }

    pub fn estimated_rtt(&self) -> Duration {
        millis_to_duration(self.estimated_ms)
    }

    pub fn timeout(&self) -> Duration {
        millis_to_duration(self.timeout_ms)
    }

    /// 반영된 샘플 수
    pub fn samples(&self) -> u64 {
        self.samples
    }
}

fn millis_to_duration(ms: f64) -> Duration {
    Duration::from_secs_f64(ms.max(0.0) / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(got: f64, expected: f64) {
        assert!(
            (got - expected).abs() < 1e-9,
            "got {}, expected {}",
            got,
            expected
        );
    }

    #[test]
    fn test_initial_state() {
        let rtt = RttEstimator::from_config(&Config::default());
        assert_eq!(rtt.samples(), 0);
        assert_close(rtt.estimated_rtt_ms(), 0.0);
        assert_eq!(rtt.timeout(), Duration::from_millis(1000));
    }

    #[test]
    fn test_ewma_hand_computed() {
        let mut rtt = RttEstimator::new(Duration::from_millis(1000), 0.125, 0.25);

        rtt.record_sample_ms(100.0);
        assert_close(rtt.estimated_rtt_ms(), 12.5);
        assert_close(rtt.dev_rtt_ms(), 21.875);
        assert_close(rtt.timeout_ms(), 100.0);

        rtt.record_sample_ms(200.0);
        assert_close(rtt.estimated_rtt_ms(), 35.9375);
        assert_close(rtt.dev_rtt_ms(), 57.421875);
        assert_close(rtt.timeout_ms(), 265.625);

        rtt.record_sample_ms(50.0);
        assert_close(rtt.estimated_rtt_ms(), 37.6953125);
        assert_close(rtt.dev_rtt_ms(), 46.142578125);
        assert_close(rtt.timeout_ms(), 222.265625);

        assert_eq!(rtt.samples(), 3);
    }

    #[test]
    fn test_constant_samples_converge() {
        let mut rtt = RttEstimator::new(Duration::from_millis(1000), 0.125, 0.25);
        for _ in 0..200 {
            rtt.record_sample_ms(40.0);
        }
        assert!((rtt.estimated_rtt_ms() - 40.0).abs() < 0.01);
        assert!(rtt.dev_rtt_ms() < 0.01);
        assert!((rtt.timeout_ms() - 40.0).abs() < 0.1);
    }

    #[test]
    fn test_record_sample_duration() {
        let mut rtt = RttEstimator::new(Duration::from_millis(1000), 0.125, 0.25);
        let timeout = rtt.record_sample(Duration::from_millis(100));
        assert!((timeout.as_secs_f64() - 0.1).abs() < 1e-6);
        assert!((rtt.estimated_rtt().as_secs_f64() - 0.0125).abs() < 1e-6);
    }
}
