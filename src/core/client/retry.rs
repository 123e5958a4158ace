use std::time::Duration;

#[derive(Clone, Debug)]
pub enum Backoff {
    Fixed(Duration),
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

impl Backoff {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed(d) => *d,
            Backoff::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let scaled = base.as_secs_f64() * factor.powi(attempt as i32);
                let capped = scaled.min(max.as_secs_f64());
                let capped = if *jitter {
                    let j = 0.5 + fastrand_like(attempt) * 0.5;
                    capped * j
                } else {
                    capped
                };
                Duration::from_secs_f64(capped.max(0.0))
            }
        }
    }
}

/// Deterministic stand-in for a jitter source: varies with the attempt
/// number without pulling in a dedicated RNG dependency for one call site.
fn fastrand_like(attempt: u32) -> f64 {
    let x = (attempt.wrapping_mul(2654435761)) % 1000;
    f64::from(x) / 1000.0
}

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_retries: u32,
    pub backoff: Backoff,
    pub retry_on_status: Vec<u16>,
    pub retry_on_timeout: bool,
    pub retry_on_connect: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            backoff: Backoff::Exponential {
                base: Duration::from_millis(200),
                factor: 2.0,
                max: Duration::from_secs(3),
                jitter: true,
            },
            retry_on_status: vec![408, 429, 500, 502, 503, 504],
            retry_on_timeout: true,
            retry_on_connect: true,
        }
    }
}
