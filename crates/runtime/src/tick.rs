use std::time::Duration;

/// Fixed-period tick source shared by the momentum simulation and the render loop.
#[derive(Debug, Copy, Clone)]
pub struct TickClock {
    period: Duration,
}

impl TickClock {
    /// Rates below 1 Hz are clamped to 1 Hz.
    pub fn from_hz(hz: f64) -> Self {
        let hz = if hz.is_finite() { hz.max(1.0) } else { 60.0 };
        Self {
            period: Duration::from_secs_f64(1.0 / hz),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::from_hz(60.0)
    }
}
