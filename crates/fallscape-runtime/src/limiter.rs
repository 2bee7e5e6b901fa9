use std::time::{Duration, Instant};

use crate::config::AnimationConfig;

/// Decides which redraw ticks run a frame. Skipped ticks must not touch the
/// scene.
#[derive(Debug, Clone)]
pub struct FrameLimiter {
    interval: Option<Duration>,
    last: Option<Instant>,
}

impl FrameLimiter {
    /// `None` runs every tick.
    pub fn new(interval: Option<Duration>) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Unlimited when the target rate has no representable interval.
    pub fn from_config(config: &AnimationConfig) -> Self {
        let interval = if config.limit_fps {
            Self::interval_for(config.target_fps)
        } else {
            None
        };
        Self::new(interval)
    }

    /// Time between frames at `target_fps`, `None` for rates that are not
    /// positive and finite or whose interval overflows a `Duration`.
    pub fn interval_for(target_fps: f32) -> Option<Duration> {
        if !(target_fps.is_finite() && target_fps > 0.0) {
            return None;
        }
        Duration::try_from_secs_f64(1.0 / f64::from(target_fps)).ok()
    }

    pub fn is_limited(&self) -> bool {
        self.interval.is_some()
    }

    /// True when a frame may run at `now`.
    pub fn due(&self, now: Instant) -> bool {
        match (self.interval, self.last) {
            (Some(interval), Some(last)) => now.saturating_duration_since(last) >= interval,
            _ => true,
        }
    }

    /// Marks a frame as actually drawn at `now`.
    pub fn record(&mut self, now: Instant) {
        self.last = Some(now);
    }

    /// When the next frame is due, if limited and a frame has run.
    pub fn next_deadline(&self) -> Option<Instant> {
        Some(self.last? + self.interval?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(limiter: &mut FrameLimiter, now: Instant) -> bool {
        let due = limiter.due(now);
        if due {
            limiter.record(now);
        }
        due
    }

    #[test]
    fn limited_runs_first_skips_inside_interval_then_runs() {
        let mut limiter = FrameLimiter::new(Some(Duration::from_millis(16)));
        let t0 = Instant::now();

        assert!(tick(&mut limiter, t0));
        assert!(!tick(&mut limiter, t0 + Duration::from_millis(5)));
        assert!(!tick(&mut limiter, t0 + Duration::from_millis(15)));
        assert_eq!(limiter.next_deadline(), Some(t0 + Duration::from_millis(16)));
        assert!(tick(&mut limiter, t0 + Duration::from_millis(16)));
        assert!(!tick(&mut limiter, t0 + Duration::from_millis(20)));
        assert!(tick(&mut limiter, t0 + Duration::from_millis(40)));
    }

    #[test]
    fn frames_that_were_not_drawn_do_not_delay_the_next() {
        let mut limiter = FrameLimiter::new(Some(Duration::from_millis(16)));
        let t0 = Instant::now();

        // due but never recorded, e.g. the surface was lost
        assert!(limiter.due(t0));
        assert_eq!(limiter.next_deadline(), None);
        assert!(limiter.due(t0 + Duration::from_millis(1)));

        limiter.record(t0 + Duration::from_millis(1));
        assert!(!limiter.due(t0 + Duration::from_millis(2)));
        assert!(limiter.due(t0 + Duration::from_millis(17)));
    }

    #[test]
    fn disabled_limiter_always_runs() {
        let mut limiter = FrameLimiter::from_config(&AnimationConfig::default());
        assert!(!limiter.is_limited());
        let t0 = Instant::now();
        for _ in 0..3 {
            assert!(tick(&mut limiter, t0));
        }
        assert_eq!(limiter.next_deadline(), None);
    }

    #[test]
    fn interval_follows_target_fps() {
        let limiter = FrameLimiter::from_config(&AnimationConfig {
            limit_fps: true,
            target_fps: 50.0,
        });
        assert_eq!(limiter.interval, Some(Duration::from_millis(20)));
        assert_eq!(limiter.next_deadline(), None);
    }

    #[test]
    fn unrepresentable_rates_have_no_interval() {
        assert_eq!(FrameLimiter::interval_for(0.0), None);
        assert_eq!(FrameLimiter::interval_for(-30.0), None);
        assert_eq!(FrameLimiter::interval_for(f32::NAN), None);
        assert_eq!(FrameLimiter::interval_for(f32::INFINITY), None);
        assert_eq!(FrameLimiter::interval_for(1e-30), None);

        let limiter = FrameLimiter::from_config(&AnimationConfig {
            limit_fps: true,
            target_fps: 1e-30,
        });
        assert!(!limiter.is_limited());
    }
}
