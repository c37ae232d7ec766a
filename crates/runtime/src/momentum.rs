use std::time::{Duration, Instant};

use foundation::FrameIndex;
use serde::{Deserialize, Serialize};

use crate::position::PositionCell;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumConfig {
    /// Vertical pointer travel that maps to one frame.
    pub pixels_per_frame: f64,
    /// Per-tick velocity multiplier while coasting, in (0, 1).
    pub friction: f64,
    /// Release speed (frames/tick) needed to start coasting.
    pub min_release_velocity: f64,
    /// Coasting stops below this speed (frames/tick).
    pub stop_epsilon: f64,
    /// Weight of the newest pointer sample in the velocity average.
    pub velocity_smoothing: f64,
    /// A release after the pointer rested this long carries no velocity.
    pub release_idle_ms: u64,
    pub min_opacity: f32,
    pub decay_rate: f32,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            pixels_per_frame: 4.0,
            friction: 0.95,
            min_release_velocity: 0.5,
            stop_epsilon: 0.05,
            velocity_smoothing: 0.3,
            release_idle_ms: 100,
            min_opacity: 0.15,
            decay_rate: 0.35,
        }
    }
}

impl MomentumConfig {
    pub fn opacity(&self, distance: u32) -> f32 {
        frame_opacity(distance, self.decay_rate, self.min_opacity)
    }
}

/// `max(min_opacity, e^(-decay_rate * distance))`.
pub fn frame_opacity(distance: u32, decay_rate: f32, min_opacity: f32) -> f32 {
    (-decay_rate * distance as f32).exp().max(min_opacity)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MomentumPhase {
    Idle,
    Dragging,
    Coasting,
}

#[derive(Debug, Copy, Clone, PartialEq)]
struct DragState {
    start_y: f64,
    start_frame: FrameIndex,
    last_y: f64,
    last_at: Instant,
}

#[derive(Debug, Copy, Clone, PartialEq)]
enum Phase {
    Idle,
    Dragging(DragState),
    Coasting { position: f64 },
}

/// Turns vertical pointer drags into position writes, with inertia after release.
///
/// Velocity is tracked in frames per animation tick so coasting can apply
/// friction once per tick without caring about wall-clock time.
#[derive(Debug, Clone)]
pub struct DragMomentumController {
    config: MomentumConfig,
    tick_period: Duration,
    phase: Phase,
    velocity: f64,
}

impl DragMomentumController {
    pub fn new(config: MomentumConfig, tick_period: Duration) -> Self {
        Self {
            config,
            tick_period,
            phase: Phase::Idle,
            velocity: 0.0,
        }
    }

    pub fn config(&self) -> &MomentumConfig {
        &self.config
    }

    pub fn phase(&self) -> MomentumPhase {
        match self.phase {
            Phase::Idle => MomentumPhase::Idle,
            Phase::Dragging(_) => MomentumPhase::Dragging,
            Phase::Coasting { .. } => MomentumPhase::Coasting,
        }
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn is_coasting(&self) -> bool {
        matches!(self.phase, Phase::Coasting { .. })
    }

    pub fn drag_start(&mut self, y: f64, at: Instant, cell: &PositionCell) {
        self.phase = Phase::Dragging(DragState {
            start_y: y,
            start_frame: cell.get(),
            last_y: y,
            last_at: at,
        });
        self.velocity = 0.0;
    }

    /// Moves the position by the total drag distance. Ignored outside a drag.
    pub fn drag_move(&mut self, y: f64, at: Instant, cell: &PositionCell) -> FrameIndex {
        let Phase::Dragging(mut drag) = self.phase else {
            return cell.get();
        };

        let frame_delta = ((drag.start_y - y) / self.config.pixels_per_frame).round() as i64;
        let written = cell.set(i64::from(drag.start_frame).saturating_add(frame_delta));

        let dt = at.saturating_duration_since(drag.last_at).as_secs_f64();
        if dt > 0.0 {
            let frames = (drag.last_y - y) / self.config.pixels_per_frame;
            let per_tick = frames / dt * self.tick_period.as_secs_f64();
            let alpha = self.config.velocity_smoothing.clamp(0.0, 1.0);
            self.velocity = alpha * per_tick + (1.0 - alpha) * self.velocity;
        }

        drag.last_y = y;
        drag.last_at = at;
        self.phase = Phase::Dragging(drag);
        written
    }

    /// Ends the drag. Returns `true` if the release was fast enough to coast.
    pub fn drag_end(&mut self, at: Instant, cell: &PositionCell) -> bool {
        let Phase::Dragging(drag) = self.phase else {
            return false;
        };

        let rested = at.saturating_duration_since(drag.last_at);
        let velocity = if rested > Duration::from_millis(self.config.release_idle_ms) {
            0.0
        } else {
            self.velocity
        };
        self.phase = Phase::Idle;
        self.velocity = 0.0;
        self.fling(velocity, cell)
    }

    /// Starts coasting from the current position with `velocity` frames/tick.
    pub fn fling(&mut self, velocity: f64, cell: &PositionCell) -> bool {
        if !velocity.is_finite() || velocity.abs() <= self.config.min_release_velocity {
            return false;
        }
        self.phase = Phase::Coasting {
            position: f64::from(cell.get()),
        };
        self.velocity = velocity;
        true
    }

    /// Stops coasting. Dragging is left alone.
    pub fn cancel(&mut self) {
        if self.is_coasting() {
            self.phase = Phase::Idle;
            self.velocity = 0.0;
        }
    }

    /// Advances the inertial simulation by one tick. Returns `true` while still coasting.
    pub fn tick(&mut self, cell: &PositionCell) -> bool {
        let Phase::Coasting { position } = self.phase else {
            return false;
        };

        self.velocity *= self.config.friction;
        let last = f64::from(cell.last_frame());
        let position = (position + self.velocity).clamp(0.0, last);
        cell.set(position.round() as i64);

        let at_edge = position <= 0.0 || position >= last;
        if self.velocity.abs() < self.config.stop_epsilon || at_edge {
            self.phase = Phase::Idle;
            self.velocity = 0.0;
            return false;
        }

        self.phase = Phase::Coasting { position };
        true
    }
}
