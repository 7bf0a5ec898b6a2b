//! Turning sampled input levels into button events.
//!
//! Pure state machines fed with `(level, now)` pairs, so they are testable
//! without GPIO and reusable by any polling driver.

use std::time::{Duration, Instant};
use stove_traits::ButtonEvent;

/// Holding a button this long is a long click.
pub const LONG_PRESS: Duration = Duration::from_secs(2);
/// A level must hold this long before it is believed.
pub const DEBOUNCE: Duration = Duration::from_millis(3);

/// Accepts a level change only after it stayed put for the debounce time.
#[derive(Debug, Clone)]
pub struct Debouncer {
    stable: bool,
    candidate: bool,
    since: Instant,
    hold: Duration,
}

impl Debouncer {
    pub fn new(initial: bool, now: Instant, hold: Duration) -> Self {
        Self {
            stable: initial,
            candidate: initial,
            since: now,
            hold,
        }
    }

    /// Feed a raw level; returns the debounced level.
    pub fn update(&mut self, level: bool, now: Instant) -> bool {
        if level != self.candidate {
            self.candidate = level;
            self.since = now;
        }
        if self.candidate != self.stable && now.saturating_duration_since(self.since) >= self.hold {
            self.stable = self.candidate;
        }
        self.stable
    }
}

/// Click on release, long click while still held once `long_after` elapsed.
/// A release after a long click yields nothing.
#[derive(Debug, Clone)]
pub struct PressTracker {
    pressed_at: Option<Instant>,
    long_fired: bool,
    long_after: Duration,
}

impl Default for PressTracker {
    fn default() -> Self {
        Self::new(LONG_PRESS)
    }
}

impl PressTracker {
    pub fn new(long_after: Duration) -> Self {
        Self {
            pressed_at: None,
            long_fired: false,
            long_after,
        }
    }

    pub fn update(&mut self, pressed: bool, now: Instant) -> Option<ButtonEvent> {
        match (self.pressed_at, pressed) {
            (None, true) => {
                self.pressed_at = Some(now);
                self.long_fired = false;
                None
            }
            (Some(at), true) => {
                if !self.long_fired && now.saturating_duration_since(at) >= self.long_after {
                    self.long_fired = true;
                    Some(ButtonEvent::LongClick)
                } else {
                    None
                }
            }
            (Some(_), false) => {
                self.pressed_at = None;
                (!self.long_fired).then_some(ButtonEvent::Click)
            }
            (None, false) => None,
        }
    }
}

/// Quadrature decoder for a two-line rotary encoder.
///
/// Clockwise the lines go `[CD] -> [ D] -> [  ] -> [C ] -> [CD]`. A step is
/// counted only once both lines were seen low, so contact bounce around a
/// detent never counts.
#[derive(Debug, Clone, Default)]
pub struct RotaryDecoder {
    trend: i8,
    armed: bool,
}

impl RotaryDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the current line levels; returns +1/-1 when a step completed.
    pub fn update(&mut self, clk: bool, dt: bool) -> Option<i8> {
        let step = match (clk, dt) {
            (false, false) => {
                self.armed = true;
                return None;
            }
            (false, true) => {
                let s = (self.armed && self.trend == -1).then_some(-1);
                self.trend = 1;
                s
            }
            (true, false) => {
                let s = (self.armed && self.trend == 1).then_some(1);
                self.trend = -1;
                s
            }
            (true, true) => {
                let s = (self.armed && self.trend != 0).then_some(self.trend);
                self.trend = 0;
                s
            }
        };
        self.armed = false;
        step
    }
}
