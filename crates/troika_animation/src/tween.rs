//! Duration-based tweens
//!
//! A [`Tween`] maps elapsed time to progress through its delay, duration,
//! iterations and direction, eases the progress, and hands the
//! interpolated value to its callback. It holds no playback state, so any
//! elapsed time can be visited in any order.

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::easing::Easing;
use crate::interpolate::Interpolate;

/// Time-driven value interpolator advanced by elapsed-time queries
///
/// All times are milliseconds since the tween was started.
pub trait AbstractTween: Any {
    /// Move the tween to `time` and invoke its callback
    fn goto_elapsed_time(&mut self, time: f64);

    /// Move the tween to its final state
    fn goto_end(&mut self);

    /// Whether the tween has nothing left to do at `time`
    fn is_done_at_elapsed_time(&self, time: f64) -> bool;

    /// Total time the tween runs for, including delay
    ///
    /// Infinite for endlessly repeating tweens and unsettled springs.
    fn total_elapsed(&self) -> f64;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Marker for tweens that can be replayed at arbitrary times
///
/// Only these may be composed into a [`MultiTween`](crate::MultiTween).
pub trait ComposableTween: AbstractTween {}

/// Playback direction across iterations
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
    /// Forward on odd iterations, reverse on even ones
    Alternate,
}

/// A duration-based tween over any [`Interpolate`] value
pub struct Tween<V: Interpolate> {
    callback: Box<dyn FnMut(V)>,
    from_value: V,
    to_value: V,
    duration: f64,
    delay: f64,
    easing: Easing,
    iterations: f64,
    direction: Direction,
}

impl<V: Interpolate + fmt::Debug> fmt::Debug for Tween<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tween")
            .field("from_value", &self.from_value)
            .field("to_value", &self.to_value)
            .field("duration", &self.duration)
            .field("delay", &self.delay)
            .field("easing", &self.easing)
            .field("iterations", &self.iterations)
            .field("direction", &self.direction)
            .finish()
    }
}

impl<V: Interpolate + 'static> Tween<V> {
    /// Create a tween from `from_value` to `to_value` over `duration` ms
    pub fn new<F>(from_value: V, to_value: V, duration: f64, callback: F) -> Self
    where
        F: FnMut(V) + 'static,
    {
        Self {
            callback: Box::new(callback),
            from_value,
            to_value,
            duration: duration.max(0.0),
            delay: 0.0,
            easing: Easing::Linear,
            iterations: 1.0,
            direction: Direction::Forward,
        }
    }

    /// Delay in ms before the callback is first invoked
    pub fn delay(mut self, delay: f64) -> Self {
        self.delay = delay.max(0.0);
        self
    }

    pub fn easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    /// Number of iterations; `f64::INFINITY` repeats forever
    pub fn iterations(mut self, iterations: f64) -> Self {
        self.iterations = iterations.max(0.0);
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn from_value(&self) -> &V {
        &self.from_value
    }

    pub fn to_value(&self) -> &V {
        &self.to_value
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Eased, direction-adjusted progress at `time`, or `None` before the delay
    pub fn progress_at(&self, time: f64) -> Option<f64> {
        if time < self.delay {
            return None;
        }

        let time = time.min(self.total_elapsed()) - self.delay;
        let mut progress = if self.duration > 0.0 && time.is_finite() {
            (time % self.duration) / self.duration
        } else {
            1.0
        };
        // Landing exactly on an iteration boundary means that iteration completed
        if progress == 0.0 && time != 0.0 {
            progress = 1.0;
        }

        let mut eased = self.easing.apply(progress);
        let reversed = match self.direction {
            Direction::Forward => false,
            Direction::Reverse => true,
            Direction::Alternate => {
                self.duration > 0.0
                    && time.is_finite()
                    && ((time / self.duration).ceil() as u64) % 2 == 0
            }
        };
        if reversed {
            eased = 1.0 - eased;
        }
        Some(eased)
    }

    fn value_at_progress(&self, progress: f64) -> V {
        if progress == 0.0 {
            self.from_value.clone()
        } else if progress == 1.0 {
            self.to_value.clone()
        } else {
            self.from_value.interpolate(&self.to_value, progress)
        }
    }
}

impl<V: Interpolate + 'static> AbstractTween for Tween<V> {
    fn goto_elapsed_time(&mut self, time: f64) {
        if let Some(progress) = self.progress_at(time) {
            let value = self.value_at_progress(progress);
            (self.callback)(value);
        }
    }

    fn goto_end(&mut self) {
        let end = self.total_elapsed();
        self.goto_elapsed_time(end);
    }

    fn is_done_at_elapsed_time(&self, time: f64) -> bool {
        time > self.total_elapsed()
    }

    fn total_elapsed(&self) -> f64 {
        if self.duration == 0.0 {
            return self.delay;
        }
        self.iterations * self.duration + self.delay
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<V: Interpolate + 'static> ComposableTween for Tween<V> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorded<V: Clone + 'static>() -> (Rc<RefCell<Vec<V>>>, impl FnMut(V) + 'static) {
        let values = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&values);
        (values, move |value| sink.borrow_mut().push(value))
    }

    #[test]
    fn test_endpoints_for_every_easing() {
        for easing in Easing::ALL {
            let (values, callback) = recorded::<f64>();
            let mut tween = Tween::new(0.1, 0.7, 300.0, callback).easing(easing);
            tween.goto_elapsed_time(0.0);
            tween.goto_end();
            assert_eq!(*values.borrow(), vec![0.1, 0.7], "{easing:?}");
        }
    }

    #[test]
    fn test_callback_not_invoked_before_delay() {
        let (values, callback) = recorded::<f64>();
        let mut tween = Tween::new(0.0, 10.0, 100.0, callback).delay(50.0);
        tween.goto_elapsed_time(0.0);
        tween.goto_elapsed_time(49.9);
        assert!(values.borrow().is_empty());

        tween.goto_elapsed_time(50.0);
        tween.goto_elapsed_time(100.0);
        assert_eq!(*values.borrow(), vec![0.0, 5.0]);
    }

    #[test]
    fn test_replay_is_idempotent() {
        let (values, callback) = recorded::<f64>();
        let mut tween = Tween::new(0.0, 100.0, 1000.0, callback);
        tween.goto_elapsed_time(750.0);
        tween.goto_elapsed_time(250.0);
        tween.goto_elapsed_time(750.0);
        assert_eq!(*values.borrow(), vec![75.0, 25.0, 75.0]);
    }

    #[test]
    fn test_time_past_end_clamps() {
        let (values, callback) = recorded::<f64>();
        let mut tween = Tween::new(0.0, 100.0, 1000.0, callback);
        tween.goto_elapsed_time(5000.0);
        assert_eq!(*values.borrow(), vec![100.0]);
        assert!(tween.is_done_at_elapsed_time(5000.0));
        assert!(!tween.is_done_at_elapsed_time(1000.0));
    }

    #[test]
    fn test_reverse_and_alternate() {
        let (values, callback) = recorded::<f64>();
        let mut reverse = Tween::new(0.0, 100.0, 100.0, callback).direction(Direction::Reverse);
        reverse.goto_elapsed_time(25.0);
        assert_eq!(*values.borrow(), vec![75.0]);

        let (values, callback) = recorded::<f64>();
        let mut alternate = Tween::new(0.0, 100.0, 100.0, callback)
            .iterations(2.0)
            .direction(Direction::Alternate);
        alternate.goto_elapsed_time(25.0);
        alternate.goto_elapsed_time(125.0);
        alternate.goto_end();
        assert_eq!(*values.borrow(), vec![25.0, 75.0, 0.0]);
    }

    #[test]
    fn test_iterations_repeat() {
        let (values, callback) = recorded::<f64>();
        let mut tween = Tween::new(0.0, 100.0, 100.0, callback).iterations(3.0);
        tween.goto_elapsed_time(150.0);
        tween.goto_elapsed_time(200.0);
        assert_eq!(*values.borrow(), vec![50.0, 100.0]);
        assert_eq!(tween.total_elapsed(), 300.0);
    }

    #[test]
    fn test_infinite_iterations_never_done() {
        let (values, callback) = recorded::<f64>();
        let mut tween = Tween::new(0.0, 1.0, 10.0, callback).iterations(f64::INFINITY);
        assert!(!tween.is_done_at_elapsed_time(1e9));
        tween.goto_end();
        assert_eq!(*values.borrow(), vec![1.0]);
    }

    #[test]
    fn test_zero_duration_jumps_to_end() {
        let (values, callback) = recorded::<f64>();
        let mut tween = Tween::new(3.0, 4.0, 0.0, callback);
        tween.goto_elapsed_time(0.0);
        assert_eq!(*values.borrow(), vec![4.0]);
    }
}
