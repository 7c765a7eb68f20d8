//! Composition of tweens on a shared timeline
//!
//! A [`MultiTween`] is itself a duration tween whose value is a time on the
//! inner timeline; each frame it replays every child at that time. Children
//! keep their own delays, so staggered sequences are a matter of giving each
//! child a different delay.

use std::any::Any;

use crate::easing::Easing;
use crate::tween::{AbstractTween, ComposableTween, Direction, Tween};

pub struct MultiTween {
    inner: Tween<f64>,
    inner_duration: f64,
}

impl std::fmt::Debug for MultiTween {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiTween")
            .field("inner", &self.inner)
            .field("inner_duration", &self.inner_duration)
            .finish()
    }
}

impl MultiTween {
    /// Play `tweens` at their natural speed
    pub fn new(tweens: Vec<Box<dyn ComposableTween>>) -> Self {
        let inner_duration = timeline_length(&tweens);
        Self::with_duration(tweens, inner_duration)
    }

    /// Stretch or compress the children's timeline to `duration` ms
    pub fn with_duration(mut tweens: Vec<Box<dyn ComposableTween>>, duration: f64) -> Self {
        let inner_duration = timeline_length(&tweens);
        let inner = Tween::new(0.0, inner_duration, duration, move |time: f64| {
            for tween in tweens.iter_mut() {
                tween.goto_elapsed_time(time);
            }
        });
        Self {
            inner,
            inner_duration,
        }
    }

    pub fn delay(mut self, delay: f64) -> Self {
        self.inner = self.inner.delay(delay);
        self
    }

    /// Easing applied to the inner timeline as a whole
    pub fn easing(mut self, easing: Easing) -> Self {
        self.inner = self.inner.easing(easing);
        self
    }

    pub fn iterations(mut self, iterations: f64) -> Self {
        self.inner = self.inner.iterations(iterations);
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.inner = self.inner.direction(direction);
        self
    }

    /// Length of the children's own timeline
    pub fn inner_duration(&self) -> f64 {
        self.inner_duration
    }
}

fn timeline_length(tweens: &[Box<dyn ComposableTween>]) -> f64 {
    tweens
        .iter()
        .map(|tween| tween.total_elapsed())
        .filter(|total| {
            if total.is_finite() {
                true
            } else {
                tracing::warn!("endlessly repeating tween ignored for multi-tween length");
                false
            }
        })
        .fold(0.0, f64::max)
}

impl AbstractTween for MultiTween {
    fn goto_elapsed_time(&mut self, time: f64) {
        self.inner.goto_elapsed_time(time);
    }

    fn goto_end(&mut self) {
        self.inner.goto_end();
    }

    fn is_done_at_elapsed_time(&self, time: f64) -> bool {
        self.inner.is_done_at_elapsed_time(time)
    }

    fn total_elapsed(&self) -> f64 {
        self.inner.total_elapsed()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl ComposableTween for MultiTween {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<(&'static str, f64)>>>;

    fn child(log: &Log, name: &'static str, duration: f64, delay: f64) -> Box<dyn ComposableTween> {
        let log = Rc::clone(log);
        Box::new(
            Tween::new(0.0, 100.0, duration, move |value| log.borrow_mut().push((name, value)))
                .delay(delay),
        )
    }

    #[test]
    fn test_length_covers_longest_child() {
        let log = Log::default();
        let multi = MultiTween::new(vec![child(&log, "a", 100.0, 0.0), child(&log, "b", 100.0, 50.0)]);
        assert_eq!(multi.inner_duration(), 150.0);
        assert_eq!(multi.total_elapsed(), 150.0);
    }

    #[test]
    fn test_children_respect_their_delays() {
        let log = Log::default();
        let mut multi =
            MultiTween::new(vec![child(&log, "a", 100.0, 0.0), child(&log, "b", 100.0, 50.0)]);

        multi.goto_elapsed_time(0.0);
        assert_eq!(*log.borrow(), vec![("a", 0.0)]);

        log.borrow_mut().clear();
        multi.goto_elapsed_time(75.0);
        assert_eq!(*log.borrow(), vec![("a", 75.0), ("b", 25.0)]);

        log.borrow_mut().clear();
        multi.goto_end();
        assert_eq!(*log.borrow(), vec![("a", 100.0), ("b", 100.0)]);
    }

    #[test]
    fn test_duration_rescales_timeline() {
        let log = Log::default();
        let mut multi = MultiTween::with_duration(vec![child(&log, "a", 100.0, 0.0)], 1000.0);
        multi.goto_elapsed_time(500.0);
        assert_eq!(*log.borrow(), vec![("a", 50.0)]);
    }

    #[test]
    fn test_nested_multi_tween() {
        let log = Log::default();
        let inner: Box<dyn ComposableTween> = Box::new(MultiTween::new(vec![child(&log, "a", 100.0, 0.0)]));
        let mut outer = MultiTween::new(vec![inner]).delay(10.0);
        outer.goto_elapsed_time(5.0);
        assert!(log.borrow().is_empty());
        outer.goto_elapsed_time(60.0);
        assert_eq!(*log.borrow(), vec![("a", 50.0)]);
    }
}
