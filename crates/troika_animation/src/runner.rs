//! Tween runner
//!
//! Owns every running tween and advances them once per frame. A tween's
//! clock starts at the first tick after it was started, so its first
//! visited time is always zero.

use slotmap::{new_key_type, SlotMap};

use crate::tween::AbstractTween;

new_key_type! {
    /// Handle to a tween started on a [`Runner`]
    pub struct TweenId;
}

type DoneCallback = Box<dyn FnOnce()>;

struct RunningTween {
    tween: Box<dyn AbstractTween>,
    start_time: Option<f64>,
    on_done: Option<DoneCallback>,
}

/// Drives a set of tweens from frame timestamps
#[derive(Default)]
pub struct Runner {
    tweens: SlotMap<TweenId, RunningTween>,
    last_tick: Option<f64>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("running", &self.tweens.len())
            .field("last_tick", &self.last_tick)
            .finish()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a tween; it runs until done or stopped
    pub fn start(&mut self, tween: impl AbstractTween) -> TweenId {
        self.insert(Box::new(tween), None)
    }

    /// Start a tween and call `on_done` once it completes on its own
    pub fn start_with_done<F>(&mut self, tween: impl AbstractTween, on_done: F) -> TweenId
    where
        F: FnOnce() + 'static,
    {
        self.insert(Box::new(tween), Some(Box::new(on_done)))
    }

    fn insert(&mut self, tween: Box<dyn AbstractTween>, on_done: Option<DoneCallback>) -> TweenId {
        let id = self.tweens.insert(RunningTween {
            tween,
            start_time: None,
            on_done,
        });
        tracing::trace!(?id, running = self.tweens.len(), "tween started");
        id
    }

    /// Stop a tween where it is, without running its done callback
    pub fn stop(&mut self, id: TweenId) -> bool {
        self.tweens.remove(id).is_some()
    }

    /// Jump a tween to its end state and remove it, running its done callback
    pub fn finish(&mut self, id: TweenId) -> bool {
        let Some(mut running) = self.tweens.remove(id) else {
            return false;
        };
        running.tween.goto_end();
        if let Some(on_done) = running.on_done.take() {
            on_done();
        }
        true
    }

    pub fn stop_all(&mut self) {
        self.tweens.clear();
    }

    pub fn is_running(&self, id: TweenId) -> bool {
        self.tweens.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tweens.len()
    }

    pub fn is_idle(&self) -> bool {
        self.tweens.is_empty()
    }

    /// Access a running tween by its concrete type
    pub fn get_mut<T: AbstractTween>(&mut self, id: TweenId) -> Option<&mut T> {
        self.tweens
            .get_mut(id)
            .and_then(|running| running.tween.as_any_mut().downcast_mut::<T>())
    }

    /// Advance every tween to `now` (ms); returns whether any remain
    pub fn tick(&mut self, now: f64) -> bool {
        self.last_tick = Some(now);

        let mut finished = Vec::new();
        for (id, running) in self.tweens.iter_mut() {
            let start = *running.start_time.get_or_insert(now);
            let elapsed = now - start;
            running.tween.goto_elapsed_time(elapsed);
            if running.tween.is_done_at_elapsed_time(elapsed) {
                finished.push(id);
            }
        }

        for id in finished {
            if let Some(running) = self.tweens.remove(id) {
                tracing::trace!(?id, "tween finished");
                if let Some(on_done) = running.on_done {
                    on_done();
                }
            }
        }

        !self.tweens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spring::{SpringConfig, SpringTween};
    use crate::tween::Tween;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[test]
    fn test_clock_starts_at_first_tick() {
        let values = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&values);
        let mut runner = Runner::new();
        runner.start(Tween::new(0.0, 100.0, 100.0, move |v| sink.borrow_mut().push(v)));

        runner.tick(5000.0);
        runner.tick(5050.0);
        assert_eq!(*values.borrow(), vec![0.0, 50.0]);
    }

    #[test]
    fn test_done_tweens_are_removed() {
        let done = Rc::new(Cell::new(false));
        let flag = Rc::clone(&done);
        let mut runner = Runner::new();
        let id = runner.start_with_done(Tween::new(0.0, 1.0, 100.0, |_| {}), move || flag.set(true));

        assert!(runner.tick(0.0));
        assert!(runner.tick(100.0));
        assert!(runner.is_running(id));
        assert!(!runner.tick(116.0));
        assert!(!runner.is_running(id));
        assert!(done.get());
        assert!(runner.is_idle());
    }

    #[test]
    fn test_stop_skips_done_callback() {
        let done = Rc::new(Cell::new(false));
        let flag = Rc::clone(&done);
        let mut runner = Runner::new();
        let id = runner.start_with_done(Tween::new(0.0, 1.0, 100.0, |_| {}), move || flag.set(true));
        assert!(runner.stop(id));
        assert!(!runner.stop(id));
        assert!(!done.get());
    }

    #[test]
    fn test_finish_jumps_to_end() {
        let last = Rc::new(Cell::new(0.0));
        let sink = Rc::clone(&last);
        let mut runner = Runner::new();
        let id = runner.start(Tween::new(0.0, 7.0, 100.0, move |v| sink.set(v)));
        runner.tick(0.0);
        assert!(runner.finish(id));
        assert_eq!(last.get(), 7.0);
        assert!(runner.is_idle());
    }

    #[test]
    fn test_get_mut_retargets_spring() {
        let mut runner = Runner::new();
        let id = runner.start(SpringTween::new(0.0, 10.0, SpringConfig::default(), |_| {}));
        runner.tick(0.0);
        runner.tick(100.0);

        let spring = runner.get_mut::<SpringTween>(id).unwrap();
        spring.set_to_value(20.0);
        assert_eq!(spring.to_value(), 20.0);
        assert!(runner.get_mut::<Tween<f64>>(id).is_none());
    }
}
