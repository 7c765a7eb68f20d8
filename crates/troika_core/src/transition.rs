//! Property transitions
//!
//! A descriptor may declare a transition for a numeric property. When that
//! property changes on an existing facade, the reconciler does not assign
//! it; instead it files a [`TransitionRequest`] and [`Transitions`] starts a
//! tween from the current value to the new one. Tween output is queued as
//! [`AnimatedWrite`]s and applied at the start of the next frame.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use troika_animation::{Easing, Runner, SpringConfig, SpringTween, Tween, TweenId};

use crate::tree::FacadeId;

/// How a property animates to a new value
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionSpec {
    Duration {
        duration: f64,
        #[serde(default)]
        delay: f64,
        #[serde(default)]
        easing: Easing,
    },
    Spring(SpringConfig),
}

impl TransitionSpec {
    pub fn duration(duration: f64) -> Self {
        TransitionSpec::Duration {
            duration,
            delay: 0.0,
            easing: Easing::Linear,
        }
    }

    pub fn spring(config: SpringConfig) -> Self {
        TransitionSpec::Spring(config)
    }
}

/// A transitioned property changed during reconciliation
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionRequest {
    pub id: FacadeId,
    pub property: String,
    pub from: f64,
    pub to: f64,
    pub spec: TransitionSpec,
}

/// One frame's output of a running transition
#[derive(Clone, Debug, PartialEq)]
pub struct AnimatedWrite {
    pub id: FacadeId,
    pub property: String,
    pub value: f64,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct WriteQueue(Rc<RefCell<Vec<AnimatedWrite>>>);

impl WriteQueue {
    fn push(&self, write: AnimatedWrite) {
        self.0.borrow_mut().push(write);
    }

    pub(crate) fn drain(&self) -> Vec<AnimatedWrite> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

struct ActiveTransition {
    tween: TweenId,
    to: f64,
    spring: bool,
}

/// Running property transitions, keyed by facade and property
#[derive(Default)]
pub struct Transitions {
    active: FxHashMap<(FacadeId, String), ActiveTransition>,
    writes: WriteQueue,
}

impl std::fmt::Debug for Transitions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transitions")
            .field("active", &self.active.len())
            .finish()
    }
}

impl Transitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn is_animating(&self, id: FacadeId, property: &str) -> bool {
        self.active.contains_key(&(id, property.to_string()))
    }

    /// Start, retarget or ignore a transition
    pub fn request(&mut self, runner: &mut Runner, request: TransitionRequest) {
        let key = (request.id, request.property.clone());

        if let Some(active) = self.active.get_mut(&key) {
            if runner.is_running(active.tween) {
                if active.to == request.to {
                    return;
                }
                if active.spring {
                    if let Some(spring) = runner.get_mut::<SpringTween>(active.tween) {
                        spring.set_to_value(request.to);
                        active.to = request.to;
                        return;
                    }
                }
                runner.stop(active.tween);
            }
        }

        let writes = self.writes.clone();
        let id = request.id;
        let property = request.property.clone();
        let emit = move |value: f64| {
            writes.push(AnimatedWrite {
                id,
                property: property.clone(),
                value,
            })
        };

        let (tween, spring) = match request.spec {
            TransitionSpec::Duration {
                duration,
                delay,
                easing,
            } => (
                runner.start(
                    Tween::new(request.from, request.to, duration, emit)
                        .delay(delay)
                        .easing(easing),
                ),
                false,
            ),
            TransitionSpec::Spring(config) => (
                runner.start(SpringTween::new(request.from, request.to, config, emit)),
                true,
            ),
        };
        tracing::trace!(?id, property = %request.property, to = request.to, "transition started");
        self.active.insert(
            key,
            ActiveTransition {
                tween,
                to: request.to,
                spring,
            },
        );
    }

    /// Stop every transition of a destroyed facade
    pub fn forget(&mut self, runner: &mut Runner, id: FacadeId) {
        self.active.retain(|(facade, _), active| {
            if *facade == id {
                runner.stop(active.tween);
                false
            } else {
                true
            }
        });
    }

    /// Drop bookkeeping for finished tweens
    pub fn sweep(&mut self, runner: &Runner) {
        self.active.retain(|_, active| runner.is_running(active.tween));
    }

    pub fn drain_writes(&self) -> Vec<AnimatedWrite> {
        self.writes.drain()
    }
}
