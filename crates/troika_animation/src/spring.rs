//! Spring physics tweens
//!
//! A [`SpringTween`] integrates a damped harmonic oscillator in fixed 1 ms
//! semi-implicit Euler steps from the last visited time to the requested
//! time. Unlike a [`Tween`](crate::Tween) it carries simulation state, so it
//! only moves forward and cannot be composed into a
//! [`MultiTween`](crate::MultiTween).

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tween::AbstractTween;

/// Integration step in milliseconds
const STEP_MS: f64 = 1.0;

/// Below both of these the spring is at rest (units per ms², units per ms)
const REST_ACCELERATION: f64 = 1e-7;
const REST_VELOCITY: f64 = 1e-5;

/// Physical parameters of a spring
///
/// Tension and friction are expressed per second; the tween converts them
/// to its millisecond step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpringConfig {
    pub mass: f64,
    pub tension: f64,
    pub friction: f64,
}

impl SpringConfig {
    pub fn new(mass: f64, tension: f64, friction: f64) -> Self {
        Self {
            mass,
            tension,
            friction,
        }
    }

    /// A soft spring with a little overshoot
    pub fn gentle() -> Self {
        Self::new(1.0, 120.0, 14.0)
    }

    /// A bouncy spring with visible oscillation
    pub fn wobbly() -> Self {
        Self::new(1.0, 180.0, 12.0)
    }

    /// A quick spring that barely overshoots
    pub fn stiff() -> Self {
        Self::new(1.0, 210.0, 20.0)
    }

    /// A slow spring with no visible overshoot
    pub fn slow() -> Self {
        Self::new(1.0, 280.0, 60.0)
    }

    /// A heavily damped, very slow spring
    pub fn molasses() -> Self {
        Self::new(1.0, 280.0, 120.0)
    }

    /// Friction at which the spring stops oscillating
    pub fn critical_friction(&self) -> f64 {
        2.0 * (self.tension * self.mass).sqrt()
    }

    /// Whether the spring will oscillate around its target
    pub fn is_underdamped(&self) -> bool {
        self.friction < self.critical_friction()
    }
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self::new(1.0, 170.0, 26.0)
    }
}

/// A spring-driven tween of a single number
pub struct SpringTween {
    callback: Box<dyn FnMut(f64)>,
    config: SpringConfig,
    from_value: f64,
    to_value: f64,
    delay: f64,
    value: f64,
    velocity: f64,
    /// Simulated time, relative to the end of the delay
    last_time: f64,
    done: bool,
}

impl fmt::Debug for SpringTween {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpringTween")
            .field("config", &self.config)
            .field("from_value", &self.from_value)
            .field("to_value", &self.to_value)
            .field("value", &self.value)
            .field("velocity", &self.velocity)
            .field("last_time", &self.last_time)
            .field("done", &self.done)
            .finish()
    }
}

impl SpringTween {
    pub fn new<F>(from_value: f64, to_value: f64, config: SpringConfig, callback: F) -> Self
    where
        F: FnMut(f64) + 'static,
    {
        Self {
            callback: Box::new(callback),
            config,
            from_value,
            to_value,
            delay: 0.0,
            value: from_value,
            velocity: 0.0,
            last_time: 0.0,
            done: false,
        }
    }

    pub fn delay(mut self, delay: f64) -> Self {
        self.delay = delay.max(0.0);
        self
    }

    /// Starting velocity in units per millisecond
    pub fn initial_velocity(mut self, velocity: f64) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn from_value(&self) -> f64 {
        self.from_value
    }

    pub fn to_value(&self) -> f64 {
        self.to_value
    }

    pub fn config(&self) -> SpringConfig {
        self.config
    }

    pub fn is_settled(&self) -> bool {
        self.done
    }

    /// Retarget the spring, keeping its current value and velocity
    pub fn set_to_value(&mut self, to_value: f64) {
        self.to_value = to_value;
        if self.done && to_value != self.value {
            self.done = false;
        }
    }

    fn acceleration(&self) -> f64 {
        let SpringConfig {
            mass,
            tension,
            friction,
        } = self.config;
        let spring_force = -tension * 1e-6 * (self.value - self.to_value);
        let damping_force = -friction * 1e-3 * self.velocity;
        (spring_force + damping_force) / mass
    }

    fn settle(&mut self) {
        self.value = self.to_value;
        self.velocity = 0.0;
        self.done = true;
    }
}

impl AbstractTween for SpringTween {
    fn goto_elapsed_time(&mut self, time: f64) {
        if time < self.delay {
            return;
        }
        let local = time - self.delay;
        if local < self.last_time {
            tracing::trace!(
                time,
                last_time = self.last_time + self.delay,
                "spring tween cannot move backwards"
            );
            return;
        }

        while !self.done && self.last_time < local {
            let step = (local - self.last_time).min(STEP_MS);
            let acceleration = self.acceleration();
            if acceleration.abs() < REST_ACCELERATION && self.velocity.abs() < REST_VELOCITY {
                self.settle();
                break;
            }
            self.velocity += acceleration * step;
            self.value += self.velocity * step;
            self.last_time += step;
        }

        (self.callback)(self.value);
    }

    fn goto_end(&mut self) {
        self.settle();
        (self.callback)(self.value);
    }

    fn is_done_at_elapsed_time(&self, time: f64) -> bool {
        self.done && time - self.delay >= self.last_time
    }

    fn total_elapsed(&self) -> f64 {
        if self.done {
            self.delay + self.last_time
        } else {
            f64::INFINITY
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
