//! Troika Animation System
//!
//! Time-driven value interpolation, decoupled from any renderer:
//!
//! - [`Tween`]: duration, delay, easing, iterations and direction; replayable
//!   at any elapsed time
//! - [`SpringTween`]: damped spring integrated in fixed 1 ms steps; forward only
//! - [`MultiTween`]: composition of replayable tweens on one timeline
//! - [`Runner`]: advances running tweens once per frame
//!
//! # Example
//!
//! ```rust
//! use troika_animation::{Easing, Runner, Tween};
//!
//! let mut runner = Runner::new();
//! runner.start(Tween::new(0.0, 1.0, 300.0, |opacity| println!("{opacity}")).easing(Easing::EaseOutCubic));
//! runner.tick(0.0);
//! runner.tick(16.0);
//! ```

pub mod easing;
pub mod interpolate;
pub mod multi_tween;
pub mod runner;
pub mod spring;
pub mod tween;

pub use easing::Easing;
pub use interpolate::{Color, Interpolate};
pub use multi_tween::MultiTween;
pub use runner::{Runner, TweenId};
pub use spring::{SpringConfig, SpringTween};
pub use tween::{AbstractTween, ComposableTween, Direction, Tween};
