//! Look-ahead S-curve motion planning core for 3D printer hosts.
//!
//! The pipeline mirrors the shape of a printer host: geometric moves are
//! queued with [`MoveQueue::add_move`], planned into velocity trapezoids by
//! [`MoveQueue::plan`], popped as [`TrapAccelDecel`] descriptors and
//! materialised onto the [`TrapQueue`] timeline, where kinematic filters
//! (input shaping, axis smoothing, pressure advance) compute per-stepper
//! positions at arbitrary times.
//!
//! ```no_run
//! use swerve::{MoveQueue, MoveLimits, TrapQueue, Coord};
//!
//! let limits = MoveLimits::default();
//! let mut mq = MoveQueue::new();
//! mq.add_move(10.0, 0.0, &limits).unwrap();
//! let flushed = mq.plan(false).unwrap();
//!
//! let mut tq = TrapQueue::new();
//! let mut print_time = 0.0;
//! for _ in 0..flushed {
//!     let ad = mq.next_move().unwrap();
//!     tq.append(print_time, Coord::default(), Coord { x: 1.0, ..Coord::default() }, &ad);
//!     print_time += ad.total_time();
//! }
//! ```

pub mod accel_combiner;
pub mod accel_group;
pub mod config;
pub mod kinematics;
pub mod moveq;
pub mod scurve;
pub mod smoother;
pub mod trapq;
pub mod vtrap;

pub use accel_group::{AccelGroup, GroupKind, GroupRef};
pub use config::{Config, ConfigError, MotionConfig, MoveLimits};
pub use kinematics::{AxisFlags, StepperKinematics};
pub use moveq::{MoveQueue, PlanError};
pub use scurve::SCurve;
pub use smoother::Smoother;
pub use trapq::{Coord, Move, TrapAccelDecel, TrapQueue};

/// Tolerance used for velocity and distance comparisons throughout the
/// planner.
pub(crate) const EPSILON: f64 = 1e-9;
