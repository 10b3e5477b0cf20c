//! The on-device location-to-time-zone provider.
//!
//! A background service feeds this crate coarse location fixes; it decides
//! when listening for them is worth the power draw, turns a fix into the
//! zone ids that apply there, and tells its host whether the device's zone
//! set is currently certain, uncertain, or never going to be known.
//!
//! The crate is deliberately free of platform calls. Everything the state
//! machine needs from the outside world arrives through three seams:
//! [`environment::Environment`] for clocks, timers and location listening,
//! [`geo::ZoneFinder`] for the geo-data lookups, and
//! [`provider::ResultSink`] for delivering results to the host. Hosts
//! implement the seams; tests script them.

#![warn(nonstandard_style)]
#![warn(trivial_numeric_casts)]
#![warn(unreachable_pub)]
#![warn(unused)]

pub mod budget;
pub mod environment;
pub mod geo;
pub mod provider;
