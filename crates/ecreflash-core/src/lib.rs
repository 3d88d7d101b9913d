//! ecreflash-core - Core library for EC firmware reflashing
//!
//! Reflashing a running embedded controller is mostly a sequencing problem:
//! the EC keeps servicing the machine's power and battery management while an
//! external agent rewrites the flash chip it will boot from next. This crate
//! provides the pieces of that sequence:
//!
//! - a readiness gate over the EC's telemetry window ([`readiness`])
//! - a cancellable operator countdown ([`countdown`])
//! - a region plan describing which byte ranges an update touches ([`plan`])
//! - the unlock/erase/write/verify/lock state machine ([`session`])
//! - terminal outcome classification ([`outcome`])
//!
//! Hardware access goes through the traits in [`ec`]; the flash driver in
//! [`protocol`] expresses region operations as host commands over any
//! transport.
//!
//! # Example
//!
//! ```ignore
//! use ecreflash_core::plan::RegionPlan;
//! use ecreflash_core::protocol::HostFlash;
//! use ecreflash_core::session::{FlashSession, NullObserver};
//!
//! let session = FlashSession::new(RegionPlan::framework(), image)?;
//! let mut flash = HostFlash::new(&mut transport);
//! let report = session.run(&mut flash, &mut NullObserver);
//! println!("{:?}", report.outcome());
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod countdown;
pub mod ec;
pub mod error;
pub mod outcome;
pub mod plan;
pub mod protocol;
pub mod readiness;
pub mod session;

pub use error::{Error, Result};
