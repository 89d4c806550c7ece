//! # monstercarlo
//!
//! Agent-side engine for driver-steered decision trajectories.
//!
//! An external search driver (an MCTS controller, say) launches the
//! simulation and connects over TCP. At every decision point the simulation
//! calls [`Session::select`](session::Session::select). The driver may force
//! the first choices of each episode (replay); afterwards the agent samples
//! on its own (exploration). At the end of the episode the agent reports the
//! full path together with a score.
//!
//! ## Quick Start
//!
//! ```no_run
//! use monstercarlo::prelude::*;
//!
//! let cfg = DriverConfig::from_env()?;
//! let mut session = Session::connect_with(&cfg)?;
//!
//! loop {
//!     match session.select_weighted(3, &[1.0, 0.5, 0.0], 1.0) {
//!         Ok(choice) => session.supply_outcome(choice as i64)?,
//!         Err(e) if e.is_episode_finished() => break,
//!         Err(e) => return Err(e.into()),
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Modules
//!
//! - [`session`]: the replay/sample state machine
//! - [`protocol`]: one-line JSON wire messages
//! - [`sampler`]: softmax/temperature and uniform choice sampling
//! - [`chooser`]: decision seam with a driverless implementation
//! - [`config`]: launcher-provided environment settings

pub mod chooser;
pub mod config;
pub mod error;
pub mod prng;
pub mod protocol;
pub mod sampler;
pub mod session;
pub mod stats;
pub mod transport;

/// Prelude module for convenient imports.
///
/// ```
/// use monstercarlo::prelude::*;
/// ```
pub mod prelude {
    pub use crate::chooser::{Chooser, LocalChooser};
    pub use crate::config::DriverConfig;
    pub use crate::error::{ConfigError, SessionError};
    pub use crate::protocol::{Request, Response, Step};
    pub use crate::sampler::DEFAULT_TEMPERATURE;
    pub use crate::session::{Session, SessionState};
    pub use crate::stats::OutcomeStats;
}
