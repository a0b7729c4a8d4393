//! `locotrack-controller` – controller side of the locomotion tracking
//! bridge.
//!
//! # Modules
//!
//! - [`supervisor`] – spawns the bridge process in its own process group and
//!   stops it with SIGTERM, escalating to SIGKILL after a deadline.
//! - [`socket`] – the UDP command channel of a closed-loop source.
//! - [`closed_loop`] – generic closed-loop base, [`PoseParser`] and the
//!   [`ClosedLoopSource`] trait.
//! - [`adapter`] – [`BridgeClosedLoop`], the closed-loop source backed by
//!   the serial bridge.
//!
//! Everything here expects a Tokio runtime.

pub mod adapter;
pub mod closed_loop;
pub mod socket;
pub mod supervisor;

pub use adapter::{BridgeClosedLoop, BridgeClosedLoopConfig, BridgeParser};
pub use closed_loop::{ClosedLoop, ClosedLoopSource, PoseParser, ZeroOptions};
pub use socket::SocketManager;
pub use supervisor::{BridgeSupervisor, ShutdownOutcome, SupervisorConfig, DEFAULT_CLOSE_TIMEOUT};
