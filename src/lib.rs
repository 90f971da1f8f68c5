//! Waypoint Realtime - Main Library
//!
//! Realtime transport and session layer for the Waypoint location-tracking
//! platform.
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (CLI, runners, shutdown)
//! - **waypoint**: Subscriber, publisher and unified sessions (re-exported from workspace)
//! - **geosockets**: WebSocket transport and event dispatch (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust,no_run
//! use waypoint_realtime::bin_common::{load_session_config, ConfigType};
//! use waypoint_realtime::waypoint::SubscriberSession;
//! ```

// Re-export workspace libraries for convenience
pub use geosockets;
pub use waypoint;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod runner;
    pub mod shutdown;

    pub use cli::{load_config_from_env, load_session_config, parse_args, ConfigType};
    pub use runner::{BinaryRunner, RunConfig};
    pub use shutdown::ShutdownManager;
}
