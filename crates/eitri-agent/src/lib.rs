//! # Eitri Agent
//!
//! Eitri Agent is the host-side component of the Eitri distribution system.
//! It registers with the Eitri server, listens on a long-lived release
//! stream for packages targeted at its host, installs the releases it
//! receives, and continuously reports the status of local services back to
//! the server.
//!
//! ## Architecture
//!
//! ### Server Module
//! ```text
//! pub mod server;
//! ```
//! Handles communication with the Eitri server:
//! - Readiness polling
//! - Agent registration
//! - Release stream subscription
//!
//! ### Installer Module
//! ```text
//! pub mod installer;
//! ```
//! Downloads release assets and runs the package's install command.
//!
//! ### Services Module
//! ```text
//! pub mod services;
//! ```
//! Collects container and service-manager status and streams reports to
//! the server.
//!
//! ### CLI Module
//! ```text
//! pub mod cli;
//! ```
//! Provides command-line interface functionality:
//! - Command parsing
//! - Agent initialization
//! - Runtime control
//!
//! ## Operation Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Agent
//!     participant Server
//!
//!     Agent->>Server: Wait for ready (/readyz)
//!     Agent->>Server: Register
//!     Server-->>Agent: Subscription flags
//!
//!     par Release stream
//!         Server-->>Agent: Release envelope
//!         Agent->>Agent: Download + install
//!     and Service reporting
//!         loop Every report interval
//!             Agent->>Server: Services report
//!         end
//!     end
//! ```

pub mod cli;
pub mod installer;
pub mod server;
pub mod services;
pub mod utils;
