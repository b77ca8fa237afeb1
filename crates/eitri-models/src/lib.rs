//! # Eitri Models
//!
//! Wire types shared between the Eitri update server and the Eitri agent:
//! releases and their assets, registration messages, and the per-host
//! service status reports.

pub mod models;
