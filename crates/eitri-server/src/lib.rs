/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Eitri Server
//!
//! `eitri-server` is the central distribution point of the Eitri system. It
//! loads a declarative topology of packages and host targeting, fans
//! release-published events out to every connected agent's release stream,
//! and ingests the service status reports those agents send back.

pub mod api;
pub mod broker;
pub mod cli;
pub mod service;
pub mod storage;
pub mod topology;
