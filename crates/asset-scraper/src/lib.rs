// Copyright 2026 Asset Scraper Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scrapes FII and stock indicators from rendered pages, caches them with a
//! TTL and serves them over an authenticated HTTP API.

pub mod api;
pub mod asset;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod extractor;
pub mod normalize;
pub mod queue;
pub mod renderer;
pub mod schema;
pub mod scraper;
pub mod session;
pub mod store;
pub mod telemetry;
