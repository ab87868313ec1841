//! Shared engine, models, and configuration for Thoughtline comment panels.
//!
//! The crate is host-agnostic: everything that touches the page goes through
//! [`engine::Host`], which the web crate implements on top of `web-sys`.

#![cfg_attr(not(test), forbid(unsafe_code))]
#![deny(warnings, clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)]

pub mod config;
pub mod engine;
pub mod models;
