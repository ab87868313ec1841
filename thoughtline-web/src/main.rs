//! Browser entry point of the Thoughtline comment panels.
//!
//! Binds the shared comment engine to the page through `web-sys`, `gloo` and
//! `reqwest`, then hands control back to the browser event loop.

#![cfg_attr(not(test), forbid(unsafe_code))]
#![deny(warnings, clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)]

mod api;
mod app;
mod config;
mod host;
mod listeners;
mod logging;
mod storage;

fn main() {
    // Disable truncation of panic payloads to debug any panics
    std::panic::set_hook(Box::new(|info| {
        if let Some(s) = info.payload().downcast_ref::<String>() {
            web_sys::console::error_1(&format!("Panic: {s}").into());
        } else if let Some(s) = info.payload().downcast_ref::<&str>() {
            web_sys::console::error_1(&format!("Panic: {s}").into());
        } else {
            web_sys::console::error_1(&"Unknown panic".into());
        }
        if let Some(location) = info.location() {
            web_sys::console::error_1(
                &format!(
                    "  at {}:{}:{}",
                    location.file(),
                    location.line(),
                    location.column()
                )
                .into(),
            );
        }
    }));

    web_sys::console::log_1(&"Starting Thoughtline comments".into());

    if let Err(error) = app::start() {
        web_sys::console::error_1(&format!("Thoughtline comments failed to start: {error:#}").into());
    }
}
