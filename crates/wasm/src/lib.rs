//! Browser host for the ember assistant widget.
//!
//! Loaded through a `<script data-ember-widget ...>` tag on the host page. The same bundle
//! serves the chat surface page when the panel runs in a nested frame, via
//! [`mount_surface`].

mod attributes;

#[cfg(target_arch = "wasm32")]
mod dom;
#[cfg(target_arch = "wasm32")]
mod host;
#[cfg(target_arch = "wasm32")]
mod page;
#[cfg(target_arch = "wasm32")]
mod port;

pub use attributes::settings_overrides;

#[cfg(target_arch = "wasm32")]
pub use host::{mount_surface, start};
