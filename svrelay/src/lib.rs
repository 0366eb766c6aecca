//! # svrelay: frame relay service
//!
//! Attaches to a shared-memory frame producer and streams its frames to
//! a strip-addressable display. The display is opened first; the
//! producer may appear at any time afterwards.
//!
//! | Module    | Purpose                                             |
//! |-----------|-----------------------------------------------------|
//! | `config`  | TOML configuration and conversion to core options   |
//! | `service` | Runs a relay session on a blocking task until stopped |

pub mod config;
pub mod service;
