// src/core/tasks/mod.rs

//! Long-running background tasks that support the proxy: stats sampling,
//! configuration hot reload, and template cache maintenance.

pub mod config_reloader;
pub mod qps_sampler;
pub mod template_pruner;
