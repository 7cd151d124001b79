//! Platform glue shared by every module: task spawning and timers that work on
//! native targets (Tokio) and in the browser (wasm32).

pub mod runtime;
