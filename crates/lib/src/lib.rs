//! gantry-lib: dependency build pipeline for serverless function bundles.
//!
//! Native-extension dependencies are compiled inside a disposable container
//! whose binary interface matches the function runtime, cached by the
//! fingerprint of the dependency manifest, and installed into the project
//! tree ready for packaging.
//!
//! - `cache`: rebuild decision, checksum marker, lock and pruning
//! - `engine`: the container engine capability and its docker CLI implementation
//! - `deps`: script generation, isolated builder, extractor and orchestrator
//! - `config`: project file loading into a `BuildRequest`

pub mod cache;
pub mod config;
pub mod consts;
pub mod deps;
pub mod engine;
pub mod platform;
pub mod request;
pub mod runtime;
pub mod util;
