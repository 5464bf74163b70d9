//! Tokio runtime for synchronous callers
//!
//! The loader API is async. Pipelines that drive it from plain threads use
//! `block_on_tokio` against a shared runtime.

use std::sync::OnceLock;
use tokio::runtime::Runtime;

static TOKIO_RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Get or create the shared Tokio runtime.
///
/// # Panics
///
/// Panics if the runtime cannot be created.
pub fn get_tokio_runtime() -> &'static Runtime {
    TOKIO_RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .thread_name("rawstage-runtime")
            .build()
            .expect("Failed to create Tokio runtime for Rawstage")
    })
}

/// Run a future to completion on the shared runtime.
///
/// Blocks the current thread. Must not be called from inside another Tokio
/// runtime.
pub fn block_on_tokio<F, T>(future: F) -> T
where
    F: std::future::Future<Output = T>,
{
    get_tokio_runtime().block_on(future)
}
