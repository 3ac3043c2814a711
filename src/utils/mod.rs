pub mod literal;
pub mod math;
pub mod sort;

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{LangIdError, Result};

/// Build the worker pool for one pass
/// `None` keeps rayon's default thread count
pub fn thread_pool(jobs: Option<usize>) -> Result<ThreadPool> {
    let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("langid-worker-{i}"));
    if let Some(jobs) = jobs {
        builder = builder.num_threads(jobs);
    }
    builder
        .build()
        .map_err(|e| LangIdError::config(format!("unable to build worker pool: {e}")))
}

/// Name of the current pool worker, used to name per-worker bucket files
pub(crate) fn worker_name() -> String {
    format!("w{:03}", rayon::current_thread_index().unwrap_or(0))
}
