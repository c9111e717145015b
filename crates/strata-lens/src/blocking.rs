//! Driving async work to completion from synchronous callers.

use tokio::runtime::{Builder, Runtime};

use strata_core::StrataError;

/// Run `work` on a fresh current-thread runtime.
///
/// Outside a runtime this happens on the calling thread. Inside one (where
/// nesting a runtime would panic) the work moves to a scoped thread and the
/// caller blocks until it finishes.
pub(crate) fn block_on<T, F>(work: F) -> Result<T, StrataError>
where
    T: Send,
    F: FnOnce(&Runtime) -> Result<T, StrataError> + Send,
{
    let run = move || -> Result<T, StrataError> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        work(&runtime)
    };

    if tokio::runtime::Handle::try_current().is_err() {
        return run();
    }

    std::thread::scope(|scope| {
        scope
            .spawn(run)
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
    })
}
