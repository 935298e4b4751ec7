// Panic isolation for job execution
use futures::FutureExt;
use std::any::Any;
use std::cell::Cell;
use std::future::{poll_fn, Future};
use std::panic::AssertUnwindSafe;
use std::pin::pin;

thread_local! {
    static GUARDED: Cell<bool> = const { Cell::new(false) };
}

/// True while this thread polls a future whose panic is caught by
/// `guard` or `spawn_supervised`
///
/// A process panic hook uses it to tell caught panics from stray ones.
pub fn is_guarded() -> bool {
    GUARDED.with(Cell::get)
}

/// Restores the previous flag, also while unwinding
struct Restore(bool);

impl Drop for Restore {
    fn drop(&mut self) {
        GUARDED.with(|g| g.set(self.0));
    }
}

/// Poll `future` with the guarded flag set, catching its panic
pub(crate) async fn catch_guarded<F, T>(future: F) -> Result<T, Box<dyn Any + Send>>
where
    F: Future<Output = T>,
{
    let mut future = pin!(future);
    let marked = poll_fn(move |cx| {
        let _restore = Restore(GUARDED.with(|g| g.replace(true)));
        future.as_mut().poll(cx)
    });
    AssertUnwindSafe(marked).catch_unwind().await
}

/// Result of a panic-guarded execution
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    /// Execution completed
    Success(T),
    /// Execution panicked
    Panicked(String),
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Poll a future with panic isolation
///
/// A panic inside `future` is caught at the await point and returned as
/// `PanicGuardResult::Panicked`, so a misbehaving processor fails its job
/// instead of taking the consumer down.
///
/// # Example
/// ```text
/// match guard(processor.process(&job)).await {
///     PanicGuardResult::Success(outcome) => { /* ack */ }
///     PanicGuardResult::Panicked(msg) => { /* fail the job with msg */ }
/// }
/// ```
pub async fn guard<F, T>(future: F) -> PanicGuardResult<T>
where
    F: Future<Output = T>,
{
    match catch_guarded(future).await {
        Ok(value) => PanicGuardResult::Success(value),
        Err(payload) => PanicGuardResult::Panicked(panic_message(payload.as_ref())),
    }
}
