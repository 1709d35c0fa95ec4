//! Lock poisoning as an error value
//!
//! Job registries and unit reporters are shared between supervisor tasks; a
//! panic in one task must surface as that module's `Lock` error, not a second
//! panic in whoever touches the lock next.

use std::sync::LockResult;

/// Map a poisoned lock onto the caller's error type
///
/// ```
/// use std::sync::Mutex;
/// use stackscan::core::sync::handle_mutex_poison;
/// use stackscan::worker::WorkerError;
///
/// let progress = Mutex::new(3usize);
/// let guard = handle_mutex_poison(progress.lock(), WorkerError::Lock).unwrap();
/// assert_eq!(*guard, 3);
/// ```
pub fn handle_mutex_poison<T, E>(
    result: LockResult<T>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<T, E> {
    result.map_err(|poisoned| {
        error_constructor(format!(
            "lock poisoned by a panicking task: {}",
            poisoned
        ))
    })
}
