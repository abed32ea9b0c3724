//! Stack growth for the recursive evaluator and reader.
//!
//! Evaluation depth is bounded by [`crate::InterpreterConfig::max_eval_depth`],
//! but a generous limit still recurses far deeper than a default thread stack
//! allows. Every evaluation step runs through [`ensure_sufficient_stack`], which
//! grows the stack on demand so the depth limit is reported as
//! [`crate::Error::DepthLimitExceeded`] instead of crashing the host.

/// Grow when less than this much stack remains.
const RED_ZONE: usize = 128 * 1024;

/// Size of each newly allocated stack segment.
const STACK_PER_RECURSION: usize = 1024 * 1024;

#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
