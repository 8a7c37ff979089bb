//! Zero-sized proof tokens for the two-lock discipline.
//!
//! The graph lock and the render lock alternate at quantum boundaries and
//! must never be held at the same time by the same thread (see the
//! concurrency model). Rather than assert this at runtime, every function
//! that the engine requires to run "under" one of these locks takes a
//! reference to the matching token as an argument; only the context's own
//! locking code can construct one, so a caller holding the wrong lock (or no
//! lock at all) fails to compile.

use core::marker::PhantomData;

/// Proof that the graph lock is held by the current thread for the
/// lifetime `'a`. Constructed only while a `MutexGuard` on the graph mutex
/// is alive.
pub struct GraphLockGuard<'a> {
    _marker: PhantomData<&'a ()>,
}

impl<'a> GraphLockGuard<'a> {
    /// # Safety-by-construction
    ///
    /// Callers outside this crate's `Context` should not be able to name
    /// this constructor; it is `pub` only so the graph crate (which owns
    /// the actual `Mutex`) can produce tokens, while downstream node crates
    /// only ever consume `&GraphLockGuard`.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl Default for GraphLockGuard<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof that the render lock is held by the current thread for the
/// lifetime `'a`. Constructed only while a `MutexGuard` on the render mutex
/// is alive; threaded into every `pull`/`process` call.
pub struct RenderLockGuard<'a> {
    _marker: PhantomData<&'a ()>,
}

impl<'a> RenderLockGuard<'a> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl Default for RenderLockGuard<'_> {
    fn default() -> Self {
        Self::new()
    }
}
