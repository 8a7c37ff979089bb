use core::sync::atomic::{AtomicU32, Ordering};

/// An `f32` that can be loaded and stored atomically via bit-transmutation
/// over an [`AtomicU32`].
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self, order: Ordering) -> f32 {
        f32::from_bits(self.0.load(order))
    }

    #[inline]
    pub fn store(&self, value: f32, order: Ordering) {
        self.0.store(value.to_bits(), order);
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// An `f64` that can be loaded and stored atomically, used for the clock's
/// seconds counter which must be readable lock-free from any thread.
#[derive(Debug)]
pub struct AtomicF64(core::sync::atomic::AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(core::sync::atomic::AtomicU64::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self, order: Ordering) -> f64 {
        f64::from_bits(self.0.load(order))
    }

    #[inline]
    pub fn store(&self, value: f64, order: Ordering) {
        self.0.store(value.to_bits(), order);
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}
