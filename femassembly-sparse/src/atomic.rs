use std::sync::atomic::{AtomicU64, Ordering};

/// A 64-bit float supporting lock-free accumulation.
///
/// The value is stored as its IEEE bit pattern inside an [`AtomicU64`]. Addition is implemented as
/// a compare-and-swap loop on the bit pattern, so concurrent additions to the same slot are never
/// lost, although their summation order is unspecified.
#[derive(Debug, Default)]
#[repr(transparent)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self, order: Ordering) -> f64 {
        f64::from_bits(self.0.load(order))
    }

    pub fn store(&self, value: f64, order: Ordering) {
        self.0.store(value.to_bits(), order)
    }

    /// Atomically adds `value` and returns the previous value.
    pub fn fetch_add(&self, value: f64, order: Ordering) -> f64 {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let updated = (f64::from_bits(current) + value).to_bits();
            match self
                .0
                .compare_exchange_weak(current, updated, order, Ordering::Relaxed)
            {
                Ok(previous) => return f64::from_bits(previous),
                Err(actual) => current = actual,
            }
        }
    }

    /// Reads the value through exclusive access, without synchronization.
    pub fn get(&mut self) -> f64 {
        f64::from_bits(*self.0.get_mut())
    }

    /// Writes the value through exclusive access, without synchronization.
    pub fn set(&mut self, value: f64) {
        *self.0.get_mut() = value.to_bits();
    }

    /// Adds to the value through exclusive access, without synchronization.
    pub fn add(&mut self, value: f64) {
        let bits = self.0.get_mut();
        *bits = (f64::from_bits(*bits) + value).to_bits();
    }

    pub fn into_inner(self) -> f64 {
        f64::from_bits(self.0.into_inner())
    }
}

impl From<f64> for AtomicF64 {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}
