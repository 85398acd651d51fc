//! Atomic value cells backing node input slots.
//!
//! A [`Cell`] is a single-slot container whose reads and writes are
//! serialized by hardware atomics: a reader observes either the value before
//! a store or the value after it, never torn state. The [`Value`] trait
//! selects the backing storage per value type: scalars map onto the matching
//! `std::sync::atomic` type, shared handles (`Option<Arc<T>>`) map onto an
//! atomic handle swap so ownership transfers without ever copying bytes of
//! the pointee.

use std::fmt;
use std::sync::atomic::{
    AtomicBool, AtomicI16, AtomicI32, AtomicI64, AtomicI8, AtomicIsize, AtomicU16, AtomicU32,
    AtomicU64, AtomicU8, AtomicUsize, Ordering,
};
use std::sync::Arc;

use arc_swap::ArcSwapOption;

/// A single-slot atomic container for one input (or last-output) value.
pub struct Cell<T: Value> {
    raw: T::Raw,
}

impl<T: Value> Cell<T> {
    /// A cell holding `value`.
    pub fn new(value: T) -> Self {
        let cell = Self::default();
        cell.store(value);
        cell
    }

    /// Atomically write `value` into the cell (release ordering).
    pub fn store(&self, value: T) {
        T::store(&self.raw, value);
    }

    /// Atomically read the current value (acquire ordering).
    pub fn load(&self) -> T {
        T::load(&self.raw)
    }

    /// Atomically replace the value, returning the previous one
    /// (acquire-release ordering).
    pub fn exchange(&self, value: T) -> T {
        T::exchange(&self.raw, value)
    }
}

impl<T: Value> Default for Cell<T> {
    fn default() -> Self {
        Self {
            raw: T::Raw::default(),
        }
    }
}

impl<T: Value + fmt::Debug> fmt::Debug for Cell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cell").field(&self.load()).finish()
    }
}

/// Types that can live in a [`Cell`].
///
/// Implemented for the atomically-loadable scalars (integers, `bool`,
/// `f32`/`f64` through their bit representations) and for `Option<Arc<T>>`
/// handles. `same` is the equality consulted by the change-detecting
/// propagation policy: plain `==` for scalars, pointer identity for handles.
pub trait Value: Clone + Default + Send + Sync + 'static {
    /// Backing storage for a cell of this type.
    type Raw: Default + Send + Sync;

    /// Write `value` with release ordering.
    fn store(raw: &Self::Raw, value: Self);

    /// Read the current value with acquire ordering.
    fn load(raw: &Self::Raw) -> Self;

    /// Replace the value with acquire-release ordering, returning the
    /// previous one.
    fn exchange(raw: &Self::Raw, value: Self) -> Self;

    /// Whether two values count as unchanged for propagation purposes.
    fn same(a: &Self, b: &Self) -> bool;
}

macro_rules! atomic_value {
    ($($ty:ty => $atomic:ty),+ $(,)?) => {$(
        impl Value for $ty {
            type Raw = $atomic;

            fn store(raw: &Self::Raw, value: Self) {
                raw.store(value, Ordering::Release);
            }

            fn load(raw: &Self::Raw) -> Self {
                raw.load(Ordering::Acquire)
            }

            fn exchange(raw: &Self::Raw, value: Self) -> Self {
                raw.swap(value, Ordering::AcqRel)
            }

            fn same(a: &Self, b: &Self) -> bool {
                a == b
            }
        }
    )+};
}

atomic_value! {
    i8 => AtomicI8,
    u8 => AtomicU8,
    i16 => AtomicI16,
    u16 => AtomicU16,
    i32 => AtomicI32,
    u32 => AtomicU32,
    i64 => AtomicI64,
    u64 => AtomicU64,
    isize => AtomicIsize,
    usize => AtomicUsize,
    bool => AtomicBool,
}

macro_rules! float_value {
    ($($ty:ty => $atomic:ty),+ $(,)?) => {$(
        impl Value for $ty {
            type Raw = $atomic;

            fn store(raw: &Self::Raw, value: Self) {
                raw.store(value.to_bits(), Ordering::Release);
            }

            fn load(raw: &Self::Raw) -> Self {
                <$ty>::from_bits(raw.load(Ordering::Acquire))
            }

            fn exchange(raw: &Self::Raw, value: Self) -> Self {
                <$ty>::from_bits(raw.swap(value.to_bits(), Ordering::AcqRel))
            }

            fn same(a: &Self, b: &Self) -> bool {
                // IEEE semantics: NaN never counts as unchanged
                a == b
            }
        }
    )+};
}

float_value! {
    f32 => AtomicU32,
    f64 => AtomicU64,
}

impl<T: Send + Sync + 'static> Value for Option<Arc<T>> {
    type Raw = ArcSwapOption<T>;

    fn store(raw: &Self::Raw, value: Self) {
        raw.store(value);
    }

    fn load(raw: &Self::Raw) -> Self {
        raw.load_full()
    }

    fn exchange(raw: &Self::Raw, value: Self) -> Self {
        raw.swap(value)
    }

    fn same(a: &Self, b: &Self) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
