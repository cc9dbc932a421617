//! Atomic cells
//!
//! Single-slot shared state usable without external locking:
//! [`AtomicBool`], [`AtomicInt`] and [`AtomicRef`]. Operations on one cell are
//! linearizable; nothing is claimed across distinct cells.
//!
//! Derived read-modify-write operations are built once on top of
//! compare-and-set by [`AtomicCell::get_and_update`] /
//! [`AtomicCell::update_and_get`].

use crossbeam::utils::Backoff;
use parking_lot::Mutex;
use std::convert::Infallible;
use std::fmt;
use std::sync::atomic::{AtomicBool as StdAtomicBool, AtomicI64, Ordering};

use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::value::Value;

/// Common compare-and-set protocol of the atomic cells.
pub trait AtomicCell {
    /// Stored item
    type Item: Clone;
    /// Error raised when an item is refused by the cell.
    type Error;

    /// Load the current item.
    fn load(&self) -> Self::Item;

    /// Check that `item` may be stored. Called before any mutation.
    fn admit(
        &self,
        item: &Self::Item,
    ) -> Result<(), Self::Error>;

    /// Replace the current item with `update` iff it equals `expect`.
    /// `update` has already been admitted.
    fn swap_if(
        &self,
        expect: &Self::Item,
        update: Self::Item,
    ) -> bool;

    /// Apply `f` to the current item until a compare-and-set succeeds;
    /// returns the item that was replaced.
    fn get_and_update<F>(
        &self,
        f: F,
    ) -> Result<Self::Item, Self::Error>
    where
        F: FnMut(&Self::Item) -> Self::Item,
    {
        atomic_update(self, f).map(|(prev, _)| prev)
    }

    /// Apply `f` to the current item until a compare-and-set succeeds;
    /// returns the item that was stored.
    fn update_and_get<F>(
        &self,
        f: F,
    ) -> Result<Self::Item, Self::Error>
    where
        F: FnMut(&Self::Item) -> Self::Item,
    {
        atomic_update(self, f).map(|(_, next)| next)
    }
}

fn atomic_update<C, F>(
    cell: &C,
    mut f: F,
) -> Result<(C::Item, C::Item), C::Error>
where
    C: AtomicCell + ?Sized,
    F: FnMut(&C::Item) -> C::Item,
{
    let backoff = Backoff::new();
    loop {
        let current = cell.load();
        let next = f(&current);
        cell.admit(&next)?;
        if cell.swap_if(&current, next.clone()) {
            return Ok((current, next));
        }
        backoff.spin();
    }
}

// ============================================================================
// AtomicBool
// ============================================================================

/// Atomic boolean cell
#[derive(Default)]
pub struct AtomicBool {
    value: StdAtomicBool,
}

impl AtomicBool {
    /// Create a cell holding `value`.
    pub fn new(value: bool) -> Self {
        Self {
            value: StdAtomicBool::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.value.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn set(
        &self,
        value: bool,
    ) {
        self.value.store(value, Ordering::SeqCst);
    }

    /// Atomically store `value`, returning the previous value.
    #[inline]
    pub fn get_and_set(
        &self,
        value: bool,
    ) -> bool {
        self.value.swap(value, Ordering::SeqCst)
    }

    /// Store `update` iff the current value equals `expect`.
    #[inline]
    pub fn compare_and_set(
        &self,
        expect: bool,
        update: bool,
    ) -> bool {
        self.value
            .compare_exchange(expect, update, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl AtomicCell for AtomicBool {
    type Item = bool;
    type Error = Infallible;

    fn load(&self) -> bool {
        self.get()
    }

    fn admit(
        &self,
        _item: &bool,
    ) -> Result<(), Infallible> {
        Ok(())
    }

    fn swap_if(
        &self,
        expect: &bool,
        update: bool,
    ) -> bool {
        self.compare_and_set(*expect, update)
    }
}

impl fmt::Display for AtomicBool {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

impl fmt::Debug for AtomicBool {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_tuple("AtomicBool").field(&self.get()).finish()
    }
}

// ============================================================================
// AtomicInt
// ============================================================================

/// Atomic integer cell. Arithmetic wraps on overflow.
#[derive(Default)]
pub struct AtomicInt {
    value: AtomicI64,
}

impl AtomicInt {
    /// Create a cell holding `value`.
    pub fn new(value: i64) -> Self {
        Self {
            value: AtomicI64::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn set(
        &self,
        value: i64,
    ) {
        self.value.store(value, Ordering::SeqCst);
    }

    /// Atomically store `value`, returning the previous value.
    #[inline]
    pub fn get_and_set(
        &self,
        value: i64,
    ) -> i64 {
        self.value.swap(value, Ordering::SeqCst)
    }

    /// Store `update` iff the current value equals `expect`.
    #[inline]
    pub fn compare_and_set(
        &self,
        expect: i64,
        update: i64,
    ) -> bool {
        self.value
            .compare_exchange(expect, update, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    #[inline]
    pub fn get_and_add(
        &self,
        delta: i64,
    ) -> i64 {
        self.value.fetch_add(delta, Ordering::SeqCst)
    }

    #[inline]
    pub fn add_and_get(
        &self,
        delta: i64,
    ) -> i64 {
        self.get_and_add(delta).wrapping_add(delta)
    }

    #[inline]
    pub fn get_and_increment(&self) -> i64 {
        self.get_and_add(1)
    }

    #[inline]
    pub fn get_and_decrement(&self) -> i64 {
        self.get_and_add(-1)
    }

    #[inline]
    pub fn increment_and_get(&self) -> i64 {
        self.add_and_get(1)
    }

    #[inline]
    pub fn decrement_and_get(&self) -> i64 {
        self.add_and_get(-1)
    }

    #[inline]
    pub fn add(
        &self,
        delta: i64,
    ) {
        self.get_and_add(delta);
    }

    #[inline]
    pub fn increment(&self) {
        self.add(1);
    }

    #[inline]
    pub fn decrement(&self) {
        self.add(-1);
    }
}

impl AtomicCell for AtomicInt {
    type Item = i64;
    type Error = Infallible;

    fn load(&self) -> i64 {
        self.get()
    }

    fn admit(
        &self,
        _item: &i64,
    ) -> Result<(), Infallible> {
        Ok(())
    }

    fn swap_if(
        &self,
        expect: &i64,
        update: i64,
    ) -> bool {
        self.compare_and_set(*expect, update)
    }
}

impl fmt::Display for AtomicInt {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

impl fmt::Debug for AtomicInt {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_tuple("AtomicInt").field(&self.get()).finish()
    }
}

// ============================================================================
// AtomicRef
// ============================================================================

/// Atomic reference cell holding an immutable [`Value`].
///
/// Every stored value must pass the immutability guard. Rejected stores fail
/// with `NotImmutable` and leave the cell untouched. The slot is guarded by a
/// short critical section that never runs user code.
#[derive(Default)]
pub struct AtomicRef {
    value: Mutex<Value>,
}

impl AtomicRef {
    /// Create a cell holding `value`.
    pub fn new(value: Value) -> RuntimeResult<Self> {
        check_immutable(&value)?;
        Ok(Self {
            value: Mutex::new(value),
        })
    }

    #[inline]
    pub fn get(&self) -> Value {
        self.value.lock().clone()
    }

    pub fn set(
        &self,
        value: Value,
    ) -> RuntimeResult<()> {
        check_immutable(&value)?;
        *self.value.lock() = value;
        Ok(())
    }

    /// Atomically store `value`, returning the previous value.
    pub fn get_and_set(
        &self,
        value: Value,
    ) -> RuntimeResult<Value> {
        check_immutable(&value)?;
        Ok(std::mem::replace(&mut *self.value.lock(), value))
    }

    /// Store `update` iff the current value equals `expect`.
    ///
    /// `update` is checked before the comparison, so a mutable `update` fails
    /// even when the comparison would not have matched.
    pub fn compare_and_set(
        &self,
        expect: &Value,
        update: Value,
    ) -> RuntimeResult<bool> {
        check_immutable(&update)?;
        Ok(self.swap_if(expect, update))
    }
}

fn check_immutable(value: &Value) -> RuntimeResult<()> {
    if value.is_immutable() {
        Ok(())
    } else {
        Err(RuntimeError::NotImmutable(format!(
            "AtomicRef value {} is not immutable",
            value.type_name()
        )))
    }
}

impl AtomicCell for AtomicRef {
    type Item = Value;
    type Error = RuntimeError;

    fn load(&self) -> Value {
        self.get()
    }

    fn admit(
        &self,
        item: &Value,
    ) -> RuntimeResult<()> {
        check_immutable(item)
    }

    fn swap_if(
        &self,
        expect: &Value,
        update: Value,
    ) -> bool {
        let mut slot = self.value.lock();
        if *slot == *expect {
            *slot = update;
            true
        } else {
            false
        }
    }
}

impl fmt::Display for AtomicRef {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

impl fmt::Debug for AtomicRef {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_tuple("AtomicRef").field(&self.get()).finish()
    }
}
