//! Immutability guard
//!
//! Decides what may cross a concurrency boundary. Three boundaries use it:
//! - `AtomicRef` stores: strict, [`is_immutable`] only
//! - actor message payloads: [`check_message`], immutable or exclusively owned
//! - future results: [`make_safe`], converted with [`to_immutable`]

use crate::runtime::error::{RuntimeError, RuntimeResult};

use super::runtime_value::{FuncValue, ListValue, MapEntries, MapValue, Value};

/// Nesting limit for deep conversion and ownership walks. Self-referencing
/// mutable aggregates hit this limit instead of recursing forever.
pub const MAX_NESTING_DEPTH: usize = 256;

/// Check if `value` is safely shareable across concurrency boundaries.
#[inline]
pub fn is_immutable(value: &Value) -> bool {
    value.is_immutable()
}

/// Return `value` if immutable, otherwise a deeply frozen copy.
///
/// Mutable lists, maps and funcs are copied and frozen recursively. Objects
/// of mutable types have no immutable conversion and fail with
/// `NotImmutable`, as does any aggregate containing one.
pub fn to_immutable(value: Value) -> RuntimeResult<Value> {
    freeze(value, 0)
}

fn freeze(
    value: Value,
    depth: usize,
) -> RuntimeResult<Value> {
    if value.is_immutable() {
        return Ok(value);
    }
    if depth >= MAX_NESTING_DEPTH {
        return Err(RuntimeError::NotImmutable(format!(
            "{} nested deeper than {} levels",
            value.type_name(),
            MAX_NESTING_DEPTH
        )));
    }

    match value {
        Value::List(list) => {
            let items = list
                .to_vec()
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    freeze(item, depth + 1).map_err(|e| item_error("Item", i, e))
                })
                .collect::<RuntimeResult<Vec<_>>>()?;
            Ok(Value::List(ListValue::frozen(items)))
        }
        Value::Map(map) => {
            let mut frozen = MapEntries::with_capacity(map.len());
            for (key, val) in map.to_entries() {
                let key = freeze(key, depth + 1)?;
                let val = freeze(val, depth + 1)?;
                frozen.insert(key, val);
            }
            Ok(Value::Map(MapValue::frozen(frozen)))
        }
        Value::Func(func) => {
            let captures = func
                .captures()
                .iter()
                .cloned()
                .enumerate()
                .map(|(i, c)| freeze(c, depth + 1).map_err(|e| item_error("Capture", i, e)))
                .collect::<RuntimeResult<Vec<_>>>()?;
            Ok(Value::Func(FuncValue::from_parts(
                func.body().clone(),
                captures,
            )))
        }
        other => Err(RuntimeError::NotImmutable(format!(
            "{} has no immutable conversion",
            other.type_name()
        ))),
    }
}

fn item_error(
    what: &str,
    index: usize,
    err: RuntimeError,
) -> RuntimeError {
    match err {
        RuntimeError::NotImmutable(msg) => {
            RuntimeError::NotImmutable(format!("{} [{}] not immutable: {}", what, index, msg))
        }
        other => other,
    }
}

/// Check a message payload before it is handed to an actor.
///
/// Immutable values always pass. Mutable values pass only when every mutable
/// handle reachable from them is exclusively owned by the sender, so moving
/// the value into the mailbox transfers ownership. Anything else is an `Arg`
/// error.
pub fn check_message(value: &Value) -> RuntimeResult<()> {
    if value.is_immutable() || owned(value, 1, 0) {
        Ok(())
    } else {
        Err(RuntimeError::Arg(format!(
            "message {} is neither immutable nor exclusively owned",
            value.type_name()
        )))
    }
}

/// Check if no mutable handle reachable from `value` is shared.
pub fn is_exclusively_owned(value: &Value) -> bool {
    owned(value, 1, 0)
}

/// Walk `value` checking that each mutable handle has exactly `expected`
/// strong references. Items copied out of a container hold one extra
/// reference on top of the container's own, so they are checked against 2.
fn owned(
    value: &Value,
    expected: usize,
    depth: usize,
) -> bool {
    if value.is_immutable() {
        return true;
    }
    if depth >= MAX_NESTING_DEPTH {
        return false;
    }
    match value {
        Value::List(list) => list_owned(list, expected, depth),
        Value::Map(map) => {
            map.handle_count() == expected
                && map
                    .to_entries()
                    .iter()
                    .all(|(k, v)| owned(k, 2, depth + 1) && owned(v, 2, depth + 1))
        }
        Value::Object(obj) => list_owned(obj.field_list(), expected, depth),
        Value::Func(func) => {
            func.captures_handle_count() == expected
                && func.captures().iter().all(|c| owned(c, 1, depth + 1))
        }
        _ => false,
    }
}

fn list_owned(
    list: &ListValue,
    expected: usize,
    depth: usize,
) -> bool {
    list.handle_count() == expected
        && list
            .to_vec()
            .iter()
            .all(|item| owned(item, 2, depth + 1))
}

/// Prepare a handler result for delivery to any number of observers.
#[inline]
pub fn make_safe(value: Value) -> RuntimeResult<Value> {
    to_immutable(value)
}
