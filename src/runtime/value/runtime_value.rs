//! Runtime value type system
//!
//! This module implements `Value`, the unified representation of everything
//! that can cross an actor boundary: message payloads, handler results and
//! `AtomicRef` contents.
//!
//! Every value carries a [`Mutability`] classification that is fixed when the
//! value is constructed:
//! - scalars are always immutable
//! - lists and maps are either frozen (`Arc<[Value]>`) or a shared mutable
//!   handle (`Arc<Mutex<..>>`)
//! - objects take their mutability from their [`TypeDecl`]
//! - funcs are immutable iff all of their captures are immutable

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use crate::runtime::error::{RuntimeError, RuntimeResult};

/// Mutability classification of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutability {
    /// Primitive scalar (null, bool, int, float, str, bytes, duration)
    Scalar,
    /// Aggregate that was deeply frozen
    Frozen,
    /// Instance of a type declared immutable by construction
    DeclaredImmutable,
    /// Anything else
    Mutable,
}

impl Mutability {
    /// Check if values of this class may be shared across contexts.
    #[inline]
    pub fn is_immutable(self) -> bool {
        !matches!(self, Mutability::Mutable)
    }
}

/// Type declaration as seen by the concurrency core.
///
/// The reflective type system lives elsewhere; the core only needs the
/// type's name and whether it declares itself immutable.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct TypeDecl {
    name: Arc<str>,
    immutable: bool,
}

impl TypeDecl {
    /// Declare a type whose instances are immutable by construction.
    pub fn immutable(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: Arc::from(name),
            immutable: true,
        })
    }

    /// Declare a type with mutable instances.
    pub fn mutable(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: Arc::from(name),
            immutable: false,
        })
    }

    /// Type name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the type declares its instances immutable.
    #[inline]
    pub fn declares_immutable(&self) -> bool {
        self.immutable
    }
}

/// Map entries, kept in insertion order.
pub type MapEntries = IndexMap<Value, Value>;

#[derive(Clone)]
enum ListRepr {
    Frozen(Arc<[Value]>),
    Mutable(Arc<Mutex<Vec<Value>>>),
}

/// List value, either frozen or a shared mutable handle.
#[derive(Clone)]
pub struct ListValue(ListRepr);

impl ListValue {
    pub(crate) fn frozen(items: Vec<Value>) -> Self {
        ListValue(ListRepr::Frozen(Arc::from(items)))
    }

    fn mutable(items: Vec<Value>) -> Self {
        ListValue(ListRepr::Mutable(Arc::new(Mutex::new(items))))
    }

    /// Check if the list is frozen.
    #[inline]
    pub fn is_frozen(&self) -> bool {
        matches!(self.0, ListRepr::Frozen(_))
    }

    /// Number of items
    pub fn len(&self) -> usize {
        match &self.0 {
            ListRepr::Frozen(items) => items.len(),
            ListRepr::Mutable(items) => items.lock().len(),
        }
    }

    /// Check if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get item by index
    pub fn get(
        &self,
        index: usize,
    ) -> Option<Value> {
        match &self.0 {
            ListRepr::Frozen(items) => items.get(index).cloned(),
            ListRepr::Mutable(items) => items.lock().get(index).cloned(),
        }
    }

    /// Append an item. Fails on a frozen list.
    pub fn push(
        &self,
        value: Value,
    ) -> RuntimeResult<()> {
        match &self.0 {
            ListRepr::Frozen(_) => Err(RuntimeError::ReadOnly("List is immutable".into())),
            ListRepr::Mutable(items) => {
                items.lock().push(value);
                Ok(())
            }
        }
    }

    /// Replace the item at `index`. Fails on a frozen list.
    pub fn set(
        &self,
        index: usize,
        value: Value,
    ) -> RuntimeResult<()> {
        match &self.0 {
            ListRepr::Frozen(_) => Err(RuntimeError::ReadOnly("List is immutable".into())),
            ListRepr::Mutable(items) => {
                let mut items = items.lock();
                let len = items.len();
                let slot = items
                    .get_mut(index)
                    .ok_or_else(|| RuntimeError::Arg(format!("index {} out of bounds ({})", index, len)))?;
                *slot = value;
                Ok(())
            }
        }
    }

    /// Copy the current items out of the list.
    pub fn to_vec(&self) -> Vec<Value> {
        match &self.0 {
            ListRepr::Frozen(items) => items.to_vec(),
            ListRepr::Mutable(items) => items.lock().clone(),
        }
    }

    /// Number of live handles to a mutable list (1 for frozen lists).
    pub(crate) fn handle_count(&self) -> usize {
        match &self.0 {
            ListRepr::Frozen(_) => 1,
            ListRepr::Mutable(items) => Arc::strong_count(items),
        }
    }

    fn addr(&self) -> usize {
        match &self.0 {
            ListRepr::Frozen(items) => Arc::as_ptr(items) as *const () as usize,
            ListRepr::Mutable(items) => Arc::as_ptr(items) as *const () as usize,
        }
    }
}

impl PartialEq for ListValue {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        match (&self.0, &other.0) {
            (ListRepr::Frozen(a), ListRepr::Frozen(b)) => a[..] == b[..],
            (ListRepr::Mutable(a), ListRepr::Mutable(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[derive(Clone)]
enum MapRepr {
    Frozen(Arc<MapEntries>),
    Mutable(Arc<Mutex<MapEntries>>),
}

/// Map value, either frozen or a shared mutable handle.
#[derive(Clone)]
pub struct MapValue(MapRepr);

impl MapValue {
    pub(crate) fn frozen(entries: MapEntries) -> Self {
        MapValue(MapRepr::Frozen(Arc::new(entries)))
    }

    fn mutable(entries: MapEntries) -> Self {
        MapValue(MapRepr::Mutable(Arc::new(Mutex::new(entries))))
    }

    /// Check if the map is frozen.
    #[inline]
    pub fn is_frozen(&self) -> bool {
        matches!(self.0, MapRepr::Frozen(_))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        match &self.0 {
            MapRepr::Frozen(entries) => entries.len(),
            MapRepr::Mutable(entries) => entries.lock().len(),
        }
    }

    /// Check if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a key
    pub fn get(
        &self,
        key: &Value,
    ) -> Option<Value> {
        match &self.0 {
            MapRepr::Frozen(entries) => entries.get(key).cloned(),
            MapRepr::Mutable(entries) => entries.lock().get(key).cloned(),
        }
    }

    /// Insert an entry, returning the previous value. Fails on a frozen map.
    pub fn insert(
        &self,
        key: Value,
        value: Value,
    ) -> RuntimeResult<Option<Value>> {
        match &self.0 {
            MapRepr::Frozen(_) => Err(RuntimeError::ReadOnly("Map is immutable".into())),
            MapRepr::Mutable(entries) => Ok(entries.lock().insert(key, value)),
        }
    }

    /// Copy the current entries out of the map.
    pub fn to_entries(&self) -> MapEntries {
        match &self.0 {
            MapRepr::Frozen(entries) => (**entries).clone(),
            MapRepr::Mutable(entries) => entries.lock().clone(),
        }
    }

    pub(crate) fn handle_count(&self) -> usize {
        match &self.0 {
            MapRepr::Frozen(_) => 1,
            MapRepr::Mutable(entries) => Arc::strong_count(entries),
        }
    }

    fn addr(&self) -> usize {
        match &self.0 {
            MapRepr::Frozen(entries) => Arc::as_ptr(entries) as *const () as usize,
            MapRepr::Mutable(entries) => Arc::as_ptr(entries) as *const () as usize,
        }
    }
}

impl PartialEq for MapValue {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        match (&self.0, &other.0) {
            (MapRepr::Frozen(a), MapRepr::Frozen(b)) => a == b,
            (MapRepr::Mutable(a), MapRepr::Mutable(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Object instance of a declared type.
///
/// Fields are stored in declaration order. Objects of an immutable type keep
/// their fields frozen.
#[derive(Clone, PartialEq)]
pub struct ObjectValue {
    ty: Arc<TypeDecl>,
    fields: ListValue,
}

impl ObjectValue {
    /// Object type
    #[inline]
    pub fn type_decl(&self) -> &Arc<TypeDecl> {
        &self.ty
    }

    /// Field by index
    pub fn field(
        &self,
        index: usize,
    ) -> Option<Value> {
        self.fields.get(index)
    }

    /// Set a field. Fails on instances of immutable types.
    pub fn set_field(
        &self,
        index: usize,
        value: Value,
    ) -> RuntimeResult<()> {
        if self.fields.is_frozen() {
            return Err(RuntimeError::ReadOnly(format!(
                "{} is immutable",
                self.ty.name()
            )));
        }
        self.fields.set(index, value)
    }

    /// Field values in declaration order
    pub fn fields(&self) -> Vec<Value> {
        self.fields.to_vec()
    }

    pub(crate) fn field_list(&self) -> &ListValue {
        &self.fields
    }
}

/// Body of a callable: receives the captured values and the call arguments.
pub type FuncBody = dyn Fn(&[Value], &[Value]) -> RuntimeResult<Value> + Send + Sync;

/// Callable value (body plus captured environment).
///
/// This is the "invoke with arguments" abstraction the scheduler uses; it
/// knows nothing about which worker runs it.
#[derive(Clone)]
pub struct FuncValue {
    body: Arc<FuncBody>,
    captures: Arc<[Value]>,
    immutable: bool,
}

impl FuncValue {
    /// Create a func without captured state.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&[Value]) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        Self::with_captures(Vec::new(), move |_, args| body(args))
    }

    /// Create a func closing over `captures`.
    pub fn with_captures<F>(
        captures: Vec<Value>,
        body: F,
    ) -> Self
    where
        F: Fn(&[Value], &[Value]) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        Self::from_parts(Arc::new(body), captures)
    }

    pub(crate) fn from_parts(
        body: Arc<FuncBody>,
        captures: Vec<Value>,
    ) -> Self {
        let immutable = captures.iter().all(Value::is_immutable);
        Self {
            body,
            captures: Arc::from(captures),
            immutable,
        }
    }

    /// Invoke the func.
    pub fn call(
        &self,
        args: &[Value],
    ) -> RuntimeResult<Value> {
        (self.body)(&self.captures, args)
    }

    /// Captured values
    #[inline]
    pub fn captures(&self) -> &[Value] {
        &self.captures
    }

    /// Whether every capture is immutable.
    #[inline]
    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    pub(crate) fn captures_handle_count(&self) -> usize {
        Arc::strong_count(&self.captures)
    }

    pub(crate) fn body(&self) -> &Arc<FuncBody> {
        &self.body
    }

    /// Identity comparison
    pub fn ptr_eq(
        &self,
        other: &Self,
    ) -> bool {
        self.addr() == other.addr() && Arc::ptr_eq(&self.captures, &other.captures)
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.body) as *const () as usize
    }
}

/// Runtime value - unified representation of values crossing actor boundaries
#[derive(Clone, Default)]
pub enum Value {
    /// Null
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Shared string
    Str(Arc<str>),
    /// Byte array
    Bytes(Arc<[u8]>),
    Duration(Duration),
    List(ListValue),
    Map(MapValue),
    Object(ObjectValue),
    Func(FuncValue),
    /// Explicit opt-out: the wrapped value is shared as-is and treated as
    /// immutable. The caller takes responsibility for its discipline.
    Unsafe(Arc<Value>),
}

// ============================================================================
// Construction
// ============================================================================

impl Value {
    /// Shared string
    pub fn str(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    /// Byte array
    pub fn bytes(b: &[u8]) -> Self {
        Value::Bytes(Arc::from(b))
    }

    /// New mutable list
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(ListValue::mutable(items))
    }

    /// New mutable map
    pub fn map(entries: MapEntries) -> Self {
        Value::Map(MapValue::mutable(entries))
    }

    /// Deeply frozen list; mutable items are converted or rejected.
    pub fn frozen_list(items: Vec<Value>) -> RuntimeResult<Self> {
        super::guard::to_immutable(Value::list(items))
    }

    /// Deeply frozen map; mutable keys or values are converted or rejected.
    pub fn frozen_map(entries: MapEntries) -> RuntimeResult<Self> {
        super::guard::to_immutable(Value::map(entries))
    }

    /// Instance of `ty`.
    ///
    /// Instances of types declared immutable must have immutable fields;
    /// a mutable field fails with `NotImmutable`.
    pub fn object(
        ty: Arc<TypeDecl>,
        fields: Vec<Value>,
    ) -> RuntimeResult<Self> {
        let fields = if ty.declares_immutable() {
            if let Some(index) = fields.iter().position(|f| !f.is_immutable()) {
                return Err(RuntimeError::NotImmutable(format!(
                    "{} field [{}] is {}",
                    ty.name(),
                    index,
                    fields[index].type_name()
                )));
            }
            ListValue::frozen(fields)
        } else {
            ListValue::mutable(fields)
        };
        Ok(Value::Object(ObjectValue { ty, fields }))
    }

    /// Callable value
    pub fn func<F>(body: F) -> Self
    where
        F: Fn(&[Value]) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        Value::Func(FuncValue::new(body))
    }

    /// Wrap a value so it is shared without an immutability check.
    pub fn unsafe_ref(value: Value) -> Self {
        Value::Unsafe(Arc::new(value))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<Duration> for Value {
    fn from(d: Duration) -> Self {
        Value::Duration(d)
    }
}

// ============================================================================
// Type Query Methods
// ============================================================================

impl Value {
    /// Mutability classification of this value.
    pub fn mutability(&self) -> Mutability {
        match self {
            Value::Null
            | Value::Bool(_)
            | Value::Int(_)
            | Value::Float(_)
            | Value::Str(_)
            | Value::Bytes(_)
            | Value::Duration(_) => Mutability::Scalar,
            Value::List(l) if l.is_frozen() => Mutability::Frozen,
            Value::Map(m) if m.is_frozen() => Mutability::Frozen,
            Value::List(_) | Value::Map(_) => Mutability::Mutable,
            Value::Object(o) if o.ty.declares_immutable() => Mutability::DeclaredImmutable,
            Value::Object(_) => Mutability::Mutable,
            Value::Func(f) if f.is_immutable() => Mutability::Frozen,
            Value::Func(_) => Mutability::Mutable,
            Value::Unsafe(_) => Mutability::DeclaredImmutable,
        }
    }

    /// Check if the value may be shared across contexts.
    #[inline]
    pub fn is_immutable(&self) -> bool {
        self.mutability().is_immutable()
    }

    /// Name of the value's type
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::Str(_) => "Str",
            Value::Bytes(_) => "Bytes",
            Value::Duration(_) => "Duration",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Object(o) => o.ty.name(),
            Value::Func(_) => "Func",
            Value::Unsafe(_) => "Unsafe",
        }
    }

    /// Check if the value is null
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert to bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert to i64
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Convert to f64
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Borrow string contents
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow list
    pub fn as_list(&self) -> Option<&ListValue> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Borrow map
    pub fn as_map(&self) -> Option<&MapValue> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Borrow object
    pub fn as_object(&self) -> Option<&ObjectValue> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Borrow func
    pub fn as_func(&self) -> Option<&FuncValue> {
        match self {
            Value::Func(f) => Some(f),
            _ => None,
        }
    }

    /// Unwrap an `Unsafe` wrapper
    pub fn as_unsafe(&self) -> Option<&Value> {
        match self {
            Value::Unsafe(inner) => Some(inner),
            _ => None,
        }
    }
}

// ============================================================================
// Equality and hashing
// ============================================================================

impl PartialEq for Value {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            // bit equality keeps Eq and Hash consistent (NaN == NaN)
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Duration(a), Value::Duration(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Func(a), Value::Func(b)) => a.ptr_eq(b),
            (Value::Unsafe(a), Value::Unsafe(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(
        &self,
        state: &mut H,
    ) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Duration(d) => d.hash(state),
            Value::List(l) => hash_list(l, state),
            // map equality ignores order, so only the size is hashed
            Value::Map(m) if m.is_frozen() => m.len().hash(state),
            Value::Map(m) => m.addr().hash(state),
            Value::Object(o) => {
                o.ty.hash(state);
                hash_list(&o.fields, state);
            }
            Value::Func(f) => f.addr().hash(state),
            Value::Unsafe(inner) => (Arc::as_ptr(inner) as usize).hash(state),
        }
    }
}

fn hash_list<H: Hasher>(
    list: &ListValue,
    state: &mut H,
) {
    match &list.0 {
        ListRepr::Frozen(items) => items[..].hash(state),
        ListRepr::Mutable(_) => list.addr().hash(state),
    }
}

// ============================================================================
// Display Implementation
// ============================================================================

impl fmt::Display for Value {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::Bytes(b) => write!(f, "bytes[{}]", b.len()),
            Value::Duration(d) => write!(f, "{:?}", d),
            Value::List(l) => {
                write!(
                    f,
                    "[{}]",
                    l.to_vec()
                        .iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
            Value::Map(m) => {
                write!(
                    f,
                    "[{}]",
                    m.to_entries()
                        .iter()
                        .map(|(k, v)| format!("{}: {}", k, v))
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
            Value::Object(o) => {
                write!(
                    f,
                    "{}{{ {} }}",
                    o.ty.name(),
                    o.fields()
                        .iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
            Value::Func(_) => write!(f, "|func|"),
            Value::Unsafe(inner) => write!(f, "unsafe({})", inner),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}({}, {:?})", self.type_name(), self, self.mutability())
    }
}
