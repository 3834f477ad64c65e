//! Runtime values.
//!
//! Arrays and maps are reference-like: cloning a [`Value::Array`] or
//! [`Value::Map`] copies the handle, not the contents, so mutation through
//! any alias is observable through all aliases (spec.md §3). Text is
//! deduplicated through the process-wide interner in [`crate::intern`].
//!
//! The original C++ VM pools array/map allocations through a custom
//! `shared_ptr` deleter that returns freed storage to a process-wide pool.
//! Rust's `Rc` has no equivalent custom-deleter hook, so this crate simply
//! allocates a fresh `Rc<RefCell<_>>` per container; see DESIGN.md for the
//! tradeoff.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::bytecode::Instruction;
use crate::intern::intern;

pub type Array = Rc<RefCell<Vec<Value>>>;
/// Maps preserve insertion order (iteration order of `keys()`/`values()` is
/// explicitly unordered per spec.md, but a stable backing order makes the
/// VM and its tests deterministic without over-specifying behavior callers
/// must not depend on).
pub type Map = Rc<RefCell<Vec<(Arc<str>, Value)>>>;
pub type Function = Rc<FunctionObject>;

/// An immutable, already-compiled function.
#[derive(Debug)]
pub struct FunctionObject {
    pub name: String,
    pub params: Vec<String>,
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone)]
pub enum Value {
    Sol,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(Arc<str>),
    Array(Array),
    Map(Map),
    Function(Function),
}

impl Value {
    pub fn text(s: impl AsRef<str>) -> Value {
        Value::Str(intern(s.as_ref()))
    }

    pub fn new_array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn new_map(pairs: Vec<(Arc<str>, Value)>) -> Value {
        Value::Map(Rc::new(RefCell::new(pairs)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Sol => "sol",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Function(_) => "function",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Sol => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::UInt(u) => *u != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Array(a) => !a.borrow().is_empty(),
            Value::Map(m) => !m.borrow().is_empty(),
            Value::Function(_) => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::UInt(u) => Some(*u as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::UInt(u) => Some(*u as i64),
            Value::Bool(b) => Some(if *b { 1 } else { 0 }),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::UInt(_) | Value::Float(_))
    }

    /// Stable hexadecimal identity, per spec.md §4.5 `id(x)`.
    ///
    /// For containers and functions this is the address of the shared
    /// allocation; for value-shaped types it is the address of a
    /// stack-local copy, which is only meaningful for comparing the *same*
    /// stack position (as documented in spec.md).
    pub fn identity(&self) -> String {
        match self {
            Value::Array(a) => format!("{:#x}", Rc::as_ptr(a) as usize),
            Value::Map(m) => format!("{:#x}", Rc::as_ptr(m) as usize),
            Value::Function(f) => format!("{:#x}", Rc::as_ptr(f) as usize),
            other => format!("{:#x}", other as *const Value as usize),
        }
    }

    /// Convert a value into the deterministic text form used as a map key,
    /// per spec.md §3: numeric literals use canonical decimal, booleans use
    /// "true"/"false", text passes through unchanged.
    pub fn to_key_text(&self) -> Arc<str> {
        match self {
            Value::Str(s) => Arc::clone(s),
            Value::Int(i) => intern(&i.to_string()),
            Value::UInt(u) => intern(&u.to_string()),
            Value::Float(f) => intern(&format_float(*f)),
            Value::Bool(b) => intern(if *b { "true" } else { "false" }),
            Value::Sol => intern("sol"),
            other => intern(&other.to_print_string()),
        }
    }

    /// Human-readable form used by `print`/string concatenation/interpolation.
    pub fn to_print_string(&self) -> String {
        match self {
            Value::Sol => "sol".to_string(),
            Value::Bool(b) => if *b { "true".to_string() } else { "false".to_string() },
            Value::Int(i) => i.to_string(),
            Value::UInt(u) => u.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => s.to_string(),
            Value::Array(a) => {
                let items = a.borrow();
                let inner: Vec<String> = items.iter().map(|v| v.to_debug_string()).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Map(m) => {
                let pairs = m.borrow();
                let inner: Vec<String> =
                    pairs.iter().map(|(k, v)| format!("\"{}\": {}", k, v.to_debug_string())).collect();
                format!("{{{}}}", inner.join(", "))
            }
            Value::Function(f) => format!("<function {}>", f.name),
        }
    }

    /// Like `to_print_string` but quotes strings, used when printing a
    /// string nested inside an array or map.
    fn to_debug_string(&self) -> String {
        match self {
            Value::Str(s) => format!("\"{}\"", s),
            other => other.to_print_string(),
        }
    }
}

/// Canonical float formatting: integral floats print without a trailing
/// `.0` suffix being dropped — Linh always shows at least one decimal digit
/// so `1.0` and `1` remain visually distinct types.
pub fn format_float(f: f64) -> String {
    if f.is_infinite() {
        return if f > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if f.is_nan() {
        return "nan".to_string();
    }
    if f == f.trunc() && f.abs() < 1e15 {
        format!("{:.1}", f)
    } else {
        format!("{f}")
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Sol, Value::Sol) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::UInt(b)) | (Value::UInt(b), Value::Int(a)) => {
                *a >= 0 && *a as u64 == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_print_string())
    }
}
