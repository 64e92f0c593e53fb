//! Lua Value Types
//!
//! This module defines the values that live on the shared stack and the
//! heap objects they point at.

use super::error::LuaResult;
use super::handle::{FunctionHandle, StringHandle, TableHandle, ThreadHandle, UserDataHandle};
use super::state::LuaState;
use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

/// Type representing a native function callable from the VM.
///
/// The function sees its arguments at stack indices `1..=top()` and returns
/// how many values on top of its frame are results.
pub type NativeFunction = fn(&mut LuaState) -> LuaResult<i32>;

/// Registry-assigned identifier of a user type
pub type TypeId = u8;

/// First type id handed out by `create_metatable`
pub const FIRST_USER_TYPE: TypeId = 11;

/// Three-component vector
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Vector { x, y, z }
    }
}

/// Three-component angle (pitch, yaw, roll)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Angle {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Angle {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Angle { x, y, z }
    }
}

/// Main Lua value type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// Nil value
    Nil,

    /// Boolean value
    Boolean(bool),

    /// Number value (all numbers are doubles)
    Number(f64),

    /// Interned string
    String(StringHandle),

    /// Table
    Table(TableHandle),

    /// Native function, possibly with upvalues
    Function(FunctionHandle),

    /// Full userdata wrapping a native pointer
    UserData(UserDataHandle),

    /// Bare native pointer, compared by address
    LightUserData(*mut c_void),

    /// Vector value
    Vector(Vector),

    /// Angle value
    Angle(Angle),

    /// Thread
    Thread(ThreadHandle),
}

impl Value {
    /// Check if this value is nil
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Check if this value is falsey (nil or false)
    pub fn is_falsey(&self) -> bool {
        matches!(self, Value::Nil | Value::Boolean(false))
    }

    /// Builtin type tag. Userdata report `Type::UserData`; the heap knows
    /// their registered id.
    pub fn base_type(&self) -> Type {
        match self {
            Value::Nil => Type::Nil,
            Value::Boolean(_) => Type::Bool,
            Value::Number(_) => Type::Number,
            Value::String(_) => Type::String,
            Value::Table(_) => Type::Table,
            Value::Function(_) => Type::Function,
            Value::UserData(_) => Type::UserData,
            Value::LightUserData(_) => Type::LightUserData,
            Value::Vector(_) => Type::Vector,
            Value::Angle(_) => Type::Angle,
            Value::Thread(_) => Type::Thread,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", number_to_string(*n)),
            Value::String(_) => write!(f, "<string>"),
            Value::Table(_) => write!(f, "<table>"),
            Value::Function(_) => write!(f, "<function>"),
            Value::UserData(_) => write!(f, "<userdata>"),
            Value::LightUserData(p) => write!(f, "<userdata: {:p}>", p),
            Value::Vector(v) => write!(f, "{} {} {}", v.x, v.y, v.z),
            Value::Angle(a) => write!(f, "{} {} {}", a.x, a.y, a.z),
            Value::Thread(_) => write!(f, "<thread>"),
        }
    }
}

/// Type tags as seen by native code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// No value (invalid stack index)
    None,
    Nil,
    Bool,
    LightUserData,
    Number,
    String,
    Table,
    Function,
    UserData,
    Thread,
    Vector,
    Angle,
    /// A type registered through `create_metatable`
    User(TypeId),
}

impl Type {
    /// Numeric tag
    pub fn code(&self) -> i32 {
        match self {
            Type::None => -1,
            Type::Nil => 0,
            Type::Bool => 1,
            Type::LightUserData => 2,
            Type::Number => 3,
            Type::String => 4,
            Type::Table => 5,
            Type::Function => 6,
            Type::UserData => 7,
            Type::Thread => 8,
            Type::Vector => 9,
            Type::Angle => 10,
            Type::User(id) => *id as i32,
        }
    }

    /// Tag for a numeric code; codes outside every known range map to `None`
    pub fn from_code(code: i32) -> Type {
        match code {
            0 => Type::Nil,
            1 => Type::Bool,
            2 => Type::LightUserData,
            3 => Type::Number,
            4 => Type::String,
            5 => Type::Table,
            6 => Type::Function,
            7 => Type::UserData,
            8 => Type::Thread,
            9 => Type::Vector,
            10 => Type::Angle,
            c if c >= FIRST_USER_TYPE as i32 && c <= TypeId::MAX as i32 => Type::User(c as TypeId),
            _ => Type::None,
        }
    }

    /// Name of a builtin type. User types have no builtin name.
    pub fn name(&self) -> Option<&'static str> {
        let name = match self {
            Type::None => "no value",
            Type::Nil => "nil",
            Type::Bool => "boolean",
            Type::LightUserData | Type::UserData => "userdata",
            Type::Number => "number",
            Type::String => "string",
            Type::Table => "table",
            Type::Function => "function",
            Type::Thread => "thread",
            Type::Vector => "Vector",
            Type::Angle => "Angle",
            Type::User(_) => return None,
        };
        Some(name)
    }
}

/// Interned byte string
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LuaString {
    /// Raw bytes of the string
    pub bytes: Vec<u8>,
}

impl LuaString {
    /// Create a new Lua string from raw bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        LuaString { bytes }
    }

    /// Get the bytes of this string
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Get the length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if this string is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<&str> for LuaString {
    fn from(s: &str) -> Self {
        LuaString::from_bytes(s.as_bytes().to_vec())
    }
}

/// Native function object with its upvalues
#[derive(Debug, Clone)]
pub struct Function {
    /// Entry point
    pub func: NativeFunction,

    /// Upvalues, addressed from inside the function by `upvalue_index(n)`
    pub upvalues: Vec<Value>,
}

/// Userdata slot.
///
/// The pointee belongs to native code; this slot only borrows it. A `None`
/// data pointer marks a handle invalidated with `set_user_type(pos, null)`.
#[derive(Debug, Clone)]
pub struct UserData {
    /// Native pointer, `None` once invalidated
    pub data: Option<NonNull<c_void>>,

    /// Registered type id
    pub type_id: TypeId,

    /// Per-value metatable
    pub metatable: Option<TableHandle>,
}

/// Thread object. Only the main thread exists; coroutine scheduling
/// belongs to the execution engine.
#[derive(Debug, Clone, Default)]
pub struct LuaThread;

/// Convert a string to a number the way the VM coerces operands:
/// surrounding whitespace is ignored and `0x` hexadecimal integers are
/// accepted.
pub fn str_to_number(bytes: &[u8]) -> Option<f64> {
    let s = std::str::from_utf8(bytes).ok()?.trim();
    if s.is_empty() {
        return None;
    }

    let (negative, digits) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        let n = u64::from_str_radix(hex, 16).ok()? as f64;
        return Some(if negative { -n } else { n });
    }

    s.parse::<f64>().ok()
}

/// Format a number like `%.14g`
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return if n.is_sign_negative() { "-nan".to_string() } else { "nan".to_string() };
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if n == 0.0 {
        return if n.is_sign_negative() { "-0".to_string() } else { "0".to_string() };
    }

    const PRECISION: i32 = 14;

    // The exponent is taken after rounding to PRECISION digits, so values
    // that round up to the next power of ten switch layout like printf.
    let scientific = format!("{:.*e}", (PRECISION - 1) as usize, n);
    let (mantissa, exp) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let exponent: i32 = exp.parse().unwrap_or(0);

    if exponent < -4 || exponent >= PRECISION {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exponent.abs())
    } else {
        let decimals = (PRECISION - 1 - exponent) as usize;
        trim_fraction(&format!("{:.*}", decimals, n)).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
