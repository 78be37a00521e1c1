//! Engine values.
//!
//! `JsValue` is the currency of the whole runtime: scope slots, object
//! property slots, the VM operand stack and the host-facing API all trade in
//! it. Numbers keep the integer/float split explicit so integer arithmetic
//! stays exact until a float enters the picture.

use crate::runner::ds::object::JsObjectRef;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

#[derive(Clone, Copy)]
pub enum JsNumberType {
    Integer(i64),
    Float(f64),
    NaN,
    PositiveInfinity,
    NegativeInfinity,
}

impl JsNumberType {
    /// Classify a raw float into the number variants.
    pub fn from_f64(f: f64) -> Self {
        if f.is_nan() {
            JsNumberType::NaN
        } else if f == f64::INFINITY {
            JsNumberType::PositiveInfinity
        } else if f == f64::NEG_INFINITY {
            JsNumberType::NegativeInfinity
        } else {
            JsNumberType::Float(f)
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            JsNumberType::Integer(i) => *i as f64,
            JsNumberType::Float(f) => *f,
            JsNumberType::NaN => f64::NAN,
            JsNumberType::PositiveInfinity => f64::INFINITY,
            JsNumberType::NegativeInfinity => f64::NEG_INFINITY,
        }
    }

    /// Collapse floats holding integral values back into integers.
    /// Applied to results crossing the host boundary.
    pub fn normalized(self) -> Self {
        match self {
            JsNumberType::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e18 => {
                JsNumberType::Integer(f as i64)
            }
            other => other,
        }
    }

    /// ToInt32 for the bitwise and shift operators.
    pub fn to_i32(&self) -> i32 {
        match self {
            JsNumberType::Integer(i) => *i as i32,
            JsNumberType::Float(f) => {
                if f.is_finite() {
                    (*f as i64) as i32
                } else {
                    0
                }
            }
            _ => 0,
        }
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, JsNumberType::NaN)
    }
}

impl PartialEq for JsNumberType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (JsNumberType::NaN, _) | (_, JsNumberType::NaN) => false,
            (JsNumberType::PositiveInfinity, JsNumberType::PositiveInfinity) => true,
            (JsNumberType::NegativeInfinity, JsNumberType::NegativeInfinity) => true,
            (JsNumberType::Integer(a), JsNumberType::Integer(b)) => a == b,
            _ => self.as_f64() == other.as_f64(),
        }
    }
}

impl Display for JsNumberType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            JsNumberType::Integer(i) => write!(f, "{}", i),
            JsNumberType::Float(v) => write!(f, "{}", v),
            JsNumberType::NaN => write!(f, "NaN"),
            JsNumberType::PositiveInfinity => write!(f, "Infinity"),
            JsNumberType::NegativeInfinity => write!(f, "-Infinity"),
        }
    }
}

impl Debug for JsNumberType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

pub enum JsValue {
    Undefined,
    Null,
    Boolean(bool),
    String(String),
    Number(JsNumberType),
    Object(JsObjectRef),
}

impl JsValue {
    pub fn from_i64(i: i64) -> Self {
        JsValue::Number(JsNumberType::Integer(i))
    }

    pub fn from_f64(f: f64) -> Self {
        JsValue::Number(JsNumberType::from_f64(f))
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            JsValue::Undefined => "undefined",
            JsValue::Null => "object",
            JsValue::Boolean(_) => "boolean",
            JsValue::String(_) => "string",
            JsValue::Number(_) => "number",
            JsValue::Object(o) => {
                if o.borrow().is_callable() {
                    "function"
                } else {
                    "object"
                }
            }
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            JsValue::Undefined | JsValue::Null => false,
            JsValue::Boolean(b) => *b,
            JsValue::String(s) => !s.is_empty(),
            JsValue::Number(n) => match n {
                JsNumberType::Integer(i) => *i != 0,
                JsNumberType::Float(f) => *f != 0.0,
                JsNumberType::NaN => false,
                _ => true,
            },
            JsValue::Object(_) => true,
        }
    }

    /// ToNumber, as far as the engine subset needs it.
    pub fn to_number(&self) -> JsNumberType {
        match self {
            JsValue::Undefined => JsNumberType::NaN,
            JsValue::Null => JsNumberType::Integer(0),
            JsValue::Boolean(b) => JsNumberType::Integer(if *b { 1 } else { 0 }),
            JsValue::Number(n) => *n,
            JsValue::String(s) => {
                let t = s.trim();
                if t.is_empty() {
                    JsNumberType::Integer(0)
                } else if let Ok(i) = t.parse::<i64>() {
                    JsNumberType::Integer(i)
                } else if let Ok(f) = t.parse::<f64>() {
                    JsNumberType::from_f64(f)
                } else {
                    JsNumberType::NaN
                }
            }
            JsValue::Object(_) => JsNumberType::NaN,
        }
    }

    /// String form used by `+` concatenation and host display.
    pub fn to_display_string(&self) -> String {
        match self {
            JsValue::Undefined => "undefined".to_string(),
            JsValue::Null => "null".to_string(),
            JsValue::Boolean(b) => b.to_string(),
            JsValue::String(s) => s.clone(),
            JsValue::Number(n) => n.to_string(),
            JsValue::Object(o) => {
                if o.borrow().is_callable() {
                    "function".to_string()
                } else {
                    "[object Object]".to_string()
                }
            }
        }
    }

    /// `===` — no coercion, objects compare by reference.
    pub fn strict_equals(&self, other: &JsValue) -> bool {
        match (self, other) {
            (JsValue::Undefined, JsValue::Undefined) => true,
            (JsValue::Null, JsValue::Null) => true,
            (JsValue::Boolean(a), JsValue::Boolean(b)) => a == b,
            (JsValue::String(a), JsValue::String(b)) => a == b,
            (JsValue::Number(a), JsValue::Number(b)) => a == b,
            (JsValue::Object(a), JsValue::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `==` for the subset: undefined/null pair up, numbers, strings and
    /// booleans coerce numerically, everything else is strict equality.
    pub fn loose_equals(&self, other: &JsValue) -> bool {
        match (self, other) {
            (JsValue::Undefined, JsValue::Null) | (JsValue::Null, JsValue::Undefined) => true,
            (JsValue::Number(_), JsValue::String(_))
            | (JsValue::String(_), JsValue::Number(_))
            | (JsValue::Boolean(_), JsValue::Number(_))
            | (JsValue::Number(_), JsValue::Boolean(_))
            | (JsValue::Boolean(_), JsValue::String(_))
            | (JsValue::String(_), JsValue::Boolean(_)) => self.to_number() == other.to_number(),
            _ => self.strict_equals(other),
        }
    }

    /// Normalization applied before a value crosses back to the host.
    pub fn normalized(self) -> JsValue {
        match self {
            JsValue::Number(n) => JsValue::Number(n.normalized()),
            other => other,
        }
    }
}

impl Clone for JsValue {
    fn clone(&self) -> Self {
        match self {
            JsValue::Undefined => JsValue::Undefined,
            JsValue::Null => JsValue::Null,
            JsValue::Boolean(b) => JsValue::Boolean(*b),
            JsValue::String(s) => JsValue::String(s.clone()),
            JsValue::Number(n) => JsValue::Number(*n),
            JsValue::Object(o) => JsValue::Object(o.clone()),
        }
    }
}

impl PartialEq for JsValue {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

impl Display for JsValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            JsValue::String(s) => write!(f, "\"{}\"", s),
            other => write!(f, "{}", other.to_display_string()),
        }
    }
}

impl Debug for JsValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

/// Numeric binary operators shared by the VM.
pub mod arith {
    use super::JsNumberType;

    pub fn add(a: JsNumberType, b: JsNumberType) -> JsNumberType {
        match (a, b) {
            (JsNumberType::Integer(x), JsNumberType::Integer(y)) => match x.checked_add(y) {
                Some(v) => JsNumberType::Integer(v),
                None => JsNumberType::from_f64(x as f64 + y as f64),
            },
            _ => JsNumberType::from_f64(a.as_f64() + b.as_f64()),
        }
    }

    pub fn sub(a: JsNumberType, b: JsNumberType) -> JsNumberType {
        match (a, b) {
            (JsNumberType::Integer(x), JsNumberType::Integer(y)) => match x.checked_sub(y) {
                Some(v) => JsNumberType::Integer(v),
                None => JsNumberType::from_f64(x as f64 - y as f64),
            },
            _ => JsNumberType::from_f64(a.as_f64() - b.as_f64()),
        }
    }

    pub fn mul(a: JsNumberType, b: JsNumberType) -> JsNumberType {
        match (a, b) {
            (JsNumberType::Integer(x), JsNumberType::Integer(y)) => match x.checked_mul(y) {
                Some(v) => JsNumberType::Integer(v),
                None => JsNumberType::from_f64(x as f64 * y as f64),
            },
            _ => JsNumberType::from_f64(a.as_f64() * b.as_f64()),
        }
    }

    pub fn div(a: JsNumberType, b: JsNumberType) -> JsNumberType {
        match (a, b) {
            (JsNumberType::Integer(x), JsNumberType::Integer(y)) if y != 0 && x % y == 0 => {
                JsNumberType::Integer(x / y)
            }
            _ => JsNumberType::from_f64(a.as_f64() / b.as_f64()),
        }
    }

    pub fn rem(a: JsNumberType, b: JsNumberType) -> JsNumberType {
        match (a, b) {
            (JsNumberType::Integer(x), JsNumberType::Integer(y)) if y != 0 => {
                JsNumberType::Integer(x % y)
            }
            _ => JsNumberType::from_f64(a.as_f64() % b.as_f64()),
        }
    }

    pub fn neg(a: JsNumberType) -> JsNumberType {
        match a {
            JsNumberType::Integer(i) => match i.checked_neg() {
                Some(v) => JsNumberType::Integer(v),
                None => JsNumberType::from_f64(-(i as f64)),
            },
            JsNumberType::Float(f) => JsNumberType::Float(-f),
            JsNumberType::NaN => JsNumberType::NaN,
            JsNumberType::PositiveInfinity => JsNumberType::NegativeInfinity,
            JsNumberType::NegativeInfinity => JsNumberType::PositiveInfinity,
        }
    }

    /// Less-than; `None` when either side is NaN.
    pub fn lt(a: JsNumberType, b: JsNumberType) -> Option<bool> {
        if a.is_nan() || b.is_nan() {
            None
        } else {
            Some(a.as_f64() < b.as_f64())
        }
    }
}
