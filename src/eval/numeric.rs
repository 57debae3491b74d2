//! The numeric contract shared by truthiness and every operator.
//!
//! Integer parsing is always attempted before float parsing. Surrounding
//! ASCII whitespace is ignored; non-finite floats ("inf", "NaN") do not
//! count as numbers.

/// A scalar that parsed as a number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    pub fn as_f64(self) -> f64 {
        match self {
            Numeric::Int(v) => v as f64,
            Numeric::Float(v) => v,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Numeric::Int(v) => v == 0,
            Numeric::Float(v) => v == 0.0,
        }
    }
}

pub const NAN: &str = "NaN";

pub fn parse_int(s: &str) -> Option<i64> {
    s.trim_ascii().parse::<i64>().ok()
}

pub fn parse_float(s: &str) -> Option<f64> {
    s.trim_ascii().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_numeric(s: &str) -> Option<Numeric> {
    parse_int(s)
        .map(Numeric::Int)
        .or_else(|| parse_float(s).map(Numeric::Float))
}

/// Empty is false, a number equal to zero is false, anything else is true.
pub fn is_truthy(s: &str) -> bool {
    !s.is_empty() && parse_numeric(s).is_none_or(|n| !n.is_zero())
}

pub fn format_int(v: i64) -> String {
    v.to_string()
}

pub fn format_float(v: f64) -> String {
    if v.is_finite() { v.to_string() } else { NAN.to_string() }
}

pub fn format_numeric(n: Numeric) -> String {
    match n {
        Numeric::Int(v) => format_int(v),
        Numeric::Float(v) => format_float(v),
    }
}

pub fn bool_scalar(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}
