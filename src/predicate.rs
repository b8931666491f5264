//! Type-aware predicate engine (C2).
//!
//! A predicate is `(field-path, operator, kind, value)`. Evaluation takes
//! the raw JSON bytes at the terminal path element and compares against the
//! typed literal — see spec.md §4.2.

use std::collections::HashMap;

use crate::error::FilterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Int,
    Int64,
    Float64,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(Operator::Eq),
            "neq" => Some(Operator::Neq),
            "lt" => Some(Operator::Lt),
            "le" => Some(Operator::Le),
            "gt" => Some(Operator::Gt),
            "ge" => Some(Operator::Ge),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Int(i32),
    Int64(i64),
    Float64(f64),
    Str(String),
}

/// A parsed, ready-to-evaluate predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    op: Operator,
    literal: Literal,
}

impl Predicate {
    /// The server-side field → kind converter map (§4.7 filter grammar).
    ///
    /// Ships with exactly the two entries the original server registered by
    /// default, plus the common tag-filter shortcut (§SPEC_FULL.md C2).
    pub fn default_converters() -> HashMap<String, Kind> {
        let mut m = HashMap::new();
        m.insert("ts".to_string(), Kind::Int64);
        m.insert("id".to_string(), Kind::String);
        m.insert("fields.tag.raw".to_string(), Kind::String);
        m
    }

    /// Parse `<field-path>:<op>:<value>`. `<value>` may itself contain `:`
    /// and is the join of all remaining segments.
    pub fn parse(filter: &str, converters: &HashMap<String, Kind>) -> Result<Self, FilterError> {
        let mut parts = filter.splitn(3, ':');
        let field = parts.next().filter(|s| !s.is_empty());
        let op_str = parts.next();
        let rest = parts.next();
        let (field, op_str, value) = match (field, op_str, rest) {
            (Some(f), Some(o), Some(v)) => (f, o, v),
            _ => return Err(FilterError::MissingComponents(filter.to_string())),
        };

        let kind = converters
            .get(field)
            .copied()
            .ok_or_else(|| FilterError::UnknownField(field.to_string()))?;

        let op = Operator::from_str(op_str)
            .ok_or_else(|| FilterError::InvalidOperator(op_str.to_string()))?;

        if kind == Kind::String && !matches!(op, Operator::Eq | Operator::Neq) {
            return Err(FilterError::InvalidStringOp);
        }

        let literal = match kind {
            Kind::Int => Literal::Int(
                value
                    .parse::<i32>()
                    .map_err(|_| FilterError::BadValue("int", value.to_string()))?,
            ),
            Kind::Int64 => Literal::Int64(
                value
                    .parse::<i64>()
                    .map_err(|_| FilterError::BadValue("int64", value.to_string()))?,
            ),
            Kind::Float64 => Literal::Float64(
                value
                    .parse::<f64>()
                    .map_err(|_| FilterError::BadValue("float64", value.to_string()))?,
            ),
            Kind::String => Literal::Str(value.to_string()),
        };

        Ok(Predicate {
            field: field.to_string(),
            op,
            literal,
        })
    }

    /// Build the synthetic `ts:ge:<v>` / `ts:le:<v>` predicate for the
    /// `start`/`end` query params.
    pub fn time_bound(
        op: &str,
        value: &str,
        converters: &HashMap<String, Kind>,
    ) -> Result<Self, FilterError> {
        Self::parse(&format!("ts:{}:{}", op, value), converters)
    }

    /// Evaluate against the raw JSON bytes at the terminal path element.
    /// A parse failure against the target numeric type is false, not an
    /// error — matches §4.2.
    pub fn check(&self, raw_json: &[u8]) -> bool {
        match &self.literal {
            Literal::Int(want) => parse_json_number::<i32>(raw_json)
                .map(|got| compare(got, *want, self.op))
                .unwrap_or(false),
            Literal::Int64(want) => parse_json_number::<i64>(raw_json)
                .map(|got| compare(got, *want, self.op))
                .unwrap_or(false),
            Literal::Float64(want) => parse_json_number::<f64>(raw_json)
                .map(|got| compare_f64(got, *want, self.op))
                .unwrap_or(false),
            Literal::Str(want) => match unquote_json_string(raw_json) {
                Some(got) => match self.op {
                    Operator::Eq => got == *want,
                    Operator::Neq => got != *want,
                    _ => false,
                },
                None => false,
            },
        }
    }
}

fn parse_json_number<T: std::str::FromStr>(raw_json: &[u8]) -> Option<T> {
    let text = std::str::from_utf8(raw_json).ok()?.trim();
    text.parse::<T>().ok()
}

fn compare<T: PartialOrd + PartialEq>(got: T, want: T, op: Operator) -> bool {
    match op {
        Operator::Eq => got == want,
        Operator::Neq => got != want,
        Operator::Lt => got < want,
        Operator::Le => got <= want,
        Operator::Gt => got > want,
        Operator::Ge => got >= want,
    }
}

fn compare_f64(got: f64, want: f64, op: Operator) -> bool {
    match op {
        Operator::Eq => got == want,
        Operator::Neq => got != want,
        Operator::Lt => got < want,
        Operator::Le => got <= want,
        Operator::Gt => got > want,
        Operator::Ge => got >= want,
    }
}

fn unquote_json_string(raw_json: &[u8]) -> Option<String> {
    serde_json::from_slice::<String>(raw_json).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let conv = Predicate::default_converters();
        let p = Predicate::parse("ts:ge:1000", &conv).unwrap();
        assert!(p.check(b"1500"));
        assert!(!p.check(b"500"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let conv = Predicate::default_converters();
        assert!(matches!(
            Predicate::parse("bogus:eq:1", &conv),
            Err(FilterError::UnknownField(_))
        ));
    }

    #[test]
    fn test_string_kind_rejects_order_ops() {
        let conv = Predicate::default_converters();
        assert!(matches!(
            Predicate::parse("id:gt:abc", &conv),
            Err(FilterError::InvalidStringOp)
        ));
    }

    #[test]
    fn test_string_eq() {
        let conv = Predicate::default_converters();
        let p = Predicate::parse("fields.tag.raw:eq:jzml", &conv).unwrap();
        assert!(p.check(br#""jzml""#));
        assert!(!p.check(br#""other""#));
    }

    #[test]
    fn test_value_containing_colon() {
        let conv = Predicate::default_converters();
        let p = Predicate::parse("id:eq:2024-01-01T00:00:00", &conv).unwrap();
        assert!(p.check(br#""2024-01-01T00:00:00""#));
    }

    #[test]
    fn test_bad_number_is_false_not_error() {
        let conv = Predicate::default_converters();
        let p = Predicate::parse("ts:eq:5", &conv).unwrap();
        assert!(!p.check(b"not-a-number"));
    }

    #[test]
    fn test_missing_components() {
        let conv = Predicate::default_converters();
        assert!(matches!(
            Predicate::parse("ts:eq", &conv),
            Err(FilterError::MissingComponents(_))
        ));
    }
}
