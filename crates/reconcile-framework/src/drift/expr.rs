//! Transform expressions.
//!
//! A small JSONata-flavoured language used by schemas to describe how the remote side
//! normalizes a declared value, e.g. `$lowercase(DBClusterIdentifier)`,
//! `BoolProperty or true` or `EngineVersion & ".*"`.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr      := or ( '?' expr ( ':' expr )? )?
//! or        := and ( 'or' and )*
//! and       := compare ( 'and' compare )*
//! compare   := concat ( ( '=' | '!=' | '<' | '<=' | '>' | '>=' ) concat )?
//! concat    := primary ( '&' primary )*
//! primary   := string | number | 'true' | 'false' | 'null'
//!            | '$' name '(' args ')' | '[' args ']' | '(' expr ')' | path
//! path      := name ( '.' name )*        name := identifier | `quoted name`
//! ```
//!
//! Evaluation follows JSONata's "undefined" rules: a path that does not resolve yields no
//! value rather than an error.

use crate::error::FrameworkError;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while},
    character::complete::{char, multispace0, satisfy},
    combinator::{all_consuming, map, map_res, not, opt, recognize, value, verify},
    multi::{many0, separated_list0, separated_list1},
    number::complete::recognize_float,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

const KEYWORDS: [&str; 5] = ["and", "or", "true", "false", "null"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Concat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(Vec<String>),
    Array(Vec<Expr>),
    Call {
        function: String,
        args: Vec<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Condition {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
}

/// A compiled transform expression.
#[derive(Clone, PartialEq)]
pub struct Transform {
    source: String,
    expr: Expr,
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transform({:?})", self.source)
    }
}

impl Transform {
    pub fn compile(source: &str) -> Result<Self, FrameworkError> {
        let invalid = |reason: String| FrameworkError::InvalidExpression {
            expression: source.to_string(),
            reason,
        };
        let (_, expr) = all_consuming(expression)(source.trim()).map_err(|e| invalid(e.to_string()))?;
        check_calls(&expr).map_err(invalid)?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Evaluates against `root`; `None` means the expression is undefined there.
    pub fn evaluate(&self, root: &Value) -> Option<Value> {
        eval(&self.expr, root)
    }
}

impl FromStr for Transform {
    type Err = FrameworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Transform::compile(s)
    }
}

// =============================================================================
// PARSER
// =============================================================================

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag(word), not(satisfy(is_name_char)))
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_alphabetic() || c == '_'),
        take_while(is_name_char),
    ))(input)
}

fn name(input: &str) -> IResult<&str, String> {
    alt((
        map(delimited(char('`'), take_until("`"), char('`')), String::from),
        map(
            verify(identifier, |s: &str| !KEYWORDS.contains(&s)),
            String::from,
        ),
    ))(input)
}

fn quoted<'a>(quote: char) -> impl FnMut(&'a str) -> IResult<&'a str, String> {
    move |input: &'a str| {
        let (input, _) = char(quote)(input)?;
        let mut out = String::new();
        let mut chars = input.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                c if c == quote => return Ok((&input[i + c.len_utf8()..], out)),
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, escaped)) => out.push(escaped),
                    None => break,
                },
                c => out.push(c),
            }
        }
        Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Char,
        )))
    }
}

fn string_literal(input: &str) -> IResult<&str, Expr> {
    map(alt((quoted('"'), quoted('\''))), |s| {
        Expr::Literal(Value::String(s))
    })(input)
}

fn number_literal(input: &str) -> IResult<&str, Expr> {
    map_res(recognize_float, |raw: &str| {
        raw.parse::<f64>().map(|n| Expr::Literal(number_value(n)))
    })(input)
}

fn constant(input: &str) -> IResult<&str, Expr> {
    alt((
        value(Expr::Literal(Value::Bool(true)), keyword("true")),
        value(Expr::Literal(Value::Bool(false)), keyword("false")),
        value(Expr::Literal(Value::Null), keyword("null")),
    ))(input)
}

fn arguments<'a>(open: char, close: char) -> impl FnMut(&'a str) -> IResult<&'a str, Vec<Expr>> {
    move |input: &'a str| {
        delimited(
            ws(char(open)),
            separated_list0(ws(char(',')), expression),
            ws(char(close)),
        )(input)
    }
}

fn call(input: &str) -> IResult<&str, Expr> {
    map(
        pair(preceded(char('$'), identifier), arguments('(', ')')),
        |(function, args)| Expr::Call {
            function: function.to_string(),
            args,
        },
    )(input)
}

fn array(input: &str) -> IResult<&str, Expr> {
    map(arguments('[', ']'), Expr::Array)(input)
}

fn path(input: &str) -> IResult<&str, Expr> {
    map(separated_list1(ws(char('.')), name), Expr::Path)(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        string_literal,
        number_literal,
        constant,
        call,
        array,
        delimited(char('('), expression, char(')')),
        path,
    )))(input)
}

fn fold_left(first: Expr, rest: Vec<(BinaryOp, Expr)>) -> Expr {
    rest.into_iter().fold(first, |lhs, (op, rhs)| Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

fn concat(input: &str) -> IResult<&str, Expr> {
    let (input, first) = primary(input)?;
    let (input, rest) = many0(map(preceded(ws(char('&')), primary), |rhs| {
        (BinaryOp::Concat, rhs)
    }))(input)?;
    Ok((input, fold_left(first, rest)))
}

fn compare_op(input: &str) -> IResult<&str, BinaryOp> {
    ws(alt((
        value(BinaryOp::Ne, tag("!=")),
        value(BinaryOp::Le, tag("<=")),
        value(BinaryOp::Ge, tag(">=")),
        value(BinaryOp::Eq, tag("=")),
        value(BinaryOp::Lt, tag("<")),
        value(BinaryOp::Gt, tag(">")),
    )))(input)
}

fn compare(input: &str) -> IResult<&str, Expr> {
    let (input, lhs) = concat(input)?;
    let (input, rhs) = opt(pair(compare_op, concat))(input)?;
    Ok((input, fold_left(lhs, rhs.into_iter().collect())))
}

fn and(input: &str) -> IResult<&str, Expr> {
    let (input, first) = compare(input)?;
    let (input, rest) = many0(map(preceded(ws(keyword("and")), compare), |rhs| {
        (BinaryOp::And, rhs)
    }))(input)?;
    Ok((input, fold_left(first, rest)))
}

fn or(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and(input)?;
    let (input, rest) = many0(map(preceded(ws(keyword("or")), and), |rhs| {
        (BinaryOp::Or, rhs)
    }))(input)?;
    Ok((input, fold_left(first, rest)))
}

fn expression(input: &str) -> IResult<&str, Expr> {
    let (input, test) = or(input)?;
    let (input, branches) = opt(tuple((
        preceded(ws(char('?')), expression),
        opt(preceded(ws(char(':')), expression)),
    )))(input)?;
    let expr = match branches {
        Some((then, otherwise)) => Expr::Condition {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: otherwise.map(Box::new),
        },
        None => test,
    };
    Ok((input, expr))
}

/// Parses and checks `source`, returning the bare tree.
pub fn parse(source: &str) -> Result<Expr, FrameworkError> {
    Transform::compile(source).map(|t| t.expr)
}

// =============================================================================
// FUNCTIONS
// =============================================================================

/// Known functions with their (min, max) arity.
const FUNCTIONS: [(&str, usize, usize); 12] = [
    ("lowercase", 1, 1),
    ("uppercase", 1, 1),
    ("string", 1, 1),
    ("number", 1, 1),
    ("boolean", 1, 1),
    ("not", 1, 1),
    ("exists", 1, 1),
    ("join", 1, 2),
    ("substring", 2, 3),
    ("length", 1, 1),
    ("contains", 2, 2),
    ("trim", 1, 1),
];

fn check_calls(expr: &Expr) -> Result<(), String> {
    match expr {
        Expr::Literal(_) | Expr::Path(_) => Ok(()),
        Expr::Array(items) => items.iter().try_for_each(check_calls),
        Expr::Call { function, args } => {
            let Some((_, min, max)) = FUNCTIONS.iter().find(|(f, _, _)| *f == function.as_str()) else {
                return Err(format!("unknown function ${function}"));
            };
            if args.len() < *min || args.len() > *max {
                return Err(format!(
                    "${function} takes {min}..={max} arguments, got {}",
                    args.len()
                ));
            }
            args.iter().try_for_each(check_calls)
        }
        Expr::Binary { lhs, rhs, .. } => {
            check_calls(lhs)?;
            check_calls(rhs)
        }
        Expr::Condition {
            test,
            then,
            otherwise,
        } => {
            check_calls(test)?;
            check_calls(then)?;
            otherwise.as_deref().map_or(Ok(()), check_calls)
        }
    }
}

fn call_function(function: &str, args: &[Expr], root: &Value) -> Option<Value> {
    let arg = |i: usize| args.get(i).and_then(|a| eval(a, root));
    match function {
        "lowercase" => arg(0).map(|v| Value::String(to_string(&v).to_lowercase())),
        "uppercase" => arg(0).map(|v| Value::String(to_string(&v).to_uppercase())),
        "string" => arg(0).map(|v| Value::String(to_string(&v))),
        "number" => arg(0).and_then(|v| to_number(&v)).map(number_value),
        "boolean" => arg(0).map(|v| Value::Bool(to_boolean(Some(&v)))),
        "not" => Some(Value::Bool(!to_boolean(arg(0).as_ref()))),
        "exists" => Some(Value::Bool(arg(0).is_some())),
        "join" => {
            let items = match arg(0)? {
                Value::Array(items) => items,
                single => vec![single],
            };
            let separator = arg(1).map(|s| to_string(&s)).unwrap_or_default();
            let parts: Vec<String> = items.iter().map(to_string).collect();
            Some(Value::String(parts.join(&separator)))
        }
        "substring" => {
            let text: Vec<char> = to_string(&arg(0)?).chars().collect();
            let len = text.len() as i64;
            let integer = |v: &Value| to_number(v).filter(|n| n.is_finite()).map(|n| n as i64);
            let start = integer(&arg(1)?)?;
            let start = if start < 0 {
                len.saturating_add(start).max(0)
            } else {
                start.min(len)
            };
            let end = match arg(2) {
                Some(count) => start.saturating_add(integer(&count)?.max(0)).min(len),
                None => len,
            };
            Some(Value::String(
                text[start as usize..end as usize].iter().collect(),
            ))
        }
        "length" => arg(0).map(|v| Value::from(to_string(&v).chars().count() as u64)),
        "contains" => {
            let haystack = to_string(&arg(0)?);
            let needle = to_string(&arg(1)?);
            Some(Value::Bool(haystack.contains(&needle)))
        }
        "trim" => arg(0).map(|v| {
            Value::String(
                to_string(&v)
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" "),
            )
        }),
        _ => None,
    }
}

// =============================================================================
// EVALUATION
// =============================================================================

fn eval(expr: &Expr, root: &Value) -> Option<Value> {
    match expr {
        Expr::Literal(v) => Some(v.clone()),
        Expr::Path(segments) => resolve(root, segments),
        Expr::Array(items) => Some(Value::Array(
            items.iter().filter_map(|item| eval(item, root)).collect(),
        )),
        Expr::Call { function, args } => call_function(function, args, root),
        Expr::Binary { op, lhs, rhs } => binary(*op, lhs, rhs, root),
        Expr::Condition {
            test,
            then,
            otherwise,
        } => {
            if to_boolean(eval(test, root).as_ref()) {
                eval(then, root)
            } else {
                otherwise.as_deref().and_then(|e| eval(e, root))
            }
        }
    }
}

fn resolve(root: &Value, segments: &[String]) -> Option<Value> {
    let mut current = root.clone();
    for segment in segments {
        current = match current {
            Value::Object(mut fields) => fields.remove(segment)?,
            Value::Array(items) => {
                let mut found: Vec<Value> = items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Object(mut fields) => fields.remove(segment),
                        _ => None,
                    })
                    .collect();
                match found.len() {
                    0 => return None,
                    1 => found.remove(0),
                    _ => Value::Array(found),
                }
            }
            _ => return None,
        };
    }
    Some(current)
}

fn binary(op: BinaryOp, lhs: &Expr, rhs: &Expr, root: &Value) -> Option<Value> {
    match op {
        BinaryOp::Or => Some(Value::Bool(
            to_boolean(eval(lhs, root).as_ref()) || to_boolean(eval(rhs, root).as_ref()),
        )),
        BinaryOp::And => Some(Value::Bool(
            to_boolean(eval(lhs, root).as_ref()) && to_boolean(eval(rhs, root).as_ref()),
        )),
        BinaryOp::Concat => {
            let left = eval(lhs, root).map(|v| to_string(&v)).unwrap_or_default();
            let right = eval(rhs, root).map(|v| to_string(&v)).unwrap_or_default();
            Some(Value::String(left + &right))
        }
        BinaryOp::Eq | BinaryOp::Ne => {
            let (Some(left), Some(right)) = (eval(lhs, root), eval(rhs, root)) else {
                return Some(Value::Bool(false));
            };
            let equal = values_equal(&left, &right);
            Some(Value::Bool(if op == BinaryOp::Eq { equal } else { !equal }))
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (eval(lhs, root)?, eval(rhs, root)?) {
                (Value::Number(a), Value::Number(b)) => {
                    a.as_f64()?.partial_cmp(&b.as_f64()?)?
                }
                (Value::String(a), Value::String(b)) => a.cmp(&b),
                _ => return None,
            };
            let holds = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Some(Value::Bool(holds))
        }
    }
}

// =============================================================================
// CASTS
// =============================================================================

/// Integral values become integers so `2` and `2.0` print and compare alike.
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

pub fn to_boolean(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => items.iter().any(|item| to_boolean(Some(item))),
        Some(Value::Object(fields)) => !fields.is_empty(),
    }
}

pub fn to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                (f as i64).to_string()
            }
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Structural equality where numbers compare by value (`1 == 1.0`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}
