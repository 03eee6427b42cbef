//! Compile-time errors with source locations.

use std::fmt;

/// A position in an MPCL source file. Lines are 1-based, columns
/// 0-based.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Point {
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unexpected character or token.
    Syntax,
    /// Unbound names, type mismatches, arity mismatches, recursion.
    Semantic,
    /// Non-constant where a constant is mandatory, constant division by
    /// zero, out-of-range constant index.
    NotConstant,
    /// Loop-unroll cap or circuit size exceeded.
    Capacity,
}

/// A compile error attached to a source location.
#[derive(Debug)]
pub struct CompileError {
    pub source: String,
    pub point: Point,
    pub kind: ErrorKind,
    pub message: String,
}

impl CompileError {
    fn new(kind: ErrorKind, source: &str, point: Point, message: String) -> Self {
        CompileError {
            source: source.to_string(),
            point,
            kind,
            message,
        }
    }

    pub fn syntax(source: &str, point: Point, message: String) -> Self {
        Self::new(ErrorKind::Syntax, source, point, message)
    }

    pub fn semantic(source: &str, point: Point, message: String) -> Self {
        Self::new(ErrorKind::Semantic, source, point, message)
    }

    pub fn not_constant(source: &str, point: Point, message: String) -> Self {
        Self::new(ErrorKind::NotConstant, source, point, message)
    }

    pub fn capacity(source: &str, point: Point, message: String) -> Self {
        Self::new(ErrorKind::Capacity, source, point, message)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.source, self.point.line, self.point.col, self.message
        )
    }
}

impl std::error::Error for CompileError {}
