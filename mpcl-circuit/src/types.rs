//! The bit-width-carrying MPCL type model.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use crate::Error;

/// Type kinds. `Undefined` marks untyped constants whose width is
/// resolved on first use against a typed operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Undefined,
    Bool,
    Int,
    Uint,
    String,
    Array,
    Struct,
}

/// A named struct field with its bit offset inside the struct.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructField {
    pub name: String,
    pub type_info: TypeInfo,
    pub offset: u32,
}

/// Type information: kind, declared bit width, and the minimum width a
/// constant-folded literal needs (literals may widen on assignment).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeInfo {
    pub kind: Kind,
    pub bits: u32,
    pub min_bits: u32,
    pub element: Option<Box<TypeInfo>>,
    pub array_size: u32,
    pub fields: Vec<StructField>,
}

impl TypeInfo {
    pub fn undefined() -> Self {
        TypeInfo {
            kind: Kind::Undefined,
            bits: 0,
            min_bits: 0,
            element: None,
            array_size: 0,
            fields: Vec::new(),
        }
    }

    pub fn bool() -> Self {
        TypeInfo {
            kind: Kind::Bool,
            bits: 1,
            min_bits: 1,
            ..TypeInfo::undefined()
        }
    }

    /// A signed integer of `bits` bits. Zero bits is the `int`
    /// placeholder specialized at call sites.
    pub fn int(bits: u32) -> Self {
        TypeInfo {
            kind: Kind::Int,
            bits,
            min_bits: bits,
            ..TypeInfo::undefined()
        }
    }

    /// An unsigned integer of `bits` bits.
    pub fn uint(bits: u32) -> Self {
        TypeInfo {
            kind: Kind::Uint,
            bits,
            min_bits: bits,
            ..TypeInfo::undefined()
        }
    }

    /// A string of `bytes` bytes, encoded at increasing bit offsets.
    pub fn string(bytes: u32) -> Self {
        TypeInfo {
            kind: Kind::String,
            bits: bytes * 8,
            min_bits: bytes * 8,
            ..TypeInfo::undefined()
        }
    }

    /// A fixed-length array. Width is `count * element width`.
    pub fn array(element: TypeInfo, count: u32) -> Self {
        let bits = element.bits * count;
        TypeInfo {
            kind: Kind::Array,
            bits,
            min_bits: bits,
            element: Some(Box::new(element)),
            array_size: count,
            fields: Vec::new(),
        }
    }

    /// A struct; field offsets are assigned in declaration order and the
    /// struct width is the sum of the field widths.
    pub fn structure(fields: Vec<(String, TypeInfo)>) -> Self {
        let mut offset = 0;
        let mut out = Vec::with_capacity(fields.len());
        for (name, type_info) in fields {
            let width = type_info.bits;
            out.push(StructField {
                name,
                type_info,
                offset,
            });
            offset += width;
        }
        TypeInfo {
            kind: Kind::Struct,
            bits: offset,
            min_bits: offset,
            element: None,
            array_size: 0,
            fields: out,
        }
    }

    /// True for types whose width is settled.
    pub fn is_concrete(&self) -> bool {
        self.kind != Kind::Undefined && self.bits > 0
    }

    /// Whether values of `self` and `other` may meet in one operation.
    /// An untyped side adopts the width of the typed side.
    pub fn compatible(&self, other: &TypeInfo) -> bool {
        if self.kind == Kind::Undefined || other.kind == Kind::Undefined {
            return true;
        }
        if self.kind != other.kind {
            // Untyped integer literals fold as Int but may meet Uint.
            // Two declared types of opposite signedness do not mix.
            let numeric = |k: Kind| k == Kind::Int || k == Kind::Uint;
            if !(numeric(self.kind) && numeric(other.kind)) {
                return false;
            }
            if self.is_concrete() && other.is_concrete() {
                return false;
            }
        }
        self.bits == 0 || other.bits == 0 || self.bits == other.bits
    }

    /// Look up a struct field.
    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Parse a type name: `bool`, `byte`, `intN`, `uintN`, `stringN`,
    /// or `[N]elem`.
    pub fn parse(val: &str) -> Result<TypeInfo, Error> {
        static SIZED: OnceLock<Regex> = OnceLock::new();
        static ARRAY: OnceLock<Regex> = OnceLock::new();
        let sized = SIZED.get_or_init(|| Regex::new(r"^([a-z]+)([0-9]+)$").unwrap());
        let array = ARRAY.get_or_init(|| Regex::new(r"^\[([0-9]+)\](.+)$").unwrap());

        match val {
            "b" | "bool" => return Ok(TypeInfo::bool()),
            "byte" => return Ok(TypeInfo::uint(8)),
            "int" => return Ok(TypeInfo::int(0)),
            "uint" => return Ok(TypeInfo::uint(0)),
            _ => (),
        }
        if let Some(caps) = sized.captures(val) {
            let bits: u32 = caps[2]
                .parse()
                .map_err(|_| Error::UnknownType(val.to_string()))?;
            return match &caps[1] {
                "i" | "int" => Ok(TypeInfo::int(bits)),
                "u" | "uint" => Ok(TypeInfo::uint(bits)),
                "s" | "string" => Ok(TypeInfo::string(bits / 8)),
                _ => Err(Error::UnknownType(val.to_string())),
            };
        }
        if let Some(caps) = array.captures(val) {
            let count: u32 = caps[1]
                .parse()
                .map_err(|_| Error::UnknownType(val.to_string()))?;
            let element = TypeInfo::parse(&caps[2])?;
            return Ok(TypeInfo::array(element, count));
        }
        Err(Error::UnknownType(val.to_string()))
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            Kind::Undefined => write!(f, "untyped"),
            Kind::Bool => write!(f, "bool"),
            Kind::Int => write!(f, "int{}", self.bits),
            Kind::Uint => write!(f, "uint{}", self.bits),
            Kind::String => write!(f, "string{}", self.bits),
            Kind::Array => write!(
                f,
                "[{}]{}",
                self.array_size,
                self.element.as_deref().unwrap_or(&TypeInfo::undefined())
            ),
            Kind::Struct => {
                write!(f, "struct{{")?;
                for (idx, field) in self.fields.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", field.name, field.type_info)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scalars() {
        assert_eq!(TypeInfo::parse("bool").unwrap(), TypeInfo::bool());
        assert_eq!(TypeInfo::parse("byte").unwrap(), TypeInfo::uint(8));
        assert_eq!(TypeInfo::parse("int32").unwrap(), TypeInfo::int(32));
        assert_eq!(TypeInfo::parse("uint64").unwrap(), TypeInfo::uint(64));
        assert_eq!(TypeInfo::parse("u6").unwrap(), TypeInfo::uint(6));
        assert_eq!(TypeInfo::parse("string16").unwrap(), TypeInfo::string(2));
    }

    #[test]
    fn parse_arrays() {
        let t = TypeInfo::parse("[64]byte").unwrap();
        assert_eq!(t.kind, Kind::Array);
        assert_eq!(t.array_size, 64);
        assert_eq!(t.bits, 512);
        let nested = TypeInfo::parse("[4][2]uint8").unwrap();
        assert_eq!(nested.bits, 64);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(TypeInfo::parse("float32").is_err());
        assert!(TypeInfo::parse("[x]byte").is_err());
    }

    #[test]
    fn compatibility_of_numeric_kinds() {
        // An untyped literal meets either signedness.
        assert!(TypeInfo::int(0).compatible(&TypeInfo::uint(8)));
        assert!(TypeInfo::uint(8).compatible(&TypeInfo::int(0)));
        // Declared types of opposite signedness do not mix.
        assert!(!TypeInfo::int(8).compatible(&TypeInfo::uint(8)));
        assert!(!TypeInfo::uint(32).compatible(&TypeInfo::int(32)));
        assert!(TypeInfo::uint(8).compatible(&TypeInfo::uint(8)));
        assert!(!TypeInfo::uint(8).compatible(&TypeInfo::uint(16)));
    }

    #[test]
    fn struct_width_is_field_sum() {
        let t = TypeInfo::structure(vec![
            ("a".to_string(), TypeInfo::uint(8)),
            ("b".to_string(), TypeInfo::uint(24)),
        ]);
        assert_eq!(t.bits, 32);
        assert_eq!(t.field("b").unwrap().offset, 8);
    }
}
