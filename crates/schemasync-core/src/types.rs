//! Logical column types and their size semantics.
//!
//! Types are platform independent here; the mapping to native type names
//! lives in [`crate::platform::PlatformInfo`].

use serde::{Deserialize, Serialize};

/// Logical column type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeCode {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Decimal,
    Numeric,
    Real,
    Double,
    Char,
    Varchar,
    NChar,
    NVarchar,
    LongVarchar,
    Clob,
    Blob,
    Binary,
    VarBinary,
    Date,
    Time,
    Timestamp,
    /// A platform type with no logical counterpart, kept by native name
    /// (for example a type provided by an extension).
    Other(String),
}

/// Which of `size` / `scale` are meaningful for a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeSpec {
    /// Neither size nor scale.
    None,
    /// `size` is a length.
    Length,
    /// `size` is the precision, `scale` the scale.
    PrecisionScale,
}

/// Broad compatibility class of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Boolean,
    Integer,
    Decimal,
    Float,
    Text,
    LargeText,
    Binary,
    LargeBinary,
    Temporal,
    Other,
}

impl TypeCode {
    /// Returns the size semantics of this type.
    #[must_use]
    pub const fn size_spec(&self) -> SizeSpec {
        match self {
            Self::Char
            | Self::Varchar
            | Self::NChar
            | Self::NVarchar
            | Self::Binary
            | Self::VarBinary => SizeSpec::Length,
            Self::Decimal | Self::Numeric => SizeSpec::PrecisionScale,
            _ => SizeSpec::None,
        }
    }

    /// Returns the family of this type.
    #[must_use]
    pub const fn family(&self) -> TypeFamily {
        match self {
            Self::Boolean => TypeFamily::Boolean,
            Self::SmallInt | Self::Integer | Self::BigInt => TypeFamily::Integer,
            Self::Decimal | Self::Numeric => TypeFamily::Decimal,
            Self::Real | Self::Double => TypeFamily::Float,
            Self::Char | Self::Varchar | Self::NChar | Self::NVarchar => TypeFamily::Text,
            Self::LongVarchar | Self::Clob => TypeFamily::LargeText,
            Self::Binary | Self::VarBinary => TypeFamily::Binary,
            Self::Blob => TypeFamily::LargeBinary,
            Self::Date | Self::Time | Self::Timestamp => TypeFamily::Temporal,
            Self::Other(_) => TypeFamily::Other,
        }
    }

    /// Returns whether values of this type are quoted when rendered.
    #[must_use]
    pub const fn is_textual(&self) -> bool {
        matches!(
            self.family(),
            TypeFamily::Text | TypeFamily::LargeText | TypeFamily::Temporal
        )
    }

    /// Rank within the integer family, used for widening checks.
    const fn integer_rank(&self) -> u8 {
        match self {
            Self::SmallInt => 1,
            Self::Integer => 2,
            Self::BigInt => 3,
            _ => 0,
        }
    }

    /// Largest decimal precision an integer type needs.
    const fn integer_digits(&self) -> u32 {
        match self {
            Self::SmallInt => 5,
            Self::Integer => 10,
            _ => 19,
        }
    }
}

/// A logical type together with its size and scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeShape<'a> {
    pub code: &'a TypeCode,
    pub size: Option<u32>,
    pub scale: Option<u32>,
}

/// Returns whether converting `old` to `new` may lose data.
///
/// A narrowing change cannot be applied in place and requires a table
/// rebuild. Unknown sizes are treated as unbounded.
#[must_use]
pub fn is_narrowing(old: TypeShape<'_>, new: TypeShape<'_>) -> bool {
    let (old_family, new_family) = (old.code.family(), new.code.family());

    match (old_family, new_family) {
        (TypeFamily::Integer, TypeFamily::Integer) => {
            new.code.integer_rank() < old.code.integer_rank()
        }
        (TypeFamily::Integer, TypeFamily::Decimal) => {
            let scale = new.scale.unwrap_or(0);
            new.size
                .is_some_and(|p| p.saturating_sub(scale) < old.code.integer_digits())
        }
        (TypeFamily::Decimal, TypeFamily::Integer) => {
            old.scale.unwrap_or(0) > 0
                || old.size.map_or(true, |p| p > new.code.integer_digits())
        }
        (TypeFamily::Decimal, TypeFamily::Decimal) => {
            let old_scale = old.scale.unwrap_or(0);
            let new_scale = new.scale.unwrap_or(0);
            if new_scale < old_scale {
                return true;
            }
            match (old.size, new.size) {
                (_, None) => false,
                (None, Some(_)) => true,
                (Some(o), Some(n)) => n.saturating_sub(new_scale) < o.saturating_sub(old_scale),
            }
        }
        (TypeFamily::Float, TypeFamily::Float) => {
            matches!((old.code, new.code), (TypeCode::Double, TypeCode::Real))
        }
        (TypeFamily::Text, TypeFamily::Text) | (TypeFamily::Binary, TypeFamily::Binary) => {
            match (old.size, new.size) {
                (_, None) => false,
                (None, Some(_)) => true,
                (Some(o), Some(n)) => n < o,
            }
        }
        (TypeFamily::Text, TypeFamily::LargeText)
        | (TypeFamily::LargeText, TypeFamily::LargeText)
        | (TypeFamily::Binary, TypeFamily::LargeBinary)
        | (TypeFamily::LargeBinary, TypeFamily::LargeBinary)
        | (TypeFamily::Boolean, TypeFamily::Boolean) => false,
        (TypeFamily::Temporal, TypeFamily::Temporal) => {
            !matches!(
                (old.code, new.code),
                (TypeCode::Date, TypeCode::Timestamp | TypeCode::Date)
                    | (TypeCode::Time, TypeCode::Time)
                    | (TypeCode::Timestamp, TypeCode::Timestamp)
            )
        }
        (TypeFamily::Other, TypeFamily::Other) => old.code != new.code,
        _ => true,
    }
}
