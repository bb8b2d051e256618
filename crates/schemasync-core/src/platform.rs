//! Platform capabilities, native type mapping and platform lookup.
//!
//! A single [`PlatformInfo`] value describes everything that differs between
//! supported databases. SQL rendering branches on these flags instead of
//! dispatching through per-database implementations.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::model::Column;
use crate::types::TypeCode;

/// Database family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Oracle,
    PostgreSql,
}

/// How auto-increment columns are implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityStrategy {
    /// A sequence plus a BEFORE INSERT trigger.
    Sequence,
    /// `GENERATED BY DEFAULT AS IDENTITY`.
    Identity,
}

/// How constraints are switched off around a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintToggle {
    /// `DISABLE CONSTRAINT` / `ENABLE CONSTRAINT`.
    DisableEnable,
    /// Drop the constraint and add it back.
    DropRecreate,
}

/// Capabilities and conventions of a target database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    pub kind: PlatformKind,
    /// Registry name (`oracle`, `postgresql`).
    pub name: String,
    pub max_identifier_length: usize,
    /// Quote identifiers in generated SQL.
    pub delimited_identifiers: bool,
    /// Declare the primary key inside CREATE TABLE.
    pub embedded_primary_keys: bool,
    /// Declare check constraints inside CREATE TABLE.
    pub embedded_checks: bool,
    /// Removing a default is written as `DEFAULT NULL`.
    pub requires_null_default: bool,
    pub identity: IdentityStrategy,
    pub constraint_toggle: ConstraintToggle,
    /// Whether physical column order is significant.
    pub column_order_managed: bool,
    pub supports_partial_indexes: bool,
    /// Whether a column default can be changed without a rebuild.
    pub supports_alter_default: bool,
    /// Whether DDL participates in transactions.
    pub transactional_ddl: bool,
    /// Skip indexes that back primary key or unique constraints when reading.
    pub suppress_system_indexes: bool,
    /// Empty strings are stored as NULL.
    pub empty_string_is_null: bool,
    pub default_batch_size: usize,
}

impl PlatformInfo {
    /// Oracle family.
    #[must_use]
    pub fn oracle() -> Self {
        Self {
            kind: PlatformKind::Oracle,
            name: "oracle".to_string(),
            max_identifier_length: 30,
            delimited_identifiers: false,
            embedded_primary_keys: false,
            embedded_checks: false,
            requires_null_default: true,
            identity: IdentityStrategy::Sequence,
            constraint_toggle: ConstraintToggle::DisableEnable,
            column_order_managed: false,
            supports_partial_indexes: false,
            supports_alter_default: true,
            transactional_ddl: false,
            suppress_system_indexes: true,
            empty_string_is_null: true,
            default_batch_size: 100,
        }
    }

    /// PostgreSQL family.
    #[must_use]
    pub fn postgresql() -> Self {
        Self {
            kind: PlatformKind::PostgreSql,
            name: "postgresql".to_string(),
            max_identifier_length: 63,
            delimited_identifiers: false,
            embedded_primary_keys: true,
            embedded_checks: true,
            requires_null_default: false,
            identity: IdentityStrategy::Identity,
            constraint_toggle: ConstraintToggle::DropRecreate,
            column_order_managed: false,
            supports_partial_indexes: true,
            supports_alter_default: true,
            transactional_ddl: true,
            suppress_system_indexes: true,
            empty_string_is_null: false,
            default_batch_size: 1000,
        }
    }

    /// Enables or disables quoted identifiers.
    #[must_use]
    pub const fn delimited_identifiers(mut self, enabled: bool) -> Self {
        self.delimited_identifiers = enabled;
        self
    }

    /// Sets whether column order is significant.
    #[must_use]
    pub const fn column_order_managed(mut self, enabled: bool) -> Self {
        self.column_order_managed = enabled;
        self
    }

    /// Returns whether this is the Oracle family.
    #[must_use]
    pub fn is_oracle(&self) -> bool {
        self.kind == PlatformKind::Oracle
    }

    /// Fails when `name` exceeds the identifier limit. Never truncates.
    pub fn check_identifier(&self, name: &str) -> Result<()> {
        let length = name.chars().count();
        if length > self.max_identifier_length {
            return Err(SyncError::IdentifierTooLong {
                identifier: name.to_string(),
                length,
                max: self.max_identifier_length,
                platform: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Renders an identifier for SQL, checking its length.
    pub fn quote(&self, name: &str) -> Result<String> {
        self.check_identifier(name)?;
        if self.delimited_identifiers {
            Ok(format!("\"{}\"", name.replace('"', "\"\"")))
        } else {
            Ok(name.to_string())
        }
    }

    /// Canonical model form of an identifier read from the catalog.
    #[must_use]
    pub fn fold_identifier(&self, name: &str) -> String {
        if self.delimited_identifiers {
            name.to_string()
        } else {
            name.to_uppercase()
        }
    }

    /// Form of an identifier as stored in the catalog, for catalog queries.
    #[must_use]
    pub fn catalog_identifier(&self, name: &str) -> String {
        match (self.delimited_identifiers, self.kind) {
            (true, _) => name.to_string(),
            (false, PlatformKind::Oracle) => name.to_uppercase(),
            (false, PlatformKind::PostgreSql) => name.to_lowercase(),
        }
    }

    /// Native type of a column.
    #[must_use]
    pub fn native_type(&self, column: &Column) -> String {
        self.native_type_of(&column.type_code, column.size, column.scale)
    }

    /// Native type for a logical type, size and scale.
    #[must_use]
    pub fn native_type_of(&self, code: &TypeCode, size: Option<u32>, scale: Option<u32>) -> String {
        match self.kind {
            PlatformKind::Oracle => oracle_native(code, size, scale),
            PlatformKind::PostgreSql => postgres_native(code, size, scale),
        }
    }

    /// Maps a catalog type name back to a logical type.
    ///
    /// `length` is the character/byte length, `precision` and `scale` apply
    /// to numeric types.
    pub fn logical_type(
        &self,
        native: &str,
        length: Option<u32>,
        precision: Option<u32>,
        scale: Option<u32>,
    ) -> Result<LogicalType> {
        let lower = native.trim().to_lowercase();
        let mapped = match self.kind {
            PlatformKind::Oracle => oracle_logical(&lower, length, precision, scale),
            PlatformKind::PostgreSql => postgres_logical(&lower, length, precision, scale),
        };
        mapped.ok_or_else(|| {
            SyncError::ModelRead(format!("Unmappable {} type '{native}'", self.name))
        })
    }

    /// Normalizes a default expression so textual variants compare equal.
    ///
    /// Returns `None` for expressions that mean "no default".
    #[must_use]
    pub fn normalize_default(&self, expr: Option<&str>) -> Option<String> {
        let normalized = normalize_expression(expr?);
        match normalized.as_str() {
            "" | "NULL" => None,
            "''" if self.empty_string_is_null => None,
            _ => Some(unquote_number(&normalized)),
        }
    }
}

/// A logical type read from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalType {
    pub code: TypeCode,
    pub size: Option<u32>,
    pub scale: Option<u32>,
}

impl LogicalType {
    const fn new(code: TypeCode, size: Option<u32>, scale: Option<u32>) -> Self {
        Self { code, size, scale }
    }
}

fn with_size(name: &str, size: Option<u32>, fallback: Option<u32>) -> String {
    match size.or(fallback) {
        Some(n) => format!("{name}({n})"),
        None => name.to_string(),
    }
}

fn with_precision(name: &str, size: Option<u32>, scale: Option<u32>) -> String {
    match (size, scale) {
        (None, _) => name.to_string(),
        (Some(p), None | Some(0)) => format!("{name}({p})"),
        (Some(p), Some(s)) => format!("{name}({p},{s})"),
    }
}

fn oracle_native(code: &TypeCode, size: Option<u32>, scale: Option<u32>) -> String {
    match code {
        TypeCode::Boolean => "NUMBER(1)".to_string(),
        TypeCode::SmallInt => "NUMBER(5)".to_string(),
        TypeCode::Integer => "NUMBER(10)".to_string(),
        TypeCode::BigInt => "NUMBER(19)".to_string(),
        TypeCode::Decimal | TypeCode::Numeric => with_precision("NUMBER", size, scale),
        TypeCode::Real => "BINARY_FLOAT".to_string(),
        TypeCode::Double => "BINARY_DOUBLE".to_string(),
        TypeCode::Char => with_size("CHAR", size, Some(1)),
        TypeCode::Varchar => with_size("VARCHAR2", size, Some(4000)),
        TypeCode::NChar => with_size("NCHAR", size, Some(1)),
        TypeCode::NVarchar => with_size("NVARCHAR2", size, Some(2000)),
        TypeCode::LongVarchar | TypeCode::Clob => "CLOB".to_string(),
        TypeCode::Blob => "BLOB".to_string(),
        TypeCode::Binary | TypeCode::VarBinary => with_size("RAW", size, Some(2000)),
        TypeCode::Date | TypeCode::Time => "DATE".to_string(),
        TypeCode::Timestamp => "TIMESTAMP".to_string(),
        TypeCode::Other(name) => name.to_uppercase(),
    }
}

fn postgres_native(code: &TypeCode, size: Option<u32>, scale: Option<u32>) -> String {
    match code {
        TypeCode::Boolean => "BOOLEAN".to_string(),
        TypeCode::SmallInt => "SMALLINT".to_string(),
        TypeCode::Integer => "INTEGER".to_string(),
        TypeCode::BigInt => "BIGINT".to_string(),
        TypeCode::Decimal | TypeCode::Numeric => with_precision("NUMERIC", size, scale),
        TypeCode::Real => "REAL".to_string(),
        TypeCode::Double => "DOUBLE PRECISION".to_string(),
        TypeCode::Char | TypeCode::NChar => with_size("CHAR", size, Some(1)),
        TypeCode::Varchar | TypeCode::NVarchar => with_size("VARCHAR", size, None),
        TypeCode::LongVarchar | TypeCode::Clob => "TEXT".to_string(),
        TypeCode::Blob | TypeCode::Binary | TypeCode::VarBinary => "BYTEA".to_string(),
        TypeCode::Date => "DATE".to_string(),
        TypeCode::Time => "TIME".to_string(),
        TypeCode::Timestamp => "TIMESTAMP".to_string(),
        TypeCode::Other(name) => name.to_uppercase(),
    }
}

fn oracle_logical(
    native: &str,
    length: Option<u32>,
    precision: Option<u32>,
    scale: Option<u32>,
) -> Option<LogicalType> {
    let t = match native {
        "number" => LogicalType::new(TypeCode::Numeric, precision, precision.and(scale)),
        "float" | "binary_double" => LogicalType::new(TypeCode::Double, None, None),
        "binary_float" => LogicalType::new(TypeCode::Real, None, None),
        "char" => LogicalType::new(TypeCode::Char, length, None),
        "nchar" => LogicalType::new(TypeCode::NChar, length, None),
        "varchar2" | "varchar" => LogicalType::new(TypeCode::Varchar, length, None),
        "nvarchar2" => LogicalType::new(TypeCode::NVarchar, length, None),
        "clob" | "nclob" | "long" => LogicalType::new(TypeCode::Clob, None, None),
        "blob" => LogicalType::new(TypeCode::Blob, None, None),
        "raw" => LogicalType::new(TypeCode::VarBinary, length, None),
        "date" => LogicalType::new(TypeCode::Date, None, None),
        t if t.starts_with("timestamp") => LogicalType::new(TypeCode::Timestamp, None, None),
        _ => return None,
    };
    Some(t)
}

fn postgres_logical(
    native: &str,
    length: Option<u32>,
    precision: Option<u32>,
    scale: Option<u32>,
) -> Option<LogicalType> {
    let t = match native {
        "boolean" | "bool" => LogicalType::new(TypeCode::Boolean, None, None),
        "smallint" | "int2" => LogicalType::new(TypeCode::SmallInt, None, None),
        "integer" | "int" | "int4" => LogicalType::new(TypeCode::Integer, None, None),
        "bigint" | "int8" => LogicalType::new(TypeCode::BigInt, None, None),
        "numeric" | "decimal" => {
            LogicalType::new(TypeCode::Numeric, precision, precision.and(scale))
        }
        "real" | "float4" => LogicalType::new(TypeCode::Real, None, None),
        "double precision" | "float8" => LogicalType::new(TypeCode::Double, None, None),
        "character" | "char" | "bpchar" => LogicalType::new(TypeCode::Char, length, None),
        "character varying" | "varchar" => LogicalType::new(TypeCode::Varchar, length, None),
        "text" => LogicalType::new(TypeCode::Clob, None, None),
        "bytea" => LogicalType::new(TypeCode::Blob, None, None),
        "date" => LogicalType::new(TypeCode::Date, None, None),
        "time" | "time without time zone" => LogicalType::new(TypeCode::Time, None, None),
        "timestamp" | "timestamp without time zone" => {
            LogicalType::new(TypeCode::Timestamp, None, None)
        }
        _ => return None,
    };
    Some(t)
}

static CAST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"::\s*[A-Za-z_][A-Za-z0-9_ ]*(\(\s*\d+(\s*,\s*\d+)?\s*\))?(\[\])?")
        .expect("valid cast regex")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^'(-?\d+(\.\d+)?)'$").expect("valid regex")
});

/// Splits SQL text into `(is_literal, segment)` parts on single-quoted
/// string literals. Doubled quotes stay inside the literal.
fn split_literals(expr: &str) -> Vec<(bool, String)> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_literal = false;
    let mut chars = expr.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\'' {
            if in_literal {
                if chars.peek() == Some(&'\'') {
                    current.push_str("''");
                    chars.next();
                    continue;
                }
                current.push(c);
                parts.push((true, std::mem::take(&mut current)));
                in_literal = false;
            } else {
                if !current.is_empty() {
                    parts.push((false, std::mem::take(&mut current)));
                }
                current.push(c);
                in_literal = true;
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        parts.push((in_literal, current));
    }
    parts
}

/// Returns whether the outer parentheses enclose the whole expression.
fn wrapped_in_parens(expr: &str) -> bool {
    if !(expr.starts_with('(') && expr.ends_with(')')) {
        return false;
    }
    let mut depth = 0_i32;
    let mut in_literal = false;
    for (i, c) in expr.char_indices() {
        match c {
            '\'' => in_literal = !in_literal,
            '(' if !in_literal => depth += 1,
            ')' if !in_literal => {
                depth -= 1;
                if depth == 0 && i + 1 < expr.len() {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Normalizes an SQL expression (defaults, check and index conditions).
///
/// Casts are stripped, text outside literals is upper-cased and whitespace
/// collapsed, and redundant outer parentheses are removed.
#[must_use]
pub fn normalize_expression(expr: &str) -> String {
    let mut current = expr.trim().to_string();
    loop {
        let rebuilt: String = split_literals(&current)
            .into_iter()
            .map(|(literal, part)| {
                if literal {
                    part
                } else {
                    let stripped = CAST.replace_all(&part, "");
                    WHITESPACE
                        .replace_all(&stripped, " ")
                        .to_uppercase()
                        .replace("( ", "(")
                        .replace(" )", ")")
                }
            })
            .collect();
        let mut next = rebuilt.trim().to_string();
        while wrapped_in_parens(&next) {
            next = next[1..next.len() - 1].trim().to_string();
        }
        if next == current {
            return next;
        }
        current = next;
    }
}

fn unquote_number(expr: &str) -> String {
    NUMBER
        .captures(expr)
        .and_then(|c| c.get(1))
        .map_or_else(|| expr.to_string(), |m| m.as_str().to_string())
}

/// Looks up platforms by driver class name or connection URL.
///
/// Built once per run and passed where needed.
#[derive(Debug, Clone)]
pub struct PlatformRegistry {
    platforms: BTreeMap<String, PlatformInfo>,
    drivers: BTreeMap<String, String>,
    subprotocols: BTreeMap<String, String>,
}

impl PlatformRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            platforms: BTreeMap::new(),
            drivers: BTreeMap::new(),
            subprotocols: BTreeMap::new(),
        }
    }

    /// Creates a registry with the Oracle and PostgreSQL families.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(PlatformInfo::oracle());
        registry.register(PlatformInfo::postgresql());
        for driver in ["oracle.jdbc.driver.OracleDriver", "oracle.jdbc.OracleDriver"] {
            registry.register_driver(driver, "oracle");
        }
        registry.register_driver("org.postgresql.Driver", "postgresql");
        for protocol in ["jdbc:oracle:thin", "jdbc:oracle:oci", "jdbc:oracle:oci8", "oracle"] {
            registry.register_subprotocol(protocol, "oracle");
        }
        for protocol in ["jdbc:postgresql", "postgres", "postgresql"] {
            registry.register_subprotocol(protocol, "postgresql");
        }
        registry
    }

    /// Registers a platform under its name.
    pub fn register(&mut self, platform: PlatformInfo) {
        self.platforms.insert(platform.name.to_lowercase(), platform);
    }

    /// Maps a driver class name to a platform name.
    pub fn register_driver(&mut self, driver: &str, platform: &str) {
        self.drivers.insert(driver.to_string(), platform.to_lowercase());
    }

    /// Maps a URL sub-protocol to a platform name.
    pub fn register_subprotocol(&mut self, protocol: &str, platform: &str) {
        self.subprotocols
            .insert(protocol.to_lowercase(), platform.to_lowercase());
    }

    /// Gets a platform by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PlatformInfo> {
        self.platforms.get(&name.to_lowercase())
    }

    /// Resolves the platform from a driver class name or a URL.
    ///
    /// The driver wins when both are given; the longest matching URL
    /// sub-protocol wins otherwise.
    pub fn resolve(&self, driver: Option<&str>, url: Option<&str>) -> Result<PlatformInfo> {
        if let Some(driver) = driver {
            let name = self
                .drivers
                .get(driver)
                .ok_or_else(|| SyncError::Config(format!("Unknown driver '{driver}'")))?;
            return self.by_name(name);
        }

        let url = url.ok_or_else(|| {
            SyncError::Config("Either a driver or a connection URL is required".to_string())
        })?;
        let lower = url.to_lowercase();
        let name = self
            .subprotocols
            .iter()
            .filter(|(protocol, _)| {
                lower
                    .strip_prefix(protocol.as_str())
                    .is_some_and(|rest| rest.starts_with(':'))
            })
            .max_by_key(|(protocol, _)| protocol.len())
            .map(|(_, name)| name)
            .ok_or_else(|| SyncError::Config(format!("No platform for URL '{url}'")))?;
        self.by_name(name)
    }

    fn by_name(&self, name: &str) -> Result<PlatformInfo> {
        self.get(name)
            .cloned()
            .ok_or_else(|| SyncError::Config(format!("Unknown platform '{name}'")))
    }
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_types() {
        let ora = PlatformInfo::oracle();
        let pg = PlatformInfo::postgresql();
        let col = Column::new("NAME", TypeCode::Varchar).size(60);
        assert_eq!(ora.native_type(&col), "VARCHAR2(60)");
        assert_eq!(pg.native_type(&col), "VARCHAR(60)");

        let amount = Column::new("AMT", TypeCode::Numeric).precision(12, 2);
        assert_eq!(ora.native_type(&amount), "NUMBER(12,2)");
        assert_eq!(pg.native_type(&amount), "NUMERIC(12,2)");
        assert_eq!(pg.native_type(&Column::new("T", TypeCode::Clob)), "TEXT");
    }

    #[test]
    fn test_logical_round_trip() {
        let ora = PlatformInfo::oracle();
        let read = ora.logical_type("NUMBER", None, Some(10), Some(0)).unwrap();
        assert_eq!(
            ora.native_type_of(&read.code, read.size, read.scale),
            ora.native_type(&Column::new("I", TypeCode::Integer))
        );

        let pg = PlatformInfo::postgresql();
        let read = pg.logical_type("character varying", Some(32), None, None).unwrap();
        assert_eq!(read.code, TypeCode::Varchar);
        assert_eq!(read.size, Some(32));
    }

    #[test]
    fn test_unmappable_type() {
        let err = PlatformInfo::postgresql()
            .logical_type("tsvector", None, None, None)
            .unwrap_err();
        assert!(matches!(err, SyncError::ModelRead(_)));
    }

    #[test]
    fn test_normalize_default() {
        let pg = PlatformInfo::postgresql();
        assert_eq!(
            pg.normalize_default(Some("'Y'::bpchar")),
            pg.normalize_default(Some(" 'Y' "))
        );
        assert_eq!(pg.normalize_default(Some("('0'::numeric)")), Some("0".into()));
        assert_eq!(pg.normalize_default(Some("now()")), Some("NOW()".into()));
        assert_eq!(
            pg.normalize_default(Some("'abc'::character varying")),
            Some("'abc'".into())
        );
        assert_eq!(pg.normalize_default(Some("NULL")), None);
        assert_eq!(pg.normalize_default(Some("'x'")), Some("'x'".into()));
        assert_ne!(pg.normalize_default(Some("'x'")), pg.normalize_default(Some("'X'")));

        let ora = PlatformInfo::oracle();
        assert_eq!(ora.normalize_default(Some("''")), None);
        assert_eq!(ora.normalize_default(Some("sysdate\n")), Some("SYSDATE".into()));
    }

    #[test]
    fn test_normalize_expression_parens() {
        assert_eq!(normalize_expression("((qty > 0))"), "QTY > 0");
        assert_eq!(normalize_expression("(a > 0) AND (b > 0)"), "(A > 0) AND (B > 0)");
    }

    #[test]
    fn test_identifier_too_long() {
        let ora = PlatformInfo::oracle();
        assert!(ora.check_identifier("C_ORDERLINE").is_ok());
        let err = ora.quote("A_VERY_LONG_IDENTIFIER_NAME_OVER_30").unwrap_err();
        assert!(matches!(err, SyncError::IdentifierTooLong { max: 30, .. }));
    }

    #[test]
    fn test_registry_resolve() {
        let registry = PlatformRegistry::with_defaults();
        let p = registry
            .resolve(None, Some("jdbc:oracle:thin:@localhost:1521:xe"))
            .unwrap();
        assert_eq!(p.kind, PlatformKind::Oracle);
        let p = registry
            .resolve(None, Some("postgres://user@localhost/openbravo"))
            .unwrap();
        assert_eq!(p.kind, PlatformKind::PostgreSql);
        let p = registry
            .resolve(Some("org.postgresql.Driver"), None)
            .unwrap();
        assert_eq!(p.max_identifier_length, 63);
        assert!(registry.resolve(None, Some("mysql://localhost")).is_err());
    }
}
