//! Row statements and SQL literals.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::SqlBuilder;
use crate::error::Result;
use crate::planner::Backfill;
use crate::platform::PlatformInfo;
use crate::value::{Row, Value};

/// Renders a value as an SQL literal for the platform.
#[must_use]
pub fn literal(platform: &PlatformInfo, value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => match (platform.is_oracle(), b) {
            (true, true) => "1".to_string(),
            (true, false) => "0".to_string(),
            (false, true) => "TRUE".to_string(),
            (false, false) => "FALSE".to_string(),
        },
        Value::Int(i) => i.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::Float(x) => x.to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Date(d) => format!("DATE '{}'", d.format("%Y-%m-%d")),
        Value::Time(t) if platform.is_oracle() => {
            format!("TO_DATE('{}', 'HH24:MI:SS')", t.format("%H:%M:%S"))
        }
        Value::Time(t) => format!("TIME '{}'", t.format("%H:%M:%S")),
        Value::Timestamp(t) => format!("TIMESTAMP '{}'", t.format("%Y-%m-%d %H:%M:%S%.f")),
        Value::Bytes(bytes) => {
            let hex = bytes.iter().fold(String::new(), |mut out, b| {
                let _ = write!(out, "{b:02X}");
                out
            });
            if platform.is_oracle() {
                format!("HEXTORAW('{hex}')")
            } else {
                format!("'\\x{hex}'::bytea")
            }
        }
    }
}

impl SqlBuilder {
    fn key_condition(&self, key: &Row) -> Result<String> {
        let parts = key
            .iter()
            .map(|(column, value)| {
                let column = self.quote(column)?;
                Ok(if value.is_null() {
                    format!("{column} IS NULL")
                } else {
                    format!("{column} = {}", literal(&self.platform, value))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(parts.join(" AND "))
    }

    /// Columns the row leaves out take their on-create default, not the
    /// standing column default.
    pub(crate) fn insert(
        &self,
        table: &str,
        row: &Row,
        on_create: &BTreeMap<String, String>,
    ) -> Result<String> {
        let mut columns = row
            .columns()
            .map(|c| self.quote(c))
            .collect::<Result<Vec<_>>>()?;
        let mut values = row
            .iter()
            .map(|(_, v)| literal(&self.platform, v))
            .collect::<Vec<_>>();
        for (column, expr) in on_create {
            if row.get(column).is_none() {
                columns.push(self.quote(column)?);
                values.push(expr.trim().to_string());
            }
        }
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote(table)?,
            columns.join(", "),
            values.join(", ")
        ))
    }

    pub(crate) fn delete(&self, table: &str, key: &Row) -> Result<String> {
        Ok(format!(
            "DELETE FROM {} WHERE {}",
            self.quote(table)?,
            self.key_condition(key)?
        ))
    }

    pub(crate) fn update(&self, table: &str, key: &Row, column: &str, value: &Value) -> Result<String> {
        Ok(format!(
            "UPDATE {} SET {} = {} WHERE {}",
            self.quote(table)?,
            self.quote(column)?,
            literal(&self.platform, value),
            self.key_condition(key)?
        ))
    }

    /// Fills NULLs of a new column, restricted to the managed rows.
    pub(crate) fn backfill(&self, backfill: &Backfill) -> Result<String> {
        let column = self.quote(&backfill.column)?;
        let mut sql = format!(
            "UPDATE {} SET {column} = {} WHERE {column} IS NULL",
            self.quote(&backfill.table)?,
            backfill.value.trim()
        );
        if let Some(predicate) = &backfill.predicate {
            sql.push_str(" AND (");
            sql.push_str(predicate);
            sql.push(')');
        }
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_literals() {
        let oracle = PlatformInfo::oracle();
        let pg = PlatformInfo::postgresql();
        assert_eq!(literal(&pg, &Value::from("O'Brien")), "'O''Brien'");
        assert_eq!(literal(&oracle, &Value::Bool(true)), "1");
        assert_eq!(literal(&pg, &Value::Bool(false)), "FALSE");
        assert_eq!(literal(&pg, &Value::Null), "NULL");
        assert_eq!(
            literal(&pg, &Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())),
            "DATE '2024-02-29'"
        );
        assert_eq!(literal(&oracle, &Value::Bytes(vec![0xCA, 0xFE])), "HEXTORAW('CAFE')");
        assert_eq!(literal(&pg, &Value::Bytes(vec![0x01])), "'\\x01'::bytea");
    }

    #[test]
    fn test_row_statements() {
        let builder = SqlBuilder::new(PlatformInfo::postgresql());
        let row = Row::new().with("AD_CLIENT_ID", "0").with("NAME", "System");
        assert_eq!(
            builder.insert("AD_CLIENT", &row, &BTreeMap::new()).unwrap(),
            "INSERT INTO AD_CLIENT (AD_CLIENT_ID, NAME) VALUES ('0', 'System')"
        );

        let key = Row::new().with("AD_CLIENT_ID", "0");
        assert_eq!(
            builder.delete("AD_CLIENT", &key).unwrap(),
            "DELETE FROM AD_CLIENT WHERE AD_CLIENT_ID = '0'"
        );
        assert_eq!(
            builder
                .update("AD_CLIENT", &key, "NAME", &Value::from("SYSTEM"))
                .unwrap(),
            "UPDATE AD_CLIENT SET NAME = 'SYSTEM' WHERE AD_CLIENT_ID = '0'"
        );
    }

    #[test]
    fn test_insert_applies_on_create_default() {
        let builder = SqlBuilder::new(PlatformInfo::postgresql());
        let row = Row::new().with("ID", "1");
        let on_create = BTreeMap::from([("M4".to_string(), "'B'".to_string())]);
        assert_eq!(
            builder.insert("T", &row, &on_create).unwrap(),
            "INSERT INTO T (ID, M4) VALUES ('1', 'B')"
        );

        let explicit = row.with("M4", "C");
        assert_eq!(
            builder.insert("T", &explicit, &on_create).unwrap(),
            "INSERT INTO T (ID, M4) VALUES ('1', 'C')"
        );
    }

    #[test]
    fn test_backfill_scoped_by_predicate() {
        let builder = SqlBuilder::new(PlatformInfo::oracle());
        let backfill = Backfill {
            table: "AD_ORG".into(),
            column: "ISSUMMARY".into(),
            value: "'N'".into(),
            predicate: Some("AD_CLIENT_ID = '0'".into()),
        };
        assert_eq!(
            builder.backfill(&backfill).unwrap(),
            "UPDATE AD_ORG SET ISSUMMARY = 'N' WHERE ISSUMMARY IS NULL AND (AD_CLIENT_ID = '0')"
        );
    }
}
