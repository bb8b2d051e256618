//! Oracle data dictionary queries (`ALL_*` views).

use std::sync::LazyLock;

use regex::Regex;

use super::CatalogDialect;

/// Catalog queries for Oracle.
#[derive(Debug, Clone, Copy, Default)]
pub struct OracleCatalog;

/// Checks Oracle creates for NOT NULL columns.
static NOT_NULL_CHECK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^\s*"?[A-Za-z0-9_$#]+"?\s+IS\s+NOT\s+NULL\s*$"#).expect("valid regex")
});

/// Header of a stored function or procedure source, up to its `AS`/`IS`.
static ROUTINE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*(FUNCTION|PROCEDURE)\b.*?\b(AS|IS)\b").expect("valid regex")
});

impl CatalogDialect for OracleCatalog {
    fn current_schema(&self) -> &'static str {
        "SYS_CONTEXT('USERENV', 'CURRENT_SCHEMA')"
    }

    fn tables_query(&self, _catalog: Option<&str>, schema: &str) -> String {
        format!(
            "SELECT TABLE_NAME, 'TABLE' AS TABLE_TYPE FROM ALL_TABLES \
             WHERE OWNER = {schema} AND NESTED = 'NO' AND SECONDARY = 'N' \
             UNION ALL \
             SELECT VIEW_NAME AS TABLE_NAME, 'VIEW' AS TABLE_TYPE FROM ALL_VIEWS \
             WHERE OWNER = {schema} \
             ORDER BY TABLE_NAME"
        )
    }

    fn columns_query(&self, schema: &str) -> String {
        format!(
            "SELECT TABLE_NAME, COLUMN_NAME, DATA_TYPE, \
                    CASE WHEN DATA_TYPE = 'RAW' THEN DATA_LENGTH ELSE CHAR_LENGTH END AS CHAR_LENGTH, \
                    DATA_PRECISION AS NUM_PRECISION, DATA_SCALE AS NUM_SCALE, \
                    NULLABLE, DATA_DEFAULT AS COLUMN_DEFAULT, 'N' AS IS_IDENTITY \
             FROM ALL_TAB_COLUMNS \
             WHERE OWNER = {schema} \
             ORDER BY TABLE_NAME, COLUMN_ID"
        )
    }

    fn primary_keys_query(&self, schema: &str) -> String {
        format!(
            "SELECT c.TABLE_NAME, c.CONSTRAINT_NAME, cc.COLUMN_NAME \
             FROM ALL_CONSTRAINTS c \
             JOIN ALL_CONS_COLUMNS cc ON cc.OWNER = c.OWNER AND cc.CONSTRAINT_NAME = c.CONSTRAINT_NAME \
             WHERE c.OWNER = {schema} AND c.CONSTRAINT_TYPE = 'P' \
             ORDER BY c.TABLE_NAME, cc.POSITION"
        )
    }

    fn foreign_keys_query(&self, schema: &str) -> String {
        format!(
            "SELECT c.TABLE_NAME, c.CONSTRAINT_NAME, r.TABLE_NAME AS FOREIGN_TABLE, \
                    lc.COLUMN_NAME AS LOCAL_COLUMN, rc.COLUMN_NAME AS FOREIGN_COLUMN, \
                    c.DELETE_RULE, 'NO ACTION' AS UPDATE_RULE \
             FROM ALL_CONSTRAINTS c \
             JOIN ALL_CONSTRAINTS r ON r.OWNER = c.R_OWNER AND r.CONSTRAINT_NAME = c.R_CONSTRAINT_NAME \
             JOIN ALL_CONS_COLUMNS lc ON lc.OWNER = c.OWNER AND lc.CONSTRAINT_NAME = c.CONSTRAINT_NAME \
             JOIN ALL_CONS_COLUMNS rc ON rc.OWNER = r.OWNER AND rc.CONSTRAINT_NAME = r.CONSTRAINT_NAME \
                  AND rc.POSITION = lc.POSITION \
             WHERE c.OWNER = {schema} AND c.CONSTRAINT_TYPE = 'R' \
             ORDER BY c.TABLE_NAME, c.CONSTRAINT_NAME, lc.POSITION"
        )
    }

    fn indexes_query(&self, schema: &str) -> String {
        format!(
            "SELECT i.TABLE_NAME, i.INDEX_NAME, ic.COLUMN_NAME, \
                    CASE WHEN i.UNIQUENESS = 'UNIQUE' THEN 'Y' ELSE 'N' END AS IS_UNIQUE, \
                    NULL AS CONDITION, \
                    CASE WHEN i.GENERATED = 'Y' OR EXISTS ( \
                        SELECT 1 FROM ALL_CONSTRAINTS c \
                        WHERE c.OWNER = i.TABLE_OWNER AND c.INDEX_NAME = i.INDEX_NAME \
                          AND c.CONSTRAINT_TYPE IN ('P', 'U')) \
                    THEN 'Y' ELSE 'N' END AS IS_SYSTEM \
             FROM ALL_INDEXES i \
             JOIN ALL_IND_COLUMNS ic ON ic.INDEX_OWNER = i.OWNER AND ic.INDEX_NAME = i.INDEX_NAME \
             WHERE i.TABLE_OWNER = {schema} AND i.INDEX_TYPE <> 'LOB' \
             ORDER BY i.TABLE_NAME, i.INDEX_NAME, ic.COLUMN_POSITION"
        )
    }

    fn checks_query(&self, schema: &str) -> String {
        format!(
            "SELECT TABLE_NAME, CONSTRAINT_NAME, SEARCH_CONDITION AS CONDITION \
             FROM ALL_CONSTRAINTS \
             WHERE OWNER = {schema} AND CONSTRAINT_TYPE = 'C' \
             ORDER BY TABLE_NAME, CONSTRAINT_NAME"
        )
    }

    fn triggers_query(&self, schema: &str) -> String {
        format!(
            "SELECT TRIGGER_NAME, TABLE_NAME, \
                    CASE WHEN TRIGGER_TYPE LIKE 'BEFORE%' THEN 'BEFORE' ELSE 'AFTER' END AS TIMING, \
                    TRIGGERING_EVENT AS EVENTS, \
                    CASE WHEN TRIGGER_TYPE LIKE '%EACH ROW' THEN 'Y' ELSE 'N' END AS FOR_EACH_ROW, \
                    TRIGGER_BODY AS BODY \
             FROM ALL_TRIGGERS \
             WHERE OWNER = {schema} AND BASE_OBJECT_TYPE = 'TABLE' \
             ORDER BY TABLE_NAME, TRIGGER_NAME"
        )
    }

    fn sequences_query(&self, schema: &str) -> String {
        format!(
            "SELECT SEQUENCE_NAME, MIN_VALUE AS START_VALUE, INCREMENT_BY \
             FROM ALL_SEQUENCES \
             WHERE SEQUENCE_OWNER = {schema} \
             ORDER BY SEQUENCE_NAME"
        )
    }

    fn views_query(&self, schema: &str) -> String {
        format!(
            "SELECT VIEW_NAME, TEXT AS STATEMENT FROM ALL_VIEWS \
             WHERE OWNER = {schema} \
             ORDER BY VIEW_NAME"
        )
    }

    fn functions_query(&self, schema: &str) -> String {
        format!(
            "SELECT o.OBJECT_NAME AS FUNCTION_NAME, \
                    (SELECT a.DATA_TYPE FROM ALL_ARGUMENTS a \
                     WHERE a.OWNER = o.OWNER AND a.OBJECT_NAME = o.OBJECT_NAME \
                       AND a.PACKAGE_NAME IS NULL AND a.POSITION = 0) AS RETURN_TYPE, \
                    (SELECT LISTAGG(a.ARGUMENT_NAME || ' ' || a.DATA_TYPE, ', ') \
                            WITHIN GROUP (ORDER BY a.POSITION) \
                     FROM ALL_ARGUMENTS a \
                     WHERE a.OWNER = o.OWNER AND a.OBJECT_NAME = o.OBJECT_NAME \
                       AND a.PACKAGE_NAME IS NULL AND a.POSITION > 0) AS ARGUMENTS \
             FROM ALL_OBJECTS o \
             WHERE o.OWNER = {schema} AND o.OBJECT_TYPE IN ('FUNCTION', 'PROCEDURE') \
             ORDER BY o.OBJECT_NAME"
        )
    }

    fn source_query(&self, schema: &str) -> Option<String> {
        Some(format!(
            "SELECT NAME, TEXT FROM ALL_SOURCE \
             WHERE OWNER = {schema} AND TYPE IN ('FUNCTION', 'PROCEDURE') \
             ORDER BY NAME, LINE"
        ))
    }

    fn check_condition(&self, condition: &str) -> Option<String> {
        if NOT_NULL_CHECK.is_match(condition) {
            None
        } else {
            Some(condition.trim().to_string())
        }
    }

    fn function_body(&self, source: &str) -> String {
        ROUTINE_HEADER.replace(source, "").trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_null_checks_are_system_checks() {
        let catalog = OracleCatalog;
        assert_eq!(catalog.check_condition("\"NAME\" IS NOT NULL"), None);
        assert_eq!(catalog.check_condition("AD_CLIENT_ID IS NOT NULL"), None);
        assert_eq!(
            catalog.check_condition("ISACTIVE IN ('Y','N')").as_deref(),
            Some("ISACTIVE IN ('Y','N')")
        );
    }

    #[test]
    fn test_function_body_strips_header() {
        let source = "FUNCTION AD_GET_NAME(P_ID NUMBER) RETURN VARCHAR2 AS\nBEGIN\n  RETURN 'x';\nEND;\n";
        assert_eq!(
            OracleCatalog.function_body(source),
            "BEGIN\n  RETURN 'x';\nEND;"
        );
    }
}
