//! PostgreSQL catalog queries (information_schema and pg_catalog).

use super::CatalogDialect;

/// Catalog queries for PostgreSQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresCatalog;

const RULE: &str = "WHEN 'c' THEN 'CASCADE' WHEN 'n' THEN 'SET NULL' WHEN 'd' THEN 'SET DEFAULT' \
                    WHEN 'r' THEN 'RESTRICT' ELSE 'NO ACTION'";

impl CatalogDialect for PostgresCatalog {
    fn current_schema(&self) -> &'static str {
        "current_schema()"
    }

    fn tables_query(&self, catalog: Option<&str>, schema: &str) -> String {
        let catalog = catalog.map_or_else(String::new, |c| format!(" AND table_catalog = {c}"));
        format!(
            "SELECT table_name::text AS table_name, \
                    CASE table_type WHEN 'BASE TABLE' THEN 'TABLE' ELSE table_type::text END AS table_type \
             FROM information_schema.tables \
             WHERE table_schema = {schema}{catalog} \
             ORDER BY table_name"
        )
    }

    fn columns_query(&self, schema: &str) -> String {
        format!(
            "SELECT c.table_name::text AS table_name, c.column_name::text AS column_name, \
                    c.data_type::text AS data_type, \
                    c.character_maximum_length::int4 AS char_length, \
                    c.numeric_precision::int4 AS num_precision, \
                    c.numeric_scale::int4 AS num_scale, \
                    CASE WHEN c.is_nullable = 'YES' THEN 'Y' ELSE 'N' END AS nullable, \
                    c.column_default::text AS column_default, \
                    CASE WHEN c.is_identity = 'YES' THEN 'Y' ELSE 'N' END AS is_identity \
             FROM information_schema.columns c \
             WHERE c.table_schema = {schema} \
             ORDER BY c.table_name, c.ordinal_position"
        )
    }

    fn primary_keys_query(&self, schema: &str) -> String {
        format!(
            "SELECT cl.relname::text AS table_name, con.conname::text AS constraint_name, \
                    a.attname::text AS column_name \
             FROM pg_constraint con \
             JOIN pg_class cl ON cl.oid = con.conrelid \
             JOIN pg_namespace n ON n.oid = cl.relnamespace \
             CROSS JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord) \
             JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum \
             WHERE con.contype = 'p' AND n.nspname = {schema} \
             ORDER BY cl.relname, k.ord"
        )
    }

    fn foreign_keys_query(&self, schema: &str) -> String {
        format!(
            "SELECT cl.relname::text AS table_name, con.conname::text AS constraint_name, \
                    fcl.relname::text AS foreign_table, \
                    a.attname::text AS local_column, fa.attname::text AS foreign_column, \
                    CASE con.confdeltype {RULE} END AS delete_rule, \
                    CASE con.confupdtype {RULE} END AS update_rule \
             FROM pg_constraint con \
             JOIN pg_class cl ON cl.oid = con.conrelid \
             JOIN pg_class fcl ON fcl.oid = con.confrelid \
             JOIN pg_namespace n ON n.oid = cl.relnamespace \
             CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(local_attnum, foreign_attnum, ord) \
             JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.local_attnum \
             JOIN pg_attribute fa ON fa.attrelid = con.confrelid AND fa.attnum = k.foreign_attnum \
             WHERE con.contype = 'f' AND n.nspname = {schema} \
             ORDER BY cl.relname, con.conname, k.ord"
        )
    }

    fn indexes_query(&self, schema: &str) -> String {
        format!(
            "SELECT t.relname::text AS table_name, i.relname::text AS index_name, \
                    a.attname::text AS column_name, \
                    CASE WHEN ix.indisunique THEN 'Y' ELSE 'N' END AS is_unique, \
                    pg_get_expr(ix.indpred, ix.indrelid) AS condition, \
                    CASE WHEN ix.indisprimary OR EXISTS ( \
                        SELECT 1 FROM pg_constraint con \
                        WHERE con.conindid = ix.indexrelid AND con.conrelid = ix.indrelid \
                          AND con.contype IN ('p', 'u', 'x')) \
                    THEN 'Y' ELSE 'N' END AS is_system \
             FROM pg_index ix \
             JOIN pg_class i ON i.oid = ix.indexrelid \
             JOIN pg_class t ON t.oid = ix.indrelid \
             JOIN pg_namespace n ON n.oid = t.relnamespace \
             CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord) \
             JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum \
             WHERE n.nspname = {schema} AND t.relkind = 'r' \
             ORDER BY t.relname, i.relname, k.ord"
        )
    }

    fn checks_query(&self, schema: &str) -> String {
        format!(
            "SELECT cl.relname::text AS table_name, con.conname::text AS constraint_name, \
                    pg_get_constraintdef(con.oid) AS condition \
             FROM pg_constraint con \
             JOIN pg_class cl ON cl.oid = con.conrelid \
             JOIN pg_namespace n ON n.oid = cl.relnamespace \
             WHERE con.contype = 'c' AND n.nspname = {schema} \
             ORDER BY cl.relname, con.conname"
        )
    }

    fn triggers_query(&self, schema: &str) -> String {
        format!(
            "SELECT t.tgname::text AS trigger_name, c.relname::text AS table_name, \
                    CASE WHEN (t.tgtype::int & 2) <> 0 THEN 'BEFORE' ELSE 'AFTER' END AS timing, \
                    concat_ws(' OR ', \
                        CASE WHEN (t.tgtype::int & 4) <> 0 THEN 'INSERT' END, \
                        CASE WHEN (t.tgtype::int & 16) <> 0 THEN 'UPDATE' END, \
                        CASE WHEN (t.tgtype::int & 8) <> 0 THEN 'DELETE' END) AS events, \
                    CASE WHEN (t.tgtype::int & 1) <> 0 THEN 'Y' ELSE 'N' END AS for_each_row, \
                    p.prosrc AS body \
             FROM pg_trigger t \
             JOIN pg_class c ON c.oid = t.tgrelid \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             JOIN pg_proc p ON p.oid = t.tgfoid \
             WHERE n.nspname = {schema} AND NOT t.tgisinternal \
             ORDER BY c.relname, t.tgname"
        )
    }

    fn sequences_query(&self, schema: &str) -> String {
        // Sequences owned by serial or identity columns belong to their column.
        format!(
            "SELECT c.relname::text AS sequence_name, s.seqstart AS start_value, \
                    s.seqincrement AS increment_by \
             FROM pg_sequence s \
             JOIN pg_class c ON c.oid = s.seqrelid \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             WHERE n.nspname = {schema} \
               AND NOT EXISTS (SELECT 1 FROM pg_depend d \
                               WHERE d.objid = c.oid AND d.deptype IN ('a', 'i')) \
             ORDER BY c.relname"
        )
    }

    fn views_query(&self, schema: &str) -> String {
        format!(
            "SELECT table_name::text AS view_name, view_definition::text AS statement \
             FROM information_schema.views \
             WHERE table_schema = {schema} \
             ORDER BY table_name"
        )
    }

    fn functions_query(&self, schema: &str) -> String {
        format!(
            "SELECT p.proname::text AS function_name, \
                    CASE WHEN p.prorettype = 'void'::regtype THEN NULL \
                         ELSE format_type(p.prorettype, NULL) END AS return_type, \
                    pg_get_function_arguments(p.oid) AS arguments, \
                    p.prosrc AS body \
             FROM pg_proc p \
             JOIN pg_namespace n ON n.oid = p.pronamespace \
             WHERE n.nspname = {schema} AND p.prokind IN ('f', 'p') \
               AND p.prorettype <> 'trigger'::regtype \
               AND NOT EXISTS (SELECT 1 FROM pg_depend d \
                               WHERE d.objid = p.oid AND d.deptype = 'e') \
             ORDER BY p.proname"
        )
    }

    fn check_condition(&self, definition: &str) -> Option<String> {
        let definition = definition.trim();
        let definition = definition.strip_suffix(" NOT VALID").unwrap_or(definition);
        let inner = definition.strip_prefix("CHECK").unwrap_or(definition).trim();
        let mut condition = inner;
        loop {
            let stripped = strip_parens(condition).trim();
            if stripped == condition {
                return Some(condition.to_string());
            }
            condition = stripped;
        }
    }
}

/// Removes one pair of enclosing parentheses, when they enclose the whole
/// expression.
fn strip_parens(expr: &str) -> &str {
    let Some(inner) = expr.strip_prefix('(').and_then(|e| e.strip_suffix(')')) else {
        return expr;
    };
    let mut depth = 0i32;
    for c in inner.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return expr;
        }
    }
    inner
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_condition() {
        let catalog = PostgresCatalog;
        assert_eq!(
            catalog.check_condition("CHECK ((qty > 0))").as_deref(),
            Some("qty > 0")
        );
        assert_eq!(
            catalog.check_condition("CHECK ((a > 0) AND (b > 0)) NOT VALID").as_deref(),
            Some("(a > 0) AND (b > 0)")
        );
    }

    #[test]
    fn test_schema_is_an_expression() {
        let sql = PostgresCatalog.columns_query("'public'");
        assert!(sql.contains("WHERE c.table_schema = 'public'"));
        let sql = PostgresCatalog.tables_query(Some("'erp'"), "current_schema()");
        assert!(sql.contains("table_schema = current_schema() AND table_catalog = 'erp'"));
    }
}
