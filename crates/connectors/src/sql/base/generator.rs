use crate::sql::base::{
    dialect::Dialect,
    error::DbError,
    statement::{ColumnSlot, Slot, Statement, StatementShape},
};

pub struct QueryGenerator<'a> {
    dialect: &'a dyn Dialect,
}

impl<'a> QueryGenerator<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect }
    }

    /// Multi-key lookup returning `columns` for every row matching one of
    /// `width` key tuples.
    pub fn select_by_keys(
        &self,
        table: &str,
        columns: &[String],
        keys: &[String],
        width: usize,
    ) -> Result<Statement, DbError> {
        if keys.is_empty() || width == 0 {
            return Err(DbError::QueryBuild(format!(
                "select on '{table}' needs at least one key and one key tuple"
            )));
        }

        let select_list = columns
            .iter()
            .map(|c| self.dialect.identifier(c))
            .collect::<Vec<_>>()
            .join(", ");

        let mut index = 0;
        let predicates = (0..width)
            .map(|_| {
                let tuple = keys
                    .iter()
                    .map(|k| {
                        let p = format!(
                            "{} = {}",
                            self.dialect.identifier(k),
                            self.dialect.get_placeholder(index)
                        );
                        index += 1;
                        p
                    })
                    .collect::<Vec<_>>()
                    .join(" AND ");
                if keys.len() > 1 && width > 1 {
                    format!("({tuple})")
                } else {
                    tuple
                }
            })
            .collect::<Vec<_>>()
            .join(" OR ");

        Ok(Statement {
            sql: format!(
                "SELECT {select_list} FROM {} WHERE {predicates}",
                self.dialect.identifier(table)
            ),
            shape: StatementShape::SelectByKeys {
                table: table.to_string(),
                columns: columns.to_vec(),
                keys: keys.to_vec(),
                width,
            },
        })
    }

    pub fn insert(&self, table: &str, columns: Vec<ColumnSlot>) -> Result<Statement, DbError> {
        if columns.is_empty() {
            return Err(DbError::QueryBuild(format!(
                "insert into '{table}' has no columns"
            )));
        }

        let names = columns
            .iter()
            .map(|c| self.dialect.identifier(&c.column))
            .collect::<Vec<_>>()
            .join(", ");

        let mut index = 0;
        let values = columns
            .iter()
            .map(|c| self.render_slot(&c.slot, &mut index))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(Statement {
            sql: format!(
                "INSERT INTO {} ({names}) VALUES ({values})",
                self.dialect.identifier(table)
            ),
            shape: StatementShape::Insert {
                table: table.to_string(),
                columns,
            },
        })
    }

    pub fn update(
        &self,
        table: &str,
        set: Vec<ColumnSlot>,
        keys: &[String],
    ) -> Result<Statement, DbError> {
        if set.is_empty() || keys.is_empty() {
            return Err(DbError::QueryBuild(format!(
                "update of '{table}' needs at least one column and one key"
            )));
        }

        let mut index = 0;
        let assignments = set
            .iter()
            .map(|c| {
                format!(
                    "{} = {}",
                    self.dialect.identifier(&c.column),
                    self.render_slot(&c.slot, &mut index)
                )
            })
            .collect::<Vec<_>>()
            .join(", ");

        let predicate = keys
            .iter()
            .map(|k| {
                let p = format!(
                    "{} = {}",
                    self.dialect.identifier(k),
                    self.dialect.get_placeholder(index)
                );
                index += 1;
                p
            })
            .collect::<Vec<_>>()
            .join(" AND ");

        Ok(Statement {
            sql: format!(
                "UPDATE {} SET {assignments} WHERE {predicate}",
                self.dialect.identifier(table)
            ),
            shape: StatementShape::Update {
                table: table.to_string(),
                set,
                keys: keys.to_vec(),
            },
        })
    }

    fn render_slot(&self, slot: &Slot, index: &mut usize) -> String {
        match slot {
            Slot::Param => {
                let p = self.dialect.get_placeholder(*index);
                *index += 1;
                p
            }
            Slot::Sql(sql) => sql.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::base::dialect::{MySql, Postgres};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn select_by_composite_keys() {
        let generator = QueryGenerator::new(&Postgres);
        let stmt = generator
            .select_by_keys("t", &strings(&["a", "b", "v"]), &strings(&["a", "b"]), 2)
            .unwrap();

        assert_eq!(
            stmt.sql,
            "SELECT a, b, v FROM t WHERE (a = $1 AND b = $2) OR (a = $3 AND b = $4)"
        );
        assert_eq!(stmt.parameter_count(), 4);
    }

    #[test]
    fn select_single_key_single_tuple() {
        let generator = QueryGenerator::new(&MySql);
        let stmt = generator
            .select_by_keys("t", &strings(&["id", "v"]), &strings(&["id"]), 1)
            .unwrap();
        assert_eq!(stmt.sql, "SELECT id, v FROM t WHERE id = ?");
    }

    #[test]
    fn insert_inlines_sql_slots() {
        let generator = QueryGenerator::new(&Postgres);
        let stmt = generator
            .insert(
                "people",
                vec![
                    ColumnSlot::param("source"),
                    ColumnSlot::sql("created_at", "now()"),
                    ColumnSlot::param("id"),
                    ColumnSlot::param("name"),
                ],
            )
            .unwrap();

        assert_eq!(
            stmt.sql,
            "INSERT INTO people (source, created_at, id, name) VALUES ($1, now(), $2, $3)"
        );
        assert_eq!(stmt.parameter_count(), 3);
    }

    #[test]
    fn update_binds_set_then_keys() {
        let generator = QueryGenerator::new(&Postgres);
        let stmt = generator
            .update(
                "people",
                vec![
                    ColumnSlot::sql("updated_at", "now()"),
                    ColumnSlot::param("name"),
                ],
                &strings(&["id"]),
            )
            .unwrap();

        assert_eq!(
            stmt.sql,
            "UPDATE people SET updated_at = now(), name = $1 WHERE id = $2"
        );
        assert_eq!(stmt.parameter_count(), 2);
    }

    #[test]
    fn rejects_empty_shapes() {
        let generator = QueryGenerator::new(&Postgres);
        assert!(generator.insert("t", Vec::new()).is_err());
        assert!(generator.select_by_keys("t", &[], &[], 3).is_err());
        assert!(generator.update("t", vec![ColumnSlot::param("a")], &[]).is_err());
    }
}
