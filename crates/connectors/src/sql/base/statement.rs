use std::{fmt, sync::Arc};

/// Where the value for one column of an INSERT or UPDATE comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Bound as the next statement parameter.
    Param,
    /// Raw SQL inlined into the statement text.
    Sql(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSlot {
    pub column: String,
    pub slot: Slot,
}

impl ColumnSlot {
    pub fn param(column: impl Into<String>) -> Self {
        ColumnSlot {
            column: column.into(),
            slot: Slot::Param,
        }
    }

    pub fn sql(column: impl Into<String>, sql: impl Into<String>) -> Self {
        ColumnSlot {
            column: column.into(),
            slot: Slot::Sql(sql.into()),
        }
    }

    pub fn is_param(&self) -> bool {
        self.slot == Slot::Param
    }
}

/// Structure of a generated statement, alongside its SQL text.
///
/// Parameters are always bound in the order the shape lists them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementShape {
    /// `SELECT columns FROM table WHERE (keys = ?) OR ...` with `width` key
    /// tuples, bound row-major.
    SelectByKeys {
        table: String,
        columns: Vec<String>,
        keys: Vec<String>,
        width: usize,
    },
    /// `INSERT INTO table (...) VALUES (...)`, one parameter per `Slot::Param`.
    Insert {
        table: String,
        columns: Vec<ColumnSlot>,
    },
    /// `UPDATE table SET ... WHERE keys = ?`; `Slot::Param` set columns are
    /// bound first, then the keys.
    Update {
        table: String,
        set: Vec<ColumnSlot>,
        keys: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub shape: StatementShape,
}

impl Statement {
    pub fn parameter_count(&self) -> usize {
        match &self.shape {
            StatementShape::SelectByKeys { keys, width, .. } => keys.len() * width,
            StatementShape::Insert { columns, .. } => columns.iter().filter(|c| c.is_param()).count(),
            StatementShape::Update { set, keys, .. } => {
                set.iter().filter(|c| c.is_param()).count() + keys.len()
            }
        }
    }

    pub fn table(&self) -> &str {
        match &self.shape {
            StatementShape::SelectByKeys { table, .. }
            | StatementShape::Insert { table, .. }
            | StatementShape::Update { table, .. } => table,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)
    }
}

/// A statement prepared on one connection. Only valid on that connection.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    id: u64,
    statement: Arc<Statement>,
}

impl PreparedStatement {
    pub fn new(id: u64, statement: Statement) -> Self {
        PreparedStatement {
            id,
            statement: Arc::new(statement),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    pub fn sql(&self) -> &str {
        &self.statement.sql
    }

    pub fn shape(&self) -> &StatementShape {
        &self.statement.shape
    }
}
