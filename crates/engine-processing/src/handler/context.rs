use crate::{error::HandlerError, mediator::Router, partition::Partitioning};
use connectors::sql::base::{
    connection::SqlConnection, generator::QueryGenerator, statement::ColumnSlot,
};
use engine_config::Configuration;
use engine_core::{
    eval::evaluator::{EvaluatorMap, Evaluators},
    metrics::Instrumentation,
};
use model::{
    core::{fingerprint::Fingerprint, value::Value},
    records::record::Record,
};
use std::sync::Arc;
use tracing::debug;

/// Column lists every handler of an import works from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    /// Mapped columns by source index minus transient ones, then synthetic
    /// columns in sorted order.
    pub table_columns: Vec<String>,
    pub primary_keys: Vec<String>,
}

impl ColumnLayout {
    pub fn new(config: &Configuration) -> Self {
        ColumnLayout {
            table_columns: config.target_columns(),
            primary_keys: config.primary_keys.clone(),
        }
    }

    /// Columns fetched by the batched lookup: the table columns plus any
    /// primary key not among them.
    pub fn select_columns(&self) -> Vec<String> {
        let mut columns = self.table_columns.clone();
        for key in &self.primary_keys {
            if !columns.iter().any(|c| c.eq_ignore_ascii_case(key)) {
                columns.push(key.clone());
            }
        }
        columns
    }
}

/// Everything one worker's handlers share.
pub struct HandlerContext {
    pub config: Arc<Configuration>,
    pub evaluators: Arc<Evaluators>,
    pub connection: Arc<dyn SqlConnection>,
    /// Present when records are routed to the partition owning their key.
    pub router: Option<Arc<dyn Router>>,
    pub partition: Partitioning,
    pub metrics: Arc<dyn Instrumentation>,
    pub layout: ColumnLayout,
}

impl HandlerContext {
    pub fn new(
        config: Arc<Configuration>,
        evaluators: Arc<Evaluators>,
        connection: Arc<dyn SqlConnection>,
        router: Option<Arc<dyn Router>>,
        partition: Partitioning,
        metrics: Arc<dyn Instrumentation>,
    ) -> Result<Self, HandlerError> {
        if let Some((column, _)) = evaluators.transform.iter().find(|(_, e)| e.produces_sql()) {
            return Err(HandlerError::SqlTransform(column.clone()));
        }

        let layout = ColumnLayout::new(&config);
        let router = router.filter(|_| config.ignore_duplicate_pk);

        Ok(HandlerContext {
            config,
            evaluators,
            connection,
            router,
            partition,
            metrics,
            layout,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.config.effective_batch_size()
    }

    pub fn table(&self) -> &str {
        &self.config.target_table
    }

    pub fn generator(&self) -> QueryGenerator<'_> {
        QueryGenerator::new(self.connection.dialect())
    }

    /// Value of `column` for `record`: the configured transform if there is
    /// one, the record's own value otherwise.
    pub fn transform(&self, column: &str, record: &Record) -> Result<Value, HandlerError> {
        match self.evaluators.transform.get(column) {
            Some(evaluator) if evaluator.produces_sql() => {
                Err(HandlerError::SqlTransform(column.to_string()))
            }
            Some(evaluator) => Ok(evaluator.eval(column, record)?),
            None => Ok(record.value(column)),
        }
    }

    pub fn key_values(&self, record: &Record) -> Result<Vec<Value>, HandlerError> {
        self.layout
            .primary_keys
            .iter()
            .map(|key| self.transform(key, record))
            .collect()
    }

    pub fn fingerprint(&self, record: &Record) -> Result<Fingerprint, HandlerError> {
        Ok(Fingerprint::from_values(&self.key_values(record)?))
    }

    /// Hands `record` over to its owner when another partition owns
    /// `fingerprint`; gives it back otherwise.
    pub async fn claim(
        &self,
        fingerprint: &Fingerprint,
        record: Record,
    ) -> Result<Option<Record>, HandlerError> {
        let Some(router) = &self.router else {
            return Ok(Some(record));
        };
        let owner = self.partition.owner_of(fingerprint);
        if owner == self.partition.id {
            return Ok(Some(record));
        }
        debug!(
            partition = self.partition.id,
            owner,
            key = %fingerprint,
            "Rerouting record"
        );
        router.dispatch_to(self.partition.id, record, owner).await?;
        Ok(None)
    }

    /// Table columns and their transformed values.
    pub fn row_image(&self, record: &Record) -> Result<Record, HandlerError> {
        let mut image = Record::with_capacity(self.layout.table_columns.len());
        for column in &self.layout.table_columns {
            image.insert(column.clone(), self.transform(column, record)?);
        }
        Ok(image)
    }

    /// Whether `record` would change any table column of `existing`.
    pub fn differs(&self, existing: &Record, record: &Record) -> Result<bool, HandlerError> {
        for column in &self.layout.table_columns {
            let incoming = self.transform(column, record)?;
            if !existing.value(column).matches(&incoming) {
                debug!(column = %column, old = %existing.value(column), new = %incoming, "Column changed");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// INSERT columns: value-defined columns in name order, then the table
    /// columns.
    pub fn insert_slots(&self) -> Vec<ColumnSlot> {
        let mut slots = value_slots(&self.evaluators.insert_values);
        slots.extend(self.layout.table_columns.iter().map(ColumnSlot::param));
        slots
    }

    pub fn insert_params(&self, record: &Record) -> Result<Vec<Value>, HandlerError> {
        let mut params = value_params(&self.evaluators.insert_values, record)?;
        for column in &self.layout.table_columns {
            params.push(self.transform(column, record)?);
        }
        Ok(params)
    }

    /// UPDATE SET columns: value-defined columns in name order, then the
    /// table columns.
    pub fn update_slots(&self) -> Vec<ColumnSlot> {
        let mut slots = value_slots(&self.evaluators.update_values);
        slots.extend(self.layout.table_columns.iter().map(ColumnSlot::param));
        slots
    }

    /// SET parameters followed by the transformed primary keys.
    pub fn update_params(&self, record: &Record) -> Result<Vec<Value>, HandlerError> {
        let mut params = value_params(&self.evaluators.update_values, record)?;
        for column in &self.layout.table_columns {
            params.push(self.transform(column, record)?);
        }
        params.extend(self.key_values(record)?);
        Ok(params)
    }
}

fn value_slots(values: &EvaluatorMap) -> Vec<ColumnSlot> {
    values
        .iter()
        .map(|(column, evaluator)| match evaluator.sql() {
            Some(sql) => ColumnSlot::sql(column.clone(), sql),
            None => ColumnSlot::param(column.clone()),
        })
        .collect()
}

fn value_params(values: &EvaluatorMap, record: &Record) -> Result<Vec<Value>, HandlerError> {
    values
        .iter()
        .filter(|(_, evaluator)| !evaluator.produces_sql())
        .map(|(column, evaluator)| Ok(evaluator.eval(column, record)?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedConnection, context};
    use engine_config::ValueDefinition;

    #[test]
    fn layout_appends_keys_missing_from_the_table_columns() {
        let mut config = Configuration::default();
        config.column_mappings.insert(0, "name".into());
        config.primary_keys = vec!["id".into()];
        config.synthetic_columns = vec!["id".into()];

        let layout = ColumnLayout::new(&config);
        assert_eq!(layout.table_columns, vec!["name", "id"]);
        assert_eq!(layout.select_columns(), vec!["name", "id"]);

        config.synthetic_columns.clear();
        assert_eq!(ColumnLayout::new(&config).select_columns(), vec!["name", "id"]);
    }

    #[test]
    fn sql_transforms_are_rejected_up_front() {
        let mut config = Configuration::default();
        config.column_mappings.insert(0, "id".into());
        config
            .transform
            .insert("id".into(), ValueDefinition::Sql { sql: "now()".into() });

        let result = context(config, ScriptedConnection::new(), None, Partitioning::single());
        assert!(matches!(result, Err(HandlerError::SqlTransform(c)) if c == "id"));
    }

    #[test]
    fn insert_parameters_follow_the_slot_order() {
        let mut config = Configuration::default();
        config.column_mappings.insert(0, "id".into());
        config.column_mappings.insert(1, "name".into());
        config.insert_values.insert(
            "created_at".into(),
            ValueDefinition::Sql {
                sql: "now()".into(),
            },
        );
        config
            .insert_values
            .insert("source".into(), ValueDefinition::String("csv".into()));
        config.transform.insert(
            "name".into(),
            ValueDefinition::Function {
                function: "upper".into(),
            },
        );

        let ctx = context(config, ScriptedConnection::new(), None, Partitioning::single()).unwrap();
        let slots: Vec<_> = ctx.insert_slots().into_iter().map(|s| s.column).collect();
        assert_eq!(slots, vec!["created_at", "source", "id", "name"]);

        let record: Record = [("id", Value::from("1")), ("name", Value::from("ada"))]
            .into_iter()
            .collect();
        assert_eq!(
            ctx.insert_params(&record).unwrap(),
            vec![Value::from("csv"), Value::from("1"), Value::from("ADA")]
        );
    }
}
