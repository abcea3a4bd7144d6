use crate::{
    error::EvalError,
    eval::functions::{FunctionRegistry, MapFunction, ScalarFunction},
};
use engine_config::{Configuration, ValueDefinition};
use model::{core::value::Value, records::record::Record};
use std::{collections::BTreeMap, fmt, sync::Arc};

/// Produces a column value from a mapped record.
pub trait ValueEvaluator: Send + Sync + fmt::Debug {
    fn eval(&self, column: &str, record: &Record) -> Result<Value, EvalError>;

    /// Raw SQL to inline into the statement instead of binding a value.
    fn sql(&self) -> Option<&str> {
        None
    }

    fn produces_sql(&self) -> bool {
        self.sql().is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Literal(pub Value);

impl ValueEvaluator for Literal {
    fn eval(&self, _column: &str, _record: &Record) -> Result<Value, EvalError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone)]
pub struct SqlLiteral(pub String);

impl ValueEvaluator for SqlLiteral {
    fn eval(&self, column: &str, _record: &Record) -> Result<Value, EvalError> {
        Err(EvalError::SqlNotEvaluable {
            column: column.to_string(),
        })
    }

    fn sql(&self) -> Option<&str> {
        Some(&self.0)
    }
}

#[derive(Clone)]
pub struct FunctionCall {
    name: String,
    function: ScalarFunction,
}

impl fmt::Debug for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FunctionCall({})", self.name)
    }
}

impl ValueEvaluator for FunctionCall {
    fn eval(&self, column: &str, record: &Record) -> Result<Value, EvalError> {
        (self.function)(column, record)
    }
}

pub fn compile(
    definition: &ValueDefinition,
    registry: &FunctionRegistry,
) -> Result<Arc<dyn ValueEvaluator>, EvalError> {
    let evaluator: Arc<dyn ValueEvaluator> = match definition {
        ValueDefinition::Sql { sql } => Arc::new(SqlLiteral(sql.clone())),
        ValueDefinition::Function { function } => Arc::new(FunctionCall {
            name: function.clone(),
            function: registry.scalar(function)?,
        }),
        ValueDefinition::Boolean(b) => Arc::new(Literal(Value::Boolean(*b))),
        ValueDefinition::Number(n) => Arc::new(Literal(number_value(n)?)),
        ValueDefinition::String(s) => Arc::new(Literal(Value::String(s.clone()))),
    };
    Ok(evaluator)
}

pub type EvaluatorMap = BTreeMap<String, Arc<dyn ValueEvaluator>>;

/// Every value definition of a configuration, resolved once per import.
#[derive(Clone, Default)]
pub struct Evaluators {
    pub insert_values: EvaluatorMap,
    pub update_values: EvaluatorMap,
    pub transform: EvaluatorMap,
    pub map: Option<(String, MapFunction)>,
}

impl Evaluators {
    pub fn compile(config: &Configuration, registry: &FunctionRegistry) -> Result<Self, EvalError> {
        let compile_all = |defs: &BTreeMap<String, ValueDefinition>| {
            defs.iter()
                .map(|(column, def)| Ok((column.clone(), compile(def, registry)?)))
                .collect::<Result<EvaluatorMap, EvalError>>()
        };

        let map = match &config.map {
            Some(name) => Some((name.clone(), registry.map_function(name)?)),
            None => None,
        };

        Ok(Evaluators {
            insert_values: compile_all(&config.insert_values)?,
            update_values: compile_all(&config.update_values)?,
            transform: compile_all(&config.transform)?,
            map,
        })
    }

    /// Runs the map function, or passes the record through when none is set.
    pub fn map_record(&self, record: Record) -> Result<Vec<Record>, EvalError> {
        match &self.map {
            Some((_, function)) => function(record),
            None => Ok(vec![record]),
        }
    }
}

impl fmt::Debug for Evaluators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluators")
            .field("insert_values", &self.insert_values)
            .field("update_values", &self.update_values)
            .field("transform", &self.transform)
            .field("map", &self.map.as_ref().map(|(name, _)| name))
            .finish()
    }
}

fn number_value(number: &serde_json::Number) -> Result<Value, EvalError> {
    if let Some(i) = number.as_i64() {
        return Ok(Value::Int(i));
    }
    number
        .as_f64()
        .map(Value::Float)
        .ok_or_else(|| EvalError::InvalidNumber(number.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_each_definition_kind() {
        let registry = FunctionRegistry::with_builtins();
        let record: Record = [("name", Value::from(" x "))].into_iter().collect();

        let sql = compile(&ValueDefinition::Sql { sql: "now()".into() }, &registry).unwrap();
        assert!(sql.produces_sql());
        assert_eq!(sql.sql(), Some("now()"));
        assert!(sql.eval("created", &record).is_err());

        let function = compile(
            &ValueDefinition::Function {
                function: "trim".into(),
            },
            &registry,
        )
        .unwrap();
        assert!(!function.produces_sql());
        assert_eq!(function.eval("name", &record).unwrap(), Value::from("x"));

        let number: ValueDefinition = serde_json::from_str("7").unwrap();
        assert_eq!(
            compile(&number, &registry).unwrap().eval("n", &record).unwrap(),
            Value::Int(7)
        );
        let float: ValueDefinition = serde_json::from_str("2.5").unwrap();
        assert_eq!(
            compile(&float, &registry).unwrap().eval("n", &record).unwrap(),
            Value::Float(2.5)
        );
    }

    #[test]
    fn configuration_with_unknown_function_fails_to_compile() {
        let mut config = Configuration::default();
        config.transform.insert(
            "name".into(),
            ValueDefinition::Function {
                function: "missing".into(),
            },
        );
        let err = Evaluators::compile(&config, &FunctionRegistry::with_builtins()).unwrap_err();
        assert!(matches!(err, EvalError::UnknownFunction(name) if name == "missing"));
    }

    #[test]
    fn map_record_passes_through_without_map_function() {
        let evaluators = Evaluators::default();
        let record: Record = [("a", Value::Int(1))].into_iter().collect();
        assert_eq!(evaluators.map_record(record.clone()).unwrap(), vec![record]);
    }
}
