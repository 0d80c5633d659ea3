use crate::{LibsqlError, Value};

/// SQL parameter container.
#[derive(Clone, Debug, PartialEq)]
pub enum Params {
    /// Positional values mapped to `?` placeholders.
    Positional(Vec<Value>),
    /// Named values mapped to `:name` style placeholders.
    Named(Vec<(String, Value)>),
}

impl Params {
    /// Builds positional parameters.
    pub fn positional(values: impl Into<Vec<Value>>) -> Self {
        Self::Positional(values.into())
    }

    /// Builds named parameters.
    ///
    /// Names can be provided with or without prefix (`:`, `@`, `$`).
    pub fn named<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::Named(
            pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    /// Builds parameters from dynamic JSON: an array binds positionally, an
    /// object by name, `null` binds nothing.
    pub fn from_json(args: &serde_json::Value) -> Result<Self, LibsqlError> {
        match args {
            serde_json::Value::Null => Ok(Self::default()),
            serde_json::Value::Array(values) => values
                .iter()
                .map(Value::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Positional),
            serde_json::Value::Object(map) => map
                .iter()
                .map(|(name, value)| Ok((name.clone(), Value::from_json(value)?)))
                .collect::<Result<Vec<_>, LibsqlError>>()
                .map(Self::Named),
            other => Err(LibsqlError::InvalidTypeArgument(format!(
                "statement arguments must be an array or an object, got {other}"
            ))),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Positional(values) => values.is_empty(),
            Self::Named(values) => values.is_empty(),
        }
    }

    pub fn is_named(&self) -> bool {
        matches!(self, Self::Named(_))
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::Positional(Vec::new())
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Self::Positional(values)
    }
}

impl<const N: usize> From<[Value; N]> for Params {
    fn from(values: [Value; N]) -> Self {
        Self::Positional(values.into())
    }
}

impl From<Vec<(String, Value)>> for Params {
    fn from(values: Vec<(String, Value)>) -> Self {
        Self::Named(values)
    }
}

/// SQL text plus its arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    /// SQL text.
    pub sql: String,
    /// Statement parameters.
    pub params: Params,
}

impl Statement {
    pub fn new<P: Into<Params>>(sql: impl Into<String>, params: P) -> Self {
        Self {
            sql: sql.into(),
            params: params.into(),
        }
    }

    /// Statement without arguments.
    pub fn sql(sql: impl Into<String>) -> Self {
        Self::new(sql, ())
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Self::sql(sql)
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Self::sql(sql)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{LibsqlError, Params, Statement, Value};

    #[test]
    fn positional_from_array() {
        let params: Params = [Value::integer(1), Value::text("kit")].into();
        match params {
            Params::Positional(values) => assert_eq!(values.len(), 2),
            _ => panic!("expected positional"),
        }
    }

    #[test]
    fn named_builder() {
        let params = Params::named([("name", Value::text("kit"))]);
        match params {
            Params::Named(values) => {
                assert_eq!(values.len(), 1);
                assert_eq!(values[0].0, "name");
            }
            _ => panic!("expected named"),
        }
    }

    #[test]
    fn json_args_pick_binding_style() {
        let positional = Params::from_json(&json!(["Ramons", 32, 45.5])).unwrap();
        assert_eq!(
            positional,
            Params::Positional(vec![
                Value::text("Ramons"),
                Value::integer(32),
                Value::float(45.5)
            ])
        );

        let named = Params::from_json(&json!({"name": "Ramons"})).unwrap();
        assert!(named.is_named());
        assert!(Params::from_json(&json!(null)).unwrap().is_empty());
    }

    #[test]
    fn json_args_reject_scalars_and_nested_values() {
        assert!(matches!(
            Params::from_json(&json!(5)),
            Err(LibsqlError::InvalidTypeArgument(_))
        ));
        assert!(matches!(
            Params::from_json(&json!([[1]])),
            Err(LibsqlError::InvalidTypeArgument(_))
        ));
    }

    #[test]
    fn statement_constructors() {
        let bare = Statement::sql("SELECT 1");
        assert!(bare.params.is_empty());
        let from_str: Statement = "DELETE FROM t".into();
        assert_eq!(from_str.sql, "DELETE FROM t");
    }
}
