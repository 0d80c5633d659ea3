use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::{
    wire::{self, ExecuteStatement, IntOrText, NamedArg, Request},
    Baton, Col, LibsqlError, Outcome, Params, PipelineResponse, ProtocolError, Statement,
    StatementResult, Value,
};

impl Request {
    /// Encodes a statement into an execute request.
    ///
    /// Empty parameter lists produce a statement with no argument field.
    pub fn execute(statement: &Statement) -> Result<Self, LibsqlError> {
        Ok(Self::Execute {
            stmt: build_execute_statement(&statement.sql, statement.params.clone())?,
        })
    }

    /// Plain SQL execute request without arguments.
    pub fn execute_sql(sql: impl Into<String>) -> Self {
        Self::Execute {
            stmt: ExecuteStatement {
                sql: sql.into(),
                args: None,
                named_args: None,
            },
        }
    }

    /// Encodes a multi-statement script; line breaks are removed.
    pub fn sequence(sql: &str) -> Self {
        Self::Sequence {
            sql: sql.replace(['\r', '\n'], ""),
        }
    }
}

pub(crate) fn build_execute_statement(
    sql: &str,
    params: Params,
) -> Result<ExecuteStatement, LibsqlError> {
    match params {
        Params::Positional(values) => {
            let args = values
                .into_iter()
                .map(encode_value)
                .collect::<Result<Vec<_>, _>>()?;

            Ok(ExecuteStatement {
                sql: sql.to_owned(),
                args: (!args.is_empty()).then_some(args),
                named_args: None,
            })
        }
        Params::Named(values) => {
            let named_args = values
                .into_iter()
                .map(|(name, value)| {
                    let name = normalize_named_parameter_name(&name)?;
                    let value = encode_value(value)?;
                    Ok(NamedArg { name, value })
                })
                .collect::<Result<Vec<_>, LibsqlError>>()?;

            Ok(ExecuteStatement {
                sql: sql.to_owned(),
                args: None,
                named_args: (!named_args.is_empty()).then_some(named_args),
            })
        }
    }
}

pub(crate) fn decode_response(
    response: wire::PipelineResponse,
) -> Result<PipelineResponse, LibsqlError> {
    let mut outcomes = Vec::with_capacity(response.results.len());

    for (request_index, result) in response.results.into_iter().enumerate() {
        match result.kind.as_str() {
            "ok" => {
                let envelope = result.response.ok_or_else(|| {
                    LibsqlError::Decode(format!(
                        "missing response payload for request {request_index}"
                    ))
                })?;
                outcomes.push(decode_ok_outcome(envelope, request_index)?);
            }
            "error" => {
                let error = result.error.ok_or_else(|| {
                    LibsqlError::Decode(format!(
                        "missing error payload for request {request_index}"
                    ))
                })?;
                outcomes.push(Outcome::Error(ProtocolError {
                    request_index,
                    message: error.message,
                    code: error.code,
                }));
                break;
            }
            other => {
                return Err(LibsqlError::Decode(format!(
                    "unknown pipeline result type '{other}' at request {request_index}"
                )))
            }
        }
    }

    Ok(PipelineResponse {
        baton: Baton::from_response(response.baton),
        base_url: response.base_url.filter(|url| !url.is_empty()),
        outcomes,
    })
}

fn decode_ok_outcome(
    envelope: wire::ResponseEnvelope,
    request_index: usize,
) -> Result<Outcome, LibsqlError> {
    if let Some(result) = envelope.result {
        return decode_statement_result(result).map(Outcome::Execute);
    }
    match envelope.kind.as_deref() {
        None | Some("close") => Ok(Outcome::Close),
        Some("sequence") => Ok(Outcome::Sequence),
        Some("execute") => Err(LibsqlError::Decode(format!(
            "missing execute result payload at request {request_index}"
        ))),
        Some(other) => Err(LibsqlError::Decode(format!(
            "unexpected response type '{other}' at request {request_index}"
        ))),
    }
}

pub(crate) fn decode_statement_result(
    result: wire::ExecuteResult,
) -> Result<StatementResult, LibsqlError> {
    let cols = result
        .cols
        .into_iter()
        .map(|col| Col {
            name: col.name.unwrap_or_default(),
            decltype: col.decltype,
        })
        .collect();

    let rows = result
        .rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(decode_value)
                .collect::<Result<Vec<_>, LibsqlError>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    let last_insert_rowid = result
        .last_insert_rowid
        .map(|value| match value {
            IntOrText::Int(value) => Ok(value),
            IntOrText::Text(value) => value.parse::<i64>().map_err(|err| {
                LibsqlError::Decode(format!("invalid last_insert_rowid '{value}': {err}"))
            }),
        })
        .transpose()?;

    let replication_index = result.replication_index.map(|value| match value {
        IntOrText::Int(value) => value.to_string(),
        IntOrText::Text(value) => value,
    });

    Ok(StatementResult {
        cols,
        rows,
        affected_row_count: result.affected_row_count,
        last_insert_rowid,
        replication_index,
        rows_read: result.rows_read,
        rows_written: result.rows_written,
        query_duration_ms: result.query_duration_ms,
    })
}

pub(crate) fn decode_value(cell: wire::Cell) -> Result<Value, LibsqlError> {
    let wire::Cell {
        kind,
        value,
        base64,
    } = cell;

    match kind.as_str() {
        "null" => Ok(Value::Null),
        "integer" => match &value {
            serde_json::Value::String(text) => text.parse::<i64>().map(Value::Integer).map_err(
                |err| LibsqlError::Decode(format!("invalid integer value '{text}': {err}")),
            ),
            serde_json::Value::Number(number) => number
                .as_i64()
                .map(Value::Integer)
                .ok_or_else(|| LibsqlError::Decode(format!("invalid integer value '{number}'"))),
            other => Err(LibsqlError::Decode(format!(
                "invalid integer value '{other}'"
            ))),
        },
        "float" => {
            let parsed = match &value {
                serde_json::Value::Number(number) => number.as_f64(),
                serde_json::Value::String(text) => text.parse::<f64>().ok(),
                _ => None,
            };
            match parsed {
                Some(parsed) if parsed.is_finite() => Ok(Value::Float(parsed)),
                Some(_) => Err(LibsqlError::Decode(format!(
                    "non-finite float value '{value}' is unsupported"
                ))),
                None => Err(LibsqlError::Decode(format!("invalid float value '{value}'"))),
            }
        }
        "text" => match value {
            serde_json::Value::String(text) => Ok(Value::Text(text)),
            other => Err(LibsqlError::Decode(format!("invalid text value '{other}'"))),
        },
        "blob" => {
            let encoded = match (base64, value) {
                (Some(encoded), _) => encoded,
                (None, serde_json::Value::String(encoded)) => encoded,
                (None, other) => {
                    return Err(LibsqlError::Decode(format!("invalid blob value '{other}'")))
                }
            };
            STANDARD
                .decode(encoded.as_bytes())
                .map(Value::Blob)
                .map_err(|err| LibsqlError::Decode(format!("invalid base64 blob: {err}")))
        }
        _ => Ok(match value {
            serde_json::Value::Null => Value::Text(String::new()),
            serde_json::Value::String(text) => Value::Text(text),
            other => Value::Text(other.to_string()),
        }),
    }
}

pub(crate) fn encode_value(value: Value) -> Result<wire::Value, LibsqlError> {
    match value {
        Value::Null => Ok(wire::Value::Null {}),
        Value::Integer(value) => Ok(wire::Value::Integer {
            value: value.to_string(),
        }),
        Value::Float(value) => {
            if !value.is_finite() {
                return Err(LibsqlError::InvalidTypeArgument(format!(
                    "non-finite float value '{value}' is unsupported"
                )));
            }
            Ok(wire::Value::Float { value })
        }
        Value::Text(value) => Ok(wire::Value::Text { value }),
        Value::Blob(bytes) => Ok(wire::Value::Blob {
            value: STANDARD.encode(bytes),
        }),
    }
}

fn normalize_named_parameter_name(name: &str) -> Result<String, LibsqlError> {
    let normalized = name
        .strip_prefix([':', '@', '$'])
        .unwrap_or(name);
    if normalized.is_empty() {
        return Err(LibsqlError::InvalidTypeArgument(
            "named parameter name cannot be empty".to_owned(),
        ));
    }
    Ok(normalized.to_owned())
}
