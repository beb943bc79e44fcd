//! Parameter resolution
//!
//! Maps symbolic references in node parameters to concrete values against a
//! run snapshot:
//!
//! - `$(params.<name>)`: run input override, else the declared default
//! - `$(communal.<name>)`: run communal value, else the declared default
//! - `$(task.<node>.output.<key>)`: output of an earlier node
//!
//! Anything else is a literal. Resolution is single-pass and total: an
//! unresolvable reference becomes the empty string.

use weft_core::domain::pipeline::{lookup, KeyAndValue, ParamSpec};
use weft_core::domain::{PipelineRun, When};

const PARAMS_PREFIX: &str = "$(params.";
const COMMUNAL_PREFIX: &str = "$(communal.";
const TASK_PREFIX: &str = "$(task.";
const OUTPUT_SEPARATOR: &str = ".output.";

/// A parsed parameter value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference<'a> {
    Params(&'a str),
    Communal(&'a str),
    /// `None` when the expression does not split into exactly a node and a key
    Task(Option<(&'a str, &'a str)>),
    Literal(&'a str),
}

impl<'a> Reference<'a> {
    /// Classifies `value` by prefix. The closing `)` is trimmed if present.
    pub fn parse(value: &'a str) -> Self {
        if let Some(rest) = value.strip_prefix(PARAMS_PREFIX) {
            return Reference::Params(trim_close(rest));
        }
        if let Some(rest) = value.strip_prefix(TASK_PREFIX) {
            let parts: Vec<&str> = trim_close(rest).split(OUTPUT_SEPARATOR).collect();
            return match parts.as_slice() {
                [node, key] => Reference::Task(Some((*node, *key))),
                _ => Reference::Task(None),
            };
        }
        if let Some(rest) = value.strip_prefix(COMMUNAL_PREFIX) {
            return Reference::Communal(trim_close(rest));
        }
        Reference::Literal(value)
    }
}

fn trim_close(s: &str) -> &str {
    s.strip_suffix(')').unwrap_or(s)
}

/// Resolution scope captured from one run snapshot
///
/// Building the scope layers run overrides over declared defaults once, so
/// many values can be resolved against the same snapshot.
pub struct Scope<'r> {
    run: &'r PipelineRun,
    params: Vec<KeyAndValue>,
    communal: Vec<KeyAndValue>,
}

impl<'r> Scope<'r> {
    pub fn new(run: &'r PipelineRun) -> Self {
        let declared = &run.pipeline.spec;

        let mut params = layer(&run.spec.params, &declared.params);
        // Communal declarations are visible through `params.` too, taking
        // their override from the run inputs. Declared params win on a name
        // clash because lookup is first-match.
        params.extend(layer(&run.spec.params, &declared.communal));

        let communal = layer(&run.spec.communal, &declared.communal);

        Self {
            run,
            params,
            communal,
        }
    }

    /// Resolves a single value.
    pub fn resolve(&self, value: &str) -> String {
        let resolved = match Reference::parse(value) {
            Reference::Params(name) => lookup(name, &self.params),
            Reference::Communal(name) => lookup(name, &self.communal),
            Reference::Task(Some((node, key))) => self
                .run
                .node_status(node)
                .and_then(|status| lookup(key, &status.output)),
            Reference::Task(None) => None,
            Reference::Literal(literal) => Some(literal),
        };
        resolved.unwrap_or_default().to_string()
    }

    /// Resolves every value of `input`, keeping keys and order.
    pub fn resolve_all(&self, input: &[KeyAndValue]) -> Vec<KeyAndValue> {
        input
            .iter()
            .map(|kv| KeyAndValue::new(kv.key.clone(), self.resolve(&kv.value)))
            .collect()
    }

    /// Evaluates a node's `when` list. Returns the reason when the node must
    /// be skipped.
    ///
    /// Only the first condition is authoritative: evaluation returns from the
    /// first entry, it is not a conjunction of all entries.
    pub fn skip_reason(&self, when: &[When]) -> Option<String> {
        let first = when.first()?;
        if first.values.is_empty() {
            return None;
        }

        let input = self.resolve(&first.input);
        let values: Vec<String> = first.values.iter().map(|v| self.resolve(v)).collect();

        let satisfied = match Operator::parse(&first.operator) {
            Some(Operator::Eq) => input == values[0],
            Some(Operator::In) => values.iter().any(|v| *v == input),
            None => false,
        };

        if satisfied {
            None
        } else {
            Some(format!(
                "when {} {} {:?} not satisfied (input {:?})",
                first.input, first.operator, first.values, input
            ))
        }
    }
}

/// Resolves `input` against `run`.
pub fn resolve_params(input: &[KeyAndValue], run: &PipelineRun) -> Vec<KeyAndValue> {
    Scope::new(run).resolve_all(input)
}

/// Comparison operators accepted in `when` conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    In,
}

impl Operator {
    /// `None` for anything unrecognized, which fails closed (skip).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(Operator::Eq),
            "in" => Some(Operator::In),
            _ => None,
        }
    }
}

/// Builds name/value pairs for each declared spec, taking the first override
/// with a matching key or falling back to the default.
fn layer(overrides: &[KeyAndValue], declared: &[ParamSpec]) -> Vec<KeyAndValue> {
    declared
        .iter()
        .map(|spec| {
            let value = lookup(&spec.name, overrides).unwrap_or(&spec.default);
            KeyAndValue::new(spec.name.clone(), value)
        })
        .collect()
}
