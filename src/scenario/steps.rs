//! Step interpreter
//!
//! Executes the steps of a [`ScenarioDefinition`] in order against the
//! shared [`Harness`] collaborators. The first failing step fails the
//! scenario; later steps do not run.
//!
//! String values may contain placeholders:
//!
//! - `${created.<path>}`: the entity recorded by the latest create step
//! - `${last.<path>}`: the JSON body of the last response
//! - `${random.email}`, `${random.username}`, `${random.name}`, `${random.phone}`
//!
//! A value consisting of a single placeholder keeps the JSON type of what
//! it resolves to, so `id: "${created.id}"` stays a number.

use std::sync::Arc;

use serde_json::Value;

use super::context::ScenarioContext;
use super::coordinator::ScenarioBody;
use super::definition::{render, ResourceKind, ResponseExpectation, ScenarioDefinition, Step};
use crate::common::{Error, Result};
use crate::db::SqlValue;
use crate::harness::Harness;
use crate::http::{extract_as, validate_status, Exchange, Method, Response};
use crate::resources::{Resource, ResourceClient};
use crate::testdata;

pub struct StepBody {
    harness: Arc<Harness>,
    definition: ScenarioDefinition,
}

impl StepBody {
    pub fn new(harness: Arc<Harness>, definition: ScenarioDefinition) -> Self {
        Self { harness, definition }
    }

    pub fn definition(&self) -> &ScenarioDefinition {
        &self.definition
    }

    fn execute(&self, step: &Step, ctx: &mut ScenarioContext) -> Result<()> {
        match step {
            Step::Request {
                method,
                path,
                path_params,
                query,
                body,
                save_response,
                expect,
            } => {
                let method: Method = method.parse()?;
                let mut exchange = Exchange::new(method, interpolate_str(path, ctx)?);
                for (name, value) in path_params {
                    exchange = exchange.path_param(name.as_str(), render(&interpolate(value, ctx)?));
                }
                for (name, value) in query {
                    exchange = exchange.query(name.as_str(), render(&interpolate(value, ctx)?));
                }
                if let Some(body) = body {
                    let body = interpolate(body, ctx)?;
                    ctx.set_last_request(body.clone());
                    exchange = exchange.body_value(body);
                }

                let response = self.harness.executor().execute(exchange)?;
                if let Some(name) = save_response {
                    self.save_response(name, &response);
                }
                ctx.set_response(response);

                if let Some(expect) = expect {
                    check_expectation(expect, ctx)?;
                }
                Ok(())
            }
            Step::CreateUser { user } => self.create(&self.harness.users(), user, ctx),
            Step::CreatePost { post } => self.create(&self.harness.posts(), post, ctx),
            Step::ExpectExists { resource, id, exists } => {
                let id = as_id(&interpolate(id, ctx)?)?;
                let probe = match resource {
                    ResourceKind::Users => self.harness.users().probe(id),
                    ResourceKind::Posts => self.harness.posts().probe(id),
                };
                if probe.exists() != *exists {
                    return Err(Error::Assertion(format!(
                        "Expected {}/{id} exists={exists}, but probe returned {probe:?}",
                        resource.as_str()
                    )));
                }
                Ok(())
            }
            Step::DbRecordExists {
                table,
                predicate,
                params,
                expect,
            } => {
                let params = sql_params(params, ctx)?;
                let found = ctx.db()?.record_exists(table, predicate, &params)?;
                if found != *expect {
                    return Err(Error::Assertion(format!(
                        "Expected record in {table} where {predicate} to exist: {expect}, but found: {found}"
                    )));
                }
                Ok(())
            }
            Step::DbRowMatches { query, params, fields } => {
                let params = sql_params(params, ctx)?;
                let rows = ctx.db()?.execute_query(query, &params)?;
                let row = rows
                    .first()
                    .ok_or_else(|| Error::Assertion(format!("Query returned no rows: {query}")))?;
                for (column, expected) in fields {
                    let expected = interpolate(expected, ctx)?;
                    let actual = row.get(column).cloned().unwrap_or(Value::Null);
                    if !values_match(&expected, &actual) {
                        return Err(Error::field_mismatch(column, &expected, &actual));
                    }
                }
                Ok(())
            }
            Step::ExpectStatus { status } => validate_status(ctx.require_response()?, *status),
        }
    }

    fn create<R: Resource>(&self, client: &ResourceClient<R>, entity: &Value, ctx: &mut ScenarioContext) -> Result<()> {
        let entity = interpolate(entity, ctx)?;
        ctx.set_last_request(entity.clone());
        let submitted: R = serde_json::from_value(entity)
            .map_err(|e| Error::Assertion(format!("Invalid {} entity in scenario: {e}", R::NAME)))?;
        let created = client.create_and_validate(&submitted)?;
        ctx.record_created(R::NAME, serde_json::to_value(&created)?);
        Ok(())
    }

    fn save_response(&self, name: &str, response: &Response) {
        let body = testdata::pretty_json(response.body());
        match self.harness.artifacts().save_response(name, &body) {
            Ok(path) => tracing::debug!(path = %path.display(), "Response captured"),
            Err(e) => tracing::error!(error = %e, "Failed to capture response"),
        }
    }
}

impl ScenarioBody for StepBody {
    fn run(&self, ctx: &mut ScenarioContext) -> Result<()> {
        let total = self.definition.steps.len();
        for (i, step) in self.definition.steps.iter().enumerate() {
            let number = i + 1;
            tracing::info!(scenario = %self.definition.name, step = number, total, "{}", step.describe());
            if let Err(e) = self.execute(step, ctx) {
                tracing::error!(scenario = %self.definition.name, step = number, error = %e, "Step failed");
                return Err(e);
            }
        }
        Ok(())
    }
}

fn check_expectation(expect: &ResponseExpectation, ctx: &ScenarioContext) -> Result<()> {
    let response = ctx.require_response()?;
    if let Some(status) = expect.status {
        validate_status(response, status)?;
    }
    if let Some(needle) = &expect.body_contains {
        let needle = interpolate_str(needle, ctx)?;
        if !response.body().contains(&needle) {
            return Err(Error::Assertion(format!(
                "Expected response body to contain '{needle}', got: {}",
                response.body()
            )));
        }
    }
    if !expect.fields.is_empty() {
        let body: Value = extract_as(response)?;
        for (path, expected) in &expect.fields {
            let expected = interpolate(expected, ctx)?;
            let actual = lookup(&body, path).cloned().unwrap_or(Value::Null);
            if !values_match(&expected, &actual) {
                return Err(Error::field_mismatch(path, &expected, &actual));
            }
        }
    }
    Ok(())
}

fn sql_params(params: &[Value], ctx: &ScenarioContext) -> Result<Vec<SqlValue>> {
    params
        .iter()
        .map(|p| interpolate(p, ctx).map(|v| SqlValue::from_json(&v)))
        .collect()
}

fn as_id(value: &Value) -> Result<i64> {
    let id = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    id.ok_or_else(|| Error::Assertion(format!("'{}' is not a numeric id", render(value))))
}

/// Resolve placeholders anywhere inside `value`
pub fn interpolate(value: &Value, ctx: &ScenarioContext) -> Result<Value> {
    match value {
        Value::String(s) => interpolate_value(s, ctx),
        Value::Array(items) => items
            .iter()
            .map(|item| interpolate(item, ctx))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), interpolate(v, ctx)?)))
            .collect::<Result<serde_json::Map<_, _>>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

fn interpolate_value(s: &str, ctx: &ScenarioContext) -> Result<Value> {
    if let Some(expr) = s.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
        if !expr.contains("${") && !expr.contains('}') {
            return resolve(expr, ctx);
        }
    }
    interpolate_str(s, ctx).map(Value::String)
}

/// Resolve placeholders in a string, rendering each as text
pub fn interpolate_str(s: &str, ctx: &ScenarioContext) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| Error::Assertion(format!("Unterminated placeholder in '{s}'")))?;
        out.push_str(&render(&resolve(&after[..end], ctx)?));
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn resolve(expr: &str, ctx: &ScenarioContext) -> Result<Value> {
    let expr = expr.trim();
    let (scope, path) = expr.split_once('.').unwrap_or((expr, ""));
    let found = match scope {
        "created" => ctx.created().and_then(|entity| lookup(entity, path)).cloned(),
        "last" => ctx
            .last_response()
            .and_then(|r| serde_json::from_str::<Value>(r.body()).ok())
            .and_then(|body| lookup(&body, path).cloned()),
        "random" => match path {
            "email" => Some(testdata::random_email().into()),
            "username" => Some(testdata::random_username().into()),
            "name" => Some(testdata::random_name().into()),
            "phone" => Some(testdata::random_phone().into()),
            _ => None,
        },
        _ => None,
    };
    found
        .filter(|v| !v.is_null())
        .ok_or_else(|| Error::Assertion(format!("Cannot resolve placeholder '${{{expr}}}'")))
}

/// Follow a dotted path through objects and arrays; empty path is the value
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, key| match current {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Equality that tolerates scalar representation differences
/// (`1` vs `1.0` vs `"1"`), since scenario files and SQL drivers disagree
fn values_match(expected: &Value, actual: &Value) -> bool {
    if expected == actual {
        return true;
    }
    match (expected, actual) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => false,
        (a, b) => render(a) == render(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{RawResponse, Response};
    use crate::scenario::coordinator::ScenarioInfo;
    use serde_json::json;
    use std::time::Duration;

    fn ctx() -> ScenarioContext {
        let mut ctx = ScenarioContext::new(ScenarioInfo::new("interp", ["@smoke"]));
        ctx.record_created("user", json!({"id": 42, "name": "Jane Doe", "address": {"city": "Gwenborough"}}));
        ctx.set_response(Response::from_raw(
            Method::Get,
            "https://api.example.test/users/42",
            RawResponse::new(200, r#"{"id":42,"tags":["a","b"]}"#),
            Duration::from_millis(3),
        ));
        ctx
    }

    #[test]
    fn test_whole_placeholder_keeps_type() {
        let ctx = ctx();
        assert_eq!(interpolate(&json!("${created.id}"), &ctx).unwrap(), json!(42));
        assert_eq!(interpolate(&json!("${last.tags.1}"), &ctx).unwrap(), json!("b"));
        assert_eq!(
            interpolate(&json!({"userId": "${created.id}", "title": "by ${created.name}"}), &ctx).unwrap(),
            json!({"userId": 42, "title": "by Jane Doe"})
        );
    }

    #[test]
    fn test_embedded_placeholders_render_text() {
        let ctx = ctx();
        assert_eq!(
            interpolate_str("/users/${created.id}/city/${created.address.city}", &ctx).unwrap(),
            "/users/42/city/Gwenborough"
        );
    }

    #[test]
    fn test_random_placeholders() {
        let ctx = ctx();
        let email = interpolate(&json!("${random.email}"), &ctx).unwrap();
        assert!(email.as_str().unwrap().contains('@'));
        assert!(interpolate(&json!("${random.phone}"), &ctx).unwrap().is_string());
    }

    #[test]
    fn test_unresolved_placeholders_fail() {
        let ctx = ctx();
        assert!(interpolate(&json!("${created.missing}"), &ctx).is_err());
        assert!(interpolate(&json!("${nope.x}"), &ctx).is_err());
        assert!(interpolate_str("broken ${created.id", &ctx).is_err());

        let empty = ScenarioContext::new(ScenarioInfo::new("empty", Vec::<String>::new()));
        assert!(interpolate(&json!("${created.id}"), &empty).is_err());
    }

    #[test]
    fn test_values_match_scalars() {
        assert!(values_match(&json!(1), &json!(1.0)));
        assert!(values_match(&json!("1"), &json!(1)));
        assert!(values_match(&json!(true), &json!("true")));
        assert!(!values_match(&json!("x"), &Value::Null));
        assert!(!values_match(&json!({"a": 1}), &json!("{\"a\":1}")));
    }

    #[test]
    fn test_as_id() {
        assert_eq!(as_id(&json!(7)).unwrap(), 7);
        assert_eq!(as_id(&json!(" 8 ")).unwrap(), 8);
        assert!(as_id(&json!("x")).is_err());
    }
}
