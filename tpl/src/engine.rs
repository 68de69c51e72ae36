// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! The evaluator itself, ported from `tpl/engine.go`'s `Templater` and
//! `TemplateData`. A template is evaluated against a fixed set of
//! broker/instance fields plus the parsed log record (`logdata`).

use serde_json::{json, Value};

use crate::parse::{Expr, Node, Pipeline};
use crate::{funcs, Result};

#[derive(Debug, Default, Clone)]
pub struct TemplateData {
    pub org: String,
    pub org_id: String,
    pub space: String,
    pub space_id: String,
    pub app: String,
    pub app_id: String,
    pub namespace: String,
    pub logdata: Value,
}

pub struct Templater<'a> {
    data: &'a TemplateData,
}

impl<'a> Templater<'a> {
    pub fn new(data: &'a TemplateData) -> Self {
        Self { data }
    }

    pub fn execute(&self, template: &str) -> Result<String> {
        let nodes = crate::cache::get_or_parse(template).map_err(|msg| crate::Error::Parse {
            template: template.to_string(),
            msg,
            backtrace: snafu::Backtrace::generate(),
        })?;
        let mut out = String::new();
        eval_nodes(&nodes, self.data, &mut out).map_err(|msg| crate::Error::Eval {
            template: template.to_string(),
            msg,
            backtrace: snafu::Backtrace::generate(),
        })?;
        Ok(out)
    }
}

fn eval_nodes(nodes: &[Node], data: &TemplateData, out: &mut String) -> std::result::Result<(), String> {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Action(pipeline) => {
                let v = eval_pipeline(pipeline, data)?;
                out.push_str(&value_to_display(&v));
            }
            Node::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let v = eval_pipeline(cond, data)?;
                if is_truthy(&v) {
                    eval_nodes(then_branch, data, out)?;
                } else {
                    eval_nodes(else_branch, data, out)?;
                }
            }
        }
    }
    Ok(())
}

fn eval_pipeline(pipeline: &Pipeline, data: &TemplateData) -> std::result::Result<Value, String> {
    let mut piped: Option<Value> = None;
    for expr in pipeline {
        piped = Some(eval_expr(expr, data, piped)?);
    }
    Ok(piped.unwrap_or(Value::Null))
}

fn eval_expr(expr: &Expr, data: &TemplateData, piped: Option<Value>) -> std::result::Result<Value, String> {
    match expr {
        Expr::Dot(path) => Ok(lookup_dot(data, path)),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Num(n) => Ok(json!(n)),
        Expr::Call(name, args) => {
            let mut arg_vals = Vec::with_capacity(args.len());
            for a in args {
                arg_vals.push(eval_expr(a, data, None)?);
            }
            funcs::call(name, &arg_vals, piped, data)
        }
    }
}

/// Field names tag templates may reference. The Go original's
/// `TemplateData` (`tpl/engine.go`) exports capitalized Go field names
/// (`Org`, `OrgID`, `Space`, `SpaceID`, `App`, `AppID`, `Namespace`,
/// `Logdata`), so every operator-authored template in the wild uses
/// those; snake_case is accepted alongside them for templates written
/// directly against this port.
fn lookup_dot(data: &TemplateData, path: &[String]) -> Value {
    let Some(head) = path.first() else {
        return Value::Null;
    };
    match head.as_str() {
        "org" | "Org" => json!(data.org),
        "org_id" | "OrgID" => json!(data.org_id),
        "space" | "Space" => json!(data.space),
        "space_id" | "SpaceID" => json!(data.space_id),
        "app" | "App" => json!(data.app),
        "app_id" | "AppID" => json!(data.app_id),
        "namespace" | "Namespace" => json!(data.namespace),
        "logdata" | "Logdata" => lookup_logdata(data, &path[1..].join(".")).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Dotted-path lookup into `data.logdata`, e.g. `ret(.logdata, "rtr.status")`.
/// Absent from the original, which only ever templated the fixed broker
/// fields; added because tag templates need to pull values out of the
/// parsed record itself.
pub fn lookup_logdata(data: &TemplateData, path: &str) -> Option<Value> {
    if path.is_empty() {
        return Some(data.logdata.clone());
    }
    let mut current = &data.logdata;
    for segment in path.split('.') {
        match segment {
            "first" => current = current.as_array()?.first()?,
            "last" => current = current.as_array()?.last()?,
            key => current = current.get(key)?,
        }
    }
    Some(current.clone())
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
    }
}

fn value_to_display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_dotted_fields() {
        let data = TemplateData {
            org: "acme".into(),
            app: "web".into(),
            ..Default::default()
        };
        let t = Templater::new(&data);
        assert_eq!(t.execute("{{.org}}/{{.app}}").unwrap(), "acme/web");
    }

    #[test]
    fn evaluates_if_else() {
        let data = TemplateData {
            app: "web".into(),
            ..Default::default()
        };
        let t = Templater::new(&data);
        let rendered = t.execute("{{if .app}}has-app{{else}}no-app{{end}}").unwrap();
        assert_eq!(rendered, "has-app");
    }

    #[test]
    fn pipes_through_functions() {
        let data = TemplateData {
            app: "web.log".into(),
            ..Default::default()
        };
        let t = Templater::new(&data);
        assert_eq!(t.execute(r#"{{.app | trimSuffix ".log"}}"#).unwrap(), "web");
    }

    #[test]
    fn resolves_capitalized_go_field_names() {
        let data = TemplateData {
            org: "acme-staging".into(),
            ..Default::default()
        };
        let t = Templater::new(&data);
        let rendered = t
            .execute(r#"{{ if hasSuffix .Org "-staging" }}dev{{ else }}prod{{ end }}"#)
            .unwrap();
        assert_eq!(rendered, "dev");
    }

    #[test]
    fn ret_reaches_into_logdata() {
        let data = TemplateData {
            logdata: json!({"rtr": {"status": 200}}),
            ..Default::default()
        };
        let t = Templater::new(&data);
        assert_eq!(t.execute(r#"{{ret "rtr.status"}}"#).unwrap(), "200");
    }
}
