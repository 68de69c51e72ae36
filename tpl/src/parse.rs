// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Tokenizer/parser for the small template grammar: literal text,
//! `{{ expr }}` pipelines, and `{{if expr}}...{{else}}...{{end}}`.

#[derive(Debug, Clone)]
pub enum Node {
    Text(String),
    Action(Pipeline),
    If {
        cond: Pipeline,
        then_branch: Vec<Node>,
        else_branch: Vec<Node>,
    },
}

#[derive(Debug, Clone)]
pub enum Expr {
    Dot(Vec<String>),
    Str(String),
    Num(f64),
    /// An intermediate pipeline stage: a function name plus its
    /// explicit arguments. The value piped in from the previous stage
    /// (if any) is appended as the final argument at eval time.
    Call(String, Vec<Expr>),
}

pub type Pipeline = Vec<Expr>;

pub fn parse(template: &str) -> Result<Vec<Node>, String> {
    let mut nodes = Vec::new();
    let mut stack: Vec<(Pipeline, Vec<Node>)> = Vec::new();
    let mut rest = template;

    loop {
        match rest.find("{{") {
            None => {
                if !rest.is_empty() {
                    push_node(&mut nodes, &mut stack, Node::Text(rest.to_string()));
                }
                break;
            }
            Some(start) => {
                if start > 0 {
                    push_node(&mut nodes, &mut stack, Node::Text(rest[..start].to_string()));
                }
                let after = &rest[start + 2..];
                let end = after
                    .find("}}")
                    .ok_or_else(|| "unterminated {{ action".to_string())?;
                let action = after[..end].trim();
                rest = &after[end + 2..];

                if let Some(cond_src) = action.strip_prefix("if ") {
                    let cond = parse_pipeline(cond_src.trim())?;
                    stack.push((cond, Vec::new()));
                } else if action == "else" {
                    let (_, branch) = stack
                        .last_mut()
                        .ok_or_else(|| "else without matching if".to_string())?;
                    branch.push(Node::Text(ELSE_MARKER.to_string()));
                } else if action == "end" {
                    let (cond, branch) = stack.pop().ok_or_else(|| "end without matching if".to_string())?;
                    let (then_branch, else_branch) = split_branch(branch);
                    push_node(
                        &mut nodes,
                        &mut stack,
                        Node::If {
                            cond,
                            then_branch,
                            else_branch,
                        },
                    );
                } else {
                    let pipeline = parse_pipeline(action)?;
                    push_node(&mut nodes, &mut stack, Node::Action(pipeline));
                }
            }
        }
    }

    if !stack.is_empty() {
        return Err("unterminated if block".to_string());
    }
    Ok(nodes)
}

const ELSE_MARKER: &str = "\u{0}else\u{0}";

fn split_branch(branch: Vec<Node>) -> (Vec<Node>, Vec<Node>) {
    if let Some(pos) = branch.iter().position(|n| matches!(n, Node::Text(t) if t == ELSE_MARKER)) {
        let mut then_branch = branch;
        let else_branch = then_branch.split_off(pos + 1);
        then_branch.truncate(pos);
        (then_branch, else_branch)
    } else {
        (branch, Vec::new())
    }
}

fn push_node(nodes: &mut Vec<Node>, stack: &mut [(Pipeline, Vec<Node>)], node: Node) {
    if let Some((_, branch)) = stack.last_mut() {
        branch.push(node);
    } else {
        nodes.push(node);
    }
}

fn parse_pipeline(src: &str) -> Result<Pipeline, String> {
    let mut stages = Vec::new();
    for stage_src in split_top_level(src, '|') {
        let tokens = tokenize(stage_src.trim())?;
        if tokens.is_empty() {
            continue;
        }
        stages.push(parse_stage(&tokens)?);
    }
    if stages.is_empty() {
        return Err("empty pipeline".to_string());
    }
    Ok(stages)
}

fn parse_stage(tokens: &[String]) -> Result<Expr, String> {
    if tokens.len() == 1 {
        return Ok(parse_atom(&tokens[0]));
    }
    let name = tokens[0].clone();
    let args = tokens[1..].iter().map(|t| parse_atom(t)).collect();
    Ok(Expr::Call(name, args))
}

fn parse_atom(tok: &str) -> Expr {
    if let Some(stripped) = tok.strip_prefix('.') {
        return Expr::Dot(stripped.split('.').map(str::to_string).collect());
    }
    if tok.starts_with('"') && tok.ends_with('"') && tok.len() >= 2 {
        return Expr::Str(tok[1..tok.len() - 1].to_string());
    }
    if let Ok(n) = tok.parse::<f64>() {
        return Expr::Num(n);
    }
    Expr::Str(tok.to_string())
}

fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => {
                out.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&s[start..]);
    out
}

fn tokenize(s: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in s.chars() {
        match c {
            '"' => {
                current.push(c);
                in_quotes = !in_quotes;
                if !in_quotes {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if in_quotes {
        return Err("unterminated string literal".to_string());
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_text() {
        let nodes = parse("just text").unwrap();
        assert!(matches!(&nodes[..], [Node::Text(t)] if t == "just text"));
    }

    #[test]
    fn parses_dotted_action() {
        let nodes = parse("hello {{.org}}!").unwrap();
        assert_eq!(nodes.len(), 3);
        assert!(matches!(&nodes[1], Node::Action(p) if matches!(&p[..], [Expr::Dot(path)] if path == &["org".to_string()])));
    }

    #[test]
    fn parses_piped_call() {
        let nodes = parse(r#"{{.app | trimSuffix ".log"}}"#).unwrap();
        match &nodes[0] {
            Node::Action(p) => {
                assert_eq!(p.len(), 2);
                assert!(matches!(&p[1], Expr::Call(name, args) if name == "trimSuffix" && args.len() == 1));
            }
            other => panic!("expected action node, got {other:?}"),
        }
    }

    #[test]
    fn parses_if_else_end() {
        let nodes = parse("{{if .app}}yes{{else}}no{{end}}").unwrap();
        match &nodes[0] {
            Node::If { then_branch, else_branch, .. } => {
                assert!(matches!(&then_branch[..], [Node::Text(t)] if t == "yes"));
                assert!(matches!(&else_branch[..], [Node::Text(t)] if t == "no"));
            }
            other => panic!("expected if node, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_if_is_an_error() {
        assert!(parse("{{if .app}}yes").is_err());
    }
}
