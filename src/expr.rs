//! WAF rule expression language
//!
//! A closed predicate language evaluated against the request envelope:
//!
//! - Fields: `IP`, `Method`, `Path`, `Headers["name"]`
//! - Comparisons: `==`, `!=`, `startsWith`, `endsWith`, `contains`, `matches`
//! - Boolean combinators: `and`, `or`, `not`, parentheses
//!
//! Expressions compile once into a [`Program`]; `matches` patterns are
//! compiled to [`regex::Regex`] at that point so evaluation never pays for
//! regex parsing. Type mismatches surface as evaluation errors, which the
//! engine treats as a non-match for that rule.

use std::fmt;

use axum::http::HeaderMap;
use regex::Regex;
use thiserror::Error;

/// Error raised while compiling an expression
#[derive(Debug, Error)]
#[error("compile error: {0}")]
pub struct CompileError(String);

/// Error raised while evaluating a compiled program
#[derive(Debug, Error)]
#[error("eval error: {0}")]
pub struct EvalError(String);

/// Request fields visible to expressions
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub ip: &'a str,
    pub method: &'a str,
    pub path: &'a str,
    pub headers: &'a HeaderMap,
}

/// Runtime value of a (sub-)expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    StartsWith,
    EndsWith,
    Contains,
}

#[derive(Debug)]
enum Node {
    StrLit(String),
    BoolLit(bool),
    Ip,
    Method,
    Path,
    Header(String),
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Cmp(CmpOp, Box<Node>, Box<Node>),
    Matches(Box<Node>, Regex),
}

/// A compiled expression, ready for repeated evaluation
#[derive(Debug)]
pub struct Program {
    root: Node,
}

impl Program {
    /// Compile an expression string
    pub fn compile(source: &str) -> Result<Self, CompileError> {
        let tokens = lex(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(CompileError(format!(
                "unexpected trailing input at token {}",
                parser.pos
            )));
        }
        Ok(Self { root })
    }

    /// Evaluate against a request context
    pub fn eval(&self, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
        eval_node(&self.root, ctx)
    }

    /// Evaluate and require a boolean result
    pub fn eval_bool(&self, ctx: &EvalContext<'_>) -> Result<bool, EvalError> {
        match self.eval(ctx)? {
            Value::Bool(b) => Ok(b),
            other => Err(EvalError(format!("expression yielded {}, not a boolean", other))),
        }
    }
}

fn eval_node(node: &Node, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
    match node {
        Node::StrLit(s) => Ok(Value::Str(s.clone())),
        Node::BoolLit(b) => Ok(Value::Bool(*b)),
        Node::Ip => Ok(Value::Str(ctx.ip.to_string())),
        Node::Method => Ok(Value::Str(ctx.method.to_string())),
        Node::Path => Ok(Value::Str(ctx.path.to_string())),
        Node::Header(name) => {
            let value = ctx
                .headers
                .get(name.as_str())
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            Ok(Value::Str(value.to_string()))
        }
        Node::Not(inner) => match eval_node(inner, ctx)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(EvalError(format!("not applied to {}", other))),
        },
        Node::And(lhs, rhs) => {
            // Short-circuit
            match eval_node(lhs, ctx)? {
                Value::Bool(false) => Ok(Value::Bool(false)),
                Value::Bool(true) => match eval_node(rhs, ctx)? {
                    Value::Bool(b) => Ok(Value::Bool(b)),
                    other => Err(EvalError(format!("and applied to {}", other))),
                },
                other => Err(EvalError(format!("and applied to {}", other))),
            }
        }
        Node::Or(lhs, rhs) => match eval_node(lhs, ctx)? {
            Value::Bool(true) => Ok(Value::Bool(true)),
            Value::Bool(false) => match eval_node(rhs, ctx)? {
                Value::Bool(b) => Ok(Value::Bool(b)),
                other => Err(EvalError(format!("or applied to {}", other))),
            },
            other => Err(EvalError(format!("or applied to {}", other))),
        },
        Node::Cmp(op, lhs, rhs) => {
            let lv = eval_node(lhs, ctx)?;
            let rv = eval_node(rhs, ctx)?;
            match (op, &lv, &rv) {
                (CmpOp::Eq, _, _) => Ok(Value::Bool(lv == rv)),
                (CmpOp::Ne, _, _) => Ok(Value::Bool(lv != rv)),
                (CmpOp::StartsWith, Value::Str(l), Value::Str(r)) => {
                    Ok(Value::Bool(l.starts_with(r.as_str())))
                }
                (CmpOp::EndsWith, Value::Str(l), Value::Str(r)) => {
                    Ok(Value::Bool(l.ends_with(r.as_str())))
                }
                (CmpOp::Contains, Value::Str(l), Value::Str(r)) => {
                    Ok(Value::Bool(l.contains(r.as_str())))
                }
                _ => Err(EvalError(format!(
                    "string predicate applied to {} and {}",
                    lv, rv
                ))),
            }
        }
        Node::Matches(lhs, pattern) => match eval_node(lhs, ctx)? {
            Value::Str(l) => Ok(Value::Bool(pattern.is_match(&l))),
            other => Err(EvalError(format!("matches applied to {}", other))),
        },
    }
}

// ── Lexer ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    EqEq,
    NotEq,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

fn lex(source: &str) -> Result<Vec<Token>, CompileError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            '=' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::EqEq);
                } else {
                    return Err(CompileError("single '=' is not an operator".into()));
                }
            }
            '!' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::NotEq);
                } else {
                    return Err(CompileError("expected '=' after '!'".into()));
                }
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('"') => s.push('"'),
                            Some('\\') => s.push('\\'),
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some(other) => {
                                // Preserve unknown escapes verbatim so regex
                                // patterns like "\\." survive.
                                s.push('\\');
                                s.push(other);
                            }
                            None => {
                                return Err(CompileError("unterminated string literal".into()))
                            }
                        },
                        Some(other) => s.push(other),
                        None => return Err(CompileError("unterminated string literal".into())),
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(CompileError(format!("unexpected character {:?}", other)));
            }
        }
    }

    Ok(tokens)
}

// ── Parser ─────────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn peek_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(id)) if id == kw)
    }

    fn parse_or(&mut self) -> Result<Node, CompileError> {
        let mut node = self.parse_and()?;
        while self.peek_keyword("or") {
            self.next();
            let rhs = self.parse_and()?;
            node = Node::Or(Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn parse_and(&mut self) -> Result<Node, CompileError> {
        let mut node = self.parse_unary()?;
        while self.peek_keyword("and") {
            self.next();
            let rhs = self.parse_unary()?;
            node = Node::And(Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn parse_unary(&mut self) -> Result<Node, CompileError> {
        if self.peek_keyword("not") {
            self.next();
            let inner = self.parse_unary()?;
            return Ok(Node::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Node, CompileError> {
        enum CmpTok {
            Op(CmpOp),
            Matches,
        }

        let lhs = self.parse_primary()?;

        let op = match self.peek() {
            Some(Token::EqEq) => Some(CmpTok::Op(CmpOp::Eq)),
            Some(Token::NotEq) => Some(CmpTok::Op(CmpOp::Ne)),
            Some(Token::Ident(id)) => match id.as_str() {
                "startsWith" => Some(CmpTok::Op(CmpOp::StartsWith)),
                "endsWith" => Some(CmpTok::Op(CmpOp::EndsWith)),
                "contains" => Some(CmpTok::Op(CmpOp::Contains)),
                "matches" => Some(CmpTok::Matches),
                _ => None,
            },
            _ => None,
        };

        match op {
            Some(CmpTok::Op(op)) => {
                self.next();
                let rhs = self.parse_primary()?;
                Ok(Node::Cmp(op, Box::new(lhs), Box::new(rhs)))
            }
            Some(CmpTok::Matches) => {
                self.next();
                // `matches` requires a literal pattern so it can be compiled
                // here rather than on every evaluation.
                let pattern = match self.next() {
                    Some(Token::Str(p)) => p,
                    _ => {
                        return Err(CompileError(
                            "matches requires a string literal pattern".into(),
                        ))
                    }
                };
                let regex = Regex::new(&pattern)
                    .map_err(|e| CompileError(format!("invalid pattern: {}", e)))?;
                Ok(Node::Matches(Box::new(lhs), regex))
            }
            None => Ok(lhs),
        }
    }

    fn parse_primary(&mut self) -> Result<Node, CompileError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Node::StrLit(s)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(CompileError("expected ')'".into())),
                }
            }
            Some(Token::Ident(id)) => match id.as_str() {
                "true" => Ok(Node::BoolLit(true)),
                "false" => Ok(Node::BoolLit(false)),
                "IP" => Ok(Node::Ip),
                "Method" => Ok(Node::Method),
                "Path" => Ok(Node::Path),
                "Headers" => {
                    if self.next() != Some(Token::LBracket) {
                        return Err(CompileError("expected '[' after Headers".into()));
                    }
                    let name = match self.next() {
                        Some(Token::Str(name)) => name,
                        _ => return Err(CompileError("expected header name string".into())),
                    };
                    if self.next() != Some(Token::RBracket) {
                        return Err(CompileError("expected ']'".into()));
                    }
                    Ok(Node::Header(name))
                }
                other => Err(CompileError(format!("unknown identifier {:?}", other))),
            },
            other => Err(CompileError(format!("unexpected token {:?}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn ctx<'a>(headers: &'a HeaderMap) -> EvalContext<'a> {
        EvalContext {
            ip: "192.0.2.7",
            method: "GET",
            path: "/admin/panel",
            headers,
        }
    }

    fn eval(source: &str) -> bool {
        let headers = HeaderMap::new();
        Program::compile(source)
            .unwrap()
            .eval_bool(&ctx(&headers))
            .unwrap()
    }

    #[test]
    fn test_starts_with() {
        assert!(eval(r#"Path startsWith "/admin""#));
        assert!(!eval(r#"Path startsWith "/api""#));
    }

    #[test]
    fn test_ends_with_and_contains() {
        assert!(eval(r#"Path endsWith "panel""#));
        assert!(eval(r#"Path contains "admin""#));
        assert!(!eval(r#"Path contains "login""#));
    }

    #[test]
    fn test_equality() {
        assert!(eval(r#"Method == "GET""#));
        assert!(eval(r#"Method != "POST""#));
        assert!(eval(r#"IP == "192.0.2.7""#));
    }

    #[test]
    fn test_boolean_combinators() {
        assert!(eval(r#"Method == "GET" and Path startsWith "/admin""#));
        assert!(eval(r#"Method == "POST" or Path startsWith "/admin""#));
        assert!(!eval(r#"not (Method == "GET")"#));
        assert!(eval(r#"not Method == "POST""#));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        // false and false or true => (false and false) or true => true
        assert!(eval(r#"false and false or true"#));
    }

    #[test]
    fn test_matches_precompiled_regex() {
        assert!(eval(r#"Path matches "(?i)/ADMIN""#));
        assert!(!eval(r#"Path matches "^/api""#));
        assert!(eval(r#"Path matches "/admin/.*""#));
    }

    #[test]
    fn test_matches_escaped_dot() {
        // Doubled backslash in the rule source reaches the regex as "\."
        let headers = HeaderMap::new();
        let program = Program::compile(r#"Path matches "\\.\\./""#).unwrap();
        let traversal = EvalContext {
            ip: "",
            method: "GET",
            path: "/a/../etc/passwd",
            headers: &headers,
        };
        assert!(program.eval_bool(&traversal).unwrap());
        assert!(!program.eval_bool(&ctx(&headers)).unwrap());
    }

    #[test]
    fn test_header_access() {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static("curl/8.0"));
        let program = Program::compile(r#"Headers["User-Agent"] contains "curl""#).unwrap();
        assert!(program.eval_bool(&ctx(&headers)).unwrap());

        // Absent header is the empty string
        let program = Program::compile(r#"Headers["X-Missing"] == """#).unwrap();
        assert!(program.eval_bool(&ctx(&headers)).unwrap());
    }

    #[test]
    fn test_compile_errors() {
        assert!(Program::compile("Path startsWith").is_err());
        assert!(Program::compile(r#"Unknown == "x""#).is_err());
        assert!(Program::compile(r#"Path matches "(unclosed""#).is_err());
        assert!(Program::compile(r#"Path = "x""#).is_err());
        assert!(Program::compile(r#"Path == "x" extra"#).is_err());
        assert!(Program::compile(r#""dangling"#).is_err());
    }

    #[test]
    fn test_eval_type_errors() {
        let headers = HeaderMap::new();
        // A bare string is not a boolean
        let program = Program::compile(r#"Path"#).unwrap();
        assert!(program.eval_bool(&ctx(&headers)).is_err());
        // `and` over strings is a type error
        let program = Program::compile(r#"Path and Method"#).unwrap();
        assert!(program.eval_bool(&ctx(&headers)).is_err());
        // startsWith over booleans is a type error
        let program = Program::compile(r#"true startsWith "t""#).unwrap();
        assert!(program.eval_bool(&ctx(&headers)).is_err());
    }

    #[test]
    fn test_determinism() {
        let headers = HeaderMap::new();
        let program = Program::compile(r#"Path startsWith "/admin" and Method == "GET""#).unwrap();
        let first = program.eval_bool(&ctx(&headers)).unwrap();
        for _ in 0..10 {
            assert_eq!(program.eval_bool(&ctx(&headers)).unwrap(), first);
        }
    }
}
