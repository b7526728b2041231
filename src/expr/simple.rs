//! Bundled expression dialect.
//!
//! A deliberately small language covering the forms cache descriptors
//! actually use:
//!
//! - variable references with property access: `#id`, `#user.profile.region`
//! - literals: integers, `'single-quoted strings'`, `true`, `false`, `null`
//! - `+` (numeric addition, or concatenation when either side is a string)
//! - comparisons: `>` `<` `>=` `<=` `==` `!=`
//! - ternary: `cond ? a : b`
//! - parentheses
//!
//! Parsed ASTs are memoized per expression string; descriptor expressions
//! repeat for the life of the process.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use super::{EvalContext, EvalError, Evaluator};

/// The bundled [`Evaluator`] implementation.
#[derive(Default)]
pub struct SimpleEvaluator {
    parsed: DashMap<String, Arc<Expr>>,
}

impl SimpleEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_cached(&self, expr: &str) -> Result<Arc<Expr>, EvalError> {
        if let Some(ast) = self.parsed.get(expr) {
            return Ok(ast.clone());
        }
        let ast = Arc::new(parse(expr)?);
        self.parsed.insert(expr.to_string(), ast.clone());
        Ok(ast)
    }
}

impl Evaluator for SimpleEvaluator {
    fn evaluate(&self, expr: &str, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
        let ast = self.parse_cached(expr)?;
        eval(&ast, ctx)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    /// `#name` with an optional `.field` access chain
    Var(String, Vec<String>),
    Binary(Op, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Var(String),
    Str(String),
    Int(i64),
    True,
    False,
    Null,
    Plus,
    Gt,
    Lt,
    Ge,
    Le,
    EqEq,
    Ne,
    Question,
    Colon,
    Dot,
    LParen,
    RParen,
    Ident(String),
}

fn parse_err(expr: &str, message: impl Into<String>) -> EvalError {
    EvalError::Parse { expr: expr.to_string(), message: message.into() }
}

fn tokenize(expr: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();

    while let Some(&(_, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                chars.next();
                let name = take_ident(&mut chars);
                if name.is_empty() {
                    return Err(parse_err(expr, "'#' must be followed by a parameter name"));
                }
                tokens.push(Token::Var(name));
            }
            '\'' => {
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '\'' {
                        closed = true;
                        break;
                    }
                    s.push(c);
                }
                if !closed {
                    return Err(parse_err(expr, "unterminated string literal"));
                }
                tokens.push(Token::Str(s));
            }
            '0'..='9' => {
                let mut n = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() {
                        n.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = n
                    .parse()
                    .map_err(|_| parse_err(expr, format!("invalid integer '{n}'")))?;
                tokens.push(Token::Int(value));
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '>' => {
                chars.next();
                if chars.peek().map(|&(_, c)| c) == Some('=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '<' => {
                chars.next();
                if chars.peek().map(|&(_, c)| c) == Some('=') {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '=' => {
                chars.next();
                if chars.peek().map(|&(_, c)| c) == Some('=') {
                    chars.next();
                    tokens.push(Token::EqEq);
                } else {
                    return Err(parse_err(expr, "single '=' is not an operator, use '=='"));
                }
            }
            '!' => {
                chars.next();
                if chars.peek().map(|&(_, c)| c) == Some('=') {
                    chars.next();
                    tokens.push(Token::Ne);
                } else {
                    return Err(parse_err(expr, "expected '!='"));
                }
            }
            '?' => {
                chars.next();
                tokens.push(Token::Question);
            }
            ':' => {
                chars.next();
                tokens.push(Token::Colon);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            c if c.is_alphabetic() || c == '_' => {
                let word = take_ident(&mut chars);
                match word.as_str() {
                    "true" => tokens.push(Token::True),
                    "false" => tokens.push(Token::False),
                    "null" => tokens.push(Token::Null),
                    other => tokens.push(Token::Ident(other.to_string())),
                }
            }
            '-' => {
                // Negative integer literal
                chars.next();
                let mut n = String::from("-");
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() {
                        n.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = n
                    .parse()
                    .map_err(|_| parse_err(expr, format!("invalid integer '{n}'")))?;
                tokens.push(Token::Int(value));
            }
            other => {
                return Err(parse_err(expr, format!("unexpected character '{other}'")));
            }
        }
    }
    Ok(tokens)
}

fn take_ident(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) -> String {
    let mut name = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if c.is_alphanumeric() || c == '_' {
            name.push(c);
            chars.next();
        } else {
            break;
        }
    }
    name
}

struct Parser<'a> {
    expr: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

fn parse(expr: &str) -> Result<Expr, EvalError> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Err(parse_err(expr, "empty expression"));
    }
    let mut parser = Parser { expr, tokens, pos: 0 };
    let ast = parser.ternary()?;
    if parser.pos != parser.tokens.len() {
        return Err(parse_err(expr, "trailing input after expression"));
    }
    Ok(ast)
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<(), EvalError> {
        match self.next() {
            Some(t) if t == *token => Ok(()),
            _ => Err(parse_err(self.expr, format!("expected {what}"))),
        }
    }

    fn ternary(&mut self) -> Result<Expr, EvalError> {
        let cond = self.comparison()?;
        if self.peek() == Some(&Token::Question) {
            self.next();
            let then = self.ternary()?;
            self.expect(&Token::Colon, "':' in ternary")?;
            let otherwise = self.ternary()?;
            return Ok(Expr::Ternary(Box::new(cond), Box::new(then), Box::new(otherwise)));
        }
        Ok(cond)
    }

    fn comparison(&mut self) -> Result<Expr, EvalError> {
        let left = self.additive()?;
        let op = match self.peek() {
            Some(Token::Gt) => Op::Gt,
            Some(Token::Lt) => Op::Lt,
            Some(Token::Ge) => Op::Ge,
            Some(Token::Le) => Op::Le,
            Some(Token::EqEq) => Op::Eq,
            Some(Token::Ne) => Op::Ne,
            _ => return Ok(left),
        };
        self.next();
        let right = self.additive()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn additive(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.primary()?;
        while self.peek() == Some(&Token::Plus) {
            self.next();
            let right = self.primary()?;
            left = Expr::Binary(Op::Add, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn primary(&mut self) -> Result<Expr, EvalError> {
        match self.next() {
            Some(Token::Int(n)) => Ok(Expr::Literal(Value::from(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::from(s))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::Var(name)) => {
                let mut path = Vec::new();
                while self.peek() == Some(&Token::Dot) {
                    self.next();
                    match self.next() {
                        Some(Token::Ident(field)) => path.push(field),
                        _ => return Err(parse_err(self.expr, "expected field name after '.'")),
                    }
                }
                Ok(Expr::Var(name, path))
            }
            Some(Token::LParen) => {
                let inner = self.ternary()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::Ident(word)) => {
                Err(parse_err(self.expr, format!("bare identifier '{word}' (did you mean '#{word}'?)")))
            }
            _ => Err(parse_err(self.expr, "expected a value")),
        }
    }
}

fn eval(expr: &Expr, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Var(name, path) => {
            let mut value = ctx
                .var(name)
                .ok_or_else(|| EvalError::UnknownVariable(name.clone()))?;
            for field in path {
                // Missing fields resolve to null rather than failing the call
                value = value.get(field).unwrap_or(&Value::Null);
            }
            Ok(value.clone())
        }
        Expr::Binary(op, left, right) => {
            let l = eval(left, ctx)?;
            let r = eval(right, ctx)?;
            eval_binary(*op, &l, &r)
        }
        Expr::Ternary(cond, then, otherwise) => {
            let c = eval(cond, ctx)?;
            let branch = match c {
                Value::Bool(b) => b,
                Value::Null => false,
                other => {
                    return Err(EvalError::Eval(format!(
                        "ternary condition is not a boolean: {other}"
                    )))
                }
            };
            if branch {
                eval(then, ctx)
            } else {
                eval(otherwise, ctx)
            }
        }
    }
}

fn eval_binary(op: Op, l: &Value, r: &Value) -> Result<Value, EvalError> {
    match op {
        Op::Add => match (l, r) {
            (Value::String(_), _) | (_, Value::String(_)) => {
                Ok(Value::from(format!("{}{}", super::key_string(l), super::key_string(r))))
            }
            (Value::Number(a), Value::Number(b)) => {
                if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                    Ok(Value::from(a + b))
                } else if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
                    Ok(Value::from(a + b))
                } else {
                    Err(EvalError::Eval("non-additive numbers".into()))
                }
            }
            _ => Err(EvalError::Eval(format!("cannot add {l} and {r}"))),
        },
        Op::Eq => Ok(Value::Bool(l == r)),
        Op::Ne => Ok(Value::Bool(l != r)),
        Op::Gt | Op::Lt | Op::Ge | Op::Le => {
            let ordering = compare(l, r)?;
            let pass = match op {
                Op::Gt => ordering == std::cmp::Ordering::Greater,
                Op::Lt => ordering == std::cmp::Ordering::Less,
                Op::Ge => ordering != std::cmp::Ordering::Less,
                Op::Le => ordering != std::cmp::Ordering::Greater,
                _ => unreachable!(),
            };
            Ok(Value::Bool(pass))
        }
    }
}

fn compare(l: &Value, r: &Value) -> Result<std::cmp::Ordering, EvalError> {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            match (a, b) {
                (Some(a), Some(b)) => a
                    .partial_cmp(&b)
                    .ok_or_else(|| EvalError::Eval("incomparable numbers".into())),
                _ => Err(EvalError::Eval("incomparable numbers".into())),
            }
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(EvalError::Eval(format!("cannot order {l} and {r}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval_with(expr: &str, names: &[&str], args: &[Value]) -> Result<Value, EvalError> {
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        let ctx = EvalContext::new(&names, args);
        SimpleEvaluator::new().evaluate(expr, &ctx)
    }

    #[test]
    fn variable_reference() {
        assert_eq!(eval_with("#id", &["id"], &[json!(42)]).unwrap(), json!(42));
    }

    #[test]
    fn property_access_chain() {
        let user = json!({"profile": {"region": "eu"}});
        assert_eq!(
            eval_with("#user.profile.region", &["user"], &[user]).unwrap(),
            json!("eu")
        );
    }

    #[test]
    fn missing_property_is_null() {
        let user = json!({"name": "a"});
        assert_eq!(eval_with("#user.age", &["user"], &[user]).unwrap(), json!(null));
    }

    #[test]
    fn unknown_variable_is_an_error() {
        let err = eval_with("#nope", &["id"], &[json!(1)]).unwrap_err();
        assert!(matches!(err, EvalError::UnknownVariable(name) if name == "nope"));
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(
            eval_with("'user:' + #id", &["id"], &[json!(7)]).unwrap(),
            json!("user:7")
        );
        assert_eq!(
            eval_with("#a + '-' + #b", &["a", "b"], &[json!("x"), json!("y")]).unwrap(),
            json!("x-y")
        );
    }

    #[test]
    fn numeric_addition() {
        assert_eq!(eval_with("1 + 2", &[], &[]).unwrap(), json!(3));
        assert_eq!(eval_with("#n + 10", &["n"], &[json!(5)]).unwrap(), json!(15));
    }

    #[test]
    fn comparisons() {
        assert_eq!(eval_with("#id > 0", &["id"], &[json!(1)]).unwrap(), json!(true));
        assert_eq!(eval_with("#id > 0", &["id"], &[json!(-1)]).unwrap(), json!(false));
        assert_eq!(eval_with("#id >= 1", &["id"], &[json!(1)]).unwrap(), json!(true));
        assert_eq!(eval_with("'a' < 'b'", &[], &[]).unwrap(), json!(true));
        assert_eq!(eval_with("#id == 3", &["id"], &[json!(3)]).unwrap(), json!(true));
        assert_eq!(eval_with("#id != null", &["id"], &[json!(3)]).unwrap(), json!(true));
        assert_eq!(eval_with("#id != null", &["id"], &[json!(null)]).unwrap(), json!(false));
    }

    #[test]
    fn ternary() {
        assert_eq!(
            eval_with("#ttl != null ? #ttl : 60", &["ttl"], &[json!(30)]).unwrap(),
            json!(30)
        );
        assert_eq!(
            eval_with("#ttl != null ? #ttl : 60", &["ttl"], &[json!(null)]).unwrap(),
            json!(60)
        );
    }

    #[test]
    fn parentheses() {
        assert_eq!(eval_with("(1 + 2) > 2", &[], &[]).unwrap(), json!(true));
    }

    #[test]
    fn negative_integers() {
        assert_eq!(eval_with("-5", &[], &[]).unwrap(), json!(-5));
        assert_eq!(eval_with("#id > -1", &["id"], &[json!(0)]).unwrap(), json!(true));
    }

    #[test]
    fn parse_errors() {
        assert!(eval_with("", &[], &[]).is_err());
        assert!(eval_with("#", &[], &[]).is_err());
        assert!(eval_with("'unterminated", &[], &[]).is_err());
        assert!(eval_with("1 +", &[], &[]).is_err());
        assert!(eval_with("id", &[], &[]).is_err());
        assert!(eval_with("1 = 1", &[], &[]).is_err());
    }

    #[test]
    fn rebound_pivot_projection() {
        // The batch engine's usage: evaluate once per element with the
        // collection variable shadowed by the element.
        let names = vec!["ids".to_string(), "tenant".to_string()];
        let args = vec![json!([10, 11]), json!("acme")];
        let ctx = EvalContext::new(&names, &args);
        let evaluator = SimpleEvaluator::new();

        let mut keys = Vec::new();
        for element in args[0].as_array().unwrap() {
            let rebound = ctx.rebound("ids", element);
            keys.push(evaluator.evaluate("#tenant + ':' + #ids", &rebound).unwrap());
        }
        assert_eq!(keys, vec![json!("acme:10"), json!("acme:11")]);
    }

    #[test]
    fn ast_cache_reuses_parses() {
        let evaluator = SimpleEvaluator::new();
        let names = vec!["id".to_string()];
        let args = vec![json!(1)];
        let ctx = EvalContext::new(&names, &args);

        evaluator.evaluate("#id + 1", &ctx).unwrap();
        assert_eq!(evaluator.parsed.len(), 1);
        evaluator.evaluate("#id + 1", &ctx).unwrap();
        assert_eq!(evaluator.parsed.len(), 1);
    }
}
