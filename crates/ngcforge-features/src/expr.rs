//! Restricted expression evaluator
//!
//! Used by `<eval>` directives, validation checks and hook scripts. Only
//! arithmetic, comparisons, logic and a closed set of named functions are
//! available; the only outside state reachable is what the [`Scope`] exposes.

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("unterminated string")]
    UnterminatedString,
    #[error("unexpected {0}")]
    UnexpectedToken(String),
    #[error("unknown name '{0}'")]
    UnknownName(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("{name}() takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: &'static str,
        got: usize,
    },
    #[error("'{0}' is not a number")]
    NotANumber(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("math domain error in {0}()")]
    Domain(&'static str),
    #[error("{0}")]
    Include(String),
}

/// Value produced by an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Num(f64),
    Str(String),
    Bool(bool),
}

impl Value {
    /// Numbers for anything that reads as one, strings otherwise
    pub fn from_text(text: &str) -> Self {
        match ngcforge_core::units::parse_decimal(text) {
            Some(v) if !text.trim().contains(',') => Value::Num(v),
            _ => Value::Str(text.to_string()),
        }
    }

    pub fn as_number(&self) -> Result<f64, EvalError> {
        match self {
            Value::Num(v) => Ok(*v),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| EvalError::NotANumber(s.clone())),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Num(v) => *v != 0.0,
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Num(v) if v.fract() == 0.0 && v.abs() < 1e15 => write!(f, "{}", *v as i64),
            Value::Num(v) => write!(f, "{}", v),
            Value::Bool(b) => write!(f, "{}", if *b { 1 } else { 0 }),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Names an expression may look up.
pub trait Scope {
    /// A `#call_token` or a parameter id
    fn param(&self, key: &str) -> Option<Value>;

    /// `self.<name>`
    fn attribute(&self, name: &str) -> Option<Value>;

    /// Bare identifiers such as `value` in hooks
    fn variable(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Contents of a library file; `once` skips files already included in this run
    fn include(&mut self, name: &str, _once: bool) -> Result<String, EvalError> {
        Err(EvalError::Include(format!("include of '{}' not available here", name)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Num(f64),
    Str(String),
    Ident(String),
    Hash(String),
    Op(&'static str),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Num(v) => write!(f, "number {}", v),
            Token::Str(s) => write!(f, "string '{}'", s),
            Token::Ident(s) => write!(f, "'{}'", s),
            Token::Hash(s) => write!(f, "'{}'", s),
            Token::Op(s) => write!(f, "'{}'", s),
        }
    }
}

const OPERATORS: [&str; 22] = [
    "**", "==", "!=", "<=", ">=", "&&", "||", "+", "-", "*", "/", "%", "<", ">", "!", "(", ")",
    ",", ".", "=", "[", "]",
];

pub(crate) fn tokenize(src: &str) -> Result<Vec<Token>, EvalError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let v = text
                .parse::<f64>()
                .map_err(|_| EvalError::NotANumber(text.clone()))?;
            tokens.push(Token::Num(v));
        } else if c == '"' || c == '\'' {
            let mut s = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(EvalError::UnterminatedString),
                    Some(&q) if q == c => break,
                    Some('\\') => {
                        i += 1;
                        match chars.get(i) {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some(&other) => s.push(other),
                            None => return Err(EvalError::UnterminatedString),
                        }
                    }
                    Some(&other) => s.push(other),
                }
                i += 1;
            }
            i += 1;
            tokens.push(Token::Str(s));
        } else if c.is_alphabetic() || c == '_' || c == '#' {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if c == '#' {
                if word.len() == 1 {
                    return Err(EvalError::UnexpectedChar('#'));
                }
                tokens.push(Token::Hash(word));
            } else {
                tokens.push(Token::Ident(word));
            }
        } else {
            let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
            let op = OPERATORS
                .iter()
                .find(|op| rest.starts_with(**op))
                .ok_or(EvalError::UnexpectedChar(c))?;
            i += op.chars().count();
            tokens.push(Token::Op(*op));
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Lit(Value),
    Param(String),
    Var(String),
    Attr(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary(&'static str, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

pub(crate) struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> Parser<'t> {
    pub(crate) fn new(tokens: &'t [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    pub(crate) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub(crate) fn advance(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        self.pos += 1;
        t
    }

    pub(crate) fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op(o)) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn eat_word(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(w)) if w == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), EvalError> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    pub(crate) fn unexpected(&self) -> EvalError {
        match self.peek() {
            Some(t) => EvalError::UnexpectedToken(t.to_string()),
            None => EvalError::UnexpectedToken("end of expression".to_string()),
        }
    }

    pub(crate) fn expression(&mut self) -> Result<Expr, EvalError> {
        self.or()
    }

    fn or(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.and()?;
        while self.eat_op("||") || self.eat_word("or") {
            let rhs = self.and()?;
            lhs = Expr::Binary("||", Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.not()?;
        while self.eat_op("&&") || self.eat_word("and") {
            let rhs = self.not()?;
            lhs = Expr::Binary("&&", Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn not(&mut self) -> Result<Expr, EvalError> {
        if self.eat_op("!") || self.eat_word("not") {
            return Ok(Expr::Not(Box::new(self.not()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, EvalError> {
        let lhs = self.additive()?;
        for op in ["==", "!=", "<=", ">=", "<", ">"] {
            if self.eat_op(op) {
                let rhs = self.additive()?;
                return Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)));
            }
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = if self.eat_op("+") {
                "+"
            } else if self.eat_op("-") {
                "-"
            } else {
                return Ok(lhs);
            };
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.unary()?;
        loop {
            let op = if self.eat_op("*") {
                "*"
            } else if self.eat_op("/") {
                "/"
            } else if self.eat_op("%") {
                "%"
            } else {
                return Ok(lhs);
            };
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, EvalError> {
        if self.eat_op("-") {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        if self.eat_op("+") {
            return self.unary();
        }
        let base = self.primary()?;
        if self.eat_op("**") {
            let exp = self.unary()?;
            return Ok(Expr::Binary("**", Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, EvalError> {
        let token = self.advance().cloned().ok_or_else(|| self.unexpected())?;
        match token {
            Token::Num(v) => Ok(Expr::Lit(Value::Num(v))),
            Token::Str(s) => Ok(Expr::Lit(Value::Str(s))),
            Token::Hash(h) => Ok(Expr::Param(h)),
            Token::Op("(") => {
                let inner = self.expression()?;
                self.expect_op(")")?;
                Ok(inner)
            }
            // bracketed G-code expressions such as [#1 + 2]
            Token::Op("[") => {
                let inner = self.expression()?;
                self.expect_op("]")?;
                Ok(inner)
            }
            Token::Ident(word) => match word.as_str() {
                "true" | "True" => Ok(Expr::Lit(Value::Bool(true))),
                "false" | "False" => Ok(Expr::Lit(Value::Bool(false))),
                "pi" => Ok(Expr::Lit(Value::Num(std::f64::consts::PI))),
                "self" => {
                    self.expect_op(".")?;
                    match self.advance().cloned() {
                        Some(Token::Ident(attr)) => Ok(Expr::Attr(attr)),
                        _ => Err(EvalError::UnexpectedToken("after 'self.'".to_string())),
                    }
                }
                _ if self.eat_op("(") => {
                    let mut args = Vec::new();
                    if !self.eat_op(")") {
                        loop {
                            args.push(self.expression()?);
                            if self.eat_op(")") {
                                break;
                            }
                            self.expect_op(",")?;
                        }
                    }
                    Ok(Expr::Call(word.clone(), args))
                }
                _ => Ok(Expr::Var(word.clone())),
            },
            Token::Op(op) => Err(EvalError::UnexpectedToken(format!("'{}'", op))),
        }
    }
}

/// Parse a complete expression
pub(crate) fn parse(src: &str) -> Result<Expr, EvalError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser::new(&tokens);
    let expr = parser.expression()?;
    if !parser.at_end() {
        return Err(parser.unexpected());
    }
    Ok(expr)
}

/// Evaluate `src` against `scope`
pub fn evaluate(src: &str, scope: &mut dyn Scope) -> Result<Value, EvalError> {
    let expr = parse(src)?;
    eval(&expr, scope)
}

fn compare(op: &str, a: &Value, b: &Value) -> bool {
    let ordering = match (a.as_number(), b.as_number()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y),
        _ => Some(a.to_string().cmp(&b.to_string())),
    };
    match (op, ordering) {
        ("==", Some(o)) => o.is_eq(),
        ("!=", Some(o)) => o.is_ne(),
        ("<", Some(o)) => o.is_lt(),
        ("<=", Some(o)) => o.is_le(),
        (">", Some(o)) => o.is_gt(),
        (">=", Some(o)) => o.is_ge(),
        ("!=", None) => true,
        _ => false,
    }
}

pub(crate) fn eval(expr: &Expr, scope: &mut dyn Scope) -> Result<Value, EvalError> {
    match expr {
        Expr::Lit(v) => Ok(v.clone()),
        Expr::Param(key) => scope
            .param(key)
            .ok_or_else(|| EvalError::UnknownName(key.clone())),
        Expr::Var(name) => scope
            .variable(name)
            .ok_or_else(|| EvalError::UnknownName(name.clone())),
        Expr::Attr(name) => scope
            .attribute(name)
            .ok_or_else(|| EvalError::UnknownName(format!("self.{}", name))),
        Expr::Neg(inner) => Ok(Value::Num(-eval(inner, scope)?.as_number()?)),
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, scope)?.truthy())),
        Expr::Binary("&&", l, r) => {
            let lhs = eval(l, scope)?;
            if !lhs.truthy() {
                return Ok(lhs);
            }
            eval(r, scope)
        }
        Expr::Binary("||", l, r) => {
            let lhs = eval(l, scope)?;
            if lhs.truthy() {
                return Ok(lhs);
            }
            eval(r, scope)
        }
        Expr::Binary(op, l, r) => {
            let lhs = eval(l, scope)?;
            let rhs = eval(r, scope)?;
            binary(op, lhs, rhs)
        }
        Expr::Call(name, args) => {
            let mut values: Vec<Value> = Vec::with_capacity(args.len());
            for arg in args {
                // `if` only evaluates the selected branch
                if name == "if" && values.len() == 1 {
                    let cond = values[0].clone();
                    let branch = match (cond, args.len()) {
                        (c, 3) if Value::truthy(&c) => &args[1],
                        (_, 3) => &args[2],
                        (_, got) => {
                            return Err(EvalError::Arity {
                                name: name.clone(),
                                expected: "3",
                                got,
                            })
                        }
                    };
                    return eval(branch, scope);
                }
                values.push(eval(arg, scope)?);
            }
            call(name, values, scope)
        }
    }
}

fn binary(op: &str, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    match op {
        "+" => match (&lhs, &rhs) {
            (Value::Str(_), _) | (_, Value::Str(_))
                if lhs.as_number().is_err() || rhs.as_number().is_err() =>
            {
                Ok(Value::Str(format!("{}{}", lhs, rhs)))
            }
            _ => Ok(Value::Num(lhs.as_number()? + rhs.as_number()?)),
        },
        "-" => Ok(Value::Num(lhs.as_number()? - rhs.as_number()?)),
        "*" => Ok(Value::Num(lhs.as_number()? * rhs.as_number()?)),
        "/" => {
            let d = rhs.as_number()?;
            if d == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(Value::Num(lhs.as_number()? / d))
        }
        "%" => {
            let d = rhs.as_number()?;
            if d == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(Value::Num(lhs.as_number()?.rem_euclid(d)))
        }
        "**" => Ok(Value::Num(lhs.as_number()?.powf(rhs.as_number()?))),
        _ => Ok(Value::Bool(compare(op, &lhs, &rhs))),
    }
}

fn arity(name: &str, values: &[Value], expected: &'static str, ok: bool) -> Result<(), EvalError> {
    if ok {
        Ok(())
    } else {
        Err(EvalError::Arity {
            name: name.to_string(),
            expected,
            got: values.len(),
        })
    }
}

fn call(name: &str, values: Vec<Value>, scope: &mut dyn Scope) -> Result<Value, EvalError> {
    let unary = |f: fn(f64) -> f64| -> Result<Value, EvalError> {
        arity(name, &values, "1", values.len() == 1)?;
        Ok(Value::Num(f(values[0].as_number()?)))
    };
    match name {
        "abs" => unary(f64::abs),
        "floor" => unary(f64::floor),
        "ceil" => unary(f64::ceil),
        "sin" => unary(f64::sin),
        "cos" => unary(f64::cos),
        "tan" => unary(f64::tan),
        "atan" => unary(f64::atan),
        "radians" => unary(f64::to_radians),
        "degrees" => unary(f64::to_degrees),
        "int" => unary(f64::trunc),
        "sqrt" | "asin" | "acos" => {
            arity(name, &values, "1", values.len() == 1)?;
            let x = values[0].as_number()?;
            match name {
                "sqrt" if x >= 0.0 => Ok(Value::Num(x.sqrt())),
                "asin" if (-1.0..=1.0).contains(&x) => Ok(Value::Num(x.asin())),
                "acos" if (-1.0..=1.0).contains(&x) => Ok(Value::Num(x.acos())),
                "sqrt" => Err(EvalError::Domain("sqrt")),
                "asin" => Err(EvalError::Domain("asin")),
                _ => Err(EvalError::Domain("acos")),
            }
        }
        "float" => {
            arity(name, &values, "1", values.len() == 1)?;
            Ok(Value::Num(values[0].as_number()?))
        }
        "str" => {
            arity(name, &values, "1", values.len() == 1)?;
            Ok(Value::Str(values[0].to_string()))
        }
        "len" => {
            arity(name, &values, "1", values.len() == 1)?;
            Ok(Value::Num(values[0].to_string().chars().count() as f64))
        }
        "round" => {
            arity(name, &values, "1 or 2", matches!(values.len(), 1 | 2))?;
            let x = values[0].as_number()?;
            let digits = match values.get(1) {
                Some(d) => d.as_number()? as i32,
                None => 0,
            };
            let scale = 10f64.powi(digits);
            Ok(Value::Num((x * scale).round() / scale))
        }
        "atan2" | "pow" => {
            arity(name, &values, "2", values.len() == 2)?;
            let (a, b) = (values[0].as_number()?, values[1].as_number()?);
            Ok(Value::Num(if name == "atan2" { a.atan2(b) } else { a.powf(b) }))
        }
        "min" | "max" => {
            arity(name, &values, "at least 1", !values.is_empty())?;
            let mut best = values[0].as_number()?;
            for v in &values[1..] {
                let x = v.as_number()?;
                best = if name == "min" { best.min(x) } else { best.max(x) };
            }
            Ok(Value::Num(best))
        }
        "param" => {
            arity(name, &values, "1", values.len() == 1)?;
            let key = values[0].to_string();
            scope.param(&key).ok_or(EvalError::UnknownName(key))
        }
        "include" | "include_once" => {
            arity(name, &values, "1", values.len() == 1)?;
            let file = values[0].to_string();
            Ok(Value::Str(scope.include(&file, name == "include_once")?))
        }
        "if" => Err(EvalError::Arity {
            name: name.to_string(),
            expected: "3",
            got: values.len(),
        }),
        _ => Err(EvalError::UnknownFunction(name.to_string())),
    }
}
