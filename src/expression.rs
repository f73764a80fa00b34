//! Arithmetic expressions over channel names, used by math channels.
//!
//! Formulas are parsed into an [`Expr`] tree and evaluated per sample
//! against a lookup function; nothing is ever executed dynamically.
//!
//! ```text
//! (RPM * [Manifold Pressure]) / 1000
//! max(abs(Lambda - 1), 0.05) ^ 2
//! ```

use std::str::FromStr;
use strum::{Display, EnumString};

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

/// Built-in functions
#[derive(Debug, Clone, Copy, Display, EnumString, PartialEq)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Function {
    Abs,
    Min,
    Max,
    Sqrt,
}

impl Function {
    fn accepts(&self, args: usize) -> bool {
        match self {
            Function::Abs | Function::Sqrt => args == 1,
            Function::Min | Function::Max => args >= 1,
        }
    }
}

/// Expression AST
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Channel(String),
    Neg(Box<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
    Call(Function, Vec<Expr>),
}

impl Expr {
    /// Parse a complete formula
    pub fn parse(formula: &str) -> Result<Expr, String> {
        Parser::new(formula)?.parse()
    }

    /// Evaluate with `lookup` resolving channel names to the current sample.
    ///
    /// Returns `None` if a referenced sample is missing, on division by
    /// zero, or if the result is not finite.
    pub fn evaluate(&self, lookup: &dyn Fn(&str) -> Option<f64>) -> Option<f64> {
        let value = match self {
            Expr::Number(n) => *n,
            Expr::Channel(name) => lookup(name)?,
            Expr::Neg(inner) => -inner.evaluate(lookup)?,
            Expr::Binary(left, op, right) => {
                let l = left.evaluate(lookup)?;
                let r = right.evaluate(lookup)?;
                match op {
                    BinOp::Add => l + r,
                    BinOp::Sub => l - r,
                    BinOp::Mul => l * r,
                    BinOp::Div | BinOp::Mod if r == 0.0 => return None,
                    BinOp::Div => l / r,
                    BinOp::Mod => l % r,
                    BinOp::Pow => l.powf(r),
                }
            }
            Expr::Call(function, args) => {
                let values = args
                    .iter()
                    .map(|arg| arg.evaluate(lookup))
                    .collect::<Option<Vec<f64>>>()?;
                match function {
                    Function::Abs => values[0].abs(),
                    Function::Sqrt => values[0].sqrt(),
                    Function::Min => values.into_iter().fold(f64::INFINITY, f64::min),
                    Function::Max => values.into_iter().fold(f64::NEG_INFINITY, f64::max),
                }
            }
        };
        value.is_finite().then_some(value)
    }

    /// Channel names referenced by the expression, in first-use order
    pub fn variables(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expr::Number(_) => {}
            Expr::Channel(name) => {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
            Expr::Neg(inner) => inner.collect_variables(names),
            Expr::Binary(left, _, right) => {
                left.collect_variables(names);
                right.collect_variables(names);
            }
            Expr::Call(_, args) => {
                for arg in args {
                    arg.collect_variables(names);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LParen,
    RParen,
    Comma,
}

/// Recursive-descent parser, lowest precedence first
/// Deepest expression tree a formula may build
const MAX_DEPTH: usize = 256;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self, String> {
        Ok(Self {
            tokens: lex(input)?,
            pos: 0,
            depth: 0,
        })
    }

    /// Parse the whole token stream as one expression
    pub fn parse(&mut self) -> Result<Expr, String> {
        if self.tokens.is_empty() {
            return Err("empty formula".to_string());
        }
        let expr = self.parse_additive()?;
        match self.tokens.get(self.pos) {
            None => Ok(expr),
            Some(token) => Err(format!("unexpected {:?} after expression", token)),
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let entry_depth = self.depth;
        let mut node = self.parse_multiplicative()?;
        loop {
            let op = if self.match_token(Token::Plus) {
                BinOp::Add
            } else if self.match_token(Token::Minus) {
                BinOp::Sub
            } else {
                break;
            };
            self.descend()?;
            let right = self.parse_multiplicative()?;
            node = Expr::Binary(Box::new(node), op, Box::new(right));
        }
        self.depth = entry_depth;
        Ok(node)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let entry_depth = self.depth;
        let mut node = self.parse_unary()?;
        loop {
            let op = if self.match_token(Token::Star) {
                BinOp::Mul
            } else if self.match_token(Token::Slash) {
                BinOp::Div
            } else if self.match_token(Token::Percent) {
                BinOp::Mod
            } else {
                break;
            };
            self.descend()?;
            let right = self.parse_unary()?;
            node = Expr::Binary(Box::new(node), op, Box::new(right));
        }
        self.depth = entry_depth;
        Ok(node)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if self.match_token(Token::Minus) {
            self.descend()?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            Ok(Expr::Neg(Box::new(inner)))
        } else {
            self.parse_power()
        }
    }

    // `^` binds tighter than unary minus and associates to the right
    fn parse_power(&mut self) -> Result<Expr, String> {
        let base = self.parse_primary()?;
        if self.match_token(Token::Caret) {
            self.descend()?;
            let exponent = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Binary(Box::new(base), BinOp::Pow, Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Ident(name)) => {
                if !self.match_token(Token::LParen) {
                    return Ok(Expr::Channel(name));
                }
                let function = Function::from_str(&name)
                    .map_err(|_| format!("unknown function '{}'", name))?;
                let mut args = Vec::new();
                self.descend()?;
                if !self.match_token(Token::RParen) {
                    loop {
                        args.push(self.parse_additive()?);
                        if self.match_token(Token::RParen) {
                            break;
                        }
                        if !self.match_token(Token::Comma) {
                            return Err("expected ',' or ')'".to_string());
                        }
                    }
                }
                self.depth -= 1;
                if !function.accepts(args.len()) {
                    return Err(format!(
                        "{}() does not take {} argument(s)",
                        function,
                        args.len()
                    ));
                }
                Ok(Expr::Call(function, args))
            }
            Some(Token::LParen) => {
                self.descend()?;
                let expr = self.parse_additive()?;
                if !self.match_token(Token::RParen) {
                    return Err("expected ')'".to_string());
                }
                self.depth -= 1;
                Ok(expr)
            }
            Some(token) => Err(format!("unexpected {:?}", token)),
            None => Err("unexpected end of formula".to_string()),
        }
    }

    fn descend(&mut self) -> Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err("formula nested too deeply".to_string());
        }
        Ok(())
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn match_token(&mut self, token: Token) -> bool {
        if self.tokens.get(self.pos) == Some(&token) {
            self.pos += 1;
            return true;
        }
        false
    }
}

fn lex(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            c if c.is_whitespace() => continue,
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            ',' => tokens.push(Token::Comma),
            '+' => tokens.push(Token::Plus),
            '-' => tokens.push(Token::Minus),
            '*' => tokens.push(Token::Star),
            '/' => tokens.push(Token::Slash),
            '%' => tokens.push(Token::Percent),
            '^' => tokens.push(Token::Caret),
            '[' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(c) => name.push(c),
                        None => return Err("unterminated '[' in channel name".to_string()),
                    }
                }
                let name = name.trim();
                if name.is_empty() {
                    return Err("empty channel name '[]'".to_string());
                }
                tokens.push(Token::Ident(name.to_string()));
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut s = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_digit() || next == '.' {
                        s.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n = s
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{}'", s))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut s = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' || next == '.' {
                        s.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(s));
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }
    Ok(tokens)
}
