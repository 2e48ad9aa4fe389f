//! Type string parser.
//!
//! Tokenizes a type name and builds a [`TypeAst`] by recursive descent. Parsed
//! trees are cached per thread: the same handful of type strings arrives in
//! every block header.
//!
//! Enum bodies are not tokenized into the tree. The raw text between the
//! parentheses is kept in `value_string` and handed to the enum column, which
//! owns the enum body grammar.

use super::TypeCode;
use crate::{
    Error,
    Result,
};
use std::{
    cell::RefCell,
    collections::HashMap,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Assign,
    Name(&'a str),
    Number(&'a str),
    QuotedString(String),
    LPar,
    RPar,
    Comma,
    Eos,
}

/// TypeAst meta-type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeMeta {
    Array,
    Nullable,
    Number,
    String,
    Terminal,
    Tuple,
    Nested,
    Enum,
    LowCardinality,
    SimpleAggregateFunction,
    Map,
    Variant,
}

/// Abstract syntax tree for a type definition
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAst {
    /// Type's category
    pub meta: TypeMeta,
    /// Type code
    pub code: TypeCode,
    /// Type's name
    pub name: String,
    /// Numeric literal value (for `Number` nodes)
    pub value: i64,
    /// String literal value, or the raw body of an enum declaration
    pub value_string: String,
    /// Element name inside `Tuple(a T, ...)` and `Nested(a T, ...)`
    pub element_name: Option<String>,
    /// Sub-elements of the type
    pub elements: Vec<TypeAst>,
}

impl Default for TypeAst {
    fn default() -> Self {
        Self {
            meta: TypeMeta::Terminal,
            code: TypeCode::Void,
            name: String::new(),
            value: 0,
            value_string: String::new(),
            element_name: None,
            elements: Vec::new(),
        }
    }
}

/// Recursive-descent parser over one type string.
pub struct TypeParser<'a> {
    input: &'a str,
    cur: usize,
    peeked: Option<(usize, Token<'a>)>,
}

impl<'a> TypeParser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, cur: 0, peeked: None }
    }

    /// Parse the whole input into a single type tree.
    pub fn parse(&mut self) -> Result<TypeAst> {
        if self.peek()? == Token::Eos {
            return Err(self.error("empty type name"));
        }
        let ast = self.parse_node()?;
        match self.next()? {
            Token::Eos => Ok(ast),
            _ => Err(self.error("unexpected trailing input")),
        }
    }

    fn parse_node(&mut self) -> Result<TypeAst> {
        match self.next()? {
            Token::Number(text) => {
                let value = text
                    .parse::<i64>()
                    .map_err(|_| self.error("invalid number"))?;
                Ok(TypeAst {
                    meta: TypeMeta::Number,
                    value,
                    ..TypeAst::default()
                })
            }
            Token::QuotedString(text) => Ok(TypeAst {
                meta: TypeMeta::String,
                code: TypeCode::String,
                value_string: text,
                ..TypeAst::default()
            }),
            Token::Name(first) => {
                // `name Type` inside Tuple/Nested
                if let Token::Name(_) = self.peek()? {
                    let mut ast = self.parse_node()?;
                    ast.element_name = Some(first.to_string());
                    return Ok(ast);
                }
                self.parse_named(first)
            }
            _ => Err(self.error("expected a type name")),
        }
    }

    fn parse_named(&mut self, name: &'a str) -> Result<TypeAst> {
        let mut ast = TypeAst {
            meta: get_type_meta(name),
            code: get_type_code(name),
            name: name.to_string(),
            ..TypeAst::default()
        };

        if self.peek()? != Token::LPar {
            return Ok(ast);
        }
        self.next()?;

        if ast.meta == TypeMeta::Enum {
            ast.value_string = self.raw_until_close()?.to_string();
            return Ok(ast);
        }

        loop {
            ast.elements.push(self.parse_node()?);
            match self.next()? {
                Token::Comma => continue,
                Token::RPar => break,
                _ => return Err(self.error("expected ',' or ')'")),
            }
        }
        Ok(ast)
    }

    /// Consume input up to the `)` matching an already consumed `(`,
    /// skipping over quoted strings, and return the text in between.
    fn raw_until_close(&mut self) -> Result<&'a str> {
        let bytes = self.input.as_bytes();
        let start = self.cur;
        let mut depth = 0usize;
        let mut i = self.cur;
        while i < bytes.len() {
            match bytes[i] {
                b'\'' => {
                    i += 1;
                    while i < bytes.len() && bytes[i] != b'\'' {
                        if bytes[i] == b'\\' {
                            i += 1;
                        }
                        i += 1;
                    }
                }
                b'(' => depth += 1,
                b')' if depth == 0 => {
                    self.cur = i + 1;
                    return Ok(&self.input[start..i]);
                }
                b')' => depth -= 1,
                _ => {}
            }
            i += 1;
        }
        Err(self.error("unbalanced parentheses"))
    }

    fn peek(&mut self) -> Result<Token<'a>> {
        if self.peeked.is_none() {
            let start = self.cur;
            let token = self.lex()?;
            self.peeked = Some((start, token));
        }
        match &self.peeked {
            Some((_, token)) => Ok(token.clone()),
            None => Ok(Token::Eos),
        }
    }

    fn next(&mut self) -> Result<Token<'a>> {
        match self.peeked.take() {
            Some((_, token)) => Ok(token),
            None => self.lex(),
        }
    }

    fn lex(&mut self) -> Result<Token<'a>> {
        let bytes = self.input.as_bytes();
        while self.cur < bytes.len() && bytes[self.cur].is_ascii_whitespace() {
            self.cur += 1;
        }
        if self.cur >= bytes.len() {
            return Ok(Token::Eos);
        }

        let start = self.cur;
        let ch = bytes[self.cur];
        self.cur += 1;
        match ch {
            b'=' => Ok(Token::Assign),
            b'(' => Ok(Token::LPar),
            b')' => Ok(Token::RPar),
            b',' => Ok(Token::Comma),
            b'\'' => {
                let mut text = String::new();
                let mut chars = self.input[self.cur..].char_indices();
                while let Some((offset, c)) = chars.next() {
                    match c {
                        '\'' => {
                            self.cur += offset + 1;
                            return Ok(Token::QuotedString(text));
                        }
                        '\\' => match chars.next() {
                            Some((_, escaped)) => text.push(escaped),
                            None => break,
                        },
                        other => text.push(other),
                    }
                }
                Err(self.error("unterminated quoted string"))
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while self.cur < bytes.len()
                    && (bytes[self.cur].is_ascii_alphanumeric()
                        || bytes[self.cur] == b'_')
                {
                    self.cur += 1;
                }
                Ok(Token::Name(&self.input[start..self.cur]))
            }
            c if c.is_ascii_digit() || c == b'-' => {
                while self.cur < bytes.len()
                    && bytes[self.cur].is_ascii_digit()
                {
                    self.cur += 1;
                }
                Ok(Token::Number(&self.input[start..self.cur]))
            }
            _ => Err(self.error("invalid character")),
        }
    }

    fn error(&self, reason: &str) -> Error {
        let from = self.cur.min(self.input.len());
        let fragment = if from == self.input.len() {
            self.input.to_string()
        } else {
            self.input[from..].to_string()
        };
        Error::MalformedType { fragment, reason: reason.to_string() }
    }
}

fn get_type_meta(name: &str) -> TypeMeta {
    match name {
        "Array" => TypeMeta::Array,
        "Nullable" => TypeMeta::Nullable,
        "Tuple" => TypeMeta::Tuple,
        "Nested" => TypeMeta::Nested,
        "Enum8" | "Enum16" => TypeMeta::Enum,
        "LowCardinality" => TypeMeta::LowCardinality,
        "SimpleAggregateFunction" => TypeMeta::SimpleAggregateFunction,
        "Map" => TypeMeta::Map,
        "Variant" => TypeMeta::Variant,
        _ => TypeMeta::Terminal,
    }
}

fn get_type_code(name: &str) -> TypeCode {
    match name {
        "Int8" => TypeCode::Int8,
        "Int16" => TypeCode::Int16,
        "Int32" => TypeCode::Int32,
        "Int64" => TypeCode::Int64,
        "Int128" => TypeCode::Int128,
        "Bool" | "UInt8" => TypeCode::UInt8,
        "UInt16" => TypeCode::UInt16,
        "UInt32" => TypeCode::UInt32,
        "UInt64" => TypeCode::UInt64,
        "UInt128" => TypeCode::UInt128,
        "Float32" => TypeCode::Float32,
        "Float64" => TypeCode::Float64,
        "String" => TypeCode::String,
        "FixedString" => TypeCode::FixedString,
        "DateTime" => TypeCode::DateTime,
        "DateTime64" => TypeCode::DateTime64,
        "Date" => TypeCode::Date,
        "Date32" => TypeCode::Date32,
        "Array" => TypeCode::Array,
        "Nullable" => TypeCode::Nullable,
        "Tuple" => TypeCode::Tuple,
        "Nested" => TypeCode::Nested,
        "Enum8" => TypeCode::Enum8,
        "Enum16" => TypeCode::Enum16,
        "UUID" => TypeCode::UUID,
        "Decimal" | "Decimal32" | "Decimal64" | "Decimal128" => {
            TypeCode::Decimal
        }
        "LowCardinality" => TypeCode::LowCardinality,
        "Map" => TypeCode::Map,
        "Variant" => TypeCode::Variant,
        _ => TypeCode::Void,
    }
}

thread_local! {
    static TYPE_CACHE: RefCell<HashMap<String, TypeAst>> =
        RefCell::new(HashMap::new());
}

/// Parse a type name, returning a cached tree when the same string was
/// parsed before on this thread.
pub fn parse_type_name(type_name: &str) -> Result<TypeAst> {
    TYPE_CACHE.with(|cache| {
        if let Some(ast) = cache.borrow().get(type_name) {
            return Ok(ast.clone());
        }

        let ast = TypeParser::new(type_name).parse()?;
        cache.borrow_mut().insert(type_name.to_string(), ast.clone());
        Ok(ast)
    })
}
