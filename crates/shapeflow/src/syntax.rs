//! Parser for the textual signature language used in declaration files.
//!
//! Names written with a leading `::` (or with several segments) are nominal: `_Foo` is an
//! interface, `foo` an alias and anything else a class. A bare capitalised name such as
//! `Elem` is a type variable.

use std::collections::BTreeMap;

use crate::method_type::{Block, Function, MethodType, Params, TypeParam, Variance};
use crate::types::{Literal, ProcType, Type, TypeName};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at offset {offset}")]
pub struct SyntaxError {
    pub offset: usize,
    pub message: String,
}

pub fn parse_type(source: &str) -> Result<Type, SyntaxError> {
    let mut parser = Parser::new(source)?;
    let ty = parser.parse_type()?;
    parser.expect_end()?;
    Ok(ty)
}

pub fn parse_method_type(source: &str) -> Result<MethodType, SyntaxError> {
    let mut parser = Parser::new(source)?;
    let method_type = parser.parse_method_type()?;
    parser.expect_end()?;
    Ok(method_type)
}

/// Parses a declaration's type parameter, `Elem` or `T < ::Bound`.
pub fn parse_type_param(source: &str) -> Result<TypeParam, SyntaxError> {
    let mut parser = Parser::new(source)?;
    let param = parser.parse_type_param()?;
    parser.expect_end()?;
    Ok(param)
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Integer(i64),
    Str(String),
    Symbol(String),
    ColonColon,
    Colon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Pipe,
    Amp,
    Question,
    Star,
    StarStar,
    Arrow,
    FatArrow,
    Caret,
    Lt,
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn lex(source: &str) -> Result<Vec<Token>, SyntaxError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let at = |i: usize| chars.get(i).map(|(_, c)| *c);
    while i < chars.len() {
        let (offset, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let single = match c {
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            '{' => Some(TokenKind::LBrace),
            '}' => Some(TokenKind::RBrace),
            ',' => Some(TokenKind::Comma),
            '|' => Some(TokenKind::Pipe),
            '&' => Some(TokenKind::Amp),
            '?' => Some(TokenKind::Question),
            '^' => Some(TokenKind::Caret),
            '<' => Some(TokenKind::Lt),
            _ => None,
        };
        if let Some(kind) = single {
            tokens.push(Token { kind, offset });
            i += 1;
            continue;
        }
        match c {
            '*' => {
                if at(i + 1) == Some('*') {
                    tokens.push(Token {
                        kind: TokenKind::StarStar,
                        offset,
                    });
                    i += 2;
                } else {
                    tokens.push(Token {
                        kind: TokenKind::Star,
                        offset,
                    });
                    i += 1;
                }
            }
            '=' if at(i + 1) == Some('>') => {
                tokens.push(Token {
                    kind: TokenKind::FatArrow,
                    offset,
                });
                i += 2;
            }
            '-' if at(i + 1) == Some('>') => {
                tokens.push(Token {
                    kind: TokenKind::Arrow,
                    offset,
                });
                i += 2;
            }
            '-' | '0'..='9' => {
                let start = i;
                i += 1;
                while at(i).is_some_and(|c| c.is_ascii_digit() || c == '_') {
                    i += 1;
                }
                let text: String = chars[start..i]
                    .iter()
                    .map(|(_, c)| *c)
                    .filter(|c| *c != '_')
                    .collect();
                let value = text.parse::<i64>().map_err(|_| SyntaxError {
                    offset,
                    message: format!("invalid integer literal `{text}`"),
                })?;
                tokens.push(Token {
                    kind: TokenKind::Integer(value),
                    offset,
                });
            }
            '"' | '\'' => {
                let (text, next) = lex_string(&chars, i)?;
                tokens.push(Token {
                    kind: TokenKind::Str(text),
                    offset,
                });
                i = next;
            }
            ':' => {
                let prev_is_word = i > 0 && is_ident_char(chars[i - 1].1);
                match at(i + 1) {
                    Some(':') => {
                        tokens.push(Token {
                            kind: TokenKind::ColonColon,
                            offset,
                        });
                        i += 2;
                    }
                    Some(next) if !prev_is_word && is_ident_start(next) => {
                        let (name, end) = lex_ident(&chars, i + 1);
                        tokens.push(Token {
                            kind: TokenKind::Symbol(name),
                            offset,
                        });
                        i = end;
                    }
                    Some('"') | Some('\'') if !prev_is_word => {
                        let (name, end) = lex_string(&chars, i + 1)?;
                        tokens.push(Token {
                            kind: TokenKind::Symbol(name),
                            offset,
                        });
                        i = end;
                    }
                    _ => {
                        tokens.push(Token {
                            kind: TokenKind::Colon,
                            offset,
                        });
                        i += 1;
                    }
                }
            }
            c if is_ident_start(c) => {
                let (name, end) = lex_ident(&chars, i);
                tokens.push(Token {
                    kind: TokenKind::Ident(name),
                    offset,
                });
                i = end;
            }
            other => {
                return Err(SyntaxError {
                    offset,
                    message: format!("unexpected character `{other}`"),
                })
            }
        }
    }
    tokens.push(Token {
        kind: TokenKind::Eof,
        offset: source.len(),
    });
    Ok(tokens)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn lex_ident(chars: &[(usize, char)], start: usize) -> (String, usize) {
    let mut end = start;
    while chars.get(end).is_some_and(|(_, c)| is_ident_char(*c)) {
        end += 1;
    }
    (chars[start..end].iter().map(|(_, c)| *c).collect(), end)
}

fn lex_string(chars: &[(usize, char)], start: usize) -> Result<(String, usize), SyntaxError> {
    let (offset, quote) = chars[start];
    let mut text = String::new();
    let mut i = start + 1;
    while let Some((_, c)) = chars.get(i) {
        match c {
            c if *c == quote => return Ok((text, i + 1)),
            '\\' => {
                if let Some((_, escaped)) = chars.get(i + 1) {
                    text.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        other => *other,
                    });
                }
                i += 2;
            }
            other => {
                text.push(*other);
                i += 1;
            }
        }
    }
    Err(SyntaxError {
        offset,
        message: "unterminated string literal".to_string(),
    })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(source: &str) -> Result<Self, SyntaxError> {
        Ok(Self {
            tokens: lex(source)?,
            pos: 0,
        })
    }

    fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> &TokenKind {
        let index = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].offset
    }

    fn bump(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), SyntaxError> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn expect_end(&self) -> Result<(), SyntaxError> {
        match self.peek() {
            TokenKind::Eof => Ok(()),
            other => Err(self.error(format!("unexpected trailing token {other:?}"))),
        }
    }

    fn error(&self, message: String) -> SyntaxError {
        SyntaxError {
            offset: self.offset(),
            message,
        }
    }

    fn expect_ident(&mut self) -> Result<String, SyntaxError> {
        match self.bump() {
            TokenKind::Ident(name) => Ok(name),
            other => Err(self.error(format!("expected identifier, found {other:?}"))),
        }
    }

    fn parse_method_type(&mut self) -> Result<MethodType, SyntaxError> {
        let mut type_params = Vec::new();
        if self.eat(&TokenKind::LBracket) {
            loop {
                type_params.push(self.parse_type_param()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RBracket, "`]` after type parameters")?;
        }
        let params = if self.peek() == &TokenKind::LParen {
            self.parse_params()?
        } else {
            Params::empty()
        };
        let block = self.parse_block()?;
        self.expect(TokenKind::Arrow, "`->`")?;
        let return_type = self.parse_type()?;
        Ok(MethodType::new(
            type_params,
            Function::new(params, return_type),
            block,
        ))
    }

    fn parse_type_param(&mut self) -> Result<TypeParam, SyntaxError> {
        let mut unchecked = false;
        let mut variance = Variance::Invariant;
        loop {
            match self.peek() {
                TokenKind::Ident(word) if word == "unchecked" && self.next_is_ident() => {
                    self.bump();
                    unchecked = true;
                }
                TokenKind::Ident(word) if word == "out" && self.next_is_ident() => {
                    self.bump();
                    variance = Variance::Covariant;
                }
                TokenKind::Ident(word) if word == "in" && self.next_is_ident() => {
                    self.bump();
                    variance = Variance::Contravariant;
                }
                _ => break,
            }
        }
        let name = self.expect_ident()?;
        let upper_bound = if self.eat(&TokenKind::Lt) {
            Some(self.parse_type()?)
        } else {
            None
        };
        Ok(TypeParam {
            name,
            upper_bound,
            variance,
            unchecked,
        })
    }

    fn next_is_ident(&self) -> bool {
        matches!(self.peek_at(1), TokenKind::Ident(_))
    }

    fn parse_params(&mut self) -> Result<Params, SyntaxError> {
        self.expect(TokenKind::LParen, "`(`")?;
        let mut params = Params::empty();
        if self.eat(&TokenKind::RParen) {
            return Ok(params);
        }
        loop {
            match (self.peek().clone(), self.peek_at(1).clone(), self.peek_at(2).clone()) {
                (TokenKind::Question, TokenKind::Ident(name), TokenKind::Colon) => {
                    self.bump();
                    self.bump();
                    self.bump();
                    let ty = self.parse_type()?;
                    params.optional_keywords.insert(name, ty);
                }
                (TokenKind::Question, _, _) => {
                    self.bump();
                    params.optional.push(self.parse_type()?);
                }
                (TokenKind::StarStar, _, _) => {
                    self.bump();
                    params.rest_keywords = Some(self.parse_type()?);
                }
                (TokenKind::Star, _, _) => {
                    self.bump();
                    params.rest = Some(self.parse_type()?);
                }
                (TokenKind::Ident(name), TokenKind::Colon, _) => {
                    self.bump();
                    self.bump();
                    let ty = self.parse_type()?;
                    params.required_keywords.insert(name, ty);
                }
                _ => params.required.push(self.parse_type()?),
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "`)` after parameters")?;
        Ok(params)
    }

    fn parse_block(&mut self) -> Result<Option<Block>, SyntaxError> {
        let optional = match (self.peek(), self.peek_at(1)) {
            (TokenKind::Question, TokenKind::LBrace) => {
                self.bump();
                true
            }
            (TokenKind::LBrace, _) => false,
            _ => return Ok(None),
        };
        self.expect(TokenKind::LBrace, "`{`")?;
        let params = if self.peek() == &TokenKind::LParen {
            self.parse_params()?
        } else {
            Params::empty()
        };
        let mut self_type = None;
        if self.peek() == &TokenKind::LBracket {
            self.bump();
            match self.expect_ident()?.as_str() {
                "self" => {}
                other => return Err(self.error(format!("expected `self:` binding, found {other}"))),
            }
            self.expect(TokenKind::Colon, "`:`")?;
            self_type = Some(self.parse_type()?);
            self.expect(TokenKind::RBracket, "`]`")?;
        }
        self.expect(TokenKind::Arrow, "`->` in block")?;
        let return_type = self.parse_type()?;
        self.expect(TokenKind::RBrace, "`}` after block")?;
        Ok(Some(Block {
            function: Function::new(params, return_type),
            optional,
            self_type,
        }))
    }

    fn parse_type(&mut self) -> Result<Type, SyntaxError> {
        let mut members = vec![self.parse_intersection()?];
        while self.eat(&TokenKind::Pipe) {
            members.push(self.parse_intersection()?);
        }
        Ok(if members.len() == 1 {
            members.remove(0)
        } else {
            Type::union(members)
        })
    }

    fn parse_intersection(&mut self) -> Result<Type, SyntaxError> {
        let mut members = vec![self.parse_optional()?];
        while self.eat(&TokenKind::Amp) {
            members.push(self.parse_optional()?);
        }
        Ok(if members.len() == 1 {
            members.remove(0)
        } else {
            Type::intersection(members)
        })
    }

    fn parse_optional(&mut self) -> Result<Type, SyntaxError> {
        let mut ty = self.parse_primary()?;
        while self.peek() == &TokenKind::Question {
            self.bump();
            ty = Type::optional(ty);
        }
        Ok(ty)
    }

    fn parse_primary(&mut self) -> Result<Type, SyntaxError> {
        match self.peek().clone() {
            TokenKind::LParen => {
                self.bump();
                let ty = self.parse_type()?;
                self.expect(TokenKind::RParen, "`)`")?;
                Ok(ty)
            }
            TokenKind::LBracket => {
                self.bump();
                let types = self.parse_type_list(TokenKind::RBracket)?;
                Ok(Type::Tuple(types))
            }
            TokenKind::LBrace => self.parse_record(),
            TokenKind::Caret => {
                self.bump();
                let params = if self.peek() == &TokenKind::LParen {
                    self.parse_params()?
                } else {
                    Params::empty()
                };
                let block = self.parse_block()?;
                self.expect(TokenKind::Arrow, "`->` in proc type")?;
                let return_type = self.parse_optional()?;
                Ok(Type::Proc(Box::new(ProcType {
                    function: Function::new(params, return_type),
                    block,
                })))
            }
            TokenKind::Integer(value) => {
                self.bump();
                Ok(Type::Literal(Literal::Integer(value)))
            }
            TokenKind::Str(text) => {
                self.bump();
                Ok(Type::Literal(Literal::String(text)))
            }
            TokenKind::Symbol(name) => {
                self.bump();
                Ok(Type::Literal(Literal::Symbol(name)))
            }
            TokenKind::ColonColon | TokenKind::Ident(_) => self.parse_name(),
            other => Err(self.error(format!("expected a type, found {other:?}"))),
        }
    }

    fn parse_type_list(&mut self, close: TokenKind) -> Result<Vec<Type>, SyntaxError> {
        let mut types = Vec::new();
        if self.eat(&close) {
            return Ok(types);
        }
        loop {
            types.push(self.parse_type()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(close, "closing bracket")?;
        Ok(types)
    }

    fn parse_record(&mut self) -> Result<Type, SyntaxError> {
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut fields = BTreeMap::new();
        if self.eat(&TokenKind::RBrace) {
            return Ok(Type::Record(fields));
        }
        loop {
            let key = match (self.bump(), self.peek().clone()) {
                (TokenKind::Ident(name), TokenKind::Colon) => {
                    self.bump();
                    Literal::Symbol(name)
                }
                (TokenKind::Symbol(name), TokenKind::FatArrow) => {
                    self.bump();
                    Literal::Symbol(name)
                }
                (TokenKind::Str(text), TokenKind::FatArrow) => {
                    self.bump();
                    Literal::String(text)
                }
                (TokenKind::Integer(value), TokenKind::FatArrow) => {
                    self.bump();
                    Literal::Integer(value)
                }
                (other, _) => {
                    return Err(self.error(format!("expected a record key, found {other:?}")))
                }
            };
            let ty = self.parse_type()?;
            fields.insert(key, ty);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "`}` after record")?;
        Ok(Type::Record(fields))
    }

    fn parse_name(&mut self) -> Result<Type, SyntaxError> {
        let absolute = self.eat(&TokenKind::ColonColon);
        let first = self.expect_ident()?;
        if !absolute && self.peek() != &TokenKind::ColonColon {
            if let Some(ty) = self.parse_keyword(&first)? {
                return Ok(ty);
            }
        }
        let mut segments = vec![first];
        while self.eat(&TokenKind::ColonColon) {
            segments.push(self.expect_ident()?);
        }
        let args = if self.peek() == &TokenKind::LBracket {
            self.bump();
            self.parse_type_list(TokenKind::RBracket)?
        } else {
            Vec::new()
        };
        let last = segments.last().cloned().unwrap_or_default();
        let nominal = absolute || segments.len() > 1;
        if !nominal && last.starts_with(|c: char| c.is_ascii_uppercase()) {
            if !args.is_empty() {
                return Err(self.error(format!("type variable `{last}` takes no arguments")));
            }
            return Ok(Type::Var(last));
        }
        let name = TypeName::new(segments.join("::"));
        Ok(if name.is_interface() {
            Type::Interface { name, args }
        } else if name.is_alias() {
            Type::Alias { name, args }
        } else {
            Type::ClassInstance { name, args }
        })
    }

    fn parse_keyword(&mut self, word: &str) -> Result<Option<Type>, SyntaxError> {
        let ty = match word {
            "self" => Type::SelfType,
            "instance" => Type::Instance,
            "class" => Type::Class,
            "untyped" => Type::Any,
            "top" => Type::Top,
            "bot" => Type::Bot,
            "void" => Type::Void,
            "nil" => Type::Nil,
            "bool" | "boolish" => Type::Boolean,
            "true" => Type::true_type(),
            "false" => Type::false_type(),
            "singleton" => {
                self.expect(TokenKind::LParen, "`(` after singleton")?;
                self.eat(&TokenKind::ColonColon);
                let mut segments = vec![self.expect_ident()?];
                while self.eat(&TokenKind::ColonColon) {
                    segments.push(self.expect_ident()?);
                }
                self.expect(TokenKind::RParen, "`)` after singleton name")?;
                Type::singleton(TypeName::new(segments.join("::")))
            }
            _ => return Ok(None),
        };
        Ok(Some(ty))
    }
}
