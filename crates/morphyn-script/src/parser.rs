//! Recursive-descent parser
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! program    := entity*
//! entity     := "entity" IDENT "{" ( "has" IDENT ":" literal | event )* "}"
//! event      := "on" IDENT ( "(" params ")" )? "{" action* "}"
//! action     := "{" action* "}"
//!             | "check" expr ( ":" action | "{" action* "}" )?
//!             | "emit" IDENT ( "." IDENT ){0,2} args? ( "->" slot )?
//!             | "when" IDENT "." IDENT ":" IDENT args?
//!             | "unwhen" IDENT "." IDENT ":" IDENT
//!             | expr "->" slot
//! slot       := IDENT "." IDENT "[" expr "]" | IDENT "[" expr "]" | IDENT
//! expr       := and ( "or" and )*
//! and        := not ( "and" not )*
//! not        := "not" not | comparison
//! comparison := additive ( ( "==" | "!=" | "<" | ">" | "<=" | ">=" ) additive )*
//! additive   := factor ( ( "+" | "-" ) factor )*
//! factor     := term ( ( "*" | "/" | "%" ) term )*
//! term       := literal | "(" expr ")" | IDENT "." IDENT "[" expr "]"
//!             | IDENT "[" expr "]" | IDENT "." IDENT | IDENT
//! ```
//!
//! Name uniqueness (entities, and fields and events per entity) is checked
//! while parsing; the first duplicate aborts the whole parse.

use crate::ast::{EntityDecl, Program};
use crate::error::{source_context, Error, Result};
use crate::lexer::{line_col, tokenize, Spanned, Token};
use morphyn_core::{Action, BinaryOp, EmitTarget, Event, Expr, LogicOp, Pool, Value, ValueMap};
use std::collections::HashSet;

/// Token cursor over one source text
pub struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Spanned>,
    pos: usize,
}

impl<'s> Parser<'s> {
    /// Tokenize `source` and position the cursor at its start
    pub fn new(source: &'s str) -> Result<Self> {
        Ok(Self {
            source,
            tokens: tokenize(source)?,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|s| &s.token)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.unexpected(&token.to_string()))
        }
    }

    fn ident(&mut self, what: &str) -> Result<String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    /// A parse fault at the current token
    fn error(&self, message: String) -> Error {
        let offset = self
            .tokens
            .get(self.pos)
            .map_or(self.source.len(), |s| s.span.start);
        let (line, column) = line_col(self.source, offset);
        Error::Parse {
            line,
            column,
            message,
            context: source_context(self.source, line, column),
        }
    }

    fn unexpected(&self, expected: &str) -> Error {
        let found = match self.peek() {
            Some(token) => token.to_string(),
            None => "end of input".to_string(),
        };
        self.error(format!("expected {}, found {}", expected, found))
    }

    /// Parse a whole program
    pub fn program(&mut self) -> Result<Program> {
        let mut program = Program::default();
        let mut names = HashSet::new();
        while !self.at_end() {
            let decl = self.entity()?;
            if !names.insert(decl.name.clone()) {
                return Err(Error::DuplicateEntity(decl.name));
            }
            program.entities.push(decl);
        }
        Ok(program)
    }

    fn entity(&mut self) -> Result<EntityDecl> {
        self.expect(Token::Entity)?;
        let name = self.ident("entity name")?;
        self.expect(Token::LBrace)?;

        let mut fields = ValueMap::new();
        let mut events: Vec<Event> = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Has) => {
                    self.pos += 1;
                    let field = self.ident("field name")?;
                    self.expect(Token::Colon)?;
                    let value = self.literal()?;
                    if fields.contains_key(&field) {
                        return Err(Error::DuplicateField { entity: name, field });
                    }
                    fields.insert(field, value);
                }
                Some(Token::On) => {
                    let event = self.event()?;
                    if events.iter().any(|e| e.name == event.name) {
                        return Err(Error::DuplicateEvent {
                            entity: name,
                            event: event.name,
                        });
                    }
                    events.push(event);
                }
                Some(Token::RBrace) => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.unexpected("'has', 'on' or '}'")),
            }
        }
        Ok(EntityDecl {
            name,
            fields,
            events,
        })
    }

    /// A field initializer: number, string, boolean, null or pool literal
    fn literal(&mut self) -> Result<Value> {
        let value = match self.peek() {
            Some(Token::Number(n)) => Value::Number(*n),
            Some(Token::Minus) => match self.peek_at(1) {
                Some(Token::Number(n)) => {
                    let n = -*n;
                    self.pos += 1;
                    Value::Number(n)
                }
                _ => {
                    self.pos += 1;
                    return Err(self.unexpected("number"));
                }
            },
            Some(Token::Str(s)) => Value::String(s.clone()),
            Some(Token::True) => Value::Bool(true),
            Some(Token::False) => Value::Bool(false),
            Some(Token::Null) => Value::Null,
            Some(Token::Pool) => {
                self.pos += 1;
                self.expect(Token::LBracket)?;
                let mut pool = Pool::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        pool.append(self.literal()?);
                        if self.eat(&Token::RBracket) {
                            break;
                        }
                        self.expect(Token::Comma)?;
                    }
                }
                return Ok(Value::Pool(pool));
            }
            _ => return Err(self.unexpected("literal value")),
        };
        self.pos += 1;
        Ok(value)
    }

    fn event(&mut self) -> Result<Event> {
        self.expect(Token::On)?;
        let name = self.ident("event name")?;
        let mut params = Vec::new();
        if self.eat(&Token::LParen) && !self.eat(&Token::RParen) {
            loop {
                params.push(self.ident("parameter name")?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(Token::Comma)?;
            }
        }
        self.expect(Token::LBrace)?;
        let actions = self.actions_until_close()?;
        Ok(Event::new(name, params, actions))
    }

    /// Actions up to and including the closing `}`
    fn actions_until_close(&mut self) -> Result<Vec<Action>> {
        let mut actions = Vec::new();
        while !self.eat(&Token::RBrace) {
            if self.at_end() {
                return Err(self.unexpected("'}'"));
            }
            actions.push(self.action()?);
        }
        Ok(actions)
    }

    fn action(&mut self) -> Result<Action> {
        match self.peek() {
            Some(Token::LBrace) => {
                self.pos += 1;
                Ok(Action::Block(self.actions_until_close()?))
            }
            Some(Token::Check) => self.check(),
            Some(Token::Emit) => self.emit(),
            Some(Token::When) => self.when(),
            Some(Token::Unwhen) => self.unwhen(),
            _ => self.flow(),
        }
    }

    fn check(&mut self) -> Result<Action> {
        self.expect(Token::Check)?;
        let condition = self.expr()?;
        let then = if self.eat(&Token::Colon) {
            Some(Box::new(self.action()?))
        } else if self.peek() == Some(&Token::LBrace) {
            Some(Box::new(self.action()?))
        } else {
            None
        };
        Ok(Action::Check { condition, then })
    }

    fn emit(&mut self) -> Result<Action> {
        self.expect(Token::Emit)?;
        let mut path = vec![self.ident("event name")?];
        while self.eat(&Token::Dot) {
            if path.len() == 3 {
                return Err(self.error("emit target has too many '.' segments".to_string()));
            }
            path.push(self.ident("name after '.'")?);
        }

        let event = path.pop().unwrap_or_default();
        let target = match path.as_slice() {
            [] => EmitTarget::Implicit,
            [first] if first == "self" => EmitTarget::SelfRef,
            [first] => EmitTarget::Named(first.clone()),
            [entity, field, ..] => EmitTarget::Remote {
                entity: entity.clone(),
                field: field.clone(),
            },
        };
        let args = if self.peek() == Some(&Token::LParen) {
            self.call_args()?
        } else {
            Vec::new()
        };

        if !self.eat(&Token::Arrow) {
            return Ok(Action::Emit {
                target,
                event,
                args,
            });
        }
        if matches!(target, EmitTarget::Remote { .. }) {
            return Err(self.error("a pool command cannot return a value".to_string()));
        }
        match self.slot()? {
            (pool, Some(index)) => Ok(Action::EmitWithReturnIndexed {
                target,
                event,
                args,
                pool,
                index,
            }),
            (field, None) => Ok(Action::EmitWithReturn {
                target,
                event,
                args,
                field,
            }),
        }
    }

    fn when(&mut self) -> Result<Action> {
        self.expect(Token::When)?;
        let (target, event, handler) = self.subscription()?;
        let args = if self.peek() == Some(&Token::LParen) {
            Some(self.call_args()?)
        } else {
            None
        };
        Ok(Action::When {
            target,
            event,
            handler,
            args,
        })
    }

    fn unwhen(&mut self) -> Result<Action> {
        self.expect(Token::Unwhen)?;
        let (target, event, handler) = self.subscription()?;
        Ok(Action::Unwhen {
            target,
            event,
            handler,
        })
    }

    /// `Target.event: handler`
    fn subscription(&mut self) -> Result<(String, String, String)> {
        let target = self.ident("entity name")?;
        self.expect(Token::Dot)?;
        let event = self.ident("event name")?;
        self.expect(Token::Colon)?;
        let handler = self.ident("handler event name")?;
        Ok((target, event, handler))
    }

    fn flow(&mut self) -> Result<Action> {
        let value = self.expr()?;
        if !self.eat(&Token::Arrow) {
            return Err(self.unexpected("'->'"));
        }
        match self.slot()? {
            (pool, Some(index)) => Ok(Action::SetIndex { pool, index, value }),
            (target, None) => Ok(Action::Set { value, target }),
        }
    }

    /// Assignment target after `->`; the indexed form is tried first
    fn slot(&mut self) -> Result<(String, Option<Expr>)> {
        let start = self.pos;
        match self.indexed_slot() {
            Ok(slot) => Ok(slot),
            Err(_) => {
                self.pos = start;
                Ok((self.ident("assignment target")?, None))
            }
        }
    }

    fn indexed_slot(&mut self) -> Result<(String, Option<Expr>)> {
        let pool = self.ident("pool name")?;
        if self.eat(&Token::Dot) {
            self.ident("pool accessor")?;
        }
        self.expect(Token::LBracket)?;
        let index = self.expr()?;
        self.expect(Token::RBracket)?;
        Ok((pool, Some(index)))
    }

    fn call_args(&mut self) -> Result<Vec<Expr>> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            self.expect(Token::Comma)?;
        }
    }

    /// Parse one expression
    pub fn expr(&mut self) -> Result<Expr> {
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            let right = self.and()?;
            left = Expr::logic(LogicOp::Or, left, right);
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut left = self.not()?;
        while self.eat(&Token::And) {
            let right = self.not()?;
            left = Expr::logic(LogicOp::And, left, right);
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr> {
        if self.eat(&Token::Not) {
            return Ok(Expr::Not(Box::new(self.not()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::Ne,
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::LtEq) => BinaryOp::Le,
                Some(Token::GtEq) => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.additive()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.factor()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn factor(&mut self) -> Result<Expr> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.term()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn term(&mut self) -> Result<Expr> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.unexpected("expression"));
        };
        match token {
            Token::Number(_) | Token::Str(_) | Token::True | Token::False | Token::Null => {
                Ok(Expr::Literal(self.literal()?))
            }
            Token::Minus => {
                if matches!(self.peek_at(1), Some(Token::Number(_))) {
                    return Ok(Expr::Literal(self.literal()?));
                }
                self.pos += 1;
                let operand = self.term()?;
                Ok(Expr::binary(BinaryOp::Sub, Expr::lit(0.0), operand))
            }
            Token::LParen => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                self.pos += 1;
                let indexed_member = matches!(
                    (self.peek(), self.peek_at(1), self.peek_at(2)),
                    (Some(Token::Dot), Some(Token::Ident(_)), Some(Token::LBracket))
                );
                if indexed_member {
                    self.pos += 2;
                    return self.index(name);
                }
                if self.peek() == Some(&Token::LBracket) {
                    return self.index(name);
                }
                if self.eat(&Token::Dot) {
                    let property = self.ident("property name")?;
                    return Ok(Expr::Property {
                        target: name,
                        property,
                    });
                }
                Ok(Expr::Variable(name))
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn index(&mut self, pool: String) -> Result<Expr> {
        self.expect(Token::LBracket)?;
        let index = self.expr()?;
        self.expect(Token::RBracket)?;
        Ok(Expr::Index {
            pool,
            index: Box::new(index),
        })
    }
}

/// Parse a complete program
pub fn parse_program(source: &str) -> Result<Program> {
    Parser::new(source)?.program()
}

/// Parse a standalone expression, rejecting trailing input
pub fn parse_expression(source: &str) -> Result<Expr> {
    let mut parser = Parser::new(source)?;
    let expr = parser.expr()?;
    if !parser.at_end() {
        return Err(parser.unexpected("end of input"));
    }
    Ok(expr)
}
