use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::ast::*;
use super::error::CompileError;
use super::lexer::{Token, TokenKind};

/// Which top-level entity declaration forms the parser accepts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, schemars::JsonSchema,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum EntitySyntax {
    /// Only `let <name>: id = new entity { ... }`.
    #[default]
    Strict,
    /// Also the older `entity { }`, `entity @name { }`, `@name { }`,
    /// `name = new entity { }` and `new entity { }` forms.
    Permissive,
}

/// Parse a token stream with the strict entity grammar.
pub fn parse(tokens: Vec<Token>) -> Result<Module, CompileError> {
    parse_with(tokens, EntitySyntax::Strict)
}

/// Parse a token stream. Stops at the first structural error.
pub fn parse_with(tokens: Vec<Token>, entity_syntax: EntitySyntax) -> Result<Module, CompileError> {
    let mut parser = Parser::new(tokens, entity_syntax);
    parser.parse_items(TokenKind::Eof)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    entity_syntax: EntitySyntax,
}

impl Parser {
    fn new(mut tokens: Vec<Token>, entity_syntax: EntitySyntax) -> Self {
        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let end = tokens.last().map_or(0, |t| t.span.end);
            tokens.push(Token {
                kind: TokenKind::Eof,
                text: String::new(),
                span: Span::new(end, end),
            });
        }
        Self {
            tokens,
            pos: 0,
            entity_syntax,
        }
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn current(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn peek(&self) -> TokenKind {
        self.current().kind
    }

    fn peek_at(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map_or(TokenKind::Eof, |t| t.kind)
    }

    fn span(&self) -> Span {
        self.current().span
    }

    fn prev_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(0, |t| t.span.end)
    }

    fn at_eof(&self) -> bool {
        self.peek() == TokenKind::Eof
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek() == kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_here(&self, expected: &str) -> CompileError {
        let tok = self.current();
        let found = if tok.kind == TokenKind::Eof {
            "end of input".to_string()
        } else {
            format!("'{}'", tok.text)
        };
        CompileError::parser(format!("Expected {expected}, found {found}"), tok.span)
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, CompileError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(expected))
        }
    }

    fn expect_ident(&mut self, expected: &str) -> Result<(String, Span), CompileError> {
        let tok = self.expect(TokenKind::Identifier, expected)?;
        Ok((tok.text, tok.span))
    }

    /// Field and parameter names may reuse a few keywords (`entity`, `event`, `id`).
    fn expect_field_name(&mut self, expected: &str) -> Result<(String, Span), CompileError> {
        match self.peek() {
            TokenKind::Identifier | TokenKind::Entity | TokenKind::Event | TokenKind::TypeId => {
                let tok = self.advance();
                Ok((tok.text, tok.span))
            }
            _ => Err(self.error_here(expected)),
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), TokenKind::Semicolon | TokenKind::Comma) {
            self.advance();
        }
    }

    // ── Items ──────────────────────────────────────────────────────

    fn parse_items(&mut self, terminator: TokenKind) -> Result<Module, CompileError> {
        let mut items = Vec::new();
        loop {
            while self.eat(TokenKind::Semicolon) {}
            if self.check(terminator) || self.at_eof() {
                break;
            }
            items.push(self.parse_item()?);
        }
        Ok(Module { items })
    }

    fn parse_item(&mut self) -> Result<Item, CompileError> {
        let permissive = self.entity_syntax == EntitySyntax::Permissive;
        match self.peek() {
            TokenKind::Component => self.parse_component().map(Item::Component),
            TokenKind::Rule => self.parse_rule().map(Item::Rule),
            TokenKind::Fn => self.parse_function(false).map(Item::Function),
            TokenKind::Choice => self.parse_function(true).map(Item::Function),
            TokenKind::Import => self.parse_import().map(Item::Import),
            TokenKind::Module => self.parse_module_def().map(Item::Module),
            TokenKind::Let => self.parse_let_entity().map(Item::Entity),
            TokenKind::Entity | TokenKind::New | TokenKind::EntityRef if permissive => {
                self.parse_legacy_entity().map(Item::Entity)
            }
            TokenKind::Identifier
                if permissive
                    && self.peek_at(1) == TokenKind::Eq
                    && self.peek_at(2) == TokenKind::New =>
            {
                let (name, span) = self.expect_ident("entity variable name")?;
                self.expect(TokenKind::Eq, "'='")?;
                self.expect(TokenKind::New, "'new'")?;
                self.expect(TokenKind::Entity, "'entity'")?;
                self.parse_entity_body(span.start, Some(name))
                    .map(Item::Entity)
            }
            TokenKind::Entity | TokenKind::New | TokenKind::EntityRef => Err(CompileError::parser(
                "Anonymous entity blocks are not allowed here; declare entities as \
                 `let <name>: id = new entity { ... }`",
                self.span(),
            )),
            _ => Err(self.error_here(
                "component, rule, fn, choice fn, import, module, or entity declaration",
            )),
        }
    }

    fn parse_component(&mut self) -> Result<ComponentDef, CompileError> {
        let start = self.expect(TokenKind::Component, "'component'")?.span.start;
        let (name, _) = self.expect_ident("component name")?;
        self.expect(TokenKind::LBrace, "'{'")?;

        let mut fields = Vec::new();
        self.skip_separators();
        while !self.check(TokenKind::RBrace) && !self.at_eof() {
            fields.push(self.parse_field_def()?);
            self.skip_separators();
        }
        self.expect(TokenKind::RBrace, "'}'")?;

        Ok(ComponentDef {
            name,
            fields,
            span: Span::new(start, self.prev_end()),
        })
    }

    fn parse_field_def(&mut self) -> Result<FieldDef, CompileError> {
        let (name, name_span) = self.expect_field_name("field name")?;
        self.expect(TokenKind::Colon, "':'")?;
        let (ty, optional) = match self.parse_type()? {
            TypeExpr::Optional(inner) => (*inner, true),
            other => (other, false),
        };
        Ok(FieldDef {
            name,
            ty,
            optional,
            span: Span::new(name_span.start, self.prev_end()),
        })
    }

    fn parse_rule(&mut self) -> Result<RuleDef, CompileError> {
        let start = self.expect(TokenKind::Rule, "'rule'")?.span.start;

        // `rule name on ...` vs `rule on ...`
        let name = if self.check(TokenKind::Identifier) && self.peek_at(1) == TokenKind::On {
            Some(self.advance().text)
        } else {
            None
        };
        self.expect(TokenKind::On, "'on'")?;
        let (event, _) = self.expect_ident("event name")?;

        self.expect(
            TokenKind::LParen,
            "'(' and a typed event parameter, e.g. `on Hit(h: id)`",
        )?;
        let (param_name, param_span) = self.expect_field_name("event parameter name")?;
        self.expect(TokenKind::Colon, "':' and the event parameter type")?;
        let param_ty = self.parse_type()?;
        let param = Param {
            name: param_name,
            ty: param_ty,
            span: Span::new(param_span.start, self.prev_end()),
        };
        self.expect(TokenKind::RParen, "')'")?;

        let guard = if self.eat(TokenKind::When) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let priority = if self.at_priority_clause() {
            self.advance();
            self.advance();
            self.expect(TokenKind::Colon, "':'")?;
            let negative = self.eat(TokenKind::Minus);
            let tok = self.expect(TokenKind::Integer, "integer priority")?;
            let value: i64 = tok.text.parse().map_err(|_| {
                CompileError::parser(format!("Priority out of range: {}", tok.text), tok.span)
            })?;
            self.expect(TokenKind::RBracket, "']'")?;
            Some(if negative { -value } else { value })
        } else {
            None
        };

        let body = self.parse_block()?;
        Ok(RuleDef {
            name,
            event,
            param,
            guard,
            priority,
            body,
            span: Span::new(start, self.prev_end()),
        })
    }

    /// `[priority: N]` following a rule head.
    fn at_priority_clause(&self) -> bool {
        self.check(TokenKind::LBracket)
            && self.peek_at(1) == TokenKind::Identifier
            && self.tokens.get(self.pos + 1).is_some_and(|t| t.text == "priority")
            && self.peek_at(2) == TokenKind::Colon
    }

    fn parse_function(&mut self, is_choice: bool) -> Result<FnDef, CompileError> {
        let start = self.span().start;
        if is_choice {
            self.expect(TokenKind::Choice, "'choice'")?;
        }
        self.expect(TokenKind::Fn, "'fn'")?;
        let (name, _) = self.expect_ident("function name")?;
        let params = self.parse_params(is_choice)?;
        let return_type = self.parse_return_type()?;
        let body = self.parse_block()?;
        Ok(FnDef {
            name,
            params,
            return_type,
            body,
            is_choice,
            span: Span::new(start, self.prev_end()),
        })
    }

    fn parse_params(&mut self, allow_composite: bool) -> Result<Vec<Param>, CompileError> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        while !self.check(TokenKind::RParen) && !self.at_eof() {
            let (name, name_span) = self.expect_field_name("parameter name")?;
            self.expect(TokenKind::Colon, "':' and a parameter type")?;
            let ty = self.parse_param_type(allow_composite)?;
            params.push(Param {
                name,
                ty,
                span: Span::new(name_span.start, self.prev_end()),
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(params)
    }

    fn parse_return_type(&mut self) -> Result<Option<TypeExpr>, CompileError> {
        if self.eat(TokenKind::Colon) || self.eat(TokenKind::Arrow) {
            Ok(Some(self.parse_type()?))
        } else {
            Ok(None)
        }
    }

    /// A type, or `A & B & C` where intersections are allowed.
    fn parse_param_type(&mut self, allow_composite: bool) -> Result<TypeExpr, CompileError> {
        let start = self.span().start;
        let first = self.parse_type()?;
        if !self.check(TokenKind::Amp) {
            return Ok(first);
        }
        if !allow_composite {
            return Err(CompileError::parser(
                "Intersection types are only allowed in choice function parameters",
                self.span(),
            ));
        }
        let mut types = vec![first];
        while self.eat(TokenKind::Amp) {
            types.push(self.parse_type()?);
        }
        let mut names = Vec::with_capacity(types.len());
        for ty in types {
            match ty {
                TypeExpr::Named(name) => names.push(name),
                other => {
                    return Err(CompileError::parser(
                        format!("Intersection types may only combine component types, found '{other}'"),
                        Span::new(start, self.prev_end()),
                    ));
                }
            }
        }
        Ok(TypeExpr::Composite(names))
    }

    fn parse_type(&mut self) -> Result<TypeExpr, CompileError> {
        let base = match self.peek() {
            TokenKind::TypeString => TypeExpr::String,
            TokenKind::TypeBoolean => TypeExpr::Boolean,
            TokenKind::TypeInteger => TypeExpr::Integer,
            TokenKind::TypeFloat => TypeExpr::Float,
            TokenKind::TypeDecimal => TypeExpr::Decimal,
            TokenKind::TypeId => TypeExpr::Id,
            TokenKind::TypeList => {
                self.advance();
                // A bare `list` is a list of entity ids.
                let inner = if self.eat(TokenKind::Lt) {
                    let inner = self.parse_type()?;
                    self.expect(TokenKind::Gt, "'>'")?;
                    inner
                } else {
                    TypeExpr::Id
                };
                return self.parse_type_suffix(TypeExpr::List(Box::new(inner)));
            }
            TokenKind::Identifier if self.current().text == "optional" && self.peek_at(1) == TokenKind::Lt => {
                self.advance();
                self.advance();
                let inner = self.parse_type()?;
                self.expect(TokenKind::Gt, "'>'")?;
                return self.parse_type_suffix(TypeExpr::Optional(Box::new(inner)));
            }
            TokenKind::Identifier => TypeExpr::Named(self.current().text.clone()),
            _ => return Err(self.error_here("type")),
        };
        self.advance();
        self.parse_type_suffix(base)
    }

    /// `T?` is shorthand for `optional<T>`.
    fn parse_type_suffix(&mut self, ty: TypeExpr) -> Result<TypeExpr, CompileError> {
        if self.eat(TokenKind::Question) {
            Ok(TypeExpr::Optional(Box::new(ty)))
        } else {
            Ok(ty)
        }
    }

    fn parse_import(&mut self) -> Result<ImportDef, CompileError> {
        let start = self.expect(TokenKind::Import, "'import'")?.span.start;
        let (first, _) = self.expect_ident("module path")?;
        let mut path = vec![first];
        let mut items = None;
        while self.eat(TokenKind::Dot) {
            if self.eat(TokenKind::LBrace) {
                let mut names = Vec::new();
                while !self.check(TokenKind::RBrace) && !self.at_eof() {
                    names.push(self.expect_ident("imported name")?.0);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBrace, "'}'")?;
                items = Some(names);
                break;
            }
            path.push(self.expect_ident("module path segment")?.0);
        }
        Ok(ImportDef {
            path,
            items,
            span: Span::new(start, self.prev_end()),
        })
    }

    fn parse_module_def(&mut self) -> Result<ModuleDef, CompileError> {
        let start = self.expect(TokenKind::Module, "'module'")?.span.start;
        let (name, _) = self.expect_ident("module name")?;
        self.expect(TokenKind::LBrace, "'{'")?;
        let module = self.parse_items(TokenKind::RBrace)?;
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(ModuleDef {
            name,
            module,
            span: Span::new(start, self.prev_end()),
        })
    }

    // ── Entities ───────────────────────────────────────────────────

    /// `let name: id = new entity { ... }`
    fn parse_let_entity(&mut self) -> Result<EntityDef, CompileError> {
        let start = self.expect(TokenKind::Let, "'let'")?.span.start;
        let (name, _) = self.expect_ident("entity variable name")?;

        let annotated = if self.entity_syntax == EntitySyntax::Strict {
            self.expect(
                TokenKind::Colon,
                "': id' (entities are declared as `let <name>: id = new entity { ... }`)",
            )?;
            true
        } else {
            self.eat(TokenKind::Colon)
        };
        if annotated {
            let ty_span = self.span();
            let ty = self.parse_type()?;
            if ty != TypeExpr::Id {
                return Err(CompileError::parser(
                    format!("Entity variables must have type 'id', found '{ty}'"),
                    ty_span,
                ));
            }
        }

        self.expect(TokenKind::Eq, "'='")?;
        self.expect(TokenKind::New, "'new entity'")?;
        self.expect(TokenKind::Entity, "'entity'")?;
        self.parse_entity_body(start, Some(name))
    }

    /// `entity { }`, `entity @name { }`, `entity name { }`, `@name { }`, `new entity { }`
    fn parse_legacy_entity(&mut self) -> Result<EntityDef, CompileError> {
        let start = self.span().start;
        let variable = match self.peek() {
            TokenKind::EntityRef => Some(entity_ref_name(&self.advance().text)),
            TokenKind::New => {
                self.advance();
                self.expect(TokenKind::Entity, "'entity'")?;
                None
            }
            _ => {
                self.expect(TokenKind::Entity, "'entity'")?;
                match self.peek() {
                    TokenKind::EntityRef => Some(entity_ref_name(&self.advance().text)),
                    TokenKind::Identifier if self.peek_at(1) == TokenKind::LBrace => {
                        Some(self.advance().text)
                    }
                    _ => None,
                }
            }
        };
        self.parse_entity_body(start, variable)
    }

    fn parse_entity_body(
        &mut self,
        start: usize,
        variable: Option<String>,
    ) -> Result<EntityDef, CompileError> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut components = Vec::new();
        let mut bound_functions = Vec::new();
        self.skip_separators();
        while !self.check(TokenKind::RBrace) && !self.at_eof() {
            if self.check(TokenKind::Dot) {
                bound_functions.push(self.parse_bound_function()?);
            } else {
                components.push(self.parse_component_init()?);
            }
            self.skip_separators();
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(EntityDef {
            variable,
            components,
            bound_functions,
            span: Span::new(start, self.prev_end()),
        })
    }

    /// `.name = choice(params): Type { body }`
    fn parse_bound_function(&mut self) -> Result<BoundFnDef, CompileError> {
        let start = self.expect(TokenKind::Dot, "'.'")?.span.start;
        let (name, _) = self.expect_ident("bound function name")?;
        self.expect(TokenKind::Eq, "'='")?;
        self.expect(TokenKind::Choice, "'choice'")?;
        let params = self.parse_params(true)?;
        let return_type = self.parse_return_type()?;
        let body = self.parse_block()?;
        Ok(BoundFnDef {
            name,
            params,
            return_type,
            body,
            span: Span::new(start, self.prev_end()),
        })
    }

    /// `Health { current: 100 max: 100 }`
    fn parse_component_init(&mut self) -> Result<ComponentInit, CompileError> {
        let (name, name_span) = self.expect_ident("component name")?;
        self.expect(TokenKind::LBrace, "'{'")?;
        let fields = self.parse_field_inits()?;
        Ok(ComponentInit {
            name,
            fields,
            span: Span::new(name_span.start, self.prev_end()),
        })
    }

    /// `field: expr ...` up to and including the closing brace.
    fn parse_field_inits(&mut self) -> Result<Vec<FieldInit>, CompileError> {
        let mut fields = Vec::new();
        self.skip_separators();
        while !self.check(TokenKind::RBrace) && !self.at_eof() {
            let (name, name_span) = self.expect_field_name("field name")?;
            self.expect(TokenKind::Colon, "':'")?;
            let value = self.parse_expr()?;
            fields.push(FieldInit {
                name,
                span: name_span.merge(value.span),
                value,
            });
            self.skip_separators();
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(fields)
    }

    // ── Statements ─────────────────────────────────────────────────

    fn parse_block(&mut self) -> Result<Block, CompileError> {
        let start = self.expect(TokenKind::LBrace, "'{'")?.span.start;
        let mut stmts = Vec::new();
        loop {
            while self.eat(TokenKind::Semicolon) {}
            if self.check(TokenKind::RBrace) || self.at_eof() {
                break;
            }
            stmts.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Block {
            stmts,
            span: Span::new(start, self.prev_end()),
        })
    }

    fn parse_stmt(&mut self) -> Result<Stmt, CompileError> {
        match self.peek() {
            TokenKind::Let => self.parse_let(),
            TokenKind::If => self.parse_if().map(Stmt::If),
            TokenKind::For => self.parse_for(),
            TokenKind::While => self.parse_while(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Schedule => self.parse_schedule().map(Stmt::Schedule),
            TokenKind::Cancel => {
                let start = self.advance().span.start;
                let target = self.parse_expr()?;
                Ok(Stmt::Cancel {
                    span: Span::new(start, target.span.end),
                    target,
                })
            }
            TokenKind::Create => {
                let start = self.advance().span.start;
                self.expect(TokenKind::Entity, "'entity'")?;
                self.expect(TokenKind::LBrace, "'{'")?;
                let mut components = Vec::new();
                self.skip_separators();
                while !self.check(TokenKind::RBrace) && !self.at_eof() {
                    components.push(self.parse_component_init()?);
                    self.skip_separators();
                }
                self.expect(TokenKind::RBrace, "'}'")?;
                Ok(Stmt::Create {
                    components,
                    span: Span::new(start, self.prev_end()),
                })
            }
            TokenKind::Delete => {
                let start = self.advance().span.start;
                let target = self.parse_expr()?;
                Ok(Stmt::Delete {
                    span: Span::new(start, target.span.end),
                    target,
                })
            }
            _ => self.parse_expr_or_assign(),
        }
    }

    fn parse_let(&mut self) -> Result<Stmt, CompileError> {
        let start = self.expect(TokenKind::Let, "'let'")?.span.start;
        let (name, _) = self.expect_ident("variable name")?;
        let ty = if self.eat(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(TokenKind::Eq, "'='")?;
        let value = self.parse_expr()?;
        Ok(Stmt::Let {
            name,
            ty,
            span: Span::new(start, value.span.end),
            value,
        })
    }

    fn parse_if(&mut self) -> Result<IfStmt, CompileError> {
        let start = self.expect(TokenKind::If, "'if'")?.span.start;
        let condition = self.parse_expr()?;
        let then_block = self.parse_block()?;
        let else_branch = if self.eat(TokenKind::Else) {
            if self.check(TokenKind::If) {
                Some(ElseBranch::ElseIf(Box::new(self.parse_if()?)))
            } else {
                Some(ElseBranch::Else(self.parse_block()?))
            }
        } else {
            None
        };
        Ok(IfStmt {
            condition,
            then_block,
            else_branch,
            span: Span::new(start, self.prev_end()),
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, CompileError> {
        let start = self.expect(TokenKind::For, "'for'")?.span.start;
        let (var, _) = self.expect_ident("loop variable")?;
        self.expect(TokenKind::In, "'in'")?;
        let iterable = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(Stmt::For {
            var,
            iterable,
            body,
            span: Span::new(start, self.prev_end()),
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, CompileError> {
        let start = self.expect(TokenKind::While, "'while'")?.span.start;
        let condition = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(Stmt::While {
            condition,
            body,
            span: Span::new(start, self.prev_end()),
        })
    }

    fn parse_return(&mut self) -> Result<Stmt, CompileError> {
        let tok = self.expect(TokenKind::Return, "'return'")?;
        // A statement keyword after `return` starts the next statement.
        let value = if matches!(
            self.peek(),
            TokenKind::RBrace
                | TokenKind::Semicolon
                | TokenKind::Eof
                | TokenKind::Let
                | TokenKind::If
                | TokenKind::For
                | TokenKind::While
                | TokenKind::Return
                | TokenKind::Schedule
                | TokenKind::Cancel
                | TokenKind::Create
                | TokenKind::Delete
        ) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        let end = value.as_ref().map_or(tok.span.end, |v| v.span.end);
        Ok(Stmt::Return {
            value,
            span: Span::new(tok.span.start, end),
        })
    }

    /// `schedule [recurring] [[delay: e] | [interval: e]] Event [{ field: e ... }]`
    fn parse_schedule(&mut self) -> Result<ScheduleStmt, CompileError> {
        let start = self.expect(TokenKind::Schedule, "'schedule'")?.span.start;
        let recurring = self.eat(TokenKind::Recurring);

        let mut delay = None;
        let mut interval = None;
        if self.eat(TokenKind::LBracket) {
            let (key, key_span) = self.expect_ident("'delay' or 'interval'")?;
            self.expect(TokenKind::Colon, "':'")?;
            let value = self.parse_expr()?;
            match key.as_str() {
                "delay" => delay = Some(value),
                "interval" => interval = Some(value),
                _ => {
                    return Err(CompileError::parser(
                        format!("Expected 'delay' or 'interval', found '{key}'"),
                        key_span,
                    ));
                }
            }
            self.expect(TokenKind::RBracket, "']'")?;
        }

        let (event, _) = self.expect_ident("event name")?;
        let fields = if self.eat(TokenKind::LBrace) {
            self.parse_field_inits()?
        } else {
            Vec::new()
        };

        Ok(ScheduleStmt {
            event,
            recurring,
            delay,
            interval,
            fields,
            span: Span::new(start, self.prev_end()),
        })
    }

    fn parse_expr_or_assign(&mut self) -> Result<Stmt, CompileError> {
        let target = self.parse_expr()?;
        let op = match self.peek() {
            TokenKind::Eq => AssignOp::Set,
            TokenKind::PlusEq => AssignOp::Add,
            TokenKind::MinusEq => AssignOp::Subtract,
            TokenKind::StarEq => AssignOp::Multiply,
            TokenKind::SlashEq => AssignOp::Divide,
            _ => return Ok(Stmt::Expr(target)),
        };
        if !matches!(
            target.kind,
            ExprKind::Ident(_) | ExprKind::Field { .. } | ExprKind::Index { .. }
        ) {
            return Err(CompileError::parser(
                "Invalid assignment target: expected a variable, field, or index",
                target.span,
            ));
        }
        self.advance();
        let value = self.parse_expr()?;
        Ok(Stmt::Assign {
            span: target.span.merge(value.span),
            target,
            op,
            value,
        })
    }

    // ── Expressions (lowest to highest precedence) ─────────────────

    fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        self.parse_or()
    }

    fn binary(left: Expr, op: BinOp, right: Expr) -> Expr {
        let span = left.span.merge(right.span);
        Expr {
            kind: ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        }
    }

    fn parse_or(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_and()?;
        while self.eat(TokenKind::OrOr) {
            let right = self.parse_and()?;
            left = Self::binary(left, BinOp::Or, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_equality()?;
        while self.eat(TokenKind::AndAnd) {
            let right = self.parse_equality()?;
            left = Self::binary(left, BinOp::And, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::NotEq => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            left = Self::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Ge => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Self::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Self::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Self::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        let op = match self.peek() {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            _ => return self.parse_postfix(),
        };
        let start = self.advance().span.start;
        let operand = self.parse_unary()?;
        Ok(Expr {
            span: Span::new(start, operand.span.end),
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    let (field, field_span) = self.expect_field_name("field name")?;
                    if self.check(TokenKind::LParen) {
                        let args = self.parse_args()?;
                        expr = Expr {
                            span: Span::new(expr.span.start, self.prev_end()),
                            kind: ExprKind::MethodCall {
                                object: Box::new(expr),
                                method: field,
                                args,
                            },
                        };
                    } else {
                        expr = Expr {
                            span: expr.span.merge(field_span),
                            kind: ExprKind::Field {
                                object: Box::new(expr),
                                field,
                            },
                        };
                    }
                }
                TokenKind::LBracket if !self.at_priority_clause() => {
                    self.advance();
                    let index = self.parse_expr()?;
                    let end = self.expect(TokenKind::RBracket, "']'")?.span.end;
                    expr = Expr {
                        span: Span::new(expr.span.start, end),
                        kind: ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                    };
                }
                TokenKind::Has => {
                    self.advance();
                    let (component, comp_span) = self.expect_ident("component name after 'has'")?;
                    expr = Expr {
                        span: expr.span.merge(comp_span),
                        kind: ExprKind::Has {
                            object: Box::new(expr),
                            component,
                        },
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, CompileError> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        while !self.check(TokenKind::RParen) && !self.at_eof() {
            args.push(self.parse_expr()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let tok = self.current().clone();
        let span = tok.span;
        let literal = move |lit: Literal| Expr {
            kind: ExprKind::Literal(lit),
            span,
        };

        match tok.kind {
            TokenKind::Integer => {
                self.advance();
                let value: i64 = tok.text.parse().map_err(|_| {
                    CompileError::parser(format!("Integer literal out of range: {}", tok.text), tok.span)
                })?;
                Ok(literal(Literal::Integer(value)))
            }
            TokenKind::Float => {
                self.advance();
                let value: f64 = tok.text.parse().map_err(|_| {
                    CompileError::parser(format!("Invalid float literal: {}", tok.text), tok.span)
                })?;
                Ok(literal(Literal::Float(value)))
            }
            TokenKind::Decimal => {
                self.advance();
                let digits = tok.text.trim_end_matches('d').to_string();
                Ok(literal(Literal::Decimal(digits)))
            }
            TokenKind::String => {
                self.advance();
                Ok(literal(Literal::String(unquote(&tok.text))))
            }
            TokenKind::True => {
                self.advance();
                Ok(literal(Literal::Boolean(true)))
            }
            TokenKind::False => {
                self.advance();
                Ok(literal(Literal::Boolean(false)))
            }
            TokenKind::Null => {
                self.advance();
                Ok(literal(Literal::Null))
            }
            // `list(...)` is a builtin call even though `list` is a type keyword.
            TokenKind::Identifier | TokenKind::TypeList
                if tok.kind == TokenKind::Identifier || self.peek_at(1) == TokenKind::LParen =>
            {
                self.advance();
                if self.check(TokenKind::LParen) {
                    let args = self.parse_args()?;
                    Ok(Expr {
                        kind: ExprKind::Call {
                            name: tok.text,
                            args,
                        },
                        span: Span::new(tok.span.start, self.prev_end()),
                    })
                } else {
                    Ok(Expr {
                        kind: ExprKind::Ident(tok.text),
                        span: tok.span,
                    })
                }
            }
            // `event` and `entity` read as ordinary names in expressions.
            TokenKind::Event | TokenKind::Entity => {
                self.advance();
                Ok(Expr {
                    kind: ExprKind::Ident(tok.text),
                    span: tok.span,
                })
            }
            TokenKind::EntityRef => {
                self.advance();
                Ok(Expr {
                    kind: ExprKind::EntityRef(entity_ref_name(&tok.text)),
                    span: tok.span,
                })
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(Expr {
                    kind: ExprKind::Paren(Box::new(inner)),
                    span: Span::new(tok.span.start, self.prev_end()),
                })
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.check(TokenKind::RBracket) && !self.at_eof() {
                    items.push(self.parse_expr()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket, "']'")?;
                Ok(Expr {
                    kind: ExprKind::List(items),
                    span: Span::new(tok.span.start, self.prev_end()),
                })
            }
            TokenKind::Entities => {
                self.advance();
                self.expect(TokenKind::Having, "'having'")?;
                let (component, comp_span) = self.expect_ident("component name")?;
                Ok(Expr {
                    kind: ExprKind::EntitiesHaving(component),
                    span: tok.span.merge(comp_span),
                })
            }
            TokenKind::Clone => {
                self.advance();
                let source = self.parse_postfix()?;
                let mut overrides = Vec::new();
                if self.eat(TokenKind::LBrace) {
                    self.skip_separators();
                    while !self.check(TokenKind::RBrace) && !self.at_eof() {
                        overrides.push(self.parse_component_init()?);
                        self.skip_separators();
                    }
                    self.expect(TokenKind::RBrace, "'}'")?;
                }
                Ok(Expr {
                    kind: ExprKind::Clone {
                        source: Box::new(source),
                        overrides,
                    },
                    span: Span::new(tok.span.start, self.prev_end()),
                })
            }
            _ => Err(self.error_here("expression")),
        }
    }
}

fn entity_ref_name(text: &str) -> String {
    text.strip_prefix('@').unwrap_or(text).to_string()
}

/// Strip the quotes from a string token and resolve backslash escapes.
fn unquote(text: &str) -> String {
    let inner = text.get(1..text.len().saturating_sub(1)).unwrap_or("");
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::dsl::lexer::tokenize;

    fn parse_str(s: &str) -> Module {
        parse(tokenize(s).unwrap()).unwrap()
    }

    fn parse_permissive(s: &str) -> Module {
        parse_with(tokenize(s).unwrap(), EntitySyntax::Permissive).unwrap()
    }

    fn parse_err(s: &str) -> CompileError {
        parse(tokenize(s).unwrap()).unwrap_err()
    }

    fn rule_body(src: &str) -> Vec<Stmt> {
        let module = parse_str(&format!("rule r on E(e: id) {{ {src} }}"));
        match module.items.into_iter().next().unwrap() {
            Item::Rule(rule) => rule.body.stmts,
            other => panic!("expected rule, got {other:?}"),
        }
    }

    fn expr(src: &str) -> Expr {
        match rule_body(src).into_iter().next().unwrap() {
            Stmt::Expr(e) => e,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn parse_component_fields() {
        let module = parse_str(
            "component Stats { hp: integer, name: string\n speed: float? tags: list<string> target: optional<id> }",
        );
        let Item::Component(c) = &module.items[0] else { panic!("expected component") };
        assert_eq!(c.name, "Stats");
        let fields: Vec<_> = c.fields.iter().map(|f| (f.name.as_str(), f.ty.clone(), f.optional)).collect();
        assert_eq!(
            fields,
            vec![
                ("hp", TypeExpr::Integer, false),
                ("name", TypeExpr::String, false),
                ("speed", TypeExpr::Float, true),
                ("tags", TypeExpr::List(Box::new(TypeExpr::String)), false),
                ("target", TypeExpr::Id, true),
            ]
        );
    }

    #[test]
    fn parse_named_and_anonymous_rules() {
        let module = parse_str(
            "rule dmg on Hit(h: id) when h.Health.current > 0 [priority: 5] { }\n\
             rule on Tick(t: TickEvent) { }",
        );
        let Item::Rule(named) = &module.items[0] else { panic!("expected rule") };
        assert_eq!(named.name.as_deref(), Some("dmg"));
        assert_eq!(named.event, "Hit");
        assert_eq!(named.param.name, "h");
        assert_eq!(named.param.ty, TypeExpr::Id);
        assert!(matches!(
            named.guard.as_ref().unwrap().kind,
            ExprKind::Binary { op: BinOp::Gt, .. }
        ));
        assert_eq!(named.priority, Some(5));

        let Item::Rule(anon) = &module.items[1] else { panic!("expected rule") };
        assert_eq!(anon.name, None);
        assert_eq!(anon.param.ty, TypeExpr::Named("TickEvent".into()));
    }

    #[test]
    fn parse_negative_priority() {
        let module = parse_str("rule r on E(e: id) [priority: -2] { }");
        let Item::Rule(rule) = &module.items[0] else { panic!("expected rule") };
        assert_eq!(rule.priority, Some(-2));
    }

    #[test]
    fn rule_requires_event_parameter() {
        let err = parse_err("rule r on Hit { }");
        assert_eq!(err.kind, crate::dsl::error::ErrorKind::Parser);
        assert!(err.message.starts_with("Expected '('"), "{}", err.message);
        assert_eq!(err.position(), 14);
    }

    #[test]
    fn parse_choice_function_with_intersection() {
        let module =
            parse_str("choice fn pick_skill(c: Character & Skills, enemies: list): string { return \"x\" }");
        let Item::Function(f) = &module.items[0] else { panic!("expected fn") };
        assert!(f.is_choice);
        assert_eq!(f.name, "pick_skill");
        assert_eq!(
            f.params[0].ty,
            TypeExpr::Composite(vec!["Character".into(), "Skills".into()])
        );
        assert_eq!(f.params[1].ty, TypeExpr::List(Box::new(TypeExpr::Id)));
        assert_eq!(f.return_type, Some(TypeExpr::String));
    }

    #[test]
    fn plain_function_rejects_intersection() {
        let err = parse_err("fn f(c: A & B) { }");
        assert!(err.message.contains("only allowed in choice function"));
    }

    #[test]
    fn intersection_members_must_be_components() {
        let err = parse_err("choice fn f(c: A & integer) { }");
        assert!(err.message.contains("only combine component types"));
    }

    #[test]
    fn entity_syntax_value_names() {
        use clap::ValueEnum;
        assert_eq!(
            EntitySyntax::from_str("permissive", false),
            Ok(EntitySyntax::Permissive)
        );
        let names: Vec<String> = EntitySyntax::value_variants()
            .iter()
            .filter_map(|v| v.to_possible_value().map(|p| p.get_name().to_string()))
            .collect();
        assert_eq!(names, ["strict", "permissive"]);
        assert_eq!(serde_json::to_string(&EntitySyntax::Strict).unwrap(), "\"strict\"");
    }

    #[test]
    fn bare_return_before_statement_keyword() {
        let module = parse_str(
            "choice fn f(x: id): id {\n if true { return x }\n return\n let y = 1\n}",
        );
        let Item::Function(def) = &module.items[0] else {
            panic!("expected function");
        };
        assert_eq!(def.body.stmts.len(), 3);
        assert!(matches!(def.body.stmts[1], Stmt::Return { value: None, .. }));
        assert!(matches!(def.body.stmts[2], Stmt::Let { .. }));

        let module = parse_str("fn g() { return\n delete @boss }");
        let Item::Function(def) = &module.items[0] else {
            panic!("expected function");
        };
        assert!(matches!(def.body.stmts[0], Stmt::Return { value: None, .. }));
        assert!(matches!(def.body.stmts[1], Stmt::Delete { .. }));
    }

    #[test]
    fn arrow_return_type() {
        let module = parse_str("fn double(x: integer) -> integer { return x * 2 }");
        let Item::Function(f) = &module.items[0] else { panic!("expected fn") };
        assert!(!f.is_choice);
        assert_eq!(f.return_type, Some(TypeExpr::Integer));
    }

    #[test]
    fn strict_entity_declaration() {
        let module = parse_str(
            "let warrior: id = new entity {\n  Health { current: 100 max: 100 }\n  Character { class: \"warrior\" }\n}",
        );
        let Item::Entity(e) = &module.items[0] else { panic!("expected entity") };
        assert_eq!(e.variable.as_deref(), Some("warrior"));
        assert_eq!(e.components.len(), 2);
        assert_eq!(e.components[0].name, "Health");
        assert_eq!(e.components[0].fields[1].name, "max");
    }

    #[test]
    fn strict_rejects_anonymous_entity() {
        let err = parse_err("entity { Health { current: 1 } }");
        assert!(err.message.contains("let <name>: id = new entity"));
        assert_eq!(err.position(), 0);

        let err = parse_err("let w = new entity { }");
        assert!(err.message.starts_with("Expected ': id'"), "{}", err.message);
    }

    #[test]
    fn strict_requires_id_type() {
        let err = parse_err("let w: string = new entity { }");
        assert!(err.message.contains("must have type 'id'"));
    }

    #[test]
    fn permissive_entity_forms() {
        let module = parse_permissive(
            "entity { Health { current: 1 } }\n\
             entity @goblin { }\n\
             entity orc { }\n\
             @troll { }\n\
             ogre = new entity { }\n\
             let imp = new entity { }\n\
             let elf: id = new entity { }",
        );
        let names: Vec<_> = module
            .items
            .iter()
            .map(|item| match item {
                Item::Entity(e) => e.variable.clone(),
                other => panic!("expected entity, got {other:?}"),
            })
            .collect();
        assert_eq!(
            names,
            vec![
                None,
                Some("goblin".to_string()),
                Some("orc".to_string()),
                Some("troll".to_string()),
                Some("ogre".to_string()),
                Some("imp".to_string()),
                Some("elf".to_string()),
            ]
        );
    }

    #[test]
    fn parse_bound_functions() {
        let module = parse_str(
            "let hero: id = new entity {\n\
               Character { class: \"mage\" }\n\
               .selectTarget = choice(enemies: list): id { return enemies[0] }\n\
               .selectSkill = choice(c: Character & Mana, enemies: list): string { return \"fire\" }\n\
             }",
        );
        let Item::Entity(e) = &module.items[0] else { panic!("expected entity") };
        assert_eq!(e.components.len(), 1);
        assert_eq!(e.bound_functions.len(), 2);
        assert_eq!(e.bound_functions[0].name, "selectTarget");
        assert_eq!(e.bound_functions[1].params[0].ty, TypeExpr::Composite(vec!["Character".into(), "Mana".into()]));
    }

    #[test]
    fn parse_import_and_nested_module() {
        let module = parse_str(
            "import combat.damage\nimport util.{clamp, lerp}\nmodule inner { component A { x: integer } }",
        );
        let Item::Import(a) = &module.items[0] else { panic!("expected import") };
        assert_eq!(a.path, vec!["combat", "damage"]);
        assert_eq!(a.items, None);
        let Item::Import(b) = &module.items[1] else { panic!("expected import") };
        assert_eq!(b.path, vec!["util"]);
        assert_eq!(b.items, Some(vec!["clamp".to_string(), "lerp".to_string()]));
        let Item::Module(m) = &module.items[2] else { panic!("expected module") };
        assert_eq!(m.name, "inner");
        assert_eq!(m.module.items.len(), 1);
    }

    #[test]
    fn precedence_climbing() {
        // a || (b && (c == (d < (e + (f * (-g))))))
        let e = expr("a || b && c == d < e + f * -g");
        let ExprKind::Binary { op: BinOp::Or, right, .. } = e.kind else { panic!("or") };
        let ExprKind::Binary { op: BinOp::And, right, .. } = right.kind else { panic!("and") };
        let ExprKind::Binary { op: BinOp::Eq, right, .. } = right.kind else { panic!("eq") };
        let ExprKind::Binary { op: BinOp::Lt, right, .. } = right.kind else { panic!("lt") };
        let ExprKind::Binary { op: BinOp::Add, right, .. } = right.kind else { panic!("add") };
        let ExprKind::Binary { op: BinOp::Mul, right, .. } = right.kind else { panic!("mul") };
        assert!(matches!(right.kind, ExprKind::Unary { op: UnaryOp::Neg, .. }));
    }

    #[test]
    fn binary_is_left_associative() {
        let e = expr("a - b - c");
        let ExprKind::Binary { op: BinOp::Sub, left, .. } = e.kind else { panic!("sub") };
        assert!(matches!(left.kind, ExprKind::Binary { op: BinOp::Sub, .. }));
    }

    #[test]
    fn postfix_chain() {
        let e = expr("enemies[0].Health.current");
        let ExprKind::Field { object, field } = e.kind else { panic!("field") };
        assert_eq!(field, "current");
        let ExprKind::Field { object, field } = object.kind else { panic!("field") };
        assert_eq!(field, "Health");
        assert!(matches!(object.kind, ExprKind::Index { .. }));
    }

    #[test]
    fn has_method_call_and_queries() {
        assert!(matches!(
            expr("!(e has Health)").kind,
            ExprKind::Unary { op: UnaryOp::Not, .. }
        ));
        let e = expr("e has Health");
        assert!(matches!(e.kind, ExprKind::Has { ref component, .. } if component == "Health"));

        let e = expr("@hero.selectTarget(enemies, 2)");
        let ExprKind::MethodCall { object, method, args } = e.kind else { panic!("method") };
        assert_eq!(method, "selectTarget");
        assert_eq!(args.len(), 2);
        assert!(matches!(object.kind, ExprKind::EntityRef(ref n) if n == "hero"));

        assert!(matches!(expr("entities having Health").kind, ExprKind::EntitiesHaving(ref c) if c == "Health"));
        assert!(matches!(expr("list(1, 2)").kind, ExprKind::Call { ref name, .. } if name == "list"));
        assert!(matches!(expr("[1, 2, 3]").kind, ExprKind::List(ref items) if items.len() == 3));
    }

    #[test]
    fn clone_with_overrides() {
        let e = expr("clone @goblin { Health { current: 5 } }");
        let ExprKind::Clone { source, overrides } = e.kind else { panic!("clone") };
        assert!(matches!(source.kind, ExprKind::EntityRef(_)));
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].fields[0].name, "current");
    }

    #[test]
    fn literals() {
        assert!(matches!(expr("10.50d").kind, ExprKind::Literal(Literal::Decimal(ref d)) if d == "10.50"));
        assert!(matches!(expr("'it\\'s'").kind, ExprKind::Literal(Literal::String(ref s)) if s == "it's"));
        assert!(matches!(expr("null").kind, ExprKind::Literal(Literal::Null)));
        let err = parse_err("rule r on E(e: id) { 99999999999999999999 }");
        assert!(err.message.contains("out of range"));
    }

    #[test]
    fn assignment_operators() {
        let ops: Vec<AssignOp> = rule_body("x = 1 x += 1 x -= 1 x *= 1 x /= 1")
            .into_iter()
            .map(|s| match s {
                Stmt::Assign { op, .. } => op,
                other => panic!("expected assignment, got {other:?}"),
            })
            .collect();
        assert_eq!(
            ops,
            vec![AssignOp::Set, AssignOp::Add, AssignOp::Subtract, AssignOp::Multiply, AssignOp::Divide]
        );
    }

    #[test]
    fn invalid_assignment_target() {
        let err = parse_err("rule r on E(e: id) { f(x) = 1 }");
        assert!(err.message.contains("Invalid assignment target"));
    }

    #[test]
    fn control_flow_statements() {
        let stmts = rule_body(
            "let total: integer = 0\n\
             for x in entities having Health { total += 1 }\n\
             while total > 0 { total -= 1 }\n\
             if total == 0 { } else if total == 1 { } else { }\n\
             return",
        );
        assert!(matches!(stmts[0], Stmt::Let { ref ty, .. } if *ty == Some(TypeExpr::Integer)));
        assert!(matches!(stmts[1], Stmt::For { ref var, .. } if var == "x"));
        assert!(matches!(stmts[2], Stmt::While { .. }));
        let Stmt::If(ref stmt) = stmts[3] else { panic!("if") };
        let Some(ElseBranch::ElseIf(ref nested)) = stmt.else_branch else { panic!("else if") };
        assert!(matches!(nested.else_branch, Some(ElseBranch::Else(_))));
        assert!(matches!(stmts[4], Stmt::Return { value: None, .. }));
    }

    #[test]
    fn entity_statements() {
        let stmts = rule_body(
            "schedule recurring [interval: 2.5] Tick { source: e }\n\
             schedule [delay: 1] Heal\n\
             cancel handle\n\
             create entity { Health { current: 1 max: 1 } }\n\
             delete e",
        );
        let Stmt::Schedule(ref tick) = stmts[0] else { panic!("schedule") };
        assert!(tick.recurring);
        assert!(tick.interval.is_some() && tick.delay.is_none());
        assert_eq!(tick.fields[0].name, "source");
        let Stmt::Schedule(ref heal) = stmts[1] else { panic!("schedule") };
        assert!(!heal.recurring && heal.delay.is_some() && heal.fields.is_empty());
        assert!(matches!(stmts[2], Stmt::Cancel { .. }));
        assert!(matches!(stmts[3], Stmt::Create { ref components, .. } if components.len() == 1));
        assert!(matches!(stmts[4], Stmt::Delete { .. }));
    }

    #[test]
    fn stops_at_first_error() {
        let err = parse_err("component A { x integer }\ncomponent B {");
        assert_eq!(err.message, "Expected ':', found 'integer'");
        assert_eq!(err.position(), 16);
    }

    #[test]
    fn unexpected_top_level_token() {
        let err = parse_err("return 1");
        assert!(err.message.starts_with("Expected component, rule"));
    }
}
