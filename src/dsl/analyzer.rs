use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use super::ast::*;
use super::builtins;
use super::error::CompileError;
use crate::config::Language;

/// A semantic error together with the index of the module it was found in.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticError {
    pub module: usize,
    pub error: CompileError,
}

/// Validate every module against the program-wide component and function tables.
///
/// Never fails: all problems are returned as accumulated diagnostics, in module
/// order. Declarations are visible across all modules regardless of order.
pub fn analyze(modules: &[Module]) -> Vec<SemanticError> {
    let mut analyzer = Analyzer::default();
    for (index, module) in modules.iter().enumerate() {
        analyzer.module = index;
        analyzer.collect(module);
    }
    for (index, module) in modules.iter().enumerate() {
        analyzer.module = index;
        analyzer.check_items(&module.items);
    }
    analyzer.errors
}

/// Report declarations that the file's language subset does not allow.
///
/// BDL is data only (components, entities, imports, modules); BCL may not declare rules.
pub fn check_language_subset(module: &Module, language: Language) -> Vec<CompileError> {
    let mut errors = Vec::new();
    subset_errors(module, language, &mut errors);
    errors
}

fn subset_errors(module: &Module, language: Language, errors: &mut Vec<CompileError>) {
    for item in &module.items {
        let what = match (language, item) {
            (Language::Bdl | Language::Bcl, Item::Rule(_)) => "Rules",
            (Language::Bdl, Item::Function(f)) if f.is_choice => "Choice functions",
            (Language::Bdl, Item::Function(_)) => "Functions",
            (_, Item::Module(m)) => {
                subset_errors(&m.module, language, errors);
                continue;
            }
            _ => continue,
        };
        errors.push(CompileError::semantic(
            format!("{what} are not allowed in {} files", language.display_name()),
            item.span(),
        ));
    }
}

/// How a name in scope behaves under field access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    /// Local variable, parameter, or loop variable.
    Value,
    /// `event` or a rule's event parameter. The payload shape is open, so
    /// field access through it is never checked.
    EventAlias,
}

struct Schema<'a> {
    fields: IndexMap<&'a str, &'a FieldDef>,
}

impl Schema<'_> {
    fn field_list(&self) -> String {
        if self.fields.is_empty() {
            "(none)".to_string()
        } else {
            self.fields.keys().copied().collect::<Vec<_>>().join(", ")
        }
    }
}

#[derive(Default)]
struct Analyzer<'a> {
    components: HashMap<&'a str, Schema<'a>>,
    /// Plain (callable) functions.
    functions: HashSet<&'a str>,
    /// All function names, plain and choice, for duplicate detection.
    declared_functions: HashSet<&'a str>,
    scopes: Vec<HashMap<String, Binding>>,
    /// Inside a choice function or an entity-bound function.
    read_only: bool,
    module: usize,
    errors: Vec<SemanticError>,
}

impl<'a> Analyzer<'a> {
    fn error(&mut self, message: impl Into<String>, span: Span) {
        self.errors.push(SemanticError {
            module: self.module,
            error: CompileError::semantic(message, span),
        });
    }

    // ── Pass 1: global declarations ────────────────────────────────

    fn collect(&mut self, module: &'a Module) {
        for item in &module.items {
            match item {
                Item::Component(def) => {
                    if self.components.contains_key(def.name.as_str()) {
                        self.error(format!("Duplicate component '{}'", def.name), def.span);
                        continue;
                    }
                    let mut fields = IndexMap::new();
                    for field in &def.fields {
                        if fields.insert(field.name.as_str(), field).is_some() {
                            self.error(
                                format!("Duplicate field '{}' in component '{}'", field.name, def.name),
                                field.span,
                            );
                        }
                    }
                    self.components.insert(&def.name, Schema { fields });
                }
                Item::Function(def) => {
                    if !self.declared_functions.insert(&def.name) {
                        self.error(format!("Duplicate function '{}'", def.name), def.span);
                    } else if !def.is_choice {
                        self.functions.insert(&def.name);
                    }
                }
                Item::Module(def) => self.collect(&def.module),
                Item::Rule(_) | Item::Import(_) | Item::Entity(_) => {}
            }
        }
    }

    // ── Pass 2: validation ─────────────────────────────────────────

    fn check_items(&mut self, items: &[Item]) {
        for item in items {
            match item {
                Item::Component(def) => {
                    for field in &def.fields {
                        self.check_type(&field.ty, field.span);
                    }
                }
                Item::Rule(rule) => self.check_rule(rule),
                Item::Function(def) => {
                    self.check_callable(&def.params, def.return_type.as_ref(), &def.body, def.is_choice);
                }
                Item::Entity(entity) => {
                    self.scopes.push(HashMap::new());
                    for init in &entity.components {
                        self.check_component_init(init);
                    }
                    self.scopes.pop();
                    for bound in &entity.bound_functions {
                        self.check_callable(&bound.params, bound.return_type.as_ref(), &bound.body, true);
                    }
                }
                Item::Module(def) => self.check_items(&def.module.items),
                Item::Import(_) => {}
            }
        }
    }

    fn check_rule(&mut self, rule: &RuleDef) {
        let mut root = HashMap::new();
        root.insert("event".to_string(), Binding::EventAlias);
        // The entity the runtime fires the rule on.
        root.insert("entity".to_string(), Binding::Value);
        root.insert(rule.param.name.clone(), Binding::EventAlias);
        self.scopes.push(root);
        if let Some(guard) = &rule.guard {
            self.check_expr(guard);
        }
        self.check_block(&rule.body);
        self.scopes.pop();
    }

    fn check_callable(
        &mut self,
        params: &[Param],
        return_type: Option<&TypeExpr>,
        body: &Block,
        read_only: bool,
    ) {
        let mut root = HashMap::new();
        for param in params {
            self.check_type(&param.ty, param.span);
            root.insert(param.name.clone(), Binding::Value);
        }
        if let Some(ty) = return_type {
            self.check_type(ty, body.span);
        }
        self.scopes.push(root);
        self.read_only = read_only;
        self.check_block(body);
        self.read_only = false;
        self.scopes.pop();
    }

    fn check_type(&mut self, ty: &TypeExpr, span: Span) {
        match ty {
            TypeExpr::Named(name) if !self.components.contains_key(name.as_str()) => {
                self.error(format!("Unknown type '{name}'"), span);
            }
            TypeExpr::List(inner) | TypeExpr::Optional(inner) => self.check_type(inner, span),
            TypeExpr::Composite(names) => {
                for name in names {
                    if !self.components.contains_key(name.as_str()) {
                        self.error(format!("Unknown component '{name}' in intersection type"), span);
                    }
                }
            }
            _ => {}
        }
    }

    fn resolve(&self, name: &str) -> Option<Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).copied())
    }

    fn define(&mut self, name: &str, binding: Binding) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), binding);
        }
    }

    fn check_block(&mut self, block: &Block) {
        self.scopes.push(HashMap::new());
        for stmt in &block.stmts {
            self.check_stmt(stmt);
        }
        self.scopes.pop();
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let { name, ty, value, span } => {
                if let Some(ty) = ty {
                    self.check_type(ty, *span);
                }
                // The name is not visible inside its own initializer.
                self.check_expr(value);
                self.define(name, Binding::Value);
            }
            Stmt::Assign { target, value, span, .. } => {
                if self.read_only && !matches!(target.kind, ExprKind::Ident(_)) {
                    self.error(
                        "Choice functions are read-only and cannot modify entity state",
                        *span,
                    );
                }
                self.check_expr(target);
                self.check_expr(value);
            }
            Stmt::If(stmt) => self.check_if(stmt),
            Stmt::For { var, iterable, body, .. } => {
                self.check_expr(iterable);
                let mut scope = HashMap::new();
                scope.insert(var.clone(), Binding::Value);
                self.scopes.push(scope);
                self.check_block(body);
                self.scopes.pop();
            }
            Stmt::While { condition, body, .. } => {
                self.check_expr(condition);
                self.check_block(body);
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.check_expr(value);
                }
            }
            Stmt::Schedule(schedule) => {
                self.reject_if_read_only("schedule events", schedule.span);
                for expr in schedule.delay.iter().chain(schedule.interval.iter()) {
                    self.check_expr(expr);
                }
                for field in &schedule.fields {
                    self.check_expr(&field.value);
                }
            }
            Stmt::Cancel { target, span } => {
                self.reject_if_read_only("cancel events", *span);
                self.check_expr(target);
            }
            Stmt::Create { components, span } => {
                self.reject_if_read_only("create entities", *span);
                for init in components {
                    self.check_component_init(init);
                }
            }
            Stmt::Delete { target, span } => {
                self.reject_if_read_only("delete entities", *span);
                self.check_expr(target);
            }
            Stmt::Expr(expr) => self.check_expr(expr),
        }
    }

    fn reject_if_read_only(&mut self, action: &str, span: Span) {
        if self.read_only {
            self.error(format!("Choice functions are read-only and cannot {action}"), span);
        }
    }

    fn check_if(&mut self, stmt: &IfStmt) {
        self.check_expr(&stmt.condition);
        self.check_block(&stmt.then_block);
        match &stmt.else_branch {
            Some(ElseBranch::ElseIf(nested)) => self.check_if(nested),
            Some(ElseBranch::Else(block)) => self.check_block(block),
            None => {}
        }
    }

    fn check_component_init(&mut self, init: &ComponentInit) {
        let Some(schema) = self.components.get(init.name.as_str()) else {
            self.error(format!("Unknown component '{}'", init.name), init.span);
            for field in &init.fields {
                self.check_expr(&field.value);
            }
            return;
        };

        let mut problems = Vec::new();
        for field in &init.fields {
            match schema.fields.get(field.name.as_str()) {
                None => problems.push((
                    format!(
                        "Unknown field '{}' in component '{}', available fields: {}",
                        field.name,
                        init.name,
                        schema.field_list()
                    ),
                    field.span,
                )),
                Some(def) => {
                    if let Some(lit) = literal_of(&field.value) {
                        if !literal_fits(lit, &def.ty, def.optional) {
                            problems.push((
                                format!(
                                    "Type mismatch for field '{}' in component '{}': expected {}, found {}",
                                    field.name,
                                    init.name,
                                    def.ty,
                                    literal_kind(lit)
                                ),
                                field.value.span,
                            ));
                        }
                    }
                }
            }
        }
        for (message, span) in problems {
            self.error(message, span);
        }
        for field in &init.fields {
            self.check_expr(&field.value);
        }
    }

    fn check_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Literal(_) | ExprKind::EntityRef(_) => {}
            ExprKind::Ident(name) => {
                if self.resolve(name).is_none() {
                    self.error(format!("Undefined variable '{name}'"), expr.span);
                }
            }
            ExprKind::Field { object, field } => self.check_field_access(object, field, expr.span),
            ExprKind::Index { object, index } => {
                self.check_expr(object);
                self.check_expr(index);
            }
            ExprKind::Unary { operand, .. } => self.check_expr(operand),
            ExprKind::Binary { left, right, .. } => {
                self.check_expr(left);
                self.check_expr(right);
            }
            ExprKind::Call { name, args } => {
                if let Some(builtin) = builtins::lookup_builtin(name) {
                    if !builtin.arity.accepts(args.len()) {
                        self.error(
                            format!(
                                "Function '{name}' expects {}, found {}",
                                builtin.arity.describe(),
                                args.len()
                            ),
                            expr.span,
                        );
                    }
                } else if !self.functions.contains(name.as_str()) {
                    self.error(format!("Unknown function '{name}'"), expr.span);
                }
                for arg in args {
                    self.check_expr(arg);
                }
            }
            ExprKind::MethodCall { object, args, .. } => {
                self.check_expr(object);
                for arg in args {
                    self.check_expr(arg);
                }
            }
            ExprKind::Has { object, component } => {
                self.check_expr(object);
                self.check_component_name(component, expr.span);
            }
            ExprKind::EntitiesHaving(component) => self.check_component_name(component, expr.span),
            ExprKind::Clone { source, overrides } => {
                self.check_expr(source);
                for init in overrides {
                    self.check_component_init(init);
                }
            }
            ExprKind::List(items) => {
                for item in items {
                    self.check_expr(item);
                }
            }
            ExprKind::Paren(inner) => self.check_expr(inner),
        }
    }

    fn check_component_name(&mut self, name: &str, span: Span) {
        if !self.components.contains_key(name) {
            self.error(format!("Unknown component '{name}'"), span);
        }
    }

    /// `object.field`
    fn check_field_access(&mut self, object: &Expr, field: &str, span: Span) {
        if self.rooted_in_event_alias(object) {
            return;
        }
        match &object.kind {
            // entity.Component.field
            ExprKind::Field { object: entity, field: component }
                if self.components.contains_key(component.as_str()) =>
            {
                self.check_expr(entity);
                let message = self.components.get(component.as_str()).and_then(|schema| {
                    (!schema.fields.contains_key(field)).then(|| {
                        format!(
                            "Unknown field '{field}' in component '{component}', available fields: {}",
                            schema.field_list()
                        )
                    })
                });
                if let Some(message) = message {
                    self.error(message, span);
                }
            }
            ExprKind::Ident(name) => match self.resolve(name) {
                None => self.error(format!("Undefined variable '{name}'"), object.span),
                Some(Binding::EventAlias) => {}
                Some(Binding::Value) => self.check_entity_component(name, field, span),
            },
            ExprKind::EntityRef(name) => self.check_entity_component(&format!("@{name}"), field, span),
            _ => self.check_expr(object),
        }
    }

    /// `var.Component` where `var` holds an entity.
    fn check_entity_component(&mut self, base: &str, name: &str, span: Span) {
        if !self.components.contains_key(name) {
            self.error(
                format!(
                    "Invalid access pattern '{base}.{name}': '{name}' is not a component; \
                     use <entity>.<Component>.<field>"
                ),
                span,
            );
        }
    }

    fn rooted_in_event_alias(&self, expr: &Expr) -> bool {
        match &expr.kind {
            ExprKind::Ident(name) => self.resolve(name) == Some(Binding::EventAlias),
            ExprKind::Field { object, .. } => self.rooted_in_event_alias(object),
            _ => false,
        }
    }
}

fn literal_of(expr: &Expr) -> Option<&Literal> {
    match &expr.kind {
        ExprKind::Literal(lit) => Some(lit),
        ExprKind::Paren(inner) => literal_of(inner),
        _ => None,
    }
}

fn literal_fits(lit: &Literal, ty: &TypeExpr, optional: bool) -> bool {
    match (lit, ty) {
        (_, TypeExpr::Optional(inner)) => literal_fits(lit, inner, true),
        (Literal::Null, TypeExpr::Id | TypeExpr::Named(_) | TypeExpr::Composite(_)) => true,
        (Literal::Null, _) => optional,
        (Literal::Integer(_), TypeExpr::Integer | TypeExpr::Float | TypeExpr::Decimal) => true,
        (Literal::Float(_) | Literal::Decimal(_), TypeExpr::Float | TypeExpr::Decimal) => true,
        (Literal::String(_), TypeExpr::String) => true,
        (Literal::Boolean(_), TypeExpr::Boolean) => true,
        _ => false,
    }
}

fn literal_kind(lit: &Literal) -> &'static str {
    match lit {
        Literal::String(_) => "string",
        Literal::Integer(_) => "integer",
        Literal::Float(_) => "float",
        Literal::Decimal(_) => "decimal",
        Literal::Boolean(_) => "boolean",
        Literal::Null => "null",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::dsl::lexer::tokenize;
    use crate::dsl::parser::{parse, parse_with, EntitySyntax};

    fn parse_src(src: &str) -> Module {
        parse(tokenize(src).unwrap()).unwrap()
    }

    fn check(src: &str) -> Vec<String> {
        analyze(&[parse_src(src)])
            .into_iter()
            .map(|e| e.error.message)
            .collect()
    }

    fn check_ok(src: &str) {
        let errors = check(src);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }

    const HEALTH: &str = "component Health { current: integer max: integer }\n";

    #[test]
    fn undeclared_variable_in_rule() {
        let errors = check("rule r on E(e: id) { let y = x }");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("'x'"));
        check_ok("rule r on E(e: id) { let x = 1 \n let y = x }");
    }

    #[test]
    fn rule_body_sees_its_entity() {
        check_ok(&format!("{HEALTH}rule r on E(e: id) {{ entity.Health.current -= 1 }}"));
        let errors = check(&format!("{HEALTH}rule r on E(e: id) {{ entity.Health.hp -= 1 }}"));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("available fields: current, max"), "{}", errors[0]);
    }

    #[test]
    fn let_is_not_visible_in_own_initializer() {
        let errors = check("rule r on E(e: id) { let x = x + 1 }");
        assert_eq!(errors, vec!["Undefined variable 'x'"]);
    }

    #[test]
    fn block_scopes_end_with_block() {
        let errors = check(
            "rule r on E(e: id) {\n  if true { let inner = 1 }\n  let y = inner\n  for i in list(1, 2) { }\n  let z = i\n}",
        );
        assert_eq!(errors, vec!["Undefined variable 'inner'", "Undefined variable 'i'"]);
    }

    #[test]
    fn field_validation_lists_available_fields() {
        let src = format!("{HEALTH}fn f(entity: id): integer {{ return entity.Health.hp }}");
        let errors = check(&src);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("available fields: current, max"), "{}", errors[0]);
        assert!(errors[0].contains("'hp'"));

        check_ok(&format!("{HEALTH}fn f(entity: id): integer {{ return entity.Health.current }}"));
    }

    #[test]
    fn invalid_access_pattern_on_plain_variable() {
        let src = format!("{HEALTH}fn f(target: id): integer {{ return target.current }}");
        let errors = check(&src);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Invalid access pattern 'target.current'"), "{}", errors[0]);
    }

    #[test]
    fn event_alias_access_is_unchecked() {
        check_ok(&format!(
            "{HEALTH}rule r on Hit(h: id) when event.amount > 0 {{\n  h.Health.current -= event.amount\n  h.Anything.goes = 1\n  h.payload.nested.deep = 2\n}}"
        ));
    }

    #[test]
    fn entity_ref_access_is_checked() {
        let errors = check(&format!(
            "{HEALTH}rule r on E(e: id) {{ @hero.Health.current = 1\n @hero.Health.mana = 2\n @hero.level = 3 }}"
        ));
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("'mana'"));
        assert!(errors[1].starts_with("Invalid access pattern '@hero.level'"));
    }

    #[test]
    fn indexed_entity_access() {
        check_ok(&format!(
            "{HEALTH}choice fn weakest(enemies: list): id {{\n  let first = enemies[0]\n  if enemies[0].Health.current < 5 {{ return first }}\n  return enemies[1]\n}}"
        ));
        let errors = check(&format!("{HEALTH}fn f(xs: list): integer {{ return xs[0].Health.hp }}"));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn unknown_functions_and_arity() {
        let errors = check("fn helper(x: integer): integer { return x }\nrule r on E(e: id) { let a = helper(1) + abs(2) + nope(3) + floor(1, 2) }");
        assert_eq!(
            errors,
            vec![
                "Unknown function 'nope'".to_string(),
                "Function 'floor' expects 1 argument, found 2".to_string(),
            ]
        );
    }

    #[test]
    fn choice_functions_are_not_callable() {
        let errors = check("choice fn pick(xs: list): id { return xs[0] }\nrule r on E(e: id) { let p = pick(list()) }");
        assert_eq!(errors, vec!["Unknown function 'pick'"]);
    }

    #[test]
    fn declarations_visible_across_modules_in_any_order() {
        let a = parse_src("rule r on E(e: id) when e has Health { let n = double(2) }");
        let b = parse_src(&format!("{HEALTH}fn double(x: integer): integer {{ return x * 2 }}"));
        assert!(analyze(&[a, b]).is_empty());
    }

    #[test]
    fn errors_carry_module_index() {
        let a = parse_src(HEALTH);
        let b = parse_src("rule r on E(e: id) { let y = missing }");
        let errors = analyze(&[a, b]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].module, 1);
        assert_eq!(errors[0].error.kind, crate::dsl::error::ErrorKind::Semantic);
    }

    #[test]
    fn has_and_entities_having_need_known_components() {
        let errors = check(&format!(
            "{HEALTH}rule r on E(e: id) {{ if e has Mana {{ }}\n for x in entities having Armor {{ }}\n let ok = entities having Health }}"
        ));
        assert_eq!(errors, vec!["Unknown component 'Mana'", "Unknown component 'Armor'"]);
    }

    #[test]
    fn entity_initializers_are_validated() {
        let src = format!(
            "{HEALTH}let hero: id = new entity {{\n  Health {{ current: 10 max: \"full\" hp: 3 }}\n  Mana {{ value: 1 }}\n  Health {{ current: unknown_var }}\n}}"
        );
        let errors = check(&src);
        assert_eq!(
            errors,
            vec![
                "Type mismatch for field 'max' in component 'Health': expected integer, found string".to_string(),
                "Unknown field 'hp' in component 'Health', available fields: current, max".to_string(),
                "Unknown component 'Mana'".to_string(),
                "Undefined variable 'unknown_var'".to_string(),
            ]
        );
    }

    #[test]
    fn literal_type_compatibility() {
        check_ok(
            "component Stats { speed: float price: decimal name: string? target: id alive: boolean }\n\
             let a: id = new entity { Stats { speed: 2 price: 10.50d name: null target: null alive: true } }",
        );
        let errors = check("component A { n: integer }\nlet a: id = new entity { A { n: 1.5 } }");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("expected integer, found float"));
    }

    #[test]
    fn clone_overrides_are_validated() {
        let errors = check(&format!(
            "{HEALTH}rule r on E(e: id) {{ let c = clone @goblin {{ Health {{ current: 1 shield: 2 }} }} }}"
        ));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("'shield'"));
    }

    #[test]
    fn duplicate_declarations() {
        let errors = check("component A { x: integer x: float }\ncomponent A { }\nfn f() { }\nchoice fn f() { }");
        assert_eq!(
            errors,
            vec![
                "Duplicate field 'x' in component 'A'",
                "Duplicate component 'A'",
                "Duplicate function 'f'",
            ]
        );
    }

    #[test]
    fn unknown_type_names() {
        let errors = check(
            "component A { owner: Player }\nchoice fn f(c: A & Skills): id { return c }\nrule r on Hit(h: DamageEvent) { }",
        );
        assert_eq!(
            errors,
            vec!["Unknown type 'Player'", "Unknown component 'Skills' in intersection type"]
        );
    }

    #[test]
    fn choice_functions_are_read_only() {
        let errors = check(&format!(
            "{HEALTH}choice fn f(e: id): id {{\n  let n = 1\n  n += 1\n  e.Health.current = 0\n  schedule Tick\n  delete e\n  return e\n}}"
        ));
        assert_eq!(
            errors,
            vec![
                "Choice functions are read-only and cannot modify entity state",
                "Choice functions are read-only and cannot schedule events",
                "Choice functions are read-only and cannot delete entities",
            ]
        );
        // Rules are not restricted.
        check_ok(&format!("{HEALTH}rule r on E(e: id) {{ e.Health.current = 0\n schedule Tick\n delete e }}"));
    }

    #[test]
    fn bound_functions_are_checked() {
        let src = format!(
            "{HEALTH}component Character {{ class: string }}\n\
             let hero: id = new entity {{\n  Character {{ class: \"warrior\" }}\n  \
             .selectTarget = choice(enemies: list, me: Character & Health): id {{ return missing }}\n}}"
        );
        assert_eq!(check(&src), vec!["Undefined variable 'missing'"]);
    }

    #[test]
    fn nested_modules_are_checked() {
        let errors = check("module inner { component A { x: integer }\n rule r on E(e: id) { let y = z } }\nfn f(a: A) { }");
        assert_eq!(errors, vec!["Undefined variable 'z'"]);
    }

    #[test]
    fn language_subsets() {
        let module = parse_with(
            tokenize("component A { }\nrule r on E(e: id) { }\nfn f() { }\nentity { A { } }").unwrap(),
            EntitySyntax::Permissive,
        )
        .unwrap();
        let messages = |lang| {
            check_language_subset(&module, lang)
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
        };
        assert!(messages(Language::Brl).is_empty());
        assert_eq!(messages(Language::Bcl), vec!["Rules are not allowed in BCL files"]);
        assert_eq!(
            messages(Language::Bdl),
            vec!["Rules are not allowed in BDL files", "Functions are not allowed in BDL files"]
        );
    }
}
