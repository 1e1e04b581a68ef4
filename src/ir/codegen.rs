//! AST → IR lowering.
//!
//! Runs only on modules that passed semantic analysis, so lowering never
//! fails; anything it cannot express is degraded and logged.

use std::collections::HashSet;

use indexmap::IndexMap;

use super::{
    IRAction, IRBinaryOp, IRBoundFunction, IRChoicePoint, IRComponent, IREntity, IRExpression,
    IRField, IRFunction, IRInitialState, IRMetadata, IRModule, IRParam, IRRule, IRTrigger, IRType,
    IRUnaryOp, IRValue, ModifyOp, IR_VERSION,
};
use crate::dsl::ast::{
    AssignOp, BinOp, Block, BoundFnDef, ComponentDef, ComponentInit, ElseBranch, EntityDef, Expr,
    ExprKind, FieldInit, FnDef, IfStmt, Item, Literal, Module, Param, RuleDef, Stmt, TypeExpr,
    UnaryOp,
};

/// Lower analyzed modules into one IR module. Items keep declaration order
/// across files; nested `module` blocks are flattened in place.
pub fn generate(modules: &[Module], module_name: &str) -> IRModule {
    let mut generator = Generator::new(modules);
    for module in modules {
        generator.lower_module(module);
    }
    generator.finish(module_name)
}

struct Generator {
    component_names: HashSet<String>,
    next_component_id: u32,
    next_rule_id: u32,
    next_function_id: u32,
    next_entity_id: u32,
    components: Vec<IRComponent>,
    rules: Vec<IRRule>,
    functions: Vec<IRFunction>,
    entities: Vec<IREntity>,
    choice_points: Vec<IRChoicePoint>,
}

fn collect_component_names(module: &Module, names: &mut HashSet<String>) {
    for item in &module.items {
        match item {
            Item::Component(def) => {
                names.insert(def.name.clone());
            }
            Item::Module(def) => collect_component_names(&def.module, names),
            _ => {}
        }
    }
}

impl Generator {
    fn new(modules: &[Module]) -> Self {
        let mut component_names = HashSet::new();
        for module in modules {
            collect_component_names(module, &mut component_names);
        }
        Self {
            component_names,
            next_component_id: 0,
            next_rule_id: 0,
            next_function_id: 0,
            next_entity_id: 0,
            components: Vec::new(),
            rules: Vec::new(),
            functions: Vec::new(),
            entities: Vec::new(),
            choice_points: Vec::new(),
        }
    }

    fn finish(self, module_name: &str) -> IRModule {
        let mut seen = HashSet::new();
        let mut choice_points: Vec<IRChoicePoint> = self
            .choice_points
            .into_iter()
            .filter(|point| seen.insert(point.id.clone()))
            .collect();
        choice_points.sort_by(|a, b| a.id.cmp(&b.id));

        tracing::debug!(
            components = self.components.len(),
            rules = self.rules.len(),
            functions = self.functions.len(),
            entities = self.entities.len(),
            choice_points = choice_points.len(),
            "generated IR"
        );

        IRModule {
            version: IR_VERSION.to_string(),
            module: module_name.to_string(),
            metadata: Some(IRMetadata {
                compiler_version: env!("CARGO_PKG_VERSION").to_string(),
                source_files: Vec::new(),
            }),
            components: self.components,
            rules: self.rules,
            functions: self.functions,
            initial_state: (!self.entities.is_empty()).then_some(IRInitialState {
                entities: self.entities,
            }),
            choice_points: (!choice_points.is_empty()).then_some(choice_points),
            source_map: None,
        }
    }

    fn lower_module(&mut self, module: &Module) {
        for item in &module.items {
            match item {
                Item::Component(def) => self.lower_component(def),
                Item::Rule(def) => self.lower_rule(def),
                Item::Function(def) => self.lower_function(def),
                Item::Entity(def) => self.lower_entity(def),
                Item::Module(def) => self.lower_module(&def.module),
                Item::Import(_) => {}
            }
        }
    }

    // ── Declarations ────────────────────────────────────────────

    fn lower_component(&mut self, def: &ComponentDef) {
        let id = self.next_component_id;
        self.next_component_id += 1;
        self.components.push(IRComponent {
            id,
            name: def.name.clone(),
            fields: def
                .fields
                .iter()
                .map(|field| IRField {
                    name: field.name.clone(),
                    field_type: lower_type(&field.ty),
                    optional: field.optional,
                })
                .collect(),
        });
    }

    fn lower_rule(&mut self, def: &RuleDef) {
        let id = self.next_rule_id;
        self.next_rule_id += 1;
        let mut bindings = IndexMap::new();
        bindings.insert(def.param.name.clone(), "event".to_string());
        let rule = IRRule {
            id,
            name: def.name.clone(),
            trigger: IRTrigger::Event {
                event: def.event.clone(),
                bindings,
            },
            condition: def.guard.as_ref().map(|guard| self.lower_expr(guard)),
            priority: def.priority,
            actions: self.lower_block(&def.body),
        };
        self.rules.push(rule);
    }

    fn lower_function(&mut self, def: &FnDef) {
        let id = self.next_function_id;
        self.next_function_id += 1;
        let function = IRFunction {
            id,
            name: def.name.clone(),
            params: lower_params(&def.params),
            return_type: def.return_type.as_ref().map(lower_type),
            body: self.lower_function_body(&def.body),
        };
        self.functions.push(function);
        if def.is_choice {
            self.choice_points.push(choice_point(
                &def.name,
                &def.params,
                def.return_type.as_ref(),
                None,
            ));
        }
    }

    fn lower_entity(&mut self, def: &EntityDef) {
        let id = self.next_entity_id;
        self.next_entity_id += 1;

        let mut components = IndexMap::new();
        for init in &def.components {
            let mut fields = IndexMap::new();
            for field in &init.fields {
                fields.insert(field.name.clone(), constant_value(&init.name, field));
            }
            components.insert(init.name.clone(), fields);
        }

        let classes = applicable_classes(&def.components);
        let mut bound_functions = IndexMap::new();
        for bound in &def.bound_functions {
            bound_functions.insert(bound.name.clone(), self.lower_bound_function(bound));
            self.choice_points.push(choice_point(
                &bound.name,
                &bound.params,
                bound.return_type.as_ref(),
                classes.clone(),
            ));
        }

        self.entities.push(IREntity {
            id,
            variable: def.variable.clone(),
            components,
            bound_functions,
        });
    }

    fn lower_bound_function(&self, def: &BoundFnDef) -> IRBoundFunction {
        IRBoundFunction {
            params: lower_params(&def.params),
            return_type: def.return_type.as_ref().map(lower_type),
            body: self.lower_function_body(&def.body),
        }
    }

    /// A function body is reduced to the value of its first top-level
    /// `return`; bodies without one evaluate to `0`.
    fn lower_function_body(&self, body: &Block) -> IRExpression {
        body.stmts
            .iter()
            .find_map(|stmt| match stmt {
                Stmt::Return { value, .. } => Some(value.as_ref()),
                _ => None,
            })
            .flatten()
            .map_or_else(
                || IRExpression::Literal {
                    value: IRValue::Number(0.0),
                },
                |value| self.lower_expr(value),
            )
    }

    // ── Statements ──────────────────────────────────────────────

    fn lower_block(&self, block: &Block) -> Vec<IRAction> {
        block
            .stmts
            .iter()
            .filter_map(|stmt| self.lower_stmt(stmt))
            .collect()
    }

    fn lower_stmt(&self, stmt: &Stmt) -> Option<IRAction> {
        let action = match stmt {
            Stmt::Let { name, value, .. } => IRAction::Let {
                name: name.clone(),
                value: self.lower_expr(value),
            },
            Stmt::Assign {
                target, op, value, ..
            } => return self.lower_assign(target, *op, value),
            Stmt::If(if_stmt) => self.lower_if(if_stmt),
            Stmt::For {
                var,
                iterable,
                body,
                ..
            } => IRAction::Loop {
                variable: var.clone(),
                iterable: self.lower_expr(iterable),
                body: self.lower_block(body),
            },
            Stmt::While {
                condition, body, ..
            } => IRAction::While {
                condition: self.lower_expr(condition),
                body: self.lower_block(body),
            },
            Stmt::Return { value, .. } => IRAction::Return {
                value: value.as_ref().map(|v| self.lower_expr(v)),
            },
            Stmt::Schedule(schedule) => IRAction::Schedule {
                event: schedule.event.clone(),
                delay: schedule.delay.as_ref().map(|d| self.lower_expr(d)),
                interval: schedule.interval.as_ref().map(|i| self.lower_expr(i)),
                recurring: schedule.recurring,
                fields: self.lower_field_inits(&schedule.fields),
            },
            Stmt::Cancel { target, .. } => IRAction::Cancel {
                target: self.lower_expr(target),
            },
            Stmt::Create { components, .. } => IRAction::Spawn {
                components: self.lower_component_inits(components),
            },
            Stmt::Delete { target, .. } => IRAction::Despawn {
                entity: self.lower_expr(target),
            },
            Stmt::Expr(expr) => IRAction::Expression {
                expr: self.lower_expr(expr),
            },
        };
        Some(action)
    }

    fn lower_if(&self, stmt: &IfStmt) -> IRAction {
        let else_actions = stmt.else_branch.as_ref().map(|branch| match branch {
            ElseBranch::ElseIf(nested) => vec![self.lower_if(nested)],
            ElseBranch::Else(block) => self.lower_block(block),
        });
        IRAction::Conditional {
            condition: self.lower_expr(&stmt.condition),
            then_actions: self.lower_block(&stmt.then_block),
            else_actions,
        }
    }

    fn lower_assign(&self, target: &Expr, op: AssignOp, value: &Expr) -> Option<IRAction> {
        let op = match op {
            AssignOp::Set => ModifyOp::Set,
            AssignOp::Add => ModifyOp::Add,
            AssignOp::Subtract => ModifyOp::Subtract,
            AssignOp::Multiply => ModifyOp::Multiply,
            AssignOp::Divide => ModifyOp::Divide,
        };
        let value = self.lower_expr(value);
        let action = match &target.kind {
            ExprKind::Ident(name) => IRAction::Modify {
                entity: None,
                component: None,
                field: Some(name.clone()),
                index: None,
                op,
                value,
            },
            ExprKind::Field { object, field } => {
                let (entity, component) = match self.component_access(object) {
                    Some((entity, component)) => (self.lower_expr(entity), Some(component)),
                    None => (self.lower_expr(object), None),
                };
                IRAction::Modify {
                    entity: Some(entity),
                    component,
                    field: Some(field.clone()),
                    index: None,
                    op,
                    value,
                }
            }
            ExprKind::Index { object, index } => IRAction::Modify {
                entity: Some(self.lower_expr(object)),
                component: None,
                field: None,
                index: Some(self.lower_expr(index)),
                op,
                value,
            },
            _ => {
                tracing::warn!(span = ?target.span, "dropping assignment to unsupported target");
                return None;
            }
        };
        Some(action)
    }

    fn lower_field_inits(&self, fields: &[FieldInit]) -> IndexMap<String, IRExpression> {
        fields
            .iter()
            .map(|field| (field.name.clone(), self.lower_expr(&field.value)))
            .collect()
    }

    fn lower_component_inits(
        &self,
        inits: &[ComponentInit],
    ) -> IndexMap<String, IndexMap<String, IRExpression>> {
        inits
            .iter()
            .map(|init| (init.name.clone(), self.lower_field_inits(&init.fields)))
            .collect()
    }

    // ── Expressions ─────────────────────────────────────────────

    /// `obj.Component` where `Component` is a declared component.
    fn component_access<'e>(&self, object: &'e Expr) -> Option<(&'e Expr, String)> {
        match &object.kind {
            ExprKind::Field { object, field } if self.component_names.contains(field) => {
                Some((object, field.clone()))
            }
            _ => None,
        }
    }

    fn lower_expr(&self, expr: &Expr) -> IRExpression {
        match &expr.kind {
            ExprKind::Literal(lit) => IRExpression::Literal {
                value: literal_value(lit),
            },
            ExprKind::Ident(name) => IRExpression::Var { name: name.clone() },
            ExprKind::EntityRef(name) => IRExpression::Var {
                name: format!("@{name}"),
            },
            ExprKind::Field { object, field } => match self.component_access(object) {
                Some((entity, component)) => IRExpression::Field {
                    entity: Box::new(self.lower_expr(entity)),
                    component,
                    field: field.clone(),
                },
                None => IRExpression::Property {
                    object: Box::new(self.lower_expr(object)),
                    name: field.clone(),
                },
            },
            ExprKind::Index { object, index } => IRExpression::Call {
                function: "get".to_string(),
                args: vec![self.lower_expr(object), self.lower_expr(index)],
            },
            ExprKind::Unary { op, operand } => IRExpression::Unary {
                op: match op {
                    UnaryOp::Neg => IRUnaryOp::Negate,
                    UnaryOp::Not => IRUnaryOp::Not,
                },
                expr: Box::new(self.lower_expr(operand)),
            },
            ExprKind::Binary { op, left, right } => IRExpression::Binary {
                op: lower_binop(*op),
                left: Box::new(self.lower_expr(left)),
                right: Box::new(self.lower_expr(right)),
            },
            ExprKind::Call { name, args } => IRExpression::Call {
                function: name.clone(),
                args: args.iter().map(|arg| self.lower_expr(arg)).collect(),
            },
            ExprKind::MethodCall {
                object,
                method,
                args,
            } => IRExpression::MethodCall {
                object: Box::new(self.lower_expr(object)),
                method: method.clone(),
                args: args.iter().map(|arg| self.lower_expr(arg)).collect(),
            },
            ExprKind::Has { object, component } => IRExpression::HasComponent {
                entity: Box::new(self.lower_expr(object)),
                component: component.clone(),
            },
            ExprKind::EntitiesHaving(component) => IRExpression::Call {
                function: "entities_having".to_string(),
                args: vec![IRExpression::Literal {
                    value: IRValue::String(component.clone()),
                }],
            },
            ExprKind::Clone { source, overrides } => IRExpression::Clone {
                source: Box::new(self.lower_expr(source)),
                overrides: self.lower_component_inits(overrides),
            },
            ExprKind::List(items) => IRExpression::Call {
                function: "list".to_string(),
                args: items.iter().map(|item| self.lower_expr(item)).collect(),
            },
            ExprKind::Paren(inner) => self.lower_expr(inner),
        }
    }
}

fn lower_type(ty: &TypeExpr) -> IRType {
    match ty {
        TypeExpr::String => IRType::String,
        TypeExpr::Boolean => IRType::Boolean,
        TypeExpr::Integer | TypeExpr::Float | TypeExpr::Decimal => IRType::Number,
        TypeExpr::Id | TypeExpr::Named(_) | TypeExpr::Composite(_) => IRType::Entity,
        TypeExpr::List(inner) => IRType::List {
            element: Box::new(lower_type(inner)),
        },
        TypeExpr::Optional(inner) => lower_type(inner),
    }
}

fn lower_params(params: &[Param]) -> Vec<IRParam> {
    params
        .iter()
        .map(|param| IRParam {
            name: param.name.clone(),
            param_type: lower_type(&param.ty),
        })
        .collect()
}

fn lower_binop(op: BinOp) -> IRBinaryOp {
    match op {
        BinOp::Add => IRBinaryOp::Add,
        BinOp::Sub => IRBinaryOp::Subtract,
        BinOp::Mul => IRBinaryOp::Multiply,
        BinOp::Div => IRBinaryOp::Divide,
        BinOp::Mod => IRBinaryOp::Modulo,
        BinOp::Eq => IRBinaryOp::Eq,
        BinOp::Ne => IRBinaryOp::Neq,
        BinOp::Lt => IRBinaryOp::Lt,
        BinOp::Le => IRBinaryOp::Lte,
        BinOp::Gt => IRBinaryOp::Gt,
        BinOp::Ge => IRBinaryOp::Gte,
        BinOp::And => IRBinaryOp::And,
        BinOp::Or => IRBinaryOp::Or,
    }
}

#[allow(clippy::cast_precision_loss)]
fn literal_value(lit: &Literal) -> IRValue {
    match lit {
        Literal::String(s) => IRValue::String(s.clone()),
        Literal::Integer(n) => IRValue::Number(*n as f64),
        Literal::Float(x) => IRValue::Number(*x),
        Literal::Decimal(text) => IRValue::Number(text.parse().unwrap_or_default()),
        Literal::Boolean(b) => IRValue::Boolean(*b),
        Literal::Null => IRValue::Null,
    }
}

// ── Entity data ─────────────────────────────────────────────────

fn evaluate_constant(expr: &Expr) -> Option<IRValue> {
    match &expr.kind {
        ExprKind::Literal(lit) => Some(literal_value(lit)),
        ExprKind::Paren(inner) => evaluate_constant(inner),
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } => match evaluate_constant(operand)? {
            IRValue::Number(n) => Some(IRValue::Number(-n)),
            _ => None,
        },
        ExprKind::List(items) => items
            .iter()
            .map(evaluate_constant)
            .collect::<Option<Vec<_>>>()
            .map(IRValue::List),
        ExprKind::EntityRef(name) => Some(IRValue::String(format!("@{name}"))),
        _ => None,
    }
}

/// Initial-state values must be constants; anything else is stored as null.
fn constant_value(component: &str, field: &FieldInit) -> IRValue {
    evaluate_constant(&field.value).unwrap_or_else(|| {
        tracing::warn!(
            component,
            field = %field.name,
            "entity field is not a constant expression; storing null"
        );
        IRValue::Null
    })
}

// ── Choice points ───────────────────────────────────────────────

fn choice_point(
    name: &str,
    params: &[Param],
    return_type: Option<&TypeExpr>,
    applicable_classes: Option<Vec<String>>,
) -> IRChoicePoint {
    IRChoicePoint {
        id: name.to_string(),
        name: display_name(name),
        signature: signature(name, params, return_type),
        category: category(name).to_string(),
        applicable_classes,
    }
}

/// `select_attack_target` → `Select Attack Target`
fn display_name(name: &str) -> String {
    name.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn signature(name: &str, params: &[Param], return_type: Option<&TypeExpr>) -> String {
    let params = params
        .iter()
        .map(|param| format!("{}: {}", param.name, param.ty))
        .collect::<Vec<_>>()
        .join(", ");
    match return_type {
        Some(ty) => format!("{name}({params}): {ty}"),
        None => format!("{name}({params})"),
    }
}

fn category(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    if lower.contains("target") {
        "targeting"
    } else if lower.contains("skill") {
        "skills"
    } else if lower.contains("flee") || lower.contains("retreat") {
        "strategy"
    } else {
        "uncategorized"
    }
}

/// `Character { class: "Warrior" }` on the owning entity.
fn applicable_classes(components: &[ComponentInit]) -> Option<Vec<String>> {
    components
        .iter()
        .filter(|init| init.name == "Character")
        .flat_map(|init| &init.fields)
        .find(|field| field.name == "class")
        .and_then(|field| match &field.value.kind {
            ExprKind::Literal(Literal::String(class)) => Some(vec![class.clone()]),
            _ => None,
        })
}
