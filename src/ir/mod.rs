//! JSON intermediate representation handed to the rule runtime.
//!
//! Everything here is plain data: serde for the wire format, ts-rs for the
//! editor bindings and schemars for `brlc schema`.

pub mod codegen;
pub mod merge;

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::config::Language;

pub use codegen::generate;
pub use merge::merge_modules;

/// Version tag written into every module.
pub const IR_VERSION: &str = "1.0";

fn is_false(value: &bool) -> bool {
    !*value
}

/// One compiled module: the contract between compiler and runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct IRModule {
    pub version: String,
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<IRMetadata>,
    pub components: Vec<IRComponent>,
    pub rules: Vec<IRRule>,
    pub functions: Vec<IRFunction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_state: Option<IRInitialState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice_points: Option<Vec<IRChoicePoint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_map: Option<IRSourceMap>,
}

impl IRModule {
    /// The skeleton returned when compilation fails.
    pub fn empty(name: &str) -> Self {
        Self {
            version: IR_VERSION.to_string(),
            module: name.to_string(),
            metadata: None,
            components: Vec::new(),
            rules: Vec::new(),
            functions: Vec::new(),
            initial_state: None,
            choice_points: None,
            source_map: None,
        }
    }

    pub fn entities(&self) -> &[IREntity] {
        self.initial_state
            .as_ref()
            .map_or(&[], |state| state.entities.as_slice())
    }

    pub fn choice_points(&self) -> &[IRChoicePoint] {
        self.choice_points.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct IRMetadata {
    pub compiler_version: String,
    #[serde(default)]
    pub source_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct IRComponent {
    pub id: u32,
    pub name: String,
    pub fields: Vec<IRField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct IRField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: IRType,
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,
}

/// Runtime value types. Integer, float and decimal all collapse to `number`;
/// entity references and component intersections collapse to `entity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
#[ts(export)]
pub enum IRType {
    Number,
    String,
    Boolean,
    Entity,
    List { element: Box<IRType> },
}

/// Constant data, used for entity initial state and literals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[serde(untagged)]
#[ts(export)]
pub enum IRValue {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    List(Vec<IRValue>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct IRRule {
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub trigger: IRTrigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<IRExpression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    pub actions: Vec<IRAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export)]
pub enum IRTrigger {
    /// Fires when the named event is dispatched. `bindings` maps the rule's
    /// parameter name to `"event"`.
    Event {
        event: String,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        bindings: IndexMap<String, String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum IRBinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum IRUnaryOp {
    Negate,
    Not,
}

/// Expression tree evaluated by the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export)]
pub enum IRExpression {
    Literal {
        value: IRValue,
    },
    /// Local, parameter or `@entity` reference.
    Var {
        name: String,
    },
    /// `entity.Component.field`
    Field {
        entity: Box<IRExpression>,
        component: String,
        field: String,
    },
    /// Any other dotted access, e.g. an event field or `e.Health`.
    Property {
        object: Box<IRExpression>,
        name: String,
    },
    Binary {
        op: IRBinaryOp,
        left: Box<IRExpression>,
        right: Box<IRExpression>,
    },
    Unary {
        op: IRUnaryOp,
        expr: Box<IRExpression>,
    },
    Call {
        function: String,
        args: Vec<IRExpression>,
    },
    MethodCall {
        object: Box<IRExpression>,
        method: String,
        args: Vec<IRExpression>,
    },
    HasComponent {
        entity: Box<IRExpression>,
        component: String,
    },
    Clone {
        source: Box<IRExpression>,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        overrides: IndexMap<String, IndexMap<String, IRExpression>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ModifyOp {
    Set,
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// Statement-level effects executed when a rule fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export)]
pub enum IRAction {
    /// Write to a location. A bare local has only `field`; a component field
    /// has `entity`, `component` and `field`; an element has `entity` and `index`.
    Modify {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity: Option<IRExpression>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        component: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<IRExpression>,
        op: ModifyOp,
        value: IRExpression,
    },
    Let {
        name: String,
        value: IRExpression,
    },
    Conditional {
        condition: IRExpression,
        then_actions: Vec<IRAction>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        else_actions: Option<Vec<IRAction>>,
    },
    Loop {
        variable: String,
        iterable: IRExpression,
        body: Vec<IRAction>,
    },
    While {
        condition: IRExpression,
        body: Vec<IRAction>,
    },
    Schedule {
        event: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delay: Option<IRExpression>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interval: Option<IRExpression>,
        #[serde(default, skip_serializing_if = "is_false")]
        recurring: bool,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        fields: IndexMap<String, IRExpression>,
    },
    Cancel {
        target: IRExpression,
    },
    Spawn {
        components: IndexMap<String, IndexMap<String, IRExpression>>,
    },
    Despawn {
        entity: IRExpression,
    },
    Return {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<IRExpression>,
    },
    Expression {
        expr: IRExpression,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct IRParam {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: IRType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct IRFunction {
    pub id: u32,
    pub name: String,
    pub params: Vec<IRParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<IRType>,
    pub body: IRExpression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct IRInitialState {
    pub entities: Vec<IREntity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct IREntity {
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    pub components: IndexMap<String, IndexMap<String, IRValue>>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub bound_functions: IndexMap<String, IRBoundFunction>,
}

/// Choice function attached to a single entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct IRBoundFunction {
    pub params: Vec<IRParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<IRType>,
    pub body: IRExpression,
}

/// A decision point players may customize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct IRChoicePoint {
    pub id: String,
    pub name: String,
    pub signature: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicable_classes: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct IRSourceMap {
    pub files: Vec<IRSourceFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct IRSourceFile {
    pub path: String,
    pub content: String,
    pub language: Language,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_module_shape() {
        let value = serde_json::to_value(IRModule::empty("arena")).unwrap();
        assert_eq!(
            value,
            json!({
                "version": "1.0",
                "module": "arena",
                "components": [],
                "rules": [],
                "functions": [],
            })
        );
    }

    #[test]
    fn tagged_shapes() {
        let field = IRField {
            name: "targets".into(),
            field_type: IRType::List {
                element: Box::new(IRType::Entity),
            },
            optional: true,
        };
        assert_eq!(
            serde_json::to_value(&field).unwrap(),
            json!({
                "name": "targets",
                "type": { "type": "list", "element": { "type": "entity" } },
                "optional": true,
            })
        );

        let action = IRAction::Modify {
            entity: Some(IRExpression::Var { name: "e".into() }),
            component: Some("Health".into()),
            field: Some("current".into()),
            index: None,
            op: ModifyOp::Subtract,
            value: IRExpression::Literal {
                value: IRValue::Number(5.0),
            },
        };
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            json!({
                "type": "modify",
                "entity": { "type": "var", "name": "e" },
                "component": "Health",
                "field": "current",
                "op": "subtract",
                "value": { "type": "literal", "value": 5.0 },
            })
        );
    }

    #[test]
    fn deserialize_back() {
        let text = r#"{
            "version": "1.0",
            "module": "m",
            "components": [{ "id": 3, "name": "Health", "fields": [
                { "name": "current", "type": { "type": "number" } }
            ] }],
            "rules": [],
            "functions": [],
            "initial_state": { "entities": [
                { "id": 0, "components": { "Health": { "current": 10, "tags": ["a", null] } } }
            ] }
        }"#;
        let module: IRModule = serde_json::from_str(text).unwrap();
        assert_eq!(module.components[0].id, 3);
        assert_eq!(
            module.entities()[0].components["Health"]["tags"],
            IRValue::List(vec![IRValue::String("a".into()), IRValue::Null])
        );
        assert!(module.choice_points().is_empty());
    }

    #[test]
    fn object_field_values_are_rejected() {
        assert!(serde_json::from_value::<IRValue>(json!({ "x": 1 })).is_err());
        assert_eq!(
            serde_json::from_value::<IRValue>(json!([1, true])).unwrap(),
            IRValue::List(vec![IRValue::Number(1.0), IRValue::Boolean(true)])
        );
    }
}
