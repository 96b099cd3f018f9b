use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::expr::{self, ExpressionTree};
use crate::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    Int,
    Text,
    Float1,
    Float2,
    Float3,
    Float4,
}

impl ValueType {
    pub fn arity(self) -> usize {
        match self {
            ValueType::Float2 => 2,
            ValueType::Float3 => 3,
            ValueType::Float4 => 4,
            _ => 1,
        }
    }
    pub fn is_float(self) -> bool {
        matches!(
            self,
            ValueType::Float1 | ValueType::Float2 | ValueType::Float3 | ValueType::Float4
        )
    }
    pub fn float(arity: usize) -> Option<Self> {
        match arity {
            1 => Some(ValueType::Float1),
            2 => Some(ValueType::Float2),
            3 => Some(ValueType::Float3),
            4 => Some(ValueType::Float4),
            _ => None,
        }
    }
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Bool => "Bool",
            ValueType::Int => "Int",
            ValueType::Text => "Text",
            ValueType::Float1 => "Float1",
            ValueType::Float2 => "Float2",
            ValueType::Float3 => "Float3",
            ValueType::Float4 => "Float4",
        }
    }
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Bool" => Some(ValueType::Bool),
            "Int" => Some(ValueType::Int),
            "Text" => Some(ValueType::Text),
            "Float" | "Float1" => Some(ValueType::Float1),
            "Float2" => Some(ValueType::Float2),
            "Float3" => Some(ValueType::Float3),
            "Float4" => Some(ValueType::Float4),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub type ValueHandle = Arc<RwLock<Value>>;

pub fn handle(value: Value) -> ValueHandle {
    Arc::new(RwLock::new(value))
}

/// Where the components of a numeric value come from. The mode is chosen once,
/// when the value is built from text, and never switches between the two
/// expression forms afterwards.
#[derive(Clone, Debug)]
pub enum Binding {
    Literal,
    Whole(Arc<ExpressionTree>),
    PerComponent(Vec<Option<Arc<ExpressionTree>>>),
}

#[derive(Clone, Debug)]
pub struct FloatValue {
    ty: ValueType,
    data: Vec4,
    binding: Binding,
}

/// Read-only window onto another value's components.
#[derive(Clone, Debug)]
pub struct ValueView {
    source: ValueHandle,
    indices: Vec<usize>,
}

impl ValueView {
    pub fn source(&self) -> &ValueHandle {
        &self.source
    }
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

#[derive(Clone, Debug)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Text(String),
    Float(FloatValue),
    View(ValueView),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("aliasing views are read-only")]
    ReadOnlyView,
    #[error("{0} values have no numeric components")]
    NotNumeric(ValueType),
    #[error("cannot assign a {found} value to a {expected} variable")]
    TypeChange {
        expected: ValueType,
        found: ValueType,
    },
    #[error("a view selects between 1 and 4 components, not {0}")]
    ViewWidth(usize),
}

/// A bound expression produced something other than what the compiler promised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("expected a {expected} result but evaluation produced {found}")]
pub struct EvalFault {
    pub expected: ValueType,
    pub found: ValueType,
}

impl Value {
    fn float_literal(ty: ValueType, data: Vec4) -> Self {
        Value::Float(FloatValue {
            ty,
            data,
            binding: Binding::Literal,
        })
    }
    pub fn float1(x: f32) -> Self {
        Self::float_literal(ValueType::Float1, vec4(x, 0.0, 0.0, 0.0))
    }
    pub fn float2(x: f32, y: f32) -> Self {
        Self::float_literal(ValueType::Float2, vec4(x, y, 0.0, 0.0))
    }
    pub fn float3(x: f32, y: f32, z: f32) -> Self {
        Self::float_literal(ValueType::Float3, vec4(x, y, z, 0.0))
    }
    pub fn float4(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self::float_literal(ValueType::Float4, vec4(x, y, z, w))
    }
    pub fn from_vec3(v: Vec3) -> Self {
        Self::float3(v.x, v.y, v.z)
    }
    /// Literal float value of the given arity; unused lanes of `data` are ignored.
    pub fn from_components(ty: ValueType, data: Vec4) -> Self {
        debug_assert!(ty.is_float());
        let mut masked = Vec4::ZERO;
        for i in 0..ty.arity() {
            masked[i] = data[i];
        }
        Self::float_literal(ty, masked)
    }
    pub fn bool(b: bool) -> Self {
        Value::Bool(b)
    }
    pub fn int(i: i32) -> Self {
        Value::Int(i)
    }
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }
    /// Representative value of a type, used by function setup to report static types.
    pub fn zero(ty: ValueType) -> Self {
        match ty {
            ValueType::Bool => Value::Bool(false),
            ValueType::Int => Value::Int(0),
            ValueType::Text => Value::Text(String::new()),
            _ => Self::float_literal(ty, Vec4::ZERO),
        }
    }
    /// Aliasing view reading `indices` out of `source`. The view has as many
    /// components as indices (1 to 4).
    pub fn view(source: ValueHandle, indices: Vec<usize>) -> Result<Self, ValueError> {
        if !(1..=4).contains(&indices.len()) {
            return Err(ValueError::ViewWidth(indices.len()));
        }
        Ok(Value::View(ValueView { source, indices }))
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Text(_) => ValueType::Text,
            Value::Float(f) => f.ty,
            Value::View(v) => ValueType::float(v.indices.len()).unwrap_or(ValueType::Float1),
        }
    }
    pub fn arity(&self) -> usize {
        match self {
            Value::View(v) => v.indices.len(),
            _ => self.value_type().arity(),
        }
    }
    pub fn is_view(&self) -> bool {
        matches!(self, Value::View(_))
    }
    /// True when reading the value can never observe a change.
    pub fn is_literal(&self) -> bool {
        match self {
            Value::Float(f) => matches!(f.binding, Binding::Literal),
            Value::View(_) => false,
            _ => true,
        }
    }
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(_) | Value::View(_) => self.try_f32().ok().map(|v| v as i32),
            _ => None,
        }
    }
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Stored literal components, without evaluating any binding.
    pub fn literal(&self) -> Vec4 {
        match self {
            Value::Bool(b) => vec4(if *b { 1.0 } else { 0.0 }, 0.0, 0.0, 0.0),
            Value::Int(i) => vec4(*i as f32, 0.0, 0.0, 0.0),
            Value::Text(_) => Vec4::ZERO,
            Value::Float(f) => f.data,
            Value::View(v) => {
                let src = v.source.read().literal();
                let arity = v.source.read().arity();
                gather(src, arity, &v.indices)
            }
        }
    }

    /// All components with bindings evaluated. Unused lanes are zero.
    pub fn components(&self) -> Result<Vec4, EvalFault> {
        match self {
            Value::Text(_) => Err(EvalFault {
                expected: ValueType::Float1,
                found: ValueType::Text,
            }),
            Value::Bool(_) | Value::Int(_) => Ok(self.literal()),
            Value::Float(f) => f.evaluate(),
            Value::View(v) => {
                let source = v.source.read();
                let src = source.components()?;
                Ok(gather(src, source.arity(), &v.indices))
            }
        }
    }

    /// Single component; out-of-range indices read the last component.
    pub fn get(&self, index: usize) -> Result<f32, EvalFault> {
        let c = self.components()?;
        Ok(c[index.min(self.arity() - 1)])
    }

    /// Writes one component. Writing into a bound value turns it into a literal
    /// holding its current components, so later reads observe the write.
    pub fn set(&mut self, index: usize, v: f32) -> Result<(), ValueError> {
        let arity = self.arity();
        let index = index.min(arity - 1);
        match self {
            Value::View(_) => Err(ValueError::ReadOnlyView),
            Value::Text(_) => Err(ValueError::NotNumeric(ValueType::Text)),
            Value::Bool(b) => {
                *b = v != 0.0;
                Ok(())
            }
            Value::Int(i) => {
                *i = v as i32;
                Ok(())
            }
            Value::Float(f) => {
                if matches!(f.binding, Binding::Whole(_)) {
                    f.data = f.evaluate().unwrap_or(f.data);
                    f.binding = Binding::Literal;
                }
                if let Binding::PerComponent(parts) = &mut f.binding {
                    parts[index] = None;
                }
                f.data[index] = v;
                Ok(())
            }
        }
    }

    pub fn try_f32(&self) -> Result<f32, EvalFault> {
        self.components().map(|c| c.x)
    }
    pub fn try_vec2(&self) -> Result<Vec2, EvalFault> {
        self.components().map(|c| c.xy())
    }
    pub fn try_vec3(&self) -> Result<Vec3, EvalFault> {
        self.components().map(|c| c.xyz())
    }
    pub fn try_vec4(&self) -> Result<Vec4, EvalFault> {
        self.components()
    }

    /// Builds a value of type `ty` from a textual parameter list such as
    /// `"0, 1, sin(time)"` or `"normalize(dir)"`.
    pub fn from_parameters(
        ty: ValueType,
        parameters: &str,
        container: &VariableContainer,
    ) -> Result<Value, CompileError> {
        let parameters = parameters.trim();
        match ty {
            ValueType::Text => Ok(Value::Text(
                parameters.trim_matches('"').to_string(),
            )),
            ValueType::Bool => match parameters {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(CompileError::parse(
                    format!("expected `true` or `false` but found `{}`", parameters),
                    1,
                    1,
                )),
            },
            ValueType::Int => parameters.parse::<i32>().map(Value::Int).map_err(|_| {
                CompileError::parse(format!("invalid integer `{}`", parameters), 1, 1)
            }),
            _ => FloatValue::from_parameters(ty, parameters, container).map(Value::Float),
        }
    }

    /// Literal components written back as a parameter list, e.g. `0.5, 1, -2`.
    pub fn format_parameters(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Text(s) => format!("\"{}\"", s),
            _ => {
                let c = self.components().unwrap_or_else(|_| self.literal());
                (0..self.arity())
                    .map(|i| format_float(c[i]))
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}>", self.value_type(), self.format_parameters())
    }
}

fn format_float(v: f32) -> String {
    let s = format!("{:.4}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" || s.is_empty() {
        "0".to_string()
    } else {
        s.to_string()
    }
}

fn gather(src: Vec4, src_arity: usize, indices: &[usize]) -> Vec4 {
    let mut out = Vec4::ZERO;
    for (i, &idx) in indices.iter().enumerate() {
        out[i] = src[idx.min(src_arity.max(1) - 1)];
    }
    out
}

impl FloatValue {
    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    fn evaluate(&self) -> Result<Vec4, EvalFault> {
        match &self.binding {
            Binding::Literal => Ok(self.data),
            Binding::Whole(tree) => {
                let result = tree.evaluate()?;
                let found = result.value_type();
                if found == self.ty {
                    result.components()
                } else if found == ValueType::Float1 {
                    Ok(Vec4::splat(result.try_f32()?))
                } else {
                    Err(EvalFault {
                        expected: self.ty,
                        found,
                    })
                }
            }
            Binding::PerComponent(parts) => {
                let mut data = self.data;
                for (i, part) in parts.iter().enumerate() {
                    if let Some(tree) = part {
                        let result = tree.evaluate()?;
                        if result.value_type() != ValueType::Float1 {
                            return Err(EvalFault {
                                expected: ValueType::Float1,
                                found: result.value_type(),
                            });
                        }
                        data[i] = result.try_f32()?;
                    }
                }
                Ok(data)
            }
        }
    }

    fn from_parameters(
        ty: ValueType,
        parameters: &str,
        container: &VariableContainer,
    ) -> Result<Self, CompileError> {
        let arity = ty.arity();
        let parts = split_top_level(parameters);
        if parts.len() == 1 {
            let tree = expr::compile(parts[0], container)?;
            let found = tree.result_type();
            if found != ty && found != ValueType::Float1 {
                return Err(CompileError::mismatch(ty.name(), 0, ty.name(), found));
            }
            return Ok(match tree.constant() {
                Some(v) => {
                    let data = if found == ValueType::Float1 {
                        Vec4::splat(v.literal().x)
                    } else {
                        v.literal()
                    };
                    let mut out = Self {
                        ty,
                        data,
                        binding: Binding::Literal,
                    };
                    out.mask();
                    out
                }
                None => Self {
                    ty,
                    data: Vec4::ZERO,
                    binding: Binding::Whole(Arc::new(tree)),
                },
            });
        }
        if parts.len() != arity {
            return Err(CompileError::ParameterCount {
                type_name: ty.name(),
                expected: arity,
                actual: parts.len(),
            });
        }
        let mut data = Vec4::ZERO;
        let mut bound = Vec::with_capacity(arity);
        for (i, part) in parts.iter().enumerate() {
            let tree = expr::compile(part, container)?;
            if tree.result_type() != ValueType::Float1 {
                return Err(CompileError::mismatch(
                    ty.name(),
                    i,
                    "Float1",
                    tree.result_type(),
                ));
            }
            match tree.constant() {
                Some(v) => {
                    data[i] = v.literal().x;
                    bound.push(None);
                }
                None => bound.push(Some(Arc::new(tree))),
            }
        }
        let binding = if bound.iter().all(|b| b.is_none()) {
            Binding::Literal
        } else {
            Binding::PerComponent(bound)
        };
        Ok(Self { ty, data, binding })
    }

    fn mask(&mut self) {
        for i in self.ty.arity()..4 {
            self.data[i] = 0.0;
        }
    }
}

/// Splits on commas that are not nested inside parentheses.
pub fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = vec![];
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts
}

#[derive(Clone, Debug)]
pub struct Variable {
    pub handle: ValueHandle,
    pub constant: bool,
}

/// Resolves free variable names for the expression compiler.
#[derive(Clone, Debug, Default)]
pub struct VariableContainer {
    variables: HashMap<String, Variable>,
}

impl VariableContainer {
    pub fn new() -> Self {
        Self::default()
    }
    /// Declares a variable whose value may be reassigned between evaluations.
    pub fn declare(&mut self, name: impl Into<String>, value: Value) -> ValueHandle {
        self.insert(name.into(), value, false)
    }
    /// Declares a variable that expressions may fold at compile time.
    pub fn declare_constant(&mut self, name: impl Into<String>, value: Value) -> ValueHandle {
        let constant = value.is_literal();
        self.insert(name.into(), value, constant)
    }
    fn insert(&mut self, name: String, value: Value, constant: bool) -> ValueHandle {
        let h = handle(value);
        self.variables.insert(
            name,
            Variable {
                handle: h.clone(),
                constant,
            },
        );
        h
    }
    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }
    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }
    /// Replaces the value behind `name`; the type (and so the arity) must not change.
    pub fn assign(&self, name: &str, value: Value) -> Result<(), CompileError> {
        let var = self
            .variables
            .get(name)
            .ok_or_else(|| CompileError::UnresolvedVariable(name.to_string()))?;
        let mut slot = var.handle.write();
        let (expected, found) = (slot.value_type(), value.value_type());
        if expected != found {
            return Err(CompileError::mismatch(name, 0, expected.name(), found));
        }
        *slot = value;
        Ok(())
    }
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn literal_components() {
        let v = Value::float3(1.0, 2.0, 3.0);
        assert_eq!(v.value_type(), ValueType::Float3);
        assert_eq!(v.arity(), 3);
        assert_eq!(v.get(1).unwrap(), 2.0);
        // out of range reads clamp to the last component
        assert_eq!(v.get(7).unwrap(), 3.0);
        assert_eq!(v.try_vec3().unwrap(), vec3(1.0, 2.0, 3.0));
    }

    #[test]
    fn parameters_per_component() {
        let c = VariableContainer::new();
        let v = Value::from_parameters(ValueType::Float3, "1, 2 * 2, -3", &c).unwrap();
        assert!(v.is_literal());
        assert_eq!(v.try_vec3().unwrap(), vec3(1.0, 4.0, -3.0));
    }

    #[test]
    fn parameters_single_expression_splats_scalars() {
        let c = VariableContainer::new();
        let v = Value::from_parameters(ValueType::Float3, "0.5", &c).unwrap();
        assert_eq!(v.try_vec3().unwrap(), Vec3::splat(0.5));
    }

    #[test]
    fn parameter_count_error() {
        let c = VariableContainer::new();
        let err = Value::from_parameters(ValueType::Float3, "1, 2", &c).unwrap_err();
        assert_eq!(
            err,
            CompileError::ParameterCount {
                type_name: "Float3",
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn dynamic_binding_tracks_variable() {
        let mut c = VariableContainer::new();
        c.declare("t", Value::float1(1.0));
        let v = Value::from_parameters(ValueType::Float2, "t, t * 2", &c).unwrap();
        assert!(!v.is_literal());
        assert_eq!(v.try_vec2().unwrap(), vec2(1.0, 2.0));
        c.assign("t", Value::float1(3.0)).unwrap();
        assert_eq!(v.try_vec2().unwrap(), vec2(3.0, 6.0));
    }

    #[test]
    fn assign_rejects_type_change() {
        let mut c = VariableContainer::new();
        c.declare("t", Value::float1(1.0));
        assert!(c.assign("t", Value::float3(0.0, 0.0, 0.0)).is_err());
    }

    #[test]
    fn views_alias_and_reject_writes() {
        let src = handle(Value::float4(1.0, 2.0, 3.0, 4.0));
        let mut view = Value::view(src.clone(), vec![2, 0]).unwrap();
        assert_eq!(view.value_type(), ValueType::Float2);
        assert_eq!(view.try_vec2().unwrap(), vec2(3.0, 1.0));
        src.write().set(0, 10.0).unwrap();
        assert_eq!(view.try_vec2().unwrap(), vec2(3.0, 10.0));
        assert_eq!(view.set(0, 5.0), Err(ValueError::ReadOnlyView));
    }

    #[test]
    fn view_indices_clamp_to_source_arity() {
        let src = handle(Value::float2(1.0, 2.0));
        let view = Value::view(src, vec![0, 1, 3]).unwrap();
        assert_eq!(view.try_vec3().unwrap(), vec3(1.0, 2.0, 2.0));
    }

    #[test]
    fn view_width_is_checked() {
        let src = handle(Value::float4(1.0, 2.0, 3.0, 4.0));
        assert_eq!(
            Value::view(src.clone(), vec![]).err(),
            Some(ValueError::ViewWidth(0))
        );
        assert_eq!(
            Value::view(src, vec![0, 1, 2, 3, 0]).err(),
            Some(ValueError::ViewWidth(5))
        );
    }

    #[test]
    fn set_on_bound_value_becomes_literal() {
        let mut c = VariableContainer::new();
        c.declare("t", Value::float1(2.0));
        let mut v = Value::from_parameters(ValueType::Float3, "t", &c).unwrap();
        v.set(1, 9.0).unwrap();
        assert!(v.is_literal());
        assert_eq!(v.try_vec3().unwrap(), vec3(2.0, 9.0, 2.0));
    }

    #[test]
    fn format_round_trips_through_parameters() {
        let v = Value::float3(0.25, -1.0, 3.5);
        assert_eq!(v.format_parameters(), "0.25, -1, 3.5");
        assert_eq!(v.to_string(), "Float3<0.25, -1, 3.5>");
    }

    #[test]
    fn split_respects_parentheses() {
        assert_eq!(
            split_top_level("dot(a, b), 2, clamp(x, 0, 1)"),
            vec!["dot(a, b)", "2", "clamp(x, 0, 1)"]
        );
    }
}
