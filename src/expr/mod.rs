use std::sync::atomic::{AtomicU64, Ordering};

use lazy_static::lazy_static;

use crate::value::EvalFault;
use crate::*;

pub mod function;
mod parse;

pub use function::{FunctionEntry, FunctionLibrary};

lazy_static! {
    static ref BUILTINS: FunctionLibrary = FunctionLibrary::builtin();
}

pub fn builtins() -> &'static FunctionLibrary {
    &BUILTINS
}

/// Compiles `src` against the built-in function library.
pub fn compile(src: &str, container: &VariableContainer) -> Result<ExpressionTree, CompileError> {
    compile_with(src, container, builtins())
}

pub fn compile_with(
    src: &str,
    container: &VariableContainer,
    library: &FunctionLibrary,
) -> Result<ExpressionTree, CompileError> {
    let root = parse::Parser::new(src, container, library).parse()?;
    Ok(match root {
        ExprNode::Literal(value) => ExpressionTree::Constant {
            value,
            evaluations: AtomicU64::new(0),
        },
        root => {
            let ty = root.ty();
            ExpressionTree::Dynamic {
                root,
                ty,
                evaluations: AtomicU64::new(0),
            }
        }
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
    fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
        }
    }
}

#[derive(Clone, Debug)]
pub enum ExprNode {
    Literal(Value),
    Variable {
        name: String,
        handle: ValueHandle,
        ty: ValueType,
    },
    Swizzle {
        base: Box<ExprNode>,
        indices: Vec<usize>,
        ty: ValueType,
    },
    Negate(Box<ExprNode>),
    Binary {
        op: BinaryOp,
        lhs: Box<ExprNode>,
        rhs: Box<ExprNode>,
        ty: ValueType,
    },
    Call {
        function: FunctionEntry,
        args: Vec<ExprNode>,
        ty: ValueType,
    },
}

impl ExprNode {
    pub fn ty(&self) -> ValueType {
        match self {
            ExprNode::Literal(v) => v.value_type(),
            ExprNode::Negate(inner) => inner.ty(),
            ExprNode::Variable { ty, .. }
            | ExprNode::Swizzle { ty, .. }
            | ExprNode::Binary { ty, .. }
            | ExprNode::Call { ty, .. } => *ty,
        }
    }

    fn is_literal(&self) -> bool {
        matches!(self, ExprNode::Literal(_))
    }

    pub(crate) fn variable(name: &str, container: &VariableContainer) -> Result<Self, CompileError> {
        let var = container
            .get(name)
            .ok_or_else(|| CompileError::UnresolvedVariable(name.to_string()))?;
        let value = var.handle.read();
        if var.constant {
            return Ok(ExprNode::Literal(value.clone()));
        }
        Ok(ExprNode::Variable {
            name: name.to_string(),
            handle: var.handle.clone(),
            ty: value.value_type(),
        })
    }

    pub(crate) fn swizzle(base: ExprNode, pattern: &str) -> Result<Self, CompileError> {
        let base_ty = base.ty();
        if !base_ty.is_float() {
            return Err(CompileError::mismatch(
                &format!(".{}", pattern),
                0,
                "Float",
                base_ty,
            ));
        }
        let mut indices = Vec::with_capacity(pattern.len());
        for c in pattern.chars() {
            let i = match c {
                'x' | 'r' => 0,
                'y' | 'g' => 1,
                'z' | 'b' => 2,
                'w' | 'a' => 3,
                _ => return Err(CompileError::parse(format!("invalid swizzle `{}`", pattern), 1, 1)),
            };
            if i >= base_ty.arity() {
                return Err(CompileError::mismatch(
                    &format!(".{}", pattern),
                    0,
                    format!("at least {} components", i + 1),
                    base_ty,
                ));
            }
            indices.push(i);
        }
        let ty = ValueType::float(indices.len()).ok_or_else(|| {
            CompileError::parse(format!("swizzle `{}` is too long", pattern), 1, 1)
        })?;
        Ok(ExprNode::Swizzle {
            base: Box::new(base),
            indices,
            ty,
        }
        .folded())
    }

    pub(crate) fn negate(inner: ExprNode) -> Result<Self, CompileError> {
        if !inner.ty().is_float() {
            return Err(CompileError::mismatch("-", 0, "Float", inner.ty()));
        }
        Ok(ExprNode::Negate(Box::new(inner)).folded())
    }

    pub(crate) fn binary(op: BinaryOp, lhs: ExprNode, rhs: ExprNode) -> Result<Self, CompileError> {
        let (lt, rt) = (lhs.ty(), rhs.ty());
        if !lt.is_float() {
            return Err(CompileError::mismatch(op.symbol(), 0, "Float", lt));
        }
        if !rt.is_float() {
            return Err(CompileError::mismatch(op.symbol(), 1, "Float", rt));
        }
        let ty = if lt == rt || rt == ValueType::Float1 {
            lt
        } else if lt == ValueType::Float1 {
            rt
        } else {
            return Err(CompileError::mismatch(op.symbol(), 1, lt.name(), rt));
        };
        Ok(ExprNode::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            ty,
        }
        .folded())
    }

    pub(crate) fn call(function: FunctionEntry, args: Vec<ExprNode>) -> Result<Self, CompileError> {
        if args.len() != function.arity {
            return Err(CompileError::ArgumentCount {
                function: function.name.to_string(),
                expected: function.arity,
                actual: args.len(),
            });
        }
        let types: Vec<ValueType> = args.iter().map(|a| a.ty()).collect();
        let representative = (function.setup)(function.name, &types)?;
        Ok(ExprNode::Call {
            function,
            args,
            ty: representative.value_type(),
        }
        .folded())
    }

    /// Replaces the node by its value when every child is already a literal.
    fn folded(self) -> Self {
        let foldable = match &self {
            ExprNode::Literal(_) | ExprNode::Variable { .. } => false,
            ExprNode::Swizzle { base, .. } => base.is_literal(),
            ExprNode::Negate(inner) => inner.is_literal(),
            ExprNode::Binary { lhs, rhs, .. } => lhs.is_literal() && rhs.is_literal(),
            ExprNode::Call { args, .. } => args.iter().all(|a| a.is_literal()),
        };
        if !foldable {
            return self;
        }
        let scratch = AtomicU64::new(0);
        match self.eval(&scratch) {
            Ok(v) => ExprNode::Literal(v),
            Err(_) => self,
        }
    }

    fn eval(&self, probe: &AtomicU64) -> Result<Value, EvalFault> {
        probe.fetch_add(1, Ordering::Relaxed);
        match self {
            ExprNode::Literal(v) => Ok(v.clone()),
            ExprNode::Variable { handle, ty, .. } => {
                let v = handle.read();
                if v.value_type() != *ty {
                    return Err(EvalFault {
                        expected: *ty,
                        found: v.value_type(),
                    });
                }
                Ok(Value::from_components(*ty, v.components()?))
            }
            ExprNode::Swizzle { base, indices, ty } => {
                let c = base.eval(probe)?.components()?;
                let mut out = Vec4::ZERO;
                for (i, &idx) in indices.iter().enumerate() {
                    out[i] = c[idx];
                }
                Ok(Value::from_components(*ty, out))
            }
            ExprNode::Negate(inner) => {
                let v = inner.eval(probe)?;
                Ok(Value::from_components(v.value_type(), -v.components()?))
            }
            ExprNode::Binary { op, lhs, rhs, ty } => {
                let a = lhs.eval(probe)?;
                let b = rhs.eval(probe)?;
                let (ca, cb) = (a.components()?, b.components()?);
                let ca = if a.arity() == 1 { Vec4::splat(ca.x) } else { ca };
                let cb = if b.arity() == 1 { Vec4::splat(cb.x) } else { cb };
                let mut out = Vec4::ZERO;
                for i in 0..ty.arity() {
                    out[i] = op.apply(ca[i], cb[i]);
                }
                Ok(Value::from_components(*ty, out))
            }
            ExprNode::Call { function, args, ty } => {
                let values = args
                    .iter()
                    .map(|a| a.eval(probe))
                    .collect::<Result<Vec<_>, _>>()?;
                match (function.eval)(&values) {
                    Some(v) if v.value_type() == *ty => Ok(v),
                    Some(v) => Err(EvalFault {
                        expected: *ty,
                        found: v.value_type(),
                    }),
                    None => Err(EvalFault {
                        expected: *ty,
                        found: values.first().map_or(*ty, |v| v.value_type()),
                    }),
                }
            }
        }
    }
}

/// Result of compiling a piece of text.
#[derive(Debug)]
pub enum ExpressionTree {
    /// Folded at compile time; evaluation just hands out the stored literal.
    Constant {
        value: Value,
        evaluations: AtomicU64,
    },
    /// Walked on every evaluation so bound variables are always observed fresh.
    Dynamic {
        root: ExprNode,
        ty: ValueType,
        evaluations: AtomicU64,
    },
}

impl ExpressionTree {
    pub fn result_type(&self) -> ValueType {
        match self {
            ExpressionTree::Constant { value, .. } => value.value_type(),
            ExpressionTree::Dynamic { ty, .. } => *ty,
        }
    }
    pub fn is_constant(&self) -> bool {
        matches!(self, ExpressionTree::Constant { .. })
    }
    pub fn constant(&self) -> Option<&Value> {
        match self {
            ExpressionTree::Constant { value, .. } => Some(value),
            _ => None,
        }
    }
    pub fn evaluate(&self) -> Result<Value, EvalFault> {
        match self {
            ExpressionTree::Constant { value, evaluations } => {
                evaluations.fetch_add(1, Ordering::Relaxed);
                Ok(value.clone())
            }
            ExpressionTree::Dynamic {
                root, evaluations, ..
            } => root.eval(evaluations),
        }
    }
    /// Number of expression nodes visited by evaluations of this tree so far.
    pub fn node_evaluations(&self) -> u64 {
        match self {
            ExpressionTree::Constant { evaluations, .. }
            | ExpressionTree::Dynamic { evaluations, .. } => evaluations.load(Ordering::Relaxed),
        }
    }
}

/// Runtime faults are tolerated in release builds: the caller skips the write it
/// was about to make and keeps the previous value.
pub(crate) fn report_fault(what: &str, fault: &EvalFault) {
    log::warn!("skipping {}: {}", what, fault);
    debug_assert!(false, "runtime type fault in {}: {}", what, fault);
}

#[cfg(test)]
mod test {
    use super::*;

    fn eval_f32(src: &str, c: &VariableContainer) -> f32 {
        compile(src, c).unwrap().evaluate().unwrap().try_f32().unwrap()
    }

    #[test]
    fn constant_folding() {
        let c = VariableContainer::new();
        let tree = compile("1 + 2*3", &c).unwrap();
        assert!(tree.is_constant());
        assert_eq!(tree.constant().unwrap().try_f32().unwrap(), 7.0);
        for _ in 0..3 {
            assert_eq!(tree.evaluate().unwrap().try_f32().unwrap(), 7.0);
        }
        // one stored literal per evaluation instead of five nodes
        assert_eq!(tree.node_evaluations(), 3);
    }

    #[test]
    fn dynamic_trees_rewalk_every_time() {
        let mut c = VariableContainer::new();
        c.declare("t", Value::float1(1.0));
        let tree = compile("t + 1", &c).unwrap();
        assert!(!tree.is_constant());
        assert_eq!(tree.evaluate().unwrap().try_f32().unwrap(), 2.0);
        assert_eq!(tree.node_evaluations(), 3);
        c.assign("t", Value::float1(5.0)).unwrap();
        assert_eq!(tree.evaluate().unwrap().try_f32().unwrap(), 6.0);
        assert_eq!(tree.node_evaluations(), 6);
    }

    #[test]
    fn constant_variables_fold() {
        let mut c = VariableContainer::new();
        c.declare_constant("k", Value::float1(4.0));
        let tree = compile("k * 2", &c).unwrap();
        assert!(tree.is_constant());
        assert_eq!(eval_f32("k * 2", &c), 8.0);
    }

    #[test]
    fn precedence_and_unary() {
        let c = VariableContainer::new();
        assert_eq!(eval_f32("-(1 + 2) * 2 - 4 / 2", &c), -8.0);
        assert_eq!(eval_f32("2.5e1", &c), 25.0);
    }

    #[test]
    fn vector_broadcast_and_swizzle() {
        let mut c = VariableContainer::new();
        c.declare("p", Value::float3(1.0, 2.0, 3.0));
        let v = compile("p * 2 + 1", &c).unwrap().evaluate().unwrap();
        assert_eq!(v.value_type(), ValueType::Float3);
        assert_eq!(v.try_vec3().unwrap(), vec3(3.0, 5.0, 7.0));
        let s = compile("p.zx", &c).unwrap().evaluate().unwrap();
        assert_eq!(s.try_vec2().unwrap(), vec2(3.0, 1.0));
        assert!(compile("p.w", &c).is_err());
    }

    #[test]
    fn mismatched_arities() {
        let mut c = VariableContainer::new();
        c.declare("a", Value::float2(1.0, 2.0));
        c.declare("b", Value::float3(1.0, 2.0, 3.0));
        match compile("a + b", &c) {
            Err(CompileError::TypeMismatch { function, .. }) => assert_eq!(function, "+"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unresolved_names() {
        let c = VariableContainer::new();
        assert_eq!(
            compile("foo + 1", &c).unwrap_err(),
            CompileError::UnresolvedVariable("foo".into())
        );
        assert_eq!(
            compile("bar(1)", &c).unwrap_err(),
            CompileError::UnknownFunction("bar".into())
        );
    }

    #[test]
    fn syntax_errors_carry_position() {
        let c = VariableContainer::new();
        match compile("1 +\n  * 2", &c) {
            Err(CompileError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(compile("(1 + 2", &c), Err(CompileError::Parse { .. })));
        assert!(matches!(compile("1 2", &c), Err(CompileError::Parse { .. })));
    }
}
