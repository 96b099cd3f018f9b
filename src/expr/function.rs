use std::collections::HashMap;
use std::fmt;

use crate::util::hash;
use crate::*;

/// Static type check for a call. Returns a representative value of the result type.
pub type SetupFn = fn(&str, &[ValueType]) -> Result<Value, CompileError>;
/// Evaluates a call on already evaluated arguments. `None` signals a runtime type fault.
pub type EvalFn = fn(&[Value]) -> Option<Value>;

#[derive(Clone, Copy)]
pub struct FunctionEntry {
    pub name: &'static str,
    pub arity: usize,
    pub help: &'static str,
    pub setup: SetupFn,
    pub eval: EvalFn,
}

impl fmt::Debug for FunctionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionEntry")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

#[derive(Clone, Debug, Default)]
pub struct FunctionLibrary {
    functions: HashMap<&'static str, FunctionEntry>,
}

impl FunctionLibrary {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn register(&mut self, entry: FunctionEntry) {
        if self.functions.insert(entry.name, entry).is_some() {
            log::warn!("function `{}` registered twice", entry.name);
        }
    }
    pub fn get(&self, name: &str) -> Option<FunctionEntry> {
        self.functions.get(name).copied()
    }
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.functions.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn builtin() -> Self {
        let mut lib = Self::new();
        lib.register(FunctionEntry {
            name: "dot",
            arity: 2,
            help: "dot(a, b): dot product of two vectors of equal arity",
            setup: setup_same_vector_to_scalar,
            eval: |args| {
                let (a, b) = (args[0].components().ok()?, args[1].components().ok()?);
                Some(Value::float1(a.dot(b)))
            },
        });
        lib.register(FunctionEntry {
            name: "cross",
            arity: 2,
            help: "cross(a, b): cross product of two Float3",
            setup: |name, args| {
                for (i, t) in args.iter().enumerate() {
                    if *t != ValueType::Float3 {
                        return Err(CompileError::mismatch(name, i, "Float3", *t));
                    }
                }
                Ok(Value::zero(ValueType::Float3))
            },
            eval: |args| {
                let a = args[0].try_vec3().ok()?;
                let b = args[1].try_vec3().ok()?;
                Some(Value::from_vec3(a.cross(b)))
            },
        });
        lib.register(FunctionEntry {
            name: "length",
            arity: 1,
            help: "length(v): euclidean length",
            setup: setup_float_to_scalar,
            eval: |args| Some(Value::float1(args[0].components().ok()?.length())),
        });
        lib.register(FunctionEntry {
            name: "normalize",
            arity: 1,
            help: "normalize(v): unit vector, zero for zero-length input",
            setup: |name, args| {
                require_vector(name, 0, args[0])?;
                Ok(Value::zero(args[0]))
            },
            eval: |args| {
                let v = &args[0];
                let n = v.components().ok()?.normalize_or_zero();
                Some(Value::from_components(v.value_type(), n))
            },
        });
        lib.register(FunctionEntry {
            name: "reflect",
            arity: 2,
            help: "reflect(i, n): reflection of i about the normal n",
            setup: |name, args| {
                for (i, t) in args.iter().enumerate() {
                    if *t != ValueType::Float3 {
                        return Err(CompileError::mismatch(name, i, "Float3", *t));
                    }
                }
                Ok(Value::zero(ValueType::Float3))
            },
            eval: |args| {
                let i = args[0].components().ok()?;
                let n = args[1].components().ok()?;
                Some(Value::from_components(
                    args[0].value_type(),
                    i - 2.0 * n.dot(i) * n,
                ))
            },
        });
        lib.register(FunctionEntry {
            name: "clamp",
            arity: 3,
            help: "clamp(x, lo, hi): componentwise clamp into scalar bounds",
            setup: |name, args| {
                require_float(name, 0, args[0])?;
                for i in 1..3 {
                    if args[i] != ValueType::Float1 {
                        return Err(CompileError::mismatch(name, i, "Float1", args[i]));
                    }
                }
                Ok(Value::zero(args[0]))
            },
            eval: |args| componentwise(args, |v| v[0].max(v[1]).min(v[2])),
        });
        lib.register(FunctionEntry {
            name: "mix",
            arity: 3,
            help: "mix(a, b, t): linear interpolation",
            setup: setup_broadcast,
            eval: |args| componentwise(args, |v| mix(v[0], v[1], v[2])),
        });
        lib.register(FunctionEntry {
            name: "pow",
            arity: 2,
            help: "pow(x, y): componentwise power of two values of equal arity",
            setup: |name, args| {
                require_float(name, 0, args[0])?;
                if args[1] != args[0] {
                    return Err(CompileError::mismatch(name, 1, args[0].name(), args[1]));
                }
                Ok(Value::zero(args[0]))
            },
            eval: |args| componentwise(args, |v| v[0].powf(v[1])),
        });
        lib.register(FunctionEntry {
            name: "min",
            arity: 2,
            help: "min(a, b)",
            setup: setup_broadcast,
            eval: |args| componentwise(args, |v| v[0].min(v[1])),
        });
        lib.register(FunctionEntry {
            name: "max",
            arity: 2,
            help: "max(a, b)",
            setup: setup_broadcast,
            eval: |args| componentwise(args, |v| v[0].max(v[1])),
        });
        lib.register(FunctionEntry {
            name: "abs",
            arity: 1,
            help: "abs(x)",
            setup: setup_float_same,
            eval: |args| componentwise(args, |v| v[0].abs()),
        });
        lib.register(FunctionEntry {
            name: "floor",
            arity: 1,
            help: "floor(x)",
            setup: setup_float_same,
            eval: |args| componentwise(args, |v| v[0].floor()),
        });
        lib.register(FunctionEntry {
            name: "fract",
            arity: 1,
            help: "fract(x): x - floor(x)",
            setup: setup_float_same,
            eval: |args| componentwise(args, |v| v[0] - v[0].floor()),
        });
        lib.register(FunctionEntry {
            name: "sqrt",
            arity: 1,
            help: "sqrt(x)",
            setup: setup_float_same,
            eval: |args| componentwise(args, |v| v[0].max(0.0).sqrt()),
        });
        lib.register(FunctionEntry {
            name: "sin",
            arity: 1,
            help: "sin(x)",
            setup: setup_float_same,
            eval: |args| componentwise(args, |v| v[0].sin()),
        });
        lib.register(FunctionEntry {
            name: "cos",
            arity: 1,
            help: "cos(x)",
            setup: setup_float_same,
            eval: |args| componentwise(args, |v| v[0].cos()),
        });
        lib.register(FunctionEntry {
            name: "noise2D",
            arity: 1,
            help: "noise2D(p): value noise in [0, 1) at a Float2 position",
            setup: |name, args| {
                if args[0] != ValueType::Float2 {
                    return Err(CompileError::mismatch(name, 0, "Float2", args[0]));
                }
                Ok(Value::zero(ValueType::Float1))
            },
            eval: |args| Some(Value::float1(hash::noise2d(args[0].try_vec2().ok()?))),
        });
        lib.register(constructor("Float2", ValueType::Float2));
        lib.register(constructor("Float3", ValueType::Float3));
        lib.register(constructor("Float4", ValueType::Float4));
        lib
    }
}

fn constructor(name: &'static str, ty: ValueType) -> FunctionEntry {
    let eval: EvalFn = match ty {
        ValueType::Float2 => |args| construct(ValueType::Float2, args),
        ValueType::Float3 => |args| construct(ValueType::Float3, args),
        _ => |args| construct(ValueType::Float4, args),
    };
    let setup: SetupFn = match ty {
        ValueType::Float2 => |name, args| setup_constructor(name, ValueType::Float2, args),
        ValueType::Float3 => |name, args| setup_constructor(name, ValueType::Float3, args),
        _ => |name, args| setup_constructor(name, ValueType::Float4, args),
    };
    FunctionEntry {
        name,
        arity: ty.arity(),
        help: "FloatN(x, y, ..): builds a vector from scalars",
        setup,
        eval,
    }
}

fn setup_constructor(name: &str, ty: ValueType, args: &[ValueType]) -> Result<Value, CompileError> {
    for (i, t) in args.iter().enumerate() {
        if *t != ValueType::Float1 {
            return Err(CompileError::mismatch(name, i, "Float1", *t));
        }
    }
    Ok(Value::zero(ty))
}

fn construct(ty: ValueType, args: &[Value]) -> Option<Value> {
    let mut data = Vec4::ZERO;
    for (i, a) in args.iter().enumerate() {
        data[i] = a.try_f32().ok()?;
    }
    Some(Value::from_components(ty, data))
}

fn require_float(name: &str, i: usize, t: ValueType) -> Result<(), CompileError> {
    if t.is_float() {
        Ok(())
    } else {
        Err(CompileError::mismatch(name, i, "Float", t))
    }
}

fn setup_float_same(name: &str, args: &[ValueType]) -> Result<Value, CompileError> {
    require_float(name, 0, args[0])?;
    Ok(Value::zero(args[0]))
}

fn setup_float_to_scalar(name: &str, args: &[ValueType]) -> Result<Value, CompileError> {
    require_float(name, 0, args[0])?;
    Ok(Value::zero(ValueType::Float1))
}

fn require_vector(name: &str, i: usize, t: ValueType) -> Result<(), CompileError> {
    if t.is_float() && t != ValueType::Float1 {
        Ok(())
    } else {
        Err(CompileError::mismatch(name, i, "Float2, Float3 or Float4", t))
    }
}

/// Two vector arguments of identical arity.
fn setup_same_vector(name: &str, args: &[ValueType]) -> Result<Value, CompileError> {
    require_vector(name, 0, args[0])?;
    if args[1] != args[0] {
        return Err(CompileError::mismatch(name, 1, args[0].name(), args[1]));
    }
    Ok(Value::zero(args[0]))
}

fn setup_same_vector_to_scalar(name: &str, args: &[ValueType]) -> Result<Value, CompileError> {
    setup_same_vector(name, args)?;
    Ok(Value::zero(ValueType::Float1))
}

/// Float arguments that are either Float1 or share the widest arity, which is the result type.
fn setup_broadcast(name: &str, args: &[ValueType]) -> Result<Value, CompileError> {
    let mut ty = ValueType::Float1;
    for (i, t) in args.iter().enumerate() {
        require_float(name, i, *t)?;
        if *t != ValueType::Float1 {
            if ty != ValueType::Float1 && ty != *t {
                return Err(CompileError::mismatch(name, i, ty.name(), *t));
            }
            ty = *t;
        }
    }
    Ok(Value::zero(ty))
}

fn componentwise(args: &[Value], f: impl Fn(&[f32]) -> f32) -> Option<Value> {
    let ty = args
        .iter()
        .map(|a| a.value_type())
        .find(|t| *t != ValueType::Float1)
        .unwrap_or(ValueType::Float1);
    let comps = args
        .iter()
        .map(|a| {
            let c = a.components().ok()?;
            Some(if a.arity() == 1 { Vec4::splat(c.x) } else { c })
        })
        .collect::<Option<Vec<_>>>()?;
    let mut out = Vec4::ZERO;
    let mut lane = Vec::with_capacity(args.len());
    for i in 0..ty.arity() {
        lane.clear();
        lane.extend(comps.iter().map(|c| c[i]));
        out[i] = f(&lane);
    }
    Some(Value::from_components(ty, out))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expr::compile;

    fn eval(src: &str) -> Value {
        let c = VariableContainer::new();
        compile(src, &c).unwrap().evaluate().unwrap()
    }

    #[test]
    fn dot_products() {
        assert_eq!(eval("dot(Float3(1, 0, 0), Float3(0, 1, 0))").try_f32().unwrap(), 0.0);
        assert_eq!(eval("dot(Float3(1, 2, 3), Float3(1, 2, 3))").try_f32().unwrap(), 14.0);
    }

    #[test]
    fn dot_rejects_scalars() {
        let c = VariableContainer::new();
        match compile("dot(1, 2)", &c) {
            Err(CompileError::TypeMismatch { function, argument, .. }) => {
                assert_eq!(function, "dot");
                assert_eq!(argument, 0);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(compile("dot(Float2(1, 0), Float3(1, 0, 0))", &c).is_err());
    }

    #[test]
    fn argument_count() {
        let c = VariableContainer::new();
        assert_eq!(
            compile("pow(2)", &c).unwrap_err(),
            CompileError::ArgumentCount {
                function: "pow".into(),
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn clamp_and_pow() {
        assert_eq!(eval("clamp(1.5, 0, 1)").try_f32().unwrap(), 1.0);
        assert_eq!(
            eval("clamp(Float3(2, -2, 0.5), 0, 1)").try_vec3().unwrap(),
            vec3(1.0, 0.0, 0.5)
        );
        assert_eq!(eval("pow(2, 3)").try_f32().unwrap(), 8.0);
        assert_eq!(
            eval("pow(Float2(2, 2), Float2(3, 2))").try_vec2().unwrap(),
            vec2(8.0, 4.0)
        );
        let c = VariableContainer::new();
        assert!(compile("clamp(Float2(1, 2), Float2(0, 0), 1)", &c).is_err());
        assert!(compile("pow(Float2(2, 2), 3)", &c).is_err());
        assert!(compile("normalize(1)", &c).is_err());
        assert!(compile("reflect(Float2(1, 0), Float2(0, 1))", &c).is_err());
    }

    #[test]
    fn vector_helpers() {
        assert_eq!(eval("normalize(Float3(0, 3, 0))").try_vec3().unwrap(), Vec3::Y);
        assert_eq!(eval("normalize(Float3(0, 0, 0))").try_vec3().unwrap(), Vec3::ZERO);
        assert_eq!(eval("length(Float2(3, 4))").try_f32().unwrap(), 5.0);
        assert_eq!(
            eval("cross(Float3(1, 0, 0), Float3(0, 1, 0))").try_vec3().unwrap(),
            Vec3::Z
        );
        assert_eq!(
            eval("reflect(Float3(1, -1, 0), Float3(0, 1, 0))").try_vec3().unwrap(),
            vec3(1.0, 1.0, 0.0)
        );
        assert_eq!(eval("mix(0, 10, 0.25)").try_f32().unwrap(), 2.5);
    }

    #[test]
    fn noise_is_deterministic() {
        let a = eval("noise2D(Float2(1.3, 7.1))").try_f32().unwrap();
        let b = eval("noise2D(Float2(1.3, 7.1))").try_f32().unwrap();
        assert_eq!(a, b);
        assert!((0.0..1.0).contains(&a));
    }

    #[test]
    fn registry_lists_names() {
        let lib = FunctionLibrary::builtin();
        let names = lib.names();
        assert!(names.contains(&"dot"));
        assert!(names.contains(&"noise2D"));
        assert!(lib.get("nope").is_none());
    }
}
