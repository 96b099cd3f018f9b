use std::collections::{BTreeMap, HashMap};

use lazy_static::lazy_static;

use super::*;
use crate::value;

pub struct OptionDescriptor {
    pub name: &'static str,
    pub ty: ValueType,
    /// Parameter text used when a block does not set the option.
    pub default: &'static str,
    pub help: &'static str,
}

pub type BuildFn = fn(&NodeOptions) -> Result<GraphNode, CompileError>;

pub struct NodeDescriptor {
    pub name: &'static str,
    pub category: NodeCategory,
    pub role: NodeRole,
    pub help: &'static str,
    pub options: &'static [OptionDescriptor],
    pub build: BuildFn,
}

impl NodeDescriptor {
    /// Option names are matched case insensitively, `Origin` and `origin` are the same.
    pub fn option(&self, name: &str) -> Option<&'static OptionDescriptor> {
        self.options
            .iter()
            .find(|o| o.name.eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Debug for NodeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeDescriptor")
            .field("name", &self.name)
            .field("category", &self.category)
            .finish()
    }
}

/// Compiled option values handed to a node constructor.
pub struct NodeOptions {
    node: &'static str,
    values: BTreeMap<&'static str, ValueHandle>,
    material: Option<MaterialRef>,
}

impl NodeOptions {
    /// Compiles the `(name, parameters)` pairs of a block against `desc`, filling
    /// in defaults for options the block leaves out.
    pub fn compile(
        desc: &NodeDescriptor,
        given: &[(String, String)],
        container: &VariableContainer,
        materials: &MaterialLibrary,
    ) -> Result<Self, CompileError> {
        let mut values = BTreeMap::new();
        let mut material = None;
        for (name, params) in given {
            if name.eq_ignore_ascii_case("material") {
                let text = Value::from_parameters(ValueType::Text, params, container)?;
                let text = text.as_text().unwrap_or_default().to_string();
                let index = materials
                    .find(&text)
                    .ok_or(CompileError::UnknownMaterial(text))?;
                material = Some(MaterialRef::Graph(index));
                continue;
            }
            let opt = desc.option(name).ok_or_else(|| CompileError::UnknownOption {
                node: desc.name.to_string(),
                option: name.clone(),
            })?;
            let v = Value::from_parameters(opt.ty, params, container)?;
            values.insert(opt.name, value::handle(v));
        }
        let empty = VariableContainer::new();
        for opt in desc.options {
            if !values.contains_key(opt.name) {
                let v = Value::from_parameters(opt.ty, opt.default, &empty)?;
                values.insert(opt.name, value::handle(v));
            }
        }
        Ok(Self {
            node: desc.name,
            values,
            material,
        })
    }

    pub fn handle(&self, name: &str) -> Result<ValueHandle, CompileError> {
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| CompileError::UnknownOption {
                node: self.node.to_string(),
                option: name.to_string(),
            })
    }

    pub fn material(&self) -> Option<MaterialRef> {
        self.material
    }
}

pub struct NodeRegistry {
    nodes: HashMap<&'static str, &'static NodeDescriptor>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }
    pub fn register(&mut self, desc: &'static NodeDescriptor) {
        self.nodes.insert(desc.name, desc);
    }
    pub fn get(&self, name: &str) -> Option<&'static NodeDescriptor> {
        self.nodes.get(name).copied()
    }
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.nodes.keys().copied().collect();
        names.sort_unstable();
        names
    }
    pub fn builtin() -> Self {
        let mut reg = Self::new();
        reg.register(&camera::PINHOLE_CAMERA);
        reg.register(&analytical::GROUND_PLANE);
        reg.register(&analytical::DOME);
        reg.register(&sky::DEFAULT_SKY);
        reg.register(&render::PRINCIPLED_BSDF);
        reg
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

lazy_static! {
    static ref NODES: NodeRegistry = NodeRegistry::builtin();
}

pub fn nodes() -> &'static NodeRegistry {
    &NODES
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builtin_nodes() {
        let reg = nodes();
        assert_eq!(
            reg.names(),
            vec![
                "DefaultSky",
                "PinholeCamera",
                "analyticalDome",
                "analyticalGroundPlane",
                "renderPrincipledBSDF"
            ]
        );
        let cam = reg.get("PinholeCamera").unwrap();
        assert_eq!(cam.category, NodeCategory::Camera);
        assert!(cam.option("Origin").is_some());
        assert!(reg.get("Sphere").is_none());
    }

    #[test]
    fn defaults_parse() {
        let empty = VariableContainer::new();
        let materials = MaterialLibrary::default();
        for name in nodes().names() {
            let desc = nodes().get(name).unwrap();
            let opts = NodeOptions::compile(desc, &[], &empty, &materials).unwrap();
            (desc.build)(&opts).unwrap();
        }
    }

    #[test]
    fn unknown_option_and_material() {
        let empty = VariableContainer::new();
        let materials = MaterialLibrary::default();
        let desc = nodes().get("analyticalGroundPlane").unwrap();
        let err = NodeOptions::compile(desc, &[("radius".into(), "1".into())], &empty, &materials)
            .err()
            .unwrap();
        assert!(matches!(err, CompileError::UnknownOption { .. }));
        let err = NodeOptions::compile(
            desc,
            &[("material".into(), "\"gold\"".into())],
            &empty,
            &materials,
        )
        .err()
        .unwrap();
        assert_eq!(err, CompileError::UnknownMaterial("gold".into()));
    }
}
