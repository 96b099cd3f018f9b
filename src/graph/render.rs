use super::*;
use crate::integrator::{self, NoDirectLight};

pub static PRINCIPLED_BSDF: NodeDescriptor = NodeDescriptor {
    name: "renderPrincipledBSDF",
    category: NodeCategory::Render,
    role: NodeRole::None,
    help: "Path traces the scene with the principled BSDF.",
    options: &[OptionDescriptor {
        name: "maxDepth",
        ty: ValueType::Int,
        default: "1",
        help: "Maximum number of surfaces a path visits.",
    }],
    build: |opts| {
        Ok(GraphNode::Render(PrincipledRender {
            max_depth: opts.handle("maxDepth")?,
        }))
    },
};

#[derive(Debug)]
pub struct PrincipledRender {
    pub max_depth: ValueHandle,
}

impl PrincipledRender {
    pub fn options(&self) -> Vec<(&'static str, ValueHandle)> {
        vec![("maxDepth", self.max_depth.clone())]
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth.read().as_int().unwrap_or(1).max(1) as u32
    }

    pub fn execute(&self, ctx: &mut GraphContext, env: &ExecEnv) -> NodeResult {
        integrator::integrate(ctx, env, self.max_depth(), &NoDirectLight)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn max_depth_option() {
        let graph = SceneGraph::compile("renderPrincipledBSDF {\n    maxDepth: 3\n}\n").unwrap();
        let GraphNode::Render(r) = &graph.nodes()[0] else {
            panic!("expected a render node");
        };
        assert_eq!(r.max_depth(), 3);
        let graph = SceneGraph::compile("renderPrincipledBSDF {\n    maxDepth: 0\n}\n").unwrap();
        let GraphNode::Render(r) = &graph.nodes()[0] else {
            panic!("expected a render node");
        };
        assert_eq!(r.max_depth(), 1);
    }
}
