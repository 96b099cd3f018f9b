//! Graph scripts.
//!
//! ```text
//! # a comment
//! Float3 target = 0, 0.5, 0
//! const Float radius = 2
//!
//! Material "floor" {
//!     albedo: 0.8, 0.8, 0.8
//! }
//!
//! PinholeCamera {
//!     origin: 0, 1, -5
//!     lookat: target
//! }
//! ```
//!
//! Variables come first in evaluation order, then materials, then nodes, so
//! options may name any variable and any material regardless of where they are
//! declared. Nodes run in declaration order.

use super::*;
use crate::bsdf::Material;

struct Block {
    kind: String,
    name: Option<String>,
    line: usize,
    options: Vec<(String, String, usize)>,
}

struct VariableDecl {
    ty: ValueType,
    name: String,
    params: String,
    constant: bool,
    line: usize,
}

#[derive(Default)]
struct Document {
    variables: Vec<VariableDecl>,
    blocks: Vec<Block>,
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Errors from value parsing refer to the parameter text alone.
fn at_line(err: CompileError, line: usize) -> CompileError {
    match err {
        CompileError::Parse { msg, col, .. } => CompileError::Parse { msg, line, col },
        e => e,
    }
}

/// Splits a block header into its kind and the text after it.
fn split_header(text: &str) -> (&str, &str) {
    let head = text.trim_end_matches('{').trim();
    match head.find(char::is_whitespace) {
        Some(i) => (&head[..i], head[i..].trim()),
        None => (head, ""),
    }
}

fn parse_header(text: &str, line: usize) -> Result<Block, CompileError> {
    let (kind, rest) = split_header(text);
    if !is_ident(kind) {
        return Err(CompileError::parse(
            format!("expected a block name but found `{}`", kind),
            line,
            1,
        ));
    }
    let name = if rest.is_empty() {
        None
    } else if rest.len() >= 2 && rest.starts_with('"') && rest.ends_with('"') {
        Some(rest[1..rest.len() - 1].to_string())
    } else {
        return Err(CompileError::parse(
            format!("expected a quoted name but found `{}`", rest),
            line,
            kind.len() + 2,
        ));
    };
    Ok(Block {
        kind: kind.to_string(),
        name,
        line,
        options: vec![],
    })
}

fn parse_variable(text: &str, line: usize) -> Result<Option<VariableDecl>, CompileError> {
    let (constant, text) = match text.strip_prefix("const ") {
        Some(rest) => (true, rest.trim_start()),
        None => (false, text),
    };
    let Some((decl, params)) = text.split_once('=') else {
        return if constant {
            Err(CompileError::parse("expected `=` after constant name", line, text.len() + 1))
        } else {
            Ok(None)
        };
    };
    let mut words = decl.split_whitespace();
    let (Some(ty), Some(name), None) = (words.next(), words.next(), words.next()) else {
        return Ok(None);
    };
    let Some(ty) = ValueType::from_name(ty) else {
        return Err(CompileError::parse(format!("unknown type `{}`", ty), line, 1));
    };
    if !is_ident(name) {
        return Err(CompileError::parse(
            format!("invalid variable name `{}`", name),
            line,
            1,
        ));
    }
    Ok(Some(VariableDecl {
        ty,
        name: name.to_string(),
        params: params.trim().to_string(),
        constant,
        line,
    }))
}

fn parse_document(source: &str) -> Result<Document, CompileError> {
    let mut doc = Document::default();
    let mut open: Option<Block> = None;
    let mut last_line = 0;
    for (i, raw) in source.lines().enumerate() {
        let line = i + 1;
        last_line = line;
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        if let Some(block) = open.as_mut() {
            if text == "}" {
                doc.blocks.extend(open.take());
                continue;
            }
            let Some((name, params)) = text.split_once(':') else {
                return Err(CompileError::parse(
                    format!("expected `option: parameters` but found `{}`", text),
                    line,
                    1,
                ));
            };
            let name = name.trim();
            if !is_ident(name) {
                return Err(CompileError::parse(
                    format!("invalid option name `{}`", name),
                    line,
                    1,
                ));
            }
            block
                .options
                .push((name.to_string(), params.trim().to_string(), line));
        } else if text.ends_with('{') {
            open = Some(parse_header(text, line)?);
        } else if let Some(var) = parse_variable(text, line)? {
            doc.variables.push(var);
        } else {
            return Err(CompileError::parse(
                format!("unexpected `{}`", text),
                line,
                1,
            ));
        }
    }
    if let Some(block) = open {
        return Err(CompileError::parse(
            format!("block `{}` opened on line {} is never closed", block.kind, block.line),
            last_line,
            1,
        ));
    }
    Ok(doc)
}

fn compile_material(block: &Block, variables: &VariableContainer) -> Result<GraphMaterial, CompileError> {
    let name = block.name.clone().ok_or_else(|| {
        CompileError::parse("materials need a quoted name", block.line, block.kind.len() + 1)
    })?;
    let mut options = vec![];
    for (option, params, line) in &block.options {
        let (key, ty) = Material::OPTIONS
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(option))
            .ok_or_else(|| CompileError::UnknownOption {
                node: format!("Material \"{}\"", name),
                option: option.clone(),
            })?;
        let v = Value::from_parameters(*ty, params, variables).map_err(|e| at_line(e, *line))?;
        options.push((*key, value::handle(v)));
    }
    Ok(GraphMaterial { name, options })
}

/// Compiles a whole script. Nothing is kept if any part fails.
pub fn compile(source: &str, registry: &NodeRegistry) -> Result<SceneGraph, CompileError> {
    let doc = parse_document(source)?;

    let mut variables = VariableContainer::new();
    for var in &doc.variables {
        let v = Value::from_parameters(var.ty, &var.params, &variables)
            .map_err(|e| at_line(e, var.line))?;
        if var.constant {
            variables.declare_constant(var.name.as_str(), v);
        } else {
            variables.declare(var.name.as_str(), v);
        }
    }

    let mut materials = MaterialLibrary::default();
    for block in doc.blocks.iter().filter(|b| b.kind == "Material") {
        let mat = compile_material(block, &variables)?;
        if materials.find(&mat.name).is_some() {
            log::warn!("material `{}` declared twice, the first one is used", mat.name);
        }
        materials.add(mat);
    }

    let mut nodes = vec![];
    for block in doc.blocks.iter().filter(|b| b.kind != "Material") {
        let desc = registry
            .get(&block.kind)
            .ok_or_else(|| CompileError::UnknownNode(block.kind.clone()))?;
        let given: Vec<(String, String)> = block
            .options
            .iter()
            .map(|(n, p, _)| (n.clone(), p.clone()))
            .collect();
        let opts = NodeOptions::compile(desc, &given, &variables, &materials)
            .map_err(|e| at_line(e, block.line))?;
        nodes.push((desc.build)(&opts)?);
    }
    log::debug!(
        "compiled graph: {} nodes, {} materials",
        nodes.len(),
        materials.len()
    );
    Ok(SceneGraph {
        nodes,
        materials,
        variables,
        source: source.to_string(),
    })
}

/// Rewrites `option` of the first `node` block to `params`, appending the line
/// when the block does not set it yet. `None` if there is no such block.
pub fn replace_option(source: &str, node: &str, option: &str, params: &str) -> Option<String> {
    let lines: Vec<&str> = source.lines().collect();
    let start = lines.iter().position(|l| {
        let t = l.trim();
        t.ends_with('{') && split_header(t).0 == node
    })?;
    let end = start + lines[start..].iter().position(|l| l.trim() == "}")?;

    let mut out: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    let existing = (start + 1..end).find(|&i| {
        lines[i]
            .trim()
            .split_once(':')
            .map_or(false, |(n, _)| n.trim().eq_ignore_ascii_case(option))
    });
    match existing {
        Some(i) => {
            let indent = &lines[i][..lines[i].len() - lines[i].trim_start().len()];
            let name = lines[i].trim().split_once(':').map_or(option, |(n, _)| n.trim());
            out[i] = format!("{}{}: {}", indent, name, params);
        }
        None => out.insert(end, format!("    {}: {}", option, params)),
    }
    let mut text = out.join("\n");
    if source.ends_with('\n') {
        text.push('\n');
    }
    Some(text)
}
