//! Persisted modeling entities: objects own a stack of commands, each command
//! adds or subtracts a primitive.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bsdf::Material;
use crate::error::ModelError;
use crate::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Geometry,
    Brush,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    None,
    Add,
    Subtract,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    Sphere,
    Box,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataEntity {
    pub name: String,
    pub ty: ValueType,
    pub value: Vec4,
}

/// Named numeric parameters of a command, e.g. `position` and `size`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandData {
    pub entities: Vec<DataEntity>,
}

impl CommandData {
    pub fn new(entities: Vec<DataEntity>) -> Self {
        Self { entities }
    }
    pub fn float1(name: &str, v: f32) -> DataEntity {
        DataEntity {
            name: name.to_string(),
            ty: ValueType::Float1,
            value: Vec4::new(v, 0.0, 0.0, 0.0),
        }
    }
    pub fn float3(name: &str, v: Vec3) -> DataEntity {
        DataEntity {
            name: name.to_string(),
            ty: ValueType::Float3,
            value: v.extend(0.0),
        }
    }
    pub fn get(&self, name: &str) -> Option<&DataEntity> {
        self.entities.iter().find(|e| e.name == name)
    }
    pub fn get_f32(&self, name: &str) -> Option<f32> {
        self.get(name).map(|e| e.value.x)
    }
    pub fn get_vec3(&self, name: &str) -> Option<Vec3> {
        self.get(name).map(|e| e.value.xyz())
    }
    /// Overwrites an existing entity of the same name or appends a new one.
    pub fn set(&mut self, entity: DataEntity) {
        match self.entities.iter_mut().find(|e| e.name == entity.name) {
            Some(e) => *e = entity,
            None => self.entities.push(entity),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    pub action: Action,
    pub primitive: Primitive,
    pub data: CommandData,
    pub material: Material,
    pub code: String,
    pub sub_commands: Vec<Command>,
}

impl Default for Command {
    fn default() -> Self {
        Self::new("Unnamed", Role::Geometry, Action::Add, Primitive::Box, CommandData::default())
    }
}

impl Command {
    pub fn new(
        name: impl Into<String>,
        role: Role,
        action: Action,
        primitive: Primitive,
        data: CommandData,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            role,
            action,
            primitive,
            data,
            material: Material::default(),
            code: String::new(),
            sub_commands: vec![],
        }
    }

    /// The box every new object starts with.
    pub fn base_box() -> Self {
        Self::new(
            "Base Box",
            Role::Geometry,
            Action::Add,
            Primitive::Box,
            CommandData::new(vec![
                CommandData::float3("position", vec3(0.0, -0.9, 0.0)),
                CommandData::float3("size", Vec3::splat(0.5)),
            ]),
        )
    }

    /// Deep copy under a fresh identifier. Sub commands keep their ids.
    pub fn copy(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            ..self.clone()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Object {
    pub id: Uuid,
    pub name: String,
    pub children: Vec<Object>,
    pub commands: Vec<Command>,
}

impl Default for Object {
    fn default() -> Self {
        Self::new("Unnamed")
    }
}

impl Object {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            children: vec![],
            commands: vec![Command::base_box()],
        }
    }

    /// Commands of this object followed by those of its children, depth first.
    pub fn flatten_commands(&self) -> Vec<&Command> {
        let mut out: Vec<&Command> = self.commands.iter().collect();
        for child in &self.children {
            out.extend(child.flatten_commands());
        }
        out
    }

    pub fn to_json(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
    pub fn from_json(s: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(s)?)
    }
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}
