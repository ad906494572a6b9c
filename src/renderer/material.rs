// renderer/material.rs
use slotmap::{new_key_type, SlotMap};

use super::device::{TextureId, UniformValue};
use super::material_shader::MaterialShaderFlags;

new_key_type! {
    pub struct MaterialDefinitionKey;
    pub struct MaterialKey;
}

/// How a material's meshes are bucketed for drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransparencyMode {
    #[default]
    Opaque,
    /// Opaque, but drawn after the regular opaque bucket (decals, skin over props).
    OpaqueDrawLast,
    Blended,
    /// Samples the scene color behind it.
    Refractive,
}

impl TransparencyMode {
    pub fn is_transparent(self) -> bool {
        matches!(self, Self::Blended | Self::Refractive)
    }
}

/// Shader template plus the state shared by every material built from it.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialDefinition {
    pub name: String,
    /// Surface function body appended after the generated lighting prelude.
    pub source: String,
    pub transparency: TransparencyMode,
    /// Only `NO_NORMAL_MAPPING` and `LIGHTING_FROM_TEXTURES` are meaningful here.
    pub shader_flags: MaterialShaderFlags,
    pub casts_shadows: bool,
}

impl MaterialDefinition {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            transparency: TransparencyMode::Opaque,
            shader_flags: MaterialShaderFlags::empty(),
            casts_shadows: true,
        }
    }

    pub fn with_transparency(mut self, transparency: TransparencyMode) -> Self {
        self.transparency = transparency;
        if transparency.is_transparent() {
            self.casts_shadows = false;
        }
        self
    }

    pub fn with_shader_flags(mut self, flags: MaterialShaderFlags) -> Self {
        self.shader_flags = flags & MaterialShaderFlags::DEFINITION_FLAGS;
        self
    }

    pub fn with_shadows(mut self, casts_shadows: bool) -> Self {
        self.casts_shadows = casts_shadows;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialParameter {
    pub name: String,
    pub value: UniformValue,
}

/// An instance of a definition with its own parameter values.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub definition: MaterialDefinitionKey,
    pub parameters: Vec<MaterialParameter>,
    pub textures: Vec<TextureId>,
}

impl Material {
    pub fn new(definition: MaterialDefinitionKey) -> Self {
        Self {
            definition,
            parameters: Vec::new(),
            textures: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: UniformValue) -> Self {
        self.parameters.push(MaterialParameter {
            name: name.into(),
            value,
        });
        self
    }

    pub fn with_texture(mut self, texture: TextureId) -> Self {
        self.textures.push(texture);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialEvent {
    DefinitionReloaded(MaterialDefinitionKey),
    DefinitionDeleted(MaterialDefinitionKey),
}

impl MaterialEvent {
    pub fn definition(self) -> MaterialDefinitionKey {
        match self {
            Self::DefinitionReloaded(key) | Self::DefinitionDeleted(key) => key,
        }
    }
}

/// Owns material definitions and materials and queues lifecycle events for
/// whoever caches data derived from a definition.
#[derive(Default)]
pub struct MaterialLibrary {
    definitions: SlotMap<MaterialDefinitionKey, MaterialDefinition>,
    materials: SlotMap<MaterialKey, Material>,
    events: Vec<MaterialEvent>,
}

impl MaterialLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_definition(&mut self, definition: MaterialDefinition) -> MaterialDefinitionKey {
        log::debug!("Registered material definition '{}'", definition.name);
        self.definitions.insert(definition)
    }

    /// Replaces the definition in place; materials keep pointing at it.
    pub fn reload_definition(
        &mut self,
        key: MaterialDefinitionKey,
        definition: MaterialDefinition,
    ) -> bool {
        let Some(slot) = self.definitions.get_mut(key) else {
            log::warn!("Reload requested for unknown material definition {:?}", key);
            return false;
        };
        log::info!("Reloaded material definition '{}'", definition.name);
        *slot = definition;
        self.events.push(MaterialEvent::DefinitionReloaded(key));
        true
    }

    /// Removes the definition and every material built from it.
    pub fn remove_definition(&mut self, key: MaterialDefinitionKey) -> Option<MaterialDefinition> {
        let definition = self.definitions.remove(key)?;
        self.materials
            .retain(|_, material| material.definition != key);
        log::info!("Deleted material definition '{}'", definition.name);
        self.events.push(MaterialEvent::DefinitionDeleted(key));
        Some(definition)
    }

    pub fn definition(&self, key: MaterialDefinitionKey) -> Option<&MaterialDefinition> {
        self.definitions.get(key)
    }

    pub fn add_material(&mut self, material: Material) -> MaterialKey {
        debug_assert!(
            self.definitions.contains_key(material.definition),
            "material refers to an unknown definition"
        );
        self.materials.insert(material)
    }

    pub fn material(&self, key: MaterialKey) -> Option<&Material> {
        self.materials.get(key)
    }

    pub fn material_mut(&mut self, key: MaterialKey) -> Option<&mut Material> {
        self.materials.get_mut(key)
    }

    pub fn remove_material(&mut self, key: MaterialKey) -> Option<Material> {
        self.materials.remove(key)
    }

    /// Material and its definition. Rendering a material without a live
    /// definition is an authoring error.
    pub fn resolve(&self, key: MaterialKey) -> (&Material, &MaterialDefinition) {
        let Some(material) = self.materials.get(key) else {
            log::error!("Material {:?} is not registered", key);
            panic!("material {key:?} is not registered");
        };
        let Some(definition) = self.definitions.get(material.definition) else {
            log::error!(
                "Material {:?} refers to missing definition {:?}",
                key,
                material.definition
            );
            panic!("material {key:?} refers to a missing definition");
        };
        (material, definition)
    }

    pub fn has_pending_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn drain_events(&mut self) -> Vec<MaterialEvent> {
        std::mem::take(&mut self.events)
    }
}
