// renderer/material_shader.rs
//! Shader variants per material definition.
//!
//! A variant is identified by the light-group shape it shades plus a few
//! material flags. Variants are compiled on first use and live until their
//! definition is reloaded or deleted.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use bitflags::bitflags;

use super::device::{RenderDevice, ShaderProgramId};
use super::light_group::{LightCategory, LightGroupId};
use super::material::{
    MaterialDefinition, MaterialDefinitionKey, MaterialEvent, MaterialKey, MaterialLibrary,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct MaterialShaderFlags: u32 {
        /// Emissive/base terms are written; unset for additive light passes.
        const INCLUDE_MATERIAL_PASS = 1 << 0;
        const NO_NORMAL_MAPPING = 1 << 1;
        const LIGHTING_FROM_TEXTURES = 1 << 2;

        const DEFINITION_FLAGS =
            Self::NO_NORMAL_MAPPING.bits() | Self::LIGHTING_FROM_TEXTURES.bits();
    }
}

/// Cache key: light-group shape first, flags second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MaterialShaderId {
    pub light_group: LightGroupId,
    pub flags: MaterialShaderFlags,
}

impl MaterialShaderId {
    pub fn new(light_group: LightGroupId, flags: MaterialShaderFlags) -> Self {
        Self { light_group, flags }
    }

    pub fn label(&self, definition_name: &str) -> String {
        let counts = self.light_group.counts();
        format!(
            "{definition_name}[a{}d{}p{}s{}D{}P{}S{}|{:#x}]",
            counts[0],
            counts[1],
            counts[2],
            counts[3],
            counts[4],
            counts[5],
            counts[6],
            self.flags.bits()
        )
    }
}

/// Produces shader source for one variant of a material definition.
pub trait ShaderBuilder {
    fn build_material_shader(&self, id: &MaterialShaderId, definition: &MaterialDefinition)
        -> String;
}

/// Emits WGSL: variant constants, the shared lighting prelude, then the
/// definition's surface body.
#[derive(Debug, Default, Clone, Copy)]
pub struct WgslShaderBuilder;

impl ShaderBuilder for WgslShaderBuilder {
    fn build_material_shader(
        &self,
        id: &MaterialShaderId,
        definition: &MaterialDefinition,
    ) -> String {
        let mut source = String::with_capacity(
            LIGHTING_PRELUDE.len() + definition.source.len() + 512,
        );
        let _ = writeln!(source, "// {}", id.label(&definition.name));
        for category in LightCategory::ALL {
            let _ = writeln!(
                source,
                "const {}_LIGHT_COUNT: u32 = {}u;",
                category.name().to_uppercase(),
                id.light_group.count(category)
            );
        }
        for (name, flag) in [
            ("INCLUDE_MATERIAL_PASS", MaterialShaderFlags::INCLUDE_MATERIAL_PASS),
            ("NO_NORMAL_MAPPING", MaterialShaderFlags::NO_NORMAL_MAPPING),
            ("LIGHTING_FROM_TEXTURES", MaterialShaderFlags::LIGHTING_FROM_TEXTURES),
        ] {
            let _ = writeln!(source, "const {name}: bool = {};", id.flags.contains(flag));
        }
        source.push_str(LIGHTING_PRELUDE);
        source.push('\n');
        source.push_str(&definition.source);
        source
    }
}

const LIGHTING_PRELUDE: &str = include_str!("../shader/lighting.wgsl");

/// Compiled variants of one material definition.
#[derive(Debug, Default)]
pub struct MaterialShaderCache {
    programs: BTreeMap<MaterialShaderId, ShaderProgramId>,
}

impl MaterialShaderCache {
    pub fn get(&self, id: &MaterialShaderId) -> Option<ShaderProgramId> {
        self.programs.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &MaterialShaderId> {
        self.programs.keys()
    }

    fn destroy(self, device: &mut dyn RenderDevice) -> usize {
        let count = self.programs.len();
        for program in self.programs.into_values() {
            device.destroy_shader(program);
        }
        count
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShaderCacheStats {
    pub hits: u32,
    pub misses: u32,
}

/// One [`MaterialShaderCache`] per material definition, created on demand.
#[derive(Debug, Default)]
pub struct MaterialShaderCaches {
    caches: HashMap<MaterialDefinitionKey, MaterialShaderCache>,
    stats: ShaderCacheStats,
}

impl MaterialShaderCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// The definition's own flags are folded into `flags` before lookup, so
    /// callers only pass per-pass flags. Compilation failure is fatal.
    pub fn get_material_shader(
        &mut self,
        device: &mut dyn RenderDevice,
        library: &MaterialLibrary,
        builder: &dyn ShaderBuilder,
        material: MaterialKey,
        light_group: LightGroupId,
        flags: MaterialShaderFlags,
    ) -> ShaderProgramId {
        let (material, definition) = library.resolve(material);
        let id = MaterialShaderId::new(light_group, flags | definition.shader_flags);

        let cache = self.caches.entry(material.definition).or_default();
        if let Some(program) = cache.get(&id) {
            self.stats.hits += 1;
            return program;
        }

        let label = id.label(&definition.name);
        let source = builder.build_material_shader(&id, definition);
        let program = match device.compile_shader(&label, &source) {
            Ok(program) => program,
            Err(err) => {
                log::error!("Material shader compilation failed: {err}");
                panic!("material shader {label} failed to compile: {err}");
            }
        };
        log::debug!("Compiled material shader {label}");
        cache.programs.insert(id, program);
        self.stats.misses += 1;
        program
    }

    pub fn cache(&self, definition: MaterialDefinitionKey) -> Option<&MaterialShaderCache> {
        self.caches.get(&definition)
    }

    /// Drops every variant of `definition`. Returns how many programs were destroyed.
    pub fn invalidate(
        &mut self,
        device: &mut dyn RenderDevice,
        definition: MaterialDefinitionKey,
    ) -> usize {
        match self.caches.remove(&definition) {
            Some(cache) => {
                let destroyed = cache.destroy(device);
                log::info!(
                    "Invalidated {} shader variant(s) of material definition {:?}",
                    destroyed,
                    definition
                );
                destroyed
            }
            None => 0,
        }
    }

    pub fn handle_event(&mut self, device: &mut dyn RenderDevice, event: MaterialEvent) -> usize {
        self.invalidate(device, event.definition())
    }

    pub fn clear(&mut self, device: &mut dyn RenderDevice) {
        for (_, cache) in self.caches.drain() {
            cache.destroy(device);
        }
    }

    pub fn variant_count(&self) -> usize {
        self.caches.values().map(MaterialShaderCache::len).sum()
    }

    pub fn stats(&self) -> ShaderCacheStats {
        self.stats
    }

    pub fn take_stats(&mut self) -> ShaderCacheStats {
        std::mem::take(&mut self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::material::{Material, MaterialDefinition};
    use crate::renderer::recording::RecordingDevice;

    fn setup() -> (MaterialLibrary, MaterialDefinitionKey, MaterialKey) {
        let mut library = MaterialLibrary::new();
        let definition = library.add_definition(MaterialDefinition::new("Lit", "// surface"));
        let material = library.add_material(Material::new(definition));
        (library, definition, material)
    }

    #[test]
    fn identical_requests_share_one_program() {
        let (library, _, material) = setup();
        let mut device = RecordingDevice::new();
        let mut caches = MaterialShaderCaches::new();
        let mut id = LightGroupId::default();
        id.add_point_light();

        let first = caches.get_material_shader(
            &mut device,
            &library,
            &WgslShaderBuilder,
            material,
            id,
            MaterialShaderFlags::INCLUDE_MATERIAL_PASS,
        );
        let second = caches.get_material_shader(
            &mut device,
            &library,
            &WgslShaderBuilder,
            material,
            id,
            MaterialShaderFlags::INCLUDE_MATERIAL_PASS,
        );
        assert_eq!(first, second);
        assert_eq!(device.compile_count(), 1);
        assert_eq!(caches.stats(), ShaderCacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn flags_split_variants() {
        let (library, definition, material) = setup();
        let mut device = RecordingDevice::new();
        let mut caches = MaterialShaderCaches::new();
        let id = LightGroupId::default();

        let base = caches.get_material_shader(
            &mut device,
            &library,
            &WgslShaderBuilder,
            material,
            id,
            MaterialShaderFlags::INCLUDE_MATERIAL_PASS,
        );
        let additive = caches.get_material_shader(
            &mut device,
            &library,
            &WgslShaderBuilder,
            material,
            id,
            MaterialShaderFlags::empty(),
        );
        assert_ne!(base, additive);
        assert_eq!(caches.cache(definition).map(MaterialShaderCache::len), Some(2));
    }

    #[test]
    fn generated_source_declares_variant_constants() {
        let definition = MaterialDefinition::new("Lit", "fn surface() {}")
            .with_shader_flags(MaterialShaderFlags::NO_NORMAL_MAPPING);
        let id = MaterialShaderId::new(
            LightGroupId::from_counts([1, 0, 3, 0, 0, 1, 0]),
            MaterialShaderFlags::INCLUDE_MATERIAL_PASS | definition.shader_flags,
        );
        let source = WgslShaderBuilder.build_material_shader(&id, &definition);
        assert!(source.contains("const POINT_LIGHT_COUNT: u32 = 3u;"));
        assert!(source.contains("const SHADOW_POINT_LIGHT_COUNT: u32 = 1u;"));
        assert!(source.contains("const NO_NORMAL_MAPPING: bool = true;"));
        assert!(source.contains("const LIGHTING_FROM_TEXTURES: bool = false;"));
        assert!(source.ends_with("fn surface() {}"));
    }

    #[test]
    fn invalidation_destroys_programs() {
        let (library, definition, material) = setup();
        let mut device = RecordingDevice::new();
        let mut caches = MaterialShaderCaches::new();

        caches.get_material_shader(
            &mut device,
            &library,
            &WgslShaderBuilder,
            material,
            LightGroupId::default(),
            MaterialShaderFlags::empty(),
        );
        assert_eq!(device.live_shader_count(), 1);
        assert_eq!(caches.invalidate(&mut device, definition), 1);
        assert_eq!(device.live_shader_count(), 0);
        assert!(caches.cache(definition).is_none());
        assert_eq!(caches.invalidate(&mut device, definition), 0);
    }

    #[test]
    #[should_panic(expected = "failed to compile")]
    fn compile_failure_is_fatal() {
        let (library, _, material) = setup();
        let mut device = RecordingDevice::new();
        device.fail_compilation_of("Lit");
        let mut caches = MaterialShaderCaches::new();
        caches.get_material_shader(
            &mut device,
            &library,
            &WgslShaderBuilder,
            material,
            LightGroupId::default(),
            MaterialShaderFlags::empty(),
        );
    }
}
