// renderer/light_manager.rs
//! Frame-local light registries and light-group subdivision.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::light_group::{LightCategory, LightGroup, LIGHT_CATEGORY_COUNT};
use super::lights::{AmbientLight, DirectionalLight, Light, PointLight, SpotLight};
use super::visibility::ObjectId;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SubdivideOptions: u32 {
        /// Demote shadow lights to their plain category; the output never
        /// samples shadow maps.
        const CONVERT_SHADOW_LIGHTS = 1 << 0;
    }
}

/// Maximum lights of each category shaded by a single pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightBudget {
    pub ambient: u16,
    pub directional: u16,
    pub point: u16,
    pub spot: u16,
    pub shadow_directional: u16,
    pub shadow_point: u16,
    pub shadow_spot: u16,
}

impl Default for LightBudget {
    fn default() -> Self {
        Self {
            ambient: 4,
            directional: 4,
            point: 4,
            spot: 4,
            shadow_directional: 1,
            shadow_point: 1,
            shadow_spot: 1,
        }
    }
}

impl LightBudget {
    pub fn uniform(per_pass: u16) -> Self {
        Self {
            ambient: per_pass,
            directional: per_pass,
            point: per_pass,
            spot: per_pass,
            shadow_directional: per_pass,
            shadow_point: per_pass,
            shadow_spot: per_pass,
        }
    }

    /// Never zero, so subdivision always makes progress.
    pub fn per_pass(&self, category: LightCategory) -> usize {
        let budget = match category {
            LightCategory::Ambient => self.ambient,
            LightCategory::Directional => self.directional,
            LightCategory::Point => self.point,
            LightCategory::Spot => self.spot,
            LightCategory::ShadowDirectional => self.shadow_directional,
            LightCategory::ShadowPoint => self.shadow_point,
            LightCategory::ShadowSpot => self.shadow_spot,
        };
        usize::from(budget.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisteredLight {
    pub node: ObjectId,
    pub light: Light,
    pub category: LightCategory,
    /// Position in the light's shadow registry; doubles as its shadow map slot.
    pub shadow_slot: Option<u32>,
    pub touched_objects: u32,
}

impl RegisteredLight {
    pub fn is_touching_anything(&self) -> bool {
        self.touched_objects > 0
    }
}

/// Every light visible this frame, indexed by the `u32` values stored in
/// light groups. Cleared and repopulated each frame.
#[derive(Debug, Default)]
pub struct LightManager {
    lights: Vec<RegisteredLight>,
    registries: [Vec<u32>; LIGHT_CATEGORY_COUNT],
    budget: LightBudget,
}

impl LightManager {
    pub fn new(budget: LightBudget) -> Self {
        Self {
            budget,
            ..Self::default()
        }
    }

    pub fn budget(&self) -> LightBudget {
        self.budget
    }

    pub fn set_budget(&mut self, budget: LightBudget) {
        self.budget = budget;
    }

    pub fn clear(&mut self) {
        self.lights.clear();
        for registry in &mut self.registries {
            registry.clear();
        }
    }

    pub fn add_light(&mut self, node: ObjectId, light: Light) -> u32 {
        let index = self.lights.len() as u32;
        let category = light.category();
        let registry = &mut self.registries[category.index()];
        let shadow_slot = category.is_shadow().then_some(registry.len() as u32);
        registry.push(index);
        self.lights.push(RegisteredLight {
            node,
            light,
            category,
            shadow_slot,
            touched_objects: 0,
        });
        index
    }

    pub fn add_ambient_light(&mut self, node: ObjectId, light: AmbientLight) -> u32 {
        self.add_light(node, Light::ambient(light))
    }

    pub fn add_directional_light(
        &mut self,
        node: ObjectId,
        light: DirectionalLight,
        casts_shadows: bool,
    ) -> u32 {
        self.add_light(node, Light::directional(light, casts_shadows))
    }

    pub fn add_point_light(
        &mut self,
        node: ObjectId,
        light: PointLight,
        casts_shadows: bool,
    ) -> u32 {
        self.add_light(node, Light::point(light, casts_shadows))
    }

    pub fn add_spot_light(&mut self, node: ObjectId, light: SpotLight, casts_shadows: bool) -> u32 {
        self.add_light(node, Light::spot(light, casts_shadows))
    }

    pub fn light(&self, index: u32) -> Option<&RegisteredLight> {
        self.lights.get(index as usize)
    }

    pub fn lights(&self) -> &[RegisteredLight] {
        &self.lights
    }

    pub(crate) fn mark_touched(&mut self, index: u32) {
        if let Some(light) = self.lights.get_mut(index as usize) {
            light.touched_objects += 1;
        }
    }

    pub fn registry(&self, category: LightCategory) -> &[u32] {
        &self.registries[category.index()]
    }

    pub fn total_light_count(&self) -> usize {
        self.registries.iter().map(Vec::len).sum()
    }

    /// Largest number of shadow casters registered in any one category.
    pub fn max_shadow_casters_per_category(&self) -> usize {
        LightCategory::ALL
            .iter()
            .filter(|category| category.is_shadow())
            .map(|&category| self.registry(category).len())
            .max()
            .unwrap_or(0)
    }

    /// Shadow casters of `category` that reach at least one visible object.
    pub fn active_shadow_casters(
        &self,
        category: LightCategory,
    ) -> impl Iterator<Item = (u32, &RegisteredLight)> + '_ {
        self.registry(category)
            .iter()
            .map(move |&index| (index, &self.lights[index as usize]))
            .filter(|(_, light)| light.is_touching_anything())
    }

    /// True when every registry fits one pass of the budget, both as
    /// registered and with shadow lights folded into their plain category.
    pub fn fits_single_pass(&self) -> bool {
        let mut converted = [0usize; LIGHT_CATEGORY_COUNT];
        for category in LightCategory::ALL {
            let count = self.registry(category).len();
            if count > self.budget.per_pass(category) {
                return false;
            }
            converted[category.without_shadow().index()] += count;
        }
        LightCategory::ALL
            .iter()
            .all(|&category| converted[category.index()] <= self.budget.per_pass(category))
    }

    pub fn subdivide_light_group(
        &self,
        source: &LightGroup,
        output: &mut Vec<LightGroup>,
        options: SubdivideOptions,
    ) -> usize {
        subdivide_light_group(source, &self.budget, options, output)
    }
}

/// Splits `source` into groups that each fit `budget`, appending them to
/// `output`. Group *k* holds the *k*-th chunk of every category, so lights
/// keep their source order within a category. Returns the number of groups
/// produced; an empty source produces none.
pub fn subdivide_light_group(
    source: &LightGroup,
    budget: &LightBudget,
    options: SubdivideOptions,
    output: &mut Vec<LightGroup>,
) -> usize {
    if source.is_empty() {
        return 0;
    }

    let convert = options.contains(SubdivideOptions::CONVERT_SHADOW_LIGHTS);
    let mut runs: [Vec<u32>; LIGHT_CATEGORY_COUNT] = Default::default();
    for category in LightCategory::ALL {
        let target = if convert {
            category.without_shadow()
        } else {
            category
        };
        runs[target.index()].extend_from_slice(source.lights(category));
    }

    let pass_count = LightCategory::ALL
        .iter()
        .map(|&category| {
            runs[category.index()]
                .len()
                .div_ceil(budget.per_pass(category))
        })
        .max()
        .unwrap_or(0);

    for pass in 0..pass_count {
        let mut group = LightGroup::new();
        for category in LightCategory::ALL {
            let per_pass = budget.per_pass(category);
            for &index in runs[category.index()].iter().skip(pass * per_pass).take(per_pass) {
                group.add_light(category, index);
            }
        }
        output.push(group);
    }
    pass_count
}
