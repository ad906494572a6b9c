// renderer/visibility.rs
//! Turns one scene visibility query into draw buckets and per-object light groups.

use std::collections::{BTreeMap, HashMap};

use glam::{Mat4, Vec3};

use super::camera::{BoundingSphere, Frustum};
use super::device::MeshHandle;
use super::light_group::{LightCategory, LightGroup};
use super::light_manager::LightManager;
use super::lights::{AmbientLight, DirectionalLight, LightVolume, PointLight, SpotLight};
use super::material::{MaterialKey, MaterialLibrary, TransparencyMode};

/// Opaque reference to a scene node, handed out by the scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshInstance {
    pub mesh: MeshHandle,
    pub material: MaterialKey,
}

#[derive(Debug, Clone, Copy)]
pub struct ModelNode<'a> {
    pub id: ObjectId,
    pub transform: Mat4,
    pub bounds: BoundingSphere,
    pub meshes: &'a [MeshInstance],
}

#[derive(Debug, Clone, Copy)]
pub struct ParticleSystemNode {
    pub id: ObjectId,
    pub transform: Mat4,
    pub bounds: BoundingSphere,
    pub mesh: MeshHandle,
    pub material: MaterialKey,
}

/// Hooks the scene graph calls for every visible node.
pub trait VisibilityCallback {
    fn process_model(&mut self, model: &ModelNode<'_>);
    fn process_particle_system(&mut self, system: &ParticleSystemNode);
    fn process_ambient_light(&mut self, node: ObjectId, light: &AmbientLight);
    fn process_directional_light(
        &mut self,
        node: ObjectId,
        light: &DirectionalLight,
        casts_shadows: bool,
    );
    fn process_point_light(&mut self, node: ObjectId, light: &PointLight, casts_shadows: bool);
    fn process_spot_light(&mut self, node: ObjectId, light: &SpotLight, casts_shadows: bool);
}

/// What the renderer needs from the scene graph / culling manager.
pub trait SceneCulling {
    fn query_visible(&self, frustum: &Frustum, callback: &mut dyn VisibilityCallback);
    /// Calls `visit` for every renderable object the volume reaches.
    fn query_contacts(&self, volume: &LightVolume, visit: &mut dyn FnMut(ObjectId));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibleObjectKind {
    Model,
    ParticleSystem,
}

#[derive(Debug, Clone)]
pub struct VisibleObject {
    pub id: ObjectId,
    pub kind: VisibleObjectKind,
    pub bounds: BoundingSphere,
    pub light_group: LightGroup,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshDraw {
    /// Slot in [`VisibleSet::objects`].
    pub object: usize,
    pub mesh: MeshHandle,
    pub material: MaterialKey,
    pub transform: Mat4,
    pub casts_shadows: bool,
    pub view_distance_sq: f32,
}

#[derive(Debug, Default)]
pub struct MeshBuckets {
    pub opaque: BTreeMap<MaterialKey, Vec<MeshDraw>>,
    pub opaque_draw_last: BTreeMap<MaterialKey, Vec<MeshDraw>>,
    /// Blended meshes, plus refractive ones when buckets are merged.
    pub transparent: Vec<MeshDraw>,
    pub refractive: Vec<MeshDraw>,
}

impl MeshBuckets {
    pub fn opaque_draws(&self) -> impl Iterator<Item = &MeshDraw> {
        self.opaque
            .values()
            .chain(self.opaque_draw_last.values())
            .flatten()
    }

    pub fn mesh_count(&self) -> usize {
        self.opaque_draws().count() + self.transparent.len() + self.refractive.len()
    }
}

/// Output of the visibility step for one viewport and frame.
#[derive(Debug)]
pub struct VisibleSet {
    pub view: Mat4,
    pub projection: Mat4,
    pub camera_position: Vec3,
    /// Where directional shadow maps are centred.
    pub shadow_focus: Vec3,
    pub buckets: MeshBuckets,
    pub objects: Vec<VisibleObject>,
    pub all_lights: LightGroup,
    lookup: HashMap<ObjectId, usize>,
}

impl VisibleSet {
    pub fn object(&self, id: ObjectId) -> Option<&VisibleObject> {
        self.lookup.get(&id).map(|&slot| &self.objects[slot])
    }

    pub fn light_group(&self, draw: &MeshDraw) -> &LightGroup {
        &self.objects[draw.object].light_group
    }
}

pub struct VisibilityProcessor<'a> {
    lights: &'a mut LightManager,
    materials: &'a MaterialLibrary,
    merge_transparent: bool,
    visible: VisibleSet,
}

impl<'a> VisibilityProcessor<'a> {
    pub fn new(
        lights: &'a mut LightManager,
        materials: &'a MaterialLibrary,
        view: Mat4,
        projection: Mat4,
        shadow_focus: Vec3,
        merge_transparent: bool,
    ) -> Self {
        let camera_position = view.inverse().transform_point3(Vec3::ZERO);
        Self {
            lights,
            materials,
            merge_transparent,
            visible: VisibleSet {
                view,
                projection,
                camera_position,
                shadow_focus,
                buckets: MeshBuckets::default(),
                objects: Vec::new(),
                all_lights: LightGroup::new(),
                lookup: HashMap::new(),
            },
        }
    }

    fn register_object(
        &mut self,
        id: ObjectId,
        kind: VisibleObjectKind,
        bounds: BoundingSphere,
    ) -> usize {
        if let Some(&slot) = self.visible.lookup.get(&id) {
            return slot;
        }
        let slot = self.visible.objects.len();
        self.visible.objects.push(VisibleObject {
            id,
            kind,
            bounds,
            light_group: LightGroup::new(),
        });
        self.visible.lookup.insert(id, slot);
        slot
    }

    fn bucket_mesh(&mut self, mut draw: MeshDraw, allow_shadows: bool) {
        let (_, definition) = self.materials.resolve(draw.material);
        draw.casts_shadows = allow_shadows && definition.casts_shadows;
        draw.view_distance_sq = draw
            .transform
            .transform_point3(Vec3::ZERO)
            .distance_squared(self.visible.camera_position);

        let buckets = &mut self.visible.buckets;
        match definition.transparency {
            TransparencyMode::Opaque => buckets.opaque.entry(draw.material).or_default().push(draw),
            TransparencyMode::OpaqueDrawLast => buckets
                .opaque_draw_last
                .entry(draw.material)
                .or_default()
                .push(draw),
            TransparencyMode::Blended => buckets.transparent.push(draw),
            TransparencyMode::Refractive if self.merge_transparent => {
                buckets.transparent.push(draw)
            }
            TransparencyMode::Refractive => buckets.refractive.push(draw),
        }
    }

    /// Assigns every registered light to the objects it reaches, one category
    /// at a time so light groups only ever grow at their tail.
    pub fn finish(mut self, scene: &dyn SceneCulling) -> VisibleSet {
        let mut touched: Vec<usize> = Vec::new();

        for category in LightCategory::ALL {
            let registry = self.lights.registry(category).to_vec();
            for light_index in registry {
                let Some(registered) = self.lights.light(light_index) else {
                    continue;
                };
                let volume = registered.light.influence();

                touched.clear();
                match volume {
                    LightVolume::Global => touched.extend(0..self.visible.objects.len()),
                    _ => {
                        let lookup = &self.visible.lookup;
                        scene.query_contacts(&volume, &mut |id| {
                            if let Some(&slot) = lookup.get(&id) {
                                touched.push(slot);
                            }
                        });
                        touched.sort_unstable();
                        touched.dedup();
                    }
                }

                for &slot in &touched {
                    self.visible.objects[slot]
                        .light_group
                        .add_light(category, light_index);
                    self.lights.mark_touched(light_index);
                }
                self.visible.all_lights.add_light(category, light_index);

                if touched.is_empty() {
                    log::trace!(
                        "{} light {} reaches no visible object",
                        category.name(),
                        light_index
                    );
                }
            }
        }

        let sort_back_to_front = |draws: &mut Vec<MeshDraw>| {
            draws.sort_by(|a, b| b.view_distance_sq.total_cmp(&a.view_distance_sq));
        };
        sort_back_to_front(&mut self.visible.buckets.transparent);
        sort_back_to_front(&mut self.visible.buckets.refractive);

        self.visible
    }
}

impl VisibilityCallback for VisibilityProcessor<'_> {
    fn process_model(&mut self, model: &ModelNode<'_>) {
        let slot = self.register_object(model.id, VisibleObjectKind::Model, model.bounds);
        for instance in model.meshes {
            self.bucket_mesh(
                MeshDraw {
                    object: slot,
                    mesh: instance.mesh,
                    material: instance.material,
                    transform: model.transform,
                    casts_shadows: false,
                    view_distance_sq: 0.0,
                },
                true,
            );
        }
    }

    fn process_particle_system(&mut self, system: &ParticleSystemNode) {
        let slot = self.register_object(
            system.id,
            VisibleObjectKind::ParticleSystem,
            system.bounds,
        );
        self.bucket_mesh(
            MeshDraw {
                object: slot,
                mesh: system.mesh,
                material: system.material,
                transform: system.transform,
                casts_shadows: false,
                view_distance_sq: 0.0,
            },
            false,
        );
    }

    fn process_ambient_light(&mut self, node: ObjectId, light: &AmbientLight) {
        self.lights.add_ambient_light(node, *light);
    }

    fn process_directional_light(
        &mut self,
        node: ObjectId,
        light: &DirectionalLight,
        casts_shadows: bool,
    ) {
        self.lights
            .add_directional_light(node, *light, casts_shadows);
    }

    fn process_point_light(&mut self, node: ObjectId, light: &PointLight, casts_shadows: bool) {
        self.lights.add_point_light(node, *light, casts_shadows);
    }

    fn process_spot_light(&mut self, node: ObjectId, light: &SpotLight, casts_shadows: bool) {
        self.lights.add_spot_light(node, *light, casts_shadows);
    }
}
