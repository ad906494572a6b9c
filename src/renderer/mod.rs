pub mod camera;
pub mod device;
pub mod light_group;
pub mod light_manager;
pub mod lights;
pub mod material;
pub mod material_shader;
pub mod pipeline;
pub mod recording;
pub mod scene_renderer;
pub mod targets;
pub mod utility_shaders;
pub mod visibility;

pub use camera::{BoundingSphere, CameraUniform, Frustum};
pub use device::{
    ClearFlags, DeviceError, FramebufferDesc, FramebufferId, MeshHandle, RenderDevice,
    RenderState, RenderTarget, ShaderProgramId, TextureFormat, TextureId, UniformValue,
};
pub use light_group::{LightCategory, LightGroup, LightGroupId};
pub use light_manager::{LightBudget, LightManager, SubdivideOptions};
pub use lights::{
    AmbientLight, DirectionalLight, Light, LightKind, LightVolume, PointLight, SpotLight,
};
pub use material::{
    Material, MaterialDefinition, MaterialDefinitionKey, MaterialEvent, MaterialKey,
    MaterialLibrary, TransparencyMode,
};
pub use material_shader::{
    MaterialShaderCaches, MaterialShaderFlags, MaterialShaderId, ShaderBuilder, ShaderCacheStats,
    WgslShaderBuilder,
};
pub use pipeline::{FrameStage, FrameStats, PipelineKind};
pub use recording::{DeviceCommand, RecordingDevice};
pub use scene_renderer::{RendererContext, SceneRenderer, Viewport, ViewportId};
pub use visibility::{MeshInstance, ObjectId, SceneCulling, VisibilityCallback, VisibleSet};
