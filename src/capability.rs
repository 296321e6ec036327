//! Capability descriptions queried from adapters.
//!
//! Older API levels report features through a single fixed-layout struct of
//! boolean flags ([`FlatFeatures`]). Newer levels report them through an
//! extensible chain of typed blocks ([`CapabilityChain`]): callers append
//! the block kinds they care about before querying, and the query fills each
//! block in place, so new capability categories can be added without
//! touching the layout of existing ones.
//!
//! Which representation a negotiation runs against is decided once per run
//! by [`CapabilityMode`]. Everything downstream reads the mode-agnostic
//! [`Capabilities`] view and never learns which representation is active.

/// Features that optionally can be supported by devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum Feature {
    SamplerAnisotropy,
    GeometryShader,
    TessellationShader,
    FillModeNonSolid,
    WideLines,
    BufferDeviceAddress,
    RayTracingPipeline,
    AccelerationStructure,
    ScalarBlockLayout,
    RuntimeDescriptorArray,
    DescriptorBindingPartiallyBound,
}

impl Feature {
    pub const ALL: [Feature; 11] = [
        Feature::SamplerAnisotropy,
        Feature::GeometryShader,
        Feature::TessellationShader,
        Feature::FillModeNonSolid,
        Feature::WideLines,
        Feature::BufferDeviceAddress,
        Feature::RayTracingPipeline,
        Feature::AccelerationStructure,
        Feature::ScalarBlockLayout,
        Feature::RuntimeDescriptorArray,
        Feature::DescriptorBindingPartiallyBound,
    ];

    /// The chain block this feature is reported through.
    pub fn block_kind(&self) -> CapabilityBlockKind {
        match self {
            Feature::SamplerAnisotropy
            | Feature::GeometryShader
            | Feature::TessellationShader
            | Feature::FillModeNonSolid
            | Feature::WideLines => CapabilityBlockKind::Core,
            Feature::BufferDeviceAddress => CapabilityBlockKind::DeviceAddress,
            Feature::RayTracingPipeline | Feature::AccelerationStructure => {
                CapabilityBlockKind::RayTracing
            }
            Feature::ScalarBlockLayout => CapabilityBlockKind::ScalarLayout,
            Feature::RuntimeDescriptorArray
            | Feature::DescriptorBindingPartiallyBound => {
                CapabilityBlockKind::DescriptorIndexing
            }
        }
    }
}

/// Fixed-layout feature descriptor of older API levels.
///
/// Only core features are reachable through it; features introduced by later
/// API levels read as unsupported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct FlatFeatures {
    pub sampler_anisotropy: bool,
    pub geometry_shader: bool,
    pub tessellation_shader: bool,
    pub fill_mode_non_solid: bool,
    pub wide_lines: bool,
}

impl FlatFeatures {
    pub fn supports(&self, feature: Feature) -> bool {
        match feature {
            Feature::SamplerAnisotropy => self.sampler_anisotropy,
            Feature::GeometryShader => self.geometry_shader,
            Feature::TessellationShader => self.tessellation_shader,
            Feature::FillModeNonSolid => self.fill_mode_non_solid,
            Feature::WideLines => self.wide_lines,
            _ => false,
        }
    }

    /// Turns `feature` on. Returns `false` if the feature is not
    /// representable in the flat layout.
    pub fn enable(&mut self, feature: Feature) -> bool {
        match feature {
            Feature::SamplerAnisotropy => self.sampler_anisotropy = true,
            Feature::GeometryShader => self.geometry_shader = true,
            Feature::TessellationShader => self.tessellation_shader = true,
            Feature::FillModeNonSolid => self.fill_mode_non_solid = true,
            Feature::WideLines => self.wide_lines = true,
            _ => return false,
        }
        true
    }
}

/// Discriminant of a capability chain block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum CapabilityBlockKind {
    Core,
    DeviceAddress,
    RayTracing,
    ScalarLayout,
    DescriptorIndexing,
}

/// One typed block of an extensible capability chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum CapabilityBlock {
    Core(FlatFeatures),
    DeviceAddress {
        buffer_device_address: bool,
    },
    RayTracing {
        ray_tracing_pipeline: bool,
        acceleration_structure: bool,
    },
    ScalarLayout {
        scalar_block_layout: bool,
    },
    DescriptorIndexing {
        runtime_descriptor_array: bool,
        descriptor_binding_partially_bound: bool,
    },
}

impl CapabilityBlock {
    /// Block with every flag cleared, as appended to a query template.
    pub fn empty(kind: CapabilityBlockKind) -> Self {
        match kind {
            CapabilityBlockKind::Core => {
                CapabilityBlock::Core(FlatFeatures::default())
            }
            CapabilityBlockKind::DeviceAddress => {
                CapabilityBlock::DeviceAddress {
                    buffer_device_address: false,
                }
            }
            CapabilityBlockKind::RayTracing => CapabilityBlock::RayTracing {
                ray_tracing_pipeline: false,
                acceleration_structure: false,
            },
            CapabilityBlockKind::ScalarLayout => CapabilityBlock::ScalarLayout {
                scalar_block_layout: false,
            },
            CapabilityBlockKind::DescriptorIndexing => {
                CapabilityBlock::DescriptorIndexing {
                    runtime_descriptor_array: false,
                    descriptor_binding_partially_bound: false,
                }
            }
        }
    }

    pub fn kind(&self) -> CapabilityBlockKind {
        match self {
            CapabilityBlock::Core(_) => CapabilityBlockKind::Core,
            CapabilityBlock::DeviceAddress { .. } => {
                CapabilityBlockKind::DeviceAddress
            }
            CapabilityBlock::RayTracing { .. } => CapabilityBlockKind::RayTracing,
            CapabilityBlock::ScalarLayout { .. } => {
                CapabilityBlockKind::ScalarLayout
            }
            CapabilityBlock::DescriptorIndexing { .. } => {
                CapabilityBlockKind::DescriptorIndexing
            }
        }
    }

    pub fn supports(&self, feature: Feature) -> bool {
        match (self, feature) {
            (CapabilityBlock::Core(flat), _) => flat.supports(feature),
            (
                CapabilityBlock::DeviceAddress {
                    buffer_device_address,
                },
                Feature::BufferDeviceAddress,
            ) => *buffer_device_address,
            (
                CapabilityBlock::RayTracing {
                    ray_tracing_pipeline,
                    ..
                },
                Feature::RayTracingPipeline,
            ) => *ray_tracing_pipeline,
            (
                CapabilityBlock::RayTracing {
                    acceleration_structure,
                    ..
                },
                Feature::AccelerationStructure,
            ) => *acceleration_structure,
            (
                CapabilityBlock::ScalarLayout {
                    scalar_block_layout,
                },
                Feature::ScalarBlockLayout,
            ) => *scalar_block_layout,
            (
                CapabilityBlock::DescriptorIndexing {
                    runtime_descriptor_array,
                    ..
                },
                Feature::RuntimeDescriptorArray,
            ) => *runtime_descriptor_array,
            (
                CapabilityBlock::DescriptorIndexing {
                    descriptor_binding_partially_bound,
                    ..
                },
                Feature::DescriptorBindingPartiallyBound,
            ) => *descriptor_binding_partially_bound,
            _ => false,
        }
    }

    fn enable(&mut self, feature: Feature) -> bool {
        match (self, feature) {
            (CapabilityBlock::Core(flat), _) => flat.enable(feature),
            (
                CapabilityBlock::DeviceAddress {
                    buffer_device_address,
                },
                Feature::BufferDeviceAddress,
            ) => {
                *buffer_device_address = true;
                true
            }
            (
                CapabilityBlock::RayTracing {
                    ray_tracing_pipeline,
                    ..
                },
                Feature::RayTracingPipeline,
            ) => {
                *ray_tracing_pipeline = true;
                true
            }
            (
                CapabilityBlock::RayTracing {
                    acceleration_structure,
                    ..
                },
                Feature::AccelerationStructure,
            ) => {
                *acceleration_structure = true;
                true
            }
            (
                CapabilityBlock::ScalarLayout {
                    scalar_block_layout,
                },
                Feature::ScalarBlockLayout,
            ) => {
                *scalar_block_layout = true;
                true
            }
            (
                CapabilityBlock::DescriptorIndexing {
                    runtime_descriptor_array,
                    ..
                },
                Feature::RuntimeDescriptorArray,
            ) => {
                *runtime_descriptor_array = true;
                true
            }
            (
                CapabilityBlock::DescriptorIndexing {
                    descriptor_binding_partially_bound,
                    ..
                },
                Feature::DescriptorBindingPartiallyBound,
            ) => {
                *descriptor_binding_partially_bound = true;
                true
            }
            _ => false,
        }
    }
}

/// Extensible, walkable sequence of typed capability blocks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct CapabilityChain {
    blocks: Vec<CapabilityBlock>,
}

impl CapabilityChain {
    pub fn new() -> Self {
        CapabilityChain { blocks: Vec::new() }
    }

    /// Appends an empty block of `kind` unless one is already present.
    pub fn push(&mut self, kind: CapabilityBlockKind) {
        if self.get(kind).is_none() {
            self.blocks.push(CapabilityBlock::empty(kind));
        }
    }

    pub fn with(mut self, kind: CapabilityBlockKind) -> Self {
        self.push(kind);
        self
    }

    pub fn get(&self, kind: CapabilityBlockKind) -> Option<&CapabilityBlock> {
        self.blocks.iter().find(|block| block.kind() == kind)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &CapabilityBlock> {
        self.blocks.iter()
    }

    /// Walks blocks for in-place population during a query.
    pub fn blocks_mut(&mut self) -> impl Iterator<Item = &mut CapabilityBlock> {
        self.blocks.iter_mut()
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.blocks.iter().any(|block| block.supports(feature))
    }

    fn enable(&mut self, feature: Feature) -> bool {
        let kind = feature.block_kind();
        self.blocks
            .iter_mut()
            .find(|block| block.kind() == kind)
            .map_or(false, |block| block.enable(feature))
    }
}

/// Capability representation used for one negotiation run.
///
/// Chosen once per run; evaluators never observe it.
#[derive(Clone, Debug)]
pub enum CapabilityMode {
    /// Fixed-layout descriptor of an older API level.
    Flat,
    /// Chain template listing the blocks the caller cares about.
    /// The query populates a copy of the template per candidate.
    Chained(CapabilityChain),
}

impl Default for CapabilityMode {
    fn default() -> Self {
        CapabilityMode::Flat
    }
}

/// Queried (or negotiated) capability set of one device.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub enum Capabilities {
    Flat(FlatFeatures),
    Chained(CapabilityChain),
}

impl Capabilities {
    pub fn supports(&self, feature: Feature) -> bool {
        match self {
            Capabilities::Flat(flat) => flat.supports(feature),
            Capabilities::Chained(chain) => chain.supports(feature),
        }
    }

    /// Same representation with every flag cleared.
    pub fn none_like(&self) -> Self {
        match self {
            Capabilities::Flat(_) => {
                Capabilities::Flat(FlatFeatures::default())
            }
            Capabilities::Chained(chain) => {
                let blocks = chain
                    .blocks()
                    .map(|block| CapabilityBlock::empty(block.kind()))
                    .collect();
                Capabilities::Chained(CapabilityChain { blocks })
            }
        }
    }

    /// Turns `feature` on. Returns `false` if the active representation
    /// cannot express it (flat layout, or block absent from the chain).
    pub fn enable(&mut self, feature: Feature) -> bool {
        match self {
            Capabilities::Flat(flat) => flat.enable(feature),
            Capabilities::Chained(chain) => chain.enable(feature),
        }
    }

    pub fn is_subset_of(&self, other: &Capabilities) -> bool {
        Feature::ALL
            .iter()
            .all(|&feature| !self.supports(feature) || other.supports(feature))
    }

    pub fn enabled(&self) -> Vec<Feature> {
        Feature::ALL
            .iter()
            .copied()
            .filter(|&feature| self.supports(feature))
            .collect()
    }
}
