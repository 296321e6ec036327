//! In-memory platform used by the tests. Adapters, devices, queues and
//! pools are plain structs recording what happens to them into a shared
//! event log.

use crate::{
    capability::{CapabilityBlock, CapabilityChain, Feature, FlatFeatures},
    device::{CreateDeviceError, DeviceDescriptor, DeviceId, DeviceTrait},
    physical::{
        AdapterTrait, DeviceKind, DeviceProperties, EnumerateDeviceError,
        InstanceTrait,
    },
    pool::{CommandPoolTrait, PoolFlags},
    queue::{FamilyInfo, QueueCapabilityFlags, QueueTrait},
    surface::{RawWindowHandleKind, Surface, SurfaceError, SurfaceInfo},
    OutOfMemory,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared append-only log of platform events, in call order.
#[derive(Clone, Debug, Default)]
pub(crate) struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct TestFamily {
    pub capabilities: QueueCapabilityFlags,
    pub count: usize,
    pub presentation: bool,
}

impl TestFamily {
    pub fn graphics(count: usize) -> Self {
        TestFamily {
            capabilities: QueueCapabilityFlags::GRAPHICS,
            count,
            presentation: false,
        }
    }

    pub fn present_only(count: usize) -> Self {
        TestFamily {
            capabilities: QueueCapabilityFlags::empty(),
            count,
            presentation: true,
        }
    }

    pub fn graphics_present(count: usize) -> Self {
        TestFamily {
            capabilities: QueueCapabilityFlags::GRAPHICS,
            count,
            presentation: true,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct TestAdapter {
    pub name: String,
    pub kind: Option<DeviceKind>,
    pub max_sampler_anisotropy: f32,
    pub extensions: Vec<String>,
    pub features: Vec<Feature>,
    pub families: Vec<TestFamily>,
    pub fail_creation: bool,
    pub log: EventLog,
}

impl TestAdapter {
    pub fn named(name: &str) -> Self {
        TestAdapter {
            name: name.to_owned(),
            kind: None,
            max_sampler_anisotropy: 1.0,
            extensions: Vec::new(),
            features: Vec::new(),
            families: vec![TestFamily::graphics(1)],
            fail_creation: false,
            log: EventLog::default(),
        }
    }

    pub fn with_extension(mut self, name: &str) -> Self {
        self.extensions.push(name.to_owned());
        self
    }

    pub fn with_flat_feature(mut self, feature: Feature) -> Self {
        self.features.push(feature);
        self
    }

    pub fn with_chained_feature(mut self, feature: Feature) -> Self {
        self.features.push(feature);
        self
    }

    pub fn with_anisotropy(mut self, max: f32) -> Self {
        self.max_sampler_anisotropy = max;
        self
    }

    pub fn with_kind(mut self, kind: DeviceKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn failing_creation(mut self) -> Self {
        self.fail_creation = true;
        self
    }

    fn has(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }
}

impl AdapterTrait for TestAdapter {
    fn properties(&self) -> DeviceProperties {
        DeviceProperties {
            name: self.name.clone(),
            kind: self.kind,
            max_sampler_anisotropy: self.max_sampler_anisotropy,
            max_image_dimension_2d: 16384,
        }
    }

    fn extensions(&self) -> Vec<String> {
        self.extensions.clone()
    }

    fn flat_features(&self) -> FlatFeatures {
        let mut flat = FlatFeatures::default();
        for &feature in &self.features {
            let _ = flat.enable(feature);
        }
        flat
    }

    fn fill_capabilities(&self, chain: &mut CapabilityChain) {
        for block in chain.blocks_mut() {
            match block {
                CapabilityBlock::Core(flat) => {
                    for &feature in &self.features {
                        let _ = flat.enable(feature);
                    }
                }
                CapabilityBlock::DeviceAddress {
                    buffer_device_address,
                } => {
                    *buffer_device_address =
                        self.has(Feature::BufferDeviceAddress);
                }
                CapabilityBlock::RayTracing {
                    ray_tracing_pipeline,
                    acceleration_structure,
                } => {
                    *ray_tracing_pipeline =
                        self.has(Feature::RayTracingPipeline);
                    *acceleration_structure =
                        self.has(Feature::AccelerationStructure);
                }
                CapabilityBlock::ScalarLayout {
                    scalar_block_layout,
                } => {
                    *scalar_block_layout = self.has(Feature::ScalarBlockLayout);
                }
                CapabilityBlock::DescriptorIndexing {
                    runtime_descriptor_array,
                    descriptor_binding_partially_bound,
                } => {
                    *runtime_descriptor_array =
                        self.has(Feature::RuntimeDescriptorArray);
                    *descriptor_binding_partially_bound =
                        self.has(Feature::DescriptorBindingPartiallyBound);
                }
            }
        }
    }

    fn families(&self) -> Vec<FamilyInfo> {
        self.families
            .iter()
            .map(|family| FamilyInfo {
                capabilities: family.capabilities,
                count: family.count,
            })
            .collect()
    }

    fn supports_presentation(
        &self,
        family: usize,
        _surface: &Surface,
    ) -> Result<bool, SurfaceError> {
        Ok(self.families[family].presentation)
    }

    fn create_device(
        self: Box<Self>,
        descriptor: &DeviceDescriptor,
    ) -> Result<Box<dyn DeviceTrait>, CreateDeviceError> {
        if self.fail_creation {
            return Err(OutOfMemory.into());
        }
        self.log.push(format!(
            "device created with {} extension(s)",
            descriptor.extensions.len()
        ));
        Ok(Box::new(TestDevice { log: self.log }))
    }
}

#[derive(Debug)]
pub(crate) struct TestDevice {
    pub log: EventLog,
}

impl DeviceTrait for TestDevice {
    fn get_queue(&self, family: usize, index: usize) -> Box<dyn QueueTrait> {
        Box::new(TestQueue { family, index })
    }

    fn create_command_pool(
        &self,
        _family: usize,
        _flags: PoolFlags,
    ) -> Result<Box<dyn CommandPoolTrait>, OutOfMemory> {
        self.log.push("pool created");
        Ok(Box::new(TestPool {
            log: Some(self.log.clone()),
        }))
    }

    fn wait_idle(&self) {
        self.log.push("device wait_idle");
    }
}

impl Drop for TestDevice {
    fn drop(&mut self) {
        self.log.push("device dropped");
    }
}

#[derive(Debug)]
pub(crate) struct TestQueue {
    pub family: usize,
    pub index: usize,
}

impl QueueTrait for TestQueue {
    fn wait_idle(&self) {}
}

#[derive(Debug, Default)]
pub(crate) struct TestPool {
    pub log: Option<EventLog>,
}

impl CommandPoolTrait for TestPool {
    fn reset(&self) {}

    fn destroy(&self) {
        if let Some(log) = &self.log {
            log.push("pool destroyed");
        }
    }
}

#[derive(Debug)]
pub(crate) struct TestInstance {
    pub adapters: Mutex<Vec<TestAdapter>>,
    pub created: Mutex<Vec<DeviceId>>,
    pub destroyed: Mutex<Vec<DeviceId>>,
    pub log: EventLog,
}

impl TestInstance {
    /// Instance over `adapters`, all wired to one shared event log.
    pub fn with_adapters(adapters: Vec<TestAdapter>) -> Arc<Self> {
        let log = EventLog::default();
        let adapters = adapters
            .into_iter()
            .map(|adapter| TestAdapter {
                log: log.clone(),
                ..adapter
            })
            .collect();
        Arc::new(TestInstance {
            adapters: Mutex::new(adapters),
            created: Mutex::new(Vec::new()),
            destroyed: Mutex::new(Vec::new()),
            log,
        })
    }
}

impl InstanceTrait for TestInstance {
    fn enumerate_adapters(
        &self,
    ) -> Result<Vec<Box<dyn AdapterTrait>>, EnumerateDeviceError> {
        Ok(self
            .adapters
            .lock()
            .iter()
            .cloned()
            .map(|adapter| Box::new(adapter) as Box<dyn AdapterTrait>)
            .collect())
    }

    fn device_created(&self, device: DeviceId) {
        self.created.lock().push(device);
    }

    fn device_destroyed(&self, device: DeviceId) {
        self.log.push("instance notified");
        self.destroyed.lock().push(device);
    }
}

pub(crate) fn test_surface() -> Surface {
    Surface::new(
        (),
        SurfaceInfo {
            window: RawWindowHandleKind::Unknown,
        },
    )
}
