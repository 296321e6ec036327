use crate::{
    assert_error, assert_object,
    capability::{Capabilities, CapabilityChain, CapabilityMode, FlatFeatures},
    device::{CreateDeviceError, DeviceDescriptor, DeviceId, DeviceTrait},
    queue::FamilyInfo,
    surface::{Surface, SurfaceError},
    OutOfMemory,
};
use std::{collections::HashSet, error::Error, fmt::Debug};

/// Error occured during device enumeration.
#[derive(Debug, thiserror::Error)]
pub enum EnumerateDeviceError {
    #[error("{source}")]
    OutOfMemory {
        #[from]
        source: OutOfMemory,
    },

    /// Implementation specific error.
    #[error("{source}")]
    Other {
        #[from]
        source: Box<dyn Error + Send + Sync>,
    },
}

/// Kind of the device.
#[derive(Debug, Clone, Copy, PartialOrd, Ord, PartialEq, Eq)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceKind {
    /// Device is software emulated.
    Software,

    /// Device is integrated piece of hardware (typically into CPU)
    Integrated,

    /// Device is discrete piece of hardware.
    Discrete,
}

/// Properties and limits reported by one adapter.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceProperties {
    /// Name of the device.
    pub name: String,

    /// Kind of the device.
    pub kind: Option<DeviceKind>,

    pub max_sampler_anisotropy: f32,
    pub max_image_dimension_2d: u32,
}

/// Seam to the platform object owning adapter enumeration and observing
/// device lifetimes. All session state lives behind this object; the crate
/// keeps no process-wide registries.
pub trait InstanceTrait: Debug + Send + Sync + 'static {
    fn enumerate_adapters(
        &self,
    ) -> Result<Vec<Box<dyn AdapterTrait>>, EnumerateDeviceError>;

    fn device_created(&self, device: DeviceId);

    /// Called after the device handle and everything built on it are gone.
    fn device_destroyed(&self, device: DeviceId);
}

/// Seam to one platform adapter. Query methods must be pure: no adapter or
/// global state is mutated and repeated calls return the same answers.
pub trait AdapterTrait: Debug + Send + Sync + 'static {
    fn properties(&self) -> DeviceProperties;

    /// Names of the device extensions this adapter supports.
    fn extensions(&self) -> Vec<String>;

    /// Fixed-layout feature descriptor of the older API level.
    fn flat_features(&self) -> FlatFeatures;

    /// Populates every block of `chain` in place. Blocks the adapter does
    /// not recognize are left cleared.
    fn fill_capabilities(&self, chain: &mut CapabilityChain);

    fn families(&self) -> Vec<FamilyInfo>;

    fn supports_presentation(
        &self,
        family: usize,
        surface: &Surface,
    ) -> Result<bool, SurfaceError>;

    fn create_device(
        self: Box<Self>,
        descriptor: &DeviceDescriptor,
    ) -> Result<Box<dyn DeviceTrait>, CreateDeviceError>;
}

/// Everything a selection run needs to know about one candidate,
/// read once from the adapter.
#[derive(Clone, Debug)]
pub struct CapabilityReport {
    pub properties: DeviceProperties,
    pub extensions: HashSet<String>,
    pub capabilities: Capabilities,
    pub families: Vec<FamilyInfo>,
}

/// One enumerated adapter together with its memoized capability report.
/// Immutable once queried; discarded after selection unless chosen.
#[derive(Debug)]
pub struct Candidate {
    adapter: Box<dyn AdapterTrait>,
    report: CapabilityReport,
}

impl Candidate {
    /// Queries the adapter under the representation mode of this run.
    ///
    /// In chained mode the caller's template is copied and populated per
    /// candidate, so the template itself stays untouched.
    pub fn query(adapter: Box<dyn AdapterTrait>, mode: &CapabilityMode) -> Self {
        let capabilities = match mode {
            CapabilityMode::Flat => {
                Capabilities::Flat(adapter.flat_features())
            }
            CapabilityMode::Chained(template) => {
                let mut chain = template.clone();
                adapter.fill_capabilities(&mut chain);
                Capabilities::Chained(chain)
            }
        };
        let report = CapabilityReport {
            properties: adapter.properties(),
            extensions: adapter.extensions().into_iter().collect(),
            capabilities,
            families: adapter.families(),
        };
        tracing::trace!(name = %report.properties.name, "candidate queried");
        Candidate { adapter, report }
    }

    pub fn properties(&self) -> &DeviceProperties {
        &self.report.properties
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.report.extensions.contains(name)
    }

    pub fn extensions(&self) -> &HashSet<String> {
        &self.report.extensions
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.report.capabilities
    }

    pub fn families(&self) -> &[FamilyInfo] {
        &self.report.families
    }

    /// Presentation support of one queue family against `surface`.
    /// This is the one query that goes back to the adapter, because it
    /// depends on the surface and cannot be memoized up front.
    pub fn supports_presentation(
        &self,
        family: usize,
        surface: &Surface,
    ) -> Result<bool, SurfaceError> {
        self.adapter.supports_presentation(family, surface)
    }

    pub(crate) fn split(self) -> (Box<dyn AdapterTrait>, CapabilityReport) {
        (self.adapter, self.report)
    }
}

#[allow(dead_code)]
fn check() {
    assert_error::<EnumerateDeviceError>();
    assert_object::<Candidate>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityBlockKind, Feature};
    use crate::mock::TestAdapter;

    #[test]
    fn query_is_memoized_and_repeatable() {
        let adapter = TestAdapter::named("gpu0")
            .with_extension("VK_KHR_swapchain")
            .with_flat_feature(Feature::SamplerAnisotropy);

        let a = Candidate::query(Box::new(adapter.clone()), &CapabilityMode::Flat);
        let b = Candidate::query(Box::new(adapter), &CapabilityMode::Flat);

        assert_eq!(a.properties().name, b.properties().name);
        assert!(a.has_extension("VK_KHR_swapchain"));
        assert!(a.capabilities().supports(Feature::SamplerAnisotropy));
        assert_eq!(a.capabilities(), b.capabilities());
    }

    #[test]
    fn chained_query_fills_template_copy() {
        let template = CapabilityChain::new()
            .with(CapabilityBlockKind::Core)
            .with(CapabilityBlockKind::RayTracing);
        let mode = CapabilityMode::Chained(template.clone());

        let adapter = TestAdapter::named("rt")
            .with_chained_feature(Feature::RayTracingPipeline);
        let candidate = Candidate::query(Box::new(adapter), &mode);

        assert!(candidate.capabilities().supports(Feature::RayTracingPipeline));
        // The caller's template is still empty.
        assert!(!template.supports(Feature::RayTracingPipeline));
    }

    #[test]
    fn unappended_blocks_stay_invisible() {
        let mode = CapabilityMode::Chained(
            CapabilityChain::new().with(CapabilityBlockKind::Core),
        );
        let adapter = TestAdapter::named("rt")
            .with_chained_feature(Feature::RayTracingPipeline);
        let candidate = Candidate::query(Box::new(adapter), &mode);
        assert!(!candidate.capabilities().supports(Feature::RayTracingPipeline));
    }
}
