use crate::{
    assert_error, assert_object,
    capability::{Capabilities, CapabilityMode, Feature},
    physical::{
        CapabilityReport, DeviceProperties, EnumerateDeviceError, InstanceTrait,
    },
    pool::{CommandPool, CommandPoolTrait, PoolCache, PoolFlags},
    queue::{
        resolve_queue_roles, FamilyInfo, Queue, QueueBindings, QueueId,
        QueueRole, QueueTrait, ResolveQueuesError, RoleKey, RoleRequest,
    },
    requirement::Requirement,
    select::{select, NoSuitableDevice, Selection},
    surface::Surface,
    track::DependencyTracker,
    OutOfMemory,
};
use smallvec::SmallVec;
use std::{
    error::Error,
    fmt::{self, Debug},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// Identity of a logical device within the process. Used to validate that
/// queues and pools are only ever used with the device they came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceId(u64);

impl DeviceId {
    pub(crate) fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        DeviceId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// The platform-level creation call failed. Fatal; a second attempt with a
/// different candidate requires re-running the whole selection pipeline.
#[derive(Debug, thiserror::Error)]
pub enum CreateDeviceError {
    #[error("{source}")]
    OutOfMemory {
        #[from]
        source: OutOfMemory,
    },

    /// Underlying platform error code or message.
    #[error("device creation failed: {source}")]
    Platform {
        #[from]
        source: Box<dyn Error + Send + Sync>,
    },
}

/// Any failure of the selection pipeline. None of these are retried here;
/// all are reported upward.
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error(transparent)]
    Enumerate(#[from] EnumerateDeviceError),

    #[error(transparent)]
    NoSuitableDevice(#[from] NoSuitableDevice),

    #[error(transparent)]
    ResolveQueues(#[from] ResolveQueuesError),

    #[error(transparent)]
    CreateDevice(#[from] CreateDeviceError),
}

/// What the platform must enable when creating the logical device.
#[derive(Clone, Debug)]
pub struct DeviceDescriptor {
    /// Extensions to enable, a subset of what the adapter reported.
    pub extensions: Vec<String>,

    /// Capability set to enable, in the representation the run used.
    pub capabilities: Capabilities,

    /// (family index, queue count) pairs, one entry per family.
    pub families: Vec<(usize, usize)>,
}

/// Seam to one platform device, implemented by the backend.
pub trait DeviceTrait: Debug + Send + Sync + 'static {
    fn get_queue(&self, family: usize, index: usize) -> Box<dyn QueueTrait>;

    fn create_command_pool(
        &self,
        family: usize,
        flags: PoolFlags,
    ) -> Result<Box<dyn CommandPoolTrait>, OutOfMemory>;

    /// Blocks until no work is in flight on any queue.
    fn wait_idle(&self);
}

/// Caller-side description of one negotiation run.
#[derive(Debug, Default)]
pub struct DeviceRequest {
    pub requirements: Vec<Requirement>,
    pub roles: Vec<RoleRequest>,
    pub mode: CapabilityMode,
    pub surface: Option<Surface>,

    /// Enable everything the chosen adapter reported instead of the
    /// negotiated subset. Meant for tooling and debug builds.
    pub enable_all: bool,
}

impl DeviceRequest {
    pub fn new() -> Self {
        DeviceRequest::default()
    }

    pub fn require(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn role(mut self, role: RoleRequest) -> Self {
        self.roles.push(role);
        self
    }

    pub fn capability_mode(mut self, mode: CapabilityMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn surface(mut self, surface: Surface) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn enable_all(mut self, enable_all: bool) -> Self {
        self.enable_all = enable_all;
        self
    }
}

/// Runs the whole pipeline: enumerate, score, resolve queue roles, build.
#[tracing::instrument(skip(instance, request))]
pub fn select_and_build_device(
    instance: &Arc<dyn InstanceTrait>,
    request: DeviceRequest,
) -> Result<LogicalDevice, SelectionError> {
    let adapters = instance.enumerate_adapters()?;
    let selection = select(adapters, &request.requirements, &request.mode)?;
    let bindings = resolve_queue_roles(
        &selection.candidate,
        &request.roles,
        request.surface.as_ref(),
    )?;
    let device = DeviceBuilder::new(selection, &request.requirements, bindings)
        .enable_all(request.enable_all)
        .build(instance.clone())?;
    Ok(device)
}

/// Materializes the logical device from a finished selection run.
pub struct DeviceBuilder<'a> {
    selection: Selection,
    requirements: &'a [Requirement],
    bindings: QueueBindings,
    enable_all: bool,
}

impl<'a> DeviceBuilder<'a> {
    pub fn new(
        selection: Selection,
        requirements: &'a [Requirement],
        bindings: QueueBindings,
    ) -> Self {
        assert_eq!(
            selection.outcomes.len(),
            requirements.len(),
            "selection was produced from a different requirement list"
        );
        DeviceBuilder {
            selection,
            requirements,
            bindings,
            enable_all: false,
        }
    }

    /// Enables the full capability set the candidate reported rather than
    /// the negotiated subset.
    pub fn enable_all(mut self, enable_all: bool) -> Self {
        self.enable_all = enable_all;
        self
    }

    #[tracing::instrument(skip(self, instance))]
    pub fn build(
        self,
        instance: Arc<dyn InstanceTrait>,
    ) -> Result<LogicalDevice, CreateDeviceError> {
        let DeviceBuilder {
            selection,
            requirements,
            bindings,
            enable_all,
        } = self;
        let (adapter, report) = selection.candidate.split();

        let (extensions, capabilities) = if enable_all {
            let mut extensions: Vec<String> =
                report.extensions.iter().cloned().collect();
            extensions.sort();
            (extensions, report.capabilities.clone())
        } else {
            negotiated_set(requirements, &selection.outcomes, &report)
        };

        // Never enable anything the hardware did not report.
        assert!(
            extensions.iter().all(|name| report.extensions.contains(name)),
            "enabled extensions exceed the candidate's extension set"
        );
        assert!(
            capabilities.is_subset_of(&report.capabilities),
            "enabled capabilities exceed the candidate's capability set"
        );

        let families = family_counts(&bindings);
        let descriptor = DeviceDescriptor {
            extensions,
            capabilities,
            families,
        };

        tracing::debug!(
            name = %report.properties.name,
            extensions = descriptor.extensions.len(),
            "creating logical device"
        );
        let inner: Arc<dyn DeviceTrait> =
            Arc::from(adapter.create_device(&descriptor)?);

        let id = DeviceId::new();
        let mut queues: Vec<Arc<Queue>> = Vec::new();
        let mut roles: Vec<(RoleKey, SmallVec<[Arc<Queue>; 1]>)> = Vec::new();
        for (key, binding) in bindings.iter() {
            let mut bound = SmallVec::new();
            for index in 0..binding.count {
                let id_in_family = QueueId {
                    family: binding.family,
                    index,
                };
                let queue = match queues
                    .iter()
                    .find(|queue| queue.id() == id_in_family)
                {
                    Some(queue) => queue.clone(),
                    None => {
                        let queue = Arc::new(Queue::new(
                            inner.get_queue(binding.family, index),
                            id_in_family,
                            report.families[binding.family].capabilities,
                            id,
                        ));
                        queues.push(queue.clone());
                        queue
                    }
                };
                bound.push(queue);
            }
            roles.push((*key, bound));
        }

        instance.device_created(id);

        Ok(LogicalDevice {
            id,
            inner,
            instance,
            properties: report.properties,
            families: report.families,
            enabled_extensions: descriptor.extensions,
            enabled_capabilities: descriptor.capabilities,
            queues,
            roles,
            pools: PoolCache::new(),
            tracker: DependencyTracker::new(),
        })
    }
}

/// Extensions and features that were requested, scored a positive weight on
/// the chosen candidate, and are present in its report. An optional
/// requirement met only through its fallback weight contributes nothing
/// here even when that weight is positive, because the report check fails.
fn negotiated_set(
    requirements: &[Requirement],
    outcomes: &[f32],
    report: &CapabilityReport,
) -> (Vec<String>, Capabilities) {
    let mut extensions: Vec<String> = Vec::new();
    let mut capabilities = report.capabilities.none_like();

    for (requirement, &weight) in requirements.iter().zip(outcomes) {
        if weight <= 0.0 {
            continue;
        }
        if let Some(name) = requirement.granted_extension() {
            if report.extensions.contains(name)
                && !extensions.iter().any(|have| have == name)
            {
                extensions.push(name.to_owned());
            }
        }
        for &feature in requirement.granted_features() {
            if report.capabilities.supports(feature) {
                capabilities.enable(feature);
            }
        }
    }

    (extensions, capabilities)
}

fn family_counts(bindings: &QueueBindings) -> Vec<(usize, usize)> {
    let mut families: Vec<(usize, usize)> = Vec::new();
    for (_, binding) in bindings.iter() {
        match families.iter_mut().find(|(family, _)| *family == binding.family)
        {
            Some((_, count)) => *count = (*count).max(binding.count),
            None => families.push((binding.family, binding.count)),
        }
    }
    families
}

/// The negotiated device: owns the platform device handle, the enabled
/// capability set, the per-role queues, and the bookkeeping that orders
/// teardown of everything built on top.
///
/// Longest-lived object of this subsystem; nothing created from it may
/// outlive it.
pub struct LogicalDevice {
    id: DeviceId,
    inner: Arc<dyn DeviceTrait>,
    instance: Arc<dyn InstanceTrait>,
    properties: DeviceProperties,
    families: Vec<FamilyInfo>,
    enabled_extensions: Vec<String>,
    enabled_capabilities: Capabilities,
    queues: Vec<Arc<Queue>>,
    roles: Vec<(RoleKey, SmallVec<[Arc<Queue>; 1]>)>,
    pools: PoolCache,
    tracker: DependencyTracker,
}

impl Debug for LogicalDevice {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("LogicalDevice")
            .field("id", &self.id)
            .field("name", &self.properties.name)
            .finish()
    }
}

impl LogicalDevice {
    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    pub fn families(&self) -> &[FamilyInfo] {
        &self.families
    }

    pub fn enabled_extensions(&self) -> &[String] {
        &self.enabled_extensions
    }

    pub fn enabled_capabilities(&self) -> &Capabilities {
        &self.enabled_capabilities
    }

    pub fn enabled(&self, feature: Feature) -> bool {
        self.enabled_capabilities.supports(feature)
    }

    /// First queue bound to `role` under tag 0.
    ///
    /// # Panics
    ///
    /// Panics if the role was not requested when the device was built.
    pub fn queue(&self, role: QueueRole) -> &Queue {
        self.queue_tagged(RoleKey { role, tag: 0 })
    }

    /// First queue bound to the tagged role.
    pub fn queue_tagged(&self, key: RoleKey) -> &Queue {
        &self.queues_for(key)[0]
    }

    /// All queues bound to the tagged role.
    pub fn queues(&self, key: RoleKey) -> &[Arc<Queue>] {
        self.queues_for(key)
    }

    fn queues_for(&self, key: RoleKey) -> &[Arc<Queue>] {
        self.roles
            .iter()
            .find(|(have, _)| *have == key)
            .map(|(_, queues)| &queues[..])
            .unwrap_or_else(|| {
                panic!(
                    "role {:?} (tag {}) was not requested at build time",
                    key.role, key.tag
                )
            })
    }

    /// Pool for short-lived, one-shot command buffers on the calling
    /// thread. Created on first request and cached per
    /// (thread, queue, flags).
    #[tracing::instrument(skip(self))]
    pub fn short_term_pool(
        &self,
        queue: &Queue,
    ) -> Result<Arc<CommandPool>, OutOfMemory> {
        self.pool(queue, PoolFlags::TRANSIENT)
    }

    /// Pool for long-lived, resettable command buffers on the calling
    /// thread.
    #[tracing::instrument(skip(self))]
    pub fn long_term_pool(
        &self,
        queue: &Queue,
    ) -> Result<Arc<CommandPool>, OutOfMemory> {
        self.pool(queue, PoolFlags::RESET_COMMAND_BUFFER)
    }

    fn pool(
        &self,
        queue: &Queue,
        flags: PoolFlags,
    ) -> Result<Arc<CommandPool>, OutOfMemory> {
        assert_eq!(
            queue.device(),
            self.id,
            "queue belongs to a different device"
        );
        let inner = &self.inner;
        let family = queue.id().family;
        self.pools.get_or_create(
            self.id,
            queue.id(),
            flags,
            &self.tracker,
            || inner.create_command_pool(family, flags),
        )
    }

    /// Blocks until all queues of the device are idle. No timeout and no
    /// cancellation: a hang here means outstanding work was never retired.
    #[tracing::instrument(skip(self))]
    pub fn wait_idle(&self) {
        self.inner.wait_idle();
    }

    /// Tears the device down: waits for idle, destroys every tracked
    /// dependent, then releases the device handle and notifies the owning
    /// instance.
    #[tracing::instrument(skip(self))]
    pub fn destroy(mut self) {
        self.inner.wait_idle();
        self.tracker.teardown();
        self.pools.clear();
        self.roles.clear();
        self.queues.clear();
        let instance = self.instance.clone();
        let id = self.id;
        drop(self);
        instance.device_destroyed(id);
    }
}

#[allow(dead_code)]
fn check() {
    assert_error::<CreateDeviceError>();
    assert_error::<SelectionError>();
    assert_object::<LogicalDevice>();
}
