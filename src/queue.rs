use crate::{
    assert_error, assert_object,
    device::DeviceId,
    physical::Candidate,
    surface::{Surface, SurfaceError},
};
use std::fmt::{self, Debug};

bitflags::bitflags! {
    /// Queue capability flags.
    #[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
    pub struct QueueCapabilityFlags: u32 {
        const TRANSFER  = 0b001;
        const COMPUTE   = 0b010;
        const GRAPHICS  = 0b100;
    }
}

/// Logical purpose a queue is used for.
///
/// Presentation support is a property of a (family, surface) pair rather
/// than a capability flag, so `Present` maps to no flags and is validated
/// against the target surface during resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub enum QueueRole {
    Graphics,
    Present,
    Compute,
    Transfer,
}

impl QueueRole {
    pub fn required_flags(&self) -> QueueCapabilityFlags {
        match self {
            QueueRole::Graphics => QueueCapabilityFlags::GRAPHICS,
            QueueRole::Compute => QueueCapabilityFlags::COMPUTE,
            QueueRole::Transfer => QueueCapabilityFlags::TRANSFER,
            QueueRole::Present => QueueCapabilityFlags::empty(),
        }
    }
}

/// Information about one queue family.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct FamilyInfo {
    /// Supported capabilities.
    /// All queues of one family have same set of capabilities.
    pub capabilities: QueueCapabilityFlags,

    /// Maximum number of queues from this family that can be created.
    pub count: usize,
}

/// Identifies one role request. The same role may be requested more than
/// once only under distinct tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct RoleKey {
    pub role: QueueRole,
    pub tag: u32,
}

/// One requested queue role.
#[derive(Clone, Copy, Debug)]
pub struct RoleRequest {
    pub key: RoleKey,

    /// Number of queues requested for the role.
    pub count: usize,

    /// Whether the role may be bound to a family already serving another
    /// role. Shared roles reuse queues of that family.
    pub shared: bool,
}

impl RoleRequest {
    pub fn new(role: QueueRole) -> Self {
        RoleRequest {
            key: RoleKey { role, tag: 0 },
            count: 1,
            shared: true,
        }
    }

    pub fn tagged(role: QueueRole, tag: u32) -> Self {
        RoleRequest {
            key: RoleKey { role, tag },
            ..RoleRequest::new(role)
        }
    }

    pub fn exclusive(mut self) -> Self {
        self.shared = false;
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        assert!(count > 0, "a role must request at least one queue");
        self.count = count;
        self
    }
}

/// Binding of one role to a concrete queue family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueBinding {
    /// Index into the chosen candidate's queue family list.
    pub family: usize,

    /// Number of queues taken from the family, starting at index 0.
    pub count: usize,
}

/// Role to family bindings produced by a resolution run, in request order.
#[derive(Clone, Debug, Default)]
pub struct QueueBindings {
    entries: Vec<(RoleKey, QueueBinding)>,
}

impl QueueBindings {
    pub fn get(&self, key: RoleKey) -> Option<QueueBinding> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, binding)| *binding)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(RoleKey, QueueBinding)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveQueuesError {
    /// The chosen candidate has no queue family satisfying the role.
    #[error("no queue family satisfies role {role:?} (tag {tag})")]
    Unsatisfiable { role: QueueRole, tag: u32 },

    /// Presentation-support query against the target surface failed.
    #[error("{source}")]
    Surface {
        #[from]
        source: SurfaceError,
    },
}

/// Binds every requested role to a family of the chosen candidate.
///
/// Families are scanned in order; the first family satisfying a role wins.
/// A shared role prefers a family that is already bound, so that multiple
/// roles are satisfied from a single family where possible. Roles requiring
/// presentation are validated against `surface`.
pub fn resolve_queue_roles(
    candidate: &Candidate,
    requests: &[RoleRequest],
    surface: Option<&Surface>,
) -> Result<QueueBindings, ResolveQueuesError> {
    let families = candidate.families();
    let mut entries: Vec<(RoleKey, QueueBinding)> = Vec::with_capacity(requests.len());
    let mut exclusive: Vec<usize> = Vec::new();

    for request in requests {
        assert!(
            entries.iter().all(|(key, _)| *key != request.key),
            "role {:?} requested twice under tag {}; use distinct tags",
            request.key.role,
            request.key.tag,
        );

        let mut family = None;

        if request.shared {
            // Reuse an already-bound family first.
            for (_, binding) in &entries {
                if exclusive.contains(&binding.family) {
                    continue;
                }
                if family_satisfies(candidate, families, binding.family, request, surface)? {
                    family = Some(binding.family);
                    break;
                }
            }
        }

        if family.is_none() {
            for index in 0..families.len() {
                if exclusive.contains(&index) {
                    continue;
                }
                if !request.shared
                    && entries.iter().any(|(_, b)| b.family == index)
                {
                    continue;
                }
                if family_satisfies(candidate, families, index, request, surface)? {
                    family = Some(index);
                    break;
                }
            }
        }

        match family {
            Some(index) => {
                tracing::trace!(
                    role = ?request.key.role,
                    tag = request.key.tag,
                    family = index,
                    "queue role bound"
                );
                if !request.shared {
                    exclusive.push(index);
                }
                entries.push((
                    request.key,
                    QueueBinding {
                        family: index,
                        count: request.count,
                    },
                ));
            }
            None => {
                return Err(ResolveQueuesError::Unsatisfiable {
                    role: request.key.role,
                    tag: request.key.tag,
                })
            }
        }
    }

    Ok(QueueBindings { entries })
}

fn family_satisfies(
    candidate: &Candidate,
    families: &[FamilyInfo],
    index: usize,
    request: &RoleRequest,
    surface: Option<&Surface>,
) -> Result<bool, SurfaceError> {
    let family = &families[index];
    if !family.capabilities.contains(request.key.role.required_flags()) {
        return Ok(false);
    }
    if family.count < request.count {
        return Ok(false);
    }
    if request.key.role == QueueRole::Present {
        match surface {
            Some(surface) => {
                if !candidate.supports_presentation(index, surface)? {
                    return Ok(false);
                }
            }
            // No target surface, nothing can present.
            None => return Ok(false),
        }
    }
    Ok(true)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct QueueId {
    pub family: usize,
    pub index: usize,
}

/// Command queue created together with its logical device.
///
/// Queues are not internally synchronized: callers must serialize
/// submissions to any one queue.
pub struct Queue {
    inner: Box<dyn QueueTrait>,
    id: QueueId,
    capabilities: QueueCapabilityFlags,
    device: DeviceId,
}

impl Debug for Queue {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if fmt.alternate() {
            fmt.debug_struct("Queue")
                .field("inner", &self.inner)
                .field("id", &self.id)
                .field("capabilities", &self.capabilities)
                .field("device", &self.device)
                .finish()
        } else {
            Debug::fmt(&*self.inner, fmt)
        }
    }
}

impl Queue {
    pub(crate) fn new(
        inner: Box<dyn QueueTrait>,
        id: QueueId,
        capabilities: QueueCapabilityFlags,
        device: DeviceId,
    ) -> Self {
        Queue {
            inner,
            id,
            capabilities,
            device,
        }
    }

    pub fn id(&self) -> QueueId {
        self.id
    }

    pub fn capabilities(&self) -> QueueCapabilityFlags {
        self.capabilities
    }

    /// Device this queue was created from.
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Blocks until all work submitted to this queue has completed.
    #[tracing::instrument]
    pub fn wait_idle(&self) {
        self.inner.wait_idle();
    }
}

pub trait QueueTrait: Debug + Send + Sync + 'static {
    fn wait_idle(&self);
}

#[allow(dead_code)]
fn check() {
    assert_object::<Queue>();
    assert_error::<ResolveQueuesError>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capability::CapabilityMode,
        mock::{test_surface, TestAdapter, TestFamily},
        physical::Candidate,
    };

    fn candidate(families: Vec<TestFamily>) -> Candidate {
        let adapter = TestAdapter {
            families,
            ..TestAdapter::named("queues")
        };
        Candidate::query(Box::new(adapter), &CapabilityMode::Flat)
    }

    #[test]
    fn split_families_bind_separately() {
        let candidate = candidate(vec![
            TestFamily::graphics(1),
            TestFamily::present_only(1),
        ]);
        let surface = test_surface();
        let bindings = resolve_queue_roles(
            &candidate,
            &[
                RoleRequest::new(QueueRole::Graphics),
                RoleRequest::new(QueueRole::Present),
            ],
            Some(&surface),
        )
        .unwrap();

        assert_eq!(
            bindings.get(RoleKey {
                role: QueueRole::Graphics,
                tag: 0
            }),
            Some(QueueBinding { family: 0, count: 1 })
        );
        assert_eq!(
            bindings.get(RoleKey {
                role: QueueRole::Present,
                tag: 0
            }),
            Some(QueueBinding { family: 1, count: 1 })
        );
    }

    #[test]
    fn combined_family_is_shared() {
        let candidate = candidate(vec![TestFamily::graphics_present(1)]);
        let surface = test_surface();
        let bindings = resolve_queue_roles(
            &candidate,
            &[
                RoleRequest::new(QueueRole::Graphics),
                RoleRequest::new(QueueRole::Present),
            ],
            Some(&surface),
        )
        .unwrap();

        let graphics = bindings
            .get(RoleKey {
                role: QueueRole::Graphics,
                tag: 0,
            })
            .unwrap();
        let present = bindings
            .get(RoleKey {
                role: QueueRole::Present,
                tag: 0,
            })
            .unwrap();
        assert_eq!(graphics.family, present.family);
    }

    #[test]
    fn missing_family_is_reported() {
        let candidate = candidate(vec![TestFamily::graphics(1)]);
        let err = resolve_queue_roles(
            &candidate,
            &[RoleRequest::new(QueueRole::Compute)],
            None,
        )
        .unwrap_err();
        match err {
            ResolveQueuesError::Unsatisfiable { role, .. } => {
                assert_eq!(role, QueueRole::Compute)
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn present_without_surface_is_unsatisfiable() {
        let candidate = candidate(vec![TestFamily::graphics_present(1)]);
        let err = resolve_queue_roles(
            &candidate,
            &[RoleRequest::new(QueueRole::Present)],
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ResolveQueuesError::Unsatisfiable {
                role: QueueRole::Present,
                ..
            }
        ));
    }

    #[test]
    fn exclusive_family_is_not_reused() {
        let candidate = candidate(vec![
            TestFamily::graphics(1),
            TestFamily {
                capabilities: QueueCapabilityFlags::COMPUTE
                    | QueueCapabilityFlags::TRANSFER,
                count: 2,
                presentation: false,
            },
        ]);
        // Compute claims family 1 for itself; the only transfer-capable
        // family is then off limits.
        let err = resolve_queue_roles(
            &candidate,
            &[
                RoleRequest::new(QueueRole::Compute).exclusive(),
                RoleRequest::new(QueueRole::Transfer),
            ],
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ResolveQueuesError::Unsatisfiable {
                role: QueueRole::Transfer,
                ..
            }
        ));
    }

    #[test]
    fn distinct_tags_allow_repeated_roles() {
        let candidate = candidate(vec![TestFamily::graphics(2)]);
        let bindings = resolve_queue_roles(
            &candidate,
            &[
                RoleRequest::tagged(QueueRole::Graphics, 0),
                RoleRequest::tagged(QueueRole::Graphics, 1),
            ],
            None,
        )
        .unwrap();
        assert_eq!(bindings.iter().count(), 2);
    }

    #[test]
    fn count_respects_family_capacity() {
        let candidate = candidate(vec![
            TestFamily::graphics(1),
            TestFamily::graphics(3),
        ]);
        let bindings = resolve_queue_roles(
            &candidate,
            &[RoleRequest::new(QueueRole::Graphics).with_count(2)],
            None,
        )
        .unwrap();
        assert_eq!(
            bindings.get(RoleKey {
                role: QueueRole::Graphics,
                tag: 0
            }),
            Some(QueueBinding { family: 1, count: 2 })
        );
    }

    #[test]
    #[should_panic]
    fn duplicate_role_key_panics() {
        let candidate = candidate(vec![TestFamily::graphics(2)]);
        let _ = resolve_queue_roles(
            &candidate,
            &[
                RoleRequest::new(QueueRole::Graphics),
                RoleRequest::new(QueueRole::Graphics),
            ],
            None,
        );
    }
}
