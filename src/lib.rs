//! Adapter selection and capability negotiation for graphics devices.
//!
//! At startup a graphics application must pick one of the adapters the
//! platform exposes, check it against the extensions and features the
//! application needs, and build a logical device with exactly the negotiated
//! capability set enabled. This crate owns that pipeline:
//!
//! 1. [`Candidate`] queries each enumerated adapter once.
//! 2. [`Requirement`]s score candidates, rejecting unusable ones.
//! 3. [`select`] picks the best-scoring survivor.
//! 4. [`resolve_queue_roles`] binds queue roles to concrete families.
//! 5. [`DeviceBuilder`] creates the [`LogicalDevice`] and its queues.
//!
//! The platform itself (adapter enumeration, device creation) is reached
//! through the [`InstanceTrait`]/[`AdapterTrait`]/[`DeviceTrait`] seams and
//! is not part of this crate.

mod capability;
mod device;
mod physical;
mod pool;
mod queue;
mod requirement;
mod select;
mod surface;
mod track;

#[cfg(test)]
pub(crate) mod mock;

pub use self::{
    capability::*, device::*, physical::*, pool::*, queue::*, requirement::*,
    select::*, surface::*, track::*,
};

use std::error::Error;

/// Host or device memory was exhausted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("out of memory")]
pub struct OutOfMemory;

pub(crate) fn assert_error<E: Error + Send + Sync + 'static>() {}
pub(crate) fn assert_object<T: Send + Sync + 'static>() {}

#[allow(dead_code)]
fn check() {
    assert_error::<OutOfMemory>();
}
