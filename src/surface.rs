use crate::{assert_error, assert_object, OutOfMemory};
use raw_window_handle::RawWindowHandle;
use std::{
    any::Any,
    error::Error,
    fmt::{self, Debug},
    sync::Arc,
};

#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("{source}")]
    OutOfMemory {
        #[from]
        source: OutOfMemory,
    },

    #[error("Surfaces are not supported")]
    NotSupported,

    #[error("Surface was lost")]
    SurfaceLost,

    /// Implementation specific error.
    #[error("{source}")]
    Other {
        #[from]
        source: Box<dyn Error + Send + Sync>,
    },
}

/// Kind of raw window handles
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum RawWindowHandleKind {
    IOS,
    MacOS,
    Xlib,
    Xcb,
    Wayland,
    Windows,
    Web,
    Android,
    Unknown,
}

impl RawWindowHandleKind {
    /// Returns kind of the raw window handle.
    pub fn of(window: &RawWindowHandle) -> Self {
        match window {
            #[cfg(target_os = "android")]
            RawWindowHandle::Android(_) => RawWindowHandleKind::Android,

            #[cfg(target_os = "ios")]
            RawWindowHandle::IOS(_) => RawWindowHandleKind::IOS,

            #[cfg(target_os = "macos")]
            RawWindowHandle::MacOS(_) => RawWindowHandleKind::MacOS,

            #[cfg(any(
                target_os = "linux",
                target_os = "dragonfly",
                target_os = "freebsd",
                target_os = "netbsd",
                target_os = "openbsd"
            ))]
            RawWindowHandle::Wayland(_) => RawWindowHandleKind::Wayland,

            #[cfg(target_os = "windows")]
            RawWindowHandle::Windows(_) => RawWindowHandleKind::Windows,

            #[cfg(any(
                target_os = "linux",
                target_os = "dragonfly",
                target_os = "freebsd",
                target_os = "netbsd",
                target_os = "openbsd"
            ))]
            RawWindowHandle::Xcb(_) => RawWindowHandleKind::Xcb,

            #[cfg(any(
                target_os = "linux",
                target_os = "dragonfly",
                target_os = "freebsd",
                target_os = "netbsd",
                target_os = "openbsd"
            ))]
            RawWindowHandle::Xlib(_) => RawWindowHandleKind::Xlib,
            _ => RawWindowHandleKind::Unknown,
        }
    }
}

/// Information about the window a surface was created for.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct SurfaceInfo {
    pub window: RawWindowHandleKind,
}

pub(crate) trait AnySurface: Any + Debug + Send + Sync {}

impl<T> AnySurface for T where T: Any + Debug + Send + Sync {}

impl dyn AnySurface {
    fn downcast_ref<T>(&self) -> Option<&T>
    where
        T: 'static,
    {
        if self.type_id() == std::any::TypeId::of::<T>() {
            Some(unsafe { &*(self as *const dyn AnySurface as *const T) })
        } else {
            None
        }
    }
}

/// Presentation target created by the windowing layer.
///
/// Opaque to this crate; only presentation-capability checks consume it, by
/// handing it back to the platform seam which downcasts to its own payload.
#[derive(Clone)]
pub struct Surface {
    specific: Arc<dyn AnySurface>,
    info: SurfaceInfo,
}

impl Surface {
    /// Wraps an implementation specific payload together with
    /// implementation-agnostic info.
    pub fn new(
        specific: impl Any + Debug + Send + Sync,
        info: SurfaceInfo,
    ) -> Self {
        Surface {
            specific: Arc::new(specific),
            info,
        }
    }

    /// Wraps a payload for `window`, deriving the handle kind from the
    /// raw handle.
    pub fn from_window(
        specific: impl Any + Debug + Send + Sync,
        window: &RawWindowHandle,
    ) -> Self {
        Surface::new(
            specific,
            SurfaceInfo {
                window: RawWindowHandleKind::of(window),
            },
        )
    }

    pub fn info(&self) -> &SurfaceInfo {
        &self.info
    }

    /// Returns the payload that was supplied to `Surface::new`,
    /// or `None` if it is of a different type.
    pub fn specific_ref<T: 'static>(&self) -> Option<&T> {
        (*self.specific).downcast_ref()
    }
}

impl PartialEq for Surface {
    fn eq(&self, rhs: &Self) -> bool {
        Arc::ptr_eq(&self.specific, &rhs.specific)
    }
}

impl Eq for Surface {}

impl Debug for Surface {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if fmt.alternate() {
            fmt.debug_struct("Surface")
                .field("ptr", &(&*self.specific as *const _))
                .field("info", &self.info)
                .finish()
        } else {
            Debug::fmt(&(&*self.specific as *const dyn AnySurface), fmt)
        }
    }
}

#[allow(dead_code)]
fn check() {
    assert_error::<SurfaceError>();
    assert_object::<Surface>();
}
