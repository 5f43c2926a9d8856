//! Mount helpers for starting/stopping FUSE
//!
//! Notes:
//! - Only supported on Unix-like systems. On Linux we support
//!   unprivileged mount via fusermount3.
//! - These helpers are thin wrappers over rfuse3 raw Session APIs; a
//!   mount failure here is fatal before any request is served.

use std::path::Path;

use rfuse3::MountOptions;
use rfuse3::raw::{MountHandle, Session};

use crate::fuse::NoteFs;
use crate::store::client::DocStore;

fn default_mount_options() -> MountOptions {
    let mut mo = MountOptions::default();
    mo.fs_name("notefs")
        .uid(unsafe { libc::getuid() })
        .gid(unsafe { libc::getgid() });
    mo
}

/// Mount with privileges (requires CAP_SYS_ADMIN or root).
pub async fn mount<S>(
    fs: NoteFs<S>,
    mount_point: impl AsRef<Path>,
) -> std::io::Result<MountHandle>
where
    S: DocStore + Send + Sync + 'static,
{
    Session::new(default_mount_options())
        .mount(fs, mount_point.as_ref())
        .await
}

/// Unprivileged mount (requires fusermount3 in PATH).
#[cfg(target_os = "linux")]
pub async fn mount_unprivileged<S>(
    fs: NoteFs<S>,
    mount_point: impl AsRef<Path>,
) -> std::io::Result<MountHandle>
where
    S: DocStore + Send + Sync + 'static,
{
    Session::new(default_mount_options())
        .mount_with_unprivileged(fs, mount_point.as_ref())
        .await
}

/// Fallback stub for non-Linux targets.
#[cfg(not(target_os = "linux"))]
pub async fn mount_unprivileged<S>(
    _fs: NoteFs<S>,
    _mount_point: impl AsRef<Path>,
) -> std::io::Result<MountHandle>
where
    S: DocStore + Send + Sync + 'static,
{
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "unprivileged FUSE mount is only supported on Linux in this build",
    ))
}
