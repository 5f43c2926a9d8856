mod fuse;
mod store;
mod vfs;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::info;
use tokio::signal;

use crate::fuse::{NoteFs, mount};
use crate::store::http::{DEFAULT_BASE_URL, HttpStore};
use crate::vfs::dir::RootDir;

#[derive(Parser, Debug)]
#[command(author, version, about = "Mount a HackMD-compatible note service as a filesystem")]
struct Args {
    /// Empty directory to mount on
    mountpoint: String,
    /// Base URL of the note service
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,
    /// Session cookie value (connect.sid); falls back to NOTEFS_SESSION
    #[arg(long)]
    session: Option<String>,
    /// Use privileged mount instead of unprivileged (default false)
    #[arg(long, default_value_t = false)]
    not_unprivileged: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let session = args
        .session
        .or_else(|| std::env::var("NOTEFS_SESSION").ok())
        .context("no session token: pass --session or set NOTEFS_SESSION")?;

    let store = Arc::new(HttpStore::new(&args.base_url, session));
    let fs = NoteFs::new(RootDir::new(store));

    let mut mount_handle = if args.not_unprivileged {
        mount::mount(fs, &args.mountpoint).await
    } else {
        mount::mount_unprivileged(fs, &args.mountpoint).await
    }
    .with_context(|| format!("failed to mount on {}", args.mountpoint))?;
    info!("mounted {} on {}", args.base_url, args.mountpoint);

    let handle = &mut mount_handle;
    tokio::select! {
        res = handle => res.context("fuse session ended with error")?,
        _ = signal::ctrl_c() => {
            info!("unmounting {}", args.mountpoint);
            // Unsynced local edits are dropped here; the store is the
            // only durable copy.
            mount_handle.unmount().await.context("unmount failed")?;
        }
    }

    Ok(())
}
