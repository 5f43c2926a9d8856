//! FUSE adapter and request handling
//!
//! Binds the virtual filesystem core to the kernel FUSE protocol via
//! rfuse3. The tree is flat: inode 1 is the root directory, inode 2 the
//! scratch file, and document inodes are allocated per lookup and
//! released on forget. Files are opened with direct I/O so every read
//! and write reaches the owning node's buffer instead of the kernel
//! page cache.

pub mod mount;

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use futures_util::stream::{self, Stream};
use log::debug;
use rfuse3::Result as FuseResult;
use rfuse3::raw::reply::{
    DirectoryEntry, DirectoryEntryPlus, FileAttr, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyDirectoryPlus, ReplyEntry, ReplyInit, ReplyOpen, ReplyStatFs, ReplyWrite,
};
use rfuse3::raw::{Filesystem, Request};
use rfuse3::{FileType, SetAttr, Timestamp};

use crate::store::client::{DocStore, StoreError};
use crate::vfs::dir::{Entry, RootDir, SCRATCH_NAME};
use crate::vfs::node::{DocNode, ScratchNode};

/// Bypass the page cache for opened files (FOPEN_DIRECT_IO).
const OPEN_DIRECT_IO: u32 = 1;

/// Placeholder dirent inode (FUSE_UNKNOWN_INO): tells the kernel the
/// inode is not resolved yet, so it cannot clash with a real one.
const UNKNOWN_INO: u64 = 0xffff_ffff;

pub const ROOT_INO: u64 = 1;
pub const SCRATCH_INO: u64 = 2;
const FIRST_DOC_INO: u64 = 3;

const TTL: Duration = Duration::from_secs(1);

struct DocHandle<S> {
    node: Arc<DocNode<S>>,
    nlookup: u64,
}

/// What an inode resolves to.
enum FileRef<S> {
    Scratch(Arc<ScratchNode>),
    Doc(Arc<DocNode<S>>),
}

pub struct NoteFs<S> {
    root: RootDir<S>,
    /// Document inodes currently known to the kernel.
    nodes: RwLock<HashMap<u64, DocHandle<S>>>,
    next_ino: AtomicU64,
}

impl<S: DocStore> NoteFs<S> {
    pub fn new(root: RootDir<S>) -> Self {
        Self {
            root,
            nodes: RwLock::new(HashMap::new()),
            next_ino: AtomicU64::new(FIRST_DOC_INO),
        }
    }

    /// Register a freshly looked-up document node under a new inode.
    fn register(&self, node: DocNode<S>) -> (u64, Arc<DocNode<S>>) {
        let ino = self.next_ino.fetch_add(1, Ordering::SeqCst);
        let node = Arc::new(node);
        self.nodes.write().unwrap().insert(
            ino,
            DocHandle {
                node: node.clone(),
                nlookup: 1,
            },
        );
        (ino, node)
    }

    fn file_ref(&self, ino: u64) -> Option<FileRef<S>> {
        if ino == SCRATCH_INO {
            return Some(FileRef::Scratch(self.root.scratch()));
        }
        self.nodes
            .read()
            .unwrap()
            .get(&ino)
            .map(|h| FileRef::Doc(h.node.clone()))
    }

    fn drop_lookups(&self, ino: u64, nlookup: u64) {
        let mut nodes = self.nodes.write().unwrap();
        let Some(handle) = nodes.get_mut(&ino) else {
            return;
        };
        handle.nlookup = handle.nlookup.saturating_sub(nlookup);
        if handle.nlookup == 0 {
            nodes.remove(&ino);
        }
    }
}

/// Errno for a failed store operation on a file.
fn store_errno(e: &StoreError) -> i32 {
    match e {
        StoreError::NotFound(_) => libc::ENOENT,
        StoreError::NotSupported => libc::ENOSYS,
        _ => libc::EIO,
    }
}

fn dir_attr(req: &Request) -> FileAttr {
    let now = Timestamp::from(SystemTime::now());
    FileAttr {
        ino: ROOT_INO,
        size: 0,
        blocks: 0,
        atime: now,
        mtime: now,
        ctime: now,
        #[cfg(target_os = "macos")]
        crtime: now,
        kind: FileType::Directory,
        perm: 0o777,
        nlink: 2,
        uid: req.uid,
        gid: req.gid,
        rdev: 0,
        #[cfg(target_os = "macos")]
        flags: 0,
        blksize: 4096,
    }
}

fn file_attr(ino: u64, size: u64, req: &Request) -> FileAttr {
    let now = Timestamp::from(SystemTime::now());
    FileAttr {
        ino,
        size,
        blocks: size.div_ceil(512),
        atime: now,
        mtime: now,
        ctime: now,
        #[cfg(target_os = "macos")]
        crtime: now,
        kind: FileType::RegularFile,
        perm: 0o666,
        nlink: 1,
        uid: req.uid,
        gid: req.gid,
        rdev: 0,
        #[cfg(target_os = "macos")]
        flags: 0,
        blksize: 4096,
    }
}

impl<S> Filesystem for NoteFs<S>
where
    S: DocStore + Send + Sync + 'static,
{
    type DirEntryStream<'a>
        = Pin<Box<dyn Stream<Item = FuseResult<DirectoryEntry>> + Send + 'a>>
    where
        Self: 'a;

    type DirEntryPlusStream<'a>
        = Pin<Box<dyn Stream<Item = FuseResult<DirectoryEntryPlus>> + Send + 'a>>
    where
        Self: 'a;

    async fn init(&self, _req: Request) -> FuseResult<ReplyInit> {
        // Whole-document buffers make large writes cheap; 1MiB is a
        // conservative kernel-side cap.
        let max_write = NonZeroU32::new(1024 * 1024).unwrap();
        Ok(ReplyInit { max_write })
    }

    async fn destroy(&self, _req: Request) {}

    // Resolve a name under the root against the newest mapping
    // generation. Every document hit registers a brand-new node, so a
    // re-lookup after the entry TTL expires starts a fresh session.
    async fn lookup(&self, req: Request, parent: u64, name: &OsStr) -> FuseResult<ReplyEntry> {
        if parent != ROOT_INO {
            return Err(libc::ENOTDIR.into());
        }
        let name = name.to_string_lossy();
        let attr = match self.root.lookup(name.as_ref()) {
            None => return Err(libc::ENOENT.into()),
            Some(Entry::Scratch(scratch)) => {
                file_attr(SCRATCH_INO, scratch.size().await, &req)
            }
            Some(Entry::Doc(node)) => {
                let (ino, node) = self.register(node);
                file_attr(ino, node.size().await, &req)
            }
        };
        Ok(ReplyEntry {
            ttl: TTL,
            attr,
            generation: 0,
        })
    }

    async fn forget(&self, _req: Request, inode: u64, nlookup: u64) {
        self.drop_lookups(inode, nlookup);
    }

    async fn batch_forget(&self, _req: Request, inodes: &[(u64, u64)]) {
        for &(inode, nlookup) in inodes {
            self.drop_lookups(inode, nlookup);
        }
    }

    async fn getattr(
        &self,
        req: Request,
        ino: u64,
        _fh: Option<u64>,
        _flags: u32,
    ) -> FuseResult<ReplyAttr> {
        let attr = match ino {
            ROOT_INO => dir_attr(&req),
            _ => match self.file_ref(ino) {
                Some(FileRef::Scratch(scratch)) => {
                    file_attr(ino, scratch.size().await, &req)
                }
                Some(FileRef::Doc(node)) => file_attr(ino, node.size().await, &req),
                None => return Err(libc::ENOENT.into()),
            },
        };
        Ok(ReplyAttr { ttl: TTL, attr })
    }

    // Only size changes are honored (O_TRUNC and editor truncation);
    // ownership and mode are fixed by the adapter.
    async fn setattr(
        &self,
        req: Request,
        ino: u64,
        _fh: Option<u64>,
        set_attr: SetAttr,
    ) -> FuseResult<ReplyAttr> {
        if let Some(size) = set_attr.size {
            match self.file_ref(ino) {
                Some(FileRef::Scratch(scratch)) => scratch.truncate(size).await,
                Some(FileRef::Doc(node)) => {
                    node.truncate(size)
                        .await
                        .map_err(|e| store_errno(&e))?;
                }
                None if ino == ROOT_INO => return Err(libc::EISDIR.into()),
                None => return Err(libc::ENOENT.into()),
            }
        }
        self.getattr(req, ino, None, 0).await
    }

    // Open defers the fetch; it only marks the session as direct I/O so
    // all content traffic goes through the node's own buffer.
    async fn open(&self, _req: Request, ino: u64, _flags: u32) -> FuseResult<ReplyOpen> {
        if ino == ROOT_INO {
            return Err(libc::EISDIR.into());
        }
        if self.file_ref(ino).is_none() {
            return Err(libc::ENOENT.into());
        }
        Ok(ReplyOpen {
            fh: 0,
            flags: OPEN_DIRECT_IO,
        })
    }

    async fn opendir(&self, _req: Request, ino: u64, _flags: u32) -> FuseResult<ReplyOpen> {
        match ino {
            ROOT_INO => Ok(ReplyOpen { fh: 0, flags: 0 }),
            _ if self.file_ref(ino).is_some() => Err(libc::ENOTDIR.into()),
            _ => Err(libc::ENOENT.into()),
        }
    }

    async fn read(
        &self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: u64,
        size: u32,
    ) -> FuseResult<ReplyData> {
        let buf = match self.file_ref(ino) {
            Some(FileRef::Scratch(scratch)) => scratch.read_all().await,
            Some(FileRef::Doc(node)) => {
                node.read_all().await.map_err(|e| store_errno(&e))?
            }
            None => return Err(libc::ENOENT.into()),
        };
        let start = (offset as usize).min(buf.len());
        let end = (start + size as usize).min(buf.len());
        Ok(ReplyData {
            data: Bytes::copy_from_slice(&buf[start..end]),
        })
    }

    async fn write(
        &self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: u64,
        data: &[u8],
        _write_flags: u32,
        _flags: u32,
    ) -> FuseResult<ReplyWrite> {
        let written = match self.file_ref(ino) {
            Some(FileRef::Scratch(scratch)) => scratch.write_at(offset, data).await,
            Some(FileRef::Doc(node)) => node
                .write_at(offset, data)
                .await
                .map_err(|e| store_errno(&e))?,
            None => return Err(libc::ENOENT.into()),
        };
        Ok(ReplyWrite {
            written: written as u32,
        })
    }

    // List the store and publish a fresh mapping generation. A listing
    // failure is an enumeration failure, not a crash.
    async fn readdir<'a>(
        &'a self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: i64,
    ) -> FuseResult<ReplyDirectory<Self::DirEntryStream<'a>>> {
        if ino != ROOT_INO {
            if self.file_ref(ino).is_some() {
                return Err(libc::ENOTDIR.into());
            }
            return Err(libc::ENOENT.into());
        }
        let names = self.root.enumerate().await.map_err(|_| libc::ENOENT)?;
        debug!("readdir: {} entries", names.len());

        let mut all: Vec<DirectoryEntry> = Vec::with_capacity(names.len() + 2);
        all.push(DirectoryEntry {
            inode: ROOT_INO,
            kind: FileType::Directory,
            name: OsString::from("."),
            offset: 1,
        });
        all.push(DirectoryEntry {
            inode: ROOT_INO,
            kind: FileType::Directory,
            name: OsString::from(".."),
            offset: 2,
        });
        for (i, name) in names.iter().enumerate() {
            // Document inodes are assigned at lookup time; until then
            // the dirent carries the unresolved placeholder.
            let inode = if name == SCRATCH_NAME {
                SCRATCH_INO
            } else {
                UNKNOWN_INO
            };
            all.push(DirectoryEntry {
                inode,
                kind: FileType::RegularFile,
                name: OsString::from(name),
                offset: (i as i64) + 3,
            });
        }

        let start = if offset <= 0 { 0 } else { offset as usize };
        let slice = if start >= all.len() {
            Vec::new()
        } else {
            all[start..].to_vec()
        };
        let stream_iter = stream::iter(slice.into_iter().map(Ok));
        let boxed: Self::DirEntryStream<'a> = Box::pin(stream_iter);
        Ok(ReplyDirectory::<Self::DirEntryStream<'a>> { entries: boxed })
    }

    // readdirplus hands out real attrs, so document entries register
    // nodes just like lookup does (the kernel forgets them later).
    async fn readdirplus<'a>(
        &'a self,
        req: Request,
        ino: u64,
        _fh: u64,
        offset: u64,
        _lock_owner: u64,
    ) -> FuseResult<ReplyDirectoryPlus<Self::DirEntryPlusStream<'a>>> {
        if ino != ROOT_INO {
            if self.file_ref(ino).is_some() {
                return Err(libc::ENOTDIR.into());
            }
            return Err(libc::ENOENT.into());
        }
        let names = self.root.enumerate().await.map_err(|_| libc::ENOENT)?;

        // Offsets are 1-based positions; a continuation call resumes
        // after the last delivered entry.
        let start = offset as usize;
        let mut entries: Vec<DirectoryEntryPlus> = Vec::new();
        for (pos, dot) in [".", ".."].iter().enumerate() {
            if pos < start {
                continue;
            }
            entries.push(DirectoryEntryPlus {
                inode: ROOT_INO,
                generation: 0,
                kind: FileType::Directory,
                name: OsString::from(dot),
                offset: (pos as i64) + 1,
                attr: dir_attr(&req),
                entry_ttl: TTL,
                attr_ttl: TTL,
            });
        }
        for (i, name) in names.iter().enumerate() {
            // Register nodes only for entries actually streamed; the
            // kernel never forgets entries it never received.
            if i + 2 < start {
                continue;
            }
            let (inode, attr) = match self.root.lookup(name) {
                Some(Entry::Scratch(scratch)) => {
                    (SCRATCH_INO, file_attr(SCRATCH_INO, scratch.size().await, &req))
                }
                Some(Entry::Doc(node)) => {
                    let (ino, node) = self.register(node);
                    (ino, file_attr(ino, node.size().await, &req))
                }
                // The mapping was just published from this listing, so
                // misses cannot happen; skip defensively anyway.
                None => continue,
            };
            entries.push(DirectoryEntryPlus {
                inode,
                generation: 0,
                kind: FileType::RegularFile,
                name: OsString::from(name),
                offset: (i as i64) + 3,
                attr,
                entry_ttl: TTL,
                attr_ttl: TTL,
            });
        }

        let stream_iter = stream::iter(entries.into_iter().map(Ok));
        let boxed: Self::DirEntryPlusStream<'a> = Box::pin(stream_iter);
        Ok(ReplyDirectoryPlus { entries: boxed })
    }

    async fn statfs(&self, _req: Request, _ino: u64) -> FuseResult<ReplyStatFs> {
        // Sizes live server-side; report conservative constants.
        Ok(ReplyStatFs {
            blocks: 0,
            bfree: 0,
            bavail: 0,
            files: 0,
            ffree: u64::MAX,
            bsize: 4096,
            namelen: 255,
            frsize: 4096,
        })
    }

    // Push the node's buffer to the store. A store without remote write
    // support answers ENOSYS and the local buffer stays intact.
    async fn fsync(&self, _req: Request, ino: u64, _fh: u64, _datasync: bool) -> FuseResult<()> {
        match self.file_ref(ino) {
            // Nothing behind the scratch file to push.
            Some(FileRef::Scratch(_)) => Ok(()),
            Some(FileRef::Doc(node)) => node.sync().await.map_err(|e| store_errno(&e).into()),
            None => Err(libc::ENOENT.into()),
        }
    }

    // Close-path callback; syncing stays explicit (fsync), matching the
    // accepted data-loss-on-unmount tradeoff.
    async fn flush(&self, _req: Request, _inode: u64, _fh: u64, _lock_owner: u64) -> FuseResult<()> {
        Ok(())
    }

    async fn release(
        &self,
        _req: Request,
        _inode: u64,
        _fh: u64,
        _flags: u32,
        _lock_owner: u64,
        _flush: bool,
    ) -> FuseResult<()> {
        Ok(())
    }

    async fn releasedir(&self, _req: Request, _inode: u64, _fh: u64, _flags: u32) -> FuseResult<()> {
        Ok(())
    }

    async fn fsyncdir(
        &self,
        _req: Request,
        _inode: u64,
        _fh: u64,
        _datasync: bool,
    ) -> FuseResult<()> {
        Ok(())
    }

    // In-flight store calls are cancelled by dropping their futures;
    // there is nothing extra to tear down per request.
    async fn interrupt(&self, _req: Request, _unique: u64) -> FuseResult<()> {
        Ok(())
    }
}


#[cfg(all(test, target_os = "linux"))]
mod mount_tests {
    use super::*;
    use crate::fuse::mount::mount_unprivileged;
    use crate::store::mock::MockStore;
    use std::fs;
    use std::time::Duration as StdDuration;

    // Mount smoke test, gated by NOTEFS_FUSE_TEST=1 (needs fusermount3).
    #[tokio::test]
    async fn smoke_mount_and_basic_ops() {
        if std::env::var("NOTEFS_FUSE_TEST").ok().as_deref() != Some("1") {
            eprintln!("skip fuse mount test: set NOTEFS_FUSE_TEST=1 to enable");
            return;
        }

        let store = Arc::new(MockStore::new());
        store.insert("n1", "hello", b"hello body");
        store.insert("n2", "hello", b"other body");
        let fs = NoteFs::new(RootDir::new(store.clone()));

        let mnt = tempfile::tempdir().expect("tmp mount");
        let mnt_path = mnt.path().to_path_buf();

        let handle = match mount_unprivileged(fs, &mnt_path).await {
            Ok(h) => h,
            Err(e) => {
                eprintln!("skip fuse test: mount failed: {e}");
                return;
            }
        };

        tokio::time::sleep(StdDuration::from_millis(2000)).await;

        let list = fs::read_dir(&mnt_path)
            .expect("readdir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        assert!(list.iter().any(|n| n == "hello"));
        assert!(list.iter().any(|n| n == "hello(1)"));
        assert!(list.iter().any(|n| n == SCRATCH_NAME));

        let content = fs::read(mnt_path.join("hello")).expect("read doc");
        assert_eq!(content, b"hello body");

        fs::write(mnt_path.join(SCRATCH_NAME), b"local data").expect("write scratch");
        let back = fs::read(mnt_path.join(SCRATCH_NAME)).expect("read scratch");
        assert_eq!(back, b"local data");

        if let Err(e) = handle.unmount().await {
            eprintln!("unmount error: {e}");
        }
    }

    // A mount on a missing directory must fail before any request is
    // served, regardless of fusermount3 being available.
    #[tokio::test]
    async fn mount_on_missing_mount_point_fails() {
        let fs = NoteFs::new(RootDir::new(Arc::new(MockStore::new())));
        let dir = tempfile::tempdir().expect("tmp dir");
        let missing = dir.path().join("does-not-exist");
        assert!(mount_unprivileged(fs, &missing).await.is_err());
    }
}
