//! Archive session (§4.9): the state machine
//! `Closed -> Mounting -> Mounted -> Mutating -> Mounted -> Closed` that ties
//! together the header/footer/index/entry codecs, the directory tree, and
//! the mutation engine behind one mounted file.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::entry::{Entry, EntryKind};
use crate::footer::{Footer, FOOTER_SIZE};
use crate::header::{Header, HEADER_SIZE};
use crate::key::{KeyOverrides, KeySchedule};
use crate::log::{pck_log, Severity};
use crate::tree::Tree;
pub use crate::tree::{Node, NodeId};
use crate::{index, mutate, payload, Error, Layout};

#[derive(Debug, Clone, Copy, Default)]
pub struct MountOptions {
    pub algorithm_id: u32,
    pub overrides: KeyOverrides,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Progress {
    pub current: u64,
    pub total: u64,
}

struct Mounted {
    file: File,
    path: PathBuf,
    key: KeySchedule,
    layout: Layout,
    description: String,
    data_area_size: u64,
    alloc_cursor: u64,
    entries: Vec<Entry>,
    tree: Tree,
    dirty: bool,
}

impl Mounted {
    fn rebuild_tree(&mut self) -> Result<(), Error> {
        self.tree = Tree::build(&self.entries)?;
        Ok(())
    }

    fn live_cipher_bytes(&self) -> u64 {
        self.entries
            .iter()
            .filter(|e| !e.is_tail())
            .map(|e| e.cipher_size)
            .sum()
    }
}

pub struct ArchiveSession {
    state: Mutex<Option<Mounted>>,
    busy: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    progress_current: Arc<AtomicU64>,
    progress_total: Arc<AtomicU64>,
}

impl Default for ArchiveSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveSession {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
            busy: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
            progress_current: Arc::new(AtomicU64::new(0)),
            progress_total: Arc::new(AtomicU64::new(0)),
        }
    }

    fn guard_not_busy(&self) -> Result<(), Error> {
        if self.busy.load(Ordering::Acquire) {
            Err(Error::Busy)
        } else {
            Ok(())
        }
    }

    pub fn busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn progress(&self) -> Progress {
        Progress {
            current: self.progress_current.load(Ordering::Acquire),
            total: self.progress_total.load(Ordering::Acquire),
        }
    }

    /// Requests cancellation of any in-progress background operation. The
    /// worker observes this between per-file boundaries (§5).
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_mounted(&self) -> bool {
        self.state.lock().expect("session mutex poisoned").is_some()
    }

    // -- mount / unmount -----------------------------------------------

    pub fn mount(&self, path: impl AsRef<Path>, options: MountOptions) -> Result<(), Error> {
        let path = path.as_ref();
        self.mount_inner(path, options).inspect_err(|e| {
            pck_log!(Severity::Error, "mount {:?}: {e}", path);
        })
    }

    fn mount_inner(&self, path: &Path, options: MountOptions) -> Result<(), Error> {
        self.guard_not_busy()?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|_| Error::NotFound(path.to_path_buf()))?;

        let file_size = file.metadata()?.len();
        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(Error::NotAnArchive);
        }

        let key = KeySchedule::derive(options.algorithm_id, options.overrides);

        file.seek(SeekFrom::Start(file_size - FOOTER_SIZE))?;
        let footer = Footer::read(&mut file, &key)?;
        footer.check_file_size(file_size)?;

        file.seek(SeekFrom::Start(0))?;
        let header = Header::read(&mut file)?;
        header.check_against_footer(footer.index_offset)?;

        let index_bytes =
            Self::read_index_region(&mut file, footer.index_offset, footer.index_block_size as usize)?;

        let decoded = index::detect_and_decode(&index_bytes, footer.file_count, &key)?;

        let header_end = HEADER_SIZE;
        for entry in decoded.entries.iter().filter(|e| e.kind == EntryKind::File) {
            let end = entry
                .offset
                .checked_add(entry.cipher_size)
                .ok_or(Error::HeaderFooterInconsistent)?;
            if entry.offset < header_end || end > footer.index_offset {
                return Err(Error::HeaderFooterInconsistent);
            }
        }

        let alloc_cursor = decoded
            .entries
            .iter()
            .filter(|e| e.kind == EntryKind::File)
            .map(|e| e.offset + e.cipher_size)
            .max()
            .unwrap_or(header_end);

        let tree = Tree::build(&decoded.entries)?;

        *self.state.lock().expect("session mutex poisoned") = Some(Mounted {
            file,
            path: path.to_path_buf(),
            key,
            layout: decoded.layout,
            description: header.description,
            data_area_size: header.data_area_size,
            alloc_cursor,
            entries: decoded.entries,
            tree,
            dirty: false,
        });

        pck_log!(
            Severity::Info,
            "mounted {:?} as {} ({} entries)",
            path,
            decoded.layout,
            footer.file_count
        );
        Ok(())
    }

    /// Reads the index block at mount time. Backed by a memory map when the
    /// `mmap` feature is enabled (the default), since the index is the one
    /// region a mount reads in full and up front; plain `seek` + `read_exact`
    /// otherwise.
    #[cfg(feature = "mmap")]
    fn read_index_region(file: &mut File, offset: u64, len: usize) -> Result<Vec<u8>, Error> {
        let mapped = crate::mmap::MappedFile::open(file)?;
        let bytes = mapped.bytes();
        let start = offset as usize;
        let end = start.checked_add(len).ok_or(Error::HeaderFooterInconsistent)?;
        if end > bytes.len() {
            return Err(Error::HeaderFooterInconsistent);
        }
        Ok(bytes[start..end].to_vec())
    }

    #[cfg(not(feature = "mmap"))]
    fn read_index_region(file: &mut File, offset: u64, len: usize) -> Result<Vec<u8>, Error> {
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn unmount(&self) -> Result<(), Error> {
        self.guard_not_busy()?;
        if self
            .state
            .lock()
            .expect("session mutex poisoned")
            .as_ref()
            .map(|m| m.dirty)
            .unwrap_or(false)
        {
            self.commit()?;
        }
        *self.state.lock().expect("session mutex poisoned") = None;
        Ok(())
    }

    fn with_mounted<T>(&self, f: impl FnOnce(&Mounted) -> Result<T, Error>) -> Result<T, Error> {
        let guard = self.state.lock().expect("session mutex poisoned");
        let mounted = guard.as_ref().ok_or(Error::NotAnArchive)?;
        f(mounted)
    }

    fn with_mounted_mut<T>(
        &self,
        f: impl FnOnce(&mut Mounted) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut guard = self.state.lock().expect("session mutex poisoned");
        let mounted = guard.as_mut().ok_or(Error::NotAnArchive)?;
        f(mounted)
    }

    // -- read-only accessors ---------------------------------------------

    pub fn file_count(&self) -> Result<u32, Error> {
        self.with_mounted(|m| Ok(m.entries.iter().filter(|e| !e.is_tail()).count() as u32))
    }

    pub fn data_area_size(&self) -> Result<u64, Error> {
        self.with_mounted(|m| Ok(m.data_area_size))
    }

    pub fn redundancy_size(&self) -> Result<u64, Error> {
        self.with_mounted(|m| Ok(mutate::redundancy(m.data_area_size, m.live_cipher_bytes())))
    }

    pub fn layout(&self) -> Result<Layout, Error> {
        self.with_mounted(|m| Ok(m.layout))
    }

    pub fn root(&self) -> Result<NodeId, Error> {
        self.with_mounted(|m| Ok(m.tree.root()))
    }

    pub fn node(&self, id: NodeId) -> Result<Node, Error> {
        self.with_mounted(|m| Ok(m.tree.node(id)))
    }

    pub fn children(&self, id: NodeId) -> Result<Vec<NodeId>, Error> {
        self.with_mounted(|m| Ok(m.tree.children(id).to_vec()))
    }

    pub fn lookup(&self, path: &str) -> Result<Option<NodeId>, Error> {
        self.with_mounted(|m| Ok(m.tree.lookup(path)))
    }

    pub fn full_path(&self, id: NodeId) -> Result<String, Error> {
        self.with_mounted(|m| Ok(m.tree.full_path(id)))
    }

    pub fn read_file(&self, id: NodeId) -> Result<Vec<u8>, Error> {
        self.with_mounted_mut(|m| {
            let node = m.tree.node(id);
            let index = node.entry_index.ok_or_else(|| Error::MissingEntry(node.name.clone()))?;
            let entry = &m.entries[index];
            payload::read_payload(&mut m.file, entry.offset, entry.clear_size, entry.cipher_size)
        })
    }

    // -- mutation ----------------------------------------------------------

    pub fn add(&self, src_path: impl AsRef<Path>, archive_path: &str, level: u32) -> Result<(), Error> {
        let src_path = src_path.as_ref();
        self.add_inner(src_path, archive_path, level).inspect_err(|e| {
            pck_log!(Severity::Error, "add {archive_path:?} from {src_path:?}: {e}");
        })
    }

    fn add_inner(&self, src_path: &Path, archive_path: &str, level: u32) -> Result<(), Error> {
        self.guard_not_busy()?;
        self.with_mounted_mut(|m| {
            if !m.layout.supports_update() {
                return Err(Error::Unsupported("archive layout does not support in-place update"));
            }
            if m.tree.lookup(archive_path).is_some() {
                return Err(Error::DuplicatePath(archive_path.to_string()));
            }
            let data = std::fs::read(src_path)?;
            let encoded = payload::write_payload(&data, level);
            let plan = mutate::plan_append(HEADER_SIZE, m.data_area_size, m.alloc_cursor, encoded.cipher_size);

            m.file.seek(SeekFrom::Start(plan.offset))?;
            m.file.write_all(&encoded.bytes)?;
            m.alloc_cursor = plan.offset + encoded.cipher_size;
            m.data_area_size = plan.new_data_area_size;

            let tail_index = m.entries.len() - 1;
            m.entries.insert(
                tail_index,
                Entry::new(
                    archive_path.to_string(),
                    plan.offset,
                    encoded.clear_size,
                    encoded.cipher_size,
                    EntryKind::File,
                ),
            );
            m.rebuild_tree()?;
            m.dirty = true;
            Ok(())
        })
    }

    pub fn replace(&self, archive_path: &str, src_path: impl AsRef<Path>, level: u32) -> Result<(), Error> {
        let src_path = src_path.as_ref();
        self.replace_inner(archive_path, src_path, level).inspect_err(|e| {
            pck_log!(Severity::Error, "replace {archive_path:?} from {src_path:?}: {e}");
        })
    }

    fn replace_inner(&self, archive_path: &str, src_path: &Path, level: u32) -> Result<(), Error> {
        self.guard_not_busy()?;
        self.with_mounted_mut(|m| {
            let index = m
                .entries
                .iter()
                .position(|e| !e.is_tail() && e.name.eq_ignore_ascii_case(archive_path))
                .ok_or_else(|| Error::MissingEntry(archive_path.to_string()))?;

            let data = std::fs::read(src_path)?;
            let encoded = payload::write_payload(&data, level);
            let old_cipher_size = m.entries[index].cipher_size;

            let offset = if encoded.cipher_size <= old_cipher_size {
                m.entries[index].offset
            } else {
                let plan =
                    mutate::plan_append(HEADER_SIZE, m.data_area_size, m.alloc_cursor, encoded.cipher_size);
                m.alloc_cursor = plan.offset + encoded.cipher_size;
                m.data_area_size = plan.new_data_area_size;
                plan.offset
            };

            m.file.seek(SeekFrom::Start(offset))?;
            m.file.write_all(&encoded.bytes)?;

            m.entries[index].offset = offset;
            m.entries[index].clear_size = encoded.clear_size;
            m.entries[index].cipher_size = encoded.cipher_size;
            m.dirty = true;
            Ok(())
        })
    }

    pub fn remove(&self, archive_path: &str) -> Result<(), Error> {
        self.remove_inner(archive_path).inspect_err(|e| {
            pck_log!(Severity::Error, "remove {archive_path:?}: {e}");
        })
    }

    fn remove_inner(&self, archive_path: &str) -> Result<(), Error> {
        self.guard_not_busy()?;
        self.with_mounted_mut(|m| {
            let index = m
                .entries
                .iter()
                .position(|e| !e.is_tail() && e.name.eq_ignore_ascii_case(archive_path))
                .ok_or_else(|| Error::MissingEntry(archive_path.to_string()))?;
            m.entries.remove(index);
            m.rebuild_tree()?;
            m.dirty = true;
            Ok(())
        })
    }

    /// §4.10's footer-swap commit: re-encodes the index, writes it, rewrites
    /// the footer (and the header's `data_area_size`, which must stay in
    /// sync with it for §4.3's consistency check to keep holding), flushes,
    /// and truncates the file if it shrunk.
    pub fn commit(&self) -> Result<(), Error> {
        self.commit_inner().inspect_err(|e| {
            pck_log!(Severity::Error, "commit: {e}");
        })
    }

    fn commit_inner(&self) -> Result<(), Error> {
        self.guard_not_busy()?;
        self.with_mounted_mut(|m| {
            if !m.dirty {
                return Ok(());
            }

            let new_index_offset = HEADER_SIZE + m.data_area_size;
            let index_bytes = index::encode(&m.entries, m.layout, &m.key)?;

            m.file.seek(SeekFrom::Start(new_index_offset))?;
            m.file.write_all(&index_bytes)?;

            let footer = Footer {
                file_count: (m.entries.len() - 1) as u32,
                index_offset: new_index_offset,
                index_block_size: index_bytes.len() as u32,
            };
            let footer_offset = new_index_offset + index_bytes.len() as u64;
            m.file.seek(SeekFrom::Start(footer_offset))?;
            footer.write(&mut m.file, &m.key)?;

            let header = Header {
                data_area_size: m.data_area_size,
                layout_version: m.layout.width() as u32,
                description: m.description.clone(),
            };
            m.file.seek(SeekFrom::Start(0))?;
            header.write(&mut m.file)?;

            let new_file_len = footer_offset + FOOTER_SIZE;
            m.file.set_len(new_file_len)?;
            m.file.flush()?;
            m.dirty = false;

            pck_log!(
                Severity::Info,
                "committed {} entries, {} byte index",
                m.entries.len(),
                index_bytes.len()
            );
            Ok(())
        })
    }

    // -- background extraction (§5) ----------------------------------------

    fn collect_extract_targets(&self, path_prefix: Option<&str>) -> Result<(Vec<Entry>, PathBuf), Error> {
        self.with_mounted(|m| {
            let entries: Vec<Entry> = m
                .entries
                .iter()
                .filter(|e| e.kind == EntryKind::File)
                .filter(|e| match path_prefix {
                    None => true,
                    Some(p) => {
                        e.name.eq_ignore_ascii_case(p)
                            || e.name
                                .to_lowercase()
                                .starts_with(&format!("{}/", p.to_lowercase()))
                    }
                })
                .cloned()
                .collect();
            Ok((entries, m.path.clone()))
        })
    }

    fn spawn_extraction(
        self: &Arc<Self>,
        entries: Vec<Entry>,
        archive_path: PathBuf,
        dest_dir: PathBuf,
    ) -> Result<(), Error> {
        self.guard_not_busy()?;
        self.busy.store(true, Ordering::Release);
        self.cancel.store(false, Ordering::Release);
        self.progress_current.store(0, Ordering::Release);
        self.progress_total.store(entries.len() as u64, Ordering::Release);

        let session = Arc::clone(self);
        thread::spawn(move || {
            let mut file = match File::open(&archive_path) {
                Ok(f) => f,
                Err(e) => {
                    pck_log!(Severity::Error, "extract: failed to reopen archive: {e}");
                    session.busy.store(false, Ordering::Release);
                    return;
                }
            };

            let mut failures = 0u64;
            for entry in entries {
                if session.cancel.load(Ordering::Acquire) {
                    pck_log!(Severity::Warn, "extract: cancelled");
                    break;
                }
                let result = (|| -> Result<(), Error> {
                    let bytes =
                        payload::read_payload(&mut file, entry.offset, entry.clear_size, entry.cipher_size)?;
                    let dest = dest_dir.join(&entry.name);
                    if let Some(parent) = dest.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&dest, bytes)?;
                    Ok(())
                })();
                if let Err(e) = result {
                    failures += 1;
                    pck_log!(Severity::Error, "extract {}: {e}", entry.name);
                }
                session.progress_current.fetch_add(1, Ordering::Release);
            }

            if failures > 0 {
                pck_log!(Severity::Warn, "extract: {failures} file(s) failed");
            }
            session.busy.store(false, Ordering::Release);
        });

        Ok(())
    }

    /// Extracts every file entry to `dest_dir`, preserving archive-relative
    /// paths. Runs on a background worker thread (§5); poll [`Self::busy`]
    /// and [`Self::progress`].
    pub fn extract_all(self: &Arc<Self>, dest_dir: impl AsRef<Path>) -> Result<(), Error> {
        let (entries, archive_path) = self.collect_extract_targets(None)?;
        self.spawn_extraction(entries, archive_path, dest_dir.as_ref().to_path_buf())
    }

    /// Extracts one node (a single file, or every file under a folder) to
    /// `dest_dir`. Runs on a background worker thread (§5).
    pub fn extract(self: &Arc<Self>, id: NodeId, dest_dir: impl AsRef<Path>) -> Result<(), Error> {
        let path = self.full_path(id)?;
        let (entries, archive_path) = self.collect_extract_targets(Some(&path))?;
        self.spawn_extraction(entries, archive_path, dest_dir.as_ref().to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_from_directory;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn make_test_archive() -> (tempfile::TempDir, PathBuf) {
        let src = tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("textures")).unwrap();
        std::fs::write(src.path().join("textures/rock.dds"), b"rockdata").unwrap();
        std::fs::write(src.path().join("readme.txt"), b"hello world").unwrap();

        let archive_path = src.path().join("archive.pck");
        build_from_directory(src.path(), &archive_path, 121, KeyOverrides::default(), 6).unwrap();
        (src, archive_path)
    }

    #[test]
    fn mounts_and_lists_built_archive() {
        let (_dir, archive_path) = make_test_archive();
        let session = ArchiveSession::new();
        session
            .mount(
                &archive_path,
                MountOptions {
                    algorithm_id: 121,
                    overrides: KeyOverrides::default(),
                },
            )
            .unwrap();

        assert_eq!(session.file_count().unwrap(), 2);
        let node = session.lookup("readme.txt").unwrap().unwrap();
        let bytes = session.read_file(node).unwrap();
        assert_eq!(bytes, b"hello world");
    }

    #[test]
    fn add_then_commit_then_remount() {
        let (dir, archive_path) = make_test_archive();
        let session = ArchiveSession::new();
        let options = MountOptions {
            algorithm_id: 121,
            overrides: KeyOverrides::default(),
        };
        session.mount(&archive_path, options).unwrap();

        let extra = dir.path().join("extra.bin");
        std::fs::write(&extra, b"extra-bytes").unwrap();
        session.add(&extra, "extra.bin", 0).unwrap();
        session.commit().unwrap();
        session.unmount().unwrap();

        let session2 = ArchiveSession::new();
        session2.mount(&archive_path, options).unwrap();
        assert_eq!(session2.file_count().unwrap(), 3);
        let node = session2.lookup("extra.bin").unwrap().unwrap();
        assert_eq!(session2.read_file(node).unwrap(), b"extra-bytes");
    }

    #[test]
    fn busy_session_refuses_mutation() {
        let (_dir, archive_path) = make_test_archive();
        let session = Arc::new(ArchiveSession::new());
        session
            .mount(
                &archive_path,
                MountOptions {
                    algorithm_id: 121,
                    overrides: KeyOverrides::default(),
                },
            )
            .unwrap();

        let dest = tempdir().unwrap();
        session.extract_all(dest.path()).unwrap();
        // the background worker may or may not have finished already; only
        // assert the busy-refusal contract when it's actually still running.
        if session.busy() {
            assert!(matches!(session.commit(), Err(Error::Busy)));
        }
    }
}
