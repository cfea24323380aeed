//! Archive builder (§4.11): walks a source directory and writes a fresh
//! archive in one pass, grounded on the original implementation's
//! `do_CreatePckFile`.

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::entry::{Entry, EntryKind};
use crate::footer::{Footer, FOOTER_SIZE};
use crate::header::{Header, HEADER_SIZE};
use crate::key::{KeyOverrides, KeySchedule};
use crate::tree::Tree;
use crate::{index, mutate, payload, Error, Layout};

struct Staged {
    rel_path: String,
    is_folder: bool,
    src_path: Option<PathBuf>,
}

fn walk(src_dir: &Path) -> Result<Vec<Staged>, Error> {
    let mut out = vec![];
    for entry in WalkDir::new(src_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        let rel = entry
            .path()
            .strip_prefix(src_dir)
            .expect("WalkDir yields paths under src_dir")
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            out.push(Staged {
                rel_path: rel,
                is_folder: true,
                src_path: None,
            });
        } else if entry.file_type().is_file() {
            out.push(Staged {
                rel_path: rel,
                is_folder: false,
                src_path: Some(entry.into_path()),
            });
        }
    }
    Ok(out)
}

/// Builds a fresh archive at `archive_path` from every regular file and
/// directory under `src_dir`. Folder entries are always emitted (§4.11
/// resolves the "are folder entries required" Open Question conservatively
/// in that direction).
pub fn build_from_directory(
    src_dir: impl AsRef<Path>,
    archive_path: impl AsRef<Path>,
    algorithm_id: u32,
    overrides: KeyOverrides,
    level: u32,
) -> Result<(), Error> {
    let src_dir = src_dir.as_ref();
    let staged = walk(src_dir)?;

    let key = KeySchedule::derive(algorithm_id, overrides);
    let layout = Layout::latest();

    let mut draft_entries: Vec<Entry> = staged
        .iter()
        .map(|s| {
            Entry::new(
                s.rel_path.clone(),
                0,
                0,
                0,
                if s.is_folder {
                    EntryKind::Folder
                } else {
                    EntryKind::File
                },
            )
        })
        .collect();
    draft_entries.push(Entry::new(String::new(), 0, 0, 0, EntryKind::Tail));

    let tree = Tree::build(&draft_entries)?;
    let write_order = tree.flatten();

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(archive_path.as_ref())?;
    file.seek(SeekFrom::Start(HEADER_SIZE))?;

    let mut final_entries = Vec::with_capacity(write_order.len() + 1);
    let mut cursor = HEADER_SIZE;
    for id in &write_order {
        let node = tree.node(*id);
        let idx = node
            .entry_index
            .expect("every flattened node backs a staged entry");
        let full_path = tree.full_path(*id);

        if staged[idx].is_folder {
            final_entries.push(Entry::new(full_path, 0, 0, 0, EntryKind::Folder));
        } else {
            let data = fs::read(staged[idx].src_path.as_ref().expect("file has a source path"))?;
            let encoded = payload::write_payload(&data, level);
            file.write_all(&encoded.bytes)?;
            final_entries.push(Entry::new(
                full_path,
                cursor,
                encoded.clear_size,
                encoded.cipher_size,
                EntryKind::File,
            ));
            cursor += encoded.cipher_size;
        }
    }
    final_entries.push(Entry::new(String::new(), 0, 0, 0, EntryKind::Tail));

    let data_area_size = mutate::round_up_16(cursor - HEADER_SIZE);
    let index_offset = HEADER_SIZE + data_area_size;
    let index_bytes = index::encode(&final_entries, layout, &key)?;

    file.seek(SeekFrom::Start(index_offset))?;
    file.write_all(&index_bytes)?;

    let footer = Footer {
        file_count: (final_entries.len() - 1) as u32,
        index_offset,
        index_block_size: index_bytes.len() as u32,
    };
    footer.write(&mut file, &key)?;

    let header = Header {
        data_area_size,
        layout_version: layout.width() as u32,
        description: String::new(),
    };
    file.seek(SeekFrom::Start(0))?;
    header.write(&mut file)?;

    file.set_len(index_offset + index_bytes.len() as u64 + FOOTER_SIZE)?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ArchiveSession, MountOptions};
    use tempfile::tempdir;

    #[test]
    fn builds_archive_readable_by_a_session() {
        let src = tempdir().unwrap();
        fs::create_dir_all(src.path().join("a/b")).unwrap();
        fs::write(src.path().join("a/b/c.bin"), b"hello").unwrap();
        fs::write(src.path().join("top.txt"), b"world").unwrap();

        let archive_path = src.path().join("out.pck");
        build_from_directory(src.path(), &archive_path, 131, KeyOverrides::default(), 6).unwrap();

        let session = ArchiveSession::new();
        session
            .mount(
                &archive_path,
                MountOptions {
                    algorithm_id: 131,
                    overrides: KeyOverrides::default(),
                },
            )
            .unwrap();

        assert_eq!(session.file_count().unwrap(), 2);
        let node = session.lookup("a/b/c.bin").unwrap().unwrap();
        assert_eq!(session.read_file(node).unwrap(), b"hello");

        let folder = session.lookup("a").unwrap().unwrap();
        assert!(session.node(folder).unwrap().is_folder);
    }
}
