//! The RIDX on-disk blob: encode, decode

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;

use crate::cursor::{CursorInfo, CursorKind};
use crate::error::{IndexError, Result};
use crate::location::{FileId, Location, ENCODED_LOCATION_LEN};
use crate::source::{Language, Source};
use crate::store::{FileInfo, SymbolStore};

pub const MAGIC: [u8; 4] = *b"RIDX";
pub const VERSION: u32 = 1;

const SECTION_COUNT: usize = 7;
const HEADER_LEN: usize = 4 + 4 + SECTION_COUNT * 4;

/// A value snapshot of everything the blob persists. Decoupled from the
/// live engine so saving can happen outside any long-held lock.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    pub paths: Vec<(FileId, PathBuf)>,
    pub store: SymbolStore,
    pub dependencies: BTreeMap<u32, BTreeSet<u32>>,
    pub sources: BTreeMap<u32, Source>,
}

// ── encoding ────────────────────────────────────────────────────────────

fn put_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    debug_assert!(bytes.len() <= u16::MAX as usize);
    put_u16(buf, bytes.len() as u16);
    buf.extend_from_slice(bytes);
}

fn put_location(buf: &mut Vec<u8>, loc: &Location) {
    buf.extend_from_slice(&loc.encode());
}

fn put_location_set(buf: &mut Vec<u8>, locs: &BTreeSet<Location>) {
    put_u32(buf, locs.len() as u32);
    for loc in locs {
        put_location(buf, loc);
    }
}

fn put_cursor(buf: &mut Vec<u8>, cursor: &CursorInfo) {
    put_u8(buf, cursor.kind as u8);
    put_str(buf, &cursor.symbol_name);
    put_str(buf, &cursor.usr);
    put_u32(buf, cursor.start);
    put_u32(buf, cursor.end);
    put_location_set(buf, &cursor.targets);
    put_location_set(buf, &cursor.references);
    match cursor.enclosing_class {
        Some(loc) => {
            put_u8(buf, 1);
            put_location(buf, &loc);
        }
        None => put_u8(buf, 0),
    }
    put_u32(buf, cursor.base_classes.len() as u32);
    for base in &cursor.base_classes {
        put_str(buf, base);
    }
}

/// Serialize a snapshot into the versioned blob. Layout: header with magic,
/// version and per-section offsets, then the seven sections in order.
pub fn encode(snapshot: &IndexSnapshot) -> Vec<u8> {
    let mut sections: Vec<Vec<u8>> = Vec::with_capacity(SECTION_COUNT);

    // File id bijection.
    let mut buf = Vec::new();
    put_u32(&mut buf, snapshot.paths.len() as u32);
    for (id, path) in &snapshot.paths {
        put_u32(&mut buf, id.0);
        put_str(&mut buf, &path.to_string_lossy());
    }
    sections.push(buf);

    // SymbolMap.
    let mut buf = Vec::new();
    put_u32(&mut buf, snapshot.store.symbols.len() as u32);
    for (loc, cursor) in &snapshot.store.symbols {
        put_location(&mut buf, loc);
        put_cursor(&mut buf, cursor);
    }
    sections.push(buf);

    // SymbolNameMap.
    let mut buf = Vec::new();
    put_u32(&mut buf, snapshot.store.symbol_names.len() as u32);
    for (name, locs) in &snapshot.store.symbol_names {
        put_str(&mut buf, name);
        put_location_set(&mut buf, locs);
    }
    sections.push(buf);

    // UsrMap, ordered for deterministic output.
    let mut buf = Vec::new();
    let usrs: BTreeMap<&String, &BTreeSet<Location>> = snapshot.store.usrs.iter().collect();
    put_u32(&mut buf, usrs.len() as u32);
    for (usr, locs) in usrs {
        put_str(&mut buf, usr);
        put_location_set(&mut buf, locs);
    }
    sections.push(buf);

    // FilesMap.
    let mut buf = Vec::new();
    let files: BTreeMap<u32, &FileInfo> = snapshot
        .store
        .files
        .iter()
        .map(|(id, info)| (id.0, info))
        .collect();
    put_u32(&mut buf, files.len() as u32);
    for (id, info) in files {
        put_u32(&mut buf, id);
        put_u64(&mut buf, info.last_indexed);
        let names: BTreeSet<&String> = info.symbol_names.iter().collect();
        put_u32(&mut buf, names.len() as u32);
        for name in names {
            put_str(&mut buf, name);
        }
        put_location_set(&mut buf, &info.targets);
        put_location_set(&mut buf, &info.references);
    }
    sections.push(buf);

    // DependencyMap.
    let mut buf = Vec::new();
    put_u32(&mut buf, snapshot.dependencies.len() as u32);
    for (file, deps) in &snapshot.dependencies {
        put_u32(&mut buf, *file);
        put_u32(&mut buf, deps.len() as u32);
        for dep in deps {
            put_u32(&mut buf, *dep);
        }
    }
    sections.push(buf);

    // SourceMap.
    let mut buf = Vec::new();
    put_u32(&mut buf, snapshot.sources.len() as u32);
    for (file, source) in &snapshot.sources {
        put_u32(&mut buf, *file);
        put_u32(&mut buf, source.args.len() as u32);
        for arg in &source.args {
            put_str(&mut buf, arg);
        }
        put_u8(&mut buf, source.language as u8);
        put_u32(&mut buf, source.flags);
    }
    sections.push(buf);

    let mut out = Vec::with_capacity(
        HEADER_LEN + sections.iter().map(Vec::len).sum::<usize>(),
    );
    out.extend_from_slice(&MAGIC);
    put_u32(&mut out, VERSION);
    let mut offset = HEADER_LEN as u32;
    for section in &sections {
        put_u32(&mut out, offset);
        offset += section.len() as u32;
    }
    for section in &sections {
        out.extend_from_slice(section);
    }
    out
}

// ── decoding ────────────────────────────────────────────────────────────

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or_else(|| {
            IndexError::DatabaseCorrupt("length overflow".to_string())
        })?;
        if end > self.buf.len() {
            return Err(IndexError::DatabaseCorrupt(format!(
                "truncated at offset {}",
                self.pos
            )));
        }
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(arr))
    }

    fn str(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| IndexError::DatabaseCorrupt("non-utf8 string".to_string()))
    }

    fn location(&mut self) -> Result<Location> {
        let bytes = self.take(ENCODED_LOCATION_LEN)?;
        Location::decode(bytes)
            .ok_or_else(|| IndexError::DatabaseCorrupt("bad location".to_string()))
    }

    fn location_set(&mut self) -> Result<BTreeSet<Location>> {
        let count = self.u32()? as usize;
        let mut out = BTreeSet::new();
        for _ in 0..count {
            out.insert(self.location()?);
        }
        Ok(out)
    }

    fn cursor(&mut self) -> Result<CursorInfo> {
        let kind = CursorKind::from_u8(self.u8()?)?;
        let symbol_name = self.str()?;
        let usr = self.str()?;
        let start = self.u32()?;
        let end = self.u32()?;
        let targets = self.location_set()?;
        let references = self.location_set()?;
        let enclosing_class = match self.u8()? {
            0 => None,
            _ => Some(self.location()?),
        };
        let base_count = self.u32()? as usize;
        let mut base_classes = BTreeSet::new();
        for _ in 0..base_count {
            base_classes.insert(self.str()?);
        }
        Ok(CursorInfo {
            kind,
            symbol_name,
            usr,
            start,
            end,
            targets,
            references,
            enclosing_class,
            base_classes,
        })
    }
}

/// Parse a blob back into a snapshot. Magic and version are checked first;
/// anything structurally off is `DatabaseCorrupt`.
pub fn decode(bytes: &[u8]) -> Result<IndexSnapshot> {
    let mut reader = Reader::new(bytes);
    if reader.take(4)? != MAGIC {
        return Err(IndexError::InvalidMagic);
    }
    let version = reader.u32()?;
    if version != VERSION {
        return Err(IndexError::VersionMismatch {
            found: version,
            expected: VERSION,
        });
    }
    let mut offsets = [0u32; SECTION_COUNT];
    for slot in offsets.iter_mut() {
        *slot = reader.u32()?;
    }

    let mut snapshot = IndexSnapshot::default();

    let check_offset = |reader: &Reader<'_>, expected: u32| -> Result<()> {
        if reader.pos != expected as usize {
            return Err(IndexError::DatabaseCorrupt(format!(
                "section offset mismatch: at {}, expected {}",
                reader.pos, expected
            )));
        }
        Ok(())
    };

    // File id bijection.
    check_offset(&reader, offsets[0])?;
    let count = reader.u32()? as usize;
    for _ in 0..count {
        let id = reader.u32()?;
        let path = PathBuf::from(reader.str()?);
        snapshot.paths.push((FileId(id), path));
    }

    // SymbolMap.
    check_offset(&reader, offsets[1])?;
    let count = reader.u32()? as usize;
    for _ in 0..count {
        let loc = reader.location()?;
        let cursor = reader.cursor()?;
        snapshot.store.symbols.insert(loc, cursor);
    }

    // SymbolNameMap.
    check_offset(&reader, offsets[2])?;
    let count = reader.u32()? as usize;
    for _ in 0..count {
        let name = reader.str()?;
        let locs = reader.location_set()?;
        snapshot.store.symbol_names.insert(name, locs);
    }

    // UsrMap.
    check_offset(&reader, offsets[3])?;
    let count = reader.u32()? as usize;
    for _ in 0..count {
        let usr = reader.str()?;
        let locs = reader.location_set()?;
        snapshot.store.usrs.insert(usr, locs);
    }

    // FilesMap.
    check_offset(&reader, offsets[4])?;
    let count = reader.u32()? as usize;
    for _ in 0..count {
        let id = FileId(reader.u32()?);
        let last_indexed = reader.u64()?;
        let name_count = reader.u32()? as usize;
        let mut symbol_names = HashSet::new();
        for _ in 0..name_count {
            symbol_names.insert(reader.str()?);
        }
        let targets = reader.location_set()?;
        let references = reader.location_set()?;
        snapshot.store.files.insert(
            id,
            FileInfo {
                last_indexed,
                symbol_names,
                targets,
                references,
            },
        );
    }

    // DependencyMap.
    check_offset(&reader, offsets[5])?;
    let count = reader.u32()? as usize;
    for _ in 0..count {
        let file = reader.u32()?;
        let dep_count = reader.u32()? as usize;
        let mut deps = BTreeSet::new();
        for _ in 0..dep_count {
            deps.insert(reader.u32()?);
        }
        snapshot.dependencies.insert(file, deps);
    }

    // SourceMap.
    check_offset(&reader, offsets[6])?;
    let count = reader.u32()? as usize;
    for _ in 0..count {
        let file = reader.u32()?;
        let arg_count = reader.u32()? as usize;
        let mut args = Vec::with_capacity(arg_count);
        for _ in 0..arg_count {
            args.push(reader.str()?);
        }
        let language = Language::from_u8(reader.u8()?)?;
        let flags = reader.u32()?;
        snapshot.sources.insert(
            file,
            Source {
                file_id: FileId(file),
                args,
                language,
                flags,
            },
        );
    }

    Ok(snapshot)
}
