//! Unit tests for the core data model and store

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::cursor::{CursorInfo, CursorKind};
use crate::depgraph::{DependencyGraph, DependencyMode};
use crate::location::{parse_user_location, FileId, Location, PathTable};
use crate::persist::{self, IndexSnapshot};
use crate::query::{QueryEngine, SortFlags};
use crate::store::{Pattern, SymbolStore};

fn loc(file: u32, line: u32, column: u32) -> Location {
    Location::new(FileId(file), line, column)
}

fn cursor(kind: CursorKind, name: &str, usr: &str) -> CursorInfo {
    let mut info = CursorInfo::new(kind);
    info.symbol_name = name.to_string();
    info.usr = usr.to_string();
    info
}

/// One file with a declaration of `foo()` and a call site referencing it.
fn single_file_batch() -> BTreeMap<Location, CursorInfo> {
    let decl = loc(1, 1, 5);
    let call = loc(1, 1, 29);

    let mut decl_info = cursor(CursorKind::Declaration, "foo()", "c:@F@foo");
    decl_info.references.insert(call);

    let mut call_info = cursor(CursorKind::Reference, "foo", "c:@F@foo");
    call_info.targets.insert(decl);

    BTreeMap::from([(decl, decl_info), (call, call_info)])
}

#[test]
fn location_encoding_roundtrip() {
    let original = loc(42, 1000, 7);
    let bytes = original.encode();
    assert_eq!(bytes.len(), 12);
    assert_eq!(Location::decode(&bytes), Some(original));

    assert_eq!(Location::decode(&bytes[..11]), None);
}

#[test]
fn location_ordering_is_file_line_column() {
    let mut locations = vec![loc(2, 1, 1), loc(1, 9, 9), loc(1, 9, 2), loc(1, 1, 1)];
    locations.sort();
    assert_eq!(
        locations,
        vec![loc(1, 1, 1), loc(1, 9, 2), loc(1, 9, 9), loc(2, 1, 1)]
    );
}

#[test]
fn path_table_is_a_bijection() {
    let table = PathTable::new();
    let a = table.intern(&PathBuf::from("/t/a.cpp"));
    let b = table.intern(&PathBuf::from("/t/b.cpp"));
    let again = table.intern(&PathBuf::from("/t/a.cpp"));

    assert_eq!(a, again);
    assert_ne!(a, b);
    assert!(a.is_valid());
    assert_eq!(table.lookup(a), Some(PathBuf::from("/t/a.cpp")));
    assert_eq!(table.lookup(FileId::INVALID), None);
    assert_eq!(table.len(), 2);
}

#[test]
fn path_table_restore_preserves_ids() {
    let table = PathTable::restore(vec![
        (FileId(3), PathBuf::from("/t/z.cpp")),
        (FileId(1), PathBuf::from("/t/a.cpp")),
    ]);
    assert_eq!(table.get(&PathBuf::from("/t/z.cpp")), Some(FileId(3)));
    assert_eq!(table.lookup(FileId(1)), Some(PathBuf::from("/t/a.cpp")));
    // The gap left by the never-restored id 2 stays dead.
    assert_eq!(table.lookup(FileId(2)), None);

    // New interns continue past the highest restored id.
    let next = table.intern(&PathBuf::from("/t/new.cpp"));
    assert_eq!(next, FileId(4));
}

#[test]
fn parse_user_location_forms() {
    let dir = tempfile::TempDir::new().unwrap();
    let file = dir.path().join("main.cpp");
    std::fs::write(&file, "int main() {}\n").unwrap();
    let canonical = std::fs::canonicalize(&file).unwrap();

    let table = PathTable::new();
    let with_column = parse_user_location(&format!("{}:3:7", file.display()), &table);
    assert!(with_column.is_valid());
    assert_eq!(with_column.line, 3);
    assert_eq!(with_column.column, 7);
    assert_eq!(table.lookup(with_column.file_id), Some(canonical));

    let without_column = parse_user_location(&format!("{}:12", file.display()), &table);
    assert_eq!(without_column.column, 1);
    assert_eq!(without_column.file_id, with_column.file_id);

    assert!(!parse_user_location("not a location", &table).is_valid());
    assert!(!parse_user_location("/does/not/exist.cpp:1:1", &table).is_valid());
    assert!(!parse_user_location(&format!("{}:0:0", file.display()), &table).is_valid());
}

#[test]
fn pattern_detection() {
    assert!(matches!(Pattern::parse("Foo::bar(int)"), Pattern::Exact(_)));
    assert!(matches!(Pattern::parse("foo*"), Pattern::Prefix(_)));
    assert!(matches!(Pattern::parse("^foo.*bar$"), Pattern::Regex(_)));
}

#[test]
fn store_find_patterns() {
    let mut store = SymbolStore::new();
    let mut batch = BTreeMap::new();
    batch.insert(loc(1, 1, 1), cursor(CursorKind::Declaration, "foo()", "u1"));
    batch.insert(loc(1, 2, 1), cursor(CursorKind::Declaration, "foobar()", "u2"));
    batch.insert(loc(1, 3, 1), cursor(CursorKind::Declaration, "baz()", "u3"));
    store.insert_batch(FileId(1), batch);

    assert_eq!(store.find(&Pattern::parse("foo()")).len(), 1);
    assert_eq!(store.find(&Pattern::parse("foo*")).len(), 2);
    assert_eq!(store.find(&Pattern::parse("^ba.")).len(), 1);
    assert!(store.find(&Pattern::parse("missing")).is_empty());
}

#[test]
fn insert_batch_keeps_reference_symmetry() {
    let mut store = SymbolStore::new();
    store.insert_batch(FileId(1), single_file_batch());

    for (loc, info) in store.file_symbols(FileId(1)) {
        for target in &info.targets {
            let other = store.get(*target).expect("target exists");
            assert!(other.references.contains(loc), "missing inverse reference");
        }
        for referer in &info.references {
            let other = store.get(*referer).expect("referer exists");
            assert!(other.targets.contains(loc), "missing inverse target");
        }
    }
}

#[test]
fn cross_file_purge_repairs_inverse_links() {
    let mut store = SymbolStore::new();

    // a.h declares g(); b.cpp calls it.
    let decl = loc(1, 1, 6);
    let call = loc(2, 3, 12);

    let mut decl_info = cursor(CursorKind::Declaration, "g()", "c:@F@g");
    decl_info.references.insert(call);
    store.insert_batch(FileId(1), BTreeMap::from([(decl, decl_info)]));

    let mut call_info = cursor(CursorKind::Reference, "g", "c:@F@g");
    call_info.targets.insert(decl);
    store.insert_batch(FileId(2), BTreeMap::from([(call, call_info)]));

    assert!(store.get(decl).unwrap().references.contains(&call));

    // Removing b.cpp strips its reference out of a.h's declaration.
    store.remove(FileId(2));
    assert!(store.get(decl).unwrap().references.is_empty());
    assert!(store.get(call).is_none());

    // And removing a.h after re-adding b.cpp strips the dangling target.
    let mut call_info = cursor(CursorKind::Reference, "g", "c:@F@g");
    call_info.targets.insert(decl);
    store.insert_batch(FileId(2), BTreeMap::from([(call, call_info)]));
    store.remove(FileId(1));
    assert!(store.get(call).unwrap().targets.is_empty());
    for (l, _) in store.file_symbols(FileId(2)) {
        assert_ne!(l.file_id, FileId(1));
    }
}

#[test]
fn reindex_is_idempotent() {
    let mut store = SymbolStore::new();
    store.insert_batch(FileId(1), single_file_batch());
    let first = store.clone();
    store.insert_batch(FileId(1), single_file_batch());

    assert_eq!(store.symbols, first.symbols);
    assert_eq!(store.symbol_names, first.symbol_names);
    assert_eq!(store.usrs, first.usrs);
}

#[test]
fn file_symbols_is_contiguous() {
    let mut store = SymbolStore::new();
    store.insert_batch(
        FileId(2),
        BTreeMap::from([(loc(2, 1, 1), cursor(CursorKind::Declaration, "b()", "ub"))]),
    );
    store.insert_batch(
        FileId(1),
        BTreeMap::from([
            (loc(1, 1, 1), cursor(CursorKind::Declaration, "a()", "ua")),
            (loc(1, 5, 1), cursor(CursorKind::Definition, "a()", "ua")),
        ]),
    );

    let only_one: Vec<Location> = store.file_symbols(FileId(1)).map(|(l, _)| *l).collect();
    assert_eq!(only_one, vec![loc(1, 1, 1), loc(1, 5, 1)]);
}

#[test]
fn dependency_dirty_closure() {
    let mut graph = DependencyGraph::new();
    // b.cpp includes a.h; c.cpp includes b.h which includes a.h.
    graph.add_dependency(FileId(2), FileId(1));
    graph.add_dependency(FileId(3), FileId(4));
    graph.add_dependency(FileId(4), FileId(1));

    let dirty = graph.dirty(FileId(1));
    assert_eq!(
        dirty,
        [FileId(1), FileId(2), FileId(3), FileId(4)].into_iter().collect()
    );

    // Nothing else sneaks in.
    let unrelated = graph.dirty(FileId(3));
    assert_eq!(unrelated, [FileId(3)].into_iter().collect());

    let forward = graph.dependencies(FileId(3), DependencyMode::DependsOnArg);
    assert_eq!(forward, [FileId(4), FileId(1)].into_iter().collect());
}

#[test]
fn set_dependencies_replaces_forward_edges() {
    let mut graph = DependencyGraph::new();
    graph.set_dependencies(FileId(1), [FileId(2), FileId(3)]);
    graph.set_dependencies(FileId(1), [FileId(4)]);

    let forward = graph.dependencies(FileId(1), DependencyMode::DependsOnArg);
    assert_eq!(forward, [FileId(4)].into_iter().collect());
}

#[test]
fn persistence_roundtrip() {
    let mut store = SymbolStore::new();
    store.insert_batch(FileId(1), single_file_batch());
    let mut class_info = cursor(CursorKind::ClassDefinition, "B", "c:@S@B");
    class_info.base_classes.insert("c:@S@A".to_string());
    class_info.enclosing_class = Some(loc(2, 1, 1));
    store.insert_batch(FileId(2), BTreeMap::from([(loc(2, 2, 7), class_info)]));

    let mut dependencies = BTreeMap::new();
    dependencies.insert(2u32, BTreeSet::from([1u32]));

    let mut sources = BTreeMap::new();
    sources.insert(
        1u32,
        crate::source::Source {
            file_id: FileId(1),
            args: vec!["-I/usr/include".to_string(), "-DNDEBUG".to_string()],
            language: crate::source::Language::Cpp,
            flags: 0,
        },
    );

    let snapshot = IndexSnapshot {
        paths: vec![
            (FileId(1), PathBuf::from("/t/a.cpp")),
            (FileId(2), PathBuf::from("/t/b.cpp")),
        ],
        store,
        dependencies,
        sources,
    };

    let bytes = persist::encode(&snapshot);
    let restored = persist::decode(&bytes).unwrap();

    assert_eq!(restored.paths, snapshot.paths);
    assert_eq!(restored.store, snapshot.store);
    assert_eq!(restored.dependencies, snapshot.dependencies);
    assert_eq!(restored.sources, snapshot.sources);
}

#[test]
fn decode_rejects_bad_blobs() {
    use crate::error::IndexError;

    assert!(matches!(
        persist::decode(b"NO"),
        Err(IndexError::DatabaseCorrupt(_))
    ));
    assert!(matches!(
        persist::decode(b"NOPEnopenopenopenopenopenopenopenope"),
        Err(IndexError::InvalidMagic)
    ));

    let mut versioned = Vec::new();
    versioned.extend_from_slice(&persist::MAGIC);
    versioned.extend_from_slice(&99u32.to_le_bytes());
    versioned.extend_from_slice(&[0u8; 28]);
    assert!(matches!(
        persist::decode(&versioned),
        Err(IndexError::VersionMismatch { found: 99, .. })
    ));

    let mut truncated = persist::encode(&IndexSnapshot::default());
    truncated.truncate(10);
    assert!(persist::decode(&truncated).is_err());
}

#[test]
fn follow_resolves_call_to_declaration() {
    let mut store = SymbolStore::new();
    store.insert_batch(FileId(1), single_file_batch());
    let paths = PathTable::new();
    let engine = QueryEngine::new(&store, &paths);

    assert_eq!(engine.follow(loc(1, 1, 29)), Some(loc(1, 1, 5)));
    assert_eq!(engine.follow(loc(9, 9, 9)), None);
}

#[test]
fn follow_jumps_between_declaration_and_definition() {
    let mut store = SymbolStore::new();
    let decl = loc(1, 1, 5);
    let def = loc(2, 10, 5);
    store.insert_batch(
        FileId(1),
        BTreeMap::from([(decl, cursor(CursorKind::Declaration, "foo()", "c:@F@foo"))]),
    );
    store.insert_batch(
        FileId(2),
        BTreeMap::from([(def, cursor(CursorKind::Definition, "foo()", "c:@F@foo"))]),
    );
    let paths = PathTable::new();
    let engine = QueryEngine::new(&store, &paths);

    assert_eq!(engine.follow(decl), Some(def));
    assert_eq!(engine.follow(def), Some(decl));
}

#[test]
fn references_unify_over_usr() {
    let mut store = SymbolStore::new();
    store.insert_batch(FileId(1), single_file_batch());
    let paths = PathTable::new();
    let engine = QueryEngine::new(&store, &paths);

    let refs = engine.references(loc(1, 1, 5));
    assert_eq!(refs, BTreeSet::from([loc(1, 1, 5), loc(1, 1, 29)]));

    let all = engine.all_references(loc(1, 1, 29));
    assert_eq!(all, BTreeSet::from([loc(1, 1, 5), loc(1, 1, 29)]));
}

#[test]
fn find_symbol_matches_overload_signatures() {
    let mut store = SymbolStore::new();
    let mut batch = BTreeMap::new();
    batch.insert(loc(1, 1, 1), cursor(CursorKind::Declaration, "foo()", "u1"));
    batch.insert(loc(1, 2, 1), cursor(CursorKind::Declaration, "foo(int)", "u2"));
    batch.insert(loc(1, 3, 1), cursor(CursorKind::Declaration, "foobar()", "u3"));
    store.insert_batch(FileId(1), batch);
    let paths = PathTable::new();
    let engine = QueryEngine::new(&store, &paths);

    // A bare name resolves to its overloads, not to longer names.
    assert_eq!(
        engine.find_symbol("foo"),
        BTreeSet::from([loc(1, 1, 1), loc(1, 2, 1)])
    );
    assert_eq!(engine.find_symbol("foo(int)"), BTreeSet::from([loc(1, 2, 1)]));
    assert!(engine.find_symbol("nothere").is_empty());
}

#[test]
fn list_symbols_prefix_and_cap() {
    let mut store = SymbolStore::new();
    let mut batch = BTreeMap::new();
    batch.insert(loc(1, 1, 1), cursor(CursorKind::Declaration, "foo()", "u1"));
    batch.insert(loc(1, 2, 1), cursor(CursorKind::Declaration, "foobar()", "u2"));
    batch.insert(loc(1, 3, 1), cursor(CursorKind::Declaration, "main()", "u3"));
    store.insert_batch(FileId(1), batch);
    let paths = PathTable::new();
    let engine = QueryEngine::new(&store, &paths);

    assert_eq!(engine.list_symbols("fo", 100), vec!["foo()", "foobar()"]);
    assert_eq!(engine.list_symbols("", 2).len(), 2);
    assert!(engine.list_symbols("zzz", 100).is_empty());
}

#[test]
fn super_and_subs() {
    let mut store = SymbolStore::new();
    let base_decl = loc(1, 1, 7);
    let derived = loc(1, 2, 7);

    store.insert_batch(FileId(1), {
        let mut batch = BTreeMap::new();
        batch.insert(base_decl, cursor(CursorKind::ClassDeclaration, "A", "c:@S@A"));
        let mut b = cursor(CursorKind::ClassDefinition, "B", "c:@S@B");
        b.base_classes.insert("c:@S@A".to_string());
        batch.insert(derived, b);
        batch
    });
    let paths = PathTable::new();
    let engine = QueryEngine::new(&store, &paths);

    assert_eq!(engine.find_super(derived), Some(base_decl));
    assert_eq!(engine.find_subs(base_decl), BTreeSet::from([derived]));
    assert!(engine.find_subs(derived).is_empty());
}

#[test]
fn sort_flags_filter_and_reverse() {
    let mut store = SymbolStore::new();
    store.insert_batch(FileId(1), single_file_batch());
    let paths = PathTable::new();
    let engine = QueryEngine::new(&store, &paths);

    let set = BTreeSet::from([loc(1, 1, 5), loc(1, 1, 29)]);
    assert_eq!(
        engine.sort(&set, SortFlags::default()),
        vec![loc(1, 1, 5), loc(1, 1, 29)]
    );
    assert_eq!(
        engine.sort(
            &set,
            SortFlags {
                declaration_only: true,
                reverse: false
            }
        ),
        vec![loc(1, 1, 5)]
    );
    assert_eq!(
        engine.sort(
            &set,
            SortFlags {
                declaration_only: false,
                reverse: true
            }
        ),
        vec![loc(1, 1, 29), loc(1, 1, 5)]
    );
}
