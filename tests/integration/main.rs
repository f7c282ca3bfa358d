//! End-to-end scenarios: index real files, query over the channel surface

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ridx_core::{DependencyMode, Environment, Language, PathTable, Source};
use ridx_indexer::{
    parse_event_stream, IndexData, IndexType, JobError, Project, ProjectOptions, SourceParser,
    SyncConfig,
};
use ridx_server::{execute, render, OutputFlags, Request};

/// Parser stand-in that reads a `<source>.events` sidecar describing what
/// the real parser would have reported for that unit. Supports scripted
/// leading crashes per source.
struct EventFileParser {
    paths: Arc<PathTable>,
    crashes: Mutex<HashMap<PathBuf, u32>>,
    calls: Mutex<HashMap<PathBuf, u32>>,
}

impl EventFileParser {
    fn new(paths: Arc<PathTable>) -> Arc<Self> {
        Arc::new(EventFileParser {
            paths,
            crashes: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        })
    }

    fn crash_next(&self, path: &Path, times: u32) {
        self.crashes
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), times);
    }

    fn calls(&self, path: &Path) -> u32 {
        self.calls.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

impl SourceParser for EventFileParser {
    fn parse(&self, source: &Source) -> Result<IndexData, JobError> {
        let path = self
            .paths
            .lookup(source.file_id)
            .ok_or_else(|| JobError::Crashed("unknown file id".to_string()))?;
        *self.calls.lock().unwrap().entry(path.clone()).or_insert(0) += 1;
        if !path.exists() {
            return Err(JobError::Unreadable(path));
        }
        if let Some(remaining) = self.crashes.lock().unwrap().get_mut(&path) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(JobError::Crashed("scripted crash".to_string()));
            }
        }
        let sidecar = PathBuf::from(format!("{}.events", path.display()));
        let text = std::fs::read_to_string(&sidecar)
            .map_err(|e| JobError::Crashed(format!("no event sidecar: {e}")))?;
        parse_event_stream(&text, source, &self.paths)
    }
}

struct TestProject {
    _dir: tempfile::TempDir,
    root: PathBuf,
    project: Project,
    parser: Arc<EventFileParser>,
    paths: Arc<PathTable>,
}

impl TestProject {
    fn new() -> TestProject {
        let dir = tempfile::TempDir::new().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        let env = Environment::with_cwd(&root);
        let paths = Arc::new(PathTable::new());
        let parser = EventFileParser::new(Arc::clone(&paths));
        let project = Project::open(
            root.clone(),
            &env,
            Arc::clone(&paths),
            Arc::clone(&parser) as Arc<dyn SourceParser>,
            ProjectOptions {
                sync: SyncConfig {
                    debounce: Duration::from_millis(20),
                    ..SyncConfig::default()
                },
                ..ProjectOptions::default()
            },
        )
        .unwrap();
        TestProject {
            _dir: dir,
            root,
            project,
            parser,
            paths,
        }
    }

    /// Write a source file and its event sidecar; returns the canonical
    /// source path.
    fn write(&self, name: &str, content: &str, events: &str) -> PathBuf {
        let path = self.root.join(name);
        std::fs::write(&path, content).unwrap();
        std::fs::write(format!("{}.events", path.display()), events).unwrap();
        std::fs::canonicalize(&path).unwrap()
    }

    async fn index(&self, path: &Path) {
        let source = Source::new(self.paths.intern(path), Language::from_path(path));
        self.project.index(source, IndexType::Reindex).await;
    }

    async fn query(&self, line: &str) -> Vec<String> {
        let request = Request::parse(line).unwrap();
        execute(&self.project, &request).await
    }
}

/// Poll until `check` passes or the deadline runs out.
async fn wait_for<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..300 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

fn foo_events(path: &Path) -> String {
    format!(
        "cursor decl {p}:1:5 4-9 c:@F@foo foo()\n\
         ref {p}:1:29\n\
         cursor ref {p}:1:29 28-31 c:@F@foo foo\n\
         target {p}:1:5\n",
        p = path.display()
    )
}

const FOO_SOURCE: &str = "int foo(); int main(){ return foo(); }\n";

#[tokio::test]
async fn scenario_follow_call_site_to_declaration() {
    let tp = TestProject::new();
    let a = tp.write("a.cpp", FOO_SOURCE, "");
    std::fs::write(format!("{}.events", a.display()), foo_events(&a)).unwrap();

    tp.index(&a).await;
    wait_for("index to merge", || async {
        !tp.project.find_symbol("foo()").await.is_empty()
    })
    .await;

    let lines = tp
        .query(&format!("follow --no-context {}:1:29", a.display()))
        .await;
    assert_eq!(lines, vec![format!("{}:1:5", a.display())]);

    // With context the declaring line is appended after a tab.
    let with_context = tp.query(&format!("follow {}:1:29", a.display())).await;
    assert_eq!(
        with_context,
        vec![format!("{}:1:5\t{}", a.display(), FOO_SOURCE.trim_end())]
    );
}

#[tokio::test]
async fn scenario_references_by_name() {
    let tp = TestProject::new();
    let a = tp.write("a.cpp", FOO_SOURCE, "");
    std::fs::write(format!("{}.events", a.display()), foo_events(&a)).unwrap();

    tp.index(&a).await;
    wait_for("index to merge", || async {
        !tp.project.find_symbol("foo()").await.is_empty()
    })
    .await;

    // The bare name resolves through the symbol map and is broadcast;
    // output holds the declaration and the call in stable order.
    let lines = tp.query("references --no-context foo").await;
    assert_eq!(
        lines,
        vec![
            format!("{}:1:5", a.display()),
            format!("{}:1:29", a.display()),
        ]
    );
}

#[tokio::test]
async fn scenario_list_symbols_by_prefix() {
    let tp = TestProject::new();
    let a = tp.write("a.cpp", FOO_SOURCE, "");
    std::fs::write(format!("{}.events", a.display()), foo_events(&a)).unwrap();

    tp.index(&a).await;
    wait_for("index to merge", || async {
        !tp.project.find_symbol("foo()").await.is_empty()
    })
    .await;

    assert_eq!(tp.query("list-symbols fo").await, vec!["foo()"]);
    assert!(tp.query("list-symbols zzz").await.is_empty());
}

#[tokio::test]
async fn scenario_super_and_subclasses() {
    let tp = TestProject::new();
    let b = tp.write(
        "b.cpp",
        "class A {}; class B : public A {};\n",
        "",
    );
    let events = format!(
        "cursor class-decl {p}:1:7 6-7 c:@S@A A\n\
         cursor class-def {p}:1:19 18-33 c:@S@B B\n\
         base c:@S@A\n",
        p = b.display()
    );
    std::fs::write(format!("{}.events", b.display()), events).unwrap();

    tp.index(&b).await;
    wait_for("index to merge", || async {
        !tp.project.find_symbol("B").await.is_empty()
    })
    .await;

    let supers = tp
        .query(&format!("find-super --no-context {}:1:19", b.display()))
        .await;
    assert_eq!(supers, vec![format!("{}:1:7", b.display())]);

    let subs = tp
        .query(&format!("find-subs --no-context {}:1:7", b.display()))
        .await;
    assert_eq!(subs, vec![format!("{}:1:19", b.display())]);

    // Name-based broadcast works too.
    assert_eq!(
        tp.query("find-super --no-context B").await,
        vec![format!("{}:1:7", b.display())]
    );
}

#[tokio::test]
async fn scenario_dirty_propagation_through_includes() {
    let tp = TestProject::new();
    let header = tp.write("a.h", "int g();\n", "");
    let unit = tp.write("b.cpp", "#include \"a.h\"\nint call(){ return g(); }\n", "");
    let events = format!(
        "cursor decl {h}:1:5 4-6 c:@F@g g()\n\
         ref {u}:2:20\n\
         cursor ref {u}:2:20 34-35 c:@F@g g\n\
         target {h}:1:5\n\
         dep {h}\n\
         visited {h}\n",
        h = header.display(),
        u = unit.display(),
    );
    std::fs::write(format!("{}.events", unit.display()), events).unwrap();

    tp.index(&unit).await;
    wait_for("unit to merge", || async {
        !tp.project.find_symbol("g()").await.is_empty()
    })
    .await;

    // dirty(a.h) = {a.h, b.cpp}: the header plus its including unit.
    let header_id = tp.paths.intern(&header);
    let unit_id = tp.paths.intern(&unit);
    let reverse = tp
        .project
        .dependencies(header_id, DependencyMode::ArgDependsOn)
        .await;
    assert!(reverse.contains(&unit_id));

    // Touch the header; exactly one unit gets scheduled.
    std::fs::write(&header, "int g();\n").unwrap();
    let scheduled = tp.project.dirty(&header).await;
    assert_eq!(scheduled, 1);

    wait_for("reindex to settle", || async {
        tp.parser.calls(&unit) == 2 && !tp.project.is_indexing().await
    })
    .await;

    // Follow on the call site still resolves into the header.
    let lines = tp
        .query(&format!("follow --no-context {}:2:20", unit.display()))
        .await;
    assert_eq!(lines, vec![format!("{}:1:5", header.display())]);
}

#[tokio::test]
async fn scenario_crash_retry_recovers() {
    let tp = TestProject::new();
    let c = tp.write("c.cpp", "int c();\n", "");
    std::fs::write(
        format!("{}.events", c.display()),
        format!("cursor decl {p}:1:5 4-6 c:@F@c c()\n", p = c.display()),
    )
    .unwrap();

    tp.parser.crash_next(&c, 2);
    tp.index(&c).await;

    wait_for("crashing job to recover", || async {
        !tp.project.find_symbol("c()").await.is_empty()
    })
    .await;
    assert_eq!(tp.parser.calls(&c), 3);

    let lines = tp.query("find-symbols --no-context c()").await;
    assert_eq!(lines, vec![format!("{}:1:5", c.display())]);
}

#[tokio::test]
async fn empty_results_render_as_empty_payload() {
    let tp = TestProject::new();

    let lines = tp.query("follow no_such_symbol").await;
    assert!(lines.is_empty());
    assert_eq!(render(lines, OutputFlags::default()), "");

    // Usage errors are the caller's exit-1 path.
    assert!(Request::parse("bogus-mode arg").is_err());
}

#[tokio::test]
async fn files_query_filters_by_substring() {
    let tp = TestProject::new();
    let a = tp.write("alpha.cpp", FOO_SOURCE, "");
    std::fs::write(format!("{}.events", a.display()), foo_events(&a)).unwrap();

    tp.index(&a).await;
    wait_for("index to merge", || async {
        !tp.project.find_symbol("foo()").await.is_empty()
    })
    .await;

    let all = tp.query("files").await;
    assert!(all.iter().any(|l| l.contains("alpha.cpp")));

    let filtered = tp.query("files alpha").await;
    assert_eq!(filtered.len(), 1);

    let relative = tp.query("files --paths-relative-to-root alpha").await;
    assert_eq!(relative, vec!["alpha.cpp"]);

    assert!(tp.query("files zzz").await.is_empty());
}
