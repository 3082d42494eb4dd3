use super::*;
use crate::test_utils::MemoryTree;

fn names(archive: &EmbeddedArchive) -> Vec<&str> {
    archive.names().collect()
}

#[test]
fn test_member_name_accepts_normal_relative_paths() {
    assert_eq!(member_name("prog.c").unwrap(), "prog.c");
    assert_eq!(member_name("./prog.c").unwrap(), "prog.c");
    assert_eq!(member_name("lib/util.h").unwrap(), "lib/util.h");
}

#[test]
fn test_member_name_rejects_unsafe_paths() {
    assert!(matches!(member_name("/etc/passwd.h"), Err(Skip::Absolute)));
    assert!(matches!(member_name("../secret.c"), Err(Skip::ParentTraversal)));
    assert!(matches!(member_name("a/../../b.c"), Err(Skip::NotNormalized(_))));
    assert!(matches!(member_name("a//b.c"), Err(Skip::NotNormalized(ref n)) if n == "a/b.c"));
    assert!(matches!(member_name("a/./b.c"), Err(Skip::NotNormalized(_))));
}

#[test]
fn test_follows_quoted_includes_depth_first() {
    let tree = MemoryTree::default()
        .with("main.c", "#include <stdio.h>\n#include \"a.h\"\n  #  include \"b.h\"\n")
        .with("a.h", "#include \"c.h\"\n")
        .with("b.h", "")
        .with("c.h", "");
    let archive = EmbeddedArchive::collect(["main.c"], &tree);
    assert_eq!(names(&archive), vec!["main.c", "a.h", "c.h", "b.h"]);
    assert_eq!(archive.get("b.h"), Some(&b""[..]));
}

#[test]
fn test_header_included_twice_is_embedded_once() {
    let tree = MemoryTree::default()
        .with("main.c", "#include \"util.h\"\n#include \"./util.h\"\n")
        .with("other.c", "#include \"util.h\"\n")
        .with("util.h", "int util(void);\n");
    let archive = EmbeddedArchive::collect(["main.c", "other.c", "./main.c"], &tree);
    assert_eq!(names(&archive), vec!["main.c", "util.h", "other.c"]);
}

#[test]
fn test_includes_resolve_next_to_includer() {
    let tree = MemoryTree::default()
        .with("src/main.c", "#include \"defs.h\"\n#include \"../escape.h\"\n")
        .with("src/defs.h", "");
    let archive = EmbeddedArchive::collect(["src/main.c"], &tree);
    assert_eq!(names(&archive), vec!["src/main.c", "src/defs.h"]);
}

#[test]
fn test_unreadable_and_oversized_files_are_skipped() {
    let big = "x".repeat(MAX_EMBEDDED_BYTES as usize + 1);
    let tree = MemoryTree::default()
        .with("main.c", "#include \"missing.h\"\n#include \"big.h\"\n")
        .with("big.h", &big);
    let archive = EmbeddedArchive::collect(["main.c", "/abs/x.c"], &tree);
    assert_eq!(names(&archive), vec!["main.c"]);
}

#[test]
fn test_unsafe_entries_are_never_read() {
    let tree = MemoryTree::default();
    let archive = EmbeddedArchive::collect(["/tmp/x.c", "../y.c"], &tree);
    assert!(archive.is_empty());
    assert!(tree.accessed.borrow().is_empty());
}

#[test]
fn test_helpers_are_minified_and_missing_ones_skipped() {
    let tree = MemoryTree::default()
        .with("/opt/dcc/start_gdb.py", "# comment\nimport gdb\n")
        .with("/opt/dcc/colors.py", "RED = 1\n");
    let mut archive = EmbeddedArchive::default();
    archive.add_helpers(Path::new("/opt/dcc"), &tree);
    assert_eq!(names(&archive), vec!["start_gdb.py", "colors.py"]);
    assert_eq!(archive.get("start_gdb.py"), Some(&b"import gdb\n"[..]));
}

#[test]
fn test_disabled_embedding_touches_nothing() {
    let tree = MemoryTree::default().with("main.c", "");
    let bytes = embed_sources(false, ["main.c"], Path::new("/opt/dcc"), &tree).unwrap();
    assert!(bytes.is_none());
    assert!(tree.accessed.borrow().is_empty());
}

#[test]
fn test_enabled_embedding_produces_archive() {
    let tree = MemoryTree::default()
        .with("main.c", "#include \"x.h\"\n")
        .with("x.h", "")
        .with("/opt/dcc/watch_valgrind.py", "pass\n");
    let bytes = embed_sources(true, ["main.c"], Path::new("/opt/dcc"), &tree)
        .unwrap()
        .unwrap();

    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(&bytes[..]));
    let members: Vec<String> = archive
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(members, vec!["main.c", "x.h", "watch_valgrind.py"]);
}
