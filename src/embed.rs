//! Source embedding.
//!
//! Collects the user's C sources, and the local headers they include, into
//! an archive that is compiled into the binary so the runtime tooling can
//! show source without needing the original files. Embedding is best
//! effort: a file that cannot be embedded is skipped, never reported.

pub mod archive;
pub mod minify;

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use hashbrown::HashSet;
use indexmap::IndexMap;
use log::{debug, trace};
use regex::Regex;
use thiserror::Error;

/// Larger files are left out of the archive.
pub const MAX_EMBEDDED_BYTES: u64 = 1_000_000;

/// Runtime helpers shipped alongside the user's sources.
pub const HELPER_SCRIPTS: [&str; 4] = ["start_gdb.py", "drive_gdb.py", "watch_valgrind.py", "colors.py"];

static QUOTED_INCLUDE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*#\s*include\s*"(.*?)""#).expect("valid regex"));

/// Read access to the files being embedded.
pub trait SourceTree {
    fn file_size(&self, path: &Path) -> io::Result<u64>;
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// The real file system, relative paths resolved against the working
/// directory.
pub struct FileTree;

impl SourceTree for FileTree {
    fn file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// Why a candidate was left out.
#[derive(Debug, Error)]
pub enum Skip {
    #[error("it has an absolute path")]
    Absolute,
    #[error("it contains ..")]
    ParentTraversal,
    #[error("normalized path differs: {0}")]
    NotNormalized(String),
    #[error("it is {0} bytes")]
    TooLarge(u64),
    #[error("{0}")]
    Unreadable(#[from] io::Error),
}

/// Lexically normalizes `path`: no `.` components, no empty components,
/// and `..` folded into its parent where there is one.
fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." if parts.last().is_some_and(|p| *p != "..") => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    if parts.is_empty() { ".".to_string() } else { parts.join("/") }
}

/// Archive member name for `path`, if it is safe to embed.
///
/// The path must be relative, stay below the working directory, and already
/// be in normal form, apart from an optional leading `./`.
pub fn member_name(path: &str) -> Result<String, Skip> {
    if Path::new(path).has_root() {
        return Err(Skip::Absolute);
    }
    let normalized = normalize(path);
    if path != normalized && path.strip_prefix("./") != Some(normalized.as_str()) {
        return Err(Skip::NotNormalized(normalized));
    }
    if Path::new(&normalized).components().any(|c| c == Component::ParentDir) {
        return Err(Skip::ParentTraversal);
    }
    Ok(normalized)
}

/// Local includes of `source`, as spelled.
fn quoted_includes(source: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(source)
        .lines()
        .filter_map(|line| QUOTED_INCLUDE_RE.captures(line))
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Path of an include spelling, relative to the including file.
fn resolve_include(includer: &str, spelling: &str) -> String {
    match Path::new(includer).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(spelling).to_string_lossy().into_owned(),
        _ => spelling.to_string(),
    }
}

/// Ordered, deduplicated archive contents.
#[derive(Debug, Default)]
pub struct EmbeddedArchive {
    members: IndexMap<String, Vec<u8>>,
}

impl EmbeddedArchive {
    /// Walks `entries` and their quoted includes depth first.
    pub fn collect<'a>(entries: impl IntoIterator<Item = &'a str>, tree: &dyn SourceTree) -> Self {
        let mut archive = EmbeddedArchive::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut worklist: Vec<String> = Vec::new();

        let entries: Vec<&str> = entries.into_iter().collect();
        for entry in entries.iter().rev() {
            enqueue(entry, &mut worklist);
        }

        while let Some(name) = worklist.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            let contents = match read_limited(tree, Path::new(&name)) {
                Ok(contents) => contents,
                Err(skip) => {
                    debug!("not embedding source of {name} because {skip}");
                    continue;
                }
            };
            trace!("adding {name} to tar file");
            let includes = quoted_includes(&contents);
            archive.members.insert(name.clone(), contents);
            for spelling in includes.iter().rev() {
                enqueue(&resolve_include(&name, spelling), &mut worklist);
            }
        }
        archive
    }

    /// Adds the helper scripts found in `helper_dir`, minifying Python.
    pub fn add_helpers(&mut self, helper_dir: &Path, tree: &dyn SourceTree) {
        for script in HELPER_SCRIPTS {
            let path: PathBuf = helper_dir.join(script);
            match tree.read(&path) {
                Ok(contents) => {
                    let contents = if script.ends_with(".py") {
                        minify::minify_bytes(&contents)
                    } else {
                        contents
                    };
                    self.members.insert(script.to_string(), contents);
                }
                Err(e) => debug!("helper {} not embedded: {e}", path.display()),
            }
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.members.get(name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The gzip-compressed tar stream.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        archive::write_archive(self.members.iter().map(|(name, data)| (name.as_str(), data.as_slice())))
    }
}

/// Pushes the member name of `candidate` if it is safe to embed.
fn enqueue(candidate: &str, worklist: &mut Vec<String>) {
    match member_name(candidate) {
        Ok(name) => worklist.push(name),
        Err(skip) => debug!("not embedding source of {candidate} because {skip}"),
    }
}

fn read_limited(tree: &dyn SourceTree, path: &Path) -> Result<Vec<u8>, Skip> {
    let size = tree.file_size(path)?;
    if size > MAX_EMBEDDED_BYTES {
        return Err(Skip::TooLarge(size));
    }
    Ok(tree.read(path)?)
}

/// Builds the archive bytes for the wrapper, or nothing when embedding is
/// off. With embedding off the source tree is never touched.
pub fn embed_sources<'a>(
    enabled: bool,
    entries: impl IntoIterator<Item = &'a str>,
    helper_dir: &Path,
    tree: &dyn SourceTree,
) -> io::Result<Option<Vec<u8>>> {
    if !enabled {
        return Ok(None);
    }
    let mut archive = EmbeddedArchive::collect(entries, tree);
    archive.add_helpers(helper_dir, tree);
    debug!("embedding {} files: {}", archive.len(), itertools::join(archive.names(), " "));
    archive.to_bytes().map(Some)
}

#[cfg(test)]
mod tests_embed;
