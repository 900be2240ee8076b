use std::path::PathBuf;
use std::time::Duration;

/// Device + inode pair used only to de-duplicate tests during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    pub dev: u64,
    pub ino: u64,
}

/// A single discovered package test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Test {
    /// Directory name under the discovery root.
    pub name: String,
    /// Absolute path to `<root>/<name>/ptest/run-ptest`.
    pub run_path: PathBuf,
    pub file_identity: FileIdentity,
}

/// Ordered, de-duplicated collection of [`Test`]s.
///
/// Order is whatever the producer (discoverer or filter) inserted in;
/// neither type re-sorts on construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    tests: Vec<Test>,
}

impl Registry {
    pub fn new() -> Self {
        Self { tests: Vec::new() }
    }

    /// Append `test` unless a test with the same `file_identity` is already
    /// present. Returns `true` if it was appended.
    pub fn push_if_new(&mut self, test: Test) -> bool {
        if self
            .tests
            .iter()
            .any(|t| t.file_identity == test.file_identity)
        {
            return false;
        }
        self.tests.push(test);
        true
    }

    /// Append `test` unconditionally. Callers (e.g. the filter) that already
    /// know the source registry has no duplicates may use this directly.
    pub fn push(&mut self, test: Test) {
        self.tests.push(test);
    }

    pub fn by_name(&self, name: &str) -> Option<&Test> {
        self.tests.iter().find(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Test> {
        self.tests.iter()
    }
}

impl<'a> IntoIterator for &'a Registry {
    type Item = &'a Test;
    type IntoIter = std::slice::Iter<'a, Test>;

    fn into_iter(self) -> Self::IntoIter {
        self.tests.iter()
    }
}

impl IntoIterator for Registry {
    type Item = Test;
    type IntoIter = std::vec::IntoIter<Test>;

    fn into_iter(self) -> Self::IntoIter {
        self.tests.into_iter()
    }
}

/// Configuration consumed by the supervisor.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub roots: Vec<PathBuf>,
    pub excludes: Vec<String>,
    pub selected: Vec<String>,
    pub list_only: bool,
    pub timeout: Duration,
    pub xml_path: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            excludes: Vec::new(),
            selected: Vec::new(),
            list_only: false,
            timeout: Duration::from_secs(60),
            xml_path: None,
        }
    }
}

/// Outcome of running one [`Test`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseResult {
    pub name: String,
    pub exit_status: i32,
    pub timed_out: bool,
    pub duration: Duration,
}

/// Ordered outcomes of one invocation.
#[derive(Debug, Clone)]
pub struct SuiteResult {
    pub program_name: String,
    pub cases: Vec<CaseResult>,
}
