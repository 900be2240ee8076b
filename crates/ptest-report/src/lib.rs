//! Hand-rolled XML report writer.
//!
//! The format is byte-specified (literal single-quote attribute quoting, no
//! self-closing shorthand except `<failure type='timeout'/>`), so this is
//! written directly with `write!` rather than through a generic XML crate --
//! matching how the original tool emits it with raw `fprintf`.

use ptest_core::{CaseResult, PtestError};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Incrementally writes one `<testsuite>` document: opened before the first
/// case runs, appended to after each case, closed after the last.
pub struct ReportWriter {
    out: BufWriter<File>,
}

impl ReportWriter {
    /// Open `path` for the report and write the document header plus the
    /// opening `<testsuite>` tag. `total` is the number of cases the suite
    /// will contain.
    ///
    /// Returns [`PtestError::InvalidInput`] if `path` names a directory --
    /// there is no sensible way to open a directory for writing.
    pub fn create(path: &Path, total: usize) -> Result<Self, PtestError> {
        if path.is_dir() {
            return Err(PtestError::InvalidInput(format!(
                "xml report path '{}' is a directory",
                path.display()
            )));
        }

        let file = File::create(path)?;
        let mut out = BufWriter::new(file);
        write!(out, "<?xml version='1.0' encoding='UTF-8'?>\n")?;
        write!(out, "<testsuite name='ptest' tests='{total}'>\n")?;
        Ok(Self { out })
    }

    /// Append one `<testcase>` entry for `case`.
    pub fn write_case(&mut self, case: &CaseResult) -> std::io::Result<()> {
        write!(
            self.out,
            "  <testcase classname='{}' name='run-ptest'>\n",
            case.name
        )?;
        write!(
            self.out,
            "    <duration>{}</duration>\n",
            case.duration.as_secs()
        )?;
        if case.exit_status != 0 {
            write!(
                self.out,
                "    <failure type='exit_code' message='run-ptest exited with code: {}'></failure>\n",
                case.exit_status
            )?;
        }
        if case.timed_out {
            write!(self.out, "    <failure type='timeout'/>\n")?;
        }
        write!(self.out, "  </testcase>\n")?;
        Ok(())
    }

    /// Write the closing tag and flush to disk.
    pub fn finish(mut self) -> std::io::Result<()> {
        write!(self.out, "</testsuite>\n")?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn case(name: &str, exit_status: i32, timed_out: bool, duration_secs: u64) -> CaseResult {
        CaseResult {
            name: name.to_string(),
            exit_status,
            timed_out,
            duration: Duration::from_secs(duration_secs),
        }
    }

    #[test]
    fn golden_two_case_document() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("report.xml");

        let mut writer = ReportWriter::create(&path, 2).unwrap();
        writer.write_case(&case("test1", 0, false, 5)).unwrap();
        writer.write_case(&case("test2", 1, true, 10)).unwrap();
        writer.finish().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let expected = "<?xml version='1.0' encoding='UTF-8'?>\n\
<testsuite name='ptest' tests='2'>\n\
  <testcase classname='test1' name='run-ptest'>\n\
    <duration>5</duration>\n\
  </testcase>\n\
  <testcase classname='test2' name='run-ptest'>\n\
    <duration>10</duration>\n\
    <failure type='exit_code' message='run-ptest exited with code: 1'></failure>\n\
    <failure type='timeout'/>\n\
  </testcase>\n\
</testsuite>\n";
        assert_eq!(contents, expected);
    }

    #[test]
    fn opening_a_directory_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ReportWriter::create(tmp.path(), 0).unwrap_err();
        assert!(matches!(err, PtestError::InvalidInput(_)));
    }

    #[test]
    fn empty_suite_is_well_formed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("empty.xml");
        let writer = ReportWriter::create(&path, 0).unwrap();
        writer.finish().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "<?xml version='1.0' encoding='UTF-8'?>\n<testsuite name='ptest' tests='0'>\n</testsuite>\n"
        );
    }
}
