//! Batch builder and runner.
//!
//! A `Batch` holds stages in execution order. Rendering walks the stages
//! once, threading the output file name of each stage into the input of the
//! next, and produces the script text that `sbebatch` consumes:
//!
//! ```text
//! @ Generated by the seabird-processing Python package
//! datcnv /iraw*.hex /pDatCnv.psa /oconverted
//! filter /iraw*.cnv /pFilter.psa
//! ```

use tracing::debug;

use crate::error::{BatchError, Result};
use crate::executor::BatchRunner;
use crate::stage::Stage;

/// First line of every generated script. The external tool's parser treats
/// lines starting with `@` as comments.
pub const CONFIG_HEADER_COMMENT: &str = "@ Generated by the seabird-processing Python package";

/// Leaf component of `path`. Both `/` and `\` count as separators.
pub fn base_name(path: &str) -> String {
    let trimmed = path.trim_end_matches(['/', '\\']);
    match trimmed.rfind(['/', '\\']) {
        Some(idx) => trimmed[idx + 1..].to_string(),
        None => trimmed.to_string(),
    }
}

/// An ordered chain of stages rendered into one `sbebatch` script.
#[derive(Default)]
pub struct Batch {
    stages: Vec<Box<dyn Stage>>,
}

impl Batch {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// Append a stage to the end of the chain.
    pub fn push(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> &[Box<dyn Stage>] {
        &self.stages
    }

    /// Render the batch script for `input_file_pattern`.
    ///
    /// The first stage sees the pattern as given; every later stage sees the
    /// base name of the previous stage's output path. Returns one header line
    /// plus one line per stage, joined without a trailing newline.
    pub fn render(&self, input_file_pattern: &str) -> Result<String> {
        let mut lines = Vec::with_capacity(self.stages.len() + 1);
        lines.push(CONFIG_HEADER_COMMENT.to_string());

        self.stages.iter().enumerate().try_fold(
            input_file_pattern.to_string(),
            |current, (index, stage)| {
                let wrap = |source| BatchError::Stage {
                    index,
                    name: stage.name().to_string(),
                    source,
                };
                let line = stage.exec_str(&current, true).map_err(wrap)?;
                let output = stage.output_file_path(&current).map_err(wrap)?;
                debug!(stage = stage.name(), input = %current, output = %output, "rendered stage");
                lines.push(line);
                Ok::<_, BatchError>(base_name(&output))
            },
        )?;

        Ok(lines.join("\n"))
    }

    /// Render the script and run it through `sbebatch`.
    pub fn run(&self, input_file_pattern: &str) -> Result<()> {
        self.run_with(&BatchRunner::default(), input_file_pattern)
    }

    /// Render the script and run it with an explicitly configured runner.
    pub fn run_with(&self, runner: &BatchRunner, input_file_pattern: &str) -> Result<()> {
        let script = self.render(input_file_pattern)?;
        runner.execute(&script)
    }
}

impl FromIterator<Box<dyn Stage>> for Batch {
    fn from_iter<I: IntoIterator<Item = Box<dyn Stage>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch")
            .field(
                "stages",
                &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageError;
    use crate::stage::ModuleStage;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Stage with fixed templates that records every input it is given.
    struct FakeStage {
        name: &'static str,
        output: &'static str,
        seen: Rc<RefCell<Vec<String>>>,
    }

    impl FakeStage {
        fn new(name: &'static str, output: &'static str) -> Self {
            Self {
                name,
                output,
                seen: Rc::new(RefCell::new(Vec::new())),
            }
        }
    }

    impl Stage for FakeStage {
        fn exec_str(&self, input_pattern: &str, batch_mode: bool) -> std::result::Result<String, StageError> {
            assert!(batch_mode);
            self.seen.borrow_mut().push(input_pattern.to_string());
            Ok(format!("{} -i {}", self.name, input_pattern))
        }

        fn output_file_path(&self, input_pattern: &str) -> std::result::Result<String, StageError> {
            self.seen.borrow_mut().push(input_pattern.to_string());
            Ok(self.output.to_string())
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    struct FailingStage;

    impl Stage for FailingStage {
        fn exec_str(&self, _: &str, _: bool) -> std::result::Result<String, StageError> {
            Err(StageError::Invalid("bad flags".to_string()))
        }

        fn output_file_path(&self, _: &str) -> std::result::Result<String, StageError> {
            unreachable!("exec_str fails first")
        }
    }

    /// Produces its command but cannot work out where its output goes.
    struct NoOutputStage;

    impl Stage for NoOutputStage {
        fn exec_str(&self, input_pattern: &str, _: bool) -> std::result::Result<String, StageError> {
            Ok(format!("nooutput -i {input_pattern}"))
        }

        fn output_file_path(&self, _: &str) -> std::result::Result<String, StageError> {
            Err(StageError::Invalid("no output directory".to_string()))
        }

        fn name(&self) -> &str {
            "nooutput"
        }
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("dir/out_a.cnv"), "out_a.cnv");
        assert_eq!(base_name(r"C:\data\out.cnv"), "out.cnv");
        assert_eq!(base_name("a/b\\c.cnv"), "c.cnv");
        assert_eq!(base_name("plain.cnv"), "plain.cnv");
        assert_eq!(base_name("dir/sub/"), "sub");
        assert_eq!(base_name(""), "");
    }

    #[test]
    fn test_render_two_stages() {
        let batch = Batch::default()
            .push(FakeStage::new("stageA", "dir/out_a.cnv"))
            .push(FakeStage::new("stageB", "out_b.cnv"));

        let script = batch.render("raw*.hex").unwrap();
        assert_eq!(
            script,
            "@ Generated by the seabird-processing Python package\n\
             stageA -i raw*.hex\n\
             stageB -i out_a.cnv"
        );
    }

    #[test]
    fn test_render_threads_base_names() {
        let a = FakeStage::new("a", "x/y/first.cnv");
        let b = FakeStage::new("b", r"C:\tmp\second.cnv");
        let c = FakeStage::new("c", "third.cnv");
        let (seen_a, seen_b, seen_c) = (a.seen.clone(), b.seen.clone(), c.seen.clone());

        let batch = Batch::default().push(a).push(b).push(c);
        batch.render("in/raw.hex").unwrap();

        // First stage sees the pattern unstripped.
        assert_eq!(*seen_a.borrow(), vec!["in/raw.hex", "in/raw.hex"]);
        assert_eq!(*seen_b.borrow(), vec!["first.cnv", "first.cnv"]);
        assert_eq!(*seen_c.borrow(), vec!["second.cnv", "second.cnv"]);
    }

    #[test]
    fn test_render_line_count() {
        let batch: Batch = (0..5)
            .map(|_| Box::new(FakeStage::new("s", "o.cnv")) as Box<dyn Stage>)
            .collect();
        let script = batch.render("*.hex").unwrap();
        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], CONFIG_HEADER_COMMENT);
        assert!(!script.ends_with('\n'));
    }

    #[test]
    fn test_render_empty_batch() {
        let batch = Batch::default();
        assert!(batch.is_empty());
        assert_eq!(batch.render("anything").unwrap(), CONFIG_HEADER_COMMENT);
    }

    #[test]
    fn test_render_is_repeatable() {
        let batch: Batch = vec![
            Box::new(ModuleStage::new("datcnv").output_dir("conv")) as Box<dyn Stage>,
            Box::new(ModuleStage::new("filter")),
        ]
        .into_iter()
        .collect();

        let first = batch.render("raw*.hex").unwrap();
        let second = batch.render("raw*.hex").unwrap();
        assert_eq!(first, second);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_render_module_stages() {
        let batch = Batch::default()
            .push(
                ModuleStage::new("datcnv")
                    .psa("DatCnv.psa")
                    .output_dir("converted"),
            )
            .push(ModuleStage::new("binavg").append("_1m"))
            .push(ModuleStage::new("derive"));

        assert_eq!(
            batch.render("raw/cast*.hex").unwrap(),
            "@ Generated by the seabird-processing Python package\n\
             datcnv /iraw/cast*.hex /pDatCnv.psa /oconverted\n\
             binavg /icast*.cnv /a_1m\n\
             derive /icast*_1m.cnv"
        );
    }

    #[test]
    fn test_stage_error_stops_rendering() {
        let after = FakeStage::new("after", "z.cnv");
        let seen_after = after.seen.clone();
        let batch = Batch::default()
            .push(FakeStage::new("before", "a.cnv"))
            .push(FailingStage)
            .push(after);

        let err = batch.render("raw.hex").unwrap_err();
        match err {
            BatchError::Stage { index, name, source } => {
                assert_eq!(index, 1);
                assert_eq!(name, "stage");
                assert_eq!(source, StageError::Invalid("bad flags".to_string()));
            }
            other => panic!("Expected Stage error, got {other:?}"),
        }
        assert!(seen_after.borrow().is_empty());
    }

    #[test]
    fn test_output_path_error_stops_rendering() {
        let after = FakeStage::new("after", "z.cnv");
        let seen_after = after.seen.clone();
        let batch = Batch::default()
            .push(FakeStage::new("first", "dir/a.cnv"))
            .push(NoOutputStage)
            .push(after);

        let err = batch.render("raw.hex").unwrap_err();
        match err {
            BatchError::Stage { index, name, source } => {
                assert_eq!(index, 1);
                assert_eq!(name, "nooutput");
                assert_eq!(source, StageError::Invalid("no output directory".to_string()));
            }
            other => panic!("Expected Stage error, got {other:?}"),
        }
        assert!(seen_after.borrow().is_empty());
    }

    #[test]
    fn test_run_propagates_stage_error_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let runner = BatchRunner::new()
            .program("definitely-not-a-real-program-xyz")
            .temp_dir(dir.path());
        let batch = Batch::default().push(FailingStage);

        let err = batch.run_with(&runner, "raw.hex").unwrap_err();
        assert!(matches!(err, BatchError::Stage { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_debug_lists_stage_names() {
        let batch = Batch::default()
            .push(ModuleStage::new("datcnv"))
            .push(ModuleStage::new("filter"));
        assert_eq!(
            format!("{batch:?}"),
            r#"Batch { stages: ["datcnv", "filter"] }"#
        );
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::fs;
        use std::path::Path;

        /// Runner that feeds the script path to a shell script standing in
        /// for `sbebatch`.
        fn fake_runner(dir: &Path, body: &str) -> BatchRunner {
            let path = dir.join("fake-sbebatch.sh");
            fs::write(&path, format!("{body}\n")).unwrap();
            BatchRunner::new()
                .program("sh")
                .args([path.to_string_lossy().into_owned()])
        }

        #[test]
        fn test_run_empty_batch_sends_header_only() {
            let scratch = tempfile::tempdir().unwrap();
            let tmp = tempfile::tempdir().unwrap();
            let captured = scratch.path().join("captured.txt");
            let runner = fake_runner(
                scratch.path(),
                &format!("cat \"$1\" > '{}'", captured.display()),
            )
            .temp_dir(tmp.path());

            Batch::default().run_with(&runner, "x").unwrap();

            assert_eq!(fs::read_to_string(&captured).unwrap(), CONFIG_HEADER_COMMENT);
            assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
        }

        #[test]
        fn test_run_sends_rendered_script() {
            let scratch = tempfile::tempdir().unwrap();
            let tmp = tempfile::tempdir().unwrap();
            let captured = scratch.path().join("captured.txt");
            let runner = fake_runner(
                scratch.path(),
                &format!("cat \"$1\" > '{}'", captured.display()),
            )
            .temp_dir(tmp.path());
            let batch = Batch::default()
                .push(FakeStage::new("stageA", "dir/out_a.cnv"))
                .push(FakeStage::new("stageB", "out_b.cnv"));

            batch.run_with(&runner, "raw*.hex").unwrap();

            assert_eq!(
                fs::read_to_string(&captured).unwrap(),
                batch.render("raw*.hex").unwrap()
            );
            assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
        }

        #[test]
        fn test_run_nonzero_exit_is_process_failure() {
            let scratch = tempfile::tempdir().unwrap();
            let tmp = tempfile::tempdir().unwrap();
            let runner = fake_runner(scratch.path(), "exit 3").temp_dir(tmp.path());
            let batch = Batch::default()
                .push(ModuleStage::new("datcnv").output_dir("converted"))
                .push(ModuleStage::new("filter"));

            let err = batch.run_with(&runner, "raw*.hex").unwrap_err();
            match err {
                BatchError::ProcessFailure { command, code } => {
                    assert!(command.starts_with("sh "));
                    assert_eq!(code, Some(3));
                }
                other => panic!("Expected ProcessFailure, got {other:?}"),
            }
            assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
        }
    }
}
