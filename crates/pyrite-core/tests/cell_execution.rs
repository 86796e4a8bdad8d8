//! Integration tests for cell execution against the embedded runtime.
//!
//! Each test builds its own session (own persistent namespace). A
//! process-wide lock serializes executions: stdout/stderr capture in
//! the bootstrap assumes one cell runs at a time.

use std::sync::{Mutex, MutexGuard, OnceLock};

use pyrite_core::{CellOutput, InterpreterSession, OutputKind, SessionConfig};
use tempfile::TempDir;

fn execution_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// RAII wrapper for a test session with its own temp directory.
struct TestSession {
    _dir: TempDir,
    session: InterpreterSession,
}

impl TestSession {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = SessionConfig {
            root: Some(dir.path().to_path_buf()),
            skip_preload: true,
        };
        let session = InterpreterSession::initialize(&config, |_| {})
            .expect("Failed to initialize session");
        Self { _dir: dir, session }
    }

    fn run(&self, source: &str) -> CellOutput {
        self.session.execute_normalized(source)
    }
}

fn single_text(output: &CellOutput) -> &str {
    match output {
        CellOutput::Single(record) => {
            assert_eq!(record.kind, OutputKind::Text, "expected text, got {record:?}");
            &record.payload
        }
        other => panic!("Expected single record, got {other:?}"),
    }
}

#[test]
fn test_assignment_yields_empty_text() {
    let _guard = execution_lock();
    let session = TestSession::new();

    let output = session.run("x = 5");
    assert_eq!(single_text(&output), "");
}

#[test]
fn test_print_yields_trimmed_stdout() {
    let _guard = execution_lock();
    let session = TestSession::new();

    let output = session.run("print('hello world')");
    assert_eq!(single_text(&output), "hello world");
}

#[test]
fn test_globals_persist_across_executions() {
    let _guard = execution_lock();
    let session = TestSession::new();

    session.run("x = 5");
    let output = session.run("x");
    assert_eq!(single_text(&output), "5");
}

#[test]
fn test_trailing_expression_autodisplays() {
    let _guard = execution_lock();
    let session = TestSession::new();

    let output = session.run("1 + 1");
    assert_eq!(single_text(&output), "2");
}

#[test]
fn test_def_is_not_evaluated_as_expression() {
    let _guard = execution_lock();
    let session = TestSession::new();

    let output = session.run("def f(): pass");
    assert_eq!(single_text(&output), "");
}

#[test]
fn test_raise_yields_error_record() {
    let _guard = execution_lock();
    let session = TestSession::new();

    let output = session.run("raise ValueError('bad')");
    assert!(output.is_error());
    assert!(output.records()[0].payload.contains("bad"));

    // The namespace stays usable for the next execution.
    let output = session.run("2 + 2");
    assert_eq!(single_text(&output), "4");
}

#[test]
fn test_stderr_takes_precedence_over_stdout() {
    let _guard = execution_lock();
    let session = TestSession::new();

    let output = session.run("import sys\nprint('collected')\nsys.stderr.write('warned')");
    assert!(output.is_error());
    let payload = &output.records()[0].payload;
    assert!(payload.contains("warned"));
    assert!(!payload.contains("collected"));
}

#[test]
fn test_exception_discards_collected_entries() {
    let _guard = execution_lock();
    let session = TestSession::new();

    let output = session.run("print('collected')\nraise RuntimeError('boom')");
    assert!(output.is_error());
    assert_eq!(output.records().len(), 1);
    assert!(output.records()[0].payload.contains("boom"));
}

#[test]
fn test_stdout_then_value_keeps_presentation_order() {
    let _guard = execution_lock();
    let session = TestSession::new();

    let output = session.run("print('first')\n1 + 2");
    match &output {
        CellOutput::Many(records) => {
            assert_eq!(records.len(), 2);
            assert_eq!(records[0].payload, "first");
            assert_eq!(records[1].payload, "3");
        }
        other => panic!("Expected two records, got {other:?}"),
    }
}

#[test]
fn test_print_call_excluded_from_trailing_expression() {
    let _guard = execution_lock();
    let session = TestSession::new();

    // If print(...) were re-evaluated as an expression, the payload
    // would be duplicated or followed by "None".
    let output = session.run("print('once')");
    assert_eq!(single_text(&output), "once");
}

#[test]
fn test_invalid_syntax_reports_error() {
    let _guard = execution_lock();
    let session = TestSession::new();

    let output = session.run("def broken(:");
    assert!(output.is_error());
    assert!(output.records()[0].payload.contains("SyntaxError"));
}

#[test]
fn test_sessions_do_not_share_namespaces() {
    let _guard = execution_lock();
    let first = TestSession::new();
    let second = TestSession::new();

    first.run("marker = 'from-first'");
    let output = second.run("marker");
    assert!(output.is_error());
    assert!(output.records()[0].payload.contains("NameError"));
}

#[test]
fn test_figure_from_failed_cell_does_not_leak() {
    let _guard = execution_lock();
    let session = TestSession::new();

    // Stand-in plotting module: one open figure that renders fixed
    // bytes, closed by close("all"). Lets the cleanup path run without
    // matplotlib installed.
    let stub = r#"
import sys, types

class _Fig:
    def get_axes(self):
        return [object()]
    def savefig(self, buffer, **kwargs):
        buffer.write(b"PNGDATA")

_state = {"open": True}
pyplot = types.ModuleType("matplotlib.pyplot")
pyplot.get_fignums = lambda: [1] if _state["open"] else []
pyplot.gcf = lambda: _Fig()
pyplot.close = lambda which=None: _state.update(open=False)
matplotlib = types.ModuleType("matplotlib")
matplotlib.pyplot = pyplot
sys.modules["matplotlib"] = matplotlib
sys.modules["matplotlib.pyplot"] = pyplot
raise RuntimeError('draw failed')
"#;

    // The drawing cell fails, so it reports only the error.
    let output = session.run(stub);
    assert!(output.is_error());
    assert!(output.records()[0].payload.contains("draw failed"));

    // Its figure must not resurface as the next cell's output.
    let output = session.run("1 + 1");
    assert_eq!(single_text(&output), "2");

    // sys.modules is interpreter-wide; drop the stand-in module.
    session.run(
        "import sys\nsys.modules.pop('matplotlib', None)\nsys.modules.pop('matplotlib.pyplot', None)",
    );
}

#[test]
fn test_runtime_proxy_converted_and_disposed() {
    let _guard = execution_lock();
    // Initializing a session guarantees the runtime is up.
    let _session = TestSession::new();

    use pyo3::prelude::*;
    use pyrite_core::{RawValue, normalize, output::extract_raw};

    Python::attach(|py| {
        // range() is neither scalar nor list/dict, so it crosses the
        // boundary as a live proxy handle.
        let value = py.eval(c"range(3)", None, None).unwrap();
        let raw = extract_raw(py, &value);
        assert!(matches!(raw, RawValue::Handle(_)));

        // Normalization converts the proxy to a host value and
        // pretty-prints the resulting non-record list.
        let out = normalize(raw);
        let payload = &out.records()[0].payload;
        assert!(payload.contains('0'));
        assert!(payload.contains('2'));
    });
}

#[test]
fn test_set_extraction_becomes_ordered_list() {
    let _guard = execution_lock();
    let _session = TestSession::new();

    use pyo3::prelude::*;
    use pyrite_core::{RawValue, output::extract_raw, sanitize};

    Python::attach(|py| {
        let value = py.eval(c"{1, 2, 3}", None, None).unwrap();
        let raw = extract_raw(py, &value);
        assert!(matches!(raw, RawValue::List(_)));

        let json = sanitize(&raw);
        assert!(json.is_array());
    });
}

#[test]
#[ignore = "Requires matplotlib in the embedded runtime"]
fn test_plot_yields_single_image_and_figure_does_not_leak() {
    let _guard = execution_lock();
    let session = TestSession::new();

    let output = session.run("import matplotlib.pyplot as plt\nplt.plot([1, 2, 3])");
    match &output {
        CellOutput::Single(record) => {
            assert_eq!(record.kind, OutputKind::Image);
            assert!(!record.payload.is_empty());
            // Payload is valid base64 pixel data
            use base64::Engine;
            base64::engine::general_purpose::STANDARD
                .decode(&record.payload)
                .expect("image payload should be base64");
        }
        other => panic!("Expected single image record, got {other:?}"),
    }

    // An unrelated follow-up execution must not carry the old figure.
    let output = session.run("1 + 1");
    assert_eq!(single_text(&output), "2");
}

#[test]
#[ignore = "Requires pandas in the embedded runtime"]
fn test_dataframe_renders_as_html() {
    let _guard = execution_lock();
    let session = TestSession::new();

    let output = session.run("import pandas as pd\npd.DataFrame({'a': [1, 2]})");
    match &output {
        CellOutput::Single(record) => {
            assert_eq!(record.kind, OutputKind::Html);
            assert!(record.payload.contains("<table"));
        }
        other => panic!("Expected single html record, got {other:?}"),
    }
}
