// src/results/processor.rs

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;

use colored::Colorize;
use tracing::{debug, trace};

use crate::errors::Result;
use crate::results::model::{RunStats, TestEvent, TestStatus, TestSuite};
use crate::results::sink::OutputSink;

/// Accumulates streamed structured test output into suites and renders a
/// summary.
pub trait ResultProcessor: Send + Debug {
    /// Forget everything from the previous run.
    fn reset(&mut self);

    /// Feed one line of runner output.
    fn process_line(&mut self, line: &str) -> Result<()>;

    fn process_output(&mut self, output: &str) -> Result<()> {
        for line in output.lines() {
            self.process_line(line)?;
        }
        Ok(())
    }

    fn suites(&self) -> Vec<TestSuite>;

    fn stats(&self) -> RunStats;

    /// Write the current state to the sink. `finalize` marks the end of a run.
    fn render_results(&mut self, finalize: bool) -> Result<()>;

    /// Redirect rendering to another sink.
    fn set_output(&mut self, _sink: OutputSink) {}
}

/// Processor for `go test -json` output.
#[derive(Debug)]
pub struct JsonResultProcessor {
    suites: BTreeMap<String, TestSuite>,
    unparsed_lines: usize,
    sink: OutputSink,
    color: bool,
}

impl JsonResultProcessor {
    pub fn new(sink: OutputSink, color: bool) -> Self {
        Self {
            suites: BTreeMap::new(),
            unparsed_lines: 0,
            sink,
            color,
        }
    }

    fn apply(&mut self, event: TestEvent) {
        let suite = self
            .suites
            .entry(event.package.clone())
            .or_insert_with(|| TestSuite::new(event.package.clone()));
        let elapsed = event
            .elapsed
            .filter(|s| s.is_finite() && *s >= 0.0)
            .map(Duration::from_secs_f64);

        let status = match event.action.as_str() {
            "run" => Some(TestStatus::Running),
            "pass" => Some(TestStatus::Passed),
            "fail" => Some(TestStatus::Failed),
            "skip" => Some(TestStatus::Skipped),
            "output" => {
                let text = event.output.unwrap_or_default();
                let text = text.trim_end_matches('\n').to_string();
                match event.test.as_deref() {
                    Some(name) => suite.test_mut(name).output.push(text),
                    None => suite.output.push(text),
                }
                None
            }
            other => {
                trace!(action = other, "ignoring test event");
                None
            }
        };

        let Some(status) = status else {
            return;
        };
        match event.test.as_deref() {
            Some(name) => {
                let test = suite.test_mut(name);
                test.status = status;
                if let Some(d) = elapsed {
                    test.duration = d;
                }
            }
            None => {
                if status == TestStatus::Failed {
                    suite.package_failed = true;
                }
                if let Some(d) = elapsed {
                    suite.duration = d;
                }
            }
        }
    }

    /// Tests still running once a run is over belong to a package that died
    /// under them.
    fn finish(&mut self) {
        for suite in self.suites.values_mut() {
            if !suite.package_failed {
                continue;
            }
            for test in suite.tests.iter_mut() {
                if test.status == TestStatus::Running {
                    test.status = TestStatus::Failed;
                }
            }
        }
    }

    fn paint(&self, text: String, status: TestStatus) -> String {
        if !self.color {
            return text;
        }
        match status {
            TestStatus::Passed => text.green().to_string(),
            TestStatus::Failed => text.red().bold().to_string(),
            TestStatus::Skipped => text.yellow().to_string(),
            TestStatus::Running => text.cyan().to_string(),
        }
    }
}

impl ResultProcessor for JsonResultProcessor {
    fn reset(&mut self) {
        self.suites.clear();
        self.unparsed_lines = 0;
    }

    fn process_line(&mut self, line: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        match serde_json::from_str::<TestEvent>(line) {
            Ok(event) => self.apply(event),
            Err(err) => {
                debug!(error = %err, line, "skipping non-JSON output line");
                self.unparsed_lines += 1;
            }
        }
        Ok(())
    }

    fn suites(&self) -> Vec<TestSuite> {
        self.suites.values().cloned().collect()
    }

    fn stats(&self) -> RunStats {
        let mut stats = RunStats {
            suites: self.suites.len(),
            unparsed_lines: self.unparsed_lines,
            ..RunStats::default()
        };
        for suite in self.suites.values() {
            stats.total += suite.tests.len();
            stats.passed += suite.passed();
            stats.failed += suite.failed();
            stats.skipped += suite.skipped();
            stats.duration += suite.duration;
        }
        stats
    }

    fn render_results(&mut self, finalize: bool) -> Result<()> {
        if finalize {
            self.finish();
        }
        let stats = self.stats();

        if !finalize {
            let running = stats.total - stats.passed - stats.failed - stats.skipped;
            self.sink.write_line(&format!(
                "Running: {} passed, {} failed, {} in progress",
                stats.passed, stats.failed, running
            ))?;
            return Ok(());
        }

        for suite in self.suites.values() {
            for test in suite.tests.iter().filter(|t| t.status == TestStatus::Failed) {
                let label = self.paint("FAIL".to_string(), TestStatus::Failed);
                self.sink
                    .write_line(&format!("{label} {} {}", suite.package, test.name))?;
                for line in &test.output {
                    self.sink.write_line(&format!("    {line}"))?;
                }
            }
            if suite.package_failed && suite.failed() == 0 {
                let label = self.paint("FAIL".to_string(), TestStatus::Failed);
                self.sink.write_line(&format!("{label} {}", suite.package))?;
                for line in &suite.output {
                    self.sink.write_line(&format!("    {line}"))?;
                }
            }
        }

        let passed = self.paint(format!("{} passed", stats.passed), TestStatus::Passed);
        let failed = if stats.failed > 0 {
            self.paint(format!("{} failed", stats.failed), TestStatus::Failed)
        } else {
            format!("{} failed", stats.failed)
        };
        let skipped = self.paint(format!("{} skipped", stats.skipped), TestStatus::Skipped);
        self.sink.write_line(&format!(
            "Tests completed: {passed}, {failed}, {skipped} ({:.2}s)",
            stats.duration.as_secs_f64()
        ))?;
        Ok(())
    }

    fn set_output(&mut self, sink: OutputSink) {
        self.sink = sink;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUN: &str = r#"
{"Action":"start","Package":"example.com/calc"}
{"Action":"run","Package":"example.com/calc","Test":"TestAdd"}
{"Action":"output","Package":"example.com/calc","Test":"TestAdd","Output":"=== RUN   TestAdd\n"}
{"Action":"pass","Package":"example.com/calc","Test":"TestAdd","Elapsed":0.01}
{"Action":"run","Package":"example.com/calc","Test":"TestDiv"}
{"Action":"output","Package":"example.com/calc","Test":"TestDiv","Output":"    calc_test.go:12: division by zero\n"}
{"Action":"fail","Package":"example.com/calc","Test":"TestDiv","Elapsed":0.02}
{"Action":"run","Package":"example.com/calc","Test":"TestDiv/neg"}
{"Action":"skip","Package":"example.com/calc","Test":"TestDiv/neg","Elapsed":0}
{"Action":"fail","Package":"example.com/calc","Elapsed":0.5}
"#;

    #[test]
    fn accumulates_suites_and_stats() {
        let (sink, _buf) = OutputSink::buffer();
        let mut p = JsonResultProcessor::new(sink, false);
        p.process_output(RUN).unwrap();

        let suites = p.suites();
        assert_eq!(suites.len(), 1);
        let suite = &suites[0];
        assert_eq!(suite.package, "example.com/calc");
        assert_eq!(suite.tests.len(), 3);
        assert!(suite.tests.iter().any(|t| t.is_subtest()));
        assert!(suite.package_failed);
        assert_eq!(suite.status(), TestStatus::Failed);

        let stats = p.stats();
        assert_eq!((stats.passed, stats.failed, stats.skipped), (1, 1, 1));
        assert_eq!(stats.duration, Duration::from_millis(500));
    }

    #[test]
    fn renders_summary_and_failures() {
        let (sink, buf) = OutputSink::buffer();
        let mut p = JsonResultProcessor::new(sink, false);
        p.process_output(RUN).unwrap();
        p.render_results(true).unwrap();

        let out = buf.contents();
        assert!(out.contains("FAIL example.com/calc TestDiv"));
        assert!(out.contains("division by zero"));
        assert!(out.contains("Tests completed: 1 passed, 1 failed, 1 skipped"));
    }

    #[test]
    fn tolerates_plain_text_and_resets() {
        let (sink, _buf) = OutputSink::buffer();
        let mut p = JsonResultProcessor::new(sink, false);
        p.process_line("# example.com/broken").unwrap();
        p.process_line("").unwrap();
        assert_eq!(p.stats().unparsed_lines, 1);

        p.reset();
        assert_eq!(p.stats(), RunStats::default());
    }

    #[test]
    fn running_tests_in_dead_package_fail_on_finalize() {
        let (sink, _buf) = OutputSink::buffer();
        let mut p = JsonResultProcessor::new(sink, false);
        p.process_output(
            r#"{"Action":"run","Package":"p","Test":"TestHang"}
{"Action":"fail","Package":"p","Elapsed":10}"#,
        )
        .unwrap();
        p.render_results(true).unwrap();
        assert_eq!(p.stats().failed, 1);
    }
}
