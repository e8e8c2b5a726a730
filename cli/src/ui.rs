//! Terminal progress rendering.
//!
//! Pipeline progress events drive one spinner per stage (and one per
//! adapter invocation). When stderr is not a terminal the spinner
//! degrades to plain lines, so logs from CI runs stay readable.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use xschema_lib::pipeline::ProgressEvent;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ";

pub struct ProgressRenderer {
    spinner: Option<ProgressBar>,
    interactive: bool,
}

impl ProgressRenderer {
    pub fn new() -> Self {
        Self {
            spinner: None,
            interactive: std::io::stderr().is_terminal(),
        }
    }

    pub fn handle(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::ParseStarted => self.start("parsing config documents".to_string()),
            ProgressEvent::ParseFinished { configs, declarations } => self.finish(format!(
                "parsed {configs} config(s), {declarations} declaration(s)"
            )),
            ProgressEvent::RetrieveStarted { count } => {
                self.start(format!("retrieving {count} schema(s)"))
            }
            ProgressEvent::RetrieveFinished => self.finish("schemas retrieved".to_string()),
            ProgressEvent::AdapterStarted { adapter, schemas } => {
                self.start(format!("running {adapter} on {schemas} schema(s)"))
            }
            ProgressEvent::AdapterFinished { adapter, outputs } => {
                self.finish(format!("{adapter} produced {outputs} output(s)"))
            }
            ProgressEvent::GeneratedFileWritten { path } => {
                self.finish(format!("wrote {}", path.display()))
            }
            ProgressEvent::ClientPatched { path, changed } => {
                if *changed {
                    self.finish(format!("patched {}", path.display()));
                } else {
                    self.finish(format!("{} already up to date", path.display()));
                }
            }
            ProgressEvent::PlanEntry { adapter, key, source } => {
                self.clear();
                println!("{adapter}  {key}  ({source})");
            }
        }
    }

    pub fn error(&mut self, message: &str) {
        self.clear();
        eprintln!("✗ {message}");
    }

    fn start(&mut self, message: String) {
        self.clear();
        if self.interactive {
            let spinner = ProgressBar::new_spinner()
                .with_style(spinner_style())
                .with_message(message);
            spinner.enable_steady_tick(Duration::from_millis(80));
            self.spinner = Some(spinner);
        } else {
            eprintln!("{message}...");
        }
    }

    fn finish(&mut self, message: String) {
        self.clear();
        eprintln!("✓ {message}");
    }

    fn clear(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

impl Drop for ProgressRenderer {
    fn drop(&mut self) {
        self.clear();
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(TICK_CHARS)
}
