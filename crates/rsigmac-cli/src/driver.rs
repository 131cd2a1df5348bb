//! The per-file conversion loop and its failure policy.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use rsigmac_backend::{Backend, ConvertError};
use rsigmac_parser::{RuleFilter, SigmaCollectionParser, SigmaParserError};

use crate::sink::OutputSink;
use crate::status::{EXIT_OK, Failure};

/// How failures on individual inputs are handled.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Keep going after an escalated failure; the last code wins.
    pub defer_abort: bool,
    /// Skip files whose rules the backend cannot convert.
    pub ignore_backend_errors: bool,
}

/// A failure attributed to one input file.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("{}: cannot read input: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: SigmaParserError,
    },

    #[error("{}: rule '{title}': {source}", path.display())]
    Convert {
        path: PathBuf,
        title: String,
        #[source]
        source: ConvertError,
    },
}

impl InputError {
    pub fn failure(&self) -> Failure {
        match self {
            InputError::Io { .. } => Failure::Io,
            InputError::Parse { source, .. } => Failure::from(source),
            InputError::Convert { source, .. } => Failure::from(source),
        }
    }
}

enum Stop {
    Input(InputError),
    Output(io::Error),
}

/// Runs every input through filter and backend into the sink.
pub struct Driver<'a, W: Write> {
    backend: &'a mut dyn Backend,
    filter: &'a RuleFilter,
    sink: &'a mut OutputSink<W>,
    options: RunOptions,
    status: i32,
}

impl<'a, W: Write> Driver<'a, W> {
    pub fn new(
        backend: &'a mut dyn Backend,
        filter: &'a RuleFilter,
        sink: &'a mut OutputSink<W>,
        options: RunOptions,
    ) -> Self {
        Driver {
            backend,
            filter,
            sink,
            options,
            status: EXIT_OK,
        }
    }

    /// Process `inputs` in order and return the exit code.
    ///
    /// `finalize` runs once after the last input unless the run aborted.
    pub fn run(mut self, inputs: &[PathBuf]) -> i32 {
        for path in inputs {
            match self.process(path) {
                Ok(()) => {}
                Err(Stop::Output(e)) => return output_failure(&e),
                Err(Stop::Input(e)) => {
                    if let Some(code) = self.escalate(e) {
                        return code;
                    }
                }
            }
        }

        if let Some(result) = self.backend.finalize()
            && let Err(e) = self.sink.write_result(&result)
        {
            return output_failure(&e);
        }
        self.status
    }

    /// Record a failure; `Some(code)` means the run stops now.
    fn escalate(&mut self, e: InputError) -> Option<i32> {
        let failure = e.failure();
        if failure.is_tolerable() && self.options.ignore_backend_errors {
            eprintln!("{e} (ignored, skipping file)");
            return None;
        }
        eprintln!("{e}");
        self.status = failure.code();
        if self.options.defer_abort {
            log::info!("deferring abort, status is now {}", self.status);
            None
        } else {
            Some(self.status)
        }
    }

    fn process(&mut self, path: &Path) -> Result<(), Stop> {
        log::info!("Processing {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|source| {
            Stop::Input(InputError::Io {
                path: path.to_path_buf(),
                source,
            })
        })?;

        for rule in SigmaCollectionParser::new(&text) {
            let rule = rule.map_err(|source| {
                Stop::Input(InputError::Parse {
                    path: path.to_path_buf(),
                    source,
                })
            })?;

            if !self.filter.matches(&rule) {
                log::info!("{}: rule '{}' rejected by filter", path.display(), rule.title);
                continue;
            }

            let results = self.backend.convert(&rule).map_err(|source| {
                Stop::Input(InputError::Convert {
                    path: path.to_path_buf(),
                    title: rule.title.clone(),
                    source,
                })
            })?;
            for result in &results {
                self.sink.write_result(result).map_err(Stop::Output)?;
            }
        }
        Ok(())
    }
}

fn output_failure(e: &io::Error) -> i32 {
    eprintln!("cannot write output: {e}");
    Failure::Output.code()
}
