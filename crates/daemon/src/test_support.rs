// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fakes for unit tests.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::snapshot::{MuxRunner, RunnerError};

/// Fake tmux backend: canned stdout per subcommand, plus a log of every
/// invocation.
#[derive(Default)]
pub struct FakeRunner {
    outputs: HashMap<String, String>,
    failures: HashMap<String, String>,
    pub calls: Mutex<Vec<Vec<String>>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, subcommand: &str, output: &str) -> Self {
        self.outputs.insert(subcommand.to_owned(), output.to_owned());
        self
    }

    pub fn with_failure(mut self, subcommand: &str, err: &str) -> Self {
        self.failures.insert(subcommand.to_owned(), err.to_owned());
        self
    }

    /// Subcommand names invoked so far, in order.
    pub fn subcommands(&self) -> Vec<String> {
        self.calls.lock().iter().filter_map(|c| c.first().cloned()).collect()
    }
}

impl MuxRunner for FakeRunner {
    fn run(&self, args: &[&str]) -> Result<String, RunnerError> {
        self.calls.lock().push(args.iter().map(|a| (*a).to_owned()).collect());
        let sub = args.first().copied().unwrap_or_default();
        if let Some(err) = self.failures.get(sub) {
            return Err(RunnerError::Failed(err.clone()));
        }
        Ok(self.outputs.get(sub).cloned().unwrap_or_default())
    }
}
