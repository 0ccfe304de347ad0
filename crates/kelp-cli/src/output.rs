//! Run summary reporting
//!
//! The summary goes to stderr so that stdout carries only resolved ids or JSON.

use colored::*;
use std::path::PathBuf;

/// Counts collected over one command run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub definitions: usize,
    pub elements: usize,
    pub resolved: usize,
    pub errors: usize,
    pub written: Option<PathBuf>,
}

impl RunSummary {
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn print(&self) {
        eprintln!("\n{}", "Summary:".bold());
        eprintln!("  Definitions: {}", self.definitions);
        eprintln!("  Elements:    {}", self.elements);
        eprintln!("  Resolved:    {}", self.resolved.to_string().green());
        if self.has_errors() {
            eprintln!("  Errors:      {}", self.errors.to_string().red());
        } else {
            eprintln!("  Errors:      0");
        }
        if let Some(file) = &self.written {
            eprintln!("  Written:     {}", file.display());
        }
    }
}
