//! Log parsing worker
//!
//! Pulls claimed log files off the to-do channel, parses every line into an
//! identified document, and pushes records downstream. When a file is fully
//! consumed its name goes back to the fetcher on the done channel so it can
//! be moved to the processed prefix.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::error;

use super::document::build_record;
use super::grammar::LineGrammar;
use super::stats::ParserStats;
use super::{LogFile, Record};

pub struct LogParser {
    grammar: LineGrammar,
    files_in: mpsc::Receiver<LogFile>,
    files_done: mpsc::UnboundedSender<String>,
    records_out: mpsc::UnboundedSender<Record>,
    stats: Arc<ParserStats>,
}

impl LogParser {
    pub fn new(
        files_in: mpsc::Receiver<LogFile>,
        files_done: mpsc::UnboundedSender<String>,
        records_out: mpsc::UnboundedSender<Record>,
        stats: Arc<ParserStats>,
    ) -> Result<Self> {
        Ok(Self {
            grammar: LineGrammar::new().context("Failed to compile log line grammars")?,
            files_in,
            files_done,
            records_out,
            stats,
        })
    }

    /// Worker loop: runs until the to-do channel closes.
    pub async fn run(mut self) {
        while let Some(file) = self.files_in.recv().await {
            self.stats.mark_new_file();
            self.parse_file(&file.key, &file.lines);
            if self.files_done.send(file.key).is_err() {
                // fetcher is gone, nobody left to finalize files
                return;
            }
            self.stats.increment_files_processed();
        }
    }

    /// Parse one file's lines and enqueue a record per parseable line.
    ///
    /// A line matching neither grammar abandons the rest of the file: the
    /// formats are fixed, so an unparseable line means the file is not a
    /// load balancer log and the rest of it will not fare better. The file
    /// is still reported done so it leaves the processing prefix.
    fn parse_file(&self, key: &str, lines: &[String]) {
        for line in lines {
            let line = line.trim();

            let Some(parsed) = self.grammar.parse(line) else {
                self.stats.increment_lines_errored();
                error!(file = %key, line = %line, "line matched neither ALB nor ELB format, abandoning file");
                return;
            };

            match build_record(&parsed, line, key) {
                Some(record) => {
                    if self.records_out.send(record).is_err() {
                        // shipper is gone, no point parsing further
                        return;
                    }
                    self.stats.increment_lines_processed();
                }
                None => {
                    self.stats.increment_lines_errored();
                    error!(file = %key, line = %line, "could not derive a document id for line");
                }
            }
        }
    }
}
