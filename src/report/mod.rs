//! Text rendering of aggregate and per-statement profiling reports.

mod sink;

pub use sink::{MemorySink, ReportSink, StdoutSink};

use crate::config::SortKey;
use crate::profile::Clock;
use chrono::{DateTime, Local};
use comfy_table::{CellAlignment, Table, presets};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// A profiled unit: a wrapped callable or a nested scope
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Unit {
    pub name: String,
    pub file: &'static str,
    pub line: u32,
}

impl Unit {
    pub fn new(name: impl Into<String>, file: &'static str, line: u32) -> Self {
        Unit {
            name: name.into(),
            file,
            line,
        }
    }

    /// `file:line(name)`, the same shape as the row labels of the report
    pub fn label(&self) -> String {
        format!("{}:{}({})", simplify_path(self.file), self.line, self.name)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Accumulated statistics for one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatRow {
    pub unit: Unit,
    /// Every activation, recursive ones included
    pub calls: u64,
    /// Activations that were not nested inside another activation of the same unit
    pub primitive_calls: u64,
    /// Time in the unit itself, excluding child scopes
    pub self_time: Duration,
    /// Time in the unit including child scopes, counted at primitive activations
    pub cumulative_time: Duration,
}

impl StatRow {
    fn ncalls(&self) -> String {
        if self.calls == self.primitive_calls {
            self.calls.to_string()
        } else {
            format!("{}/{}", self.calls, self.primitive_calls)
        }
    }
}

/// Snapshot of a profiling session
#[derive(Debug, Clone)]
pub struct ProfileReport {
    pub generated_at: DateTime<Local>,
    pub clock: Clock,
    pub sort: SortKey,
    pub total_calls: u64,
    pub primitive_calls: u64,
    /// Sum of self times across all units
    pub total_time: Duration,
    pub rows: Vec<StatRow>,
    /// Rows dropped by the limit or the minimum self time
    pub omitted: usize,
}

impl ProfileReport {
    /// Sort, filter and truncate `rows` into a report
    pub fn build(
        mut rows: Vec<StatRow>,
        clock: Clock,
        sort: SortKey,
        limit: Option<usize>,
        min_self_time: Duration,
    ) -> Self {
        let total_calls = rows.iter().map(|r| r.calls).sum();
        let primitive_calls = rows.iter().map(|r| r.primitive_calls).sum();
        let total_time = rows.iter().map(|r| r.self_time).sum();

        sort_rows(&mut rows, sort);

        let before = rows.len();
        rows.retain(|r| r.self_time >= min_self_time);
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        let omitted = before - rows.len();

        ProfileReport {
            generated_at: Local::now(),
            clock,
            sort,
            total_calls,
            primitive_calls,
            total_time,
            rows,
            omitted,
        }
    }

    pub fn row(&self, name: &str) -> Option<&StatRow> {
        self.rows.iter().find(|r| r.unit.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn sort_rows(rows: &mut [StatRow], sort: SortKey) {
    match sort {
        SortKey::SelfTime => rows.sort_by(|a, b| {
            b.self_time
                .cmp(&a.self_time)
                .then_with(|| a.unit.cmp(&b.unit))
        }),
        SortKey::Cumulative => rows.sort_by(|a, b| {
            b.cumulative_time
                .cmp(&a.cumulative_time)
                .then_with(|| a.unit.cmp(&b.unit))
        }),
        SortKey::Calls => {
            rows.sort_by(|a, b| b.calls.cmp(&a.calls).then_with(|| a.unit.cmp(&b.unit)))
        }
        SortKey::Name => rows.sort_by(|a, b| a.unit.cmp(&b.unit)),
    }
}

impl fmt::Display for ProfileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "# callwrap profile @ {} ({} clock)",
            self.generated_at.format("%Y-%m-%d %H:%M:%S"),
            self.clock
        )?;
        if self.total_calls == self.primitive_calls {
            writeln!(
                f,
                "# {} calls in {}",
                self.total_calls,
                format_total(self.total_time)
            )?;
        } else {
            writeln!(
                f,
                "# {} calls ({} primitive) in {}",
                self.total_calls,
                self.primitive_calls,
                format_total(self.total_time)
            )?;
        }
        writeln!(f, "# Ordered by: {}", sort_label(self.sort))?;
        writeln!(f)?;

        let mut table = Table::new();
        table.load_preset(presets::ASCII_HORIZONTAL_ONLY);
        table.set_header(vec![
            "ncalls",
            "tottime",
            "percall",
            "cumtime",
            "percall",
            "filename:lineno(function)",
        ]);

        for row in &self.rows {
            table.add_row(vec![
                row.ncalls(),
                format_secs(row.self_time),
                format_secs(per_call(row.self_time, row.calls)),
                format_secs(row.cumulative_time),
                format_secs(per_call(row.cumulative_time, row.primitive_calls)),
                row.unit.label(),
            ]);
        }
        align_right(&mut table, 0..5);

        write!(f, "{table}")?;
        if self.omitted > 0 {
            write!(f, "\n# {} more rows omitted", self.omitted)?;
        }
        Ok(())
    }
}

/// Timing for one `stmt!` checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineStat {
    pub file: &'static str,
    pub line: u32,
    pub hits: u64,
    pub time: Duration,
    /// Source text of the line, when the file could be read
    pub contents: Option<String>,
}

/// Per-statement report for a single profiled invocation
#[derive(Debug, Clone)]
pub struct LineReport {
    pub target: Unit,
    pub generated_at: DateTime<Local>,
    /// Wall time between enable and disable of the context
    pub elapsed: Duration,
    pub lines: Vec<LineStat>,
}

impl LineReport {
    pub fn new(target: Unit, elapsed: Duration, mut lines: Vec<LineStat>) -> Self {
        lines.sort_by(|a, b| a.file.cmp(b.file).then(a.line.cmp(&b.line)));
        LineReport {
            target,
            generated_at: Local::now(),
            elapsed,
            lines,
        }
    }

    /// Fill in `contents` from the source files on disk (best-effort)
    pub fn attach_sources(&mut self) {
        let mut files: HashMap<&'static str, Option<Vec<String>>> = HashMap::new();
        for stat in &mut self.lines {
            let source = files.entry(stat.file).or_insert_with(|| {
                std::fs::read_to_string(stat.file)
                    .ok()
                    .map(|text| text.lines().map(str::to_string).collect())
            });
            stat.contents = source
                .as_ref()
                .and_then(|lines| lines.get(stat.line.saturating_sub(1) as usize))
                .map(|line| line.trim_end().to_string());
        }
    }

    pub fn total_hits(&self) -> u64 {
        self.lines.iter().map(|l| l.hits).sum()
    }

    pub fn line(&self, line: u32) -> Option<&LineStat> {
        self.lines.iter().find(|l| l.line == line)
    }
}

impl fmt::Display for LineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let measured: Duration = self.lines.iter().map(|l| l.time).sum();

        writeln!(
            f,
            "# callwrap statements @ {}",
            self.generated_at.format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(f, "# Total time: {}", format_total(self.elapsed))?;
        writeln!(f, "# Function: {}", self.target)?;
        writeln!(f)?;

        if self.lines.is_empty() {
            return write!(f, "# no statements recorded");
        }

        let mut table = Table::new();
        table.load_preset(presets::ASCII_HORIZONTAL_ONLY);
        table.set_header(vec![
            "Line", "Hits", "Time", "Per Hit", "% Time", "Line Contents",
        ]);

        let multi_file = self.lines.iter().any(|l| l.file != self.lines[0].file);
        let mut current_file = None;
        for stat in &self.lines {
            if multi_file && current_file != Some(stat.file) {
                table.add_row(vec![
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    format!("# {}", simplify_path(stat.file)),
                ]);
            }
            current_file = Some(stat.file);

            let percent = if measured.is_zero() {
                0.0
            } else {
                stat.time.as_secs_f64() * 100.0 / measured.as_secs_f64()
            };
            table.add_row(vec![
                stat.line.to_string(),
                stat.hits.to_string(),
                format_secs(stat.time),
                format_secs(per_call(stat.time, stat.hits)),
                format!("{:.1}", percent),
                stat.contents.clone().unwrap_or_default(),
            ]);
        }
        align_right(&mut table, 0..5);

        write!(f, "{table}")
    }
}

fn align_right(table: &mut Table, columns: std::ops::Range<usize>) {
    for idx in columns {
        if let Some(column) = table.column_mut(idx) {
            column.set_cell_alignment(CellAlignment::Right);
        }
    }
}

fn sort_label(sort: SortKey) -> &'static str {
    match sort {
        SortKey::SelfTime => "internal time",
        SortKey::Cumulative => "cumulative time",
        SortKey::Calls => "call count",
        SortKey::Name => "function name",
    }
}

fn per_call(time: Duration, calls: u64) -> Duration {
    if calls == 0 {
        Duration::ZERO
    } else {
        Duration::from_secs_f64(time.as_secs_f64() / calls as f64)
    }
}

/// Seconds with microsecond precision
pub fn format_secs(d: Duration) -> String {
    format!("{:.6}", d.as_secs_f64())
}

/// Human readable duration, truncated to microseconds
pub fn format_total(d: Duration) -> String {
    let micros = Duration::from_micros(d.as_micros() as u64);
    if micros.is_zero() {
        return "0s".to_string();
    }
    humantime::format_duration(micros).to_string()
}

/// Simplify a file path for display
pub fn simplify_path(path: &str) -> String {
    // Extract just filename for stdlib paths
    if (path.contains("/rust/library/") || path.contains("/rustc/"))
        && let Some(filename) = path.rsplit('/').next()
    {
        return format!("<std>/{}", filename);
    }

    // For cargo dependencies, keep crate name and file
    if path.contains("/.cargo/")
        && let Some(idx) = path.find("/src/")
    {
        let before_src = &path[..idx];
        if let Some(crate_start) = before_src.rfind('/') {
            let crate_name = &before_src[crate_start + 1..];
            return format!("<{}>/{}", crate_name, &path[idx + 5..]);
        }
    }

    path.strip_prefix("./").unwrap_or(path).to_string()
}
