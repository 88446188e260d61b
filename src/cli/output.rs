//! Rendering command results in the selected output format
//!
//! Every record type a command prints implements [`Tabular`]. The
//! [`Printer`] then renders it as a table, markdown, CSV, bare IDs, or
//! serializes it as JSON/YAML. Structured formats always carry the full
//! record; tables truncate long text.

use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::fmt::Display;
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::{first_line, format_time, or_dash, truncate_str};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::entity::Entity;
use crate::core::query::ListResponse;
use crate::entities::impact::{BlockingReference, DependencyNode};
use crate::entities::reference::{
    NamedType, Status, StatusModel, StatusTransition, UnreconciledEntity,
};
use crate::entities::relationship::CycleReport;
use crate::entities::{
    AcceptanceCriteria, Comment, Epic, Requirement, RequirementRelationship, User, UserStory,
};
use crate::service::{SearchHit, Suggestion};

const TITLE_WIDTH: usize = 48;
const TEXT_WIDTH: usize = 60;

/// A record that renders as one table row
pub trait Tabular {
    fn headers() -> &'static [&'static str];
    fn row(&self) -> Vec<String>;
    /// What `--format id` prints
    fn key(&self) -> String;
}

/// Reference, title and status cells every hierarchy row starts with
fn entity_cells<E: Entity>(entity: &E) -> Vec<String> {
    let mut cells = vec![
        entity.reference_id().to_string(),
        first_line(entity.title(), TITLE_WIDTH),
    ];
    if let Some(status) = entity.status() {
        cells.push(status.to_string());
    }
    cells
}

impl Tabular for Epic {
    fn headers() -> &'static [&'static str] {
        &["REF", "TITLE", "STATUS", "PRIORITY", "UPDATED"]
    }
    fn row(&self) -> Vec<String> {
        let mut cells = entity_cells(self);
        cells.push(self.priority.to_string());
        cells.push(format_time(&self.updated_at));
        cells
    }
    fn key(&self) -> String {
        self.reference_id.to_string()
    }
}

impl Tabular for UserStory {
    fn headers() -> &'static [&'static str] {
        &["REF", "TITLE", "STATUS", "PRIORITY", "UPDATED"]
    }
    fn row(&self) -> Vec<String> {
        let mut cells = entity_cells(self);
        cells.push(self.priority.to_string());
        cells.push(format_time(&self.updated_at));
        cells
    }
    fn key(&self) -> String {
        self.reference_id.to_string()
    }
}

impl Tabular for AcceptanceCriteria {
    fn headers() -> &'static [&'static str] {
        &["REF", "DESCRIPTION", "UPDATED"]
    }
    fn row(&self) -> Vec<String> {
        let mut cells = entity_cells(self);
        cells.push(format_time(&self.updated_at));
        cells
    }
    fn key(&self) -> String {
        self.reference_id.to_string()
    }
}

impl Tabular for Requirement {
    fn headers() -> &'static [&'static str] {
        &["REF", "TITLE", "TYPE", "STATUS", "PRIORITY", "UPDATED"]
    }
    fn row(&self) -> Vec<String> {
        vec![
            self.reference_id.to_string(),
            truncate_str(&self.title, TITLE_WIDTH),
            self.requirement_type.clone(),
            self.status.clone(),
            self.priority.to_string(),
            format_time(&self.updated_at),
        ]
    }
    fn key(&self) -> String {
        self.reference_id.to_string()
    }
}

impl Tabular for Comment {
    fn headers() -> &'static [&'static str] {
        &["ID", "ON", "DEPTH", "STATE", "ANCHOR", "CONTENT"]
    }
    fn row(&self) -> Vec<String> {
        let state = if self.is_resolved { "resolved" } else { "open" };
        let anchor = match (self.text_position_start, self.text_position_end) {
            (Some(start), Some(end)) if self.is_stale => format!("{}..{} (stale)", start, end),
            (Some(start), Some(end)) => format!("{}..{}", start, end),
            _ => "-".to_string(),
        };
        vec![
            self.id.to_string(),
            self.entity_type.to_string(),
            self.depth.to_string(),
            state.to_string(),
            anchor,
            first_line(&self.content, TEXT_WIDTH),
        ]
    }
    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Tabular for RequirementRelationship {
    fn headers() -> &'static [&'static str] {
        &["ID", "SOURCE", "TYPE", "TARGET", "CREATED"]
    }
    fn row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.source_reference_id.to_string(),
            self.relationship_type.clone(),
            self.target_reference_id.to_string(),
            format_time(&self.created_at),
        ]
    }
    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Tabular for CycleReport {
    fn headers() -> &'static [&'static str] {
        &["TYPE", "CYCLE"]
    }
    fn row(&self) -> Vec<String> {
        vec![self.relationship_type.clone(), self.path()]
    }
    fn key(&self) -> String {
        self.path()
    }
}

impl CycleReport {
    fn path(&self) -> String {
        self.requirements
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" → ")
    }
}

impl Tabular for NamedType {
    fn headers() -> &'static [&'static str] {
        &["NAME", "DESCRIPTION"]
    }
    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            or_dash(self.description.as_deref().map(|d| truncate_str(d, TEXT_WIDTH))),
        ]
    }
    fn key(&self) -> String {
        self.name.clone()
    }
}

impl Tabular for StatusModel {
    fn headers() -> &'static [&'static str] {
        &["ID", "ENTITY", "NAME", "DEFAULT"]
    }
    fn row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.entity_type.to_string(),
            self.name.clone(),
            if self.is_default { "yes" } else { "" }.to_string(),
        ]
    }
    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Tabular for Status {
    fn headers() -> &'static [&'static str] {
        &["ORDER", "NAME", "INITIAL", "FINAL", "COLOR"]
    }
    fn row(&self) -> Vec<String> {
        vec![
            self.sort_order.to_string(),
            self.name.clone(),
            if self.is_initial { "yes" } else { "" }.to_string(),
            if self.is_final { "yes" } else { "" }.to_string(),
            or_dash(self.color.as_deref()),
        ]
    }
    fn key(&self) -> String {
        self.name.clone()
    }
}

impl Tabular for StatusTransition {
    fn headers() -> &'static [&'static str] {
        &["FROM", "TO", "NAME"]
    }
    fn row(&self) -> Vec<String> {
        vec![
            self.from_status.clone(),
            self.to_status.clone(),
            or_dash(self.name.as_deref()),
        ]
    }
    fn key(&self) -> String {
        format!("{}→{}", self.from_status, self.to_status)
    }
}

impl Tabular for UnreconciledEntity {
    fn headers() -> &'static [&'static str] {
        &["REF", "TITLE", "STATUS"]
    }
    fn row(&self) -> Vec<String> {
        vec![
            self.reference_id.clone(),
            truncate_str(&self.title, TITLE_WIDTH),
            self.status.clone(),
        ]
    }
    fn key(&self) -> String {
        self.reference_id.clone()
    }
}

impl Tabular for User {
    fn headers() -> &'static [&'static str] {
        &["USERNAME", "ROLE", "NAME", "EMAIL"]
    }
    fn row(&self) -> Vec<String> {
        vec![
            self.username.clone(),
            self.role.to_string(),
            or_dash(self.display_name.as_deref()),
            or_dash(self.email.as_deref()),
        ]
    }
    fn key(&self) -> String {
        self.username.clone()
    }
}

impl Tabular for SearchHit {
    fn headers() -> &'static [&'static str] {
        &["KIND", "REF", "TITLE", "STATUS", "SCORE"]
    }
    fn row(&self) -> Vec<String> {
        let title = if self.title.is_empty() {
            self.body.as_deref().map(|b| first_line(b, TITLE_WIDTH)).unwrap_or_default()
        } else {
            truncate_str(&self.title, TITLE_WIDTH)
        };
        vec![
            self.entity_type.to_string(),
            self.key(),
            title,
            or_dash(self.status.as_deref()),
            format!("{:.3}", self.score),
        ]
    }
    fn key(&self) -> String {
        match &self.reference_id {
            Some(r) => r.to_string(),
            None => self.id.to_string(),
        }
    }
}

impl Tabular for Suggestion {
    fn headers() -> &'static [&'static str] {
        &["REF", "KIND", "TITLE"]
    }
    fn row(&self) -> Vec<String> {
        vec![
            self.reference_id.to_string(),
            self.entity_type.to_string(),
            truncate_str(&self.title, TITLE_WIDTH),
        ]
    }
    fn key(&self) -> String {
        self.reference_id.to_string()
    }
}

impl Tabular for DependencyNode {
    fn headers() -> &'static [&'static str] {
        &["KIND", "REF", "VIA", "TITLE"]
    }
    fn row(&self) -> Vec<String> {
        vec![
            self.entity_type.to_string(),
            self.reference_id.clone(),
            self.dependency_type.to_string(),
            truncate_str(&self.title, TITLE_WIDTH),
        ]
    }
    fn key(&self) -> String {
        self.reference_id.clone()
    }
}

impl Tabular for BlockingReference {
    fn headers() -> &'static [&'static str] {
        &["KIND", "REF", "REASON"]
    }
    fn row(&self) -> Vec<String> {
        vec![
            self.entity_type.to_string(),
            self.reference_id.clone(),
            self.reason.clone(),
        ]
    }
    fn key(&self) -> String {
        self.reference_id.clone()
    }
}

/// Writes results to stdout in the chosen format
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    format: OutputFormat,
    quiet: bool,
}

impl Printer {
    pub fn new(global: &GlobalOpts) -> Self {
        Self {
            format: global.format,
            quiet: global.quiet,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Serialize `value` for JSON/YAML; returns false for other formats
    pub fn structured<T: Serialize>(&self, value: &T) -> Result<bool> {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
                Ok(true)
            }
            OutputFormat::Yaml => {
                print!("{}", serde_yml::to_string(value).into_diagnostic()?);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Print rows; JSON/YAML get the items array as-is
    pub fn list<T: Tabular + Serialize>(&self, items: &[T]) -> Result<()> {
        if self.structured(&items)? {
            return Ok(());
        }
        self.rows(items)
    }

    /// Print one page of a listing with a position footer
    pub fn page<T: Tabular + Serialize>(&self, page: &ListResponse<T>, noun: &str) -> Result<()> {
        if self.structured(page)? {
            return Ok(());
        }
        self.rows(&page.data)?;
        if self.format == OutputFormat::Table && !self.quiet {
            let shown = page.data.len() as i64;
            if shown == 0 {
                println!("{}", style(format!("No {} found", noun)).dim());
            } else {
                println!(
                    "{}",
                    style(format!(
                        "{}-{} of {} {}",
                        page.offset + 1,
                        page.offset + shown,
                        page.total_count,
                        noun
                    ))
                    .dim()
                );
            }
        }
        Ok(())
    }

    /// Print a single record; tables show it as field/value lines plus an
    /// optional long text
    pub fn record<T: Tabular + Serialize>(&self, item: &T, text: Option<&str>) -> Result<()> {
        match self.format {
            OutputFormat::Json | OutputFormat::Yaml => {
                self.structured(item)?;
            }
            OutputFormat::Table => {
                for (header, value) in T::headers().iter().zip(item.row()) {
                    println!("{:>10}  {}", style(header).bold(), value);
                }
                if let Some(text) = text.filter(|t| !t.is_empty()) {
                    println!();
                    println!("{}", text);
                }
            }
            _ => self.rows(std::slice::from_ref(item))?,
        }
        Ok(())
    }

    fn rows<T: Tabular>(&self, items: &[T]) -> Result<()> {
        match self.format {
            OutputFormat::Id => {
                for item in items {
                    println!("{}", item.key());
                }
            }
            OutputFormat::Csv => {
                let mut writer = csv::Writer::from_writer(std::io::stdout());
                writer.write_record(T::headers()).into_diagnostic()?;
                for item in items {
                    writer.write_record(item.row()).into_diagnostic()?;
                }
                writer.flush().into_diagnostic()?;
            }
            OutputFormat::Md | OutputFormat::Table => {
                if items.is_empty() {
                    return Ok(());
                }
                let mut builder = Builder::default();
                builder.push_record(T::headers().iter().copied());
                for item in items {
                    builder.push_record(item.row());
                }
                let mut table = builder.build();
                if self.format == OutputFormat::Md {
                    table.with(Style::markdown());
                } else {
                    table.with(Style::rounded());
                }
                println!("{}", table);
            }
            OutputFormat::Json | OutputFormat::Yaml => {}
        }
        Ok(())
    }

    /// `✓ message` on stdout for table output
    pub fn success(&self, message: impl Display) {
        if !self.quiet && !self.format.is_structured() && self.format != OutputFormat::Id {
            println!("{} {}", style("✓").green(), message);
        }
    }

    /// Informational line for table output
    pub fn note(&self, message: impl Display) {
        if !self.quiet && self.format == OutputFormat::Table {
            println!("{}", message);
        }
    }

    /// Warnings go to stderr regardless of format
    pub fn warn(&self, message: impl Display) {
        if !self.quiet {
            eprintln!("{} {}", style("!").yellow(), message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::{EntityKind, ReferenceId};

    #[test]
    fn test_cycle_path_rendering() {
        let report = CycleReport {
            relationship_type: "depends_on".into(),
            requirements: vec![
                ReferenceId::new(EntityKind::Requirement, 1),
                ReferenceId::new(EntityKind::Requirement, 2),
            ],
        };
        assert_eq!(report.key(), "REQ-001 → REQ-002");
        assert_eq!(report.row()[0], "depends_on");
    }
}
