//! Text output of the `rsop` commands.

use clap::ValueEnum;
use rsop_gitops::ImpactReport;
use rsop_policy::{CapabilityMap, Differential};

/// How a capability map is printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Policy document with the responsible policies as comments.
    #[default]
    Hcl,
    /// Markdown table.
    Table,
}

/// Render a resolved capability map.
pub fn render_capabilities(map: &CapabilityMap, format: OutputFormat) -> String {
    match format {
        OutputFormat::Hcl => map.to_policy_document().trim().to_string(),
        // everything granted shows up as added
        OutputFormat::Table => CapabilityMap::new().diff(map).markdown_table(),
    }
}

/// Headline for one identity's differential.
pub fn summary_line(path: &str, diff: &Differential) -> String {
    let changes = diff.metrics().capability_changes;
    if changes == 0 {
        return format!("0 effective changes to `{}` (policy assignment change is a no-op).", path);
    }
    let noun = if changes == 1 { "change" } else { "changes" };
    format!("{} effective {} to `{}`.", changes, noun, path)
}

/// Render every differential of a report, in path order.
pub fn render_impact(report: &ImpactReport) -> String {
    let mut out = String::new();
    for (path, diff) in &report.differentials {
        out.push_str(&summary_line(path, diff));
        out.push_str("\n\n");
        let table = diff.markdown_table();
        if !table.is_empty() {
            out.push_str(&table);
            out.push('\n');
        }
    }
    out
}
