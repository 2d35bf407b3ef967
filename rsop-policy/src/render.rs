//! Text renderings of capability maps and differentials.

use prettytable::format::{FormatBuilder, LinePosition, LineSeparator, TableFormat};
use prettytable::{Cell, Row, Table};
use std::fmt::Write;

use crate::diff::{ChangeKind, Differential};
use crate::rsop::CapabilityMap;

const TABLE_HEADER: [&str; 4] = ["Path", "Change", "Capability", "Policy / Policies"];

impl CapabilityMap {
    /// Render as a policy document with the responsible policies as inline
    /// comments.
    ///
    /// # Example
    ///
    /// ```
    /// use rsop_policy::{Capability, CapabilityMap};
    ///
    /// let mut map = CapabilityMap::new();
    /// map.grant("secret/*", Capability::Read, "reader");
    /// map.grant("secret/*", Capability::Read, "auditor");
    ///
    /// let document = map.to_policy_document();
    /// assert!(document.contains("path \"secret/*\" {"));
    /// assert!(document.contains("\"read\", # from: reader, auditor"));
    /// ```
    pub fn to_policy_document(&self) -> String {
        let mut out = String::from("# generated by rsop\n");
        for (index, (path, grants)) in self.iter().enumerate() {
            if index > 0 {
                out.push('\n');
            }
            let _ = writeln!(out, "path {} {{", quote(path));
            out.push_str("  capabilities = [\n");
            for (capability, policies) in grants {
                let _ = writeln!(
                    out,
                    "    {}, # from: {}",
                    quote(capability.as_str()),
                    policies.join(", ")
                );
            }
            out.push_str("  ]\n}\n");
        }
        out
    }
}

impl Differential {
    /// Render a GitHub-flavored markdown table of changes, or the empty string
    /// if there are none.
    pub fn markdown_table(&self) -> String {
        if self.is_empty() {
            return String::new();
        }

        let mut table = Table::new();
        table.set_format(markdown_format());
        table.set_titles(Row::new(TABLE_HEADER.iter().map(|title| Cell::new(title)).collect()));

        let mut last_path = None;
        for entry in self.entries() {
            let path_cell = if last_path == Some(entry.path) {
                ""
            } else {
                last_path = Some(entry.path);
                entry.path
            };
            let change = match entry.change {
                ChangeKind::Added => "➕",
                ChangeKind::Removed => "➖",
            };
            table.add_row(Row::new(vec![
                Cell::new(path_cell),
                Cell::new(change),
                Cell::new(entry.capability.as_str()),
                Cell::new(&entry.policies.join("` , `")),
            ]));
        }
        table.to_string()
    }
}

/// Pipe-delimited rows with a dashed line under the header.
fn markdown_format() -> TableFormat {
    FormatBuilder::new()
        .column_separator('|')
        .borders('|')
        .separator(LinePosition::Title, LineSeparator::new('-', '|', '|', '|'))
        .padding(1, 1)
        .build()
}

fn quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}
