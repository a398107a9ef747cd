use comfy_table::{presets, CellAlignment, ContentArrangement, Table};
use jvmaot::CompileReport;

/// Print the report as JSON (if `--json`) or as an aligned summary.
pub fn print_report(report: &CompileReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let mut rows = vec![
        ("classes parsed", report.parsed.to_string()),
        ("classes emitted", report.classes.to_string()),
        ("classes excluded", report.excluded.len().to_string()),
        ("classes missing", report.missing.len().to_string()),
        ("files written", report.files.to_string()),
        (
            "main class",
            report.main_class.clone().unwrap_or_else(|| "-".to_string()),
        ),
    ];
    rows.extend(
        report
            .stats
            .iter()
            .map(|(name, value)| (*name, value.to_string())),
    );
    for (name, value) in rows {
        table.add_row(vec![name.replace('_', " "), value]);
    }
    if let Some(column) = table.column_mut(1) {
        column.set_cell_alignment(CellAlignment::Right);
    }

    println!("{table}");
    for name in &report.excluded {
        println!("  excluded: {name}");
    }
    for name in &report.missing {
        println!("  missing:  {name}");
    }
    Ok(())
}
