//! Survey report generation.
//!
//! This module renders the aggregated survey as a sortable HTML page,
//! as Markdown tables, or as JSON.

use crate::analysis::most_divergent;
use crate::models::{AggregateRow, CatalogFacts, Survey, TesterSummary};
use anyhow::Result;

const BAD_COLOR: &str = "#FF9900";
const GOOD_COLOR: &str = "#99FF00";

/// Tol./MAD below this is colored bad, above `RATIO_GOOD` good.
const RATIO_BAD: f64 = 1.0;
const RATIO_GOOD: f64 = 10.0;

/// Format like C's `%.1e`: one decimal, signed exponent of at least two digits.
pub fn format_sci(value: f64) -> String {
    let formatted = format!("{:.1e}", value);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => match exponent.parse::<i32>() {
            Ok(exp) => {
                let sign = if exp < 0 { '-' } else { '+' };
                format!("{}e{}{:02}", mantissa, sign, exp.abs())
            }
            Err(_) => formatted,
        },
        None => formatted,
    }
}

/// Escape text for HTML element content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Generate the complete HTML survey page.
pub fn generate_html_report(survey: &Survey) -> String {
    let mut output = String::new();

    output.push_str(&generate_html_header(&survey.metadata.title));
    output.push_str(&format!(
        "<center><h1>{}</h1></center>\n",
        escape_html(&survey.metadata.title.to_uppercase())
    ));

    output.push_str(&generate_facts_box(&survey.facts));

    let theader = generate_table_header(&survey.testers);
    output.push_str("<div class=\"waitmsg\">Sorting, please wait...</div>\n");
    output.push_str("<p>Click on table header to sort by column.</p>\n");
    output.push_str("<table border=\"1\" cellpadding=\"5\">\n");
    output.push_str(&format!("<thead>{}</thead>", theader));
    output.push_str(&format!("<tfoot>{}</tfoot>", theader));
    output.push_str("<tbody>");
    for row in &survey.rows {
        output.push_str(&generate_html_row(row, survey.type_title(row.test_type)));
    }
    output.push_str("</tbody>");
    output.push_str("</table>\n");

    output.push_str(&format!(
        "<p><small>Page last updated: {}</small></p>\n",
        survey.metadata.generated_at.format("%Y-%m-%dT%H:%M:%S")
    ));
    output.push_str("</body></html>");

    output
}

/// Document head with the table-sorting scripts and styles.
fn generate_html_header(title: &str) -> String {
    let mut header = String::new();

    header.push_str("<!DOCTYPE HTML PUBLIC \"-//W3C//DTD HTML 4.01 Transitional//EN\">\n");
    header.push_str("<html><head>\n");
    header.push_str("<meta http-equiv=\"Content-Type\" content=\"text/html; charset=utf-8\">\n");
    header.push_str("<script type=\"text/javascript\" src=\"https://code.jquery.com/jquery-2.1.4.min.js\"></script>\n");
    header.push_str("<script type=\"text/javascript\" src=\"https://cdnjs.cloudflare.com/ajax/libs/jquery.tablesorter/2.23.2/js/jquery.tablesorter.min.js\"></script>\n");
    header.push_str("<script type=\"text/javascript\">\n");
    header.push_str("$(document).ready(function(){\n");
    header.push_str("    $(\"table\").tablesorter();\n");
    header.push_str("    $(\"table\").bind(\"sortStart\",function(){ $(\".waitmsg\").show(); });\n");
    header.push_str("    $(\"table\").bind(\"sortEnd\",  function(){ $(\".waitmsg\").hide(); });\n");
    header.push_str("  }\n");
    header.push_str(");\n");
    header.push_str("</script>\n");
    header.push_str("<style type=\"text/css\">\n");
    header.push_str(".nowrap { white-space: nowrap; }\n");
    header.push_str("tr:hover { background-color: #ffff99; }\n");
    header.push_str(".waitmsg {\n  color: red;\n  font: bold 20pt sans-serif;\n  display: none;\n}\n");
    header.push_str("#factbox {\n  display: inline-block;\n  border-radius: 1em;\n");
    header.push_str("  box-shadow: .2em .2em .7em 0 #777;\n  background: #f7f7f0;\n");
    header.push_str("  padding: 1em;\n  margin: 20px;\n}\n");
    header.push_str("#factbox h2 { margin: 0 0 0.5em 0; }\n");
    header.push_str("</style>\n");
    header.push_str(&format!("<title>{}</title>\n", escape_html(title)));
    header.push_str("</head><body>\n");

    header
}

fn fact_line(label: &str, n: usize, percent: f64) -> String {
    format!(
        "<tr><td>{}</td><td align=\"right\">{}</td><td align=\"right\">{:.1}%</td></tr>\n",
        label, n, percent
    )
}

/// Box of catalog-wide counts.
fn generate_facts_box(facts: &CatalogFacts) -> String {
    let mut section = String::new();

    section.push_str("<div id=\"factbox\"><table>\n");
    section.push_str(&fact_line("Total number of test-cases", facts.total, 100.0));
    section.push_str(&fact_line(
        "Tests which require flags",
        facts.require_flags,
        facts.percent(facts.require_flags),
    ));
    section.push_str(&fact_line(
        "Numeric tests, ie. type &ne; 0",
        facts.numeric,
        facts.percent(facts.numeric),
    ));
    section.push_str(&fact_line(
        "Numeric tests with fixed reference",
        facts.with_reference,
        facts.percent(facts.with_reference),
    ));
    for &(k, n) in &facts.tolerance_buckets {
        section.push_str(&fact_line(
            &format!("Numeric tests with tolerance &le; 10<sup>-{}</sup>", k),
            n,
            facts.percent(n),
        ));
    }
    section.push_str("</table></div>\n");

    section
}

/// Header row, repeated as footer.
fn generate_table_header(testers: &[TesterSummary]) -> String {
    let mut header = String::new();

    header.push_str("<tr align=\"center\"><th>Name</th><th>Type</th><th>Tolerance</th>");
    header.push_str("<th><abbr title=\"Maximum Absolute Deviation\">MAD</abbr></th>");
    header.push_str("<th>Tol. / MAD</th><th>Reference</th><th>Median</th>");
    header.push_str("<th><abbr title=\"Failures if ref. were at median.\">#failed</abbr></th>");
    for tester in testers {
        header.push_str(&format!(
            "<th><span class=\"nowrap\">{}</span>",
            escape_html(&tester.name)
        ));
        header.push_str(&format!("<br>#failed: {}", tester.failed));
        header.push_str(&format!("<br>#skipped: {}", tester.skipped));
        header.push_str("</th>\n");
    }
    header.push_str("<th>Name</th>");
    header.push_str("</tr>\n");

    header
}

/// Cell for the Tol./MAD ratio, colored by how much headroom remains.
fn ratio_cell(ratio: f64) -> String {
    if ratio < RATIO_BAD {
        format!("<td bgcolor=\"{}\">{}</td>\n", BAD_COLOR, format_sci(ratio))
    } else if ratio > RATIO_GOOD {
        format!("<td bgcolor=\"{}\">{}</td>\n", GOOD_COLOR, format_sci(ratio))
    } else {
        format!("<td>{}</td>\n", format_sci(ratio))
    }
}

/// One table row.
fn generate_html_row(row: &AggregateRow, type_title: &str) -> String {
    let mut tr = String::new();

    let style = if row.outlier {
        format!("bgcolor=\"{}\"", BAD_COLOR)
    } else {
        String::new()
    };
    let name = escape_html(&row.name);

    tr.push_str("<tr align=\"right\">\n");
    tr.push_str(&format!("<th align=\"left\" {}>{}</th>\n", style, name));
    tr.push_str(&format!(
        "<td title=\"{}\" >{}</td>\n",
        escape_html(type_title),
        row.test_type
    ));
    tr.push_str(&format!("<td>{}</td>\n", format_sci(row.tolerance)));
    tr.push_str(&format!("<td>{}</td>\n", format_sci(row.dispersion)));
    tr.push_str(&ratio_cell(row.tolerance_ratio()));
    tr.push_str(&format!("<td>{}</td>\n", escape_html(&row.ref_value)));
    tr.push_str(&format!("<td>{}</td>\n", escape_html(&row.consensus_text)));
    tr.push_str(&format!("<td>{}</td>\n", row.outlier_count()));
    for cell in &row.cells {
        match cell {
            None => tr.push_str("<td></td>\n"),
            Some(c) if c.outlier => tr.push_str(&format!(
                "<td bgcolor=\"{}\">{}</td>",
                BAD_COLOR,
                escape_html(&c.text)
            )),
            Some(c) => tr.push_str(&format!("<td>{}</td>", escape_html(&c.text))),
        }
    }
    tr.push_str(&format!("<th align=\"left\" {}>{}</th>\n", style, name));
    tr.push_str("</tr>\n");

    tr
}

/// Generate a Markdown survey.
pub fn generate_markdown_report(survey: &Survey) -> String {
    let mut output = String::new();

    output.push_str(&format!("# {}\n\n", survey.metadata.title));
    output.push_str(&format!(
        "- **Generated:** {}\n",
        survey.metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!("- **Test cases surveyed:** {}\n", survey.rows.len()));
    output.push_str(&format!("- **With outliers:** {}\n\n", survey.flagged_rows()));

    output.push_str(&generate_markdown_facts(&survey.facts));
    output.push_str(&generate_markdown_testers(&survey.testers));
    output.push_str(&generate_markdown_divergent(&survey.rows));
    output.push_str(&generate_markdown_table(survey));

    output.push_str("---\n\n");
    output.push_str(&format!(
        "*Generated by regsurvey v{}*\n",
        survey.metadata.tool_version
    ));

    output
}

fn generate_markdown_facts(facts: &CatalogFacts) -> String {
    let mut section = String::new();

    section.push_str("## Catalog\n\n");
    section.push_str("| Fact | Count | Share |\n");
    section.push_str("|:---|---:|---:|\n");
    let mut line = |label: &str, n: usize| {
        section.push_str(&format!("| {} | {} | {:.1}% |\n", label, n, facts.percent(n)));
    };
    line("Total number of test-cases", facts.total);
    line("Tests which require flags", facts.require_flags);
    line("Numeric tests (type != 0)", facts.numeric);
    line("Numeric tests with fixed reference", facts.with_reference);
    for &(k, n) in &facts.tolerance_buckets {
        line(&format!("Numeric tests with tolerance <= 1e-{}", k), n);
    }
    section.push('\n');

    section
}

fn generate_markdown_testers(testers: &[TesterSummary]) -> String {
    let mut section = String::new();

    section.push_str("## Testers\n\n");
    if testers.is_empty() {
        section.push_str("No tester report could be used.\n\n");
        return section;
    }

    section.push_str("| Tester | #failed | #skipped |\n");
    section.push_str("|:---|:---:|:---:|\n");
    for tester in testers {
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            tester.name, tester.failed, tester.skipped
        ));
    }
    section.push('\n');

    section
}

fn generate_markdown_divergent(rows: &[AggregateRow]) -> String {
    let worst = most_divergent(rows, 10);
    if worst.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Most Divergent Tests\n\n");
    section.push_str("| Name | Tolerance | MAD | Tol. / MAD |\n");
    section.push_str("|:---|---:|---:|---:|\n");
    for row in worst {
        section.push_str(&format!(
            "| `{}` | {} | {} | {} |\n",
            row.name,
            format_sci(row.tolerance),
            format_sci(row.dispersion),
            format_sci(row.tolerance_ratio())
        ));
    }
    section.push('\n');

    section
}

fn generate_markdown_table(survey: &Survey) -> String {
    let mut section = String::new();

    section.push_str("## Survey\n\n");
    if survey.rows.is_empty() {
        section.push_str("No test case was reported by any tester.\n\n");
        return section;
    }

    section.push_str("| Name | Type | Tolerance | MAD | Tol. / MAD | Reference | Median | #failed |");
    for tester in &survey.testers {
        section.push_str(&format!(" {} |", tester.name));
    }
    section.push('\n');
    section.push_str("|:---|---:|---:|---:|---:|---:|---:|---:|");
    for _ in &survey.testers {
        section.push_str("---:|");
    }
    section.push('\n');

    for row in &survey.rows {
        let name = if row.outlier {
            format!("**`{}`**", row.name)
        } else {
            format!("`{}`", row.name)
        };
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} | {} |",
            name,
            row.test_type,
            format_sci(row.tolerance),
            format_sci(row.dispersion),
            format_sci(row.tolerance_ratio()),
            row.ref_value,
            row.consensus_text,
            row.outlier_count()
        ));
        for cell in &row.cells {
            match cell {
                None => section.push_str("  |"),
                Some(c) if c.outlier => section.push_str(&format!(" **{}** |", c.text)),
                Some(c) => section.push_str(&format!(" {} |", c.text)),
            }
        }
        section.push('\n');
    }
    section.push('\n');

    section
}

/// Generate a JSON survey.
pub fn generate_json_report(survey: &Survey) -> Result<String> {
    serde_json::to_string_pretty(survey).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RowCell, SurveyMetadata};
    use chrono::Utc;

    fn cell(text: &str, value: f64, deviation: f64, outlier: bool) -> Option<RowCell> {
        Some(RowCell {
            text: text.to_string(),
            value,
            deviation,
            outlier,
        })
    }

    fn create_test_survey() -> Survey {
        Survey {
            metadata: SurveyMetadata {
                title: "Regtest Survey".to_string(),
                generated_at: Utc::now(),
                tool_version: "1.0.0".to_string(),
            },
            facts: CatalogFacts {
                total: 3,
                require_flags: 1,
                numeric: 2,
                with_reference: 0,
                tolerance_buckets: vec![(14, 1), (6, 2)],
            },
            testers: vec![
                TesterSummary {
                    key: "gcc".to_string(),
                    name: "GCC <debug>".to_string(),
                    failed: 0,
                    skipped: 1,
                },
                TesterSummary {
                    key: "intel".to_string(),
                    name: "Intel".to_string(),
                    failed: 1,
                    skipped: 0,
                },
            ],
            rows: vec![
                AggregateRow {
                    name: "QS/h2o.inp".to_string(),
                    test_type: 1,
                    tolerance: 0.05,
                    ref_value: String::new(),
                    cells: vec![cell("1.0", 1.0, 0.0, false), cell("1.2", 1.2, 0.2, true)],
                    consensus: 1.0,
                    consensus_text: "1.0".to_string(),
                    consensus_column: 0,
                    dispersion: 0.2,
                    outlier: true,
                },
                AggregateRow {
                    name: "QS/ch4.inp".to_string(),
                    test_type: 2,
                    tolerance: 1e-10,
                    ref_value: "-8.0".to_string(),
                    cells: vec![None, cell("-8.0", -8.0, 0.0, false)],
                    consensus: -8.0,
                    consensus_text: "-8.0".to_string(),
                    consensus_column: 1,
                    dispersion: 0.0,
                    outlier: false,
                },
            ],
            test_types: vec![
                String::new(),
                "Total energy:".to_string(),
                "Dipole".to_string(),
            ],
        }
    }

    #[test]
    fn test_format_sci_matches_printf() {
        assert_eq!(format_sci(0.2), "2.0e-01");
        assert_eq!(format_sci(5.0), "5.0e+00");
        assert_eq!(format_sci(0.0), "0.0e+00");
        assert_eq!(format_sci(1.0e-14), "1.0e-14");
        assert_eq!(format_sci(-3.0e120), "-3.0e+120");
        assert_eq!(format_sci(1.0e4), "1.0e+04");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a<b & \"c\""), "a&lt;b &amp; &quot;c&quot;");
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_generate_html_report() {
        let survey = create_test_survey();
        let html = generate_html_report(&survey);

        assert!(html.starts_with("<!DOCTYPE HTML"));
        assert!(html.contains("<title>Regtest Survey</title>"));
        assert!(html.contains("REGTEST SURVEY"));
        assert!(html.contains("GCC &lt;debug&gt;"));
        assert!(html.contains("#failed: 1"));
        assert!(html.contains("#skipped: 1"));
        assert!(html.contains("<td bgcolor=\"#FF9900\">1.2</td>"));
        assert!(html.contains("title=\"Total energy:\""));
        assert!(html.contains("Page last updated:"));
        assert!(html.ends_with("</body></html>"));
    }

    #[test]
    fn test_html_row_highlighting() {
        let survey = create_test_survey();

        let flagged = generate_html_row(&survey.rows[0], "Total energy:");
        assert!(flagged.contains("<th align=\"left\" bgcolor=\"#FF9900\">QS/h2o.inp</th>"));
        assert!(flagged.contains("<td>2.0e-01</td>"));
        assert!(flagged.contains("<td>1</td>"));

        let clean = generate_html_row(&survey.rows[1], "Dipole");
        assert!(clean.contains("<th align=\"left\" >QS/ch4.inp</th>"));
        assert!(clean.contains("<td></td>"));
        assert!(clean.contains("<td>-8.0</td>"));
    }

    #[test]
    fn test_ratio_cell_colors() {
        assert!(ratio_cell(0.25).contains(BAD_COLOR));
        assert!(ratio_cell(1.0e4).contains(GOOD_COLOR));
        assert_eq!(ratio_cell(5.0), "<td>5.0e+00</td>\n");
    }

    #[test]
    fn test_facts_box() {
        let survey = create_test_survey();
        let facts = generate_facts_box(&survey.facts);

        assert!(facts.contains("Total number of test-cases"));
        assert!(facts.contains("<td align=\"right\">2</td><td align=\"right\">66.7%</td>"));
        assert!(facts.contains("10<sup>-14</sup>"));
    }

    #[test]
    fn test_generate_markdown_report() {
        let survey = create_test_survey();
        let markdown = generate_markdown_report(&survey);

        assert!(markdown.contains("# Regtest Survey"));
        assert!(markdown.contains("## Catalog"));
        assert!(markdown.contains("## Testers"));
        assert!(markdown.contains("## Most Divergent Tests"));
        assert!(markdown.contains("**`QS/h2o.inp`**"));
        assert!(markdown.contains(" **1.2** |"));
        assert!(markdown.contains("- **With outliers:** 1"));
    }

    #[test]
    fn test_markdown_empty_survey() {
        let mut survey = create_test_survey();
        survey.rows.clear();
        survey.testers.clear();
        let markdown = generate_markdown_report(&survey);

        assert!(markdown.contains("No tester report could be used."));
        assert!(markdown.contains("No test case was reported by any tester."));
        assert!(!markdown.contains("## Most Divergent Tests"));
    }

    #[test]
    fn test_generate_json_report() {
        let survey = create_test_survey();
        let json = generate_json_report(&survey).unwrap();

        assert!(json.contains("\"rows\""));
        assert!(json.contains("\"consensus_text\""));
        assert!(json.contains("\"testers\""));
        let parsed: Survey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.rows.len(), 2);
    }
}
