//! Export renderers for the canonical session output.
//!
//! Pure, stateless transformations: every format is derived from the single
//! [`SessionOutput`] object with no information loss for `results` and
//! `summary`.

use crate::domain::error::Result;
use crate::output::SessionOutput;

/// Pretty JSON, trailing newline.
pub fn to_json(output: &SessionOutput) -> Result<String> {
    let mut text = serde_json::to_string_pretty(output)?;
    text.push('\n');
    Ok(text)
}

/// CSV with two sections: one row per result, then a `metric,value` block
/// carrying the summary. Evidence is JSON-encoded in its cell so multi-item
/// lists survive the round trip.
pub fn to_csv(output: &SessionOutput) -> Result<String> {
    let mut out = String::new();
    out.push_str("identity,score,subreddit,thread_title,url,evidence\n");

    for record in &output.results {
        let evidence = serde_json::to_string(&record.evidence)?;
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            csv_field(&record.identity),
            record.score,
            csv_field(&record.source.subreddit),
            csv_field(&record.source.thread_title),
            csv_field(&record.source.url),
            csv_field(&evidence),
        ));
    }

    out.push('\n');
    out.push_str("metric,value\n");
    out.push_str(&format!("total,{}\n", output.summary.total));
    out.push_str(&format!(
        "high_confidence_count,{}\n",
        output.summary.high_confidence_count
    ));
    for (source, count) in &output.summary.source_breakdown {
        out.push_str(&format!("source:{},{}\n", csv_field(source), count));
    }
    for pattern in &output.summary.observed_patterns {
        out.push_str(&format!("pattern,{}\n", csv_field(pattern)));
    }
    Ok(out)
}

/// Quote a CSV field when it contains a delimiter, quote, or newline.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Human-readable Markdown report.
pub fn to_markdown(output: &SessionOutput) -> String {
    let mut out = String::new();
    out.push_str("# Scout Report\n\n");
    out.push_str("## Summary\n");
    out.push_str(&format!("- candidates: {}\n", output.summary.total));
    out.push_str(&format!(
        "- high confidence: {}\n",
        output.summary.high_confidence_count
    ));
    for (source, count) in &output.summary.source_breakdown {
        out.push_str(&format!("- r/{source}: {count}\n"));
    }
    out.push('\n');

    if !output.summary.observed_patterns.is_empty() {
        out.push_str("### Observed Patterns\n");
        for pattern in &output.summary.observed_patterns {
            out.push_str(&format!("- {pattern}\n"));
        }
        out.push('\n');
    }

    out.push_str("## Candidates\n");
    if output.results.is_empty() {
        out.push_str("No qualifying candidates found.\n");
        return out;
    }

    for record in &output.results {
        out.push_str(&format!(
            "### {} (score {:.2})\n",
            record.identity, record.score
        ));
        out.push_str(&format!(
            "- source: r/{} — {}\n",
            record.source.subreddit, record.source.thread_title
        ));
        out.push_str(&format!("- url: {}\n", record.source.url));
        for quote in &record.evidence {
            out.push_str(&format!("> {quote}\n"));
        }
        out.push('\n');
    }
    out
}
