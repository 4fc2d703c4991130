//! Report and listing output.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use vmm_expect::{Report, ScenarioEntry};

/// Print the human-readable report.
pub fn print(report: &Report, out: &mut impl Write) -> Result<()> {
    writeln!(out, "{report}")?;
    Ok(())
}

/// Write the JSON report to `path`.
pub fn write_json(report: &Report, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).with_context(|| format!("writing report {}", path.display()))?;
    tracing::info!(path = %path.display(), "JSON report written");
    Ok(())
}

/// Print one line per scenario: name, flags and tags.
pub fn list(entries: &[ScenarioEntry], out: &mut impl Write) -> Result<()> {
    let width = entries.iter().map(|e| e.name.len()).max().unwrap_or(0);
    for entry in entries {
        let options = &entry.options;
        let mut flags = Vec::new();
        if options.requires_root {
            flags.push("root".to_string());
        }
        if options.parallel_safe {
            flags.push("parallel".to_string());
        }
        if let Some(timeout) = options.timeout {
            flags.push(format!("timeout={timeout:?}"));
        }
        if !options.resources.is_empty() {
            flags.push(format!("resources={}", options.resources.join(",")));
        }
        writeln!(
            out,
            "{:<width$}  [{}]  {}",
            entry.name,
            options.tags.join(", "),
            flags.join(" ")
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use vmm_expect::{ScenarioOptions, ScriptScenario, Verdict};

    use super::*;

    #[test]
    fn listing_shows_tags_and_flags() {
        let entries = vec![
            ScenarioEntry::new(
                "ping_serve_flood",
                ScriptScenario::default(),
                ScenarioOptions {
                    requires_root: true,
                    tags: vec!["net".into(), "flood".into()],
                    resources: vec!["tap100".into()],
                    ..ScenarioOptions::default()
                },
            ),
            ScenarioEntry::new("hello", ScriptScenario::default(), ScenarioOptions::default()),
        ];
        let mut out = Vec::new();
        list(&entries, &mut out).expect("list");
        let text = String::from_utf8(out).expect("utf8");
        let first = text.lines().next().expect("line");
        assert!(first.starts_with("ping_serve_flood"));
        assert!(first.contains("[net, flood]"));
        assert!(first.contains("root"));
        assert!(first.contains("resources=tap100"));
    }

    #[test]
    fn json_report_round_trips() {
        let report = Report {
            verdicts: vec![Verdict::pass("hello", Duration::from_millis(250))],
            duration: Duration::from_millis(500),
        };
        let path = std::env::temp_dir().join(format!(
            "vmm-harness-report-{}/report.json",
            std::process::id()
        ));
        write_json(&report, &path).expect("write");
        let text = std::fs::read_to_string(&path).expect("read");
        let back: Report = serde_json::from_str(&text).expect("parse");
        assert_eq!(back, report);
        let _ = std::fs::remove_dir_all(path.parent().expect("parent"));
    }
}
