//! Terminal rendering of a consistency report.

use console::Style;
use semlens_core::scoring::Tier;
use semlens_core::{ConsistencyReport, Verdict};

const GAUGE_WIDTH: usize = 30;

/// Headline shown for a verdict.
fn headline(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Match => "MATCH CONFIRMED",
        Verdict::Mismatch => "MISMATCH DETECTED",
        other => other.label(),
    }
}

fn tier_style(tier: Tier) -> Style {
    match tier {
        Tier::High => Style::new().green().bold(),
        Tier::Mid => Style::new().yellow().bold(),
        Tier::Low => Style::new().red().bold(),
    }
}

/// A `[#####-----]` bar filled in proportion to `progress` in [0, 1].
pub fn gauge(progress: f32, width: usize) -> String {
    let filled = ((progress.clamp(0.0, 1.0) * width as f32).round() as usize).min(width);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

/// Render the pretty, human-oriented view of a report.
pub fn render(report: &ConsistencyReport) -> String {
    let assessment = &report.assessment;
    let style = tier_style(assessment.verdict.tier());
    let dim = Style::new().dim();
    let bold = Style::new().bold();

    let mut out = String::new();
    out.push('\n');
    out.push_str(&format!(
        "  {}  {}\n",
        bold.apply_to(format!("Consistency score: {:.1}%", assessment.percentage)),
        style.apply_to(headline(assessment.verdict))
    ));
    out.push_str(&format!(
        "  {}\n",
        style.apply_to(gauge(assessment.progress, GAUGE_WIDTH))
    ));
    out.push('\n');
    out.push_str(&format!(
        "  The AI independently identified: {}\n",
        bold.apply_to(format!("\"{}\"", report.caption))
    ));
    if let Some(consensus) = &report.consensus_caption {
        out.push_str(&format!(
            "  Words the sampled captions agree on: \"{}\"\n",
            consensus
        ));
    }
    out.push_str(&format!(
        "  {}\n",
        dim.apply_to(format!(
            "{} ({}x{}) | policy: {} | text: {:.4} | caption: {:.4} | {} ms",
            report.file_name,
            report.width,
            report.height,
            report.policy,
            report.similarities.user_text,
            report.similarities.caption,
            report.elapsed_ms
        ))
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use semlens_core::{ConsistencyScorer, Policy, Similarities};
    use std::path::PathBuf;

    fn report(policy: Policy, user_text: f32) -> ConsistencyReport {
        let similarities = Similarities {
            user_text,
            caption: 0.25,
        };
        ConsistencyReport {
            file_path: PathBuf::from("/tmp/cat.jpg"),
            file_name: "cat.jpg".to_string(),
            content_hash: "00".repeat(32),
            format: "jpeg".to_string(),
            width: 640,
            height: 480,
            text: "a cat on a sofa".to_string(),
            caption: "a cat sleeping on a couch".to_string(),
            consensus_caption: None,
            policy,
            similarities,
            assessment: ConsistencyScorer::with_defaults(policy).assess(&similarities),
            elapsed_ms: 850,
        }
    }

    #[test]
    fn test_gauge_proportions() {
        assert_eq!(gauge(0.0, 10), "[----------]");
        assert_eq!(gauge(0.5, 10), "[#####-----]");
        assert_eq!(gauge(1.0, 10), "[##########]");
        assert_eq!(gauge(-0.2, 4), "[----]");
        assert_eq!(gauge(f32::NAN, 4), "[----]");
    }

    #[test]
    fn test_render_single_policy_match() {
        let text = console::strip_ansi_codes(&render(&report(Policy::Single, 0.312))).to_string();
        assert!(text.contains("31.2%"));
        assert!(text.contains("MATCH CONFIRMED"));
        assert!(text.contains("The AI independently identified: \"a cat sleeping on a couch\""));
        assert!(!text.contains("agree on"));
    }

    #[test]
    fn test_render_dual_policy_and_consensus() {
        let mut r = report(Policy::Dual, 0.10);
        r.consensus_caption = Some("a cat on".to_string());
        let text = console::strip_ansi_codes(&render(&r)).to_string();
        assert!(text.contains("INCONSISTENT"));
        assert!(text.contains("policy: dual"));
        assert!(text.contains("\"a cat on\""));
    }
}
