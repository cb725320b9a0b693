use serde::{Deserialize, Serialize};

/// A batch that produced no merge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedBatch {
    pub batch_id: String,
    pub keys: Vec<String>,
    pub kind: String,
    pub reason: String,
}

/// Deterministic end-of-run report
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub target_language: String,
    pub provider: String,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    pub missing_before: usize,
    pub missing_after: usize,
    /// Entries merged into the output
    pub translated: usize,
    /// Entries of failed batches
    pub failed: usize,
    /// Entries translated in batches that needed at least one repair
    pub repaired: usize,
    pub batches: usize,
    pub repair_attempts: u32,
    pub failed_batches: Vec<FailedBatch>,
    /// Set when the run stopped early
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.failed_batches.is_empty() && self.aborted.is_none()
    }

    /// Fixed-layout text block for terminals and logs
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Run {}\n", self.run_id));
        out.push_str(&format!("  Target language : {}\n", self.target_language));
        out.push_str(&format!("  Provider        : {}\n", self.provider));
        out.push_str(&format!("  Missing before  : {}\n", self.missing_before));
        out.push_str(&format!("  Missing after   : {}\n", self.missing_after));
        out.push_str(&format!("  Translated      : {}\n", self.translated));
        out.push_str(&format!("  Failed          : {}\n", self.failed));
        out.push_str(&format!("  Repaired        : {}\n", self.repaired));
        out.push_str(&format!("  Batches         : {}\n", self.batches));
        out.push_str(&format!("  Repair attempts : {}\n", self.repair_attempts));
        if let Some(reason) = &self.aborted {
            out.push_str(&format!("  Aborted         : {}\n", reason));
        }
        if !self.failed_batches.is_empty() {
            out.push_str("  Failed batches:\n");
            for batch in &self.failed_batches {
                out.push_str(&format!(
                    "    {} [{}] {} ({})\n",
                    batch.batch_id,
                    batch.kind,
                    batch.keys.join(", "),
                    batch.reason
                ));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lists_failed_batches() {
        let summary = RunSummary {
            run_id: "r1".into(),
            target_language: "fr".into(),
            provider: "mock".into(),
            missing_before: 3,
            missing_after: 1,
            translated: 2,
            failed: 1,
            batches: 2,
            repair_attempts: 2,
            failed_batches: vec![FailedBatch {
                batch_id: "batch-0002".into(),
                keys: vec!["welcome".into()],
                kind: "validation".into(),
                reason: "placeholder mismatch".into(),
            }],
            ..Default::default()
        };
        let text = summary.render();
        assert!(text.contains("  Missing before  : 3\n"));
        assert!(text.contains("  Missing after   : 1\n"));
        assert!(text.contains("    batch-0002 [validation] welcome (placeholder mismatch)\n"));
        assert!(!text.contains("Aborted"));
        assert!(!summary.is_clean());
    }
}
