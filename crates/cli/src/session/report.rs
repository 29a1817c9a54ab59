//! Session report and terminal rendering.

use allocator::RunSummary;
use contracts::{AttemptRecord, CredentialHealth, CredentialStats};
use dispatcher::{BreakerSnapshot, MetricsSnapshot};
use serde::Serialize;

/// How the session ended
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionOutcome {
    Finished(RunSummary),
    Aborted {
        summary: RunSummary,
        history: Vec<AttemptRecord>,
    },
}

/// Everything printed after a run
#[derive(Debug, Serialize)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    pub credentials: Vec<CredentialStats>,
    pub dispatch: MetricsSnapshot,
    /// Translation calls, counted apart from generation
    pub translation: MetricsSnapshot,
    pub breaker: BreakerSnapshot,
}

impl SessionReport {
    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, SessionOutcome::Aborted { .. })
    }

    pub fn summary(&self) -> &RunSummary {
        match &self.outcome {
            SessionOutcome::Finished(summary) => summary,
            SessionOutcome::Aborted { summary, .. } => summary,
        }
    }

    /// Attempt history that tripped the breaker
    pub fn history(&self) -> &[AttemptRecord] {
        match &self.outcome {
            SessionOutcome::Finished(_) => &[],
            SessionOutcome::Aborted { history, .. } => history,
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        let summary = self.summary();

        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                       Run Statistics                         ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Outcome: {}", summary.outcome);
        println!("   ├─ Duration: {:.2}s", summary.duration.as_secs_f64());
        println!("   ├─ Allocated items: {}", summary.allocations.len());
        println!("   ├─ Failed items: {}", summary.failed_items.len());
        println!("   └─ Unused items: {}", summary.unused_items.len());

        println!("\n🎯 Destinations ({})", summary.destinations.len());
        for (i, d) in summary.destinations.iter().enumerate() {
            let prefix = tree_prefix(i, summary.destinations.len());
            println!(
                "   {} {}: {}/{} (+{}, failed {}, shortfall {})",
                prefix,
                d.id,
                d.delivered,
                d.target,
                d.published(),
                d.failed,
                d.shortfall
            );
        }

        println!("\n📈 Dispatch");
        println!("   ├─ Attempts: {}", self.dispatch.attempts);
        println!("   ├─ Successes: {}", self.dispatch.successes);
        println!("   ├─ Failed attempts: {}", self.dispatch.failures);
        println!(
            "   ├─ Backoffs: {} ({:.1}s total)",
            self.dispatch.backoffs,
            self.dispatch.backoff_ms as f64 / 1000.0
        );
        println!(
            "   ├─ Translations: {} ok / {} attempts",
            self.translation.successes, self.translation.attempts
        );
        println!(
            "   └─ Breaker: {:?} ({}/{})",
            self.breaker.state, self.breaker.consecutive_failures, self.breaker.threshold
        );

        if !self.credentials.is_empty() {
            println!("\n🔑 Credentials");
            for (i, c) in self.credentials.iter().enumerate() {
                let prefix = tree_prefix(i, self.credentials.len());
                let health = match c.health {
                    CredentialHealth::Healthy => "healthy",
                    CredentialHealth::Quarantined => "quarantined",
                };
                println!(
                    "   {} {} #{} {}: {} ok / {} failed ({})",
                    prefix,
                    c.service,
                    c.index,
                    c.masked,
                    c.success_count,
                    c.total_failures,
                    health
                );
            }
        }

        let stats = &summary.stats;
        if !stats.failed_attempts.is_empty() {
            println!("\n⚠️  Failed Attempts By Kind");
            for (kind, count) in &stats.failed_attempts {
                println!("   ├─ {}: {}", kind, count);
            }
        }

        if let SessionOutcome::Aborted { history, .. } = &self.outcome {
            println!("\n⛔ Circuit breaker tripped; attempt history:");
            for record in history {
                println!("   - {}", record);
            }
        }

        println!();
    }
}

fn tree_prefix(index: usize, len: usize) -> &'static str {
    if index + 1 == len {
        "└─"
    } else {
        "├─"
    }
}
