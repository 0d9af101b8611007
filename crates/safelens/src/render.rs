//! Plain-text rendering of verification reports.

use {
    evidence::EvidencePackage,
    verifier::{SourceId, SourceStatus, VerificationReport, Verdict},
};

/// Human intent line for the call, from the descriptor registry. Display
/// only; never part of trust decisions.
fn intent(package: &EvidencePackage) -> Option<String> {
    let data = &package.transaction.data;
    if data.len() < 4 {
        return None;
    }
    let selector = [data[0], data[1], data[2], data[3]];
    descriptors::global()
        .lookup(package.chain_id, package.transaction.to, selector)
        .map(|descriptor| descriptor.intent.clone())
}

fn status_marker(status: SourceStatus) -> &'static str {
    match status {
        SourceStatus::Enabled => "[ok]",
        SourceStatus::Disabled => "[--]",
        SourceStatus::Warning => "[!!]",
        SourceStatus::Error => "[XX]",
    }
}

/// Render the report for a terminal.
pub fn report(package: &EvidencePackage, report: &VerificationReport) -> String {
    let mut out = String::new();
    let mut line = |text: String| {
        out.push_str(&text);
        out.push('\n');
    };

    line(format!(
        "Safe {} on chain {}, nonce {}",
        package.safe_address, package.chain_id, package.transaction.nonce,
    ));
    if let Some(intent) = intent(package) {
        line(format!("Intent: {intent}"));
    }
    line(format!("safeTxHash (recomputed): {}", report.hash_details.safe_tx_hash));
    if !report.hash_match {
        line(format!(
            "safeTxHash (packaged):   {}  <-- MISMATCH",
            package.safe_tx_hash,
        ));
    }
    if let Some(proposer) = report.proposer {
        line(format!("Proposer: {proposer}"));
    }
    if let Some(signatures) = &report.signatures {
        line(format!(
            "Signatures: {} valid, {} invalid, {} unsupported (threshold {})",
            signatures.valid,
            signatures.invalid,
            signatures.unsupported,
            signatures.confirmations_required,
        ));
    }
    for warning in &report.target_warnings {
        line(format!(
            "Target warning: {}",
            serde_json::to_string(warning).unwrap_or_default(),
        ));
    }
    line(String::new());

    for source in &report.sources {
        line(format!(
            "{} {:<26} {:<26} {}",
            status_marker(source.status),
            source.id.to_string(),
            source.trust.to_string(),
            source.summary,
        ));
        if let Some(reason) = &source.reason_code {
            line(format!("     reason: {reason}"));
        }
    }

    line(String::new());
    line(match report.verdict {
        Verdict::Passed => "Verdict: evidence supports the claim.".to_owned(),
        Verdict::Failed => "Verdict: evidence does NOT support the claim.".to_owned(),
        Verdict::Cancelled => "Verdict: verification cancelled.".to_owned(),
    });
    out
}

/// Render the stable source registry for the `sources` command.
pub fn sources() -> String {
    let mut out = String::new();
    for id in SourceId::ALL {
        out.push_str(&format!("{:<26} {}\n", id.to_string(), id.title()));
    }
    out
}
