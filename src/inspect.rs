//! Request body inspection
//!
//! The gate decomposes the body into the variable sink, hands the sink to
//! the rule engine, and turns matches into a verdict. A block verdict is
//! recorded in the correlation log under the transaction id so the response
//! summary can be correlated after the response completes.

pub mod multipart;
pub mod rules;
pub mod variables;

pub use multipart::{MultipartError, TempStorage};
pub use rules::{RuleEngine, RuleMatch, Severity, SignatureRuleSet};
pub use variables::TransactionVariables;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::access_log::AccessLog;
use crate::correlation::{CorrelationLog, TxId};

/// Outcome of inspecting one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Block(BlockRecord),
}

/// The match that blocked a transaction, kept for the response-summary log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRecord {
    pub rule_id: u32,
    pub message: String,
    pub severity: Severity,
}

/// Rule id used when a fail-closed policy blocks a malformed body
const FRAMING_VIOLATION_RULE_ID: u32 = 0;

pub struct InspectionGate {
    engine: Arc<dyn RuleEngine>,
    storage: TempStorage,
    enabled: bool,
    fail_open: bool,
}

impl InspectionGate {
    pub fn new(
        engine: Arc<dyn RuleEngine>,
        storage: TempStorage,
        enabled: bool,
        fail_open: bool,
    ) -> Self {
        Self {
            engine,
            storage,
            enabled,
            fail_open,
        }
    }

    /// Inspect one transaction's body and return the verdict.
    ///
    /// Non-multipart and unparseable content types skip decomposition and
    /// pass. A framing violation passes under fail-open (the default) and
    /// blocks under fail-closed. Any block verdict is stored in the
    /// correlation log before returning.
    pub fn inspect(
        &self,
        tx_id: TxId,
        content_type: Option<&str>,
        body: &[u8],
        correlation: &CorrelationLog,
        access_log: &AccessLog,
    ) -> Verdict {
        if !self.enabled {
            return Verdict::Pass;
        }
        let content_type = match content_type {
            Some(ct) => ct,
            None => return Verdict::Pass,
        };

        let mut vars = TransactionVariables::new();
        match multipart::decompose(content_type, body, &self.storage, &mut vars) {
            Ok(()) => {}
            Err(MultipartError::NotMultipart) | Err(MultipartError::MalformedContentType) => {
                return Verdict::Pass;
            }
            Err(e @ MultipartError::MalformedBody(_)) => {
                if self.fail_open {
                    warn!(tx_id = %tx_id, error = %e, "Malformed body, passing (fail-open)");
                    return Verdict::Pass;
                }
                let record = BlockRecord {
                    rule_id: FRAMING_VIOLATION_RULE_ID,
                    message: e.to_string(),
                    severity: Severity::Critical,
                };
                return self.block(tx_id, record, correlation, access_log);
            }
        }

        debug!(
            tx_id = %tx_id,
            post_fields = vars.post_fields().len(),
            files = vars.files().len(),
            combined_size = vars.combined_file_size(),
            "Body decomposed"
        );

        let matches = self.engine.evaluate(&vars);
        match highest_severity(matches) {
            Some(m) => {
                let record = BlockRecord {
                    rule_id: m.rule_id,
                    message: m.message,
                    severity: m.severity,
                };
                self.block(tx_id, record, correlation, access_log)
            }
            None => Verdict::Pass,
        }
    }

    fn block(
        &self,
        tx_id: TxId,
        record: BlockRecord,
        correlation: &CorrelationLog,
        access_log: &AccessLog,
    ) -> Verdict {
        access_log.blocked(&record);
        correlation.store(tx_id, record.clone());
        Verdict::Block(record)
    }
}

/// Pick the most severe match; the earliest wins a severity tie
fn highest_severity(matches: Vec<RuleMatch>) -> Option<RuleMatch> {
    matches.into_iter().fold(None, |best, m| match best {
        Some(b) if b.severity >= m.severity => Some(b),
        _ => Some(m),
    })
}
