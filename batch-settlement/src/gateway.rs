//! Execution gateway
//!
//! The gateway performs the actual conversion of a frozen batch. It must not
//! produce less than the instruction's minimum output; a gateway that cannot
//! honor the bound rejects the instruction.

use crate::{
    types::{SettlementInstruction, SettlementReceipt},
    Result,
};
use async_trait::async_trait;
use std::fmt;
use uuid::Uuid;

/// Executes settlement instructions
#[async_trait]
pub trait ExecutionGateway: Send + Sync + fmt::Debug {
    /// Execute the conversion and report the realized output
    async fn submit_settlement(&self, instruction: &SettlementInstruction)
        -> Result<SettlementReceipt>;
}

/// Reports the expected output as realized without moving funds
#[derive(Debug, Clone, Default)]
pub struct DryRunGateway;

impl DryRunGateway {
    /// Create new dry-run gateway
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecutionGateway for DryRunGateway {
    async fn submit_settlement(
        &self,
        instruction: &SettlementInstruction,
    ) -> Result<SettlementReceipt> {
        let reference = format!("DRYRUN-{}-{}", instruction.batch_id, Uuid::now_v7());

        tracing::info!(
            batch_id = %instruction.batch_id,
            expected_output = %instruction.expected_output,
            minimum_output = %instruction.minimum_output,
            reference = %reference,
            "Dry run: settlement not executed"
        );

        Ok(SettlementReceipt {
            reference,
            output_total: instruction.expected_output,
            executed_at: instruction.requested_at,
        })
    }
}
