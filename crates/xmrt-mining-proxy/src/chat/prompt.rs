use crate::format::{format_compact_number, format_hash_rate, format_xmr};
use crate::snapshot::RetrievalResult;

pub const BASE_PROMPT: &str = "You are Eliza, an AI assistant for XMRT DAO, a decentralized mobile mining ecosystem powered by Monero (XMR).

Your role is to:
- Help users understand mobile Monero mining
- Provide information about XMRT DAO governance and tokens
- Answer questions about mining statistics and performance
- Guide users through the ecosystem
- Be friendly, helpful, and knowledgeable about privacy-preserving technology

Keep responses concise, clear, and actionable.";

pub const FOUNDER_NOTE: &str = "Note: User is a XMRT DAO founder.";

pub fn build_system_prompt(mining: Option<&RetrievalResult>, is_founder: bool) -> String {
    let mut prompt = BASE_PROMPT.to_string();

    if let Some(result) = mining {
        let miner = &result.miner;
        prompt.push_str("\n\nCurrent Mining Context:");
        prompt.push_str(&format!("\n- Hashrate: {}", format_hash_rate(miner.hash_rate)));
        prompt.push_str(&format!(
            "\n- Total Hashes: {}",
            format_compact_number(miner.total_hashes_lifetime as f64)
        ));
        prompt.push_str(&format!("\n- Valid Shares: {}", miner.valid_share_count));
        prompt.push_str(&format!("\n- Amount Due: {}", format_xmr(miner.amount_due_atomic_units)));
        prompt.push_str(&format!("\n- Amount Paid: {}", format_xmr(miner.amount_paid_atomic_units)));
        prompt.push_str(&format!("\n- Data Source: {}", miner.source_status));
        if miner.is_synthetic() {
            prompt.push_str("\n- These figures are placeholder demo numbers, not live pool data.");
        }
    }

    if is_founder {
        prompt.push_str("\n\n");
        prompt.push_str(FOUNDER_NOTE);
    }
    prompt
}
