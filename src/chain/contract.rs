//! Encoding for the voting contract's single entry point

use crate::error::{SubmitterError, SubmitterResult};

use alloy_sol_types::{sol, SolCall};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, U256};

sol! {
    /// Zero-argument payable vote; returns nothing.
    function vote() external payable;
}

/// The fixed `vote()` call sent every cycle
#[derive(Debug, Clone)]
pub struct VoteCall {
    contract: Address,
    value: U256,
    data: Bytes,
}

impl VoteCall {
    pub fn new(contract_address: &str, value: U256) -> SubmitterResult<Self> {
        let contract: Address = contract_address
            .trim()
            .parse()
            .map_err(|e| SubmitterError::Config(format!("Invalid contract address: {}", e)))?;

        Ok(Self {
            contract,
            value,
            data: Bytes::from(voteCall {}.abi_encode()),
        })
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn value(&self) -> U256 {
        self.value
    }

    /// ABI-encoded call data (the 4-byte selector, no arguments)
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn data_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.data))
    }

    /// Unpriced request used for `eth_call` and `eth_estimateGas`
    pub fn simulation_request(&self, from: Address) -> TypedTransaction {
        TransactionRequest::new()
            .from(from)
            .to(self.contract)
            .value(self.value)
            .data(self.data.clone())
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::keccak256;

    const CONTRACT: &str = "0xb0F3b3553cE518339c1B5807A392ae904fB658Ec";

    #[test]
    fn test_vote_data_is_bare_selector() {
        let call = VoteCall::new(CONTRACT, U256::zero()).unwrap();
        let hash = keccak256("vote()");
        let expected = &hash[..4];

        assert_eq!(call.data().len(), 4);
        assert_eq!(&call.data()[..], expected);
        assert_eq!(voteCall::SELECTOR, expected);
        assert_eq!(voteCall::SIGNATURE, "vote()");
        assert_eq!(call.data_hex(), format!("0x{}", hex::encode(expected)));
    }

    #[test]
    fn test_simulation_request_fields() {
        let from = Address::repeat_byte(0x11);
        let call = VoteCall::new(CONTRACT, U256::from(7u64)).unwrap();
        let tx = call.simulation_request(from);

        assert_eq!(tx.from(), Some(&from));
        assert_eq!(tx.to_addr(), Some(&call.contract()));
        assert_eq!(tx.value(), Some(&U256::from(7u64)));
        assert_eq!(tx.data(), Some(call.data()));
        assert!(tx.gas().is_none());
        assert!(tx.nonce().is_none());
    }

    #[test]
    fn test_rejects_bad_address() {
        assert!(matches!(
            VoteCall::new("0xnot-an-address", U256::zero()),
            Err(SubmitterError::Config(_))
        ));
    }
}
