//! Contract events.
//!
//! Appended to the contract's log in call order. A reverted call leaves no
//! events behind. Clients poll the log by index.
//!
//! Events serialize externally tagged (`{"TransactionApproved": {"id": 1}}`)
//! so the same encoding works for the JSON API and the bincode snapshot.

use escrow_protocol::amount::as_decimal_str;
use escrow_protocol::{Address, Amount};
use serde::{Deserialize, Serialize};

/// Something the contract did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowEvent {
    #[serde(rename_all = "camelCase")]
    TransactionCreated {
        beneficiary: Address,
        initiator: Address,
        token_addr: Address,
        #[serde(with = "as_decimal_str")]
        token_amount: Amount,
        unlock_time: u64,
    },
    TransactionApproved {
        id: u64,
    },
    TransactionCanceled {
        id: u64,
    },
    TransactionDisputed {
        id: u64,
    },
    Paused {
        account: Address,
    },
    Unpaused {
        account: Address,
    },
    #[serde(rename_all = "camelCase")]
    OwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
    },
    TokensRescued {
        token: Address,
        to: Address,
        #[serde(with = "as_decimal_str")]
        amount: Amount,
    },
}

impl EscrowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EscrowEvent::TransactionCreated { .. } => "TransactionCreated",
            EscrowEvent::TransactionApproved { .. } => "TransactionApproved",
            EscrowEvent::TransactionCanceled { .. } => "TransactionCanceled",
            EscrowEvent::TransactionDisputed { .. } => "TransactionDisputed",
            EscrowEvent::Paused { .. } => "Paused",
            EscrowEvent::Unpaused { .. } => "Unpaused",
            EscrowEvent::OwnershipTransferred { .. } => "OwnershipTransferred",
            EscrowEvent::TokensRescued { .. } => "TokensRescued",
        }
    }
}

/// An event with its position in the log and the block it was emitted in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedEvent {
    pub index: u64,
    pub block_height: u64,
    pub timestamp: u64,
    pub event: EscrowEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logged_event_json_shape() {
        let logged = LoggedEvent {
            index: 3,
            block_height: 10,
            timestamp: 1_700_000_000,
            event: EscrowEvent::TransactionCreated {
                beneficiary: Address::from_label("b"),
                initiator: Address::from_label("a"),
                token_addr: Address::ZERO,
                token_amount: 100,
                unlock_time: 60,
            },
        };
        let v = serde_json::to_value(&logged).unwrap();
        assert_eq!(v["index"], 3);
        assert_eq!(v["blockHeight"], 10);
        let args = &v["event"]["TransactionCreated"];
        assert_eq!(args["tokenAmount"], "100");
        assert_eq!(args["unlockTime"], 60);
    }

    #[test]
    fn names_match_serde_tags() {
        let e = EscrowEvent::TransactionDisputed { id: 1 };
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v[e.name()]["id"], 1);
    }
}
