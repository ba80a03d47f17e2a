use crate::checksum::Checksum256;
use crate::name::AccountName;
use crate::time::BlockTimestamp;
use crate::transaction::Action;
use borsh::{BorshDeserialize, BorshSerialize};

/// Final disposition of an executed transaction. Encoded as a single byte
/// on the wire, in declaration order.
#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransactionStatus {
    Executed,
    SoftFail,
    HardFail,
    Delayed,
    Expired,
}

impl TransactionStatus {
    /// Whether the transaction reached a successful terminal state.
    pub fn succeeded(&self) -> bool {
        matches!(self, TransactionStatus::Executed)
    }
}

/// RAM accounting delta attributed to one account.
#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AccountDelta {
    pub account: AccountName,
    pub delta: i64,
}

/// Receipt for one successfully dispatched action.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct ActionReceipt {
    pub receiver: AccountName,
    pub act_digest: Checksum256,
    pub global_sequence: u64,
    pub recv_sequence: u64,
    pub auth_sequence: Vec<(AccountName, u64)>,
    pub code_sequence: u32,
    pub abi_sequence: u32,
}

/// Execution record for one action.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct ActionTrace {
    pub action_ordinal: u32,
    pub creator_action_ordinal: u32,
    pub receipt: Option<ActionReceipt>,
    pub receiver: AccountName,
    pub act: Action,
    pub context_free: bool,
    pub elapsed_us: i64,
    pub console: String,
    pub account_ram_deltas: Vec<AccountDelta>,
    pub except: Option<String>,
    pub error_code: Option<u64>,
}

/// Execution record for a whole transaction, returned to the guest from
/// `push_transaction` and `exec_deferred`. Failures live in `status` and
/// `except`; a trace is never itself an error.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct TransactionTrace {
    pub id: Checksum256,
    pub status: TransactionStatus,
    pub cpu_usage_us: u32,
    pub net_usage_words: u32,
    pub elapsed_us: i64,
    pub net_usage: u64,
    pub scheduled: bool,
    pub action_traces: Vec<ActionTrace>,
    pub account_ram_delta: Option<AccountDelta>,
    pub except: Option<String>,
    pub error_code: Option<u64>,
    pub failed_dtrx_trace: Vec<TransactionTrace>,
}

/// Head-block summary returned from `get_head_block_info`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct BlockInfo {
    pub block_num: u32,
    pub block_id: Checksum256,
    pub timestamp: BlockTimestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::PermissionLevel;

    fn sample_trace() -> TransactionTrace {
        TransactionTrace {
            id: Checksum256::from_bytes([5u8; 32]),
            status: TransactionStatus::Executed,
            cpu_usage_us: 2000,
            net_usage_words: 12,
            elapsed_us: 347,
            net_usage: 96,
            scheduled: false,
            action_traces: vec![ActionTrace {
                action_ordinal: 1,
                creator_action_ordinal: 0,
                receipt: Some(ActionReceipt {
                    receiver: AccountName::new(42),
                    act_digest: Checksum256::from_bytes([9u8; 32]),
                    global_sequence: 7,
                    recv_sequence: 3,
                    auth_sequence: vec![(AccountName::new(42), 1)],
                    code_sequence: 0,
                    abi_sequence: 0,
                }),
                receiver: AccountName::new(42),
                act: Action {
                    account: AccountName::new(42),
                    name: AccountName::new(43),
                    authorization: vec![PermissionLevel::new(
                        AccountName::new(42),
                        AccountName::new(44),
                    )],
                    data: vec![0xaa],
                },
                context_free: false,
                elapsed_us: 120,
                console: "hi".to_string(),
                account_ram_deltas: vec![AccountDelta {
                    account: AccountName::new(42),
                    delta: 16,
                }],
                except: None,
                error_code: None,
            }],
            account_ram_delta: None,
            except: Some("deadline exceeded".to_string()),
            error_code: Some(3),
            failed_dtrx_trace: vec![],
        }
    }

    #[test]
    fn test_trace_roundtrip_is_structural_identity() {
        let trace = sample_trace();
        let bytes = borsh::to_vec(&trace).unwrap();
        let back: TransactionTrace = borsh::from_slice(&bytes).unwrap();
        assert_eq!(back.status, trace.status);
        assert_eq!(back.elapsed_us, trace.elapsed_us);
        assert_eq!(back.action_traces, trace.action_traces);
        assert_eq!(back.except, trace.except);
        assert_eq!(back, trace);
    }

    #[test]
    fn test_status_byte_encoding() {
        assert_eq!(borsh::to_vec(&TransactionStatus::Executed).unwrap(), [0]);
        assert_eq!(borsh::to_vec(&TransactionStatus::HardFail).unwrap(), [2]);
        assert_eq!(borsh::to_vec(&TransactionStatus::Expired).unwrap(), [4]);
    }

    #[test]
    fn test_block_info_roundtrip() {
        let info = BlockInfo {
            block_num: 19,
            block_id: Checksum256::from_bytes([1u8; 32]),
            timestamp: BlockTimestamp::from_slot(88),
        };
        let back: BlockInfo = borsh::from_slice(&borsh::to_vec(&info).unwrap()).unwrap();
        assert_eq!(back, info);
    }
}
