//! EVM primitives and task-contract access for tablehop agents
//!
//! Host agents sign `address ‖ session_id` with their secp256k1 key and may
//! anchor a delegated task on the task contract by paying a bounty. Service
//! agents recover the signer, and check the on-chain record before doing work.

pub mod address;
pub mod contract;
pub mod error;
pub mod rlp;
pub mod rpc;
pub mod signer;
pub mod tx;
pub mod verify;

pub use address::EvmAddress;
pub use contract::{ChainConfig, OnChainTask, TaskContract, TaskLedger, TaskUuid};
pub use error::ChainError;
pub use rpc::{EthRpc, TransactionReceipt};
pub use signer::{EthSigner, keccak256, personal_message_hash, recover_address};
pub use verify::{AuthAssertion, ChainVerdict, ChainVerifier, VerifyError, verify_auth};
