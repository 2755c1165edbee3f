//! Algorithms: classification, payload parsing, gas computation, body
//! separation and topic naming.

pub mod arguments_parser;
pub mod body_split;
pub mod gas_computation;
pub mod topics;
pub mod tx_type;

pub use arguments_parser::ArgumentsParser;
pub use body_split::separate_body_by_type;
pub use gas_computation::GasComputation;
pub use topics::{create_broadcast_topic, shard_cacher_identifier};
pub use tx_type::{is_smart_contract_address, TxTypeClassifier};
