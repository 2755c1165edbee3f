//! Request handler that records every request it receives.

use parking_lot::Mutex;
use shared_types::{BlockType, Hash, ShardId};

use crate::ports::RequestHandler;

/// A recorded transaction request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    /// Kind of the requested transactions.
    pub block_type: BlockType,
    /// Shard asked.
    pub dest_shard: ShardId,
    /// Requested hashes.
    pub hashes: Vec<Hash>,
}

/// Loopback request handler: nothing goes to the network.
#[derive(Default)]
pub struct RequestHandlerRecorder {
    tx_requests: Mutex<Vec<TxRequest>>,
    mini_block_requests: Mutex<Vec<(ShardId, Hash)>>,
}

impl RequestHandlerRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transaction requests, in arrival order.
    pub fn tx_requests(&self) -> Vec<TxRequest> {
        self.tx_requests.lock().clone()
    }

    /// Every requested transaction hash, in arrival order.
    pub fn requested_tx_hashes(&self) -> Vec<Hash> {
        self.tx_requests
            .lock()
            .iter()
            .flat_map(|request| request.hashes.iter().copied())
            .collect()
    }

    /// Miniblock requests as `(shard, hash)`, in arrival order.
    pub fn mini_block_requests(&self) -> Vec<(ShardId, Hash)> {
        self.mini_block_requests.lock().clone()
    }
}

impl RequestHandler for RequestHandlerRecorder {
    fn request_transactions(&self, block_type: BlockType, dest_shard: ShardId, hashes: Vec<Hash>) {
        self.tx_requests.lock().push(TxRequest {
            block_type,
            dest_shard,
            hashes,
        });
    }

    fn request_mini_block(&self, dest_shard: ShardId, hash: Hash) {
        self.mini_block_requests.lock().push((dest_shard, hash));
    }
}
