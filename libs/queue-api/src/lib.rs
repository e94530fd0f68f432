//! Shared vocabulary of the queue: records, request/response shapes,
//! the error taxonomy and the store collaborator contracts.

pub mod error;
pub mod store;
pub mod types;
pub mod util;

pub use error::{ErrorCode, QueueError};
pub use store::{BlobStore, Condition, Item, KvStore, ScanRequest, StoreError, StoreFuture, Update};
pub use types::{
    ConsumeRequest, ConsumeResponse, ConsumerGroup, CreateConsumerGroupRequest,
    CreateTopicRequest, DeliveredMessage, Message, Offset, PublishReceipt, PublishRequest, Topic,
    UpdateTopicRequest,
};
pub use util::now_ms;
