//! Webhook delivery: signing, dispatch and the dispatch queue.

pub mod delivery;
pub mod dispatcher;
pub mod queue;
pub mod signer;

pub use delivery::{outcome_state, DeliveryError, DeliveryReceipt};
pub use dispatcher::{DeliveryHandle, WebhookDispatcher, EVENT_HEADER};
pub use queue::DispatchQueue;
pub use signer::{sign, verify, SignatureError, SIGNATURE_HEADER};
