//! Outbound destinations for bulk batches

pub mod http;
pub mod response;

pub use http::{BasicAuth, HttpTransport, HttpTransportConfig};
pub use response::{BulkResponse, ItemFailure};

use crate::core::{BulkPayload, DeliveryError};

/// Something that can deliver one bulk payload
///
/// Owned exclusively by the delivery thread, so implementations need not be
/// `Sync`.
pub trait BulkTransport: Send {
    /// Send one batch. `Ok` means the endpoint answered with success; the
    /// response may still reject individual records.
    fn send(&mut self, payload: &BulkPayload) -> Result<BulkResponse, DeliveryError>;

    /// Drop idle connections. Called after a quiet period.
    fn reset(&mut self) {}

    fn name(&self) -> &str;
}

impl<T: BulkTransport + ?Sized> BulkTransport for Box<T> {
    fn send(&mut self, payload: &BulkPayload) -> Result<BulkResponse, DeliveryError> {
        (**self).send(payload)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
