//! WhatsApp webhook: payload parsing, dispatch, and the HTTP router.

pub mod dispatcher;
pub mod payload;
pub mod routes;

pub use dispatcher::{Dispatcher, Route};
pub use payload::{InboundMessage, WebhookReply};
pub use routes::app_router;
