use caryatid_sdk::Context;
use std::sync::Arc;

use crate::messages::Message;
use crate::queries::errors::QueryError;

/// Request/response round trip against a state module's query topic.
///
/// The extractor maps the raw response message into the expected typed
/// result, reporting a `QueryError` for unexpected shapes.
pub async fn query_state<T, F>(
    context: &Arc<Context<Message>>,
    topic: &str,
    request_msg: Arc<Message>,
    extractor: F,
) -> Result<T, QueryError>
where
    F: FnOnce(Message) -> Result<T, QueryError>,
{
    let raw_msg = context.message_bus.request(topic, request_msg).await?;
    let message = Arc::try_unwrap(raw_msg).unwrap_or_else(|arc| (*arc).clone());

    extractor(message)
}
