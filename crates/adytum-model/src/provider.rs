// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;

use async_trait::async_trait;
use futures::{stream, Stream};

use crate::{ChatOptions, ChatOutcome, Message, ProviderError};

/// One streamed text delta.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub delta: String,
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

/// Uniform adapter over one provider wire-format family.
///
/// Adapters translate the neutral message model (roles, tool calls, tool
/// results) to the provider's request shape and back: tool_use/tool_result
/// flattened into the provider's block layout, null content stripped where a
/// provider rejects it, and tool calls returned as a flat array.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Wire-format family id (e.g. "anthropic", "openai").
    fn family(&self) -> &str;

    /// Send one chat request and return the complete outcome.
    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        opts: &ChatOptions,
    ) -> Result<ChatOutcome, ProviderError>;

    /// Stream the reply as deltas.
    ///
    /// The default implementation degrades to a single non-streaming `chat`
    /// call whose full content is yielded as one chunk, so adapters without
    /// native streaming stay correct.
    async fn chat_stream(
        &self,
        model: &str,
        messages: &[Message],
        opts: &ChatOptions,
    ) -> Result<ChunkStream, ProviderError> {
        let outcome = self.chat(model, messages, opts).await?;
        let chunk = StreamChunk {
            delta: outcome.message.content,
        };
        Ok(Box::pin(stream::iter(vec![Ok(chunk)])))
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::Usage;

    struct PlainAdapter;

    #[async_trait]
    impl ProviderAdapter for PlainAdapter {
        fn family(&self) -> &str {
            "plain"
        }
        async fn chat(
            &self,
            _model: &str,
            _messages: &[Message],
            _opts: &ChatOptions,
        ) -> Result<ChatOutcome, ProviderError> {
            let mut o = ChatOutcome::text("whole reply");
            o.usage = Usage::new(1, 2);
            Ok(o)
        }
    }

    #[tokio::test]
    async fn default_stream_degrades_to_single_chunk() {
        let a = PlainAdapter;
        let mut s = a
            .chat_stream("m", &[Message::user("hi")], &ChatOptions::default())
            .await
            .unwrap();
        let first = s.next().await.unwrap().unwrap();
        assert_eq!(first.delta, "whole reply");
        assert!(s.next().await.is_none(), "exactly one chunk expected");
    }
}
