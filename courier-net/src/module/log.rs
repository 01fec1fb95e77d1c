//! Exchange logging.

use async_trait::async_trait;
use reqwest::Request;
use tracing::{debug, trace};

use super::{ClientBuilder, ClientModule, ExchangeHook};
use crate::{CallError, ResponseParts};

/// How much of each exchange is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    /// Nothing.
    None,
    /// Request line and response status.
    Basic,
    /// Basic plus headers.
    Headers,
    /// Headers plus bodies.
    #[default]
    Body,
}

/// Client module that logs every exchange through `tracing`.
///
/// Defaults to [`LogLevel::Body`]; bodies are emitted at `debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogModule {
    level: LogLevel,
}

impl LogModule {
    /// Create a module logging at `level`.
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }

    /// Configured level.
    pub fn level(&self) -> LogLevel {
        self.level
    }
}

impl ClientModule for LogModule {
    fn on_builder_created(&self, builder: &mut ClientBuilder) {
        if self.level > LogLevel::None {
            builder.add_hook(LogHook { level: self.level });
        }
    }
}

struct LogHook {
    level: LogLevel,
}

#[async_trait]
impl ExchangeHook for LogHook {
    async fn intercept_request(&self, request: Request) -> Result<Request, CallError> {
        debug!(method = %request.method(), url = %request.url(), "--> Sending request");

        if self.level >= LogLevel::Headers {
            for (name, value) in request.headers() {
                trace!(header = %name, value = ?value, "Request header");
            }
        }

        if self.level >= LogLevel::Body
            && let Some(body) = request.body().and_then(|body| body.as_bytes())
        {
            debug!(body = %String::from_utf8_lossy(body), "Request body");
        }

        Ok(request)
    }

    async fn intercept_response(&self, response: ResponseParts) -> Result<ResponseParts, CallError> {
        debug!(
            status = %response.status(),
            url = %response.url(),
            bytes = response.bytes().len(),
            "<-- Received response"
        );

        if self.level >= LogLevel::Headers {
            for (name, value) in response.headers() {
                trace!(header = %name, value = ?value, "Response header");
            }
        }

        if self.level >= LogLevel::Body && !response.bytes().is_empty() {
            debug!(body = %String::from_utf8_lossy(response.bytes()), "Response body");
        }

        Ok(response)
    }
}
