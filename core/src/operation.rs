//! A single HTTP request whose body is decoded into a typed document.
//!
//! # Design
//! `TypedRequestOperation` owns the request, the decoder and the two
//! callbacks. `submit()` hands a clone of the request and a
//! [`CompletionHandle`] to the executor; the executor reports back through
//! the handle on any thread it likes.
//!
//! The lifecycle is a single `AtomicU8`:
//!
//! ```text
//! Created -> InFlight -> Completed | Failed | Cancelled
//! Created -> Cancelled
//! ```
//!
//! Completion and cancellation both finish with a compare-and-swap into a
//! terminal state. Whichever swap lands first takes the callbacks out of the
//! shared slot and fires one of them; every later attempt sees a terminal
//! state and returns without side effects. The decoded document is only ever
//! carried inside the callback arguments, never stored on the operation.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::codec::{BsonDecoder, DocumentDecoder};
use crate::config::OperationConfig;
use crate::error::{InvalidArgument, OperationError, SubmitError, TransportError};
use crate::http::{HttpExecutor, RequestDescriptor, ResponseMetadata, TransportOutcome};

/// Lifecycle of an operation. `Completed`, `Failed` and `Cancelled` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperationState {
    Created = 0,
    InFlight = 1,
    Completed = 2,
    Failed = 3,
    Cancelled = 4,
}

impl OperationState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => OperationState::Created,
            1 => OperationState::InFlight,
            2 => OperationState::Completed,
            3 => OperationState::Failed,
            _ => OperationState::Cancelled,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationState::Completed | OperationState::Failed | OperationState::Cancelled
        )
    }
}

/// `(request, response, document)`
pub type SuccessCallback<T> = Box<dyn FnOnce(&RequestDescriptor, &ResponseMetadata, T) + Send>;

/// `(request, response, error, document)`. The response is `None` for
/// transport failures and cancellation. The document is only present when an
/// error-status body still decoded.
pub type FailureCallback<T> =
    Box<dyn FnOnce(&RequestDescriptor, Option<&ResponseMetadata>, OperationError, Option<T>) + Send>;

struct Callbacks<T> {
    on_success: SuccessCallback<T>,
    on_failure: FailureCallback<T>,
}

/// The resolved result of an operation, ready to hand to a callback.
enum Delivery<T> {
    Success {
        metadata: ResponseMetadata,
        document: T,
    },
    Failure {
        metadata: Option<ResponseMetadata>,
        error: OperationError,
        document: Option<T>,
    },
}

impl<T> Delivery<T> {
    /// State reached when a transport completion delivers this. Only
    /// `cancel()` moves an operation to `Cancelled`, even if the executor
    /// reports a cancelled transport.
    fn terminal_state(&self) -> OperationState {
        match self {
            Delivery::Success { .. } => OperationState::Completed,
            Delivery::Failure { .. } => OperationState::Failed,
        }
    }
}

struct Shared<D: DocumentDecoder> {
    request: RequestDescriptor,
    decoder: Arc<D>,
    config: OperationConfig,
    state: AtomicU8,
    callbacks: Mutex<Option<Callbacks<D::Document>>>,
}

impl<D: DocumentDecoder> Shared<D> {
    fn state(&self) -> OperationState {
        OperationState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: OperationState, to: OperationState) -> Result<(), OperationState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(OperationState::from_u8)
    }

    fn on_transport_complete(&self, outcome: TransportOutcome) {
        let current = self.state();
        if current != OperationState::InFlight {
            warn!(
                method = %self.request.method,
                url = %self.request.url,
                state = ?current,
                "ignoring transport completion"
            );
            return;
        }

        let delivery = self.resolve(outcome);
        let terminal = delivery.terminal_state();
        if let Err(actual) = self.transition(OperationState::InFlight, terminal) {
            debug!(
                url = %self.request.url,
                state = ?actual,
                "transport completion lost race to a terminal state"
            );
            return;
        }
        self.deliver(delivery);
    }

    fn cancel(&self) -> bool {
        let mut current = self.state();
        loop {
            if current.is_terminal() {
                return false;
            }
            match self.transition(current, OperationState::Cancelled) {
                Ok(()) => break,
                // Lost to submit (Created -> InFlight) or to a completion.
                Err(actual) => current = actual,
            }
        }
        self.deliver(Delivery::Failure {
            metadata: None,
            error: TransportError::cancelled().into(),
            document: None,
        });
        true
    }

    fn resolve(&self, outcome: TransportOutcome) -> Delivery<D::Document> {
        let (metadata, body) = match outcome {
            TransportOutcome::Failed(err) => {
                return Delivery::Failure {
                    metadata: None,
                    error: OperationError::Transport(err),
                    document: None,
                };
            }
            TransportOutcome::Response { metadata, body } => (metadata, body),
        };

        let acceptable = self.acceptable_content_type(&metadata);

        if metadata.is_error_status() {
            let document = if acceptable {
                self.decoder.decode(&body).ok()
            } else {
                None
            };
            return Delivery::Failure {
                error: OperationError::UnexpectedStatus(metadata.status),
                metadata: Some(metadata),
                document,
            };
        }

        if !acceptable {
            return Delivery::Failure {
                error: OperationError::UnacceptableContentType(metadata.content_type()),
                metadata: Some(metadata),
                document: None,
            };
        }

        match self.decoder.decode(&body) {
            Ok(document) => Delivery::Success { metadata, document },
            Err(err) => Delivery::Failure {
                metadata: Some(metadata),
                error: OperationError::Decode(err),
                document: None,
            },
        }
    }

    fn acceptable_content_type(&self, metadata: &ResponseMetadata) -> bool {
        if !self.config.enforce_content_type {
            return true;
        }
        match metadata.content_type() {
            None => true,
            Some(content_type) => self
                .decoder
                .content_types()
                .iter()
                .any(|accepted| accepted.eq_ignore_ascii_case(&content_type)),
        }
    }

    /// Only the caller that won the terminal transition gets here, so the
    /// slot is always full.
    fn deliver(&self, delivery: Delivery<D::Document>) {
        let Some(callbacks) = self.callbacks.lock().take() else {
            return;
        };
        match delivery {
            Delivery::Success { metadata, document } => {
                debug!(url = %self.request.url, status = metadata.status, "operation completed");
                (callbacks.on_success)(&self.request, &metadata, document);
            }
            Delivery::Failure {
                metadata,
                error,
                document,
            } => {
                debug!(url = %self.request.url, error = %error, "operation failed");
                (callbacks.on_failure)(&self.request, metadata.as_ref(), error, document);
            }
        }
    }
}

/// Type-erased view of an operation, so executors need not know the
/// document type.
trait Completable: Send + Sync {
    fn complete(&self, outcome: TransportOutcome);
}

impl<D: DocumentDecoder> Completable for Shared<D> {
    fn complete(&self, outcome: TransportOutcome) {
        self.on_transport_complete(outcome);
    }
}

/// Given to the executor on submit. Calling [`complete`](Self::complete) a
/// second time, or after the operation was cancelled, does nothing.
#[derive(Clone)]
pub struct CompletionHandle {
    operation: Arc<dyn Completable>,
}

impl CompletionHandle {
    pub fn complete(&self, outcome: TransportOutcome) {
        self.operation.complete(outcome);
    }
}

impl fmt::Debug for CompletionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionHandle").finish_non_exhaustive()
    }
}

/// One HTTP request decoded with `D`, reporting through exactly one of two
/// callbacks.
///
/// Dropping the operation after `submit()` does not cancel it: the executor
/// keeps it alive through its `CompletionHandle` and the callback still
/// fires.
pub struct TypedRequestOperation<D: DocumentDecoder> {
    shared: Arc<Shared<D>>,
    executor: Arc<dyn HttpExecutor>,
}

impl TypedRequestOperation<BsonDecoder> {
    /// Operation that decodes the response body as BSON.
    pub fn bson<S, F>(
        request: RequestDescriptor,
        executor: Arc<dyn HttpExecutor>,
        on_success: S,
        on_failure: F,
    ) -> Result<Self, InvalidArgument>
    where
        S: FnOnce(&RequestDescriptor, &ResponseMetadata, bson::Document) + Send + 'static,
        F: FnOnce(&RequestDescriptor, Option<&ResponseMetadata>, OperationError, Option<bson::Document>)
            + Send
            + 'static,
    {
        Self::new(request, executor, Arc::new(BsonDecoder), on_success, on_failure)
    }
}

impl<D: DocumentDecoder + 'static> TypedRequestOperation<D> {
    /// Build an operation with the default [`OperationConfig`].
    ///
    /// Fails with [`InvalidArgument`] if the request method is empty or not a
    /// token, or the URL is not an absolute http(s) URL.
    pub fn new<S, F>(
        request: RequestDescriptor,
        executor: Arc<dyn HttpExecutor>,
        decoder: Arc<D>,
        on_success: S,
        on_failure: F,
    ) -> Result<Self, InvalidArgument>
    where
        S: FnOnce(&RequestDescriptor, &ResponseMetadata, D::Document) + Send + 'static,
        F: FnOnce(&RequestDescriptor, Option<&ResponseMetadata>, OperationError, Option<D::Document>)
            + Send
            + 'static,
    {
        Self::with_config(
            request,
            executor,
            decoder,
            OperationConfig::default(),
            on_success,
            on_failure,
        )
    }

    pub fn with_config<S, F>(
        request: RequestDescriptor,
        executor: Arc<dyn HttpExecutor>,
        decoder: Arc<D>,
        config: OperationConfig,
        on_success: S,
        on_failure: F,
    ) -> Result<Self, InvalidArgument>
    where
        S: FnOnce(&RequestDescriptor, &ResponseMetadata, D::Document) + Send + 'static,
        F: FnOnce(&RequestDescriptor, Option<&ResponseMetadata>, OperationError, Option<D::Document>)
            + Send
            + 'static,
    {
        request.validate()?;
        let callbacks = Callbacks {
            on_success: Box::new(on_success) as SuccessCallback<D::Document>,
            on_failure: Box::new(on_failure) as FailureCallback<D::Document>,
        };
        Ok(Self {
            shared: Arc::new(Shared {
                request,
                decoder,
                config,
                state: AtomicU8::new(OperationState::Created as u8),
                callbacks: Mutex::new(Some(callbacks)),
            }),
            executor,
        })
    }

    pub fn request(&self) -> &RequestDescriptor {
        &self.shared.request
    }

    pub fn config(&self) -> &OperationConfig {
        &self.shared.config
    }

    pub fn state(&self) -> OperationState {
        self.shared.state()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Hand the request to the executor and return immediately.
    ///
    /// The state moves to `InFlight` before the executor is called, so an
    /// executor that completes synchronously inside `execute` is fine.
    pub fn submit(&self) -> Result<(), SubmitError> {
        self.shared
            .transition(OperationState::Created, OperationState::InFlight)
            .map_err(SubmitError::NotCreated)?;

        let mut request = self.shared.request.clone();
        let accepted = self.shared.decoder.content_types();
        if self.shared.config.set_accept_header
            && !accepted.is_empty()
            && request.header("accept").is_none()
        {
            request.headers.push(("Accept".to_string(), accepted.join(", ")));
        }

        debug!(method = %request.method, url = %request.url, "submitting operation");
        let completion = CompletionHandle {
            operation: self.shared.clone(),
        };
        self.executor.execute(request, completion);
        Ok(())
    }

    /// The executor's completion hook. Equivalent to calling
    /// [`CompletionHandle::complete`].
    pub fn on_transport_complete(&self, outcome: TransportOutcome) {
        self.shared.on_transport_complete(outcome);
    }

    /// Cancel the operation if no terminal callback has fired yet.
    ///
    /// Returns `true` if this call delivered the failure callback with a
    /// `Cancelled` transport error, `false` if the operation had already
    /// finished. Network I/O already started by the executor is not aborted;
    /// its eventual completion is ignored.
    pub fn cancel(&self) -> bool {
        let cancelled = self.shared.cancel();
        if !cancelled {
            debug!(url = %self.shared.request.url, "cancel after operation finished");
        }
        cancelled
    }
}

impl<D: DocumentDecoder> fmt::Debug for TypedRequestOperation<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedRequestOperation")
            .field("request", &self.shared.request)
            .field("state", &self.shared.state())
            .finish_non_exhaustive()
    }
}
