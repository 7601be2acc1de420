//! C-ABI wrapper around `bson-request-core`.
//!
//! # Overview
//! Lets any language with a C FFI run BSON request operations while doing
//! the HTTP I/O itself. The host registers an executor function; the library
//! hands it each submitted request and a completion handle, and the host
//! reports the response (or transport failure) back through
//! `bsonreq_completion_respond` / `bsonreq_completion_fail`.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Decoded documents reach C as relaxed Extended JSON text.
//! - Requests handed to the executor, and completion handles, are owned by
//!   the host until it frees or consumes them. Strings passed to callbacks
//!   are borrowed for the duration of the call only.

pub mod types;

use std::ffi::{c_void, CStr};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bson_request_core::{
    HttpExecutor, HttpMethod, OperationConfig, RequestDescriptor, ResponseMetadata,
    TransportError, TransportOutcome, TypedRequestOperation,
};

use types::*;

/// Forwards submitted requests to the host's executor function.
struct HostExecutor {
    execute: FfiExecutorFn,
    user_data: UserData,
}

impl HttpExecutor for HostExecutor {
    fn execute(&self, request: RequestDescriptor, completion: bson_request_core::CompletionHandle) {
        let request = FfiHttpRequest::from_core(request);
        let completion = Box::into_raw(Box::new(FfiCompletion { inner: completion }));
        (self.execute)(self.user_data.get(), request, completion);
    }
}

/// Borrow a C string as `&str`. `None` for null or invalid UTF-8.
///
/// # Safety
/// `s` must be null or a valid NUL-terminated string that outlives `'a`.
unsafe fn str_arg<'a>(s: *const c_char) -> Option<&'a str> {
    if s.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(s) }.to_str().ok()
}

/// Copy `len` bytes from `ptr`; null or zero length gives an empty vector.
///
/// # Safety
/// `ptr` must be null or valid for reads of `len` bytes.
unsafe fn bytes_arg(ptr: *const u8, len: usize) -> Vec<u8> {
    if ptr.is_null() || len == 0 {
        return Vec::new();
    }
    unsafe { std::slice::from_raw_parts(ptr, len) }.to_vec()
}

// ---------------------------------------------------------------------------
// Request building
// ---------------------------------------------------------------------------

/// Start a request with `method` (e.g. `"GET"`) and `url`.
///
/// Returns null if either argument is null or not UTF-8, or if the method
/// is not a valid HTTP token. The URL is checked by
/// `bsonreq_operation_new`. Free with `bsonreq_request_free` unless passed
/// to `bsonreq_operation_new`.
#[unsafe(no_mangle)]
pub extern "C" fn bsonreq_request_new(
    method: *const c_char,
    url: *const c_char,
) -> *mut FfiRequestDescriptor {
    catch_unwind(|| {
        let (Some(method), Some(url)) = (unsafe { str_arg(method) }, unsafe { str_arg(url) }) else {
            return std::ptr::null_mut();
        };
        let Ok(method) = HttpMethod::parse(method) else {
            return std::ptr::null_mut();
        };
        let inner = RequestDescriptor::new(method, url);
        Box::into_raw(Box::new(FfiRequestDescriptor { inner }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Append a header. Returns false on a null or non-UTF-8 argument.
#[unsafe(no_mangle)]
pub extern "C" fn bsonreq_request_add_header(
    request: *mut FfiRequestDescriptor,
    name: *const c_char,
    value: *const c_char,
) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if request.is_null() {
            return false;
        }
        let (Some(name), Some(value)) = (unsafe { str_arg(name) }, unsafe { str_arg(value) }) else {
            return false;
        };
        let request = unsafe { &mut *request };
        request.inner.headers.push((name.to_string(), value.to_string()));
        true
    }))
    .unwrap_or(false)
}

/// Set the request body, copying `len` bytes from `body`. A null `body`
/// clears it. Returns false if `request` is null.
#[unsafe(no_mangle)]
pub extern "C" fn bsonreq_request_set_body(
    request: *mut FfiRequestDescriptor,
    body: *const u8,
    len: usize,
) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if request.is_null() {
            return false;
        }
        let request = unsafe { &mut *request };
        request.inner.body = if body.is_null() {
            None
        } else {
            Some(unsafe { bytes_arg(body, len) })
        };
        true
    }))
    .unwrap_or(false)
}

/// Free a request that was never passed to `bsonreq_operation_new`.
/// Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn bsonreq_request_free(request: *mut FfiRequestDescriptor) {
    if !request.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { Box::from_raw(request) });
        });
    }
}

// ---------------------------------------------------------------------------
// Operation lifecycle
// ---------------------------------------------------------------------------

/// Create a BSON operation. Always takes ownership of `request`.
///
/// Returns null if any pointer argument (other than `user_data`) is null, or
/// if the request's URL is not an absolute http(s) URL. Free with
/// `bsonreq_operation_free`.
#[unsafe(no_mangle)]
pub extern "C" fn bsonreq_operation_new(
    request: *mut FfiRequestDescriptor,
    executor: Option<FfiExecutorFn>,
    on_success: Option<FfiSuccessFn>,
    on_failure: Option<FfiFailureFn>,
    user_data: *mut c_void,
    enforce_content_type: bool,
) -> *mut FfiOperation {
    catch_unwind(AssertUnwindSafe(|| {
        if request.is_null() {
            return std::ptr::null_mut();
        }
        let request = unsafe { Box::from_raw(request) }.inner;
        let (Some(execute), Some(on_success), Some(on_failure)) = (executor, on_success, on_failure)
        else {
            return std::ptr::null_mut();
        };

        let user_data = UserData(user_data);
        let executor = Arc::new(HostExecutor { execute, user_data });
        let config = OperationConfig {
            enforce_content_type,
            ..OperationConfig::default()
        };

        let operation = TypedRequestOperation::with_config(
            request,
            executor,
            Arc::new(bson_request_core::BsonDecoder),
            config,
            move |_, meta, document| {
                let json = c_string(&document_json(document));
                let headers = HeaderParts::new(&meta.headers);
                on_success(
                    user_data.get(),
                    meta.status,
                    headers.as_ptr(),
                    headers.len(),
                    json.as_ptr(),
                );
            },
            move |_, meta, error, document| {
                let parts = FailureParts::new(meta, &error, document.map(document_json));
                let failure = parts.as_ffi();
                on_failure(user_data.get(), &failure);
            },
        );
        match operation {
            Ok(inner) => Box::into_raw(Box::new(FfiOperation { inner })),
            Err(_) => std::ptr::null_mut(),
        }
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Hand the request to the host executor. Returns false if `operation` is
/// null or was already submitted or cancelled.
#[unsafe(no_mangle)]
pub extern "C" fn bsonreq_operation_submit(operation: *const FfiOperation) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if operation.is_null() {
            return false;
        }
        let operation = unsafe { &*operation };
        operation.inner.submit().is_ok()
    }))
    .unwrap_or(false)
}

/// Cancel the operation. Returns true if this call delivered the
/// cancellation failure, false if the operation had already finished.
#[unsafe(no_mangle)]
pub extern "C" fn bsonreq_operation_cancel(operation: *const FfiOperation) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if operation.is_null() {
            return false;
        }
        let operation = unsafe { &*operation };
        operation.inner.cancel()
    }))
    .unwrap_or(false)
}

/// Current lifecycle state, or `Invalid` for a null handle.
#[unsafe(no_mangle)]
pub extern "C" fn bsonreq_operation_state(operation: *const FfiOperation) -> FfiOperationState {
    catch_unwind(AssertUnwindSafe(|| {
        if operation.is_null() {
            return FfiOperationState::Invalid;
        }
        let operation = unsafe { &*operation };
        operation.inner.state().into()
    }))
    .unwrap_or(FfiOperationState::Invalid)
}

/// Free an operation. Does not cancel it: an outstanding completion still
/// delivers its callback. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn bsonreq_operation_free(operation: *mut FfiOperation) {
    if !operation.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(operation) });
        }));
    }
}

// ---------------------------------------------------------------------------
// Executor side
// ---------------------------------------------------------------------------

/// Free an `FfiHttpRequest` handed to the executor. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn bsonreq_free_request(request: *mut FfiHttpRequest) {
    if !request.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| unsafe { FfiHttpRequest::free(request) }));
    }
}

/// Report a received response and consume `completion`.
///
/// `headers` may be null when `headers_len` is 0; entries with a null or
/// non-UTF-8 key or value are skipped. `body` may be null when `body_len`
/// is 0. The terminal callback runs on the calling thread before this
/// returns.
#[unsafe(no_mangle)]
pub extern "C" fn bsonreq_completion_respond(
    completion: *mut FfiCompletion,
    status: u16,
    headers: *const FfiHeader,
    headers_len: usize,
    body: *const u8,
    body_len: usize,
) {
    if completion.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let completion = unsafe { Box::from_raw(completion) };
        let mut metadata = ResponseMetadata::new(status);
        if !headers.is_null() {
            let headers = unsafe { std::slice::from_raw_parts(headers, headers_len) };
            for header in headers {
                let (Some(name), Some(value)) = (unsafe { str_arg(header.key) }, unsafe { str_arg(header.value) })
                else {
                    continue;
                };
                metadata.headers.push((name.to_string(), value.to_string()));
            }
        }
        let body = unsafe { bytes_arg(body, body_len) };
        completion.inner.complete(TransportOutcome::response(metadata, body));
    }));
}

/// Report a transport failure and consume `completion`.
///
/// `kind` is an `FfiTransportKind` value; unknown values are treated as
/// `Other`. `message` may be null.
#[unsafe(no_mangle)]
pub extern "C" fn bsonreq_completion_fail(
    completion: *mut FfiCompletion,
    kind: i32,
    message: *const c_char,
) {
    if completion.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let completion = unsafe { Box::from_raw(completion) };
        let message = unsafe { str_arg(message) }.unwrap_or_default();
        let error = TransportError::new(FfiTransportKind::core_kind(kind), message);
        completion.inner.complete(TransportOutcome::Failed(error));
    }));
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::ffi::CString;
    use std::sync::Mutex;

    use bson_request_core::bson::{doc, Document};

    use super::*;

    #[derive(Debug)]
    struct SeenRequest {
        method: String,
        url: String,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    }

    #[derive(Debug)]
    struct SeenFailure {
        error_code: FfiErrorCode,
        transport_kind: FfiTransportKind,
        http_status: u16,
        decode_offset: i64,
        message: String,
        document: Option<serde_json::Value>,
    }

    /// Shared with the C callbacks through `user_data`.
    #[derive(Default)]
    struct Recorder {
        requests: Mutex<Vec<SeenRequest>>,
        completions: Mutex<Vec<usize>>,
        successes: Mutex<Vec<(u16, serde_json::Value)>>,
        failures: Mutex<Vec<SeenFailure>>,
        response_headers: Mutex<Vec<Vec<(String, String)>>>,
    }

    impl Recorder {
        fn user_data(&self) -> *mut c_void {
            self as *const Recorder as *mut c_void
        }

        fn take_completion(&self) -> *mut FfiCompletion {
            self.completions.lock().unwrap().remove(0) as *mut FfiCompletion
        }
    }

    fn owned(s: *const c_char) -> String {
        unsafe { CStr::from_ptr(s) }.to_str().unwrap().to_string()
    }

    fn owned_headers(headers: *const FfiHeader, len: usize) -> Vec<(String, String)> {
        if headers.is_null() {
            assert_eq!(len, 0);
            return Vec::new();
        }
        unsafe { std::slice::from_raw_parts(headers, len) }
            .iter()
            .map(|header| (owned(header.key), owned(header.value)))
            .collect()
    }

    extern "C" fn record_executor(
        user_data: *mut c_void,
        request: *mut FfiHttpRequest,
        completion: *mut FfiCompletion,
    ) {
        let recorder = unsafe { &*(user_data as *const Recorder) };
        let req = unsafe { &*request };
        let headers = (0..req.headers_len)
            .map(|i| {
                let header = unsafe { &*req.headers.add(i) };
                (owned(header.key), owned(header.value))
            })
            .collect();
        let body = unsafe { bytes_arg(req.body, req.body_len) };
        recorder.requests.lock().unwrap().push(SeenRequest {
            method: owned(req.method),
            url: owned(req.url),
            headers,
            body,
        });
        bsonreq_free_request(request);
        recorder.completions.lock().unwrap().push(completion as usize);
    }

    extern "C" fn record_success(
        user_data: *mut c_void,
        status: u16,
        headers: *const FfiHeader,
        headers_len: usize,
        json: *const c_char,
    ) {
        let recorder = unsafe { &*(user_data as *const Recorder) };
        let value = serde_json::from_str(&owned(json)).unwrap();
        recorder.successes.lock().unwrap().push((status, value));
        recorder
            .response_headers
            .lock()
            .unwrap()
            .push(owned_headers(headers, headers_len));
    }

    extern "C" fn record_failure(user_data: *mut c_void, failure: *const FfiFailure) {
        let recorder = unsafe { &*(user_data as *const Recorder) };
        let failure = unsafe { &*failure };
        let document = if failure.document_json.is_null() {
            None
        } else {
            Some(serde_json::from_str(&owned(failure.document_json)).unwrap())
        };
        recorder.failures.lock().unwrap().push(SeenFailure {
            error_code: failure.error_code,
            transport_kind: failure.transport_kind,
            http_status: failure.http_status,
            decode_offset: failure.decode_offset,
            message: owned(failure.message),
            document,
        });
        recorder
            .response_headers
            .lock()
            .unwrap()
            .push(owned_headers(failure.headers, failure.headers_len));
    }

    fn new_request(method: &str, url: &str) -> *mut FfiRequestDescriptor {
        let method = CString::new(method).unwrap();
        let url = CString::new(url).unwrap();
        bsonreq_request_new(method.as_ptr(), url.as_ptr())
    }

    fn new_operation(recorder: &Recorder, url: &str, enforce_content_type: bool) -> *mut FfiOperation {
        let op = bsonreq_operation_new(
            new_request("GET", url),
            Some(record_executor),
            Some(record_success),
            Some(record_failure),
            recorder.user_data(),
            enforce_content_type,
        );
        assert!(!op.is_null());
        op
    }

    fn encode(document: &Document) -> Vec<u8> {
        let mut bytes = Vec::new();
        document.to_writer(&mut bytes).unwrap();
        bytes
    }

    fn respond(completion: *mut FfiCompletion, status: u16, headers: &[(&str, &str)], body: &[u8]) {
        let strings: Vec<(CString, CString)> = headers
            .iter()
            .map(|(name, value)| (CString::new(*name).unwrap(), CString::new(*value).unwrap()))
            .collect();
        let headers: Vec<FfiHeader> = strings
            .iter()
            .map(|(name, value)| FfiHeader {
                key: name.as_ptr() as *mut c_char,
                value: value.as_ptr() as *mut c_char,
            })
            .collect();
        bsonreq_completion_respond(
            completion,
            status,
            headers.as_ptr(),
            headers.len(),
            body.as_ptr(),
            body.len(),
        );
    }

    const BSON: (&str, &str) = ("Content-Type", "application/bson");

    #[test]
    fn request_new_null_returns_null() {
        let url = CString::new("http://a.test").unwrap();
        assert!(bsonreq_request_new(std::ptr::null(), url.as_ptr()).is_null());
        let method = CString::new("GET").unwrap();
        assert!(bsonreq_request_new(method.as_ptr(), std::ptr::null()).is_null());
    }

    #[test]
    fn request_new_rejects_empty_and_invalid_methods() {
        assert!(new_request("", "http://a.test").is_null());
        assert!(new_request("GE T", "http://a.test").is_null());
    }

    #[test]
    fn request_free_null_is_safe() {
        bsonreq_request_free(std::ptr::null_mut());
        bsonreq_request_free(new_request("GET", "http://a.test"));
    }

    #[test]
    fn operation_new_invalid_url_returns_null() {
        let recorder = Recorder::default();
        let op = bsonreq_operation_new(
            new_request("GET", "not a url"),
            Some(record_executor),
            Some(record_success),
            Some(record_failure),
            recorder.user_data(),
            false,
        );
        assert!(op.is_null());
    }

    #[test]
    fn operation_new_missing_callback_returns_null() {
        let recorder = Recorder::default();
        let op = bsonreq_operation_new(
            new_request("GET", "http://a.test"),
            Some(record_executor),
            None,
            Some(record_failure),
            recorder.user_data(),
            false,
        );
        assert!(op.is_null());
        assert!(bsonreq_operation_new(
            std::ptr::null_mut(),
            Some(record_executor),
            Some(record_success),
            Some(record_failure),
            recorder.user_data(),
            false,
        )
        .is_null());
    }

    #[test]
    fn submit_hands_request_to_executor() {
        let recorder = Recorder::default();
        let request = new_request("POST", "http://a.test/items");
        let name = CString::new("X-Trace").unwrap();
        let value = CString::new("abc").unwrap();
        assert!(bsonreq_request_add_header(request, name.as_ptr(), value.as_ptr()));
        let body = encode(&doc! { "value": 1 });
        assert!(bsonreq_request_set_body(request, body.as_ptr(), body.len()));
        let op = bsonreq_operation_new(
            request,
            Some(record_executor),
            Some(record_success),
            Some(record_failure),
            recorder.user_data(),
            false,
        );

        assert_eq!(bsonreq_operation_state(op), FfiOperationState::Created);
        assert!(bsonreq_operation_submit(op));
        assert!(!bsonreq_operation_submit(op));
        assert_eq!(bsonreq_operation_state(op), FfiOperationState::InFlight);

        {
            let requests = recorder.requests.lock().unwrap();
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].method, "POST");
            assert_eq!(requests[0].url, "http://a.test/items");
            assert_eq!(requests[0].body, body);
            assert_eq!(
                requests[0].headers,
                vec![
                    ("X-Trace".to_string(), "abc".to_string()),
                    ("Accept".to_string(), "application/bson".to_string()),
                ]
            );
        }

        // Complete so the completion box is released.
        bsonreq_completion_respond(recorder.take_completion(), 204, std::ptr::null(), 0, std::ptr::null(), 0);
        bsonreq_operation_free(op);
    }

    #[test]
    fn respond_success_delivers_extended_json() {
        let recorder = Recorder::default();
        let op = new_operation(&recorder, "https://api.example.com/items", false);
        assert!(bsonreq_operation_submit(op));

        let body = encode(&doc! { "items": [1, 2, 3] });
        respond(recorder.take_completion(), 200, &[BSON], &body);

        assert_eq!(bsonreq_operation_state(op), FfiOperationState::Completed);
        assert_eq!(
            *recorder.successes.lock().unwrap(),
            vec![(200, serde_json::json!({ "items": [1, 2, 3] }))]
        );
        assert!(recorder.failures.lock().unwrap().is_empty());
        bsonreq_operation_free(op);
    }

    #[test]
    fn response_headers_reach_callbacks() {
        let recorder = Recorder::default();
        let op = new_operation(&recorder, "https://api.example.com/items", false);
        assert!(bsonreq_operation_submit(op));

        let body = encode(&doc! { "items": [] });
        respond(
            recorder.take_completion(),
            200,
            &[BSON, ("ETag", "\"v1\""), ("X-Request-Id", "42")],
            &body,
        );

        assert_eq!(
            *recorder.response_headers.lock().unwrap(),
            vec![vec![
                ("Content-Type".to_string(), "application/bson".to_string()),
                ("ETag".to_string(), "\"v1\"".to_string()),
                ("X-Request-Id".to_string(), "42".to_string()),
            ]]
        );
        bsonreq_operation_free(op);
    }

    #[test]
    fn respond_skips_headers_with_null_parts() {
        let recorder = Recorder::default();
        let op = new_operation(&recorder, "https://api.example.com/items", false);
        assert!(bsonreq_operation_submit(op));

        let name = CString::new("Retry-After").unwrap();
        let value = CString::new("5").unwrap();
        let headers = [
            FfiHeader {
                key: name.as_ptr() as *mut c_char,
                value: std::ptr::null_mut(),
            },
            FfiHeader {
                key: name.as_ptr() as *mut c_char,
                value: value.as_ptr() as *mut c_char,
            },
        ];
        let body = encode(&doc! { "error": "busy" });
        bsonreq_completion_respond(
            recorder.take_completion(),
            503,
            headers.as_ptr(),
            headers.len(),
            body.as_ptr(),
            body.len(),
        );

        assert_eq!(
            *recorder.response_headers.lock().unwrap(),
            vec![vec![("Retry-After".to_string(), "5".to_string())]]
        );
        assert_eq!(recorder.failures.lock().unwrap()[0].http_status, 503);
        bsonreq_operation_free(op);
    }

    #[test]
    fn respond_error_status_attaches_document() {
        let recorder = Recorder::default();
        let op = new_operation(&recorder, "https://api.example.com/items", false);
        assert!(bsonreq_operation_submit(op));

        let body = encode(&doc! { "error": "internal" });
        respond(recorder.take_completion(), 500, &[BSON], &body);

        assert_eq!(bsonreq_operation_state(op), FfiOperationState::Failed);
        let failures = recorder.failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].error_code, FfiErrorCode::UnexpectedStatus);
        assert_eq!(failures[0].http_status, 500);
        assert_eq!(failures[0].document, Some(serde_json::json!({ "error": "internal" })));
        bsonreq_operation_free(op);
    }

    #[test]
    fn respond_garbage_reports_decode_offset() {
        let recorder = Recorder::default();
        let op = new_operation(&recorder, "https://api.example.com/items", false);
        assert!(bsonreq_operation_submit(op));

        respond(recorder.take_completion(), 200, &[BSON], b"nope");

        let failures = recorder.failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].error_code, FfiErrorCode::Decode);
        assert_eq!(failures[0].transport_kind, FfiTransportKind::None);
        assert_eq!(failures[0].decode_offset, 4);
        assert!(failures[0].document.is_none());
        bsonreq_operation_free(op);
    }

    #[test]
    fn respond_wrong_content_type_when_enforced() {
        let recorder = Recorder::default();
        let op = new_operation(&recorder, "https://api.example.com/items", true);
        assert!(bsonreq_operation_submit(op));

        let body = encode(&doc! { "items": [] });
        respond(recorder.take_completion(), 200, &[("Content-Type", "text/html")], &body);

        let failures = recorder.failures.lock().unwrap();
        assert_eq!(failures[0].error_code, FfiErrorCode::UnacceptableContentType);
        assert!(failures[0].message.contains("text/html"));
        bsonreq_operation_free(op);
    }

    #[test]
    fn fail_reports_transport_kind() {
        let recorder = Recorder::default();
        let op = new_operation(&recorder, "https://api.example.com/items", false);
        assert!(bsonreq_operation_submit(op));

        let message = CString::new("no answer in 30s").unwrap();
        bsonreq_completion_fail(recorder.take_completion(), FfiTransportKind::Timeout as i32, message.as_ptr());

        let failures = recorder.failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].error_code, FfiErrorCode::Transport);
        assert_eq!(failures[0].transport_kind, FfiTransportKind::Timeout);
        assert_eq!(failures[0].http_status, 0);
        assert!(failures[0].message.contains("no answer in 30s"));
        bsonreq_operation_free(op);
    }

    #[test]
    fn host_reported_cancellation_ends_failed() {
        let recorder = Recorder::default();
        let op = new_operation(&recorder, "https://api.example.com/items", false);
        assert!(bsonreq_operation_submit(op));

        bsonreq_completion_fail(
            recorder.take_completion(),
            FfiTransportKind::Cancelled as i32,
            std::ptr::null(),
        );

        assert_eq!(bsonreq_operation_state(op), FfiOperationState::Failed);
        let failures = recorder.failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].transport_kind, FfiTransportKind::Cancelled);
        assert_eq!(*recorder.response_headers.lock().unwrap(), vec![Vec::new()]);
        bsonreq_operation_free(op);
    }

    #[test]
    fn fail_with_unknown_kind_is_other() {
        let recorder = Recorder::default();
        let op = new_operation(&recorder, "https://api.example.com/items", false);
        assert!(bsonreq_operation_submit(op));

        bsonreq_completion_fail(recorder.take_completion(), 99, std::ptr::null());

        let failures = recorder.failures.lock().unwrap();
        assert_eq!(failures[0].transport_kind, FfiTransportKind::Other);
        bsonreq_operation_free(op);
    }

    #[test]
    fn cancel_then_late_response_fires_once() {
        let recorder = Recorder::default();
        let op = new_operation(&recorder, "https://api.example.com/items", false);
        assert!(bsonreq_operation_submit(op));

        assert!(bsonreq_operation_cancel(op));
        assert!(!bsonreq_operation_cancel(op));
        assert_eq!(bsonreq_operation_state(op), FfiOperationState::Cancelled);

        let body = encode(&doc! { "items": [1] });
        respond(recorder.take_completion(), 200, &[BSON], &body);

        assert!(recorder.successes.lock().unwrap().is_empty());
        let failures = recorder.failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].transport_kind, FfiTransportKind::Cancelled);
        bsonreq_operation_free(op);
    }

    #[test]
    fn null_handles_are_safe() {
        assert_eq!(bsonreq_operation_state(std::ptr::null()), FfiOperationState::Invalid);
        assert!(!bsonreq_operation_submit(std::ptr::null()));
        assert!(!bsonreq_operation_cancel(std::ptr::null()));
        bsonreq_operation_free(std::ptr::null_mut());
        bsonreq_free_request(std::ptr::null_mut());
        bsonreq_completion_respond(std::ptr::null_mut(), 200, std::ptr::null(), 0, std::ptr::null(), 0);
        bsonreq_completion_fail(std::ptr::null_mut(), 0, std::ptr::null());
        assert!(!bsonreq_request_add_header(std::ptr::null_mut(), std::ptr::null(), std::ptr::null()));
        assert!(!bsonreq_request_set_body(std::ptr::null_mut(), std::ptr::null(), 0));
    }
}
