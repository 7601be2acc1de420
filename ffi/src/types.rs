//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Each type mirrors a core type but uses C-compatible representations:
//! `*mut c_char` instead of `String`, raw pointers instead of `Vec`, and
//! enums with explicit discriminants. Conversion functions live here to keep
//! `lib.rs` focused on the `extern "C"` surface.

use std::ffi::{c_void, CString};
use std::os::raw::c_char;

use bson_request_core::bson;
use bson_request_core::{
    BsonDecoder, CompletionHandle, OperationError, OperationState, RequestDescriptor,
    ResponseMetadata, TransportErrorKind, TypedRequestOperation,
};

/// Opaque handle to a request being assembled by the host.
pub struct FfiRequestDescriptor {
    pub(crate) inner: RequestDescriptor,
}

/// Opaque handle to a BSON request operation.
pub struct FfiOperation {
    pub(crate) inner: TypedRequestOperation<BsonDecoder>,
}

/// Opaque handle the host passes back exactly once, through
/// `bsonreq_completion_respond` or `bsonreq_completion_fail`.
pub struct FfiCompletion {
    pub(crate) inner: CompletionHandle,
}

/// Host pointer handed back to every callback untouched.
///
/// The host is responsible for making whatever it points to safe to use
/// from the executor's threads.
#[derive(Clone, Copy)]
pub(crate) struct UserData(pub(crate) *mut c_void);

unsafe impl Send for UserData {}
unsafe impl Sync for UserData {}

impl UserData {
    /// Closures must call this rather than read `.0`, so they capture the
    /// whole `Send` wrapper and not the bare pointer.
    pub(crate) fn get(self) -> *mut c_void {
        self.0
    }
}

/// Host executor: receives an owned request (free with
/// `bsonreq_free_request`) and an owned completion.
pub type FfiExecutorFn =
    extern "C" fn(user_data: *mut c_void, request: *mut FfiHttpRequest, completion: *mut FfiCompletion);

/// Success callback. `headers` and `document_json` (relaxed Extended JSON)
/// are valid only for the duration of the call.
pub type FfiSuccessFn = extern "C" fn(
    user_data: *mut c_void,
    http_status: u16,
    headers: *const FfiHeader,
    headers_len: usize,
    document_json: *const c_char,
);

/// Failure callback. `failure` and its strings are valid only for the
/// duration of the call.
pub type FfiFailureFn = extern "C" fn(user_data: *mut c_void, failure: *const FfiFailure);

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// A single HTTP header as a key-value pair of C strings.
#[repr(C)]
pub struct FfiHeader {
    pub key: *mut c_char,
    pub value: *mut c_char,
}

/// An HTTP request described as C-compatible plain data.
///
/// Handed to the host executor. `body` is null when the request has no
/// body.
#[repr(C)]
pub struct FfiHttpRequest {
    pub method: *mut c_char,
    pub url: *mut c_char,
    pub headers: *mut FfiHeader,
    pub headers_len: usize,
    pub body: *mut u8,
    pub body_len: usize,
}

impl FfiHttpRequest {
    /// Convert a core `RequestDescriptor` into a heap-allocated
    /// `FfiHttpRequest`. Strings with interior NULs are truncated to empty.
    pub(crate) fn from_core(req: RequestDescriptor) -> *mut Self {
        let method = c_string(req.method.as_str()).into_raw();
        let url = c_string(&req.url).into_raw();

        let (body, body_len) = match req.body {
            Some(b) if !b.is_empty() => {
                let boxed = b.into_boxed_slice();
                let len = boxed.len();
                (Box::into_raw(boxed) as *mut u8, len)
            }
            _ => (std::ptr::null_mut(), 0),
        };

        let headers_len = req.headers.len();
        let headers = if req.headers.is_empty() {
            std::ptr::null_mut()
        } else {
            let ffi_headers: Box<[FfiHeader]> = req
                .headers
                .into_iter()
                .map(|(k, v)| FfiHeader {
                    key: c_string(&k).into_raw(),
                    value: c_string(&v).into_raw(),
                })
                .collect();
            Box::into_raw(ffi_headers) as *mut FfiHeader
        };

        Box::into_raw(Box::new(FfiHttpRequest {
            method,
            url,
            headers,
            headers_len,
            body,
            body_len,
        }))
    }

    /// Release everything `from_core` allocated.
    ///
    /// # Safety
    /// `ptr` must come from `from_core` and not have been freed.
    pub(crate) unsafe fn free(ptr: *mut Self) {
        let req = unsafe { Box::from_raw(ptr) };
        drop(unsafe { CString::from_raw(req.method) });
        drop(unsafe { CString::from_raw(req.url) });
        if !req.headers.is_null() {
            let slice = std::ptr::slice_from_raw_parts_mut(req.headers, req.headers_len);
            let headers = unsafe { Box::from_raw(slice) };
            for header in headers.iter() {
                drop(unsafe { CString::from_raw(header.key) });
                drop(unsafe { CString::from_raw(header.value) });
            }
        }
        if !req.body.is_null() {
            let slice = std::ptr::slice_from_raw_parts_mut(req.body, req.body_len);
            drop(unsafe { Box::from_raw(slice) });
        }
    }
}

/// Response headers as C strings, borrowed by callbacks.
pub(crate) struct HeaderParts {
    /// Owns what `views` points into.
    _strings: Vec<(CString, CString)>,
    views: Vec<FfiHeader>,
}

impl HeaderParts {
    pub(crate) fn new(headers: &[(String, String)]) -> Self {
        let strings: Vec<_> = headers
            .iter()
            .map(|(name, value)| (c_string(name), c_string(value)))
            .collect();
        // Callbacks only read through these; the mutable pointer type is
        // shared with requests.
        let views = strings
            .iter()
            .map(|(name, value)| FfiHeader {
                key: name.as_ptr() as *mut c_char,
                value: value.as_ptr() as *mut c_char,
            })
            .collect();
        Self {
            _strings: strings,
            views,
        }
    }

    /// Null when there are no headers.
    pub(crate) fn as_ptr(&self) -> *const FfiHeader {
        if self.views.is_empty() {
            std::ptr::null()
        } else {
            self.views.as_ptr()
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.views.len()
    }
}

// ---------------------------------------------------------------------------
// State and error types
// ---------------------------------------------------------------------------

/// Operation lifecycle as a C enum. `Invalid` is returned for a null handle.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiOperationState {
    Created = 0,
    InFlight = 1,
    Completed = 2,
    Failed = 3,
    Cancelled = 4,
    Invalid = 255,
}

impl From<OperationState> for FfiOperationState {
    fn from(state: OperationState) -> Self {
        match state {
            OperationState::Created => FfiOperationState::Created,
            OperationState::InFlight => FfiOperationState::InFlight,
            OperationState::Completed => FfiOperationState::Completed,
            OperationState::Failed => FfiOperationState::Failed,
            OperationState::Cancelled => FfiOperationState::Cancelled,
        }
    }
}

/// Transport failure category, as reported by the host or set on
/// cancellation.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiTransportKind {
    None = 0,
    ConnectionRefused = 1,
    ConnectionReset = 2,
    Timeout = 3,
    Dns = 4,
    Tls = 5,
    Cancelled = 6,
    Other = 7,
}

impl FfiTransportKind {
    /// Map a raw kind from the host. The host passes an `int`, so unknown
    /// values (and `None`) become `Other` rather than an invalid enum.
    pub(crate) fn core_kind(raw: i32) -> TransportErrorKind {
        match raw {
            1 => TransportErrorKind::ConnectionRefused,
            2 => TransportErrorKind::ConnectionReset,
            3 => TransportErrorKind::Timeout,
            4 => TransportErrorKind::Dns,
            5 => TransportErrorKind::Tls,
            6 => TransportErrorKind::Cancelled,
            _ => TransportErrorKind::Other,
        }
    }
}

impl From<TransportErrorKind> for FfiTransportKind {
    fn from(kind: TransportErrorKind) -> Self {
        match kind {
            TransportErrorKind::ConnectionRefused => FfiTransportKind::ConnectionRefused,
            TransportErrorKind::ConnectionReset => FfiTransportKind::ConnectionReset,
            TransportErrorKind::Timeout => FfiTransportKind::Timeout,
            TransportErrorKind::Dns => FfiTransportKind::Dns,
            TransportErrorKind::Tls => FfiTransportKind::Tls,
            TransportErrorKind::Cancelled => FfiTransportKind::Cancelled,
            TransportErrorKind::Other => FfiTransportKind::Other,
        }
    }
}

/// Error category delivered to the failure callback.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorCode {
    Transport = 1,
    Decode = 2,
    UnexpectedStatus = 3,
    UnacceptableContentType = 4,
}

/// Failure details.
///
/// `http_status` is 0 when no response arrived. `decode_offset` is -1 unless
/// `error_code` is `Decode` and the decoder reported a position.
/// `document_json` is null unless an error-status body decoded. `headers`
/// is null when no response arrived.
#[repr(C)]
pub struct FfiFailure {
    pub error_code: FfiErrorCode,
    pub transport_kind: FfiTransportKind,
    pub http_status: u16,
    pub decode_offset: i64,
    pub message: *const c_char,
    pub document_json: *const c_char,
    pub headers: *const FfiHeader,
    pub headers_len: usize,
}

/// Owns the strings an `FfiFailure` points into for the duration of a
/// callback.
pub(crate) struct FailureParts {
    pub(crate) error_code: FfiErrorCode,
    pub(crate) transport_kind: FfiTransportKind,
    pub(crate) http_status: u16,
    pub(crate) decode_offset: i64,
    pub(crate) message: CString,
    pub(crate) document_json: Option<CString>,
    pub(crate) headers: HeaderParts,
}

impl FailureParts {
    pub(crate) fn new(
        metadata: Option<&ResponseMetadata>,
        error: &OperationError,
        document_json: Option<String>,
    ) -> Self {
        let (error_code, transport_kind, decode_offset) = match error {
            OperationError::Transport(err) => (FfiErrorCode::Transport, err.kind.into(), -1),
            OperationError::Decode(err) => (
                FfiErrorCode::Decode,
                FfiTransportKind::None,
                err.offset.map_or(-1, |offset| offset as i64),
            ),
            OperationError::UnexpectedStatus(_) => {
                (FfiErrorCode::UnexpectedStatus, FfiTransportKind::None, -1)
            }
            OperationError::UnacceptableContentType(_) => {
                (FfiErrorCode::UnacceptableContentType, FfiTransportKind::None, -1)
            }
        };
        Self {
            error_code,
            transport_kind,
            http_status: metadata.map_or(0, |m| m.status),
            decode_offset,
            message: c_string(&error.to_string()),
            document_json: document_json.map(|json| c_string(&json)),
            headers: HeaderParts::new(metadata.map_or(&[][..], |m| m.headers.as_slice())),
        }
    }

    /// Borrowing view; must not outlive `self`.
    pub(crate) fn as_ffi(&self) -> FfiFailure {
        FfiFailure {
            error_code: self.error_code,
            transport_kind: self.transport_kind,
            http_status: self.http_status,
            decode_offset: self.decode_offset,
            message: self.message.as_ptr(),
            document_json: self
                .document_json
                .as_ref()
                .map_or(std::ptr::null(), |json| json.as_ptr()),
            headers: self.headers.as_ptr(),
            headers_len: self.headers.len(),
        }
    }
}

/// Render a decoded document as relaxed Extended JSON text.
pub(crate) fn document_json(document: bson::Document) -> String {
    bson::Bson::Document(document).into_relaxed_extjson().to_string()
}

/// `CString::new` that maps interior NULs to an empty string instead of
/// failing.
pub(crate) fn c_string(s: &str) -> CString {
    CString::new(s).unwrap_or_default()
}
