//! Turning one inbound transport request into a [`Notification`].

use crate::error::ItnError;
use crate::fields::FieldSet;
use crate::notification::Notification;

/// The parts of an HTTP request intake needs, captured by the web layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub method: String,
    pub body: Vec<u8>,
    /// `Referer` header, the declared origin of the request.
    pub referer: Option<String>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, body: impl Into<Vec<u8>>, referer: Option<String>) -> Self {
        Self {
            method: method.into(),
            body: body.into(),
            referer,
        }
    }

    /// Convenience for `POST` with a form body.
    pub fn post(body: impl Into<Vec<u8>>, referer: Option<&str>) -> Self {
        Self::new("POST", body, referer.map(str::to_string))
    }
}

/// PHP `stripslashes`: drop each unescaped backslash, `\\` becomes `\`,
/// `\0` becomes NUL.
pub fn strip_slashes(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('\0'),
            Some(next) => out.push(next),
            None => {}
        }
    }
    out
}

impl Notification {
    /// Fallible intake: POST only, body must be non-empty UTF-8 form data.
    pub fn from_request(request: &RequestContext) -> Result<Self, ItnError> {
        if !request.method.eq_ignore_ascii_case("POST") {
            return Err(ItnError::MethodNotAllowed(request.method.clone()));
        }
        if request.body.is_empty() {
            return Err(ItnError::MalformedBody("empty body".to_string()));
        }
        if std::str::from_utf8(&request.body).is_err() {
            return Err(ItnError::MalformedBody("body is not valid UTF-8".to_string()));
        }

        let mut fields = FieldSet::from_form(&request.body);
        fields.map_values(strip_slashes);

        let referer = request
            .referer
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        Ok(Notification::new(fields, referer))
    }
}

/// Accept one ITN request.
///
/// `acknowledge` runs first, whatever happens next: the gateway treats a
/// missing or slow 200 as a delivery failure and retries. Returns `None` when
/// the request is not one this protocol handles.
pub fn intake(request: &RequestContext, acknowledge: impl FnOnce()) -> Option<Notification> {
    acknowledge();

    match Notification::from_request(request) {
        Ok(notification) => {
            if notification.claimed_signature().is_none() {
                tracing::warn!(
                    m_payment_id = notification.payment_id().unwrap_or("-"),
                    "ITN received without signature"
                );
            }
            Some(notification)
        }
        Err(e) => {
            tracing::debug!(error = %e, method = %request.method, "ITN request not handled");
            None
        }
    }
}
